//! Structure-aware text chunker.
//!
//! Splits revision text into an ordered sequence of [`Chunk`]s, keeping
//! detected table regions intact as single table chunks and splitting the
//! surrounding prose on paragraph boundaries with a bounded overlap
//! window. Chunking is deterministic: the same text always yields the
//! same sequence.
//!
//! Table detection is heuristic and deliberately biased toward
//! over-inclusion — a false-positive boundary only costs chunk size. The
//! trigger conditions live behind the [`TableDetector`] trait so the
//! policy can be tuned without touching the boundary algorithm.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::ChunkingConfig;
use crate::models::{Chunk, ChunkKind};

/// Syntactic cues that open and extend a table region.
pub trait TableDetector: Send + Sync {
    /// Heading line that introduces structured content.
    fn is_table_heading(&self, line: &str) -> bool;
    /// Line that reads as a separator-delimited table row.
    fn is_row(&self, line: &str) -> bool;
    /// Category label recognized as a sub-heading inside a table region.
    fn category_label(&self, line: &str) -> Option<String>;
}

/// Default detector: keyword-flagged headings, pipe-separated rows, and a
/// configured list of category labels.
pub struct KeywordTableDetector {
    keywords: Vec<String>,
    categories: Vec<String>,
    row_re: Regex,
}

impl KeywordTableDetector {
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            keywords: config
                .table_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            categories: config.category_labels.clone(),
            row_re: Regex::new(r"[^|\n]*\|[^|\n]*\|").expect("row pattern is valid"),
        }
    }
}

impl TableDetector for KeywordTableDetector {
    fn is_table_heading(&self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.len() > 100 || trimmed.ends_with('.') {
            return false;
        }
        let lower = trimmed.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    fn is_row(&self, line: &str) -> bool {
        self.row_re.is_match(line)
    }

    fn category_label(&self, line: &str) -> Option<String> {
        let lower = line.trim().to_lowercase();
        self.categories
            .iter()
            .find(|c| lower.starts_with(&c.to_lowercase()))
            .cloned()
    }
}

/// A detected table span, in line indices.
struct TableRegion {
    start: usize,
    /// Exclusive.
    end: usize,
    title: Option<String>,
    category: Option<String>,
}

enum Segment {
    Prose(String),
    Table {
        text: String,
        title: Option<String>,
        category: Option<String>,
    },
}

pub struct Chunker {
    config: ChunkingConfig,
    detector: Arc<dyn TableDetector>,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        let detector = Arc::new(KeywordTableDetector::from_config(&config));
        Self { config, detector }
    }

    pub fn with_detector(config: ChunkingConfig, detector: Arc<dyn TableDetector>) -> Self {
        Self { config, detector }
    }

    /// Split revision text into chunks. Deterministic and restartable.
    pub fn chunk(&self, revision_id: &str, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return vec![];
        }

        let lines: Vec<&str> = text.lines().collect();
        let regions = self.detect_regions(&lines);
        let segments = build_segments(&lines, regions);

        let mut chunks: Vec<Chunk> = Vec::new();

        for segment in segments {
            match segment {
                Segment::Table {
                    text,
                    title,
                    category,
                } => {
                    if text.len() > self.config.table_max_chars {
                        // Truncate at the ceiling and keep chunking the
                        // remainder as prose; no text is dropped.
                        let cut = floor_char_boundary(&text, self.config.table_max_chars);
                        warn!(
                            revision_id,
                            region_len = text.len(),
                            ceiling = self.config.table_max_chars,
                            "table region exceeds ceiling, truncating"
                        );
                        let ordinal = chunks.len() as i64;
                        chunks.push(make_chunk(
                            revision_id,
                            ordinal,
                            ChunkKind::Table,
                            text[..cut].trim_end(),
                            title,
                            category,
                            true,
                        ));
                        for piece in self.split_prose(&text[cut..]) {
                            let ordinal = chunks.len() as i64;
                            chunks.push(make_chunk(
                                revision_id,
                                ordinal,
                                ChunkKind::Prose,
                                &piece,
                                None,
                                None,
                                false,
                            ));
                        }
                    } else {
                        let ordinal = chunks.len() as i64;
                        chunks.push(make_chunk(
                            revision_id,
                            ordinal,
                            ChunkKind::Table,
                            &text,
                            title,
                            category,
                            false,
                        ));
                    }
                }
                Segment::Prose(text) => {
                    for piece in self.split_prose(&text) {
                        let ordinal = chunks.len() as i64;
                        chunks.push(make_chunk(
                            revision_id,
                            ordinal,
                            ChunkKind::Prose,
                            &piece,
                            None,
                            None,
                            false,
                        ));
                    }
                }
            }
        }

        debug!(
            revision_id,
            total = chunks.len(),
            tables = chunks.iter().filter(|c| c.kind == ChunkKind::Table).count(),
            "chunked revision"
        );

        chunks
    }

    fn detect_regions(&self, lines: &[&str]) -> Vec<TableRegion> {
        let mut regions = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];

            if self.detector.is_table_heading(line) {
                let (end, category) = self.scan_keyword_region(lines, i + 1);
                if has_content(lines, i + 1, end) {
                    regions.push(TableRegion {
                        start: i,
                        end,
                        title: Some(line.trim().to_string()),
                        category,
                    });
                    i = end;
                    continue;
                }
            } else if self.detector.is_row(line) {
                let sep = sep_count(line);
                let mut j = i + 1;
                while j < lines.len() && self.detector.is_row(lines[j]) && sep_count(lines[j]) == sep
                {
                    j += 1;
                }
                if j - i >= self.config.min_table_rows {
                    let end = self.scan_row_region(lines, j, sep);
                    regions.push(TableRegion {
                        start: i,
                        end,
                        title: preceding_heading(lines, i),
                        category: None,
                    });
                    i = end;
                    continue;
                }
            }

            i += 1;
        }

        regions
    }

    /// Extend a keyword-headed region: rows, category labels, and text
    /// under a recognized category all continue it. The region ends at the
    /// next table heading or after more than one consecutive line that
    /// breaks the pattern; a single malformed row is tolerated.
    fn scan_keyword_region(&self, lines: &[&str], from: usize) -> (usize, Option<String>) {
        let mut end = from;
        let mut breaks = 0;
        let mut in_category = false;
        let mut category: Option<String> = None;
        let mut j = from;

        while j < lines.len() {
            let line = lines[j];
            if self.detector.is_table_heading(line) {
                break;
            }
            if let Some(label) = self.detector.category_label(line) {
                if category.is_none() {
                    category = Some(label);
                }
                in_category = true;
                breaks = 0;
                end = j + 1;
            } else if self.detector.is_row(line) {
                breaks = 0;
                end = j + 1;
            } else if line.trim().is_empty() {
                breaks += 1;
                if breaks > 1 {
                    break;
                }
            } else if in_category {
                breaks = 0;
                end = j + 1;
            } else {
                breaks += 1;
                if breaks > 1 {
                    break;
                }
            }
            j += 1;
        }

        (end, category)
    }

    /// Extend a row-pattern region past `from`, tolerating one malformed
    /// row between consistent ones.
    fn scan_row_region(&self, lines: &[&str], from: usize, sep: usize) -> usize {
        let mut end = from;
        let mut breaks = 0;
        let mut j = from;

        while j < lines.len() {
            let line = lines[j];
            if self.detector.is_row(line) && sep_count(line) == sep {
                breaks = 0;
                end = j + 1;
            } else {
                breaks += 1;
                if breaks > 1 {
                    break;
                }
            }
            j += 1;
        }

        end
    }

    /// Split prose into pieces of at most `max_chars`, then apply the
    /// overlap window. The overlap is drawn from the raw previous piece of
    /// the same region, so it never crosses into an adjacent table chunk.
    fn split_prose(&self, text: &str) -> Vec<String> {
        let pieces = self.split_prose_raw(text);
        if self.config.overlap_chars == 0 || pieces.len() < 2 {
            return pieces;
        }

        let mut result = Vec::with_capacity(pieces.len());
        for (i, piece) in pieces.iter().enumerate() {
            if i == 0 {
                result.push(piece.clone());
                continue;
            }
            let prev = &pieces[i - 1];
            let overlap = tail_overlap(prev, self.config.overlap_chars);
            if overlap.is_empty() {
                result.push(piece.clone());
            } else {
                result.push(format!("{}\n{}", overlap, piece));
            }
        }
        result
    }

    fn split_prose_raw(&self, text: &str) -> Vec<String> {
        let max_chars = self.config.max_chars;
        let mut pieces: Vec<String> = Vec::new();
        let mut buf = String::new();

        for para in text.split("\n\n") {
            let trimmed = para.trim();
            if trimmed.is_empty() {
                continue;
            }

            let would_be = if buf.is_empty() {
                trimmed.len()
            } else {
                buf.len() + 2 + trimmed.len()
            };

            if would_be > max_chars && !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }

            if trimmed.len() > max_chars {
                if !buf.is_empty() {
                    pieces.push(std::mem::take(&mut buf));
                }
                // Hard split at max_chars, preferring a line or word boundary
                let mut remaining = trimmed;
                while !remaining.is_empty() {
                    let split_at = floor_char_boundary(remaining, remaining.len().min(max_chars));
                    let actual = if split_at < remaining.len() {
                        remaining[..split_at]
                            .rfind('\n')
                            .or_else(|| remaining[..split_at].rfind(' '))
                            .map(|pos| pos + 1)
                            .filter(|&pos| pos > 0)
                            .unwrap_or(split_at)
                    } else {
                        split_at
                    };
                    pieces.push(remaining[..actual].trim().to_string());
                    remaining = &remaining[actual..];
                }
            } else {
                if !buf.is_empty() {
                    buf.push_str("\n\n");
                }
                buf.push_str(trimmed);
            }
        }

        if !buf.is_empty() {
            pieces.push(buf);
        }

        pieces.retain(|p| !p.trim().is_empty());
        pieces
    }
}

fn build_segments(lines: &[&str], regions: Vec<TableRegion>) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for region in regions {
        if region.start > cursor {
            let prose = lines[cursor..region.start].join("\n");
            if !prose.trim().is_empty() {
                segments.push(Segment::Prose(prose));
            }
        }
        let text = lines[region.start..region.end].join("\n").trim().to_string();
        segments.push(Segment::Table {
            text,
            title: region.title,
            category: region.category,
        });
        cursor = region.end;
    }

    if cursor < lines.len() {
        let prose = lines[cursor..].join("\n");
        if !prose.trim().is_empty() {
            segments.push(Segment::Prose(prose));
        }
    }

    segments
}

fn make_chunk(
    revision_id: &str,
    ordinal: i64,
    kind: ChunkKind,
    text: &str,
    title: Option<String>,
    category: Option<String>,
    degraded: bool,
) -> Chunk {
    Chunk {
        id: Chunk::make_id(revision_id, ordinal),
        revision_id: revision_id.to_string(),
        ordinal,
        kind,
        text: text.to_string(),
        title,
        category,
        degraded,
    }
}

fn has_content(lines: &[&str], from: usize, to: usize) -> bool {
    lines[from.min(lines.len())..to.min(lines.len())]
        .iter()
        .any(|l| !l.trim().is_empty())
}

/// Nearest non-empty line within two lines above a row-pattern start,
/// taken as the table title when it is short enough to be a heading.
fn preceding_heading(lines: &[&str], start: usize) -> Option<String> {
    lines[start.saturating_sub(2)..start]
        .iter()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
        .filter(|l| l.len() <= 100)
}

fn sep_count(line: &str) -> usize {
    line.matches('|').count()
}

/// Last `max` bytes of `prev`, adjusted to a char boundary and trimmed to
/// start on a word.
fn tail_overlap(prev: &str, max: usize) -> String {
    let start = floor_char_boundary(prev, prev.len().saturating_sub(max));
    let tail = &prev[start..];
    let word_start = tail
        .find(char::is_whitespace)
        .map(|pos| pos + 1)
        .unwrap_or(0);
    tail[word_start.min(tail.len())..].trim().to_string()
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
