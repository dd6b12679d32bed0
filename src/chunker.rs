//! Heading- and window-based document chunker.
//!
//! Splits a document's raw text into [`Chunk`]s suitable for independent
//! retrieval. Markdown documents split primarily at heading boundaries;
//! each section becomes a candidate chunk, and oversized sections are
//! re-split into windows of whole lines. Plain text documents are
//! windowed directly.
//!
//! # Algorithm
//!
//! 1. Split the body into lines (1-based numbering).
//! 2. Markdown: open a new section at every `#` heading line; the heading
//!    text becomes the section label, text before the first heading forms
//!    an unlabeled preamble section. Plain text: one unlabeled section.
//! 3. Window each section greedily on whole-line boundaries so that no
//!    window exceeds `max_chunk_chars`. A single line longer than the
//!    limit is emitted as its own oversized window, never truncated.
//! 4. Prefix every chunk after the first with the trailing slice of the
//!    previous chunk's original lines containing its last
//!    `overlap_lines` non-empty lines, moving `line_start` backward to
//!    the slice's original position. Sentences and code straddling a
//!    split stay searchable from both sides.
//!
//! Chunking is a pure function of `(document, config)`: re-invoking it on
//! the same input yields an identical sequence. Malformed input never
//! fails; the worst case is a single chunk spanning the whole document.

use crate::config::ChunkingConfig;
use crate::models::{Chunk, FormatHint, SourceDocument};

/// A contiguous run of body lines under one heading label.
struct Section {
    label: String,
    /// Half-open range of 0-based indices into the document's line list,
    /// excluding the heading line itself.
    start: usize,
    end: usize,
}

/// Split one document into an ordered chunk sequence.
///
/// An empty or whitespace-only document yields an empty sequence.
pub fn chunk_document(doc: &SourceDocument, cfg: &ChunkingConfig) -> Vec<Chunk> {
    if doc.body.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = doc.body.lines().collect();

    let sections = match doc.format {
        FormatHint::Markdown => split_markdown_sections(&lines),
        FormatHint::PlainText => vec![Section {
            label: String::new(),
            start: 0,
            end: lines.len(),
        }],
    };

    let mut chunks: Vec<Chunk> = Vec::new();
    // Previous emitted window: its original (pre-overlap) lines and the
    // 1-based number of its last line. Overlap never crosses documents.
    let mut prev: Option<(Vec<String>, u32)> = None;

    for section in &sections {
        let body = &lines[section.start..section.end];

        for (win_start, win_end) in windows(body, cfg.max_chunk_chars) {
            let win_lines = &body[win_start..win_end];
            if win_lines.iter().all(|l| l.trim().is_empty()) {
                continue;
            }

            let first_line = (section.start + win_start + 1) as u32;
            let last_line = (section.start + win_end) as u32;

            let mut content_lines: Vec<&str> = Vec::new();
            let mut line_start = first_line;

            if cfg.overlap_lines > 0 {
                if let Some((prev_lines, prev_last_line)) = &prev {
                    let tail_from = overlap_tail_index(prev_lines, cfg.overlap_lines);
                    let tail = &prev_lines[tail_from..];
                    line_start = prev_last_line - tail.len() as u32 + 1;
                    content_lines.extend(tail.iter().map(|l| l.as_str()));
                }
            }
            content_lines.extend(win_lines.iter().copied());

            chunks.push(Chunk {
                source: doc.source.clone(),
                section: section.label.clone(),
                content: content_lines.join("\n"),
                line_start,
                line_end: last_line,
                indexed_at: doc.indexed_at,
            });

            prev = Some((
                win_lines.iter().map(|l| l.to_string()).collect(),
                last_line,
            ));
        }
    }

    chunks
}

/// Split lines into heading-delimited sections.
///
/// Every heading line opens a new section; the text before the first
/// heading becomes an unlabeled preamble section. Heading lines are not
/// part of any section body (the label carries their text).
fn split_markdown_sections(lines: &[&str]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut label = String::new();
    let mut body_start = 0;

    for (i, line) in lines.iter().enumerate() {
        if let Some(heading) = heading_label(line) {
            sections.push(Section {
                label: std::mem::take(&mut label),
                start: body_start,
                end: i,
            });
            label = heading;
            body_start = i + 1;
        }
    }

    sections.push(Section {
        label,
        start: body_start,
        end: lines.len(),
    });

    sections
}

/// Parse a heading line (`#`-prefixed) into its label text.
fn heading_label(line: &str) -> Option<String> {
    if !line.starts_with('#') {
        return None;
    }
    let hashes = line.chars().take_while(|c| *c == '#').count();
    let rest = &line[hashes..];
    if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t') {
        Some(rest.trim().to_string())
    } else {
        None
    }
}

/// Greedily split lines into half-open index windows so no window exceeds
/// `max_chars` (bytes of content plus joining newlines).
///
/// A single line longer than `max_chars` becomes its own window.
fn windows(lines: &[&str], max_chars: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut size = 0usize;

    for (i, line) in lines.iter().enumerate() {
        let addition = if size == 0 {
            line.len()
        } else {
            line.len() + 1
        };

        if size > 0 && size + addition > max_chars {
            out.push((start, i));
            start = i;
            size = line.len();
        } else {
            size += addition;
        }
    }

    if start < lines.len() {
        out.push((start, lines.len()));
    }

    out
}

/// Index of the first line of the overlap tail: the slice of `lines`
/// that contains the last `n` non-empty lines.
fn overlap_tail_index(lines: &[String], n: usize) -> usize {
    let mut non_empty = 0;
    for (i, line) in lines.iter().enumerate().rev() {
        if !line.trim().is_empty() {
            non_empty += 1;
            if non_empty == n {
                return i;
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source: &str, body: &str, format: FormatHint) -> SourceDocument {
        SourceDocument {
            source: source.to_string(),
            body: body.to_string(),
            format,
            indexed_at: None,
        }
    }

    fn cfg(max_chunk_chars: usize, overlap_lines: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chunk_chars,
            overlap_lines,
        }
    }

    #[test]
    fn test_empty_document_yields_no_chunks() {
        let chunks = chunk_document(&doc("d", "", FormatHint::Markdown), &cfg(2000, 4));
        assert!(chunks.is_empty());

        let chunks = chunk_document(&doc("d", "  \n\n \t\n", FormatHint::PlainText), &cfg(2000, 4));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_small_plain_text_single_chunk() {
        let chunks = chunk_document(&doc("d", "Hello, world!", FormatHint::PlainText), &cfg(2000, 4));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Hello, world!");
        assert_eq!(chunks[0].section, "");
        assert_eq!(chunks[0].line_start, 1);
        assert_eq!(chunks[0].line_end, 1);
    }

    #[test]
    fn test_markdown_splits_at_headings() {
        let body = "intro text\n\n# Setup\ninstall the thing\n\n## Docker\nrun the container\n";
        let chunks = chunk_document(&doc("d", body, FormatHint::Markdown), &cfg(2000, 0));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].section, "");
        assert!(chunks[0].content.contains("intro text"));
        assert_eq!(chunks[1].section, "Setup");
        assert!(chunks[1].content.contains("install the thing"));
        assert_eq!(chunks[2].section, "Docker");
        assert!(chunks[2].content.contains("run the container"));
    }

    #[test]
    fn test_hash_without_space_is_not_a_heading() {
        let body = "# Real\n#not-a-heading stays in the body\n";
        let chunks = chunk_document(&doc("d", body, FormatHint::Markdown), &cfg(2000, 0));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section, "Real");
        assert!(chunks[0].content.contains("#not-a-heading"));
    }

    #[test]
    fn test_line_numbers_are_one_based_inclusive() {
        let body = "a\n# H\nb\nc\n";
        let chunks = chunk_document(&doc("d", body, FormatHint::Markdown), &cfg(2000, 0));
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].line_start, chunks[0].line_end), (1, 1));
        assert_eq!((chunks[1].line_start, chunks[1].line_end), (3, 4));
    }

    #[test]
    fn test_oversized_section_splits_into_windows() {
        let body = format!("# Big\n{}\n{}\n{}\n", "x".repeat(30), "y".repeat(30), "z".repeat(30));
        let chunks = chunk_document(&doc("d", &body, FormatHint::Markdown), &cfg(40, 0));
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert_eq!(chunk.section, "Big");
        }
    }

    #[test]
    fn test_single_long_line_emitted_whole() {
        let long = "w".repeat(500);
        let body = format!("short\n{}\ntail", long);
        let chunks = chunk_document(&doc("d", &body, FormatHint::PlainText), &cfg(40, 0));
        assert!(chunks.iter().any(|c| c.content == long), "long line must survive untruncated");
    }

    #[test]
    fn test_overlap_prefixes_previous_lines() {
        let body = "l1\nl2\nl3\nl4\nl5\nl6\nl7\nl8\nl9\nl10\n";
        let chunks = chunk_document(&doc("d", body, FormatHint::PlainText), &cfg(14, 2));
        assert!(chunks.len() >= 2);

        for pair in chunks.windows(2) {
            let (first, second) = (&pair[0], &pair[1]);
            assert!(second.line_start > first.line_start);
            // Second chunk starts with the last 2 lines of the first
            // chunk's original (pre-overlap) content.
            let first_own: Vec<&str> = first
                .content
                .lines()
                .skip(first.content.lines().count().saturating_sub(2))
                .collect();
            let second_lines: Vec<&str> = second.content.lines().take(2).collect();
            assert_eq!(first_own, second_lines);
        }
    }

    #[test]
    fn test_overlap_counts_non_empty_lines() {
        let body = "a\nb\nc\nd\n\n\ne\nf\ng\nh\n";
        let chunks = chunk_document(&doc("d", body, FormatHint::PlainText), &cfg(12, 4));
        assert!(chunks.len() >= 2);
        let (first, second) = (&chunks[0], &chunks[1]);
        // First chunk has no overlap prefix, so its content is its
        // original content; its last 4 non-empty lines must open the
        // second chunk in order.
        let non_empty: Vec<&str> = first
            .content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        let last4 = &non_empty[non_empty.len() - 4..];
        let second_non_empty: Vec<&str> = second
            .content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(4)
            .collect();
        assert_eq!(last4, &second_non_empty[..]);
    }

    #[test]
    fn test_overlap_adjusts_line_start_backward() {
        let body = "l1\nl2\nl3\nl4\nl5\nl6\n";
        let chunks = chunk_document(&doc("d", body, FormatHint::PlainText), &cfg(8, 2));
        assert!(chunks.len() >= 2);
        let second = &chunks[1];
        let overlap_len = 2;
        assert_eq!(
            second.line_start,
            chunks[0].line_end - overlap_len + 1,
            "line_start must point at the overlap's original position"
        );
    }

    #[test]
    fn test_overlap_spans_heading_boundaries() {
        let body = "# One\nalpha\nbeta\n# Two\ngamma\n";
        let chunks = chunk_document(&doc("d", body, FormatHint::Markdown), &cfg(2000, 2));
        assert_eq!(chunks.len(), 2);
        let second = &chunks[1];
        let lines: Vec<&str> = second.content.lines().collect();
        assert_eq!(&lines[..2], &["alpha", "beta"]);
        assert_eq!(second.section, "Two");
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let body = "# A\none\ntwo\nthree\n# B\nfour\nfive\nsix\nseven\neight\n";
        let d = doc("d", body, FormatHint::Markdown);
        let c = cfg(16, 2);
        let first = chunk_document(&d, &c);
        let second = chunk_document(&d, &c);
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_duplicate_identity_tuples() {
        let body = "# S\na\nb\nc\nd\ne\nf\ng\nh\n# S\ni\nj\nk\nl\n";
        let chunks = chunk_document(&doc("d", body, FormatHint::Markdown), &cfg(6, 2));
        let mut seen = std::collections::HashSet::new();
        for chunk in &chunks {
            assert!(
                seen.insert((chunk.section.clone(), chunk.line_start, chunk.line_end)),
                "duplicate (section, line_start, line_end) tuple"
            );
        }
    }

    #[test]
    fn test_content_never_empty_after_trim() {
        let body = "# H\n\n\ntext\n\n\n# H2\n\nmore\n";
        let chunks = chunk_document(&doc("d", body, FormatHint::Markdown), &cfg(2000, 4));
        for chunk in &chunks {
            assert!(!chunk.content.trim().is_empty());
        }
    }

    #[test]
    fn test_indexed_at_propagates_to_chunks() {
        let mut d = doc("d", "# H\nbody\n", FormatHint::Markdown);
        let ts = chrono::Utc::now();
        d.indexed_at = Some(ts);
        let chunks = chunk_document(&d, &cfg(2000, 4));
        assert!(chunks.iter().all(|c| c.indexed_at == Some(ts)));
    }
}
