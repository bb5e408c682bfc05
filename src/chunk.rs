//! Recursive separator text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters.
//! The most semantic separator present in the text is tried first (paragraph,
//! then line, sentence, word); any piece still too large is re-split with the
//! next separator. An empty separator cuts between characters. When the list
//! is exhausted without an empty separator, an oversized piece (a single long
//! word, say) is emitted as its own chunk.
//!
//! Adjacent pieces are merged greedily up to `chunk_size`, and each new chunk
//! restarts from the tail of the previous one so that up to `chunk_overlap`
//! characters are shared across the boundary.
//!
//! All work is done on byte ranges of the input, so every chunk records where
//! it starts and no text other than surrounding whitespace is ever dropped.

use std::collections::VecDeque;
use std::ops::Range;
use std::path::Path;

use crate::config::ChunkingConfig;
use crate::extract::TextUnit;
use crate::models::{Chunk, ChunkMetadata};
use crate::validate::{file_name, normalized_extension};

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            chunk_overlap: config.chunk_overlap,
            separators: config.separators.clone(),
        }
    }

    /// Split text into trimmed, non-empty byte ranges in document order.
    pub fn split_ranges(&self, text: &str) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        self.split_recursive(text, 0..text.len(), &self.separators, &mut out);
        out
    }

    /// Chunk the text of one document, tagging each chunk with its source.
    ///
    /// Empty or whitespace-only text produces no chunks.
    pub fn chunk(&self, text: &str, source: &Path) -> Vec<Chunk> {
        self.chunk_units(
            &[TextUnit {
                text: text.to_string(),
                page: None,
            }],
            source,
        )
    }

    /// Chunk each unit of a document on its own. Chunks never span units;
    /// `chunk_index` runs across the whole document and `page` comes from
    /// the unit.
    pub fn chunk_units(&self, units: &[TextUnit], source: &Path) -> Vec<Chunk> {
        let filename = file_name(source);
        let file_type = normalized_extension(source);
        let source = source.to_string_lossy().to_string();

        let mut chunks = Vec::new();
        for unit in units {
            for range in self.split_ranges(&unit.text) {
                chunks.push(Chunk {
                    text: unit.text[range.clone()].to_string(),
                    start: range.start,
                    metadata: ChunkMetadata {
                        source: source.clone(),
                        filename: filename.clone(),
                        file_type: file_type.clone(),
                        chunk_index: chunks.len(),
                        page: unit.page,
                    },
                });
            }
        }
        chunks
    }

    fn split_recursive(
        &self,
        text: &str,
        range: Range<usize>,
        separators: &[String],
        out: &mut Vec<Range<usize>>,
    ) {
        let Some(last) = separators.last() else {
            push_trimmed(text, range, out);
            return;
        };

        let piece = &text[range.clone()];
        let mut separator = last.as_str();
        let mut remaining: &[String] = &[];
        for (i, s) in separators.iter().enumerate() {
            if s.is_empty() {
                separator = "";
                break;
            }
            if piece.contains(s.as_str()) {
                separator = s;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good: Vec<Range<usize>> = Vec::new();
        for split in split_keeping_separator(piece, separator, range.start) {
            if char_len(text, &split) < self.chunk_size {
                good.push(split);
                continue;
            }
            if !good.is_empty() {
                self.merge(text, &good, out);
                good.clear();
            }
            if remaining.is_empty() {
                push_trimmed(text, split, out);
            } else {
                self.split_recursive(text, split, remaining, out);
            }
        }
        if !good.is_empty() {
            self.merge(text, &good, out);
        }
    }

    /// Greedily merge contiguous small pieces into chunks, carrying overlap.
    fn merge(&self, text: &str, splits: &[Range<usize>], out: &mut Vec<Range<usize>>) {
        let mut current: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(text, split);
            if total + len > self.chunk_size {
                if let Some(span) = span_of(&current) {
                    push_trimmed(text, span, out);
                    while total > self.chunk_overlap
                        || (total + len > self.chunk_size && total > 0)
                    {
                        match current.pop_front() {
                            Some((_, popped)) => total -= popped,
                            None => break,
                        }
                    }
                }
            }
            current.push_back((split.clone(), len));
            total += len;
        }

        if let Some(span) = span_of(&current) {
            push_trimmed(text, span, out);
        }
    }
}

fn span_of(pieces: &VecDeque<(Range<usize>, usize)>) -> Option<Range<usize>> {
    let first = pieces.front()?;
    let last = pieces.back()?;
    Some(first.0.start..last.0.end)
}

/// Split `piece` on `separator`, keeping each separator at the start of the
/// piece that follows it. Ranges are offset by `base` and never empty.
fn split_keeping_separator(piece: &str, separator: &str, base: usize) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return piece
            .char_indices()
            .map(|(i, c)| base + i..base + i + c.len_utf8())
            .collect();
    }

    let mut ranges = Vec::new();
    let mut start = 0;
    for (pos, _) in piece.match_indices(separator) {
        if pos > start {
            ranges.push(base + start..base + pos);
        }
        start = pos;
    }
    if start < piece.len() {
        ranges.push(base + start..base + piece.len());
    }
    ranges
}

fn push_trimmed(text: &str, range: Range<usize>, out: &mut Vec<Range<usize>>) {
    let slice = &text[range.clone()];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let start = range.start + (slice.len() - slice.trim_start().len());
    out.push(start..start + trimmed.len());
}

fn char_len(text: &str, range: &Range<usize>) -> usize {
    text[range.clone()].chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize, separators: &[&str]) -> Chunker {
        Chunker::new(&ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            separators: separators.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn default_chunker(size: usize, overlap: usize) -> Chunker {
        chunker(size, overlap, &["\n\n", "\n", ". ", " ", ""])
    }

    fn texts(c: &Chunker, text: &str) -> Vec<String> {
        c.split_ranges(text)
            .into_iter()
            .map(|r| text[r].to_string())
            .collect()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = default_chunker(100, 20).chunk("  Hello, world!\n", Path::new("/d/a.txt"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].start, 2);
        assert_eq!(chunks[0].metadata.chunk_index, 0);
        assert_eq!(chunks[0].metadata.filename, "a.txt");
        assert_eq!(chunks[0].metadata.file_type, ".txt");
        assert_eq!(chunks[0].metadata.source, "/d/a.txt");
        assert_eq!(chunks[0].metadata.page, None);
    }

    #[test]
    fn test_pages_chunked_separately() {
        let units = vec![
            TextUnit {
                text: "Page one intro.\n\nPage one body.".to_string(),
                page: Some(1),
            },
            TextUnit {
                text: "   ".to_string(),
                page: Some(2),
            },
            TextUnit {
                text: "Page three only.".to_string(),
                page: Some(3),
            },
        ];
        let chunks = default_chunker(100, 10).chunk_units(&units, Path::new("/d/paper.PDF"));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Page one intro.\n\nPage one body.");
        assert_eq!(chunks[0].metadata.page, Some(1));
        assert_eq!(chunks[1].text, "Page three only.");
        assert_eq!(chunks[1].metadata.page, Some(3));
        assert_eq!(chunks[1].start, 0);
        assert_eq!(chunks[1].metadata.chunk_index, 1);
        assert_eq!(chunks[1].metadata.file_type, ".pdf");
    }

    #[test]
    fn test_empty_text() {
        let c = default_chunker(100, 20);
        assert!(c.chunk("", Path::new("a.md")).is_empty());
        assert!(c.chunk(" \n\n\t ", Path::new("a.md")).is_empty());
    }

    #[test]
    fn test_short_inputs_yield_themselves() {
        let c = default_chunker(200, 50);
        for text in [
            "one",
            "First paragraph.\n\nSecond paragraph.",
            "line one\nline two\nline three",
            "no-separators-at-all",
        ] {
            assert_eq!(texts(&c, text), vec![text.to_string()]);
        }
    }

    #[test]
    fn test_paragraphs_preferred() {
        let text = "Alpha alpha alpha.\n\nBeta beta beta.\n\nGamma gamma gamma.";
        let out = texts(&default_chunker(20, 0), text);
        assert_eq!(
            out,
            vec!["Alpha alpha alpha.", "Beta beta beta.", "Gamma gamma gamma."]
        );
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let text = (0..200)
            .map(|i| format!("Sentence number {} talks about topic {}.", i, i % 7))
            .collect::<Vec<_>>()
            .join(" ");
        let c = default_chunker(120, 30);
        let out = texts(&c, &text);
        assert!(out.len() > 1);
        for chunk in &out {
            assert!(chunk.chars().count() <= 120, "oversized chunk: {}", chunk);
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = (0..100)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let c = default_chunker(50, 10);
        let ranges = c.split_ranges(&text);
        assert!(ranges.len() > 2);
        for pair in ranges.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            assert!(next.start > prev.start);
            assert!(next.start < prev.end, "expected overlap between chunks");
            assert!(prev.end - next.start <= 10);
        }
    }

    #[test]
    fn test_no_text_lost() {
        let text = "Intro line.\nSecond line here.\n\nA much longer paragraph that keeps \
            going with many words so that it must be split across several chunks. \
            It has sentences. Several of them. And a verylongtokenthatexceedsthechunksizeforsure.\n\n\
            Closing words.";
        for (size, overlap) in [(30, 0), (30, 10), (64, 16), (500, 100)] {
            let c = default_chunker(size, overlap);
            let ranges = c.split_ranges(text);
            let mut covered = vec![false; text.len()];
            for r in &ranges {
                for b in r.clone() {
                    covered[b] = true;
                }
            }
            for (i, ch) in text.char_indices() {
                if !ch.is_whitespace() {
                    assert!(covered[i], "byte {} ({:?}) lost at size {}", i, ch, size);
                }
            }
            // stitching chunks with overlap removed gives the original text;
            // anything between chunks is whitespace
            let mut rebuilt = String::new();
            let mut end = 0;
            for r in &ranges {
                let from = r.start.max(end);
                if from > end {
                    assert!(text[end..from].trim().is_empty());
                    rebuilt.push_str(&text[end..from]);
                }
                if r.end > from {
                    rebuilt.push_str(&text[from..r.end]);
                }
                end = end.max(r.end);
            }
            assert!(text[end..].trim().is_empty());
            rebuilt.push_str(&text[end..]);
            assert_eq!(rebuilt, text);
        }
    }

    #[test]
    fn test_long_word_emitted_whole_without_char_separator() {
        let word = "x".repeat(30);
        let text = format!("short {} end", word);
        let out = texts(&chunker(10, 0, &["\n\n", "\n", " "]), &text);
        assert_eq!(out, vec!["short".to_string(), word, "end".to_string()]);
    }

    #[test]
    fn test_long_word_hard_cut_with_char_separator() {
        let text = "y".repeat(35);
        let out = texts(&default_chunker(10, 0), &text);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(out.concat(), text);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "café résumé naïve ".repeat(20);
        let c = default_chunker(25, 5);
        for chunk in texts(&c, &text) {
            assert!(chunk.chars().count() <= 25);
        }
    }

    #[test]
    fn test_indices_contiguous_and_deterministic() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let c = default_chunker(60, 15);
        let a = c.chunk(&text, Path::new("notes.md"));
        let b = c.chunk(&text, Path::new("notes.md"));
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert_eq!(x.metadata.chunk_index, i);
            assert_eq!(x.text, y.text);
            assert_eq!(x.start, y.start);
            assert_eq!(&text[x.start..x.start + x.text.len()], x.text);
        }
    }
}
