//! Boundary-aware text chunking
//!
//! Windows are cut near `chunk_size` bytes, preferring a paragraph break, then a
//! sentence end, then whitespace, but only within the second half of the window so
//! chunks never collapse to fragments. Consecutive windows share `overlap` bytes.
//! The output is a pure function of `(text, chunk_size, overlap)`.

use sha2::Digest;
use sha2::Sha256;

use crate::models::Chunk;

/// Split `text` into overlapping chunks with byte offsets into `text`
#[must_use]
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);
    let len = text.len();

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < len {
        let window_end = floor_char_boundary(text, (start + chunk_size).min(len));
        let end = if window_end >= len {
            len
        } else {
            find_break(text, start, window_end, chunk_size)
        };
        // A window smaller than one char still has to advance
        let end = if end <= start {
            ceil_char_boundary(text, start + 1)
        } else {
            end
        };

        let raw = &text[start..end];
        let leading = raw.len() - raw.trim_start().len();
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                id: format!("chunk-{:04}", chunks.len()),
                text: trimmed.to_string(),
                start_offset: start + leading,
                end_offset: start + leading + trimmed.len(),
            });
        }

        if end >= len {
            break;
        }
        let next = ceil_char_boundary(text, end.saturating_sub(overlap));
        start = if next > start { next } else { end };
    }
    chunks
}

/// Best cut position in `(start, window_end]`, or `window_end` when none qualifies
fn find_break(text: &str, start: usize, window_end: usize, chunk_size: usize) -> usize {
    let window = &text[start..window_end];
    let min_cut = chunk_size / 2;

    if let Some(pos) = window.rfind("\n\n") {
        if pos >= min_cut {
            return start + pos + 2;
        }
    }

    let sentence_end = window
        .char_indices()
        .rev()
        .find(|&(i, c)| {
            matches!(c, '.' | '!' | '?')
                && window[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .is_some_and(char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8());
    if let Some(pos) = sentence_end {
        if pos >= min_cut {
            return start + pos;
        }
    }

    if let Some((pos, c)) = window.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
        if pos >= min_cut {
            return start + pos + c.len_utf8();
        }
    }

    window_end
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index.min(text.len())
}

/// Stable document id: first 16 hex chars of `sha256(user_id + content)`
#[must_use]
pub fn document_id(user_id: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(content.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(paragraphs: usize) -> String {
        (0..paragraphs)
            .map(|i| {
                format!(
                    "Paragraph {i} talks about topic {i}. It has a second sentence for padding. \
                     And a third one to make it longer."
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunk_text("  A short note.  ", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "chunk-0000");
        assert_eq!(chunks[0].text, "A short note.");
        assert_eq!(chunks[0].start_offset, 2);
        assert_eq!(chunks[0].end_offset, 15);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text("   \n\n  ", 100, 10).is_empty());
    }

    #[test]
    fn test_offsets_point_into_source() {
        let text = sample(10);
        for chunk in chunk_text(&text, 200, 40) {
            assert_eq!(&text[chunk.start_offset..chunk.end_offset], chunk.text);
            assert!(chunk.text.len() <= 200);
        }
    }

    #[test]
    fn test_prefers_paragraph_and_sentence_breaks() {
        let text = sample(6);
        let chunks = chunk_text(&text, 250, 0);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.text.ends_with('.'),
                "chunk should end on a sentence: {:?}",
                chunk.text
            );
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap_and_advance() {
        let text = "word ".repeat(200);
        let chunks = chunk_text(&text, 100, 30);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
            assert!(pair[1].start_offset < pair[0].end_offset);
        }
        assert_eq!(chunks.last().unwrap().end_offset, text.trim_end().len());
    }

    #[test]
    fn test_rechunking_is_identical() {
        let text = sample(20);
        assert_eq!(chunk_text(&text, 300, 50), chunk_text(&text, 300, 50));
    }

    #[test]
    fn test_multibyte_text_is_char_safe() {
        let text = "日本語のテキスト。".repeat(50);
        let chunks = chunk_text(&text, 64, 16);
        assert!(!chunks.is_empty());
        for chunk in chunks {
            assert_eq!(&text[chunk.start_offset..chunk.end_offset], chunk.text);
        }
    }

    #[test]
    fn test_document_id_is_stable_and_user_scoped() {
        let a = document_id("alice", "content");
        assert_eq!(a.len(), 16);
        assert_eq!(a, document_id("alice", "content"));
        assert_ne!(a, document_id("bob", "content"));
    }
}
