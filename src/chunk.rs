//! Fixed-window text chunker.
//!
//! Splits text into windows of at most `max_chars` characters, each window
//! starting `max_chars - overlap` characters after the previous one. The last
//! window always ends at the end of the text. Offsets count Unicode scalar
//! values, so windows never split a UTF-8 sequence.

use crate::config::ChunkConfig;
use crate::error::{Error, Result};

/// Split `text` into overlapping windows.
///
/// Requires `0 < max_chars` and `overlap < max_chars`; anything else would
/// stop the window from advancing and is rejected as a configuration error.
/// Empty input yields no chunks.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Result<Vec<String>> {
    if max_chars == 0 {
        return Err(Error::config("chunk max_chars must be > 0"));
    }
    if overlap >= max_chars {
        return Err(Error::config(format!(
            "chunk overlap ({}) must be smaller than max_chars ({})",
            overlap, max_chars
        )));
    }

    // Byte offset of every char boundary, including the end of the text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < n {
        let end = (start + max_chars).min(n);
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());
        if end == n {
            break;
        }
        start = end - overlap;
    }

    Ok(chunks)
}

/// [`chunk_text`] with parameters taken from configuration.
pub fn chunk_with(text: &str, config: &ChunkConfig) -> Result<Vec<String>> {
    chunk_text(text, config.max_chars, config.overlap)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Undo the overlap between consecutive windows.
    fn stitch(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(c);
            } else {
                out.extend(c.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1200, 200).unwrap();
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_exact_window_is_single_chunk() {
        let text = "a".repeat(1200);
        let chunks = chunk_text(&text, 1200, 200).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_2500_chars_gives_three_chunks() {
        let text: String = (0..2500).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        let chunks = chunk_text(&text, 1200, 200).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 1200);
        assert_eq!(chunks[1].chars().count(), 1200);
        // Third window starts at 2000.
        assert_eq!(chunks[2].chars().count(), 500);
        assert!(text.ends_with(chunks[2].as_str()));
    }

    #[test]
    fn test_overlap_is_shared_between_neighbours() {
        let text: String = (0..50).map(|i| char::from(b'0' + (i % 10) as u8)).collect();
        let chunks = chunk_text(&text, 20, 5).unwrap();
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(15).collect();
            let head: String = pair[1].chars().take(5).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_stitching_reconstructs_text() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(17);
        for (max, overlap) in [(10, 0), (10, 9), (64, 16), (1000, 1)] {
            let chunks = chunk_text(&text, max, overlap).unwrap();
            assert_eq!(stitch(&chunks, overlap), text, "max={} overlap={}", max, overlap);
            assert!(text.ends_with(chunks.last().unwrap().as_str()));
        }
    }

    #[test]
    fn test_multibyte_characters() {
        let text = "héllo wörld ünïcödé ".repeat(10);
        let chunks = chunk_text(&text, 7, 2).unwrap();
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
        assert_eq!(stitch(&chunks, 2), text);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta".repeat(20);
        let c1 = chunk_text(&text, 33, 7).unwrap();
        let c2 = chunk_text(&text, 33, 7).unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_overlap_not_smaller_than_max_rejected() {
        assert!(matches!(
            chunk_text("abc", 10, 10),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            chunk_text("abc", 10, 11),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(chunk_text("abc", 0, 0), Err(Error::Configuration(_))));
    }
}
