//! Windowed chunking for prose documents.
//!
//! Factual memory files are split into overlapping character windows before
//! indexing, cutting on paragraph breaks where possible so chunks stay
//! readable on their own.

/// One chunk of a source document, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub index: usize,
}

/// Split `input` into windows of at most `chunk_size` characters, with
/// consecutive windows sharing roughly `overlap` characters. Cuts prefer a
/// blank line, then a newline, then a space, and never land inside a
/// multi-byte character.
pub fn chunk_text(input: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let text = input.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let size = chunk_size.max(1);
    let overlap = overlap.min(size.saturating_sub(1));

    // Byte offset of every char boundary, plus the end of the text.
    let mut bounds: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
    bounds.push(text.len());
    let total_chars = bounds.len() - 1;

    if total_chars <= size {
        return vec![Chunk {
            content: text.to_string(),
            index: 0,
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = (start + size).min(total_chars);
        let end = if hard_end < total_chars {
            seam_before(text, &bounds, start, hard_end)
        } else {
            hard_end
        };

        let piece = text[bounds[start]..bounds[end]].trim();
        if !piece.is_empty() {
            chunks.push(Chunk {
                content: piece.to_string(),
                index: chunks.len(),
            });
        }

        if end == total_chars {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// Find a cut point at or before `hard_end`, preferring paragraph breaks.
/// Never cuts before the middle of the window, so chunks cannot collapse
/// when the text has no usable seam.
fn seam_before(text: &str, bounds: &[usize], start: usize, hard_end: usize) -> usize {
    let window = &text[bounds[start]..bounds[hard_end]];
    let min_chars = ((hard_end - start) / 2).max(1);

    for separator in ["\n\n", "\n", " "] {
        if let Some(byte_pos) = window.rfind(separator) {
            let char_pos = window[..byte_pos].chars().count();
            if char_pos >= min_chars {
                return start + char_pos;
            }
        }
    }

    hard_end
}

/// First markdown heading in a chunk, with the `#` markers stripped.
pub fn first_heading(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let trimmed = line.trim_start();
        let stripped = trimmed.trim_start_matches('#');
        if stripped.len() < trimmed.len() && stripped.starts_with(' ') {
            Some(stripped.trim().to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_text("", 1000, 200).is_empty());
        assert!(chunk_text("   \n\n  ", 1000, 200).is_empty());
    }

    #[test]
    fn test_short_input_is_a_single_chunk() {
        let chunks = chunk_text("A short note.", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "A short note.");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn test_long_input_is_windowed_with_overlap() {
        let text = (0..60)
            .map(|i| format!("Paragraph {i} holds a few words of prose."))
            .collect::<Vec<_>>()
            .join("\n\n");

        let chunks = chunk_text(&text, 300, 60);
        assert!(chunks.len() > 2);

        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.content.chars().count() <= 300);
            assert_eq!(chunk.index, i);
        }

        // Nothing is lost: every paragraph label survives in some chunk,
        // since the overlap is wider than the label itself.
        let joined = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        for i in 0..60 {
            assert!(
                joined.contains(&format!("Paragraph {i}")),
                "missing paragraph {i}"
            );
        }
    }

    #[test]
    fn test_consecutive_chunks_share_text() {
        let text = "word ".repeat(400);
        let chunks = chunk_text(&text, 100, 30);
        assert!(chunks.len() > 1);

        for pair in chunks.windows(2) {
            let tail: String = pair[0]
                .content
                .chars()
                .rev()
                .take(10)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            assert!(
                pair[1].content.contains(tail.trim()),
                "no shared text between consecutive chunks"
            );
        }
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let text = "🦀 crabs and ferris 🦀 ".repeat(80);
        let chunks = chunk_text(&text, 64, 16);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 64);
        }
    }

    #[test]
    fn test_unbroken_text_still_makes_progress() {
        let text = "x".repeat(5000);
        let chunks = chunk_text(&text, 1000, 200);
        assert!(chunks.len() >= 5);
    }

    #[test]
    fn test_first_heading() {
        assert_eq!(
            first_heading("# Deploy notes\n\nbody"),
            Some("Deploy notes".to_string())
        );
        assert_eq!(
            first_heading("intro\n\n## Rollback steps\nmore"),
            Some("Rollback steps".to_string())
        );
        assert_eq!(first_heading("no heading anywhere"), None);
        assert_eq!(first_heading("#hashtag is not a heading"), None);
    }
}
