//! Recursive character chunker.
//!
//! Splits document text into segments of at most [`CHUNK_SIZE`] characters,
//! trying the coarsest separator first (paragraph break) and falling back to
//! finer ones (line break, sentence period, space, character window) only
//! where a candidate segment still exceeds the target. Adjacent segments
//! produced from one separator run overlap by up to [`CHUNK_OVERLAP`]
//! characters so context spanning a split point is not lost.
//!
//! Separators stay attached to the piece that precedes them, so the chunks
//! cover the input without losing a single character. Lengths are counted in
//! Unicode scalar values and slicing always lands on a char boundary.

/// Target chunk length in characters.
pub const CHUNK_SIZE: usize = 1200;

/// Characters carried over between adjacent chunks of one merge run.
pub const CHUNK_OVERLAP: usize = 150;

/// Separator cascade, coarsest first. The character-level sliding window is
/// the implicit final fallback.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ".", " "];

/// Split `text` into overlapping chunks.
///
/// Deterministic and stateless: the same input yields the same output on
/// every call. Empty input yields no chunks; input at or under
/// [`CHUNK_SIZE`] characters yields exactly one chunk equal to the input.
pub fn chunk(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if char_len(text) <= CHUNK_SIZE {
        return vec![text.to_string()];
    }
    split_level(text, 0)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split oversized `text` using the separator at `level`, recursing into
/// finer separators for any piece that alone exceeds the target.
fn split_level(text: &str, level: usize) -> Vec<String> {
    if level >= SEPARATORS.len() {
        return window_split(text);
    }

    let pieces = split_keep_separator(text, SEPARATORS[level]);
    if pieces.len() <= 1 {
        return split_level(text, level + 1);
    }

    let mut chunks = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    for piece in pieces {
        if char_len(piece) > CHUNK_SIZE {
            if !run.is_empty() {
                merge_run(&run, &mut chunks);
                run.clear();
            }
            chunks.extend(split_level(piece, level + 1));
        } else {
            run.push(piece);
        }
    }
    if !run.is_empty() {
        merge_run(&run, &mut chunks);
    }
    chunks
}

/// Greedily pack consecutive pieces into chunks of at most [`CHUNK_SIZE`]
/// characters. When a chunk is emitted, trailing pieces totalling at most
/// [`CHUNK_OVERLAP`] characters are carried into the next chunk.
fn merge_run(pieces: &[&str], chunks: &mut Vec<String>) {
    let mut buf: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);
        if total + len > CHUNK_SIZE && !buf.is_empty() {
            chunks.push(buf.iter().copied().collect());
            // Drop from the front until only the overlap window remains and
            // the incoming piece fits.
            while total > CHUNK_OVERLAP || (total + len > CHUNK_SIZE && total > 0) {
                let front = buf.pop_front().expect("buffer non-empty while total > 0");
                total -= char_len(front);
            }
        }
        buf.push_back(piece);
        total += len;
    }

    if !buf.is_empty() {
        chunks.push(buf.iter().copied().collect());
    }
}

/// Character-level sliding window: width [`CHUNK_SIZE`], stride
/// `CHUNK_SIZE - CHUNK_OVERLAP`. Used when no separator brings a segment
/// under the target.
fn window_split(text: &str) -> Vec<String> {
    let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let n = boundaries.len();
    let stride = CHUNK_SIZE - CHUNK_OVERLAP;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + CHUNK_SIZE).min(n);
        let byte_start = boundaries[start];
        let byte_end = if end == n { text.len() } else { boundaries[end] };
        chunks.push(text[byte_start..byte_end].to_string());
        if end == n {
            break;
        }
        start += stride;
    }
    chunks
}

/// Split on `sep`, keeping each separator attached to the piece before it,
/// so concatenating the pieces reproduces `text` exactly.
fn split_keep_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut search = 0usize;
    while let Some(pos) = text[search..].find(sep) {
        let end = search + pos + sep.len();
        pieces.push(&text[start..end]);
        start = end;
        search = end;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the chunks cover `text` contiguously: every chunk occurs in
    /// the input, starts no later than the end of what previous chunks
    /// covered, and together they reach the end. This is the no-character-
    /// loss property; it tolerates the overlap between adjacent chunks.
    fn assert_covers(text: &str, chunks: &[String]) {
        let bytes: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let total_chars = bytes.len();
        let char_at = |i: usize| if i == total_chars { text.len() } else { bytes[i] };

        let mut covered = 0usize; // char offset of the covered prefix end
        for (i, c) in chunks.iter().enumerate() {
            let c_len = c.chars().count();
            // Find the latest start <= covered where this chunk matches.
            let mut found = None;
            let mut start = covered.min(total_chars.saturating_sub(c_len));
            loop {
                if &text[char_at(start)..char_at(start + c_len)] == c.as_str() {
                    found = Some(start);
                    break;
                }
                if start == 0 {
                    break;
                }
                start -= 1;
            }
            let start = found.unwrap_or_else(|| panic!("chunk {} not found in input", i));
            assert!(start + c_len > covered, "chunk {} adds no new content", i);
            covered = start + c_len;
        }
        assert_eq!(covered, total_chars, "chunks do not cover the full input");
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk("").is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let text = "Hello, world!";
        assert_eq!(chunk(text), vec![text.to_string()]);

        let exact: String = "x".repeat(CHUNK_SIZE);
        assert_eq!(chunk(&exact), vec![exact.clone()]);
    }

    #[test]
    fn unbroken_text_uses_sliding_window() {
        let text = "a".repeat(2500);
        let chunks = chunk(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1200);
        assert_eq!(chunks[1].len(), 1200);
        assert_eq!(chunks[2].len(), 400);
        assert_covers(&text, &chunks);
    }

    #[test]
    fn paragraphs_merge_under_target() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        assert_eq!(chunk(text), vec![text.to_string()]);
    }

    #[test]
    fn long_document_splits_on_paragraphs() {
        let text = (0..80)
            .map(|i| format!("Paragraph number {} talks about topic {}.", i, i % 7))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= CHUNK_SIZE);
        }
        assert_covers(&text, &chunks);
    }

    #[test]
    fn adjacent_chunks_overlap() {
        let text = (0..200)
            .map(|i| format!("Sentence number {}.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk(&text);
        assert!(chunks.len() > 1);
        // Each chunk after the first starts with the tail of its predecessor.
        for pair in chunks.windows(2) {
            let prev = &pair[0];
            let next = &pair[1];
            let shared = (1..=CHUNK_OVERLAP.min(next.len()))
                .rev()
                .find(|&k| next.is_char_boundary(k) && prev.ends_with(&next[..k]));
            assert!(shared.is_some(), "no overlap between adjacent chunks");
        }
        assert_covers(&text, &chunks);
    }

    #[test]
    fn mixed_separators_are_lossless() {
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!("Heading {}\n", i));
            text.push_str(&"word ".repeat(300));
            text.push_str(&format!("Closing sentence {}. Tail {}.\n\n", i, i));
        }
        let chunks = chunk(&text);
        assert!(chunks.len() > 1);
        assert_covers(&text, &chunks);
    }

    #[test]
    fn multibyte_input_never_splits_a_char() {
        let text = "日本語のテキスト。".repeat(400);
        let chunks = chunk(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= CHUNK_SIZE);
        }
        assert_covers(&text, &chunks);
    }

    #[test]
    fn deterministic() {
        let text = (0..100)
            .map(|i| format!("Line {} of the document.", i))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(chunk(&text), chunk(&text));
    }
}
