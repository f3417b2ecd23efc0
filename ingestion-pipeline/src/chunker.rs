//! Length-gated sentence chunking with overlap (spec.md §4.10).

/// Split `text` into chunks, windowing by sentences with overlap.
///
/// Rust's `regex` crate has no lookbehind, so the spec's sentence splitter
/// `(?<=[.!?])\s+` is reproduced by scanning for a `.`/`!`/`?` followed by
/// whitespace and cutting right after the punctuation.
pub fn chunk(
    text: &str,
    length_threshold: usize,
    sentences_per_chunk: usize,
    sentence_overlap: usize,
) -> Vec<String> {
    if text.len() <= length_threshold {
        return vec![text.trim().to_string()];
    }

    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return Vec::new();
    }

    let step = sentences_per_chunk.saturating_sub(sentence_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < sentences.len() {
        let end = (start + sentences_per_chunk).min(sentences.len());
        chunks.push(sentences[start..end].join(" "));
        if end == sentences.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Scan for sentence-ending punctuation followed by whitespace, cutting
/// immediately after the punctuation (the lookbehind-free equivalent of
/// `(?<=[.!?])\s+`). Trims each sentence and drops empties.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current_start = 0;
    let bytes = text.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        let byte = bytes[index];
        if byte == b'.' || byte == b'!' || byte == b'?' {
            let boundary = index + 1;
            let next_is_whitespace = text[boundary..].chars().next().is_some_and(char::is_whitespace);
            let at_end = boundary == text.len();
            if next_is_whitespace || at_end {
                let sentence = text[current_start..boundary].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                current_start = boundary;
            }
        }
        index += 1;
    }

    let tail = text[current_start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_returned_as_a_single_trimmed_chunk() {
        let result = chunk("  hello world  ", 500, 2, 1);
        assert_eq!(result, vec!["hello world".to_string()]);
    }

    #[test]
    fn e7_four_sentences_default_windowing() {
        let text = "S1. S2. S3. S4.";
        let result = chunk(text, 1, 2, 1);
        assert_eq!(result, vec!["S1. S2.", "S2. S3.", "S3. S4."]);
    }

    #[test]
    fn chunking_is_idempotent_when_under_threshold() {
        let text = "short";
        assert_eq!(chunk(text, 500, 2, 1), chunk(&chunk(text, 500, 2, 1)[0], 500, 2, 1));
    }

    #[test]
    fn chunking_is_stable_across_runs_when_over_threshold() {
        let text = "One. Two. Three. Four. Five.";
        let first = chunk(text, 1, 2, 1);
        let second = chunk(text, 1, 2, 1);
        assert_eq!(first, second);
    }

    #[test]
    fn splits_on_question_and_exclamation_marks() {
        let sentences = split_sentences("Really? Yes! Okay.");
        assert_eq!(sentences, vec!["Really?", "Yes!", "Okay."]);
    }

    #[test]
    fn drops_empty_sentences() {
        let sentences = split_sentences("One.   Two.");
        assert_eq!(sentences, vec!["One.", "Two."]);
    }
}
