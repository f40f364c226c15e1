//! Sentence segmentation for chunked synthesis.

const TERMINATORS: &[char] = &['.', '!', '?', '…', '。', '！', '？'];
const CLOSERS: &[char] = &['"', '\'', ')', ']', '”', '’', '」'];

/// Splits `text` into sentence chunks.
///
/// A chunk ends at sentence-final punctuation. A run of terminators (`?!`, `...`) and any
/// closing quote right after it stay with the chunk they end. A `.` between two digits is a
/// decimal point, not a boundary. Text after the last terminator becomes a final chunk.
/// Chunks are trimmed and never empty; a fragment with no letters or digits is folded into
/// the chunk before it so nothing is dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let next = chars.peek().copied();
        let decimal_point = c == '.'
            && prev.is_some_and(|p| p.is_ascii_digit())
            && next.is_some_and(|n| n.is_ascii_digit());
        prev = Some(c);

        if TERMINATORS.contains(&c) && !decimal_point {
            while let Some(&next) = chars.peek() {
                if TERMINATORS.contains(&next) || CLOSERS.contains(&next) {
                    current.push(next);
                    prev = Some(next);
                    chars.next();
                } else {
                    break;
                }
            }
            push_chunk(&mut chunks, &mut current);
        }
    }
    push_chunk(&mut chunks, &mut current);
    chunks
}

fn push_chunk(chunks: &mut Vec<String>, current: &mut String) {
    let chunk = current.trim();
    if !chunk.is_empty() {
        let speakable = chunk.chars().any(char::is_alphanumeric);
        match chunks.last_mut() {
            Some(last) if !speakable => {
                last.push(' ');
                last.push_str(chunk);
            }
            _ => chunks.push(chunk.to_string()),
        }
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_fragment_without_punctuation_is_one_chunk() {
        assert_eq!(
            split_sentences("Your heart rate is seventy two"),
            vec!["Your heart rate is seventy two"]
        );
    }

    #[test]
    fn n_terminators_and_a_fragment_yield_n_plus_one_chunks() {
        let text = "Good morning. Did you sleep well? Your pressure looks fine! Remember to drink water";
        let chunks = split_sentences(text);
        assert_eq!(
            chunks,
            vec![
                "Good morning.",
                "Did you sleep well?",
                "Your pressure looks fine!",
                "Remember to drink water",
            ]
        );
        assert!(chunks.iter().all(|c| !c.is_empty()));
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn terminator_runs_and_quotes_stay_together() {
        assert_eq!(
            split_sentences("Really?! He said \"stop.\" Then left..."),
            vec!["Really?!", "He said \"stop.\"", "Then left..."]
        );
    }

    #[test]
    fn decimals_are_not_boundaries() {
        assert_eq!(
            split_sentences("Your temperature is 36.6 degrees. That is normal."),
            vec!["Your temperature is 36.6 degrees.", "That is normal."]
        );
    }

    #[test]
    fn boundaries_do_not_need_whitespace() {
        assert_eq!(split_sentences("One.Two"), vec!["One.", "Two"]);
    }

    #[test]
    fn stray_punctuation_folds_into_previous_chunk() {
        assert_eq!(split_sentences("Okay. . ."), vec!["Okay. . ."]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   \n ").is_empty());
    }

    #[test]
    fn cjk_punctuation_is_recognised() {
        assert_eq!(split_sentences("你好。再见！"), vec!["你好。", "再见！"]);
    }
}
