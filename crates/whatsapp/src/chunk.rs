/// Twilio rejects WhatsApp bodies longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 1600;

/// Splits `body` into pieces of at most `max_chars` characters, preferring to
/// cut at a line break, then at a space, and only mid-word as a last resort.
pub fn split_message(body: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = body.trim();

    while rest.chars().count() > max_chars {
        let limit =
            rest.char_indices().nth(max_chars).map(|(index, _)| index).unwrap_or(rest.len());
        let window = &rest[..limit];
        let half = limit / 2;
        let cut = window
            .rfind('\n')
            .filter(|&index| index > half)
            .or_else(|| window.rfind(char::is_whitespace).filter(|&index| index > 0))
            .unwrap_or(limit);

        let (head, tail) = rest.split_at(cut);
        chunks.push(head.trim_end().to_string());
        rest = tail.trim_start();
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::{split_message, MAX_MESSAGE_CHARS};

    #[test]
    fn short_messages_are_sent_whole() {
        assert_eq!(
            split_message("  Order confirmed.  ", MAX_MESSAGE_CHARS),
            vec!["Order confirmed."]
        );
        assert!(split_message("   ", MAX_MESSAGE_CHARS).is_empty());
    }

    #[test]
    fn long_messages_split_on_word_boundaries() {
        let chunks = split_message("alpha beta gamma delta", 11);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn line_breaks_are_preferred() {
        let chunks = split_message("first line here\nsecond", 18);
        assert_eq!(chunks, vec!["first line here", "second"]);
    }

    #[test]
    fn unbroken_text_is_cut_at_the_limit() {
        let chunks = split_message("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn limits_count_characters_not_bytes() {
        let body = "ñ".repeat(MAX_MESSAGE_CHARS + 10);
        let chunks = split_message(&body, MAX_MESSAGE_CHARS);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), MAX_MESSAGE_CHARS);
        assert_eq!(chunks[1].chars().count(), 10);
    }
}
