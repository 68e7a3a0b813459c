//! Incremental clause-boundary splitter over a growing token buffer.
//!
//! Tokens arrive one at a time from a text-generation stream; whenever the
//! buffer contains a complete clause (text up to and including a terminator)
//! the clause is emitted so synthesis can start before generation finishes.
//! Long terminator-free runs are force-split at a whitespace boundary so a
//! rambling sentence cannot stall the audio stream indefinitely.

const CLAUSE_TERMINATORS: [char; 6] = ['.', '!', '?', ',', ';', ':'];

fn is_clause_terminator(ch: char) -> bool {
    CLAUSE_TERMINATORS.contains(&ch)
}

/// Tuning knobs for the force-split path. The defaults are measured in
/// characters, not bytes; all scanning is `char`-based.
#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    /// Buffer length above which a terminator-free run is split at
    /// whitespace.
    pub max_unbroken_chars: usize,
    /// A whitespace break candidate is only taken if it sits past this
    /// offset, so force-splitting never emits tiny fragments.
    pub min_break_offset: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_unbroken_chars: 40,
            min_break_offset: 10,
        }
    }
}

/// Stateful splitter. The buffer is consumed destructively as segments are
/// emitted; concatenating every emitted segment reproduces the non-whitespace
/// content of the input in order.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
    config: SegmenterConfig,
}

impl SentenceSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            buffer: String::new(),
            config,
        }
    }

    /// Append one token and return every segment that became complete,
    /// left to right. Returns an empty vec when no boundary was reached.
    pub fn push(&mut self, token: &str) -> Vec<String> {
        self.buffer.push_str(token);

        if self.buffer.chars().any(is_clause_terminator) {
            return self.drain_complete_clauses();
        }

        self.force_split_overlong()
    }

    /// Emit whatever remains at stream end.
    pub fn flush(&mut self) -> Option<String> {
        let remainder = self.buffer.trim().to_string();
        self.buffer.clear();
        if remainder.is_empty() {
            None
        } else {
            Some(remainder)
        }
    }

    fn drain_complete_clauses(&mut self) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = String::new();

        for ch in self.buffer.chars() {
            current.push(ch);
            if is_clause_terminator(ch) {
                let clause = current.trim();
                if !clause.is_empty() {
                    segments.push(clause.to_string());
                }
                current.clear();
            }
        }

        // Text after the last terminator stays buffered.
        self.buffer = current;
        segments
    }

    fn force_split_overlong(&mut self) -> Vec<String> {
        let chars: Vec<char> = self.buffer.chars().collect();
        if chars.len() <= self.config.max_unbroken_chars {
            return Vec::new();
        }

        let scan_from = self.config.max_unbroken_chars.min(chars.len() - 1);
        for offset in (0..=scan_from).rev() {
            if !chars[offset].is_whitespace() {
                continue;
            }
            if offset <= self.config.min_break_offset {
                // Break is too close to the front; wait for more text.
                return Vec::new();
            }
            let head: String = chars[..offset].iter().collect();
            // The whitespace itself stays with the remainder.
            self.buffer = chars[offset..].iter().collect();
            let head = head.trim();
            if head.is_empty() {
                return Vec::new();
            }
            return vec![head.to_string()];
        }

        // No whitespace at all; defer until a boundary appears.
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_tokens(segmenter: &mut SentenceSegmenter, text: &str) -> Vec<String> {
        // Split into whitespace-preserving tokens the way generation
        // streams deliver them.
        let mut segments = Vec::new();
        let mut token = String::new();
        for ch in text.chars() {
            token.push(ch);
            if token.chars().count() == 4 {
                segments.extend(segmenter.push(&token));
                token.clear();
            }
        }
        if !token.is_empty() {
            segments.extend(segmenter.push(&token));
        }
        segments
    }

    #[test]
    fn emits_clause_on_terminator() {
        let mut seg = SentenceSegmenter::default();
        assert!(seg.push("Hello ").is_empty());
        assert_eq!(seg.push("world. And"), vec!["Hello world.".to_string()]);
        assert_eq!(seg.flush(), Some("And".to_string()));
    }

    #[test]
    fn emits_multiple_clauses_in_one_push() {
        let mut seg = SentenceSegmenter::default();
        let out = seg.push("One. Two! Three? tail");
        assert_eq!(out, vec!["One.", "Two!", "Three?"]);
        assert_eq!(seg.flush(), Some("tail".to_string()));
    }

    #[test]
    fn commas_and_semicolons_split_clauses() {
        let mut seg = SentenceSegmenter::default();
        let out = seg.push("first, second; third: rest");
        assert_eq!(out, vec!["first,", "second;", "third:"]);
    }

    #[test]
    fn multibyte_clause_boundary() {
        // Turkish text must split exactly after the `?` with the
        // remainder left buffered; ö/ç exercise multi-byte boundaries.
        let mut seg = SentenceSegmenter::default();
        let segments = feed_tokens(&mut seg, "Kim nöbetçiydi? Kimse bilmiyor");
        assert_eq!(segments, vec!["Kim nöbetçiydi?".to_string()]);
        assert_eq!(seg.flush(), Some("Kimse bilmiyor".to_string()));
    }

    #[test]
    fn force_splits_long_terminator_free_run() {
        let mut seg = SentenceSegmenter::default();
        let text = "the quick brown fox jumps over a very lazy sleeping dog";
        let segments = feed_tokens(&mut seg, text);
        assert!(!segments.is_empty(), "expected a forced split");
        for segment in &segments {
            assert!(segment.chars().count() > 10);
        }
        let mut reconstructed = segments.join(" ");
        if let Some(rest) = seg.flush() {
            reconstructed.push(' ');
            reconstructed.push_str(&rest);
        }
        assert_eq!(reconstructed, text);
    }

    #[test]
    fn defers_when_no_whitespace_available() {
        let mut seg = SentenceSegmenter::default();
        let unbroken = "a".repeat(60);
        assert!(seg.push(&unbroken).is_empty());
        assert_eq!(seg.flush(), Some(unbroken));
    }

    #[test]
    fn defers_when_break_is_too_early() {
        let config = SegmenterConfig {
            max_unbroken_chars: 40,
            min_break_offset: 10,
        };
        let mut seg = SentenceSegmenter::new(config);
        // Whitespace only at offset 2; everything after is unbroken.
        let text = format!("ab {}", "c".repeat(50));
        assert!(seg.push(&text).is_empty());
        assert_eq!(seg.flush(), Some(text.trim().to_string()));
    }

    #[test]
    fn custom_thresholds_are_respected() {
        let config = SegmenterConfig {
            max_unbroken_chars: 12,
            min_break_offset: 3,
        };
        let mut seg = SentenceSegmenter::new(config);
        let out = seg.push("alpha beta gamma delta");
        assert_eq!(out, vec!["alpha beta".to_string()]);
    }

    #[test]
    fn reconstruction_preserves_every_non_whitespace_char() {
        let mut seg = SentenceSegmenter::default();
        let text = "Stars wheeled overhead, and every hour brought us closer. \
                    Nobody spoke; nobody needed to! Why would they?";
        let mut segments = feed_tokens(&mut seg, text);
        segments.extend(seg.flush());

        let emitted: String = segments.join("").chars().filter(|c| !c.is_whitespace()).collect();
        let original: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(emitted, original);
    }

    #[test]
    fn flush_on_empty_buffer_is_none() {
        let mut seg = SentenceSegmenter::default();
        assert_eq!(seg.flush(), None);
        seg.push("   ");
        assert_eq!(seg.flush(), None);
    }
}
