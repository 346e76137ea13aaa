//! Pure scanning of `@username` tokens in free text.

use regex_lite::Regex;
use tracing::warn;

/// A single `@username` occurrence in a piece of text.
///
/// `offset` is the byte position of the `@` sign in the original text;
/// `username` excludes the `@`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionToken {
    pub username: String,
    pub offset: usize,
}

impl MentionToken {
    /// Byte length of the full `@username` token.
    pub fn len(&self) -> usize {
        1 + self.username.len()
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty()
    }
}

/// Finds `@username` tokens in free text.
///
/// A token is a maximal run of word characters immediately preceded by `@`.
/// Platforms whose usernames allow additional characters can extend the
/// default charset with [`with_extra_chars`](Self::with_extra_chars).
#[derive(Debug, Clone)]
pub struct MentionScanner {
    pattern: Regex,
}

impl MentionScanner {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"@(\w+)").expect("mention pattern is valid"),
        }
    }

    /// Extend the token charset beyond `\w` (e.g. `-` for GitHub logins).
    /// An empty `extra` yields the default scanner; an unusable charset
    /// falls back to it.
    pub fn with_extra_chars(extra: &str) -> Self {
        if extra.is_empty() {
            return Self::new();
        }
        let mut class = String::from(r"[\w");
        for c in extra.chars() {
            if matches!(c, '\\' | ']' | '^' | '-') {
                class.push('\\');
            }
            class.push(c);
        }
        class.push(']');
        match Regex::new(&format!("@({}+)", class)) {
            Ok(pattern) => Self { pattern },
            Err(_) => {
                warn!(extra, "invalid mention charset, using default");
                Self::new()
            }
        }
    }

    /// Scan `text` for mention tokens, in order of appearance.
    ///
    /// A trailing bare `@` or an `@` followed by a non-word character simply
    /// produces no token.
    pub fn scan(&self, text: &str) -> Vec<MentionToken> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let m = caps.get(1)?;
                Some(MentionToken {
                    username: m.as_str().to_string(),
                    offset: m.start() - 1,
                })
            })
            .collect()
    }
}

impl Default for MentionScanner {
    fn default() -> Self {
        Self::new()
    }
}
