//! Cross-platform rewriting of `@username` mentions.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::scanner::MentionScanner;
use crate::errors::DatabaseError;
use crate::identity::UsernameTranslator;
use crate::models::Platform;

/// Rewrites `@username` mentions authored on one platform into the
/// equivalent usernames on the other, so notifications reach the right
/// person on the destination.
pub struct MentionRewriter {
    translator: UsernameTranslator,
    github_scanner: MentionScanner,
    linear_scanner: MentionScanner,
}

impl MentionRewriter {
    /// A rewriter with the default word-character token charset on both
    /// platforms.
    pub fn new(translator: UsernameTranslator) -> Self {
        Self::with_scanners(translator, MentionScanner::new(), MentionScanner::new())
    }

    /// A rewriter with per-platform scanners (for platform-specific username
    /// charsets).
    pub fn with_scanners(
        translator: UsernameTranslator,
        github_scanner: MentionScanner,
        linear_scanner: MentionScanner,
    ) -> Self {
        Self {
            translator,
            github_scanner,
            linear_scanner,
        }
    }

    fn scanner_for(&self, platform: Platform) -> &MentionScanner {
        match platform {
            Platform::GitHub => &self.github_scanner,
            Platform::Linear => &self.linear_scanner,
        }
    }

    /// Rewrite every mapped mention in `text` from `source` to the opposite
    /// platform.
    ///
    /// Unresolved mentions are left exactly as authored -- the author may
    /// simply not have linked accounts yet. Text with no mention tokens is
    /// returned unchanged without a store lookup. Substitution happens only
    /// at scanned token spans, so a mapping for a short username can never
    /// clobber part of a longer one.
    pub fn rewrite(&self, text: &str, source: Platform) -> Result<String, DatabaseError> {
        let tokens = self.scanner_for(source).scan(text);
        if tokens.is_empty() {
            return Ok(text.to_string());
        }

        let usernames: BTreeSet<String> =
            tokens.iter().map(|t| t.username.clone()).collect();
        let pairs = self.translator.map_usernames(&usernames, source)?;
        if pairs.is_empty() {
            return Ok(text.to_string());
        }

        let destination = source.opposite();
        let replacements: HashMap<&str, &str> = pairs
            .iter()
            .map(|p| (p.username_on(source), p.username_on(destination)))
            .collect();

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for token in &tokens {
            let start = token.offset;
            let end = start + token.len();
            out.push_str(&text[cursor..start]);
            match replacements.get(token.username.as_str()) {
                Some(dest) => {
                    out.push('@');
                    out.push_str(dest);
                }
                None => out.push_str(&text[start..end]),
            }
            cursor = end;
        }
        out.push_str(&text[cursor..]);

        debug!(
            platform = %source,
            tokens = tokens.len(),
            mapped = replacements.len(),
            "rewrote mentions"
        );
        Ok(out)
    }
}
