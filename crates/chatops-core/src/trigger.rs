//! Text triggers that select handlers for free-text commands.

use regex::{Regex, RegexBuilder};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Lower-case and collapse whitespace runs to single spaces.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .map(|piece| piece.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A normalized trigger phrase, optionally taking trailing arguments.
#[derive(Clone)]
pub struct Trigger {
    text: String,
    takes_args: bool,
    matcher: Regex,
}

impl Trigger {
    pub fn new(text: &str, takes_args: bool) -> Self {
        let text = clean_text(text);
        let matcher = compile_matcher(&text, takes_args);
        Self {
            text,
            takes_args,
            matcher,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn takes_args(&self) -> bool {
        self.takes_args
    }

    /// Match raw input text, returning the stripped argument text on success.
    ///
    /// Triggers that take no arguments only match when nothing but
    /// whitespace follows the phrase; their argument text is always empty.
    pub fn matches(&self, input: &str) -> Option<String> {
        let caps = self.matcher.captures(input)?;
        if !self.takes_args {
            return Some(String::new());
        }
        let args = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        Some(args)
    }
}

fn compile_matcher(text: &str, takes_args: bool) -> Regex {
    let body = text
        .split(' ')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    let pattern = if takes_args {
        format!(r"^\s*{}(?:(\s+.+)|(\s*))$", body)
    } else {
        format!(r"^\s*{}\s*$", body)
    };
    // Every piece is escaped, so the pattern is always well formed.
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("escaped trigger pattern compiles")
}

impl PartialEq for Trigger {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.takes_args == other.takes_args
    }
}

impl Eq for Trigger {}

impl Hash for Trigger {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
        self.takes_args.hash(state);
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("text", &self.text)
            .field("takes_args", &self.takes_args)
            .finish()
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
