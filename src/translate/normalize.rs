//! Chat-text normalization applied before dictionary substitution, plus the
//! caller-side skip filter for comments that need no translation.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Internet abbreviations expanded as whole words, case-insensitively.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("lol", "haha"),
    ("lmao", "hahaha"),
    ("rofl", "hahaha"),
    ("btw", "by the way"),
    ("idk", "I don't know"),
    ("imo", "in my opinion"),
    ("imho", "in my humble opinion"),
    ("tbh", "to be honest"),
    ("omg", "oh my god"),
    ("brb", "be right back"),
    ("gg", "good game"),
    ("np", "no problem"),
    ("ty", "thank you"),
    ("thx", "thanks"),
    ("pls", "please"),
    ("plz", "please"),
    ("ngl", "not gonna lie"),
    ("irl", "in real life"),
];

/// Domain rules compiled once and shared by every request.
pub struct DomainRules {
    emoji_then_alnum: Regex,
    alnum_then_emoji: Regex,
    abbreviations: Regex,
}

impl DomainRules {
    pub fn new() -> Self {
        let words: Vec<String> = ABBREVIATIONS
            .iter()
            .map(|(short, _)| regex::escape(short))
            .collect();
        Self {
            emoji_then_alnum: Regex::new(r"(\p{Extended_Pictographic})([\p{L}\p{N}])").unwrap(),
            alnum_then_emoji: Regex::new(r"([\p{L}\p{N}])(\p{Extended_Pictographic})").unwrap(),
            abbreviations: Regex::new(&format!(r"(?i)\b(?:{})\b", words.join("|"))).unwrap(),
        }
    }

    /// Elongation collapse, emoji spacing, then abbreviation expansion.
    pub fn apply(&self, text: &str) -> String {
        let collapsed = collapse_elongation(text);
        let spaced = self.emoji_then_alnum.replace_all(&collapsed, "$1 $2");
        let spaced = self.alnum_then_emoji.replace_all(&spaced, "$1 $2");
        self.abbreviations
            .replace_all(&spaced, |caps: &Captures| expand(&caps[0]))
            .into_owned()
    }
}

impl Default for DomainRules {
    fn default() -> Self {
        Self::new()
    }
}

fn expand(word: &str) -> String {
    let lower = word.to_lowercase();
    ABBREVIATIONS
        .iter()
        .find(|(short, _)| *short == lower)
        .map(|(_, long)| (*long).to_string())
        .unwrap_or_else(|| word.to_string())
}

/// Collapse runs of three or more identical letters down to two.
pub fn collapse_elongation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    let mut run = 0usize;
    for c in text.chars() {
        if Some(c) == prev {
            run += 1;
        } else {
            prev = Some(c);
            run = 1;
        }
        if run <= 2 || !c.is_alphabetic() {
            out.push(c);
        }
    }
    out
}

struct SkipPatterns {
    japanese: Regex,
    laughter: Regex,
    bare_url: Regex,
    symbols_only: Regex,
    emoji_only: Regex,
}

fn skip_patterns() -> &'static SkipPatterns {
    static PATTERNS: OnceLock<SkipPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SkipPatterns {
        japanese: Regex::new(r"[一-龠ぁ-んァ-ヶー]").unwrap(),
        laughter: Regex::new(r"(?i)^(?:w|ｗ|草)+$").unwrap(),
        bare_url: Regex::new(r"^https?://\S+$").unwrap(),
        symbols_only: Regex::new(r"^[ｦ-ﾟ\d\s\p{P}\p{S}]+$").unwrap(),
        emoji_only: Regex::new(r"^[\p{Emoji}\s]+$").unwrap(),
    })
}

/// Whether a chat comment should not be sent for translation at all.
/// Applied by callers before handing text to the engine.
pub fn should_skip(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }
    let p = skip_patterns();
    if p.japanese.is_match(trimmed)
        || p.laughter.is_match(trimmed)
        || p.bare_url.is_match(trimmed)
        || p.symbols_only.is_match(trimmed)
    {
        return true;
    }
    if p.emoji_only.is_match(trimmed) && !trimmed.chars().any(|c| c.is_ascii_alphanumeric()) {
        return true;
    }
    if is_single_char_repeat(trimmed) {
        return true;
    }
    trimmed.chars().filter(|c| c.is_ascii_alphabetic()).count() <= 1
}

// "aaa", "777" and the like.
fn is_single_char_repeat(text: &str) -> bool {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphanumeric() && text.chars().count() >= 3 && chars.all(|c| c == first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_long_letter_runs() {
        assert_eq!(collapse_elongation("soooo goooood"), "soo good");
        assert_eq!(collapse_elongation("yesss"), "yess");
        assert_eq!(collapse_elongation("too"), "too");
        assert_eq!(collapse_elongation("!!!!"), "!!!!");
        assert_eq!(collapse_elongation("10000"), "10000");
    }

    #[test]
    fn spaces_emoji_from_words() {
        let rules = DomainRules::new();
        assert_eq!(rules.apply("nice😂"), "nice 😂");
        assert_eq!(rules.apply("😂nice"), "😂 nice");
        assert_eq!(rules.apply("a😀b😀c"), "a 😀 b 😀 c");
        assert_eq!(rules.apply("ok 👍"), "ok 👍");
    }

    #[test]
    fn expands_whole_word_abbreviations_case_insensitively() {
        let rules = DomainRules::new();
        assert_eq!(rules.apply("LOL btw"), "haha by the way");
        assert_eq!(rules.apply("Btw, idk"), "by the way, I don't know");
        // not inside other words
        assert_eq!(rules.apply("lollipop"), "lollipop");
        assert_eq!(rules.apply("eggs"), "eggs");
    }

    #[test]
    fn elongation_runs_before_abbreviation_lookup() {
        let rules = DomainRules::new();
        assert_eq!(rules.apply("lolll"), "loll");
        assert_eq!(rules.apply("ggg"), "good game");
    }

    #[test]
    fn skip_filter_matches_chat_noise() {
        assert!(should_skip("   "));
        assert!(should_skip("こんにちは"));
        assert!(should_skip("wwwww"));
        assert!(should_skip("草"));
        assert!(should_skip("https://example.com/x"));
        assert!(should_skip("8888"));
        assert!(should_skip("!!!"));
        assert!(should_skip("😂😂 🔥"));
        assert!(should_skip("aaaa"));
        assert!(should_skip("a!"));
    }

    #[test]
    fn skip_filter_keeps_real_comments() {
        assert!(!should_skip("hello everyone"));
        assert!(!should_skip("gg 😂"));
        assert!(!should_skip("lol"));
    }
}
