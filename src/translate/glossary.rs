//! User dictionary parsing and substitution.
//! The dictionary arrives as newline-delimited `original,translation` pairs and
//! is compiled once per distinct dictionary string.

use std::sync::Arc;

use parking_lot::Mutex;
use regex::{NoExpand, Regex, RegexBuilder};
use tracing::{debug, warn};

/// One dictionary pair as written by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlossaryEntry {
    pub source: String,
    pub target: String,
}

/// Parse the raw dictionary text. Only the first comma splits; lines without a
/// comma or with an empty side are dropped.
pub fn parse_entries(raw: &str) -> Vec<GlossaryEntry> {
    raw.lines()
        .filter_map(|line| {
            let (source, target) = line.split_once(',')?;
            let (source, target) = (source.trim(), target.trim());
            if source.is_empty() || target.is_empty() {
                return None;
            }
            Some(GlossaryEntry {
                source: source.to_string(),
                target: target.to_string(),
            })
        })
        .collect()
}

/// Compiled substitution rules, longest source first.
pub struct Glossary {
    raw: String,
    rules: Vec<(Regex, String)>,
}

impl Glossary {
    pub fn compile(raw: &str) -> Self {
        let mut entries = parse_entries(raw);
        // stable: equal lengths keep their written order
        entries.sort_by(|a, b| b.source.chars().count().cmp(&a.source.chars().count()));

        let rules = entries
            .into_iter()
            .filter_map(|e| {
                match RegexBuilder::new(&regex::escape(&e.source))
                    .case_insensitive(true)
                    .build()
                {
                    Ok(re) => Some((re, e.target)),
                    Err(err) => {
                        warn!(source = %e.source, error = %err, "dictionary entry rejected");
                        None
                    }
                }
            })
            .collect();

        Self {
            raw: raw.to_string(),
            rules,
        }
    }

    /// Create an empty glossary.
    pub fn empty() -> Self {
        Self {
            raw: String::new(),
            rules: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order as a global literal replacement.
    pub fn apply(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (re, target) in &self.rules {
            if re.is_match(&result) {
                result = re.replace_all(&result, NoExpand(target)).into_owned();
            }
        }
        result
    }
}

/// Holds the compiled form of the most recent dictionary string.
pub struct GlossaryCache {
    current: Mutex<Arc<Glossary>>,
}

impl GlossaryCache {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Arc::new(Glossary::empty())),
        }
    }

    /// Compiled glossary for `raw`, recompiling only if it differs from the
    /// last one seen.
    pub fn get_or_compile(&self, raw: &str) -> Arc<Glossary> {
        let mut current = self.current.lock();
        if current.raw != raw {
            let compiled = Glossary::compile(raw);
            debug!(rules = compiled.len(), "dictionary recompiled");
            *current = Arc::new(compiled);
        }
        Arc::clone(&current)
    }

    /// Drop the compiled form; the next request recompiles.
    pub fn invalidate(&self) {
        *self.current.lock() = Arc::new(Glossary::empty());
    }
}

impl Default for GlossaryCache {
    fn default() -> Self {
        Self::new()
    }
}
