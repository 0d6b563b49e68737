//! Word-form index
//!
//! Builds a single case-insensitive, word-bounded alternation over every
//! surface form of every entry. Forms are ordered longest first so that an
//! alternation tried left to right prefers "running" over "run" when both
//! start at the same position.

use crate::error::Result;
use crate::types::Entry;
use regex::{Regex, RegexBuilder};
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::debug;

/// Compiled-pattern size ceiling for large vocabularies
const PATTERN_SIZE_LIMIT: usize = 64 * (1 << 20);

/// Known vocabulary, ready for matching and lookup
#[derive(Debug, Clone, Default)]
pub struct WordFormIndex {
    pattern: Option<Regex>,
    forms: Vec<String>,
    entries: Vec<Entry>,
    by_form: HashMap<String, usize>,
}

impl WordFormIndex {
    /// Index with no vocabulary (highlighting is a no-op)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn build(entries: &[Entry]) -> Result<Self> {
        let mut by_form: HashMap<String, usize> = HashMap::new();
        let mut forms: Vec<String> = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            for form in entry.forms() {
                let key = form.to_lowercase();
                if !by_form.contains_key(&key) {
                    by_form.insert(key, i);
                    forms.push(form.to_string());
                }
            }
        }

        forms.sort_by(|a, b| {
            Reverse(a.chars().count())
                .cmp(&Reverse(b.chars().count()))
                .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        });

        let pattern = if forms.is_empty() {
            None
        } else {
            let alternation = forms
                .iter()
                .map(|f| regex::escape(f))
                .collect::<Vec<_>>()
                .join("|");
            // Unicode word boundaries: forms starting or ending in accented
            // letters still match, where ASCII `\b` would never fire
            let regex = RegexBuilder::new(&format!(r"\b(?:{})\b", alternation))
                .case_insensitive(true)
                .size_limit(PATTERN_SIZE_LIMIT)
                .build()?;
            Some(regex)
        };

        debug!("Built word-form index: {} entries, {} forms", entries.len(), forms.len());

        Ok(Self {
            pattern,
            forms,
            entries: entries.to_vec(),
            by_form,
        })
    }

    /// No forms, no pattern
    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
    }

    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    /// Forms in match-priority order
    pub fn forms(&self) -> &[String] {
        &self.forms
    }

    /// Entry owning this surface form (case-insensitive)
    pub fn find_entry(&self, form: &str) -> Option<&Entry> {
        let key = form.trim().to_lowercase();
        self.by_form.get(&key).map(|i| &self.entries[*i])
    }

    pub fn is_known(&self, form: &str) -> bool {
        self.find_entry(form).is_some()
    }
}
