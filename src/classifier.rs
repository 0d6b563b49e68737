//! Selection classifier
//!
//! Turns a stabilized selection into one of: a known form (silent recency
//! update), an unknown candidate (confirmation dialog) or a rejection.

use crate::dialog::DIALOG_CLASS;
use crate::dom::{Document, NodeId, Selection};
use crate::highlight::{WordFormIndex, HIGHLIGHT_CLASS};
use crate::types::{Entry, UserSettings};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::debug;

/// Punctuation stripped from a selection before lookup
static CAPTION_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.,?!"“”]"#).expect("Valid caption punctuation regex"));

/// Selection size limits from the user's settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionLimits {
    pub max_words: usize,
    pub max_chars: usize,
}

impl Default for SelectionLimits {
    fn default() -> Self {
        Self::from(&UserSettings::default())
    }
}

impl From<&UserSettings> for SelectionLimits {
    fn from(settings: &UserSettings) -> Self {
        Self {
            max_words: settings.words_number_limit,
            max_chars: settings.words_length_limit,
        }
    }
}

/// Why a selection was ignored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    LineBreak,
    TooManyWords { count: usize, limit: usize },
    TooLong { length: usize, limit: usize },
    InsideHighlight,
    InsideDialog,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Empty => write!(f, "empty selection"),
            Rejection::LineBreak => write!(f, "selection spans a line break"),
            Rejection::TooManyWords { count, limit } => {
                write!(f, "{} words exceeds limit of {}", count, limit)
            }
            Rejection::TooLong { length, limit } => {
                write!(f, "{} characters exceeds limit of {}", length, limit)
            }
            Rejection::InsideHighlight => write!(f, "selection inside a highlight"),
            Rejection::InsideDialog => write!(f, "selection inside the dialog"),
        }
    }
}

/// Outcome of classifying one selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Selection matches a form of an existing entry
    Known {
        entry: Entry,
        caption: String,
        node: NodeId,
    },

    /// Valid selection of a word not yet in the vocabulary
    Unknown {
        caption: String,
        word: String,
        node: NodeId,
    },

    Rejected(Rejection),
}

/// Trim, strip sentence punctuation and quotes
pub fn clean_caption(raw: &str) -> String {
    CAPTION_PUNCTUATION.replace_all(raw.trim(), "").into_owned()
}

#[derive(Debug, Clone, Default)]
pub struct SelectionClassifier {
    limits: SelectionLimits,
}

impl SelectionClassifier {
    pub fn new(limits: SelectionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> SelectionLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: SelectionLimits) {
        self.limits = limits;
    }

    /// Classify the live selection against the vocabulary
    pub fn classify(&self, doc: &Document, selection: &Selection, index: &WordFormIndex) -> Classification {
        let node = selection.focus_node();
        let caption = clean_caption(&selection.text(doc));
        let word = caption.to_lowercase();

        if let Err(rejection) = self.validate(doc, selection, &word) {
            debug!("Selection rejected: {}", rejection);
            return Classification::Rejected(rejection);
        }

        match index.find_entry(&word) {
            Some(entry) => {
                debug!("Known form \"{}\" (entry {})", caption, entry.uuid);
                Classification::Known {
                    entry: entry.clone(),
                    caption,
                    node,
                }
            }
            None => {
                debug!("Unknown form \"{}\"", caption);
                Classification::Unknown { caption, word, node }
            }
        }
    }

    fn validate(&self, doc: &Document, selection: &Selection, word: &str) -> Result<(), Rejection> {
        if word.is_empty() {
            return Err(Rejection::Empty);
        }
        if word.contains('\n') {
            return Err(Rejection::LineBreak);
        }

        let count = word.split_whitespace().count();
        if count == 0 {
            return Err(Rejection::Empty);
        }
        if count > self.limits.max_words {
            return Err(Rejection::TooManyWords {
                count,
                limit: self.limits.max_words,
            });
        }
        let length = word.chars().count();
        if length > self.limits.max_chars {
            return Err(Rejection::TooLong {
                length,
                limit: self.limits.max_chars,
            });
        }

        let scope = selection.common_ancestor(doc).unwrap_or(selection.focus_node());
        let inside = |class: &str| doc.closest_class(scope, class).is_some();
        if inside(DIALOG_CLASS) {
            return Err(Rejection::InsideDialog);
        }
        if inside(HIGHLIGHT_CLASS) {
            return Err(Rejection::InsideHighlight);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Boundary;

    fn index() -> WordFormIndex {
        WordFormIndex::build(&[Entry {
            uuid: "u-run".to_string(),
            word: "run".to_string(),
            forms_pipe_separated: Some("run|running|ran".to_string()),
            created_at: None,
            updated_at: None,
        }])
        .unwrap()
    }

    fn page(text: &str) -> (Document, NodeId) {
        let mut doc = Document::new();
        let body = doc.body();
        let p = doc.append_element(body, "p", &[]);
        let node = doc.append_text(p, text);
        (doc, node)
    }

    fn classify(doc: &Document, selection: Selection) -> Classification {
        SelectionClassifier::default().classify(doc, &selection, &index())
    }

    #[test]
    fn test_clean_caption() {
        assert_eq!(clean_caption("  \"Hello,\" world!? "), "Hello world");
        assert_eq!(clean_caption("“quoted.”"), "quoted");
    }

    #[test]
    fn test_known_form_case_insensitive() {
        let (doc, node) = page("He Ran fast.");
        let selection = Selection::of_text(&doc, node, "Ran").unwrap();
        match classify(&doc, selection) {
            Classification::Known { entry, caption, .. } => {
                assert_eq!(entry.uuid, "u-run");
                assert_eq!(caption, "Ran");
            }
            other => panic!("expected known, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_word() {
        let (doc, node) = page("Take the long road.");
        let selection = Selection::of_text(&doc, node, "the").unwrap();
        assert_eq!(
            classify(&doc, selection),
            Classification::Unknown {
                caption: "the".to_string(),
                word: "the".to_string(),
                node,
            }
        );
    }

    #[test]
    fn test_trailing_punctuation_is_stripped() {
        let (doc, node) = page("It was the End.");
        let selection = Selection::of_text(&doc, node, "End.").unwrap();
        match classify(&doc, selection) {
            Classification::Unknown { caption, word, .. } => {
                assert_eq!(caption, "End");
                assert_eq!(word, "end");
            }
            other => panic!("expected unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_empty_and_punctuation_only() {
        let (doc, node) = page("Wait... what?");
        assert_eq!(
            classify(&doc, Selection::within(node, 2, 2)),
            Classification::Rejected(Rejection::Empty)
        );
        let dots = Selection::of_text(&doc, node, "...").unwrap();
        assert_eq!(classify(&doc, dots), Classification::Rejected(Rejection::Empty));
    }

    #[test]
    fn test_rejects_limits() {
        let (doc, node) = page("one two three four five and a remarkably long tail");
        let five = Selection::of_text(&doc, node, "one two three four five").unwrap();
        assert_eq!(
            classify(&doc, five),
            Classification::Rejected(Rejection::TooManyWords { count: 5, limit: 4 })
        );

        let classifier = SelectionClassifier::new(SelectionLimits {
            max_words: 10,
            max_chars: 10,
        });
        let long = Selection::of_text(&doc, node, "remarkably long").unwrap();
        assert_eq!(
            classifier.classify(&doc, &long, &index()),
            Classification::Rejected(Rejection::TooLong { length: 15, limit: 10 })
        );
    }

    #[test]
    fn test_rejects_line_break() {
        let mut doc = Document::new();
        let body = doc.body();
        let p1 = doc.append_element(body, "p", &[]);
        let a = doc.append_text(p1, "first");
        let p2 = doc.append_element(body, "p", &[]);
        let b = doc.append_text(p2, "second");

        let selection = Selection::new(Boundary::new(a, 0), Boundary::new(b, 6));
        assert_eq!(classify(&doc, selection), Classification::Rejected(Rejection::LineBreak));
    }

    #[test]
    fn test_rejects_inside_highlight_and_dialog() {
        let mut doc = Document::new();
        let body = doc.body();
        let p = doc.append_element(body, "p", &[]);
        let mark = doc.append_element(p, "span", &[HIGHLIGHT_CLASS]);
        let ran = doc.append_text(mark, "walked");
        let dialog = doc.append_element(body, "div", &[DIALOG_CLASS]);
        let caption = doc.append_text(dialog, "Mark \"walked\"");

        assert_eq!(
            classify(&doc, Selection::within(ran, 0, 6)),
            Classification::Rejected(Rejection::InsideHighlight)
        );
        let in_dialog = Selection::of_text(&doc, caption, "walked").unwrap();
        assert_eq!(classify(&doc, in_dialog), Classification::Rejected(Rejection::InsideDialog));
    }

    #[test]
    fn test_phrase_starting_on_highlight_is_unknown() {
        let mut doc = Document::new();
        let body = doc.body();
        let p = doc.append_element(body, "p", &[]);
        doc.append_text(p, "He ");
        let mark = doc.append_element(p, "span", &[HIGHLIGHT_CLASS]);
        let ran = doc.append_text(mark, "ran");
        let rest = doc.append_text(p, " fast home.");

        let selection = Selection::new(Boundary::new(ran, 0), Boundary::new(rest, 5));
        assert_eq!(
            classify(&doc, selection),
            Classification::Unknown {
                caption: "ran fast".to_string(),
                word: "ran fast".to_string(),
                node: rest,
            }
        );
    }
}
