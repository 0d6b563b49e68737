//! Core data structures shared with the remote store
//!
//! Field names follow the JSON contract of the remote store (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default highlight background
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "rgba(210, 210, 10, 0.4)";

/// Default dictionary used for highlight-click lookups
pub const DEFAULT_DICT_BASE_URL: &str = "https://slovniky.lingea.sk/anglicko-slovensky/";

/// Default prefixes whose URL fragments are part of the document identity
pub const DEFAULT_ALLOW_FRAGMENT_URLS: &[&str] =
    &["https://www.nytimes.com/", "https://developer.mozilla.org/"];

/// A canonical vocabulary item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Opaque identity assigned by the remote store; empty when the store
    /// omitted it
    #[serde(default)]
    pub uuid: String,

    /// Canonical lowercase form
    pub word: String,

    /// Surface forms that should all highlight, '|'-delimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forms_pipe_separated: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// Surface forms of this entry, trimmed, in declaration order.
    ///
    /// Falls back to `word` when no forms were supplied.
    pub fn forms(&self) -> Vec<&str> {
        let forms: Vec<&str> = self
            .forms_pipe_separated
            .as_deref()
            .map(|f| f.split('|').map(str::trim).filter(|f| !f.is_empty()).collect())
            .unwrap_or_default();

        if forms.is_empty() {
            let word = self.word.trim();
            if word.is_empty() {
                Vec::new()
            } else {
                vec![word]
            }
        } else {
            forms
        }
    }
}

/// A canonicalised source URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlRecord {
    pub url_hash: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Extracted paragraph text, identified by its content hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphRecord {
    pub paragraph_hash: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// The occurrence of an entry in a paragraph on a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    #[serde(rename = "entryUUID")]
    pub entry_uuid: String,
    pub url_hash: String,
    pub paragraph_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Relation {
    /// Uniqueness key (entry, url, paragraph)
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.entry_uuid, &self.url_hash, &self.paragraph_hash)
    }
}

/// In-memory mirror of the user's data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataBundle {
    pub entries: Vec<Entry>,
    pub urls: Vec<UrlRecord>,
    pub paragraphs: Vec<ParagraphRecord>,
    pub relations: Vec<Relation>,
}

impl UserDataBundle {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
            && self.urls.is_empty()
            && self.paragraphs.is_empty()
            && self.relations.is_empty()
    }

    /// Find the entry with this uuid
    pub fn entry(&self, uuid: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.uuid == uuid)
    }

    /// Find the relation for this (entry, url, paragraph) triple
    pub fn relation(&self, entry_uuid: &str, url_hash: &str, paragraph_hash: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|r| r.key() == (entry_uuid, url_hash, paragraph_hash))
    }

    /// Relations recorded for one entry
    pub fn relations_for<'a>(&'a self, entry_uuid: &'a str) -> impl Iterator<Item = &'a Relation> + 'a {
        self.relations.iter().filter(move |r| r.entry_uuid == entry_uuid)
    }
}

/// Per-user settings owned by the external settings UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default)]
    pub highlight_color: String,
    #[serde(default)]
    pub words_number_limit: usize,
    #[serde(default)]
    pub words_length_limit: usize,
    #[serde(default)]
    pub dict_base_url: String,
    /// Comma-separated URL prefixes
    #[serde(default)]
    pub allow_fragment_url_list: String,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            highlight_color: DEFAULT_HIGHLIGHT_COLOR.to_string(),
            words_number_limit: 4,
            words_length_limit: 50,
            dict_base_url: DEFAULT_DICT_BASE_URL.to_string(),
            allow_fragment_url_list: DEFAULT_ALLOW_FRAGMENT_URLS.join(","),
        }
    }
}

impl UserSettings {
    /// Replace missing, empty or zero values with defaults
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.highlight_color.trim().is_empty() {
            self.highlight_color = defaults.highlight_color;
        }
        if self.words_number_limit == 0 {
            self.words_number_limit = defaults.words_number_limit;
        }
        if self.words_length_limit == 0 {
            self.words_length_limit = defaults.words_length_limit;
        }
        if self.dict_base_url.trim().is_empty() {
            self.dict_base_url = defaults.dict_base_url;
        }
        if self.allow_fragment_prefixes().is_empty() {
            self.allow_fragment_url_list = defaults.allow_fragment_url_list;
        }
        self
    }

    /// Parsed fragment allow-list
    pub fn allow_fragment_prefixes(&self) -> Vec<String> {
        self.allow_fragment_url_list
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Response of `GET /api/session`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default, rename = "userID")]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub settings: Option<UserSettings>,
}

/// Body of `POST /api/mark`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRequest {
    pub word: String,
    #[serde(rename = "entryUUID", skip_serializing_if = "Option::is_none", default)]
    pub entry_uuid: Option<String>,
    pub url: String,
    pub title: Option<String>,
    pub paragraph_text: String,
    pub url_hash: String,
    pub paragraph_hash: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transcript_segment_ref: Option<String>,
}

/// Response of `DELETE /api/entries/{uuid}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub message: String,
}

/// Response of `POST /api/import`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    #[serde(default)]
    pub imported_entries: usize,
    #[serde(default)]
    pub imported_urls: usize,
    #[serde(default)]
    pub imported_paragraphs: usize,
    #[serde(default)]
    pub imported_relations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(word: &str, forms: Option<&str>) -> Entry {
        Entry {
            uuid: format!("uuid-{}", word),
            word: word.to_string(),
            forms_pipe_separated: forms.map(str::to_string),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_entry_forms() {
        assert_eq!(entry("run", Some("run|running| ran |")).forms(), vec!["run", "running", "ran"]);
        assert_eq!(entry("run", None).forms(), vec!["run"]);
        assert_eq!(entry("run", Some("")).forms(), vec!["run"]);
        assert!(entry("  ", None).forms().is_empty());
    }

    #[test]
    fn test_bundle_deserializes_remote_shape() {
        let json = r#"{
            "entries": [{"uuid": "u1", "word": "run", "formsPipeSeparated": "run|ran",
                         "createdAt": "2024-05-01T10:00:00Z", "updatedAt": "2024-05-01T10:00:00Z"}],
            "urls": [{"urlHash": "h1", "url": "https://example.com/a", "title": "A"}],
            "paragraphs": [{"paragraphHash": "p1", "text": "He ran fast."}],
            "relations": [{"entryUUID": "u1", "urlHash": "h1", "paragraphHash": "p1",
                           "createdAt": "2024-05-01T10:00:00Z", "updatedAt": "2024-05-02T10:00:00Z"}]
        }"#;

        let bundle: UserDataBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.entries[0].forms(), vec!["run", "ran"]);
        assert!(bundle.relation("u1", "h1", "p1").is_some());
        assert_eq!(bundle.relations_for("u1").count(), 1);
    }

    #[test]
    fn test_bundle_missing_array_is_rejected() {
        let json = r#"{"entries": [], "urls": [], "paragraphs": []}"#;
        assert!(serde_json::from_str::<UserDataBundle>(json).is_err());
    }

    #[test]
    fn test_settings_fallbacks() {
        let settings: UserSettings = serde_json::from_str(
            r#"{"highlightColor": "", "wordsNumberLimit": 0, "wordsLengthLimit": 20,
                "allowFragmentUrlList": " https://a.example/ , ,https://b.example/"}"#,
        )
        .unwrap();
        let settings = settings.with_defaults();

        assert_eq!(settings.highlight_color, DEFAULT_HIGHLIGHT_COLOR);
        assert_eq!(settings.words_number_limit, 4);
        assert_eq!(settings.words_length_limit, 20);
        assert_eq!(settings.dict_base_url, DEFAULT_DICT_BASE_URL);
        assert_eq!(
            settings.allow_fragment_prefixes(),
            vec!["https://a.example/", "https://b.example/"]
        );
    }

    #[test]
    fn test_mark_request_wire_format() {
        let request = MarkRequest {
            word: "the".to_string(),
            entry_uuid: None,
            url: "https://example.com/".to_string(),
            title: Some("Example".to_string()),
            paragraph_text: "the end".to_string(),
            url_hash: "uh".to_string(),
            paragraph_hash: "ph".to_string(),
            transcript_segment_ref: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["paragraphText"], "the end");
        assert_eq!(value["urlHash"], "uh");
        assert!(value.get("entryUUID").is_none());
        assert!(value.get("transcriptSegmentRef").is_none());
    }
}
