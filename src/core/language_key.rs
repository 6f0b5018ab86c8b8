/// Language keys for exported texts.
///
/// Resolution runs in two phases: callers describe every key a template
/// could use, then keys are only generated for placeholders the template
/// actually contains. Unused texts never reach the string table.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::placeholder;

/// The localization collaborator. Returns the key under which `text` is
/// stored for the given group and field.
pub trait LanguageKeyGenerator {
    fn language_key(&mut self, group_id: &str, field_key: &str, text: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageKeyRequest {
    pub placeholder: String,
    pub field_key: String,
    pub text: String,
}

impl LanguageKeyRequest {
    pub fn new(
        placeholder: impl Into<String>,
        field_key: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            placeholder: placeholder.into(),
            field_key: field_key.into(),
            text: text.into(),
        }
    }
}

/// Phase one: the requests whose placeholder occurs in the code.
pub fn collect_present(code: &str, requests: Vec<LanguageKeyRequest>) -> Vec<LanguageKeyRequest> {
    requests
        .into_iter()
        .filter(|request| placeholder::is_present(code, &request.placeholder))
        .collect()
}

/// Phase two: generate keys for the present requests. Returns the
/// placeholder values, ready for substitution.
pub fn generate_keys(
    code: &str,
    group_id: &str,
    requests: Vec<LanguageKeyRequest>,
    generator: &mut dyn LanguageKeyGenerator,
) -> Vec<(String, String)> {
    collect_present(code, requests)
        .into_iter()
        .map(|request| {
            let key = generator.language_key(group_id, &request.field_key, &request.text);
            (request.placeholder, key)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub key: String,
    pub group_id: String,
    pub field_key: String,
    pub text: String,
}

/// Keeps keys stable per (group, field key). Keys are numbered per group.
#[derive(Debug, Default)]
pub struct InMemoryLanguageKeys {
    entries: Vec<LanguageEntry>,
    index: FxHashMap<(String, String), usize>,
    per_group: FxHashMap<String, u32>,
}

impl InMemoryLanguageKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LanguageEntry] {
        &self.entries
    }

    pub fn get(&self, group_id: &str, field_key: &str) -> Option<&LanguageEntry> {
        self.index
            .get(&(group_id.to_string(), field_key.to_string()))
            .map(|i| &self.entries[*i])
    }
}

impl LanguageKeyGenerator for InMemoryLanguageKeys {
    fn language_key(&mut self, group_id: &str, field_key: &str, text: &str) -> String {
        let id = (group_id.to_string(), field_key.to_string());
        if let Some(existing) = self.index.get(&id) {
            let entry = &mut self.entries[*existing];
            entry.text = text.to_string();
            return entry.key.clone();
        }

        let counter = self.per_group.entry(group_id.to_string()).or_insert(0);
        *counter += 1;
        let key = format!("{}_{}", group_id, counter);
        self.index.insert(id, self.entries.len());
        self.entries.push(LanguageEntry {
            key: key.clone(),
            group_id: group_id.to_string(),
            field_key: field_key.to_string(),
            text: text.to_string(),
        });
        key
    }
}
