/// Export configuration: per-project settings and function generation rules,
/// loaded from RON.
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::extraction::FunctionGenerationRules;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How free text is written into generated code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Prefix written before every character that needs escaping.
    pub escape_character: String,
    pub characters_needing_escaping: String,
    /// Replacement for line breaks inside string literals.
    pub newline_character: String,
    /// Maximum characters of a text preview before it is cut.
    pub preview_length: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            escape_character: "\\".to_string(),
            characters_needing_escaping: "\"\\".to_string(),
            newline_character: "\\n".to_string(),
            preview_length: 30,
        }
    }
}

impl ExportSettings {
    /// Escape text for use inside a target-language string literal.
    pub fn escape(&self, text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '\r' => {}
                '\n' => escaped.push_str(&self.newline_character),
                c if self.characters_needing_escaping.contains(c) => {
                    escaped.push_str(&self.escape_character);
                    escaped.push(c);
                }
                c => escaped.push(c),
            }
        }
        escaped
    }

    /// Single-line, length-capped preview of a text, for generated comments.
    pub fn preview(&self, text: &str) -> String {
        let flat: String = text
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        let flat = flat.trim();
        if flat.chars().count() <= self.preview_length {
            return flat.to_string();
        }
        let cut: String = flat.chars().take(self.preview_length).collect();
        format!("{}...", cut.trim_end())
    }
}

/// Everything a project configures about exports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub settings: ExportSettings,
    #[serde(default)]
    pub function_generation: FunctionGenerationRules,
}

impl ExportConfig {
    pub fn load_from_ron(path: &Path) -> Result<ExportConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<ExportConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extraction::RuleCondition;

    #[test]
    fn escape_quotes_backslashes_and_newlines() {
        let settings = ExportSettings::default();
        assert_eq!(
            settings.escape("Say \"hi\"\r\nC:\\temp"),
            "Say \\\"hi\\\"\\nC:\\\\temp"
        );
    }

    #[test]
    fn escape_with_custom_settings() {
        let settings = ExportSettings {
            escape_character: "'".to_string(),
            characters_needing_escaping: "'".to_string(),
            newline_character: " ".to_string(),
            preview_length: 10,
        };
        assert_eq!(settings.escape("it's\nfine"), "it''s fine");
    }

    #[test]
    fn preview_is_single_line_and_capped() {
        let settings = ExportSettings {
            preview_length: 12,
            ..ExportSettings::default()
        };
        assert_eq!(settings.preview("Short"), "Short");
        assert_eq!(
            settings.preview("A rather long\nline of dialog"),
            "A rather lon..."
        );
    }

    #[test]
    fn config_from_ron() {
        let config = ExportConfig::parse_ron(
            r#"(
                project_id: "demo",
                settings: (
                    escape_character: "\\",
                    characters_needing_escaping: "\"",
                    newline_character: "\\n",
                    preview_length: 20,
                ),
                function_generation: (
                    prevent_generation_rules: [],
                    generate_rules: [
                        (name: "merge point", condition: MultipleParents),
                    ],
                ),
            )"#,
        )
        .unwrap();
        assert_eq!(config.project_id, "demo");
        assert_eq!(config.settings.preview_length, 20);
        assert_eq!(config.function_generation.generate_rules.len(), 1);
        assert_eq!(
            config.function_generation.generate_rules[0].condition,
            RuleCondition::MultipleParents
        );
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = ExportConfig::parse_ron("(project_id: \"p\")").unwrap();
        assert_eq!(config.settings, ExportSettings::default());
        assert!(!config.function_generation.generate_rules.is_empty());
    }
}
