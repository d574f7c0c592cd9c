//! Governance log records: schema, strict validation, and the daily-log
//! markdown rendering.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{is_strict_utc_timestamp, utc_now_iso};
use crate::governance::OmegaConfig;

/// One action record. All four of timestamp/type/source/action are
/// required; `data` is a free-form payload rendered into the log sections.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub source: String,
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

impl LogRecord {
    /// Builds a record stamped with the current instant.
    pub fn now(
        record_type: impl Into<String>,
        source: impl Into<String>,
        action: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            timestamp: utc_now_iso(),
            record_type: record_type.into(),
            source: source.into(),
            action: action.into(),
            data,
        }
    }

    /// Validates required fields per the governance config. Returns the
    /// failure reason when invalid.
    pub fn validate(&self, config: &OmegaConfig) -> Result<(), String> {
        if self.record_type.trim().is_empty() {
            return Err("record type must be a non-empty string".to_string());
        }
        if config.require_source && self.source.trim().is_empty() {
            return Err("record source must be a non-empty string".to_string());
        }
        if config.require_action && self.action.trim().is_empty() {
            return Err("record action must be a non-empty string".to_string());
        }
        if config.require_timestamp {
            if self.timestamp.trim().is_empty() {
                return Err("record timestamp must be a non-empty string".to_string());
            }
            if config.iso8601_strict && !is_strict_utc_timestamp(&self.timestamp) {
                return Err(format!(
                    "record timestamp is not strict UTC ISO-8601: {}",
                    self.timestamp
                ));
            }
        }
        Ok(())
    }

    /// Renders the record as one daily-log block: a level-3 heading followed
    /// by the known sections, in fixed order.
    pub fn render_markdown(&self) -> String {
        let mut out = format!(
            "### [{}] {} :: {}\n",
            self.timestamp,
            self.source.to_uppercase(),
            self.action.to_uppercase()
        );
        for section in ["metadata", "context", "changes", "result", "artifacts"] {
            let Some(value) = self.data.get(section) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            out.push_str(&format!("\n**{}**\n\n", title_case(section)));
            out.push_str(&render_value(value));
        }
        if let Some(refs) = self.data.get("references").and_then(Value::as_array) {
            if !refs.is_empty() {
                out.push_str("\n**References**\n\n");
                for r in refs {
                    out.push_str(&format!("- {}\n", scalar_text(r)));
                }
            }
        }
        out
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut out = String::new();
            for (k, v) in map {
                out.push_str(&format!("- {}: {}\n", k, scalar_text(v)));
            }
            out
        }
        Value::Array(items) => {
            let mut out = String::new();
            for item in items {
                out.push_str(&format!("- {}\n", scalar_text(item)));
            }
            out
        }
        other => format!("{}\n", scalar_text(other)),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: freshly stamped records validate under the default
    /// config (property: every written record validates).
    #[test]
    fn fresh_record_validates() {
        let record = LogRecord::now("tool_call", "graph-memory", "create_entity", json!({}));
        assert!(record.validate(&OmegaConfig::default()).is_ok());
    }

    /// **Scenario**: each missing required field is its own failure.
    #[test]
    fn missing_fields_fail() {
        let config = OmegaConfig::default();
        let mut record = LogRecord::now("tool_call", "s", "a", json!({}));
        record.record_type = String::new();
        assert!(record.validate(&config).is_err());

        let mut record = LogRecord::now("tool_call", "s", "a", json!({}));
        record.source = "  ".to_string();
        assert!(record.validate(&config).is_err());

        let mut record = LogRecord::now("tool_call", "s", "a", json!({}));
        record.action = String::new();
        assert!(record.validate(&config).is_err());

        let mut record = LogRecord::now("tool_call", "s", "a", json!({}));
        record.timestamp = "2026/08/01 12:00".to_string();
        assert!(record.validate(&config).is_err());
    }

    /// **Scenario**: relaxed config skips the checks it disables.
    #[test]
    fn relaxed_config() {
        let config = OmegaConfig {
            require_source: false,
            iso8601_strict: false,
            ..OmegaConfig::default()
        };
        let mut record = LogRecord::now("tool_call", "", "a", json!({}));
        record.timestamp = "2026-08-01T12:00:00+02:00".to_string();
        assert!(record.validate(&config).is_ok());
    }

    /// **Scenario**: rendering yields the heading plus sections in order.
    #[test]
    fn markdown_rendering() {
        let mut record = LogRecord::now(
            "tool_call",
            "graph-memory",
            "create_entity",
            json!({
                "metadata": { "tool": "create_entity" },
                "result": "ok",
                "references": ["Person:p1"],
            }),
        );
        record.timestamp = "2026-08-01T12:00:00.000Z".to_string();
        let text = record.render_markdown();
        assert!(text.starts_with(
            "### [2026-08-01T12:00:00.000Z] GRAPH-MEMORY :: CREATE_ENTITY\n"
        ));
        let meta = text.find("**Metadata**").unwrap();
        let result = text.find("**Result**").unwrap();
        let refs = text.find("**References**").unwrap();
        assert!(meta < result && result < refs);
        assert!(text.contains("- tool: create_entity"));
        assert!(text.contains("- Person:p1"));
    }
}
