//! Deterministic YAML frontmatter: insertion-ordered keys, block lists,
//! single-indent nested maps.
//!
//! The writer emits a small YAML subset by construction; the parser reads
//! that same subset back. `parse(format(f)) == f` holds for maps of strings,
//! numbers, booleans, lists of strings, and one level of nested maps.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontmatterError {
    #[error("frontmatter line {0}: {1}")]
    Malformed(usize, String),
    #[error("unterminated frontmatter block")]
    Unterminated,
}

/// A frontmatter value. Lists hold strings; nested maps hold scalars.
#[derive(Clone, Debug, PartialEq)]
pub enum FmValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
    Map(Vec<(String, FmValue)>),
}

impl From<&str> for FmValue {
    fn from(s: &str) -> Self {
        FmValue::String(s.to_string())
    }
}

impl From<String> for FmValue {
    fn from(s: String) -> Self {
        FmValue::String(s)
    }
}

impl From<i64> for FmValue {
    fn from(v: i64) -> Self {
        FmValue::Int(v)
    }
}

impl From<f64> for FmValue {
    fn from(v: f64) -> Self {
        FmValue::Float(v)
    }
}

impl From<bool> for FmValue {
    fn from(v: bool) -> Self {
        FmValue::Bool(v)
    }
}

impl From<Vec<String>> for FmValue {
    fn from(v: Vec<String>) -> Self {
        FmValue::List(v)
    }
}

/// Insertion-ordered frontmatter map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frontmatter {
    entries: Vec<(String, FmValue)>,
}

impl Frontmatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a key. Replacement keeps the original position so
    /// output stays deterministic.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FmValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&FmValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(FmValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FmValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Emits keys in insertion order without the `---` fences.
    pub fn format(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            match value {
                FmValue::String(s) => {
                    out.push_str(&format!("{}: {}\n", key, scalar(s)));
                }
                FmValue::Int(v) => out.push_str(&format!("{}: {}\n", key, v)),
                FmValue::Float(v) => out.push_str(&format!("{}: {}\n", key, v)),
                FmValue::Bool(v) => out.push_str(&format!("{}: {}\n", key, v)),
                FmValue::List(items) => {
                    out.push_str(&format!("{}:\n", key));
                    for item in items {
                        out.push_str(&format!("  - {}\n", scalar(item)));
                    }
                }
                FmValue::Map(entries) => {
                    out.push_str(&format!("{}:\n", key));
                    for (k, v) in entries {
                        let rendered = match v {
                            FmValue::String(s) => scalar(s),
                            FmValue::Int(n) => n.to_string(),
                            FmValue::Float(n) => n.to_string(),
                            FmValue::Bool(b) => b.to_string(),
                            // Deeper nesting is not part of the format.
                            FmValue::List(_) | FmValue::Map(_) => String::new(),
                        };
                        out.push_str(&format!("  {}: {}\n", k, rendered));
                    }
                }
            }
        }
        out
    }

    /// Full fenced block, ready to prepend to a document body.
    pub fn to_block(&self) -> String {
        format!("---\n{}---\n", self.format())
    }

    /// Parses a fenced block at the start of `text`. Returns the frontmatter
    /// and the remaining body. Text without a leading fence yields an empty
    /// frontmatter and the text unchanged.
    pub fn parse_document(text: &str) -> Result<(Frontmatter, String), FrontmatterError> {
        let Some(rest) = text.strip_prefix("---\n") else {
            return Ok((Frontmatter::default(), text.to_string()));
        };
        let Some(end) = rest.find("\n---") else {
            return Err(FrontmatterError::Unterminated);
        };
        let block = &rest[..end + 1];
        let mut body = &rest[end + 4..];
        if let Some(stripped) = body.strip_prefix('\n') {
            body = stripped;
        }
        let fm = Self::parse(block)?;
        Ok((fm, body.to_string()))
    }

    /// Parses the bare (unfenced) key block.
    pub fn parse(block: &str) -> Result<Frontmatter, FrontmatterError> {
        let mut fm = Frontmatter::new();
        let lines: Vec<&str> = block.lines().collect();
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            if line.trim().is_empty() {
                i += 1;
                continue;
            }
            if line.starts_with(' ') {
                return Err(FrontmatterError::Malformed(i + 1, line.to_string()));
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(FrontmatterError::Malformed(i + 1, line.to_string()));
            };
            let key = key.trim().to_string();
            let value = value.trim();
            if !value.is_empty() {
                fm.entries.push((key, parse_scalar(value)));
                i += 1;
                continue;
            }
            // Block form: list items or a nested map, one indent level.
            let mut items: Vec<String> = Vec::new();
            let mut nested: Vec<(String, FmValue)> = Vec::new();
            let mut j = i + 1;
            while j < lines.len() {
                let sub = lines[j];
                if !sub.starts_with("  ") || sub.trim().is_empty() {
                    break;
                }
                let sub = &sub[2..];
                if let Some(item) = sub.strip_prefix("- ") {
                    items.push(unquote(item.trim()));
                } else if let Some((k, v)) = sub.split_once(':') {
                    nested.push((k.trim().to_string(), parse_scalar(v.trim())));
                } else {
                    return Err(FrontmatterError::Malformed(j + 1, sub.to_string()));
                }
                j += 1;
            }
            if !nested.is_empty() {
                fm.entries.push((key, FmValue::Map(nested)));
            } else {
                fm.entries.push((key, FmValue::List(items)));
            }
            i = j;
        }
        Ok(fm)
    }
}

/// Quotes a scalar only when the raw form would be ambiguous.
fn scalar(s: &str) -> String {
    let needs_quoting = s.is_empty()
        || s.contains(": ")
        || s.ends_with(':')
        || s.starts_with(['\'', '"', '-', '[', '{', '#', '&', '*', '!', '|', '>', '%', '@'])
        || s.starts_with(' ')
        || s.ends_with(' ')
        || s.contains('\n')
        || looks_scalar_typed(s);
    if needs_quoting {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        s.to_string()
    }
}

/// Raw strings that would re-parse as a non-string scalar must be quoted.
fn looks_scalar_typed(s: &str) -> bool {
    matches!(s, "true" | "false" | "null" | "~")
        || s.parse::<i64>().is_ok()
        || s.parse::<f64>().is_ok()
}

fn parse_scalar(raw: &str) -> FmValue {
    if raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2 {
        return FmValue::String(
            raw[1..raw.len() - 1]
                .replace("\\\"", "\"")
                .replace("\\\\", "\\"),
        );
    }
    match raw {
        "true" => return FmValue::Bool(true),
        "false" => return FmValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return FmValue::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return FmValue::Float(f);
    }
    FmValue::String(raw.to_string())
}

fn unquote(raw: &str) -> String {
    if raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2 {
        raw[1..raw.len() - 1]
            .replace("\\\"", "\"")
            .replace("\\\\", "\\")
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frontmatter {
        let mut fm = Frontmatter::new();
        fm.insert("title", "Reasoning Chain");
        fm.insert("chain_id", "abc-123");
        fm.insert("confidence", 0.85);
        fm.insert("steps", 4i64);
        fm.insert("completed", true);
        fm.insert(
            "tags",
            vec!["branch".to_string(), "analysis".to_string()],
        );
        fm
    }

    /// **Scenario**: parse(format(f)) == f for scalars and string lists.
    #[test]
    fn round_trip() {
        let fm = sample();
        let parsed = Frontmatter::parse(&fm.format()).unwrap();
        assert_eq!(parsed, fm);
    }

    /// **Scenario**: keys come back in insertion order.
    #[test]
    fn insertion_order_preserved() {
        let fm = sample();
        let keys: Vec<&str> = fm.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec!["title", "chain_id", "confidence", "steps", "completed", "tags"]
        );
        let text = fm.format();
        let title_pos = text.find("title:").unwrap();
        let tags_pos = text.find("tags:").unwrap();
        assert!(title_pos < tags_pos);
    }

    /// **Scenario**: strings that look like other scalar types survive the
    /// round trip as strings.
    #[test]
    fn ambiguous_strings_stay_strings() {
        let mut fm = Frontmatter::new();
        fm.insert("a", "true");
        fm.insert("b", "42");
        fm.insert("c", "3.5");
        fm.insert("d", "needs: quoting");
        let parsed = Frontmatter::parse(&fm.format()).unwrap();
        assert_eq!(parsed, fm);
    }

    /// **Scenario**: the emitted subset is valid YAML (oracle: serde_yaml).
    #[test]
    fn output_is_valid_yaml() {
        let fm = sample();
        let value: serde_yaml::Value = serde_yaml::from_str(&fm.format()).unwrap();
        assert_eq!(
            value.get("chain_id").and_then(|v| v.as_str()),
            Some("abc-123")
        );
        assert_eq!(value.get("steps").and_then(|v| v.as_i64()), Some(4));
        let tags = value.get("tags").and_then(|v| v.as_sequence()).unwrap();
        assert_eq!(tags.len(), 2);
    }

    /// **Scenario**: fenced documents split into frontmatter and body; plain
    /// documents pass through.
    #[test]
    fn document_split() {
        let text = "---\ntitle: X\n---\n\nBody here\n";
        let (fm, body) = Frontmatter::parse_document(text).unwrap();
        assert_eq!(fm.get_str("title"), Some("X"));
        assert_eq!(body, "\nBody here\n");

        let (fm, body) = Frontmatter::parse_document("no fences\n").unwrap();
        assert!(fm.is_empty());
        assert_eq!(body, "no fences\n");
    }

    /// **Scenario**: nested maps emit one indent level and parse back.
    #[test]
    fn nested_map() {
        let mut fm = Frontmatter::new();
        fm.insert(
            "meta",
            FmValue::Map(vec![
                ("source".to_string(), FmValue::String("graph".into())),
                ("count".to_string(), FmValue::Int(2)),
            ]),
        );
        let parsed = Frontmatter::parse(&fm.format()).unwrap();
        assert_eq!(parsed, fm);
    }

    /// **Scenario**: an unterminated fence is an error, not silent text.
    #[test]
    fn unterminated_block() {
        let err = Frontmatter::parse_document("---\ntitle: X\n").unwrap_err();
        assert!(matches!(err, FrontmatterError::Unterminated));
    }
}
