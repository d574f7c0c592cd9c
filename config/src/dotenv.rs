//! Minimal `.env` parser. Values are collected into a map; precedence
//! against the process environment is applied in `lib`.

use std::collections::HashMap;
use std::path::Path;

/// Parses `KEY=VALUE` lines. Blank lines and `#` comments are skipped; an
/// optional `export ` prefix is tolerated; single- and double-quoted values
/// are unwrapped (double quotes support `\"`).
fn parse(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value[1..value.len() - 1].replace("\\\"", "\"")
        } else if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
            value[1..value.len() - 1].to_string()
        } else {
            value.to_string()
        };
        out.insert(key.to_string(), value);
    }
    out
}

/// Loads `.env` from `dir` (or the current directory). A missing file is an
/// empty map, not an error.
pub fn load(dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => match std::env::current_dir() {
            Ok(d) => d,
            Err(_) => return Ok(HashMap::new()),
        },
    };
    let path = dir.join(".env");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    Ok(parse(&std::fs::read_to_string(path)?))
}
