use crate::execution::errors::PropertiesError;
use std::collections::BTreeMap;

/// Parses `key=value` text. Blank lines and lines starting with `#` or `!`
/// are skipped; surrounding whitespace and matching quotes are removed from
/// values. Later duplicates replace earlier ones.
pub fn parse_properties(content: &str) -> Result<BTreeMap<String, String>, PropertiesError> {
    let mut entries = BTreeMap::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let Some(eq_pos) = line.find('=') else {
            return Err(PropertiesError::Malformed { line: line_num + 1 });
        };

        let key = line[..eq_pos].trim();
        if key.is_empty() {
            return Err(PropertiesError::EmptyKey { line: line_num + 1 });
        }

        let value = unquote_value(&line[eq_pos + 1..]);
        entries.insert(key.to_string(), value);
    }

    Ok(entries)
}

fn unquote_value(value: &str) -> String {
    let value = value.trim();

    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }

    value.to_string()
}
