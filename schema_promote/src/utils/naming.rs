//! Naming utilities for schema_promote
//!
//! Identifier quoting, full-name rendering and the case-insensitive identity
//! keys the diff engine matches objects by.

use std::collections::HashMap;

/// Quote an identifier with brackets, escaping any closing bracket
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Render a two-part name as `[schema].[name]`
pub fn full_name(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(name))
}

/// Build the case-insensitive identity key for a multi-part name
pub fn identity_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

/// Render a column list as `[a], [b]`
pub fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|name| quote_identifier(name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a comma-separated list back into names, stripping any brackets
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|part| {
            part.trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .replace("]]", "]")
        })
        .filter(|part| !part.is_empty())
        .collect()
}

/// Check for name conflicts in a list of identifiers
pub fn check_identifier_conflicts(
    names: &[String],
    ignore_case: bool,
) -> Option<(String, String)> {
    let mut seen = HashMap::<String, String>::new();

    for name in names {
        let key = if ignore_case { name.to_lowercase() } else { name.clone() };

        if let Some(existing) = seen.get(&key) {
            return Some((existing.clone(), name.clone()));
        }
        seen.insert(key, name.clone());
    }

    None
}

/// Sanitize a label so it can be used as part of a file name
pub fn sanitize_file_stem(label: &str) -> String {
    let sanitized: String = label
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}
