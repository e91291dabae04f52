//! Identifier helpers: naming conventions and validation.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

fn identifier_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").ok())
        .as_ref()
}

/// Whether `name` is a plain (optionally schema-qualified) SQL identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_regex().is_some_and(|re| re.is_match(name))
}

/// Validate an identifier supplied at runtime (table handles, join tables).
pub fn validate_identifier(name: &str) -> Result<&str> {
    if is_valid_identifier(name) {
        Ok(name)
    } else {
        Err(Error::Schema(format!("invalid identifier `{}`", name)))
    }
}

/// Convert a type or field name to snake_case.
///
/// `OrderDetail` → `order_detail`, `UserLog` → `user_log`, `HTTPServer` → `http_server`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// English plural of a snake_case word, applied to its last segment.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_ascii_lowercase();
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        return format!("{}es", word);
    }
    if lower.ends_with('y') {
        let before = lower.chars().rev().nth(1);
        if before.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{}ies", &word[..word.len() - 1]);
        }
    }
    format!("{}s", word)
}

/// Default table name: snake_case plural of the type name.
///
/// `User` → `users`, `OrderDetail` → `order_details`, `Address` → `addresses`,
/// `Category` → `categories`.
pub fn default_table_name(type_name: &str) -> String {
    pluralize(&to_snake_case(type_name))
}
