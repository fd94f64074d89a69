//! Helpers for record plaintext: the `key: value` convention, masking and
//! password generation.

use std::sync::LazyLock;

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use regex::Regex;
use serde_yaml::Value;

pub const MASK: &str = "************";
pub const GENERATED_PASSWORD_LEN: usize = 20;

static PASSWORD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"password: [^\n\s]+").expect("mask pattern")
});

/// Replaces the value of every `password: <token>` line with [`MASK`].
pub fn obscure(content: &str) -> String {
    PASSWORD_LINE
        .replace_all(content, format!("password: {MASK}").as_str())
        .into_owned()
}

fn mapping(content: &str) -> Option<serde_yaml::Mapping> {
    match serde_yaml::from_str::<Value>(content).ok()? {
        Value::Mapping(map) => Some(map),
        _ => None,
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Value of the top level key `name` (case-insensitive), empty when absent.
pub fn field(content: &str, name: &str) -> String {
    let Some(map) = mapping(content) else {
        return String::new();
    };
    map.iter()
        .find(|(key, _)| scalar(key).is_some_and(|k| k.eq_ignore_ascii_case(name)))
        .and_then(|(_, value)| scalar(value))
        .unwrap_or_default()
}

/// Top level keys of the record, in document order.
pub fn field_names(content: &str) -> Vec<String> {
    mapping(content)
        .map(|map| map.keys().filter_map(scalar).collect())
        .unwrap_or_default()
}

/// Diagnostic for content that is not a well formed key-value document.
pub fn check(content: &str) -> Option<String> {
    if content.trim().is_empty() {
        return None;
    }
    match serde_yaml::from_str::<Value>(content) {
        Ok(Value::Mapping(_)) => None,
        Ok(_) => Some("The content is not a set of 'key: value' lines.".to_string()),
        Err(e) => Some(match e.location() {
            Some(loc) => format!("Line {}, column {}: {e}", loc.line(), loc.column()),
            None => e.to_string(),
        }),
    }
}

pub fn generate_password(len: usize) -> String {
    let target_len = len.max(12);
    let upper = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
    let lower = b"abcdefghijkmnopqrstuvwxyz";
    let digits = b"23456789";
    let special = b"!@#$%^&*()-_=+[]{};,.?";

    let mut rng = OsRng;
    let mut chars: Vec<char> = [&upper[..], &lower[..], &digits[..], &special[..]]
        .iter()
        .filter_map(|set| set.choose(&mut rng))
        .map(|&b| b as char)
        .collect();

    let all: Vec<u8> = [&upper[..], &lower[..], &digits[..], &special[..]].concat();
    while chars.len() < target_len {
        match all.choose(&mut rng) {
            Some(&b) => chars.push(b as char),
            None => break,
        }
    }
    chars.shuffle(&mut rng);
    // a leading symbol could turn a `password: <value>` line into YAML syntax
    if let Some(pos) = chars.iter().position(|c| c.is_ascii_alphanumeric()) {
        chars.swap(0, pos);
    }
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn obscure_masks_password_token() {
        assert_eq!(obscure("password: secret123\n"), "password: ************\n");
        assert_eq!(
            obscure("user: bob\npassword: a\nurl: x\n"),
            "user: bob\npassword: ************\nurl: x\n"
        );
    }

    #[test]
    fn obscure_without_password_line_is_noop() {
        let content = "user: bob\nnote: nothing here\n";
        assert_eq!(obscure(content), content);
        assert_eq!(obscure(&obscure(content)), content);
        assert_eq!(obscure("password:\n"), "password:\n");
    }

    #[test]
    fn field_lookup_is_case_insensitive() {
        let content = "User: bob\npassword: hunter2\npin: 1234\n";
        assert_eq!(field(content, "user"), "bob");
        assert_eq!(field(content, "PASSWORD"), "hunter2");
        assert_eq!(field(content, "pin"), "1234");
        assert_eq!(field(content, "missing"), "");
        assert_eq!(field("not: [valid", "not"), "");
    }

    #[test]
    fn field_names_follow_document_order() {
        assert_eq!(field_names("b: 1\na: 2\n"), vec!["b", "a"]);
        assert!(field_names("just text").is_empty());
    }

    #[test]
    fn check_reports_malformed_content() {
        assert_eq!(check("user: bob\npassword: x\n"), None);
        assert_eq!(check(""), None);
        assert!(check("user: [unclosed\n").is_some());
        assert!(check("just a sentence").is_some());
    }

    #[test]
    fn generated_password_mixes_classes() {
        let pw = generate_password(GENERATED_PASSWORD_LEN);
        assert_eq!(pw.chars().count(), GENERATED_PASSWORD_LEN);
        assert!(pw.chars().any(|c| c.is_ascii_uppercase()));
        assert!(pw.chars().any(|c| c.is_ascii_lowercase()));
        assert!(pw.chars().any(|c| c.is_ascii_digit()));
        assert!(pw.starts_with(|c: char| c.is_ascii_alphanumeric()));
        assert_eq!(field(&format!("password: {pw}\n"), "password"), pw);
        assert_eq!(generate_password(3).chars().count(), 12);
    }
}
