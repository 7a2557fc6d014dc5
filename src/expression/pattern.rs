use crate::core::{Result, StoreError};
use regex::Regex;

/// Convert a LIKE pattern into an anchored regex.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' if chars.peek().is_some() => {
                if let Some(escaped) = chars.next() {
                    regex.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Fast path for patterns that need no regex.
fn fast_path_like(text: &str, pattern: &str) -> Option<bool> {
    if pattern.contains('_') || pattern.contains('\\') {
        return None;
    }

    let wildcards = pattern.matches('%').count();
    match wildcards {
        0 => Some(text == pattern),
        1 if pattern.ends_with('%') => Some(text.starts_with(&pattern[..pattern.len() - 1])),
        1 if pattern.starts_with('%') => Some(text.ends_with(&pattern[1..])),
        2 if pattern.len() >= 2 && pattern.starts_with('%') && pattern.ends_with('%') => {
            Some(text.contains(&pattern[1..pattern.len() - 1]))
        }
        _ => None,
    }
}

/// Case-sensitive SQL LIKE.
pub fn eval_like(text: &str, pattern: &str) -> Result<bool> {
    if let Some(result) = fast_path_like(text, pattern) {
        return Ok(result);
    }

    let regex = Regex::new(&like_to_regex(pattern))
        .map_err(|e| StoreError::ExecutionError(format!("Invalid LIKE pattern: {}", e)))?;
    Ok(regex.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_fast_paths() {
        assert!(eval_like("authentik.tenants.EventType", "authentik.tenants%").unwrap());
        assert!(eval_like("authentik.tenants.EventType", "%EventType").unwrap());
        assert!(eval_like("authentik.tenants.EventType", "%tenants%").unwrap());
        assert!(!eval_like("authentik.brands.EventType", "%tenants%").unwrap());
        assert!(eval_like("tenant", "tenant").unwrap());
    }

    #[test]
    fn test_like_regex_path() {
        assert!(eval_like("0005_import_from_tenants", "000_\\_import%").unwrap());
        // '.' is literal, not a regex wildcard
        assert!(!eval_like("authentikXtenants", "authentik.tenants").unwrap());
        assert!(eval_like("a.b", "a_b").unwrap());
    }
}
