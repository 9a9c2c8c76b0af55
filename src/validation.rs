//! Registration-time validation utilities.

use crate::types::{Error, Result};

/// Validate that a string is not empty or blank.
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.trim().is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Validate that a nesting depth stays within `max`.
pub fn validate_depth(depth: usize, max: usize, field: &str) -> Result<()> {
    if depth > max {
        return Err(Error::validation(format!(
            "{} nests {} levels deep, maximum is {}",
            field, depth, max
        )));
    }
    Ok(())
}

/// Validate that a base URL is absolute http(s).
pub fn validate_base_url(url: &str, field: &str) -> Result<reqwest::Url> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| Error::validation(format!("{} is not a valid URL: {}", field, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::validation(format!(
            "{} must use http or https, got '{}'",
            field,
            parsed.scheme()
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty() {
        assert!(validate_non_empty("x", "description").is_ok());
        let err = validate_non_empty("  ", "description").unwrap_err();
        assert!(err.to_string().contains("description cannot be empty"));
    }

    #[test]
    fn test_depth() {
        assert!(validate_depth(3, 32, "schema").is_ok());
        assert!(validate_depth(33, 32, "schema").is_err());
    }

    #[test]
    fn test_base_url() {
        assert!(validate_base_url("https://api.github.com", "base_url").is_ok());
        assert!(validate_base_url("ftp://example.com", "base_url").is_err());
        assert!(validate_base_url("not a url", "base_url").is_err());
    }
}
