//! SQL identifier validation and quoting.
//!
//! Table and column names come from configuration and catalog metadata and
//! are spliced into generated SQL, so every one goes through
//! [`quote_identifier`] first.

/// Check that `identifier` is non-empty and free of NUL bytes. SQLite puts
/// no limit on identifier length, so neither does this.
pub fn validate_identifier(identifier: &str) -> Result<(), String> {
    if identifier.trim().is_empty() {
        return Err("identifier cannot be empty or whitespace-only".to_string());
    }
    if identifier.contains('\0') {
        return Err("identifier cannot contain null bytes".to_string());
    }
    Ok(())
}

/// Validate `identifier` and wrap it in double quotes, doubling any
/// embedded quote characters.
pub fn quote_identifier(identifier: &str) -> Result<String, String> {
    validate_identifier(identifier)?;
    let escaped = identifier.replace('"', "\"\"");
    Ok(format!("\"{escaped}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_quoted() {
        assert_eq!(quote_identifier("users").unwrap(), r#""users""#);
        assert_eq!(quote_identifier("order items").unwrap(), r#""order items""#);
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(
            quote_identifier(r#"bad"; DROP TABLE x; --"#).unwrap(),
            r#""bad""; DROP TABLE x; --""#
        );
    }

    #[test]
    fn rejects_empty_and_nul() {
        assert!(quote_identifier("").is_err());
        assert!(quote_identifier("   ").is_err());
        assert!(quote_identifier("a\0b").is_err());
    }

    #[test]
    fn long_names_are_accepted() {
        let name = "t".repeat(300);
        assert_eq!(quote_identifier(&name).unwrap(), format!("\"{name}\""));
    }
}
