//! Identifier and projection-list sanitizing.
//!
//! Two deliberately different disciplines live here:
//!
//! - [`quote_identifier`] is strict: table names, filter/order columns, insert/update keys and
//!   RPC argument names must match `[A-Za-z0-9_.]+`, and every dot-separated segment is emitted
//!   double-quoted.
//! - [`sanitize_columns`] is looser: a `select` projection list is checked against the
//!   character set `[A-Za-z0-9_*,.\s]+` and passed through unquoted, so multi-column lists such as
//!   `"id, name, created_at"` work without per-column parsing.
//!
//! # Example
//! ```ignore
//! use pggate::ident::{quote_identifier, sanitize_columns};
//!
//! assert_eq!(quote_identifier("public.widgets")?.to_sql(), r#""public"."widgets""#);
//! assert_eq!(sanitize_columns(None)?, "*");
//! # Ok::<(), pggate::GatewayError>(())
//! ```

use crate::error::{GatewayError, GatewayResult};
use std::fmt;

/// A validated identifier, rendered as a sequence of double-quoted segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedIdentifier {
    segments: Vec<String>,
}

impl QuotedIdentifier {
    /// The unquoted segments, in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Render the identifier as SQL.
    pub fn to_sql(&self) -> String {
        // segments + quotes + dots
        let cap = self.segments.iter().map(|s| s.len() + 3).sum::<usize>();
        let mut out = String::with_capacity(cap);
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push('"');
            out.push_str(segment);
            out.push('"');
        }
    }
}

impl fmt::Display for QuotedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn is_column_list_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '*' | ',' | '.') || c.is_whitespace()
}

/// Validate and quote a (possibly dotted) identifier.
///
/// Fails with [`GatewayError::InvalidIdentifier`] unless `name` is non-empty and made only of
/// ASCII letters, digits, `_` and `.`. Because quotes, parentheses, whitespace and `;` can never
/// pass, the quoted output cannot terminate the identifier early.
pub fn quote_identifier(name: &str) -> GatewayResult<QuotedIdentifier> {
    if name.is_empty() || !name.chars().all(is_identifier_char) {
        return Err(GatewayError::invalid_identifier(name));
    }
    Ok(QuotedIdentifier {
        segments: name.split('.').map(str::to_string).collect(),
    })
}

/// Validate a projection list.
///
/// `None` or a blank string selects `*`. Anything else is returned unchanged if every character
/// is in `[A-Za-z0-9_*,.\s]`, and fails with [`GatewayError::InvalidColumnList`] otherwise.
/// Columns are not quoted individually, so reserved words in a projection list are the caller's
/// concern.
pub fn sanitize_columns(columns: Option<&str>) -> GatewayResult<String> {
    let Some(columns) = columns else {
        return Ok("*".to_string());
    };
    if columns.trim().is_empty() {
        return Ok("*".to_string());
    }
    if !columns.chars().all(is_column_list_char) {
        return Err(GatewayError::InvalidColumnList(columns.to_string()));
    }
    Ok(columns.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_simple() {
        assert_eq!(quote_identifier("widgets").unwrap().to_sql(), r#""widgets""#);
    }

    #[test]
    fn quote_dotted_quotes_each_segment() {
        let ident = quote_identifier("public.widgets").unwrap();
        assert_eq!(ident.to_sql(), r#""public"."widgets""#);
        assert_eq!(ident.segments(), ["public", "widgets"]);
    }

    #[test]
    fn quote_keeps_case_and_digits() {
        assert_eq!(
            quote_identifier("Reports_2024").unwrap().to_sql(),
            r#""Reports_2024""#
        );
        assert_eq!(quote_identifier("1col").unwrap().to_sql(), r#""1col""#);
    }

    #[test]
    fn quote_rejects_injection_characters() {
        for bad in [
            "",
            "widgets; drop table widgets",
            r#"widgets" --"#,
            "fn()",
            "a b",
            "a-b",
            "tab\tle",
            "naïve",
        ] {
            assert!(
                matches!(quote_identifier(bad), Err(GatewayError::InvalidIdentifier(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn quoted_segments_round_trip() {
        for name in ["a", "a.b", "schema.table.column", "_x.y_1"] {
            let sql = quote_identifier(name).unwrap().to_sql();
            let unquoted: Vec<&str> = sql.split('.').map(|s| s.trim_matches('"')).collect();
            assert_eq!(unquoted.join("."), name);
        }
    }

    #[test]
    fn columns_default_to_star() {
        assert_eq!(sanitize_columns(None).unwrap(), "*");
        assert_eq!(sanitize_columns(Some("")).unwrap(), "*");
        assert_eq!(sanitize_columns(Some("   ")).unwrap(), "*");
    }

    #[test]
    fn columns_pass_through_unquoted() {
        assert_eq!(
            sanitize_columns(Some("id, name,\n created_at")).unwrap(),
            "id, name,\n created_at"
        );
        assert_eq!(sanitize_columns(Some("w.*")).unwrap(), "w.*");
    }

    #[test]
    fn columns_reject_expressions() {
        for bad in ["count(*)", "id; delete from widgets", "name as \"n\"", "id -- x"] {
            assert!(
                matches!(
                    sanitize_columns(Some(bad)),
                    Err(GatewayError::InvalidColumnList(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }
}
