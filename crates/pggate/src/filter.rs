//! Filter terms and the parameterized `WHERE` clause builder.
//!
//! Placeholders are numbered from a caller-supplied start index, so a `WHERE` clause can follow
//! an `UPDATE ... SET` list and continue its numbering.

use crate::error::{GatewayError, GatewayResult};
use crate::ident::quote_identifier;
use crate::value::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Like,
    Ilike,
    Is,
}

impl FilterOp {
    pub const ALL: [FilterOp; 10] = [
        FilterOp::Eq,
        FilterOp::Neq,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::In,
        FilterOp::Like,
        FilterOp::Ilike,
        FilterOp::Is,
    ];

    /// Wire name of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::In => "in",
            FilterOp::Like => "like",
            FilterOp::Ilike => "ilike",
            FilterOp::Is => "is",
        }
    }

    /// SQL operator for the single-placeholder comparison forms.
    fn comparison_sql(self) -> Option<&'static str> {
        match self {
            FilterOp::Eq => Some("="),
            FilterOp::Neq => Some("<>"),
            FilterOp::Gt => Some(">"),
            FilterOp::Gte => Some(">="),
            FilterOp::Lt => Some("<"),
            FilterOp::Lte => Some("<="),
            FilterOp::Like => Some("LIKE"),
            FilterOp::Ilike => Some("ILIKE"),
            FilterOp::In | FilterOp::Is => None,
        }
    }
}

impl FromStr for FilterOp {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterOp::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| GatewayError::UnsupportedOperator(s.to_string()))
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One predicate term.
///
/// `operator` keeps the text it arrived with; it is parsed when the clause is built, so an
/// unknown operator fails with [`GatewayError::UnsupportedOperator`] like any other malformed term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFilter {
    pub column: String,
    pub operator: String,
    #[serde(default)]
    pub value: Scalar,
}

impl TableFilter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<Scalar>) -> Self {
        Self {
            column: column.into(),
            operator: op.as_str().to_string(),
            value: value.into(),
        }
    }
}

/// A rendered `WHERE` clause and the values bound to its placeholders, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    /// Empty, or `WHERE ...`.
    pub clause: String,
    pub values: Vec<Scalar>,
}

impl WhereClause {
    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
    }
}

/// Build a `WHERE` clause from `filters`, numbering placeholders from `start_index`.
///
/// Terms are joined with `AND` in list order. `is`, and `eq`/`neq` against null, bind no value;
/// every other term binds exactly one. An empty filter list yields an empty clause.
pub fn build_where(filters: &[TableFilter], start_index: usize) -> GatewayResult<WhereClause> {
    if filters.is_empty() {
        return Ok(WhereClause::default());
    }

    let mut terms = Vec::with_capacity(filters.len());
    let mut values = Vec::with_capacity(filters.len());

    for filter in filters {
        let op: FilterOp = filter.operator.parse()?;
        let column = quote_identifier(&filter.column)?.to_sql();
        let next = start_index + values.len();

        let term = match (op, op.comparison_sql()) {
            (FilterOp::Eq, _) if filter.value.is_null() => format!("{column} IS NULL"),
            (FilterOp::Neq, _) if filter.value.is_null() => format!("{column} IS NOT NULL"),
            (FilterOp::Is, _) => {
                if filter.value.is_truthy() {
                    format!("{column} IS NOT NULL")
                } else {
                    format!("{column} IS NULL")
                }
            }
            (FilterOp::In, _) => {
                if !matches!(filter.value, Scalar::List(_)) {
                    return Err(GatewayError::InvalidFilter(format!(
                        "'in' on column '{}' requires an array value, got {}",
                        filter.column,
                        filter.value.kind_name()
                    )));
                }
                values.push(filter.value.clone());
                format!("{column} = ANY(${next})")
            }
            (_, Some(sql_op)) => {
                if matches!(filter.value, Scalar::List(_)) {
                    return Err(GatewayError::InvalidFilter(format!(
                        "'{}' on column '{}' requires a scalar value",
                        op, filter.column
                    )));
                }
                values.push(filter.value.clone());
                format!("{column} {sql_op} ${next}")
            }
            (_, None) => return Err(GatewayError::UnsupportedOperator(op.to_string())),
        };
        terms.push(term);
    }

    Ok(WhereClause {
        clause: format!("WHERE {}", terms.join(" AND ")),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(column: &str, op: FilterOp, value: impl Into<Scalar>) -> TableFilter {
        TableFilter::new(column, op, value)
    }

    #[test]
    fn empty_filters_mean_no_restriction() {
        let w = build_where(&[], 1).unwrap();
        assert!(w.is_empty());
        assert!(w.values.is_empty());
    }

    #[test]
    fn comparison_operators() {
        let w = build_where(
            &[
                f("a", FilterOp::Eq, 1),
                f("b", FilterOp::Neq, "x"),
                f("c", FilterOp::Gt, 2),
                f("d", FilterOp::Gte, 3),
                f("e", FilterOp::Lt, 4),
                f("g", FilterOp::Lte, 5),
            ],
            1,
        )
        .unwrap();
        assert_eq!(
            w.clause,
            r#"WHERE "a" = $1 AND "b" <> $2 AND "c" > $3 AND "d" >= $4 AND "e" < $5 AND "g" <= $6"#
        );
        assert_eq!(w.values.len(), 6);
    }

    #[test]
    fn null_equality_binds_nothing() {
        let w = build_where(
            &[
                f("deleted_at", FilterOp::Eq, Scalar::Null),
                f("closed_at", FilterOp::Neq, Scalar::Null),
                f("status", FilterOp::Eq, "open"),
            ],
            1,
        )
        .unwrap();
        assert_eq!(
            w.clause,
            r#"WHERE "deleted_at" IS NULL AND "closed_at" IS NOT NULL AND "status" = $1"#
        );
        assert_eq!(w.values, vec![Scalar::Text("open".into())]);
    }

    #[test]
    fn is_uses_truthiness() {
        let w = build_where(
            &[
                f("a", FilterOp::Is, Scalar::Null),
                f("b", FilterOp::Is, true),
                f("c", FilterOp::Is, false),
            ],
            1,
        )
        .unwrap();
        assert_eq!(
            w.clause,
            r#"WHERE "a" IS NULL AND "b" IS NOT NULL AND "c" IS NULL"#
        );
        assert!(w.values.is_empty());
    }

    #[test]
    fn in_binds_one_array() {
        let w = build_where(&[f("id", FilterOp::In, vec!["1", "2"])], 1).unwrap();
        assert_eq!(w.clause, r#"WHERE "id" = ANY($1)"#);
        assert_eq!(w.values, vec![Scalar::from(vec!["1", "2"])]);
    }

    #[test]
    fn in_rejects_scalar_value() {
        let err = build_where(&[f("id", FilterOp::In, "1")], 1).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidFilter(_)));
    }

    #[test]
    fn scalar_operators_reject_arrays() {
        let err = build_where(&[f("id", FilterOp::Eq, vec![1, 2])], 1).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidFilter(_)));
    }

    #[test]
    fn like_patterns_are_bound_verbatim() {
        let w = build_where(
            &[f("name", FilterOp::Like, "ab%"), f("name", FilterOp::Ilike, "x")],
            1,
        )
        .unwrap();
        assert_eq!(w.clause, r#"WHERE "name" LIKE $1 AND "name" ILIKE $2"#);
        assert_eq!(w.values[1], Scalar::Text("x".into()));
    }

    #[test]
    fn start_index_offsets_every_placeholder() {
        let filters = [
            f("a", FilterOp::Eq, 1),
            f("b", FilterOp::Is, Scalar::Null),
            f("c", FilterOp::In, vec![1]),
        ];
        let w = build_where(&filters, 4).unwrap();
        assert_eq!(w.clause, r#"WHERE "a" = $4 AND "b" IS NULL AND "c" = ANY($5)"#);
    }

    #[test]
    fn placeholder_count_matches_bound_terms() {
        let filters = [
            f("a", FilterOp::Eq, Scalar::Null),
            f("b", FilterOp::Lt, 1),
            f("c", FilterOp::Is, true),
            f("d", FilterOp::Neq, 2),
        ];
        let w = build_where(&filters, 1).unwrap();
        assert_eq!(w.clause.matches('$').count(), 2);
        assert_eq!(w.values.len(), 2);
    }

    #[test]
    fn unknown_operator_is_unsupported() {
        let filter = TableFilter {
            column: "a".into(),
            operator: "contains".into(),
            value: Scalar::Int(1),
        };
        let err = build_where(&[filter], 1).unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedOperator(op) if op == "contains"));
    }

    #[test]
    fn column_names_are_validated() {
        let err = build_where(&[f("a; --", FilterOp::Eq, 1)], 1).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidIdentifier(_)));
    }

    #[test]
    fn filter_deserializes_from_wire_shape() {
        let filter: TableFilter =
            serde_json::from_str(r#"{"column":"status","operator":"eq","value":"open"}"#).unwrap();
        assert_eq!(filter, TableFilter::new("status", FilterOp::Eq, "open"));

        let filter: TableFilter =
            serde_json::from_str(r#"{"column":"closed_at","operator":"is"}"#).unwrap();
        assert_eq!(filter.value, Scalar::Null);
    }
}
