//! Wire types exchanged between the client builder and the router.
//!
//! Requests are JSON objects discriminated by `action`:
//!
//! ```json
//! {"action":"select","table":"widgets","filters":[{"column":"status","operator":"eq","value":"open"}],
//!  "order":[{"column":"created_at","ascending":false}],"limit":5}
//! {"action":"rpc","functionName":"get_reports_within_radius","args":{"lat":1.0,"lng":2.0,"radius_km":5}}
//! ```

use crate::error::GatewayError;
use crate::filter::TableFilter;
use crate::row::Record;
use crate::value::Scalar;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// The statement kinds a [`TableQuery`] can be run as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Select,
    Insert,
    Update,
    Delete,
    Rpc,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Select => "select",
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Rpc => "rpc",
        }
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl OrderSpec {
    pub fn new(column: impl Into<String>, ascending: bool) -> Self {
        Self {
            column: column.into(),
            ascending,
        }
    }
}

/// Count modes; only exact counting is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountMode {
    Exact,
}

/// Row values for insert/update: one object, or a batch of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowValues {
    One(RowObject),
    Many(Vec<RowObject>),
}

impl RowValues {
    /// The rows as a slice; a single object is a one-row batch.
    pub fn rows(&self) -> &[RowObject] {
        match self {
            RowValues::One(row) => std::slice::from_ref(row),
            RowValues::Many(rows) => rows,
        }
    }

    /// Treat a single object as a one-row batch.
    pub fn into_rows(self) -> Vec<RowObject> {
        match self {
            RowValues::One(row) => vec![row],
            RowValues::Many(rows) => rows,
        }
    }
}

impl From<RowObject> for RowValues {
    fn from(row: RowObject) -> Self {
        RowValues::One(row)
    }
}

impl From<Vec<RowObject>> for RowValues {
    fn from(rows: Vec<RowObject>) -> Self {
        RowValues::Many(rows)
    }
}

/// One row of column values, keeping the key order of the source object.
///
/// Insert column lists follow the first row's key order, so keys are not sorted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowObject(Vec<(String, Scalar)>);

impl RowObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column`, replacing an earlier value for the same key in place.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: String, value: Scalar) {
        match self.0.iter_mut().find(|(k, _)| *k == column) {
            Some(slot) => slot.1 = value,
            None => self.0.push((column, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.0.iter().find(|(k, _)| k == column).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for RowObject {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = RowObject::new();
        for (k, v) in iter {
            row.insert(k.into(), v.into());
        }
        row
    }
}

impl Serialize for RowObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RowObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = RowObject;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of column values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RowObject, A::Error> {
                let mut row = RowObject(Vec::with_capacity(access.size_hint().unwrap_or(0)));
                while let Some((k, v)) = access.next_entry::<String, Scalar>()? {
                    row.insert(k, v);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// The structured request for non-RPC actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableQuery {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<TableFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<OrderSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub single: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub maybe_single: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<CountMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<RowValues>,
}

impl TableQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }
}

/// A stored-procedure call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub function_name: String,
    /// Named arguments, bound in key order.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, Scalar>,
}

impl RpcRequest {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }
}

/// A gateway request, discriminated by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum QueryRequest {
    Select(TableQuery),
    Insert(TableQuery),
    Update(TableQuery),
    Delete(TableQuery),
    Rpc(RpcRequest),
}

impl QueryRequest {
    pub fn action(&self) -> Action {
        match self {
            QueryRequest::Select(_) => Action::Select,
            QueryRequest::Insert(_) => Action::Insert,
            QueryRequest::Update(_) => Action::Update,
            QueryRequest::Delete(_) => Action::Delete,
            QueryRequest::Rpc(_) => Action::Rpc,
        }
    }

    /// The table or function the request targets.
    pub fn target(&self) -> &str {
        match self {
            QueryRequest::Select(q)
            | QueryRequest::Insert(q)
            | QueryRequest::Update(q)
            | QueryRequest::Delete(q) => &q.table,
            QueryRequest::Rpc(r) => &r.function_name,
        }
    }
}

/// The error half of a [`QueryResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Message for every execution-side failure.
pub const DATABASE_QUERY_FAILED: &str = "Database query failed";

/// Message for `single` cardinality failures.
pub const SINGLE_ROW_EXPECTED: &str =
    "Expected a single row but query returned a different result size";

impl From<GatewayError> for ResponseError {
    fn from(err: GatewayError) -> Self {
        let code = Some(err.kind().to_string());
        if err.is_validation() || matches!(err, GatewayError::Transport(_)) {
            ResponseError {
                message: err.to_string(),
                details: None,
                code,
            }
        } else if err.is_row_count() {
            ResponseError {
                message: SINGLE_ROW_EXPECTED.to_string(),
                details: Some(err.to_string()),
                code,
            }
        } else {
            ResponseError {
                message: DATABASE_QUERY_FAILED.to_string(),
                details: Some(err.to_string()),
                code,
            }
        }
    }
}

/// Normalized response: exactly one of `data`/`error` carries the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    pub error: Option<ResponseError>,
}

impl QueryResponse {
    /// A list of rows.
    pub fn rows(rows: Vec<Record>) -> Self {
        Self {
            data: JsonValue::Array(rows.into_iter().map(JsonValue::Object).collect()),
            count: None,
            error: None,
        }
    }

    /// A single row, or `null`.
    pub fn row(row: Option<Record>) -> Self {
        Self {
            data: row.map_or(JsonValue::Null, JsonValue::Object),
            count: None,
            error: None,
        }
    }

    pub fn with_count(mut self, count: Option<i64>) -> Self {
        self.count = count;
        self
    }

    pub fn failure(err: GatewayError) -> Self {
        Self {
            data: JsonValue::Null,
            count: None,
            error: Some(err.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOp;
    use serde_json::json;

    #[test]
    fn select_request_parses_from_wire_json() {
        let req: QueryRequest = serde_json::from_value(json!({
            "action": "select",
            "table": "widgets",
            "columns": "id, name",
            "filters": [{"column": "status", "operator": "eq", "value": "open"}],
            "order": [{"column": "created_at", "ascending": false}],
            "limit": 5,
            "maybeSingle": true,
            "count": "exact"
        }))
        .unwrap();

        let QueryRequest::Select(q) = req else {
            panic!("expected select");
        };
        assert_eq!(q.table, "widgets");
        assert_eq!(q.columns.as_deref(), Some("id, name"));
        assert_eq!(q.filters, vec![TableFilter::new("status", FilterOp::Eq, "open")]);
        assert_eq!(q.order, vec![OrderSpec::new("created_at", false)]);
        assert_eq!(q.limit, Some(5));
        assert!(q.maybe_single);
        assert!(!q.single);
        assert_eq!(q.count, Some(CountMode::Exact));
    }

    #[test]
    fn insert_values_accept_object_or_array() {
        let one: QueryRequest =
            serde_json::from_value(json!({"action": "insert", "table": "w", "values": {"name": "a"}}))
                .unwrap();
        let many: QueryRequest = serde_json::from_value(
            json!({"action": "insert", "table": "w", "values": [{"name": "a"}]}),
        )
        .unwrap();
        let (QueryRequest::Insert(one), QueryRequest::Insert(many)) = (one, many) else {
            panic!("expected inserts");
        };
        assert_eq!(
            one.values.unwrap().into_rows(),
            many.values.unwrap().into_rows()
        );
    }

    #[test]
    fn row_object_keeps_key_order() {
        let row: RowObject =
            serde_json::from_str(r#"{"zeta": 1, "alpha": "a", "mid": null}"#).unwrap();
        assert_eq!(row.keys().collect::<Vec<_>>(), ["zeta", "alpha", "mid"]);
        assert_eq!(row.get("mid"), Some(&Scalar::Null));
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"zeta":1,"alpha":"a","mid":null}"#
        );
    }

    #[test]
    fn rpc_request_uses_camel_case() {
        let req: QueryRequest = serde_json::from_value(json!({
            "action": "rpc",
            "functionName": "get_reports_within_radius",
            "args": {"lat": 1.0, "lng": 2.0, "radius_km": 5}
        }))
        .unwrap();
        assert_eq!(req.action(), Action::Rpc);
        assert_eq!(req.target(), "get_reports_within_radius");
        let QueryRequest::Rpc(rpc) = req else {
            panic!("expected rpc");
        };
        assert_eq!(rpc.args["radius_km"], Scalar::Int(5));
    }

    #[test]
    fn order_defaults_to_ascending() {
        let order: OrderSpec = serde_json::from_value(json!({"column": "name"})).unwrap();
        assert!(order.ascending);
    }

    #[test]
    fn errors_are_shaped_by_category() {
        let e: ResponseError = GatewayError::TableNotAllowed("secrets".into()).into();
        assert_eq!(e.message, "Table not allowed: secrets");
        assert_eq!(e.code.as_deref(), Some("table_not_allowed"));

        let e: ResponseError = GatewayError::Pool("timed out".into()).into();
        assert_eq!(e.message, DATABASE_QUERY_FAILED);
        assert_eq!(e.details.as_deref(), Some("Pool error: timed out"));

        let e: ResponseError = GatewayError::UnexpectedRowCount { expected: "1", got: 0 }.into();
        assert_eq!(e.message, SINGLE_ROW_EXPECTED);
    }

    #[test]
    fn failure_response_serializes_null_data() {
        let resp = QueryResponse::failure(GatewayError::EmptyInsert);
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["data"], JsonValue::Null);
        assert_eq!(v["error"]["code"], json!("empty_insert"));
    }
}
