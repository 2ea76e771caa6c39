//! The closed value type carried by filters, row values and RPC arguments.
//!
//! Requests arrive as JSON, but nothing downstream of deserialization sees an open
//! `serde_json::Value`: every bound parameter is a [`Scalar`]. Binding is driven by the
//! parameter type Postgres infers for each `$n`, so a JSON number can land in an `int4` column
//! and a JSON string in a `uuid` or `timestamptz` column without caller-side casts.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::str::FromStr;
use tokio_postgres::types::{IsNull, Json, Kind, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn Error + Sync + Send>;

/// A single bindable value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A flat list of scalars, bound as a Postgres array (`col = ANY($n)`).
    List(Vec<Scalar>),
    /// Objects and nested arrays, bound to `json`/`jsonb`.
    Json(JsonValue),
}

impl Scalar {
    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "integer",
            Scalar::Float(_) => "float",
            Scalar::Text(_) => "text",
            Scalar::List(_) => "list",
            Scalar::Json(_) => "json",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Truthiness used by the `is` operator: `null`, `false`, `0`, `0.0` and `""` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Int(i) => *i != 0,
            Scalar::Float(f) => *f != 0.0 && !f.is_nan(),
            Scalar::Text(s) => !s.is_empty(),
            Scalar::List(_) | Scalar::Json(_) => true,
        }
    }

    /// Convert back to JSON.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Scalar::Null => JsonValue::Null,
            Scalar::Bool(b) => JsonValue::Bool(*b),
            Scalar::Int(i) => JsonValue::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Scalar::Text(s) => JsonValue::String(s.clone()),
            Scalar::List(items) => JsonValue::Array(items.iter().map(Scalar::to_json).collect()),
            Scalar::Json(v) => v.clone(),
        }
    }

    fn is_flat(value: &JsonValue) -> bool {
        !matches!(value, JsonValue::Array(_) | JsonValue::Object(_))
    }
}

impl From<JsonValue> for Scalar {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Scalar::Null,
            JsonValue::Bool(b) => Scalar::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Scalar::Text(s),
            JsonValue::Array(items) if items.iter().all(Scalar::is_flat) => {
                Scalar::List(items.into_iter().map(Scalar::from).collect())
            }
            other => Scalar::Json(other),
        }
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(Scalar::from)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

macro_rules! scalar_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Scalar {
            fn from(v: $t) -> Self {
                Scalar::Int(i64::from(v))
            }
        })*
    };
}

scalar_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::Float(f64::from(v))
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<uuid::Uuid> for Scalar {
    fn from(v: uuid::Uuid) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(v: DateTime<Utc>) -> Self {
        Scalar::Text(v.to_rfc3339())
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map_or(Scalar::Null, Into::into)
    }
}

impl<T: Into<Scalar>> From<Vec<T>> for Scalar {
    fn from(v: Vec<T>) -> Self {
        Scalar::List(v.into_iter().map(Into::into).collect())
    }
}

// ─── ToSql ──────────────────────────────────────────────────────────────────

fn is_text_like(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    ) || matches!(ty.kind(), Kind::Enum(_))
        || ty.name() == "citext"
}

fn mismatch(value: &Scalar, ty: &Type) -> BoxError {
    format!("cannot bind {} value to parameter of type {}", value.kind_name(), ty).into()
}

fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, BoxError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(dt.with_timezone(&Utc));
    }
    // A zone-less timestamp is read as UTC.
    Ok(parse_timestamp(s)?.and_utc())
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, BoxError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|e| format!("invalid timestamp '{s}': {e}").into())
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => true.to_sql(ty, out),
            "false" | "f" | "0" => false.to_sql(ty, out),
            _ => Err(format!("invalid boolean '{s}'").into()),
        },
        Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
        Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => Decimal::from_str(s.trim())?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_timestamptz(s)?.to_sql(ty, out),
        Type::TIMESTAMP => parse_timestamp(s)?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIME => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")?.to_sql(ty, out),
        Type::JSON | Type::JSONB => Json(JsonValue::String(s.to_string())).to_sql(ty, out),
        // Enums and text-likes take the raw UTF-8 label.
        _ if is_text_like(ty) => s.to_sql(ty, out),
        _ => Err(mismatch(&Scalar::Text(String::new()), ty)),
    }
}

fn encode_int(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(i)
            .map_err(|_| format!("value {i} out of range for int2"))?
            .to_sql(ty, out),
        Type::INT4 => i32::try_from(i)
            .map_err(|_| format!("value {i} out of range for int4"))?
            .to_sql(ty, out),
        Type::INT8 => i.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(i).to_sql(ty, out),
        Type::JSON | Type::JSONB => Json(JsonValue::from(i)).to_sql(ty, out),
        _ if is_text_like(ty) => i.to_string().as_str().to_sql(ty, out),
        _ => Err(mismatch(&Scalar::Int(i), ty)),
    }
}

fn encode_float(f: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::FLOAT8 => f.to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(f)?.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 if f.fract() == 0.0 => {
            // `as` saturates; the upper bound 2^63 itself is out of range.
            if !(i64::MIN as f64..i64::MAX as f64).contains(&f) {
                return Err(format!("value {f} out of range for {ty}").into());
            }
            encode_int(f as i64, ty, out)
        }
        Type::JSON | Type::JSONB => Json(Scalar::Float(f).to_json()).to_sql(ty, out),
        _ if is_text_like(ty) => f.to_string().as_str().to_sql(ty, out),
        _ => Err(mismatch(&Scalar::Float(f), ty)),
    }
}

impl ToSql for Scalar {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        // Domains are transmitted as their base type.
        if let Kind::Domain(base) = ty.kind() {
            return self.to_sql(base, out);
        }

        match self {
            Scalar::Null => Ok(IsNull::Yes),
            Scalar::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                Type::JSON | Type::JSONB => Json(JsonValue::Bool(*b)).to_sql(ty, out),
                _ if is_text_like(ty) => (if *b { "true" } else { "false" }).to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Scalar::Int(i) => encode_int(*i, ty, out),
            Scalar::Float(f) => encode_float(*f, ty, out),
            Scalar::Text(s) => encode_text(s, ty, out),
            Scalar::List(items) => match ty.kind() {
                // Elements are encoded against the member type by the slice impl.
                Kind::Array(_) => items.as_slice().to_sql(ty, out),
                _ if matches!(*ty, Type::JSON | Type::JSONB) => {
                    Json(self.to_json()).to_sql(ty, out)
                }
                _ => Err(mismatch(self, ty)),
            },
            Scalar::Json(v) => match *ty {
                Type::JSON | Type::JSONB => Json(v).to_sql(ty, out),
                _ if is_text_like(ty) => v.to_string().as_str().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(value: &Scalar, ty: &Type) -> Result<(IsNull, Vec<u8>), BoxError> {
        let mut buf = BytesMut::new();
        let is_null = value.to_sql(ty, &mut buf)?;
        Ok((is_null, buf.to_vec()))
    }

    #[test]
    fn json_maps_onto_closed_variants() {
        assert_eq!(Scalar::from(json!(null)), Scalar::Null);
        assert_eq!(Scalar::from(json!(true)), Scalar::Bool(true));
        assert_eq!(Scalar::from(json!(5)), Scalar::Int(5));
        assert_eq!(Scalar::from(json!(1.5)), Scalar::Float(1.5));
        assert_eq!(Scalar::from(json!("x")), Scalar::Text("x".into()));
        assert_eq!(
            Scalar::from(json!(["1", 2])),
            Scalar::List(vec![Scalar::Text("1".into()), Scalar::Int(2)])
        );
        assert_eq!(
            Scalar::from(json!({"type": "Point"})),
            Scalar::Json(json!({"type": "Point"}))
        );
        assert_eq!(Scalar::from(json!([[1]])), Scalar::Json(json!([[1]])));
    }

    #[test]
    fn serde_round_trips_through_json() {
        let s: Scalar = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(serde_json::to_string(&s).unwrap(), r#"["a","b"]"#);
    }

    #[test]
    fn truthiness() {
        assert!(!Scalar::Null.is_truthy());
        assert!(!Scalar::Bool(false).is_truthy());
        assert!(!Scalar::Int(0).is_truthy());
        assert!(!Scalar::Text(String::new()).is_truthy());
        assert!(Scalar::Bool(true).is_truthy());
        assert!(Scalar::Text("no".into()).is_truthy());
    }

    #[test]
    fn int_binds_to_narrower_columns_with_range_check() {
        let (_, bytes) = encode(&Scalar::Int(7), &Type::INT4).unwrap();
        assert_eq!(bytes, 7i32.to_be_bytes());
        assert!(encode(&Scalar::Int(i64::from(i32::MAX) + 1), &Type::INT4).is_err());
    }

    #[test]
    fn whole_floats_bind_to_integers_only_within_range() {
        let (_, bytes) = encode(&Scalar::Float(42.0), &Type::INT8).unwrap();
        assert_eq!(bytes, 42i64.to_be_bytes());
        let (_, bytes) = encode(&Scalar::Float(-9.0e18), &Type::INT8).unwrap();
        assert_eq!(bytes, (-9_000_000_000_000_000_000i64).to_be_bytes());

        let huge: Scalar = serde_json::from_str("1e20").unwrap();
        assert_eq!(huge, Scalar::Float(1e20));
        assert!(encode(&huge, &Type::INT8).is_err());
        assert!(encode(&Scalar::Float(-1e20), &Type::INT8).is_err());
        assert!(encode(&Scalar::Float(i64::MAX as f64), &Type::INT8).is_err());
        assert!(encode(&Scalar::Float(1e10), &Type::INT4).is_err());
        assert!(encode(&Scalar::Float(1.5), &Type::INT8).is_err());
    }

    #[test]
    fn text_parses_into_typed_columns() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        let (_, bytes) = encode(&Scalar::Text(id.into()), &Type::UUID).unwrap();
        assert_eq!(bytes, uuid::Uuid::parse_str(id).unwrap().as_bytes());

        assert!(encode(&Scalar::Text("2024-05-01T10:00:00Z".into()), &Type::TIMESTAMPTZ).is_ok());
        assert!(encode(&Scalar::Text("2024-05-01".into()), &Type::DATE).is_ok());
        assert!(encode(&Scalar::Text("not-a-uuid".into()), &Type::UUID).is_err());
    }

    #[test]
    fn null_is_sent_as_sql_null() {
        let (is_null, bytes) = encode(&Scalar::Null, &Type::INT4).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(bytes.is_empty());
    }

    #[test]
    fn list_requires_array_or_json_target() {
        let list = Scalar::from(vec!["1", "2"]);
        assert!(encode(&list, &Type::TEXT_ARRAY).is_ok());
        assert!(encode(&list, &Type::INT4_ARRAY).is_ok());
        assert!(encode(&list, &Type::JSONB).is_ok());
        assert!(encode(&list, &Type::TEXT).is_err());
    }

    #[test]
    fn bool_does_not_bind_to_integers() {
        assert!(encode(&Scalar::Bool(true), &Type::INT4).is_err());
    }
}
