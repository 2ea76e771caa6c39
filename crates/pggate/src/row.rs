//! Row normalization: Postgres rows to JSON records.

use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Number, Value as JsonValue};
use std::error::Error;
use std::fmt::Write as _;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Kind, Type};

/// One result row, keyed by column name.
pub type Record = Map<String, JsonValue>;

/// A single decoded column value.
///
/// Decoding dispatches on the column's type at runtime, so it accepts every type.
/// Types without a JSON mapping (for instance PostGIS `geography`) come back as the hex string of
/// their binary value, which is also how such types print in text form.
#[derive(Debug, Clone, PartialEq)]
pub struct CellValue(pub JsonValue);

fn float_json(f: f64) -> JsonValue {
    Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
}

fn hex(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len() * 2);
    for b in raw {
        let _ = write!(out, "{b:02x}");
    }
    out
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

fn read_u16(raw: &[u8], at: usize) -> Result<u16, Box<dyn Error + Sync + Send>> {
    raw.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated numeric value".into())
}

/// Render a binary `numeric` as decimal text, at any precision.
///
/// Layout: ndigits, weight, sign, dscale, then `ndigits` base-10000 digits where digit `i` is
/// scaled by `10000^(weight - i)`.
fn numeric_text(raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    let ndigits = usize::from(read_u16(raw, 0)?);
    let weight = i32::from(read_u16(raw, 2)? as i16);
    let sign = read_u16(raw, 4)?;
    let dscale = usize::from(read_u16(raw, 6)?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign {other:#06x}").into()),
    }

    let digits = (0..ndigits)
        .map(|i| {
            let d = read_u16(raw, 8 + 2 * i)?;
            if d > 9999 {
                return Err(format!("invalid numeric digit {d}").into());
            }
            Ok(d)
        })
        .collect::<Result<Vec<u16>, Box<dyn Error + Sync + Send>>>()?;
    let digit = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::with_capacity(ndigits * 4 + dscale + 2);
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            let _ = if i == 0 {
                write!(out, "{}", digit(i))
            } else {
                write!(out, "{:04}", digit(i))
            };
        }
    }
    if dscale > 0 {
        out.push('.');
        let start = out.len();
        let mut i = weight + 1;
        while out.len() - start < dscale {
            let _ = write!(out, "{:04}", digit(i));
            i += 1;
        }
        out.truncate(start + dscale);
    }
    Ok(out)
}

/// Integers that fit 64 bits and values with at most 15 significant digits become JSON numbers;
/// anything else (including `NaN` and the infinities) stays a string so no precision is lost.
fn numeric_json(text: String) -> JsonValue {
    let text = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    };
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    let significant = digits.trim_start_matches('0').trim_end_matches('0').len();
    match serde_json::from_str::<Number>(&text) {
        Ok(n) if n.is_i64() || n.is_u64() || significant <= 15 => JsonValue::Number(n),
        _ => JsonValue::String(text),
    }
}

impl<'a> FromSql<'a> for CellValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let value = match ty.kind() {
            Kind::Domain(base) => return CellValue::from_sql(base, raw),
            Kind::Array(_) => {
                let items = Vec::<CellValue>::from_sql(ty, raw)?;
                JsonValue::Array(items.into_iter().map(|c| c.0).collect())
            }
            Kind::Enum(_) => JsonValue::String(<&str>::from_sql(ty, raw)?.to_string()),
            _ => match *ty {
                Type::BOOL => JsonValue::Bool(bool::from_sql(ty, raw)?),
                Type::INT2 => JsonValue::from(i16::from_sql(ty, raw)?),
                Type::INT4 => JsonValue::from(i32::from_sql(ty, raw)?),
                Type::INT8 => JsonValue::from(i64::from_sql(ty, raw)?),
                Type::OID => JsonValue::from(u32::from_sql(ty, raw)?),
                Type::FLOAT4 => float_json(f64::from(f32::from_sql(ty, raw)?)),
                Type::FLOAT8 => float_json(f64::from_sql(ty, raw)?),
                Type::NUMERIC => numeric_json(numeric_text(raw)?),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                    JsonValue::String(<&str>::from_sql(ty, raw)?.to_string())
                }
                Type::UUID => JsonValue::String(uuid::Uuid::from_sql(ty, raw)?.to_string()),
                Type::TIMESTAMPTZ => {
                    JsonValue::String(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339())
                }
                Type::TIMESTAMP => JsonValue::String(
                    NaiveDateTime::from_sql(ty, raw)?
                        .format("%Y-%m-%dT%H:%M:%S%.f")
                        .to_string(),
                ),
                Type::DATE => JsonValue::String(NaiveDate::from_sql(ty, raw)?.to_string()),
                Type::TIME => JsonValue::String(NaiveTime::from_sql(ty, raw)?.to_string()),
                Type::JSON | Type::JSONB => JsonValue::from_sql(ty, raw)?,
                Type::BYTEA => JsonValue::String(format!("\\x{}", hex(raw))),
                _ if ty.name() == "citext" => {
                    JsonValue::String(<&str>::from_sql(ty, raw)?.to_string())
                }
                _ => JsonValue::String(hex(raw)),
            },
        };
        Ok(CellValue(value))
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(CellValue(JsonValue::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Decode a row into a [`Record`].
pub fn row_to_record(row: &Row) -> GatewayResult<Record> {
    let mut record = Map::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let cell: CellValue = row
            .try_get(idx)
            .map_err(|e| GatewayError::decode(column.name(), e.to_string()))?;
        record.insert(column.name().to_string(), cell.0);
    }
    Ok(record)
}

/// Extension helpers for reading typed values out of a [`Record`].
pub trait RecordExt {
    /// Read an integer column.
    fn get_i64(&self, column: &str) -> Option<i64>;

    /// Read a string column.
    fn get_str(&self, column: &str) -> Option<&str>;
}

impl RecordExt for Record {
    fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(JsonValue::as_i64)
    }

    fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(JsonValue::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(ty: &Type, raw: &[u8]) -> JsonValue {
        CellValue::from_sql(ty, raw).unwrap().0
    }

    #[test]
    fn decodes_scalars() {
        assert_eq!(decode(&Type::BOOL, &[1]), json!(true));
        assert_eq!(decode(&Type::INT4, &42i32.to_be_bytes()), json!(42));
        assert_eq!(decode(&Type::INT8, &(-7i64).to_be_bytes()), json!(-7));
        assert_eq!(decode(&Type::FLOAT8, &1.5f64.to_be_bytes()), json!(1.5));
        assert_eq!(decode(&Type::TEXT, b"open"), json!("open"));
    }

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn decodes_ordinary_numerics_as_numbers() {
        assert_eq!(decode(&Type::NUMERIC, &numeric(0, NUMERIC_NEG, 1, &[12, 5000])), json!(-12.5));
        assert_eq!(decode(&Type::NUMERIC, &numeric(-1, NUMERIC_POS, 4, &[1])), json!(0.0001));
        assert_eq!(decode(&Type::NUMERIC, &numeric(0, NUMERIC_POS, 2, &[])), json!(0));
        assert_eq!(
            decode(&Type::NUMERIC, &numeric(1, NUMERIC_POS, 2, &[1, 0, 5000])),
            json!(10000.5)
        );
    }

    #[test]
    fn decodes_numerics_beyond_decimal_range() {
        // 1e32, one base-10000 digit at weight 8
        assert_eq!(
            decode(&Type::NUMERIC, &[0, 1, 0, 8, 0, 0, 0, 0, 0, 1]),
            json!(1e32)
        );

        let forty = numeric(
            9,
            NUMERIC_POS,
            0,
            &[1234, 5678, 9012, 3456, 7890, 1234, 5678, 9012, 3456, 7890],
        );
        assert_eq!(
            decode(&Type::NUMERIC, &forty),
            json!("1234567890123456789012345678901234567890")
        );

        let fractional = numeric(0, NUMERIC_NEG, 20, &[1, 1234, 5678, 9012, 3456, 7890]);
        assert_eq!(
            decode(&Type::NUMERIC, &fractional),
            json!("-1.1234567890123456789")
        );
    }

    #[test]
    fn decodes_special_numerics_as_strings() {
        assert_eq!(decode(&Type::NUMERIC, &[0, 0, 0, 0, 0xC0, 0, 0, 0]), json!("NaN"));
        assert_eq!(decode(&Type::NUMERIC, &numeric(0, NUMERIC_PINF, 0, &[])), json!("Infinity"));
        assert_eq!(decode(&Type::NUMERIC, &numeric(0, NUMERIC_NINF, 0, &[])), json!("-Infinity"));
    }

    #[test]
    fn malformed_numerics_are_errors() {
        assert!(CellValue::from_sql(&Type::NUMERIC, &[0, 1, 0, 0]).is_err());
        assert!(CellValue::from_sql(&Type::NUMERIC, &numeric(0, 0x1234, 0, &[1])).is_err());
        let oversized_digit = numeric(0, NUMERIC_POS, 0, &[10000]);
        assert!(CellValue::from_sql(&Type::NUMERIC, &oversized_digit).is_err());
    }

    #[test]
    fn decodes_uuid_as_string() {
        let id = uuid::Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            decode(&Type::UUID, id.as_bytes()),
            json!("550e8400-e29b-41d4-a716-446655440000")
        );
    }

    #[test]
    fn jsonb_passes_through() {
        let mut raw = vec![1u8];
        raw.extend_from_slice(br#"{"a":[1,2]}"#);
        assert_eq!(decode(&Type::JSONB, &raw), json!({"a": [1, 2]}));
    }

    #[test]
    fn bytea_and_unknown_types_render_as_hex() {
        assert_eq!(decode(&Type::BYTEA, &[0xde, 0xad]), json!("\\xdead"));
        assert_eq!(decode(&Type::POINT, &[0x01, 0x0f]), json!("010f"));
    }

    #[test]
    fn null_decodes_to_json_null() {
        assert_eq!(
            CellValue::from_sql_null(&Type::INT4).unwrap().0,
            JsonValue::Null
        );
    }

    #[test]
    fn record_ext_reads_typed_values() {
        let mut record = Record::new();
        record.insert("count".into(), json!(3));
        record.insert("status".into(), json!("open"));
        assert_eq!(record.get_i64("count"), Some(3));
        assert_eq!(record.get_str("status"), Some("open"));
        assert_eq!(record.get_i64("status"), None);
    }
}
