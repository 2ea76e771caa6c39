use crate::error::GatewayResult;
use crate::ident::quote_identifier;
use crate::request::OrderSpec;

/// Render `ORDER BY "a" ASC, "b" DESC`, or an empty string for no ordering.
pub fn build_order(order: &[OrderSpec]) -> GatewayResult<String> {
    if order.is_empty() {
        return Ok(String::new());
    }
    let mut sql = String::from("ORDER BY ");
    for (i, spec) in order.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        quote_identifier(&spec.column)?.write_sql(&mut sql);
        sql.push_str(if spec.ascending { " ASC" } else { " DESC" });
    }
    Ok(sql)
}
