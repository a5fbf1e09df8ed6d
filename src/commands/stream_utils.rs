use crate::resp::RespValue;
use crate::stream::StreamEntry;

/// Encodes stream entries for XRANGE/XREAD replies: each entry becomes
/// `[id, [field1, value1, field2, value2, ...]]` with fields in insertion
/// order.
pub fn entries_to_resp(entries: &[StreamEntry]) -> RespValue {
    RespValue::Array(
        entries
            .iter()
            .map(|entry| {
                let mut flattened = Vec::with_capacity(entry.fields.len() * 2);
                for (name, value) in &entry.fields {
                    flattened.push(RespValue::BulkString(name.clone()));
                    flattened.push(RespValue::BulkString(value.clone()));
                }

                RespValue::Array(vec![
                    RespValue::BulkString(entry.id.to_string()),
                    RespValue::Array(flattened),
                ])
            })
            .collect(),
    )
}
