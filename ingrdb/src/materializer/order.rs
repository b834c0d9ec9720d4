// Stable ordering of a record batch by a single field, or by the backing
// file's modification time via the `$last_modified` sentinel.

use crate::error::{IngrDbError, Result};
use crate::record::RecordEntry;
use crate::value::{compare_values, Value};
use std::time::SystemTime;

/// Sentinel field name that orders records by their backing file's mtime.
pub const LAST_MODIFIED_FIELD: &str = "$last_modified";

#[derive(Debug, Default, PartialEq, Eq)]
struct OrderBySpec {
    field: String,
    desc: bool,
}

fn parse_order_by(order_by: &str) -> OrderBySpec {
    let mut fields = order_by.split_whitespace();
    let field = match fields.next() {
        Some(f) => f.to_string(),
        None => return OrderBySpec::default(),
    };
    let desc = fields
        .next()
        .map(|d| d.eq_ignore_ascii_case("desc"))
        .unwrap_or(false);
    OrderBySpec { field, desc }
}

/// Sorts records in place by the order expression `"<field>[ desc]"`.
///
/// An empty expression is a no-op. `$last_modified` requires a filesystem
/// stat per record; a stat failure fails the whole operation. The sort is
/// stable: ties preserve input order.
pub fn order_records(records: &mut [RecordEntry], order_by: &str) -> Result<()> {
    let spec = parse_order_by(order_by);
    if spec.field.is_empty() {
        return Ok(());
    }

    if spec.field == LAST_MODIFIED_FIELD {
        let mut keyed: Vec<(SystemTime, usize)> = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let mtime = std::fs::metadata(&record.file_path)
                .and_then(|m| m.modified())
                .map_err(|e| {
                    IngrDbError::Other(format!(
                        "failed to stat {}: {e}",
                        record.file_path.display()
                    ))
                })?;
            keyed.push((mtime, i));
        }
        // Sorting (mtime, input index) pairs keeps ties in input order.
        keyed.sort_by(|a, b| {
            let cmp = a.0.cmp(&b.0);
            if spec.desc {
                cmp.reverse().then(a.1.cmp(&b.1))
            } else {
                cmp.then(a.1.cmp(&b.1))
            }
        });
        let reordered: Vec<RecordEntry> = keyed
            .iter()
            .map(|(_, i)| records[*i].clone())
            .collect();
        records.clone_from_slice(&reordered);
        return Ok(());
    }

    records.sort_by(|a, b| {
        let left = a.data.get(&spec.field).unwrap_or(&Value::Null);
        let right = b.data.get(&spec.field).unwrap_or(&Value::Null);
        let cmp = compare_values(left, right);
        if spec.desc {
            cmp.reverse()
        } else {
            cmp
        }
    });
    Ok(())
}
