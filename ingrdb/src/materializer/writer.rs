use crate::cancel::Cancellation;
use crate::error::{IngrDbError, Result};
use crate::materializer::export::{determine_columns, encode_batch, ExportOptions};
use crate::record::RecordEntry;
use crate::schema::{CollectionDef, ViewDef};
use std::path::Path;

/// Classification of an idempotent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Writes `content` to `path` only when it differs byte-for-byte from what
/// is already there. This exact comparison is what keeps repeated
/// materialization runs free of spurious version-control diffs.
pub fn write_file_if_changed(path: &Path, content: &[u8]) -> Result<WriteOutcome> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| IngrDbError::Other(format!("mkdir for {}: {e}", path.display())))?;
    }
    let existing = std::fs::read(path).ok();
    match existing {
        Some(bytes) if bytes == content => Ok(WriteOutcome::Unchanged),
        Some(_) => {
            std::fs::write(path, content)
                .map_err(|e| IngrDbError::Other(format!("write {}: {e}", path.display())))?;
            Ok(WriteOutcome::Updated)
        }
        None => {
            std::fs::write(path, content)
                .map_err(|e| IngrDbError::Other(format!("write {}: {e}", path.display())))?;
            Ok(WriteOutcome::Created)
        }
    }
}

/// Pluggable output capability for the regular-view path (template views and
/// single-file data exports).
pub trait ViewWriter {
    fn write_view(
        &self,
        cancel: &Cancellation,
        col: &CollectionDef,
        view: &ViewDef,
        records: &[RecordEntry],
        out_path: &Path,
    ) -> Result<WriteOutcome>;
}

/// Default [`ViewWriter`]: renders built-in templates (`md-table`,
/// `md-list`) or falls back to the view's format encoder, then writes the
/// result idempotently.
#[derive(Debug, Default)]
pub struct FileViewWriter;

impl FileViewWriter {
    pub fn new() -> Self {
        FileViewWriter
    }
}

impl ViewWriter for FileViewWriter {
    fn write_view(
        &self,
        cancel: &Cancellation,
        col: &CollectionDef,
        view: &ViewDef,
        records: &[RecordEntry],
        out_path: &Path,
    ) -> Result<WriteOutcome> {
        cancel.check()?;
        let columns = determine_columns(col, view);
        let content = match view.template.as_deref() {
            Some("md-table") => render_md_table(&columns, records).into_bytes(),
            Some("md-list") => render_md_list(&columns, records).into_bytes(),
            Some(other) => {
                return Err(IngrDbError::Config(format!(
                    "unknown view template: {other:?}"
                )))
            }
            None => {
                let opts = ExportOptions {
                    include_hash: view.include_hash,
                    records_delimiter: view.records_delimiter,
                };
                let identity = format!("{}/{}", col.id, view.id);
                encode_batch(view.format, &identity, &columns, records, opts)?
            }
        };
        write_file_if_changed(out_path, &content)
    }
}

fn render_md_table(columns: &[String], records: &[RecordEntry]) -> String {
    let mut out = String::new();
    out.push_str("| ");
    out.push_str(&columns.join(" | "));
    out.push_str(" |\n| ");
    out.push_str(&vec!["---"; columns.len()].join(" | "));
    out.push_str(" |\n");
    for record in records {
        out.push('|');
        for column in columns {
            let cell = record
                .data
                .get(column)
                .map(|v| v.to_string())
                .unwrap_or_default();
            out.push(' ');
            out.push_str(&escape_md_cell(&cell));
            out.push_str(" |");
        }
        out.push('\n');
    }
    out
}

fn render_md_list(columns: &[String], records: &[RecordEntry]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str("- ");
        out.push_str(&record.key);
        let fields: Vec<String> = columns
            .iter()
            .filter(|c| c.as_str() != "id")
            .filter_map(|c| record.data.get(c).map(|v| format!("{c}={v}")))
            .collect();
        if !fields.is_empty() {
            out.push_str(": ");
            out.push_str(&fields.join(", "));
        }
        out.push('\n');
    }
    out
}

fn escape_md_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}
