//! View materialization: turns declared view definitions plus a stream of
//! records into output artifacts, idempotently.

mod export;
mod order;
mod records_reader;
mod view_def_reader;
mod writer;

pub use export::{batch_file_name, determine_columns, encode_batch, ExportOptions};
pub use order::{order_records, LAST_MODIFIED_FIELD};
pub use records_reader::FileRecordsReader;
pub use view_def_reader::FileViewDefReader;
pub use writer::{write_file_if_changed, FileViewWriter, ViewWriter, WriteOutcome};

use crate::cancel::Cancellation;
use crate::error::{IngrDbError, Result};
use crate::record::RecordEntry;
use crate::schema::{CollectionDef, Definition, ViewDef, DEFAULT_VIEW_ID, INGRDB_DIR};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Streams all current records of a collection.
pub trait RecordsReader {
    fn read_records(
        &self,
        cancel: &Cancellation,
        db_path: &Path,
        col: &CollectionDef,
        visit: &mut dyn FnMut(RecordEntry) -> Result<()>,
    ) -> Result<()>;
}

/// Reads the named view definitions declared for a collection.
pub trait ViewDefReader {
    fn read_view_defs(&self, col_dir_path: &Path) -> Result<HashMap<String, ViewDef>>;
}

/// Summarises the outcome of a materialization run.
#[derive(Debug, Default)]
pub struct MaterializeResult {
    pub files_created: usize,
    pub files_updated: usize,
    pub files_unchanged: usize,
    pub files_deleted: usize,
    pub errors: Vec<IngrDbError>,
}

impl MaterializeResult {
    pub fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Created => self.files_created += 1,
            WriteOutcome::Updated => self.files_updated += 1,
            WriteOutcome::Unchanged => self.files_unchanged += 1,
        }
    }

    /// Folds another result into this one.
    pub fn merge(&mut self, other: MaterializeResult) {
        self.files_created += other.files_created;
        self.files_updated += other.files_updated;
        self.files_unchanged += other.files_unchanged;
        self.files_deleted += other.files_deleted;
        self.errors.extend(other.errors);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Materializes view outputs for collections using injected collaborators.
///
/// The builder is the only component that collects errors instead of
/// propagating them: a failing view or batch is recorded in the result and
/// processing continues with its siblings. Cancellation is the exception
/// and aborts the whole call.
pub struct ViewBuilder {
    def_reader: Box<dyn ViewDefReader>,
    records_reader: Box<dyn RecordsReader>,
    writer: Box<dyn ViewWriter>,
}

impl ViewBuilder {
    pub fn new(
        def_reader: Box<dyn ViewDefReader>,
        records_reader: Box<dyn RecordsReader>,
        writer: Box<dyn ViewWriter>,
    ) -> Self {
        ViewBuilder {
            def_reader,
            records_reader,
            writer,
        }
    }

    /// Wires the default filesystem collaborators around a records reader.
    pub fn with_default_collaborators(records_reader: Box<dyn RecordsReader>) -> Self {
        ViewBuilder::new(
            Box::new(FileViewDefReader::new()),
            records_reader,
            Box::new(FileViewWriter::new()),
        )
    }

    /// Materializes every view of one collection: the declared views from
    /// the views directory plus the inline default view, if any.
    pub fn build_views(
        &self,
        cancel: &Cancellation,
        db_path: &Path,
        output_root: &Path,
        col: &CollectionDef,
        def: &Definition,
    ) -> Result<MaterializeResult> {
        let mut views = self.def_reader.read_view_defs(&col.dir_path)?;
        if let Some(default_view) = &col.default_view {
            let mut view = default_view.clone();
            view.id = DEFAULT_VIEW_ID.to_string();
            view.is_default = true;
            views.insert(DEFAULT_VIEW_ID.to_string(), view);
        }

        let mut ordered: Vec<&ViewDef> = views.values().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));

        let mut result = MaterializeResult::default();
        for view in ordered {
            cancel.check()?;
            self.build_one_view(cancel, db_path, output_root, col, def, view, &mut result)?;
        }
        Ok(result)
    }

    /// Materializes a single view of one collection.
    pub fn build_view(
        &self,
        cancel: &Cancellation,
        db_path: &Path,
        output_root: &Path,
        col: &CollectionDef,
        def: &Definition,
        view: &ViewDef,
    ) -> Result<MaterializeResult> {
        let mut result = MaterializeResult::default();
        self.build_one_view(cancel, db_path, output_root, col, def, view, &mut result)?;
        Ok(result)
    }

    /// Runs one view through whichever pipeline applies. Failures land in
    /// `result.errors`; only cancellation propagates as `Err`.
    fn build_one_view(
        &self,
        cancel: &Cancellation,
        db_path: &Path,
        output_root: &Path,
        col: &CollectionDef,
        def: &Definition,
        view: &ViewDef,
        result: &mut MaterializeResult,
    ) -> Result<()> {
        let records = match self.read_all_records(cancel, db_path, col) {
            Ok(records) => records,
            Err(IngrDbError::Cancelled) => return Err(IngrDbError::Cancelled),
            Err(e) => {
                result.errors.push(IngrDbError::Other(format!(
                    "view {}/{}: {e}",
                    col.id, view.id
                )));
                return Ok(());
            }
        };

        if view.is_default {
            return self.build_default_view(
                cancel,
                db_path,
                output_root,
                col,
                def,
                view,
                records,
                result,
            );
        }

        let mut records = filter_columns(records, &view.columns);
        if let Err(e) = order_records(&mut records, &view.order_by) {
            result.errors.push(IngrDbError::Other(format!(
                "view {}/{}: {e}",
                col.id, view.id
            )));
            return Ok(());
        }
        if let Some(top) = view.top {
            if records.len() > top {
                records.truncate(top);
            }
        }

        let out_path = resolve_view_output_path(col, view, db_path, output_root);
        match self
            .writer
            .write_view(cancel, col, view, &records, &out_path)
        {
            Ok(outcome) => {
                result.record(outcome);
                log::info!(
                    "materializing view {}/{}: {} records saved to {}",
                    col.id,
                    view.id,
                    records.len(),
                    out_path.display()
                );
            }
            Err(IngrDbError::Cancelled) => return Err(IngrDbError::Cancelled),
            Err(e) => result.errors.push(e),
        }
        Ok(())
    }

    fn read_all_records(
        &self,
        cancel: &Cancellation,
        db_path: &Path,
        col: &CollectionDef,
    ) -> Result<Vec<RecordEntry>> {
        let mut records = Vec::new();
        self.records_reader
            .read_records(cancel, db_path, col, &mut |entry| {
                cancel.check()?;
                records.push(entry);
                Ok(())
            })?;
        Ok(records)
    }

    /// The default-view export pipeline: resolve columns, batch, encode,
    /// write idempotently. A failing batch does not abort its siblings.
    #[allow(clippy::too_many_arguments)]
    fn build_default_view(
        &self,
        cancel: &Cancellation,
        db_path: &Path,
        output_root: &Path,
        col: &CollectionDef,
        def: &Definition,
        view: &ViewDef,
        records: Vec<RecordEntry>,
        result: &mut MaterializeResult,
    ) -> Result<()> {
        let columns = determine_columns(col, view);
        let ext = view.format.extension();
        let base = view.file_name.as_deref().unwrap_or(&col.id);
        let output_root = effective_output_root(db_path, output_root);
        let rel_col_path = collection_rel_path(col, output_root, db_path);

        let batch_size = view.max_batch_size.unwrap_or(0);
        let total_batches = if batch_size > 0 && records.len() > batch_size {
            records.len().div_ceil(batch_size)
        } else {
            1
        };

        let opts = ExportOptions {
            include_hash: view.include_hash,
            records_delimiter: records_delimiter_enabled(view, def),
        };
        let identity = format!("{}/{}", col.id, view.id);

        for batch_num in 1..=total_batches {
            cancel.check()?;
            let batch = if total_batches == 1 {
                &records[..]
            } else {
                let start = (batch_num - 1) * batch_size;
                let end = (start + batch_size).min(records.len());
                &records[start..end]
            };

            let content = match encode_batch(view.format, &identity, &columns, batch, opts) {
                Ok(content) => content,
                Err(e) => {
                    result
                        .errors
                        .push(IngrDbError::Encode(format!("batch {batch_num}: {e}")));
                    continue;
                }
            };

            let file_name = batch_file_name(base, ext, batch_num, total_batches);
            let out_path = output_root
                .join(INGRDB_DIR)
                .join(&rel_col_path)
                .join(file_name);
            match write_file_if_changed(&out_path, &content) {
                Ok(outcome) => {
                    result.record(outcome);
                    log::info!(
                        "materializing view {identity}: {} records saved to {}",
                        batch.len(),
                        out_path.display()
                    );
                }
                Err(e) => result.errors.push(e),
            }
        }
        Ok(())
    }
}

/// Resolves the delimiter flag: runtime override first, then the view flag
/// or the database-wide default.
fn records_delimiter_enabled(view: &ViewDef, def: &Definition) -> bool {
    match def.runtime_overrides.records_delimiter {
        Some(forced) => forced,
        None => view.records_delimiter || def.settings.records_delimiter,
    }
}

/// Narrows each record's field set to the allow-list. An empty allow-list
/// passes records through unchanged.
fn filter_columns(records: Vec<RecordEntry>, cols: &[String]) -> Vec<RecordEntry> {
    if cols.is_empty() {
        return records;
    }
    let allowed: HashSet<&str> = cols.iter().map(String::as_str).collect();
    records
        .into_iter()
        .map(|mut record| {
            if !record.data.is_empty() {
                record.data.retain(|key, _| allowed.contains(key.as_str()));
            }
            record
        })
        .collect()
}

fn effective_output_root<'a>(db_path: &'a Path, output_root: &'a Path) -> &'a Path {
    if output_root.as_os_str().is_empty() {
        db_path
    } else {
        output_root
    }
}

fn collection_rel_path(col: &CollectionDef, output_root: &Path, db_path: &Path) -> PathBuf {
    col.dir_path
        .strip_prefix(output_root)
        .or_else(|_| col.dir_path.strip_prefix(db_path))
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(&col.id))
}

/// Resolves the output path for the regular-view pipeline.
///
/// Template-rendered views (e.g. README tables) live inside the collection
/// directory itself; data-export views go under the reserved output
/// directory.
pub fn resolve_view_output_path(
    col: &CollectionDef,
    view: &ViewDef,
    db_path: &Path,
    output_root: &Path,
) -> PathBuf {
    let output_root = effective_output_root(db_path, output_root);
    let rel_path = collection_rel_path(col, output_root, db_path);

    if view.is_default {
        let base = view.file_name.as_deref().unwrap_or(&col.id);
        let ext = view.format.extension();
        return output_root
            .join(INGRDB_DIR)
            .join(rel_path)
            .join(format!("{base}.{ext}"));
    }
    if view.template.is_some() {
        return match &view.file_name {
            Some(file_name) => col.dir_path.join(file_name),
            None => {
                let name = if view.id.is_empty() { "view" } else { &view.id };
                col.dir_path.join(format!("{name}.md"))
            }
        };
    }
    if let Some(file_name) = &view.file_name {
        return output_root.join(INGRDB_DIR).join(rel_path).join(file_name);
    }
    let name = if view.id.is_empty() { "view" } else { &view.id };
    let ext = view.format.extension();
    output_root
        .join(INGRDB_DIR)
        .join(rel_path)
        .join(format!("{name}.{ext}"))
}
