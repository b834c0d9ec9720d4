use crate::cancel::Cancellation;
use crate::error::{IngrDbError, Result};
use crate::materializer::RecordsReader;
use crate::record::RecordEntry;
use crate::schema::{CollectionDef, RecordFormat, RecordType};
use crate::value::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Loads records from collection files on disk.
///
/// Supports both record layouts: a single file holding a mapping of record
/// id to record fields (`map_of_id_records`), and one file per record
/// located through a `{key}` pattern (`single_record`).
#[derive(Debug, Default)]
pub struct FileRecordsReader;

impl FileRecordsReader {
    pub fn new() -> Self {
        FileRecordsReader
    }
}

impl RecordsReader for FileRecordsReader {
    fn read_records(
        &self,
        cancel: &Cancellation,
        _db_path: &Path,
        col: &CollectionDef,
        visit: &mut dyn FnMut(RecordEntry) -> Result<()>,
    ) -> Result<()> {
        let record_file = col.record_file.as_ref().ok_or_else(|| {
            IngrDbError::Schema(format!(
                "collection {:?} has no record file definition",
                col.id
            ))
        })?;

        match record_file.record_type {
            RecordType::MapOfIdRecords => {
                let path = col.dir_path.join(&record_file.name);
                if !path.exists() {
                    return Ok(());
                }
                let content = std::fs::read(&path).map_err(|e| {
                    IngrDbError::Other(format!(
                        "failed to read records file {}: {e}",
                        path.display()
                    ))
                })?;
                let records = parse_map_of_id_records(&content, record_file.format)
                    .map_err(|e| {
                        IngrDbError::Other(format!(
                            "failed to parse records file {}: {e}",
                            path.display()
                        ))
                    })?;
                // Mapping order is not meaningful; iterate keys sorted so
                // downstream output is deterministic.
                let mut keys: Vec<&String> = records.keys().collect();
                keys.sort();
                for key in keys {
                    cancel.check()?;
                    let mut data = records[key].clone();
                    data.insert("id".to_string(), Value::String(key.clone()));
                    visit(RecordEntry {
                        key: key.clone(),
                        file_path: path.clone(),
                        data,
                    })?;
                }
                Ok(())
            }
            RecordType::SingleRecord => {
                let pattern = KeyPattern::new(&record_file.name, &col.dir_path)?;
                let matches = glob::glob(&pattern.glob_pattern)
                    .map_err(|e| IngrDbError::Other(format!("failed to glob records: {e}")))?;
                for file_path in matches.filter_map(|r| r.ok()) {
                    cancel.check()?;
                    let key = pattern.extract_key(&file_path);
                    if key.starts_with('.') {
                        continue; // skip hidden directories like .collection
                    }
                    let content = std::fs::read(&file_path).map_err(|e| {
                        IngrDbError::Other(format!(
                            "failed to read record {}: {e}",
                            file_path.display()
                        ))
                    })?;
                    let mut data = parse_record_content(&content, record_file.format)
                        .map_err(|e| {
                            IngrDbError::Other(format!(
                                "failed to parse record {}: {e}",
                                file_path.display()
                            ))
                        })?;
                    data.insert("id".to_string(), Value::String(key.clone()));
                    visit(RecordEntry {
                        key,
                        file_path,
                        data,
                    })?;
                }
                Ok(())
            }
        }
    }
}

fn parse_record_content(content: &[u8], format: RecordFormat) -> Result<HashMap<String, Value>> {
    match format {
        RecordFormat::Yaml => Ok(serde_yaml::from_slice(content)?),
        RecordFormat::Json => Ok(serde_json::from_slice(content)?),
    }
}

fn parse_map_of_id_records(
    content: &[u8],
    format: RecordFormat,
) -> Result<HashMap<String, HashMap<String, Value>>> {
    match format {
        RecordFormat::Yaml => Ok(serde_yaml::from_slice(content)?),
        RecordFormat::Json => Ok(serde_json::from_slice(content)?),
    }
}

/// Glob pattern plus key extraction derived from a `{key}` file-name
/// pattern like `"{key}.yaml"` or `"{key}/{key}.yaml"`.
struct KeyPattern {
    glob_pattern: String,
    dir_path: PathBuf,
    prefix: String,
    key_suffix: String,
}

impl KeyPattern {
    fn new(name: &str, dir_path: &Path) -> Result<KeyPattern> {
        const PLACEHOLDER: &str = "{key}";
        let idx = name.find(PLACEHOLDER).ok_or_else(|| {
            IngrDbError::Schema(format!("record file name {name:?} must include {{key}}"))
        })?;

        // Every {key} becomes a glob star; the key itself is read back from
        // the first placeholder's segment.
        let glob_name = name.replace(PLACEHOLDER, "*");
        let glob_pattern = dir_path.join(glob_name).to_string_lossy().to_string();

        let prefix = name[..idx].to_string();
        let rest = &name[idx + PLACEHOLDER.len()..];
        let key_suffix = match rest.find('/') {
            Some(end) => rest[..end].to_string(),
            None => rest.to_string(),
        };

        Ok(KeyPattern {
            glob_pattern,
            dir_path: dir_path.to_path_buf(),
            prefix,
            key_suffix,
        })
    }

    fn extract_key(&self, file_path: &Path) -> String {
        let rel = match file_path.strip_prefix(&self.dir_path) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => file_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        };
        let s = rel.strip_prefix(&self.prefix).unwrap_or(&rel);
        let segment = match s.find('/') {
            Some(slash) => &s[..slash],
            None => s,
        };
        segment
            .strip_suffix(&self.key_suffix)
            .unwrap_or(segment)
            .to_string()
    }
}
