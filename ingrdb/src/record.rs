use crate::value::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// One record pulled from collection storage.
///
/// `file_path` points at the backing file and is consulted only for
/// `$last_modified` ordering. `data` always carries an `id` field derived
/// from the storage key, overwriting any same-named field in the file
/// content.
#[derive(Debug, Clone, Default)]
pub struct RecordEntry {
    pub key: String,
    pub file_path: PathBuf,
    pub data: HashMap<String, Value>,
}

impl RecordEntry {
    pub fn new(key: impl Into<String>, data: HashMap<String, Value>) -> Self {
        RecordEntry {
            key: key.into(),
            file_path: PathBuf::new(),
            data,
        }
    }
}
