use crate::error::{IngrDbError, Result};
use crate::materializer::ViewDefReader;
use crate::schema::{ViewDef, SCHEMA_DIR, VIEWS_DIR};
use std::collections::HashMap;
use std::path::Path;

/// Reads view definitions from `.collection/views/*.yaml` files.
/// The view id is the file stem.
#[derive(Debug, Default)]
pub struct FileViewDefReader;

impl FileViewDefReader {
    pub fn new() -> Self {
        FileViewDefReader
    }
}

impl ViewDefReader for FileViewDefReader {
    fn read_view_defs(&self, col_dir_path: &Path) -> Result<HashMap<String, ViewDef>> {
        let pattern = col_dir_path
            .join(SCHEMA_DIR)
            .join(VIEWS_DIR)
            .join("*.yaml")
            .to_string_lossy()
            .to_string();
        let matches = glob::glob(&pattern)
            .map_err(|e| IngrDbError::Other(format!("failed to glob view defs: {e}")))?;

        let mut defs = HashMap::new();
        for path in matches.filter_map(|r| r.ok()) {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                IngrDbError::Other(format!("failed to read view def {}: {e}", path.display()))
            })?;
            let mut view: ViewDef = serde_yaml::from_str(&content).map_err(|e| {
                IngrDbError::Schema(format!("failed to parse view def {}: {e}", path.display()))
            })?;
            let name = view_name_from_path(&path)?;
            view.id = name.clone();
            defs.insert(name, view);
        }
        Ok(defs)
    }
}

fn view_name_from_path(path: &Path) -> Result<String> {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = base.strip_suffix(".yaml").ok_or_else(|| {
        IngrDbError::Schema(format!("invalid view def file name: {base}"))
    })?;
    if name.is_empty() {
        return Err(IngrDbError::Schema(format!(
            "missing view name in file: {base}"
        )));
    }
    Ok(name.to_string())
}
