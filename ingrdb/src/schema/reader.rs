use crate::error::{IngrDbError, Result};
use crate::schema::types::{
    CollectionDef, Definition, COLLECTION_DEF_FILE_NAME, ROOT_CONFIG_FILE_NAME, SCHEMA_DIR,
};
use std::path::Path;

/// Reads the database definition rooted at `db_path`.
///
/// Database settings come from an optional `ingrdb.yaml` at the root.
/// Every first-level directory carrying a `.collection/definition.yaml`
/// becomes a collection; its id is the directory name.
pub fn read_definition(db_path: &Path) -> Result<Definition> {
    if !db_path.is_dir() {
        return Err(IngrDbError::Other(format!(
            "Database directory does not exist: {}",
            db_path.display()
        )));
    }

    let mut def = read_root_config(db_path)?;

    for entry in std::fs::read_dir(db_path)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || name.starts_with('$') {
            continue;
        }
        let dir_path = entry.path();
        let def_path = dir_path.join(SCHEMA_DIR).join(COLLECTION_DEF_FILE_NAME);
        if !def_path.is_file() {
            continue;
        }
        let content = std::fs::read_to_string(&def_path)?;
        let mut col: CollectionDef = serde_yaml::from_str(&content).map_err(|e| {
            IngrDbError::Schema(format!(
                "failed to parse {}: {e}",
                def_path.display()
            ))
        })?;
        col.id = name.clone();
        col.dir_path = dir_path;
        def.collections.insert(name, col);
    }

    Ok(def)
}

fn read_root_config(db_path: &Path) -> Result<Definition> {
    let config_path = db_path.join(ROOT_CONFIG_FILE_NAME);
    if !config_path.is_file() {
        return Ok(Definition::default());
    }
    let content = std::fs::read_to_string(&config_path)?;
    let def: Definition = serde_yaml::from_str(&content).map_err(|e| {
        IngrDbError::Schema(format!(
            "failed to parse {}: {e}",
            config_path.display()
        ))
    })?;
    Ok(def)
}
