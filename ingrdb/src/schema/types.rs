use crate::error::{IngrDbError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Directory holding a collection's schema artifacts (definition, views).
pub const SCHEMA_DIR: &str = ".collection";

/// Fixed file name for collection definitions inside [`SCHEMA_DIR`].
pub const COLLECTION_DEF_FILE_NAME: &str = "definition.yaml";

/// Subdirectory of [`SCHEMA_DIR`] holding named view definitions.
pub const VIEWS_DIR: &str = "views";

/// Reserved directory under the output root where default-view artifacts
/// are materialized, outside the collection directories themselves.
pub const INGRDB_DIR: &str = "$ingrdb";

/// Identity of the reserved view synthesized from a collection's inline
/// `default_view` block.
pub const DEFAULT_VIEW_ID: &str = "default";

/// Optional database-level configuration file at the database root.
pub const ROOT_CONFIG_FILE_NAME: &str = "ingrdb.yaml";

/// Database-level defaults that apply to all collections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub records_delimiter: bool,
}

/// Values set at runtime (e.g. CLI flags) that take highest priority over
/// schema settings. Never serialized.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub records_delimiter: Option<bool>,
}

/// The whole database definition: settings plus all top-level collections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub settings: Settings,
    #[serde(skip)]
    pub runtime_overrides: RuntimeOverrides,
    #[serde(default)]
    pub collections: HashMap<String, CollectionDef>,
}

/// Definition of a single collection: where its records live and what
/// columns they carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionDef {
    /// Taken from the directory name, not the definition file.
    #[serde(skip)]
    pub id: String,
    #[serde(skip)]
    pub dir_path: PathBuf,
    #[serde(default)]
    pub titles: HashMap<String, String>,
    pub record_file: Option<RecordFileDef>,
    #[serde(default)]
    pub columns: HashMap<String, ColumnDef>,
    #[serde(default)]
    pub columns_order: Vec<String>,
    /// Inline reserved view driving the batched multi-format export path.
    #[serde(default)]
    pub default_view: Option<ViewDef>,
}

impl CollectionDef {
    /// Checks the collection definition for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(IngrDbError::Schema(
                "missing 'id' in collection definition".into(),
            ));
        }
        if self.columns.is_empty() {
            return Err(IngrDbError::Schema(
                "missing 'columns' in collection definition".into(),
            ));
        }
        for (i, col_name) in self.columns_order.iter().enumerate() {
            if !self.columns.contains_key(col_name) {
                return Err(IngrDbError::Schema(format!(
                    "columns_order[{i}] references unspecified column: {col_name}"
                )));
            }
            if let Some(j) = self.columns_order[..i].iter().position(|c| c == col_name) {
                return Err(IngrDbError::Schema(format!(
                    "duplicate value in columns_order at indexes {j} and {i}: {col_name}"
                )));
            }
        }
        match &self.record_file {
            Some(record_file) => record_file.validate()?,
            None => {
                return Err(IngrDbError::Schema(
                    "missing 'record_file' in collection definition".into(),
                ))
            }
        }
        if let Some(view) = &self.default_view {
            view.validate_fields()?;
        }
        Ok(())
    }
}

/// Definition of a single column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnDef {
    #[serde(rename = "type", default)]
    pub column_type: String,
    #[serde(default)]
    pub required: bool,
    /// Foreign-key target collection, if any.
    #[serde(rename = "ref", default)]
    pub ref_collection: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub titles: HashMap<String, String>,
}

/// How a collection's records are laid out on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFileDef {
    /// File name, or a pattern containing `{key}` for `single_record`.
    pub name: String,
    pub record_type: RecordType,
    #[serde(default)]
    pub format: RecordFormat,
}

impl RecordFileDef {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(IngrDbError::Schema(
                "missing 'name' in record_file definition".into(),
            ));
        }
        if self.record_type == RecordType::SingleRecord && !self.name.contains("{key}") {
            return Err(IngrDbError::Schema(format!(
                "record file name {:?} must include {{key}}",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// One file holding a mapping of record id to record fields.
    MapOfIdRecords,
    /// One file per record; the file name pattern contains `{key}`.
    SingleRecord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    #[default]
    Yaml,
    Json,
}

/// A declarative projection/export rule over a collection's records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDef {
    /// Taken from the view file name (or fixed for the default view).
    #[serde(skip)]
    pub id: String,
    /// True only for the view synthesized from `default_view`.
    #[serde(skip)]
    pub is_default: bool,
    #[serde(default)]
    pub titles: HashMap<String, String>,
    #[serde(default)]
    pub format: ViewFormat,
    /// Explicit column subset; empty means "resolve from the collection".
    #[serde(default)]
    pub columns: Vec<String>,
    /// `"<field>"` or `"<field> desc"`; empty means input order.
    #[serde(default)]
    pub order_by: String,
    /// How many records to include; `None` means all.
    #[serde(default)]
    pub top: Option<usize>,
    #[serde(default)]
    pub max_batch_size: Option<usize>,
    /// Output file name override (without extension for the default view).
    #[serde(default)]
    pub file_name: Option<String>,
    /// Built-in template name for documentation views (`md-table`,
    /// `md-list`); absent for data-export views.
    #[serde(default)]
    pub template: Option<String>,
    /// Appends the `# sha256:{hex}` integrity footer to INGR output.
    #[serde(default = "default_true")]
    pub include_hash: bool,
    /// Writes a bare `#` line after each record in INGR output.
    #[serde(default)]
    pub records_delimiter: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ViewDef {
    fn default() -> Self {
        ViewDef {
            id: String::new(),
            is_default: false,
            titles: HashMap::new(),
            format: ViewFormat::default(),
            columns: Vec::new(),
            order_by: String::new(),
            top: None,
            max_batch_size: None,
            file_name: None,
            template: None,
            include_hash: true,
            records_delimiter: false,
        }
    }
}

impl ViewDef {
    /// Checks the view definition for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(IngrDbError::Schema(
                "missing 'id' in view definition".into(),
            ));
        }
        self.validate_fields()
    }

    fn validate_fields(&self) -> Result<()> {
        if let Some(0) = self.max_batch_size {
            return Err(IngrDbError::Schema(
                "max_batch_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Output encoding for a materialized view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewFormat {
    Tsv,
    Csv,
    Json,
    Jsonl,
    Yaml,
    #[default]
    Ingr,
}

impl ViewFormat {
    /// File extension for artifacts in this format.
    pub fn extension(self) -> &'static str {
        match self {
            ViewFormat::Tsv => "tsv",
            ViewFormat::Csv => "csv",
            ViewFormat::Json => "json",
            ViewFormat::Jsonl => "jsonl",
            ViewFormat::Yaml => "yaml",
            ViewFormat::Ingr => "ingr",
        }
    }

    pub fn as_str(self) -> &'static str {
        self.extension()
    }
}

impl fmt::Display for ViewFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewFormat {
    type Err = IngrDbError;

    /// Case-insensitive; the empty string maps to the default format.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tsv" => Ok(ViewFormat::Tsv),
            "csv" => Ok(ViewFormat::Csv),
            "json" => Ok(ViewFormat::Json),
            "jsonl" => Ok(ViewFormat::Jsonl),
            "yaml" => Ok(ViewFormat::Yaml),
            "" | "ingr" => Ok(ViewFormat::Ingr),
            other => Err(IngrDbError::Config(format!(
                "unknown view format: {other:?}"
            ))),
        }
    }
}

impl Serialize for ViewFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ViewFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
