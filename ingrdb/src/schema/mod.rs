mod reader;
mod types;

pub use reader::read_definition;
pub use types::{
    CollectionDef, ColumnDef, Definition, RecordFileDef, RecordFormat, RecordType,
    RuntimeOverrides, Settings, ViewDef, ViewFormat, COLLECTION_DEF_FILE_NAME, DEFAULT_VIEW_ID,
    INGRDB_DIR, ROOT_CONFIG_FILE_NAME, SCHEMA_DIR, VIEWS_DIR,
};
