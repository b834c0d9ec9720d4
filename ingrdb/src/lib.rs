pub mod cancel;
pub mod error;
pub mod materializer;
pub mod record;
pub mod schema;
pub mod value;

pub use cancel::Cancellation;
pub use error::{IngrDbError, Result};
pub use materializer::{MaterializeResult, ViewBuilder};
pub use record::RecordEntry;
pub use schema::{CollectionDef, Definition, ViewDef, ViewFormat};
pub use value::Value;
