mod schema;
mod settings;
mod storage;

pub use schema::SchemaManager;
pub use settings::*;
pub use storage::Storage;
