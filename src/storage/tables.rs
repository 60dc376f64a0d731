use redb::TableDefinition;

/// Model records: uuid -> ModelRecord (msgpack)
pub const MODELS: TableDefinition<&str, &[u8]> = TableDefinition::new("models");

/// Image records: uuid -> ImageRecord (msgpack)
pub const IMAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("images");
