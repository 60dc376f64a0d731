use async_trait::async_trait;
use chrono::Utc;
use redb::{ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::db::{Database, DatabaseError};
use super::models::{ImageRecord, ModelRecord, NewImage, NewModel, Record};
use super::tables::*;
use super::{MetadataStore, StoreError};

type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

impl Database {
    // ========================================================================
    // Generic record operations
    // ========================================================================

    fn put_record<R: Record + Serialize>(
        &self,
        table_def: RecordTable,
        record: &R,
    ) -> Result<(), DatabaseError> {
        debug_assert!(!record.id().is_empty(), "record id must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(table_def)?;
            let data = rmp_serde::to_vec_named(record)?;
            table.insert(record.id(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_record<R: DeserializeOwned>(
        &self,
        table_def: RecordTable,
        id: &str,
    ) -> Result<Option<R>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(table_def)?;

        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    fn delete_record(&self, table_def: RecordTable, id: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(table_def)?;
            let removed = table.remove(id)?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// All records, newest first. Ids break timestamp ties.
    fn list_records<R: Record + DeserializeOwned>(
        &self,
        table_def: RecordTable,
    ) -> Result<Vec<R>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(table_def)?;

        let mut records: Vec<R> = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            records.push(rmp_serde::from_slice(value.value())?);
        }

        records.sort_by(|a, b| {
            b.uploaded_at()
                .cmp(&a.uploaded_at())
                .then_with(|| b.id().cmp(a.id()))
        });
        Ok(records)
    }

    // ========================================================================
    // Model operations
    // ========================================================================

    pub fn put_model(&self, model: &ModelRecord) -> Result<(), DatabaseError> {
        self.put_record(MODELS, model)
    }

    pub fn find_model(&self, id: &str) -> Result<Option<ModelRecord>, DatabaseError> {
        self.get_record(MODELS, id)
    }

    pub fn remove_model(&self, id: &str) -> Result<bool, DatabaseError> {
        self.delete_record(MODELS, id)
    }

    pub fn all_models(&self) -> Result<Vec<ModelRecord>, DatabaseError> {
        self.list_records(MODELS)
    }

    // ========================================================================
    // Image operations
    // ========================================================================

    pub fn put_image(&self, image: &ImageRecord) -> Result<(), DatabaseError> {
        self.put_record(IMAGES, image)
    }

    pub fn find_image(&self, id: &str) -> Result<Option<ImageRecord>, DatabaseError> {
        self.get_record(IMAGES, id)
    }

    pub fn remove_image(&self, id: &str) -> Result<bool, DatabaseError> {
        self.delete_record(IMAGES, id)
    }

    pub fn all_images(&self) -> Result<Vec<ImageRecord>, DatabaseError> {
        self.list_records(IMAGES)
    }
}

#[async_trait]
impl MetadataStore for Database {
    async fn create_model(&self, model: NewModel) -> Result<ModelRecord, StoreError> {
        let record = model.into_record(uuid::Uuid::new_v4().to_string(), Utc::now());
        self.put_model(&record)?;
        Ok(record)
    }

    async fn list_models(&self) -> Result<Vec<ModelRecord>, StoreError> {
        Ok(self.all_models()?)
    }

    async fn get_model(&self, id: &str) -> Result<Option<ModelRecord>, StoreError> {
        Ok(self.find_model(id)?)
    }

    async fn delete_model(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.remove_model(id)?)
    }

    async fn create_image(&self, image: NewImage) -> Result<ImageRecord, StoreError> {
        let record = image.into_record(uuid::Uuid::new_v4().to_string(), Utc::now());
        self.put_image(&record)?;
        Ok(record)
    }

    async fn list_images(&self) -> Result<Vec<ImageRecord>, StoreError> {
        Ok(self.all_images()?)
    }

    async fn get_image(&self, id: &str) -> Result<Option<ImageRecord>, StoreError> {
        Ok(self.find_image(id)?)
    }

    async fn delete_image(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.remove_image(id)?)
    }
}
