//! Volatile, process-lifetime metadata store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::models::{ImageRecord, ModelRecord, NewImage, NewModel, Record};
use super::{MetadataStore, StoreError};

struct Entry<R> {
    seq: u64,
    record: R,
}

/// One keyed map per entity kind. Every operation is a single map access.
struct Collection<R> {
    entries: RwLock<HashMap<String, Entry<R>>>,
    next_seq: AtomicU64,
}

impl<R: Record> Collection<R> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    fn insert(&self, record: R) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(record.id().to_string(), Entry { seq, record });
    }

    /// Newest first; insertion order breaks timestamp ties.
    fn list(&self) -> Vec<R> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut sorted: Vec<&Entry<R>> = entries.values().collect();
        sorted.sort_by(|a, b| {
            b.record
                .uploaded_at()
                .cmp(&a.record.uploaded_at())
                .then(b.seq.cmp(&a.seq))
        });
        sorted.into_iter().map(|e| e.record.clone()).collect()
    }

    fn get(&self, id: &str) -> Option<R> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(id).map(|e| e.record.clone())
    }

    fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(id).is_some()
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// In-memory reference implementation of [`MetadataStore`].
pub struct MemStore {
    models: Collection<ModelRecord>,
    images: Collection<ImageRecord>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            models: Collection::new(),
            images: Collection::new(),
        }
    }

    /// Insert a fully-formed record, keeping its id and timestamp.
    pub fn insert_model(&self, record: ModelRecord) {
        self.models.insert(record);
    }

    pub fn insert_image(&self, record: ImageRecord) {
        self.images.insert(record);
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[async_trait]
impl MetadataStore for MemStore {
    async fn create_model(&self, model: NewModel) -> Result<ModelRecord, StoreError> {
        let record = model.into_record(new_id(), Utc::now());
        self.models.insert(record.clone());
        Ok(record)
    }

    async fn list_models(&self) -> Result<Vec<ModelRecord>, StoreError> {
        Ok(self.models.list())
    }

    async fn get_model(&self, id: &str) -> Result<Option<ModelRecord>, StoreError> {
        Ok(self.models.get(id))
    }

    async fn delete_model(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.models.remove(id))
    }

    async fn create_image(&self, image: NewImage) -> Result<ImageRecord, StoreError> {
        let record = image.into_record(new_id(), Utc::now());
        self.images.insert(record.clone());
        Ok(record)
    }

    async fn list_images(&self) -> Result<Vec<ImageRecord>, StoreError> {
        Ok(self.images.list())
    }

    async fn get_image(&self, id: &str) -> Result<Option<ImageRecord>, StoreError> {
        Ok(self.images.get(id))
    }

    async fn delete_image(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.images.remove(id))
    }
}
