use std::collections::BTreeSet;

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::payload::decode_data_uri;
use crate::store::validate::validate_draft;
use crate::store::{
    FilterCriteria, ImageDraft, ImageId, ImagePayload, ImageRecord, ImageRef, KeyValueStore,
    Summary, filter_records, get_mime_type_from_extension,
};

/// Storage key holding the serialized record list.
pub const STORAGE_KEY: &str = "sd-images";

/// Owner of the record collection, persisted as one JSON array under
/// [`STORAGE_KEY`]. Records are kept newest first.
pub struct ImageStore<S> {
    storage: S,
    records: Vec<ImageRecord>,
}

impl<S: KeyValueStore> ImageStore<S> {
    /// Load the collection from `storage`.
    ///
    /// An unreadable or corrupt slot opens as an empty collection; corrupt bytes
    /// are copied to `<STORAGE_KEY>.corrupt` first so they survive the next write.
    pub async fn open(storage: S) -> Self {
        let records = match storage.get(STORAGE_KEY).await {
            Ok(None) => Vec::new(),
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<ImageRecord>>(&bytes) {
                Ok(records) => records,
                Err(err) => {
                    warn!(error = %err, "stored image list is corrupt, starting empty");
                    let backup_key = format!("{STORAGE_KEY}.corrupt");
                    if let Err(err) = storage.put(&backup_key, &bytes).await {
                        warn!(error = %err, "failed to keep a copy of the corrupt image list");
                    }
                    Vec::new()
                }
            },
            Err(err) => {
                warn!(error = %err, "failed to load image list, starting empty");
                Vec::new()
            }
        };
        info!(count = records.len(), "image store opened");
        Self { storage, records }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// All records in storage order, newest first.
    pub fn list_all(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn get_by_id(&self, id: ImageId) -> Option<&ImageRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Validate `draft`, stamp it with a fresh id and creation time, and
    /// persist it at the head of the collection.
    ///
    /// The in-memory collection only changes once the write has succeeded.
    pub async fn create(&mut self, draft: ImageDraft) -> Result<ImageRecord, StoreError> {
        let valid = validate_draft(&draft).map_err(StoreError::Validation)?;

        let mut id = ImageId::new();
        while self.get_by_id(id).is_some() {
            id = ImageId::new();
        }
        let record = ImageRecord {
            id,
            image_data: draft.image_data,
            positive_prompt: draft.positive_prompt,
            negative_prompt: draft.negative_prompt,
            seed: valid.seed,
            model: draft.model,
            lora: valid.lora,
            cfg: draft.cfg,
            steps: valid.steps,
            sampler: draft.sampler,
            scheduler: draft.scheduler,
            image_dimensions: draft.image_dimensions,
            tags: valid.tags,
            created_at: Utc::now(),
            file_name: draft.file_name,
        };

        let mut records = Vec::with_capacity(self.records.len() + 1);
        records.push(record.clone());
        records.extend(self.records.iter().cloned());
        self.persist(&records)
            .await
            .map_err(|err| StoreError::persistence("failed to save image", err))?;
        self.records = records;

        info!(id = %record.id, file_name = %record.file_name, "image saved");
        Ok(record)
    }

    /// Remove the record with `id`. Returns `false` when nothing was removed,
    /// including when the reduced collection could not be written.
    pub async fn delete(&mut self, id: ImageId) -> bool {
        let Some(position) = self.records.iter().position(|record| record.id == id) else {
            return false;
        };
        let mut records = self.records.clone();
        let removed = records.remove(position);
        if let Err(err) = self.persist(&records).await {
            warn!(%id, error = %err, "failed to delete image");
            return false;
        }
        self.records = records;
        info!(%id, "image deleted");

        self.release_image(&removed.image_data).await;
        true
    }

    /// Every distinct tag, sorted.
    pub fn list_tags(&self) -> Vec<String> {
        self.tag_set().into_iter().map(str::to_string).collect()
    }

    pub fn filter(&self, criteria: &FilterCriteria) -> Vec<&ImageRecord> {
        filter_records(&self.records, criteria)
    }

    pub fn summary(&self) -> Summary {
        Summary {
            image_count: self.records.len(),
            tag_count: self.tag_set().len(),
        }
    }

    /// Write `payload` to storage under its content key.
    pub async fn attach_image(&self, payload: &ImagePayload) -> Result<ImageRef, StoreError> {
        let key = payload.content_key();
        self.storage
            .put(&key, &payload.bytes)
            .await
            .map_err(|err| StoreError::persistence("failed to save image file", err))?;
        debug!(%key, size = payload.bytes.len(), "image file stored");
        Ok(ImageRef::new(key))
    }

    /// Bytes and mime type behind `image`, `None` if the payload is gone.
    pub async fn read_image(&self, image: &ImageRef) -> anyhow::Result<Option<(Vec<u8>, String)>> {
        let Some(key) = image.storage_key() else {
            let (mime_type, bytes) =
                decode_data_uri(image.as_str()).context("failed to decode inline image")?;
            return Ok(Some((bytes, mime_type)));
        };
        let mime_type = key
            .rsplit_once('.')
            .map(|(_, ext)| get_mime_type_from_extension(ext))
            .unwrap_or("application/octet-stream");
        let bytes = self.storage.get(key).await?;
        Ok(bytes.map(|bytes| (bytes, mime_type.to_string())))
    }

    /// Remove a stored payload once no record refers to it.
    pub async fn release_image(&self, image: &ImageRef) {
        let Some(key) = image.storage_key() else {
            return;
        };
        if self.records.iter().any(|record| &record.image_data == image) {
            return;
        }
        match self.storage.delete(key).await {
            Ok(_) => debug!(%key, "image file removed"),
            Err(err) => warn!(%key, error = %err, "failed to remove image file"),
        }
    }

    fn tag_set(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .flat_map(|record| record.tags.iter().map(String::as_str))
            .collect()
    }

    async fn persist(&self, records: &[ImageRecord]) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(records).context("failed to serialize image list")?;
        self.storage.put(STORAGE_KEY, &payload).await
    }
}
