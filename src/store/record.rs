use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use uuid::Uuid;

pub type UtcDateTime = DateTime<Utc>;

/// Record id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(Uuid);

impl ImageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ImageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Handle to an image payload: a storage key such as `images/<hash>.png`, or
/// an inline `data:` URI carried over from browser exports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_inline(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// Storage key, if the payload lives in storage rather than inline.
    pub fn storage_key(&self) -> Option<&str> {
        if self.is_inline() { None } else { Some(&self.0) }
    }
}

/// One uploaded image and its generation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: ImageId,
    #[serde(alias = "imageUrl")]
    pub image_data: ImageRef,
    pub positive_prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    pub seed: u64,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora: Option<String>,
    pub cfg: f64,
    pub steps: u32,
    pub sampler: String,
    pub scheduler: String,
    #[serde(alias = "imageSize")]
    pub image_dimensions: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: UtcDateTime,
    #[serde(default)]
    pub file_name: String,
}

/// Unvalidated input to [`ImageStore::create`](super::ImageStore::create).
///
/// `seed` and `steps` accept any JSON number so that negative, fractional or
/// out-of-range input is reported by validation rather than rejected while
/// parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDraft {
    pub image_data: ImageRef,
    pub positive_prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    pub seed: Number,
    pub model: String,
    #[serde(default)]
    pub lora: Option<String>,
    pub cfg: f64,
    pub steps: Number,
    pub sampler: String,
    pub scheduler: String,
    pub image_dimensions: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub file_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Newest,
    Oldest,
    Name,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "name" => Ok(Self::Name),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

/// Query over the record collection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterCriteria {
    /// Case-insensitive substring matched against prompts, model and tags
    pub search_term: String,
    /// Tags a record must all carry
    pub selected_tags: Vec<String>,
    pub sort_by: SortKey,
}

/// Collection counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub image_count: usize,
    pub tag_count: usize,
}

impl ImageRecord {
    /// Plain-text block with every generation parameter, one per line.
    pub fn metadata_text(&self) -> String {
        let mut lines = vec![
            format!("Positive Prompt: {}", self.positive_prompt),
            format!("Negative Prompt: {}", self.negative_prompt),
            format!("Model: {}", self.model),
        ];
        if let Some(lora) = self.lora.as_deref().filter(|lora| !lora.is_empty()) {
            lines.push(format!("LoRA: {lora}"));
        }
        lines.extend([
            format!("Seed: {}", self.seed),
            format!("CFG Scale: {}", self.cfg),
            format!("Steps: {}", self.steps),
            format!("Sampler: {}", self.sampler),
            format!("Scheduler: {}", self.scheduler),
            format!("Image Size: {}", self.image_dimensions),
            format!("Tags: {}", self.tags.join(", ")),
        ]);
        lines.join("\n")
    }
}
