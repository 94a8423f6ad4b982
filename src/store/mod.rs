pub mod filter;
pub mod hash;
pub mod image_store;
pub mod memory;
pub mod payload;
pub mod record;
pub mod storage;
mod validate;

pub use filter::{filter_records, name_collator};
pub use hash::compute_hash;
pub use image_store::{ImageStore, STORAGE_KEY};
pub use memory::MemoryStorage;
pub use payload::ImagePayload;
pub use record::*;
pub use storage::{KeyValueStore, LocalFileStorage};

pub fn get_extension_from_mime_type(mime_type: &str) -> &str {
    match mime_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "image/avif" => "avif",
        "image/tiff" => "tiff",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        _ => "bin",
    }
}

pub fn get_mime_type_from_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        "tiff" | "tif" => "image/tiff",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}
