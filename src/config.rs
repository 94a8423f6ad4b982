use std::env;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Application config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// IP address to bind server to
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Directory holding the record list and image files
    pub data_dir: PathBuf,
    /// Largest accepted upload request body
    pub max_upload_bytes: usize,
}

impl Config {
    /// Read from the process environment, after loading `.env` if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            bind_address: var("GALLERY_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            port: var("GALLERY_PORT")
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            data_dir: var("GALLERY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            max_upload_bytes: var("GALLERY_MAX_UPLOAD_BYTES")
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        }
    }

    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn default_data_dir() -> PathBuf {
    let mut base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("sd-gallery");
    base
}
