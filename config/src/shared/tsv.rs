use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings for the staged TSV files handed to the bulk upload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TsvConfig {
    /// Directory in which TSV files are staged before upload. Defaults to the system temp dir.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Content type attached to the uploaded file handle.
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_content_type() -> String {
    "text/tab-separated-values".to_owned()
}

impl Default for TsvConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            content_type: default_content_type(),
        }
    }
}
