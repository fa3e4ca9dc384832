use serde::{Deserialize, Serialize};

/// File reference returned by the workflow's upload endpoint. The relay passes
/// the upstream body through untouched; this shape is what clients read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}
