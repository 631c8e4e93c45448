//! Local file assets forwarded to the engine as opaque payloads

use crate::error::{CloudError, Result};
use base64::Engine;
use std::path::{Path, PathBuf};

/// Reference to a local file read at declaration time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAsset {
    path: PathBuf,
}

impl FileAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve `relative` against an asset directory
    pub fn in_dir(dir: impl AsRef<Path>, relative: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(relative))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| CloudError::Asset {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    pub fn to_base64(&self) -> Result<String> {
        let bytes = self.read_bytes()?;
        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "Encoded asset");
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// JSON payload for a blob `source` field
    pub fn to_source_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "path": self.path.display().to_string(),
            "encoding": "base64",
            "content": self.to_base64()?,
        }))
    }
}

/// How an application's containers are deployed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployment {
    /// Multi-container compose file, sent inline as `COMPOSE|<base64>`
    Compose(FileAsset),
    /// Single image reference, sent as `DOCKER|<image>`
    Image(String),
}

impl Deployment {
    pub fn compose(asset: FileAsset) -> Self {
        Deployment::Compose(asset)
    }

    /// Site runtime descriptor string
    pub fn descriptor(&self) -> Result<String> {
        match self {
            Deployment::Compose(asset) => Ok(format!("COMPOSE|{}", asset.to_base64()?)),
            Deployment::Image(image) => Ok(format!("DOCKER|{image}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_compose_descriptor_is_base64() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("compose.yml"), "services: {}\n").unwrap();

        let deployment = Deployment::compose(FileAsset::in_dir(dir.path(), "compose.yml"));
        let descriptor = deployment.descriptor().unwrap();

        let encoded = descriptor.strip_prefix("COMPOSE|").unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(decoded, b"services: {}\n");
    }

    #[test]
    fn test_image_descriptor() {
        let deployment = Deployment::Image("nginx:1.27".to_string());
        assert_eq!(deployment.descriptor().unwrap(), "DOCKER|nginx:1.27");
    }

    #[test]
    fn test_missing_asset_reports_path() {
        let asset = FileAsset::new("/definitely/not/here.json");
        match asset.read_bytes() {
            Err(CloudError::Asset { path, .. }) => {
                assert_eq!(path, PathBuf::from("/definitely/not/here.json"))
            }
            other => panic!("Expected asset error, got {other:?}"),
        }
    }
}
