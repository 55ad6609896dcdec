//! Box catalog read straight from the Vagrant home directory.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;
use walkdir::WalkDir;

use crate::box_config::{boxes_dir, unescape_box_name};
use crate::error::{ComputeError, Result};
use crate::images::compare_versions;
use crate::traits::BoxCatalog;
use crate::types::BoxRef;

/// Lists boxes from `<home>/boxes/<escaped-name>/<version>/<provider>`.
#[derive(Debug, Clone)]
pub struct LocalBoxCatalog {
    home: PathBuf,
}

impl LocalBoxCatalog {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    fn scan(&self) -> Result<Vec<BoxRef>> {
        let root = boxes_dir(&self.home);
        if !root.is_dir() {
            debug!(path = %root.display(), "No boxes directory");
            return Ok(Vec::new());
        }

        let mut boxes = Vec::new();
        for entry in WalkDir::new(&root).min_depth(3).max_depth(3).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(|p| p.to_path_buf()).unwrap_or_else(|| root.clone());
                ComputeError::io(path, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }

            let provider_dir = entry.path();
            let version_dir = provider_dir.parent();
            let name_dir = version_dir.and_then(|v| v.parent());
            let (Some(version_dir), Some(name_dir)) = (version_dir, name_dir) else {
                continue;
            };

            let component = |p: &std::path::Path| {
                p.file_name().map(|n| n.to_string_lossy().into_owned())
            };
            if let (Some(name), Some(version), Some(provider)) = (
                component(name_dir),
                component(version_dir),
                component(provider_dir),
            ) {
                boxes.push(BoxRef::new(unescape_box_name(&name), version, provider));
            }
        }
        Ok(boxes)
    }
}

#[async_trait]
impl BoxCatalog for LocalBoxCatalog {
    async fn list_boxes(&self) -> Result<Vec<BoxRef>> {
        let catalog = self.clone();
        tokio::task::spawn_blocking(move || catalog.scan())
            .await
            .map_err(|e| ComputeError::Internal(format!("box scan task failed: {}", e)))?
    }

    async fn get_box(&self, name: &str) -> Result<Option<BoxRef>> {
        let newest = self
            .list_boxes()
            .await?
            .into_iter()
            .filter(|b| b.name == name)
            .max_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(newest)
    }
}
