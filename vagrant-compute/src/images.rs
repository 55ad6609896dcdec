//! Image catalog built from the installed Vagrant boxes.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::Result;
use crate::traits::{BoxCatalog, StaleBoxFilter};
use crate::types::{BoxRef, Image};

/// Keeps only the highest version of each `(name, provider)` pair.
#[derive(Debug, Default, Clone, Copy)]
pub struct LatestVersionFilter;

impl StaleBoxFilter for LatestVersionFilter {
    fn retain_current(&self, boxes: Vec<BoxRef>) -> Vec<BoxRef> {
        let mut latest: HashMap<(String, String), BoxRef> = HashMap::new();
        for b in boxes {
            let key = (b.name.clone(), b.provider.clone());
            match latest.get(&key) {
                Some(current) if compare_versions(&current.version, &b.version) != Ordering::Less => {}
                _ => {
                    latest.insert(key, b);
                }
            }
        }
        let mut current: Vec<BoxRef> = latest.into_values().collect();
        current.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.provider.cmp(&b.provider)));
        current
    }
}

/// Compare dotted versions numerically per segment, falling back to text.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Produces the current image list. Results are not cached.
pub struct ImageSupplier {
    catalog: Arc<dyn BoxCatalog>,
    filter: Arc<dyn StaleBoxFilter>,
}

impl ImageSupplier {
    pub fn new(catalog: Arc<dyn BoxCatalog>) -> Self {
        Self::with_filter(catalog, Arc::new(LatestVersionFilter))
    }

    pub fn with_filter(catalog: Arc<dyn BoxCatalog>, filter: Arc<dyn StaleBoxFilter>) -> Self {
        Self { catalog, filter }
    }

    /// Every usable image, one per box name and provider.
    #[instrument(skip(self))]
    pub async fn get(&self) -> Result<Vec<Image>> {
        let boxes = self.catalog.list_boxes().await?;
        let listed = boxes.len();
        let images: Vec<Image> = self
            .filter
            .retain_current(boxes)
            .iter()
            .map(Image::from)
            .collect();
        debug!(listed, current = images.len(), "Listed images");
        Ok(images)
    }

    /// Look up one image by id.
    pub async fn apply(&self, id: &str) -> Result<Option<Image>> {
        Ok(self.get().await?.into_iter().find(|image| image.id == id))
    }
}
