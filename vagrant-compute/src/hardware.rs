//! Static catalog of named hardware profiles.

use std::collections::BTreeMap;

use crate::error::{ComputeError, Result};
use crate::types::Hardware;

/// Named profiles, roughly following common cloud instance sizes.
const DEFAULT_PROFILES: &[(&str, u32, u64)] = &[
    ("micro", 1, 512),
    ("small", 1, 1024),
    ("medium", 2, 2048),
    ("large", 4, 4096),
    ("xlarge", 8, 8192),
];

/// Hardware profiles addressable by id.
#[derive(Debug, Clone)]
pub struct HardwareCatalog {
    profiles: BTreeMap<String, Hardware>,
}

impl HardwareCatalog {
    /// Catalog with the built-in profiles.
    pub fn new() -> Self {
        Self::from_profiles(
            DEFAULT_PROFILES
                .iter()
                .map(|(id, cores, ram)| Hardware::named(id, *cores, *ram)),
        )
    }

    pub fn from_profiles(profiles: impl IntoIterator<Item = Hardware>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|h| (h.id.clone(), h)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Hardware> {
        self.profiles.get(id)
    }

    pub fn list(&self) -> Vec<Hardware> {
        self.profiles.values().cloned().collect()
    }

    /// Resolve a hardware id to a spec.
    ///
    /// `automatic` takes its sizes from `cpus`/`memory_mib`, or from the id
    /// itself when written as `automatic:cores=N;ram=M`. Any other id must be
    /// in the catalog.
    pub fn resolve(&self, id: &str, cpus: Option<u32>, memory_mib: Option<u64>) -> Result<Hardware> {
        if Hardware::is_automatic_id(id) {
            let (cores, ram) = match (cpus, memory_mib) {
                (Some(c), Some(m)) => (c, m),
                _ => Hardware::parse_automatic(id).ok_or_else(|| {
                    ComputeError::InvalidArgument(format!(
                        "automatic hardware needs cpu and memory sizes: {}",
                        id
                    ))
                })?,
            };
            return Ok(Hardware::automatic(cores, ram));
        }

        self.get(id)
            .cloned()
            .ok_or_else(|| ComputeError::HardwareNotFound(id.to_string()))
    }
}

impl Default for HardwareCatalog {
    fn default() -> Self {
        Self::new()
    }
}
