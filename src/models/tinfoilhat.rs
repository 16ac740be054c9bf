//! TinfoilHat build metadata (TINFOILHAT filetype)
//!
//! Produced by the Yocto side of the pipeline; one document maps recipe
//! names to their build containers. Only the fields the harvester and the
//! mirror consume are modeled, everything else rides along in `extra`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub variant: String,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default)]
    pub metadata: RecipeMetadata,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinaryPackageEntry {
    #[serde(default)]
    pub metadata: PackageMetadata,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageWithTags {
    #[serde(default)]
    pub package: BinaryPackageEntry,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub recipe: Recipe,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageWithTags>,
}

/// Top-level document: recipe name -> container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TinfoilHatModel(pub BTreeMap<String, Container>);

/// Collapse hierarchical build-matrix tags into a map keyed by tag path.
/// `distro/machine/image` style strings stay intact; duplicates collapse.
pub fn aggregate_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        if !out.contains(tag) {
            out.push(tag.clone());
        }
    }
    out.sort();
    out
}
