//! Matcher result documents (ALIENMATCHER and SNAPMATCH filetypes)

use serde::{Deserialize, Serialize};

use crate::models::common::{StepError, ToolInfo};
use crate::package::SourceFile;

/// One Debian version considered during matching. The alien's own version
/// is carried in the list with `is_aliensrc = true` and distance 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionCandidate {
    pub version: String,
    pub distance: u64,
    pub is_aliensrc: bool,
}

/// Summary of the alien side, denormalized into the result document so the
/// harvester does not have to re-open the `.aliensrc`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlienSrcSummary {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub alternative_names: Vec<String>,
    #[serde(default)]
    pub internal_archive_name: Option<String>,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub files: Vec<SourceFile>,
}

/// A successful match against the current Debian index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebianMatch {
    pub name: String,
    pub version: String,
    /// Overall score in [0, 100], one decimal.
    pub score: f64,
    pub package_score: u32,
    pub version_score: u32,
    /// Pool-relative paths of the downloaded source artifacts.
    #[serde(default)]
    pub debsrc_orig: Option<String>,
    #[serde(default)]
    pub debsrc_debian: Option<String>,
    #[serde(default)]
    pub dsc_format: Option<String>,
    #[serde(default)]
    pub version_candidates: Vec<VersionCandidate>,
}

/// A successful match through the snapshot archive; additionally records
/// the per-file download descriptors the snapshot API returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebianSnapMatch {
    pub name: String,
    pub version: String,
    pub score: f64,
    pub package_score: u32,
    pub version_score: u32,
    /// Whether the match came from the file-sha1 lookup rather than
    /// name/version scoring.
    #[serde(default)]
    pub matched_by_sha1: bool,
    #[serde(default)]
    pub srcfiles: Vec<SourceFile>,
    #[serde(default)]
    pub debsrc_orig: Option<String>,
    #[serde(default)]
    pub debsrc_debian: Option<String>,
    #[serde(default)]
    pub dsc_format: Option<String>,
    #[serde(default)]
    pub version_candidates: Vec<VersionCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlienMatcherModel {
    pub tool: ToolInfo,
    pub aliensrc: AlienSrcSummary,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub debian_match: Option<DebianMatch>,
    #[serde(default)]
    pub errors: Vec<StepError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlienSnapMatcherModel {
    pub tool: ToolInfo,
    pub aliensrc: AlienSrcSummary,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub debian_match: Option<DebianSnapMatch>,
    #[serde(default)]
    pub errors: Vec<StepError>,
}
