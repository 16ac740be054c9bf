//! Clearing-server audit snapshot (FOSSY_JSON filetype)
//!
//! Field names mirror the clearing server's REST responses (camelCase).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FossySummary {
    pub id: u64,
    #[serde(default)]
    pub upload_name: Option<String>,
    #[serde(default)]
    pub main_license: Option<String>,
    #[serde(default)]
    pub unique_licenses: u64,
    #[serde(default)]
    pub total_licenses: u64,
    #[serde(default)]
    pub unique_concluded_licenses: u64,
    #[serde(default)]
    pub total_concluded_licenses: u64,
    #[serde(default)]
    pub files_to_be_cleared: u64,
    #[serde(default)]
    pub files_cleared: u64,
    #[serde(default)]
    pub copyright_count: u64,
    #[serde(default)]
    pub clearing_status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FossyLicenseFinding {
    pub file_path: String,
    #[serde(default)]
    pub agent_findings: Vec<String>,
    #[serde(default)]
    pub conclusions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FossyModel {
    /// Server the snapshot was taken from.
    #[serde(default)]
    pub origin: String,
    /// Free-form metadata carried over from the alien package.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub summary: FossySummary,
    #[serde(default)]
    pub licenses: Vec<FossyLicenseFinding>,
}
