//! Dashboard-ready aggregate report (HARVEST filetype)

use serde::{Deserialize, Serialize};

use crate::models::common::ToolInfo;
use crate::package::{Provenance, SourceFile};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebianMatchBasic {
    pub name: String,
    pub version: String,
    /// Count of alien files whose license/copyright semantics were matched
    /// to a reviewed Debian file.
    #[serde(default)]
    pub ip_matching_files: usize,
}

/// A license seen by scanners or auditors, with how many files carry it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LicenseFinding {
    pub shortname: String,
    pub file_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFindings {
    #[serde(default)]
    pub main_licenses: Vec<String>,
    #[serde(default)]
    pub all_licenses: Vec<LicenseFinding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatisticsLicenses {
    /// Raw scanner findings.
    #[serde(default)]
    pub license_scanner_findings: Vec<LicenseFinding>,
    /// Human/trusted-community conclusions.
    #[serde(default)]
    pub license_audit_findings: AuditFindings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileStatistics {
    #[serde(flatten)]
    pub provenance: Provenance,
    /// Files in the matched upstream source, as counted by the scanner.
    #[serde(default)]
    pub upstream_source_total: usize,
    #[serde(default)]
    pub audit_total: u64,
    #[serde(default)]
    pub audit_done: u64,
    #[serde(default)]
    pub audit_to_do: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub files: FileStatistics,
    #[serde(default)]
    pub licenses: StatisticsLicenses,
    /// True for the one variant whose numbers count in dashboard
    /// aggregations.
    #[serde(default)]
    pub aggregate: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub selected: bool,
    #[serde(default)]
    pub selected_reason: String,
    pub uploaded: bool,
    #[serde(default)]
    pub uploaded_reason: String,
}

/// One binary package produced from the source package by the build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinaryPackage {
    pub name: String,
    pub version: String,
    pub revision: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestSourcePackage {
    /// `<name>-<version>-<variant>+<package_id_ext>`
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub variant: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debian_matching: Option<DebianMatchBasic>,
    #[serde(default)]
    pub statistics: Statistics,
    #[serde(default)]
    pub source_files: Vec<SourceFile>,
    #[serde(default)]
    pub binary_packages: Vec<BinaryPackage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<SessionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve_metadata: Option<serde_json::Value>,
    /// Names of input filetypes that were missing during harvesting,
    /// present only with `--add-missing`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_input: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestModel {
    pub tool: ToolInfo,
    #[serde(default)]
    pub source_packages: Vec<HarvestSourcePackage>,
}

impl HarvestModel {
    pub fn new() -> Self {
        HarvestModel {
            tool: ToolInfo::current(),
            source_packages: Vec::new(),
        }
    }
}

impl Default for HarvestModel {
    fn default() -> Self {
        Self::new()
    }
}
