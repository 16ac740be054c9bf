//! Delta report document (DELTACODE filetype)

use serde::{Deserialize, Serialize};

use crate::models::common::ToolInfo;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MovedFile {
    pub old_path: String,
    pub new_path: String,
}

/// Per-category counts plus the two denominators. Every file of the new
/// scan falls into exactly one new-side category, every file of the old
/// scan into exactly one old-side category; moved files count in both
/// denominators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaStats {
    pub same_files: usize,
    pub moved_files: usize,
    pub changed_files_with_no_license_and_copyright: usize,
    pub changed_files_with_same_copyright_and_license: usize,
    pub changed_files_with_updated_copyright_year_only: usize,
    pub changed_files_with_changed_copyright_or_license: usize,
    pub deleted_files_with_no_license_and_copyright: usize,
    pub deleted_files_with_license_or_copyright: usize,
    pub new_files_with_no_license_and_copyright: usize,
    pub new_files_with_license_or_copyright: usize,
    pub old_files_count: usize,
    pub new_files_count: usize,
}

impl DeltaStats {
    /// Fraction of alien files whose license/copyright semantics carry over
    /// from the matched Debian file.
    pub fn similarity(&self) -> f64 {
        if self.new_files_count == 0 {
            return 0.0;
        }
        let similar = self.same_files
            + self.moved_files
            + self.changed_files_with_no_license_and_copyright
            + self.changed_files_with_same_copyright_and_license
            + self.changed_files_with_updated_copyright_year_only;
        similar as f64 / self.new_files_count as f64
    }

    pub fn new_side_total(&self) -> usize {
        self.same_files
            + self.moved_files
            + self.changed_files_with_no_license_and_copyright
            + self.changed_files_with_same_copyright_and_license
            + self.changed_files_with_updated_copyright_year_only
            + self.changed_files_with_changed_copyright_or_license
            + self.new_files_with_no_license_and_copyright
            + self.new_files_with_license_or_copyright
    }

    pub fn old_side_total(&self) -> usize {
        self.same_files
            + self.moved_files
            + self.changed_files_with_no_license_and_copyright
            + self.changed_files_with_same_copyright_and_license
            + self.changed_files_with_updated_copyright_year_only
            + self.changed_files_with_changed_copyright_or_license
            + self.deleted_files_with_no_license_and_copyright
            + self.deleted_files_with_license_or_copyright
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaBody {
    pub same_files: Vec<String>,
    pub moved_files: Vec<MovedFile>,
    pub changed_files_with_no_license_and_copyright: Vec<String>,
    pub changed_files_with_same_copyright_and_license: Vec<String>,
    pub changed_files_with_updated_copyright_year_only: Vec<String>,
    pub changed_files_with_changed_copyright_or_license: Vec<String>,
    pub deleted_files_with_no_license_and_copyright: Vec<String>,
    pub deleted_files_with_license_or_copyright: Vec<String>,
    pub new_files_with_no_license_and_copyright: Vec<String>,
    pub new_files_with_license_or_copyright: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparedFiles {
    pub old_scan_out_file: String,
    pub new_scan_out_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaHeader {
    pub compared_json_files: ComparedFiles,
    pub stats: DeltaStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaModel {
    pub tool: ToolInfo,
    pub header: DeltaHeader,
    pub body: DeltaBody,
}
