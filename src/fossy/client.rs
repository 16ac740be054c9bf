//! Typed HTTP adapter for the clearing server's REST API
//!
//! All server interaction goes through the [`ClearingClient`] trait so the
//! pipeline can be exercised against the in-memory fake. The HTTP
//! implementation authenticates with a bearer token derived from
//! user/password and polls job state with bounded-exponential backoff.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Settings;
use crate::http::with_retries;
use crate::models::fossy::{FossyLicenseFinding, FossySummary};
use crate::{A4fError, A4fResult};

/// Agent set scheduled on every upload.
pub const AGENTS: &[&str] = &["monk", "nomos", "ojo", "copyright", "ojo_decider"];

/// Poll intervals: bounded exponential with a cap.
const POLL_INITIAL: Duration = Duration::from_secs(5);
const POLL_CAP: Duration = Duration::from_secs(60);
/// Overall budget for a scanner run on one upload.
const POLL_TIMEOUT: Duration = Duration::from_secs(4 * 60 * 60);

#[derive(Debug, Clone, Deserialize)]
pub struct UploadInfo {
    pub id: u64,
    #[serde(rename = "uploadname")]
    pub upload_name: String,
    #[serde(default)]
    pub foldername: Option<String>,
    /// Content hash recorded by the server, used for idempotent re-uploads.
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobInfo {
    pub id: u64,
    pub status: String,
}

impl JobInfo {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "failed")
    }
}

pub trait ClearingClient {
    fn find_upload(&self, upload_name: &str) -> A4fResult<Option<UploadInfo>>;
    /// Upload a tarball; returns the new upload id.
    fn upload(&self, upload_name: &str, tarball: &Path, description: &str) -> A4fResult<u64>;
    fn schedule_agents(&self, upload_id: u64) -> A4fResult<()>;
    fn import_spdx(&self, upload_id: u64, rdfxml: &Path) -> A4fResult<()>;
    fn summary(&self, upload_id: u64) -> A4fResult<FossySummary>;
    fn licenses(&self, upload_id: u64) -> A4fResult<Vec<FossyLicenseFinding>>;
    fn jobs(&self, upload_id: u64) -> A4fResult<Vec<JobInfo>>;
    /// Generate and download the server's SPDX tag-value report.
    fn spdx_report(&self, upload_id: u64) -> A4fResult<String>;
}

/// Poll until every job on the upload reaches a terminal state. A failed
/// job surfaces as [`A4fError::ServiceUnavailable`] (retryable at the
/// command level).
pub fn wait_for_jobs(client: &dyn ClearingClient, upload_id: u64) -> A4fResult<()> {
    let start = std::time::Instant::now();
    let mut delay = POLL_INITIAL;
    let mut empty_polls = 0u32;
    loop {
        if start.elapsed() > POLL_TIMEOUT {
            return Err(A4fError::ServiceUnavailable(format!(
                "timeout waiting for jobs on upload {upload_id}"
            )));
        }
        let jobs = client.jobs(upload_id)?;
        if jobs.is_empty() {
            // scheduling races: one empty poll may just be too early
            empty_polls += 1;
            if empty_polls >= 2 {
                return Ok(());
            }
        } else if jobs.iter().all(|j| j.is_terminal()) {
            if let Some(failed) = jobs.iter().find(|j| j.status == "failed") {
                return Err(A4fError::ServiceUnavailable(format!(
                    "job {} on upload {upload_id} failed",
                    failed.id
                )));
            }
            return Ok(());
        }
        tracing::debug!(
            "upload {upload_id}: {} jobs pending, sleeping {delay:?}",
            jobs.iter().filter(|j| !j.is_terminal()).count()
        );
        std::thread::sleep(delay);
        delay = (delay * 2).min(POLL_CAP);
    }
}

// ─── HTTP implementation ───────────────────────────────────────────

pub struct FossologyClient {
    api: String,
    token: String,
    group_id: u32,
    http: reqwest::blocking::Client,
}

impl FossologyClient {
    /// Connect and obtain a write-scoped bearer token.
    pub fn connect(settings: &Settings) -> A4fResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| A4fError::Network(format!("cannot build HTTP client: {e}")))?;
        let api = format!("{}/api/v1", settings.fossy_server.trim_end_matches('/'));

        let expire = (chrono::Utc::now() + chrono::Duration::days(2))
            .format("%Y-%m-%d")
            .to_string();
        let body = json!({
            "username": settings.fossy_user,
            "password": settings.fossy_password,
            "token_name": uuid::Uuid::new_v4().to_string(),
            "token_scope": "write",
            "token_expire": expire,
        });
        let response: Value = with_retries("clearing-server token", || {
            let res = http
                .post(format!("{api}/tokens"))
                .json(&body)
                .send()
                .map_err(|e| A4fError::Network(format!("POST /tokens: {e}")))?;
            status_checked_json(res)
        })?;
        let token = response
            .get("Authorization")
            .and_then(|a| a.as_str())
            .map(|a| a.trim_start_matches("Bearer ").to_string())
            .ok_or_else(|| {
                A4fError::ServiceUnavailable(
                    "clearing server did not return a bearer token".to_string(),
                )
            })?;

        Ok(FossologyClient {
            api,
            token,
            group_id: settings.fossy_group_id,
            http,
        })
    }

    fn get(&self, path: &str) -> A4fResult<Value> {
        with_retries(path, || {
            let res = self
                .http
                .get(format!("{}{}", self.api, path))
                .bearer_auth(&self.token)
                .header("groupName", self.group_id.to_string())
                .send()
                .map_err(|e| A4fError::Network(format!("GET {path}: {e}")))?;
            status_checked_json(res)
        })
    }

    fn post(&self, path: &str, headers: &[(&str, String)], body: Option<Value>) -> A4fResult<Value> {
        with_retries(path, || {
            let mut req = self
                .http
                .post(format!("{}{}", self.api, path))
                .bearer_auth(&self.token);
            for (name, value) in headers {
                req = req.header(*name, value.as_str());
            }
            if let Some(body) = &body {
                req = req.json(body);
            }
            let res = req
                .send()
                .map_err(|e| A4fError::Network(format!("POST {path}: {e}")))?;
            status_checked_json(res)
        })
    }
}

/// 2xx -> parsed JSON, 5xx -> retryable, 4xx -> permanent.
fn status_checked_json(res: reqwest::blocking::Response) -> A4fResult<Value> {
    let status = res.status();
    if status.is_success() {
        return res
            .json()
            .map_err(|e| A4fError::Network(format!("bad JSON from clearing server: {e}")));
    }
    let message = format!("clearing server returned HTTP {status}");
    if status.is_server_error() {
        Err(A4fError::ServiceUnavailable(message))
    } else {
        Err(A4fError::Network(message))
    }
}

impl ClearingClient for FossologyClient {
    fn find_upload(&self, upload_name: &str) -> A4fResult<Option<UploadInfo>> {
        let uploads = self.get("/uploads?limit=10000")?;
        let uploads: Vec<UploadInfo> = serde_json::from_value(uploads)
            .map_err(|e| A4fError::Network(format!("bad /uploads response: {e}")))?;
        Ok(uploads.into_iter().find(|u| u.upload_name == upload_name))
    }

    fn upload(&self, upload_name: &str, tarball: &Path, description: &str) -> A4fResult<u64> {
        tracing::info!("[{upload_name}] uploading to the clearing server");
        let form = reqwest::blocking::multipart::Form::new()
            .file("fileInput", tarball)
            .map_err(|e| A4fError::Io(e))?;
        let res = self
            .http
            .post(format!("{}/uploads", self.api))
            .bearer_auth(&self.token)
            .header("folderId", "1")
            .header("uploadDescription", description)
            .header("ignoreScm", "true")
            .header("groupName", self.group_id.to_string())
            .multipart(form)
            .send()
            .map_err(|e| A4fError::Network(format!("POST /uploads: {e}")))?;
        let body = status_checked_json(res)?;
        body.get("message")
            .and_then(|m| m.as_u64())
            .or_else(|| body.get("uploadId").and_then(|m| m.as_u64()))
            .ok_or_else(|| {
                A4fError::ServiceUnavailable(
                    "clearing server did not return an upload id".to_string(),
                )
            })
    }

    fn schedule_agents(&self, upload_id: u64) -> A4fResult<()> {
        let analysis: Value = AGENTS
            .iter()
            .filter(|a| **a != "ojo_decider")
            .map(|a| (a.to_string(), Value::Bool(true)))
            .collect::<serde_json::Map<String, Value>>()
            .into();
        let body = json!({
            "analysis": analysis,
            "decider": { "ojo_decider": true },
        });
        self.post(
            "/jobs",
            &[
                ("folderId", "1".to_string()),
                ("uploadId", upload_id.to_string()),
            ],
            Some(body),
        )?;
        Ok(())
    }

    fn import_spdx(&self, upload_id: u64, rdfxml: &Path) -> A4fResult<()> {
        tracing::info!("importing SPDX report into upload {upload_id}");
        let form = reqwest::blocking::multipart::Form::new()
            .file("report", rdfxml)
            .map_err(A4fError::Io)?;
        let res = self
            .http
            .post(format!("{}/uploads/{upload_id}/imports/spdx", self.api))
            .bearer_auth(&self.token)
            .header("addConcludedAsDecisions", "true")
            .header("addCopyrights", "true")
            .multipart(form)
            .send()
            .map_err(|e| A4fError::Network(format!("POST imports/spdx: {e}")))?;
        status_checked_json(res)?;
        Ok(())
    }

    fn summary(&self, upload_id: u64) -> A4fResult<FossySummary> {
        let value = self.get(&format!("/uploads/{upload_id}/summary"))?;
        serde_json::from_value(value)
            .map_err(|e| A4fError::Network(format!("bad summary response: {e}")))
    }

    fn licenses(&self, upload_id: u64) -> A4fResult<Vec<FossyLicenseFinding>> {
        let agents = AGENTS
            .iter()
            .filter(|a| **a != "ojo_decider")
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        let value = self.get(&format!("/uploads/{upload_id}/licenses?agent={agents}"))?;
        parse_license_findings(&value)
    }

    fn jobs(&self, upload_id: u64) -> A4fResult<Vec<JobInfo>> {
        let value = self.get(&format!("/jobs?upload={upload_id}"))?;
        serde_json::from_value(value)
            .map_err(|e| A4fError::Network(format!("bad jobs response: {e}")))
    }

    fn spdx_report(&self, upload_id: u64) -> A4fResult<String> {
        let body = self.post(
            "/report",
            &[
                ("uploadId", upload_id.to_string()),
                ("reportFormat", "spdx2tv".to_string()),
            ],
            None,
        )?;
        let report_ref = body
            .get("message")
            .and_then(|m| m.as_str())
            .ok_or_else(|| {
                A4fError::ServiceUnavailable("no report reference returned".to_string())
            })?;
        let report_id = report_ref.rsplit('/').next().unwrap_or(report_ref);
        wait_for_jobs(self, upload_id)?;

        with_retries("report download", || {
            let res = self
                .http
                .get(format!("{}/report/{report_id}", self.api))
                .bearer_auth(&self.token)
                .header("accept", "text/plain")
                .send()
                .map_err(|e| A4fError::Network(format!("GET /report: {e}")))?;
            let status = res.status();
            if status.is_success() {
                res.text()
                    .map_err(|e| A4fError::Network(format!("report body: {e}")))
            } else if status.is_server_error() {
                Err(A4fError::ServiceUnavailable(format!("GET /report: HTTP {status}")))
            } else {
                Err(A4fError::Network(format!("GET /report: HTTP {status}")))
            }
        })
    }
}

/// Accept both the legacy shape (`agentFindings`/`conclusions`) and the
/// newer one (`findings.scanner`/`findings.conclusion`).
pub fn parse_license_findings(value: &Value) -> A4fResult<Vec<FossyLicenseFinding>> {
    let entries = value
        .as_array()
        .ok_or_else(|| A4fError::Network("licenses response is not an array".to_string()))?;
    let mut out = Vec::new();
    for entry in entries {
        let file_path = entry
            .get("filePath")
            .and_then(|p| p.as_str())
            .unwrap_or_default()
            .to_string();
        let string_list = |v: Option<&Value>| -> Vec<String> {
            v.and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|s| s.as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        let (agent_findings, conclusions) = if let Some(findings) = entry.get("findings") {
            (
                string_list(findings.get("scanner")),
                string_list(findings.get("conclusion")),
            )
        } else {
            (
                string_list(entry.get("agentFindings")),
                string_list(entry.get("conclusions")),
            )
        };
        out.push(FossyLicenseFinding {
            file_path,
            agent_findings,
            conclusions,
        });
    }
    Ok(out)
}

/// In-memory clearing server used by the pipeline tests.
#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct State {
        uploads: BTreeMap<String, u64>,
        next_id: u64,
        transfers: u32,
        imported: Vec<u64>,
        summaries: BTreeMap<u64, FossySummary>,
        licenses: BTreeMap<u64, Vec<FossyLicenseFinding>>,
        reports: BTreeMap<u64, String>,
    }

    #[derive(Default)]
    pub struct InMemoryClearing {
        state: RefCell<State>,
    }

    impl InMemoryClearing {
        pub fn transfer_count(&self) -> u32 {
            self.state.borrow().transfers
        }

        pub fn imported_uploads(&self) -> Vec<u64> {
            self.state.borrow().imported.clone()
        }

        pub fn set_summary(&self, upload_id: u64, summary: FossySummary) {
            self.state.borrow_mut().summaries.insert(upload_id, summary);
        }

        pub fn set_licenses(&self, upload_id: u64, licenses: Vec<FossyLicenseFinding>) {
            self.state.borrow_mut().licenses.insert(upload_id, licenses);
        }

        pub fn set_report(&self, upload_id: u64, report: String) {
            self.state.borrow_mut().reports.insert(upload_id, report);
        }
    }

    impl ClearingClient for InMemoryClearing {
        fn find_upload(&self, upload_name: &str) -> A4fResult<Option<UploadInfo>> {
            Ok(self
                .state
                .borrow()
                .uploads
                .get(upload_name)
                .map(|id| UploadInfo {
                    id: *id,
                    upload_name: upload_name.to_string(),
                    foldername: Some("Software Repository".to_string()),
                    hash: None,
                }))
        }

        fn upload(&self, upload_name: &str, _tarball: &Path, _description: &str) -> A4fResult<u64> {
            let mut state = self.state.borrow_mut();
            let id = 300 + state.next_id;
            state.next_id += 1;
            state.transfers += 1;
            state.uploads.insert(upload_name.to_string(), id);
            Ok(id)
        }

        fn schedule_agents(&self, _upload_id: u64) -> A4fResult<()> {
            Ok(())
        }

        fn import_spdx(&self, upload_id: u64, _rdfxml: &Path) -> A4fResult<()> {
            self.state.borrow_mut().imported.push(upload_id);
            Ok(())
        }

        fn summary(&self, upload_id: u64) -> A4fResult<FossySummary> {
            Ok(self
                .state
                .borrow()
                .summaries
                .get(&upload_id)
                .cloned()
                .unwrap_or(FossySummary {
                    id: upload_id,
                    ..FossySummary::default()
                }))
        }

        fn licenses(&self, upload_id: u64) -> A4fResult<Vec<FossyLicenseFinding>> {
            Ok(self
                .state
                .borrow()
                .licenses
                .get(&upload_id)
                .cloned()
                .unwrap_or_default())
        }

        fn jobs(&self, _upload_id: u64) -> A4fResult<Vec<JobInfo>> {
            Ok(vec![JobInfo {
                id: 1,
                status: "completed".to_string(),
            }])
        }

        fn spdx_report(&self, upload_id: u64) -> A4fResult<String> {
            self.state
                .borrow()
                .reports
                .get(&upload_id)
                .cloned()
                .ok_or_else(|| A4fError::NotFound(format!("no report for upload {upload_id}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn license_findings_accept_both_shapes() {
        let legacy = json!([{
            "filePath": "acl-2.2.53/COPYING",
            "agentFindings": ["GPL-2.0-or-later"],
            "conclusions": ["GPL-2.0-or-later"]
        }]);
        let parsed = parse_license_findings(&legacy).unwrap();
        assert_eq!(parsed[0].agent_findings, vec!["GPL-2.0-or-later"]);

        let modern = json!([{
            "filePath": "acl-2.2.53/COPYING",
            "findings": {"scanner": ["GPL-2.0-or-later"], "conclusion": []}
        }]);
        let parsed = parse_license_findings(&modern).unwrap();
        assert_eq!(parsed[0].agent_findings, vec!["GPL-2.0-or-later"]);
        assert!(parsed[0].conclusions.is_empty());
    }

    #[test]
    fn terminal_job_states() {
        for (status, terminal) in [
            ("completed", true),
            ("failed", true),
            ("queued", false),
            ("running", false),
        ] {
            let job = JobInfo {
                id: 1,
                status: status.to_string(),
            };
            assert_eq!(job.is_terminal(), terminal, "{status}");
        }
    }
}
