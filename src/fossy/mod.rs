//! Clearing-server integration
//!
//! The clearing server records human audit decisions over scanner
//! findings. This module uploads alien sources, schedules the scanner
//! agents, imports the synthesized SPDX so its conclusions become
//! decisions, and harvests the audit state back into the pool.

pub mod client;
pub mod report;
pub mod upload;

pub use client::{ClearingClient, FossologyClient, JobInfo, UploadInfo};
