//! Submission record (submission.json)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::catalog::Campaign;
use crate::job::JobRequest;
use crate::manifest::TransferManifest;

/// Schema version for submission.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "condor-mc/submission@1";

/// File name inside the submission directory
pub const RECORD_FILE: &str = "submission.json";

/// Errors for record operations
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A generated file and the digest of what was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigest {
    pub file: String,
    pub sha256: String,
}

impl ArtifactDigest {
    pub fn of(file: impl Into<String>, contents: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(contents);
        Self {
            file: file.into(),
            sha256: hex::encode(hasher.finalize()),
        }
    }
}

/// What was prepared in a submission directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub schema_version: u32,
    pub schema_id: String,
    pub created_at: DateTime<Utc>,
    pub request: JobRequest,
    pub campaign: Campaign,
    pub credential: PathBuf,
    pub manifest: TransferManifest,
    pub total_events: u64,
    pub remote_destination: String,
    pub executable: ArtifactDigest,
    pub descriptor: ArtifactDigest,
}

impl SubmissionRecord {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write [`RECORD_FILE`] into `dir`, returning its path
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, RecordError> {
        let path = dir.join(RECORD_FILE);
        fs::write(&path, self.to_json()?)?;
        Ok(path)
    }

    pub fn from_file(path: &Path) -> Result<Self, RecordError> {
        let json = fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_digest_is_sha256_hex() {
        let digest = ArtifactDigest::of("run_mc.sh", b"");
        assert_eq!(
            digest.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(digest.file, "run_mc.sh");
    }

    #[test]
    fn test_write_and_reload() {
        let dir = TempDir::new().unwrap();
        let request = JobRequest::builder("ttbarDM", "Run3Summer23", "/data/frag.py")
            .n_jobs(5)
            .build()
            .unwrap();
        let mut manifest = TransferManifest::new();
        manifest.push("/data/frag.py");

        let record = SubmissionRecord {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            total_events: request.total_events(),
            request,
            campaign: Campaign::new("Run3Summer23", "/opt/mc/campaigns/Run3Summer23"),
            credential: PathBuf::from("/tmp/x509up_u5021"),
            manifest,
            remote_destination: "root://host//store/user/x/ttbarDM/Run3Summer23/".to_string(),
            executable: ArtifactDigest::of("run_mc.sh", b"#!/bin/bash\n"),
            descriptor: ArtifactDigest::of("condor_cfg.jdl", b"queue 5\n"),
        };

        let path = record.write_to_dir(dir.path()).unwrap();
        assert_eq!(path, dir.path().join(RECORD_FILE));

        let loaded = SubmissionRecord::from_file(&path).unwrap();
        assert_eq!(loaded.schema_id, SCHEMA_ID);
        assert_eq!(loaded.total_events, 500);
        assert_eq!(loaded.request.n_jobs, 5);
        assert_eq!(loaded.descriptor, record.descriptor);
    }
}
