//! Maps a job request and its artifacts onto a submit description

use std::path::Path;

use condor_jdl::{DescriptorError, SubmitDescriptor};

use crate::job::JobRequest;
use crate::manifest::TransferManifest;

/// Builds [`SubmitDescriptor`]s for job requests
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorGenerator;

impl DescriptorGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Descriptor for one job array. The result depends only on the
    /// arguments, so rendering it twice gives identical bytes.
    pub fn generate(
        &self,
        request: &JobRequest,
        credential: &Path,
        manifest: &TransferManifest,
        executable: &str,
        log_base: &str,
    ) -> Result<SubmitDescriptor, DescriptorError> {
        SubmitDescriptor::builder(executable)
            .x509_proxy(credential.to_string_lossy())
            .request_memory_mb(request.memory_mb)
            .request_cpus(request.n_threads)
            .job_flavour(request.job_flavor.as_str())
            .transfer_inputs(manifest.to_strings())
            .log_base(log_base)
            .queue(request.n_jobs)
            .build()
    }
}
