//! HTCondor submit description types
//!
//! Builds the submit description file (`*.jdl`) handed to `condor_submit`.
//! Rendering is a pure function of the descriptor fields, so the same
//! inputs always produce byte-identical text.

pub mod descriptor;
pub mod error;

pub use descriptor::{SubmitDescriptor, SubmitDescriptorBuilder, UNIVERSE};
pub use error::DescriptorError;

/// Macro expanded by the scheduler to the cluster identifier.
pub const CLUSTER_ID_MACRO: &str = "$(ClusterId)";

/// Macro expanded by the scheduler to the process index within the cluster.
pub const PROC_ID_MACRO: &str = "$(ProcId)";
