//! Submission state machine
//!
//! INIT → VALIDATE_INPUT → RESOLVE_CREDENTIAL → PREPARE_WORKDIR →
//! BUILD_ARTIFACTS → {SUBMIT | DRY_RUN} → DONE, with FAILED reachable
//! from every non-terminal state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionState {
    Init,
    ValidateInput,
    ResolveCredential,
    PrepareWorkdir,
    BuildArtifacts,
    Submit,
    DryRun,
    Done,
    Failed,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Done | SubmissionState::Failed)
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: SubmissionState) -> bool {
        use SubmissionState::*;

        match (self, target) {
            (Init, ValidateInput) => true,
            (ValidateInput, ResolveCredential) => true,
            (ResolveCredential, PrepareWorkdir) => true,
            (PrepareWorkdir, BuildArtifacts) => true,
            (BuildArtifacts, Submit) => true,
            (BuildArtifacts, DryRun) => true,
            (Submit, Done) => true,
            (DryRun, Done) => true,

            (from, Failed) => !from.is_terminal(),

            _ => false,
        }
    }

    /// Whether the submission directory may exist in this state
    pub fn has_workdir(&self) -> bool {
        matches!(
            self,
            SubmissionState::PrepareWorkdir
                | SubmissionState::BuildArtifacts
                | SubmissionState::Submit
                | SubmissionState::DryRun
                | SubmissionState::Done
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_paths() {
        use SubmissionState::*;

        for last in [Submit, DryRun] {
            let path = [Init, ValidateInput, ResolveCredential, PrepareWorkdir, BuildArtifacts, last, Done];
            for pair in path.windows(2) {
                assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn test_no_skipping_or_leaving_terminal() {
        use SubmissionState::*;

        assert!(!ValidateInput.can_transition_to(PrepareWorkdir));
        assert!(!Init.can_transition_to(BuildArtifacts));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Init));
        assert!(ResolveCredential.can_transition_to(Failed));
    }

    #[test]
    fn test_workdir_only_after_credential() {
        assert!(!SubmissionState::ValidateInput.has_workdir());
        assert!(!SubmissionState::ResolveCredential.has_workdir());
        assert!(SubmissionState::PrepareWorkdir.has_workdir());
    }
}
