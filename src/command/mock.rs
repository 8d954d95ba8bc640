//! Recording command runner for tests

use std::sync::Mutex;

use super::{CommandRunner, Invocation, ToolError, ToolOutput};

type Responder = Box<dyn Fn(&Invocation) -> ToolOutput + Send + Sync>;

/// In-process stand-in for [`super::SystemRunner`]
///
/// Every invocation is recorded in call order and answered by the
/// responder closure. The closure may also touch the filesystem to
/// simulate a tool's side effects (writing a proxy file, generating a
/// pileup list).
pub struct MockRunner {
    responder: Responder,
    calls: Mutex<Vec<Invocation>>,
}

impl MockRunner {
    /// Create a runner answering with `responder`
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Invocation) -> ToolOutput + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Runner where every call succeeds with empty output
    pub fn succeeding() -> Self {
        Self::new(|_| ToolOutput::success(""))
    }

    /// All invocations seen so far
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Invocations of a given program
    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| inv.program == program)
            .collect()
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::succeeding()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        Ok((self.responder)(invocation))
    }
}
