use thiserror::Error;

/// Failures raised by the call registry and the conference bridge.
///
/// Client-facing handlers collapse most of these to a generic server error;
/// `MessageCollision` and `CapacityExceeded` keep distinct HTTP statuses
/// because clients act on them.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("call capacity exceeded")]
    CapacityExceeded,

    #[error("another live call already exists for message {0}")]
    MessageCollision(String),

    #[error("conference code {found} did not match {expected}")]
    CodeMismatch { expected: u32, found: u32 },

    #[error("no call record for code {0}")]
    RecordNotFound(u32),

    #[error("no active bridge for code {0}")]
    NoActiveBridge(u32),

    #[error("credential mismatch for code {0}")]
    CredentialMismatch(u32),

    #[error("provider request failed: {0}")]
    Provider(#[from] anyhow::Error),
}
