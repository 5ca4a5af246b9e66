use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CertForgeError>;

/// Represents errors that can occur in the CertForge library.
///
/// Toolkit failures are never retried: minting certificates is not
/// idempotent, so a blind retry could issue a second certificate.
#[derive(Debug, Error)]
pub enum CertForgeError {
    /// The external PKI toolkit exited with a nonzero status. Carries the
    /// command line that was run and the toolkit's diagnostic output
    /// verbatim.
    #[error("toolkit invocation failed: {command}\n{diagnostics}")]
    ToolInvocation {
        command: String,
        diagnostics: String,
    },

    /// An operation assumed an artifact exists (or doesn't) and the
    /// filesystem disagreed.
    #[error("artifact state error: {0}")]
    ArtifactState(String),

    /// Error reading or writing certificate artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operating system randomness source failed while drawing a
    /// certificate serial number.
    #[error("randomness source failed: {0}")]
    Randomness(String),

    /// Error due to invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
