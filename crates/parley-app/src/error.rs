//! Runtime errors.

use thiserror::Error;

/// Errors that stop the runtime.
///
/// Client-level failures (rejected intents, lost connections, failed sends)
/// never stop the runtime; they are shown to the user as notices.
#[derive(Debug, Error)]
pub enum RuntimeError<E: std::error::Error + 'static> {
    /// The driver failed at something the runtime cannot recover from.
    #[error("driver error: {0}")]
    Driver(#[source] E),
}
