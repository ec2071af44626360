//! Error types and handling for the game server.
//!
//! Two layers of errors exist: [`ServerError`] covers infrastructure failures
//! (socket binding, WebSocket handshakes) that abort a connection, while
//! [`GameError`] is the command-level taxonomy that handlers convert into a
//! single `error` event on the wire. No `GameError` ever terminates a
//! session loop.

/// Enumeration of possible server errors.
///
/// Categorizes errors into network-related and internal server errors
/// to help with debugging and error handling.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server errors such as serialization or channel failures
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Command-level error taxonomy.
///
/// Every command handler returns `Result<(), GameError>`; the message router
/// catches the error at the handler boundary and replies with an `error`
/// envelope carrying the display string. The variants map directly onto the
/// situations a client can trigger:
///
/// * [`GameError::NotFound`] - unknown player, planet, or mission
/// * [`GameError::InvalidState`] - a battle already running on the target,
///   a mission not yet complete, a planet already owned
/// * [`GameError::InsufficientResources`] - cost exceeds balance
/// * [`GameError::Protocol`] - malformed envelope or missing field
/// * [`GameError::Transient`] - transport send failure during delivery
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport failure: {0}")]
    Transient(String),
}
