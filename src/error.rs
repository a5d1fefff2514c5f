//! Error types for the modem driver.
//!
//! Everything fallible in the library returns [`Result<T>`]. The variants
//! separate what the modem said (`Protocol`) from what we could not make
//! sense of (`Decode`) and from the byte stream going away (`Transport`).

/// The error type for all modem operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The modem answered the command with `ERROR`.
    #[error("modem returned ERROR for {command}")]
    Protocol { command: String },

    /// A recognized reply header whose arguments don't fit its packet type.
    #[error("decode error: {0}")]
    Decode(String),

    /// The transport failed or reached end of stream. The engine stops.
    #[error("transport error: {0}")]
    Transport(String),

    /// No terminal status line arrived before the call's deadline.
    #[error("timeout waiting for response")]
    Timeout,

    /// The session was shut down.
    #[error("session closed")]
    Closed,

    /// The modem replied with a packet of the wrong kind.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("message {0} not found")]
    MessageNotFound(i64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
