use tokio_tungstenite::tungstenite;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The WebSocket upgrade was refused or did not complete.
    #[error("upgrade failed: {0}")]
    UpgradeFailed(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] tungstenite::Error),

    /// Reading a frame failed, including frames over the size limit.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] tungstenite::Error),
}
