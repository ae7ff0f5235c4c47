use thiserror::Error;

pub const BACKEND_UNREACHABLE_MESSAGE: &str =
    "Backend server is not responding. Please check if the server is running and try again.";

/// How a failed action should be shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presentation {
    /// Nothing is shown; the user chose to stop.
    Silent,
    Inline,
    /// A dedicated connect-your-wallet prompt replaces any error text.
    ConnectWalletPrompt,
}

/// Failure of one flow action, tagged at the point where it happened.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("{0}")]
    Validation(String),
    #[error("Wallet not connected")]
    WalletNotConnected,
    #[error("Transaction was rejected by user")]
    UserRejected,
    #[error("{}", BACKEND_UNREACHABLE_MESSAGE)]
    NetworkUnavailable,
    #[error("{0}")]
    BackendRejected(String),
    #[error("{0}")]
    Transaction(String),
}

impl FlowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        FlowError::Validation(msg.into())
    }

    pub fn presentation(&self) -> Presentation {
        match self {
            FlowError::UserRejected => Presentation::Silent,
            FlowError::WalletNotConnected => Presentation::ConnectWalletPrompt,
            FlowError::Validation(_)
            | FlowError::NetworkUnavailable
            | FlowError::BackendRejected(_)
            | FlowError::Transaction(_) => Presentation::Inline,
        }
    }

    /// Text to put in the flow's error field, if any.
    pub fn surfaced_message(&self) -> Option<String> {
        match self.presentation() {
            Presentation::Inline => Some(self.to_string()),
            Presentation::Silent | Presentation::ConnectWalletPrompt => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// No response at all: refused connection, reset, empty reply.
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// `success: false` envelope; carries the backend's message.
    #[error("{0}")]
    Rejected(String),
    #[error("invalid backend payload: {0}")]
    Decode(String),
}

impl From<BackendError> for FlowError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unreachable(_) => FlowError::NetworkUnavailable,
            other => FlowError::BackendRejected(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("rpc request failed: {0}")]
    Rpc(String),
    #[error("transaction {signature} expired before confirmation")]
    BlockhashExpired { signature: String },
    #[error("transaction {signature} failed: {reason}")]
    TransactionFailed { signature: String, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignError {
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Failed(String),
}

impl SignError {
    /// Classifies a wallet's free-form failure message. Wallets report a
    /// declined prompt with "rejected" or "denied" somewhere in the text.
    pub fn from_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let lower = msg.to_lowercase();
        if lower.contains("reject") || lower.contains("denied") {
            SignError::Rejected(msg)
        } else {
            SignError::Failed(msg)
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),
    #[error("Failed to sign transaction: {0}")]
    Sign(#[from] SignError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("failed to serialize transaction: {0}")]
    Serialize(String),
}

impl From<SubmitError> for FlowError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Sign(SignError::Rejected(_)) => FlowError::UserRejected,
            other => FlowError::Transaction(other.to_string()),
        }
    }
}

impl From<NetworkError> for FlowError {
    fn from(err: NetworkError) -> Self {
        FlowError::Transaction(err.to_string())
    }
}
