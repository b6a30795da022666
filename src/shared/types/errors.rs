use thiserror::Error;

/// Errors raised by the smart-charging core.
///
/// Every variant is local to one operation: a rejected profile or an invalid
/// request leaves the connector running under its previous effective limit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChargingError {
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("No active transaction on connector {0}")]
    NoActiveTransaction(u32),

    #[error("Profile targets transaction {requested} but connector {connector_id} runs transaction {active}")]
    TransactionMismatch {
        connector_id: u32,
        requested: i32,
        active: i32,
    },

    #[error("Transaction {transaction_id} already active on connector {connector_id}")]
    TransactionAlreadyActive {
        connector_id: u32,
        transaction_id: i32,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown connector {0}")]
    UnknownConnector(u32),

    #[error("Connector {0} is not running")]
    ConnectorUnavailable(u32),
}

impl ChargingError {
    /// Short machine-readable reason, used as the `reason` of a rejection
    /// and as a metrics label.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidProfile(_) => "InvalidProfile",
            Self::NoActiveTransaction(_) => "NoActiveTransaction",
            Self::TransactionMismatch { .. } => "TransactionMismatch",
            Self::TransactionAlreadyActive { .. } => "TransactionAlreadyActive",
            Self::InvalidConfiguration(_) => "InvalidConfiguration",
            Self::UnknownConnector(_) => "UnknownConnector",
            Self::ConnectorUnavailable(_) => "ConnectorUnavailable",
        }
    }
}

/// Result type for smart-charging operations
pub type ChargingResult<T> = Result<T, ChargingError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
