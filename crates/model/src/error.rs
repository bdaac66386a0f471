use thiserror::Error;

/// Errors raised while resolving the static transaction configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No service with this name is configured.
    #[error("service cannot be found: {0}")]
    UnknownService(String),

    /// No transaction with this type is configured.
    #[error("transaction type cannot be found: {0}")]
    UnknownTransaction(String),

    /// A configured stage list names a service that does not exist.
    #[error("transaction '{kind}' references unknown service '{service}'")]
    UnresolvedStage { kind: String, service: String },
}
