use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One of the services that messages can be delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Logical service name, matching the `origin` header it emits.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// Broker queue the service consumes from.
    pub queue: String,
}

/// The ordered stage list of one transaction type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDefinition {
    /// Human-readable description.
    pub description: String,

    /// Service names, in execution order. Every entry must resolve in
    /// [`TransactionConfig::services`].
    pub stages: Vec<String>,
}

/// The static topology: available services and transaction types.
///
/// Built in code by the embedding program and passed into the
/// orchestrator's constructor; the core reads no environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Service name to service entry.
    pub services: HashMap<String, ServiceConfig>,

    /// Transaction type to definition.
    pub transactions: HashMap<String, TransactionDefinition>,
}

impl TransactionConfig {
    /// Finds a service by its name.
    pub fn find_service(&self, name: &str) -> Result<&ServiceConfig, ConfigError> {
        self.services
            .get(name)
            .ok_or_else(|| ConfigError::UnknownService(name.to_string()))
    }

    /// Finds a transaction definition by its type.
    pub fn find_transaction(&self, kind: &str) -> Result<&TransactionDefinition, ConfigError> {
        self.transactions
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownTransaction(kind.to_string()))
    }

    /// Resolves the ordered service chain for a transaction type.
    pub fn chain(&self, kind: &str) -> Result<Vec<&ServiceConfig>, ConfigError> {
        self.find_transaction(kind)?
            .stages
            .iter()
            .map(|service| {
                self.services
                    .get(service)
                    .ok_or_else(|| ConfigError::UnresolvedStage {
                        kind: kind.to_string(),
                        service: service.clone(),
                    })
            })
            .collect()
    }

    /// Checks that every configured stage resolves to a known service.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in self.transactions.keys() {
            self.chain(kind)?;
        }
        Ok(())
    }
}
