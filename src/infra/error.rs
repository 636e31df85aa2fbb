//! Failures while wiring a service to its backing systems.
//!
//! Everything here happens before a listener is bound or a consumer starts;
//! request-time failures are reported through `PostServiceError` instead.

use thiserror::Error;

use crate::cache::CacheError;
use crate::events::BrokerError;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Connecting to or migrating one of the two Postgres stores.
    #[error("{store} database error: {message}")]
    Database {
        store: &'static str,
        message: String,
    },
    /// The cache backend refused the startup ping.
    #[error("cache backend error: {0}")]
    Cache(#[from] CacheError),
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl InfraError {
    pub fn database(store: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Database {
            store,
            message: err.to_string(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_name_their_store() {
        let err = InfraError::database("notifications", "connection refused");
        assert_eq!(
            err.to_string(),
            "notifications database error: connection refused"
        );
    }
}
