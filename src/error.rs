//! Error handling module
//!
//! Provides the error taxonomy shared by connectors, the alert sink and the
//! check cycle. None of these errors ever stop the scheduler: connectors
//! collapse them into empty results, the sink collapses them into `false`, and
//! the scheduler turns a failed check into a cooldown.

use thiserror::Error;

/// Monitor-wide error type
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Background task failed: {0}")]
    Join(String),
}

impl From<tokio_postgres::Error> for MonitorError {
    fn from(e: tokio_postgres::Error) -> Self {
        // tokio-postgres reports refused/closed sockets without a db error body
        if e.as_db_error().is_none() && e.is_closed() {
            MonitorError::Connection(e.to_string())
        } else {
            MonitorError::Query(e.to_string())
        }
    }
}

impl From<mysql_async::Error> for MonitorError {
    fn from(e: mysql_async::Error) -> Self {
        match e {
            mysql_async::Error::Io(_) | mysql_async::Error::Url(_) => {
                MonitorError::Connection(e.to_string())
            }
            other => MonitorError::Query(other.to_string()),
        }
    }
}

impl From<oracle::Error> for MonitorError {
    fn from(e: oracle::Error) -> Self {
        MonitorError::Query(e.to_string())
    }
}

impl From<tokio::task::JoinError> for MonitorError {
    fn from(e: tokio::task::JoinError) -> Self {
        MonitorError::Join(e.to_string())
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(e: reqwest::Error) -> Self {
        MonitorError::Delivery(e.to_string())
    }
}

/// Result type alias for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Helper function to create a connection error
pub fn connection_error(msg: impl Into<String>) -> MonitorError {
    MonitorError::Connection(msg.into())
}
