//! Error types for consentry.

use thiserror::Error;

/// Result type alias using consentry's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for consentry operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Attachment not found in the tracking ledger
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(uuid::Uuid),

    /// Ticket not found
    #[error("Ticket not found: {0}")]
    TicketNotFound(uuid::Uuid),

    /// Object storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A storage locator string could not be parsed
    #[error("Malformed locator: {0}")]
    MalformedLocator(String),

    /// Page rasterization failed
    #[error("Render error: {0}")]
    Render(String),

    /// Issue tracker operation failed
    #[error("Tracker error: {0}")]
    Tracker(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_attachment_not_found() {
        let id = Uuid::nil();
        let err = Error::AttachmentNotFound(id);
        assert_eq!(err.to_string(), format!("Attachment not found: {}", id));
    }

    #[test]
    fn test_error_display_ticket_not_found() {
        let id = Uuid::nil();
        let err = Error::TicketNotFound(id);
        assert_eq!(err.to_string(), format!("Ticket not found: {}", id));
    }

    #[test]
    fn test_error_display_storage() {
        let err = Error::Storage("bucket unreachable".to_string());
        assert_eq!(err.to_string(), "Storage error: bucket unreachable");
    }

    #[test]
    fn test_error_display_malformed_locator() {
        let err = Error::MalformedLocator("no-slash".to_string());
        assert_eq!(err.to_string(), "Malformed locator: no-slash");
    }

    #[test]
    fn test_error_display_render() {
        let err = Error::Render("pdftoppm exited with 1".to_string());
        assert_eq!(err.to_string(), "Render error: pdftoppm exited with 1");
    }

    #[test]
    fn test_error_display_tracker() {
        let err = Error::Tracker("create issue rejected".to_string());
        assert_eq!(err.to_string(), "Tracker error: create issue rejected");
    }

    #[test]
    fn test_error_display_serialization() {
        let err = Error::Serialization("invalid JSON".to_string());
        assert_eq!(err.to_string(), "Serialization error: invalid JSON");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing database URL".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing database URL");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("negative page number".to_string());
        assert_eq!(err.to_string(), "Invalid input: negative page number");
    }

    #[test]
    fn test_error_display_request() {
        let err = Error::Request("network unreachable".to_string());
        assert_eq!(err.to_string(), "Request error: network unreachable");
    }

    #[test]
    fn test_error_display_internal() {
        let err = Error::Internal("unexpected state".to_string());
        assert_eq!(err.to_string(), "Internal error: unexpected state");
    }

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => {
                assert!(!msg.is_empty());
            }
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        let result = get_result();
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_error_debug_format() {
        let err = Error::NotFound("test".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("NotFound"));
    }
}
