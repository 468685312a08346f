//! Core error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the catalog and the event archive.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read gift catalog '{}': {source}", path.display())]
    CatalogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse gift catalog '{}': {source}", path.display())]
    CatalogParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_display() {
        let err = CoreError::CatalogRead {
            path: PathBuf::from("/nonexistent/gifts.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(
            err.to_string(),
            "failed to read gift catalog '/nonexistent/gifts.json': not found"
        );
    }

    #[test]
    fn test_from_io() {
        let err: CoreError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, CoreError::Io(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
