use thiserror::Error;

// ---------------------------------------------------------------------------
// Error kinds of the data layer
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum MaskError {
    /// The input bytes are not a readable MAT container.
    #[error("cannot parse MAT file: {0}")]
    Parse(String),

    /// Every locator strategy was exhausted.
    #[error("no segmentation mask found in the file")]
    NotFound,

    /// A candidate array has the wrong rank, class or values for a mask.
    #[error("not a usable mask: {0}")]
    Shape(String),

    /// The recorded source path no longer matches the container.
    #[error("container structure mismatch: {0}")]
    Structural(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            MaskError::NotFound.to_string(),
            "no segmentation mask found in the file"
        );
        let err = MaskError::Structural("field 'Segmentation' missing".into());
        assert!(err.to_string().contains("Segmentation"));
    }

    #[test]
    fn test_error_from_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: MaskError = io_error.into();
        assert!(matches!(err, MaskError::Io(_)));
    }
}
