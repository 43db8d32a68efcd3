use thiserror::Error;

/// Errors raised while decoding, styling or encoding an image.
#[derive(Error, Debug)]
pub enum StyleError {
    #[error("Unable to decode image: {0}")]
    Decode(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Unable to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("Failed to rebuild image buffer")]
    Buffer,
}

impl StyleError {
    /// True when the failure was caused by the caller's input rather than by
    /// the styler itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, StyleError::Decode(_) | StyleError::InvalidParameter(_))
    }
}
