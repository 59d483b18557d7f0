use thiserror::Error;

/// Errors raised by the bot core.
///
/// `Recognition` is the only kind the purchase loop treats specially (it
/// triggers a free refresh); every other kind skips the current iteration.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("Input simulation failed: {0}")]
    Input(String),

    #[error("Tesseract error: {0}")]
    Tesseract(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BotError {
    /// True when OCR ran but did not yield a usable number.
    pub fn is_recognition_failure(&self) -> bool {
        matches!(self, BotError::Recognition(_))
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
