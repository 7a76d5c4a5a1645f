use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid report config: {0}")]
    InvalidConfig(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("layout failed: {0}")]
    Layout(String),
}
