use std::time::Duration;

/// Why a step of a camera's pipeline failed.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Session(#[from] cam_api_session::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response from {url} has no `{field}` field")]
    MissingField { url: String, field: &'static str },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Overlay(#[from] region_overlay::Error),
    #[error("no new preview for camera {uuid} after waiting {waited:?}")]
    PreviewTimeout { uuid: String, waited: Duration },
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
