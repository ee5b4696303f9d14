//! Refresh camera previews on a camera-management server and annotate them
//! with the cameras' regions of interest.
//!
//! For every configured camera the server is asked to render a new preview.
//! Once it appears, the preview is downloaded, its regions are drawn onto it
//! with [region_overlay], the result is saved locally and the camera record
//! is written back to the server. Cameras are processed concurrently and a
//! failure of one camera never affects the others.

// Copyright 2016-2025 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0
// <http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::Arc;

use tracing::info;

use cam_api_session::HttpSession;
use region_overlay::RegionRenderer;

mod client;
mod config;
mod error;
mod orchestrator;
mod poller;
mod types;

pub use client::{CameraApi, CameraClient};
pub use config::{
    Config, ConfigError, ConfigFile, DEFAULT_LOG_DIR, DEFAULT_MAX_WORKERS, LOG_FILENAME,
    PollingConfig, default_cameras,
};
pub use error::{Error, Result};
pub use orchestrator::{CameraOutcome, process_all, process_camera, save_image};
pub use poller::force_generate_new_preview;
pub use types::{Camera, CameraMetadata, TaskId};

/// Process every camera of `cfg` against the server of `cfg`.
///
/// Only set-up failures are returned as `Err`. The result of each camera is
/// in its [CameraOutcome].
pub async fn run(cfg: &Config) -> Result<Vec<CameraOutcome>> {
    let session = HttpSession::new(&cfg.base_url, &cfg.cookies)?;
    let client = CameraClient::new(session);
    let renderer = Arc::new(RegionRenderer::new(cfg.render.clone())?);

    info!(
        "Processing {} cameras with up to {} workers",
        cfg.cameras.len(),
        cfg.max_workers
    );
    let outcomes = process_all(
        &client,
        renderer,
        &cfg.cameras,
        &cfg.polling,
        cfg.max_workers,
    )
    .await;
    Ok(outcomes)
}
