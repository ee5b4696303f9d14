// Copyright 2016-2025 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0
// <http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{self, WrapErr};
use tracing::{error, info};

use cam_api_session::SessionCookies;
use cam_preview_annotator::{
    Config, ConfigFile, DEFAULT_LOG_DIR, DEFAULT_MAX_WORKERS, LOG_FILENAME,
};

const DEFAULT_RUST_LOG: &str =
    "cam_preview_annotator=info,region_overlay=info,cam_api_session=info,warn";

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Base URL of the camera server, e.g. `http://127.0.0.1:8000`.
    #[arg(long, env = "BASE_URL")]
    base_url: String,

    /// Value of the `sessionid` cookie.
    #[arg(long, env = "SESSION_ID", hide_env_values = true)]
    session_id: String,

    /// Value of the `csrftoken` cookie.
    #[arg(long, env = "CSRF_TOKEN", hide_env_values = true)]
    csrf_token: String,

    /// TOML file with cameras, timing and drawing options.
    #[arg(long, env = "CAM_PREVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the log file.
    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    /// Maximum number of cameras processed at the same time.
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    max_workers: usize,
}

fn main() -> eyre::Result<()> {
    dotenv::dotenv().ok();
    if std::env::var_os("RUST_LOG").is_none() {
        // SAFETY: no other threads exist yet.
        unsafe { std::env::set_var("RUST_LOG", DEFAULT_RUST_LOG) };
    }
    color_eyre::install()?;

    let cli = Cli::parse();

    let log_path = cli.log_dir.join(LOG_FILENAME);
    env_tracing_logger::initiate_logging(Some(&log_path), false)
        .map_err(|e| eyre::eyre!("{e}"))
        .with_context(|| format!("while starting logging to {}", log_path.display()))?;

    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)
            .with_context(|| format!("while reading config file {}", path.display()))?,
        None => ConfigFile::default(),
    };
    let cfg = Config::new(
        cli.base_url,
        SessionCookies::new(cli.session_id, cli.csrf_token),
        file,
        cli.max_workers,
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("cam-preview-runtime")
        .build()?;

    info!("========== Camera preview processing started ==========");
    let outcomes = runtime.block_on(cam_preview_annotator::run(&cfg))?;

    let n_ok = outcomes.iter().filter(|o| o.is_ok()).count();
    for outcome in outcomes.iter() {
        let camera = &outcome.camera;
        match &outcome.result {
            Ok(()) => info!(
                "{} ({}): saved {}",
                camera.name,
                camera.uuid,
                camera.output_filename.display()
            ),
            Err(e) => error!("{} ({}): failed: {e}", camera.name, camera.uuid),
        }
    }
    info!("{n_ok} of {} cameras processed successfully", outcomes.len());
    info!("========== Camera preview processing finished ==========");
    Ok(())
}
