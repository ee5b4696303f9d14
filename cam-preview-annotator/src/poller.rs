//! Waiting for the server to publish a regenerated preview.

use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info, warn};

use crate::{
    client::CameraApi,
    config::PollingConfig,
    error::{Error, Result},
};

/// Trigger a new preview for camera `uuid` and wait until the server reports
/// a preview URI different from the one it reported before the trigger.
///
/// Returns the absolute URL of the new preview. Fails if the current
/// metadata cannot be read, if the trigger is rejected, or with
/// [Error::PreviewTimeout] if nothing new appears within `polling.max_wait`.
/// A failed fetch while waiting counts as "not changed yet". A fetch still
/// pending at the deadline is abandoned.
pub async fn force_generate_new_preview<A: CameraApi>(
    api: &A,
    uuid: &str,
    polling: &PollingConfig,
) -> Result<String> {
    let baseline = api.get_camera_data(uuid).await?;
    // A camera which never had a preview compares as the empty string.
    let old_uri = baseline.preview_uri().unwrap_or_default().to_string();
    debug!("Current preview of camera {uuid}: \"{old_uri}\"");

    let task = api.request_preview_regeneration(uuid).await?;
    info!("Preview regeneration started for camera {uuid}, task {task}");

    let start = Instant::now();
    let deadline = start + polling.max_wait;
    while Instant::now() < deadline {
        match timeout_at(deadline, api.get_camera_data(uuid)).await {
            Ok(Ok(metadata)) => match metadata.preview_uri() {
                Some(uri) if uri != old_uri => {
                    info!(
                        "New preview for camera {uuid} after {:.1}s: {uri}",
                        start.elapsed().as_secs_f64()
                    );
                    return Ok(api.preview_url(uri));
                }
                _ => {}
            },
            Ok(Err(e)) => {
                warn!("Could not check preview of camera {uuid}: {e}");
            }
            Err(_) => {
                warn!("Check of camera {uuid} still pending at the deadline");
                break;
            }
        }
        sleep_until((Instant::now() + polling.interval).min(deadline)).await;
    }

    Err(Error::PreviewTimeout {
        uuid: uuid.to_string(),
        waited: polling.max_wait,
    })
}
