//! Per-camera pipeline and the bounded fan-out over all cameras.

use std::{path::Path, sync::Arc};

use futures::stream::StreamExt;
use image::RgbImage;
use tracing::{Instrument, error, info, info_span, warn};

use region_overlay::RegionRenderer;

use crate::{
    client::CameraApi,
    config::PollingConfig,
    error::Result,
    poller::force_generate_new_preview,
    types::Camera,
};

/// How the pipeline of one camera ended.
#[derive(Debug)]
pub struct CameraOutcome {
    pub camera: Camera,
    pub result: Result<()>,
}

impl CameraOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Write `image` to `path`, creating missing parent directories. The format
/// is chosen from the extension.
pub fn save_image(image: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    image.save(path)?;
    Ok(())
}

/// Run the full pipeline for one camera: wait for a fresh preview, download
/// it, draw its regions, save it and write the camera record back.
///
/// Stops at the first failing step.
pub async fn process_camera<A: CameraApi>(
    api: &A,
    renderer: Arc<RegionRenderer>,
    camera: &Camera,
    polling: &PollingConfig,
) -> Result<()> {
    let uuid = camera.uuid.as_str();
    info!("Processing camera {}", camera.name);

    let preview_url = force_generate_new_preview(api, uuid, polling).await?;
    let image = api.download_preview(&preview_url).await?;

    let regions = match api.get_regions(uuid).await {
        Ok(regions) => regions,
        Err(_) => {
            warn!("Continuing without regions");
            Vec::new()
        }
    };
    info!("Drawing {} regions", regions.len());

    let output = camera.output_filename.clone();
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || {
        let _enter = span.enter();
        let annotated = renderer.draw_regions(&image, &regions);
        save_image(&annotated, &output)
            .inspect(|_| info!("Image saved to {}", output.display()))
            .inspect_err(|e| error!("Failed to save {}: {e}", output.display()))
    })
    .await??;

    api.push_camera_update(uuid).await?;
    info!("Camera {} done", camera.name);
    Ok(())
}

/// Process every camera with at most `max_workers` pipelines in flight.
///
/// Returns one outcome per camera, in order of completion.
pub async fn process_all<A: CameraApi>(
    api: &A,
    renderer: Arc<RegionRenderer>,
    cameras: &[Camera],
    polling: &PollingConfig,
    max_workers: usize,
) -> Vec<CameraOutcome> {
    futures::stream::iter(cameras.iter().cloned())
        .map(|camera| {
            let renderer = renderer.clone();
            let span = info_span!("camera", name = %camera.name, uuid = %camera.uuid);
            async move {
                let result = process_camera(api, renderer, &camera, polling).await;
                if let Err(e) = &result {
                    error!("Camera {} failed: {e}", camera.name);
                }
                CameraOutcome { camera, result }
            }
            .instrument(span)
        })
        .buffer_unordered(max_workers.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::Rgb;
    use region_overlay::{Point, Region, RenderStyle};
    use serde_json::{Map, Value};

    use super::*;
    use crate::{
        error::Error,
        types::{CameraMetadata, TaskId},
    };

    /// Every camera gets a new preview on the first poll. Downloads of
    /// cameras named "broken" fail.
    struct FakeApi {
        polls: AtomicUsize,
        pushes: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        regions_fail: bool,
    }

    impl FakeApi {
        fn new() -> Self {
            Self {
                polls: AtomicUsize::new(0),
                pushes: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                regions_fail: false,
            }
        }
    }

    fn fake_error() -> Error {
        Error::MissingField {
            url: "fake".into(),
            field: "data",
        }
    }

    impl CameraApi for FakeApi {
        async fn get_camera_data(&self, uuid: &str) -> Result<CameraMetadata> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            let mut fields = Map::new();
            fields.insert("previewUri".into(), Value::from(format!("/{uuid}/{n}.png")));
            Ok(CameraMetadata::new(fields))
        }

        async fn get_regions(&self, _uuid: &str) -> Result<Vec<Region>> {
            if self.regions_fail {
                return Err(fake_error());
            }
            Ok(vec![Region {
                points: vec![
                    Point { x: 5, y: 5 },
                    Point { x: 30, y: 5 },
                    Point { x: 30, y: 30 },
                    Point { x: 5, y: 30 },
                ],
                display_color: "#000000".into(),
                tag_name: String::new(),
            }])
        }

        async fn request_preview_regeneration(&self, _uuid: &str) -> Result<TaskId> {
            Ok(serde_json::from_str(r#""t""#)?)
        }

        async fn push_camera_update(&self, _uuid: &str) -> Result<()> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn download_preview(&self, url: &str) -> Result<RgbImage> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if url.contains("broken") {
                return Err(fake_error());
            }
            Ok(RgbImage::from_pixel(40, 40, Rgb([200, 200, 200])))
        }

        fn preview_url(&self, preview_uri: &str) -> String {
            format!("http://fake{preview_uri}")
        }
    }

    fn renderer() -> Arc<RegionRenderer> {
        Arc::new(RegionRenderer::new(RenderStyle::default()).unwrap())
    }

    fn camera(dir: &Path, uuid: &str) -> Camera {
        Camera {
            uuid: uuid.into(),
            name: uuid.to_uppercase(),
            output_filename: dir.join("nested").join(format!("{uuid}.png")),
        }
    }

    #[test_log::test(tokio::test)]
    async fn one_failure_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        let cameras = vec![camera(dir.path(), "broken"), camera(dir.path(), "good")];
        let api = FakeApi::new();

        let outcomes =
            process_all(&api, renderer(), &cameras, &PollingConfig::default(), 4).await;

        assert_eq!(outcomes.len(), 2);
        for outcome in outcomes.iter() {
            assert_eq!(outcome.is_ok(), outcome.camera.uuid == "good");
        }
        assert!(!cameras[0].output_filename.exists());
        let saved = image::open(&cameras[1].output_filename).unwrap().to_rgb8();
        // inside the region: round(0.4 * 40 + 0.6 * 200) = 136
        assert_eq!(*saved.get_pixel(15, 15), Rgb([136, 136, 136]));
        assert_eq!(*saved.get_pixel(1, 1), Rgb([200, 200, 200]));
        assert_eq!(api.pushes.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn region_failure_still_saves() {
        let dir = tempfile::tempdir().unwrap();
        let cam = camera(dir.path(), "good");
        let mut api = FakeApi::new();
        api.regions_fail = true;

        process_camera(&api, renderer(), &cam, &PollingConfig::default())
            .await
            .unwrap();

        let saved = image::open(&cam.output_filename).unwrap().to_rgb8();
        assert_eq!(*saved.get_pixel(15, 15), Rgb([200, 200, 200]));
        assert_eq!(api.pushes.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn bounded_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let cameras: Vec<_> = (0..9)
            .map(|i| camera(dir.path(), &format!("cam{i}")))
            .collect();
        let api = FakeApi::new();

        let outcomes =
            process_all(&api, renderer(), &cameras, &PollingConfig::default(), 3).await;

        assert_eq!(outcomes.len(), 9);
        assert!(outcomes.iter().all(CameraOutcome::is_ok));
        let max = api.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "{max} downloads in flight");
    }

    #[test]
    fn save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("out.jpg");
        save_image(&RgbImage::new(4, 4), &path).unwrap();
        assert!(path.exists());
    }
}
