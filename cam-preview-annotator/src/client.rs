//! Remote operations on the camera server.

use http::{HeaderMap, HeaderValue, Method, header};
use image::RgbImage;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use cam_api_session::{
    CSRF_HEADER, HttpSession, MyBody, body_from_buf, collect_body, empty_body,
};
use region_overlay::Region;

use crate::{
    error::{Error, Result},
    types::{CameraMetadata, TaskId},
};

/// The operations the pipeline needs from the camera server.
///
/// Failures are logged by the implementation and returned as `Err`.
pub trait CameraApi: Sync {
    /// Current metadata of a camera.
    fn get_camera_data(&self, uuid: &str) -> impl Future<Output = Result<CameraMetadata>> + Send;

    /// Regions of interest of a camera. Regions which cannot be decoded are
    /// skipped.
    fn get_regions(&self, uuid: &str) -> impl Future<Output = Result<Vec<Region>>> + Send;

    /// Ask the server to render a new preview.
    fn request_preview_regeneration(
        &self,
        uuid: &str,
    ) -> impl Future<Output = Result<TaskId>> + Send;

    /// Write the camera's current metadata back to the server.
    fn push_camera_update(&self, uuid: &str) -> impl Future<Output = Result<()>> + Send;

    /// Download and decode a preview image.
    fn download_preview(&self, url: &str) -> impl Future<Output = Result<RgbImage>> + Send;

    /// Absolute URL of a preview from the server-relative path in
    /// [CameraMetadata::preview_uri].
    fn preview_url(&self, preview_uri: &str) -> String;
}

/// The JSON envelope of every API response.
#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct TaskRef {
    id: TaskId,
}

fn cam_path(uuid: &str) -> String {
    format!("/api/cams/{uuid}")
}

fn header_value(s: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(s).map_err(|e| cam_api_session::Error::from(e).into())
}

/// [CameraApi] over HTTP.
#[derive(Debug, Clone)]
pub struct CameraClient {
    session: HttpSession,
}

impl CameraClient {
    pub fn new(session: HttpSession) -> Self {
        Self { session }
    }

    /// Make a request and return the `data` field of the JSON response.
    async fn fetch_data<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body: MyBody,
    ) -> Result<(url::Url, Option<T>)> {
        let url = self.session.url_for(path)?;
        let response = self.session.request(method, &url, headers, body).await?;
        let buf = collect_body(response).await?;
        let envelope: Envelope<T> = serde_json::from_slice(&buf)?;
        Ok((url, envelope.data))
    }

    async fn camera_data(&self, uuid: &str) -> Result<CameraMetadata> {
        let (url, data) = self
            .fetch_data(Method::GET, &cam_path(uuid), HeaderMap::new(), empty_body())
            .await?;
        data.ok_or_else(|| Error::MissingField {
            url: url.to_string(),
            field: "data",
        })
    }

    async fn regions(&self, uuid: &str) -> Result<Vec<Region>> {
        let path = format!("{}/regions", cam_path(uuid));
        let (_url, data) = self
            .fetch_data::<Vec<Value>>(Method::GET, &path, HeaderMap::new(), empty_body())
            .await?;
        let regions = data
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .filter_map(|(idx, value)| match serde_json::from_value::<Region>(value) {
                Ok(region) => Some(region),
                Err(e) => {
                    warn!("Skipping malformed region {idx} of camera {uuid}: {e}");
                    None
                }
            })
            .collect();
        Ok(regions)
    }

    async fn regenerate(&self, uuid: &str) -> Result<TaskId> {
        let path = format!("{}/stream-preview", cam_path(uuid));
        let (url, data) = self
            .fetch_data::<TaskRef>(Method::POST, &path, HeaderMap::new(), empty_body())
            .await?;
        let task = data.ok_or_else(|| Error::MissingField {
            url: url.to_string(),
            field: "data",
        })?;
        Ok(task.id)
    }

    async fn push(&self, uuid: &str) -> Result<()> {
        // Use the server's current record rather than anything we hold.
        let metadata = self.camera_data(uuid).await?;

        let url = self.session.url_for(&cam_path(uuid))?;
        let referer = self.session.url_for(&format!("/cams/{uuid}"))?;
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, header_value(self.session.csrf_token())?);
        headers.insert(header::REFERER, header_value(referer.as_str())?);

        let body = body_from_buf(serde_json::to_vec(&metadata)?);
        self.session.patch(&url, headers, body).await?;
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<RgbImage> {
        let url = url::Url::parse(url).map_err(cam_api_session::Error::from)?;
        let response = self.session.get(&url).await?;
        let buf = collect_body(response).await?;
        debug!("Downloaded {} bytes from {url}", buf.len());
        let image = image::load_from_memory(&buf)?.to_rgb8();
        info!(
            "Preview downloaded. Size: {}x{}",
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

impl CameraApi for CameraClient {
    async fn get_camera_data(&self, uuid: &str) -> Result<CameraMetadata> {
        self.camera_data(uuid)
            .await
            .inspect_err(|e| error!("Failed to get data of camera {uuid}: {e}"))
    }

    async fn get_regions(&self, uuid: &str) -> Result<Vec<Region>> {
        self.regions(uuid)
            .await
            .inspect_err(|e| error!("Failed to get regions of camera {uuid}: {e}"))
    }

    async fn request_preview_regeneration(&self, uuid: &str) -> Result<TaskId> {
        self.regenerate(uuid)
            .await
            .inspect_err(|e| error!("Failed to request a new preview of camera {uuid}: {e}"))
    }

    async fn push_camera_update(&self, uuid: &str) -> Result<()> {
        self.push(uuid)
            .await
            .inspect(|_| info!("Changes of camera {uuid} saved"))
            .inspect_err(|e| error!("Failed to save changes of camera {uuid}: {e}"))
    }

    async fn download_preview(&self, url: &str) -> Result<RgbImage> {
        self.download(url)
            .await
            .inspect_err(|e| error!("Failed to download preview {url}: {e}"))
    }

    fn preview_url(&self, preview_uri: &str) -> String {
        if preview_uri.starts_with('/') {
            format!("{}{preview_uri}", self.session.base_url())
        } else {
            format!("{}/{preview_uri}", self.session.base_url())
        }
    }
}
