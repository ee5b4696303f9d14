use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A camera to process, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Camera {
    pub uuid: String,
    /// Human readable name, only used in logs.
    pub name: String,
    /// Where the annotated preview is written. The image format follows the
    /// extension.
    pub output_filename: PathBuf,
}

/// The server's record of a camera.
///
/// Apart from [CameraMetadata::preview_uri] the contents are opaque and are
/// sent back to the server exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraMetadata(Map<String, Value>);

impl CameraMetadata {
    /// Key of the field holding the server path of the current preview.
    pub const PREVIEW_URI_KEY: &'static str = "previewUri";

    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Path (relative to the server base URL) of the current preview image,
    /// if the server reports one.
    pub fn preview_uri(&self) -> Option<&str> {
        self.0.get(Self::PREVIEW_URI_KEY).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Identifier of a preview regeneration task, as assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // The server has used both strings and numbers here.
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(TaskId(s)),
            Value::Number(n) => Ok(TaskId(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "expected string or number task id, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_round_trip_keeps_everything() {
        let json = r#"{"zeta":1,"previewUri":"/media/p.jpg","alpha":{"nested":[1,2,3]},"name":"Enter"}"#;
        let md: CameraMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(md.preview_uri(), Some("/media/p.jpg"));
        assert_eq!(serde_json::to_string(&md).unwrap(), json);
    }

    #[test]
    fn metadata_without_preview() {
        let md: CameraMetadata = serde_json::from_str(r#"{"previewUri":null}"#).unwrap();
        assert_eq!(md.preview_uri(), None);
        let md: CameraMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(md.preview_uri(), None);
    }

    #[test]
    fn task_id_forms() {
        let t: TaskId = serde_json::from_str(r#""abc-1""#).unwrap();
        assert_eq!(t.as_str(), "abc-1");
        let t: TaskId = serde_json::from_str("42").unwrap();
        assert_eq!(t.to_string(), "42");
        assert!(serde_json::from_str::<TaskId>("[1]").is_err());
    }
}
