//! Value types exchanged with the remote store and conversion service.

use serde::{Deserialize, Serialize};

use crate::planner::ByteRange;

use super::urn::encode_urn;

/// Reference to an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub container: String,
    pub key: String,
    /// Store-wide object identifier.
    pub object_id: String,
}

impl ObjectRef {
    /// Reference built from container and key alone, for stores that do not
    /// echo an identifier once every chunk is acknowledged.
    pub fn synthesized(container: &str, key: &str) -> Self {
        Self {
            container: container.to_string(),
            key: key.to_string(),
            object_id: format!("urn:ferry:objects:{}/{}", container, key),
        }
    }

    /// Encoded URN used to submit conversion jobs for this object.
    pub fn urn(&self) -> String {
        encode_urn(&self.object_id)
    }
}

/// Object metadata returned by a HEAD-style query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Size in bytes.
    pub size: u64,
    /// Entity tag, when the store provides one.
    pub etag: Option<String>,
}

/// One chunk of an upload session.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub container: String,
    pub key: String,
    /// Correlates all chunks of one logical object.
    pub session_id: String,
    pub range: ByteRange,
    /// Size of the whole object.
    pub total_size: u64,
    pub data: Vec<u8>,
}

impl ChunkUpload {
    /// `bytes start-end/total`.
    pub fn content_range(&self) -> String {
        self.range.content_range(self.total_size)
    }
}

/// Store acknowledgment of one uploaded chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkAck {
    /// Chunk stored; the object is not complete yet (or the store does not say).
    Accepted,
    /// Chunk stored and the object is complete under this identifier.
    Stored { object_id: String },
}

/// Retention policy for a newly created container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerPolicy {
    /// Objects expire after a short retention window.
    Transient,
    #[default]
    Persistent,
}

impl ContainerPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerPolicy::Transient => "transient",
            ContainerPolicy::Persistent => "persistent",
        }
    }
}

/// Remote progress of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobProgress {
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl JobProgress {
    pub fn as_str(self) -> &'static str {
        match self {
            JobProgress::Pending => "pending",
            JobProgress::InProgress => "inprogress",
            JobProgress::Complete => "complete",
            JobProgress::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status report of a conversion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub progress: JobProgress,
    #[serde(default)]
    pub derivatives: Vec<Derivative>,
}

impl JobStatus {
    /// Status with no derivatives yet.
    pub fn with_progress(progress: JobProgress) -> Self {
        Self {
            progress,
            derivatives: Vec::new(),
        }
    }

    /// Reference of the output to download: the derivative whose type is
    /// `output_type`, then its first child whose reference ends in `.extension`.
    pub fn output_ref(&self, output_type: &str, extension: &str) -> Option<&str> {
        let suffix = format!(".{}", extension);
        self.derivatives
            .iter()
            .find(|d| d.output_type == output_type)?
            .children
            .iter()
            .find(|c| c.reference.ends_with(&suffix))
            .map(|c| c.reference.as_str())
    }
}

/// One output variant produced by the conversion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Derivative {
    pub output_type: String,
    #[serde(default)]
    pub children: Vec<DerivativeChild>,
}

/// Downloadable item within a derivative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeChild {
    #[serde(rename = "urn")]
    pub reference: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> JobStatus {
        JobStatus {
            progress: JobProgress::Complete,
            derivatives: vec![
                Derivative {
                    output_type: "svf".into(),
                    children: vec![DerivativeChild {
                        reference: "urn:out/model.obj".into(),
                    }],
                },
                Derivative {
                    output_type: "obj".into(),
                    children: vec![
                        DerivativeChild {
                            reference: "urn:out/model.mtl".into(),
                        },
                        DerivativeChild {
                            reference: "urn:out/model.obj".into(),
                        },
                    ],
                },
            ],
        }
    }

    #[test]
    fn output_ref_matches_type_then_extension() {
        assert_eq!(status().output_ref("obj", "obj"), Some("urn:out/model.obj"));
        assert_eq!(status().output_ref("obj", "mtl"), Some("urn:out/model.mtl"));
    }

    #[test]
    fn output_ref_missing() {
        assert_eq!(status().output_ref("stl", "stl"), None);
        assert_eq!(status().output_ref("obj", "stl"), None);
        assert_eq!(JobStatus::with_progress(JobProgress::Complete).output_ref("obj", "obj"), None);
    }

    #[test]
    fn status_json_shape() {
        let json = r#"{
            "progress": "inprogress",
            "derivatives": [
                { "outputType": "obj", "children": [ { "urn": "urn:x/a.obj" } ] }
            ]
        }"#;
        let s: JobStatus = serde_json::from_str(json).unwrap();
        assert_eq!(s.progress, JobProgress::InProgress);
        assert_eq!(s.output_ref("obj", "obj"), Some("urn:x/a.obj"));
    }

    #[test]
    fn synthesized_ref() {
        let r = ObjectRef::synthesized("bucket", "model.stp");
        assert_eq!(r.object_id, "urn:ferry:objects:bucket/model.stp");
        assert_eq!(r.container, "bucket");
    }
}
