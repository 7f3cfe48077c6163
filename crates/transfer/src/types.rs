/// A slice of a source file, identified by its chunk index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based chunk index.
    pub index: u64,
    /// Raw chunk data. Only the last chunk may be shorter than the chunk size.
    pub data: Vec<u8>,
}

/// Remote API endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Whole-file upload.
    Upload,
    /// One chunk of a large file.
    Chunk,
    /// Catalog snapshot.
    Manifest,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Upload => "/api/upload",
            Endpoint::Chunk => "/api/chunk",
            Endpoint::Manifest => "/api/manifest",
        }
    }
}

/// The binary part of a multipart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Form field name (`file` or `chunk`).
    pub field: &'static str,
    pub file_name: String,
    pub data: Vec<u8>,
}

/// A multipart form POST, kept as plain data so it can be re-sent on retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartRequest {
    pub endpoint: Endpoint,
    pub fields: Vec<(&'static str, String)>,
    pub part: FilePart,
}

impl MultipartRequest {
    /// `POST /api/upload` for a file below the chunk threshold.
    pub fn upload(backup_id: &str, backup_name: &str, data: Vec<u8>) -> Self {
        Self {
            endpoint: Endpoint::Upload,
            fields: vec![
                ("backup_id", backup_id.to_string()),
                ("backup_name", backup_name.to_string()),
            ],
            part: FilePart {
                field: "file",
                file_name: backup_name.to_string(),
                data,
            },
        }
    }

    /// `POST /api/chunk` for chunk `chunk.index` of `chunks_total`.
    pub fn chunk(backup_id: &str, backup_name: &str, chunk: Chunk, chunks_total: u64) -> Self {
        Self {
            endpoint: Endpoint::Chunk,
            fields: vec![
                ("backup_id", backup_id.to_string()),
                ("backup_name", backup_name.to_string()),
                ("chunk_index", chunk.index.to_string()),
                ("chunks_total", chunks_total.to_string()),
            ],
            part: FilePart {
                field: "chunk",
                file_name: format!("chunk_{:03}", chunk.index),
                data: chunk.data,
            },
        }
    }

    /// `POST /api/manifest` with the serialized catalog.
    pub fn manifest(backup_id: &str, file_name: &str, data: Vec<u8>) -> Self {
        Self {
            endpoint: Endpoint::Manifest,
            fields: vec![("backup_id", backup_id.to_string())],
            part: FilePart {
                field: "file",
                file_name: file_name.to_string(),
                data,
            },
        }
    }

    /// Value of a text field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Final answer from the remote after retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 2xx response.
    Accepted { status: u16 },
    /// Non-2xx response: a 4xx, or a 5xx that outlasted the retry ladder.
    Rejected { status: u16 },
}

impl Delivery {
    pub fn is_accepted(self) -> bool {
        matches!(self, Delivery::Accepted { .. })
    }

    pub fn status(self) -> u16 {
        match self {
            Delivery::Accepted { status } | Delivery::Rejected { status } => status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_request_fields() {
        let chunk = Chunk {
            index: 7,
            data: b"xyz".to_vec(),
        };
        let req = MultipartRequest::chunk("bkp_1", "VID_000001.mp4", chunk, 12);
        assert_eq!(req.endpoint, Endpoint::Chunk);
        assert_eq!(req.field("backup_id"), Some("bkp_1"));
        assert_eq!(req.field("backup_name"), Some("VID_000001.mp4"));
        assert_eq!(req.field("chunk_index"), Some("7"));
        assert_eq!(req.field("chunks_total"), Some("12"));
        assert_eq!(req.part.field, "chunk");
        assert_eq!(req.part.file_name, "chunk_007");
        assert_eq!(req.part.data, b"xyz");
    }

    #[test]
    fn upload_and_manifest_requests() {
        let up = MultipartRequest::upload("bkp_1", "IMG_000003.jpg", vec![1, 2]);
        assert_eq!(up.endpoint.path(), "/api/upload");
        assert_eq!(up.part.field, "file");
        assert_eq!(up.part.file_name, "IMG_000003.jpg");
        assert_eq!(up.field("chunk_index"), None);

        let manifest = MultipartRequest::manifest("bkp_1", "state.db", vec![0]);
        assert_eq!(manifest.endpoint.path(), "/api/manifest");
        assert_eq!(manifest.fields.len(), 1);
    }

    #[test]
    fn delivery_status() {
        assert!(Delivery::Accepted { status: 201 }.is_accepted());
        assert!(!Delivery::Rejected { status: 404 }.is_accepted());
        assert_eq!(Delivery::Rejected { status: 503 }.status(), 503);
    }
}
