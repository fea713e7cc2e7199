use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json,
};
use log::info;
use mixtape_rooms::random_string;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::{
    context::ServerContext,
    errors::{ServerError, ServerResult},
    Router,
};

/// Upper bound on how much of a ranged request is served per response.
const MAX_CHUNK_SIZE: u64 = 500_000;

const LOCATOR_LENGTH: usize = 24;

const CONTENT_TYPE: &str = "application/octet-stream";

/// Stores uploaded audio on disk under opaque locators.
///
/// The coordinator never looks inside a locator; tracks carry them verbatim
/// and this store is the only place they resolve back to bytes.
pub struct AudioStore {
    root: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAudio {
    pub locator: String,
    pub size: u64,
}

impl AudioStore {
    pub fn new(root: PathBuf) -> Arc<Self> {
        Arc::new(Self { root })
    }

    pub async fn init(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub async fn store(&self, bytes: &[u8]) -> std::io::Result<StoredAudio> {
        let locator = random_string(LOCATOR_LENGTH);
        tokio::fs::write(self.root.join(&locator), bytes).await?;

        Ok(StoredAudio {
            locator,
            size: bytes.len() as u64,
        })
    }

    /// Maps a locator to its on-disk path. Locators are alphanumeric by
    /// construction, so anything else never reaches the filesystem.
    fn resolve(&self, locator: &str) -> Result<PathBuf, ServerError> {
        let valid = !locator.is_empty() && locator.bytes().all(|c| c.is_ascii_alphanumeric());

        if !valid {
            return Err(ServerError::BadRequest("Invalid locator".to_string()));
        }

        Ok(self.root.join(locator))
    }
}

/// Parses a single `bytes=start-end` range, where the end may be omitted.
fn parse_range(header: &str) -> Option<(u64, Option<u64>)> {
    let window = header.strip_prefix("bytes=")?;
    let (start, end) = window.split_once('-')?;

    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };

    Some((start, end))
}

async fn upload_audio(
    State(context): State<ServerContext>,
    body: Bytes,
) -> ServerResult<Json<StoredAudio>> {
    if body.is_empty() {
        return Err(ServerError::BadRequest("Empty upload".to_string()));
    }

    let stored = context.audio.store(&body).await?;
    info!("Stored {} bytes of audio as {}", stored.size, stored.locator);

    Ok(Json(stored))
}

async fn stream_audio(
    State(context): State<ServerContext>,
    Path(locator): Path<String>,
    headers: HeaderMap,
) -> ServerResult<Response> {
    let path = context.audio.resolve(&locator)?;

    let mut file = tokio::fs::File::open(&path).await?;
    let length = file.metadata().await?.len();

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    let Some(range) = range else {
        let mut buf = Vec::with_capacity(length as usize);
        file.read_to_end(&mut buf).await?;

        return Ok((
            [
                (header::CONTENT_TYPE, CONTENT_TYPE),
                (header::ACCEPT_RANGES, "bytes"),
            ],
            buf,
        )
            .into_response());
    };

    let (start, end) = parse_range(range)
        .ok_or_else(|| ServerError::BadRequest("Unsupported range".to_string()))?;

    if length == 0 || start >= length {
        return Err(ServerError::RangeNotSatisfiable);
    }

    // Range ends are inclusive; clamp to the file and cap the window
    let end = end
        .unwrap_or(length - 1)
        .min(length - 1)
        .min(start + MAX_CHUNK_SIZE - 1);

    if end < start {
        return Err(ServerError::RangeNotSatisfiable);
    }

    let amount = end - start + 1;

    file.seek(SeekFrom::Start(start)).await?;
    let mut buf = vec![0u8; amount as usize];
    file.read_exact(&mut buf).await?;

    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, CONTENT_TYPE.to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
            (
                header::CONTENT_RANGE,
                format!("bytes {start}-{end}/{length}"),
            ),
        ],
        buf,
    )
        .into_response())
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(upload_audio))
        .route("/:locator", get(stream_audio))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bounded_and_open_ranges() {
        assert_eq!(parse_range("bytes=0-499"), Some((0, Some(499))));
        assert_eq!(parse_range("bytes=500-"), Some((500, None)));
    }

    #[test]
    fn rejects_malformed_ranges() {
        assert_eq!(parse_range("bytes=-500"), None);
        assert_eq!(parse_range("bytes=abc-"), None);
        assert_eq!(parse_range("items=0-1"), None);
        assert_eq!(parse_range("bytes=10"), None);
    }

    #[test]
    fn locators_with_path_characters_never_resolve() {
        let store = AudioStore::new(PathBuf::from("/tmp/mixtape-test"));

        assert!(store.resolve("../../etc/passwd").is_err());
        assert!(store.resolve("a/b").is_err());
        assert!(store.resolve("").is_err());
        assert!(store.resolve("AbC123xyz").is_ok());
    }
}
