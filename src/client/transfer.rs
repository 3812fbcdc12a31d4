//! Transfer engine
//!
//! Uploads go out in one request below the chunk threshold and as a strict
//! sequence of fixed-size chunks above it: chunk N+1 is read only after the
//! server has answered chunk N. A failed request ends the upload; nothing is
//! retried within the same call. With a ticket directory configured, the
//! progress of a chunked upload survives the process and a later upload of
//! the same content resumes where the server left off.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use reqwest::{Method, StatusCode};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::connection::{check, parse_json, Connection};
use super::error::{TransferError, TransferResult};
use super::ticket::{TicketStore, TransferTicket};
use crate::config::ClientConfig;
use crate::hash::hash_file;
use crate::protocol::{TimestampResponse, CHUNK_OFFSET_HEADER, CONTENT_HASH_HEADER, TOTAL_SIZE_HEADER};
use crate::sandbox::{normalize_relative, resolve_within};
use crate::upload::UploadMode;

// ============================================================================
// Chunked transfer state machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Sending,
    Acked,
    Completed,
    Failed,
}

/// In-memory state of one chunked upload
#[derive(Debug, Clone)]
pub struct ChunkedTransfer {
    pub file_path: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub content_hash: String,
    /// Bytes acknowledged so far; the offset of the next chunk
    pub cursor_offset: u64,
    pub state: TransferState,
}

impl ChunkedTransfer {
    pub fn new(file_path: &str, total_size: u64, chunk_size: u64, content_hash: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            total_size,
            chunk_size: chunk_size.max(1),
            content_hash: content_hash.to_string(),
            cursor_offset: 0,
            state: TransferState::Idle,
        }
    }

    /// Continue from bytes the server already holds
    pub fn resume_at(mut self, offset: u64) -> Self {
        self.cursor_offset = offset.min(self.total_size);
        self
    }

    /// Length of the next chunk
    pub fn next_chunk_len(&self) -> u64 {
        self.chunk_size.min(self.total_size - self.cursor_offset)
    }

    pub fn begin_send(&mut self) {
        self.state = TransferState::Sending;
    }

    pub fn ack(&mut self, len: u64) {
        self.cursor_offset += len;
        self.state = TransferState::Acked;
    }

    pub fn complete(&mut self) {
        self.cursor_offset = self.total_size;
        self.state = TransferState::Completed;
    }

    pub fn fail(&mut self) {
        self.state = TransferState::Failed;
    }

    /// Fraction of the file acknowledged
    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            return 1.0;
        }
        self.cursor_offset as f64 / self.total_size as f64
    }
}

// ============================================================================
// Transfer engine
// ============================================================================

pub struct TransferEngine {
    connection: Connection,
    sharing_path: PathBuf,
    chunk_upload_threshold: u64,
    chunk_size: u64,
    tickets: Option<TicketStore>,
}

impl TransferEngine {
    pub fn new(config: &ClientConfig) -> TransferResult<Self> {
        Ok(Self {
            connection: Connection::new(config)?,
            sharing_path: config.sharing_path.clone(),
            chunk_upload_threshold: config.chunk_upload_threshold,
            chunk_size: config.chunk_size.max(1),
            tickets: config.ticket_dir.clone().map(TicketStore::new),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Local path of a relative path, confined to the sharing directory
    pub fn local_path(&self, path: &str) -> TransferResult<PathBuf> {
        Ok(resolve_within(&self.sharing_path, path)?)
    }

    /// Upload a local file, returning the server timestamp
    ///
    /// `content_hash` is computed from the file when not supplied.
    pub async fn upload(
        &self,
        path: &str,
        content_hash: Option<&str>,
        mode: UploadMode,
    ) -> TransferResult<i64> {
        self.upload_with_progress(path, content_hash, mode, |sent, total| {
            tracing::debug!(sent = sent, total = total, "Upload progress");
        })
        .await
    }

    /// Upload a local file, reporting `(bytes acknowledged, total)` after each chunk
    pub async fn upload_with_progress<F>(
        &self,
        path: &str,
        content_hash: Option<&str>,
        mode: UploadMode,
        mut on_progress: F,
    ) -> TransferResult<i64>
    where
        F: FnMut(u64, u64),
    {
        let key = normalize_relative(path)?;
        let local = self.local_path(&key)?;
        let total_size = fs::metadata(&local).await?.len();
        let content_hash = match content_hash {
            Some(hash) => hash.to_ascii_lowercase(),
            None => hash_file(&local).await?,
        };

        if total_size < self.chunk_upload_threshold {
            let timestamp = self.upload_whole(&key, &local, &content_hash, mode).await?;
            on_progress(total_size, total_size);
            return Ok(timestamp);
        }

        let transfer = ChunkedTransfer::new(&key, total_size, self.chunk_size, &content_hash);
        let transfer = match self.resume_offset(&key, &content_hash, total_size).await {
            Some(offset) => {
                tracing::info!(path = %key, offset = offset, "Resuming chunked upload");
                transfer.resume_at(offset)
            }
            None => transfer,
        };

        self.upload_chunks(transfer, &local, mode, &mut on_progress).await
    }

    async fn upload_whole(
        &self,
        key: &str,
        local: &Path,
        content_hash: &str,
        mode: UploadMode,
    ) -> TransferResult<i64> {
        let data = fs::read(local).await?;

        let response = self
            .connection
            .request(method_for(mode), &self.connection.files_url(key))
            .header(CONTENT_HASH_HEADER, content_hash)
            .body(data)
            .send()
            .await?;

        let response = check(response).await?;
        if response.status() != StatusCode::CREATED {
            return Err(TransferError::InvalidResponse(format!(
                "expected 201, got {}",
                response.status()
            )));
        }
        let reply: TimestampResponse = parse_json(response).await?;

        tracing::info!(path = %key, timestamp = reply.server_timestamp, "Uploaded file");
        Ok(reply.server_timestamp)
    }

    async fn upload_chunks<F>(
        &self,
        mut transfer: ChunkedTransfer,
        local: &Path,
        mode: UploadMode,
        on_progress: &mut F,
    ) -> TransferResult<i64>
    where
        F: FnMut(u64, u64),
    {
        let mut file = match open_at(local, transfer.cursor_offset).await {
            Ok(file) => file,
            Err(e) => {
                transfer.fail();
                return Err(abort(&transfer, transfer.cursor_offset, e.into()));
            }
        };

        loop {
            let offset = transfer.cursor_offset;
            let len = transfer.next_chunk_len();
            let mut chunk = vec![0u8; len as usize];
            if let Err(e) = file.read_exact(&mut chunk).await {
                transfer.fail();
                tracing::error!(
                    path = %transfer.file_path,
                    offset = offset,
                    error = %e,
                    "Local read failed during chunked upload"
                );
                return Err(abort(&transfer, offset, e.into()));
            }

            transfer.begin_send();
            let outcome = self.send_chunk(&transfer, offset, chunk, mode).await;

            match outcome {
                Ok(ChunkReply::Accepted) => {
                    transfer.ack(len);
                    self.save_ticket(&transfer).await;
                    on_progress(transfer.cursor_offset, transfer.total_size);

                    if transfer.cursor_offset >= transfer.total_size {
                        transfer.fail();
                        return Err(abort(
                            &transfer,
                            offset,
                            TransferError::InvalidResponse("final chunk was not completed".to_string()),
                        ));
                    }
                }
                Ok(ChunkReply::Completed(timestamp)) => {
                    transfer.complete();
                    self.remove_ticket(&transfer.file_path).await;
                    on_progress(transfer.total_size, transfer.total_size);

                    tracing::info!(
                        path = %transfer.file_path,
                        size = transfer.total_size,
                        "Chunked upload completed"
                    );
                    return Ok(timestamp);
                }
                Err(e) => {
                    transfer.fail();
                    tracing::error!(
                        path = %transfer.file_path,
                        offset = offset,
                        error = %e,
                        "Chunked upload aborted"
                    );
                    return Err(abort(&transfer, offset, e));
                }
            }
        }
    }

    async fn send_chunk(
        &self,
        transfer: &ChunkedTransfer,
        offset: u64,
        chunk: Vec<u8>,
        mode: UploadMode,
    ) -> TransferResult<ChunkReply> {
        let response = self
            .connection
            .request(method_for(mode), &self.connection.files_url(&transfer.file_path))
            .header(CONTENT_HASH_HEADER, transfer.content_hash.as_str())
            .header(CHUNK_OFFSET_HEADER, offset.to_string())
            .header(TOTAL_SIZE_HEADER, transfer.total_size.to_string())
            .body(chunk)
            .send()
            .await?;

        let response = check(response).await?;
        match response.status() {
            StatusCode::OK => Ok(ChunkReply::Accepted),
            StatusCode::CREATED => {
                let reply: TimestampResponse = parse_json(response).await?;
                Ok(ChunkReply::Completed(reply.server_timestamp))
            }
            other => Err(TransferError::InvalidResponse(format!(
                "unexpected status {} for chunk",
                other
            ))),
        }
    }

    /// Offset to resume from, when both the ticket and the server agree
    async fn resume_offset(&self, key: &str, content_hash: &str, total_size: u64) -> Option<u64> {
        let tickets = self.tickets.as_ref()?;
        let ticket = match tickets.load(key).await {
            Ok(Some(ticket)) if ticket.matches(content_hash, total_size) => ticket,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(path = %key, error = %e, "Failed to read transfer ticket");
                return None;
            }
        };

        let status = match self.connection.upload_status(key).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                tracing::debug!(path = %key, "Server has no upload in progress, restarting");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %key, error = %e, "Failed to query upload status, restarting");
                return None;
            }
        };

        let same_upload = status.content_hash.eq_ignore_ascii_case(content_hash)
            && status.total_size == total_size
            && status.received > 0
            && status.received < total_size;
        if !same_upload {
            return None;
        }

        if status.received != ticket.cursor_offset {
            tracing::debug!(
                path = %key,
                ticket = ticket.cursor_offset,
                server = status.received,
                "Ticket behind server, using server offset"
            );
        }
        Some(status.received)
    }

    async fn save_ticket(&self, transfer: &ChunkedTransfer) {
        let Some(tickets) = &self.tickets else {
            return;
        };
        let ticket = TransferTicket::new(
            &transfer.file_path,
            &transfer.content_hash,
            transfer.total_size,
            transfer.cursor_offset,
        );
        if let Err(e) = tickets.save(&ticket).await {
            tracing::warn!(path = %transfer.file_path, error = %e, "Failed to save transfer ticket");
        }
    }

    async fn remove_ticket(&self, key: &str) {
        if let Some(tickets) = &self.tickets {
            if let Err(e) = tickets.remove(key).await {
                tracing::warn!(path = %key, error = %e, "Failed to remove transfer ticket");
            }
        }
    }

    /// Fetch a file and write it under the sharing directory, overwriting
    pub async fn download(&self, path: &str) -> TransferResult<PathBuf> {
        let key = normalize_relative(path)?;
        let local = self.local_path(&key)?;

        let response = self
            .connection
            .request(Method::GET, &self.connection.files_url(&key))
            .send()
            .await?;
        let data = check(response).await?.bytes().await?;

        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&local, &data).await?;

        tracing::info!(path = %key, size = data.len(), "Downloaded file");
        Ok(local)
    }
}

enum ChunkReply {
    Accepted,
    Completed(i64),
}

async fn open_at(path: &Path, offset: u64) -> std::io::Result<File> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    Ok(file)
}

fn method_for(mode: UploadMode) -> Method {
    match mode {
        UploadMode::Create => Method::POST,
        UploadMode::Modify => Method::PUT,
    }
}

fn abort(transfer: &ChunkedTransfer, offset: u64, source: TransferError) -> TransferError {
    TransferError::ChunkAborted {
        path: transfer.file_path.clone(),
        offset,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::error::{Failure, FailureKind};
    use crate::hash::compute_hash;
    use crate::test_support::TestApp;
    use std::sync::{Arc, Mutex};

    fn client_config(base: String, dir: &tempfile::TempDir) -> ClientConfig {
        let mut config = ClientConfig::new(base, "pippo", "Secret123", dir.path().join("box"));
        config.chunk_upload_threshold = 8;
        config.chunk_size = 4;
        config
    }

    fn write_local(config: &ClientConfig, path: &str, data: &[u8]) {
        let target = config.sharing_path.join(path);
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(target, data).unwrap();
    }

    #[test]
    fn test_state_machine() {
        let mut transfer = ChunkedTransfer::new("big.bin", 10, 4, "hash");
        assert_eq!(transfer.state, TransferState::Idle);
        assert_eq!(transfer.next_chunk_len(), 4);

        transfer.begin_send();
        assert_eq!(transfer.state, TransferState::Sending);
        transfer.ack(4);
        transfer.ack(4);
        assert_eq!(transfer.state, TransferState::Acked);
        assert_eq!(transfer.next_chunk_len(), 2);
        assert!((transfer.progress() - 0.8).abs() < f64::EPSILON);

        transfer.complete();
        assert_eq!(transfer.state, TransferState::Completed);
        assert_eq!(transfer.cursor_offset, 10);

        let resumed = ChunkedTransfer::new("big.bin", 10, 4, "hash").resume_at(8);
        assert_eq!(resumed.next_chunk_len(), 2);
    }

    #[tokio::test]
    async fn test_foo_round_trip() {
        let app = TestApp::new().await;
        app.create_user("pippo", "Secret123").await;
        let base = app.spawn().await;
        let dir = tempfile::tempdir().unwrap();

        let config = client_config(base.clone(), &dir);
        write_local(&config, "docs/foo.txt", b"foo");
        let engine = TransferEngine::new(&config).unwrap();

        let ts = engine
            .upload("docs/foo.txt", Some("acbd18db4cc2f85cedef654fccc4a4d8"), UploadMode::Create)
            .await
            .unwrap();

        let snapshot = engine.connection().fetch_snapshot().await.unwrap();
        let entry = snapshot.get("docs/foo.txt").unwrap();
        assert_eq!(entry.content_hash, "acbd18db4cc2f85cedef654fccc4a4d8");
        assert!(ts >= entry.modified);

        // A second client downloads it
        let other = tempfile::tempdir().unwrap();
        let other_config = client_config(base, &other);
        let other_engine = TransferEngine::new(&other_config).unwrap();
        let local = other_engine.download("docs/foo.txt").await.unwrap();
        assert_eq!(std::fs::read(local).unwrap(), b"foo");
    }

    #[tokio::test]
    async fn test_chunked_upload_to_server() {
        let app = TestApp::new().await;
        app.create_user("pippo", "Secret123").await;
        let dir = tempfile::tempdir().unwrap();
        let config = client_config(app.spawn().await, &dir);

        let data: Vec<u8> = (0..10u8).collect();
        write_local(&config, "big.bin", &data);
        let engine = TransferEngine::new(&config).unwrap();

        let mut seen = Vec::new();
        engine
            .upload_with_progress("big.bin", None, UploadMode::Create, |sent, total| {
                seen.push((sent, total))
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![(4, 10), (8, 10), (10, 10)]);
        assert_eq!(std::fs::read(app.user_file("pippo", "big.bin")).unwrap(), data);

        // Modify goes through PUT
        let changed: Vec<u8> = (10..22u8).collect();
        write_local(&config, "big.bin", &changed);
        engine.upload("big.bin", None, UploadMode::Modify).await.unwrap();
        let entry = app.state.snapshots().entry("pippo", "big.bin").await.unwrap().unwrap();
        assert_eq!(entry.content_hash, compute_hash(&changed));
    }

    #[tokio::test]
    async fn test_local_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let config = client_config("http://127.0.0.1:9".to_string(), &dir);
        let engine = TransferEngine::new(&config).unwrap();

        let err = engine.download("../x").await.unwrap_err();
        assert!(matches!(err, TransferError::Sandbox(_)));
        let err = engine.upload("../../etc/passwd", None, UploadMode::Create).await.unwrap_err();
        assert!(matches!(err, TransferError::Sandbox(_)));
    }

    #[tokio::test]
    async fn test_missing_remote_file() {
        let app = TestApp::new().await;
        app.create_user("pippo", "Secret123").await;
        let dir = tempfile::tempdir().unwrap();
        let config = client_config(app.spawn().await, &dir);
        let engine = TransferEngine::new(&config).unwrap();

        let err = engine.download("nope.txt").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(!config.sharing_path.join("nope.txt").exists());
    }

    // ------------------------------------------------------------------------
    // Mock server recording chunk requests
    // ------------------------------------------------------------------------

    #[derive(Clone, Default)]
    struct Recorder {
        requests: Arc<Mutex<Vec<(Option<u64>, usize)>>>,
        fail_at: Option<u64>,
        /// Answer 201 at this offset even though bytes remain
        complete_at: Option<u64>,
    }

    async fn spawn_recorder(recorder: Recorder) -> String {
        use axum::{body::Bytes, extract::State, http::HeaderMap, routing::post, Json, Router};

        async fn receive(
            State(recorder): State<Recorder>,
            headers: HeaderMap,
            body: Bytes,
        ) -> (axum::http::StatusCode, Json<serde_json::Value>) {
            let offset = headers
                .get(CHUNK_OFFSET_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let total = headers
                .get(TOTAL_SIZE_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            recorder.requests.lock().unwrap().push((offset, body.len()));

            if offset.is_some() && offset == recorder.fail_at {
                return (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"error": "boom", "message": "disk full"})),
                );
            }

            let received = offset.map(|offset| offset + (body.len() as u64));
            let early = offset.is_some() && offset == recorder.complete_at;
            match (received, total) {
                (Some(received), Some(total)) if received < total && !early => (
                    axum::http::StatusCode::OK,
                    Json(serde_json::json!({"received": received, "total_size": total})),
                ),
                _ => (
                    axum::http::StatusCode::CREATED,
                    Json(serde_json::json!({"server_timestamp": 1700000000})),
                ),
            }
        }

        let app = Router::new()
            .route("/API/V1/files/*path", post(receive))
            .with_state(recorder);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_small_file_single_request() {
        let recorder = Recorder::default();
        let dir = tempfile::tempdir().unwrap();
        let config = client_config(spawn_recorder(recorder.clone()).await, &dir);
        write_local(&config, "small.txt", b"1234567");

        let ts = TransferEngine::new(&config)
            .unwrap()
            .upload("small.txt", None, UploadMode::Create)
            .await
            .unwrap();

        assert_eq!(ts, 1700000000);
        assert_eq!(*recorder.requests.lock().unwrap(), vec![(None, 7)]);
    }

    #[tokio::test]
    async fn test_chunk_offsets() {
        let recorder = Recorder::default();
        let dir = tempfile::tempdir().unwrap();
        let config = client_config(spawn_recorder(recorder.clone()).await, &dir);
        write_local(&config, "big.bin", &[7u8; 14]);

        TransferEngine::new(&config)
            .unwrap()
            .upload("big.bin", None, UploadMode::Create)
            .await
            .unwrap();

        // ceil(14 / 4) requests at 0, c, 2c, ...
        assert_eq!(
            *recorder.requests.lock().unwrap(),
            vec![(Some(0), 4), (Some(4), 4), (Some(8), 4), (Some(12), 2)]
        );
    }

    #[tokio::test]
    async fn test_early_completion_stops_reading() {
        let recorder = Recorder {
            complete_at: Some(4),
            ..Recorder::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let config = client_config(spawn_recorder(recorder.clone()).await, &dir);
        write_local(&config, "big.bin", &[7u8; 14]);

        let mut seen = Vec::new();
        let ts = TransferEngine::new(&config)
            .unwrap()
            .upload_with_progress("big.bin", None, UploadMode::Create, |sent, total| {
                seen.push((sent, total))
            })
            .await
            .unwrap();

        assert_eq!(ts, 1700000000);
        assert_eq!(
            *recorder.requests.lock().unwrap(),
            vec![(Some(0), 4), (Some(4), 4)]
        );
        assert_eq!(seen, vec![(4, 14), (14, 14)]);
    }

    #[tokio::test]
    async fn test_short_local_file_reports_offset() {
        let recorder = Recorder::default();
        let dir = tempfile::tempdir().unwrap();
        let config = client_config(spawn_recorder(recorder.clone()).await, &dir);
        write_local(&config, "big.bin", &[7u8; 6]);
        let engine = TransferEngine::new(&config).unwrap();

        // The file shrank after its size was taken
        let transfer = ChunkedTransfer::new("big.bin", 14, 4, "hash");
        let local = engine.local_path("big.bin").unwrap();
        let err = engine
            .upload_chunks(transfer, &local, UploadMode::Create, &mut |_: u64, _: u64| {})
            .await
            .unwrap_err();

        match err {
            TransferError::ChunkAborted { path, offset, source } => {
                assert_eq!(path, "big.bin");
                assert_eq!(offset, 4);
                assert!(matches!(*source, TransferError::Local(_)));
            }
            other => panic!("expected chunk abort, got {:?}", other),
        }
        assert_eq!(*recorder.requests.lock().unwrap(), vec![(Some(0), 4)]);

        let failure = Failure::from(&TransferError::ChunkAborted {
            path: "big.bin".to_string(),
            offset: 4,
            source: Box::new(TransferError::Local(std::io::ErrorKind::UnexpectedEof.into())),
        });
        assert_eq!(failure.kind, FailureKind::ChunkSequence);
        assert_eq!(failure.offset, Some(4));
    }

    #[tokio::test]
    async fn test_failed_chunk_aborts_without_retry() {
        let recorder = Recorder {
            fail_at: Some(4),
            ..Recorder::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let config = client_config(spawn_recorder(recorder.clone()).await, &dir);
        write_local(&config, "big.bin", &[7u8; 14]);

        let err = TransferEngine::new(&config)
            .unwrap()
            .upload("big.bin", None, UploadMode::Create)
            .await
            .unwrap_err();

        match err {
            TransferError::ChunkAborted { path, offset, source } => {
                assert_eq!(path, "big.bin");
                assert_eq!(offset, 4);
                assert_eq!(source.status(), Some(500));
            }
            other => panic!("expected chunk abort, got {:?}", other),
        }
        assert_eq!(
            *recorder.requests.lock().unwrap(),
            vec![(Some(0), 4), (Some(4), 4)]
        );
    }

    #[tokio::test]
    async fn test_resume_from_ticket() {
        let app = TestApp::new().await;
        app.create_user("pippo", "Secret123").await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = client_config(app.spawn().await, &dir);
        config.ticket_dir = Some(dir.path().join("tickets"));

        let data: Vec<u8> = (0..10u8).collect();
        let hash = compute_hash(&data);
        write_local(&config, "big.bin", &data);

        // A previous run got the first chunk acknowledged, then died
        app.state
            .uploads()
            .begin("pippo", "big.bin", &hash, 10, UploadMode::Create)
            .await
            .unwrap();
        app.state
            .uploads()
            .accept_chunk("pippo", "big.bin", 0, &hash, 10, &data[..4])
            .await
            .unwrap();
        let tickets = TicketStore::new(dir.path().join("tickets"));
        tickets
            .save(&TransferTicket::new("big.bin", &hash, 10, 4))
            .await
            .unwrap();

        let mut seen = Vec::new();
        TransferEngine::new(&config)
            .unwrap()
            .upload_with_progress("big.bin", Some(hash.as_str()), UploadMode::Create, |sent, _| seen.push(sent))
            .await
            .unwrap();

        assert_eq!(seen, vec![8, 10]);
        assert_eq!(std::fs::read(app.user_file("pippo", "big.bin")).unwrap(), data);
        assert!(tickets.load("big.bin").await.unwrap().is_none());
    }
}
