//! Turns a completed upload into a queued, catalogued track.
//!
//! Runs on the worker pool, never on a connection task. The steps are:
//!
//! 1. Read embedded tags and merge the client's declared tags.
//! 2. Without embedded art, ask the [`Resolver`] for cover art.
//! 3. Write art into the art directory and point the entry at the art service.
//! 4. Move the staged file into the library.
//! 5. Enqueue and tell the uploader its position.
//! 6. Record the track in the [`Catalog`]; failures here are only logged.
//!
//! A failure in steps 1 through 4 queues nothing and sends the uploader an
//! `{"error": ...}` reply instead of a position.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::catalog::{Catalog, TrackRecord};
use crate::context::NetworkContext;
use crate::error::{ErrorCode, NukeboxError, NukeboxResult, TransferError};
use crate::events::{EventEmitter, QueueEvent};
use crate::media::{Resolver, TagReader, TrackTags};
use crate::protocol::{DeclaredTags, ServerMessage};
use crate::protocol_constants::{ART_EXTENSION, DEFAULT_CONTAINER};
use crate::queue::{ArtRef, Entry, TrackQueue};
use crate::runtime::WorkerPool;
use crate::server::session::CompletedUpload;
use crate::state::{LibraryPaths, PlaybackStatus};
use crate::utils::{extension_of, now_millis, sanitize_component};

/// A staged upload waiting for ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Where the upload was written.
    pub staged_path: PathBuf,
    /// Client's file name (base name only).
    pub filename: String,
    pub size: u64,
    pub tags: DeclaredTags,
    /// Registered name of the uploading client.
    pub uploader: String,
}

/// Result of a successful ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queued {
    pub track: String,
    pub position: usize,
}

/// Writes a completed upload into the staging directory.
///
/// The name is prefixed with the connection id and a random tag so two
/// uploads of the same file never share a staging path.
pub async fn stage_upload(
    staging_dir: &Path,
    connection_id: u64,
    upload: &CompletedUpload,
) -> Result<PathBuf, TransferError> {
    let tag = Uuid::new_v4().simple().to_string();
    let name = format!(
        "{}-{}-{}",
        connection_id,
        &tag[..8],
        sanitize_component(&upload.filename)
    );
    let path = staging_dir.join(name);
    tokio::fs::write(&path, &upload.data)
        .await
        .map_err(TransferError::Stage)?;
    log::debug!(
        "[Ingest] Staged {} bytes at {}",
        upload.size,
        path.display()
    );
    Ok(path)
}

/// Everything ingest needs, shared across jobs.
pub struct IngestPipeline {
    tag_reader: Arc<dyn TagReader>,
    resolver: Arc<dyn Resolver>,
    catalog: Arc<dyn Catalog>,
    queue: Arc<TrackQueue>,
    status: Arc<PlaybackStatus>,
    paths: LibraryPaths,
    network: NetworkContext,
    emitter: Arc<dyn EventEmitter>,
}

impl IngestPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tag_reader: Arc<dyn TagReader>,
        resolver: Arc<dyn Resolver>,
        catalog: Arc<dyn Catalog>,
        queue: Arc<TrackQueue>,
        status: Arc<PlaybackStatus>,
        paths: LibraryPaths,
        network: NetworkContext,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            tag_reader,
            resolver,
            catalog,
            queue,
            status,
            paths,
            network,
            emitter,
        }
    }

    /// Runs ingest and reports the outcome to the uploader.
    ///
    /// Returns the queued position on success. On failure the staged file is
    /// removed and an error reply is sent.
    pub async fn process(
        &self,
        request: IngestRequest,
        reply: mpsc::Sender<ServerMessage>,
    ) -> Option<Queued> {
        match self.ingest(&request, &reply).await {
            Ok(queued) => Some(queued),
            Err(e) => {
                log::warn!(
                    "[Ingest] {} from {} not queued [{}]: {}",
                    request.filename,
                    request.uploader,
                    e.code(),
                    e
                );
                if let Err(remove_err) = tokio::fs::remove_file(&request.staged_path).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        log::warn!(
                            "[Ingest] Failed to remove {}: {}",
                            request.staged_path.display(),
                            remove_err
                        );
                    }
                }
                send_reply(
                    &reply,
                    ServerMessage::Error {
                        error: e.to_string(),
                    },
                )
                .await;
                None
            }
        }
    }

    async fn ingest(
        &self,
        request: &IngestRequest,
        reply: &mpsc::Sender<ServerMessage>,
    ) -> NukeboxResult<Queued> {
        let tags = self.read_tags(&request.staged_path, &request.tags).await?;
        let art = self.find_art(&tags).await?;

        let filetype =
            extension_of(&request.filename).unwrap_or_else(|| DEFAULT_CONTAINER.to_string());
        let destination = self
            .paths
            .library
            .join(format!("{}.{}", sanitize_component(&tags.title), filetype));
        move_file(&request.staged_path, &destination).await?;

        let entry = Entry {
            track: tags.title.clone(),
            artist: tags.artist.clone(),
            album: tags.album.clone(),
            art,
            path: destination,
            size: request.size,
            filetype,
        };
        let record = TrackRecord {
            track: entry.track.clone(),
            artist: entry.artist.clone(),
            album: entry.album.clone(),
            art: entry.art.display_url().to_string(),
            path: entry.path.clone(),
            size: entry.size,
            filetype: entry.filetype.clone(),
        };

        let position = self.queue.enqueue_with(entry, || self.status.is_playing());
        log::info!(
            "[Ingest] Queued '{}' by {} at position {}",
            tags.title,
            tags.artist,
            position
        );
        self.emitter.emit_queue(QueueEvent::TrackQueued {
            track: tags.title.clone(),
            artist: tags.artist.clone(),
            position,
            timestamp: now_millis(),
        });
        send_reply(reply, ServerMessage::position(&tags.title, position)).await;

        self.persist(&request.uploader, record).await;

        Ok(Queued {
            track: tags.title,
            position,
        })
    }

    async fn read_tags(&self, staged: &Path, declared: &DeclaredTags) -> NukeboxResult<TrackTags> {
        let reader = Arc::clone(&self.tag_reader);
        let path = staged.to_path_buf();
        let embedded = WorkerPool::run_blocking(move || reader.read(&path)).await??;
        Ok(embedded.merge(declared)?)
    }

    /// Decides the entry's art, writing image bytes into the art directory.
    async fn find_art(&self, tags: &TrackTags) -> NukeboxResult<ArtRef> {
        let art_name = art_file_name(tags);

        if let Some(picture) = &tags.picture {
            log::debug!("[Ingest] Using embedded art for '{}'", tags.title);
            return Ok(self.store_art(&art_name, picture.clone()).await);
        }

        if tags.album.is_empty() {
            log::debug!("[Ingest] No album for '{}', skipping art lookup", tags.title);
            return Ok(ArtRef::Absent);
        }

        let resolution = self
            .resolver
            .resolve(&tags.artist, &tags.album, tags.genre.as_deref())
            .await?;
        let Some(remote) = resolution.art.into_iter().next() else {
            return Ok(ArtRef::Absent);
        };

        match self.resolver.fetch_art(&remote).await {
            Ok(bytes) => match self.store_art(&art_name, bytes).await {
                ArtRef::Absent => Ok(ArtRef::Url(remote)),
                stored => Ok(stored),
            },
            Err(e) => {
                log::warn!("[Ingest] Art download failed, using remote URL: {}", e);
                Ok(ArtRef::Url(remote))
            }
        }
    }

    /// Writes art (unless a file for this album already exists) and returns
    /// its served URL; [`ArtRef::Absent`] if it could not be written.
    async fn store_art(&self, art_name: &str, bytes: Bytes) -> ArtRef {
        let path = self.paths.art.join(art_name);
        let written = match tokio::fs::try_exists(&path).await {
            Ok(true) => Ok(()),
            _ => tokio::fs::write(&path, &bytes)
                .await
                .map_err(TransferError::Art),
        };

        match written {
            Ok(()) => ArtRef::Url(self.network.art_url(art_name)),
            Err(e) => {
                log::warn!("[Ingest] {}", e);
                ArtRef::Absent
            }
        }
    }

    async fn persist(&self, uploader: &str, record: TrackRecord) {
        let catalog = Arc::clone(&self.catalog);
        let uploader = uploader.to_string();
        let track = record.track.clone();
        match WorkerPool::run_blocking(move || catalog.upsert_track(&uploader, &record)).await {
            Ok(Ok(id)) => log::debug!("[Ingest] Catalogued '{}' as {}", track, id),
            Ok(Err(e)) => log::warn!("[Ingest] Catalog write for '{}' failed: {}", track, e),
            Err(e) => log::warn!("[Ingest] Catalog task for '{}' failed: {}", track, e),
        }
    }
}

/// Art is stored per album; tracks without an album use their title.
fn art_file_name(tags: &TrackTags) -> String {
    let key = if tags.album.is_empty() {
        &tags.title
    } else {
        &tags.album
    };
    format!("{}.{}", sanitize_component(key), ART_EXTENSION)
}

/// Renames `from` to `to`, copying when they are on different filesystems.
async fn move_file(from: &Path, to: &Path) -> Result<(), NukeboxError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(TransferError::Place)?;
    tokio::fs::remove_file(from)
        .await
        .map_err(TransferError::Place)?;
    Ok(())
}

async fn send_reply(reply: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    if reply.send(message).await.is_err() {
        log::debug!("[Ingest] Uploader disconnected before reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{JsonCatalog, StoredTrack, StoredUser};
    use crate::error::{MetadataError, PersistenceError};
    use crate::events::{NoopEventEmitter, RecordingEmitter};
    use crate::media::{EmbeddedTags, Resolution};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    // ─────────────────────────────────────────────────────────────────────────
    // Fakes
    // ─────────────────────────────────────────────────────────────────────────

    struct FakeTagReader {
        result: Mutex<Option<Result<EmbeddedTags, MetadataError>>>,
    }

    impl FakeTagReader {
        fn returning(tags: EmbeddedTags) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(Ok(tags))),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(Err(MetadataError::TagRead("bad header".into())))),
            })
        }
    }

    impl TagReader for FakeTagReader {
        fn read(&self, _path: &Path) -> Result<EmbeddedTags, MetadataError> {
            self.result
                .lock()
                .take()
                .unwrap_or_else(|| Ok(EmbeddedTags::default()))
        }
    }

    #[derive(Default)]
    struct FakeResolver {
        art: Vec<String>,
        fail_resolve: bool,
        fail_fetch: bool,
        resolve_calls: AtomicUsize,
    }

    #[async_trait]
    impl Resolver for FakeResolver {
        async fn resolve(
            &self,
            artist: &str,
            album: &str,
            _genre: Option<&str>,
        ) -> Result<Resolution, MetadataError> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_resolve {
                return Err(MetadataError::NoMatch {
                    artist: artist.to_string(),
                    album: album.to_string(),
                });
            }
            Ok(Resolution {
                artist_id: "artist-1".into(),
                album_id: "album-1".into(),
                art: self.art.clone(),
            })
        }

        async fn fetch_art(&self, _url: &str) -> Result<Bytes, MetadataError> {
            if self.fail_fetch {
                Err(MetadataError::Resolver("503".into()))
            } else {
                Ok(Bytes::from_static(b"remote-jpeg"))
            }
        }
    }

    struct FailingCatalog;

    impl Catalog for FailingCatalog {
        fn upsert_user(&self, _: &str, _: &str) -> Result<String, PersistenceError> {
            Err(PersistenceError::Task("down".into()))
        }
        fn upsert_track(&self, _: &str, _: &TrackRecord) -> Result<String, PersistenceError> {
            Err(PersistenceError::Task("down".into()))
        }
        fn find_track(&self, _: &str) -> Result<Option<StoredTrack>, PersistenceError> {
            Ok(None)
        }
        fn find_user(&self, _: &str) -> Result<Option<StoredUser>, PersistenceError> {
            Ok(None)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Harness
    // ─────────────────────────────────────────────────────────────────────────

    struct Harness {
        _root: TempDir,
        paths: LibraryPaths,
        queue: Arc<TrackQueue>,
        status: Arc<PlaybackStatus>,
        catalog: Arc<JsonCatalog>,
    }

    impl Harness {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let paths = LibraryPaths {
                staging: root.path().join("staging"),
                library: root.path().join("library"),
                art: root.path().join("library/art"),
            };
            paths.ensure_dirs().unwrap();
            Self {
                _root: root,
                paths,
                queue: Arc::new(TrackQueue::new()),
                status: Arc::new(PlaybackStatus::new()),
                catalog: Arc::new(JsonCatalog::in_memory()),
            }
        }

        fn pipeline(
            &self,
            reader: Arc<dyn TagReader>,
            resolver: Arc<dyn Resolver>,
            catalog: Arc<dyn Catalog>,
            emitter: Arc<dyn EventEmitter>,
        ) -> IngestPipeline {
            IngestPipeline::new(
                reader,
                resolver,
                catalog,
                Arc::clone(&self.queue),
                Arc::clone(&self.status),
                self.paths.clone(),
                NetworkContext::for_test(),
                emitter,
            )
        }

        async fn stage(&self, filename: &str) -> IngestRequest {
            let upload = CompletedUpload {
                filename: filename.to_string(),
                size: 4,
                tags: DeclaredTags::default(),
                data: Bytes::from_static(b"ID3\x04"),
            };
            let staged_path = stage_upload(&self.paths.staging, 7, &upload).await.unwrap();
            IngestRequest {
                staged_path,
                filename: filename.to_string(),
                size: upload.size,
                tags: upload.tags,
                uploader: "darren".to_string(),
            }
        }
    }

    fn tags(picture: Option<&'static [u8]>) -> EmbeddedTags {
        EmbeddedTags {
            title: Some("Birch Tree".into()),
            artist: Some("Foals".into()),
            album: Some("What Went Down".into()),
            genre: Some("Indie".into()),
            picture: picture.map(Bytes::from_static),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn staged_file_name_is_unique_and_sanitized() {
        let h = Harness::new();
        let a = h.stage("my song.mp3").await;
        let b = h.stage("my song.mp3").await;
        assert_ne!(a.staged_path, b.staged_path);
        let name = a.staged_path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("7-"));
        assert!(name.ends_with("-my-song.mp3"));
        assert_eq!(std::fs::read(&a.staged_path).unwrap(), b"ID3\x04");
    }

    #[tokio::test]
    async fn embedded_art_is_written_and_served() {
        let h = Harness::new();
        let resolver = Arc::new(FakeResolver::default());
        let emitter = Arc::new(RecordingEmitter::default());
        let pipeline = h.pipeline(
            FakeTagReader::returning(tags(Some(b"\xff\xd8jpeg"))),
            resolver.clone(),
            h.catalog.clone(),
            emitter.clone(),
        );
        let request = h.stage("birch.mp3").await;
        let staged = request.staged_path.clone();
        let (tx, mut rx) = mpsc::channel(4);

        let queued = pipeline.process(request, tx).await.unwrap();
        assert_eq!(queued.position, 1);

        let placed = h.paths.library.join("Birch-Tree.mp3");
        assert!(placed.is_file());
        assert!(!staged.exists());
        assert_eq!(
            std::fs::read(h.paths.art.join("What-Went-Down.jpeg")).unwrap(),
            b"\xff\xd8jpeg"
        );
        assert_eq!(resolver.resolve_calls.load(Ordering::SeqCst), 0);

        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::position("Birch Tree", 1)
        );

        let snapshot = h.queue.snapshot();
        assert_eq!(snapshot.current.track, "Birch Tree");
        assert_eq!(
            snapshot.current.art,
            "http://127.0.0.1:8888/What-Went-Down.jpeg"
        );

        let stored = h.catalog.find_track("Birch Tree").unwrap().unwrap();
        assert_eq!(stored.record.path, placed);
        assert_eq!(emitter.queue.lock().len(), 1);
    }

    #[tokio::test]
    async fn resolver_art_is_downloaded() {
        let h = Harness::new();
        let resolver = Arc::new(FakeResolver {
            art: vec!["http://caa/front-500.jpg".into()],
            ..Default::default()
        });
        let pipeline = h.pipeline(
            FakeTagReader::returning(tags(None)),
            resolver.clone(),
            h.catalog.clone(),
            Arc::new(NoopEventEmitter),
        );
        let (tx, _rx) = mpsc::channel(4);

        pipeline.process(h.stage("birch.mp3").await, tx).await.unwrap();

        assert_eq!(resolver.resolve_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read(h.paths.art.join("What-Went-Down.jpeg")).unwrap(),
            b"remote-jpeg"
        );
        assert_eq!(
            h.queue.snapshot().current.art,
            "http://127.0.0.1:8888/What-Went-Down.jpeg"
        );
    }

    #[tokio::test]
    async fn failed_art_download_keeps_remote_url() {
        let h = Harness::new();
        let resolver = Arc::new(FakeResolver {
            art: vec!["http://caa/front-500.jpg".into()],
            fail_fetch: true,
            ..Default::default()
        });
        let pipeline = h.pipeline(
            FakeTagReader::returning(tags(None)),
            resolver,
            h.catalog.clone(),
            Arc::new(NoopEventEmitter),
        );
        let (tx, _rx) = mpsc::channel(4);

        pipeline.process(h.stage("birch.mp3").await, tx).await.unwrap();
        assert_eq!(h.queue.snapshot().current.art, "http://caa/front-500.jpg");
    }

    #[tokio::test]
    async fn tag_failure_queues_nothing_and_reports_error() {
        let h = Harness::new();
        let pipeline = h.pipeline(
            FakeTagReader::failing(),
            Arc::new(FakeResolver::default()),
            h.catalog.clone(),
            Arc::new(NoopEventEmitter),
        );
        let request = h.stage("broken.mp3").await;
        let staged = request.staged_path.clone();
        let (tx, mut rx) = mpsc::channel(4);

        assert!(pipeline.process(request, tx).await.is_none());
        assert!(h.queue.is_empty());
        assert!(!staged.exists());
        match rx.recv().await.unwrap() {
            ServerMessage::Error { error } => assert!(error.contains("bad header")),
            other => panic!("unexpected reply: {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn resolver_failure_queues_nothing() {
        let h = Harness::new();
        let pipeline = h.pipeline(
            FakeTagReader::returning(tags(None)),
            Arc::new(FakeResolver {
                fail_resolve: true,
                ..Default::default()
            }),
            h.catalog.clone(),
            Arc::new(NoopEventEmitter),
        );
        let (tx, mut rx) = mpsc::channel(4);

        assert!(pipeline.process(h.stage("a.mp3").await, tx).await.is_none());
        assert!(h.queue.is_empty());
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::Error { .. })
        ));
    }

    #[tokio::test]
    async fn missing_artist_is_a_metadata_failure() {
        let h = Harness::new();
        let mut no_artist = tags(None);
        no_artist.artist = None;
        let pipeline = h.pipeline(
            FakeTagReader::returning(no_artist),
            Arc::new(FakeResolver::default()),
            h.catalog.clone(),
            Arc::new(NoopEventEmitter),
        );
        let (tx, mut rx) = mpsc::channel(4);

        assert!(pipeline.process(h.stage("a.mp3").await, tx).await.is_none());
        match rx.recv().await.unwrap() {
            ServerMessage::Error { error } => assert_eq!(error, "Missing required tag: artist"),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn catalog_failure_does_not_retract_enqueue() {
        let h = Harness::new();
        let pipeline = h.pipeline(
            FakeTagReader::returning(tags(Some(b"img"))),
            Arc::new(FakeResolver::default()),
            Arc::new(FailingCatalog),
            Arc::new(NoopEventEmitter),
        );
        let (tx, mut rx) = mpsc::channel(4);

        let queued = pipeline.process(h.stage("a.mp3").await, tx).await.unwrap();
        assert_eq!(queued.position, 1);
        assert_eq!(h.queue.len(), 1);
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::Position { .. })
        ));
    }

    #[tokio::test]
    async fn lone_track_goes_to_next_while_playing() {
        let h = Harness::new();
        h.status.set_playing(true);
        let pipeline = h.pipeline(
            FakeTagReader::returning(tags(Some(b"img"))),
            Arc::new(FakeResolver::default()),
            h.catalog.clone(),
            Arc::new(NoopEventEmitter),
        );
        let (tx, _rx) = mpsc::channel(4);

        pipeline.process(h.stage("a.mp3").await, tx).await.unwrap();
        let snapshot = h.queue.snapshot();
        assert!(snapshot.current.is_empty());
        assert_eq!(snapshot.next.track, "Birch Tree");
    }

    #[tokio::test]
    async fn album_less_track_skips_lookup() {
        let h = Harness::new();
        let mut no_album = tags(None);
        no_album.album = None;
        let resolver = Arc::new(FakeResolver::default());
        let pipeline = h.pipeline(
            FakeTagReader::returning(no_album),
            resolver.clone(),
            h.catalog.clone(),
            Arc::new(NoopEventEmitter),
        );
        let (tx, _rx) = mpsc::channel(4);

        pipeline.process(h.stage("a.flac").await, tx).await.unwrap();
        assert_eq!(resolver.resolve_calls.load(Ordering::SeqCst), 0);
        assert!(h.paths.library.join("Birch-Tree.flac").is_file());
        assert_eq!(h.queue.snapshot().current.art, "");
    }
}
