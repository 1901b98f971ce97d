//! Per-connection protocol state machine.
//!
//! [`ConnectionSession`] does no I/O. The connection driver feeds it every
//! chunk read from the socket and acts on the [`SessionEvent`]s it returns.
//! This keeps the byte accounting testable against arbitrary chunkings.
//!
//! ```text
//!   New ──registration──▶ Registered
//!                           │
//!                 Line ◀────┴────▶ Raw
//!                   │  announce      │
//!                   └────────────────┘
//!                      size bytes in
//! ```

use bytes::{Bytes, BytesMut};

use crate::error::{ProtocolError, SessionError, TransferError};
use crate::protocol::{
    parse_registration, parse_request, DeclaredTags, FrameDecoder, Registration, Request,
};
use crate::protocol_constants::{MAX_UPLOAD_PREALLOC, PROGRESS_COMPLETE};
use crate::utils::client_basename;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Whether the client has identified itself yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Registered,
}

/// How incoming bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Bytes are length-prefixed control frames.
    Line,
    /// Bytes belong to an announced upload.
    Raw,
}

/// An upload whose declared size has been fully received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    /// Base name of the client's file.
    pub filename: String,
    /// Declared size, equal to `data.len()`.
    pub size: u64,
    /// Tags sent with the announce.
    pub tags: DeclaredTags,
    pub data: Bytes,
}

/// Something the connection driver has to act on.
#[derive(Debug)]
pub enum SessionEvent {
    /// The client registered.
    Registered(Registration),
    /// The client asked for the current/next summary.
    Query,
    /// An announce was accepted; the session is now in raw mode.
    UploadStarted { filename: String, size: u64 },
    /// Upload progress after a chunk, 0..=100.
    Progress(u8),
    /// The last upload byte arrived; the session is back in line mode.
    UploadComplete(CompletedUpload),
    /// A frame was decoded but not acted on.
    Rejected(ProtocolError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Upload Buffer
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates exactly `declared` bytes of one upload.
#[derive(Debug)]
struct UploadBuffer {
    filename: String,
    tags: DeclaredTags,
    declared: u64,
    data: BytesMut,
}

impl UploadBuffer {
    fn new(filename: String, declared: u64, tags: DeclaredTags) -> Self {
        let prealloc = declared.min(MAX_UPLOAD_PREALLOC as u64) as usize;
        Self {
            filename,
            tags,
            declared,
            data: BytesMut::with_capacity(prealloc),
        }
    }

    fn received(&self) -> u64 {
        self.data.len() as u64
    }

    fn remaining(&self) -> u64 {
        self.declared - self.received()
    }

    /// Appends bytes; refuses anything past the declared size.
    fn append(&mut self, bytes: &[u8]) -> Result<(), TransferError> {
        let attempted = self.received() + bytes.len() as u64;
        if attempted > self.declared {
            return Err(TransferError::Overflow {
                declared: self.declared,
                attempted,
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn progress(&self) -> u8 {
        let percent = self.received().saturating_mul(100) / self.declared;
        percent.min(u64::from(PROGRESS_COMPLETE)) as u8
    }

    fn is_complete(&self) -> bool {
        self.received() == self.declared
    }

    fn finish(self) -> CompletedUpload {
        CompletedUpload {
            filename: self.filename,
            size: self.declared,
            tags: self.tags,
            data: self.data.freeze(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Protocol state for one client connection.
#[derive(Debug)]
pub struct ConnectionSession {
    decoder: FrameDecoder,
    /// Bytes read from the socket but not yet consumed.
    pending: BytesMut,
    registration: Option<Registration>,
    upload: Option<UploadBuffer>,
    max_upload_bytes: u64,
}

impl ConnectionSession {
    /// Creates a session in `New`/`Line` state.
    #[must_use]
    pub fn new(max_upload_bytes: u64) -> Self {
        Self {
            decoder: FrameDecoder::default(),
            pending: BytesMut::new(),
            registration: None,
            upload: None,
            max_upload_bytes,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.registration.is_some() {
            SessionState::Registered
        } else {
            SessionState::New
        }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        if self.upload.is_some() {
            Mode::Raw
        } else {
            Mode::Line
        }
    }

    /// Returns the client's identity once registered.
    #[must_use]
    pub fn registration(&self) -> Option<&Registration> {
        self.registration.as_ref()
    }

    /// Returns `(received, declared)` for the upload in flight.
    #[must_use]
    pub fn upload_progress(&self) -> Option<(u64, u64)> {
        self.upload.as_ref().map(|u| (u.received(), u.declared))
    }

    /// Feeds one chunk read from the transport.
    ///
    /// A single chunk may finish one upload and carry the next control frame;
    /// raw mode takes at most the bytes still owed and hands the rest back to
    /// framing. An error means the connection must be closed.
    pub fn receive(&mut self, chunk: &[u8]) -> Result<Vec<SessionEvent>, SessionError> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        loop {
            if let Some(upload) = self.upload.as_mut() {
                if self.pending.is_empty() {
                    break;
                }
                let take = upload.remaining().min(self.pending.len() as u64) as usize;
                let bytes = self.pending.split_to(take);
                upload.append(&bytes)?;
                events.push(SessionEvent::Progress(upload.progress()));

                if upload.is_complete() {
                    if let Some(upload) = self.upload.take() {
                        let done = upload.finish();
                        log::debug!(
                            "[Session] Upload complete: {} ({} bytes)",
                            done.filename,
                            done.size
                        );
                        events.push(SessionEvent::UploadComplete(done));
                    }
                }
                continue;
            }

            match self.decoder.decode(&mut self.pending)? {
                Some(body) => self.handle_frame(&body, &mut events),
                None => break,
            }
        }

        Ok(events)
    }

    fn handle_frame(&mut self, body: &[u8], events: &mut Vec<SessionEvent>) {
        if self.registration.is_none() {
            match parse_registration(body) {
                Ok(registration) => {
                    self.registration = Some(registration.clone());
                    events.push(SessionEvent::Registered(registration));
                }
                Err(e) => events.push(SessionEvent::Rejected(e)),
            }
            return;
        }

        let event = match parse_request(body) {
            Ok(Request::Query) => SessionEvent::Query,
            Ok(Request::File {
                filename,
                size,
                tags,
            }) => match self.begin_upload(&filename, size, tags.unwrap_or_default()) {
                Ok((filename, size)) => SessionEvent::UploadStarted { filename, size },
                Err(e) => SessionEvent::Rejected(e),
            },
            Err(e) => SessionEvent::Rejected(e),
        };
        events.push(event);
    }

    fn begin_upload(
        &mut self,
        filename: &str,
        size: i64,
        tags: DeclaredTags,
    ) -> Result<(String, u64), ProtocolError> {
        if size <= 0 {
            return Err(ProtocolError::InvalidSize(size));
        }
        let size = size as u64;
        if size > self.max_upload_bytes {
            return Err(ProtocolError::UploadTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }

        let filename = client_basename(filename);
        self.upload = Some(UploadBuffer::new(filename.clone(), size, tags));
        log::debug!("[Session] Upload announced: {} ({} bytes)", filename, size);
        Ok((filename, size))
    }
}
