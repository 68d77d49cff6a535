//! Upload lifecycle notifications.
//!
//! A caller follows an upload through an [`UploadCallback`]. The events of one
//! upload always form one of these sequences:
//!
//! ```text
//! completed:  PreUpload, Uploading(p)*, PostUpload(true)
//! canceled:   PreUpload, Uploading(p)*, Cancel, PostUpload(false)
//! failed:     [PreUpload, Uploading(p)*], Error(e)
//! ```
//!
//! [`UploadReporter`] sits between the uploader and the callback and keeps
//! these sequences well formed whatever the uploader does.

use log::{debug, info};

use super::UploadOutcome;

// =============================================================================
// Public Interface
// =============================================================================

/// Why an upload failed.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum UploadError {
    /// The firmware image could not be opened or read.
    #[error("cannot open the firmware image")]
    FileOpen,

    /// No transport could be selected or opened.
    #[error("cannot open the device")]
    OpenDevice,

    /// The image does not fit the length field of the protocol.
    #[error("firmware image too large: {0} bytes")]
    ImageTooLarge(u64),

    /// The bootloader did not acknowledge the transfer.
    #[error("no acknowledgement from the bootloader")]
    NoAcknowledge,

    /// The transport failed during the transfer.
    #[error("transport error: {0}")]
    Transport(String),

    /// Any other failure of the upload protocol.
    #[error("upload protocol error: {0}")]
    Protocol(String),
}

impl From<crate::Error> for UploadError {
    fn from(e: crate::Error) -> Self {
        UploadError::Transport(e.to_string())
    }
}

/// Receives the upload lifecycle events. Every method defaults to doing
/// nothing.
///
/// The callbacks run on the upload thread while the connection is locked and
/// must not call back into the [`Connection`](crate::Connection).
pub trait UploadCallback: Send {
    fn on_pre_upload(&mut self) {}

    /// Progress in percent.
    fn on_uploading(&mut self, _progress: u32) {}

    fn on_post_upload(&mut self, _success: bool) {}

    fn on_cancel(&mut self) {}

    fn on_error(&mut self, _error: UploadError) {}
}

/// Forwards upload events to an optional [`UploadCallback`] while enforcing
/// their ordering.
pub struct UploadReporter {
    callback: Option<Box<dyn UploadCallback>>,
    started: bool,
    progress: Option<u32>,
    finished: bool,
}

impl UploadReporter {
    pub fn new(callback: Option<Box<dyn UploadCallback>>) -> Self {
        UploadReporter {
            callback,
            started: false,
            progress: None,
            finished: false,
        }
    }

    /// A reporter without callback.
    pub fn silent() -> Self {
        Self::new(None)
    }

    /// Announce the start of the transfer. Only the first call is forwarded.
    pub fn pre_upload(&mut self) {
        if self.started || self.finished {
            return;
        }
        self.started = true;
        debug!("upload: pre-upload");
        if let Some(cb) = self.callback.as_mut() {
            cb.on_pre_upload();
        }
    }

    /// Report progress. Values lower than the last reported one are dropped.
    pub fn uploading(&mut self, progress: u32) {
        if self.finished {
            return;
        }
        if self.progress.map_or(false, |last| progress < last) {
            return;
        }
        self.pre_upload();
        self.progress = Some(progress);
        if let Some(cb) = self.callback.as_mut() {
            cb.on_uploading(progress);
        }
    }

    /// Last progress forwarded, if any.
    pub fn progress(&self) -> Option<u32> {
        self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Emit the terminal events for `result`. Only the first call has an
    /// effect.
    pub fn finish(&mut self, result: &Result<UploadOutcome, UploadError>) {
        if self.finished {
            return;
        }
        match result {
            Ok(UploadOutcome::Completed) => {
                self.pre_upload();
                info!("Upload completed");
                if let Some(cb) = self.callback.as_mut() {
                    cb.on_post_upload(true);
                }
            }
            Ok(UploadOutcome::Canceled) => {
                self.pre_upload();
                info!("Upload canceled");
                if let Some(cb) = self.callback.as_mut() {
                    cb.on_cancel();
                    cb.on_post_upload(false);
                }
            }
            Err(e) => {
                info!("Upload failed: {}", e);
                if let Some(cb) = self.callback.as_mut() {
                    cb.on_error(e.clone());
                }
            }
        }
        self.finished = true;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
