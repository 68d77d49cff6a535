//! Firmware upload.
//!
//! An [`Uploader`] implements the byte-level exchange with a board's
//! bootloader. The [`Connection`](crate::Connection) runs it on a background
//! thread, lending it the transport for the duration of the transfer, and
//! turns its result into the terminal callback events.

mod board;
mod callback;
mod raw;

use std::{
    fmt,
    fs::File,
    io::{BufReader, Read},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::debug;

use crate::transport::Transport;

pub use board::{
    board_by_name, boards, BoardProfile, ResetMethod, ARDUINO_MEGA, ARDUINO_UNO, GENERIC,
    RASPBERRY_PI,
};
pub use callback::{UploadCallback, UploadError, UploadReporter};
pub use raw::RawImageUploader;

// =============================================================================
// Public Interface
// =============================================================================

/// How an upload that did not fail ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum UploadOutcome {
    Completed,
    Canceled,
}

/// A board upload protocol engine.
pub trait Uploader: Send + Sync {
    /// Send `firmware` to the board behind `transport`.
    ///
    /// The transport is open and its read listener suspended. Progress goes
    /// through `reporter`; the terminal events are emitted by the caller from
    /// the returned value. `cancel` must be checked between steps, a canceled
    /// transfer returns [`UploadOutcome::Canceled`].
    fn upload(
        &self,
        board: &BoardProfile,
        firmware: &mut dyn Read,
        transport: &mut dyn Transport,
        reporter: &mut UploadReporter,
        cancel: &CancelToken,
    ) -> Result<UploadOutcome, UploadError>;
}

/// Cooperative cancellation flag shared between a caller and an upload.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where the firmware image is read from.
pub enum FirmwareSource {
    Path(PathBuf),
    Stream(Box<dyn Read + Send>),
}

impl FirmwareSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        FirmwareSource::Path(path.into())
    }

    pub fn stream(reader: impl Read + Send + 'static) -> Self {
        FirmwareSource::Stream(Box::new(reader))
    }

    /// Resolve the source to a readable stream.
    pub fn open(self) -> Result<Box<dyn Read + Send>, UploadError> {
        match self {
            FirmwareSource::Path(path) => {
                let is_file = path.metadata().map(|m| m.is_file()).unwrap_or(false);
                if !is_file {
                    debug!("`{}` is not a readable file", path.display());
                    return Err(UploadError::FileOpen);
                }
                match File::open(&path) {
                    Ok(file) => Ok(Box::new(BufReader::new(file))),
                    Err(e) => {
                        debug!("`{}` error: {}", path.display(), e);
                        Err(UploadError::FileOpen)
                    }
                }
            }
            FirmwareSource::Stream(reader) => Ok(reader),
        }
    }
}

impl fmt::Debug for FirmwareSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            FirmwareSource::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<PathBuf> for FirmwareSource {
    fn from(path: PathBuf) -> Self {
        FirmwareSource::Path(path)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn cancel_token_is_shared() {
    let token = CancelToken::new();
    let other = token.clone();
    assert!(!other.is_canceled());
    token.cancel();
    assert!(other.is_canceled());
}

#[test]
fn missing_path_is_file_open_error() {
    let source = FirmwareSource::path("/this/firmware/does/not/exist.bin");
    assert_eq!(source.open().err(), Some(UploadError::FileOpen));
}

#[test]
fn directory_is_file_open_error() {
    let source = FirmwareSource::path(std::env::temp_dir());
    assert_eq!(source.open().err(), Some(UploadError::FileOpen));
}

#[test]
fn stream_is_passed_through() {
    let mut reader = FirmwareSource::stream(&b"image"[..]).open().unwrap();
    let mut content = vec![];
    reader.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"image");
}
