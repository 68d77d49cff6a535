//! Size-prefixed raw image upload.
//!
//! The simplest bootloader protocol there is:
//!
//! ```text
//!  host                                  board
//!   |---- image size (u32, little endian) --->|
//!   |<--------------- "OK" -------------------|
//!   |---- image bytes (1 KiB chunks) -------->|
//! ```

use std::{convert::TryFrom, io::Read, thread, time::Duration};

use hexplay::HexViewBuilder;
use log::{debug, info, log_enabled, trace, Level::Debug};
use retry::{delay, retry};

use super::{
    BoardProfile, CancelToken, ResetMethod, UploadError, UploadOutcome, UploadReporter, Uploader,
};
use crate::transport::Transport;

const ACK: &[u8] = b"OK";
const CHUNK_SIZE: usize = 1024;
const RESET_PULSE: Duration = Duration::from_millis(50);
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(10);
/// Consecutive writes accepting nothing before the transfer is abandoned.
const WRITE_STALL_LIMIT: u32 = 300;

// =============================================================================
// Public Interface
// =============================================================================

/// [`Uploader`] for bootloaders receiving a raw image preceded by its size.
#[derive(Debug, Clone)]
pub struct RawImageUploader {
    ack_interval: Duration,
    ack_attempts: usize,
}

impl Default for RawImageUploader {
    fn default() -> Self {
        RawImageUploader {
            ack_interval: Duration::from_millis(100),
            ack_attempts: 30,
        }
    }
}

impl RawImageUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long to wait for the bootloader to acknowledge the image size.
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        let interval = self.ack_interval.as_millis().max(1);
        self.ack_attempts = (timeout.as_millis() / interval) as usize;
        self
    }
}

impl Uploader for RawImageUploader {
    fn upload(
        &self,
        board: &BoardProfile,
        firmware: &mut dyn Read,
        transport: &mut dyn Transport,
        reporter: &mut UploadReporter,
        cancel: &CancelToken,
    ) -> Result<UploadOutcome, UploadError> {
        let mut image = vec![];
        if let Err(e) = firmware.read_to_end(&mut image) {
            debug!("firmware read error: {}", e);
            return Err(UploadError::FileOpen);
        }
        // The size travels as 4 bytes.
        let size = u32::try_from(image.len())
            .map_err(|_| UploadError::ImageTooLarge(image.len() as u64))?;

        info!("Uploading {} bytes to {}", size, board.name);
        transport.set_baud_rate(board.baud_rate)?;
        if board.reset == ResetMethod::DtrPulse {
            reset(transport)?;
        }
        transport.clear_buffer()?;
        reporter.pre_upload();

        write_all(transport, &size.to_le_bytes())?;
        self.wait_for_ack(transport, cancel)?;
        if cancel.is_canceled() {
            return Ok(UploadOutcome::Canceled);
        }
        reporter.uploading(0);

        let mut written = 0usize;
        for chunk in image.chunks(CHUNK_SIZE) {
            if cancel.is_canceled() {
                info!("Upload canceled after {} bytes", written);
                return Ok(UploadOutcome::Canceled);
            }
            write_all(transport, chunk)?;
            written += chunk.len();
            trace!("{} / {} bytes written", written, size);
            reporter.uploading(percent(written, image.len()));
        }
        if image.is_empty() {
            reporter.uploading(100);
        }

        Ok(UploadOutcome::Completed)
    }
}

// =============================================================================
// Private stuff
// =============================================================================

impl RawImageUploader {
    /// Poll the transport until the bootloader answers `OK`. Returns early
    /// when canceled.
    fn wait_for_ack(
        &self,
        transport: &dyn Transport,
        cancel: &CancelToken,
    ) -> Result<(), UploadError> {
        let mut received = vec![];
        let result = retry(
            delay::Fixed::from_millis(self.ack_interval.as_millis() as u64).take(self.ack_attempts),
            || -> Result<(), UploadError> {
                if cancel.is_canceled() {
                    return Ok(());
                }
                let mut buf = [0u8; 16];
                let n = transport.read(&mut buf)?;
                received.extend_from_slice(&buf[..n]);
                if received.windows(ACK.len()).any(|w| w == ACK) {
                    Ok(())
                } else {
                    Err(UploadError::NoAcknowledge)
                }
            },
        );

        if log_enabled!(Debug) && !received.is_empty() {
            let view = HexViewBuilder::new(&received)
                .address_offset(0)
                .row_width(16)
                .finish();
            debug!("bootloader answer:\n{}", view);
        }

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                info!("error: {:?}", e);
                Err(UploadError::NoAcknowledge)
            }
        }
    }
}

fn reset(transport: &mut dyn Transport) -> Result<(), UploadError> {
    let rts_on = transport.config().rts_on;
    debug!("Resetting board with a DTR pulse");
    transport.set_dtr_rts(false, rts_on)?;
    thread::sleep(RESET_PULSE);
    transport.set_dtr_rts(true, rts_on)?;
    thread::sleep(RESET_PULSE);
    Ok(())
}

fn write_all(transport: &dyn Transport, mut buf: &[u8]) -> Result<(), UploadError> {
    let mut stalled = 0;
    while !buf.is_empty() {
        match transport.write(buf)? {
            0 => {
                stalled += 1;
                if stalled >= WRITE_STALL_LIMIT {
                    return Err(UploadError::Transport("write stalled".into()));
                }
                thread::sleep(WRITE_RETRY_DELAY);
            }
            n => {
                stalled = 0;
                buf = &buf[n..];
            }
        }
    }
    Ok(())
}

fn percent(written: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    (written as u64 * 100 / total as u64) as u32
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn percent_is_bounded() {
    assert_eq!(percent(0, 0), 100);
    assert_eq!(percent(0, 4096), 0);
    assert_eq!(percent(1024, 4096), 25);
    assert_eq!(percent(4096, 4096), 100);
}

#[test]
fn ack_timeout_sets_attempts() {
    let uploader = RawImageUploader::new().ack_timeout(Duration::from_secs(1));
    assert_eq!(uploader.ack_attempts, 10);
}
