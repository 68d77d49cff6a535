//! The upload task.
//!
//! Runs on the upload thread with the three connection locks held, so that no
//! caller can observe or change the transport while the uploader drives it.
//!
//! ```text
//!   lock connection, write, read
//!        |
//!        v
//!   transport? --no--> select one (released afterwards) --none--> OpenDevice
//!        |
//!        v
//!   open? --yes--> save configuration
//!        |no
//!        v
//!   open it --fails--> OpenDevice
//!        |
//!        v
//!   suspend listener, clear buffers
//!        |
//!        v
//!   uploader
//!        |
//!        v
//!   restore configuration, clear buffers, resume listener, release
//! ```

use std::io::Read;

use log::{debug, info, warn};

use super::Shared;
use crate::upload::{BoardProfile, CancelToken, UploadError, UploadOutcome, UploadReporter};

pub(super) fn run(
    shared: &Shared,
    board: &BoardProfile,
    firmware: &mut dyn Read,
    reporter: &mut UploadReporter,
    cancel: &CancelToken,
) -> Result<UploadOutcome, UploadError> {
    let mut slot = shared.connection();
    let _write = shared.write();
    let _read = shared.read();

    let acquired = slot.is_none();
    if acquired {
        debug!("No transport, selecting one for the upload");
        *slot = shared.selector.select();
    }
    let transport = match slot.as_mut() {
        Some(transport) => transport,
        None => return Err(UploadError::OpenDevice),
    };

    let snapshot = if transport.is_open() {
        Some(transport.config())
    } else {
        if let Err(e) = transport.open() {
            info!("error: {}", e);
            if acquired {
                *slot = None;
            }
            return Err(UploadError::OpenDevice);
        }
        None
    };

    transport.stop_read_listener();
    if let Err(e) = transport.clear_buffer() {
        warn!("cannot clear buffers before upload: {}", e);
    }

    info!("Uploading to {} over {}", board.name, transport.physical_kind());
    let result = shared
        .uploader
        .upload(board, firmware, &mut **transport, reporter, cancel);

    if let Some(config) = snapshot {
        if let Err(e) = transport.set_config(&config) {
            warn!("cannot restore line configuration: {}", e);
        }
    }
    if let Err(e) = transport.clear_buffer() {
        warn!("cannot clear buffers after upload: {}", e);
    }
    transport.start_read_listener();

    if acquired {
        if let Err(e) = transport.close() {
            warn!("cannot close the upload transport: {}", e);
        }
        *slot = None;
    }

    result
}
