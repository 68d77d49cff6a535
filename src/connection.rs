//! The connection facade.
//!
//! A [`Connection`] owns at most one transport and serializes every operation
//! on it with three locks:
//!
//! * the *connection* lock, a read-write lock over the transport slot. Opening,
//!   closing, configuring and uploading take it exclusively. Status queries,
//!   reads and writes share it.
//! * the *write* lock, held while writing.
//! * the *read* lock, held while reading.
//!
//! Reads and writes can therefore run concurrently with each other but never
//! with a change of the connection. Locks are always acquired in the order
//! connection, write, read.
//!
//! ```text
//!           open() ok
//!   .--------. ------> .------.
//!   | Closed |         | Open |
//!   '--------' <------ '------'
//!           close() ok
//! ```

mod orchestrator;

use std::{
    fmt,
    io::{self, Read},
    sync::{
        mpsc::{self, SendError, Sender},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
    thread::{self, JoinHandle},
};

use log::{error, info};

use crate::{
    error::{Error, Result},
    selector::TransportSelector,
    settings::{ConnectionConfig, DataBits, Parity, StopBits, TransportPolicy},
    transport::{ReadListener, Transport},
    upload::{
        BoardProfile, CancelToken, FirmwareSource, RawImageUploader, UploadCallback,
        UploadError, UploadReporter, Uploader,
    },
};

/// Driver name reported while closed.
pub const NO_DRIVER: &str = "None";
/// Physical connection name reported while closed.
pub const NO_PHYSICAL_CONNECTION: &str = "No Physical Connection";

// =============================================================================
// Public Interface
// =============================================================================

/// The single entry point to a board.
pub struct Connection {
    shared: Arc<Shared>,
    upload: Mutex<Option<UploadTask>>,
}

impl Connection {
    /// Connection selecting among the host's transports according to
    /// `policy`, uploading with the [`RawImageUploader`].
    pub fn new(policy: TransportPolicy) -> Self {
        Self::with_parts(
            TransportSelector::system(policy),
            Arc::new(RawImageUploader::new()),
        )
    }

    pub fn with_parts(selector: TransportSelector, uploader: Arc<dyn Uploader>) -> Self {
        Connection {
            shared: Arc::new(Shared {
                connection: RwLock::new(None),
                write: Mutex::new(()),
                read: Mutex::new(()),
                selector,
                uploader,
            }),
            upload: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &TransportPolicy {
        self.shared.selector.policy()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Open with the default line configuration.
    pub fn open(&self) -> Result<()> {
        self.open_with(&ConnectionConfig::default())
    }

    /// Open the connection and apply `config`. Succeeds without effect when
    /// already open.
    pub fn open_with(&self, config: &ConnectionConfig) -> Result<()> {
        let mut slot = self.shared.connection();
        if slot.as_ref().map_or(false, |t| t.is_open()) {
            return Ok(());
        }

        let mut transport = match slot.take() {
            Some(transport) => transport,
            None => self.shared.selector.select().ok_or(Error::NoTransport)?,
        };
        transport.open()?;
        if let Err(e) = transport.set_config(config) {
            let _ = transport.close();
            return Err(e);
        }
        info!(
            "Opened {} connection ({})",
            transport.physical_kind(),
            transport.driver_name()
        );
        *slot = Some(transport);
        Ok(())
    }

    /// Close the connection. Closing a closed connection succeeds without
    /// touching any transport; a failed close leaves the connection open.
    pub fn close(&self) -> Result<()> {
        let mut slot = self.shared.connection();
        if let Some(transport) = slot.as_mut() {
            transport.close()?;
            info!("Closed {} connection", transport.physical_kind());
            *slot = None;
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        open_transport(&self.shared.connection_shared()).is_some()
    }

    // -------------------------------------------------------------------------
    // Data
    // -------------------------------------------------------------------------

    /// Read buffered bytes into `buf`. Returns 0 when closed.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let slot = self.shared.connection_shared();
        let _read = self.shared.read();
        match open_transport(&slot) {
            Some(transport) => transport.read(buf),
            None => Ok(0),
        }
    }

    /// Write `buf` and return the number of bytes accepted. Returns 0 when
    /// closed.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let slot = self.shared.connection_shared();
        let _write = self.shared.write();
        match open_transport(&slot) {
            Some(transport) => transport.write(buf),
            None => Ok(0),
        }
    }

    /// Register `listener`, called with the number of buffered bytes each
    /// time data arrives.
    pub fn add_read_listener<F>(&self, listener: F) -> Result<()>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let slot = self.shared.connection_shared();
        let transport = open_transport(&slot).ok_or(Error::NotOpen)?;
        let listener: ReadListener = Arc::new(listener);
        transport.add_read_listener(listener);
        Ok(())
    }

    pub fn clear_read_listener(&self) {
        if let Some(transport) = open_transport(&self.shared.connection_shared()) {
            transport.clear_read_listener();
        }
    }

    // -------------------------------------------------------------------------
    // Line configuration
    // -------------------------------------------------------------------------

    /// Apply a complete line configuration. Does nothing when closed.
    pub fn set_config(&self, config: &ConnectionConfig) -> Result<()> {
        let mut slot = self.shared.connection();
        match open_transport_mut(&mut slot) {
            Some(transport) => transport.set_config(config),
            None => Ok(()),
        }
    }

    /// The line configuration in effect, `None` when closed.
    pub fn config(&self) -> Option<ConnectionConfig> {
        open_transport(&self.shared.connection_shared()).map(|t| t.config())
    }

    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<()> {
        self.configure(|t| t.set_baud_rate(baud_rate))
    }

    pub fn set_data_bits(&self, data_bits: DataBits) -> Result<()> {
        self.configure(|t| t.set_data_bits(data_bits))
    }

    pub fn set_parity(&self, parity: Parity) -> Result<()> {
        self.configure(|t| t.set_parity(parity))
    }

    pub fn set_stop_bits(&self, stop_bits: StopBits) -> Result<()> {
        self.configure(|t| t.set_stop_bits(stop_bits))
    }

    pub fn set_dtr_rts(&self, dtr_on: bool, rts_on: bool) -> Result<()> {
        self.configure(|t| t.set_dtr_rts(dtr_on, rts_on))
    }

    /// Set DTR to the default of the connected device.
    pub fn set_auto_dtr(&self) -> Result<()> {
        self.configure(|t| t.set_auto_dtr())
    }

    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------

    pub fn driver_name(&self) -> String {
        open_transport(&self.shared.connection_shared())
            .map_or_else(|| NO_DRIVER.to_owned(), |t| t.driver_name().to_owned())
    }

    /// "USB", "WiFi" or "BlueTooth".
    pub fn physical_connection_name(&self) -> String {
        open_transport(&self.shared.connection_shared()).map_or_else(
            || NO_PHYSICAL_CONNECTION.to_owned(),
            |t| t.physical_kind().name().to_owned(),
        )
    }

    /// 1 for USB, 2 for WiFi, 3 for Bluetooth, 0 when closed.
    pub fn physical_connection_type(&self) -> u8 {
        open_transport(&self.shared.connection_shared()).map_or(0, |t| t.physical_kind().code())
    }

    pub fn vendor_id(&self) -> u16 {
        open_transport(&self.shared.connection_shared()).map_or(0, |t| t.vendor_id())
    }

    pub fn product_id(&self) -> u16 {
        open_transport(&self.shared.connection_shared()).map_or(0, |t| t.product_id())
    }

    // -------------------------------------------------------------------------
    // Upload
    // -------------------------------------------------------------------------

    /// Upload a firmware image in the background.
    ///
    /// Returns immediately; the outcome is reported through `callback`. The
    /// connection does not need to be open: a transport is then selected for
    /// the upload and released afterwards. An unreadable `firmware` is
    /// reported as [`UploadError::FileOpen`](crate::UploadError::FileOpen)
    /// before this returns.
    ///
    /// Only one upload may run at a time.
    pub fn upload(
        &self,
        board: BoardProfile,
        firmware: FirmwareSource,
        callback: Option<Box<dyn UploadCallback>>,
    ) {
        let mut reporter = UploadReporter::new(callback);
        let firmware = match firmware.open() {
            Ok(firmware) => firmware,
            Err(e) => {
                reporter.finish(&Err(e));
                return;
            }
        };

        // The job only moves to the thread once it is running, so a failed
        // spawn can still be reported.
        let (jobs, job) = mpsc::channel::<UploadJob>();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("upload".into())
            .spawn(move || {
                if let Ok(UploadJob {
                    mut firmware,
                    mut reporter,
                }) = job.recv()
                {
                    let result =
                        orchestrator::run(&shared, &board, &mut *firmware, &mut reporter, &token);
                    reporter.finish(&result);
                }
            });

        if let Some(handle) = hand_off(spawned, &jobs, UploadJob { firmware, reporter }) {
            *self.upload.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(UploadTask { cancel, handle });
        }
    }

    /// Ask the running upload to stop. The uploader notices it at its next
    /// step and reports the cancellation.
    pub fn cancel_upload(&self) {
        if let Some(task) = self
            .upload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            info!("Canceling upload");
            task.cancel.cancel();
        }
    }

    pub fn is_uploading(&self) -> bool {
        self.upload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |task| !task.handle.is_finished())
    }

    /// Block until the last upload started has finished and its callback
    /// events have been delivered.
    pub fn wait_for_upload(&self) {
        let task = self
            .upload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if task.handle.join().is_err() {
                error!("the upload thread panicked");
            }
        }
    }

    // -------------------------------------------------------------------------

    fn configure<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Transport) -> Result<()>,
    {
        let mut slot = self.shared.connection();
        let transport = open_transport_mut(&mut slot).ok_or(Error::NotOpen)?;
        apply(&mut **transport)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("policy", self.policy())
            .field("open", &self.is_open())
            .field("uploading", &self.is_uploading())
            .finish()
    }
}

// =============================================================================
// Private stuff
// =============================================================================

type Slot = Option<Box<dyn Transport>>;

/// State shared with the upload thread.
struct Shared {
    connection: RwLock<Slot>,
    write: Mutex<()>,
    read: Mutex<()>,
    selector: TransportSelector,
    uploader: Arc<dyn Uploader>,
}

impl Shared {
    fn connection(&self) -> RwLockWriteGuard<'_, Slot> {
        self.connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn connection_shared(&self) -> RwLockReadGuard<'_, Slot> {
        self.connection.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> MutexGuard<'_, ()> {
        self.write.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> MutexGuard<'_, ()> {
        self.read.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct UploadTask {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

/// What the upload thread needs besides the connection.
struct UploadJob {
    firmware: Box<dyn Read + Send>,
    reporter: UploadReporter,
}

/// Pass `job` to a freshly spawned upload thread. When there is no thread to
/// run it, the failure goes to the job's callback.
fn hand_off(
    spawned: io::Result<JoinHandle<()>>,
    jobs: &Sender<UploadJob>,
    job: UploadJob,
) -> Option<JoinHandle<()>> {
    let failure = match spawned {
        Ok(handle) => match jobs.send(job) {
            Ok(()) => return Some(handle),
            Err(SendError(job)) => (job, "upload thread exited early".to_owned()),
        },
        Err(e) => (job, format!("cannot start the upload thread: {}", e)),
    };
    let (mut job, reason) = failure;
    error!("{}", reason);
    job.reporter.finish(&Err(UploadError::Protocol(reason)));
    None
}

fn open_transport(slot: &Slot) -> Option<&Box<dyn Transport>> {
    slot.as_ref().filter(|t| t.is_open())
}

fn open_transport_mut(slot: &mut Slot) -> Option<&mut Box<dyn Transport>> {
    slot.as_mut().filter(|t| t.is_open())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Errors(Arc<Mutex<Vec<UploadError>>>);

    impl UploadCallback for Errors {
        fn on_error(&mut self, error: UploadError) {
            self.0.lock().unwrap().push(error);
        }
    }

    fn job() -> (UploadJob, Arc<Mutex<Vec<UploadError>>>) {
        let errors = Arc::new(Mutex::new(vec![]));
        let job = UploadJob {
            firmware: Box::new(io::empty()),
            reporter: UploadReporter::new(Some(Box::new(Errors(errors.clone())))),
        };
        (job, errors)
    }

    #[test]
    fn failed_spawn_reaches_the_callback() {
        let (jobs, _job) = mpsc::channel();
        let (job, errors) = job();
        let spawned = Err(io::Error::new(io::ErrorKind::Other, "no more threads"));

        assert!(hand_off(spawned, &jobs, job).is_none());
        assert_eq!(
            *errors.lock().unwrap(),
            vec![UploadError::Protocol(
                "cannot start the upload thread: no more threads".into()
            )]
        );
    }

    #[test]
    fn running_thread_gets_the_job() {
        let (jobs, job_rx) = mpsc::channel::<UploadJob>();
        let (job, errors) = job();
        let spawned = thread::Builder::new().spawn(move || {
            let mut job = job_rx.recv().unwrap();
            job.reporter.finish(&Ok(crate::UploadOutcome::Completed));
        });

        let handle = hand_off(spawned, &jobs, job).expect("thread running");
        handle.join().unwrap();
        assert!(errors.lock().unwrap().is_empty());
    }
}
