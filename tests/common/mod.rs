//! Scripted doubles shared by the integration tests.
//!
//! * [`MockTransport`] records every call it gets in a shared log and serves
//!   bytes pushed through its [`MockState`].
//! * [`MockEnvironment`] and [`MockFactory`] stand in for the host system when
//!   building a [`TransportSelector`].
//! * [`Recorder`] collects the upload events as [`Ev`] values.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io::Read,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use boardlink::{
    BoardProfile, CancelToken, ConnectionConfig, DeviceDescriptor, DriverKind, Environment,
    PhysicalKind, ReadListener, Result, Transport, TransportFactory, TransportPolicy,
    TransportSelector, UploadCallback, UploadError, UploadOutcome, UploadReporter, Uploader,
    UsbInterface, WifiParams,
};

/// Ordered record of calls, shared by all the doubles of a test.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(vec![]))
}

pub fn entries(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

// =============================================================================
// Transport
// =============================================================================

/// The observable state of a [`MockTransport`], kept by the test after the
/// transport itself moved into the code under test.
pub struct MockState {
    pub name: String,
    log: CallLog,
    incoming: Mutex<VecDeque<u8>>,
    written: Mutex<Vec<u8>>,
    listener: Mutex<Option<ReadListener>>,
    suspended: AtomicBool,
    open: AtomicBool,
    pub fail_open: AtomicBool,
    pub fail_close: AtomicBool,
    /// Answer "OK" once four bytes (the image size) have been written.
    pub acknowledge: AtomicBool,
    config: Mutex<ConnectionConfig>,
}

impl MockState {
    pub fn new(name: &str, log: CallLog) -> Arc<Self> {
        Arc::new(MockState {
            name: name.to_owned(),
            log,
            incoming: Mutex::new(VecDeque::new()),
            written: Mutex::new(vec![]),
            listener: Mutex::new(None),
            suspended: AtomicBool::new(false),
            open: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            acknowledge: AtomicBool::new(false),
            config: Mutex::new(ConnectionConfig::default()),
        })
    }

    fn record(&self, call: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}: {}", self.name, call));
    }

    /// Bytes arriving from the board.
    pub fn receive(&self, bytes: &[u8]) {
        let len = {
            let mut incoming = self.incoming.lock().unwrap();
            incoming.extend(bytes);
            incoming.len()
        };
        if !self.suspended.load(Ordering::SeqCst) {
            if let Some(listener) = self.listener.lock().unwrap().clone() {
                listener(len);
            }
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// The board goes away: the transport reports closed from now on.
    pub fn lose_link(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> ConnectionConfig {
        *self.config.lock().unwrap()
    }
}

pub struct MockTransport {
    pub state: Arc<MockState>,
    kind: PhysicalKind,
    driver: &'static str,
    vendor_id: u16,
    product_id: u16,
    default_dtr: bool,
}

impl MockTransport {
    pub fn new(state: Arc<MockState>, kind: PhysicalKind, driver: &'static str) -> Self {
        MockTransport {
            state,
            kind,
            driver,
            vendor_id: 0,
            product_id: 0,
            default_dtr: false,
        }
    }

    pub fn usb(
        state: Arc<MockState>,
        driver: &'static str,
        vendor_id: u16,
        product_id: u16,
        default_dtr: bool,
    ) -> Self {
        MockTransport {
            vendor_id,
            product_id,
            default_dtr,
            ..Self::new(state, PhysicalKind::Usb, driver)
        }
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        self.state.record("open");
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(boardlink::Error::PortNotFound(self.state.name.clone()));
        }
        self.state.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.record("close");
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(boardlink::Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "stuck",
            )));
        }
        self.state.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut incoming = self.state.incoming.lock().unwrap();
        let n = buf.len().min(incoming.len());
        for (slot, byte) in buf.iter_mut().zip(incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        if !self.is_open() {
            return Ok(0);
        }
        let total = {
            let mut written = self.state.written.lock().unwrap();
            written.extend_from_slice(buf);
            written.len()
        };
        if self.state.acknowledge.load(Ordering::SeqCst) && total >= 4 && total - buf.len() < 4 {
            self.state.incoming.lock().unwrap().extend(b"OK");
        }
        Ok(buf.len())
    }

    fn set_config(&mut self, config: &ConnectionConfig) -> Result<()> {
        self.state
            .record(&format!("set_config {}", config.baud_rate));
        *self.state.config.lock().unwrap() = *config;
        Ok(())
    }

    fn config(&self) -> ConnectionConfig {
        self.state.config()
    }

    fn add_read_listener(&self, listener: ReadListener) {
        self.state.record("add_read_listener");
        *self.state.listener.lock().unwrap() = Some(listener);
    }

    fn clear_read_listener(&self) {
        self.state.record("clear_read_listener");
        *self.state.listener.lock().unwrap() = None;
    }

    fn stop_read_listener(&self) {
        self.state.record("stop_read_listener");
        self.state.suspended.store(true, Ordering::SeqCst);
    }

    fn start_read_listener(&self) {
        self.state.record("start_read_listener");
        self.state.suspended.store(false, Ordering::SeqCst);
    }

    fn clear_buffer(&self) -> Result<()> {
        self.state.record("clear_buffer");
        self.state.incoming.lock().unwrap().clear();
        Ok(())
    }

    fn physical_kind(&self) -> PhysicalKind {
        self.kind
    }

    fn driver_name(&self) -> &str {
        self.driver
    }

    fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn default_dtr(&self) -> bool {
        self.default_dtr
    }
}

// =============================================================================
// Environment and factory
// =============================================================================

pub struct MockEnvironment {
    pub interfaces: Vec<UsbInterface>,
    pub reachable: bool,
    log: CallLog,
}

impl MockEnvironment {
    pub fn new(interfaces: Vec<UsbInterface>, reachable: bool, log: CallLog) -> Self {
        MockEnvironment {
            interfaces,
            reachable,
            log,
        }
    }
}

impl Environment for MockEnvironment {
    fn usb_interfaces(&self) -> Vec<UsbInterface> {
        self.log.lock().unwrap().push("env: usb_interfaces".into());
        self.interfaces.clone()
    }

    fn network_reachable(&self, host: &str, port: u16) -> bool {
        self.log
            .lock()
            .unwrap()
            .push(format!("env: network_reachable {}:{}", host, port));
        self.reachable
    }
}

/// Builds [`MockTransport`]s. Transports named in `failing` fail to open.
/// USB transports are named after their port, the others `wifi` and
/// `bluetooth`.
pub struct MockFactory {
    log: CallLog,
    failing: Vec<String>,
    failing_close: Vec<String>,
    pub built: Mutex<Vec<Arc<MockState>>>,
}

impl MockFactory {
    pub fn new(log: CallLog, failing: &[&str]) -> Self {
        MockFactory {
            log,
            failing: failing.iter().map(|s| s.to_string()).collect(),
            failing_close: vec![],
            built: Mutex::new(vec![]),
        }
    }

    /// Transports named in `names` fail to close.
    pub fn failing_close(mut self, names: &[&str]) -> Self {
        self.failing_close = names.iter().map(|s| s.to_string()).collect();
        self
    }

    fn state(&self, name: &str) -> Arc<MockState> {
        let state = MockState::new(name, self.log.clone());
        if self.failing.iter().any(|f| f == name) {
            state.fail_open.store(true, Ordering::SeqCst);
        }
        if self.failing_close.iter().any(|f| f == name) {
            state.fail_close.store(true, Ordering::SeqCst);
        }
        self.built.lock().unwrap().push(state.clone());
        state
    }

    /// State of the last transport built.
    pub fn last(&self) -> Option<Arc<MockState>> {
        self.built.lock().unwrap().last().cloned()
    }
}

impl TransportFactory for MockFactory {
    fn usb(
        &self,
        interface: &UsbInterface,
        driver: DriverKind,
        descriptor: &'static DeviceDescriptor,
    ) -> Box<dyn Transport> {
        self.log
            .lock()
            .unwrap()
            .push(format!("factory: usb {} {}", interface.port_name, driver.name()));
        Box::new(MockTransport::usb(
            self.state(&interface.port_name),
            driver.name(),
            interface.vendor_id,
            interface.product_id,
            descriptor.default_dtr,
        ))
    }

    fn wifi(&self, params: &WifiParams) -> Box<dyn Transport> {
        self.log
            .lock()
            .unwrap()
            .push(format!("factory: wifi {}", params.host));
        Box::new(MockTransport::new(
            self.state("wifi"),
            PhysicalKind::Wifi,
            "wifi",
        ))
    }

    fn bluetooth(&self, device_name: Option<&str>) -> Box<dyn Transport> {
        self.log
            .lock()
            .unwrap()
            .push(format!("factory: bluetooth {}", device_name.unwrap_or("-")));
        Box::new(MockTransport::new(
            self.state("bluetooth"),
            PhysicalKind::Bluetooth,
            "bluetooth-spp",
        ))
    }
}

/// Selector over scripted USB interfaces, returning the factory to inspect
/// the transports built.
pub fn selector(
    policy: TransportPolicy,
    interfaces: Vec<UsbInterface>,
    reachable: bool,
    failing: &[&str],
    log: &CallLog,
) -> (TransportSelector, Arc<MockFactory>) {
    let factory = Arc::new(MockFactory::new(log.clone(), failing));
    let environment = Arc::new(MockEnvironment::new(interfaces, reachable, log.clone()));
    (
        TransportSelector::new(policy, environment, factory.clone()),
        factory,
    )
}

/// An Arduino Uno on `/dev/ttyACM0`.
pub fn uno() -> UsbInterface {
    UsbInterface::new("/dev/ttyACM0", 0x2341, 0x0043)
}

// =============================================================================
// Upload
// =============================================================================

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Ev {
    Pre,
    Progress(u32),
    Post(bool),
    Cancel,
    Error(UploadError),
}

/// [`UploadCallback`] collecting the events.
pub struct Recorder {
    events: Arc<Mutex<Vec<Ev>>>,
}

impl Recorder {
    pub fn new() -> (Box<dyn UploadCallback>, Arc<Mutex<Vec<Ev>>>) {
        let events = Arc::new(Mutex::new(vec![]));
        (
            Box::new(Recorder {
                events: events.clone(),
            }),
            events,
        )
    }

    fn push(&self, ev: Ev) {
        self.events.lock().unwrap().push(ev);
    }
}

impl UploadCallback for Recorder {
    fn on_pre_upload(&mut self) {
        self.push(Ev::Pre);
    }

    fn on_uploading(&mut self, progress: u32) {
        self.push(Ev::Progress(progress));
    }

    fn on_post_upload(&mut self, success: bool) {
        self.push(Ev::Post(success));
    }

    fn on_cancel(&mut self) {
        self.push(Ev::Cancel);
    }

    fn on_error(&mut self, error: UploadError) {
        self.push(Ev::Error(error));
    }
}

/// Check that the reported progress never goes backwards.
pub fn assert_progress_non_decreasing(events: &[Ev]) {
    let progress: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            Ev::Progress(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert!(
        progress.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {:?}",
        progress
    );
}

/// Uploader writing the image in `steps` pieces at the board baud rate.
/// Fails with a protocol error after `fail_after` steps when set.
pub struct ScriptedUploader {
    pub steps: u32,
    pub fail_after: Option<u32>,
    log: CallLog,
}

impl ScriptedUploader {
    pub fn new(steps: u32, log: &CallLog) -> Self {
        ScriptedUploader {
            steps,
            fail_after: None,
            log: log.clone(),
        }
    }

    pub fn failing_after(steps: u32, fail_after: u32, log: &CallLog) -> Self {
        ScriptedUploader {
            steps,
            fail_after: Some(fail_after),
            log: log.clone(),
        }
    }
}

impl Uploader for ScriptedUploader {
    fn upload(
        &self,
        board: &BoardProfile,
        firmware: &mut dyn Read,
        transport: &mut dyn Transport,
        reporter: &mut UploadReporter,
        cancel: &CancelToken,
    ) -> std::result::Result<UploadOutcome, UploadError> {
        self.log.lock().unwrap().push("uploader: start".into());
        let mut image = vec![];
        firmware
            .read_to_end(&mut image)
            .map_err(|_| UploadError::FileOpen)?;
        transport.set_baud_rate(board.baud_rate)?;
        reporter.pre_upload();
        for step in 1..=self.steps {
            if cancel.is_canceled() {
                return Ok(UploadOutcome::Canceled);
            }
            if Some(step) == self.fail_after.map(|f| f + 1) {
                return Err(UploadError::Protocol("board said no".into()));
            }
            transport.write(&image)?;
            reporter.uploading(step * 100 / self.steps);
        }
        self.log.lock().unwrap().push("uploader: done".into());
        Ok(UploadOutcome::Completed)
    }
}

/// Uploader reporting some progress, then waiting for the cancel token.
/// Sends on `started` once the transfer is underway.
pub struct BlockingUploader {
    started: Mutex<mpsc::Sender<()>>,
}

impl BlockingUploader {
    pub fn new() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel();
        (
            BlockingUploader {
                started: Mutex::new(tx),
            },
            rx,
        )
    }
}

impl Uploader for BlockingUploader {
    fn upload(
        &self,
        board: &BoardProfile,
        _firmware: &mut dyn Read,
        transport: &mut dyn Transport,
        reporter: &mut UploadReporter,
        cancel: &CancelToken,
    ) -> std::result::Result<UploadOutcome, UploadError> {
        transport.set_baud_rate(board.baud_rate)?;
        reporter.pre_upload();
        reporter.uploading(10);
        let _ = self.started.lock().unwrap().send(());

        let deadline = Instant::now() + Duration::from_secs(10);
        while !cancel.is_canceled() {
            if Instant::now() > deadline {
                return Err(UploadError::Protocol("never canceled".into()));
            }
            thread::sleep(Duration::from_millis(5));
        }
        Ok(UploadOutcome::Canceled)
    }
}
