//! Background reader feeding a transport's ring buffer.

use std::{
    io::{self, Read},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
};

use log::{debug, trace, warn};

use super::ReadListener;
use crate::ring_buffer::RingBuffer;

/// Capacity of the receive buffer of the built-in transports.
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;

const CHUNK_SIZE: usize = 4096;

/// Moves bytes from a [`Read`] source into a [`RingBuffer`] on a dedicated
/// thread and notifies the registered [`ReadListener`].
///
/// The source must have a read timeout: the thread checks for a stop request
/// between reads, and timeouts are simply retried.
pub struct ReadPump {
    buffer: Arc<RingBuffer>,
    shared: Arc<PumpShared>,
    thread: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct PumpShared {
    listener: Mutex<Option<ReadListener>>,
    suspended: AtomicBool,
    running: AtomicBool,
}

impl ReadPump {
    /// Start pumping `source` into a buffer of `capacity` bytes.
    pub fn spawn<R>(name: &str, source: R, capacity: usize) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let buffer = Arc::new(RingBuffer::new(capacity));
        let shared = Arc::new(PumpShared::default());
        shared.running.store(true, Ordering::SeqCst);

        let thread = thread::Builder::new().name(format!("{}-reader", name)).spawn({
            let buffer = Arc::clone(&buffer);
            let shared = Arc::clone(&shared);
            move || pump(source, &buffer, &shared)
        })?;

        Ok(ReadPump {
            buffer,
            shared,
            thread: Some(thread),
        })
    }

    pub fn read(&self, buf: &mut [u8]) -> usize {
        self.buffer.get(buf)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&self) {
        self.buffer.clear();
    }

    pub fn set_listener(&self, listener: Option<ReadListener>) {
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = listener;
    }

    pub fn suspend(&self) {
        self.shared.suspended.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.shared.suspended.store(false, Ordering::SeqCst);
    }

    /// Whether the reader thread is still pumping.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Ask the reader thread to terminate and wait for it.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("reader thread panicked");
            }
        }
    }
}

impl Drop for ReadPump {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pump<R: Read>(mut source: R, buffer: &RingBuffer, shared: &PumpShared) {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    while shared.running.load(Ordering::SeqCst) {
        match source.read(&mut chunk) {
            Ok(0) => {
                debug!("end of stream");
                break;
            }
            Ok(n) => {
                trace!("{} bytes received", n);
                let added = buffer.add(&chunk[..n]);
                if added < n {
                    warn!("receive buffer full, {} bytes dropped", n - added);
                }
                if !shared.suspended.load(Ordering::SeqCst) {
                    let listener = shared
                        .listener
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clone();
                    if let Some(listener) = listener {
                        listener(buffer.len());
                    }
                }
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("read error: {}", e);
                break;
            }
        }
    }
    shared.running.store(false, Ordering::SeqCst);
}

// =============================================================================
// Unit Tests
// =============================================================================
