//! Owns one serial device handle and a dedicated reader thread that
//! delivers received byte chunks to a caller-provided sink. Exposes a
//! synchronous, internally-serialized write operation.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::Error;

const READ_TIMEOUT: Duration = Duration::from_millis(200);
const READ_CHUNK_SIZE: usize = 256;

/// Minimal transport contract a [`SerialEndpoint`] needs: nonblocking-ish
/// reads (bounded by a short timeout so the reader can poll for shutdown)
/// and synchronous writes of arbitrary-length byte sequences. Implemented
/// for `serial2::SerialPort`; test code implements it for an in-memory
/// duplex pipe so the relay/replay engines can be exercised without real
/// hardware.
pub trait PortIo: Send + Sync + 'static {
    fn read(&self, buf: &mut [u8]) -> std::io::Result<usize>;
    fn write_all(&self, buf: &[u8]) -> std::io::Result<()>;
}

impl PortIo for serial2::SerialPort {
    fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        serial2::SerialPort::read(self, buf)
    }

    fn write_all(&self, buf: &[u8]) -> std::io::Result<()> {
        serial2::SerialPort::write_all(self, buf)
    }
}

/// One physical (or simulated) serial endpoint. Exclusively owns its
/// device handle and reader thread.
pub struct SerialEndpoint<T: PortIo = serial2::SerialPort> {
    device: String,
    port: Arc<T>,
    write_lock: Mutex<()>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    completion_rx: Option<mpsc::Receiver<Result<(), Error>>>,
}

impl SerialEndpoint<serial2::SerialPort> {
    /// Opens `device` at `baud` with 8N1, no flow control, and installs the
    /// short read timeout the reader thread polls its shutdown flag with.
    pub fn open(device: &str, baud: u32) -> Result<Self, Error> {
        let mut port = serial2::SerialPort::open(device, baud).map_err(|e| Error::DeviceOpen {
            device: device.to_string(),
            source: e,
        })?;
        port.set_read_timeout(READ_TIMEOUT)
            .map_err(|e| Error::DeviceOpen {
                device: device.to_string(),
                source: e,
            })?;
        Ok(Self::from_transport(device, port))
    }
}

impl<T: PortIo> SerialEndpoint<T> {
    /// Wraps an already-configured transport. Used directly by tests with
    /// an in-memory duplex pipe standing in for real hardware; production
    /// callers go through [`SerialEndpoint::open`].
    pub fn from_transport(device: &str, transport: T) -> Self {
        Self {
            device: device.to_string(),
            port: Arc::new(transport),
            write_lock: Mutex::new(()),
            running: Arc::new(AtomicBool::new(false)),
            reader: None,
            completion_rx: None,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Spawns the reader thread. Every received chunk is delivered to
    /// `on_bytes`. The thread polls `READ_TIMEOUT`-bounded reads against
    /// an internal running flag so it can be stopped cleanly.
    pub fn start(&mut self, on_bytes: impl Fn(&[u8]) + Send + 'static) {
        self.running.store(true, Ordering::SeqCst);
        let port = Arc::clone(&self.port);
        let running = Arc::clone(&self.running);
        let (tx, rx) = mpsc::channel();
        let device = self.device.clone();

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; READ_CHUNK_SIZE];
            let result = loop {
                if !running.load(Ordering::SeqCst) {
                    break Ok(());
                }
                match port.read(&mut buf) {
                    Ok(0) => continue,
                    Ok(n) => {
                        log::debug!("{device}: read {n} bytes");
                        on_bytes(&buf[..n]);
                    }
                    Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                        continue;
                    }
                    Err(e) => {
                        log::error!("{device}: read error: {e}");
                        break Err(Error::DeviceIo {
                            device: device.clone(),
                            source: e,
                        });
                    }
                }
            };
            let _ = tx.send(result);
        });

        self.reader = Some(handle);
        self.completion_rx = Some(rx);
    }

    /// Writes `bytes` synchronously. Serialized internally so concurrent
    /// callers never interleave partial writes; callers that need a
    /// chunk's worth of work (delimiter matching, transcript emission, and
    /// the final write) to appear atomic to the wire hold a coarser,
    /// per-output-direction lock of their own around the whole sequence.
    pub fn write(&self, bytes: &[u8]) -> Result<(), Error> {
        let _guard = self.write_lock.lock().expect("endpoint write lock poisoned");
        self.port.write_all(bytes).map_err(|e| Error::DeviceIo {
            device: self.device.clone(),
            source: e,
        })
    }

    /// Stops the reader, joins its thread, and reports whether it exited
    /// due to an I/O error.
    pub fn close(&mut self) -> Result<(), Error> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        if let Some(rx) = self.completion_rx.take()
            && let Ok(result) = rx.try_recv() {
                return result;
            }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl<T: PortIo> Drop for SerialEndpoint<T> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// In-memory transport double for exercising [`SerialEndpoint`] and
/// everything built on it without real hardware. Exposed outside the crate
/// only under the `test-util` feature, which `tests/` enables on itself as
/// a dev-dependency.
#[cfg(any(test, feature = "test-util"))]
pub mod test_support {
    use super::PortIo;
    use std::collections::VecDeque;
    use std::sync::{Arc, Condvar, Mutex};

    /// Shared inbox state for one end of a [`LoopbackPort`] pair. Kept
    /// separate from `LoopbackPort` itself so the forwarder thread can hold
    /// its own `Arc` clone without pinning the `LoopbackPort` value the
    /// caller owns at a strong count above one.
    struct Inbox {
        queue: Mutex<VecDeque<u8>>,
        signal: Condvar,
    }

    /// In-memory duplex byte pipe implementing [`PortIo`], standing in for
    /// a pair of real serial ports in tests.
    pub struct LoopbackPort {
        inbox: Arc<Inbox>,
        outbox: std::sync::mpsc::Sender<Vec<u8>>,
    }

    impl LoopbackPort {
        /// Builds a connected pair. Each side is returned by value: the
        /// background threads that shuttle bytes between them hold only the
        /// shared `Inbox`, never the `LoopbackPort` itself, so callers are
        /// free to move their half into a `SerialEndpoint`.
        pub fn pair() -> (Self, Self) {
            let (tx_a_to_b, rx_a_to_b) = std::sync::mpsc::channel::<Vec<u8>>();
            let (tx_b_to_a, rx_b_to_a) = std::sync::mpsc::channel::<Vec<u8>>();
            let a_inbox = Arc::new(Inbox { queue: Mutex::new(VecDeque::new()), signal: Condvar::new() });
            let b_inbox = Arc::new(Inbox { queue: Mutex::new(VecDeque::new()), signal: Condvar::new() });
            feed_channel_into_inbox(rx_b_to_a, Arc::clone(&a_inbox));
            feed_channel_into_inbox(rx_a_to_b, Arc::clone(&b_inbox));
            (Self { inbox: a_inbox, outbox: tx_a_to_b }, Self { inbox: b_inbox, outbox: tx_b_to_a })
        }
    }

    fn feed_channel_into_inbox(rx: std::sync::mpsc::Receiver<Vec<u8>>, dest: Arc<Inbox>) {
        std::thread::spawn(move || {
            while let Ok(chunk) = rx.recv() {
                let mut queue = dest.queue.lock().unwrap();
                queue.extend(chunk);
                dest.signal.notify_all();
            }
        });
    }

    impl PortIo for LoopbackPort {
        fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
            let mut queue = self.inbox.queue.lock().unwrap();
            if queue.is_empty() {
                let (guard, timeout) = self
                    .inbox
                    .signal
                    .wait_timeout(queue, std::time::Duration::from_millis(50))
                    .unwrap();
                queue = guard;
                if timeout.timed_out() && queue.is_empty() {
                    return Ok(0);
                }
            }
            let n = queue.len().min(buf.len());
            for slot in buf.iter_mut().take(n) {
                *slot = queue.pop_front().unwrap();
            }
            Ok(n)
        }

        fn write_all(&self, buf: &[u8]) -> std::io::Result<()> {
            let _ = self.outbox.send(buf.to_vec());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::LoopbackPort;
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn start_delivers_written_bytes_to_the_sink() {
        let (a, b) = LoopbackPort::pair();
        let mut ep_a = SerialEndpoint::from_transport("A", a);
        let received: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        ep_a.start(move |chunk| received_clone.lock().unwrap().extend_from_slice(chunk));

        let ep_b = SerialEndpoint::from_transport("B", b);
        ep_b.write(&[1, 2, 3]).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(150));
        assert_eq!(*received.lock().unwrap(), vec![1, 2, 3]);
        ep_a.close().unwrap();
    }

    #[test]
    fn close_joins_the_reader_thread() {
        let (a, _b) = LoopbackPort::pair();
        let mut ep = SerialEndpoint::from_transport("A", a);
        ep.start(|_| {});
        assert!(ep.is_running());
        ep.close().unwrap();
        assert!(!ep.is_running());
    }
}
