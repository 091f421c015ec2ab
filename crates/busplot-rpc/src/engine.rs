//! The receive engine.
//!
//! One engine owns one link. `connect` attaches a transport, `start_receiving`
//! moves the dispatch table into a dedicated worker thread that scans frames
//! and invokes handlers in arrival order, and `request` writes frames from
//! any thread while the worker reads.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use busplot_frame::{Discard, FrameScanner, FrameWriter, Message, ScanEvent, ScanStats};
use busplot_transport::{SerialConfig, Transport, TransportError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::dispatch::DispatchTable;
use crate::error::{Result, RpcError};

/// Why a receive worker stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ScanExit {
    /// `stop` or `close` was called.
    Stopped,
    /// The transport closed or failed.
    ConnectionLost(String),
    /// Too many reads failed in a row.
    TooManyReadErrors(u32),
}

impl fmt::Display for ScanExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanExit::Stopped => f.write_str("stopped"),
            ScanExit::ConnectionLost(reason) => write!(f, "connection lost: {reason}"),
            ScanExit::TooManyReadErrors(n) => write!(f, "{n} consecutive read errors"),
        }
    }
}

/// Summary of one receive session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub frames: u64,
    pub unknown_command: u64,
    pub size_mismatch: u64,
    pub checksum_mismatch: u64,
    pub read_failures: u64,
    pub bytes_skipped: u64,
    /// Frames whose handler returned an error.
    pub handler_failures: u64,
    pub exit: ScanExit,
}

impl ScanReport {
    pub fn new(stats: ScanStats, handler_failures: u64, exit: ScanExit) -> Self {
        Self {
            frames: stats.frames,
            unknown_command: stats.unknown_command,
            size_mismatch: stats.size_mismatch,
            checksum_mismatch: stats.checksum_mismatch,
            read_failures: stats.read_failures,
            bytes_skipped: stats.bytes_skipped,
            handler_failures,
            exit,
        }
    }

    /// Frames dropped for any framing reason.
    pub fn discarded(&self) -> u64 {
        self.unknown_command + self.size_mismatch + self.checksum_mismatch + self.read_failures
    }
}

enum TableSlot {
    Open(DispatchTable),
    Frozen(Arc<DispatchTable>),
}

impl TableSlot {
    fn freeze(&mut self) -> Arc<DispatchTable> {
        let table = match self {
            TableSlot::Frozen(table) => return Arc::clone(table),
            TableSlot::Open(table) => Arc::new(std::mem::take(table)),
        };
        *self = TableSlot::Frozen(Arc::clone(&table));
        table
    }
}

/// Scans a transport on a worker thread and dispatches decoded messages.
pub struct RpcEngine {
    config: EngineConfig,
    table: TableSlot,
    transport: Option<Arc<dyn Transport>>,
    writer: Option<FrameWriter>,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<ScanReport>>,
    last_report: Option<ScanReport>,
}

impl RpcEngine {
    pub fn new(table: DispatchTable) -> Self {
        Self::with_config(table, EngineConfig::default())
    }

    pub fn with_config(table: DispatchTable, config: EngineConfig) -> Self {
        Self {
            config,
            table: TableSlot::Open(table),
            transport: None,
            writer: None,
            connected: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            last_report: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mutable access to the dispatch table while registration is open.
    pub fn dispatch_table_mut(&mut self) -> Result<&mut DispatchTable> {
        match &mut self.table {
            TableSlot::Open(table) => Ok(table),
            TableSlot::Frozen(_) => Err(RpcError::RegistrationClosed),
        }
    }

    /// Register a typed handler. Closed once receiving has started.
    pub fn register<M, F>(&mut self, handler: F) -> Result<()>
    where
        M: Message,
        F: Fn(M) + Send + Sync + 'static,
    {
        self.dispatch_table_mut()?.register(handler)
    }

    /// Attach a transport, replacing and closing any previous one.
    ///
    /// Fails with [`RpcError::AlreadyReceiving`] while a worker is running.
    pub fn connect(&mut self, transport: Arc<dyn Transport>) -> Result<()> {
        self.reap_finished_worker()?;
        if self.worker.is_some() {
            return Err(RpcError::AlreadyReceiving);
        }
        if !transport.is_open() {
            return Err(TransportError::Closed.into());
        }
        if let Some(previous) = self.transport.take() {
            previous.close();
        }

        info!(endpoint = transport.name(), "connected");
        self.writer = Some(FrameWriter::new(Arc::clone(&transport)));
        self.transport = Some(transport);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Open and attach a serial device.
    #[cfg(unix)]
    pub fn connect_serial(&mut self, config: &SerialConfig) -> Result<()> {
        let port = busplot_transport::SerialPort::open(config)?;
        self.connect(Arc::new(port))
    }

    /// Open and attach a serial device.
    #[cfg(not(unix))]
    pub fn connect_serial(&mut self, config: &SerialConfig) -> Result<()> {
        Err(TransportError::InvalidConfig(format!(
            "serial device {} needs a Unix host",
            config.device.display()
        ))
        .into())
    }

    /// Start the receive worker. Freezes the dispatch table.
    pub fn start_receiving(&mut self) -> Result<()> {
        self.reap_finished_worker()?;
        if self.worker.is_some() {
            return Err(RpcError::AlreadyReceiving);
        }
        let transport = match &self.transport {
            Some(transport) if self.connected.load(Ordering::SeqCst) => Arc::clone(transport),
            _ => return Err(RpcError::NotConnected),
        };

        let table = self.table.freeze();
        let stop = Arc::new(AtomicBool::new(false));
        self.stop = Arc::clone(&stop);
        let session = Session {
            transport,
            table,
            connected: Arc::clone(&self.connected),
            stop,
            max_consecutive_read_errors: self.config.max_consecutive_read_errors,
        };

        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || session.run())
            .map_err(RpcError::WorkerSpawn)?;
        info!(thread = %self.config.thread_name, "receiving started");
        self.worker = Some(handle);
        Ok(())
    }

    /// Signal the worker to exit and close the transport.
    ///
    /// Does not wait for the worker; safe to call without a prior start.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(transport) = &self.transport {
            transport.close();
        }
        self.connected.store(false, Ordering::SeqCst);
        if self.worker.is_some() {
            info!("receiving stopped");
        }
    }

    /// Stop, wait for the worker and release the transport.
    pub fn close(&mut self) -> Result<()> {
        self.stop();
        let joined = match self.worker.take() {
            Some(handle) => Self::join_handle(handle).map(|report| {
                self.last_report = Some(report);
            }),
            None => Ok(()),
        };
        self.writer = None;
        if self.transport.take().is_some() {
            debug!("transport released");
        }
        joined
    }

    /// Wait for the worker to finish and return its report.
    pub fn join(&mut self) -> Result<ScanReport> {
        let handle = self.worker.take().ok_or(RpcError::NotReceiving)?;
        let report = Self::join_handle(handle)?;
        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Report of the most recently finished worker.
    pub fn last_report(&self) -> Option<&ScanReport> {
        self.last_report.as_ref()
    }

    /// Encode and send a message. Callable from any thread.
    pub fn request<M: Message>(&self, message: &M) -> Result<usize> {
        Ok(self.writer()?.send(message)?)
    }

    /// Send a raw body for `command`.
    pub fn request_raw(&self, command: u16, body: &[u8]) -> Result<usize> {
        Ok(self.writer()?.send_raw(command, body)?)
    }

    /// A writer handle that outlives borrows of the engine.
    pub fn writer(&self) -> Result<FrameWriter> {
        self.writer.clone().ok_or(RpcError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_receiving(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn reap_finished_worker(&mut self) -> Result<()> {
        if self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
            self.join()?;
        }
        Ok(())
    }

    fn join_handle(handle: JoinHandle<ScanReport>) -> Result<ScanReport> {
        handle.join().map_err(|_| {
            error!("receive worker panicked");
            RpcError::WorkerPanicked
        })
    }
}

impl Drop for RpcEngine {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(%err, "engine closed with error");
        }
    }
}

impl fmt::Debug for RpcEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcEngine")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("connected", &self.is_connected())
            .field("receiving", &self.is_receiving())
            .finish_non_exhaustive()
    }
}

/// State moved into the receive worker.
struct Session {
    transport: Arc<dyn Transport>,
    table: Arc<DispatchTable>,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    max_consecutive_read_errors: u32,
}

impl Session {
    fn run(self) -> ScanReport {
        let mut scanner = FrameScanner::new();
        let mut handler_failures = 0u64;
        let mut read_errors = 0u32;

        let exit = loop {
            if self.stop.load(Ordering::SeqCst) {
                break ScanExit::Stopped;
            }
            match scanner.step(self.transport.as_ref(), self.table.as_ref()) {
                Ok(ScanEvent::Frame(frame)) => {
                    read_errors = 0;
                    if let Err(err) = self.table.dispatch(&frame) {
                        handler_failures += 1;
                        warn!(command = frame.command(), %err, "handler failed");
                    }
                }
                Ok(ScanEvent::Discarded(Discard::ReadFailed { .. })) => {
                    read_errors += 1;
                    if read_errors > self.max_consecutive_read_errors {
                        error!(
                            endpoint = self.transport.name(),
                            read_errors, "too many consecutive read errors, giving up"
                        );
                        break ScanExit::TooManyReadErrors(read_errors);
                    }
                }
                Ok(ScanEvent::Discarded(_)) => read_errors = 0,
                Err(_) if self.stop.load(Ordering::SeqCst) => break ScanExit::Stopped,
                Err(err) => {
                    error!(endpoint = self.transport.name(), %err, "connection lost");
                    break ScanExit::ConnectionLost(err.to_string());
                }
            }
        };

        self.transport.close();
        self.connected.store(false, Ordering::SeqCst);
        let report = ScanReport::new(scanner.stats(), handler_failures, exit);
        info!(
            frames = report.frames,
            discarded = report.discarded(),
            exit = %report.exit,
            "receive worker finished"
        );
        report
    }
}
