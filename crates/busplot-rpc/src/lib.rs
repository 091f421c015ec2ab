//! Command dispatch and the receive engine for the busplot serial protocol.
//!
//! This is the application-facing layer. Register handlers per message type,
//! connect a transport, start receiving, and send requests from any thread:
//!
//! ```no_run
//! use busplot_frame::UpdateVariable;
//! use busplot_rpc::{DispatchTable, RpcEngine};
//! use busplot_transport::SerialConfig;
//!
//! let mut table = DispatchTable::new();
//! table.register(|msg: UpdateVariable| println!("{} = {}", msg.variable_id, msg.value))?;
//!
//! let mut engine = RpcEngine::new(table);
//! engine.connect_serial(&SerialConfig::new("/dev/ttyUSB0"))?;
//! engine.start_receiving()?;
//! let report = engine.join()?;
//! println!("{} frames", report.frames);
//! # Ok::<(), busplot_rpc::RpcError>(())
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod sink;

pub use config::EngineConfig;
pub use dispatch::{DispatchEntry, DispatchTable, Handler, TypedHandler};
pub use engine::{RpcEngine, ScanExit, ScanReport};
pub use error::{Result, RpcError};
pub use sink::{now_micros, register_series_sink, Sample, Series, SeriesSink, SeriesStore};
