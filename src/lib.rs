//! Bidirectional UART proxy for inter-chip analysis.
//!
//! Two physical serial devices ("A" and "B") are connected to the host; the
//! proxy sits in the middle, reading bytes from each endpoint and forwarding
//! them to the other, while offering live inspection, on-the-fly payload
//! rewriting, capture to a log, and deterministic replay of previously
//! captured traffic.
//!
//! # Example
//! ```no_run
//! use uart_proxy::{AppConfig, PortConfig, Supervisor};
//!
//! let mut config = AppConfig::default();
//! config.port_a = Some(PortConfig::new("/dev/ttyUSB0", 115_200));
//! config.port_b = Some(PortConfig::new("/dev/ttyUSB1", 115_200));
//!
//! let mut supervisor = Supervisor::new(config);
//! supervisor.start()?;
//! supervisor.stop();
//! # Ok::<(), uart_proxy::Error>(())
//! ```

use thiserror::Error;

pub mod checksum;
pub mod cli;
pub mod config;
pub mod delimiter;
pub mod endpoint;
pub mod relay;
pub mod replay;
pub mod rewrite;
pub mod supervisor;
pub mod tee;

pub use checksum::ChecksumMethod;
pub use config::{AppConfig, Direction, PortConfig, SubstitutionTable};
pub use delimiter::{DelimiterMatcher, MatchResult};
pub use endpoint::SerialEndpoint;
pub use relay::RelayEngine;
pub use replay::ReplayEngine;
pub use rewrite::PatternRewriter;
pub use supervisor::{EngineState, Supervisor};
pub use tee::Tee;

/// Errors surfaced by the proxy core.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("operation not permitted while the relay is running")]
    Busy,
    #[error("the relay must be running for this operation")]
    NotRunning,
    #[error("could not open device {device:?}: {source}")]
    DeviceOpen {
        device: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error on device {device:?}: {source}")]
    DeviceIo {
        device: String,
        #[source]
        source: std::io::Error,
    },
    #[error("capture error: {0}")]
    Capture(String),
    #[error("a capture is already open")]
    CaptureAlreadyOpen,
    #[error("could not parse capture file: {0}")]
    ReplayParse(String),
    #[error("could not determine replay direction")]
    ReplayDirectionUnknown,
}

pub type Result<T> = std::result::Result<T, Error>;
