//! Shared runtime configuration.
//!
//! This module introduces types to facilitate the configuration of the worker
//! server and the dispatch driver.
//!
//! # Features:
//! - [`Config`]: Options both sides of a connection must agree on. It's
//!   adorned with [`clap`] attributes to allow easy setup via command-line
//!   arguments.
//! - [`WorkerConfig`]: Where a worker server listens.
//! - [`DriverConfig`]: Which workers a driver dispatches to, and how long it
//!   waits for their results.
//! - [`Serializer`]: Specifies the serialization format to use.
//!
//! # Usage:
//! The `worker` and `orchestrator` binaries flatten these structs into their
//! own CLI. [`WorkerConfig`] is consumed by
//! [`WorkerServer::new`](crate::worker::WorkerServer::new) and
//! [`DriverConfig`] by [`Driver::new`](crate::driver::Driver::new).
//!
//! # Port convention
//! A worker receives jobs on its control port and sends results to the
//! control port plus one. Each worker therefore reserves two consecutive
//! ports.
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use clap::{Args, ValueEnum};

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 7070;
pub const DEFAULT_CHUNK_COUNT: usize = 10;
pub const DEFAULT_RESULT_TIMEOUT_SECS: u64 = 30;
/// Upper bound on a single wire frame.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;
const HELP_HEADING: &str = "Scatterfold options";

/// Offset between a worker's control port and its response port.
pub const RESPONSE_PORT_OFFSET: u16 = 1;

/// Returns the response port paired with `control_port`.
pub fn response_port(control_port: u16) -> Result<u16> {
    control_port.checked_add(RESPONSE_PORT_OFFSET).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "control port {control_port} leaves no room for a response port"
        ))
    })
}

/// Options shared by the worker server and the driver.
#[derive(Args, Clone, PartialEq, Eq, Debug)]
pub struct Config {
    /// Determines the serialization format to be used.
    #[arg(long, short, help_heading = HELP_HEADING, env = "SCATTERFOLD_SERIALIZER", value_enum, default_value_t = Serializer::Postcard)]
    pub serializer: Serializer,

    /// Largest accepted wire frame in bytes.
    #[arg(long, help_heading = HELP_HEADING, default_value_t = DEFAULT_MAX_FRAME_LENGTH)]
    pub max_frame_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serializer: Default::default(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

/// Worker server configuration.
#[derive(Args, Clone, PartialEq, Eq, Debug)]
pub struct WorkerConfig {
    #[command(flatten)]
    pub common: Config,

    /// Address the control port binds to.
    #[arg(long, help_heading = HELP_HEADING, env = "SCATTERFOLD_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Port on which jobs are received. Results are sent to this port plus
    /// one on the dispatching host.
    #[arg(long, short, help_heading = HELP_HEADING, env = "SCATTERFOLD_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            common: Default::default(),
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

impl WorkerConfig {
    /// A worker bound to the loopback interface on `port`.
    pub fn local(port: u16) -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            ..Default::default()
        }
    }

    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Driver configuration.
#[derive(Args, Clone, PartialEq, Eq, Debug)]
pub struct DriverConfig {
    #[command(flatten)]
    pub common: Config,

    /// Control endpoints of the workers, comma separated. Chunks are assigned
    /// to them round-robin.
    #[arg(long = "worker", help_heading = HELP_HEADING, env = "SCATTERFOLD_WORKERS", value_delimiter = ',', default_value = "127.0.0.1:7070")]
    pub workers: Vec<SocketAddr>,

    /// Number of chunks the input is split into.
    #[arg(long, short, help_heading = HELP_HEADING, env = "SCATTERFOLD_CHUNKS", default_value_t = DEFAULT_CHUNK_COUNT)]
    pub chunks: usize,

    /// Address the response listeners bind to.
    #[arg(long, help_heading = HELP_HEADING, env = "SCATTERFOLD_REPLY_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub reply_bind: IpAddr,

    /// Seconds to wait for every chunk result before failing the call.
    #[arg(long, help_heading = HELP_HEADING, env = "SCATTERFOLD_RESULT_TIMEOUT", default_value_t = DEFAULT_RESULT_TIMEOUT_SECS)]
    pub result_timeout_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            common: Default::default(),
            workers: vec![SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                DEFAULT_PORT,
            )],
            chunks: DEFAULT_CHUNK_COUNT,
            reply_bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            result_timeout_secs: DEFAULT_RESULT_TIMEOUT_SECS,
        }
    }
}

impl DriverConfig {
    /// A driver talking to a single worker on the loopback interface.
    pub fn local(base_port: u16, chunks: usize) -> Self {
        Self {
            workers: vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), base_port)],
            chunks,
            reply_bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..Default::default()
        }
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }
}

/// Enumerates the available serialization formats.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum, Default)]
pub enum Serializer {
    #[default]
    Postcard,
    Cbor,
}
