//! Error taxonomy for the tracker driver.
//!
//! Transport and protocol failures abort the operation that raised them.
//! Data and resolution failures are per-cycle and only ever logged by the
//! tracking loop.

use thiserror::Error;

use crate::driver::DriverState;

#[derive(Error, Debug)]
pub enum TransportError{
    #[error("failed to open serial device {path}: {source}")]
    Open{
        path: String,
        #[source]
        source: serialport::Error,
    },
    #[error("failed to configure serial line: {0}")]
    Configure(String),
    #[error("failed to write command {command:?}: {source}")]
    Write{
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read reply: {0}")]
    Read(#[from] std::io::Error),
    #[error("reply exceeded the {capacity} byte receive buffer")]
    Overflow{ capacity: usize },
    #[error("transport was closed")]
    Closed,
    #[error("transport is not open")]
    NotOpen,
    #[error("no reply within {0} ms")]
    TimedOut(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError{
    #[error("{command:?} expected {expected:?}, device replied {reply:?}")]
    UnexpectedReply{
        command: String,
        expected: String,
        reply: String,
    },
    #[error("{command:?} rejected by device with error code {code}")]
    DeviceError{
        command: String,
        code: String,
    },
    #[error("reply CRC mismatch: expected {expected:04X}, computed {actual:04X}")]
    Crc{ expected: u16, actual: u16 },
    #[error("malformed {what}: {detail}")]
    Malformed{
        what: &'static str,
        detail: String,
    },
}

impl ProtocolError{
    pub(crate) fn malformed(what: &'static str, detail: impl Into<String>) -> Self{
        ProtocolError::Malformed{ what, detail: detail.into() }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError{
    #[error("port handle {0} is not registered")]
    UnknownHandle(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError{
    #[error("reference frame {0:?} was not found among tracked tools")]
    ReferenceNotFound(String),
    #[error("tip {0:?} was not found among tracked tools")]
    TipNotFound(String),
}

#[derive(Error, Debug)]
pub enum DriverError{
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("cannot {operation} while {state:?}")]
    InvalidState{
        operation: &'static str,
        state: DriverState,
    },
    #[error("configuration failed: {0}")]
    ConfigurationFailed(#[source] Box<DriverError>),
}

#[derive(Error, Debug)]
pub enum ConfigError{
    #[error("failed to read {path}: {source}")]
    Io{
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type Result<T, E = DriverError> = std::result::Result<T, E>;
