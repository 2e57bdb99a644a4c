pub mod error;
pub mod serial;
pub mod protocol;
pub mod ports;
pub mod frame;
pub mod transform;
pub mod driver;
pub mod config;
pub mod ffi;

#[cfg(feature = "python")]
pub mod python;

pub use error::{ConfigError, DataError, DriverError, ProtocolError, ResolutionError, TransportError};
pub use serial::{CloseHandle, LineSettings, SerialTransport, Transport};
pub use ports::{Port, PortRegistry};
pub use frame::{parse_tracking_frame, PoseSample, ToolPose, ToolStatus, TrackingFrame};
pub use transform::{
    Clock, FnSink, SystemClock, Timestamp, TransformBuffer, TransformPipeline,
    TransformSink, TransformStamped,
};
pub use driver::{DriverSettings, DriverState, NdiDriver};
pub use config::{load_config, DriverConfig, PortAssignment};
