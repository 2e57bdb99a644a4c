//! Configuration loading

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::driver::DriverSettings;
use crate::error::ConfigError;
use crate::serial::{DEFAULT_BAUD, TRACKING_BAUD};
use crate::transform::DEFAULT_TIP_FRAME;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig{
    /// Serial device the tracker is attached to
    #[serde(default = "default_device_path")]
    pub device_path: String,
    /// Name of the tool every transform is expressed against
    #[serde(default = "default_reference_frame")]
    pub reference_frame: String,
    #[serde(default = "default_tip_frame")]
    pub tip_frame: String,
    #[serde(default = "default_initial_baud")]
    pub initial_baud: u32,
    #[serde(default = "default_tracking_baud")]
    pub tracking_baud: u32,
    /// Fail reads after this long; unset blocks until the device answers
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    /// Check the CRC the tracker appends to every reply
    #[serde(default)]
    pub verify_crc: bool,
    /// Tick period of the standalone runner
    #[serde(default = "default_update_period")]
    pub update_period_ms: u64,
    #[serde(default, rename = "port")]
    pub ports: Vec<PortAssignment>,
}

/// Operator name for a port handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAssignment{
    pub handle: String,
    pub name: String,
}

fn default_device_path() -> String{
    "/dev/ttyUSB0".to_string()
}

fn default_reference_frame() -> String{
    "reference".to_string()
}

fn default_tip_frame() -> String{
    DEFAULT_TIP_FRAME.to_string()
}

fn default_initial_baud() -> u32{
    DEFAULT_BAUD
}

fn default_tracking_baud() -> u32{
    TRACKING_BAUD
}

fn default_update_period() -> u64{
    10
}

impl Default for DriverConfig{
    fn default() -> Self{
        DriverConfig{
            device_path: default_device_path(),
            reference_frame: default_reference_frame(),
            tip_frame: default_tip_frame(),
            initial_baud: default_initial_baud(),
            tracking_baud: default_tracking_baud(),
            read_timeout_ms: None,
            verify_crc: false,
            update_period_ms: default_update_period(),
            ports: Vec::new(),
        }
    }
}

impl DriverConfig{
    pub fn settings(&self) -> DriverSettings{
        DriverSettings{
            device_path: self.device_path.clone(),
            reference_frame: self.reference_frame.clone(),
            tip_frame: self.tip_frame.clone(),
            initial_baud: self.initial_baud,
            tracking_baud: self.tracking_baud,
            verify_crc: self.verify_crc,
        }
    }

    pub fn read_timeout(&self) -> Option<Duration>{
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn update_period(&self) -> Duration{
        Duration::from_millis(self.update_period_ms)
    }
}

pub fn parse_config(content: &str) -> Result<DriverConfig, ConfigError>{
    Ok(toml::from_str(content)?)
}

/// Load configuration from file, or defaults if it does not exist
pub fn load_config(path: &Path) -> Result<DriverConfig, ConfigError>{
    if !path.exists(){
        info!(path = %path.display(), "configuration file not found, using defaults");
        return Ok(DriverConfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io{
        path: path.display().to_string(),
        source,
    })?;
    let config = parse_config(&content)?;
    info!(path = %path.display(), ports = config.ports.len(), "loaded configuration");
    Ok(config)
}
