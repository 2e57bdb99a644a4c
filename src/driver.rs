/**
 * NDI tracker driver
 *
 * Lifecycle driven by an external scheduler:
 * 1. configure - open the serial port, run the init sequence
 * 2. start     - begin tracking
 * 3. update    - one TX 0001 frame per tick, published relative to the reference tool
 * 4. stop      - end tracking
 * 5. cleanup   - close the serial port
 *
 * Calls must be serialized by the host. To abort a blocked read, close
 * the transport from another thread (see `SerialTransport::close_handle`).
 */

use serialport::FlowControl;
use tracing::{debug, error, info, warn};

use crate::error::{DriverError, Result};
use crate::frame::parse_tracking_frame;
use crate::ports::PortRegistry;
use crate::protocol::{
    initialize, Command, CommandChannel, InitOptions, OKAY_REPLY, TSTOP_REPLY,
};
use crate::serial::{LineSettings, Transport, DEFAULT_BAUD, TRACKING_BAUD};
use crate::transform::{Clock, TransformPipeline, TransformSink, DEFAULT_TIP_FRAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState{
    Unconfigured,
    Configuring,
    Idle,
    Tracking,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSettings{
    pub device_path: String,
    pub reference_frame: String,
    pub tip_frame: String,
    pub initial_baud: u32,
    pub tracking_baud: u32,
    pub verify_crc: bool,
}

impl DriverSettings{
    pub fn new(device_path: &str, reference_frame: &str) -> Self{
        DriverSettings{
            device_path: device_path.to_string(),
            reference_frame: reference_frame.to_string(),
            tip_frame: DEFAULT_TIP_FRAME.to_string(),
            initial_baud: DEFAULT_BAUD,
            tracking_baud: TRACKING_BAUD,
            verify_crc: false,
        }
    }
}

pub struct NdiDriver<T: Transport>{
    transport: T,
    settings: DriverSettings,
    registry: PortRegistry,
    pipeline: TransformPipeline,
    clock: Box<dyn Clock + Send>,
    sink: Box<dyn TransformSink + Send>,
    state: DriverState,
}

impl<T: Transport> NdiDriver<T>{
    pub fn new(
        transport: T,
        settings: DriverSettings,
        clock: Box<dyn Clock + Send>,
        sink: Box<dyn TransformSink + Send>,
    ) -> Self{
        let pipeline = TransformPipeline::new(&settings.reference_frame).with_tip_frame(&settings.tip_frame);
        NdiDriver{
            transport,
            settings,
            registry: PortRegistry::new(),
            pipeline,
            clock,
            sink,
            state: DriverState::Unconfigured,
        }
    }

    pub fn state(&self) -> DriverState{
        self.state
    }

    pub fn settings(&self) -> &DriverSettings{
        &self.settings
    }

    pub fn registry(&self) -> &PortRegistry{
        &self.registry
    }

    pub fn transport(&self) -> &T{
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T{
        &mut self.transport
    }

    /// Names the tool on `handle`. Allowed in any state.
    pub fn assign_port_name(&mut self, handle: &str, name: &str){
        self.registry.assign(handle, name);
    }

    fn require(&self, operation: &'static str, allowed: &[DriverState]) -> Result<()>{
        if allowed.contains(&self.state){
            Ok(())
        }else{
            Err(DriverError::InvalidState{ operation, state: self.state })
        }
    }

    fn channel(&mut self) -> CommandChannel<'_, T>{
        CommandChannel::new(&mut self.transport, self.settings.verify_crc)
    }

    /// Opens the device and brings it to tracking-ready. Any failure closes
    /// the transport and leaves the driver unconfigured.
    pub fn configure(&mut self) -> Result<()>{
        self.require("configure", &[DriverState::Unconfigured])?;
        self.state = DriverState::Configuring;

        match self.bring_up(){
            Ok(()) =>{
                info!(ports = self.registry.len(), "tracker configured");
                self.state = DriverState::Idle;
                Ok(())
            }
            Err(e) =>{
                error!(error = %e, "tracker configuration failed");
                self.transport.close();
                self.state = DriverState::Unconfigured;
                Err(DriverError::ConfigurationFailed(Box::new(e)))
            }
        }
    }

    fn bring_up(&mut self) -> Result<()>{
        self.transport.close();
        self.transport.open(&self.settings.device_path)?;
        self.transport.configure(&LineSettings::new(self.settings.initial_baud, FlowControl::None))?;
        self.transport.send_break()?;

        let options = InitOptions{
            tracking_baud: self.settings.tracking_baud,
            verify_crc: self.settings.verify_crc,
        };
        initialize(&mut self.transport, &mut self.registry, &options)
    }

    pub fn start(&mut self) -> Result<()>{
        self.require("start", &[DriverState::Idle, DriverState::Stopped])?;
        info!("starting tracking");
        self.channel().expect(&Command::TrackingStart, OKAY_REPLY)?;
        self.state = DriverState::Tracking;
        Ok(())
    }

    /// Runs one tracking cycle and returns how many transforms were published.
    ///
    /// Transport and protocol errors abort this cycle only. A reference or
    /// tip that cannot be resolved publishes nothing and leaves the registry as is.
    pub fn update(&mut self) -> Result<usize>{
        self.require("update", &[DriverState::Tracking])?;

        let reply = self.channel().exchange(&Command::Transmit)?;
        let frame = parse_tracking_frame(&reply)?;
        debug!(samples = frame.samples.len(), system_status = ?frame.system_status, "tracking frame");
        for sample in frame.samples.iter().filter(|s| !s.is_valid()){
            debug!(handle = %sample.handle, status = ?sample.status, "tool not tracked");
        }

        let relative = self.pipeline.compute(&self.registry, &frame.samples)?;
        let stamp = self.clock.now();
        let count = relative.len();
        for pose in relative{
            self.sink.broadcast(pose.stamped(stamp));
        }
        Ok(count)
    }

    pub fn stop(&mut self) -> Result<()>{
        self.require("stop", &[DriverState::Tracking])?;
        info!("stopping tracking");
        self.channel().expect(&Command::TrackingStop, TSTOP_REPLY)?;
        self.state = DriverState::Stopped;
        Ok(())
    }

    /// Closes the transport from any state.
    pub fn cleanup(&mut self){
        if self.state == DriverState::Tracking{
            warn!("cleaning up while tracking");
        }
        self.transport.close();
        self.state = DriverState::Unconfigured;
    }
}
