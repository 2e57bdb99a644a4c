pub mod line;
#[cfg(test)]
pub(crate) mod scripted;

pub use line::{LineReader, RECEIVE_BUFFER_SIZE};

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, trace};

use crate::error::TransportError;

pub const COMMAND_TERMINATOR: u8 = b'\r';
pub const DEFAULT_BAUD: u32 = 9600;
pub const TRACKING_BAUD: u32 = 230400;

//read timeout handed to serialport; a blocked reader wakes this often to check for close
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const BREAK_DURATION: Duration = Duration::from_millis(250);

/// Line parameters for the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings{
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl LineSettings{
    /// 8 data bits, no parity, one stop bit.
    pub fn new(baud_rate: u32, flow_control: FlowControl) -> Self{
        LineSettings{
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control,
        }
    }
}

impl Default for LineSettings{
    fn default() -> Self{
        LineSettings::new(DEFAULT_BAUD, FlowControl::None)
    }
}

/// Line-oriented command/reply channel to the tracker.
///
/// `send` and `receive_line` block the calling thread. Without a read
/// timeout a silent device stalls the caller until the transport is closed.
pub trait Transport{
    fn open(&mut self, path: &str) -> Result<(), TransportError>;

    /// Closing an already closed transport is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn configure(&mut self, settings: &LineSettings) -> Result<(), TransportError>;

    fn send_break(&mut self) -> Result<(), TransportError>;

    /// Writes `command` followed by a carriage return.
    fn send(&mut self, command: &str) -> Result<(), TransportError>;

    /// Returns the next reply with its carriage return stripped.
    fn receive_line(&mut self) -> Result<String, TransportError>;
}

/// Closes a transport from another thread, unblocking a pending read.
#[derive(Debug, Clone)]
pub struct CloseHandle{
    closed: Arc<AtomicBool>,
}

impl CloseHandle{
    pub fn close(&self){
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool{
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct SerialTransport{
    port: Option<Box<dyn SerialPort>>,
    settings: LineSettings,
    reader: LineReader,
    read_timeout: Option<Duration>,
    closed: Arc<AtomicBool>,
}

impl SerialTransport{
    pub fn new() -> Self{
        SerialTransport{
            port: None,
            settings: LineSettings::default(),
            reader: LineReader::new(RECEIVE_BUFFER_SIZE),
            read_timeout: None,
            closed: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Fail reads with `TransportError::TimedOut` instead of blocking forever.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self{
        self.read_timeout = timeout;
        self
    }

    pub fn settings(&self) -> &LineSettings{
        &self.settings
    }

    /// Handle that forces a blocked `receive_line` to return `TransportError::Closed`.
    pub fn close_handle(&self) -> CloseHandle{
        CloseHandle{ closed: Arc::clone(&self.closed) }
    }

    /// Takes over an already opened port, e.g. one built by the caller with
    /// non-default options. Reads are switched to the poll interval.
    pub fn attach(&mut self, mut port: Box<dyn SerialPort>) -> Result<(), TransportError>{
        self.close();
        port.set_timeout(POLL_INTERVAL)
            .map_err(|e| TransportError::Configure(e.to_string()))?;
        self.port = Some(port);
        self.reader.clear();
        self.closed.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError>{
        if self.closed.load(Ordering::SeqCst){
            return Err(TransportError::Closed);
        }
        self.port.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl Default for SerialTransport{
    fn default() -> Self{
        Self::new()
    }
}

impl Transport for SerialTransport{
    fn open(&mut self, path: &str) -> Result<(), TransportError>{
        self.close();
        info!(path, baud = self.settings.baud_rate, "opening serial port");

        let port = serialport::new(path, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .parity(self.settings.parity)
            .stop_bits(self.settings.stop_bits)
            .flow_control(self.settings.flow_control)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|source| TransportError::Open{ path: path.to_string(), source })?;

        self.attach(port)
    }

    fn close(&mut self){
        if self.port.take().is_some(){
            info!("closing serial port");
        }
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool{
        self.port.is_some() && !self.closed.load(Ordering::SeqCst)
    }

    fn configure(&mut self, settings: &LineSettings) -> Result<(), TransportError>{
        let port = self.port_mut()?;
        let rejected = |e: serialport::Error| TransportError::Configure(e.to_string());

        port.set_baud_rate(settings.baud_rate).map_err(rejected)?;
        port.set_data_bits(settings.data_bits).map_err(rejected)?;
        port.set_parity(settings.parity).map_err(rejected)?;
        port.set_stop_bits(settings.stop_bits).map_err(rejected)?;
        port.set_flow_control(settings.flow_control).map_err(rejected)?;

        debug!(baud = settings.baud_rate, flow = ?settings.flow_control, "serial line configured");
        self.settings = *settings;
        Ok(())
    }

    fn send_break(&mut self) -> Result<(), TransportError>{
        let port = self.port_mut()?;
        let rejected = |e: serialport::Error| TransportError::Configure(e.to_string());

        port.set_break().map_err(rejected)?;
        thread::sleep(BREAK_DURATION);
        port.clear_break().map_err(rejected)?;
        Ok(())
    }

    fn send(&mut self, command: &str) -> Result<(), TransportError>{
        let port = self.port_mut()?;

        let mut bytes = Vec::with_capacity(command.len() + 1);
        bytes.extend_from_slice(command.as_bytes());
        bytes.push(COMMAND_TERMINATOR);

        trace!(command, "tx");
        port.write_all(&bytes)
            .and_then(|_| port.flush())
            .map_err(|source| TransportError::Write{ command: command.to_string(), source })
    }

    fn receive_line(&mut self) -> Result<String, TransportError>{
        if self.closed.load(Ordering::SeqCst){
            return Err(TransportError::Closed);
        }
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        let line = self.reader.read_line(port.as_mut(), &self.closed, self.read_timeout)
            .inspect_err(|e|{
                if self.reader.is_resyncing(){
                    debug!(error = %e, "dropping the rest of the abandoned reply on the next read");
                }
            })?;
        trace!(reply = %line, "rx");
        Ok(line)
    }
}
