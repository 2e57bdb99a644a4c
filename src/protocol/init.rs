//! Power-on to tracking-ready command sequence.
//!
//! Every step runs in order and the first failure aborts the sequence.
//! Nothing is retried and nothing is rolled back here; the caller closes
//! the transport.

use serialport::FlowControl;
use tracing::{info, warn};

use crate::error::DriverError;
use crate::ports::PortRegistry;
use crate::serial::{LineSettings, Transport, TRACKING_BAUD};
use super::{
    decode_tool_info, Command, CommandChannel, HandleQuery, OKAY_REPLY, RESET_REPLY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitOptions{
    pub tracking_baud: u32,
    pub verify_crc: bool,
}

impl Default for InitOptions{
    fn default() -> Self{
        InitOptions{
            tracking_baud: TRACKING_BAUD,
            verify_crc: false,
        }
    }
}

pub fn initialize<T: Transport + ?Sized>(
    transport: &mut T,
    registry: &mut PortRegistry,
    options: &InitOptions,
) -> Result<(), DriverError>{
    info!("resetting tracker");
    CommandChannel::new(&mut *transport, options.verify_crc).expect(&Command::Reset, RESET_REPLY)?;

    info!(baud = options.tracking_baud, "negotiating baud rate");
    CommandChannel::new(&mut *transport, options.verify_crc).expect(&Command::Comm, OKAY_REPLY)?;
    transport.configure(&LineSettings::new(options.tracking_baud, FlowControl::Hardware))?;

    let mut channel = CommandChannel::new(transport, options.verify_crc);

    info!("initializing tracker");
    channel.expect(&Command::Init, OKAY_REPLY)?;
    channel.fire(&Command::Beep)?;

    let stale = channel.handles(HandleQuery::ToFree)?;
    info!(count = stale.len(), "freeing port handles");
    for handle in &stale{
        channel.fire(&Command::FreeHandle(handle))?;
    }

    let allocated = channel.handles(HandleQuery::ToInitialize)?;
    info!(count = allocated.len(), "initializing port handles");
    for handle in &allocated{
        registry.register(handle);
        channel.fire(&Command::InitHandle(handle))?;
    }

    let all = channel.handles(HandleQuery::All)?;
    info!(count = all.len(), "querying port handle info");
    for handle in &all{
        let reply = channel.exchange(&Command::HandleInfo(handle))?;
        let tool = decode_tool_info(&reply)?;
        info!(handle = %handle, tool_type = %tool.tool_type, serial = %tool.serial_number, "tool");
        if !registry.update_tool_info(handle, tool){
            warn!(handle = %handle, "port handle info for an unregistered handle");
        }
    }

    let enable = channel.handles(HandleQuery::ToEnable)?;
    info!(count = enable.len(), "enabling port handles");
    for handle in &enable{
        channel.fire(&Command::EnableHandle(handle))?;
    }

    Ok(())
}
