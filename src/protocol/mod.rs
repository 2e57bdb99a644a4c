//! NDI command/reply protocol: command strings, reply checks and the
//! fixed-width decoders for port handle queries.

pub mod fields;
pub mod init;

pub use fields::FieldCursor;
pub use init::{initialize, InitOptions};

use tracing::{debug, warn};

use crate::error::{DriverError, ProtocolError};
use crate::serial::Transport;

pub const RESET_REPLY: &str = "RESETBE6F";
pub const OKAY_REPLY: &str = "OKAY";
pub const TSTOP_REPLY: &str = "OKAYA896";
pub const ERROR_PREFIX: &str = "ERROR";

pub const HANDLE_WIDTH: usize = 2;
const HANDLE_RECORD_WIDTH: usize = 5;
const CRC_WIDTH: usize = 4;

/// Which handles a `PHSR` query lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleQuery{
    All,
    ToFree,
    ToInitialize,
    ToEnable,
}

impl HandleQuery{
    fn code(&self) -> &'static str{
        match self{
            HandleQuery::All => "00",
            HandleQuery::ToFree => "01",
            HandleQuery::ToInitialize => "02",
            HandleQuery::ToEnable => "03",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a>{
    Reset,
    Comm,
    Init,
    Beep,
    HandleSearch(HandleQuery),
    FreeHandle(&'a str),
    InitHandle(&'a str),
    HandleInfo(&'a str),
    EnableHandle(&'a str),
    TrackingStart,
    Transmit,
    TrackingStop,
}

impl Command<'_>{
    pub fn to_wire(&self) -> String{
        match self{
            Command::Reset => "RESET 1".to_string(),
            //230400 baud, 8N1, hardware handshaking
            Command::Comm => "COMM A0001".to_string(),
            Command::Init => "INIT ".to_string(),
            Command::Beep => "BEEP 2".to_string(),
            Command::HandleSearch(query) => format!("PHSR {}", query.code()),
            Command::FreeHandle(handle) => format!("PHF {}", handle),
            Command::InitHandle(handle) => format!("PINIT {}", handle),
            Command::HandleInfo(handle) => format!("PHINF {}0005", handle),
            Command::EnableHandle(handle) => format!("PENA {}D", handle),
            Command::TrackingStart => "TSTART 80".to_string(),
            Command::Transmit => "TX 0001".to_string(),
            Command::TrackingStop => "TSTOP ".to_string(),
        }
    }
}

/// CRC-16 the tracker appends to every reply (polynomial 0xA001, reflected, zero init).
pub fn crc16(data: &[u8]) -> u16{
    data.iter().fold(0u16, |crc, &byte|{
        let mut crc = crc ^ byte as u16;
        for _ in 0..8{
            crc = if crc & 1 != 0{ (crc >> 1) ^ 0xA001 }else{ crc >> 1 };
        }
        crc
    })
}

/// Checks the trailing CRC of `reply` and returns the body in front of it.
pub fn verify_crc(reply: &str) -> Result<&str, ProtocolError>{
    let split = reply.len().checked_sub(CRC_WIDTH)
        .filter(|&at| reply.is_char_boundary(at))
        .ok_or_else(|| ProtocolError::malformed("reply", format!("{:?} has no CRC", reply)))?;
    let (body, crc) = reply.split_at(split);
    let expected = u16::from_str_radix(crc, 16)
        .map_err(|_| ProtocolError::malformed("reply", format!("{:?} is not a CRC", crc)))?;
    let actual = crc16(body.as_bytes());
    if expected != actual{
        return Err(ProtocolError::Crc{ expected, actual });
    }
    Ok(body)
}

/// Fails unless `reply` contains `token`; `ERROR` replies carry the device error code.
pub fn expect_token(command: &Command, reply: &str, token: &str) -> Result<(), ProtocolError>{
    if let Some(rest) = reply.strip_prefix(ERROR_PREFIX){
        return Err(ProtocolError::DeviceError{
            command: command.to_wire(),
            code: rest.get(..2).unwrap_or(rest).to_string(),
        });
    }
    if !reply.contains(token){
        return Err(ProtocolError::UnexpectedReply{
            command: command.to_wire(),
            expected: token.to_string(),
            reply: reply.to_string(),
        });
    }
    Ok(())
}

/// Decodes a `PHSR` reply: 2 hex digits of count, then 5-byte records whose first 2 bytes are the handle.
pub fn decode_handle_list(reply: &str) -> Result<Vec<String>, ProtocolError>{
    let mut cursor = FieldCursor::new(reply, "PHSR reply");
    let count = cursor.hex(2)? as usize;
    let mut handles = Vec::with_capacity(count);
    for _ in 0..count{
        let handle = cursor.take(HANDLE_WIDTH)?;
        cursor.skip(HANDLE_RECORD_WIDTH - HANDLE_WIDTH)?;
        handles.push(handle.to_string());
    }
    Ok(handles)
}

/// Tool identity from a `PHINF <h>0005` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInfo{
    pub tool_type: String,
    pub serial_number: String,
}

//type(2) + number of switches, visible LEDs, reserved(1+1+2+2) + manufacturer(12) + revision(3)
const TOOL_INFO_SERIAL_OFFSET: usize = 21;
const SERIAL_NUMBER_WIDTH: usize = 8;

pub fn decode_tool_info(reply: &str) -> Result<ToolInfo, ProtocolError>{
    let mut cursor = FieldCursor::new(reply, "PHINF reply");
    let tool_type = cursor.take(2)?.to_string();
    cursor.skip(TOOL_INFO_SERIAL_OFFSET)?;
    let serial_number = cursor.take(SERIAL_NUMBER_WIDTH)?.to_string();
    Ok(ToolInfo{ tool_type, serial_number })
}

/// One command, one reply, over a borrowed transport.
pub struct CommandChannel<'t, T: Transport + ?Sized>{
    transport: &'t mut T,
    verify_crc: bool,
}

impl<'t, T: Transport + ?Sized> CommandChannel<'t, T>{
    pub fn new(transport: &'t mut T, verify_crc: bool) -> Self{
        CommandChannel{ transport, verify_crc }
    }

    /// Sends `command` and returns the raw reply (CRC included).
    pub fn exchange(&mut self, command: &Command) -> Result<String, DriverError>{
        let wire = command.to_wire();
        self.transport.send(&wire)?;
        let reply = self.transport.receive_line()?;
        debug!(command = %wire, reply = %reply.escape_debug(), "exchange");
        if self.verify_crc{
            verify_crc(&reply)?;
        }
        Ok(reply)
    }

    pub fn expect(&mut self, command: &Command, token: &str) -> Result<String, DriverError>{
        let reply = self.exchange(command)?;
        expect_token(command, &reply, token)?;
        Ok(reply)
    }

    /// Sends a command whose reply content does not matter.
    pub fn fire(&mut self, command: &Command) -> Result<(), DriverError>{
        let reply = self.exchange(command)?;
        if reply.starts_with(ERROR_PREFIX){
            warn!(command = %command.to_wire(), reply = %reply, "device reported an error");
        }
        Ok(())
    }

    pub fn handles(&mut self, query: HandleQuery) -> Result<Vec<String>, DriverError>{
        let reply = self.exchange(&Command::HandleSearch(query))?;
        Ok(decode_handle_list(&reply)?)
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use crate::serial::scripted::ScriptedTransport;

    #[test]
    fn test_command_wire_format(){
        assert_eq!(Command::Reset.to_wire(), "RESET 1");
        assert_eq!(Command::Init.to_wire(), "INIT ");
        assert_eq!(Command::HandleSearch(HandleQuery::ToInitialize).to_wire(), "PHSR 02");
        assert_eq!(Command::FreeHandle("0A").to_wire(), "PHF 0A");
        assert_eq!(Command::HandleInfo("0A").to_wire(), "PHINF 0A0005");
        assert_eq!(Command::EnableHandle("0A").to_wire(), "PENA 0AD");
        assert_eq!(Command::TrackingStop.to_wire(), "TSTOP ");
    }

    #[test]
    fn test_crc_of_known_replies(){
        assert_eq!(crc16(b"RESET"), 0xBE6F);
        assert_eq!(crc16(b"OKAY"), 0xA896);
        assert_eq!(crc16(b"123456789"), 0xBB3D);
    }

    #[test]
    fn test_verify_crc(){
        assert_eq!(verify_crc("OKAYA896").unwrap(), "OKAY");
        assert_eq!(
            verify_crc("OKAYA897").unwrap_err(),
            ProtocolError::Crc{ expected: 0xA897, actual: 0xA896 }
        );
        assert!(matches!(verify_crc("OK"), Err(ProtocolError::Malformed{ .. })));
    }

    #[test]
    fn test_expect_token(){
        assert!(expect_token(&Command::Reset, "RESETBE6F", RESET_REPLY).is_ok());
        assert!(expect_token(&Command::Init, "OKAY", OKAY_REPLY).is_ok());

        let err = expect_token(&Command::Init, "RESETBE6F", OKAY_REPLY).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedReply{ .. }));

        let err = expect_token(&Command::Init, "ERROR0D1234", OKAY_REPLY).unwrap_err();
        assert_eq!(err, ProtocolError::DeviceError{ command: "INIT ".to_string(), code: "0D".to_string() });
    }

    #[test]
    fn test_handle_list_returns_every_record_in_order(){
        for count in 0..20usize{
            let mut reply = format!("{:02X}", count);
            let mut expected = Vec::new();
            for i in 0..count{
                let handle = format!("{:02X}", i + 1);
                reply.push_str(&handle);
                reply.push_str("001");
                expected.push(handle);
            }
            reply.push_str("1234");
            assert_eq!(decode_handle_list(&reply).unwrap(), expected);
        }
    }

    #[test]
    fn test_handle_list_short_reply(){
        assert!(matches!(decode_handle_list("020A001"), Err(ProtocolError::Malformed{ .. })));
        assert!(matches!(decode_handle_list(""), Err(ProtocolError::Malformed{ .. })));
        assert!(matches!(decode_handle_list("zz"), Err(ProtocolError::Malformed{ .. })));
    }

    #[test]
    fn test_tool_info(){
        let reply = "0A010000NDI         001347812360000000000000000000000";
        let info = decode_tool_info(reply).unwrap();
        assert_eq!(info.tool_type, "0A");
        assert_eq!(info.serial_number, "34781236");
        assert!(decode_tool_info("0A01").is_err());
    }

    #[test]
    fn test_channel_checks_crc_when_enabled(){
        let mut transport = ScriptedTransport::new().reply("INIT ", "OKAYA897");
        transport.open("/dev/null").unwrap();

        let mut lenient = CommandChannel::new(&mut transport, false);
        assert!(lenient.expect(&Command::Init, OKAY_REPLY).is_ok());

        let mut strict = CommandChannel::new(&mut transport, true);
        let err = strict.expect(&Command::Init, OKAY_REPLY).unwrap_err();
        assert!(matches!(err, DriverError::Protocol(ProtocolError::Crc{ .. })));
    }
}
