//! Decoder for `TX 0001` tracking replies.
//!
//! A reply is a 2-hex-digit record count, the records, then a 4-hex-digit
//! system status (and the reply CRC, which is ignored here). Each record
//! starts with a 2-character handle.
//!
//! Valid records are fixed width:
//!
//! ```text
//! handle(2) qw qx qy qz (4 x 6) x y z (3 x 7) error(6) port status(8 hex) frame(8 hex) LF
//! ```
//!
//! Records for missing, disabled or unoccupied tools start with the literal
//! status word and do not share that width, so they are delimited by the
//! line feed instead. If the 8 characters in front of the line feed are hex
//! they are taken as the frame counter.

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};

use crate::error::ProtocolError;
use crate::protocol::{FieldCursor, HANDLE_WIDTH};

pub const RECORD_SEPARATOR: char = '\n';

const QUATERNION_WIDTH: usize = 6;
const POSITION_WIDTH: usize = 7;
const ERROR_WIDTH: usize = 6;
const HEX32_WIDTH: usize = 8;
const SYSTEM_STATUS_WIDTH: usize = 4;

const QUATERNION_SCALE: f64 = 10000.0;
//device units are 1/100 mm
const POSITION_SCALE: f64 = 100.0 * 1000.0;
const ERROR_SCALE: f64 = 10000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus{
    Valid,
    Missing,
    Disabled,
    Unoccupied,
}

impl ToolStatus{
    const WORDS: [(&'static str, ToolStatus); 3] = [
        ("MISSING", ToolStatus::Missing),
        ("DISABLED", ToolStatus::Disabled),
        ("UNOCCUPIED", ToolStatus::Unoccupied),
    ];
}

/// Device-frame pose of a tool in a valid record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolPose{
    /// As reported; the device sends unit quaternions to 4 decimals.
    pub orientation: Quaternion<f64>,
    /// Meters.
    pub position: Vector3<f64>,
    pub tracking_error: f64,
    pub port_status: u32,
}

impl ToolPose{
    pub fn isometry(&self) -> Isometry3<f64>{
        Isometry3::from_parts(
            Translation3::from(self.position),
            UnitQuaternion::from_quaternion(self.orientation),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoseSample{
    pub handle: String,
    pub status: ToolStatus,
    pub pose: Option<ToolPose>,
    pub frame_number: Option<u32>,
}

impl PoseSample{
    pub fn is_valid(&self) -> bool{
        self.status == ToolStatus::Valid
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingFrame{
    pub samples: Vec<PoseSample>,
    pub system_status: Option<u16>,
}

pub fn parse_tracking_frame(reply: &str) -> Result<TrackingFrame, ProtocolError>{
    let mut cursor = FieldCursor::new(reply, "TX reply");
    let count = cursor.hex(2)? as usize;

    let mut samples = Vec::with_capacity(count);
    for _ in 0..count{
        samples.push(parse_record(&mut cursor)?);
    }

    let system_status = match cursor.remaining().get(..SYSTEM_STATUS_WIDTH){
        Some(field) => u16::from_str_radix(field, 16).ok(),
        None => None,
    };

    Ok(TrackingFrame{ samples, system_status })
}

fn parse_record(cursor: &mut FieldCursor) -> Result<PoseSample, ProtocolError>{
    let handle = cursor.take(HANDLE_WIDTH)?.to_string();

    for (word, status) in ToolStatus::WORDS{
        if cursor.eat(word){
            let trailer = cursor.until(RECORD_SEPARATOR)?;
            return Ok(PoseSample{
                handle,
                status,
                pose: None,
                frame_number: trailing_frame_number(trailer),
            });
        }
    }

    let qw = cursor.decimal(QUATERNION_WIDTH)? / QUATERNION_SCALE;
    let qx = cursor.decimal(QUATERNION_WIDTH)? / QUATERNION_SCALE;
    let qy = cursor.decimal(QUATERNION_WIDTH)? / QUATERNION_SCALE;
    let qz = cursor.decimal(QUATERNION_WIDTH)? / QUATERNION_SCALE;
    let x = cursor.decimal(POSITION_WIDTH)? / POSITION_SCALE;
    let y = cursor.decimal(POSITION_WIDTH)? / POSITION_SCALE;
    let z = cursor.decimal(POSITION_WIDTH)? / POSITION_SCALE;
    let tracking_error = cursor.decimal(ERROR_WIDTH)? / ERROR_SCALE;
    let port_status = cursor.hex(HEX32_WIDTH)?;
    let frame_number = cursor.hex(HEX32_WIDTH)?;
    cursor.expect(RECORD_SEPARATOR)?;

    Ok(PoseSample{
        handle,
        status: ToolStatus::Valid,
        pose: Some(ToolPose{
            orientation: Quaternion::new(qw, qx, qy, qz),
            position: Vector3::new(x, y, z),
            tracking_error,
            port_status,
        }),
        frame_number: Some(frame_number),
    })
}

fn trailing_frame_number(trailer: &str) -> Option<u32>{
    let start = trailer.len().checked_sub(HEX32_WIDTH)?;
    let field = trailer.get(start..)?;
    u32::from_str_radix(field, 16).ok()
}
