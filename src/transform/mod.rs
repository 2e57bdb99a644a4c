pub mod buffer;

pub use buffer::TransformBuffer;

use std::time::{SystemTime, UNIX_EPOCH};
use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use tracing::{error, warn};

use crate::error::ResolutionError;
use crate::frame::PoseSample;
use crate::ports::PortRegistry;

pub const DEFAULT_TIP_FRAME: &str = "tip";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp{
    pub sec: i64,
    pub nanosec: u32,
}

pub trait Clock{
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock{
    fn now(&self) -> Timestamp{
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Timestamp{ sec: elapsed.as_secs() as i64, nanosec: elapsed.subsec_nanos() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformStamped{
    pub parent_frame: String,
    pub child_frame: String,
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub stamp: Timestamp,
}

impl TransformStamped{
    pub fn isometry(&self) -> Isometry3<f64>{
        Isometry3::from_parts(self.translation.into(), self.rotation)
    }
}

/// Receives every transform a tracking cycle produces.
pub trait TransformSink{
    fn broadcast(&mut self, transform: TransformStamped);
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F: FnMut(TransformStamped)> TransformSink for FnSink<F>{
    fn broadcast(&mut self, transform: TransformStamped){
        (self.0)(transform)
    }
}

impl TransformSink for Vec<TransformStamped>{
    fn broadcast(&mut self, transform: TransformStamped){
        self.push(transform);
    }
}

/// 180 degree rotation about the tool's X axis, no translation.
pub fn tool_offset() -> Isometry3<f64>{
    Isometry3::from_parts(
        Translation3::identity(),
        UnitQuaternion::from_quaternion(Quaternion::new(0.0, 1.0, 0.0, 0.0)),
    )
}

/// Pose of one tool in the reference tool's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RelativePose{
    pub parent_frame: String,
    pub child_frame: String,
    pub pose: Isometry3<f64>,
}

impl RelativePose{
    pub fn stamped(self, stamp: Timestamp) -> TransformStamped{
        TransformStamped{
            parent_frame: self.parent_frame,
            child_frame: self.child_frame,
            translation: self.pose.translation.vector,
            rotation: self.pose.rotation,
            stamp,
        }
    }
}

/// Expresses every tracked tool relative to the reference tool.
#[derive(Debug, Clone)]
pub struct TransformPipeline{
    reference_frame: String,
    tip_frame: String,
    offset: Isometry3<f64>,
}

impl TransformPipeline{
    pub fn new(reference_frame: &str) -> Self{
        TransformPipeline{
            reference_frame: reference_frame.to_string(),
            tip_frame: DEFAULT_TIP_FRAME.to_string(),
            offset: tool_offset(),
        }
    }

    pub fn with_tip_frame(mut self, tip_frame: &str) -> Self{
        self.tip_frame = tip_frame.to_string();
        self
    }

    pub fn reference_frame(&self) -> &str{
        &self.reference_frame
    }

    pub fn tip_frame(&self) -> &str{
        &self.tip_frame
    }

    /// Computes one relative pose per valid, registered, non-reference sample.
    ///
    /// Samples whose handle is not registered are logged and skipped. Nothing
    /// is produced unless both the reference and the tip are present.
    pub fn compute(&self, registry: &PortRegistry, samples: &[PoseSample]) -> Result<Vec<RelativePose>, ResolutionError>{
        let reference_handle = registry.resolve_by_name(&self.reference_frame).map(|p| p.handle.as_str());
        let tip_handle = registry.resolve_by_name(&self.tip_frame)
            .map(|p| p.handle.as_str())
            .filter(|&handle| Some(handle) != reference_handle);

        let mut tracked = Vec::with_capacity(samples.len());
        let mut reference = None;
        let mut tip = None;

        for sample in samples.iter().filter(|s| s.is_valid()){
            let Some(pose) = sample.pose else{
                continue;
            };
            let port = match registry.lookup(&sample.handle){
                Ok(port) => port,
                Err(e) =>{
                    warn!(error = %e, "skipping sample");
                    continue;
                }
            };
            let handle = Some(port.handle.as_str());
            if handle == reference_handle{
                reference = Some(tracked.len());
            }else if handle == tip_handle{
                tip = Some(tracked.len());
            }
            tracked.push((port.name.as_str(), pose.isometry()));
        }

        let Some(reference) = reference else{
            error!(reference = %self.reference_frame, "reference frame was not found");
            return Err(ResolutionError::ReferenceNotFound(self.reference_frame.clone()));
        };
        let Some(tip) = tip else{
            error!(tip = %self.tip_frame, "tip was not found");
            return Err(ResolutionError::TipNotFound(self.tip_frame.clone()));
        };

        let (reference_name, reference_pose) = tracked[reference];
        let world_to_reference = (reference_pose * self.offset).inverse();

        let relative = tracked.iter()
            .enumerate()
            .filter(|&(i, _)| i != reference)
            .map(|(i, &(name, pose))|{
                let pose = if i == tip{ pose }else{ pose * self.offset };
                RelativePose{
                    parent_frame: reference_name.to_string(),
                    child_frame: name.to_string(),
                    pose: world_to_reference * pose,
                }
            })
            .collect();
        Ok(relative)
    }
}
