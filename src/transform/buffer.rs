use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{TransformSink, TransformStamped};

type FramePair = (String, String);

struct Latest{
    frames: HashMap<FramePair, (TransformStamped, u64)>,
    epoch: u64,
}

//latest transform per (parent, child) pair, tagged with the epoch of the broadcast that wrote it
pub struct TransformBuffer{
    latest: Mutex<Latest>,
}

impl TransformBuffer{
    pub fn new() -> Self{
        TransformBuffer{
            latest: Mutex::new(Latest{ frames: HashMap::new(), epoch: 0 }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Latest>{
        //a panicking writer cannot leave a half-written entry behind
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, transform: TransformStamped) -> u64{
        let mut latest = self.lock();
        latest.epoch += 1;
        let epoch = latest.epoch;
        let key = (transform.parent_frame.clone(), transform.child_frame.clone());
        latest.frames.insert(key, (transform, epoch));
        epoch
    }

    pub fn lookup(&self, parent: &str, child: &str) -> Option<(TransformStamped, u64)>{
        self.lock().frames.get(&(parent.to_string(), child.to_string())).cloned()
    }

    //get the latest epoch (for freshness detection)
    pub fn latest_epoch(&self) -> u64{
        self.lock().epoch
    }

    pub fn frame_pairs(&self) -> Vec<FramePair>{
        let mut pairs: Vec<_> = self.lock().frames.keys().cloned().collect();
        pairs.sort();
        pairs
    }

    pub fn len(&self) -> usize{
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool{
        self.len() == 0
    }
}

impl Default for TransformBuffer{
    fn default() -> Self{
        Self::new()
    }
}

impl TransformSink for Arc<TransformBuffer>{
    fn broadcast(&mut self, transform: TransformStamped){
        self.publish(transform);
    }
}
