use pyo3::prelude::*;
use pyo3::exceptions::{PyIOError, PyRuntimeError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::load_config;
use crate::driver::{DriverSettings, NdiDriver};
use crate::error::DriverError;
use crate::serial::SerialTransport;
use crate::transform::{FnSink, SystemClock, TransformStamped};

type PyTransform = (String, String, (f64, f64, f64), (f64, f64, f64, f64), f64);

fn to_py_err(e: DriverError) -> PyErr{
    match e{
        DriverError::Transport(e) => PyIOError::new_err(e.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

fn to_tuple(t: &TransformStamped) -> PyTransform{
    let q = t.rotation.quaternion();
    (
        t.parent_frame.clone(),
        t.child_frame.clone(),
        (t.translation.x, t.translation.y, t.translation.z),
        (q.i, q.j, q.k, q.w),
        t.stamp.sec as f64 + t.stamp.nanosec as f64 * 1e-9,
    )
}

#[pyclass(unsendable)]
pub struct PyNdiTracker{
    inner: NdiDriver<SerialTransport>,
    published: Arc<Mutex<Vec<TransformStamped>>>,
}

impl PyNdiTracker{
    fn build(settings: DriverSettings, read_timeout: Option<Duration>) -> Self{
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink_target = Arc::clone(&published);
        let sink = FnSink(move |t: TransformStamped|{
            if let Ok(mut pending) = sink_target.lock(){
                pending.push(t);
            }
        });
        let inner = NdiDriver::new(
            SerialTransport::new().with_read_timeout(read_timeout),
            settings,
            Box::new(SystemClock),
            Box::new(sink),
        );
        PyNdiTracker{ inner, published }
    }
}

#[pymethods]
impl PyNdiTracker{
    #[new]
    #[pyo3(signature = (device_path, reference_frame, read_timeout_ms = None))]
    fn new(device_path: &str, reference_frame: &str, read_timeout_ms: Option<u64>) -> Self{
        Self::build(
            DriverSettings::new(device_path, reference_frame),
            read_timeout_ms.map(Duration::from_millis),
        )
    }

    #[staticmethod]
    fn from_config(path: &str) -> PyResult<Self>{
        let config = load_config(std::path::Path::new(path))
            .map_err(|e| PyIOError::new_err(e.to_string()))?;
        let mut tracker = Self::build(config.settings(), config.read_timeout());
        for port in &config.ports{
            tracker.inner.assign_port_name(&port.handle, &port.name);
        }
        Ok(tracker)
    }

    fn assign_port_name(&mut self, handle: &str, name: &str){
        self.inner.assign_port_name(handle, name);
    }

    fn configure(&mut self) -> PyResult<()>{
        self.inner.configure().map_err(to_py_err)
    }

    fn start(&mut self) -> PyResult<()>{
        self.inner.start().map_err(to_py_err)
    }

    /// One tracking cycle; returns (parent, child, xyz, xyzw, stamp) tuples
    fn update(&mut self) -> PyResult<Vec<PyTransform>>{
        self.inner.update().map_err(to_py_err)?;
        let mut pending = self.published.lock()
            .map_err(|_| PyRuntimeError::new_err("transform queue poisoned"))?;
        Ok(pending.drain(..).map(|t| to_tuple(&t)).collect())
    }

    fn stop(&mut self) -> PyResult<()>{
        self.inner.stop().map_err(to_py_err)
    }

    fn cleanup(&mut self){
        self.inner.cleanup();
    }

    fn state(&self) -> String{
        format!("{:?}", self.inner.state())
    }

    fn ports(&self) -> Vec<(String, String, String, String)>{
        self.inner.registry().iter()
            .map(|p| (p.handle.clone(), p.name.clone(), p.tool_type.clone(), p.serial_number.clone()))
            .collect()
    }
}

#[pymodule]
fn ndi_track(_py: Python, m: &PyModule) -> PyResult<()>{
    m.add_class::<PyNdiTracker>()?;
    Ok(())
}

#[cfg(test)]
mod tests{
    use super::*;

    #[test]
    fn test_py_tracker_names_ports(){
        let mut tracker = PyNdiTracker::new("/dev/ttyUSB0", "ref", None);
        tracker.assign_port_name("0A", "ref");
        tracker.assign_port_name("0A", "base");
        let ports = tracker.ports();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].1, "base");
        assert_eq!(tracker.state(), "Unconfigured");
    }

    #[test]
    fn test_py_tuple_layout(){
        let t = TransformStamped{
            parent_frame: "ref".to_string(),
            child_frame: "tip".to_string(),
            translation: nalgebra::Vector3::new(1.0, 2.0, 3.0),
            rotation: nalgebra::UnitQuaternion::identity(),
            stamp: crate::transform::Timestamp{ sec: 2, nanosec: 500_000_000 },
        };
        let (parent, child, xyz, xyzw, stamp) = to_tuple(&t);
        assert_eq!((parent.as_str(), child.as_str()), ("ref", "tip"));
        assert_eq!(xyz, (1.0, 2.0, 3.0));
        assert_eq!(xyzw, (0.0, 0.0, 0.0, 1.0));
        assert_eq!(stamp, 2.5);
    }
}
