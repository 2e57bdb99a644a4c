use std::ffi::{c_char, CStr, CString};
use std::ptr;
use libc::{c_int, c_void};
use tracing::{error, warn};

use crate::driver::{DriverSettings, NdiDriver};
use crate::error::DriverError;
use crate::serial::SerialTransport;
use crate::transform::{SystemClock, TransformSink, TransformStamped};

pub const NDI_OK: c_int = 0;
pub const NDI_ERR_NULL: c_int = -1;
pub const NDI_ERR_FAILED: c_int = -2;
/// The reference or tip tool was not among this cycle's samples; the device is fine.
pub const NDI_ERR_UNRESOLVED: c_int = -3;
/// Call made in the wrong lifecycle state.
pub const NDI_ERR_STATE: c_int = -4;

/// Transform handed to the host callback. Strings are only valid during the call.
#[repr(C)]
pub struct NdiTransform{
    pub parent_frame: *const c_char,
    pub child_frame: *const c_char,
    pub translation: [f64; 3],
    /// x, y, z, w
    pub rotation: [f64; 4],
    pub stamp_sec: i64,
    pub stamp_nanosec: u32,
}

pub type NdiTransformCallback = Option<unsafe extern "C" fn(transform: *const NdiTransform, user_data: *mut c_void)>;

struct CallbackSink{
    callback: NdiTransformCallback,
    user_data: *mut c_void,
}

//the host owns user_data and serializes every call into the tracker
unsafe impl Send for CallbackSink{}

impl TransformSink for CallbackSink{
    fn broadcast(&mut self, transform: TransformStamped){
        let Some(callback) = self.callback else{
            return;
        };
        let (Ok(parent), Ok(child)) = (
            CString::new(transform.parent_frame),
            CString::new(transform.child_frame),
        ) else{
            error!("frame name contains a NUL byte, transform dropped");
            return;
        };
        let q = transform.rotation.quaternion();
        let out = NdiTransform{
            parent_frame: parent.as_ptr(),
            child_frame: child.as_ptr(),
            translation: [transform.translation.x, transform.translation.y, transform.translation.z],
            rotation: [q.i, q.j, q.k, q.w],
            stamp_sec: transform.stamp.sec,
            stamp_nanosec: transform.stamp.nanosec,
        };
        unsafe{ callback(&out, self.user_data) };
    }
}

pub struct NdiTracker{
    inner: NdiDriver<SerialTransport>,
}

unsafe fn as_str<'a>(s: *const c_char) -> Option<&'a str>{
    if s.is_null(){
        return None;
    }
    unsafe{ CStr::from_ptr(s).to_str().ok() }
}

fn error_code(e: &DriverError) -> c_int{
    match e{
        DriverError::Resolution(_) => NDI_ERR_UNRESOLVED,
        DriverError::InvalidState{ .. } => NDI_ERR_STATE,
        _ => NDI_ERR_FAILED,
    }
}

fn status<T>(result: Result<T, DriverError>) -> c_int{
    match result{
        Ok(_) => NDI_OK,
        Err(e) =>{
            error!(error = %e, "tracker call failed");
            error_code(&e)
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn ndi_tracker_new(
    device_path: *const c_char,
    reference_frame: *const c_char,
    callback: NdiTransformCallback,
    user_data: *mut c_void,
) -> *mut NdiTracker{
    let (Some(device), Some(reference)) = (unsafe{ as_str(device_path) }, unsafe{ as_str(reference_frame) }) else{
        return ptr::null_mut();
    };

    let driver = NdiDriver::new(
        SerialTransport::new(),
        DriverSettings::new(device, reference),
        Box::new(SystemClock),
        Box::new(CallbackSink{ callback, user_data }),
    );
    Box::into_raw(Box::new(NdiTracker{ inner: driver }))
}

#[no_mangle]
pub unsafe extern "C" fn ndi_tracker_free(tracker: *mut NdiTracker){
    if !tracker.is_null(){
        unsafe{ drop(Box::from_raw(tracker)); }
    }
}

#[no_mangle]
pub unsafe extern "C" fn ndi_tracker_assign_port_name(
    tracker: *mut NdiTracker,
    handle: *const c_char,
    name: *const c_char,
) -> c_int{
    if tracker.is_null(){
        return NDI_ERR_NULL;
    }
    let (Some(handle), Some(name)) = (unsafe{ as_str(handle) }, unsafe{ as_str(name) }) else{
        return NDI_ERR_NULL;
    };
    let t = unsafe{ &mut *tracker };
    t.inner.assign_port_name(handle, name);
    NDI_OK
}

#[no_mangle]
pub unsafe extern "C" fn ndi_tracker_configure(tracker: *mut NdiTracker) -> c_int{
    if tracker.is_null(){
        return NDI_ERR_NULL;
    }
    let t = unsafe{ &mut *tracker };
    status(t.inner.configure())
}

#[no_mangle]
pub unsafe extern "C" fn ndi_tracker_start(tracker: *mut NdiTracker) -> c_int{
    if tracker.is_null(){
        return NDI_ERR_NULL;
    }
    let t = unsafe{ &mut *tracker };
    status(t.inner.start())
}

/// Returns the number of transforms published, or a negative error code.
#[no_mangle]
pub unsafe extern "C" fn ndi_tracker_update(tracker: *mut NdiTracker) -> c_int{
    if tracker.is_null(){
        return NDI_ERR_NULL;
    }
    let t = unsafe{ &mut *tracker };
    match t.inner.update(){
        Ok(count) => count as c_int,
        Err(e @ DriverError::Resolution(_)) =>{
            warn!(error = %e, "no transforms this cycle");
            NDI_ERR_UNRESOLVED
        }
        Err(e) =>{
            error!(error = %e, "tracking cycle failed");
            error_code(&e)
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn ndi_tracker_stop(tracker: *mut NdiTracker) -> c_int{
    if tracker.is_null(){
        return NDI_ERR_NULL;
    }
    let t = unsafe{ &mut *tracker };
    status(t.inner.stop())
}

#[no_mangle]
pub unsafe extern "C" fn ndi_tracker_cleanup(tracker: *mut NdiTracker) -> c_int{
    if tracker.is_null(){
        return NDI_ERR_NULL;
    }
    let t = unsafe{ &mut *tracker };
    t.inner.cleanup();
    NDI_OK
}
