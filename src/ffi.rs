//! C ABI for embedding the relay in other runtimes (e.g. via ctypes).
//!
//! The caller owns the handle: create it with [`cam_new`], release it with
//! [`cam_free`]. Frames are packed `height x width x 3` bytes in the
//! configured channel order.

use std::os::raw::c_int;
use std::ptr;

use tracing::warn;

use crate::error::RelayError;
use crate::pipeline::Relay;
use crate::Config;

/// Opaque relay handle
pub struct CamHandle {
    relay: Relay,
}

/// Create an idle relay over the V4L2 devices. Never returns null.
///
/// Configuration comes from `CAMRELAY__*` environment variables on top of
/// the defaults.
#[no_mangle]
pub extern "C" fn cam_new() -> *mut CamHandle {
    let config = Config::load(None).unwrap_or_else(|e| {
        warn!("Ignoring invalid configuration: {}", e);
        Config::default()
    });
    into_handle(Relay::v4l2(config))
}

fn into_handle(relay: Relay) -> *mut CamHandle {
    Box::into_raw(Box::new(CamHandle { relay }))
}

/// Open a camera and start background capture.
///
/// Returns 1 if okay, 0 if no device opened, -1 for any other error.
///
/// # Safety
/// `handle` must be null or a pointer from [`cam_new`] not yet freed.
#[no_mangle]
pub unsafe extern "C" fn cam_start(handle: *mut CamHandle) -> c_int {
    let Some(cam) = handle.as_mut() else {
        return -1;
    };
    match cam.relay.start() {
        Ok(()) => 1,
        Err(RelayError::NoDevice { .. }) => 0,
        Err(e) => {
            warn!("cam_start failed: {}", e);
            -1
        }
    }
}

/// Pointer to the most recent frame's pixels, or null if none is ready
/// (after up to 0.5 s when `block > 0`) or the stream is broken.
///
/// The pixels stay valid until the next `cam_color`, `cam_done` or
/// `cam_free` on the same handle.
///
/// # Safety
/// `handle` must be null or a pointer from [`cam_new`] not yet freed.
#[no_mangle]
pub unsafe extern "C" fn cam_color(handle: *mut CamHandle, block: c_int) -> *const u8 {
    let Some(cam) = handle.as_mut() else {
        return ptr::null();
    };
    cam.relay
        .fetch(block > 0)
        .map_or(ptr::null(), |frame| frame.as_ptr())
}

/// Stop background capture. Safe to call repeatedly.
///
/// # Safety
/// `handle` must be null or a pointer from [`cam_new`] not yet freed.
#[no_mangle]
pub unsafe extern "C" fn cam_done(handle: *mut CamHandle) {
    if let Some(cam) = handle.as_mut() {
        cam.relay.stop();
    }
}

/// Stop capture and free the handle.
///
/// # Safety
/// `handle` must be null or a pointer from [`cam_new`] not yet freed; it
/// must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn cam_free(handle: *mut CamHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}
