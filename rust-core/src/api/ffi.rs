//! C-compatible API exposed to the dashboard host.
//!
//! Ownership: a session pointer comes from `dpe_session_new` and goes back
//! through `dpe_session_free`. Every string returned by `dpe_handle` is owned
//! by the caller and must be released with `dpe_free_str`.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use tracing::error;

use crate::api::request;
use crate::common::config::AppCfg;
use crate::common::log;
use crate::data::service::Session;

/// ABI version to coordinate with the host layer.
#[no_mangle]
pub extern "C" fn dpe_api_version() -> u32 {
    1
}

/// Open a session configured from the environment. Null on bad configuration.
#[no_mangle]
pub extern "C" fn dpe_session_new() -> *mut Session {
    match AppCfg::load() {
        Ok(cfg) => {
            log::init(&cfg);
            Box::into_raw(Box::new(Session::new(cfg)))
        }
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "C" fn dpe_session_free(session: *mut Session) {
    if session.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(session));
    }
}

/// Run one JSON request and return the JSON response (caller must free).
#[no_mangle]
pub extern "C" fn dpe_handle(session: *mut Session, req: *const c_char) -> *mut c_char {
    if session.is_null() || req.is_null() {
        return string_to_raw(
            "{\"status\":\"invalid_input\",\"code\":9,\"error\":\"null pointer\"}".to_string(),
        );
    }

    let session = unsafe { &mut *session };
    let raw = unsafe { CStr::from_ptr(req) }.to_string_lossy();
    string_to_raw(request::handle(session, &raw))
}

/// Free strings allocated by Rust.
#[no_mangle]
pub extern "C" fn dpe_free_str(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr));
    }
}

fn string_to_raw(s: String) -> *mut c_char {
    // serde_json escapes control characters, so an interior NUL never comes
    // from a serialised response.
    CString::new(s).unwrap_or_default().into_raw()
}
