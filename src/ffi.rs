//! FFI bindings for the activity histogram
//!
//! This module provides C-compatible functions for driving the histogram from
//! a host UI. All functions take C strings (null-terminated) and return
//! allocated memory that must be freed by the caller using
//! `histogram_free_string`.
//!
//! Hosts pass their clock as epoch milliseconds. Each handle pins the first
//! `now_ms` it sees to a monotonic instant and measures debounce windows from
//! there.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::time::{Duration, Instant};

use crate::binning::{aggregate, parse_array};
use crate::config::HistogramConfig;
use crate::error::HistogramError;
use crate::histogram::Histogram;
use crate::signals::InputEvent;
use crate::types::{FilterUpdate, Mode};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Return the JSON string to the caller, or record the error and return NULL
fn json_result(result: Result<String, HistogramError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Bin a JSON array of records and return the buckets as a JSON array.
///
/// # Safety
/// - `json`, `mode`, and `timezone` must be valid null-terminated C strings.
/// - `mode` is `"recency"` or `"experience"`.
/// - Returns a newly allocated string that must be freed with `histogram_free_string`.
/// - Returns NULL on error; call `histogram_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn histogram_aggregate(
    json: *const c_char,
    mode: *const c_char,
    timezone: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let mode_str = match cstr_to_string(mode) {
        Some(s) => s,
        None => {
            set_last_error("Invalid mode string pointer");
            return ptr::null_mut();
        }
    };

    let tz_str = match cstr_to_string(timezone) {
        Some(s) => s,
        None => {
            set_last_error("Invalid timezone string pointer");
            return ptr::null_mut();
        }
    };

    json_result(aggregate_json(&json_str, &mode_str, &tz_str))
}

fn aggregate_json(json: &str, mode: &str, timezone: &str) -> Result<String, HistogramError> {
    let mode: Mode = mode.parse()?;
    let config = HistogramConfig {
        timezone: timezone.to_string(),
        ..Default::default()
    };
    let tz = config.tz()?;
    let records = parse_array(json)?;
    let buckets = aggregate(&records, mode, &tz);
    Ok(serde_json::to_string(&buckets)?)
}

// ============================================================================
// Stateful Widget API
// ============================================================================

/// Opaque handle to a Histogram
pub struct HistogramHandle {
    histogram: Histogram,
    /// Host clock reading pinned to a monotonic instant
    origin: Option<(f64, Instant)>,
}

/// Largest host clock offset honoured, about 49 days
const MAX_CLOCK_OFFSET_MS: f64 = u32::MAX as f64;

impl HistogramHandle {
    fn instant(&mut self, now_ms: f64) -> Instant {
        let (origin_ms, origin) = *self.origin.get_or_insert_with(|| (now_ms, Instant::now()));
        let elapsed = now_ms - origin_ms;
        if !elapsed.is_finite() || elapsed <= 0.0 {
            return origin;
        }
        Duration::try_from_secs_f64(elapsed.min(MAX_CLOCK_OFFSET_MS) / 1000.0)
            .ok()
            .and_then(|offset| origin.checked_add(offset))
            .unwrap_or(origin)
    }
}

/// Create a new Histogram in the given mode.
///
/// # Safety
/// - `mode` must be a valid null-terminated C string.
/// - `config_json` may be NULL for the default configuration.
/// - Returns a pointer to a newly allocated Histogram.
/// - Must be freed with `histogram_free`.
/// - Returns NULL on error; call `histogram_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn histogram_new(
    mode: *const c_char,
    config_json: *const c_char,
) -> *mut HistogramHandle {
    clear_last_error();

    let mode_str = match cstr_to_string(mode) {
        Some(s) => s,
        None => {
            set_last_error("Invalid mode string pointer");
            return ptr::null_mut();
        }
    };

    let config_str = if config_json.is_null() {
        None
    } else {
        match cstr_to_string(config_json) {
            Some(s) => Some(s),
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        }
    };

    match new_histogram(&mode_str, config_str.as_deref()) {
        Ok(histogram) => Box::into_raw(Box::new(HistogramHandle {
            histogram,
            origin: None,
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn new_histogram(mode: &str, config_json: Option<&str>) -> Result<Histogram, HistogramError> {
    let mode: Mode = mode.parse()?;
    let config = match config_json {
        Some(json) => HistogramConfig::from_json(json)?,
        None => HistogramConfig::default(),
    };
    Histogram::with_current_time(mode, config)
}

/// Free a Histogram.
///
/// # Safety
/// - `histogram` must be a valid pointer returned by `histogram_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn histogram_free(histogram: *mut HistogramHandle) {
    if !histogram.is_null() {
        drop(Box::from_raw(histogram));
    }
}

/// Replace the dataset with a JSON array of records.
///
/// # Safety
/// - `histogram` must be a valid pointer returned by `histogram_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `histogram_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn histogram_set_records(
    histogram: *mut HistogramHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if histogram.is_null() {
        set_last_error("Null histogram pointer");
        return -1;
    }

    let handle = &mut *histogram;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match parse_array(&json_str) {
        Ok(records) => {
            handle.histogram.set_records(records);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Feed one JSON-encoded input event and return the new frame as JSON.
///
/// Events look like `{"type":"pointer_down","x":120}` or
/// `{"type":"wheel","delta_y":-100,"delta_mode":0}`.
///
/// # Safety
/// - `histogram` must be a valid pointer returned by `histogram_new`.
/// - `event_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `histogram_free_string`.
/// - Returns NULL on error; call `histogram_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn histogram_handle(
    histogram: *mut HistogramHandle,
    event_json: *const c_char,
    now_ms: f64,
) -> *mut c_char {
    clear_last_error();

    if histogram.is_null() {
        set_last_error("Null histogram pointer");
        return ptr::null_mut();
    }

    let handle = &mut *histogram;

    let event_str = match cstr_to_string(event_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event string pointer");
            return ptr::null_mut();
        }
    };

    let result = serde_json::from_str::<InputEvent>(&event_str)
        .map_err(HistogramError::from)
        .and_then(|event| {
            let now = handle.instant(now_ms);
            handle.histogram.handle(&event, now);
            Ok(serde_json::to_string(&handle.histogram.frame())?)
        });
    json_result(result)
}

/// Fire every debounced filter update due at `now_ms`.
///
/// Returns a JSON array of updates such as
/// `[{"filter":"time","range":[1700000000.0,1700086400.0]}]`; the array is
/// empty when nothing was due.
///
/// # Safety
/// - `histogram` must be a valid pointer returned by `histogram_new`.
/// - Returns a newly allocated string that must be freed with `histogram_free_string`.
/// - Returns NULL on error; call `histogram_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn histogram_poll(histogram: *mut HistogramHandle, now_ms: f64) -> *mut c_char {
    clear_last_error();

    if histogram.is_null() {
        set_last_error("Null histogram pointer");
        return ptr::null_mut();
    }

    let handle = &mut *histogram;
    let now = handle.instant(now_ms);
    let mut updates: Vec<FilterUpdate> = Vec::new();
    while handle.histogram.poll(now, &mut updates).is_some() {}

    json_result(serde_json::to_string(&updates).map_err(HistogramError::from))
}

/// Return the current frame as JSON.
///
/// # Safety
/// - `histogram` must be a valid pointer returned by `histogram_new`.
/// - Returns a newly allocated string that must be freed with `histogram_free_string`.
/// - Returns NULL on error; call `histogram_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn histogram_frame(histogram: *mut HistogramHandle) -> *mut c_char {
    clear_last_error();

    if histogram.is_null() {
        set_last_error("Null histogram pointer");
        return ptr::null_mut();
    }

    let handle = &*histogram;
    json_result(serde_json::to_string(&handle.histogram.frame()).map_err(HistogramError::from))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by histogram functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a histogram function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn histogram_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next histogram function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn histogram_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn histogram_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
