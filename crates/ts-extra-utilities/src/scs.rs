//! Types of the SCS telemetry SDK used by the plugin entry points.
//!
//! Only the subset needed for logging and channel registration is declared.
//! Layouts follow `scssdk.h`, `scssdk_value.h` and `scssdk_telemetry.h`.

#![allow(non_camel_case_types)]

use std::ffi::{CStr, c_char, c_void};

use ts_extra_core::TrailerConnectivity;

pub type scs_result_t = i32;
pub type scs_u32_t = u32;
pub type scs_value_type_t = u32;
pub type scs_log_type_t = i32;
pub type scs_string_t = *const c_char;
pub type scs_context_t = *mut c_void;

pub const SCS_RESULT_OK: scs_result_t = 0;
pub const SCS_RESULT_UNSUPPORTED: scs_result_t = -1;
pub const SCS_RESULT_GENERIC_ERROR: scs_result_t = -7;

pub const SCS_LOG_TYPE_MESSAGE: scs_log_type_t = 0;
pub const SCS_LOG_TYPE_WARNING: scs_log_type_t = 1;
pub const SCS_LOG_TYPE_ERROR: scs_log_type_t = 2;

pub const SCS_VALUE_TYPE_BOOL: scs_value_type_t = 1;
/// Index value of channels that are not arrays
pub const SCS_U32_NIL: scs_u32_t = u32::MAX;
pub const SCS_TELEMETRY_CHANNEL_FLAG_NONE: scs_u32_t = 0;

pub const fn scs_make_version(major: u32, minor: u32) -> scs_u32_t {
    (major << 16) | minor
}

pub const SCS_TELEMETRY_VERSION_1_01: scs_u32_t = scs_make_version(1, 1);

pub type scs_log_t = unsafe extern "system" fn(scs_log_type_t, scs_string_t);

pub type scs_telemetry_event_callback_t =
    unsafe extern "system" fn(scs_u32_t, *const c_void, scs_context_t);

pub type scs_telemetry_channel_callback_t =
    unsafe extern "system" fn(scs_string_t, scs_u32_t, *const scs_value_t, scs_context_t);

pub type scs_telemetry_register_for_event_t = unsafe extern "system" fn(
    scs_u32_t,
    scs_telemetry_event_callback_t,
    scs_context_t,
) -> scs_result_t;

pub type scs_telemetry_unregister_from_event_t = unsafe extern "system" fn(scs_u32_t) -> scs_result_t;

pub type scs_telemetry_register_for_channel_t = unsafe extern "system" fn(
    scs_string_t,
    scs_u32_t,
    scs_value_type_t,
    scs_u32_t,
    scs_telemetry_channel_callback_t,
    scs_context_t,
) -> scs_result_t;

pub type scs_telemetry_unregister_from_channel_t =
    unsafe extern "system" fn(scs_string_t, scs_u32_t, scs_value_type_t) -> scs_result_t;

#[repr(C)]
pub struct scs_sdk_init_params_v100_t {
    pub game_name: scs_string_t,
    pub game_id: scs_string_t,
    pub game_version: scs_u32_t,
    pub log: Option<scs_log_t>,
}

#[repr(C)]
pub struct scs_telemetry_init_params_v101_t {
    pub common: scs_sdk_init_params_v100_t,
    pub register_for_event: Option<scs_telemetry_register_for_event_t>,
    pub unregister_from_event: Option<scs_telemetry_unregister_from_event_t>,
    pub register_for_channel: Option<scs_telemetry_register_for_channel_t>,
    pub unregister_from_channel: Option<scs_telemetry_unregister_from_channel_t>,
}

/// Largest member of the value union is `scs_value_dplacement_t`
#[repr(C)]
#[derive(Clone, Copy)]
pub union scs_value_payload_t {
    pub value_bool: u8,
    pub value_s32: i32,
    pub value_u32: u32,
    pub value_u64: u64,
    pub value_float: f32,
    pub value_double: f64,
    raw: [u8; 40],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct scs_value_t {
    pub type_: scs_value_type_t,
    pub _padding: scs_u32_t,
    pub payload: scs_value_payload_t,
}

impl scs_value_t {
    pub fn from_bool(value: bool) -> Self {
        let mut payload = scs_value_payload_t { raw: [0; 40] };
        payload.value_bool = value as u8;
        Self {
            type_: SCS_VALUE_TYPE_BOOL,
            _padding: 0,
            payload,
        }
    }

    /// The boolean payload, or `None` if the value has another type
    pub fn as_bool(&self) -> Option<bool> {
        // Every union member is plain data; the tag says which one is live.
        (self.type_ == SCS_VALUE_TYPE_BOOL).then(|| unsafe { self.payload.value_bool } != 0)
    }
}

/// Channel callback for `trailer.N.connected`.
///
/// `context` is the [`TrailerConnectivity`] owned by the plugin context; it
/// stays alive until `scs_telemetry_shutdown` returns, after which the host no
/// longer calls registered callbacks.
pub unsafe extern "system" fn trailer_connected_callback(
    name: scs_string_t,
    _index: scs_u32_t,
    value: *const scs_value_t,
    context: scs_context_t,
) {
    let _ = std::panic::catch_unwind(|| {
        if name.is_null() || context.is_null() {
            return;
        }
        let connectivity = unsafe { &*(context as *const TrailerConnectivity) };
        let name = unsafe { CStr::from_ptr(name) }.to_string_lossy();
        let value = unsafe { value.as_ref() }.and_then(scs_value_t::as_bool);

        if let Err(e) = connectivity.apply_channel(&name, value) {
            tracing::warn!("Ignoring telemetry update for {}: {}", name, e);
        }
    });
}
