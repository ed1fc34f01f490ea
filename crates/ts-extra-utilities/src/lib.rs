//! # ts-extra-utilities
//!
//! SCS telemetry plugin that adds trailer steering, joint and connection
//! controls to the game through an in-game overlay.
//!
//! The host loads the library and calls [`scs_telemetry_init`]. From there the
//! plugin registers for the trailer connectivity channels and, on Windows,
//! locates the host functions it needs, installs its hooks and starts the
//! overlay.

pub mod context;
pub mod logging;
#[cfg(target_os = "windows")]
mod platform;
pub mod scs;

use std::ffi::CString;
use std::sync::Arc;

use tracing::{error, info, warn};
use ts_extra_core::TrailerConnectivity;
use ts_extra_core::memory::layout::MAX_TRAILERS;
use ts_extra_core::telemetry::channel_name;

use crate::context::PluginContext;
use crate::scs::{
    SCS_RESULT_GENERIC_ERROR, SCS_RESULT_OK, SCS_RESULT_UNSUPPORTED,
    SCS_TELEMETRY_CHANNEL_FLAG_NONE, SCS_TELEMETRY_VERSION_1_01, SCS_U32_NIL,
    SCS_VALUE_TYPE_BOOL, scs_context_t, scs_result_t, scs_telemetry_init_params_v101_t,
    scs_telemetry_register_for_channel_t, scs_u32_t, trailer_connected_callback,
};

/// Register `trailer.{i}.connected` for every tracked trailer.
///
/// Returns how many registrations the host accepted. A refused channel only
/// leaves that trailer's flag at "disconnected".
pub fn register_trailer_channels(
    register: scs_telemetry_register_for_channel_t,
    connectivity: &TrailerConnectivity,
) -> usize {
    let context = connectivity as *const TrailerConnectivity as scs_context_t;
    let mut registered = 0;

    for index in 0..MAX_TRAILERS {
        let name = channel_name(index);
        let Ok(c_name) = CString::new(name.as_str()) else {
            continue;
        };
        let result = unsafe {
            register(
                c_name.as_ptr(),
                SCS_U32_NIL,
                SCS_VALUE_TYPE_BOOL,
                SCS_TELEMETRY_CHANNEL_FLAG_NONE,
                trailer_connected_callback,
                context,
            )
        };
        if result == SCS_RESULT_OK {
            info!("Registered for {}", name);
            registered += 1;
        } else {
            warn!("Failed to register for {} (result: {})", name, result);
        }
    }
    registered
}

unsafe fn init(version: scs_u32_t, params: *const scs_telemetry_init_params_v101_t) -> scs_result_t {
    if version < SCS_TELEMETRY_VERSION_1_01 {
        return SCS_RESULT_UNSUPPORTED;
    }
    let Some(params) = (unsafe { params.as_ref() }) else {
        return SCS_RESULT_GENERIC_ERROR;
    };

    logging::init(params.common.log);
    info!("Starting initialization...");

    let context = Arc::new(PluginContext::new());

    #[cfg(target_os = "windows")]
    if let Err(e) = platform::start(&context) {
        error!("Initialization failed: {:#}", e);
        platform::stop(&context);
        logging::detach();
        return SCS_RESULT_GENERIC_ERROR;
    }

    match params.register_for_channel {
        Some(register) => {
            let registered = register_trailer_channels(register, context.connectivity());
            info!(
                "Trailer telemetry registration complete ({}/{} channels)",
                registered, MAX_TRAILERS
            );
        }
        None => error!("Cannot register telemetry: register_for_channel is null"),
    }

    context::install(context);
    info!("Initialization completed successfully");
    SCS_RESULT_OK
}

fn shutdown() {
    let Some(context) = context::release() else {
        return;
    };
    info!("Shutting down...");

    #[cfg(target_os = "windows")]
    platform::stop(&context);

    drop(context);
    info!("Shutdown completed");
    logging::detach();
}

/// # Safety
///
/// Called by the host with its telemetry init parameters.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scs_telemetry_init(
    version: scs_u32_t,
    params: *const scs_telemetry_init_params_v101_t,
) -> scs_result_t {
    std::panic::catch_unwind(|| unsafe { init(version, params) })
        .unwrap_or(SCS_RESULT_GENERIC_ERROR)
}

#[unsafe(no_mangle)]
pub extern "system" fn scs_telemetry_shutdown() {
    let _ = std::panic::catch_unwind(shutdown);
}

#[cfg(test)]
mod tests {
    use std::ffi::{CStr, c_char};
    use std::sync::Mutex;

    use super::*;
    use crate::scs::{scs_telemetry_channel_callback_t, scs_value_t, scs_value_type_t};

    static SEEN: Mutex<Vec<String>> = Mutex::new(Vec::new());

    unsafe extern "system" fn fake_register(
        name: *const c_char,
        index: scs_u32_t,
        value_type: scs_value_type_t,
        flags: scs_u32_t,
        callback: scs_telemetry_channel_callback_t,
        context: scs_context_t,
    ) -> scs_result_t {
        let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();
        assert_eq!(index, SCS_U32_NIL);
        assert_eq!(value_type, SCS_VALUE_TYPE_BOOL);
        assert_eq!(flags, SCS_TELEMETRY_CHANNEL_FLAG_NONE);

        let refused = name == "trailer.7.connected";
        if !refused {
            // Deliver an initial "connected" sample like the host does.
            let value = scs_value_t::from_bool(true);
            let c_name = CString::new(name.clone()).unwrap();
            unsafe { callback(c_name.as_ptr(), SCS_U32_NIL, &value, context) };
        }
        SEEN.lock().unwrap().push(name);
        if refused { -3 } else { SCS_RESULT_OK }
    }

    #[test]
    fn test_registers_every_trailer_channel() {
        let connectivity = TrailerConnectivity::new();
        let registered = register_trailer_channels(fake_register, &connectivity);

        assert_eq!(registered, MAX_TRAILERS - 1);
        let seen = SEEN.lock().unwrap();
        assert_eq!(seen.len(), MAX_TRAILERS);
        assert_eq!(seen[0], "trailer.0.connected");
        assert_eq!(seen[9], "trailer.9.connected");

        assert_eq!(connectivity.connected_count(), MAX_TRAILERS - 1);
        assert!(!connectivity.is_connected(7));
    }

    #[test]
    fn test_init_rejects_old_sdk_and_null_params() {
        unsafe {
            assert_eq!(
                scs_telemetry_init(crate::scs::scs_make_version(1, 0), std::ptr::null()),
                SCS_RESULT_UNSUPPORTED
            );
            assert_eq!(
                scs_telemetry_init(SCS_TELEMETRY_VERSION_1_01, std::ptr::null()),
                SCS_RESULT_GENERIC_ERROR
            );
        }
    }
}
