//! DirectInput mouse interception.
//!
//! `IDirectInputDevice8W::GetDeviceData` is hooked for every device; records
//! from mouse devices are fed to the overlay input state and withheld from the
//! game while the overlay owns the mouse.

use std::ffi::c_void;

use anyhow::{Result, anyhow};
use tracing::debug;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::core::{GUID, PCWSTR};

use ts_extra_core::{HookSwitch, MouseAxis};

use super::hooks::{FunctionHook, Trampoline};
use crate::context;

const DIRECTINPUT_VERSION: u32 = 0x0800;
const IID_IDIRECTINPUT8W: GUID = GUID::from_u128(0xbf798031_483a_4da2_aa99_5d64ed369700);
const GUID_SYS_MOUSE: GUID = GUID::from_u128(0x6f1d2b60_d5a0_11cf_bfc7_444553540000);

/// `IDirectInput8W` vtable slots
const DINPUT_RELEASE: usize = 2;
const DINPUT_CREATE_DEVICE: usize = 3;
/// `IDirectInputDevice8W` vtable slots
const DEVICE_RELEASE: usize = 2;
const DEVICE_GET_CAPABILITIES: usize = 3;
const DEVICE_GET_DEVICE_DATA: usize = 10;

const DI8DEVTYPE_MOUSE: u32 = 0x12;
/// `GetDeviceData` flag: return records without removing them from the buffer
const DIGDD_PEEK: u32 = 0x1;
/// `DIDEVICEOBJECTDATA_DX3`: `dwOfs`, `dwData`, `dwTimeStamp`, `dwSequence`
const MIN_RECORD_SIZE: usize = 16;

#[link(name = "dinput8")]
unsafe extern "system" {
    fn DirectInput8Create(
        hinst: *mut c_void,
        version: u32,
        riid: *const GUID,
        out: *mut *mut c_void,
        outer: *mut c_void,
    ) -> i32;
}

type ReleaseFn = unsafe extern "system" fn(*mut c_void) -> u32;
type CreateDeviceFn =
    unsafe extern "system" fn(*mut c_void, *const GUID, *mut *mut c_void, *mut c_void) -> i32;
type GetCapabilitiesFn = unsafe extern "system" fn(*mut c_void, *mut DeviceCaps) -> i32;
type GetDeviceDataFn =
    unsafe extern "system" fn(*mut c_void, u32, *mut u8, *mut u32, u32) -> i32;

/// `DIDEVCAPS`
#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
struct DeviceCaps {
    size: u32,
    flags: u32,
    dev_type: u32,
    axes: u32,
    buttons: u32,
    povs: u32,
    ff_sample_period: u32,
    ff_min_time_resolution: u32,
    firmware_revision: u32,
    hardware_revision: u32,
    ff_driver_version: u32,
}

pub(super) static GET_DEVICE_DATA_ORIGINAL: Trampoline = Trampoline::new();

unsafe fn vtable_entry(object: *mut c_void, slot: usize) -> *const c_void {
    unsafe {
        let vtable = *(object as *const *const *const c_void);
        *vtable.add(slot)
    }
}

/// Address of `GetDeviceData`, read from a throwaway system mouse device
fn get_device_data_address() -> Result<u64> {
    let module = unsafe { GetModuleHandleW(PCWSTR::null()) }?;

    let mut dinput: *mut c_void = std::ptr::null_mut();
    let hr = unsafe {
        DirectInput8Create(
            module.0,
            DIRECTINPUT_VERSION,
            &IID_IDIRECTINPUT8W,
            &mut dinput,
            std::ptr::null_mut(),
        )
    };
    if hr < 0 || dinput.is_null() {
        return Err(anyhow!("DirectInput8Create failed: {:#x}", hr));
    }

    let mut device: *mut c_void = std::ptr::null_mut();
    let address = unsafe {
        let create_device: CreateDeviceFn =
            std::mem::transmute(vtable_entry(dinput, DINPUT_CREATE_DEVICE));
        let hr = create_device(dinput, &GUID_SYS_MOUSE, &mut device, std::ptr::null_mut());
        let address = if hr < 0 || device.is_null() {
            Err(anyhow!("CreateDevice(GUID_SysMouse) failed: {:#x}", hr))
        } else {
            let address = vtable_entry(device, DEVICE_GET_DEVICE_DATA) as u64;
            let release: ReleaseFn = std::mem::transmute(vtable_entry(device, DEVICE_RELEASE));
            release(device);
            Ok(address)
        };
        let release: ReleaseFn = std::mem::transmute(vtable_entry(dinput, DINPUT_RELEASE));
        release(dinput);
        address
    }?;

    debug!("IDirectInputDevice8W::GetDeviceData @ {:#x}", address);
    Ok(address)
}

unsafe fn is_mouse(device: *mut c_void) -> bool {
    let mut caps = DeviceCaps {
        size: std::mem::size_of::<DeviceCaps>() as u32,
        ..Default::default()
    };
    unsafe {
        let get_capabilities: GetCapabilitiesFn =
            std::mem::transmute(vtable_entry(device, DEVICE_GET_CAPABILITIES));
        get_capabilities(device, &mut caps) >= 0 && caps.dev_type & 0xFF == DI8DEVTYPE_MOUSE
    }
}

/// `(dwOfs, dwData)` of every record in a `GetDeviceData` buffer.
///
/// Records are `record_size` bytes apart; only their first two fields are
/// read, so both the DX3 and the DX8 record layouts are accepted.
fn mouse_records(buffer: &[u8], record_size: usize) -> impl Iterator<Item = (u32, i32)> + '_ {
    let field = |record: &[u8], at: usize| {
        u32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
    };
    buffer
        .chunks_exact(record_size.max(MIN_RECORD_SIZE))
        .filter(move |_| record_size >= MIN_RECORD_SIZE)
        .map(move |record| (field(record, 0), field(record, 4) as i32))
}

/// Feed the returned records to the overlay; `true` if they must be withheld
unsafe fn consume_records(
    device: *mut c_void,
    buffer: &[u8],
    record_size: usize,
    peek: bool,
) -> bool {
    let Some(context) = context::current() else {
        return false;
    };
    let Some(mut input) = context.input() else {
        return false;
    };
    if !input.is_capturing_mouse() || !unsafe { is_mouse(device) } {
        return false;
    }

    // Peeked records come back again on the next read.
    if !peek {
        for (offset, delta) in mouse_records(buffer, record_size) {
            input.on_mouse_input(MouseAxis::from_offset(offset), delta);
        }
    }
    true
}

unsafe extern "system" fn get_device_data_detour(
    device: *mut c_void,
    record_size: u32,
    records: *mut u8,
    in_out: *mut u32,
    flags: u32,
) -> i32 {
    let Some(original) = GET_DEVICE_DATA_ORIGINAL.get() else {
        return -1;
    };
    let original: GetDeviceDataFn = unsafe { std::mem::transmute(original) };
    let hr = unsafe { original(device, record_size, records, in_out, flags) };
    if hr < 0 || records.is_null() || in_out.is_null() {
        return hr;
    }

    let record_size = record_size as usize;
    if record_size < MIN_RECORD_SIZE {
        return hr;
    }
    let count = unsafe { *in_out } as usize;
    let buffer = unsafe { std::slice::from_raw_parts(records, count * record_size) };
    let withheld = std::panic::catch_unwind(|| unsafe {
        consume_records(device, buffer, record_size, flags & DIGDD_PEEK != 0)
    })
    .unwrap_or(false);
    if withheld {
        unsafe { *in_out = 0 };
    }
    hr
}

/// Create and enable the `GetDeviceData` hook
pub fn hook_mouse_input() -> Result<FunctionHook> {
    let target = get_device_data_address()?;
    let mut hook = FunctionHook::create(
        "IDirectInputDevice8W::GetDeviceData",
        target,
        get_device_data_detour as *const c_void,
    )?;
    GET_DEVICE_DATA_ORIGINAL.set(hook.original());
    hook.enable()?;
    Ok(hook)
}
