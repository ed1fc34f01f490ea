mod descriptor;
pub mod layout;
#[cfg(test)]
mod mock;
#[cfg(target_os = "windows")]
mod process;
mod reader;
mod region;

pub use descriptor::{FieldDescriptor, FieldShape};
pub use reader::{ReadMemory, WriteMemory, as_module_offset, rip_relative_target};
pub use region::{
    MAX_PLAUSIBLE_POINTER, MIN_PLAUSIBLE_POINTER, MemoryRegion, PAGE_SIZE, Protection,
    is_plausible_pointer,
};

#[cfg(target_os = "windows")]
pub use process::ProcessMemory;

#[cfg(test)]
pub use mock::{MockMemory, MockMemoryBuilder};
