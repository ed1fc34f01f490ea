//! Calls into host code for the trailer features

use std::mem::transmute;

use ts_extra_core::memory::layout::{chassis, game_actor, joint, trailer, vehicle};
use ts_extra_core::memory::{ProcessMemory, ReadMemory, WriteMemory};
use ts_extra_core::{Error, JointMotion, Result, TrailerFunctions, TrailerHandle, TrailerHost};

type SetIndividualSteeringFn = unsafe extern "system" fn(u64, f32);
type GetSlaveHookPositionFn = unsafe extern "system" fn(u64, *mut [f32; 3]);
type ConnectFn = unsafe extern "system" fn(u64, u64, *const [f32; 3], u32, bool, bool);
type SetTrailerBraceFn = unsafe extern "system" fn(u64, bool);
type DisconnectFn = unsafe extern "system" fn(u64);
type SetMotionFn = unsafe extern "system" fn(u64, u32, u32);

/// Offset from a vehicle's hook locator to the point a trailer attaches to
pub fn hook_offset(hook_position: [f32; 3], locator: [f32; 3]) -> [f32; 3] {
    std::array::from_fn(|i| hook_position[i] - locator[i])
}

pub struct ProcessTrailerHost<'a> {
    memory: &'a ProcessMemory,
    functions: TrailerFunctions,
    game_actor: u64,
}

impl<'a> ProcessTrailerHost<'a> {
    pub fn new(memory: &'a ProcessMemory, functions: TrailerFunctions, game_actor: u64) -> Self {
        Self {
            memory,
            functions,
            game_actor,
        }
    }

    fn virtual_fn(&self, object: u64, slot: u64) -> Result<u64> {
        let vtable = self.memory.read_pointer(object)?;
        self.memory.read_pointer(vtable + slot * 8)
    }

    fn read_vec3(&self, address: u64) -> Result<[f32; 3]> {
        Ok([
            self.memory.read_f32(address)?,
            self.memory.read_f32(address + 4)?,
            self.memory.read_f32(address + 8)?,
        ])
    }

    /// Parent vehicle object and attach offset for a trailer hooked to the truck
    fn truck_attachment(&self) -> Result<(u64, [f32; 3])> {
        let truck = self
            .memory
            .read_pointer(self.game_actor + game_actor::GAME_PHYSICS_VEHICLE)?;
        let chassis_data = self
            .memory
            .read_pointer(truck + vehicle::ACCESSORY_CHASSIS_DATA)?;
        let position = self.read_vec3(chassis_data + chassis::HOOK_POSITION)?;
        let locator = self.read_vec3(truck + vehicle::HOOK_LOCATOR)?;
        Ok((truck, hook_offset(position, locator)))
    }

    fn slave_attachment(&self, parent: &TrailerHandle) -> Result<(u64, [f32; 3])> {
        let function = self.functions.slave_hook_position.ok_or_else(|| {
            Error::FeatureUnavailable("get_slave_hook_position was not located".to_string())
        })?;
        let mut position = [0.0f32; 3];
        unsafe {
            let get_slave_hook_position = transmute::<u64, GetSlaveHookPositionFn>(function);
            get_slave_hook_position(parent.address, &mut position);
        }
        let locator = self.read_vec3(parent.address + trailer::HOOK_LOCATOR)?;
        Ok((parent.address, hook_offset(position, locator)))
    }

    fn set_trailer_brace(&self, trailer: &TrailerHandle, lowered: bool) -> Result<()> {
        let function = self.virtual_fn(trailer.address, trailer::SET_TRAILER_BRACE_SLOT)?;
        unsafe { transmute::<u64, SetTrailerBraceFn>(function)(trailer.address, lowered) };
        Ok(())
    }
}

impl TrailerHost for ProcessTrailerHost<'_> {
    fn set_steering(&mut self, trailer: &TrailerHandle, angle: f32) -> Result<()> {
        let (Some(function), Some(wheel_steering)) =
            (self.functions.set_individual_steering, trailer.wheel_steering)
        else {
            return Err(Error::FeatureUnavailable(
                "set_individual_steering was not located".to_string(),
            ));
        };

        self.memory.write_f32(trailer.address + trailer::STEERING, angle)?;
        unsafe { transmute::<u64, SetIndividualSteeringFn>(function)(wheel_steering, angle) };
        Ok(())
    }

    fn set_joint_motion(&mut self, trailer: &TrailerHandle, motion: JointMotion) -> Result<()> {
        let px_joint = trailer.px_joint.ok_or_else(|| {
            Error::FeatureUnavailable(format!("trailer {} has no PhysX joint", trailer.index))
        })?;
        let set_motion = self.virtual_fn(px_joint, joint::SET_MOTION_SLOT)?;
        unsafe {
            transmute::<u64, SetMotionFn>(set_motion)(px_joint, joint::AXIS_TWIST, motion.raw())
        };
        Ok(())
    }

    fn connect(&mut self, trailer: &TrailerHandle, parent: Option<&TrailerHandle>) -> Result<()> {
        let (parent_vehicle, offset) = match parent {
            None => self.truck_attachment()?,
            Some(parent) => self.slave_attachment(parent)?,
        };
        let connect = self.virtual_fn(trailer.address, trailer::CONNECT_SLOT)?;

        unsafe {
            transmute::<u64, ConnectFn>(connect)(
                trailer.address,
                parent_vehicle,
                &offset,
                0,
                true,
                false,
            )
        };
        self.set_trailer_brace(trailer, false)
    }

    fn disconnect(&mut self, trailer: &TrailerHandle) -> Result<()> {
        let disconnect = self.virtual_fn(trailer.address, trailer::DISCONNECT_SLOT)?;
        self.set_trailer_brace(trailer, true)?;
        unsafe { transmute::<u64, DisconnectFn>(disconnect)(trailer.address) };
        Ok(())
    }
}
