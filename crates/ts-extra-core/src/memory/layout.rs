//! Memory layout constants for host structures
//!
//! This module centralizes every structural offset used to walk host objects.
//! Values track one host build; when a host update moves a field, only this
//! module changes.

/// Instruction shape of the base-controller candidates:
/// `mov reg, [rip+disp32]` ... `mov reg, [reg+disp32]`
pub mod base_ctrl {
    /// Position of the RIP-relative displacement inside the matched instruction
    pub const DISP_OFFSET: u64 = 3;
    /// Length of the RIP-relative `mov` instruction
    pub const INSTR_LEN: u64 = 7;
    /// Position of the game-actor field displacement inside the matched sequence
    pub const ACTOR_OFFSET_DISP: u64 = 14;
    /// `selected_physics_engine` field; value 1 means PhysX
    pub const SELECTED_PHYSICS_ENGINE: u64 = 0x1FC;
    pub const PHYSICS_ENGINE_PHYSX: u32 = 1;
}

/// Game actor (the player's vehicle controller)
pub mod game_actor {
    /// Fallback probe table for the game-actor field inside the base controller,
    /// in probe order
    pub const ACTOR_OFFSET_CANDIDATES: [u32; 8] =
        [0x2e8, 0x2f0, 0x300, 0x310, 0x2d8, 0x2c8, 0x320, 0x330];
    /// Bytes that must be readable at the actor pointer before trusting it
    pub const MIN_READABLE_SIZE: usize = 0x100;
    /// First trailer attached to the truck
    pub const GAME_TRAILER_ACTOR: u64 = 0x98;
    /// Physics vehicle of the player's truck
    pub const GAME_PHYSICS_VEHICLE: u64 = 0x90;
}

/// `game_trailer_actor_u` / `physics_trailer_u`
pub mod trailer {
    /// Next trailer in the chain (null for the last one)
    pub const SLAVE_TRAILER: u64 = 0x638;
    /// Physics joint to the parent vehicle (null while disconnected)
    pub const PHYSICS_JOINT: u64 = 0x640;
    /// Wheel steering block passed to the steering setter
    pub const WHEEL_STEERING: u64 = 0x6A0;
    /// Current steering input in `[-1.0, 1.0]`
    pub const STEERING: u64 = 0x6A8;
    /// vtable slot of `steering_advance`
    pub const STEERING_ADVANCE_SLOT: u64 = 73;
    /// vtable slot of `connect`
    pub const CONNECT_SLOT: u64 = 62;
    /// vtable slot of `disconnect`
    pub const DISCONNECT_SLOT: u64 = 63;
    /// vtable slot of `set_trailer_brace`
    pub const SET_TRAILER_BRACE_SLOT: u64 = 66;
    /// Hook locator of the vehicle, relative to the vehicle object
    pub const HOOK_LOCATOR: u64 = 0x5C0;
    /// Bytes that must be readable before a trailer object is walked
    pub const MIN_READABLE_SIZE: usize = 0x6B0;
}

/// `physics_vehicle_u` (truck side of the first joint)
pub mod vehicle {
    /// Chassis accessory data of the truck
    pub const ACCESSORY_CHASSIS_DATA: u64 = 0x4F8;
    /// Hook locator of the truck (same field as on trailers)
    pub const HOOK_LOCATOR: u64 = super::trailer::HOOK_LOCATOR;
}

/// `accessory_chassis_data_t`
pub mod chassis {
    /// Fifth-wheel position in vehicle space
    pub const HOOK_POSITION: u64 = 0x1A4;
}

/// PhysX joint wrapper held by a trailer
pub mod joint {
    /// `PxD6Joint*` inside the wrapper
    pub const PX_JOINT: u64 = 0x10;
    /// vtable slot of `PxD6Joint::setMotion`
    pub const SET_MOTION_SLOT: u64 = 26;
    /// `PxD6Axis::eTWIST`
    pub const AXIS_TWIST: u32 = 3;
    /// `PxD6Motion::eLOCKED`
    pub const MOTION_LOCKED: u32 = 0;
    /// `PxD6Motion::eFREE`
    pub const MOTION_FREE: u32 = 2;
}

/// Relative call into `get_slave_hook_position` inside `connect_slave`
pub mod connect_slave {
    pub const HOOK_POSITION_CALL_DISP: u64 = 29;
    pub const HOOK_POSITION_CALL_LEN: u64 = 4;
}

/// Maximum trailers tracked by the overlay state
pub const MAX_TRAILER_SLOTS: usize = 20;

/// Maximum trailers reported by telemetry channels
pub const MAX_TRAILERS: usize = 10;
