//! Best-effort walk of the trailer chain hanging off the game actor.
//!
//! Trailer linkage in host memory has changed between host builds; callers
//! must treat the result as advisory and use the telemetry table for the
//! authoritative connected state.

use crate::memory::layout::{MAX_TRAILER_SLOTS, game_actor, joint, trailer};
use crate::memory::{ReadMemory, is_plausible_pointer};

/// Snapshot of one trailer object taken during a chain walk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailerHandle {
    /// Position in the chain, 0 being the trailer hooked to the truck
    pub index: usize,
    pub address: u64,
    pub steering: f32,
    /// Steering block handed to the host steering setter
    pub wheel_steering: Option<u64>,
    /// Physics joint to the parent vehicle; `None` while disconnected
    pub joint: Option<u64>,
    /// PhysX joint inside [`joint`](Self::joint)
    pub px_joint: Option<u64>,
}

impl TrailerHandle {
    pub fn is_connected(&self) -> bool {
        self.joint.is_some()
    }

    pub fn has_px_joint(&self) -> bool {
        self.px_joint.is_some()
    }
}

fn read_optional_pointer<R: ReadMemory + ?Sized>(reader: &R, address: u64) -> Option<u64> {
    reader
        .read_u64(address)
        .ok()
        .filter(|&value| is_plausible_pointer(value))
}

/// Snapshot the trailer object at `address`, or `None` if it is not readable
pub fn read_trailer<R: ReadMemory + ?Sized>(
    reader: &R,
    index: usize,
    address: u64,
) -> Option<TrailerHandle> {
    if !is_plausible_pointer(address) || !reader.is_readable(address, trailer::MIN_READABLE_SIZE) {
        return None;
    }

    let steering = reader.read_f32(address + trailer::STEERING).ok()?;
    let physics_joint = read_optional_pointer(reader, address + trailer::PHYSICS_JOINT);
    let px_joint =
        physics_joint.and_then(|j| read_optional_pointer(reader, j + joint::PX_JOINT));

    Some(TrailerHandle {
        index,
        address,
        steering,
        wheel_steering: read_optional_pointer(reader, address + trailer::WHEEL_STEERING),
        joint: physics_joint,
        px_joint,
    })
}

/// Follow `game_actor -> first trailer -> slave_trailer -> ...`.
///
/// Stops at a null link, an unreadable trailer, a cycle or
/// [`MAX_TRAILER_SLOTS`] entries.
pub fn walk_trailer_chain<R: ReadMemory + ?Sized>(reader: &R, actor: u64) -> Vec<TrailerHandle> {
    let mut chain: Vec<TrailerHandle> = Vec::new();
    let mut next = read_optional_pointer(reader, actor.wrapping_add(game_actor::GAME_TRAILER_ACTOR));

    while let Some(address) = next {
        if chain.len() >= MAX_TRAILER_SLOTS || chain.iter().any(|t| t.address == address) {
            break;
        }
        let Some(handle) = read_trailer(reader, chain.len(), address) else {
            break;
        };
        chain.push(handle);
        next = read_optional_pointer(reader, address + trailer::SLAVE_TRAILER);
    }

    chain
}

/// Last trailer in the unbroken run of connected trailers behind the truck
pub fn last_connected(chain: &[TrailerHandle]) -> Option<&TrailerHandle> {
    chain.iter().take_while(|t| t.is_connected()).last()
}

/// Chain position of the trailer object at `address`
pub fn index_of(chain: &[TrailerHandle], address: u64) -> Option<usize> {
    chain.iter().position(|t| t.address == address)
}
