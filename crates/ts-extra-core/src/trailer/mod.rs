//! Trailer steering, joint and connection control
//!
//! [`TrailerManipulation::init`] locates the host functions once. Every later
//! action goes through two narrow seams: [`TrailerHost`] performs the actual
//! calls into host code, and [`HookSwitch`] toggles the hook that keeps the
//! host from reconnecting slave trailers on its own.
//!
//! When the crash-guard function cannot be located the whole feature set is
//! disabled. Disconnecting a slave trailer without that guard crashes the host.

mod chain;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use strum::{Display, IntoStaticStr};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::memory::layout::{MAX_TRAILER_SLOTS, connect_slave, joint};
use crate::memory::{ReadMemory, as_module_offset, rip_relative_target};
use crate::scanner::{
    CONNECT_SLAVE_PATTERNS, CONNECT_SLAVE_TARGET, CRASH_FUNCTION_PATTERNS, CRASH_GUARD_TARGET,
    PatternCandidate, RobustPatternScanner, SET_INDIVIDUAL_STEERING_PATTERNS,
    SET_INDIVIDUAL_STEERING_TARGET,
};

pub use chain::{TrailerHandle, index_of, last_connected, read_trailer, walk_trailer_chain};

/// Steering change applied by one nudge
pub const STEERING_STEP: f32 = 0.02;

/// Host modules whose presence means the game runs under TruckersMP
pub const TRUCKERSMP_MODULES: [&str; 2] = ["core_ets2mp.dll", "core_atsmp.dll"];

const DISABLED_NO_CRASH_GUARD: &str =
    "Trailer manipulation is disabled: the disconnect crash guard could not be located";
const DISABLED_TRUCKERSMP: &str = "Individually detachable trailers do not work in TruckersMP";

/// Joint state tracked per trailer slot by the overlay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, IntoStaticStr)]
pub enum JointState {
    #[default]
    #[strum(serialize = "Unlocked")]
    Normal,
    Locked,
    Disconnected,
}

/// Twist-axis motion of a PhysX D6 joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum JointMotion {
    Locked,
    Free,
}

impl JointMotion {
    /// `PxD6Motion` value passed to `setMotion`
    pub fn raw(self) -> u32 {
        match self {
            JointMotion::Locked => joint::MOTION_LOCKED,
            JointMotion::Free => joint::MOTION_FREE,
        }
    }
}

/// Calls into host code on behalf of the trailer features
pub trait TrailerHost {
    /// Store `angle` in the trailer and push it through the steering setter
    fn set_steering(&mut self, trailer: &TrailerHandle, angle: f32) -> Result<()>;

    fn set_joint_motion(&mut self, trailer: &TrailerHandle, motion: JointMotion) -> Result<()>;

    /// Attach `trailer` behind `parent`, or behind the truck when `parent` is `None`
    fn connect(&mut self, trailer: &TrailerHandle, parent: Option<&TrailerHandle>) -> Result<()>;

    /// Lower the trailer brace and detach the trailer
    fn disconnect(&mut self, trailer: &TrailerHandle) -> Result<()>;
}

/// An installed hook that can be switched on and off
pub trait HookSwitch {
    fn enable(&mut self) -> Result<()>;
    fn disable(&mut self) -> Result<()>;
    fn is_enabled(&self) -> bool;
}

/// Host functions located during [`TrailerManipulation::init`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrailerFunctions {
    pub set_individual_steering: Option<u64>,
    pub crash_guard: Option<u64>,
    pub connect_slave: Option<u64>,
    pub slave_hook_position: Option<u64>,
}

/// Per-slot steering locks, shared with the steering-advance detour
#[derive(Debug, Default)]
pub struct SteeringLocks {
    locked: [AtomicBool; MAX_TRAILER_SLOTS],
}

impl SteeringLocks {
    pub fn is_locked(&self, index: usize) -> bool {
        self.locked
            .get(index)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    fn set(&self, index: usize, locked: bool) {
        if let Some(flag) = self.locked.get(index) {
            flag.store(locked, Ordering::Release);
        }
    }

    /// Whether the host may run its own steering for the trailer at chain
    /// position `index`. Unknown trailers are always left to the host.
    pub fn allows_game_steering(&self, index: Option<usize>) -> bool {
        index.is_none_or(|i| !self.is_locked(i))
    }
}

pub struct TrailerManipulation {
    functions: TrailerFunctions,
    truckersmp: bool,
    locks: Arc<SteeringLocks>,
    joints: [JointState; MAX_TRAILER_SLOTS],
}

impl TrailerManipulation {
    /// Locate the host functions the trailer features need.
    ///
    /// Never fails: a missing function disables the features that need it.
    pub fn init<R: ReadMemory>(scanner: &RobustPatternScanner<'_, R>, truckersmp: bool) -> Self {
        let reader = scanner.reader();
        let find = |target: &str, table: &[PatternCandidate]| {
            match scanner.find_with_fallbacks(target, table) {
                Ok(hit) => Some(hit.address),
                Err(e) => {
                    error!("Could not find '{}' function: {}", target, e);
                    None
                }
            }
        };

        let set_individual_steering =
            find(SET_INDIVIDUAL_STEERING_TARGET, SET_INDIVIDUAL_STEERING_PATTERNS);
        let connect_slave = find(CONNECT_SLAVE_TARGET, CONNECT_SLAVE_PATTERNS);
        let mut crash_guard = find(CRASH_GUARD_TARGET, CRASH_FUNCTION_PATTERNS);

        if crash_guard.is_none() {
            if let Some(anchor) = connect_slave.or(set_individual_steering) {
                crash_guard = Self::locate_near(scanner, anchor);
            }
        }

        let slave_hook_position = connect_slave.and_then(|address| {
            rip_relative_target(
                reader,
                address,
                connect_slave::HOOK_POSITION_CALL_DISP,
                connect_slave::HOOK_POSITION_CALL_DISP + connect_slave::HOOK_POSITION_CALL_LEN,
            )
            .inspect_err(|e| warn!("Could not decode get_slave_hook_position call: {}", e))
            .ok()
        });

        let functions = TrailerFunctions {
            set_individual_steering,
            crash_guard,
            connect_slave,
            slave_hook_position,
        };
        for (name, address) in [
            ("set_individual_steering", functions.set_individual_steering),
            ("crashes_when_disconnected", functions.crash_guard),
            ("connect_slave", functions.connect_slave),
            ("get_slave_hook_position", functions.slave_hook_position),
        ] {
            if let Some(address) = address {
                debug!("{} @ +0x{:X}", name, as_module_offset(reader, address));
            }
        }

        let manipulation = Self::with_functions(functions, truckersmp);
        match manipulation.disabled_reason() {
            None => info!("Trailer manipulation module initialized"),
            Some(reason) => warn!("{}", reason),
        }
        manipulation
    }

    pub fn with_functions(functions: TrailerFunctions, truckersmp: bool) -> Self {
        Self {
            functions,
            truckersmp,
            locks: Default::default(),
            joints: [JointState::Normal; MAX_TRAILER_SLOTS],
        }
    }

    /// Crash-guard fallback: a validated proximity hit is trusted, a structural
    /// guess is only logged.
    fn locate_near<R: ReadMemory>(scanner: &RobustPatternScanner<'_, R>, anchor: u64) -> Option<u64> {
        let range = scanner.limits().proximity_range;
        match scanner.find_function_near_address(anchor, CRASH_FUNCTION_PATTERNS, range) {
            Ok(hit) => return Some(hit.address),
            Err(e) => debug!("Proximity search for crash guard failed: {}", e),
        }

        if let Ok(guess) = scanner.analyze_binary_around_function(anchor, CRASH_GUARD_TARGET) {
            warn!(
                "Not hooking structural guess for {} at +0x{:X}; trailer manipulation stays disabled",
                CRASH_GUARD_TARGET,
                as_module_offset(scanner.reader(), guess)
            );
        }
        None
    }

    /// Share lock flags with code that outlives this value (hook detours)
    pub fn with_steering_locks(mut self, locks: Arc<SteeringLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn functions(&self) -> &TrailerFunctions {
        &self.functions
    }

    pub fn is_truckersmp(&self) -> bool {
        self.truckersmp
    }

    /// Features are on only when the crash guard was found
    pub fn is_enabled(&self) -> bool {
        self.functions.crash_guard.is_some()
    }

    /// Explanation shown in place of disabled controls
    pub fn disabled_reason(&self) -> Option<&'static str> {
        (!self.is_enabled()).then_some(DISABLED_NO_CRASH_GUARD)
    }

    /// Guard hooks (crash guard, connect slave) are never installed under TruckersMP
    pub fn should_install_guard_hooks(&self) -> bool {
        self.is_enabled() && !self.truckersmp
    }

    pub fn steering_available(&self, trailer: &TrailerHandle) -> bool {
        self.is_enabled()
            && self.functions.set_individual_steering.is_some()
            && trailer.wheel_steering.is_some()
    }

    /// `None` when connect/disconnect may be offered, otherwise why not
    pub fn connection_unavailable_reason(&self) -> Option<&'static str> {
        if !self.is_enabled() {
            Some(DISABLED_NO_CRASH_GUARD)
        } else if self.truckersmp {
            Some(DISABLED_TRUCKERSMP)
        } else {
            None
        }
    }

    pub fn steering_locks(&self) -> Arc<SteeringLocks> {
        self.locks.clone()
    }

    pub fn is_steering_locked(&self, index: usize) -> bool {
        self.locks.is_locked(index)
    }

    pub fn joint_state(&self, index: usize) -> JointState {
        self.joints.get(index).copied().unwrap_or_default()
    }

    pub fn set_steering_locked(&mut self, index: usize, locked: bool) -> Result<()> {
        self.ensure_enabled()?;
        check_slot(index)?;
        self.locks.set(index, locked);
        info!(
            "{} steering for {}",
            if locked { "Locking" } else { "Unlocking" },
            index
        );
        Ok(())
    }

    /// Set an absolute steering angle, clamped to `[-1, 1]`
    pub fn set_steering<H: TrailerHost + ?Sized>(
        &self,
        host: &mut H,
        trailer: &TrailerHandle,
        angle: f32,
    ) -> Result<f32> {
        self.ensure_steering(trailer)?;
        let angle = angle.clamp(-1.0, 1.0);
        host.set_steering(trailer, angle)?;
        debug!("Changed steering angle for trailer {} to {}", trailer.index, angle);
        Ok(angle)
    }

    /// Move the steering angle by `delta`, clamped to `[-1, 1]`
    pub fn nudge_steering<H: TrailerHost + ?Sized>(
        &self,
        host: &mut H,
        trailer: &TrailerHandle,
        delta: f32,
    ) -> Result<f32> {
        self.set_steering(host, trailer, trailer.steering + delta)
    }

    pub fn center_steering<H: TrailerHost + ?Sized>(
        &self,
        host: &mut H,
        trailer: &TrailerHandle,
    ) -> Result<f32> {
        self.set_steering(host, trailer, 0.0)
    }

    /// Lock or free the joint's twist axis, reconnecting first if the trailer
    /// was detached through [`disconnect`](Self::disconnect).
    pub fn set_joint<H, S>(
        &mut self,
        host: &mut H,
        hook: &mut S,
        chain: &[TrailerHandle],
        trailer: &TrailerHandle,
        state: JointState,
    ) -> Result<()>
    where
        H: TrailerHost + ?Sized,
        S: HookSwitch + ?Sized,
    {
        self.ensure_enabled()?;
        check_slot(trailer.index)?;
        let motion = match state {
            JointState::Normal => JointMotion::Free,
            JointState::Locked => JointMotion::Locked,
            JointState::Disconnected => return self.disconnect(host, trailer),
        };
        if !trailer.has_px_joint() {
            return Err(Error::FeatureUnavailable(
                "joint locking needs a PhysX joint".to_string(),
            ));
        }

        if self.joints[trailer.index] == JointState::Disconnected {
            self.connect(host, hook, chain, trailer)?;
        }
        self.joints[trailer.index] = state;
        host.set_joint_motion(trailer, motion)
    }

    /// Attach `trailer` behind the last connected trailer (or the truck).
    ///
    /// The connect-slave hook is enabled only for the duration of the call so
    /// the host does not reattach trailers further down the chain by itself.
    pub fn connect<H, S>(
        &mut self,
        host: &mut H,
        hook: &mut S,
        chain: &[TrailerHandle],
        trailer: &TrailerHandle,
    ) -> Result<()>
    where
        H: TrailerHost + ?Sized,
        S: HookSwitch + ?Sized,
    {
        self.ensure_connectable()?;
        check_slot(trailer.index)?;
        if self.functions.connect_slave.is_none() {
            return Err(Error::FeatureUnavailable(
                "connect_slave was not located".to_string(),
            ));
        }

        if trailer.is_connected() && self.joints[trailer.index] != JointState::Disconnected {
            return Err(Error::FeatureUnavailable(format!(
                "trailer {} is already connected",
                trailer.index
            )));
        }

        // Nothing may return between enabling and disabling the hook.
        hook.enable().inspect_err(|e| {
            error!("Could not enable 'connect_slave' hook in 'connect_trailer': {}", e)
        })?;

        // Only trailers ahead of this one can be its parent.
        let ahead = &chain[..trailer.index.min(chain.len())];
        let parent = last_connected(ahead);
        let result = host.connect(trailer, parent);

        if let Err(e) = hook.disable() {
            error!("Could not disable 'connect_slave' hook in 'connect_trailer': {}", e);
        }

        result?;
        self.joints[trailer.index] = JointState::Normal;
        info!("Connected trailer {}", trailer.index);
        Ok(())
    }

    pub fn disconnect<H: TrailerHost + ?Sized>(
        &mut self,
        host: &mut H,
        trailer: &TrailerHandle,
    ) -> Result<()> {
        self.ensure_connectable()?;
        check_slot(trailer.index)?;
        if !trailer.is_connected() {
            return Err(Error::FeatureUnavailable(format!(
                "trailer {} is not connected",
                trailer.index
            )));
        }

        host.disconnect(trailer)?;
        self.joints[trailer.index] = JointState::Disconnected;
        info!("Disconnected trailer {}", trailer.index);
        Ok(())
    }

    fn ensure_enabled(&self) -> Result<()> {
        match self.disabled_reason() {
            None => Ok(()),
            Some(reason) => Err(Error::FeatureUnavailable(reason.to_string())),
        }
    }

    fn ensure_connectable(&self) -> Result<()> {
        match self.connection_unavailable_reason() {
            None => Ok(()),
            Some(reason) => Err(Error::FeatureUnavailable(reason.to_string())),
        }
    }

    fn ensure_steering(&self, trailer: &TrailerHandle) -> Result<()> {
        self.ensure_enabled()?;
        check_slot(trailer.index)?;
        if !self.steering_available(trailer) {
            return Err(Error::FeatureUnavailable(
                "set_individual_steering was not located".to_string(),
            ));
        }
        if !self.locks.is_locked(trailer.index) {
            return Err(Error::SteeringNotLocked(trailer.index));
        }
        Ok(())
    }
}

fn check_slot(index: usize) -> Result<()> {
    if index >= MAX_TRAILER_SLOTS {
        return Err(Error::TrailerIndexOutOfRange {
            index,
            max: MAX_TRAILER_SLOTS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::chain::tests::{ACTOR, chain_memory};
    use super::*;
    use crate::memory::MockMemoryBuilder;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Steering(usize, f32),
        Motion(usize, JointMotion),
        Connect(usize, Option<usize>),
        Disconnect(usize),
    }

    #[derive(Default)]
    struct RecordingHost {
        calls: Vec<Call>,
        fail_connect: bool,
    }

    impl TrailerHost for RecordingHost {
        fn set_steering(&mut self, trailer: &TrailerHandle, angle: f32) -> Result<()> {
            self.calls.push(Call::Steering(trailer.index, angle));
            Ok(())
        }

        fn set_joint_motion(&mut self, trailer: &TrailerHandle, motion: JointMotion) -> Result<()> {
            self.calls.push(Call::Motion(trailer.index, motion));
            Ok(())
        }

        fn connect(&mut self, trailer: &TrailerHandle, parent: Option<&TrailerHandle>) -> Result<()> {
            self.calls
                .push(Call::Connect(trailer.index, parent.map(|p| p.index)));
            if self.fail_connect {
                return Err(Error::UnsafeMemoryAccess {
                    address: trailer.address,
                    size: 0,
                });
            }
            Ok(())
        }

        fn disconnect(&mut self, trailer: &TrailerHandle) -> Result<()> {
            self.calls.push(Call::Disconnect(trailer.index));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        enabled: bool,
        transitions: Vec<bool>,
    }

    impl HookSwitch for RecordingHook {
        fn enable(&mut self) -> Result<()> {
            self.enabled = true;
            self.transitions.push(true);
            Ok(())
        }

        fn disable(&mut self) -> Result<()> {
            self.enabled = false;
            self.transitions.push(false);
            Ok(())
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }
    }

    fn resolved() -> TrailerFunctions {
        TrailerFunctions {
            set_individual_steering: Some(0x40_1000),
            crash_guard: Some(0x40_2000),
            connect_slave: Some(0x40_3000),
            slave_hook_position: Some(0x40_4000),
        }
    }

    fn chain() -> Vec<TrailerHandle> {
        walk_trailer_chain(&chain_memory(), ACTOR)
    }

    #[test]
    fn test_steering_requires_lock() {
        let mut manipulation = TrailerManipulation::with_functions(resolved(), false);
        let mut host = RecordingHost::default();
        let trailer = chain()[0];

        assert!(matches!(
            manipulation.set_steering(&mut host, &trailer, 0.5),
            Err(Error::SteeringNotLocked(0))
        ));
        assert!(host.calls.is_empty());

        manipulation.set_steering_locked(0, true).unwrap();
        assert_eq!(manipulation.set_steering(&mut host, &trailer, 3.0).unwrap(), 1.0);
        assert_eq!(manipulation.center_steering(&mut host, &trailer).unwrap(), 0.0);
        assert_eq!(
            host.calls,
            vec![Call::Steering(0, 1.0), Call::Steering(0, 0.0)]
        );
    }

    #[test]
    fn test_repeated_nudges_clamp_to_one() {
        let mut manipulation = TrailerManipulation::with_functions(resolved(), false);
        manipulation.set_steering_locked(0, true).unwrap();
        let mut host = RecordingHost::default();
        let mut trailer = chain()[0];
        trailer.steering = 0.99;

        for _ in 0..5 {
            trailer.steering = manipulation
                .nudge_steering(&mut host, &trailer, STEERING_STEP)
                .unwrap();
            assert!(trailer.steering <= 1.0);
        }
        assert_eq!(trailer.steering, 1.0);

        trailer.steering = -0.99;
        for _ in 0..5 {
            trailer.steering = manipulation
                .nudge_steering(&mut host, &trailer, -STEERING_STEP)
                .unwrap();
        }
        assert_eq!(trailer.steering, -1.0);
    }

    #[test]
    fn test_missing_crash_guard_disables_everything() {
        let functions = TrailerFunctions {
            crash_guard: None,
            ..resolved()
        };
        let mut manipulation = TrailerManipulation::with_functions(functions, false);
        let mut host = RecordingHost::default();
        let mut hook = RecordingHook::default();
        let chain = chain();

        assert!(!manipulation.is_enabled());
        assert!(!manipulation.should_install_guard_hooks());
        assert!(manipulation.disabled_reason().is_some());

        assert!(manipulation.disconnect(&mut host, &chain[0]).is_err());
        assert!(manipulation.connect(&mut host, &mut hook, &chain, &chain[2]).is_err());
        assert!(manipulation.set_steering_locked(0, true).is_err());
        assert!(
            manipulation
                .set_joint(&mut host, &mut hook, &chain, &chain[0], JointState::Locked)
                .is_err()
        );

        assert!(host.calls.is_empty());
        assert!(hook.transitions.is_empty());
        assert_eq!(manipulation.joint_state(0), JointState::Normal);
    }

    #[test]
    fn test_connect_toggles_hook_around_call() {
        let mut manipulation = TrailerManipulation::with_functions(resolved(), false);
        let mut host = RecordingHost::default();
        let mut hook = RecordingHook::default();
        let chain = chain();

        manipulation.disconnect(&mut host, &chain[1]).unwrap();
        assert_eq!(manipulation.joint_state(1), JointState::Disconnected);

        manipulation
            .connect(&mut host, &mut hook, &chain, &chain[2])
            .unwrap();
        assert_eq!(hook.transitions, vec![true, false]);
        assert!(!hook.is_enabled());
        // Trailer 1 is the last connected one ahead of trailer 2.
        assert_eq!(
            host.calls,
            vec![Call::Disconnect(1), Call::Connect(2, Some(1))]
        );
        assert_eq!(manipulation.joint_state(2), JointState::Normal);
    }

    #[test]
    fn test_failed_connect_still_restores_hook() {
        let mut manipulation = TrailerManipulation::with_functions(resolved(), false);
        let mut host = RecordingHost {
            fail_connect: true,
            ..Default::default()
        };
        let mut hook = RecordingHook::default();
        let chain = chain();

        assert!(
            manipulation
                .connect(&mut host, &mut hook, &chain, &chain[2])
                .is_err()
        );
        assert_eq!(hook.transitions, vec![true, false]);
    }

    #[test]
    fn test_connect_refuses_connected_trailer_without_touching_hook() {
        let mut manipulation = TrailerManipulation::with_functions(resolved(), false);
        let mut host = RecordingHost::default();
        let mut hook = RecordingHook::default();
        let chain = chain();
        assert!(chain[0].is_connected());

        assert!(matches!(
            manipulation.connect(&mut host, &mut hook, &chain, &chain[0]),
            Err(Error::FeatureUnavailable(_))
        ));
        assert!(hook.transitions.is_empty());
        assert!(!hook.is_enabled());
        assert!(host.calls.is_empty());
    }

    #[test]
    fn test_first_trailer_connects_to_truck() {
        let mut manipulation = TrailerManipulation::with_functions(resolved(), false);
        let mut host = RecordingHost::default();
        let mut hook = RecordingHook::default();
        let mut chain = chain();
        for trailer in chain.iter_mut() {
            trailer.joint = None;
        }

        manipulation
            .connect(&mut host, &mut hook, &chain, &chain[0])
            .unwrap();
        assert_eq!(host.calls, vec![Call::Connect(0, None)]);
    }

    #[test]
    fn test_locking_detached_joint_reconnects_first() {
        let mut manipulation = TrailerManipulation::with_functions(resolved(), false);
        let mut host = RecordingHost::default();
        let mut hook = RecordingHook::default();
        let chain = chain();

        manipulation.disconnect(&mut host, &chain[0]).unwrap();
        manipulation
            .set_joint(&mut host, &mut hook, &chain, &chain[0], JointState::Locked)
            .unwrap();

        assert_eq!(
            host.calls,
            vec![
                Call::Disconnect(0),
                Call::Connect(0, None),
                Call::Motion(0, JointMotion::Locked),
            ]
        );
        assert_eq!(manipulation.joint_state(0), JointState::Locked);
        assert_eq!(manipulation.joint_state(0).to_string(), "Locked");
        assert_eq!(JointState::Normal.to_string(), "Unlocked");
    }

    #[test]
    fn test_joint_lock_needs_physx_joint() {
        let mut manipulation = TrailerManipulation::with_functions(resolved(), false);
        let mut host = RecordingHost::default();
        let mut hook = RecordingHook::default();
        let chain = chain();

        assert!(
            manipulation
                .set_joint(&mut host, &mut hook, &chain, &chain[1], JointState::Locked)
                .is_err()
        );
        assert!(host.calls.is_empty());
    }

    #[test]
    fn test_truckersmp_blocks_connection_changes_only() {
        let mut manipulation = TrailerManipulation::with_functions(resolved(), true);
        let mut host = RecordingHost::default();
        let mut hook = RecordingHook::default();
        let chain = chain();

        assert!(manipulation.is_enabled());
        assert!(!manipulation.should_install_guard_hooks());
        assert!(manipulation.connection_unavailable_reason().is_some());
        assert!(manipulation.disconnect(&mut host, &chain[0]).is_err());
        assert!(manipulation.connect(&mut host, &mut hook, &chain, &chain[2]).is_err());

        manipulation.set_steering_locked(0, true).unwrap();
        manipulation.set_steering(&mut host, &chain[0], 0.1).unwrap();
        assert_eq!(host.calls, vec![Call::Steering(0, 0.1)]);
    }

    #[test]
    fn test_steering_locks_gate_game_steering() {
        let mut manipulation = TrailerManipulation::with_functions(resolved(), false);
        let locks = manipulation.steering_locks();

        manipulation.set_steering_locked(1, true).unwrap();
        assert!(locks.allows_game_steering(Some(0)));
        assert!(!locks.allows_game_steering(Some(1)));
        assert!(locks.allows_game_steering(None));
        assert!(manipulation.set_steering_locked(MAX_TRAILER_SLOTS, true).is_err());
    }

    #[test]
    fn test_shared_locks_follow_manipulation() {
        let shared = Arc::new(SteeringLocks::default());
        let mut manipulation = TrailerManipulation::with_functions(resolved(), false)
            .with_steering_locks(shared.clone());

        manipulation.set_steering_locked(3, true).unwrap();
        assert!(shared.is_locked(3));
        assert!(!shared.allows_game_steering(Some(3)));
    }

    fn host_image() -> Vec<u8> {
        let mut image = vec![0xCCu8; 0x4000];
        // set_individual_steering, original signature
        let steering = [
            0x48, 0x89, 0x5C, 0x24, 0x08, 0x48, 0x89, 0x74, 0x24, 0x10, 0x57, 0x48, 0x83, 0xEC,
            0x20, 0x8B, 0x41, 0x10, 0x48, 0x8B, 0xD9, 0x0F, 0x29, 0x74,
        ];
        image[0x100..0x100 + steering.len()].copy_from_slice(&steering);
        // connect_slave, original signature, ending in `call rel32` to 0x3000
        let mut connect = vec![
            0x40, 0x53, 0x48, 0x83, 0xEC, 0x60, 0x48, 0x83, 0xB9, 0x38, 0x06, 0x00, 0x00, 0x00,
            0x48, 0x8B, 0xD9, 0x0F, 0x84, 0x10, 0x00, 0x00, 0x00, 0x48, 0x8D, 0x54, 0x24, 0x20,
            0xE8,
        ];
        let call_end = 0x800 + connect.len() as i32 + 4;
        connect.extend_from_slice(&(0x3000 - call_end).to_le_bytes());
        image[0x800..0x800 + connect.len()].copy_from_slice(&connect);
        image
    }

    #[test]
    fn test_init_resolves_functions_from_signatures() {
        let mut image = host_image();
        let guard = [
            0x48, 0x85, 0xD2, 0x0F, 0x84, 0x40, 0x00, 0x00, 0x00, 0x48, 0x89, 0x74, 0x24, 0x18,
            0x57, 0x48, 0x83, 0xEC, 0x40,
        ];
        image[0x1200..0x1200 + guard.len()].copy_from_slice(&guard);
        let memory = MockMemoryBuilder::new().image(0x40_0000, image).build();

        let manipulation = TrailerManipulation::init(&RobustPatternScanner::new(&memory), false);
        let functions = manipulation.functions();
        assert_eq!(functions.set_individual_steering, Some(0x40_0100));
        assert_eq!(functions.connect_slave, Some(0x40_0800));
        assert_eq!(functions.crash_guard, Some(0x40_1200));
        assert_eq!(functions.slave_hook_position, Some(0x40_3000));
        assert!(manipulation.should_install_guard_hooks());
    }

    #[test]
    fn test_init_without_crash_guard_fails_closed() {
        let memory = MockMemoryBuilder::new()
            .image(0x40_0000, host_image())
            .build();

        let manipulation = TrailerManipulation::init(&RobustPatternScanner::new(&memory), false);
        assert_eq!(manipulation.functions().crash_guard, None);
        assert!(manipulation.functions().connect_slave.is_some());
        assert!(!manipulation.is_enabled());
    }
}
