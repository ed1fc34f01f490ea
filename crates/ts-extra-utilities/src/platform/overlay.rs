//! The "Trailer Manipulation" overlay window

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use hudhook::imgui::{Context, Direction, Io, Key, SliderFlags, TreeNodeFlags, Ui};
use hudhook::{ImguiRenderLoop, MessageFilter, RenderContext};
use tracing::{debug, warn};

use ts_extra_core::input::{VK_DELETE, VK_INSERT};
use ts_extra_core::memory::ProcessMemory;
use ts_extra_core::trailer::{STEERING_STEP, walk_trailer_chain};
use ts_extra_core::{
    CoreController, Error, HookSwitch, JointState, Result, TrailerHandle, TrailerManipulation,
};

use super::PlatformState;
use super::host::ProcessTrailerHost;
use crate::context::PluginContext;

const WARNING: [f32; 4] = [1.0, 0.5, 0.0, 1.0];

/// Frames to wait before scanning again after the base controller was not found
const RESOLVE_RETRY_FRAMES: u32 = 120;

/// Stands in for the connect-slave hook when it could not be installed
struct MissingHook;

impl HookSwitch for MissingHook {
    fn enable(&mut self) -> Result<()> {
        Err(Error::FeatureUnavailable(
            "connect_slave hook is not installed".to_string(),
        ))
    }

    fn disable(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

fn report<T>(action: &str, result: Result<T>) {
    if let Err(e) = result {
        warn!("{} failed: {}", action, e);
    }
}

fn with_connect_hook<T>(
    platform: &PlatformState,
    action: impl FnOnce(&mut dyn HookSwitch) -> Result<T>,
) -> Result<T> {
    let mut hooks = platform
        .hooks()
        .ok_or_else(|| Error::FeatureUnavailable("hook table is poisoned".to_string()))?;
    match hooks.connect_slave() {
        Some(hook) => action(hook),
        None => action(&mut MissingHook),
    }
}

pub struct Overlay {
    context: Arc<PluginContext>,
    controller: CoreController<ProcessMemory>,
    manipulation: TrailerManipulation,
    steering_hook_attempted: bool,
    offsets_logged: bool,
    retry_in: u32,
}

impl Overlay {
    pub fn new(
        context: Arc<PluginContext>,
        controller: CoreController<ProcessMemory>,
        manipulation: TrailerManipulation,
    ) -> Self {
        Self {
            context,
            controller,
            manipulation,
            steering_hook_attempted: false,
            offsets_logged: false,
            retry_in: 0,
        }
    }

    fn frame(&mut self, ui: &Ui) {
        if let Some(mut input) = self.context.input() {
            if ui.is_key_pressed_no_repeat(Key::Insert) {
                input.on_key_down(VK_INSERT);
            }
            if ui.is_key_pressed_no_repeat(Key::Delete) {
                input.on_key_down(VK_DELETE);
            }
            if !input.is_ui_visible() {
                return;
            }
        }

        ui.window("Trailer Manipulation")
            .build(|| self.render_trailers(ui));
    }

    /// Game actor for this frame; lookups are throttled while the base
    /// controller cannot be found
    fn resolve_actor(&mut self, ui: &Ui) -> Option<u64> {
        if self.retry_in > 0 {
            self.retry_in -= 1;
            ui.text_colored(WARNING, "Warning: Cannot find game base controller");
            return None;
        }

        let Some(base) = self.controller.base_ctrl_instance() else {
            self.retry_in = RESOLVE_RETRY_FRAMES;
            ui.text_colored(WARNING, "Warning: Cannot find game base controller");
            ui.text("This usually means pattern scanning failed after a game update.");
            ui.text("Check the game log for detailed error messages.");
            return None;
        };

        let Some(actor) = self.controller.game_actor() else {
            ui.text_colored(WARNING, "Warning: Cannot find game actor");
            ui.text("Base controller found but game actor offset may be wrong.");
            ui.text(format!("Base ctrl: 0x{:016X}", base));
            return None;
        };

        if !self.offsets_logged {
            self.offsets_logged = true;
            match self.controller.resolved_offsets().to_json() {
                Ok(json) => debug!("Resolved offsets: {}", json),
                Err(e) => debug!("Could not serialize resolved offsets: {}", e),
            }
        }
        Some(actor)
    }

    fn render_trailers(&mut self, ui: &Ui) {
        let actor = self.resolve_actor(ui);
        self.context.set_game_actor(actor);
        let Some(actor) = actor else {
            return;
        };

        let context = self.context.clone();
        let Some(platform) = context.platform() else {
            return;
        };

        ui.text(format!(
            "Connected trailers (telemetry): {}",
            context.connectivity().connected_count()
        ));

        let chain = walk_trailer_chain(platform.memory(), actor);
        let Some(first) = chain.first() else {
            ui.text("No trailers attached to truck");
            ui.text(format!("Game actor: 0x{:016X}", actor));
            return;
        };

        if let Some(reason) = self.manipulation.disabled_reason() {
            ui.text_colored(WARNING, reason);
        } else if !self.steering_hook_attempted {
            self.steering_hook_attempted = true;
            if let Err(e) = platform.hook_steering_advance(first.address) {
                warn!(
                    "Could not hook the physics_trailer_u::steering_advance virtual function: {:#}",
                    e
                );
            }
        }

        let physx = self.controller.is_physx();
        let _disabled = ui.begin_disabled(!self.manipulation.is_enabled());
        for trailer in &chain {
            let _id = ui.push_id_usize(trailer.index);
            let label = format!("Trailer {}", trailer.index);
            if ui.collapsing_header(&label, TreeNodeFlags::DEFAULT_OPEN) {
                let functions = *self.manipulation.functions();
                let mut host = ProcessTrailerHost::new(platform.memory(), functions, actor);
                if trailer.wheel_steering.is_some() && functions.set_individual_steering.is_some() {
                    self.render_steering(ui, &mut host, trailer);
                }
                self.render_joint(ui, platform, &mut host, &chain, trailer, physx);
            }
        }
    }

    fn render_steering(
        &mut self,
        ui: &Ui,
        host: &mut ProcessTrailerHost<'_>,
        trailer: &TrailerHandle,
    ) {
        ui.separator();
        ui.text("Steering");

        let mut locked = self.manipulation.is_steering_locked(trailer.index);
        if ui.checkbox("Locked##steering", &mut locked) {
            report(
                "Steering lock",
                self.manipulation.set_steering_locked(trailer.index, locked),
            );
        }

        let _disabled = ui.begin_disabled(!locked);
        let mut angle = trailer.steering;
        if ui
            .slider_config("Angle", -1.0, 1.0)
            .display_format("%.3f")
            .flags(SliderFlags::ALWAYS_CLAMP)
            .build(&mut angle)
        {
            report("Steering", self.manipulation.set_steering(host, trailer, angle));
        }

        if ui.arrow_button("rotate_left", Direction::Left) {
            report(
                "Steering",
                self.manipulation.nudge_steering(host, trailer, -STEERING_STEP),
            );
        }
        ui.same_line();
        if ui.button("center") {
            report("Steering", self.manipulation.center_steering(host, trailer));
        }
        ui.same_line();
        if ui.arrow_button("rotate_right", Direction::Right) {
            report(
                "Steering",
                self.manipulation.nudge_steering(host, trailer, STEERING_STEP),
            );
        }
    }

    fn render_joint(
        &mut self,
        ui: &Ui,
        platform: &PlatformState,
        host: &mut ProcessTrailerHost<'_>,
        chain: &[TrailerHandle],
        trailer: &TrailerHandle,
        physx: bool,
    ) {
        ui.separator();
        ui.text("Joint");
        if !physx {
            ui.text_wrapped("Ability to lock joints is only available with PhysX");
        } else if trailer.has_px_joint() {
            let state = self.manipulation.joint_state(trailer.index);
            for (label, target) in [
                ("Unlocked##joint", JointState::Normal),
                ("Locked##joint", JointState::Locked),
            ] {
                if target == JointState::Locked {
                    ui.same_line();
                }
                if ui.radio_button_bool(label, state == target) {
                    let manipulation = &mut self.manipulation;
                    report(
                        "Joint",
                        with_connect_hook(platform, |hook| {
                            manipulation.set_joint(&mut *host, hook, chain, trailer, target)
                        }),
                    );
                }
            }
        }

        ui.separator();
        ui.text("Connect/Disconnect");
        if let Some(reason) = self.manipulation.connection_unavailable_reason() {
            ui.text_wrapped(reason);
            return;
        }

        {
            let _disabled = ui.begin_disabled(trailer.is_connected());
            if ui.button("Connect##trailer") {
                let manipulation = &mut self.manipulation;
                report(
                    "Connect",
                    with_connect_hook(platform, |hook| {
                        manipulation.connect(&mut *host, hook, chain, trailer)
                    }),
                );
            }
        }
        ui.same_line();
        let _disabled = ui.begin_disabled(!trailer.is_connected());
        if ui.button("Disconnect##trailer") {
            report("Disconnect", self.manipulation.disconnect(host, trailer));
        }
    }
}

impl ImguiRenderLoop for Overlay {
    fn initialize<'a>(
        &'a mut self,
        ctx: &mut Context,
        _render_context: &'a mut dyn RenderContext,
    ) {
        ctx.set_ini_filename(None);
    }

    fn before_render<'a>(
        &'a mut self,
        ctx: &mut Context,
        _render_context: &'a mut dyn RenderContext,
    ) {
        let Some(mut input) = self.context.input() else {
            return;
        };
        let io = ctx.io_mut();
        if input.is_capturing_mouse() {
            io.mouse_pos = input.cursor();
        } else {
            input.sync_cursor(io.mouse_pos);
        }
        io.mouse_draw_cursor = input.draws_cursor();
    }

    fn render(&mut self, ui: &mut Ui) {
        if std::panic::catch_unwind(AssertUnwindSafe(|| self.frame(ui))).is_err() {
            warn!("Overlay frame panicked");
        }
    }

    fn message_filter(&self, _io: &Io) -> MessageFilter {
        match self.context.input() {
            Some(input) if input.should_block_mouse_move() => MessageFilter::InputMouse,
            _ => MessageFilter::empty(),
        }
    }
}
