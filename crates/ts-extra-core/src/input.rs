//! Overlay input state: mouse capture, overlay visibility and the cursor
//! driven by raw mouse deltas.

use tracing::debug;

/// Virtual key that toggles mouse capture
pub const VK_INSERT: u32 = 0x2D;
/// Virtual key that toggles the overlay
pub const VK_DELETE: u32 = 0x2E;

/// `DIMOFS_X` / `DIMOFS_Y` in DirectInput mouse device data
const DIMOFS_X: u32 = 0;
const DIMOFS_Y: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAxis {
    X,
    Y,
    /// Buttons, wheel and anything else the overlay does not track
    Other,
}

impl MouseAxis {
    /// Map a DirectInput device-object offset to an axis
    pub fn from_offset(offset: u32) -> Self {
        match offset {
            DIMOFS_X => MouseAxis::X,
            DIMOFS_Y => MouseAxis::Y,
            _ => MouseAxis::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputState {
    capture_mouse: bool,
    show_ui: bool,
    cursor: [f32; 2],
    saved_cursor: [f32; 2],
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            capture_mouse: false,
            show_ui: true,
            cursor: [0.0; 2],
            saved_cursor: [0.0; 2],
        }
    }
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_capturing_mouse(&self) -> bool {
        self.capture_mouse
    }

    pub fn is_ui_visible(&self) -> bool {
        self.show_ui
    }

    /// The overlay draws its own cursor exactly while it owns the mouse
    pub fn draws_cursor(&self) -> bool {
        self.capture_mouse
    }

    pub fn cursor(&self) -> [f32; 2] {
        self.cursor
    }

    /// Follow the platform cursor while the game owns the mouse
    pub fn sync_cursor(&mut self, position: [f32; 2]) {
        if !self.capture_mouse {
            self.cursor = position;
        }
    }

    /// Feed one raw mouse delta.
    ///
    /// Returns `true` when the event was consumed and must not reach the game.
    pub fn on_mouse_input(&mut self, axis: MouseAxis, delta: i32) -> bool {
        if !self.capture_mouse {
            return false;
        }

        match axis {
            MouseAxis::X => self.cursor[0] += delta as f32,
            MouseAxis::Y => self.cursor[1] += delta as f32,
            MouseAxis::Other => {}
        }
        true
    }

    /// Switch mouse ownership between the game and the overlay.
    ///
    /// Taking the mouse restores the cursor where the overlay left it; giving
    /// it back remembers the current position.
    pub fn toggle_input_hook(&mut self) {
        self.capture_mouse = !self.capture_mouse;
        if self.capture_mouse {
            self.cursor = self.saved_cursor;
        } else {
            self.saved_cursor = self.cursor;
        }
        debug!(
            "Mouse hook is now {}",
            if self.capture_mouse { "active" } else { "disabled" }
        );
    }

    pub fn toggle_ui(&mut self) {
        self.show_ui = !self.show_ui;
    }

    /// Handle a key press; returns `true` if the key was a hotkey
    pub fn on_key_down(&mut self, vk: u32) -> bool {
        match vk {
            VK_INSERT => {
                self.toggle_input_hook();
                true
            }
            VK_DELETE => {
                self.toggle_ui();
                true
            }
            _ => false,
        }
    }

    /// Window-message mouse moves are swallowed while the overlay owns the mouse
    pub fn should_block_mouse_move(&self) -> bool {
        self.capture_mouse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deltas_pass_through_without_capture() {
        let mut input = InputState::new();
        assert!(!input.on_mouse_input(MouseAxis::X, 15));
        assert_eq!(input.cursor(), [0.0, 0.0]);
        assert!(!input.should_block_mouse_move());
    }

    #[test]
    fn test_captured_deltas_move_cursor() {
        let mut input = InputState::new();
        input.on_key_down(VK_INSERT);
        assert!(input.is_capturing_mouse());
        assert!(input.draws_cursor());

        assert!(input.on_mouse_input(MouseAxis::from_offset(0), 10));
        assert!(input.on_mouse_input(MouseAxis::from_offset(4), -3));
        assert!(input.on_mouse_input(MouseAxis::from_offset(8), 120));
        assert_eq!(input.cursor(), [10.0, -3.0]);
    }

    #[test]
    fn test_cursor_is_saved_and_restored_across_toggles() {
        let mut input = InputState::new();
        input.toggle_input_hook();
        input.on_mouse_input(MouseAxis::X, 200);
        input.on_mouse_input(MouseAxis::Y, 100);

        input.toggle_input_hook();
        assert!(!input.draws_cursor());
        input.sync_cursor([640.0, 360.0]);
        assert_eq!(input.cursor(), [640.0, 360.0]);

        input.toggle_input_hook();
        assert_eq!(input.cursor(), [200.0, 100.0]);

        // Platform cursor updates are ignored while captured.
        input.sync_cursor([1.0, 1.0]);
        assert_eq!(input.cursor(), [200.0, 100.0]);
    }

    #[test]
    fn test_hotkeys() {
        let mut input = InputState::new();
        assert!(input.is_ui_visible());
        assert!(input.on_key_down(VK_DELETE));
        assert!(!input.is_ui_visible());
        assert!(!input.on_key_down(0x41));
        assert!(!input.is_capturing_mouse());
    }
}
