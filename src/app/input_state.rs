use glam::Vec2;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Snapshot of this tick's input, filled from window events and consumed by
/// `Engine::process_input` once per frame.
#[derive(Default)]
pub struct InputState {
    pub mouse_curr_pos: Vec2,
    pub mouse_prev_pos: Vec2,

    pub mouse_right_just_pressed: bool,
    pub mouse_right_just_released: bool,
    pub mouse_right_down: bool,

    pub move_forward: bool,
    pub move_backward: bool,
    pub move_left: bool,
    pub move_right: bool,

    pub quit_requested: bool,
    pub resize_requested: bool,
}

impl InputState {
    pub fn process_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.quit_requested = true;
            }
            WindowEvent::Resized(_new_size) => {
                self.resize_requested = true;
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => match state {
                ElementState::Pressed => {
                    self.mouse_right_just_pressed = true;
                    self.mouse_right_just_released = false;
                    self.mouse_right_down = true;
                }
                ElementState::Released => {
                    self.mouse_right_just_pressed = false;
                    self.mouse_right_just_released = true;
                    self.mouse_right_down = false;
                }
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.mouse_prev_pos = self.mouse_curr_pos;
                self.mouse_curr_pos = Vec2::new(position.x as f32, position.y as f32);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => {
                let pressed = *state == ElementState::Pressed;
                match code {
                    KeyCode::KeyW => self.move_forward = pressed,
                    KeyCode::KeyS => self.move_backward = pressed,
                    KeyCode::KeyA => self.move_left = pressed,
                    KeyCode::KeyD => self.move_right = pressed,
                    KeyCode::Escape => {
                        if pressed {
                            self.quit_requested = true;
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_curr_pos - self.mouse_prev_pos
    }

    /// Reset the per-tick state. Held keys and the mouse-down flag persist;
    /// edge-triggered flags and the processed resize do not.
    pub fn reset_frame(&mut self) {
        self.mouse_prev_pos = self.mouse_curr_pos;
        self.mouse_right_just_pressed = false;
        self.mouse_right_just_released = false;
        self.resize_requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    #[test]
    fn close_request_flags_quit() {
        let mut input = InputState::default();
        input.process_window_event(&WindowEvent::CloseRequested);
        assert!(input.quit_requested);
    }

    #[test]
    fn resize_event_flags_resize_until_reset() {
        let mut input = InputState::default();
        input.process_window_event(&WindowEvent::Resized(PhysicalSize::new(800, 600)));
        assert!(input.resize_requested);

        input.reset_frame();
        assert!(!input.resize_requested);
    }

    #[test]
    fn reset_keeps_held_state_and_clears_edges() {
        let mut input = InputState {
            move_forward: true,
            mouse_right_down: true,
            mouse_right_just_pressed: true,
            ..Default::default()
        };

        input.reset_frame();
        assert!(input.move_forward);
        assert!(input.mouse_right_down);
        assert!(!input.mouse_right_just_pressed);
    }

    #[test]
    fn mouse_delta_is_current_minus_previous() {
        let mut input = InputState {
            mouse_prev_pos: Vec2::new(10.0, 20.0),
            mouse_curr_pos: Vec2::new(14.0, 17.0),
            ..Default::default()
        };
        assert_eq!(input.mouse_delta(), Vec2::new(4.0, -3.0));

        input.reset_frame();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }
}
