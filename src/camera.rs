//! Free-fly camera driven by keyboard and pointer-locked mouse input
//!
//! - WASD: Move forward/backward/left/right
//! - QE: Move down/up
//! - Mouse: Look around (while the pointer is locked)
//!
//! Movement is applied per tick rather than per second, so accumulated frames
//! always see a camera that moved by a whole step.

use glam::{Vec2, Vec3};
use std::f32::consts::{FRAC_PI_2, PI};

/// Radians of rotation per pixel of mouse movement
pub const MOUSE_SENSITIVITY: f32 = 0.002;

/// Pitch is kept this far away from straight up/down
pub const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.1;

/// Input state sampled by the frame driver each tick
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    /// Movement keys (WASD, QE for down/up)
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,

    /// Mouse delta since last tick (in pixels)
    pub mouse_delta: Vec2,

    /// Whether the pointer is locked to the window; mouse look is ignored otherwise
    pub pointer_locked: bool,
}

impl CameraInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate raw mouse motion, dropping it unless the pointer is locked.
    pub fn add_mouse_motion(&mut self, dx: f32, dy: f32) {
        if self.pointer_locked {
            self.mouse_delta += Vec2::new(dx, dy);
        }
    }

    /// Reset per-tick deltas (call after update)
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
    }

    /// Release every key, e.g. when the window loses focus
    pub fn release_keys(&mut self) {
        let pointer_locked = self.pointer_locked;
        *self = Self {
            pointer_locked,
            ..Self::default()
        };
    }
}

/// Camera position and orientation, owned by the frame driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    /// Horizontal rotation in radians
    pub yaw: f32,
    /// Vertical rotation in radians, clamped to [`PITCH_LIMIT`]
    pub pitch: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::new(25.0, 8.0, 15.0),
            yaw: -PI * 0.75,
            pitch: -0.15,
        }
    }
}

impl CameraState {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        Self {
            position,
            yaw,
            pitch: pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT),
        }
    }

    /// Unit view direction derived from yaw/pitch
    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
    }

    /// Right direction (perpendicular to forward, on XZ plane)
    pub fn right(&self) -> Vec3 {
        Vec3::new(-self.yaw.sin(), 0.0, self.yaw.cos())
    }

    /// Rotate by a mouse delta in pixels. Returns whether the orientation changed.
    pub fn look(&mut self, delta: Vec2) -> bool {
        if delta == Vec2::ZERO {
            return false;
        }
        let (yaw, pitch) = (self.yaw, self.pitch);
        self.yaw += delta.x * MOUSE_SENSITIVITY;
        self.pitch = (self.pitch - delta.y * MOUSE_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.yaw != yaw || self.pitch != pitch
    }

    /// Move by one step of `speed` along each held direction. Returns whether
    /// any movement key was held.
    pub fn translate(&mut self, input: &CameraInput, speed: f32) -> bool {
        let forward = self.forward();
        let right = self.right();

        let mut velocity = Vec3::ZERO;
        if input.forward {
            velocity += forward;
        }
        if input.backward {
            velocity -= forward;
        }
        if input.right {
            velocity += right;
        }
        if input.left {
            velocity -= right;
        }
        if input.up {
            velocity += Vec3::Y;
        }
        if input.down {
            velocity -= Vec3::Y;
        }

        let moved = input.forward
            || input.backward
            || input.left
            || input.right
            || input.up
            || input.down;
        self.position += velocity * speed;
        moved
    }

    /// Apply one tick of input: look first, then move along the new axes.
    pub fn update(&mut self, input: &CameraInput, speed: f32) -> bool {
        let looked = input.pointer_locked && self.look(input.mouse_delta);
        let moved = self.translate(input, speed);
        looked || moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_forward_is_unit_and_right_is_perpendicular() {
        let camera = CameraState::default();
        assert!((camera.forward().length() - 1.0).abs() < EPS);
        assert!(camera.forward().dot(camera.right()).abs() < EPS);
        assert_eq!(camera.right().y, 0.0);
    }

    #[test]
    fn test_idle_input_changes_nothing() {
        let mut camera = CameraState::default();
        let before = camera;
        assert!(!camera.update(&CameraInput::new(), 0.5));
        assert_eq!(camera, before);
    }

    #[test]
    fn test_forward_key_moves_along_view() {
        let mut camera = CameraState::default();
        let start = camera.position;
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        assert!(camera.update(&input, 0.5));
        assert!((camera.position - (start + camera.forward() * 0.5)).length() < EPS);
    }

    #[test]
    fn test_vertical_keys_move_world_y() {
        let mut camera = CameraState::default();
        let input = CameraInput {
            up: true,
            ..Default::default()
        };
        camera.update(&input, 2.0);
        assert!((camera.position.y - 10.0).abs() < EPS);
    }

    #[test]
    fn test_opposite_keys_still_count_as_movement() {
        let mut camera = CameraState::default();
        let input = CameraInput {
            left: true,
            right: true,
            ..Default::default()
        };
        assert!(camera.update(&input, 1.0));
    }

    #[test]
    fn test_mouse_look_requires_pointer_lock() {
        let mut camera = CameraState::default();
        let mut input = CameraInput::new();
        input.mouse_delta = Vec2::new(10.0, 0.0);
        assert!(!camera.update(&input, 1.0));

        input.pointer_locked = true;
        assert!(camera.update(&input, 1.0));
        assert!((camera.yaw - (-PI * 0.75 + 10.0 * MOUSE_SENSITIVITY)).abs() < EPS);
    }

    #[test]
    fn test_pitch_clamped() {
        let mut camera = CameraState::default();
        camera.look(Vec2::new(0.0, -100_000.0));
        assert_eq!(camera.pitch, PITCH_LIMIT);
        // already at the limit: no further change
        assert!(!camera.look(Vec2::new(0.0, -10.0)));
        camera.look(Vec2::new(0.0, 100_000.0));
        assert_eq!(camera.pitch, -PITCH_LIMIT);
    }

    #[test]
    fn test_motion_ignored_without_lock() {
        let mut input = CameraInput::new();
        input.add_mouse_motion(3.0, 4.0);
        assert_eq!(input.mouse_delta, Vec2::ZERO);
        input.pointer_locked = true;
        input.add_mouse_motion(3.0, 4.0);
        input.add_mouse_motion(1.0, 0.0);
        assert_eq!(input.mouse_delta, Vec2::new(4.0, 4.0));
        input.reset_deltas();
        assert_eq!(input.mouse_delta, Vec2::ZERO);
    }

    #[test]
    fn test_release_keys_keeps_lock() {
        let mut input = CameraInput {
            forward: true,
            pointer_locked: true,
            ..Default::default()
        };
        input.release_keys();
        assert!(!input.forward);
        assert!(input.pointer_locked);
    }
}
