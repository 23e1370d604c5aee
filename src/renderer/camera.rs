use glam::{Mat4, Vec3};

/// Free-look is only active while the right mouse button is held; otherwise
/// input leaves the camera alone.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CameraMode {
    Fixed,
    Free,
}

/// First-person camera mutated exclusively by input handling. The basis
/// vectors are recomputed from yaw/pitch on every rotation.
pub struct Camera {
    pub position: Vec3,
    pub front: Vec3,
    pub up: Vec3,
    pub right: Vec3,

    yaw: f32,
    pitch: f32,

    pub mode: CameraMode,
    pub velocity: f32,
    pub sensitivity: f32,
}

impl Camera {
    const MAX_PITCH_DEG: f32 = 89.0;

    pub fn new() -> Self {
        let front = Vec3::NEG_Z;
        let up = Vec3::Y;
        Self {
            position: Vec3::new(0.0, 0.0, 1.0),
            front,
            up,
            right: front.cross(up).normalize(),
            yaw: -90.0,
            pitch: 0.0,
            mode: CameraMode::Fixed,
            velocity: 2.5,
            sensitivity: 0.1,
        }
    }

    pub fn move_forward(&mut self, delta_time: f32) {
        self.position += self.front * self.velocity * delta_time;
    }

    pub fn move_backward(&mut self, delta_time: f32) {
        self.position -= self.front * self.velocity * delta_time;
    }

    pub fn move_left(&mut self, delta_time: f32) {
        self.position -= self.right * self.velocity * delta_time;
    }

    pub fn move_right(&mut self, delta_time: f32) {
        self.position += self.right * self.velocity * delta_time;
    }

    /// Apply a mouse delta in pixels. Positive `dx` turns right, positive
    /// `dy` looks up. Pitch is clamped short of the poles so the basis
    /// never degenerates.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.sensitivity;
        self.pitch = (self.pitch + dy * self.sensitivity)
            .clamp(-Self::MAX_PITCH_DEG, Self::MAX_PITCH_DEG);

        let yaw = self.yaw.to_radians();
        let pitch = self.pitch.to_radians();
        self.front = Vec3::new(
            yaw.cos() * pitch.cos(),
            pitch.sin(),
            yaw.sin() * pitch.cos(),
        )
        .normalize();
        self.right = self.front.cross(self.up).normalize();
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec3_near(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-5, "{a:?} != {b:?}");
    }

    #[test]
    fn movement_scales_with_velocity_and_delta_time() {
        let mut camera = Camera::new();
        camera.velocity = 2.0;

        camera.move_forward(0.5);
        assert_vec3_near(camera.position, Vec3::new(0.0, 0.0, 0.0));

        camera.move_right(0.5);
        assert_vec3_near(camera.position, Vec3::new(1.0, 0.0, 0.0));

        camera.move_backward(0.5);
        camera.move_left(0.5);
        assert_vec3_near(camera.position, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn rotation_recomputes_the_basis_from_yaw_and_pitch() {
        let mut camera = Camera::new();
        camera.sensitivity = 1.0;

        // Quarter turn to the right from the -Z default faces +X
        camera.rotate(90.0, 0.0);
        assert_vec3_near(camera.front, Vec3::X);
        assert_vec3_near(camera.right, Vec3::Z);
    }

    #[test]
    fn pitch_is_clamped_short_of_the_poles() {
        let mut camera = Camera::new();
        camera.sensitivity = 1.0;

        camera.rotate(0.0, 500.0);
        assert!(camera.front.y < 1.0);
        // Still a usable basis
        assert!(camera.right.length() > 0.99);

        camera.rotate(0.0, -1000.0);
        assert!(camera.front.y > -1.0);
    }

    #[test]
    fn view_matrix_looks_along_front() {
        let camera = Camera::new();
        let view = camera.view_matrix();

        // The default camera sits at +Z looking down -Z: the world origin
        // lands one unit in front of the eye
        let origin_in_view = view.transform_point3(Vec3::ZERO);
        assert_vec3_near(origin_in_view, Vec3::new(0.0, 0.0, -1.0));
    }
}
