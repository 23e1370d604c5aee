use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Scene-wide transforms written into each pipeline's uniform buffer.
/// Layout matches the std140 `SceneTransforms` block in `default.vert`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct SceneTransforms {
    pub model: Mat4,
    pub view: Mat4,
    pub perspective: Mat4,
}

impl Default for SceneTransforms {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            perspective: Mat4::IDENTITY,
        }
    }
}

/// Per-object transforms written into the object's uniform buffer every frame.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct ObjectTransforms {
    pub translation: Mat4,
    pub rotation: Mat4,
    pub scale: Mat4,
}

impl Default for ObjectTransforms {
    fn default() -> Self {
        Self {
            translation: Mat4::IDENTITY,
            rotation: Mat4::IDENTITY,
            scale: Mat4::IDENTITY,
        }
    }
}

/// Light parameters consumed by `default.frag`.
/// The padding field keeps `color` on the 16-byte boundary std140 expects.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct LightData {
    pub position: Vec3,
    _pad0: f32,
    pub color: Vec3,
    pub ambient: f32,
}

impl LightData {
    pub fn new(position: Vec3, color: Vec3, ambient: f32) -> Self {
        Self {
            position,
            _pad0: 0.0,
            color,
            ambient,
        }
    }
}

impl Default for LightData {
    fn default() -> Self {
        Self::new(Vec3::new(2.0, 4.0, 2.0), Vec3::ONE, 0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_transforms_is_three_tightly_packed_mat4s() {
        assert_eq!(std::mem::size_of::<SceneTransforms>(), 3 * 64);
    }

    #[test]
    fn object_transforms_is_three_tightly_packed_mat4s() {
        assert_eq!(std::mem::size_of::<ObjectTransforms>(), 3 * 64);
    }

    #[test]
    fn light_data_matches_std140_block_size() {
        assert_eq!(std::mem::size_of::<LightData>(), 32);
        assert_eq!(std::mem::offset_of!(LightData, color), 16);
        assert_eq!(std::mem::offset_of!(LightData, ambient), 28);
    }
}
