//! Per-frame uniform record
//!
//! The byte layout below must match `struct Uniforms` in
//! `shaders/raytracer.wgsl` field for field; nothing checks it at runtime on
//! the GPU side, so `tests/shader_layout.rs` reflects the WGSL with naga and
//! compares offsets.

use crate::camera::CameraState;
use crate::error::LayoutError;
use crate::layout::{Field, FieldKind, FieldValue, RecordLayout};
use crate::params::{RenderParams, SkyMode};
use glam::{Vec2, Vec3};

/// Allocated uniform buffer size; larger than the record to leave room for new fields
pub const UNIFORM_BUFFER_SIZE: u64 = 176;

pub const UNIFORM_LAYOUT: RecordLayout = RecordLayout {
    name: "Uniforms",
    stride: 96,
    fields: &[
        Field::new("resolution", 0, FieldKind::Vec2),
        Field::new("time", 8, FieldKind::F32),
        Field::new("camera_pos", 16, FieldKind::Vec3),
        Field::new("camera_dir", 32, FieldKind::Vec3),
        Field::new("bounces", 48, FieldKind::U32),
        Field::new("samples", 52, FieldKind::U32),
        Field::new("light", 56, FieldKind::F32),
        Field::new("fov", 60, FieldKind::F32),
        Field::new("seed", 64, FieldKind::F32),
        Field::new("frame_index", 68, FieldKind::U32),
        Field::new("aperture", 72, FieldKind::F32),
        Field::new("focus_dist", 76, FieldKind::F32),
        Field::new("sky_mode", 80, FieldKind::U32),
    ],
};

/// Host-side view of the uniform record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub resolution: Vec2,
    /// Seconds since the tracer started
    pub time: f32,
    pub camera_position: Vec3,
    pub camera_forward: Vec3,
    pub bounces: u32,
    pub samples: u32,
    pub light: f32,
    pub fov: f32,
    /// Per-frame random seed in [0, 1)
    pub seed: f32,
    pub frame_index: u32,
    pub aperture: f32,
    pub focus_distance: f32,
    pub sky_mode: SkyMode,
}

impl FrameUniforms {
    /// Uniforms for an interactive frame, with the high-quality override applied.
    pub fn interactive(
        width: u32,
        height: u32,
        time: f32,
        camera: &CameraState,
        params: &RenderParams,
        seed: f32,
        frame_index: u32,
    ) -> Self {
        Self {
            resolution: Vec2::new(width as f32, height as f32),
            time,
            camera_position: camera.position,
            camera_forward: camera.forward(),
            bounces: params.effective_bounces(),
            samples: params.effective_samples(),
            light: params.light,
            fov: params.fov,
            seed,
            frame_index,
            aperture: params.aperture,
            focus_distance: params.focus_distance,
            sky_mode: params.sky_mode,
        }
    }

    fn field_values(&self) -> [FieldValue; 13] {
        [
            self.resolution.into(),
            self.time.into(),
            self.camera_position.into(),
            self.camera_forward.into(),
            self.bounces.into(),
            self.samples.into(),
            self.light.into(),
            self.fov.into(),
            self.seed.into(),
            self.frame_index.into(),
            self.aperture.into(),
            self.focus_distance.into(),
            self.sky_mode.as_u32().into(),
        ]
    }

    pub fn pack(&self) -> Result<Vec<u8>, LayoutError> {
        UNIFORM_LAYOUT.pack(&self.field_values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::assert_well_formed;

    fn sample(seed: f32) -> FrameUniforms {
        let params = RenderParams {
            high_quality: true,
            sky_mode: SkyMode::Day,
            ..Default::default()
        };
        FrameUniforms::interactive(800, 600, 1.25, &CameraState::default(), &params, seed, 17)
    }

    #[test]
    fn test_uniform_layout() {
        assert_well_formed(&UNIFORM_LAYOUT);
        assert!(UNIFORM_LAYOUT.stride as u64 <= UNIFORM_BUFFER_SIZE);
        let group_starts = [
            "resolution",
            "camera_pos",
            "camera_dir",
            "bounces",
            "seed",
            "sky_mode",
        ];
        for group_start in group_starts {
            let field = UNIFORM_LAYOUT.field(group_start).unwrap();
            assert_eq!(field.offset % 16, 0, "{group_start} must start a 16-byte group");
        }
    }

    #[test]
    fn test_packing_differs_only_at_seed() {
        let a = sample(0.125).pack().unwrap();
        let b = sample(0.125).pack().unwrap();
        assert_eq!(a, b);

        let c = sample(0.875).pack().unwrap();
        let seed = UNIFORM_LAYOUT.field("seed").unwrap();
        for (i, (x, y)) in a.iter().zip(&c).enumerate() {
            if !(seed.offset..seed.end()).contains(&i) {
                assert_eq!(x, y, "byte {i} differs outside the seed field");
            }
        }
        assert_ne!(a[seed.offset..seed.end()], c[seed.offset..seed.end()]);
    }

    #[test]
    fn test_integer_fields_are_integers() {
        let bytes = sample(0.5).pack().unwrap();
        assert_eq!(UNIFORM_LAYOUT.read_u32(&bytes, "bounces"), Some(8));
        assert_eq!(UNIFORM_LAYOUT.read_u32(&bytes, "samples"), Some(4));
        assert_eq!(UNIFORM_LAYOUT.read_u32(&bytes, "frame_index"), Some(17));
        assert_eq!(UNIFORM_LAYOUT.read_u32(&bytes, "sky_mode"), Some(1));
        assert_eq!(UNIFORM_LAYOUT.read_f32(&bytes, "fov"), Some(70.0));
        assert_eq!(UNIFORM_LAYOUT.read_f32(&bytes, "light"), Some(1.5));
    }

    #[test]
    fn test_resolution_and_camera_words() {
        let bytes = sample(0.5).pack().unwrap();
        let words: Vec<f32> = bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect();
        assert_eq!(words.len(), 24);
        assert_eq!(&words[0..3], &[800.0, 600.0, 1.25]);
        assert_eq!(&words[4..7], &[25.0, 8.0, 15.0]);
        // padding words stay zero
        assert_eq!(words[3], 0.0);
        assert_eq!(words[7], 0.0);
        assert_eq!(words[11], 0.0);
    }
}
