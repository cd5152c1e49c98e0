//! User-tunable render parameters
//!
//! Every parameter that influences the rendered image invalidates the running
//! average when it changes. Movement speed only affects how far the camera
//! travels per tick and never does.

use std::ops::RangeInclusive;

/// Minimum bounce count while the high-quality override is active
pub const HIGH_QUALITY_MIN_BOUNCES: u32 = 8;
/// Minimum sample count while the high-quality override is active
pub const HIGH_QUALITY_MIN_SAMPLES: u32 = 4;

pub const BOUNCE_RANGE: RangeInclusive<u32> = 1..=16;
pub const SAMPLE_RANGE: RangeInclusive<u32> = 1..=16;
pub const LIGHT_RANGE: RangeInclusive<f32> = 0.0..=5.0;
pub const FOV_RANGE: RangeInclusive<f32> = 20.0..=120.0;
pub const APERTURE_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const FOCUS_RANGE: RangeInclusive<f32> = 1.0..=100.0;
pub const SPEED_RANGE: RangeInclusive<f32> = 0.05..=5.0;

/// Background illumination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum SkyMode {
    /// Black space with only emissive spheres lighting the scene
    #[default]
    Space = 0,
    /// Bright gradient sky
    Day = 1,
}

impl SkyMode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// A single parameter mutation, as issued by key bindings or configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamChange {
    Bounces(u32),
    Samples(u32),
    Light(f32),
    Fov(f32),
    Aperture(f32),
    FocusDistance(f32),
    MoveSpeed(f32),
    SkyMode(SkyMode),
    HighQuality(bool),
}

impl ParamChange {
    /// Whether this kind of change can alter the rendered image
    pub fn affects_image(&self) -> bool {
        !matches!(self, ParamChange::MoveSpeed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    pub bounces: u32,
    pub samples: u32,
    pub light: f32,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub aperture: f32,
    pub focus_distance: f32,
    /// World units travelled per tick while a movement key is held
    pub move_speed: f32,
    pub sky_mode: SkyMode,
    /// Floors bounces and samples to elevated minimums
    pub high_quality: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            bounces: 4,
            samples: 1,
            light: 1.5,
            fov: 70.0,
            aperture: 0.02,
            focus_distance: 30.0,
            move_speed: 0.5,
            sky_mode: SkyMode::Space,
            high_quality: false,
        }
    }
}

impl RenderParams {
    pub fn effective_bounces(&self) -> u32 {
        if self.high_quality {
            self.bounces.max(HIGH_QUALITY_MIN_BOUNCES)
        } else {
            self.bounces
        }
    }

    pub fn effective_samples(&self) -> u32 {
        if self.high_quality {
            self.samples.max(HIGH_QUALITY_MIN_SAMPLES)
        } else {
            self.samples
        }
    }

    /// Apply a change, clamping it to its valid range.
    ///
    /// Returns `true` when accumulation must restart: the value actually
    /// changed and the parameter affects the image.
    pub fn apply(&mut self, change: ParamChange) -> bool {
        let before = *self;
        match change {
            ParamChange::Bounces(v) => self.bounces = clamp_u32(v, &BOUNCE_RANGE),
            ParamChange::Samples(v) => self.samples = clamp_u32(v, &SAMPLE_RANGE),
            ParamChange::Light(v) => self.light = clamp_f32(v, &LIGHT_RANGE),
            ParamChange::Fov(v) => self.fov = clamp_f32(v, &FOV_RANGE),
            ParamChange::Aperture(v) => self.aperture = clamp_f32(v, &APERTURE_RANGE),
            ParamChange::FocusDistance(v) => self.focus_distance = clamp_f32(v, &FOCUS_RANGE),
            ParamChange::MoveSpeed(v) => self.move_speed = clamp_f32(v, &SPEED_RANGE),
            ParamChange::SkyMode(mode) => self.sky_mode = mode,
            ParamChange::HighQuality(on) => self.high_quality = on,
        }
        change.affects_image() && *self != before
    }
}

fn clamp_u32(v: u32, range: &RangeInclusive<u32>) -> u32 {
    v.clamp(*range.start(), *range.end())
}

fn clamp_f32(v: f32, range: &RangeInclusive<f32>) -> f32 {
    if v.is_nan() {
        return *range.start();
    }
    v.clamp(*range.start(), *range.end())
}
