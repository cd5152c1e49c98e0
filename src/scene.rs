//! Scene description and GPU encoding
//!
//! The scene is a flat list of spheres: a fixed catalog of celestial bodies
//! followed by randomly scattered background stars. It is built once, encoded
//! with [`SPHERE_LAYOUT`] and uploaded to a read-only storage buffer.

use crate::error::LayoutError;
use crate::layout::{Field, FieldKind, FieldValue, RecordLayout};
use glam::Vec3;
use rand::Rng;
use std::f32::consts::{PI, TAU};

/// How a sphere interacts with light. Values are shared with the path tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MaterialKind {
    Diffuse = 0,
    Metal = 1,
    Emissive = 2,
    Dielectric = 3,
}

impl MaterialKind {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(MaterialKind::Diffuse),
            1 => Some(MaterialKind::Metal),
            2 => Some(MaterialKind::Emissive),
            3 => Some(MaterialKind::Dielectric),
            _ => None,
        }
    }
}

/// Byte layout of one sphere record (12 words)
pub const SPHERE_LAYOUT: RecordLayout = RecordLayout {
    name: "Sphere",
    stride: 48,
    fields: &[
        Field::new("center", 0, FieldKind::Vec3),
        Field::new("radius", 12, FieldKind::F32),
        Field::new("color", 16, FieldKind::Vec3),
        Field::new("material", 28, FieldKind::U32),
        Field::new("roughness", 32, FieldKind::F32),
    ],
};

/// Number of procedurally placed background stars
pub const DEFAULT_STAR_COUNT: usize = 25;

/// A single scene primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    /// Albedo, or radiance for emissive spheres
    pub color: Vec3,
    pub material: MaterialKind,
    pub roughness: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32, color: Vec3, material: MaterialKind) -> Self {
        Self {
            center,
            radius,
            color,
            material,
            roughness: 0.0,
        }
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    fn field_values(&self) -> [FieldValue; 5] {
        [
            self.center.into(),
            self.radius.into(),
            self.color.into(),
            self.material.as_u32().into(),
            self.roughness.into(),
        ]
    }
}

struct CatalogEntry {
    name: &'static str,
    center: [f32; 3],
    radius: f32,
    color: [f32; 3],
    material: MaterialKind,
    roughness: f32,
}

const fn body(
    name: &'static str,
    center: [f32; 3],
    radius: f32,
    color: [f32; 3],
    material: MaterialKind,
    roughness: f32,
) -> CatalogEntry {
    CatalogEntry {
        name,
        center,
        radius,
        color,
        material,
        roughness,
    }
}

use MaterialKind::{Dielectric, Diffuse, Emissive, Metal};

#[rustfmt::skip]
const CATALOG: &[CatalogEntry] = &[
    body("sun",        [0.0, 0.0, -25.0],  8.0,  [15.0, 12.0, 4.0],  Emissive,   0.0),
    body("mercury",    [12.0, 1.0, -20.0], 0.4,  [0.6, 0.55, 0.5],   Metal,      0.2),
    body("venus",      [15.0, -0.5, -15.0], 0.9, [0.95, 0.8, 0.5],   Diffuse,    0.0),
    body("earth",      [18.0, 0.0, -8.0],  1.0,  [0.2, 0.5, 0.9],    Dielectric, 0.0),
    body("moon",       [19.5, 0.8, -6.5],  0.27, [0.85, 0.85, 0.85], Diffuse,    0.0),
    body("mars",       [22.0, -0.3, -2.0], 0.6,  [0.9, 0.3, 0.15],   Metal,      0.4),
    body("phobos",     [23.0, 0.5, -1.5],  0.1,  [0.5, 0.4, 0.35],   Diffuse,    0.0),
    body("asteroid",   [25.0, 0.2, 2.0],   0.08, [0.4, 0.35, 0.3],   Diffuse,    0.5),
    body("asteroid",   [26.0, -0.1, 3.0],  0.06, [0.5, 0.45, 0.4],   Diffuse,    0.5),
    body("asteroid",   [24.0, 0.3, 4.0],   0.1,  [0.45, 0.4, 0.35],  Metal,      0.8),
    body("asteroid",   [27.0, -0.2, 2.5],  0.07, [0.55, 0.5, 0.45],  Diffuse,    0.5),
    body("jupiter",    [35.0, 0.5, 12.0],  4.0,  [0.85, 0.6, 0.4],   Metal,      0.1),
    body("io",         [38.0, 2.0, 10.0],  0.3,  [0.95, 0.85, 0.3],  Emissive,   0.0),
    body("europa",     [33.0, -1.5, 14.0], 0.25, [0.9, 0.95, 1.0],   Dielectric, 0.0),
    body("saturn",     [48.0, -1.0, 25.0], 3.5,  [0.95, 0.85, 0.55], Metal,      0.05),
    body("ring",       [48.0, -1.05, 21.0], 0.15, [0.8, 0.75, 0.6], Metal,      0.6),
    body("ring",       [48.0, -0.95, 29.0], 0.12, [0.85, 0.8, 0.65], Metal,      0.6),
    body("ring",       [44.0, -1.0, 25.0], 0.1,  [0.75, 0.7, 0.55],  Metal,      0.6),
    body("ring",       [52.0, -1.0, 25.0], 0.13, [0.9, 0.85, 0.7],   Metal,      0.6),
    body("titan",      [52.0, 0.5, 28.0],  0.5,  [0.9, 0.6, 0.3],    Diffuse,    0.0),
    body("uranus",     [60.0, 2.0, 40.0],  2.0,  [0.5, 0.8, 0.85],   Dielectric, 0.0),
    body("neptune",    [70.0, -3.0, 55.0], 1.8,  [0.2, 0.3, 0.9],    Dielectric, 0.0),
    body("triton",     [72.0, -1.5, 53.0], 0.25, [0.85, 0.9, 0.95],  Metal,      0.3),
    body("star",       [-50.0, 30.0, -80.0], 0.5,  [10.0, 10.0, 12.0], Emissive, 0.0),
    body("star",       [40.0, 45.0, -100.0], 0.4,  [12.0, 8.0, 4.0],   Emissive, 0.0),
    body("star",       [-30.0, -25.0, -90.0], 0.3, [12.0, 12.0, 10.0], Emissive, 0.0),
    body("star",       [60.0, 35.0, -85.0], 0.35,  [14.0, 6.0, 6.0],   Emissive, 0.0),
    body("star",       [-45.0, 50.0, -95.0], 0.45, [8.0, 10.0, 14.0],  Emissive, 0.0),
    body("star",       [55.0, -40.0, -88.0], 0.25, [15.0, 15.0, 12.0], Emissive, 0.0),
    body("star",       [-60.0, -35.0, -92.0], 0.3, [10.0, 12.0, 14.0], Emissive, 0.0),
    body("star",       [70.0, 25.0, -78.0], 0.28,  [14.0, 10.0, 6.0],  Emissive, 0.0),
    body("nebula",     [-20.0, 15.0, -50.0], 1.5,  [0.3, 0.1, 0.4],    Diffuse,  0.0),
    body("nebula",     [-25.0, 18.0, -55.0], 1.2,  [0.4, 0.15, 0.5],   Diffuse,  0.0),
    body("nebula",     [15.0, -20.0, -60.0], 1.8,  [0.5, 0.2, 0.3],    Diffuse,  0.0),
    body("comet",      [-8.0, 5.0, 5.0],   0.3,  [0.9, 0.95, 1.0],   Dielectric, 0.0),
    body("comet tail", [-9.0, 5.3, 6.0],   0.08, [8.0, 8.0, 10.0],   Emissive,   0.0),
    body("comet tail", [-10.0, 5.5, 7.0],  0.06, [6.0, 6.0, 8.0],    Emissive,   0.0),
    body("comet tail", [-11.0, 5.7, 8.0],  0.04, [4.0, 4.0, 6.0],    Emissive,   0.0),
];

/// Hot and cool star tints for the scattered background
const STAR_PALETTE: [[f32; 3]; 5] = [
    [10.0, 12.0, 15.0],
    [14.0, 14.0, 14.0],
    [15.0, 14.0, 8.0],
    [15.0, 10.0, 5.0],
    [15.0, 6.0, 6.0],
];

/// The immutable set of spheres rendered by the tracer
#[derive(Debug, Clone, Default)]
pub struct Scene {
    spheres: Vec<Sphere>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed solar-system catalog followed by `star_count` scattered stars.
    pub fn solar_system<R: Rng + ?Sized>(star_count: usize, rng: &mut R) -> Self {
        let mut scene = Self::new();
        for entry in CATALOG {
            log::debug!(
                "Catalog {}: {:?} r={} {:?}",
                entry.name,
                entry.center,
                entry.radius,
                entry.material
            );
            scene.push(
                Sphere::new(
                    Vec3::from_array(entry.center),
                    entry.radius,
                    Vec3::from_array(entry.color),
                    entry.material,
                )
                .with_roughness(entry.roughness),
            );
        }
        scene.scatter_stars(star_count, rng);
        log::debug!(
            "Scene built: {} catalog bodies, {} background stars",
            CATALOG.len(),
            star_count
        );
        scene
    }

    pub fn push(&mut self, sphere: Sphere) {
        self.spheres.push(sphere);
    }

    /// Append distant emissive points on a flattened spherical shell behind the sun.
    pub fn scatter_stars<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) {
        for _ in 0..count {
            let theta = rng.gen::<f32>() * TAU;
            let phi = (rng.gen::<f32>() - 0.5) * PI;
            let dist = 70.0 + rng.gen::<f32>() * 40.0;

            let center = Vec3::new(
                theta.cos() * phi.cos() * dist,
                phi.sin() * dist * 0.3 + (rng.gen::<f32>() - 0.5) * 20.0,
                theta.sin() * phi.cos() * dist - 80.0,
            );
            let radius = rng.gen::<f32>() * 0.2 + 0.1;
            let color = STAR_PALETTE[rng.gen_range(0..STAR_PALETTE.len())];

            self.push(Sphere::new(
                center,
                radius,
                Vec3::from_array(color),
                MaterialKind::Emissive,
            ));
        }
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }

    /// Size in bytes of the encoded buffer
    pub fn byte_len(&self) -> usize {
        self.spheres.len() * SPHERE_LAYOUT.stride
    }

    /// Serialize every sphere into consecutive [`SPHERE_LAYOUT`] records.
    pub fn encode(&self) -> Result<Vec<u8>, LayoutError> {
        let stride = SPHERE_LAYOUT.stride;
        let mut bytes = vec![0u8; self.byte_len()];
        for (sphere, record) in self.spheres.iter().zip(bytes.chunks_exact_mut(stride)) {
            SPHERE_LAYOUT.pack_into(&sphere.field_values(), record)?;
        }
        Ok(bytes)
    }
}
