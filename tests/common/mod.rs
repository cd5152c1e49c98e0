//! Shared test utilities: a [`FrameBackend`] that records instead of rendering.

#![allow(dead_code)]

use stellar_tracer::frame::{DeviceHealth, FrameBackend, FramePlan, QueueDrain};
use stellar_tracer::uniforms::UNIFORM_LAYOUT;
use stellar_tracer::{TracerError, TracerResult};

/// Largest surface edge the fake device accepts
pub const MAX_TEXTURE_SIZE: u32 = 4096;

pub struct RecordingBackend {
    size: (u32, u32),
    pub uniforms: Vec<Vec<u8>>,
    pub plans: Vec<FramePlan>,
    pub resizes: Vec<(u32, u32)>,
    /// Returned (once) by the next `submit`
    pub fail_next: Option<TracerError>,
    health: DeviceHealth,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            uniforms: Vec::new(),
            plans: Vec::new(),
            resizes: Vec::new(),
            fail_next: None,
            health: DeviceHealth::new(),
        }
    }

    pub fn lose_device(&self, reason: &str) {
        self.health.mark_lost(reason);
    }

    pub fn last_plan(&self) -> Option<&FramePlan> {
        self.plans.last()
    }

    /// A `u32` field of the uniform record staged for the latest submission
    pub fn last_u32(&self, field: &str) -> Option<u32> {
        UNIFORM_LAYOUT.read_u32(self.uniforms.last()?, field)
    }

    pub fn last_f32(&self, field: &str) -> Option<f32> {
        UNIFORM_LAYOUT.read_f32(self.uniforms.last()?, field)
    }
}

impl FrameBackend for RecordingBackend {
    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) -> (u32, u32) {
        self.size = (width.min(MAX_TEXTURE_SIZE), height.min(MAX_TEXTURE_SIZE));
        self.resizes.push(self.size);
        self.size
    }

    fn write_uniforms(&mut self, bytes: &[u8]) {
        self.uniforms.push(bytes.to_vec());
    }

    fn submit(&mut self, plan: &FramePlan) -> TracerResult<()> {
        if let Some(err) = self.fail_next.take() {
            return Err(err);
        }
        self.plans.push(*plan);
        Ok(())
    }

    fn queue_drained(&self) -> QueueDrain {
        QueueDrain::ready()
    }

    fn health(&self) -> &DeviceHealth {
        &self.health
    }
}
