//! Throughput benchmark
//!
//! Renders a fixed number of compute-only frames with pinned parameters,
//! waits for the queue to drain and reports estimated rays per second. The
//! interactive loop is suspended for the whole run.

use crate::error::TracerResult;
use crate::frame::{FrameBackend, FramePlan, QueueDrain, RenderContext, RunState};
use crate::params::RenderParams;
use crate::uniforms::FrameUniforms;
use glam::{Vec2, Vec3};
use std::time::Duration;
use web_time::Instant;

pub const DEFAULT_BENCHMARK_FRAMES: u32 = 100;

/// Pinned values used for every benchmark frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkSettings {
    pub frames: u32,
    pub samples: u32,
    pub bounces: u32,
    pub fov: f32,
    pub light: f32,
    pub aperture: f32,
    pub focus_distance: f32,
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            frames: DEFAULT_BENCHMARK_FRAMES,
            samples: 1,
            bounces: 5,
            fov: 60.0,
            light: 2.0,
            aperture: 0.0,
            focus_distance: 10.0,
        }
    }
}

impl BenchmarkSettings {
    pub fn with_frames(mut self, frames: u32) -> Self {
        self.frames = frames.max(1);
        self
    }
}

/// Bookkeeping for the run in progress
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveBenchmark {
    saved_params: RenderParams,
    resume_after: bool,
}

/// Final figures of a completed run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkReport {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub bounces: u32,
    pub frames: u32,
    pub elapsed: Duration,
    /// width x height x samples x bounces x frames
    pub total_rays: u64,
    pub rays_per_second: f64,
    /// rays per second / 1000, rounded
    pub score: u64,
}

impl BenchmarkReport {
    pub fn new(
        width: u32,
        height: u32,
        samples: u32,
        bounces: u32,
        frames: u32,
        elapsed: Duration,
    ) -> Self {
        let total_rays = u64::from(width)
            * u64::from(height)
            * u64::from(samples)
            * u64::from(bounces)
            * u64::from(frames);
        let seconds = elapsed.as_secs_f64().max(1e-9);
        let rays_per_second = total_rays as f64 / seconds;
        Self {
            width,
            height,
            samples,
            bounces,
            frames,
            elapsed,
            total_rays,
            rays_per_second,
            score: (rays_per_second / 1000.0).round() as u64,
        }
    }
}

/// Submitted benchmark frames awaiting completion on the GPU
#[must_use = "a benchmark must be finished and then ended on its context"]
pub struct PendingBenchmark {
    drain: QueueDrain,
    started: Instant,
    width: u32,
    height: u32,
    settings: BenchmarkSettings,
}

impl PendingBenchmark {
    /// Wait for the queue to drain and measure the run.
    pub async fn finish(self) -> TracerResult<BenchmarkReport> {
        self.drain.await?;
        let elapsed = self.started.elapsed();
        Ok(BenchmarkReport::new(
            self.width,
            self.height,
            self.settings.samples,
            self.settings.bounces,
            self.settings.frames,
            elapsed,
        ))
    }
}

impl<B: FrameBackend> RenderContext<B> {
    pub fn is_benchmarking(&self) -> bool {
        self.benchmark.is_some()
    }

    /// Override parameters and submit every benchmark frame.
    ///
    /// Returns `Ok(None)` without doing anything when a benchmark is already
    /// running or the device is gone.
    pub fn begin_benchmark(
        &mut self,
        settings: BenchmarkSettings,
    ) -> TracerResult<Option<PendingBenchmark>> {
        if self.benchmark.is_some() || self.poll_device() {
            return Ok(None);
        }

        let saved_params = self.params;
        self.benchmark = Some(ActiveBenchmark {
            saved_params,
            resume_after: self.run_state == RunState::Running,
        });
        self.run_state = RunState::Benchmarking;
        self.presented = None;
        self.params = RenderParams {
            samples: settings.samples,
            bounces: settings.bounces,
            fov: settings.fov,
            high_quality: false,
            ..saved_params
        };
        self.accumulation.reset();

        let (width, height) = self.backend.surface_size();
        log::info!(
            "Benchmark: {} frames at {}x{}, {} spp, {} bounces",
            settings.frames,
            width,
            height,
            settings.samples,
            settings.bounces
        );

        let started = Instant::now();
        for _ in 0..settings.frames {
            let seed = self.next_seed();
            let uniforms = FrameUniforms {
                resolution: Vec2::new(width as f32, height as f32),
                time: 0.0,
                camera_position: self.camera.position,
                camera_forward: Vec3::NEG_Z,
                bounces: self.params.effective_bounces(),
                samples: self.params.effective_samples(),
                light: settings.light,
                fov: settings.fov,
                seed,
                frame_index: self.accumulation.frame_index(),
                aperture: settings.aperture,
                focus_distance: settings.focus_distance,
                sky_mode: self.params.sky_mode,
            };

            if let Err(e) = self.submit_compute_frame(&uniforms, width, height) {
                self.end_benchmark();
                return Err(e);
            }
        }

        Ok(Some(PendingBenchmark {
            drain: self.backend.queue_drained(),
            started,
            width,
            height,
            settings,
        }))
    }

    fn submit_compute_frame(
        &mut self,
        uniforms: &FrameUniforms,
        width: u32,
        height: u32,
    ) -> TracerResult<()> {
        self.backend.write_uniforms(&uniforms.pack()?);
        let plan = FramePlan::compute_only(self.accumulation.ping_pong(), width, height);
        self.backend.submit(&plan)?;
        self.accumulation.advance();
        Ok(())
    }

    /// Restore the parameters saved by [`begin_benchmark`](Self::begin_benchmark)
    /// and reset accumulation. Returns whether the interactive loop should
    /// be rescheduled.
    pub fn end_benchmark(&mut self) -> bool {
        let Some(active) = self.benchmark.take() else {
            return false;
        };
        self.params = active.saved_params;
        self.accumulation.reset();

        if self.poll_device() {
            return false;
        }
        self.run_state = if active.resume_after {
            RunState::Running
        } else {
            RunState::Paused
        };
        active.resume_after
    }

    /// Run a complete benchmark: submit, wait, restore.
    pub async fn run_benchmark(
        &mut self,
        settings: BenchmarkSettings,
    ) -> TracerResult<Option<BenchmarkReport>> {
        let Some(pending) = self.begin_benchmark(settings)? else {
            return Ok(None);
        };
        let report = pending.finish().await;
        self.end_benchmark();
        let report = report?;
        log::info!(
            "Benchmark: {} rays in {:.2}s, {:.0} rays/s, score {}",
            report.total_rays,
            report.elapsed.as_secs_f64(),
            report.rays_per_second,
            report.score
        );
        Ok(Some(report))
    }
}
