//! Frame driver
//!
//! [`RenderContext`] owns everything that changes from frame to frame (camera,
//! parameters, accumulation counters) and drives a [`FrameBackend`] that owns
//! the GPU objects. Keeping the GPU behind a trait lets the per-tick logic run
//! against a recording backend in tests.

use crate::accumulation::{Accumulation, PingPong, SurfaceSlot};
use crate::camera::{CameraInput, CameraState};
use crate::error::{TracerError, TracerResult};
use crate::params::{ParamChange, RenderParams};
use crate::uniforms::FrameUniforms;
use futures_channel::oneshot;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use web_time::Instant;

/// Compute workgroup edge length; must match `@workgroup_size` in the path tracer
pub const WORKGROUP_SIZE: u32 = 8;

/// Frames between two [`FrameStats`] updates
pub const DEFAULT_STATS_INTERVAL: u32 = 10;

/// Workgroup grid covering a `width` x `height` surface
pub fn dispatch_size(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(WORKGROUP_SIZE), height.div_ceil(WORKGROUP_SIZE))
}

/// Everything one submission needs to know.
///
/// A plan is always encoded into a single command buffer: the compute pass
/// first, then (if `present`) the tone-map pass reading `ping_pong.target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlan {
    pub ping_pong: PingPong,
    pub workgroups: (u32, u32),
    pub present: bool,
}

impl FramePlan {
    pub fn interactive(ping_pong: PingPong, width: u32, height: u32) -> Self {
        Self {
            ping_pong,
            workgroups: dispatch_size(width, height),
            present: true,
        }
    }

    pub fn compute_only(ping_pong: PingPong, width: u32, height: u32) -> Self {
        Self {
            present: false,
            ..Self::interactive(ping_pong, width, height)
        }
    }
}

/// Device-loss flag shared with the asynchronous loss callback
#[derive(Debug, Default)]
pub struct DeviceHealth {
    lost: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl DeviceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_lost(&self, reason: impl Into<String>) {
        *self.reason.lock() = Some(reason.into());
        self.lost.store(true, Ordering::Release);
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}

/// Resolves once every submission made before it was created has finished.
pub struct QueueDrain(oneshot::Receiver<()>);

impl QueueDrain {
    /// Channel whose sender must be fired from the queue's work-done callback.
    pub fn channel() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(rx))
    }

    /// An already-drained queue
    pub fn ready() -> Self {
        let (tx, drain) = Self::channel();
        let _ = tx.send(());
        drain
    }
}

impl Future for QueueDrain {
    type Output = TracerResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|result| {
            result.map_err(|_| TracerError::DeviceLost("queue drain callback was dropped".into()))
        })
    }
}

/// GPU operations the frame driver relies on
pub trait FrameBackend {
    /// Size of the accumulation surfaces (and the presented image)
    fn surface_size(&self) -> (u32, u32);

    /// Resize the output and both accumulation surfaces. Returns the size
    /// actually used after clamping to device limits.
    fn resize(&mut self, width: u32, height: u32) -> (u32, u32);

    /// Stage the packed uniform record for the next submission.
    fn write_uniforms(&mut self, bytes: &[u8]);

    /// Encode `plan` into one command buffer and submit it.
    fn submit(&mut self, plan: &FramePlan) -> TracerResult<()>;

    /// Future resolving when all work submitted so far has completed.
    fn queue_drained(&self) -> QueueDrain;

    fn health(&self) -> &DeviceHealth;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    /// The interactive loop is suspended while a benchmark owns the GPU
    Benchmarking,
    /// Terminal; no resume path exists
    DeviceLost,
}

/// Performance figures published every few frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    /// Instantaneous frames per second
    pub fps: f32,
    pub frame_index: u32,
    /// Samples per pixel in the current running average
    pub accumulated_samples: u64,
    pub total_frames: u64,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// A frame was submitted; `stats` is set on publishing ticks
    Rendered { stats: Option<FrameStats> },
    /// The surface was unavailable; try again next tick
    Skipped,
    /// Paused, benchmarking or device lost; do not schedule another tick
    Halted,
}

impl TickOutcome {
    pub fn reschedule(&self) -> bool {
        !matches!(self, TickOutcome::Halted)
    }
}

/// Explicit render context: the GPU backend plus all per-frame state
pub struct RenderContext<B: FrameBackend> {
    pub(crate) backend: B,
    pub(crate) camera: CameraState,
    pub(crate) params: RenderParams,
    pub(crate) accumulation: Accumulation,
    pub(crate) run_state: RunState,
    pub(crate) rng: SmallRng,
    pub(crate) benchmark: Option<crate::benchmark::ActiveBenchmark>,
    /// Surface shown by the last presented frame; survives accumulation resets
    pub(crate) presented: Option<SurfaceSlot>,
    stats_interval: u32,
    started: Instant,
    last_frame: Instant,
}

impl<B: FrameBackend> RenderContext<B> {
    /// Wrap an initialized backend. `seed` fixes the per-frame random seeds.
    pub fn new(backend: B, seed: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            backend,
            camera: CameraState::default(),
            params: RenderParams::default(),
            accumulation: Accumulation::new(),
            run_state: RunState::Running,
            rng: seed.map_or_else(SmallRng::from_entropy, SmallRng::seed_from_u64),
            benchmark: None,
            presented: None,
            stats_interval: DEFAULT_STATS_INTERVAL,
            started: now,
            last_frame: now,
        }
    }

    pub fn with_camera(mut self, camera: CameraState) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_params(mut self, params: RenderParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_stats_interval(mut self, frames: u32) -> Self {
        self.stats_interval = frames.max(1);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    pub fn accumulation(&self) -> &Accumulation {
        &self.accumulation
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Surface holding the image currently on screen, if any.
    ///
    /// A reset does not touch surface contents, so this stays valid until the
    /// next frame is rendered. Resizing and benchmarking discard it.
    pub fn latest_surface(&self) -> Option<SurfaceSlot> {
        self.presented
    }

    /// Restart progressive refinement from frame zero.
    pub fn reset_accumulation(&mut self) {
        self.accumulation.reset();
    }

    /// Apply a parameter change, resetting accumulation when the image is affected.
    ///
    /// Ignored while a benchmark is running so the parameters it restores stay intact.
    pub fn apply_param(&mut self, change: ParamChange) -> bool {
        if self.run_state == RunState::Benchmarking {
            log::debug!("Ignoring {:?} during benchmark", change);
            return false;
        }
        let reset = self.params.apply(change);
        if reset {
            self.accumulation.reset();
        }
        reset
    }

    /// Replace the camera pose, resetting accumulation if it moved.
    pub fn set_camera(&mut self, camera: CameraState) {
        if camera != self.camera {
            self.camera = camera;
            self.accumulation.reset();
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let (w, h) = self.backend.resize(width, height);
        log::info!("Accumulation surfaces resized to {}x{}", w, h);
        self.accumulation.reset();
        self.presented = None;
    }

    /// Stop scheduling ticks. Returns whether the state changed.
    pub fn pause(&mut self) -> bool {
        if self.run_state != RunState::Running {
            return false;
        }
        self.run_state = RunState::Paused;
        log::info!("Paused at frame {}", self.accumulation.frame_index());
        true
    }

    /// Continue from the current frame index. Returns whether ticks should be
    /// scheduled again.
    pub fn resume(&mut self) -> bool {
        if self.run_state != RunState::Paused {
            return false;
        }
        self.run_state = RunState::Running;
        self.last_frame = Instant::now();
        log::info!("Resumed at frame {}", self.accumulation.frame_index());
        true
    }

    pub fn toggle_pause(&mut self) -> bool {
        match self.run_state {
            RunState::Running => {
                self.pause();
                false
            }
            RunState::Paused => self.resume(),
            _ => false,
        }
    }

    /// Check the asynchronous loss flag, entering the terminal state once.
    pub fn poll_device(&mut self) -> bool {
        if self.run_state == RunState::DeviceLost {
            return true;
        }
        if self.backend.health().is_lost() {
            let reason = self.backend.health().reason().unwrap_or_default();
            log::error!("GPU device lost: {}", reason);
            self.run_state = RunState::DeviceLost;
            return true;
        }
        false
    }

    /// Feed pointer motion to the camera. Dropped unless the pointer is
    /// locked and frames are being rendered, so nothing piles up while paused.
    pub fn mouse_motion(&self, input: &mut CameraInput, dx: f32, dy: f32) -> bool {
        if !input.pointer_locked || self.run_state != RunState::Running {
            return false;
        }
        input.add_mouse_motion(dx, dy);
        true
    }

    pub(crate) fn next_seed(&mut self) -> f32 {
        self.rng.gen::<f32>()
    }

    /// Run one interactive frame.
    pub fn tick(&mut self, input: &mut CameraInput) -> TracerResult<TickOutcome> {
        if self.poll_device() || self.run_state != RunState::Running {
            input.reset_deltas();
            return Ok(TickOutcome::Halted);
        }

        if self.camera.update(input, self.params.move_speed) {
            self.accumulation.reset();
        }
        input.reset_deltas();

        let (width, height) = self.backend.surface_size();
        let seed = self.next_seed();
        let uniforms = FrameUniforms::interactive(
            width,
            height,
            self.started.elapsed().as_secs_f32(),
            &self.camera,
            &self.params,
            seed,
            self.accumulation.frame_index(),
        );
        self.backend.write_uniforms(&uniforms.pack()?);

        let plan = FramePlan::interactive(self.accumulation.ping_pong(), width, height);
        if let Err(e) = self.backend.submit(&plan) {
            if e.is_transient() {
                log::debug!("Skipping frame: {}", e);
                return Ok(TickOutcome::Skipped);
            }
            log::error!("Frame submission failed: {}", e);
            self.run_state = RunState::DeviceLost;
            return Err(e);
        }

        self.accumulation.advance();
        self.presented = Some(plan.ping_pong.target);

        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        let stats = (self.accumulation.total_frames() % u64::from(self.stats_interval) == 0)
            .then(|| FrameStats {
                fps: if dt > 0.0 { 1.0 / dt } else { 0.0 },
                frame_index: self.accumulation.frame_index(),
                accumulated_samples: u64::from(self.accumulation.frame_index())
                    * u64::from(self.params.effective_samples()),
                total_frames: self.accumulation.total_frames(),
            });

        Ok(TickOutcome::Rendered { stats })
    }
}
