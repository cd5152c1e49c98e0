//! Window event handling and the application shell
//!
//! Keys map to [`Command`]s (camera movement is handled separately as held
//! state). The platform event loops own an [`App`] and drive the asynchronous
//! pieces, benchmark completion and export readback, on their own executors.

use crate::benchmark::{BenchmarkReport, BenchmarkSettings, PendingBenchmark};
use crate::camera::CameraInput;
use crate::error::{ExportError, ExportResult, TracerResult};
use crate::frame::{FrameBackend, FrameStats, RenderContext, RunState, TickOutcome};
use crate::gpu::{GpuTracer, PendingReadback};
use crate::params::{ParamChange, RenderParams, SkyMode};
use crate::scene::Scene;
use crate::TracerConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use winit::event::{DeviceEvent, ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window};

pub const BOUNCE_STEP: i32 = 1;
pub const SAMPLE_STEP: i32 = 1;
pub const LIGHT_STEP: f32 = 0.1;
pub const FOV_STEP: f32 = 5.0;
pub const APERTURE_STEP: f32 = 0.01;
pub const FOCUS_STEP: f32 = 1.0;
pub const SPEED_STEP: f32 = 0.05;

/// Relative parameter adjustment bound to a key
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjust {
    Bounces(i32),
    Samples(i32),
    Light(f32),
    Fov(f32),
    Aperture(f32),
    FocusDistance(f32),
    MoveSpeed(f32),
}

impl Adjust {
    /// Turn the step into an absolute change against the current values.
    pub fn resolve(self, params: &RenderParams) -> ParamChange {
        match self {
            Adjust::Bounces(d) => ParamChange::Bounces(params.bounces.saturating_add_signed(d)),
            Adjust::Samples(d) => ParamChange::Samples(params.samples.saturating_add_signed(d)),
            Adjust::Light(d) => ParamChange::Light(params.light + d),
            Adjust::Fov(d) => ParamChange::Fov(params.fov + d),
            Adjust::Aperture(d) => ParamChange::Aperture(params.aperture + d),
            Adjust::FocusDistance(d) => ParamChange::FocusDistance(params.focus_distance + d),
            Adjust::MoveSpeed(d) => ParamChange::MoveSpeed(params.move_speed + d),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Adjust(Adjust),
    SkyMode(SkyMode),
    ToggleHighQuality,
    TogglePause,
    Benchmark,
    Export,
    ReleasePointer,
}

impl Command {
    /// Adjustments auto-repeat while held; toggles and actions fire once.
    pub fn repeats(&self) -> bool {
        matches!(self, Command::Adjust(_))
    }
}

pub fn command_for_key(key: KeyCode) -> Option<Command> {
    use Adjust::*;
    let command = match key {
        KeyCode::BracketLeft => Command::Adjust(Bounces(-BOUNCE_STEP)),
        KeyCode::BracketRight => Command::Adjust(Bounces(BOUNCE_STEP)),
        KeyCode::Minus => Command::Adjust(Samples(-SAMPLE_STEP)),
        KeyCode::Equal => Command::Adjust(Samples(SAMPLE_STEP)),
        KeyCode::Comma => Command::Adjust(Light(-LIGHT_STEP)),
        KeyCode::Period => Command::Adjust(Light(LIGHT_STEP)),
        KeyCode::Digit9 => Command::Adjust(Fov(-FOV_STEP)),
        KeyCode::Digit0 => Command::Adjust(Fov(FOV_STEP)),
        KeyCode::Semicolon => Command::Adjust(Aperture(-APERTURE_STEP)),
        KeyCode::Quote => Command::Adjust(Aperture(APERTURE_STEP)),
        KeyCode::KeyK => Command::Adjust(FocusDistance(-FOCUS_STEP)),
        KeyCode::KeyL => Command::Adjust(FocusDistance(FOCUS_STEP)),
        KeyCode::KeyZ => Command::Adjust(MoveSpeed(-SPEED_STEP)),
        KeyCode::KeyX => Command::Adjust(MoveSpeed(SPEED_STEP)),
        KeyCode::Digit1 => Command::SkyMode(SkyMode::Space),
        KeyCode::Digit2 => Command::SkyMode(SkyMode::Day),
        KeyCode::KeyH => Command::ToggleHighQuality,
        KeyCode::KeyP => Command::TogglePause,
        KeyCode::KeyB => Command::Benchmark,
        KeyCode::F12 => Command::Export,
        KeyCode::Escape => Command::ReleasePointer,
        _ => return None,
    };
    Some(command)
}

/// Update held movement state. Returns whether `key` is a movement key.
pub fn apply_movement_key(input: &mut CameraInput, key: KeyCode, pressed: bool) -> bool {
    match key {
        KeyCode::KeyW => input.forward = pressed,
        KeyCode::KeyS => input.backward = pressed,
        KeyCode::KeyA => input.left = pressed,
        KeyCode::KeyD => input.right = pressed,
        KeyCode::KeyQ => input.down = pressed,
        KeyCode::KeyE => input.up = pressed,
        _ => return false,
    }
    true
}

/// Work the event loop must finish on its own executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRequest {
    None,
    Exit,
    Benchmark,
    Export,
}

pub fn stats_title(title: &str, stats: &FrameStats, params: &RenderParams) -> String {
    format!(
        "{} | {:.0} fps | {} spp | {} bounces{}",
        title,
        stats.fps,
        stats.accumulated_samples,
        params.effective_bounces(),
        if params.high_quality { " | HQ" } else { "" }
    )
}

pub fn report_title(title: &str, report: &BenchmarkReport) -> String {
    format!(
        "{} | Benchmark: {:.1} Mrays/s, score {}",
        title,
        report.rays_per_second / 1.0e6,
        report.score
    )
}

pub struct App {
    window: Arc<Window>,
    context: RenderContext<GpuTracer>,
    input: CameraInput,
    config: TracerConfig,
    last_report: Option<BenchmarkReport>,
}

impl App {
    /// Build the scene and initialize the GPU. Awaited once.
    pub async fn new(window: Arc<Window>, config: TracerConfig) -> TracerResult<Self> {
        let mut rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let scene = Scene::solar_system(config.star_count, &mut rng);

        let tracer = GpuTracer::new(Arc::clone(&window), &config, &scene).await?;
        let context = RenderContext::new(tracer, config.seed)
            .with_stats_interval(config.stats_interval);

        log::info!("Tracer initialized");
        window.request_redraw();

        Ok(Self {
            window,
            context,
            input: CameraInput::new(),
            config,
            last_report: None,
        })
    }

    pub fn context(&self) -> &RenderContext<GpuTracer> {
        &self.context
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    fn set_pointer_lock(&mut self, locked: bool) {
        if locked {
            let grabbed = self
                .window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined));
            if let Err(e) = grabbed {
                log::warn!("Pointer lock unavailable: {}", e);
                return;
            }
        } else if let Err(e) = self.window.set_cursor_grab(CursorGrabMode::None) {
            log::warn!("Failed to release pointer: {}", e);
        }
        self.window.set_cursor_visible(!locked);
        self.input.pointer_locked = locked;
    }

    fn run_command(&mut self, command: Command) -> AppRequest {
        match command {
            Command::Adjust(adjust) => {
                let change = adjust.resolve(self.context.params());
                self.apply(change);
            }
            Command::SkyMode(mode) => self.apply(ParamChange::SkyMode(mode)),
            Command::ToggleHighQuality => {
                let on = !self.context.params().high_quality;
                self.apply(ParamChange::HighQuality(on));
            }
            Command::TogglePause => {
                if self.context.toggle_pause() {
                    self.input.reset_deltas();
                    self.window.request_redraw();
                }
            }
            Command::Benchmark => return AppRequest::Benchmark,
            Command::Export => return AppRequest::Export,
            Command::ReleasePointer => self.set_pointer_lock(false),
        }
        AppRequest::None
    }

    fn apply(&mut self, change: ParamChange) {
        if self.context.apply_param(change) {
            log::debug!("{:?} applied, accumulation reset", change);
        }
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) -> AppRequest {
        match event {
            WindowEvent::CloseRequested => return AppRequest::Exit,
            WindowEvent::Resized(size) => {
                self.context.resize(size.width, size.height);
                self.window.request_redraw();
            }
            WindowEvent::RedrawRequested => self.redraw(),
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(key) = event.physical_key else {
                    return AppRequest::None;
                };
                let pressed = event.state == ElementState::Pressed;
                if apply_movement_key(&mut self.input, key, pressed) || !pressed {
                    return AppRequest::None;
                }
                if let Some(command) = command_for_key(key) {
                    if !event.repeat || command.repeats() {
                        return self.run_command(command);
                    }
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                if !self.input.pointer_locked {
                    self.set_pointer_lock(true);
                }
            }
            WindowEvent::Focused(false) => {
                self.input.release_keys();
                if self.input.pointer_locked {
                    self.set_pointer_lock(false);
                }
            }
            _ => {}
        }
        AppRequest::None
    }

    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            let (dx, dy) = (delta.0 as f32, delta.1 as f32);
            self.context.mouse_motion(&mut self.input, dx, dy);
        }
    }

    fn redraw(&mut self) {
        match self.context.tick(&mut self.input) {
            Ok(outcome) => {
                if let TickOutcome::Rendered { stats: Some(stats) } = outcome {
                    log::debug!(
                        "frame {} | {:.1} fps | {} spp",
                        stats.frame_index,
                        stats.fps,
                        stats.accumulated_samples
                    );
                    self.window.set_title(&stats_title(
                        &self.config.title,
                        &stats,
                        self.context.params(),
                    ));
                }
                if outcome.reschedule() {
                    self.window.request_redraw();
                } else if self.context.run_state() == RunState::DeviceLost {
                    self.report_device_lost(None);
                }
            }
            Err(e) => self.report_device_lost(Some(e.to_string())),
        }
    }

    fn report_device_lost(&self, message: Option<String>) {
        let message = message
            .or_else(|| self.context.backend().health().reason())
            .unwrap_or_else(|| "device lost".into());
        self.window
            .set_title(&format!("{} | GPU error: {}", self.config.title, message));
        #[cfg(target_arch = "wasm32")]
        crate::web::set_status(&format!("GPU error: {}. Reload the page to restart.", message));
    }

    /// Submit a benchmark run. `None` when one is already running or the
    /// device is gone.
    pub fn start_benchmark(&mut self) -> Option<PendingBenchmark> {
        let settings = BenchmarkSettings::default().with_frames(self.config.benchmark_frames);
        match self.context.begin_benchmark(settings) {
            Ok(pending) => pending,
            Err(e) => {
                log::error!("Benchmark failed to start: {}", e);
                None
            }
        }
    }

    /// Restore interactive state once the benchmark's queue has drained.
    pub fn finish_benchmark(
        &mut self,
        report: TracerResult<BenchmarkReport>,
    ) -> Option<BenchmarkReport> {
        let resume = self.context.end_benchmark();
        let report = match report {
            Ok(report) => {
                log::info!(
                    "Benchmark: {} rays in {:.2}s, {:.0} rays/s, score {}",
                    report.total_rays,
                    report.elapsed.as_secs_f64(),
                    report.rays_per_second,
                    report.score
                );
                self.window
                    .set_title(&report_title(&self.config.title, &report));
                self.last_report = Some(report);
                Some(report)
            }
            Err(e) => {
                log::error!("Benchmark failed: {}", e);
                None
            }
        };
        if resume {
            self.window.request_redraw();
        }
        report
    }

    pub fn last_report(&self) -> Option<&BenchmarkReport> {
        self.last_report.as_ref()
    }

    /// Copy the latest accumulated surface back to the host.
    pub fn start_export(&self) -> ExportResult<PendingReadback> {
        let slot = self
            .context
            .latest_surface()
            .ok_or(ExportError::NothingRendered)?;
        Ok(self.context.backend().begin_readback(slot))
    }
}

/// Encode a finished readback and write it to `dir`.
#[cfg(not(target_arch = "wasm32"))]
pub async fn export_to_dir(
    pending: PendingReadback,
    dir: &std::path::Path,
) -> ExportResult<std::path::PathBuf> {
    let image = pending.finish().await?;
    let png = crate::export::encode_png(&image)?;
    crate::export::save_png(&png, dir)
}

/// Open a window and run the interactive loop until it is closed.
#[cfg(not(target_arch = "wasm32"))]
pub fn run(config: TracerConfig) -> TracerResult<()> {
    use crate::error::TracerError;
    use winit::dpi::PhysicalSize;
    use winit::event::Event;
    use winit::event_loop::{ControlFlow, EventLoop};
    use winit::window::WindowBuilder;

    let event_loop = EventLoop::new().map_err(|e| TracerError::EventLoop(e.to_string()))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .build(&event_loop)
            .map_err(|e| TracerError::WindowCreation(e.to_string()))?,
    );

    let benchmark_only = config.benchmark_on_start;
    let mut app = pollster::block_on(App::new(window, config))?;

    if benchmark_only {
        if let Some(pending) = app.start_benchmark() {
            let report = pollster::block_on(pending.finish());
            app.finish_benchmark(report);
        }
        return Ok(());
    }

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);

            match event {
                Event::WindowEvent { event, .. } => match app.handle_window_event(&event) {
                    AppRequest::Exit => elwt.exit(),
                    AppRequest::Benchmark => {
                        if let Some(pending) = app.start_benchmark() {
                            let report = pollster::block_on(pending.finish());
                            app.finish_benchmark(report);
                        }
                    }
                    AppRequest::Export => {
                        let exported = app.start_export().and_then(|pending| {
                            pollster::block_on(export_to_dir(pending, &app.config().output_dir))
                        });
                        match exported {
                            Ok(path) => log::info!("Saved {}", path.display()),
                            Err(e) => log::error!("Export failed: {}", e),
                        }
                    }
                    AppRequest::None => {}
                },
                Event::DeviceEvent { event, .. } => app.handle_device_event(&event),
                _ => {}
            }
        })
        .map_err(|e| TracerError::EventLoop(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_parameter_has_both_directions() {
        let pairs = [
            (KeyCode::BracketLeft, KeyCode::BracketRight),
            (KeyCode::Minus, KeyCode::Equal),
            (KeyCode::Comma, KeyCode::Period),
            (KeyCode::Digit9, KeyCode::Digit0),
            (KeyCode::Semicolon, KeyCode::Quote),
            (KeyCode::KeyK, KeyCode::KeyL),
            (KeyCode::KeyZ, KeyCode::KeyX),
        ];
        let params = RenderParams::default();
        for (down, up) in pairs {
            let (Some(Command::Adjust(d)), Some(Command::Adjust(u))) =
                (command_for_key(down), command_for_key(up))
            else {
                panic!("{down:?}/{up:?} must be adjustments");
            };
            let mut lower = params;
            let mut higher = params;
            lower.apply(d.resolve(&params));
            higher.apply(u.resolve(&params));
            assert_ne!(lower, higher, "{down:?}/{up:?}");
        }
    }

    #[test]
    fn test_toggles_and_actions() {
        assert_eq!(command_for_key(KeyCode::Digit1), Some(Command::SkyMode(SkyMode::Space)));
        assert_eq!(command_for_key(KeyCode::Digit2), Some(Command::SkyMode(SkyMode::Day)));
        assert_eq!(command_for_key(KeyCode::KeyH), Some(Command::ToggleHighQuality));
        assert_eq!(command_for_key(KeyCode::KeyP), Some(Command::TogglePause));
        assert_eq!(command_for_key(KeyCode::KeyB), Some(Command::Benchmark));
        assert_eq!(command_for_key(KeyCode::F12), Some(Command::Export));
        assert_eq!(command_for_key(KeyCode::Escape), Some(Command::ReleasePointer));
        assert_eq!(command_for_key(KeyCode::KeyW), None);
        assert!(!Command::Benchmark.repeats());
        assert!(Command::Adjust(Adjust::Fov(1.0)).repeats());
    }

    #[test]
    fn test_adjust_saturates_at_zero() {
        let params = RenderParams {
            bounces: 0,
            ..Default::default()
        };
        assert_eq!(
            Adjust::Bounces(-1).resolve(&params),
            ParamChange::Bounces(0)
        );
    }

    #[test]
    fn test_movement_keys() {
        let mut input = CameraInput::new();
        assert!(apply_movement_key(&mut input, KeyCode::KeyW, true));
        assert!(apply_movement_key(&mut input, KeyCode::KeyE, true));
        assert!(input.forward && input.up);
        assert!(apply_movement_key(&mut input, KeyCode::KeyW, false));
        assert!(!input.forward);
        assert!(!apply_movement_key(&mut input, KeyCode::KeyP, true));
    }

    #[test]
    fn test_titles() {
        let stats = FrameStats {
            fps: 59.6,
            frame_index: 40,
            accumulated_samples: 160,
            total_frames: 50,
        };
        let params = RenderParams {
            high_quality: true,
            ..Default::default()
        };
        assert_eq!(
            stats_title("Tracer", &stats, &params),
            "Tracer | 60 fps | 160 spp | 8 bounces | HQ"
        );

        let report = BenchmarkReport::new(800, 600, 1, 5, 100, std::time::Duration::from_secs(2));
        assert_eq!(
            report_title("Tracer", &report),
            "Tracer | Benchmark: 120.0 Mrays/s, score 120000"
        );
    }
}
