//! Frame driver integration tests.
//!
//! These run [`RenderContext`] against a recording backend, so they check the
//! per-tick protocol (uniform staging, ping-pong selection, resets, pausing and
//! device loss) without a GPU.

mod common;

use common::{RecordingBackend, MAX_TEXTURE_SIZE};
use rstest::rstest;
use stellar_tracer::accumulation::SurfaceSlot;
use stellar_tracer::camera::{CameraInput, CameraState};
use stellar_tracer::frame::{RenderContext, RunState, TickOutcome};
use stellar_tracer::params::{ParamChange, SkyMode};
use stellar_tracer::TracerError;

fn context() -> RenderContext<RecordingBackend> {
    RenderContext::new(RecordingBackend::new(800, 600), Some(42))
}

fn run_ticks(ctx: &mut RenderContext<RecordingBackend>, n: usize) {
    let mut input = CameraInput::new();
    for _ in 0..n {
        let outcome = ctx.tick(&mut input).unwrap();
        assert!(matches!(outcome, TickOutcome::Rendered { .. }));
    }
}

// ============================================================================
// Submission
// ============================================================================

#[rstest]
fn test_tick_submits_one_presenting_plan() {
    let mut ctx = context();
    run_ticks(&mut ctx, 1);

    let backend = ctx.backend();
    assert_eq!(backend.plans.len(), 1);
    assert_eq!(backend.uniforms.len(), 1);
    let plan = backend.last_plan().unwrap();
    assert!(plan.present);
    assert_eq!(plan.workgroups, (100, 75));
    assert_eq!(backend.last_f32("time").map(|t| t >= 0.0), Some(true));
}

#[rstest]
fn test_surfaces_alternate_each_frame() {
    let mut ctx = context();
    run_ticks(&mut ctx, 4);

    let targets: Vec<_> = ctx.backend().plans.iter().map(|p| p.ping_pong.target).collect();
    assert_eq!(
        targets,
        [SurfaceSlot::A, SurfaceSlot::B, SurfaceSlot::A, SurfaceSlot::B]
    );
    for plan in &ctx.backend().plans {
        assert_ne!(plan.ping_pong.target, plan.ping_pong.source);
    }

    let indices: Vec<_> = ctx
        .backend()
        .uniforms
        .iter()
        .map(|u| stellar_tracer::uniforms::UNIFORM_LAYOUT.read_u32(u, "frame_index"))
        .collect();
    assert_eq!(indices, [Some(0), Some(1), Some(2), Some(3)]);
    assert_eq!(ctx.latest_surface(), Some(SurfaceSlot::B));
}

#[rstest]
fn test_seeds_differ_between_frames() {
    let mut ctx = context();
    run_ticks(&mut ctx, 2);
    let seeds: Vec<_> = ctx
        .backend()
        .uniforms
        .iter()
        .map(|u| stellar_tracer::uniforms::UNIFORM_LAYOUT.read_f32(u, "seed").unwrap())
        .collect();
    assert_ne!(seeds[0], seeds[1]);
    assert!(seeds.iter().all(|s| (0.0..1.0).contains(s)));
}

// ============================================================================
// Accumulation resets
// ============================================================================

#[rstest]
#[case::bounces(ParamChange::Bounces(6), true)]
#[case::samples(ParamChange::Samples(2), true)]
#[case::light(ParamChange::Light(2.5), true)]
#[case::fov(ParamChange::Fov(90.0), true)]
#[case::aperture(ParamChange::Aperture(0.3), true)]
#[case::focus(ParamChange::FocusDistance(12.0), true)]
#[case::sky(ParamChange::SkyMode(SkyMode::Day), true)]
#[case::high_quality(ParamChange::HighQuality(true), true)]
#[case::move_speed(ParamChange::MoveSpeed(2.0), false)]
#[case::unchanged_value(ParamChange::Fov(70.0), false)]
fn test_param_change_reset(#[case] change: ParamChange, #[case] resets: bool) {
    let mut ctx = context();
    run_ticks(&mut ctx, 3);
    assert_eq!(ctx.accumulation().frame_index(), 3);

    assert_eq!(ctx.apply_param(change), resets);
    let expected = if resets { 0 } else { 3 };
    assert_eq!(ctx.accumulation().frame_index(), expected);

    run_ticks(&mut ctx, 1);
    assert_eq!(ctx.backend().last_u32("frame_index"), Some(expected));
}

#[rstest]
#[case::forward(|i: &mut CameraInput| i.forward = true)]
#[case::down(|i: &mut CameraInput| i.down = true)]
#[case::look(|i: &mut CameraInput| {
    i.pointer_locked = true;
    i.add_mouse_motion(12.0, -4.0);
})]
fn test_camera_change_resets(#[case] act: fn(&mut CameraInput)) {
    let mut ctx = context();
    run_ticks(&mut ctx, 5);

    let before = *ctx.camera();
    let mut input = CameraInput::new();
    act(&mut input);
    ctx.tick(&mut input).unwrap();

    assert_ne!(*ctx.camera(), before);
    assert_eq!(ctx.backend().last_u32("frame_index"), Some(0));
    assert_eq!(ctx.accumulation().frame_index(), 1);
    assert_eq!(input.mouse_delta, glam::Vec2::ZERO);
}

#[rstest]
fn test_mouse_motion_without_lock_keeps_accumulating() {
    let mut ctx = context();
    run_ticks(&mut ctx, 2);

    let mut input = CameraInput::new();
    input.mouse_delta = glam::Vec2::new(30.0, 30.0);
    ctx.tick(&mut input).unwrap();
    assert_eq!(ctx.backend().last_u32("frame_index"), Some(2));
}

#[rstest]
fn test_set_camera_resets_only_on_change() {
    let mut ctx = context();
    run_ticks(&mut ctx, 2);

    ctx.set_camera(*ctx.camera());
    assert_eq!(ctx.accumulation().frame_index(), 2);

    ctx.set_camera(CameraState::new(glam::Vec3::ZERO, 0.0, 0.0));
    assert_eq!(ctx.accumulation().frame_index(), 0);
}

#[rstest]
fn test_resize_clamps_and_resets() {
    let mut ctx = context();
    run_ticks(&mut ctx, 2);

    ctx.resize(0, 300);
    assert!(ctx.backend().resizes.is_empty());
    assert_eq!(ctx.accumulation().frame_index(), 2);

    ctx.resize(8000, 300);
    assert_eq!(ctx.backend().resizes, [(MAX_TEXTURE_SIZE, 300)]);
    assert_eq!(ctx.accumulation().frame_index(), 0);

    run_ticks(&mut ctx, 1);
    assert_eq!(ctx.backend().last_plan().unwrap().workgroups, (512, 38));
}

// ============================================================================
// Run state
// ============================================================================

#[rstest]
fn test_pause_keeps_accumulation() {
    let mut ctx = context();
    run_ticks(&mut ctx, 2);

    assert!(ctx.pause());
    assert!(!ctx.pause());
    let mut input = CameraInput::new();
    input.forward = true;
    assert_eq!(ctx.tick(&mut input).unwrap(), TickOutcome::Halted);
    assert_eq!(ctx.backend().plans.len(), 2);

    assert!(ctx.resume());
    assert_eq!(ctx.run_state(), RunState::Running);
    run_ticks(&mut ctx, 1);
    assert_eq!(ctx.backend().last_u32("frame_index"), Some(2));
}

#[rstest]
fn test_mouse_motion_dropped_while_paused() {
    let mut ctx = context();
    run_ticks(&mut ctx, 2);
    let before = *ctx.camera();

    let mut input = CameraInput::new();
    input.pointer_locked = true;
    ctx.pause();
    assert!(!ctx.mouse_motion(&mut input, 200.0, 50.0));
    assert_eq!(input.mouse_delta, glam::Vec2::ZERO);

    ctx.resume();
    ctx.tick(&mut input).unwrap();
    assert_eq!(*ctx.camera(), before);
    assert_eq!(ctx.backend().last_u32("frame_index"), Some(2));

    assert!(ctx.mouse_motion(&mut input, 10.0, 0.0));
    ctx.tick(&mut input).unwrap();
    assert_ne!(*ctx.camera(), before);
}

#[rstest]
fn test_reset_keeps_presented_surface() {
    let mut ctx = context();
    assert_eq!(ctx.latest_surface(), None);
    run_ticks(&mut ctx, 3);
    assert_eq!(ctx.latest_surface(), Some(SurfaceSlot::A));

    ctx.pause();
    assert!(ctx.apply_param(ParamChange::Fov(90.0)));
    assert_eq!(ctx.accumulation().frame_index(), 0);
    assert_eq!(ctx.latest_surface(), Some(SurfaceSlot::A));

    ctx.resize(640, 480);
    assert_eq!(ctx.latest_surface(), None);
}

#[rstest]
fn test_toggle_pause() {
    let mut ctx = context();
    assert!(!ctx.toggle_pause());
    assert_eq!(ctx.run_state(), RunState::Paused);
    assert!(ctx.toggle_pause());
    assert_eq!(ctx.run_state(), RunState::Running);
}

#[rstest]
fn test_device_loss_is_terminal() {
    let mut ctx = context();
    run_ticks(&mut ctx, 1);

    ctx.backend().lose_device("driver reset");
    let mut input = CameraInput::new();
    assert_eq!(ctx.tick(&mut input).unwrap(), TickOutcome::Halted);
    assert_eq!(ctx.run_state(), RunState::DeviceLost);
    assert!(!ctx.resume());
    assert!(!ctx.toggle_pause());
    assert_eq!(ctx.backend().plans.len(), 1);
}

#[rstest]
fn test_surface_lost_skips_frame() {
    let mut ctx = context();
    run_ticks(&mut ctx, 2);

    ctx.backend_mut().fail_next = Some(TracerError::SurfaceLost);
    let mut input = CameraInput::new();
    assert_eq!(ctx.tick(&mut input).unwrap(), TickOutcome::Skipped);
    assert_eq!(ctx.accumulation().frame_index(), 2);
    assert_eq!(ctx.run_state(), RunState::Running);

    run_ticks(&mut ctx, 1);
    assert_eq!(ctx.backend().last_u32("frame_index"), Some(2));
}

#[rstest]
fn test_fatal_submit_error_stops_loop() {
    let mut ctx = context();
    ctx.backend_mut().fail_next = Some(TracerError::OutOfMemory);
    let mut input = CameraInput::new();
    assert!(matches!(ctx.tick(&mut input), Err(TracerError::OutOfMemory)));
    assert_eq!(ctx.run_state(), RunState::DeviceLost);
    assert_eq!(ctx.tick(&mut input).unwrap(), TickOutcome::Halted);
}

// ============================================================================
// Stats
// ============================================================================

#[rstest]
fn test_stats_published_every_ten_frames() {
    let mut ctx = context();
    ctx.apply_param(ParamChange::Samples(3));
    let mut input = CameraInput::new();

    let mut published = Vec::new();
    for _ in 0..25 {
        if let TickOutcome::Rendered { stats: Some(stats) } = ctx.tick(&mut input).unwrap() {
            published.push(stats);
        }
    }

    assert_eq!(published.len(), 2);
    assert_eq!(published[0].total_frames, 10);
    assert_eq!(published[0].frame_index, 10);
    assert_eq!(published[0].accumulated_samples, 30);
    assert_eq!(published[1].total_frames, 20);
    assert!(published.iter().all(|s| s.fps >= 0.0));
}

#[rstest]
#[case(1)]
#[case(4)]
fn test_custom_stats_interval(#[case] interval: u32) {
    let mut ctx = context().with_stats_interval(interval);
    let mut input = CameraInput::new();
    let count = (0..8)
        .filter(|_| {
            matches!(
                ctx.tick(&mut input).unwrap(),
                TickOutcome::Rendered { stats: Some(_) }
            )
        })
        .count();
    assert_eq!(count as u32, 8 / interval);
}
