//! wgpu implementation of [`FrameBackend`]

pub mod context;
pub mod pipelines;
pub mod resources;
pub mod shaders;

use crate::accumulation::SurfaceSlot;
use crate::error::{ExportError, ExportResult, TracerError, TracerResult};
use crate::export::{radiance_to_rgba8, unpad_rows, ReadbackLayout, ACCUMULATION_BYTES_PER_PIXEL};
use crate::frame::{DeviceHealth, FrameBackend, FramePlan, QueueDrain};
use crate::scene::Scene;
use crate::TracerConfig;
use context::{choose_surface_format, clamp_to_limit, GpuContext};
use futures_channel::oneshot;
use image::RgbaImage;
use pipelines::TracerPipelines;
use resources::TracerResources;
use std::sync::Arc;

/// Format the present pipeline targets when there is no window surface
pub const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// The window surface and its configuration
struct SurfaceOutput {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl SurfaceOutput {
    fn acquire(&mut self, device: &wgpu::Device) -> TracerResult<wgpu::SurfaceTexture> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(device, &self.config);
                Err(TracerError::SurfaceLost)
            }
            Err(wgpu::SurfaceError::Timeout) => Err(TracerError::SurfaceLost),
            Err(wgpu::SurfaceError::OutOfMemory) => Err(TracerError::OutOfMemory),
        }
    }
}

/// The GPU side of the tracer: device, pipelines, accumulation surfaces and,
/// when attached to a window, the presentable surface
pub struct GpuTracer {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    output: Option<SurfaceOutput>,
    pipelines: TracerPipelines,
    resources: TracerResources,
    health: Arc<DeviceHealth>,
}

impl GpuTracer {
    /// Initialize the device, load and validate both programs, and allocate
    /// the accumulation surfaces at the window's size.
    pub async fn new(
        window: Arc<winit::window::Window>,
        config: &TracerConfig,
        scene: &Scene,
    ) -> TracerResult<Self> {
        let size = window.inner_size();
        let mut context = GpuContext::new(window).await?;
        let surface = context.surface.take().ok_or_else(|| {
            TracerError::SurfaceCreationFailed("window produced no surface".into())
        })?;

        let surface_caps = surface.get_capabilities(&context.adapter);
        let surface_format = choose_surface_format(&surface_caps.formats).ok_or_else(|| {
            TracerError::SurfaceCreationFailed("surface reports no supported formats".into())
        })?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let present_mode = if config.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let max_size = context.device.limits().max_texture_dimension_2d;
        let (width, height) = clamp_to_limit(size.width, size.height, max_size);

        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | (surface_caps.usages
                & (wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST));

        let surface_config = wgpu::SurfaceConfiguration {
            usage,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&context.device, &surface_config);
        log::info!(
            "Surface configured: {}x{} {:?}",
            width,
            height,
            surface_format
        );

        let output = SurfaceOutput {
            surface,
            config: surface_config,
        };
        let size = (width, height);
        Self::assemble(context, Some(output), surface_format, config, scene, size).await
    }

    /// A tracer with no window. Frames are computed into the accumulation
    /// surfaces and can only be read back; present passes are skipped.
    pub async fn headless(
        config: &TracerConfig,
        scene: &Scene,
        width: u32,
        height: u32,
    ) -> TracerResult<Self> {
        let context = GpuContext::headless().await?;
        let max_size = context.device.limits().max_texture_dimension_2d;
        let size = clamp_to_limit(width, height, max_size);
        log::info!("Headless tracer: {}x{}", size.0, size.1);
        Self::assemble(context, None, HEADLESS_FORMAT, config, scene, size).await
    }

    async fn assemble(
        gpu: GpuContext,
        output: Option<SurfaceOutput>,
        surface_format: wgpu::TextureFormat,
        config: &TracerConfig,
        scene: &Scene,
        (width, height): (u32, u32),
    ) -> TracerResult<Self> {
        let GpuContext {
            instance,
            adapter,
            device,
            queue,
            ..
        } = gpu;

        let health = Arc::new(DeviceHealth::new());
        context::watch_device(&device, &health);

        let raytracer_source =
            shaders::load_program(&config.shader_source, &shaders::RAYTRACER).await?;
        let present_source =
            shaders::load_program(&config.shader_source, &shaders::PRESENT).await?;

        let pipelines =
            TracerPipelines::new(&device, surface_format, &raytracer_source, &present_source)
                .await?;
        let resources = TracerResources::new(
            &device,
            &pipelines.compute_layout,
            &pipelines.present_layout,
            scene,
            width,
            height,
        )?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            output,
            pipelines,
            resources,
            health,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn is_headless(&self) -> bool {
        self.output.is_none()
    }

    /// Copy `slot` into a staging buffer and start mapping it.
    pub fn begin_readback(&self, slot: SurfaceSlot) -> PendingReadback {
        let (width, height) = self.resources.size();
        let layout = ReadbackLayout::new(
            width,
            height,
            ACCUMULATION_BYTES_PER_PIXEL,
            wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
        );

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Export Staging Buffer"),
            size: layout.buffer_size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Export Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: self.resources.surface_texture(slot),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(layout.padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = oneshot::channel();
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });

        #[cfg(not(target_arch = "wasm32"))]
        let _ = self.device.poll(wgpu::Maintain::Wait);

        PendingReadback {
            buffer: staging,
            mapped: rx,
            layout,
        }
    }
}

impl FrameBackend for GpuTracer {
    fn surface_size(&self) -> (u32, u32) {
        self.resources.size()
    }

    fn resize(&mut self, width: u32, height: u32) -> (u32, u32) {
        let max_size = self.device.limits().max_texture_dimension_2d;
        let (width, height) = clamp_to_limit(width, height, max_size);

        if let Some(output) = &mut self.output {
            output.config.width = width;
            output.config.height = height;
            output.surface.configure(&self.device, &output.config);
        }
        self.resources.resize(
            &self.device,
            &self.pipelines.compute_layout,
            &self.pipelines.present_layout,
            width,
            height,
        );
        (width, height)
    }

    fn write_uniforms(&mut self, bytes: &[u8]) {
        self.queue
            .write_buffer(&self.resources.uniform_buffer, 0, bytes);
    }

    fn submit(&mut self, plan: &FramePlan) -> TracerResult<()> {
        if self.health.is_lost() {
            return Err(TracerError::DeviceLost(
                self.health.reason().unwrap_or_default(),
            ));
        }

        let frame = match (&mut self.output, plan.present) {
            (Some(output), true) => Some(output.acquire(&self.device)?),
            _ => None,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Raytrace Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.compute);
            pass.set_bind_group(0, self.resources.compute_bind_group(plan.ping_pong.target), &[]);
            let (x, y) = plan.workgroups;
            pass.dispatch_workgroups(x, y, 1);
        }

        if let Some(frame) = &frame {
            let view = frame
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines.present);
            pass.set_bind_group(0, self.resources.present_bind_group(plan.ping_pong.target), &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = frame {
            frame.present();
        }
        Ok(())
    }

    fn queue_drained(&self) -> QueueDrain {
        let (tx, drain) = QueueDrain::channel();
        self.queue.on_submitted_work_done(move || {
            let _ = tx.send(());
        });

        // Native callbacks only fire while the device is polled
        #[cfg(not(target_arch = "wasm32"))]
        let _ = self.device.poll(wgpu::Maintain::Wait);

        drain
    }

    fn health(&self) -> &DeviceHealth {
        &self.health
    }
}

/// An accumulation surface being copied back to the host
#[must_use = "a readback does nothing until it is finished"]
pub struct PendingReadback {
    buffer: wgpu::Buffer,
    mapped: oneshot::Receiver<Result<(), wgpu::BufferAsyncError>>,
    layout: ReadbackLayout,
}

impl PendingReadback {
    /// Wait for the mapping, strip row padding and tone map to 8-bit RGBA.
    pub async fn finish(self) -> ExportResult<RgbaImage> {
        let (width, height) = (self.layout.width, self.layout.height);
        let texels = self.finish_texels().await?;
        radiance_to_rgba8(&texels, width, height)
    }

    /// Wait for the mapping and return the tightly packed `Rgba32Float` texels.
    pub async fn finish_texels(self) -> ExportResult<Vec<u8>> {
        self.mapped
            .await
            .map_err(|_| ExportError::MapFailed("map callback was dropped".into()))?
            .map_err(|e| ExportError::MapFailed(e.to_string()))?;

        let texels = {
            let data = self.buffer.slice(..).get_mapped_range();
            unpad_rows(
                &data,
                self.layout.padded_bytes_per_row as usize,
                self.layout.unpadded_bytes_per_row as usize,
                self.layout.height as usize,
            )?
        };
        self.buffer.unmap();
        Ok(texels)
    }
}
