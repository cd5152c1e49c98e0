//! Instance, surface, adapter and device creation

use crate::error::{TracerError, TracerResult};
use crate::frame::DeviceHealth;
use std::sync::Arc;

/// Objects produced by a successful initialization. `surface` is `None` for
/// a headless context.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub surface: Option<wgpu::Surface<'static>>,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

/// Scale `width` x `height` down to fit `max_size`, keeping the aspect ratio.
pub fn clamp_to_limit(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    if width > max_size || height > max_size {
        let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).clamp(1, max_size);
        let new_height = ((height as f32 * scale) as u32).clamp(1, max_size);
        (new_width, new_height)
    } else {
        (width.max(1), height.max(1))
    }
}

/// Pick a presentable format. The present pass applies gamma itself, so a
/// linear format is preferred over an sRGB one.
pub fn choose_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|f| *f == wgpu::TextureFormat::Rgba8Unorm)
        .or_else(|| formats.iter().copied().find(|f| !f.is_srgb()))
        .or_else(|| formats.first().copied())
}

impl GpuContext {
    pub async fn new(window: Arc<winit::window::Window>) -> TracerResult<Self> {
        #[cfg(target_arch = "wasm32")]
        return Self::init_web(window).await;

        #[cfg(not(target_arch = "wasm32"))]
        return Self::init_native(window).await;
    }

    /// A device with no output surface, for offscreen rendering.
    pub async fn headless() -> TracerResult<Self> {
        #[cfg(target_arch = "wasm32")]
        let backends = wgpu::Backends::BROWSER_WEBGPU;
        #[cfg(not(target_arch = "wasm32"))]
        let backends = wgpu::Backends::all();

        Self::try_init_backend(None, backends, "headless").await
    }

    /// Storage textures in the compute pass rule out WebGL2, so the web build
    /// only accepts a WebGPU adapter.
    #[cfg(target_arch = "wasm32")]
    async fn init_web(window: Arc<winit::window::Window>) -> TracerResult<Self> {
        let has_webgpu = web_sys::window()
            .and_then(|w| js_sys::Reflect::has(&w.navigator(), &"gpu".into()).ok())
            .unwrap_or(false);
        if !has_webgpu {
            return Err(TracerError::NoAdapter(
                "WebGPU is not available in this browser".into(),
            ));
        }

        log::info!("Trying WebGPU backend...");
        Self::try_init_backend(Some(window), wgpu::Backends::BROWSER_WEBGPU, "WebGPU").await
    }

    #[cfg(not(target_arch = "wasm32"))]
    async fn init_native(window: Arc<winit::window::Window>) -> TracerResult<Self> {
        // On Windows, try Vulkan first to avoid D3D12 debug layer validation errors
        let backends = if std::env::var("WGPU_BACKEND").is_ok() {
            wgpu::Backends::all()
        } else {
            #[cfg(target_os = "windows")]
            {
                wgpu::Backends::VULKAN
            }
            #[cfg(not(target_os = "windows"))]
            {
                wgpu::Backends::all()
            }
        };

        match Self::try_init_backend(Some(window.clone()), backends, "preferred").await {
            Ok(context) => Ok(context),
            Err(TracerError::NoAdapter(_)) if backends != wgpu::Backends::all() => {
                log::warn!("Preferred backend not available, falling back to all backends");
                Self::try_init_backend(Some(window), wgpu::Backends::all(), "any").await
            }
            Err(e) => Err(e),
        }
    }

    async fn try_init_backend(
        window: Option<Arc<winit::window::Window>>,
        backends: wgpu::Backends,
        backend_name: &str,
    ) -> TracerResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let surface = window
            .map(|window| instance.create_surface(window))
            .transpose()
            .map_err(|e| TracerError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface.as_ref(),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| TracerError::NoAdapter(format!("no {} adapter found", backend_name)))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Tracer Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| TracerError::DeviceCreationFailed(e.to_string()))?;

        log::info!(
            "Device created with max texture size: {}",
            device.limits().max_texture_dimension_2d
        );

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
        })
    }
}

/// Route device loss and uncaptured errors into `health`.
pub fn watch_device(device: &wgpu::Device, health: &Arc<DeviceHealth>) {
    let lost = Arc::clone(health);
    device.set_device_lost_callback(move |reason, message| {
        log::error!("Device lost ({:?}): {}", reason, message);
        lost.mark_lost(message);
    });

    device.on_uncaptured_error(Box::new(|error| {
        log::error!("Uncaptured GPU error: {}", error);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_keeps_small_sizes() {
        assert_eq!(clamp_to_limit(800, 600, 8192), (800, 600));
        assert_eq!(clamp_to_limit(0, 0, 8192), (1, 1));
    }

    #[test]
    fn test_clamp_preserves_aspect() {
        let (w, h) = clamp_to_limit(16384, 8192, 8192);
        assert_eq!((w, h), (8192, 4096));
        let (w, h) = clamp_to_limit(100, 20000, 4096);
        assert_eq!(h, 4096);
        assert!(w >= 1 && w <= 21);
    }

    #[test]
    fn test_format_choice() {
        use wgpu::TextureFormat::*;
        assert_eq!(
            choose_surface_format(&[Bgra8UnormSrgb, Rgba8Unorm]),
            Some(Rgba8Unorm)
        );
        assert_eq!(
            choose_surface_format(&[Bgra8UnormSrgb, Bgra8Unorm]),
            Some(Bgra8Unorm)
        );
        assert_eq!(choose_surface_format(&[Bgra8UnormSrgb]), Some(Bgra8UnormSrgb));
        assert_eq!(choose_surface_format(&[]), None);
    }
}
