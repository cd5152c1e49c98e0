//! Accumulation surfaces, buffers and bind groups
//!
//! Two `Rgba32Float` surfaces alternate between the roles of write target and
//! read source. One compute bind group is built per target slot, and one
//! present bind group per slot, so a frame only has to pick by index.

use crate::accumulation::SurfaceSlot;
use crate::scene::Scene;
use crate::uniforms::UNIFORM_BUFFER_SIZE;
use wgpu::util::DeviceExt;

pub const ACCUMULATION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Compute layout: output surface, uniforms, scene, previous surface
pub fn compute_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Raytracer Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: ACCUMULATION_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
        ],
    })
}

/// Present layout: accumulated surface plus a non-filtering sampler, since
/// 32-bit float textures are not filterable without an optional feature
pub fn present_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Present Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                count: None,
            },
        ],
    })
}

struct AccumulationSurface {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl AccumulationSurface {
    fn new(device: &wgpu::Device, width: u32, height: u32, slot: SurfaceSlot) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(match slot {
                SurfaceSlot::A => "Accumulation A",
                SurfaceSlot::B => "Accumulation B",
            }),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: ACCUMULATION_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// All GPU resources the two passes bind
pub struct TracerResources {
    pub uniform_buffer: wgpu::Buffer,
    scene_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    surfaces: [AccumulationSurface; 2],
    /// Indexed by the slot being written
    compute_bind_groups: [wgpu::BindGroup; 2],
    /// Indexed by the slot being shown
    present_bind_groups: [wgpu::BindGroup; 2],
    width: u32,
    height: u32,
}

impl TracerResources {
    pub fn new(
        device: &wgpu::Device,
        compute_layout: &wgpu::BindGroupLayout,
        present_layout: &wgpu::BindGroupLayout,
        scene: &Scene,
        width: u32,
        height: u32,
    ) -> crate::error::TracerResult<Self> {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Buffer"),
            size: UNIFORM_BUFFER_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let scene_bytes = scene.encode()?;
        log::info!(
            "Scene: {} spheres ({} bytes)",
            scene.len(),
            scene_bytes.len()
        );
        let scene_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Buffer"),
            contents: &scene_bytes,
            usage: wgpu::BufferUsages::STORAGE,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Present Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let surfaces = [
            AccumulationSurface::new(device, width, height, SurfaceSlot::A),
            AccumulationSurface::new(device, width, height, SurfaceSlot::B),
        ];
        let (compute_bind_groups, present_bind_groups) = Self::bind_groups(
            device,
            compute_layout,
            present_layout,
            &surfaces,
            &uniform_buffer,
            &scene_buffer,
            &sampler,
        );

        Ok(Self {
            uniform_buffer,
            scene_buffer,
            sampler,
            surfaces,
            compute_bind_groups,
            present_bind_groups,
            width,
            height,
        })
    }

    fn bind_groups(
        device: &wgpu::Device,
        compute_layout: &wgpu::BindGroupLayout,
        present_layout: &wgpu::BindGroupLayout,
        surfaces: &[AccumulationSurface; 2],
        uniform_buffer: &wgpu::Buffer,
        scene_buffer: &wgpu::Buffer,
        sampler: &wgpu::Sampler,
    ) -> ([wgpu::BindGroup; 2], [wgpu::BindGroup; 2]) {
        let compute = |target: SurfaceSlot| {
            let source = target.other();
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Raytracer Bind Group"),
                layout: compute_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(
                            &surfaces[target.index()].view,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: scene_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(
                            &surfaces[source.index()].view,
                        ),
                    },
                ],
            })
        };
        let present = |slot: SurfaceSlot| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Present Bind Group"),
                layout: present_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&surfaces[slot.index()].view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        };

        (
            [compute(SurfaceSlot::A), compute(SurfaceSlot::B)],
            [present(SurfaceSlot::A), present(SurfaceSlot::B)],
        )
    }

    /// Recreate both surfaces at the new size. Contents are discarded.
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        compute_layout: &wgpu::BindGroupLayout,
        present_layout: &wgpu::BindGroupLayout,
        width: u32,
        height: u32,
    ) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.surfaces = [
            AccumulationSurface::new(device, width, height, SurfaceSlot::A),
            AccumulationSurface::new(device, width, height, SurfaceSlot::B),
        ];
        let (compute, present) = Self::bind_groups(
            device,
            compute_layout,
            present_layout,
            &self.surfaces,
            &self.uniform_buffer,
            &self.scene_buffer,
            &self.sampler,
        );
        self.compute_bind_groups = compute;
        self.present_bind_groups = present;
        self.width = width;
        self.height = height;
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn compute_bind_group(&self, target: SurfaceSlot) -> &wgpu::BindGroup {
        &self.compute_bind_groups[target.index()]
    }

    pub fn present_bind_group(&self, slot: SurfaceSlot) -> &wgpu::BindGroup {
        &self.present_bind_groups[slot.index()]
    }

    pub fn surface_texture(&self, slot: SurfaceSlot) -> &wgpu::Texture {
        &self.surfaces[slot.index()].texture
    }
}
