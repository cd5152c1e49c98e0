//! Compute and present pipeline creation
//!
//! Each pipeline is created inside a validation error scope so a failure is
//! reported as [`TracerError::PipelineValidation`] naming the pipeline,
//! instead of reaching the uncaptured-error handler.

use crate::error::{TracerError, TracerResult};
use crate::gpu::shaders::{ShaderProgram, PRESENT, RAYTRACER};
use std::borrow::Cow;

pub struct TracerPipelines {
    pub compute_layout: wgpu::BindGroupLayout,
    pub present_layout: wgpu::BindGroupLayout,
    pub compute: wgpu::ComputePipeline,
    pub present: wgpu::RenderPipeline,
}

fn shader_module(
    device: &wgpu::Device,
    program: &ShaderProgram,
    source: &str,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(program.name),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
    })
}

/// Run `create` in a validation scope, turning a captured error into
/// [`TracerError::PipelineValidation`].
async fn validated<T>(
    device: &wgpu::Device,
    pipeline: &str,
    create: impl FnOnce() -> T,
) -> TracerResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let created = create();
    match device.pop_error_scope().await {
        None => Ok(created),
        Some(error) => {
            let err = TracerError::PipelineValidation {
                pipeline: pipeline.to_string(),
                message: error.to_string(),
            };
            log::error!("{}", err);
            Err(err)
        }
    }
}

impl TracerPipelines {
    /// Build both pipelines from already validated program text.
    pub async fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        raytracer_source: &str,
        present_source: &str,
    ) -> TracerResult<Self> {
        let compute_layout = crate::gpu::resources::compute_bind_group_layout(device);
        let present_layout = crate::gpu::resources::present_bind_group_layout(device);

        let compute = validated(device, "raytracer", || {
            let module = shader_module(device, &RAYTRACER, raytracer_source);
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Raytracer Pipeline Layout"),
                bind_group_layouts: &[&compute_layout],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Raytracer Pipeline"),
                layout: Some(&layout),
                module: &module,
                entry_point: "main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            })
        })
        .await?;

        let present = validated(device, "present", || {
            let module = shader_module(device, &PRESENT, present_source);
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Present Pipeline Layout"),
                bind_group_layouts: &[&present_layout],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Present Pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: "vs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: "fs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        })
        .await?;

        Ok(Self {
            compute_layout,
            present_layout,
            compute,
            present,
        })
    }
}
