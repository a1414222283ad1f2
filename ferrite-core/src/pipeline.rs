use bytemuck::{Pod, Zeroable};

use crate::config::EngineConfig;
use crate::device::{Device, PipelineDescriptor, TextureFormat, VertexAttribute, VertexFormat, VertexLayout};
use crate::shader::load_shader;
use crate::swapchain::DEPTH_FORMAT;
use crate::FerriteResult;

/// Descriptor set 0 as the mesh shaders declare it. Backends build their set layout
/// from these.
pub const TEXTURE_BINDING: u32 = 0;
pub const TRANSFORM_BINDING: u32 = 1;
pub const SAMPLER_BINDING: u32 = 2;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub const fn new(position: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self { position, tex_coord }
    }

    pub fn layout() -> VertexLayout {
        VertexLayout {
            array_stride: std::mem::size_of::<Vertex>() as u32,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: VertexFormat::Float32x3,
                    offset: std::mem::offset_of!(Vertex, position) as u32,
                },
                VertexAttribute {
                    location: 1,
                    format: VertexFormat::Float32x2,
                    offset: std::mem::offset_of!(Vertex, tex_coord) as u32,
                },
            ],
        }
    }
}

/// Render pass, descriptor pool and graphics pipeline for textured meshes.
///
/// Field order is teardown order: pipeline, then the pool (and its set layout), then
/// the render pass.
pub struct PipelineSet<D: Device> {
    pipeline: D::Pipeline,
    descriptor_pool: D::DescriptorPool,
    render_pass: D::RenderPass,
    color_format: TextureFormat,
    max_sets: u32,
}

impl<D: Device> PipelineSet<D> {
    pub fn new(device: &D, color_format: TextureFormat, config: &EngineConfig) -> FerriteResult<Self> {
        let vertex_shader = load_shader(&config.vertex_shader)?;
        let fragment_shader = load_shader(&config.fragment_shader)?;

        let render_pass = device.create_render_pass(color_format, DEPTH_FORMAT)?;
        let descriptor_pool = device.create_descriptor_pool(config.max_meshes)?;
        let pipeline = device.create_pipeline(&PipelineDescriptor {
            render_pass: &render_pass,
            descriptor_pool: &descriptor_pool,
            vertex_shader: &vertex_shader,
            fragment_shader: &fragment_shader,
            vertex_layout: &Vertex::layout(),
        })?;

        log::info!(
            "Mesh pipeline ready ({:?} color, {:?} depth, {} descriptor sets)",
            color_format,
            DEPTH_FORMAT,
            config.max_meshes
        );

        Ok(Self {
            pipeline,
            descriptor_pool,
            render_pass,
            color_format,
            max_sets: config.max_meshes,
        })
    }

    pub fn pipeline(&self) -> &D::Pipeline {
        &self.pipeline
    }

    pub fn descriptor_pool(&self) -> &D::DescriptorPool {
        &self.descriptor_pool
    }

    pub fn render_pass(&self) -> &D::RenderPass {
        &self.render_pass
    }

    pub fn color_format(&self) -> TextureFormat {
        self.color_format
    }

    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}
