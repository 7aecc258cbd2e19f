//! `wgpu` backend for the matrix renderer.
//!
//! Lookup tables are uploaded as integer textures and read with `textureLoad`
//! (no sampler, no filtering). Any change to the data rebuilds and re-uploads
//! all three textures through [`MatrixPipeline::bind`].

use super::texture::{DataTexture, TexelFormat, TextureUpload};
use super::{GridStyle, MatrixBuffers, ShaderVariant, Viewport};
use crate::error::{LayoutError, Result};
use bytemuck::{Pod, Zeroable};
use tracing::debug;

impl TexelFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::R32Uint => wgpu::TextureFormat::R32Uint,
            Self::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

impl DataTexture {
    /// Allocates a GPU texture with this texture's extent and format.
    pub fn create_texture(&self, device: &wgpu::Device) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(self.label()),
            size: wgpu::Extent3d {
                width: self.width(),
                height: self.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format().to_wgpu(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }
}

impl TextureUpload<wgpu::Queue> for DataTexture {
    type Target = wgpu::Texture;

    fn upload(&self, queue: &wgpu::Queue, texture: &wgpu::Texture) -> Result<()> {
        let size = texture.size();
        if size.width != self.width()
            || size.height != self.height()
            || texture.format() != self.format().to_wgpu()
        {
            return Err(LayoutError::Upload(format!(
                "{}: {}x{} {:?} does not fit a {}x{} {:?} texture",
                self.label(),
                self.width(),
                self.height(),
                self.format(),
                size.width,
                size.height,
                texture.format()
            )));
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.to_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.bytes_per_row()),
                rows_per_image: Some(self.height()),
            },
            wgpu::Extent3d {
                width: self.width(),
                height: self.height(),
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MatrixUniforms {
    viewport: [f32; 4],
    params: [f32; 4],
    fade: [f32; 4],
    logical_color: [f32; 4],
    micro_color: [f32; 4],
    background: [f32; 4],
    dims: [u32; 4],
}

fn unorm(color: [u8; 4]) -> [f32; 4] {
    color.map(|c| c as f32 / 255.0)
}

/// Uploaded textures plus the bind group that exposes them.
pub struct MatrixBindings {
    _textures: [wgpu::Texture; 3],
    bind_group: wgpu::BindGroup,
    dims: [u32; 4],
}

pub struct MatrixPipeline {
    cells: wgpu::RenderPipeline,
    cells_grid: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    uniforms: wgpu::Buffer,
}

fn lookup_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

impl MatrixPipeline {
    pub fn new(device: &wgpu::Device, target_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Matrix Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("matrix.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Matrix Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                lookup_entry(1, wgpu::TextureSampleType::Float { filterable: false }),
                lookup_entry(2, wgpu::TextureSampleType::Uint),
                lookup_entry(3, wgpu::TextureSampleType::Uint),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Matrix Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let build = |entry_point: &str, label: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Matrix Uniforms"),
            size: std::mem::size_of::<MatrixUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            cells: build("fs_cells", "Matrix Cells Pipeline"),
            cells_grid: build("fs_cells_grid", "Matrix Grid Pipeline"),
            layout,
            uniforms,
        }
    }

    /// Uploads `buffers` into fresh textures.
    pub fn bind(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffers: &MatrixBuffers,
    ) -> Result<MatrixBindings> {
        let textures = buffers.to_textures()?;
        let color = textures.color.create_texture(device);
        let micro_row = textures.micro_row.create_texture(device);
        let micro_col = textures.micro_col.create_texture(device);
        textures.color.upload(queue, &color)?;
        textures.micro_row.upload(queue, &micro_row)?;
        textures.micro_col.upload(queue, &micro_col)?;
        debug!(
            rows = buffers.rows(),
            cols = buffers.cols(),
            "uploaded matrix textures"
        );

        let view = |texture: &wgpu::Texture| texture.create_view(&wgpu::TextureViewDescriptor::default());
        let (color_view, row_view, col_view) = (view(&color), view(&micro_row), view(&micro_col));
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Matrix Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&row_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&col_view),
                },
            ],
        });

        Ok(MatrixBindings {
            _textures: [color, micro_row, micro_col],
            bind_group,
            dims: [
                buffers.rows() as u32,
                buffers.cols() as u32,
                buffers.micro_width() as u32,
                buffers.micro_height() as u32,
            ],
        })
    }

    /// Records one full-screen draw into `target`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        bindings: &MatrixBindings,
        viewport: &Viewport,
        variant: ShaderVariant,
        grid: &GridStyle,
        background: [u8; 4],
    ) {
        let uniforms = MatrixUniforms {
            viewport: [
                viewport.width as f32,
                viewport.height as f32,
                viewport.offset_x,
                viewport.offset_y,
            ],
            params: [viewport.zoom, grid.line_width, 0.0, 0.0],
            fade: [
                grid.logical_fade.0,
                grid.logical_fade.1,
                grid.micro_fade.0,
                grid.micro_fade.1,
            ],
            logical_color: unorm(grid.logical_color),
            micro_color: unorm(grid.micro_color),
            background: unorm(background),
            dims: bindings.dims,
        };
        queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));

        let [r, g, b, a] = unorm(background).map(f64::from);
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Matrix Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(match variant {
            ShaderVariant::Cells => &self.cells,
            ShaderVariant::CellsWithGrid => &self.cells_grid,
        });
        pass.set_bind_group(0, &bindings.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_matches_shader_layout() {
        assert_eq!(std::mem::size_of::<MatrixUniforms>(), 7 * 16);
    }

    #[test]
    fn index_tables_use_integer_formats() {
        assert_eq!(TexelFormat::R32Uint.to_wgpu(), wgpu::TextureFormat::R32Uint);
        assert_eq!(unorm([255, 0, 51, 255]), [1.0, 0.0, 0.2, 1.0]);
    }
}
