//! wgpu side of the frame loop: pipelines, images and the [`FrameBackend`]
//! implementation that records one frame into a command encoder.

use image::RgbaImage;
use wgpu::include_wgsl;

use crate::accumulation::{self, BlendUniforms};
use crate::error::GpuError;
use crate::frame::{FrameBackend, TargetStatus};
use crate::kernel::{self, DispatchGrid, KernelUniforms};
use crate::renderer::{IndexBuffer, SceneBuffer, Vertex, VertexBuffer, QUAD_INDICES, QUAD_VERTICES};
use crate::scene::Scene;
use crate::texture::{self, Texture};

const SKYBOX_SIZE: (u32, u32) = (512, 256);

/// Per-resolution images: the kernel output and the accumulation ping-pong pair.
struct FrameImages {
    result: Texture,
    accumulation: [Texture; 2],
    /// `blend_bind_groups[i]` reads `accumulation[i]` and writes the other one.
    blend_bind_groups: [wgpu::BindGroup; 2],
    present_bind_groups: [wgpu::BindGroup; 2],
    /// Index of the accumulation image holding the latest presented result.
    current: usize,
    presented: bool,
}

impl FrameImages {
    fn new(
        device: &wgpu::Device,
        layouts: &Layouts,
        blend_parameters: &wgpu::Buffer,
        width: u32,
        height: u32,
    ) -> Self {
        let result = Texture::storage_image(device, width, height, Some("Result"));
        let accumulation = [
            Texture::storage_image(device, width, height, Some("Accumulation A")),
            Texture::storage_image(device, width, height, Some("Accumulation B")),
        ];

        let blend_bind_group = |read: usize| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("blend_bind_group"),
                layout: &layouts.blend,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: accumulation::binding::PARAMETERS,
                        resource: blend_parameters.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: accumulation::binding::SAMPLE,
                        resource: wgpu::BindingResource::TextureView(&result.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: accumulation::binding::PREVIOUS,
                        resource: wgpu::BindingResource::TextureView(&accumulation[read].view),
                    },
                    wgpu::BindGroupEntry {
                        binding: accumulation::binding::PRESENTED,
                        resource: wgpu::BindingResource::TextureView(
                            &accumulation[1 - read].view,
                        ),
                    },
                ],
            })
        };
        let present_bind_group = |index: usize| {
            let image = &accumulation[index];
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("present_bind_group"),
                layout: &layouts.present,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&image.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&image.sampler),
                    },
                ],
            })
        };

        let blend_bind_groups = [blend_bind_group(0), blend_bind_group(1)];
        let present_bind_groups = [present_bind_group(0), present_bind_group(1)];

        Self {
            result,
            accumulation,
            blend_bind_groups,
            present_bind_groups,
            current: 0,
            presented: false,
        }
    }

    fn size(&self) -> (u32, u32) {
        (self.result.width(), self.result.height())
    }

    fn destroy(self) {
        self.result.texture.destroy();
        for image in self.accumulation {
            image.texture.destroy();
        }
    }
}

struct Layouts {
    kernel: wgpu::BindGroupLayout,
    blend: wgpu::BindGroupLayout,
    present: wgpu::BindGroupLayout,
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    filterable: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable },
        },
        count: None,
    }
}

fn storage_image_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: texture::IMAGE_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

impl Layouts {
    fn new(device: &wgpu::Device) -> Self {
        let compute = wgpu::ShaderStages::COMPUTE;

        let kernel = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel_bind_group_layout"),
            entries: &[
                uniform_entry(kernel::binding::PARAMETERS, compute),
                texture_entry(kernel::binding::SKYBOX_TEXTURE, compute, true),
                wgpu::BindGroupLayoutEntry {
                    binding: kernel::binding::SKYBOX_SAMPLER,
                    visibility: compute,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: kernel::binding::SPHERES,
                    visibility: compute,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_image_entry(kernel::binding::RESULT),
            ],
        });

        let blend = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blend_bind_group_layout"),
            entries: &[
                uniform_entry(accumulation::binding::PARAMETERS, compute),
                texture_entry(accumulation::binding::SAMPLE, compute, false),
                texture_entry(accumulation::binding::PREVIOUS, compute, false),
                storage_image_entry(accumulation::binding::PRESENTED),
            ],
        });

        let present = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("present_bind_group_layout"),
            entries: &[
                texture_entry(0, wgpu::ShaderStages::FRAGMENT, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        Self {
            kernel,
            blend,
            present,
        }
    }
}

/// Owns every GPU resource of the progressive renderer.
///
/// Pipelines and uniform buffers are created once in [`GpuRenderer::new`];
/// images follow the window size and the sphere buffer follows the scene.
pub struct GpuRenderer {
    layouts: Layouts,
    kernel_pipeline: wgpu::ComputePipeline,
    blend_pipeline: wgpu::ComputePipeline,
    present_pipeline: wgpu::RenderPipeline,
    parameters: wgpu::Buffer,
    blend_parameters: wgpu::Buffer,
    skybox: Texture,
    scene: SceneBuffer,
    vertex_buffer: VertexBuffer,
    index_buffer: IndexBuffer,
    images: Option<FrameImages>,
    kernel_bind_group: Option<wgpu::BindGroup>,
}

impl GpuRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let layouts = Layouts::new(device);

        let kernel_shader =
            device.create_shader_module(include_wgsl!("asset/shader/ray_tracing.wgsl"));
        let blend_shader =
            device.create_shader_module(include_wgsl!("asset/shader/accumulate.wgsl"));
        let present_shader =
            device.create_shader_module(include_wgsl!("asset/shader/present.wgsl"));

        let compute_pipeline = |label: &str, layout: &wgpu::BindGroupLayout, module: &wgpu::ShaderModule| {
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[layout],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module,
                entry_point: "main",
            })
        };
        let kernel_pipeline =
            compute_pipeline("Ray Tracing Pipeline", &layouts.kernel, &kernel_shader);
        let blend_pipeline = compute_pipeline("Accumulate Pipeline", &layouts.blend, &blend_shader);

        let present_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Present Pipeline Layout"),
            bind_group_layouts: &[&layouts.present],
            push_constant_ranges: &[],
        });
        let present_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Present Pipeline"),
            layout: Some(&present_layout),
            vertex: wgpu::VertexState {
                module: &present_shader,
                entry_point: "vs_main",
                buffers: &[Vertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &present_shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let parameters = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kernel Parameters"),
            size: std::mem::size_of::<KernelUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let blend_parameters = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Blend Parameters"),
            size: std::mem::size_of::<BlendUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sky = texture::sky_gradient(SKYBOX_SIZE.0, SKYBOX_SIZE.1);
        let skybox = Texture::from_image(device, queue, &sky, Some("Skybox"));

        let vertex_buffer = VertexBuffer::init_immediate(
            device,
            bytemuck::cast_slice(QUAD_VERTICES),
            Some("Vertex Buffer"),
        );
        let index_buffer = IndexBuffer::init_immediate_u16(device, QUAD_INDICES, Some("Index Buffer"));

        Self {
            layouts,
            kernel_pipeline,
            blend_pipeline,
            present_pipeline,
            parameters,
            blend_parameters,
            skybox,
            scene: SceneBuffer::default(),
            vertex_buffer,
            index_buffer,
            images: None,
            kernel_bind_group: None,
        }
    }

    /// Replace the sphere buffer. Returns the number of uploaded spheres.
    pub fn upload_scene(&mut self, device: &wgpu::Device, scene: &Scene) -> u32 {
        self.kernel_bind_group = None;
        self.scene.upload(device, scene);
        self.rebuild_kernel_bind_group(device);
        self.scene.count()
    }

    /// Release the scene buffer and the images. Pipelines stay valid.
    pub fn release(&mut self) {
        self.kernel_bind_group = None;
        self.scene.release();
        if let Some(images) = self.images.take() {
            images.destroy();
        }
    }

    pub fn begin_frame<'a>(
        &'a mut self,
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
    ) -> GpuFrame<'a> {
        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        GpuFrame {
            device,
            queue,
            renderer: self,
            encoder,
        }
    }

    /// Read the presented image back to the CPU, sRGB encoded.
    pub fn capture(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<RgbaImage, GpuError> {
        let images = match &self.images {
            Some(images) if images.presented => images,
            _ => return Err(GpuError::NothingPresented),
        };
        let (width, height) = images.size();
        let source = &images.accumulation[images.current].texture;

        let tight_bytes_per_row = FLOAT_PIXEL_SIZE * width;
        let padded_bytes_per_row = align_bytes_per_row(tight_bytes_per_row);
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Staging"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Capture Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: source,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        receiver.recv().map_err(|_| GpuError::ReadbackCancelled)??;

        let tight = {
            let data = slice.get_mapped_range();
            depad_rows(&data, tight_bytes_per_row, padded_bytes_per_row, height)
        };
        staging.unmap();

        let pixels: Vec<[f32; 4]> = tight
            .chunks_exact(FLOAT_PIXEL_SIZE as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        Ok(float_pixels_to_rgba8(&pixels, width, height))
    }

    fn rebuild_kernel_bind_group(&mut self, device: &wgpu::Device) {
        let (Some(images), Some(spheres)) = (&self.images, self.scene.buffer()) else {
            self.kernel_bind_group = None;
            return;
        };

        self.kernel_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kernel_bind_group"),
            layout: &self.layouts.kernel,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: kernel::binding::PARAMETERS,
                    resource: self.parameters.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: kernel::binding::SKYBOX_TEXTURE,
                    resource: wgpu::BindingResource::TextureView(&self.skybox.view),
                },
                wgpu::BindGroupEntry {
                    binding: kernel::binding::SKYBOX_SAMPLER,
                    resource: wgpu::BindingResource::Sampler(&self.skybox.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: kernel::binding::SPHERES,
                    resource: spheres.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: kernel::binding::RESULT,
                    resource: wgpu::BindingResource::TextureView(&images.result.view),
                },
            ],
        }));
    }
}

/// One frame being recorded. Submitted by [`GpuFrame::present`].
pub struct GpuFrame<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    renderer: &'a mut GpuRenderer,
    encoder: wgpu::CommandEncoder,
}

impl<'a> GpuFrame<'a> {
    /// Draw the presented image onto `target` and submit the frame.
    pub fn present(mut self, target: &wgpu::TextureView) {
        {
            let mut render_pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });

            let renderer = &*self.renderer;
            if let Some(images) = renderer.images.as_ref().filter(|images| images.presented) {
                render_pass.set_pipeline(&renderer.present_pipeline);
                render_pass.set_bind_group(0, &images.present_bind_groups[images.current], &[]);
                render_pass.set_vertex_buffer(0, renderer.vertex_buffer.buffer().slice(..));
                render_pass.set_index_buffer(
                    renderer.index_buffer.buffer().slice(..),
                    renderer.index_buffer.format(),
                );
                render_pass.draw_indexed(0..renderer.index_buffer.count(), 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(self.encoder.finish()));
    }
}

impl<'a> FrameBackend for GpuFrame<'a> {
    fn ensure_target(&mut self, width: u32, height: u32) -> TargetStatus {
        if width == 0 || height == 0 {
            return TargetStatus::Unavailable;
        }
        if let Some(images) = &self.renderer.images {
            if images.size() == (width, height) {
                return TargetStatus::Ready;
            }
        }

        if let Some(images) = self.renderer.images.take() {
            images.destroy();
        }
        self.renderer.images = Some(FrameImages::new(
            self.device,
            &self.renderer.layouts,
            &self.renderer.blend_parameters,
            width,
            height,
        ));
        self.renderer.rebuild_kernel_bind_group(self.device);
        TargetStatus::Recreated
    }

    fn kernel_ready(&self) -> bool {
        self.renderer.kernel_bind_group.is_some()
    }

    fn write_parameters(&mut self, uniforms: &KernelUniforms) {
        self.queue
            .write_buffer(&self.renderer.parameters, 0, bytemuck::bytes_of(uniforms));
    }

    fn dispatch(&mut self, grid: DispatchGrid) {
        let Some(bind_group) = &self.renderer.kernel_bind_group else {
            return;
        };
        let mut pass = self.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Ray Tracing Pass"),
        });
        pass.set_pipeline(&self.renderer.kernel_pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(grid.x, grid.y, 1);
    }

    fn blend(&mut self, sample_index: u64) {
        let Some(images) = self.renderer.images.as_mut() else {
            return;
        };
        self.queue.write_buffer(
            &self.renderer.blend_parameters,
            0,
            bytemuck::bytes_of(&BlendUniforms::new(sample_index)),
        );

        let (width, height) = images.size();
        let grid = DispatchGrid::covering(width, height);
        {
            let mut pass = self.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Accumulate Pass"),
            });
            pass.set_pipeline(&self.renderer.blend_pipeline);
            pass.set_bind_group(0, &images.blend_bind_groups[images.current], &[]);
            pass.dispatch_workgroups(grid.x, grid.y, 1);
        }
        images.current = 1 - images.current;
        images.presented = true;
    }
}

const FLOAT_PIXEL_SIZE: u32 = 16;

/// Round up to WebGPU's 256 byte copy row alignment.
fn align_bytes_per_row(bytes: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (bytes + align - 1) / align * align
}

fn depad_rows(data: &[u8], tight: u32, padded: u32, rows: u32) -> Vec<u8> {
    let (tight, padded) = (tight as usize, padded as usize);
    let mut out = Vec::with_capacity(tight * rows as usize);
    for row in 0..rows as usize {
        let start = row * padded;
        out.extend_from_slice(&data[start..start + tight]);
    }
    out
}

fn linear_to_srgb(value: f32) -> f32 {
    let value = value.clamp(0.0, 1.0);
    if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

fn float_pixels_to_rgba8(pixels: &[[f32; 4]], width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let [r, g, b, _] = pixels[(y * width + x) as usize];
        let encode = |c: f32| (linear_to_srgb(c) * 255.0).round() as u8;
        image::Rgba([encode(r), encode(g), encode(b), 255])
    })
}
