use wgpu::util::DeviceExt;

use crate::scene::Scene;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Full screen quad, texture origin at the top left corner.
#[rustfmt::skip]
pub const QUAD_VERTICES: &[Vertex] = &[
    Vertex { position: [-1.0,  1.0, 0.0], tex_coords: [0.0, 0.0] },
    Vertex { position: [-1.0, -1.0, 0.0], tex_coords: [0.0, 1.0] },
    Vertex { position: [ 1.0, -1.0, 0.0], tex_coords: [1.0, 1.0] },
    Vertex { position: [ 1.0,  1.0, 0.0], tex_coords: [1.0, 0.0] },
];

pub const QUAD_INDICES: &[u16] = &[0, 1, 2, 0, 2, 3];

pub struct VertexBuffer(wgpu::Buffer);

impl VertexBuffer {
    pub fn init_immediate<'label>(
        device: &wgpu::Device,
        content: &[u8],
        label: Option<&'label str>,
    ) -> Self {
        let init_descriptor = wgpu::util::BufferInitDescriptor {
            label,
            contents: content,
            usage: wgpu::BufferUsages::VERTEX,
        };
        let buffer = device.create_buffer_init(&init_descriptor);
        Self(buffer)
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.0
    }
}

pub struct IndexBuffer {
    buffer: wgpu::Buffer,
    format: wgpu::IndexFormat,
}

impl IndexBuffer {
    pub fn init_immediate_u16<'label>(
        device: &wgpu::Device,
        content: &[u16],
        label: Option<&'label str>,
    ) -> Self {
        let init_descriptor = wgpu::util::BufferInitDescriptor {
            label,
            contents: bytemuck::cast_slice(content),
            usage: wgpu::BufferUsages::INDEX,
        };
        let buffer = device.create_buffer_init(&init_descriptor);
        Self {
            buffer,
            format: wgpu::IndexFormat::Uint16,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn format(&self) -> wgpu::IndexFormat {
        self.format
    }

    pub fn count(&self) -> u32 {
        (self.buffer.size() / Self::format_size(self.format) as u64) as u32
    }

    /// Return the index byte size from the index format
    #[inline(always)]
    pub fn format_size(format: wgpu::IndexFormat) -> u8 {
        match format {
            wgpu::IndexFormat::Uint16 => 2,
            wgpu::IndexFormat::Uint32 => 4,
        }
    }
}

/// Sphere record as read by the kernel's `_Spheres` buffer.
///
/// Ten tightly packed floats; the kernel declares the same struct with
/// scalar fields so the array stride stays 40 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSphere {
    pub position: [f32; 3],
    pub radius: f32,
    pub albedo: [f32; 3],
    pub specular: [f32; 3],
}

pub const GPU_SPHERE_SIZE: usize = std::mem::size_of::<GpuSphere>();

pub fn encode_spheres(scene: &Scene) -> Vec<GpuSphere> {
    scene
        .iter()
        .map(|sphere| GpuSphere {
            position: sphere.position.to_array(),
            radius: sphere.radius,
            albedo: sphere.albedo.to_array(),
            specular: sphere.specular.to_array(),
        })
        .collect()
}

/// Storage buffer holding the serialized scene for the kernel.
///
/// Uploading a new scene destroys the previous buffer first. The buffer is
/// also released when the owner is dropped.
#[derive(Default)]
pub struct SceneBuffer {
    buffer: Option<wgpu::Buffer>,
    count: u32,
}

impl SceneBuffer {
    pub fn upload(&mut self, device: &wgpu::Device, scene: &Scene) -> &wgpu::Buffer {
        self.release();

        let mut records = encode_spheres(scene);
        self.count = records.len() as u32;
        // zero sized bindings are invalid; the kernel reads `count` entries only
        if records.is_empty() {
            records.push(bytemuck::Zeroable::zeroed());
        }

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Buffer"),
            contents: bytemuck::cast_slice(&records),
            usage: wgpu::BufferUsages::STORAGE,
        });
        tracing::debug!(spheres = self.count, bytes = buffer.size(), "uploaded scene");
        self.buffer.insert(buffer)
    }

    pub fn release(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.destroy();
        }
        self.count = 0;
    }

    pub fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Drop for SceneBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Sphere;

    #[test]
    fn sphere_record_is_forty_bytes() {
        assert_eq!(GPU_SPHERE_SIZE, 40);
        assert_eq!(std::mem::align_of::<GpuSphere>(), 4);
    }

    #[test]
    fn encoding_keeps_scene_order() {
        let scene = Scene {
            spheres: (0..5)
                .map(|i| Sphere {
                    radius: i as f32 + 1.0,
                    ..Sphere::default()
                })
                .collect(),
        };
        let radii: Vec<f32> = encode_spheres(&scene).iter().map(|s| s.radius).collect();
        assert_eq!(radii, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn empty_scene_encodes_nothing() {
        assert!(encode_spheres(&Scene::default()).is_empty());
    }

    fn headless_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        ))?;
        let descriptor = wgpu::DeviceDescriptor {
            label: None,
            features: wgpu::Features::empty(),
            limits: wgpu::Limits::downlevel_defaults(),
        };
        pollster::block_on(adapter.request_device(&descriptor, None)).ok()
    }

    #[test]
    fn reupload_replaces_previous_buffer() {
        let Some((device, _queue)) = headless_device() else {
            eprintln!("no adapter available, skipping");
            return;
        };
        let three = Scene {
            spheres: vec![Sphere::default(); 3],
        };

        let mut buffer = SceneBuffer::default();
        buffer.upload(&device, &three);
        assert_eq!(buffer.count(), 3);
        let size = buffer.buffer().map(wgpu::Buffer::size);
        assert_eq!(size, Some(3 * GPU_SPHERE_SIZE as u64));

        buffer.upload(&device, &Scene::default());
        assert_eq!(buffer.count(), 0);
        // empty scenes keep one placeholder record
        let size = buffer.buffer().map(wgpu::Buffer::size);
        assert_eq!(size, Some(GPU_SPHERE_SIZE as u64));

        buffer.release();
        assert_eq!(buffer.count(), 0);
        assert!(buffer.buffer().is_none());
    }
}
