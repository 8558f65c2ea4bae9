//! Parameter contract between the frame driver and the ray tracing kernel.

use rand::Rng;

use crate::invalidation::{CameraSnapshot, LightSnapshot};
use crate::util::math::div_ceil;

/// Pixel tile processed by one kernel workgroup. Must match
/// `@workgroup_size` in `ray_tracing.wgsl` and `accumulate.wgsl`.
pub const TILE_SIZE: u32 = 8;

/// Binding slots of the ray tracing kernel, bind group 0.
pub mod binding {
    pub const PARAMETERS: u32 = 0;
    pub const SKYBOX_TEXTURE: u32 = 1;
    pub const SKYBOX_SAMPLER: u32 = 2;
    pub const SPHERES: u32 = 3;
    pub const RESULT: u32 = 4;
}

/// Uniform block of the kernel.
///
/// Field offsets follow WGSL uniform layout rules: two `mat4x4<f32>`,
/// `_PixelOffset` at 128, `_SphereCount` at 136, `_DirectionalLight` at 144.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelUniforms {
    pub camera_to_world: [[f32; 4]; 4],
    pub camera_inverse_projection: [[f32; 4]; 4],
    pub pixel_offset: [f32; 2],
    pub sphere_count: u32,
    pub _padding: u32,
    pub directional_light: [f32; 4],
}

/// Workgroup counts for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchGrid {
    pub x: u32,
    pub y: u32,
}

impl DispatchGrid {
    /// Smallest grid of [`TILE_SIZE`] tiles covering the whole image.
    pub fn covering(width: u32, height: u32) -> Self {
        Self {
            x: div_ceil(width, TILE_SIZE),
            y: div_ceil(height, TILE_SIZE),
        }
    }
}

/// Marshals per-frame state into [`KernelUniforms`].
///
/// Owns the jitter source so that every bind draws a fresh sub-pixel offset.
#[derive(Debug)]
pub struct ParameterBinder<R> {
    jitter: R,
}

impl<R: Rng> ParameterBinder<R> {
    pub fn new(jitter: R) -> Self {
        Self { jitter }
    }

    pub fn bind(
        &mut self,
        camera: &CameraSnapshot,
        light: &LightSnapshot,
        sphere_count: u32,
    ) -> KernelUniforms {
        let pixel_offset = [self.jitter.gen::<f32>(), self.jitter.gen::<f32>()];

        KernelUniforms {
            camera_to_world: camera.camera_to_world.to_cols_array_2d(),
            camera_inverse_projection: camera.inverse_projection.to_cols_array_2d(),
            pixel_offset,
            sphere_count,
            _padding: 0,
            directional_light: light.as_vec4().to_array(),
        }
    }
}
