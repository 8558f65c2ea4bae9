//! Progressive accumulation: the running mean of every kernel sample since
//! the last reset.
//!
//! `presented = sample / (n + 1) + previous * n / (n + 1)`
//!
//! [`AccumulationBuffer`] is the CPU form of the blend law. The GPU blend
//! stage (`accumulate.wgsl`) applies the same law per pixel, fed by
//! [`BlendUniforms`].

use glam::Vec4;
use thiserror::Error;

/// Binding slots of the blend stage, bind group 0.
pub mod binding {
    pub const PARAMETERS: u32 = 0;
    pub const SAMPLE: u32 = 1;
    pub const PREVIOUS: u32 = 2;
    pub const PRESENTED: u32 = 3;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlendError {
    #[error("sample has {actual} pixels, accumulation buffer holds {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Weight of the newest sample when `sample_index` samples came before it.
pub fn sample_weight(sample_index: u64) -> f32 {
    1.0 / (sample_index as f64 + 1.0) as f32
}

/// Uniform block of the blend stage. `sample` is `_Sample` in the shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlendUniforms {
    pub sample: f32,
    pub _padding: [f32; 3],
}

impl BlendUniforms {
    pub fn new(sample_index: u64) -> Self {
        Self {
            sample: sample_index as f32,
            _padding: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccumulationBuffer {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

impl AccumulationBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Vec4::ZERO; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    /// Fold `sample` into the running mean and return the presented image.
    ///
    /// At `sample_index == 0` the sample is copied as is; the previous
    /// contents are never read.
    pub fn blend(&mut self, sample: &[Vec4], sample_index: u64) -> Result<&[Vec4], BlendError> {
        if sample.len() != self.pixels.len() {
            return Err(BlendError::SizeMismatch {
                expected: self.pixels.len(),
                actual: sample.len(),
            });
        }

        if sample_index == 0 {
            self.pixels.copy_from_slice(sample);
        } else {
            let weight = sample_weight(sample_index);
            for (presented, new) in self.pixels.iter_mut().zip(sample) {
                *presented = *new * weight + *presented * (1.0 - weight);
            }
        }

        Ok(&self.pixels)
    }
}
