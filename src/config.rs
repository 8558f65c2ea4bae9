use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::frame::ResizePolicy;

/// Upper bound for `--spheres`; every kernel ray walks the whole sphere list.
pub const MAX_SPHERES: u32 = 65_536;
use crate::scene::SceneBuilder;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f32 },
    #[error("at most {max} spheres per scene, got {requested}")]
    TooManySpheres { requested: u32, max: u32 },
    #[error("sphere radius range must be positive, got [{min}, {max}]")]
    NonPositiveRadius { min: f32, max: f32 },
    #[error("minimum sphere radius {min} exceeds maximum {max}")]
    InvertedRadiusRange { min: f32, max: f32 },
    #[error("placement radius must be positive, got {0}")]
    NonPositivePlacement(f32),
    #[error("window size must be non zero, got {width}x{height}")]
    EmptyWindow { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResizePolicyArg {
    Reset,
    Keep,
}

impl From<ResizePolicyArg> for ResizePolicy {
    fn from(value: ResizePolicyArg) -> Self {
        match value {
            ResizePolicyArg::Reset => ResizePolicy::Reset,
            ResizePolicyArg::Keep => ResizePolicy::Keep,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "progressive-tracer", about = "Progressive GPU ray tracer")]
pub struct Config {
    /// Number of sphere placements attempted per scene
    #[arg(long, default_value_t = 100)]
    pub spheres: u32,

    #[arg(long, default_value_t = 3.0)]
    pub radius_min: f32,

    #[arg(long, default_value_t = 8.0)]
    pub radius_max: f32,

    /// Radius of the ground disk spheres are placed in
    #[arg(long, default_value_t = 100.0)]
    pub placement_radius: f32,

    /// Seed of the scene generator, random when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, default_value_t = 1.0)]
    pub light_intensity: f32,

    /// Whether reallocating the output image restarts convergence. A resize
    /// that changes the aspect ratio changes the projection and always restarts.
    #[arg(long, value_enum, default_value_t = ResizePolicyArg::Reset)]
    pub resize_policy: ResizePolicyArg,

    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Directory screenshots are written to
    #[arg(long, default_value = ".")]
    pub screenshot_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_from(["progressive-tracer"])
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("radius-min", self.radius_min),
            ("radius-max", self.radius_max),
            ("placement-radius", self.placement_radius),
            ("light-intensity", self.light_intensity),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value });
            }
        }
        if self.spheres > MAX_SPHERES {
            return Err(ConfigError::TooManySpheres {
                requested: self.spheres,
                max: MAX_SPHERES,
            });
        }
        let (min, max) = (self.radius_min, self.radius_max);
        if !(min > 0.0 && max > 0.0) {
            return Err(ConfigError::NonPositiveRadius { min, max });
        }
        if min > max {
            return Err(ConfigError::InvertedRadiusRange { min, max });
        }
        if !(self.placement_radius > 0.0) {
            return Err(ConfigError::NonPositivePlacement(self.placement_radius));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyWindow {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    pub fn scene_builder(&self) -> SceneBuilder {
        SceneBuilder::new(
            self.spheres,
            self.radius_min..=self.radius_max,
            self.placement_radius,
        )
    }
}
