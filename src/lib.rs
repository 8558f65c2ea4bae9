pub mod accumulation;
pub mod application;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod invalidation;
pub mod kernel;
pub mod renderer;
pub mod scene;
pub mod texture;
pub mod util;
