use thiserror::Error;

/// Fatal setup and device failures surfaced to the host.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to create window surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface is not supported by the adapter")]
    SurfaceConfig,
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("no presented image to read back")]
    NothingPresented,
    #[error("readback was cancelled before the buffer was mapped")]
    ReadbackCancelled,
    #[error("failed to map readback buffer: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),
    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
}
