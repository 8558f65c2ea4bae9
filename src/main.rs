use std::process::ExitCode;

use clap::Parser;
use progressive_tracer_lib::{
    application::{AppState, Application, Layer, Screen, WindowOptions},
    camera::{Camera, CameraController, DirectionalLight, LightController},
    config::Config,
    error::GpuError,
    frame::{FrameDriver, FrameOutcome, SceneContext},
    gpu::GpuRenderer,
    invalidation::{CameraSnapshot, LightSnapshot},
    scene::SceneBuilder,
};
use rand::{rngs::SmallRng, SeedableRng};
use tracing_subscriber::EnvFilter;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
};

/// Host side camera and light, read by the frame driver every frame.
struct View {
    camera: Camera,
    light: DirectionalLight,
}

impl SceneContext for View {
    fn camera(&self) -> CameraSnapshot {
        self.camera.snapshot()
    }

    fn light(&self) -> LightSnapshot {
        self.light.snapshot()
    }
}

struct ProgressiveTracer {
    config: Config,
    view: View,
    camera_controller: CameraController,
    light_controller: LightController,
    builder: SceneBuilder,
    seed: u64,
    driver: FrameDriver<SmallRng>,
    renderer: GpuRenderer,
    last_outcome: Option<FrameOutcome>,
}

impl ProgressiveTracer {
    fn regenerate_scene(&mut self, screen: &Screen) {
        let scene = self.builder.build(&mut SmallRng::seed_from_u64(self.seed));
        let count = self.renderer.upload_scene(&screen.device, &scene);
        self.driver.scene_changed(count);
        tracing::info!(
            seed = self.seed,
            spheres = count,
            requested = self.builder.max_count,
            "scene generated"
        );
    }

    fn save_screenshot(&self, screen: &Screen) -> Result<(), GpuError> {
        let image = self.renderer.capture(&screen.device, &screen.queue)?;
        let sample_index = self.driver.state().sample_index;
        let path = self
            .config
            .screenshot_dir
            .join(format!("progressive-{}-{}.png", self.seed, sample_index));
        image.save(&path)?;
        tracing::info!(path = %path.display(), samples = sample_index, "saved screenshot");
        Ok(())
    }
}

impl Layer for ProgressiveTracer {
    type Options = Config;
    type LayerErr = GpuError;

    fn start(screen: &mut Screen, _app: &AppState, config: Config) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let builder = config.scene_builder();
        if builder.crowding_warning() {
            tracing::warn!(
                spheres = builder.max_count,
                placement_radius = builder.placement_radius,
                "sphere count is high for the placement disk, expect far fewer spheres"
            );
        }

        let size = screen.window().inner_size();
        let mut camera = Camera::default();
        camera.aspect = size.width.max(1) as f32 / size.height.max(1) as f32;
        let view = View {
            camera,
            light: DirectionalLight::new(config.light_intensity),
        };

        let renderer = GpuRenderer::new(&screen.device, &screen.queue, screen.config.format);
        let driver = FrameDriver::new(
            SmallRng::seed_from_u64(seed.wrapping_add(1)),
            config.resize_policy.into(),
        );

        let mut layer = Self {
            config,
            view,
            camera_controller: CameraController::new(2.0),
            light_controller: LightController::new(),
            builder,
            seed,
            driver,
            renderer,
            last_outcome: None,
        };
        layer.regenerate_scene(screen);
        layer
    }

    fn process_event(&mut self, event: &Event<()>, screen: &mut Screen) {
        let Event::WindowEvent { event, .. } = event else {
            return;
        };
        if self.camera_controller.process_events(&mut self.view.camera, event)
            || self.light_controller.process_events(&mut self.view.light, event)
        {
            return;
        }

        if let WindowEvent::KeyboardInput {
            input:
                KeyboardInput {
                    state: ElementState::Pressed,
                    virtual_keycode: Some(keycode),
                    ..
                },
            ..
        } = event
        {
            match keycode {
                VirtualKeyCode::R => {
                    self.seed = self.seed.wrapping_add(1);
                    self.regenerate_scene(screen);
                }
                VirtualKeyCode::F12 => {
                    if let Err(err) = self.save_screenshot(screen) {
                        tracing::error!(%err, "screenshot failed");
                    }
                }
                _ => {}
            }
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>, _app: &AppState, _screen: &mut Screen) {
        if new_size.width > 0 && new_size.height > 0 {
            self.view.camera.aspect = new_size.width as f32 / new_size.height as f32;
        }
    }

    fn update(&mut self, app: &AppState, screen: &mut Screen) {
        if app.frame_count() % 30 != 0 {
            return;
        }
        if let Some(FrameOutcome::Rendered { sample_index }) = self.last_outcome {
            screen.window().set_title(&format!(
                "progressive-tracer | {} samples | {:.1} ms",
                sample_index + 1,
                app.elapsed_time().as_secs_f32() * 1000.0
            ));
        }
    }

    fn render(&mut self, _app: &AppState, screen: &mut Screen) -> Result<(), wgpu::SurfaceError> {
        let output = screen.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let size = screen.window().inner_size();
        let mut frame = self.renderer.begin_frame(&screen.device, &screen.queue);
        let outcome = self
            .driver
            .frame(&mut frame, &self.view, size.width, size.height);
        frame.present(&view);
        output.present();

        if let FrameOutcome::Rendered { sample_index: 0 } = outcome {
            tracing::debug!("accumulation restarted");
        }
        self.last_outcome = Some(outcome);
        Ok(())
    }

    fn shutdown(&mut self, _app: &AppState, _screen: &mut Screen) -> Result<(), Self::LayerErr> {
        self.renderer.release();
        tracing::info!(samples = self.driver.state().sample_index, "exiting");
        Ok(())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    if let Err(err) = config.validate() {
        tracing::error!(%err, "invalid configuration");
        return ExitCode::FAILURE;
    }

    let window = WindowOptions {
        title: "progressive-tracer".to_owned(),
        width: config.width,
        height: config.height,
    };
    match pollster::block_on(Application::<ProgressiveTracer>::init(window, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "failed to start renderer");
            ExitCode::FAILURE
        }
    }
}
