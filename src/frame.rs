use rand::Rng;

use crate::invalidation::{CameraSnapshot, InvalidationTracker, LightSnapshot};
use crate::kernel::{DispatchGrid, KernelUniforms, ParameterBinder};

/// State of the output image after [`FrameBackend::ensure_target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    /// No image can exist yet, e.g. a minimized window.
    Unavailable,
    Ready,
    /// The image was (re)allocated and its previous contents are gone.
    Recreated,
}

/// GPU side of a frame, as seen by the [`FrameDriver`].
pub trait FrameBackend {
    fn ensure_target(&mut self, width: u32, height: u32) -> TargetStatus;
    fn kernel_ready(&self) -> bool;
    fn write_parameters(&mut self, uniforms: &KernelUniforms);
    fn dispatch(&mut self, grid: DispatchGrid);
    fn blend(&mut self, sample_index: u64);
}

/// Host provider of the camera and light for the current frame.
pub trait SceneContext {
    fn camera(&self) -> CameraSnapshot;
    fn light(&self) -> LightSnapshot;
}

/// What happens to the sample counter when the output image is reallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizePolicy {
    /// Restart convergence; the new image holds no samples.
    #[default]
    Reset,
    /// Keep counting across the reallocation.
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TargetUnavailable,
    KernelUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Skipped(SkipReason),
    Rendered { sample_index: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameState {
    pub sample_index: u64,
}

pub struct FrameDriver<R> {
    state: FrameState,
    tracker: InvalidationTracker,
    binder: ParameterBinder<R>,
    resize_policy: ResizePolicy,
    sphere_count: u32,
}

impl<R: Rng> FrameDriver<R> {
    pub fn new(jitter: R, resize_policy: ResizePolicy) -> Self {
        Self {
            state: FrameState::default(),
            tracker: InvalidationTracker::new(),
            binder: ParameterBinder::new(jitter),
            resize_policy,
            sphere_count: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// The scene was rebuilt; convergence restarts on the next frame.
    pub fn scene_changed(&mut self, sphere_count: u32) {
        self.sphere_count = sphere_count;
        self.tracker.invalidate();
        self.state.sample_index = 0;
    }

    pub fn frame<B, C>(
        &mut self,
        backend: &mut B,
        context: &C,
        width: u32,
        height: u32,
    ) -> FrameOutcome
    where
        B: FrameBackend + ?Sized,
        C: SceneContext + ?Sized,
    {
        let camera = context.camera();
        let light = context.light();
        // transforms are tracked even on skipped frames so a change is not lost
        self.tracker.observe(&camera, &light);

        match backend.ensure_target(width, height) {
            TargetStatus::Unavailable => {
                tracing::trace!("frame skipped, no output image");
                return FrameOutcome::Skipped(SkipReason::TargetUnavailable);
            }
            TargetStatus::Recreated => {
                tracing::debug!(
                    width,
                    height,
                    policy = ?self.resize_policy,
                    "output image recreated"
                );
                if self.resize_policy == ResizePolicy::Reset {
                    self.tracker.invalidate();
                }
            }
            TargetStatus::Ready => {}
        }

        if !backend.kernel_ready() {
            tracing::trace!("frame skipped, kernel not ready");
            return FrameOutcome::Skipped(SkipReason::KernelUnavailable);
        }

        if self.tracker.take_reset() {
            self.state.sample_index = 0;
        }

        let uniforms = self.binder.bind(&camera, &light, self.sphere_count);
        backend.write_parameters(&uniforms);
        backend.dispatch(DispatchGrid::covering(width, height));

        let sample_index = self.state.sample_index;
        backend.blend(sample_index);
        self.state.sample_index = sample_index.saturating_add(1);

        FrameOutcome::Rendered { sample_index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[derive(Debug, PartialEq)]
    enum Call {
        Parameters,
        Dispatch(DispatchGrid),
        Blend(u64),
    }

    #[derive(Default)]
    struct RecordingBackend {
        size: Option<(u32, u32)>,
        kernel_missing: bool,
        calls: Vec<Call>,
    }

    impl FrameBackend for RecordingBackend {
        fn ensure_target(&mut self, width: u32, height: u32) -> TargetStatus {
            if width == 0 || height == 0 {
                return TargetStatus::Unavailable;
            }
            if self.size == Some((width, height)) {
                TargetStatus::Ready
            } else {
                self.size = Some((width, height));
                TargetStatus::Recreated
            }
        }

        fn kernel_ready(&self) -> bool {
            !self.kernel_missing
        }

        fn write_parameters(&mut self, _uniforms: &KernelUniforms) {
            self.calls.push(Call::Parameters);
        }

        fn dispatch(&mut self, grid: DispatchGrid) {
            self.calls.push(Call::Dispatch(grid));
        }

        fn blend(&mut self, sample_index: u64) {
            self.calls.push(Call::Blend(sample_index));
        }
    }

    struct FixedContext {
        camera: CameraSnapshot,
        light: LightSnapshot,
    }

    impl Default for FixedContext {
        fn default() -> Self {
            Self {
                camera: CameraSnapshot {
                    camera_to_world: glam::Mat4::IDENTITY,
                    inverse_projection: glam::Mat4::IDENTITY,
                },
                light: LightSnapshot {
                    direction: glam::Vec3::NEG_Y,
                    intensity: 1.0,
                },
            }
        }
    }

    impl SceneContext for FixedContext {
        fn camera(&self) -> CameraSnapshot {
            self.camera
        }

        fn light(&self) -> LightSnapshot {
            self.light
        }
    }

    fn driver(policy: ResizePolicy) -> FrameDriver<SmallRng> {
        FrameDriver::new(SmallRng::seed_from_u64(0), policy)
    }

    fn rendered_index(outcome: FrameOutcome) -> u64 {
        match outcome {
            FrameOutcome::Rendered { sample_index } => sample_index,
            FrameOutcome::Skipped(reason) => panic!("frame skipped: {reason:?}"),
        }
    }

    #[test]
    fn calls_backend_in_order() {
        let mut driver = driver(ResizePolicy::Reset);
        let mut backend = RecordingBackend::default();
        driver.frame(&mut backend, &FixedContext::default(), 20, 9);

        assert_eq!(
            backend.calls,
            vec![
                Call::Parameters,
                Call::Dispatch(DispatchGrid { x: 3, y: 2 }),
                Call::Blend(0)
            ]
        );
        assert_eq!(driver.state().sample_index, 1);
    }

    #[test]
    fn static_view_counts_up() {
        let mut driver = driver(ResizePolicy::Reset);
        let mut backend = RecordingBackend::default();
        let context = FixedContext::default();

        let indices: Vec<u64> = (0..6)
            .map(|_| rendered_index(driver.frame(&mut backend, &context, 16, 16)))
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn light_change_resets_on_that_frame() {
        let mut driver = driver(ResizePolicy::Reset);
        let mut backend = RecordingBackend::default();
        let mut context = FixedContext::default();

        for _ in 0..4 {
            driver.frame(&mut backend, &context, 16, 16);
        }
        context.light.direction = glam::Vec3::new(0.0, -1.0, 1.0).normalize();
        assert_eq!(rendered_index(driver.frame(&mut backend, &context, 16, 16)), 0);
        assert_eq!(rendered_index(driver.frame(&mut backend, &context, 16, 16)), 1);
    }

    #[test]
    fn camera_change_resets() {
        let mut driver = driver(ResizePolicy::Reset);
        let mut backend = RecordingBackend::default();
        let mut context = FixedContext::default();

        driver.frame(&mut backend, &context, 16, 16);
        driver.frame(&mut backend, &context, 16, 16);
        context.camera.camera_to_world = glam::Mat4::from_translation(glam::Vec3::X);
        assert_eq!(rendered_index(driver.frame(&mut backend, &context, 16, 16)), 0);
    }

    #[test]
    fn missing_target_skips_without_advancing() {
        let mut driver = driver(ResizePolicy::Reset);
        let mut backend = RecordingBackend::default();
        let context = FixedContext::default();

        driver.frame(&mut backend, &context, 16, 16);
        assert_eq!(
            driver.frame(&mut backend, &context, 0, 16),
            FrameOutcome::Skipped(SkipReason::TargetUnavailable)
        );
        assert_eq!(driver.state().sample_index, 1);
        assert_eq!(backend.calls.len(), 3);
    }

    #[test]
    fn missing_kernel_skips_then_recovers() {
        let mut driver = driver(ResizePolicy::Reset);
        let mut backend = RecordingBackend {
            kernel_missing: true,
            ..Default::default()
        };
        let context = FixedContext::default();

        assert_eq!(
            driver.frame(&mut backend, &context, 16, 16),
            FrameOutcome::Skipped(SkipReason::KernelUnavailable)
        );
        assert!(backend.calls.is_empty());

        backend.kernel_missing = false;
        assert_eq!(rendered_index(driver.frame(&mut backend, &context, 16, 16)), 0);
    }

    #[test]
    fn change_seen_on_skipped_frame_still_resets() {
        let mut driver = driver(ResizePolicy::Reset);
        let mut backend = RecordingBackend::default();
        let mut context = FixedContext::default();

        driver.frame(&mut backend, &context, 16, 16);
        driver.frame(&mut backend, &context, 16, 16);
        context.light.intensity = 2.0;
        driver.frame(&mut backend, &context, 0, 0);
        assert_eq!(rendered_index(driver.frame(&mut backend, &context, 16, 16)), 0);
    }

    #[test]
    fn resize_resets_under_reset_policy() {
        let mut driver = driver(ResizePolicy::Reset);
        let mut backend = RecordingBackend::default();
        let context = FixedContext::default();

        driver.frame(&mut backend, &context, 16, 16);
        driver.frame(&mut backend, &context, 16, 16);
        assert_eq!(rendered_index(driver.frame(&mut backend, &context, 32, 16)), 0);
    }

    #[test]
    fn resize_keeps_counting_under_keep_policy() {
        let mut driver = driver(ResizePolicy::Keep);
        let mut backend = RecordingBackend::default();
        let context = FixedContext::default();

        driver.frame(&mut backend, &context, 16, 16);
        driver.frame(&mut backend, &context, 16, 16);
        assert_eq!(rendered_index(driver.frame(&mut backend, &context, 32, 16)), 2);
    }

    #[test]
    fn keep_policy_still_resets_on_projection_change() {
        let mut driver = driver(ResizePolicy::Keep);
        let mut backend = RecordingBackend::default();
        let mut context = FixedContext::default();

        driver.frame(&mut backend, &context, 16, 16);
        driver.frame(&mut backend, &context, 16, 16);
        // a host resize that changes the aspect also changes the projection
        context.camera.inverse_projection =
            glam::Mat4::perspective_rh(1.0, 2.0, 0.1, 100.0).inverse();
        assert_eq!(rendered_index(driver.frame(&mut backend, &context, 32, 16)), 0);
    }

    #[test]
    fn scene_change_restarts_convergence() {
        let mut driver = driver(ResizePolicy::Reset);
        let mut backend = RecordingBackend::default();
        let context = FixedContext::default();

        for _ in 0..3 {
            driver.frame(&mut backend, &context, 16, 16);
        }
        driver.scene_changed(4);
        assert_eq!(driver.state().sample_index, 0);
        assert_eq!(rendered_index(driver.frame(&mut backend, &context, 16, 16)), 0);
        assert_eq!(rendered_index(driver.frame(&mut backend, &context, 16, 16)), 1);
    }
}
