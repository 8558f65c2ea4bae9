/// Camera state that, when changed, invalidates the accumulated image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSnapshot {
    pub camera_to_world: glam::Mat4,
    pub inverse_projection: glam::Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSnapshot {
    /// Direction the light travels in, world space.
    pub direction: glam::Vec3,
    pub intensity: f32,
}

impl LightSnapshot {
    pub fn as_vec4(&self) -> glam::Vec4 {
        self.direction.extend(self.intensity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerState {
    #[default]
    Converging,
    ResetPending,
}

/// Detects camera and light changes between consecutive frames by value.
///
/// The first observation has nothing to compare against and never raises
/// a reset.
#[derive(Debug, Default)]
pub struct InvalidationTracker {
    previous: Option<(CameraSnapshot, LightSnapshot)>,
    state: TrackerState,
}

impl InvalidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, camera: &CameraSnapshot, light: &LightSnapshot) -> TrackerState {
        if let Some((previous_camera, previous_light)) = &self.previous {
            let camera_changed = previous_camera != camera;
            let light_changed = previous_light != light;
            if camera_changed || light_changed {
                tracing::debug!(camera_changed, light_changed, "accumulation invalidated");
                self.state = TrackerState::ResetPending;
            }
        }
        self.previous = Some((*camera, *light));
        self.state
    }

    /// Force a reset on the next consumption, e.g. after the scene was rebuilt.
    pub fn invalidate(&mut self) {
        self.state = TrackerState::ResetPending;
    }

    /// Consume a pending reset, returning to `Converging`.
    pub fn take_reset(&mut self) -> bool {
        std::mem::take(&mut self.state) == TrackerState::ResetPending
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }
}
