use glam::Vec4;
use progressive_tracer_lib::{
    accumulation::AccumulationBuffer,
    frame::{FrameBackend, FrameDriver, FrameOutcome, ResizePolicy, SceneContext, TargetStatus},
    invalidation::{CameraSnapshot, LightSnapshot},
    kernel::{DispatchGrid, KernelUniforms},
    renderer::{encode_spheres, GPU_SPHERE_SIZE},
    scene::{Scene, SceneBuilder, Sphere},
};
use rand::{rngs::SmallRng, SeedableRng};

/// CPU stand-in for the GPU: the "kernel" writes a deterministic image per
/// dispatch and the blend runs through [`AccumulationBuffer`].
struct CpuBackend {
    width: u32,
    height: u32,
    accumulation: Option<AccumulationBuffer>,
    result: Vec<Vec4>,
    dispatches: u32,
    outputs: Vec<Vec<Vec4>>,
    last_jitter: Option<[f32; 2]>,
}

impl CpuBackend {
    fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            accumulation: None,
            result: Vec::new(),
            dispatches: 0,
            outputs: Vec::new(),
            last_jitter: None,
        }
    }

    fn presented(&self) -> &[Vec4] {
        self.accumulation.as_ref().map(|a| a.pixels()).unwrap_or(&[])
    }
}

impl FrameBackend for CpuBackend {
    fn ensure_target(&mut self, width: u32, height: u32) -> TargetStatus {
        if width == 0 || height == 0 {
            return TargetStatus::Unavailable;
        }
        if self.accumulation.is_some() && (self.width, self.height) == (width, height) {
            return TargetStatus::Ready;
        }
        self.width = width;
        self.height = height;
        self.accumulation = Some(AccumulationBuffer::new(width, height));
        TargetStatus::Recreated
    }

    fn kernel_ready(&self) -> bool {
        true
    }

    fn write_parameters(&mut self, uniforms: &KernelUniforms) {
        self.last_jitter = Some(uniforms.pixel_offset);
    }

    fn dispatch(&mut self, grid: DispatchGrid) {
        assert_eq!(grid, DispatchGrid::covering(self.width, self.height));
        let n = self.dispatches as f32;
        let jitter = self.last_jitter.unwrap_or_default();
        self.result = (0..self.width * self.height)
            .map(|px| Vec4::new(n, px as f32 + jitter[0], (n * 0.37).sin() + jitter[1], 1.0))
            .collect();
        self.outputs.push(self.result.clone());
        self.dispatches += 1;
    }

    fn blend(&mut self, sample_index: u64) {
        if let Some(accumulation) = self.accumulation.as_mut() {
            accumulation
                .blend(&self.result, sample_index)
                .expect("sample matches target size");
        }
    }
}

struct StillView {
    camera: CameraSnapshot,
    light: LightSnapshot,
}

impl SceneContext for StillView {
    fn camera(&self) -> CameraSnapshot {
        self.camera
    }

    fn light(&self) -> LightSnapshot {
        self.light
    }
}

fn still_view() -> StillView {
    StillView {
        camera: CameraSnapshot {
            camera_to_world: glam::Mat4::from_translation(glam::Vec3::new(0.0, 5.0, 20.0)),
            inverse_projection: glam::Mat4::perspective_rh(1.0, 1.5, 0.3, 1000.0).inverse(),
        },
        light: LightSnapshot {
            direction: glam::Vec3::new(0.3, -0.8, 0.5).normalize(),
            intensity: 1.2,
        },
    }
}

#[test]
fn single_sphere_rests_inside_placement_disk() {
    for seed in 0..16 {
        let scene = SceneBuilder::new(1, 3.0..=3.0, 100.0).build(&mut SmallRng::seed_from_u64(seed));

        assert_eq!(scene.len(), 1);
        let sphere = scene.spheres[0];
        assert_eq!(sphere.radius, 3.0);
        assert_eq!(sphere.position.y, 3.0);
        let ground = glam::Vec2::new(sphere.position.x, sphere.position.z);
        assert!(ground.length() <= 100.0);
    }
}

#[test]
fn ten_still_frames_converge_to_the_mean() {
    let mut driver = FrameDriver::new(SmallRng::seed_from_u64(17), ResizePolicy::Reset);
    let mut backend = CpuBackend::new();
    let view = still_view();

    let indices: Vec<u64> = (0..10)
        .map(|_| match driver.frame(&mut backend, &view, 5, 3) {
            FrameOutcome::Rendered { sample_index } => sample_index,
            skipped => panic!("unexpected {skipped:?}"),
        })
        .collect();
    assert_eq!(indices, (0..10).collect::<Vec<u64>>());
    assert_eq!(driver.state().sample_index, 10);

    assert_eq!(backend.outputs.len(), 10);
    for (px, presented) in backend.presented().iter().enumerate() {
        let mean = backend.outputs.iter().map(|o| o[px]).sum::<Vec4>() / 10.0;
        assert!(presented.abs_diff_eq(mean, 1e-4), "pixel {px}: {presented:?} != {mean:?}");
    }
}

#[test]
fn light_change_mid_run_restarts_the_mean() {
    let mut driver = FrameDriver::new(SmallRng::seed_from_u64(2), ResizePolicy::Reset);
    let mut backend = CpuBackend::new();
    let mut view = still_view();

    for _ in 0..4 {
        driver.frame(&mut backend, &view, 4, 4);
    }
    view.light.intensity = 0.2;
    assert_eq!(
        driver.frame(&mut backend, &view, 4, 4),
        FrameOutcome::Rendered { sample_index: 0 }
    );
    // only the post-change sample contributes
    assert_eq!(backend.presented(), backend.outputs[4].as_slice());
}

#[test]
fn serialized_records_follow_field_order() {
    let scene = Scene {
        spheres: vec![
            Sphere::dielectric(
                glam::Vec3::new(1.0, 2.0, 3.0),
                2.0,
                glam::Vec3::new(0.1, 0.2, 0.3),
            ),
            Sphere::metal(
                glam::Vec3::new(-4.0, 5.5, 6.0),
                5.5,
                glam::Vec3::new(0.7, 0.8, 0.9),
            ),
        ],
    };

    let records = encode_spheres(&scene);
    let bytes: &[u8] = bytemuck::cast_slice(&records);
    assert_eq!(GPU_SPHERE_SIZE, 40);
    assert_eq!(bytes.len(), 80);

    let floats: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    #[rustfmt::skip]
    let expected = [
        // position          radius  albedo           specular
        1.0, 2.0, 3.0,       2.0,    0.1, 0.2, 0.3,   0.04, 0.04, 0.04,
        -4.0, 5.5, 6.0,      5.5,    0.0, 0.0, 0.0,   0.7, 0.8, 0.9,
    ];
    assert_eq!(floats, expected);

    // radius of the second record sits at byte 40 + 12
    assert_eq!(&bytes[52..56], &5.5f32.to_ne_bytes());
}
