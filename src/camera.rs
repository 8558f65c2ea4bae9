use winit::event::{ElementState, KeyboardInput, VirtualKeyCode, WindowEvent};

use crate::invalidation::{CameraSnapshot, LightSnapshot};
use crate::util::math::degree_to_radian;

/// Unit vector for a yaw (around +Y, 0 looks down -Z) and pitch (up positive).
fn forward_from(yaw: f32, pitch: f32) -> glam::Vec3 {
    glam::Vec3::new(
        pitch.cos() * yaw.sin(),
        pitch.sin(),
        -pitch.cos() * yaw.cos(),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub eye: glam::Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub up: glam::Vec3,
    pub aspect: f32,
    pub fov_y: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: glam::Vec3::new(0.0, 30.0, 120.0),
            yaw: 0.0,
            pitch: degree_to_radian(-15.0),
            up: glam::Vec3::Y,
            aspect: 16.0 / 9.0,
            fov_y: degree_to_radian(60.0),
            z_near: 0.3,
            z_far: 1000.0,
        }
    }
}

impl Camera {
    pub fn forward(&self) -> glam::Vec3 {
        forward_from(self.yaw, self.pitch)
    }

    pub fn view_matrix(&self) -> glam::Mat4 {
        glam::Mat4::look_to_rh(self.eye, self.forward(), self.up)
    }

    pub fn projection_matrix(&self) -> glam::Mat4 {
        // NOTE: glam's perspective_rh already maps depth to wgpu's [0, 1] range.
        glam::Mat4::perspective_rh(self.fov_y, self.aspect, self.z_near, self.z_far)
    }

    pub fn snapshot(&self) -> CameraSnapshot {
        CameraSnapshot {
            camera_to_world: self.view_matrix().inverse(),
            inverse_projection: self.projection_matrix().inverse(),
        }
    }
}

pub struct CameraController {
    pub speed: f32,
    pub turn_speed: f32,
}

impl CameraController {
    pub fn new(speed: f32) -> Self {
        Self {
            speed,
            turn_speed: degree_to_radian(2.0),
        }
    }

    pub fn process_events(&self, camera: &mut Camera, event: &WindowEvent) -> bool {
        let Some(keycode) = pressed_key(event) else {
            return false;
        };

        let forward = camera.forward();
        let right = forward.cross(camera.up).normalize_or_zero();
        match keycode {
            VirtualKeyCode::W => camera.eye += forward * self.speed,
            VirtualKeyCode::S => camera.eye -= forward * self.speed,
            VirtualKeyCode::D => camera.eye += right * self.speed,
            VirtualKeyCode::A => camera.eye -= right * self.speed,
            VirtualKeyCode::E => camera.eye += camera.up * self.speed,
            VirtualKeyCode::Q => camera.eye -= camera.up * self.speed,
            VirtualKeyCode::Left => camera.yaw -= self.turn_speed,
            VirtualKeyCode::Right => camera.yaw += self.turn_speed,
            VirtualKeyCode::Up => camera.pitch += self.turn_speed,
            VirtualKeyCode::Down => camera.pitch -= self.turn_speed,
            _ => return false,
        }
        // keep away from the poles where `up` and `forward` line up
        let limit = degree_to_radian(89.0);
        camera.pitch = camera.pitch.clamp(-limit, limit);
        tracing::trace!(eye = ?camera.eye, yaw = camera.yaw, pitch = camera.pitch, "camera moved");
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    pub yaw: f32,
    pub pitch: f32,
    pub intensity: f32,
}

impl DirectionalLight {
    pub fn new(intensity: f32) -> Self {
        Self {
            yaw: degree_to_radian(30.0),
            pitch: degree_to_radian(-50.0),
            intensity,
        }
    }

    pub fn direction(&self) -> glam::Vec3 {
        forward_from(self.yaw, self.pitch)
    }

    pub fn snapshot(&self) -> LightSnapshot {
        LightSnapshot {
            direction: self.direction(),
            intensity: self.intensity,
        }
    }
}

pub struct LightController {
    pub turn_speed: f32,
}

impl LightController {
    pub fn new() -> Self {
        Self {
            turn_speed: degree_to_radian(3.0),
        }
    }

    pub fn process_events(&self, light: &mut DirectionalLight, event: &WindowEvent) -> bool {
        match pressed_key(event) {
            Some(VirtualKeyCode::J) => light.yaw -= self.turn_speed,
            Some(VirtualKeyCode::L) => light.yaw += self.turn_speed,
            Some(VirtualKeyCode::I) => light.pitch += self.turn_speed,
            Some(VirtualKeyCode::K) => light.pitch -= self.turn_speed,
            _ => return false,
        }
        light.pitch = light.pitch.clamp(-std::f32::consts::FRAC_PI_2, 0.0);
        true
    }
}

impl Default for LightController {
    fn default() -> Self {
        Self::new()
    }
}

fn pressed_key(event: &WindowEvent) -> Option<VirtualKeyCode> {
    match event {
        WindowEvent::KeyboardInput {
            input:
                KeyboardInput {
                    state: ElementState::Pressed,
                    virtual_keycode: Some(keycode),
                    ..
                },
            ..
        } => Some(*keycode),
        _ => None,
    }
}
