use super::controller::CameraPose;
use crate::config::CameraConfig;
use bevy::input::mouse::{MouseScrollUnit, MouseWheel};
use bevy::prelude::*;

const MAX_PITCH_RAD: f32 = 1.5;
const PIXEL_SCROLL_SCALE: f32 = 0.01;

/// Spherical camera around a fixed target, driven by drag and scroll while the chase
/// camera is inactive.
#[derive(Component, Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub yaw_rad: f32,
    pub pitch_rad: f32,
    pub distance: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    home: CameraPose,
}

impl OrbitControls {
    pub fn from_camera_config(camera: &CameraConfig) -> Self {
        let home = CameraPose {
            position: Vec3::from_array(camera.orbit_home_position),
            target: Vec3::from_array(camera.orbit_target),
        };
        let mut controls = Self {
            target: home.target,
            yaw_rad: 0.0,
            pitch_rad: 0.0,
            distance: 1.0,
            rotate_speed: camera.orbit_rotate_speed,
            zoom_speed: camera.orbit_zoom_speed,
            min_distance: camera.orbit_min_distance_m,
            max_distance: camera.orbit_max_distance_m,
            home,
        };
        controls.rehome();
        controls
    }

    pub fn home(&self) -> CameraPose {
        self.home
    }

    /// Back to the configured home pose.
    pub fn rehome(&mut self) {
        let offset = self.home.position - self.home.target;
        let distance = offset.length().max(f32::EPSILON);
        self.target = self.home.target;
        self.distance = distance;
        self.yaw_rad = offset.x.atan2(offset.z);
        self.pitch_rad = (offset.y / distance).clamp(-1.0, 1.0).asin();
    }

    pub fn rotate(&mut self, drag_pixels: Vec2) {
        self.yaw_rad -= drag_pixels.x * self.rotate_speed;
        self.pitch_rad =
            (self.pitch_rad + drag_pixels.y * self.rotate_speed).clamp(-MAX_PITCH_RAD, MAX_PITCH_RAD);
    }

    pub fn zoom(&mut self, scroll_lines: f32) {
        let factor = (1.0 - scroll_lines * self.zoom_speed).max(0.1);
        self.distance = (self.distance * factor).clamp(self.min_distance, self.max_distance);
    }

    pub fn eye(&self) -> Vec3 {
        let (sin_pitch, cos_pitch) = self.pitch_rad.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw_rad.sin_cos();
        self.target + Vec3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw) * self.distance
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            position: self.eye(),
            target: self.target,
        }
    }
}

pub fn scroll_lines(event: &MouseWheel) -> f32 {
    match event.unit {
        MouseScrollUnit::Line => event.y,
        MouseScrollUnit::Pixel => event.y * PIXEL_SCROLL_SCALE,
    }
}
