use crate::config::CameraConfig;
use crate::gameplay::input::{ControlState, RisingEdge};
use bevy::prelude::*;

const LOOK_AT_EPSILON_M: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraMode {
    #[default]
    Orbit,
    Chase,
}

impl CameraMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Orbit => Self::Chase,
            Self::Chase => Self::Orbit,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Orbit => "orbit",
            Self::Chase => "chase",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraTransition {
    EnteredChase,
    ReturnedToOrbit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChaseTuning {
    pub follow_distance: f32,
    pub height: f32,
    pub entry_perturbation: f32,
}

impl Default for ChaseTuning {
    fn default() -> Self {
        Self {
            follow_distance: 1.0,
            height: 0.3,
            entry_perturbation: 0.01,
        }
    }
}

impl ChaseTuning {
    pub fn from_camera_config(camera: &CameraConfig) -> Self {
        Self {
            follow_distance: camera.chase_follow_distance_m.max(0.0),
            height: camera.chase_height_m,
            entry_perturbation: camera.chase_entry_perturbation_m.max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
}

impl CameraPose {
    /// Never degenerate: an eye sitting on its target is pushed out along +Z first.
    pub fn to_transform(&self) -> Transform {
        let mut eye = self.position;
        if eye.distance_squared(self.target) < LOOK_AT_EPSILON_M * LOOK_AT_EPSILON_M {
            eye = self.target + Vec3::Z * LOOK_AT_EPSILON_M * 10.0;
        }

        let forward = (self.target - eye).normalize_or_zero();
        let up = if forward.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        Transform::from_translation(eye).looking_at(self.target, up)
    }
}

/// Camera placed behind and above the body; the body drives toward its local -Z.
pub fn chase_pose(body: &Transform, tuning: &ChaseTuning) -> CameraPose {
    let behind = (body.rotation * Vec3::Z).normalize_or_zero();
    CameraPose {
        position: body.translation + behind * tuning.follow_distance + Vec3::Y * tuning.height,
        target: body.translation,
    }
}

#[derive(Debug, Clone)]
pub struct CameraController {
    mode: CameraMode,
    tuning: ChaseTuning,
    toggle_edge: RisingEdge,
    chase_entries: u32,
    pending_perturbation: Option<Vec3>,
    perturbation_seed: u64,
}

impl CameraController {
    pub fn new(tuning: ChaseTuning) -> Self {
        Self {
            mode: CameraMode::Orbit,
            tuning,
            toggle_edge: RisingEdge::default(),
            chase_entries: 0,
            pending_perturbation: None,
            perturbation_seed: 0x2F6B_91C4_0DA7_5E13,
        }
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn set_tuning(&mut self, tuning: ChaseTuning) {
        self.tuning = tuning;
    }

    pub fn observe_toggle(&mut self, controls: &ControlState) -> Option<CameraTransition> {
        if !self.toggle_edge.update(controls.camera_toggle) {
            return None;
        }

        self.mode = self.mode.toggled();
        match self.mode {
            CameraMode::Chase => {
                self.chase_entries = self.chase_entries.saturating_add(1);
                // Entries after the first start from a slightly nudged pose, never less
                // than half the configured magnitude.
                let magnitude = self.tuning.entry_perturbation;
                let seed = &mut self.perturbation_seed;
                self.pending_perturbation = (self.chase_entries > 1)
                    .then(|| Vec3::Z * magnitude * (0.5 + 0.5 * next_unit_random(seed)));
                Some(CameraTransition::EnteredChase)
            }
            CameraMode::Orbit => {
                self.pending_perturbation = None;
                Some(CameraTransition::ReturnedToOrbit)
            }
        }
    }

    /// Pose for this frame, or `None` while the orbit controls own the camera.
    pub fn render_tick(&mut self, body: &Transform) -> Option<CameraPose> {
        if self.mode != CameraMode::Chase {
            return None;
        }

        let mut pose = chase_pose(body, &self.tuning);
        if let Some(offset) = self.pending_perturbation.take() {
            pose.position += offset;
        }
        Some(pose)
    }
}

fn next_unit_random(seed: &mut u64) -> f32 {
    *seed = seed
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    ((*seed >> 32) as u32) as f32 / u32::MAX as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toggle_pressed() -> ControlState {
        ControlState {
            camera_toggle: true,
            ..default()
        }
    }

    fn press_toggle(controller: &mut CameraController) -> Option<CameraTransition> {
        let transition = controller.observe_toggle(&toggle_pressed());
        controller.observe_toggle(&ControlState::default());
        transition
    }

    #[test]
    fn starts_in_orbit_without_a_pose() {
        let mut controller = CameraController::new(ChaseTuning::default());

        assert_eq!(controller.mode(), CameraMode::Orbit);
        assert!(controller.render_tick(&Transform::default()).is_none());
    }

    #[test]
    fn two_toggle_edges_restore_the_original_mode() {
        let mut controller = CameraController::new(ChaseTuning::default());

        assert_eq!(press_toggle(&mut controller), Some(CameraTransition::EnteredChase));
        assert_eq!(controller.mode(), CameraMode::Chase);
        assert_eq!(press_toggle(&mut controller), Some(CameraTransition::ReturnedToOrbit));
        assert_eq!(controller.mode(), CameraMode::Orbit);
    }

    #[test]
    fn held_toggle_flips_only_once() {
        let mut controller = CameraController::new(ChaseTuning::default());

        controller.observe_toggle(&toggle_pressed());
        controller.observe_toggle(&toggle_pressed());
        controller.observe_toggle(&toggle_pressed());

        assert_eq!(controller.mode(), CameraMode::Chase);
    }

    #[test]
    fn chase_pose_sits_behind_and_above_the_body() {
        let body = Transform::from_xyz(1.0, 0.5, 2.0);
        let pose = chase_pose(&body, &ChaseTuning::default());

        assert!((pose.position - Vec3::new(1.0, 0.8, 3.0)).length() < 1e-6);
        assert_eq!(pose.target, body.translation);
    }

    #[test]
    fn chase_pose_follows_body_yaw() {
        let body = Transform::from_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let pose = chase_pose(&body, &ChaseTuning::default());

        assert!((pose.position - Vec3::new(1.0, 0.3, 0.0)).length() < 1e-5);
    }

    #[test]
    fn first_chase_entry_is_exact_and_later_entries_are_perturbed() {
        let body = Transform::from_xyz(0.0, 0.0, 0.0);
        let tuning = ChaseTuning::default();
        let mut controller = CameraController::new(tuning);
        let exact = chase_pose(&body, &tuning);

        press_toggle(&mut controller);
        assert_eq!(controller.render_tick(&body), Some(exact));

        press_toggle(&mut controller);
        press_toggle(&mut controller);
        let perturbed = controller
            .render_tick(&body)
            .expect("chase mode yields a pose");
        let offset = perturbed.position - exact.position;
        assert!(offset.z >= tuning.entry_perturbation * 0.5 - 1e-6);
        assert!(offset.z <= tuning.entry_perturbation + 1e-6);
        assert_eq!(offset.x, 0.0);
        assert_eq!(offset.y, 0.0);

        assert_eq!(controller.render_tick(&body), Some(exact));
    }

    #[test]
    fn every_later_chase_entry_moves_the_camera() {
        let body = Transform::from_xyz(3.0, 0.2, -1.0);
        let tuning = ChaseTuning {
            entry_perturbation: 0.05,
            ..default()
        };
        let mut controller = CameraController::new(tuning);
        let exact = chase_pose(&body, &tuning);

        press_toggle(&mut controller);
        controller.render_tick(&body);
        for _ in 0..32 {
            press_toggle(&mut controller);
            press_toggle(&mut controller);
            let pose = controller
                .render_tick(&body)
                .expect("chase mode yields a pose");
            assert!((pose.position - exact.position).length() > 0.0);
        }
    }

    #[test]
    fn coincident_eye_and_target_still_produce_a_finite_transform() {
        let pose = CameraPose {
            position: Vec3::new(2.0, 1.0, 0.0),
            target: Vec3::new(2.0, 1.0, 0.0),
        };

        let transform = pose.to_transform();
        assert!(transform.rotation.is_finite());
        assert!(transform.translation.z > 0.0);
    }

    #[test]
    fn looking_straight_down_does_not_degenerate() {
        let pose = CameraPose {
            position: Vec3::new(0.0, 5.0, 0.0),
            target: Vec3::ZERO,
        };

        let transform = pose.to_transform();
        assert!(transform.rotation.is_finite());
        assert!((transform.forward().as_vec3() - Vec3::NEG_Y).length() < 1e-4);
    }
}
