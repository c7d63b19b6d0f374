pub mod controller;
pub mod orbit;

use crate::config::{CameraConfig, GameConfig};
use crate::gameplay::input::ControlState;
use crate::gameplay::vehicle::PlayerVehicle;
use crate::states::GameState;
use crate::web::{hit_test, TouchControlState, WebRuntimeState};
use bevy::input::mouse::{MouseMotion, MouseWheel};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_egui::EguiContexts;
use controller::{CameraController, CameraMode, CameraTransition, ChaseTuning};
use orbit::{scroll_lines, OrbitControls};

pub struct CameraGameplayPlugin;

impl Plugin for CameraGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ChaseCamera>()
            .add_systems(OnEnter(GameState::InRun), reset_camera_controllers)
            .add_systems(OnExit(GameState::InRun), reset_camera_controllers)
            .add_systems(
                Update,
                sync_camera_tuning_from_config.run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                Update,
                (observe_camera_toggle, drive_orbit_controls, apply_camera_pose)
                    .chain()
                    .run_if(in_state(GameState::InRun)),
            );
    }
}

#[derive(Resource, Debug, Clone)]
pub struct ChaseCamera {
    controller: CameraController,
}

impl Default for ChaseCamera {
    fn default() -> Self {
        Self {
            controller: CameraController::new(ChaseTuning::default()),
        }
    }
}

impl ChaseCamera {
    pub fn mode(&self) -> CameraMode {
        self.controller.mode()
    }
}

fn reset_camera_controllers(
    config: Option<Res<GameConfig>>,
    mut chase_camera: ResMut<ChaseCamera>,
    mut orbit_query: Query<&mut OrbitControls>,
) {
    let tuning = config
        .map(|config| ChaseTuning::from_camera_config(&config.game.camera))
        .unwrap_or_default();
    chase_camera.controller = CameraController::new(tuning);

    for mut orbit in &mut orbit_query {
        orbit.rehome();
    }
}

fn sync_camera_tuning_from_config(
    config: Res<GameConfig>,
    mut applied: Local<Option<CameraConfig>>,
    mut chase_camera: ResMut<ChaseCamera>,
    mut camera_query: Query<(&mut OrbitControls, &mut Projection), With<Camera3d>>,
) {
    if !config.is_changed() {
        return;
    }

    // Vehicle tuning edits also mark the config changed; leave the user's view alone.
    let camera = &config.game.camera;
    if !take_camera_config_change(&mut applied, camera) {
        return;
    }

    chase_camera
        .controller
        .set_tuning(ChaseTuning::from_camera_config(camera));

    for (mut orbit, mut projection) in &mut camera_query {
        *orbit = OrbitControls::from_camera_config(camera);
        if let Projection::Perspective(perspective) = &mut *projection {
            perspective.fov = camera.fov_degrees.to_radians();
        }
    }
}

fn take_camera_config_change(applied: &mut Option<CameraConfig>, camera: &CameraConfig) -> bool {
    if applied.as_ref() == Some(camera) {
        return false;
    }
    *applied = Some(camera.clone());
    true
}

fn observe_camera_toggle(
    controls: Res<ControlState>,
    mut chase_camera: ResMut<ChaseCamera>,
    mut orbit_query: Query<&mut OrbitControls>,
) {
    let Some(transition) = chase_camera.controller.observe_toggle(&controls) else {
        return;
    };

    if transition == CameraTransition::ReturnedToOrbit {
        for mut orbit in &mut orbit_query {
            orbit.rehome();
        }
    }
    info!("Camera mode: {}.", chase_camera.mode().label());
}

#[allow(clippy::too_many_arguments)]
fn drive_orbit_controls(
    chase_camera: Res<ChaseCamera>,
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    touches: Res<Touches>,
    touch_controls: Res<TouchControlState>,
    web_runtime: Res<WebRuntimeState>,
    mut egui_contexts: EguiContexts,
    mut mouse_motion: MessageReader<MouseMotion>,
    mut mouse_wheel: MessageReader<MouseWheel>,
    window_query: Query<&Window, With<PrimaryWindow>>,
    mut orbit_query: Query<&mut OrbitControls>,
) {
    let Ok(mut orbit) = orbit_query.single_mut() else {
        mouse_motion.clear();
        mouse_wheel.clear();
        return;
    };
    if chase_camera.mode() != CameraMode::Orbit {
        mouse_motion.clear();
        mouse_wheel.clear();
        return;
    }

    let pointer_over_egui = egui_contexts
        .ctx_mut()
        .map(|ctx| ctx.wants_pointer_input() || ctx.is_pointer_over_area())
        .unwrap_or(false);

    let lines: f32 = mouse_wheel.read().map(scroll_lines).sum();
    if lines != 0.0 && !pointer_over_egui {
        orbit.zoom(lines);
    }

    let mouse_drag: Vec2 = mouse_motion.read().map(|motion| motion.delta).sum();
    if mouse_drag_rotates_orbit(
        mouse_buttons.pressed(MouseButton::Left),
        touch_controls.mouse_captured_by_button,
        pointer_over_egui,
    ) {
        orbit.rotate(mouse_drag);
    }

    let window_size = window_query.single().map(Window::size).ok();
    let buttons_visible = web_runtime.touch_controls_visible();
    let mut free_touches = touches.iter().filter(|touch| {
        !buttons_visible
            || window_size
                .and_then(|size| hit_test(size, touch.start_position()))
                .is_none()
    });
    if let (Some(touch), None) = (free_touches.next(), free_touches.next()) {
        orbit.rotate(touch.delta());
    }
}

fn mouse_drag_rotates_orbit(
    left_pressed: bool,
    captured_by_button: bool,
    pointer_over_egui: bool,
) -> bool {
    left_pressed && !captured_by_button && !pointer_over_egui
}

fn apply_camera_pose(
    mut chase_camera: ResMut<ChaseCamera>,
    player_query: Query<&Transform, (With<PlayerVehicle>, Without<Camera3d>)>,
    mut camera_query: Query<(&mut Transform, &OrbitControls), With<Camera3d>>,
) {
    let Ok((mut camera_transform, orbit)) = camera_query.single_mut() else {
        return;
    };

    let chase_pose = player_query
        .single()
        .ok()
        .and_then(|body| chase_camera.controller.render_tick(body));
    let pose = match (chase_camera.mode(), chase_pose) {
        (CameraMode::Chase, Some(pose)) => pose,
        (CameraMode::Chase, None) => return,
        (CameraMode::Orbit, _) => orbit.pose(),
    };

    *camera_transform = pose.to_transform();
}
