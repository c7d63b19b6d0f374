pub mod controller;
pub mod raycast;
pub mod velocity;

use crate::assets::AssetRegistry;
use crate::config::{GameConfig, VehicleConfig};
use crate::gameplay::input::ControlState;
use crate::states::GameState;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use controller::{
    is_front_wheel, DriveTuning, SpawnPose, VehicleActuation, VehicleController,
};
use raycast::{step_raycast_vehicles, RaycastVehicle, VehicleBodyMut};
use std::f32::consts::FRAC_PI_2;
use velocity::{VelocityFeed, VelocitySample};

const GROUND_THICKNESS_M: f32 = 0.1;
const WHEEL_WIDTH_FACTOR: f32 = 0.6;

pub struct VehicleGameplayPlugin;

impl Plugin for VehicleGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<VehicleTelemetry>()
            .add_systems(
                OnEnter(GameState::InRun),
                (spawn_vehicle_scene, sync_rapier_gravity_from_config),
            )
            .add_systems(OnExit(GameState::InRun), cleanup_vehicle_scene)
            .add_systems(
                Update,
                sync_fixed_timestep_from_config.run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                FixedUpdate,
                (drive_vehicles, step_raycast_vehicles)
                    .chain()
                    .run_if(in_state(GameState::InRun)),
            )
            .add_systems(
                FixedPostUpdate,
                publish_chassis_velocity
                    .after(PhysicsSet::Writeback)
                    .run_if(in_state(GameState::InRun)),
            )
            .add_systems(
                Update,
                (
                    sync_rapier_gravity_from_config,
                    sync_controller_tuning,
                    spin_wheel_visuals,
                    update_vehicle_telemetry,
                )
                    .chain()
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
pub struct PlayerVehicle;

#[derive(Component, Debug, Clone)]
pub struct DrivenVehicle {
    pub controller: VehicleController,
}

#[derive(Component)]
struct VehicleSceneEntity;

#[derive(Component, Debug, Clone, Copy)]
struct WheelVisual {
    index: usize,
    spin_angle_rad: f32,
}

#[derive(Resource, Debug, Clone, Default)]
pub struct VehicleTelemetry {
    pub velocity: VelocitySample,
    pub speed_mps: f32,
    pub actuation: VehicleActuation,
    pub grounded_wheels: usize,
    pub reset_count: u32,
}

fn spawn_vehicle_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    config: Res<GameConfig>,
    registry: Option<Res<AssetRegistry>>,
    existing_player: Query<Entity, With<PlayerVehicle>>,
) {
    if !existing_player.is_empty() {
        return;
    }
    let Some(vehicle) = config.default_vehicle() else {
        warn!(
            "Default vehicle `{}` missing from config; nothing to spawn.",
            config.game.app.default_vehicle
        );
        return;
    };

    let ground_half = config.game.physics.ground_half_extent_m.max(1.0);
    commands.spawn((
        Name::new("Ground"),
        VehicleSceneEntity,
        RigidBody::Fixed,
        Collider::cuboid(ground_half, GROUND_THICKNESS_M * 0.5, ground_half),
        Mesh3d(meshes.add(Cuboid::new(
            ground_half * 2.0,
            GROUND_THICKNESS_M,
            ground_half * 2.0,
        ))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.32, 0.36, 0.30),
            perceptual_roughness: 0.95,
            ..default()
        })),
        Transform::from_xyz(0.0, -GROUND_THICKNESS_M * 0.5, 0.0),
    ));

    commands.spawn((
        Name::new("SunLight"),
        VehicleSceneEntity,
        DirectionalLight {
            illuminance: 9_000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(4.0, 8.0, 3.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    let track_scene = config
        .game
        .physics
        .track_model_asset_id
        .as_deref()
        .and_then(|id| registry.as_ref().and_then(|registry| registry.model_handle(id)));
    if let Some(track_scene) = track_scene {
        commands.spawn((
            Name::new("TrackModel"),
            VehicleSceneEntity,
            SceneRoot(track_scene),
            Transform::default(),
        ));
    }

    let spawn = SpawnPose::from_vehicle_config(vehicle);
    let raycast_vehicle = RaycastVehicle::from_vehicle_config(vehicle);
    let wheel_rest = raycast_vehicle
        .wheels
        .map(|wheel| wheel.hardpoint_local - Vec3::Y * wheel.spring_length_m);
    let [half_width, half_height, half_length] = vehicle.chassis_half_extents_m;

    let body_scene = vehicle
        .model_asset_id
        .as_deref()
        .and_then(|id| registry.as_ref().and_then(|registry| registry.model_handle(id)));
    let body_mesh = meshes.add(Cuboid::new(
        half_width * 2.0,
        half_height * 2.0,
        half_length * 2.0,
    ));
    let body_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.8, 0.2, 0.2),
        metallic: 0.6,
        perceptual_roughness: 0.35,
        ..default()
    });
    let wheel_mesh = meshes.add(Cylinder::new(
        vehicle.wheel_radius_m,
        vehicle.wheel_radius_m * WHEEL_WIDTH_FACTOR,
    ));
    let wheel_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.1, 0.1, 0.1),
        perceptual_roughness: 0.8,
        ..default()
    });

    commands
        .spawn((
            Name::new("PlayerVehicle"),
            PlayerVehicle,
            VehicleSceneEntity,
            RigidBody::Dynamic,
            Collider::cuboid(half_width, half_height, half_length),
            ColliderMassProperties::Mass(vehicle.mass_kg),
            Velocity::zero(),
            ExternalForce::default(),
            Sleeping::disabled(),
            Ccd::enabled(),
            spawn.transform(),
            Visibility::default(),
        ))
        .insert((
            raycast_vehicle,
            VelocityFeed::default(),
            DrivenVehicle {
                controller: VehicleController::new(
                    DriveTuning::from_vehicle_config(vehicle),
                    spawn,
                ),
            },
        ))
        .with_children(|parent| {
            match body_scene {
                Some(scene) => {
                    parent.spawn((
                        Name::new("VehicleModel"),
                        SceneRoot(scene),
                        model_transform(vehicle),
                    ));
                }
                None => {
                    parent.spawn((
                        Name::new("VehicleBodyPlaceholder"),
                        Mesh3d(body_mesh),
                        MeshMaterial3d(body_material),
                        Transform::default(),
                    ));
                }
            }

            for (index, rest_position) in wheel_rest.into_iter().enumerate() {
                parent.spawn((
                    Name::new(format!("Wheel{index}")),
                    WheelVisual {
                        index,
                        spin_angle_rad: 0.0,
                    },
                    Mesh3d(wheel_mesh.clone()),
                    MeshMaterial3d(wheel_material.clone()),
                    Transform::from_translation(rest_position)
                        .with_rotation(wheel_visual_rotation(0.0, 0.0)),
                ));
            }
        });

    info!(
        "Spawned vehicle `{}` at {:?}; WASD/arrows drive, R resets, C toggles camera.",
        vehicle.id, spawn.position
    );
}

fn model_transform(vehicle: &VehicleConfig) -> Transform {
    Transform::from_translation(Vec3::from_array(vehicle.model_offset))
        .with_rotation(Quat::from_rotation_y(vehicle.model_yaw_degrees.to_radians()))
        .with_scale(Vec3::splat(vehicle.model_scale.max(0.000_1)))
}

/// Steering yaw, then rolling about the axle, applied to a cylinder laid on its side.
fn wheel_visual_rotation(steering_rad: f32, spin_angle_rad: f32) -> Quat {
    Quat::from_rotation_y(-steering_rad)
        * Quat::from_rotation_x(spin_angle_rad)
        * Quat::from_rotation_z(FRAC_PI_2)
}

fn cleanup_vehicle_scene(
    mut commands: Commands,
    scene_query: Query<Entity, With<VehicleSceneEntity>>,
    mut telemetry: ResMut<VehicleTelemetry>,
) {
    for entity in &scene_query {
        commands.entity(entity).try_despawn();
    }
    *telemetry = VehicleTelemetry::default();
}

fn sync_rapier_gravity_from_config(
    config: Res<GameConfig>,
    mut rapier_config_query: Query<&mut RapierConfiguration, With<DefaultRapierContext>>,
) {
    if !config.is_changed() {
        return;
    }
    let Ok(mut rapier_config) = rapier_config_query.single_mut() else {
        return;
    };
    rapier_config.gravity = Vec3::from_array(config.game.physics.gravity);
}

fn sync_fixed_timestep_from_config(config: Res<GameConfig>, mut fixed_time: ResMut<Time<Fixed>>) {
    if !config.is_changed() {
        return;
    }
    let hz = f64::from(config.game.app.fixed_timestep_hz.max(1.0));
    fixed_time.set_timestep_hz(hz);
}

fn sync_controller_tuning(
    config: Res<GameConfig>,
    mut vehicle_query: Query<(&mut DrivenVehicle, &mut RaycastVehicle), With<PlayerVehicle>>,
) {
    if !config.is_changed() {
        return;
    }
    let Some(vehicle) = config.default_vehicle() else {
        return;
    };
    let Ok((mut driven, mut raycast_vehicle)) = vehicle_query.single_mut() else {
        return;
    };

    driven
        .controller
        .set_tuning(DriveTuning::from_vehicle_config(vehicle));
    driven
        .controller
        .set_spawn(SpawnPose::from_vehicle_config(vehicle));
    raycast_vehicle.params = raycast::SuspensionParams::from_vehicle_config(vehicle);
}

fn drive_vehicles(
    controls: Res<ControlState>,
    mut vehicle_query: Query<(
        &mut DrivenVehicle,
        &mut RaycastVehicle,
        &mut Transform,
        &mut Velocity,
    )>,
) {
    for (mut driven, mut raycast_vehicle, mut transform, mut velocity) in &mut vehicle_query {
        let resets_before = driven.controller.reset_count();
        let mut body = VehicleBodyMut {
            vehicle: &mut *raycast_vehicle,
            transform: &mut *transform,
            velocity: &mut *velocity,
        };
        driven.controller.tick(&controls, &mut body);

        if driven.controller.reset_count() != resets_before {
            info!("Vehicle reset to spawn pose.");
        }
    }
}

fn publish_chassis_velocity(vehicle_query: Query<(&Velocity, &VelocityFeed)>) {
    for (velocity, feed) in &vehicle_query {
        feed.publish(VelocitySample(velocity.linvel));
    }
}

fn spin_wheel_visuals(
    time: Res<Time>,
    vehicle_query: Query<(&RaycastVehicle, &Children), With<PlayerVehicle>>,
    mut wheel_query: Query<(&mut WheelVisual, &mut Transform)>,
) {
    let Ok((raycast_vehicle, children)) = vehicle_query.single() else {
        return;
    };

    let dt = time.delta_secs();
    for child in children.iter() {
        let Ok((mut wheel, mut transform)) = wheel_query.get_mut(child) else {
            continue;
        };
        let Some(state) = raycast_vehicle.wheels.get(wheel.index) else {
            continue;
        };

        wheel.spin_angle_rad =
            (wheel.spin_angle_rad - state.spin_rate_rad_s * dt).rem_euclid(std::f32::consts::TAU);
        let steering = if is_front_wheel(wheel.index) {
            state.steering_rad
        } else {
            0.0
        };

        transform.translation = state.hardpoint_local - Vec3::Y * state.spring_length_m;
        transform.rotation = wheel_visual_rotation(steering, wheel.spin_angle_rad);
    }
}

fn update_vehicle_telemetry(
    mut telemetry: ResMut<VehicleTelemetry>,
    vehicle_query: Query<(&Velocity, &DrivenVehicle, &RaycastVehicle), With<PlayerVehicle>>,
) {
    let Ok((velocity, driven, raycast_vehicle)) = vehicle_query.single() else {
        return;
    };

    let sample = VelocitySample(velocity.linvel);
    telemetry.velocity = sample;
    telemetry.speed_mps = sample.horizontal_speed();
    telemetry.actuation = driven.controller.last_actuation();
    telemetry.grounded_wheels = raycast_vehicle.grounded_wheel_count();
    telemetry.reset_count = driven.controller.reset_count();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_velocity_is_the_rigid_body_velocity() {
        let mut app = App::new();
        app.add_systems(Update, publish_chassis_velocity);
        let feed = VelocityFeed::default();
        let subscription = feed.subscribe();
        app.world_mut()
            .spawn((Velocity::linear(Vec3::new(0.0, -0.5, -2.0)), feed));

        app.update();

        assert_eq!(subscription.latest().0, Vec3::new(0.0, -0.5, -2.0));
        assert_eq!(subscription.latest().horizontal_speed(), 2.0);
    }

    #[test]
    fn wheel_visual_rotation_lays_cylinder_axis_along_x() {
        let axle = wheel_visual_rotation(0.0, 0.0) * Vec3::Y;
        assert!(axle.x.abs() > 0.999);

        let spun_axle = wheel_visual_rotation(0.0, 1.2) * Vec3::Y;
        assert!(spun_axle.x.abs() > 0.999);
    }

    #[test]
    fn positive_steering_turns_the_axle_right() {
        let straight_forward = wheel_visual_rotation(0.0, 0.0) * Vec3::NEG_Z;
        let steered_forward = wheel_visual_rotation(0.3, 0.0) * Vec3::NEG_Z;

        assert!(straight_forward.x.abs() < 1e-5);
        assert!(steered_forward.x > 0.0);
    }
}
