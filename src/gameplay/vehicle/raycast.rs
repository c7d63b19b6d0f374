use super::controller::{RaycastVehicleApi, SpawnPose, WHEEL_COUNT};
use crate::config::VehicleConfig;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

const GROUND_RAYCAST_EXTRA_M: f32 = 0.05;
const MIN_SUSPENSION_LENGTH_FACTOR: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspensionParams {
    pub mass_kg: f32,
    pub wheel_radius_m: f32,
    pub rest_length_m: f32,
    /// Spring rate per unit of chassis mass.
    pub stiffness: f32,
    pub damping: f32,
    pub max_force_n: f32,
    pub lateral_grip: f32,
    pub friction_slip: f32,
    pub roll_influence: f32,
}

impl SuspensionParams {
    pub fn from_vehicle_config(vehicle: &VehicleConfig) -> Self {
        Self {
            mass_kg: vehicle.mass_kg.max(0.01),
            wheel_radius_m: vehicle.wheel_radius_m.max(0.001),
            rest_length_m: vehicle.suspension_rest_length_m.max(0.001),
            stiffness: vehicle.suspension_stiffness.max(0.0),
            damping: vehicle.suspension_damping.max(0.0),
            max_force_n: vehicle.max_suspension_force_n.max(0.0),
            lateral_grip: vehicle.lateral_grip.clamp(0.0, 1.0),
            friction_slip: vehicle.friction_slip.max(0.0),
            roll_influence: vehicle.roll_influence.clamp(0.0, 1.0),
        }
    }

    fn min_length_m(&self) -> f32 {
        self.rest_length_m * MIN_SUSPENSION_LENGTH_FACTOR
    }

    /// Spring plus damper, scaled by chassis mass and never pulling the body down.
    pub fn support_force(&self, compression_m: f32, compression_velocity_mps: f32) -> f32 {
        let accel = compression_m * self.stiffness + compression_velocity_mps * self.damping;
        (accel * self.mass_kg).clamp(0.0, self.max_force_n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelState {
    pub hardpoint_local: Vec3,
    pub steering_rad: f32,
    pub engine_force: f32,
    pub brake_force: f32,
    pub spring_length_m: f32,
    pub compression_m: f32,
    pub grounded: bool,
    pub spin_rate_rad_s: f32,
}

impl WheelState {
    fn new(hardpoint_local: Vec3, rest_length_m: f32) -> Self {
        Self {
            hardpoint_local,
            steering_rad: 0.0,
            engine_force: 0.0,
            brake_force: 0.0,
            spring_length_m: rest_length_m,
            compression_m: 0.0,
            grounded: false,
            spin_rate_rad_s: 0.0,
        }
    }

    fn settle(&mut self, rest_length_m: f32) {
        self.spring_length_m = rest_length_m;
        self.compression_m = 0.0;
        self.grounded = false;
        self.spin_rate_rad_s = 0.0;
    }
}

/// Wheels are ordered front-left, front-right, rear-left, rear-right. The chassis
/// drives toward local -Z.
pub fn wheel_hardpoints(vehicle: &VehicleConfig) -> [Vec3; WHEEL_COUNT] {
    let [half_width, half_height, half_length] = vehicle.chassis_half_extents_m;
    let x = half_width * 2.0 * vehicle.wheel_track_factor;
    let y = half_height * 2.0 * vehicle.wheel_height_factor;
    let z = half_length;
    [
        Vec3::new(-x, y, -z),
        Vec3::new(x, y, -z),
        Vec3::new(-x, y, z),
        Vec3::new(x, y, z),
    ]
}

#[derive(Component, Debug, Clone)]
pub struct RaycastVehicle {
    pub params: SuspensionParams,
    pub wheels: [WheelState; WHEEL_COUNT],
    skip_force_pass: bool,
}

impl RaycastVehicle {
    pub fn from_vehicle_config(vehicle: &VehicleConfig) -> Self {
        let params = SuspensionParams::from_vehicle_config(vehicle);
        let wheels = wheel_hardpoints(vehicle).map(|hp| WheelState::new(hp, params.rest_length_m));
        Self {
            params,
            wheels,
            skip_force_pass: false,
        }
    }

    pub fn grounded_wheel_count(&self) -> usize {
        self.wheels.iter().filter(|wheel| wheel.grounded).count()
    }
}

/// Mutable view of one chassis, handed to the controller for a single tick.
pub struct VehicleBodyMut<'a> {
    pub vehicle: &'a mut RaycastVehicle,
    pub transform: &'a mut Transform,
    pub velocity: &'a mut Velocity,
}

impl RaycastVehicleApi for VehicleBodyMut<'_> {
    fn set_steering_value(&mut self, angle_rad: f32, wheel: usize) {
        if let Some(state) = self.vehicle.wheels.get_mut(wheel) {
            state.steering_rad = angle_rad;
        }
    }

    fn apply_engine_force(&mut self, force: f32, wheel: usize) {
        if let Some(state) = self.vehicle.wheels.get_mut(wheel) {
            state.engine_force = force;
        }
    }

    fn set_brake(&mut self, force: f32, wheel: usize) {
        if let Some(state) = self.vehicle.wheels.get_mut(wheel) {
            state.brake_force = force.max(0.0);
        }
    }

    fn teleport(&mut self, pose: &SpawnPose) {
        *self.transform = pose.transform();
        self.velocity.linvel = Vec3::ZERO;
        self.velocity.angvel = Vec3::ZERO;

        let rest_length_m = self.vehicle.params.rest_length_m;
        for wheel in &mut self.vehicle.wheels {
            wheel.settle(rest_length_m);
        }
        self.vehicle.skip_force_pass = true;
    }
}

/// Largest brake force that stops the wheel's share of the chassis within one step
/// without pushing it backwards.
pub fn limited_brake_force(
    brake_force: f32,
    forward_speed_mps: f32,
    mass_per_wheel_kg: f32,
    dt: f32,
) -> f32 {
    let stopping_force = forward_speed_mps.abs() * mass_per_wheel_kg / dt.max(0.000_1);
    -forward_speed_mps.signum() * brake_force.min(stopping_force)
}

fn velocity_at_point(velocity: &Velocity, center: Vec3, point: Vec3) -> Vec3 {
    velocity.linvel + velocity.angvel.cross(point - center)
}

pub(super) fn step_raycast_vehicles(
    time: Res<Time>,
    rapier_context: ReadRapierContext,
    mut vehicle_query: Query<(
        Entity,
        &Transform,
        &Velocity,
        &mut ExternalForce,
        &mut RaycastVehicle,
    )>,
) {
    let Ok(rapier_context) = rapier_context.single() else {
        return;
    };

    let dt = time.delta_secs().max(0.000_1);

    for (entity, transform, velocity, mut external_force, mut vehicle) in &mut vehicle_query {
        *external_force = ExternalForce::default();

        if vehicle.skip_force_pass {
            vehicle.skip_force_pass = false;
            continue;
        }

        let params = vehicle.params;
        let center = transform.translation;
        let up = transform.up().as_vec3();
        let down = -up;
        let mass_per_wheel = params.mass_kg / WHEEL_COUNT as f32;
        let max_length = params.rest_length_m;
        let min_length = params.min_length_m();
        let ray_length = max_length + params.wheel_radius_m + GROUND_RAYCAST_EXTRA_M;
        let filter = QueryFilter::only_fixed()
            .exclude_sensors()
            .exclude_rigid_body(entity);

        for wheel in &mut vehicle.wheels {
            let hardpoint_world = transform.transform_point(wheel.hardpoint_local);
            let hit = rapier_context.cast_ray_and_get_normal(
                hardpoint_world,
                down,
                ray_length,
                true,
                filter,
            );

            let Some((_, intersection)) = hit else {
                wheel.spring_length_m = max_length;
                wheel.compression_m = 0.0;
                wheel.grounded = false;
                continue;
            };

            let contact_length = (intersection.time_of_impact - params.wheel_radius_m).max(0.0);
            if contact_length > max_length {
                wheel.spring_length_m = max_length;
                wheel.compression_m = 0.0;
                wheel.grounded = false;
                continue;
            }

            let spring_length = contact_length.clamp(min_length, max_length);
            let compression = params.rest_length_m - spring_length;
            let compression_velocity = (compression - wheel.compression_m) / dt;
            let normal_alignment = intersection.normal.dot(up).clamp(0.0, 1.0);
            let support = params.support_force(compression, compression_velocity) * normal_alignment;

            wheel.spring_length_m = spring_length;
            wheel.compression_m = compression;
            wheel.grounded = true;

            let contact_point = hardpoint_world + down * (spring_length + params.wheel_radius_m);
            if support > f32::EPSILON {
                *external_force += ExternalForce::at_point(up * support, hardpoint_world, center);
            }

            // Positive steering turns the wheel right, i.e. clockwise seen from above.
            let wheel_rotation = transform.rotation * Quat::from_rotation_y(-wheel.steering_rad);
            let wheel_forward = wheel_rotation * Vec3::NEG_Z;
            let wheel_right = wheel_rotation * Vec3::X;

            let point_velocity = velocity_at_point(velocity, center, contact_point);
            let forward_speed = point_velocity.dot(wheel_forward);
            let lateral_speed = point_velocity.dot(wheel_right);
            wheel.spin_rate_rad_s = forward_speed / params.wheel_radius_m;

            let max_friction = params.friction_slip * support;
            let lateral_force = (-lateral_speed * params.lateral_grip * mass_per_wheel / dt)
                .clamp(-max_friction, max_friction);

            let mut longitudinal_force = wheel.engine_force;
            if wheel.brake_force > 0.0 {
                longitudinal_force +=
                    limited_brake_force(wheel.brake_force, forward_speed, mass_per_wheel, dt);
            }
            let longitudinal_force = longitudinal_force.clamp(-max_friction, max_friction);

            // Lateral force acts closer to the center of mass so the chassis rolls less.
            let lever = contact_point - center;
            let roll_point =
                center + lever - up * lever.dot(up) * (1.0 - params.roll_influence);

            if lateral_force.abs() > f32::EPSILON {
                *external_force +=
                    ExternalForce::at_point(wheel_right * lateral_force, roll_point, center);
            }
            if longitudinal_force.abs() > f32::EPSILON {
                *external_force +=
                    ExternalForce::at_point(wheel_forward * longitudinal_force, contact_point, center);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_vehicle;
    use crate::gameplay::vehicle::controller::{FRONT_LEFT, FRONT_RIGHT, REAR_LEFT, REAR_RIGHT};

    #[test]
    fn hardpoints_put_front_wheels_toward_negative_z() {
        let hardpoints = wheel_hardpoints(&sample_vehicle());

        assert!(hardpoints[FRONT_LEFT].z < 0.0);
        assert!(hardpoints[FRONT_RIGHT].z < 0.0);
        assert!(hardpoints[REAR_LEFT].z > 0.0);
        assert!(hardpoints[REAR_RIGHT].z > 0.0);
        assert!(hardpoints[FRONT_LEFT].x < 0.0);
        assert!(hardpoints[FRONT_RIGHT].x > 0.0);
        assert!((hardpoints[FRONT_RIGHT].x - 0.0975).abs() < 1e-6);
    }

    #[test]
    fn support_force_never_pulls_and_is_clamped() {
        let params = SuspensionParams::from_vehicle_config(&sample_vehicle());

        assert_eq!(params.support_force(0.0, -5.0), 0.0);
        let resting = params.support_force(0.01, 0.0);
        assert!((resting - 0.01 * 60.0 * 150.0).abs() < 1e-3);

        let clamped = SuspensionParams {
            max_force_n: 10.0,
            ..params
        };
        assert_eq!(clamped.support_force(0.05, 1.0), 10.0);
    }

    #[test]
    fn brake_force_opposes_motion_and_cannot_reverse_it() {
        let dt = 1.0 / 60.0;

        let strong = limited_brake_force(10_000.0, 0.6, 37.5, dt);
        assert!(strong < 0.0);
        assert!((strong + 0.6 * 37.5 / dt).abs() < 1e-2);

        let weak = limited_brake_force(5.0, -3.0, 37.5, dt);
        assert_eq!(weak, 5.0);

        assert_eq!(limited_brake_force(120.0, 0.0, 37.5, dt).abs(), 0.0);
    }

    #[test]
    fn teleport_zeroes_motion_and_skips_next_force_pass() {
        let vehicle_config = sample_vehicle();
        let mut vehicle = RaycastVehicle::from_vehicle_config(&vehicle_config);
        vehicle.wheels[REAR_LEFT].grounded = true;
        vehicle.wheels[REAR_LEFT].compression_m = 0.04;
        let mut transform = Transform::from_xyz(9.0, 1.0, -3.0);
        let mut velocity = Velocity {
            linvel: Vec3::new(2.0, 0.0, -6.0),
            angvel: Vec3::new(0.0, 1.5, 0.0),
        };

        let pose = SpawnPose::from_vehicle_config(&vehicle_config);
        VehicleBodyMut {
            vehicle: &mut vehicle,
            transform: &mut transform,
            velocity: &mut velocity,
        }
        .teleport(&pose);

        assert_eq!(transform.translation, Vec3::new(-1.5, 0.5, 3.0));
        assert_eq!(velocity.linvel, Vec3::ZERO);
        assert_eq!(velocity.angvel, Vec3::ZERO);
        assert!(vehicle.skip_force_pass);
        assert_eq!(vehicle.grounded_wheel_count(), 0);
        assert_eq!(vehicle.wheels[REAR_LEFT].compression_m, 0.0);
    }

    #[test]
    fn out_of_range_wheel_index_is_ignored() {
        let mut vehicle = RaycastVehicle::from_vehicle_config(&sample_vehicle());
        let mut transform = Transform::default();
        let mut velocity = Velocity::zero();
        let mut body = VehicleBodyMut {
            vehicle: &mut vehicle,
            transform: &mut transform,
            velocity: &mut velocity,
        };

        body.apply_engine_force(50.0, WHEEL_COUNT);
        body.set_brake(-3.0, FRONT_LEFT);

        assert!(vehicle.wheels.iter().all(|wheel| wheel.engine_force == 0.0));
        assert_eq!(vehicle.wheels[FRONT_LEFT].brake_force, 0.0);
    }
}
