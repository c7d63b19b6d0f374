use crate::config::VehicleConfig;
use crate::gameplay::input::{ControlState, RisingEdge};
use bevy::prelude::*;

pub const WHEEL_COUNT: usize = 4;
pub const FRONT_LEFT: usize = 0;
pub const FRONT_RIGHT: usize = 1;
pub const REAR_LEFT: usize = 2;
pub const REAR_RIGHT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveWheels {
    Front,
    Rear,
    All,
}

impl DriveWheels {
    pub fn from_config_name(name: &str) -> Self {
        match name {
            "front" => Self::Front,
            "all" => Self::All,
            _ => Self::Rear,
        }
    }

    pub fn drives(self, wheel: usize) -> bool {
        match self {
            Self::Front => wheel == FRONT_LEFT || wheel == FRONT_RIGHT,
            Self::Rear => wheel == REAR_LEFT || wheel == REAR_RIGHT,
            Self::All => wheel < WHEEL_COUNT,
        }
    }
}

pub fn is_front_wheel(wheel: usize) -> bool {
    wheel == FRONT_LEFT || wheel == FRONT_RIGHT
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveTuning {
    pub max_steer_angle_rad: f32,
    pub engine_force: f32,
    pub brake_force: f32,
    pub idle_brake_force: f32,
    pub drive_wheels: DriveWheels,
}

impl DriveTuning {
    pub fn from_vehicle_config(vehicle: &VehicleConfig) -> Self {
        Self {
            max_steer_angle_rad: vehicle.max_steer_angle_rad.abs(),
            engine_force: vehicle.engine_force_n.max(0.0),
            brake_force: vehicle.brake_force_n.max(0.0),
            idle_brake_force: vehicle.idle_brake_force_n.max(0.0),
            drive_wheels: DriveWheels::from_config_name(&vehicle.drive_wheels),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPose {
    pub position: Vec3,
    pub yaw_rad: f32,
}

impl SpawnPose {
    pub fn from_vehicle_config(vehicle: &VehicleConfig) -> Self {
        Self {
            position: Vec3::from_array(vehicle.spawn_position),
            yaw_rad: vehicle.spawn_yaw_degrees.to_radians(),
        }
    }

    pub fn transform(&self) -> Transform {
        Transform::from_translation(self.position).with_rotation(Quat::from_rotation_y(self.yaw_rad))
    }
}

/// Steering, drive and brake values derived from one control sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VehicleActuation {
    pub steer_angle_rad: f32,
    pub engine_force: f32,
    pub brake_force: f32,
}

impl VehicleActuation {
    pub fn from_controls(controls: &ControlState, tuning: &DriveTuning) -> Self {
        let steer_angle_rad = match (controls.steer_left, controls.steer_right) {
            (true, false) => -tuning.max_steer_angle_rad,
            (false, true) => tuning.max_steer_angle_rad,
            _ => 0.0,
        };

        let (engine_force, brake_force) = if controls.brake {
            (0.0, tuning.brake_force)
        } else if controls.throttle {
            (tuning.engine_force, 0.0)
        } else if !controls.steer_left && !controls.steer_right {
            (0.0, tuning.idle_brake_force)
        } else {
            (0.0, 0.0)
        };

        Self {
            steer_angle_rad,
            engine_force,
            brake_force,
        }
    }
}

/// Per-wheel actuators of a raycast vehicle body.
pub trait RaycastVehicleApi {
    fn set_steering_value(&mut self, angle_rad: f32, wheel: usize);
    fn apply_engine_force(&mut self, force: f32, wheel: usize);
    fn set_brake(&mut self, force: f32, wheel: usize);
    /// Moves the body to `pose` with zero linear and angular velocity.
    fn teleport(&mut self, pose: &SpawnPose);
}

#[derive(Debug, Clone)]
pub struct VehicleController {
    tuning: DriveTuning,
    spawn: SpawnPose,
    reset_edge: RisingEdge,
    last: VehicleActuation,
    resets: u32,
}

impl VehicleController {
    pub fn new(tuning: DriveTuning, spawn: SpawnPose) -> Self {
        Self {
            tuning,
            spawn,
            reset_edge: RisingEdge::default(),
            last: VehicleActuation::default(),
            resets: 0,
        }
    }

    pub fn set_tuning(&mut self, tuning: DriveTuning) {
        self.tuning = tuning;
    }

    pub fn set_spawn(&mut self, spawn: SpawnPose) {
        self.spawn = spawn;
    }

    pub fn last_actuation(&self) -> VehicleActuation {
        self.last
    }

    pub fn reset_count(&self) -> u32 {
        self.resets
    }

    /// Runs one physics tick. A reset edge teleports the body and zeroes every
    /// actuator instead of applying the drive values.
    pub fn tick(
        &mut self,
        controls: &ControlState,
        body: &mut impl RaycastVehicleApi,
    ) -> VehicleActuation {
        if self.reset_edge.update(controls.reset) {
            body.teleport(&self.spawn);
            for wheel in 0..WHEEL_COUNT {
                body.set_steering_value(0.0, wheel);
                body.apply_engine_force(0.0, wheel);
                body.set_brake(0.0, wheel);
            }
            self.resets = self.resets.saturating_add(1);
            self.last = VehicleActuation::default();
            return self.last;
        }

        let actuation = VehicleActuation::from_controls(controls, &self.tuning);
        for wheel in 0..WHEEL_COUNT {
            let steer = if is_front_wheel(wheel) {
                actuation.steer_angle_rad
            } else {
                0.0
            };
            let engine = if self.tuning.drive_wheels.drives(wheel) {
                actuation.engine_force
            } else {
                0.0
            };
            body.set_steering_value(steer, wheel);
            body.apply_engine_force(engine, wheel);
            body.set_brake(actuation.brake_force, wheel);
        }

        self.last = actuation;
        actuation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockBody {
        steering: [f32; WHEEL_COUNT],
        engine: [f32; WHEEL_COUNT],
        brake: [f32; WHEEL_COUNT],
        position: Vec3,
        yaw_rad: f32,
        linear_velocity: Vec3,
        angular_velocity: Vec3,
        teleports: u32,
    }

    impl RaycastVehicleApi for MockBody {
        fn set_steering_value(&mut self, angle_rad: f32, wheel: usize) {
            self.steering[wheel] = angle_rad;
        }

        fn apply_engine_force(&mut self, force: f32, wheel: usize) {
            self.engine[wheel] = force;
        }

        fn set_brake(&mut self, force: f32, wheel: usize) {
            self.brake[wheel] = force;
        }

        fn teleport(&mut self, pose: &SpawnPose) {
            self.position = pose.position;
            self.yaw_rad = pose.yaw_rad;
            self.linear_velocity = Vec3::ZERO;
            self.angular_velocity = Vec3::ZERO;
            self.teleports += 1;
        }
    }

    fn tuning() -> DriveTuning {
        DriveTuning {
            max_steer_angle_rad: 0.35,
            engine_force: 150.0,
            brake_force: 120.0,
            idle_brake_force: 12.0,
            drive_wheels: DriveWheels::Rear,
        }
    }

    fn spawn() -> SpawnPose {
        SpawnPose {
            position: Vec3::new(-1.5, 0.5, 3.0),
            yaw_rad: 0.0,
        }
    }

    fn controller() -> VehicleController {
        VehicleController::new(tuning(), spawn())
    }

    #[test]
    fn single_steer_flag_gives_full_lock_with_matching_sign() {
        let left = ControlState {
            steer_left: true,
            ..default()
        };
        let right = ControlState {
            steer_right: true,
            ..default()
        };

        let left_actuation = VehicleActuation::from_controls(&left, &tuning());
        let right_actuation = VehicleActuation::from_controls(&right, &tuning());

        assert_eq!(left_actuation.steer_angle_rad, -0.35);
        assert_eq!(right_actuation.steer_angle_rad, 0.35);
    }

    #[test]
    fn both_or_neither_steer_flags_drive_straight() {
        let both = ControlState {
            steer_left: true,
            steer_right: true,
            ..default()
        };

        assert_eq!(
            VehicleActuation::from_controls(&both, &tuning()).steer_angle_rad,
            0.0
        );
        assert_eq!(
            VehicleActuation::from_controls(&ControlState::default(), &tuning()).steer_angle_rad,
            0.0
        );
    }

    #[test]
    fn steer_left_with_throttle_drives_rear_wheels_and_steers_front() {
        let mut controller = controller();
        let mut body = MockBody::default();
        let controls = ControlState {
            steer_left: true,
            throttle: true,
            ..default()
        };

        let actuation = controller.tick(&controls, &mut body);

        assert!(actuation.engine_force > 0.0);
        assert_eq!(actuation.steer_angle_rad, -0.35);
        assert_eq!(actuation.brake_force, 0.0);
        assert_eq!(body.steering, [-0.35, -0.35, 0.0, 0.0]);
        assert_eq!(body.engine, [0.0, 0.0, 150.0, 150.0]);
        assert_eq!(body.brake, [0.0; WHEEL_COUNT]);
    }

    #[test]
    fn brake_overrides_throttle_on_all_wheels() {
        let mut controller = controller();
        let mut body = MockBody::default();
        let controls = ControlState {
            throttle: true,
            brake: true,
            ..default()
        };

        let actuation = controller.tick(&controls, &mut body);

        assert_eq!(actuation.engine_force, 0.0);
        assert_eq!(body.engine, [0.0; WHEEL_COUNT]);
        assert_eq!(body.brake, [120.0; WHEEL_COUNT]);
    }

    #[test]
    fn idle_brake_applies_only_without_throttle_and_steering() {
        let mut controller = controller();
        let mut body = MockBody::default();

        controller.tick(&ControlState::default(), &mut body);
        assert_eq!(body.brake, [12.0; WHEEL_COUNT]);

        let steering_only = ControlState {
            steer_right: true,
            ..default()
        };
        controller.tick(&steering_only, &mut body);
        assert_eq!(body.brake, [0.0; WHEEL_COUNT]);
    }

    #[test]
    fn all_wheel_drive_pushes_every_wheel() {
        let mut controller = VehicleController::new(
            DriveTuning {
                drive_wheels: DriveWheels::All,
                ..tuning()
            },
            spawn(),
        );
        let mut body = MockBody::default();
        let controls = ControlState {
            throttle: true,
            ..default()
        };

        controller.tick(&controls, &mut body);
        assert_eq!(body.engine, [150.0; WHEEL_COUNT]);
    }

    #[test]
    fn reset_edge_zeroes_velocity_and_restores_spawn_regardless_of_prior_motion() {
        let mut controller = controller();
        let mut body = MockBody {
            position: Vec3::new(12.0, 0.2, -40.0),
            yaw_rad: 1.3,
            linear_velocity: Vec3::new(4.0, -1.0, 9.0),
            angular_velocity: Vec3::new(0.0, 2.0, 0.0),
            ..default()
        };

        controller.tick(
            &ControlState {
                throttle: true,
                steer_left: true,
                ..default()
            },
            &mut body,
        );
        let actuation = controller.tick(
            &ControlState {
                reset: true,
                throttle: true,
                steer_left: true,
                ..default()
            },
            &mut body,
        );

        assert_eq!(actuation, VehicleActuation::default());
        assert_eq!(body.linear_velocity, Vec3::ZERO);
        assert_eq!(body.angular_velocity, Vec3::ZERO);
        assert_eq!(body.position, spawn().position);
        assert_eq!(body.yaw_rad, 0.0);
        assert_eq!(body.steering, [0.0; WHEEL_COUNT]);
        assert_eq!(body.engine, [0.0; WHEEL_COUNT]);
        assert_eq!(body.brake, [0.0; WHEEL_COUNT]);
        assert_eq!(controller.reset_count(), 1);
    }

    #[test]
    fn holding_reset_teleports_only_once() {
        let mut controller = controller();
        let mut body = MockBody::default();
        let held = ControlState {
            reset: true,
            ..default()
        };

        controller.tick(&held, &mut body);
        controller.tick(&held, &mut body);
        controller.tick(&held, &mut body);

        assert_eq!(body.teleports, 1);
    }

    #[test]
    fn drive_wheels_parse_from_config_names() {
        assert_eq!(DriveWheels::from_config_name("front"), DriveWheels::Front);
        assert_eq!(DriveWheels::from_config_name("all"), DriveWheels::All);
        assert_eq!(DriveWheels::from_config_name("rear"), DriveWheels::Rear);
    }
}
