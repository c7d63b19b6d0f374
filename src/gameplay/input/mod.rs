use crate::states::GameState;
use crate::web::TouchControlState;
use bevy::prelude::*;

pub struct DriveInputPlugin;

impl Plugin for DriveInputPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ControlState>()
            .init_resource::<KeyboardBindings>()
            .add_systems(OnExit(GameState::InRun), clear_control_state)
            .add_systems(
                FixedPreUpdate,
                sample_control_state.run_if(in_state(GameState::InRun)),
            );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlIntent {
    SteerLeft,
    SteerRight,
    Throttle,
    Brake,
    Reset,
    CameraToggle,
}

impl ControlIntent {
    pub const ALL: [ControlIntent; 6] = [
        ControlIntent::SteerLeft,
        ControlIntent::SteerRight,
        ControlIntent::Throttle,
        ControlIntent::Brake,
        ControlIntent::Reset,
        ControlIntent::CameraToggle,
    ];
}

/// Which intents are held right now. Consumers that need "just pressed" keep a
/// [`RisingEdge`] of their own.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    pub steer_left: bool,
    pub steer_right: bool,
    pub throttle: bool,
    pub brake: bool,
    pub reset: bool,
    pub camera_toggle: bool,
}

impl ControlState {
    pub fn is_held(&self, intent: ControlIntent) -> bool {
        match intent {
            ControlIntent::SteerLeft => self.steer_left,
            ControlIntent::SteerRight => self.steer_right,
            ControlIntent::Throttle => self.throttle,
            ControlIntent::Brake => self.brake,
            ControlIntent::Reset => self.reset,
            ControlIntent::CameraToggle => self.camera_toggle,
        }
    }

    pub fn set(&mut self, intent: ControlIntent, held: bool) {
        let slot = match intent {
            ControlIntent::SteerLeft => &mut self.steer_left,
            ControlIntent::SteerRight => &mut self.steer_right,
            ControlIntent::Throttle => &mut self.throttle,
            ControlIntent::Brake => &mut self.brake,
            ControlIntent::Reset => &mut self.reset,
            ControlIntent::CameraToggle => &mut self.camera_toggle,
        };
        *slot = held;
    }

    /// Held in either source.
    pub fn merged(self, other: ControlState) -> ControlState {
        let mut merged = self;
        for intent in ControlIntent::ALL {
            merged.set(intent, self.is_held(intent) || other.is_held(intent));
        }
        merged
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RisingEdge {
    previous: bool,
}

impl RisingEdge {
    /// Feeds the current level and returns true only on a false to true transition.
    pub fn update(&mut self, level: bool) -> bool {
        let fired = level && !self.previous;
        self.previous = level;
        fired
    }
}

#[derive(Resource, Debug, Clone)]
pub struct KeyboardBindings {
    pub steer_left: Vec<KeyCode>,
    pub steer_right: Vec<KeyCode>,
    pub throttle: Vec<KeyCode>,
    pub brake: Vec<KeyCode>,
    pub reset: Vec<KeyCode>,
    pub camera_toggle: Vec<KeyCode>,
}

impl Default for KeyboardBindings {
    fn default() -> Self {
        Self {
            steer_left: vec![KeyCode::KeyA, KeyCode::ArrowLeft],
            steer_right: vec![KeyCode::KeyD, KeyCode::ArrowRight],
            throttle: vec![KeyCode::KeyW, KeyCode::ArrowUp],
            brake: vec![KeyCode::KeyS, KeyCode::ArrowDown],
            reset: vec![KeyCode::KeyR],
            camera_toggle: vec![KeyCode::KeyC],
        }
    }
}

impl KeyboardBindings {
    fn keys_for(&self, intent: ControlIntent) -> &[KeyCode] {
        match intent {
            ControlIntent::SteerLeft => &self.steer_left,
            ControlIntent::SteerRight => &self.steer_right,
            ControlIntent::Throttle => &self.throttle,
            ControlIntent::Brake => &self.brake,
            ControlIntent::Reset => &self.reset,
            ControlIntent::CameraToggle => &self.camera_toggle,
        }
    }

    pub fn sample(&self, keyboard: &ButtonInput<KeyCode>) -> ControlState {
        let mut state = ControlState::default();
        for intent in ControlIntent::ALL {
            let held = self.keys_for(intent).iter().any(|key| keyboard.pressed(*key));
            state.set(intent, held);
        }
        state
    }
}

fn sample_control_state(
    keyboard: Res<ButtonInput<KeyCode>>,
    bindings: Res<KeyboardBindings>,
    touch_controls: Option<Res<TouchControlState>>,
    mut control_state: ResMut<ControlState>,
) {
    let keyboard_state = bindings.sample(&keyboard);
    let touch_state = touch_controls
        .map(|touch| touch.held)
        .unwrap_or_default();

    let next = keyboard_state.merged(touch_state);
    if *control_state != next {
        *control_state = next;
    }
}

fn clear_control_state(mut control_state: ResMut<ControlState>) {
    *control_state = ControlState::default();
}
