use crate::config::GameConfig;
use crate::gameplay::input::{ControlIntent, ControlState};
use crate::states::GameState;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

pub const TOUCH_BUTTON_SIZE_PX: f32 = 70.0;
const EDGE_MARGIN_PX: f32 = 20.0;
const CLUSTER_GAP_PX: f32 = 15.0;
const CENTER_GAP_PX: f32 = 20.0;
const LEFT_CLUSTER_RIGHT_EDGE_PX: f32 = EDGE_MARGIN_PX + TOUCH_BUTTON_SIZE_PX * 2.0 + CLUSTER_GAP_PX;
const CENTRE_CLUSTER_HALF_WIDTH_PX: f32 = TOUCH_BUTTON_SIZE_PX + CENTER_GAP_PX * 0.5;
const TOUCH_BUTTON_IDLE_ALPHA: f32 = 0.50;
const TOUCH_BUTTON_ACTIVE_ALPHA: f32 = 0.80;

pub struct WebSupportPlugin;

impl Plugin for WebSupportPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TouchControlState>()
            .init_resource::<AudioUnlockState>()
            .init_resource::<WebRuntimeState>()
            .add_systems(Startup, configure_primary_window_for_web)
            .add_systems(
                Update,
                sync_web_runtime_state.run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                OnEnter(GameState::InRun),
                (spawn_touch_controls_ui, spawn_audio_unlock_ui),
            )
            .add_systems(OnExit(GameState::InRun), cleanup_web_ui)
            .add_systems(
                Update,
                (
                    update_touch_controls_from_pointer_and_touch,
                    unlock_audio_on_first_user_gesture,
                    update_touch_controls_ui,
                    update_audio_unlock_ui,
                )
                    .chain()
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Resource, Debug, Clone, Copy)]
pub struct WebRuntimeState {
    pub active: bool,
    pub show_touch_controls: bool,
    pub require_audio_tap: bool,
}

impl WebRuntimeState {
    pub fn touch_controls_visible(&self) -> bool {
        self.active && self.show_touch_controls
    }
}

impl Default for WebRuntimeState {
    fn default() -> Self {
        Self {
            active: cfg!(target_arch = "wasm32"),
            show_touch_controls: true,
            require_audio_tap: true,
        }
    }
}

#[derive(Resource, Debug, Clone, Copy)]
pub struct AudioUnlockState {
    pub unlocked: bool,
    gesture_seen: bool,
}

impl Default for AudioUnlockState {
    fn default() -> Self {
        Self {
            unlocked: !cfg!(target_arch = "wasm32"),
            gesture_seen: false,
        }
    }
}

impl AudioUnlockState {
    /// Outside web mode, or with the tap gate off, audio is always allowed. Otherwise it
    /// stays locked until a user gesture has been seen.
    fn apply_policy(&mut self, runtime_state: &WebRuntimeState) {
        self.unlocked = if runtime_state.active && runtime_state.require_audio_tap {
            self.gesture_seen
        } else {
            true
        };
    }

    fn record_gesture(&mut self) {
        self.gesture_seen = true;
        self.unlocked = true;
    }
}

/// Intents held through the on-screen buttons, plus whether the mouse press that is
/// currently down began on one of them.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct TouchControlState {
    pub held: ControlState,
    pub mouse_captured_by_button: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum HorizontalAnchor {
    Left(f32),
    Right(f32),
    /// Offset of the button's left edge from the window centre.
    Centre(f32),
}

#[derive(Debug, Clone, Copy)]
struct TouchButtonSpec {
    intent: ControlIntent,
    label: &'static str,
    horizontal: HorizontalAnchor,
    bottom: f32,
}

const TOUCH_BUTTONS: [TouchButtonSpec; 6] = [
    TouchButtonSpec {
        intent: ControlIntent::SteerLeft,
        label: "\u{25C0}",
        horizontal: HorizontalAnchor::Left(EDGE_MARGIN_PX),
        bottom: EDGE_MARGIN_PX,
    },
    TouchButtonSpec {
        intent: ControlIntent::SteerRight,
        label: "\u{25B6}",
        horizontal: HorizontalAnchor::Left(EDGE_MARGIN_PX + TOUCH_BUTTON_SIZE_PX + CLUSTER_GAP_PX),
        bottom: EDGE_MARGIN_PX,
    },
    TouchButtonSpec {
        intent: ControlIntent::Throttle,
        label: "\u{2191}",
        horizontal: HorizontalAnchor::Right(EDGE_MARGIN_PX),
        bottom: EDGE_MARGIN_PX + TOUCH_BUTTON_SIZE_PX + CLUSTER_GAP_PX,
    },
    TouchButtonSpec {
        intent: ControlIntent::Brake,
        label: "\u{2193}",
        horizontal: HorizontalAnchor::Right(EDGE_MARGIN_PX),
        bottom: EDGE_MARGIN_PX,
    },
    TouchButtonSpec {
        intent: ControlIntent::Reset,
        label: "R",
        horizontal: HorizontalAnchor::Centre(-(TOUCH_BUTTON_SIZE_PX + CENTER_GAP_PX * 0.5)),
        bottom: EDGE_MARGIN_PX,
    },
    TouchButtonSpec {
        intent: ControlIntent::CameraToggle,
        label: "K",
        horizontal: HorizontalAnchor::Centre(CENTER_GAP_PX * 0.5),
        bottom: EDGE_MARGIN_PX,
    },
];

/// Below this width the centre pair would collide with the steering cluster, so it
/// moves up one row.
fn centre_row_fits(window_width: f32) -> bool {
    window_width * 0.5 - CENTRE_CLUSTER_HALF_WIDTH_PX >= LEFT_CLUSTER_RIGHT_EDGE_PX + CLUSTER_GAP_PX
}

impl TouchButtonSpec {
    fn bottom_for(&self, window_width: f32) -> f32 {
        match self.horizontal {
            HorizontalAnchor::Centre(_) if !centre_row_fits(window_width) => {
                self.bottom + TOUCH_BUTTON_SIZE_PX + CLUSTER_GAP_PX
            }
            _ => self.bottom,
        }
    }

    fn rect(&self, window_size: Vec2) -> Rect {
        let min_x = match self.horizontal {
            HorizontalAnchor::Left(offset) => offset,
            HorizontalAnchor::Right(offset) => window_size.x - offset - TOUCH_BUTTON_SIZE_PX,
            HorizontalAnchor::Centre(offset) => window_size.x * 0.5 + offset,
        };
        let max_y = window_size.y - self.bottom_for(window_size.x);
        Rect::new(
            min_x,
            max_y - TOUCH_BUTTON_SIZE_PX,
            min_x + TOUCH_BUTTON_SIZE_PX,
            max_y,
        )
    }

    fn node(&self) -> Node {
        let mut node = Node {
            position_type: PositionType::Absolute,
            width: Val::Px(TOUCH_BUTTON_SIZE_PX),
            height: Val::Px(TOUCH_BUTTON_SIZE_PX),
            bottom: Val::Px(self.bottom),
            border: UiRect::all(Val::Px(2.0)),
            justify_content: JustifyContent::Center,
            align_items: AlignItems::Center,
            ..default()
        };
        match self.horizontal {
            HorizontalAnchor::Left(offset) => node.left = Val::Px(offset),
            HorizontalAnchor::Right(offset) => node.right = Val::Px(offset),
            HorizontalAnchor::Centre(offset) => {
                node.left = Val::Percent(50.0);
                node.margin.left = Val::Px(offset);
            }
        }
        node
    }
}

/// Button rectangles in logical window pixels, origin top-left like cursor and touch
/// positions.
pub fn touch_button_rects(window_size: Vec2) -> [(ControlIntent, Rect); 6] {
    TOUCH_BUTTONS.map(|spec| (spec.intent, spec.rect(window_size)))
}

pub fn hit_test(window_size: Vec2, point: Vec2) -> Option<ControlIntent> {
    touch_button_rects(window_size)
        .into_iter()
        .find(|(_, rect)| rect.contains(point))
        .map(|(intent, _)| intent)
}

#[derive(Component)]
struct WebTouchControlsRoot;

#[derive(Component)]
struct WebAudioUnlockRoot;

#[derive(Component)]
struct TouchControlButton {
    spec: TouchButtonSpec,
}

#[cfg(target_arch = "wasm32")]
fn configure_primary_window_for_web(mut window_query: Query<&mut Window, With<PrimaryWindow>>) {
    let Ok(mut window) = window_query.single_mut() else {
        return;
    };
    window.fit_canvas_to_parent = true;
    window.prevent_default_event_handling = true;
}

#[cfg(not(target_arch = "wasm32"))]
fn configure_primary_window_for_web() {}

fn sync_web_runtime_state(
    config: Res<GameConfig>,
    mut runtime_state: ResMut<WebRuntimeState>,
    mut audio_unlock_state: ResMut<AudioUnlockState>,
) {
    if !config.is_changed() {
        return;
    }

    runtime_state.active = config.is_web_mode_active();
    runtime_state.show_touch_controls = config.game.web.show_touch_controls;
    runtime_state.require_audio_tap = config.game.web.require_audio_tap;

    audio_unlock_state.apply_policy(&runtime_state);
}

fn spawn_touch_controls_ui(
    mut commands: Commands,
    existing_query: Query<Entity, With<WebTouchControlsRoot>>,
) {
    if !existing_query.is_empty() {
        return;
    }

    commands
        .spawn((
            Name::new("WebTouchControlsRoot"),
            WebTouchControlsRoot,
            Node {
                position_type: PositionType::Absolute,
                left: Val::Px(0.0),
                right: Val::Px(0.0),
                top: Val::Px(0.0),
                bottom: Val::Px(0.0),
                ..default()
            },
            Visibility::Hidden,
            ZIndex(260),
        ))
        .with_children(|parent| {
            for spec in TOUCH_BUTTONS {
                parent
                    .spawn((
                        Name::new(format!("WebTouchButton{:?}", spec.intent)),
                        TouchControlButton { spec },
                        spec.node(),
                        BorderRadius::MAX,
                        BackgroundColor(Color::srgba(0.0, 0.0, 0.0, TOUCH_BUTTON_IDLE_ALPHA)),
                        BorderColor::all(Color::WHITE),
                    ))
                    .with_children(|button| {
                        button.spawn((
                            Text::new(spec.label),
                            TextFont {
                                font_size: 28.0,
                                ..default()
                            },
                            TextColor(Color::WHITE),
                        ));
                    });
            }
        });
}

fn spawn_audio_unlock_ui(
    mut commands: Commands,
    existing_query: Query<Entity, With<WebAudioUnlockRoot>>,
) {
    if !existing_query.is_empty() {
        return;
    }

    commands
        .spawn((
            Name::new("WebAudioUnlockRoot"),
            WebAudioUnlockRoot,
            Node {
                position_type: PositionType::Absolute,
                left: Val::Px(0.0),
                right: Val::Px(0.0),
                top: Val::Px(20.0),
                justify_content: JustifyContent::Center,
                align_items: AlignItems::Center,
                ..default()
            },
            Visibility::Hidden,
            ZIndex(265),
        ))
        .with_children(|parent| {
            parent.spawn((
                Text::new("Tap, click, or press any key to enable audio"),
                TextFont {
                    font_size: 22.0,
                    ..default()
                },
                TextColor(Color::srgb(0.95, 0.96, 0.99)),
                BackgroundColor(Color::srgba(0.05, 0.07, 0.10, 0.84)),
                Node {
                    padding: UiRect::axes(Val::Px(14.0), Val::Px(8.0)),
                    border: UiRect::all(Val::Px(1.0)),
                    ..default()
                },
                BorderColor::all(Color::srgba(0.64, 0.74, 0.80, 0.90)),
            ));
        });
}

#[allow(clippy::type_complexity)]
fn cleanup_web_ui(
    mut commands: Commands,
    cleanup_query: Query<Entity, Or<(With<WebTouchControlsRoot>, With<WebAudioUnlockRoot>)>>,
    mut controls: ResMut<TouchControlState>,
) {
    for entity in &cleanup_query {
        commands.entity(entity).try_despawn();
    }
    *controls = TouchControlState::default();
}

fn update_touch_controls_from_pointer_and_touch(
    runtime_state: Res<WebRuntimeState>,
    touches: Res<Touches>,
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    mut controls: ResMut<TouchControlState>,
    window_query: Query<&Window, With<PrimaryWindow>>,
) {
    let mut held = ControlState::default();

    if !runtime_state.touch_controls_visible() {
        controls.held = held;
        controls.mouse_captured_by_button = false;
        return;
    }

    let Ok(window) = window_query.single() else {
        return;
    };
    let window_size = window.size();

    for touch in touches.iter() {
        if let Some(intent) = hit_test(window_size, touch.position()) {
            held.set(intent, true);
        }
    }

    let cursor_intent = window
        .cursor_position()
        .and_then(|cursor| hit_test(window_size, cursor));
    if mouse_buttons.just_pressed(MouseButton::Left) {
        controls.mouse_captured_by_button = cursor_intent.is_some();
    }
    if !mouse_buttons.pressed(MouseButton::Left) {
        controls.mouse_captured_by_button = false;
    }
    if mouse_buttons.pressed(MouseButton::Left) {
        if let Some(intent) = cursor_intent {
            held.set(intent, true);
        }
    }

    controls.held = held;
}

fn unlock_audio_on_first_user_gesture(
    runtime_state: Res<WebRuntimeState>,
    touches: Res<Touches>,
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mut audio_unlock_state: ResMut<AudioUnlockState>,
) {
    if !runtime_state.active || !runtime_state.require_audio_tap || audio_unlock_state.unlocked {
        return;
    }

    let touched = touches.iter_just_pressed().next().is_some();
    let clicked = mouse_buttons.just_pressed(MouseButton::Left);
    let keyed = keyboard.get_just_pressed().next().is_some();
    if touched || clicked || keyed {
        audio_unlock_state.record_gesture();
        info!("Audio unlocked by first user gesture (web mode).");
    }
}

fn update_touch_controls_ui(
    runtime_state: Res<WebRuntimeState>,
    controls: Res<TouchControlState>,
    window_query: Query<&Window, With<PrimaryWindow>>,
    mut root_query: Query<&mut Visibility, With<WebTouchControlsRoot>>,
    mut button_query: Query<(&TouchControlButton, &mut Node, &mut BackgroundColor)>,
) {
    let Ok(mut root_visibility) = root_query.single_mut() else {
        return;
    };

    if !runtime_state.touch_controls_visible() {
        *root_visibility = Visibility::Hidden;
        return;
    }
    *root_visibility = Visibility::Inherited;

    let window_width = window_query.single().map(Window::width).ok();
    for (button, mut node, mut background) in &mut button_query {
        if let Some(width) = window_width {
            let bottom = Val::Px(button.spec.bottom_for(width));
            if node.bottom != bottom {
                node.bottom = bottom;
            }
        }

        let alpha = if controls.held.is_held(button.spec.intent) {
            TOUCH_BUTTON_ACTIVE_ALPHA
        } else {
            TOUCH_BUTTON_IDLE_ALPHA
        };
        *background = BackgroundColor(Color::srgba(0.0, 0.0, 0.0, alpha));
    }
}

fn update_audio_unlock_ui(
    runtime_state: Res<WebRuntimeState>,
    audio_unlock_state: Res<AudioUnlockState>,
    mut prompt_query: Query<&mut Visibility, With<WebAudioUnlockRoot>>,
) {
    let Ok(mut visibility) = prompt_query.single_mut() else {
        return;
    };

    let show_prompt =
        runtime_state.active && runtime_state.require_audio_tap && !audio_unlock_state.unlocked;
    *visibility = if show_prompt {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;

    const PHONE: Vec2 = Vec2::new(390.0, 844.0);

    fn web_runtime_app(force_web_mode: bool, require_audio_tap: bool) -> App {
        let mut config = sample_config();
        config.game.web.force_web_mode = force_web_mode;
        config.game.web.require_audio_tap = require_audio_tap;

        let mut app = App::new();
        app.insert_resource(config)
            .init_resource::<WebRuntimeState>()
            .init_resource::<AudioUnlockState>()
            .add_systems(Update, sync_web_runtime_state);
        app
    }

    #[test]
    fn forced_web_mode_locks_audio_until_a_gesture() {
        let mut app = web_runtime_app(true, true);
        app.update();

        assert!(app.world().resource::<WebRuntimeState>().active);
        assert!(!app.world().resource::<AudioUnlockState>().unlocked);

        app.world_mut()
            .resource_mut::<AudioUnlockState>()
            .record_gesture();
        app.world_mut()
            .resource_mut::<GameConfig>()
            .set_changed();
        app.update();

        assert!(app.world().resource::<AudioUnlockState>().unlocked);
    }

    #[test]
    fn audio_is_unlocked_without_the_tap_gate() {
        let mut app = web_runtime_app(true, false);
        app.update();
        assert!(app.world().resource::<AudioUnlockState>().unlocked);

        let mut app = web_runtime_app(false, true);
        app.update();
        assert!(app.world().resource::<AudioUnlockState>().unlocked);
    }

    #[test]
    fn every_button_centre_maps_to_its_intent() {
        for (intent, rect) in touch_button_rects(PHONE) {
            assert_eq!(hit_test(PHONE, rect.center()), Some(intent));
        }
    }

    #[test]
    fn layout_mirrors_corner_clusters() {
        let rects = touch_button_rects(PHONE);
        let rect_for = |wanted: ControlIntent| {
            rects
                .iter()
                .find(|(intent, _)| *intent == wanted)
                .map(|(_, rect)| *rect)
                .expect("every intent has a button")
        };

        let steer_left = rect_for(ControlIntent::SteerLeft);
        assert_eq!(steer_left.min, Vec2::new(20.0, 844.0 - 90.0));

        let steer_right = rect_for(ControlIntent::SteerRight);
        assert_eq!(steer_right.min.x, 105.0);

        let brake = rect_for(ControlIntent::Brake);
        assert_eq!(brake.max, Vec2::new(370.0, 824.0));

        let throttle = rect_for(ControlIntent::Throttle);
        assert_eq!(throttle.max.y, brake.min.y - 15.0);

        let reset = rect_for(ControlIntent::Reset);
        let camera = rect_for(ControlIntent::CameraToggle);
        assert_eq!(camera.min.x - reset.max.x, 20.0);
        assert_eq!((reset.min.x + camera.max.x) * 0.5, 195.0);
    }

    #[test]
    fn buttons_do_not_overlap_on_a_narrow_phone() {
        let rects = touch_button_rects(PHONE);
        for (index, (_, a)) in rects.iter().enumerate() {
            for (_, b) in rects.iter().skip(index + 1) {
                assert!(a.intersect(*b).is_empty(), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn centre_pair_shares_the_bottom_row_on_wide_windows() {
        let desktop = Vec2::new(1280.0, 720.0);
        let rects = touch_button_rects(desktop);

        for (_, rect) in rects {
            assert!(rect.max.y == 700.0 || rect.max.y == 615.0, "{rect:?}");
        }
        let (_, reset) = rects[4];
        assert_eq!(reset.max.y, 700.0);
    }

    #[test]
    fn centre_pair_lifts_above_steering_on_narrow_phones() {
        let (_, reset) = touch_button_rects(PHONE)[4];
        let (_, throttle) = touch_button_rects(PHONE)[2];

        assert_eq!(reset.max.y, throttle.max.y);
    }

    #[test]
    fn points_away_from_buttons_miss() {
        assert_eq!(hit_test(PHONE, Vec2::new(195.0, 300.0)), None);
        assert_eq!(hit_test(PHONE, Vec2::new(5.0, 840.0)), None);
    }
}
