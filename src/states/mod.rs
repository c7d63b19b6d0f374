use crate::assets::AssetRegistry;
use crate::config::{log_config_summary, GameConfig, CONFIG_DIR};
use crate::gameplay::camera::orbit::OrbitControls;
use bevy::asset::LoadState;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

const MIN_LOADING_SCREEN_SECONDS: f64 = 0.75;

#[derive(States, Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum GameState {
    #[default]
    Boot,
    Loading,
    InRun,
}

pub struct GameStatePlugin;

impl Plugin for GameStatePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(GameState::Boot), enter_boot)
            .add_systems(
                Update,
                boot_to_loading
                    .run_if(in_state(GameState::Boot))
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(OnEnter(GameState::Loading), (enter_loading, ensure_scene_camera))
            .add_systems(OnExit(GameState::Loading), cleanup_loading_screen)
            .add_systems(
                Update,
                loading_to_in_run.run_if(in_state(GameState::Loading)),
            )
            .add_systems(OnEnter(GameState::InRun), enter_in_run)
            .add_systems(
                Update,
                sync_window_title.run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                Update,
                hot_reload_config
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
struct LoadingScreenRoot;

#[derive(Resource, Debug, Clone)]
struct LoadingScreenState {
    entered_at_s: f64,
}

fn enter_boot() {
    info!("Entered state: Boot");
}

fn boot_to_loading(mut next_state: ResMut<NextState<GameState>>) {
    next_state.set(GameState::Loading);
}

fn ensure_scene_camera(
    mut commands: Commands,
    config: Res<GameConfig>,
    camera_query: Query<Entity, With<Camera3d>>,
) {
    if !camera_query.is_empty() {
        return;
    }

    let camera = &config.game.camera;
    let orbit = OrbitControls::from_camera_config(camera);
    commands.spawn((
        Name::new("SceneCamera"),
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            fov: camera.fov_degrees.to_radians(),
            ..default()
        }),
        orbit.pose().to_transform(),
        orbit,
    ));
}

fn enter_loading(mut commands: Commands, time: Res<Time>) {
    info!("Entered state: Loading");

    commands.insert_resource(LoadingScreenState {
        entered_at_s: time.elapsed_secs_f64(),
    });

    commands
        .spawn((
            Name::new("LoadingScreen"),
            LoadingScreenRoot,
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                justify_content: JustifyContent::Center,
                align_items: AlignItems::Center,
                ..default()
            },
            BackgroundColor(Color::srgba(0.01, 0.02, 0.03, 0.94)),
            ZIndex(300),
        ))
        .with_children(|parent| {
            parent.spawn((
                Text::new("Loading..."),
                TextFont {
                    font_size: 36.0,
                    ..default()
                },
                TextColor(Color::srgb(0.94, 0.97, 1.00)),
            ));
        });
}

fn cleanup_loading_screen(
    mut commands: Commands,
    loading_screen_query: Query<Entity, With<LoadingScreenRoot>>,
) {
    for entity in &loading_screen_query {
        commands.entity(entity).try_despawn();
    }
    commands.remove_resource::<LoadingScreenState>();
}

fn loading_to_in_run(
    time: Res<Time>,
    asset_server: Res<AssetServer>,
    loading_state: Option<Res<LoadingScreenState>>,
    registry: Option<Res<AssetRegistry>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let Some(loading_state) = loading_state else {
        return;
    };
    let Some(registry) = registry else {
        return;
    };

    let has_min_time =
        time.elapsed_secs_f64() - loading_state.entered_at_s >= MIN_LOADING_SCREEN_SECONDS;
    if !has_min_time {
        return;
    }

    let mut failed_count = 0_usize;
    for asset_id in registry.pending_handles() {
        if matches!(asset_server.load_state(asset_id), LoadState::Failed(_)) {
            failed_count += 1;
            continue;
        }
        if !asset_server.is_loaded_with_dependencies(asset_id) {
            return;
        }
    }

    if failed_count > 0 {
        warn!("{failed_count} asset(s) failed to load, continuing to run state.");
    }

    next_state.set(GameState::InRun);
}

fn sync_window_title(
    config: Res<GameConfig>,
    mut window_query: Query<&mut Window, With<PrimaryWindow>>,
) {
    if !config.is_changed() {
        return;
    }
    let Ok(mut window) = window_query.single_mut() else {
        return;
    };
    if window.title != config.game.app.window_title {
        window.title = config.game.app.window_title.clone();
    }
}

fn enter_in_run() {
    info!("Entered state: InRun");
}

fn hot_reload_config(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut config: ResMut<GameConfig>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if !keyboard.just_pressed(KeyCode::F5) {
        return;
    }

    match GameConfig::load_for_platform() {
        Ok(new_config) => {
            log_config_summary("Reloaded", &new_config);
            *config = new_config;
            next_state.set(GameState::Loading);
        }
        Err(error) => {
            warn!("Config reload from `{CONFIG_DIR}` failed, keeping previous config: {error}");
        }
    }
}
