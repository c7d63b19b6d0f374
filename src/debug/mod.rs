use crate::config::{GameConfig, VehicleConfig, CONFIG_DIR};
use crate::gameplay::camera::ChaseCamera;
use crate::gameplay::sfx::EngineAudioRuntime;
use crate::gameplay::vehicle::VehicleTelemetry;
use crate::states::GameState;
use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use std::ops::RangeInclusive;
use std::path::Path;

pub struct DebugOverlayPlugin;

impl Plugin for DebugOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<VehicleTuningPanelState>()
            .add_systems(Update, spawn_debug_overlay)
            .add_systems(Update, toggle_vehicle_tuning_panel)
            .add_systems(
                Update,
                update_debug_overlay_text
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                EguiPrimaryContextPass,
                vehicle_tuning_panel_ui
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
struct DebugOverlayText;

struct TuningField {
    section: &'static str,
    key: &'static str,
    range: RangeInclusive<f32>,
    drag_speed: f32,
    get: fn(&VehicleConfig) -> f32,
    set: fn(&mut VehicleConfig, f32),
}

/// Keys match `vehicles.toml` so the same table drives sliders and persistence.
const TUNING_FIELDS: [TuningField; 11] = [
    TuningField {
        section: "Drive",
        key: "engine_force_n",
        range: 0.0..=1000.0,
        drag_speed: 0.5,
        get: |vehicle| vehicle.engine_force_n,
        set: |vehicle, value| vehicle.engine_force_n = value,
    },
    TuningField {
        section: "Drive",
        key: "brake_force_n",
        range: 0.0..=1000.0,
        drag_speed: 0.5,
        get: |vehicle| vehicle.brake_force_n,
        set: |vehicle, value| vehicle.brake_force_n = value,
    },
    TuningField {
        section: "Drive",
        key: "idle_brake_force_n",
        range: 0.0..=200.0,
        drag_speed: 0.1,
        get: |vehicle| vehicle.idle_brake_force_n,
        set: |vehicle, value| vehicle.idle_brake_force_n = value,
    },
    TuningField {
        section: "Drive",
        key: "max_steer_angle_rad",
        range: 0.01..=1.5,
        drag_speed: 0.005,
        get: |vehicle| vehicle.max_steer_angle_rad,
        set: |vehicle, value| vehicle.max_steer_angle_rad = value,
    },
    TuningField {
        section: "Suspension",
        key: "suspension_rest_length_m",
        range: 0.01..=1.0,
        drag_speed: 0.002,
        get: |vehicle| vehicle.suspension_rest_length_m,
        set: |vehicle, value| vehicle.suspension_rest_length_m = value,
    },
    TuningField {
        section: "Suspension",
        key: "suspension_stiffness",
        range: 0.1..=500.0,
        drag_speed: 0.5,
        get: |vehicle| vehicle.suspension_stiffness,
        set: |vehicle, value| vehicle.suspension_stiffness = value,
    },
    TuningField {
        section: "Suspension",
        key: "suspension_damping",
        range: 0.0..=100.0,
        drag_speed: 0.05,
        get: |vehicle| vehicle.suspension_damping,
        set: |vehicle, value| vehicle.suspension_damping = value,
    },
    TuningField {
        section: "Suspension",
        key: "max_suspension_force_n",
        range: 1.0..=200_000.0,
        drag_speed: 10.0,
        get: |vehicle| vehicle.max_suspension_force_n,
        set: |vehicle, value| vehicle.max_suspension_force_n = value,
    },
    TuningField {
        section: "Tyres",
        key: "lateral_grip",
        range: 0.0..=1.0,
        drag_speed: 0.005,
        get: |vehicle| vehicle.lateral_grip,
        set: |vehicle, value| vehicle.lateral_grip = value,
    },
    TuningField {
        section: "Tyres",
        key: "friction_slip",
        range: 0.0..=20.0,
        drag_speed: 0.02,
        get: |vehicle| vehicle.friction_slip,
        set: |vehicle, value| vehicle.friction_slip = value,
    },
    TuningField {
        section: "Tyres",
        key: "roll_influence",
        range: 0.0..=1.0,
        drag_speed: 0.001,
        get: |vehicle| vehicle.roll_influence,
        set: |vehicle, value| vehicle.roll_influence = value,
    },
];

const TUNING_SECTIONS: [&str; 3] = ["Drive", "Suspension", "Tyres"];

#[derive(Resource, Debug, Default)]
struct VehicleTuningPanelState {
    visible: bool,
    source_vehicle_id: String,
    params: Option<VehicleConfig>,
    status: String,
}

fn spawn_debug_overlay(
    mut commands: Commands,
    config: Option<Res<GameConfig>>,
    existing_overlay: Query<Entity, With<DebugOverlayText>>,
) {
    if !existing_overlay.is_empty() {
        return;
    }

    let Some(config) = config else {
        return;
    };

    if !config.game.app.debug_overlay {
        return;
    }

    commands.spawn((
        DebugOverlayText,
        Text::new("debug overlay initializing..."),
        TextFont {
            font_size: 16.0,
            ..default()
        },
        TextColor(Color::srgb(0.92, 0.95, 0.97)),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(12.0),
            top: Val::Px(12.0),
            ..default()
        },
        ZIndex(100),
    ));
}

fn update_debug_overlay_text(
    diagnostics: Res<DiagnosticsStore>,
    telemetry: Res<VehicleTelemetry>,
    chase_camera: Res<ChaseCamera>,
    audio: Option<Res<EngineAudioRuntime>>,
    mut overlay_query: Query<&mut Text, With<DebugOverlayText>>,
) {
    let Ok(mut text) = overlay_query.single_mut() else {
        return;
    };

    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|value| value.smoothed())
        .unwrap_or(0.0);

    let audio_line = match audio {
        Some(runtime) => {
            let state = runtime.state();
            let observed = runtime
                .latest_sample()
                .map(|sample| format!("{:>5.2} m/s", sample.horizontal_speed()))
                .unwrap_or_else(|| "n/a".to_string());
            format!(
                "Audio: unlocked={} playing={} vol={:.2} rate={:.2} observed={observed}",
                yes_no(state.unlocked),
                yes_no(state.engine_is_playing),
                state.engine_volume,
                state.engine_playback_rate,
            )
        }
        None => "Audio: n/a".to_string(),
    };

    let velocity = telemetry.velocity.0;
    let actuation = telemetry.actuation;
    *text = Text::new(format!(
        "FPS: {fps:>5.1}\nSpeed: {speed:>6.2} m/s\nVelocity: ({vx:>6.2}, {vy:>6.2}, {vz:>6.2})\nSteer: {steer:>5.2} rad | Engine: {engine:>6.1} N | Brake: {brake:>6.1} N\nGrounded wheels: {grounded}/4 | Resets: {resets}\nCamera: {camera}\n{audio_line}\nHotkeys: F1 tuning | F5 reload config | R reset | C camera",
        speed = telemetry.speed_mps,
        vx = velocity.x,
        vy = velocity.y,
        vz = velocity.z,
        steer = actuation.steer_angle_rad,
        engine = actuation.engine_force,
        brake = actuation.brake_force,
        grounded = telemetry.grounded_wheels,
        resets = telemetry.reset_count,
        camera = chase_camera.mode().label(),
    ));
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn toggle_vehicle_tuning_panel(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut panel_state: ResMut<VehicleTuningPanelState>,
    config: Option<Res<GameConfig>>,
) {
    if !keyboard.just_pressed(KeyCode::F1) {
        return;
    }

    panel_state.visible = !panel_state.visible;
    if panel_state.visible {
        if let Some(config) = config {
            if let Err(error) = sync_panel_state_from_config(&mut panel_state, &config) {
                panel_state.status = error;
            }
        }
        info!("Vehicle tuning panel shown.");
    } else {
        info!("Vehicle tuning panel hidden.");
    }
}

fn vehicle_tuning_panel_ui(
    mut egui_contexts: EguiContexts,
    mut panel_state: ResMut<VehicleTuningPanelState>,
    mut config: ResMut<GameConfig>,
) {
    if !panel_state.visible {
        return;
    }

    if panel_state.params.is_none()
        || panel_state.source_vehicle_id != config.game.app.default_vehicle
    {
        if let Err(error) = sync_panel_state_from_config(&mut panel_state, &config) {
            panel_state.status = error;
            return;
        }
    }

    let Some(mut params) = panel_state.params.clone() else {
        return;
    };

    let mut window_open = panel_state.visible;
    let mut params_changed = false;
    let mut reload_clicked = false;
    let mut apply_clicked = false;
    let status = panel_state.status.clone();
    let vehicle_id = panel_state.source_vehicle_id.clone();

    let Ok(ctx) = egui_contexts.ctx_mut() else {
        return;
    };
    egui::Window::new("Vehicle Tuning")
        .open(&mut window_open)
        .resizable(true)
        .default_width(520.0)
        .show(ctx, |ui| {
            ui.label(format!("Active vehicle: {vehicle_id}"));
            ui.separator();

            for section in TUNING_SECTIONS {
                ui.collapsing(section, |ui| {
                    for field in TUNING_FIELDS.iter().filter(|field| field.section == section) {
                        let mut value = (field.get)(&params);
                        if tuning_slider_row(
                            ui,
                            field.key,
                            &mut value,
                            field.range.clone(),
                            field.drag_speed,
                        ) {
                            (field.set)(&mut params, value);
                            params_changed = true;
                        }
                    }
                });
            }

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("Reload From Config").clicked() {
                    reload_clicked = true;
                }
                if !cfg!(target_arch = "wasm32") && ui.button("Apply To vehicles.toml").clicked()
                {
                    apply_clicked = true;
                }
            });

            if !status.is_empty() {
                ui.separator();
                ui.label(status);
            }
        });

    panel_state.visible = window_open;

    if reload_clicked {
        match sync_panel_state_from_config(&mut panel_state, &config) {
            Ok(()) => panel_state.status = "Reloaded values from current config.".to_string(),
            Err(error) => panel_state.status = error,
        }
        return;
    }

    panel_state.params = Some(params.clone());

    if params_changed {
        match apply_vehicle_tuning_to_runtime_config(&mut config, &params) {
            Ok(()) => {
                panel_state.status = "Live-tuning active (in-memory config updated).".to_string()
            }
            Err(error) => panel_state.status = error,
        }
    }

    if apply_clicked {
        match persist_vehicle_tuning_and_reload(&mut config, &params) {
            Ok(message) => {
                panel_state.status = message;
                if let Err(error) = sync_panel_state_from_config(&mut panel_state, &config) {
                    panel_state.status = error;
                }
            }
            Err(error) => panel_state.status = error,
        }
    }
}

fn tuning_slider_row(
    ui: &mut egui::Ui,
    label: &str,
    value: &mut f32,
    slider_range: RangeInclusive<f32>,
    drag_speed: f32,
) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label(label);
        changed |= ui
            .add(egui::Slider::new(value, slider_range).show_value(false))
            .changed();
        changed |= ui
            .add(egui::DragValue::new(value).speed(drag_speed as f64))
            .changed();
    });
    changed
}

fn sync_panel_state_from_config(
    panel_state: &mut VehicleTuningPanelState,
    config: &GameConfig,
) -> Result<(), String> {
    let vehicle_id = config.game.app.default_vehicle.clone();
    let Some(vehicle) = config.vehicles_by_id.get(&vehicle_id) else {
        return Err(format!(
            "Vehicle tuning panel: default vehicle `{vehicle_id}` not found in config."
        ));
    };

    panel_state.source_vehicle_id = vehicle_id;
    panel_state.params = Some(vehicle.clone());
    Ok(())
}

fn apply_vehicle_tuning_to_runtime_config(
    config: &mut GameConfig,
    params: &VehicleConfig,
) -> Result<(), String> {
    let vehicle_id = params.id.as_str();
    let Some(vehicle) = config.vehicles_by_id.get_mut(vehicle_id) else {
        return Err(format!(
            "Vehicle tuning panel: runtime vehicle `{vehicle_id}` not found in vehicles_by_id."
        ));
    };
    *vehicle = params.clone();

    let Some(vehicle) = config
        .vehicles
        .vehicles
        .iter_mut()
        .find(|v| v.id == vehicle_id)
    else {
        return Err(format!(
            "Vehicle tuning panel: runtime vehicle `{vehicle_id}` not found in vehicles list."
        ));
    };
    *vehicle = params.clone();
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn persist_vehicle_tuning_and_reload(
    config: &mut GameConfig,
    params: &VehicleConfig,
) -> Result<String, String> {
    use std::fs;

    let config_dir = Path::new(CONFIG_DIR);
    let path = config_dir.join("vehicles.toml");
    let original_raw = fs::read_to_string(&path)
        .map_err(|error| format!("Failed reading `{}`: {error}", path.display()))?;
    let mut root: toml::Value = toml::from_str(&original_raw)
        .map_err(|error| format!("Failed parsing `{}`: {error}", path.display()))?;

    write_params_to_toml_value(&mut root, params)?;

    let updated_raw = toml::to_string_pretty(&root)
        .map_err(|error| format!("Failed serializing vehicles TOML: {error}"))?;
    fs::write(&path, updated_raw)
        .map_err(|error| format!("Failed writing `{}`: {error}", path.display()))?;

    match GameConfig::load_from_dir(config_dir) {
        Ok(new_config) => {
            *config = new_config;
            Ok(format!("Applied tuning and saved to {}.", path.display()))
        }
        Err(error) => {
            if let Err(restore_error) = fs::write(&path, original_raw) {
                warn!("Failed restoring `{}`: {restore_error}", path.display());
            }
            if let Ok(restored) = GameConfig::load_from_dir(config_dir) {
                *config = restored;
            }
            Err(format!(
                "Apply failed validation: {error}. Reverted `{}`.",
                path.display()
            ))
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn persist_vehicle_tuning_and_reload(
    _config: &mut GameConfig,
    _params: &VehicleConfig,
) -> Result<String, String> {
    Err(format!(
        "Saving to `{}` is unavailable in the browser build.",
        Path::new(CONFIG_DIR).join("vehicles.toml").display()
    ))
}

fn write_params_to_toml_value(root: &mut toml::Value, params: &VehicleConfig) -> Result<(), String> {
    let Some(vehicles_array) = root.get_mut("vehicles").and_then(toml::Value::as_array_mut) else {
        return Err("vehicles.toml: missing or invalid `vehicles` array".to_string());
    };

    let Some(vehicle_table) = vehicles_array.iter_mut().find_map(|vehicle_value| {
        let table = vehicle_value.as_table_mut()?;
        if table.get("id").and_then(toml::Value::as_str) == Some(params.id.as_str()) {
            Some(table)
        } else {
            None
        }
    }) else {
        return Err(format!(
            "vehicles.toml: could not find vehicle with id `{}`",
            params.id
        ));
    };

    for field in &TUNING_FIELDS {
        set_toml_float(vehicle_table, field.key, (field.get)(params))?;
    }

    Ok(())
}

fn set_toml_float(
    table: &mut toml::map::Map<String, toml::Value>,
    key: &str,
    value: f32,
) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("`{key}` is not a finite number"));
    }

    table.insert(key.to_string(), toml::Value::Float(value as f64));
    Ok(())
}
