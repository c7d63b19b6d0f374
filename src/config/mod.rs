use bevy::prelude::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = "config";

const EMBEDDED_GAME_TOML: &str = include_str!("../../config/game.toml");
const EMBEDDED_VEHICLES_TOML: &str = include_str!("../../config/vehicles.toml");
const EMBEDDED_ASSETS_TOML: &str = include_str!("../../config/assets.toml");

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, load_game_config);
    }
}

fn load_game_config(mut commands: Commands) {
    let config = GameConfig::load_for_platform().unwrap_or_else(|error| {
        panic!("failed to load configuration from `{CONFIG_DIR}`: {error}");
    });

    log_config_summary("Loaded", &config);
    info!("Press F5 to hot-reload config files from `{CONFIG_DIR}`.");

    commands.insert_resource(config);
}

pub fn log_config_summary(prefix: &str, config: &GameConfig) {
    info!(
        "{prefix} config: {} vehicles, {} models, {} audio clips, default vehicle `{}`.",
        config.vehicles_by_id.len(),
        config.model_assets_by_id.len(),
        config.audio_assets_by_id.len(),
        config.game.app.default_vehicle
    );
}

#[derive(Resource, Debug, Clone)]
pub struct GameConfig {
    pub game: GameFile,
    pub vehicles: VehiclesFile,
    pub assets: AssetsFile,
    pub vehicles_by_id: HashMap<String, VehicleConfig>,
    pub model_assets_by_id: HashMap<String, ModelAssetConfig>,
    pub audio_assets_by_id: HashMap<String, AudioAssetConfig>,
}

impl GameConfig {
    /// Native builds read `config/` from disk so F5 picks up edits; the browser build
    /// has no filesystem and parses the copies baked in at compile time.
    pub fn load_for_platform() -> Result<Self, ConfigError> {
        if cfg!(target_arch = "wasm32") {
            Self::load_embedded()
        } else {
            Self::load_from_dir(Path::new(CONFIG_DIR))
        }
    }

    pub fn load_from_dir(config_dir: &Path) -> Result<Self, ConfigError> {
        let game: GameFile = read_toml(&config_dir.join("game.toml"))?;
        let vehicles: VehiclesFile = read_toml(&config_dir.join("vehicles.toml"))?;
        let assets: AssetsFile = read_toml(&config_dir.join("assets.toml"))?;
        Self::assemble(game, vehicles, assets)
    }

    pub fn load_embedded() -> Result<Self, ConfigError> {
        let game: GameFile = parse_toml(Path::new("game.toml"), EMBEDDED_GAME_TOML)?;
        let vehicles: VehiclesFile =
            parse_toml(Path::new("vehicles.toml"), EMBEDDED_VEHICLES_TOML)?;
        let assets: AssetsFile = parse_toml(Path::new("assets.toml"), EMBEDDED_ASSETS_TOML)?;
        Self::assemble(game, vehicles, assets)
    }

    fn assemble(
        game: GameFile,
        vehicles: VehiclesFile,
        assets: AssetsFile,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            vehicles_by_id: to_index("vehicles.toml::vehicles", &vehicles.vehicles)?,
            model_assets_by_id: to_index("assets.toml::models", &assets.models)?,
            audio_assets_by_id: to_index("assets.toml::audio", &assets.audio)?,
            game,
            vehicles,
            assets,
        };

        config.validate_references()?;
        Ok(config)
    }

    pub fn is_web_mode_active(&self) -> bool {
        cfg!(target_arch = "wasm32") || self.game.web.force_web_mode
    }

    pub fn default_vehicle(&self) -> Option<&VehicleConfig> {
        self.vehicles_by_id.get(&self.game.app.default_vehicle)
    }

    fn validate_references(&self) -> Result<(), ConfigError> {
        if !self
            .vehicles_by_id
            .contains_key(&self.game.app.default_vehicle)
        {
            return Err(ConfigError::Validation(format!(
                "game.toml::app.default_vehicle references unknown vehicle id `{}`",
                self.game.app.default_vehicle
            )));
        }

        if self.game.app.fixed_timestep_hz <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::app.fixed_timestep_hz must be > 0".to_string(),
            ));
        }

        if let Some(track_id) = self.game.physics.track_model_asset_id.as_deref() {
            if !self.model_assets_by_id.contains_key(track_id) {
                return Err(ConfigError::Validation(format!(
                    "game.toml::physics.track_model_asset_id references unknown model id `{track_id}`"
                )));
            }
        }
        if self.game.physics.ground_half_extent_m <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::physics.ground_half_extent_m must be > 0".to_string(),
            ));
        }

        let camera = &self.game.camera;
        if !(0.0 < camera.fov_degrees && camera.fov_degrees < 180.0) {
            return Err(ConfigError::Validation(
                "game.toml::camera.fov_degrees must be in (0, 180)".to_string(),
            ));
        }
        if camera.chase_follow_distance_m < 0.0 || camera.chase_entry_perturbation_m < 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::camera chase distance and perturbation must be >= 0".to_string(),
            ));
        }
        if camera.orbit_max_distance_m <= camera.orbit_min_distance_m
            || camera.orbit_min_distance_m <= 0.0
        {
            return Err(ConfigError::Validation(
                "game.toml::camera orbit distance range is invalid (0 < min < max)".to_string(),
            ));
        }

        let sfx = &self.game.sfx;
        if sfx.speed_for_max_volume_mps <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::sfx.speed_for_max_volume_mps must be > 0".to_string(),
            ));
        }
        if sfx.speed_to_rate_scale <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::sfx.speed_to_rate_scale must be > 0".to_string(),
            ));
        }
        if sfx.engine_max_playback_rate < sfx.engine_base_playback_rate {
            return Err(ConfigError::Validation(
                "game.toml::sfx.engine_max_playback_rate must be >= engine_base_playback_rate"
                    .to_string(),
            ));
        }
        if sfx.engine_idle_speed_mps < 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::sfx.engine_idle_speed_mps must be >= 0".to_string(),
            ));
        }

        for (index, vehicle) in self.vehicles.vehicles.iter().enumerate() {
            if vehicle.mass_kg <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].mass_kg must be > 0"
                )));
            }
            if vehicle.chassis_half_extents_m.iter().any(|extent| *extent <= 0.0) {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].chassis_half_extents_m must all be > 0"
                )));
            }
            if !(0.0 < vehicle.max_steer_angle_rad
                && vehicle.max_steer_angle_rad < std::f32::consts::FRAC_PI_2)
            {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].max_steer_angle_rad must be in (0, pi/2)"
                )));
            }
            if vehicle.engine_force_n < 0.0
                || vehicle.brake_force_n < 0.0
                || vehicle.idle_brake_force_n < 0.0
            {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}] engine, brake and idle brake forces must be >= 0"
                )));
            }
            if !matches!(vehicle.drive_wheels.as_str(), "rear" | "front" | "all") {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].drive_wheels `{}` is unsupported (expected rear/front/all)",
                    vehicle.drive_wheels
                )));
            }
            if vehicle.wheel_radius_m <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].wheel_radius_m must be > 0"
                )));
            }
            if vehicle.suspension_rest_length_m <= 0.0 || vehicle.suspension_stiffness <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}] suspension rest length and stiffness must be > 0"
                )));
            }
            if vehicle.suspension_damping < 0.0 || vehicle.max_suspension_force_n <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}] suspension damping must be >= 0 and max force > 0"
                )));
            }
            if !(0.0..=1.0).contains(&vehicle.lateral_grip) {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].lateral_grip must be in [0, 1]"
                )));
            }
            if vehicle.friction_slip <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].friction_slip must be > 0"
                )));
            }
            if !(0.0..=1.0).contains(&vehicle.roll_influence) {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].roll_influence must be in [0, 1]"
                )));
            }
            if let Some(model_id) = vehicle.model_asset_id.as_deref() {
                if !self.model_assets_by_id.contains_key(model_id) {
                    return Err(ConfigError::Validation(format!(
                        "vehicles.toml::vehicles[{index}].model_asset_id references unknown model id `{model_id}`"
                    )));
                }
            }
        }

        for (index, model) in self.assets.models.iter().enumerate() {
            if model.scene_path.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "assets.toml::models[{index}].scene_path cannot be empty"
                )));
            }
        }

        for (index, audio) in self.assets.audio.iter().enumerate() {
            if audio.path.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "assets.toml::audio[{index}].path cannot be empty"
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },
    Validation(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse `{}`: {source}", path.display())
            }
            Self::Validation(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_toml(path, &raw)
}

fn parse_toml<T: DeserializeOwned>(path: &Path, raw: &str) -> Result<T, ConfigError> {
    toml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

fn to_index<T>(label: &str, rows: &[T]) -> Result<HashMap<String, T>, ConfigError>
where
    T: HasId + Clone,
{
    let mut map = HashMap::new();

    for row in rows {
        let id = row.id();
        if id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{label} contains an empty id"
            )));
        }

        if map.insert(id.to_string(), row.clone()).is_some() {
            return Err(ConfigError::Validation(format!(
                "{label} contains duplicate id `{id}`"
            )));
        }
    }

    Ok(map)
}

trait HasId {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameFile {
    pub app: AppConfig,
    pub physics: PhysicsConfig,
    pub camera: CameraConfig,
    pub sfx: SfxConfig,
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub window_title: String,
    pub fixed_timestep_hz: f32,
    pub default_vehicle: String,
    pub debug_overlay: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhysicsConfig {
    pub gravity: [f32; 3],
    pub ground_half_extent_m: f32,
    #[serde(default)]
    pub track_model_asset_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub orbit_home_position: [f32; 3],
    pub orbit_target: [f32; 3],
    pub orbit_rotate_speed: f32,
    pub orbit_zoom_speed: f32,
    pub orbit_min_distance_m: f32,
    pub orbit_max_distance_m: f32,
    pub chase_follow_distance_m: f32,
    pub chase_height_m: f32,
    pub chase_entry_perturbation_m: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SfxConfig {
    pub enabled: bool,
    pub master_volume: f32,
    pub music_volume: f32,
    pub speed_for_max_volume_mps: f32,
    pub engine_base_playback_rate: f32,
    pub speed_to_rate_scale: f32,
    pub engine_max_playback_rate: f32,
    #[serde(default)]
    pub engine_idle_speed_mps: f32,
    pub engine_audio_id: String,
    pub music_audio_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    pub show_touch_controls: bool,
    pub require_audio_tap: bool,
    #[serde(default)]
    pub force_web_mode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehiclesFile {
    pub vehicles: Vec<VehicleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleConfig {
    pub id: String,
    pub mass_kg: f32,
    pub chassis_half_extents_m: [f32; 3],
    pub spawn_position: [f32; 3],
    #[serde(default)]
    pub spawn_yaw_degrees: f32,
    pub max_steer_angle_rad: f32,
    pub engine_force_n: f32,
    pub brake_force_n: f32,
    pub idle_brake_force_n: f32,
    #[serde(default = "default_drive_wheels")]
    pub drive_wheels: String,
    pub wheel_radius_m: f32,
    pub wheel_track_factor: f32,
    pub wheel_height_factor: f32,
    pub suspension_rest_length_m: f32,
    pub suspension_stiffness: f32,
    pub suspension_damping: f32,
    pub max_suspension_force_n: f32,
    pub lateral_grip: f32,
    pub friction_slip: f32,
    #[serde(default = "default_roll_influence")]
    pub roll_influence: f32,
    #[serde(default)]
    pub model_asset_id: Option<String>,
    #[serde(default = "default_model_scale")]
    pub model_scale: f32,
    #[serde(default)]
    pub model_yaw_degrees: f32,
    #[serde(default)]
    pub model_offset: [f32; 3],
}

fn default_drive_wheels() -> String {
    "rear".to_string()
}

fn default_roll_influence() -> f32 {
    0.01
}

fn default_model_scale() -> f32 {
    1.0
}

impl HasId for VehicleConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AssetsFile {
    #[serde(default)]
    pub models: Vec<ModelAssetConfig>,
    #[serde(default)]
    pub audio: Vec<AudioAssetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelAssetConfig {
    pub id: String,
    pub scene_path: String,
}

impl HasId for ModelAssetConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioAssetConfig {
    pub id: String,
    pub path: String,
}

impl HasId for AudioAssetConfig {
    fn id(&self) -> &str {
        &self.id
    }
}
