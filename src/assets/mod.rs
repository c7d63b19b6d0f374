use crate::config::{AudioAssetConfig, GameConfig, ModelAssetConfig};
use bevy::prelude::*;
use bevy::asset::UntypedAssetId;
use std::collections::HashMap;
use std::path::Path;

const ASSET_ROOT_DIR: &str = "assets";

pub struct AssetRegistryPlugin;

impl Plugin for AssetRegistryPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            sync_asset_registry.run_if(resource_exists::<GameConfig>),
        );
    }
}

fn sync_asset_registry(
    mut commands: Commands,
    config: Res<GameConfig>,
    asset_server: Res<AssetServer>,
    registry: Option<ResMut<AssetRegistry>>,
) {
    if registry.is_some() && !config.is_changed() {
        return;
    }

    let new_registry =
        AssetRegistry::from_config(&config, &asset_server, Path::new(ASSET_ROOT_DIR));

    for (id, path) in new_registry.missing_entries() {
        warn!("Asset `{id}` not found at `{ASSET_ROOT_DIR}/{path}`; using placeholder.");
    }

    match registry {
        Some(mut existing_registry) => {
            *existing_registry = new_registry;
            log_asset_registry_summary("Updated", &existing_registry);
        }
        None => {
            log_asset_registry_summary("Initialized", &new_registry);
            commands.insert_resource(new_registry);
        }
    }
}

fn log_asset_registry_summary(prefix: &str, registry: &AssetRegistry) {
    info!(
        "{prefix} asset registry: models {}/{}, audio {}/{}.",
        registry.available_model_count(),
        registry.models.len(),
        registry.available_audio_count(),
        registry.audio.len(),
    );
}

#[derive(Resource, Debug, Clone, Default)]
pub struct AssetRegistry {
    pub models: HashMap<String, ModelAssetEntry>,
    pub audio: HashMap<String, AudioAssetEntry>,
}

impl AssetRegistry {
    pub fn from_config(config: &GameConfig, asset_server: &AssetServer, asset_root: &Path) -> Self {
        let models = config
            .assets
            .models
            .iter()
            .map(|entry| {
                let model = ModelAssetEntry::from_config(entry, asset_server, asset_root);
                (entry.id.clone(), model)
            })
            .collect();

        let audio = config
            .assets
            .audio
            .iter()
            .map(|entry| {
                let sound = AudioAssetEntry::from_config(entry, asset_server, asset_root);
                (entry.id.clone(), sound)
            })
            .collect();

        Self { models, audio }
    }

    pub fn model_handle(&self, id: &str) -> Option<Handle<Scene>> {
        self.models.get(id).and_then(|entry| entry.handle.clone())
    }

    pub fn audio_handle(&self, id: &str) -> Option<Handle<AudioSource>> {
        self.audio.get(id).and_then(|entry| entry.handle.clone())
    }

    /// Every handle the loading screen should wait on.
    pub fn pending_handles(&self) -> Vec<UntypedAssetId> {
        self.models
            .values()
            .filter_map(|entry| entry.handle.as_ref().map(|handle| handle.id().untyped()))
            .chain(
                self.audio
                    .values()
                    .filter_map(|entry| entry.handle.as_ref().map(|handle| handle.id().untyped())),
            )
            .collect()
    }

    fn missing_entries(&self) -> Vec<(&str, &str)> {
        let mut missing: Vec<(&str, &str)> = self
            .models
            .iter()
            .filter(|(_, entry)| !entry.exists_on_disk)
            .map(|(id, entry)| (id.as_str(), entry.scene_path.as_str()))
            .chain(
                self.audio
                    .iter()
                    .filter(|(_, entry)| !entry.exists_on_disk)
                    .map(|(id, entry)| (id.as_str(), entry.path.as_str())),
            )
            .collect();
        missing.sort_unstable();
        missing
    }

    fn available_model_count(&self) -> usize {
        self.models
            .values()
            .filter(|entry| entry.exists_on_disk)
            .count()
    }

    fn available_audio_count(&self) -> usize {
        self.audio
            .values()
            .filter(|entry| entry.exists_on_disk)
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct ModelAssetEntry {
    pub scene_path: String,
    pub exists_on_disk: bool,
    pub handle: Option<Handle<Scene>>,
}

impl ModelAssetEntry {
    fn from_config(
        config: &ModelAssetConfig,
        asset_server: &AssetServer,
        asset_root: &Path,
    ) -> Self {
        let exists_on_disk = asset_exists(asset_root, &config.scene_path);
        let handle = exists_on_disk.then(|| asset_server.load(config.scene_path.clone()));

        Self {
            scene_path: config.scene_path.clone(),
            exists_on_disk,
            handle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioAssetEntry {
    pub path: String,
    pub exists_on_disk: bool,
    pub handle: Option<Handle<AudioSource>>,
}

impl AudioAssetEntry {
    fn from_config(
        config: &AudioAssetConfig,
        asset_server: &AssetServer,
        asset_root: &Path,
    ) -> Self {
        let exists_on_disk = asset_exists(asset_root, &config.path);
        let handle = exists_on_disk.then(|| asset_server.load(config.path.clone()));

        Self {
            path: config.path.clone(),
            exists_on_disk,
            handle,
        }
    }
}

// The browser build cannot stat files; the server reports failures through the load state.
fn asset_exists(asset_root: &Path, path: &str) -> bool {
    if cfg!(target_arch = "wasm32") {
        return true;
    }
    let file_path = path.split('#').next().unwrap_or(path);
    asset_root.join(file_path).exists()
}
