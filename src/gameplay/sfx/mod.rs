pub mod feedback;

use crate::assets::AssetRegistry;
use crate::config::GameConfig;
use crate::gameplay::vehicle::velocity::{VelocityFeed, VelocitySample, VelocitySubscription};
use crate::gameplay::vehicle::PlayerVehicle;
use crate::states::GameState;
use crate::web::AudioUnlockState;
use bevy::audio::{AudioPlayer, AudioSink, AudioSinkPlayback, PlaybackSettings, Volume};
use bevy::prelude::*;
use feedback::{AudioChannel, AudioFeedbackEngine, AudioState, EngineAudioTuning, PlaybackError};
use std::collections::HashSet;

pub struct GameplaySfxPlugin;

impl Plugin for GameplaySfxPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SfxMissingAssetWarnings>()
            .add_systems(
                OnEnter(GameState::InRun),
                (clear_sfx_warnings, insert_engine_audio_runtime),
            )
            .add_systems(OnExit(GameState::InRun), cleanup_sfx_entities)
            .add_systems(
                Update,
                (
                    ensure_audio_loops,
                    attach_velocity_subscription,
                    sync_engine_audio_tuning,
                    update_engine_audio_feedback,
                )
                    .chain()
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
struct EngineLoopAudio;

#[derive(Component)]
struct BackgroundMusicAudio;

/// Lives for one run. Dropping it releases the velocity subscription.
#[derive(Resource)]
pub struct EngineAudioRuntime {
    engine: AudioFeedbackEngine,
    subscription: Option<VelocitySubscription>,
}

impl EngineAudioRuntime {
    pub fn state(&self) -> AudioState {
        self.engine.state()
    }

    pub fn latest_sample(&self) -> Option<VelocitySample> {
        self.subscription
            .as_ref()
            .map(VelocitySubscription::latest)
    }
}

#[derive(Resource, Debug, Default)]
struct SfxMissingAssetWarnings {
    missing_ids: HashSet<String>,
}

/// Bevy sink behind the [`AudioChannel`] seam. The sink appears a few frames after the
/// player entity, once the source has decoded.
struct SinkChannel<'a> {
    sink: Option<Mut<'a, AudioSink>>,
    gain: f32,
}

impl AudioChannel for SinkChannel<'_> {
    fn play(&mut self) -> Result<(), PlaybackError> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(PlaybackError::NotReady);
        };
        sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.pause();
        }
    }

    fn set_volume(&mut self, volume: f32) {
        if let Some(sink) = self.sink.as_mut() {
            sink.set_volume(Volume::Linear((volume * self.gain).max(0.0)));
        }
    }

    fn set_playback_rate(&mut self, rate: f32) {
        if let Some(sink) = self.sink.as_mut() {
            sink.set_speed(rate.max(0.05));
        }
    }
}

fn clear_sfx_warnings(mut warnings: ResMut<SfxMissingAssetWarnings>) {
    warnings.missing_ids.clear();
}

fn insert_engine_audio_runtime(mut commands: Commands, config: Res<GameConfig>) {
    commands.insert_resource(EngineAudioRuntime {
        engine: AudioFeedbackEngine::new(EngineAudioTuning::from_sfx_config(&config.game.sfx)),
        subscription: None,
    });
}

#[allow(clippy::type_complexity)]
fn cleanup_sfx_entities(
    mut commands: Commands,
    sfx_query: Query<Entity, Or<(With<EngineLoopAudio>, With<BackgroundMusicAudio>)>>,
) {
    for entity in &sfx_query {
        commands.entity(entity).try_despawn();
    }
    commands.remove_resource::<EngineAudioRuntime>();
}

#[allow(clippy::type_complexity)]
fn ensure_audio_loops(
    mut commands: Commands,
    config: Res<GameConfig>,
    registry: Option<Res<AssetRegistry>>,
    mut warnings: ResMut<SfxMissingAssetWarnings>,
    engine_query: Query<Entity, With<EngineLoopAudio>>,
    music_query: Query<Entity, With<BackgroundMusicAudio>>,
) {
    if !config.game.sfx.enabled {
        for entity in engine_query.iter().chain(music_query.iter()) {
            commands.entity(entity).try_despawn();
        }
        return;
    }

    let Some(registry) = registry else {
        return;
    };

    if engine_query.is_empty() {
        if let Some(handle) =
            resolve_audio_handle(&config.game.sfx.engine_audio_id, &registry, &mut warnings)
        {
            commands.spawn((
                Name::new("SfxEngineLoop"),
                EngineLoopAudio,
                AudioPlayer::new(handle),
                PlaybackSettings::LOOP
                    .paused()
                    .with_volume(Volume::Linear(0.0)),
            ));
        }
    }

    if music_query.is_empty() {
        if let Some(handle) =
            resolve_audio_handle(&config.game.sfx.music_audio_id, &registry, &mut warnings)
        {
            commands.spawn((
                Name::new("SfxBackgroundMusicLoop"),
                BackgroundMusicAudio,
                AudioPlayer::new(handle),
                PlaybackSettings::LOOP
                    .paused()
                    .with_volume(Volume::Linear(0.0)),
            ));
        }
    }
}

fn resolve_audio_handle(
    audio_id: &str,
    registry: &AssetRegistry,
    warnings: &mut SfxMissingAssetWarnings,
) -> Option<Handle<AudioSource>> {
    let handle = registry.audio_handle(audio_id);
    if handle.is_none() && warnings.missing_ids.insert(audio_id.to_string()) {
        warn!("SFX audio asset `{audio_id}` is unavailable; that channel stays silent.");
    }
    handle
}

fn attach_velocity_subscription(
    runtime: Option<ResMut<EngineAudioRuntime>>,
    feed_query: Query<&VelocityFeed, With<PlayerVehicle>>,
) {
    let Some(mut runtime) = runtime else {
        return;
    };
    if runtime.subscription.is_some() {
        return;
    }
    let Ok(feed) = feed_query.single() else {
        return;
    };
    runtime.subscription = Some(feed.subscribe());
}

fn sync_engine_audio_tuning(config: Res<GameConfig>, runtime: Option<ResMut<EngineAudioRuntime>>) {
    if !config.is_changed() {
        return;
    }
    let Some(mut runtime) = runtime else {
        return;
    };
    runtime
        .engine
        .set_tuning(EngineAudioTuning::from_sfx_config(&config.game.sfx));
}

#[allow(clippy::type_complexity)]
fn update_engine_audio_feedback(
    config: Res<GameConfig>,
    unlock_state: Res<AudioUnlockState>,
    runtime: Option<ResMut<EngineAudioRuntime>>,
    mut engine_query: Query<Option<&mut AudioSink>, With<EngineLoopAudio>>,
    mut music_query: Query<
        Option<&mut AudioSink>,
        (With<BackgroundMusicAudio>, Without<EngineLoopAudio>),
    >,
) {
    let Some(mut runtime) = runtime else {
        return;
    };
    let runtime = &mut *runtime;

    if unlock_state.unlocked && runtime.engine.unlock() {
        info!("Audio unlocked; starting background music.");
    }

    let sample = runtime
        .subscription
        .as_ref()
        .map(VelocitySubscription::latest)
        .unwrap_or_default();

    let sfx = &config.game.sfx;
    let mut engine = SinkChannel {
        sink: engine_query.single_mut().ok().flatten(),
        gain: sfx.master_volume.max(0.0),
    };
    let mut music = SinkChannel {
        sink: music_query.single_mut().ok().flatten(),
        gain: sfx.master_volume.max(0.0),
    };

    runtime.engine.update(sample, &mut engine, &mut music);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use bevy::state::app::StatesPlugin;

    fn set_state(app: &mut App, state: GameState) {
        app.world_mut()
            .resource_mut::<NextState<GameState>>()
            .set(state);
        app.update();
        app.update();
    }

    #[test]
    fn leaving_the_run_releases_the_velocity_subscription() {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, StatesPlugin))
            .insert_resource(sample_config())
            .init_resource::<AudioUnlockState>()
            .init_state::<GameState>()
            .add_plugins(GameplaySfxPlugin);
        let vehicle = app
            .world_mut()
            .spawn((PlayerVehicle, VelocityFeed::default()))
            .id();

        set_state(&mut app, GameState::InRun);
        assert!(app.world().contains_resource::<EngineAudioRuntime>());
        let feed = app.world().get::<VelocityFeed>(vehicle).expect("vehicle keeps its feed");
        assert_eq!(feed.subscriber_count(), 1);

        set_state(&mut app, GameState::Loading);
        assert!(!app.world().contains_resource::<EngineAudioRuntime>());
        let feed = app.world().get::<VelocityFeed>(vehicle).expect("vehicle keeps its feed");
        assert_eq!(feed.subscriber_count(), 0);

        set_state(&mut app, GameState::InRun);
        let feed = app.world().get::<VelocityFeed>(vehicle).expect("vehicle keeps its feed");
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[test]
    fn missing_sink_reports_not_ready_and_ignores_setters() {
        let mut channel = SinkChannel {
            sink: None,
            gain: 0.5,
        };

        assert_eq!(channel.play(), Err(PlaybackError::NotReady));
        channel.pause();
        channel.set_volume(1.0);
        channel.set_playback_rate(2.0);
    }

    #[test]
    fn missing_audio_id_warns_once() {
        let registry = AssetRegistry::default();
        let mut warnings = SfxMissingAssetWarnings::default();

        assert!(resolve_audio_handle("engine_loop", &registry, &mut warnings).is_none());
        assert!(resolve_audio_handle("engine_loop", &registry, &mut warnings).is_none());
        assert_eq!(warnings.missing_ids.len(), 1);
    }
}
