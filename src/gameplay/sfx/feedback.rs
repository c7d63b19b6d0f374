use crate::config::SfxConfig;
use crate::gameplay::vehicle::velocity::VelocitySample;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackError {
    /// The platform refused playback, e.g. browser autoplay policy.
    Locked,
    /// The sink behind the channel does not exist yet.
    NotReady,
}

impl Display for PlaybackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locked => write!(f, "audio playback is locked until a user gesture"),
            Self::NotReady => write!(f, "audio sink is not ready"),
        }
    }
}

impl Error for PlaybackError {}

/// One looping sound the feedback engine can drive.
pub trait AudioChannel {
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    fn set_volume(&mut self, volume: f32);
    fn set_playback_rate(&mut self, rate: f32);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineAudioTuning {
    pub speed_for_max_volume: f32,
    pub base_playback_rate: f32,
    pub speed_to_rate_scale: f32,
    pub max_playback_rate: f32,
    pub idle_speed: f32,
    pub music_volume: f32,
}

impl Default for EngineAudioTuning {
    fn default() -> Self {
        Self {
            speed_for_max_volume: 10.0,
            base_playback_rate: 0.5,
            speed_to_rate_scale: 20.0,
            max_playback_rate: 4.0,
            idle_speed: 0.0,
            music_volume: 0.3,
        }
    }
}

impl EngineAudioTuning {
    pub fn from_sfx_config(sfx: &SfxConfig) -> Self {
        Self {
            speed_for_max_volume: sfx.speed_for_max_volume_mps.max(f32::EPSILON),
            base_playback_rate: sfx.engine_base_playback_rate,
            speed_to_rate_scale: sfx.speed_to_rate_scale.max(f32::EPSILON),
            max_playback_rate: sfx.engine_max_playback_rate,
            idle_speed: sfx.engine_idle_speed_mps.max(0.0),
            music_volume: sfx.music_volume.clamp(0.0, 1.0),
        }
    }

    pub fn volume_for_speed(&self, speed: f32) -> f32 {
        (speed / self.speed_for_max_volume).clamp(0.0, 1.0)
    }

    pub fn rate_for_speed(&self, speed: f32) -> f32 {
        (self.base_playback_rate + speed.max(0.0) / self.speed_to_rate_scale)
            .min(self.max_playback_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioState {
    pub unlocked: bool,
    pub engine_volume: f32,
    pub engine_playback_rate: f32,
    pub engine_is_playing: bool,
}

impl AudioState {
    fn new(tuning: &EngineAudioTuning) -> Self {
        Self {
            unlocked: false,
            engine_volume: 0.0,
            engine_playback_rate: tuning.base_playback_rate,
            engine_is_playing: false,
        }
    }
}

/// Maps chassis speed to engine loudness and pitch and keeps background music running.
///
/// Nothing reaches either channel until [`AudioFeedbackEngine::unlock`] has been called.
#[derive(Debug, Clone)]
pub struct AudioFeedbackEngine {
    tuning: EngineAudioTuning,
    state: AudioState,
    music_started: bool,
}

impl AudioFeedbackEngine {
    pub fn new(tuning: EngineAudioTuning) -> Self {
        Self {
            state: AudioState::new(&tuning),
            tuning,
            music_started: false,
        }
    }

    pub fn state(&self) -> AudioState {
        self.state
    }

    pub fn music_started(&self) -> bool {
        self.music_started
    }

    pub fn set_tuning(&mut self, tuning: EngineAudioTuning) {
        self.tuning = tuning;
    }

    /// Returns true only for the call that performed the transition.
    pub fn unlock(&mut self) -> bool {
        if self.state.unlocked {
            return false;
        }
        self.state.unlocked = true;
        true
    }

    pub fn update(
        &mut self,
        sample: VelocitySample,
        engine: &mut impl AudioChannel,
        music: &mut impl AudioChannel,
    ) {
        let speed = sample.horizontal_speed();
        self.state.engine_volume = self.tuning.volume_for_speed(speed);
        self.state.engine_playback_rate = self.tuning.rate_for_speed(speed);

        if !self.state.unlocked {
            return;
        }

        if !self.music_started {
            music.set_volume(self.tuning.music_volume);
            self.music_started = music.play().is_ok();
        }

        engine.set_volume(self.state.engine_volume);
        engine.set_playback_rate(self.state.engine_playback_rate);

        let moving = speed > self.tuning.idle_speed;
        if moving && !self.state.engine_is_playing {
            self.state.engine_is_playing = engine.play().is_ok();
        } else if !moving && self.state.engine_is_playing {
            engine.pause();
            self.state.engine_is_playing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use bevy::prelude::Vec3;

    #[derive(Default)]
    struct MockChannel {
        plays: u32,
        pauses: u32,
        other_calls: u32,
        volume: f32,
        rate: f32,
        reject_plays: u32,
    }

    impl MockChannel {
        fn total_calls(&self) -> u32 {
            self.plays + self.pauses + self.other_calls
        }
    }

    impl AudioChannel for MockChannel {
        fn play(&mut self) -> Result<(), PlaybackError> {
            self.plays += 1;
            if self.reject_plays > 0 {
                self.reject_plays -= 1;
                return Err(PlaybackError::NotReady);
            }
            Ok(())
        }

        fn pause(&mut self) {
            self.pauses += 1;
        }

        fn set_volume(&mut self, volume: f32) {
            self.other_calls += 1;
            self.volume = volume;
        }

        fn set_playback_rate(&mut self, rate: f32) {
            self.other_calls += 1;
            self.rate = rate;
        }
    }

    fn moving_at(speed: f32) -> VelocitySample {
        VelocitySample(Vec3::new(speed, 0.0, 0.0))
    }

    #[test]
    fn standing_still_is_silent_at_base_rate() {
        let mut engine = AudioFeedbackEngine::new(EngineAudioTuning::default());
        engine.unlock();
        let (mut engine_channel, mut music_channel) = (MockChannel::default(), MockChannel::default());

        engine.update(moving_at(0.0), &mut engine_channel, &mut music_channel);

        let state = engine.state();
        assert_eq!(state.engine_volume, 0.0);
        assert_eq!(state.engine_playback_rate, 0.5);
        assert!(!state.engine_is_playing);
        assert_eq!(engine_channel.plays, 0);
    }

    #[test]
    fn speed_for_max_volume_reaches_full_volume() {
        let mut engine = AudioFeedbackEngine::new(EngineAudioTuning::default());
        engine.unlock();
        let (mut engine_channel, mut music_channel) = (MockChannel::default(), MockChannel::default());

        engine.update(moving_at(10.0), &mut engine_channel, &mut music_channel);

        assert_eq!(engine.state().engine_volume, 1.0);
        assert_eq!(engine_channel.volume, 1.0);
        assert_eq!(engine_channel.rate, 1.0);
    }

    #[test]
    fn speed_uses_ground_plane_only() {
        let tuning = EngineAudioTuning::default();
        let mut engine = AudioFeedbackEngine::new(tuning);
        let (mut engine_channel, mut music_channel) = (MockChannel::default(), MockChannel::default());

        engine.update(
            VelocitySample(Vec3::new(3.0, -50.0, 4.0)),
            &mut engine_channel,
            &mut music_channel,
        );

        assert!((engine.state().engine_volume - 0.5).abs() < 1e-6);
    }

    #[test]
    fn locked_engine_makes_no_channel_calls_then_plays_once_after_unlock() {
        let mut engine = AudioFeedbackEngine::new(EngineAudioTuning::default());
        let (mut engine_channel, mut music_channel) = (MockChannel::default(), MockChannel::default());

        engine.update(moving_at(0.0), &mut engine_channel, &mut music_channel);
        engine.update(moving_at(5.0), &mut engine_channel, &mut music_channel);
        assert_eq!(engine_channel.total_calls(), 0);
        assert_eq!(music_channel.total_calls(), 0);
        assert!(!engine.state().engine_is_playing);

        assert!(engine.unlock());
        assert!(!engine.unlock());

        engine.update(moving_at(0.0), &mut engine_channel, &mut music_channel);
        engine.update(moving_at(5.0), &mut engine_channel, &mut music_channel);

        assert_eq!(engine_channel.plays, 1);
        assert_eq!(engine_channel.pauses, 0);
        assert!(engine.state().engine_is_playing);
        assert_eq!(music_channel.plays, 1);
    }

    #[test]
    fn music_starts_at_its_own_level_independent_of_speed() {
        let mut engine = AudioFeedbackEngine::new(EngineAudioTuning {
            music_volume: 0.3,
            ..Default::default()
        });
        engine.unlock();
        let (mut engine_channel, mut music_channel) = (MockChannel::default(), MockChannel::default());

        engine.update(moving_at(10.0), &mut engine_channel, &mut music_channel);

        assert_eq!(music_channel.volume, 0.3);
        assert_eq!(engine_channel.volume, 1.0);
    }

    #[test]
    fn music_level_follows_sfx_config() {
        let mut sfx = sample_config().game.sfx;
        assert_eq!(EngineAudioTuning::from_sfx_config(&sfx).music_volume, 0.3);

        sfx.music_volume = 1.7;
        assert_eq!(EngineAudioTuning::from_sfx_config(&sfx).music_volume, 1.0);
    }

    #[test]
    fn repeated_sample_issues_no_extra_play_or_pause() {
        let mut engine = AudioFeedbackEngine::new(EngineAudioTuning::default());
        engine.unlock();
        let (mut engine_channel, mut music_channel) = (MockChannel::default(), MockChannel::default());

        engine.update(moving_at(4.0), &mut engine_channel, &mut music_channel);
        engine.update(moving_at(4.0), &mut engine_channel, &mut music_channel);
        assert_eq!((engine_channel.plays, engine_channel.pauses), (1, 0));

        engine.update(moving_at(0.0), &mut engine_channel, &mut music_channel);
        engine.update(moving_at(0.0), &mut engine_channel, &mut music_channel);
        assert_eq!((engine_channel.plays, engine_channel.pauses), (1, 1));
        assert!(!engine.state().engine_is_playing);
    }

    #[test]
    fn rejected_play_is_retried_on_a_later_frame() {
        let mut engine = AudioFeedbackEngine::new(EngineAudioTuning::default());
        engine.unlock();
        let mut engine_channel = MockChannel {
            reject_plays: 1,
            ..Default::default()
        };
        let mut music_channel = MockChannel {
            reject_plays: 2,
            ..Default::default()
        };

        engine.update(moving_at(3.0), &mut engine_channel, &mut music_channel);
        assert!(!engine.state().engine_is_playing);
        assert!(!engine.music_started());

        engine.update(moving_at(3.0), &mut engine_channel, &mut music_channel);
        assert!(engine.state().engine_is_playing);
        assert!(!engine.music_started());

        engine.update(moving_at(3.0), &mut engine_channel, &mut music_channel);
        engine.update(moving_at(3.0), &mut engine_channel, &mut music_channel);
        assert!(engine.music_started());
        assert_eq!(engine_channel.plays, 2);
        assert_eq!(music_channel.plays, 3);
    }

    #[test]
    fn volume_is_monotonic_until_clamped() {
        let tuning = EngineAudioTuning::default();
        let mut previous = 0.0;
        for step in 0..=30 {
            let speed = step as f32 * 0.5;
            let volume = tuning.volume_for_speed(speed);
            assert!(volume >= previous);
            if speed >= tuning.speed_for_max_volume {
                assert_eq!(volume, 1.0);
            }
            previous = volume;
        }
    }

    #[test]
    fn playback_rate_is_capped() {
        let tuning = EngineAudioTuning::default();
        assert_eq!(tuning.rate_for_speed(1_000.0), 4.0);
        assert_eq!(tuning.rate_for_speed(20.0), 1.5);
    }

    #[test]
    fn idle_threshold_keeps_crawling_car_quiet() {
        let mut engine = AudioFeedbackEngine::new(EngineAudioTuning {
            idle_speed: 0.05,
            ..Default::default()
        });
        engine.unlock();
        let (mut engine_channel, mut music_channel) = (MockChannel::default(), MockChannel::default());

        engine.update(moving_at(0.01), &mut engine_channel, &mut music_channel);
        assert_eq!(engine_channel.plays, 0);

        engine.update(moving_at(0.2), &mut engine_channel, &mut music_channel);
        assert_eq!(engine_channel.plays, 1);
    }
}
