use std::path::Path;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

use crate::render::ease::Ease;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Directory or `http(s)://` URL holding `manifest.json` and the slide data.
    pub data_root: String,
    pub playback: PlaybackOptions,
    pub preload: PreloadOptions,
    pub surface_ready: SurfaceRetry,
    /// Capacity of the presentation event channel.
    pub event_buffer: usize,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(!self.data_root.trim().is_empty(), "data-root must be set");
        ensure!(
            self.event_buffer > 0,
            "event-buffer must be greater than zero"
        );
        self.playback.validate()?;
        self.preload.validate()?;
        self.surface_ready.validate()?;
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            data_root: "data".into(),
            playback: PlaybackOptions::default(),
            preload: PreloadOptions::default(),
            surface_ready: SurfaceRetry::default(),
            event_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PlaybackOptions {
    /// Length of each triangle tween.
    #[serde(with = "humantime_serde")]
    pub transition_duration: Duration,
    /// Hold time after a transition before the next one starts.
    #[serde(with = "humantime_serde")]
    pub display_duration: Duration,
    /// Delay applied to the bottom-most triangles; the top row starts at once.
    #[serde(with = "humantime_serde")]
    pub max_stagger_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub frame_interval: Duration,
    pub easing: Ease,
}

impl PlaybackOptions {
    /// Time between two advances.
    pub fn period(&self) -> Duration {
        self.transition_duration + self.display_duration
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            !self.transition_duration.is_zero(),
            "playback.transition-duration must be positive"
        );
        ensure!(
            !self.display_duration.is_zero(),
            "playback.display-duration must be positive"
        );
        ensure!(
            !self.frame_interval.is_zero(),
            "playback.frame-interval must be positive"
        );
        ensure!(
            self.max_stagger_delay <= self.display_duration,
            "playback.max-stagger-delay ({}) must not exceed playback.display-duration ({})",
            humantime::format_duration(self.max_stagger_delay),
            humantime::format_duration(self.display_duration)
        );
        Ok(())
    }
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            transition_duration: Duration::from_secs(5),
            display_duration: Duration::from_secs(7),
            max_stagger_delay: Duration::from_secs(4),
            frame_interval: Duration::from_millis(16),
            easing: Ease::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PreloadOptions {
    /// Slides to keep warm ahead of the current one.
    pub count: usize,
    pub max_concurrent: usize,
}

impl PreloadOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.max_concurrent > 0,
            "preload.max-concurrent must be greater than zero"
        );
        Ok(())
    }
}

impl Default for PreloadOptions {
    fn default() -> Self {
        Self {
            count: 2,
            max_concurrent: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SurfaceRetry {
    pub attempts: u32,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl SurfaceRetry {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.attempts > 0,
            "surface-ready.attempts must be greater than zero"
        );
        Ok(())
    }
}

impl Default for SurfaceRetry {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(100),
        }
    }
}
