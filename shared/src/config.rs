//! Static match configuration.
//!
//! Values come from an optional TOML file (missing keys fall back to the
//! defaults below) and are validated once at startup. A configuration that
//! fails validation is fatal for the match: nothing is simulated with it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f32 },
    #[error("hits_to_medium must be at least 1")]
    HitsToMediumTooLow,
    #[error("hits_to_fast ({fast}) must be greater than hits_to_medium ({medium})")]
    HitThresholdsOutOfOrder { medium: u32, fast: u32 },
    #[error("score_to_win must be at least 1")]
    ScoreToWinTooLow,
    #[error("paddle_x ({paddle_x}) must lie inside the court half width ({half_width})")]
    PaddleOutsideCourt { paddle_x: f32, half_width: f32 },
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Court geometry, ball tuning and win condition of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Ball speed at the slow tier, in units per second.
    pub base_speed: f32,
    /// Paddle hits within one rally needed to reach the medium tier.
    pub hits_to_medium: u32,
    /// Paddle hits within one rally needed to reach the fast tier.
    pub hits_to_fast: u32,
    /// Paddle centres and the ball are kept within `[-h, h]`.
    pub half_court_height: f32,
    /// The ball crossing `|x| > w` is a goal.
    pub half_court_width: f32,
    pub paddle_height: f32,
    /// Distance of each paddle's face from the centre line.
    pub paddle_x: f32,
    pub ball_radius: f32,
    /// Paddle speed in units per second at full axis deflection.
    pub paddle_speed: f32,
    pub score_to_win: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            base_speed: 20.0,
            hits_to_medium: 4,
            hits_to_fast: 12,
            half_court_height: 4.5,
            half_court_width: 9.0,
            paddle_height: 1.5,
            paddle_x: 8.0,
            ball_radius: 0.25,
            paddle_speed: 12.0,
            score_to_win: 11,
        }
    }
}

impl MatchConfig {
    /// Reads and validates a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: MatchConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let dimensions = [
            ("base_speed", self.base_speed),
            ("half_court_height", self.half_court_height),
            ("half_court_width", self.half_court_width),
            ("paddle_height", self.paddle_height),
            ("paddle_x", self.paddle_x),
            ("ball_radius", self.ball_radius),
            ("paddle_speed", self.paddle_speed),
        ];
        for (name, value) in dimensions {
            // Also rejects NaN.
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        if self.hits_to_medium < 1 {
            return Err(ConfigError::HitsToMediumTooLow);
        }
        if self.hits_to_fast <= self.hits_to_medium {
            return Err(ConfigError::HitThresholdsOutOfOrder {
                medium: self.hits_to_medium,
                fast: self.hits_to_fast,
            });
        }
        if self.score_to_win < 1 {
            return Err(ConfigError::ScoreToWinTooLow);
        }
        if self.paddle_x >= self.half_court_width {
            return Err(ConfigError::PaddleOutsideCourt {
                paddle_x: self.paddle_x,
                half_width: self.half_court_width,
            });
        }
        Ok(())
    }

    /// Clamps a proposed paddle centre into the court.
    pub fn clamp_paddle_y(&self, y: f32) -> f32 {
        y.clamp(-self.half_court_height, self.half_court_height)
    }
}
