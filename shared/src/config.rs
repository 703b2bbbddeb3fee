//! Typed configuration consumed by the simulation and network layers.
//!
//! Loading and caching config files is the embedding application's job;
//! the core only requires an already-parsed [`Config`] with valid values.
//! Every section implements `Default` so the server is runnable standalone,
//! and `Deserialize` so a launcher can overlay values from any format serde
//! supports.

use serde::Deserialize;
use thiserror::Error;

use crate::math::Vec2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("world dimensions must be positive and finite, got {width}x{height}")]
    InvalidWorld { width: f64, height: f64 },
    #[error("tick rate must be greater than zero")]
    InvalidTickRate,
    #[error("food min_count ({min}) must not exceed max_count ({max})")]
    InvalidFoodBounds { min: usize, max: usize },
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
}

/// Immutable-after-init world bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub width: f64,
    pub height: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            width: 2000.0,
            height: 2000.0,
        }
    }
}

impl WorldConfig {
    /// Clamps a position so a circle of `radius` stays inside the bounds.
    pub fn clamp_position(&self, position: Vec2, radius: f64) -> Vec2 {
        Vec2 {
            x: position.x.max(radius).min(self.width - radius),
            y: position.y.max(radius).min(self.height - radius),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub base_radius: f64,
    pub max_radius: f64,
    pub growth_factor: f64,
    pub growth_exponent: f64,
    pub base_speed: f64,
    /// Exponent on `base_radius / radius`; 0.0 disables the speed penalty
    /// for large players.
    pub speed_falloff: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            base_radius: 20.0,
            max_radius: 120.0,
            growth_factor: 1.0,
            growth_exponent: 0.5,
            base_speed: 220.0,
            speed_falloff: 0.4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FoodConfig {
    pub radius: f64,
    /// Score granted when consumed.
    pub value: u32,
    pub min_count: usize,
    pub max_count: usize,
    /// Replenishment cap, items per second.
    pub spawn_rate: f64,
    /// Newly spawned food keeps this distance from player centers.
    /// 0.0 disables the check.
    pub min_player_distance: f64,
}

impl Default for FoodConfig {
    fn default() -> Self {
        FoodConfig {
            radius: 6.0,
            value: 10,
            min_count: 60,
            max_count: 120,
            spawn_rate: 20.0,
            min_player_distance: 0.0,
        }
    }
}

/// Tunables for one skill. Durations are in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SkillConfig {
    pub base_radius: f64,
    pub radius_per_level: f64,
    pub force: f64,
    pub duration: f64,
    pub cooldown: f64,
    /// Targets larger than `player_radius * size_threshold_multiplier`
    /// resist the skill: push inverts onto the caster, pull has no effect.
    pub size_threshold_multiplier: f64,
}

impl Default for SkillConfig {
    fn default() -> Self {
        SkillConfig {
            base_radius: 80.0,
            radius_per_level: 20.0,
            force: 45.0,
            duration: 1.5,
            cooldown: 5.0,
            size_threshold_multiplier: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    pub push: SkillConfig,
    pub pull: SkillConfig,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        SkillsConfig {
            push: SkillConfig::default(),
            pull: SkillConfig {
                base_radius: 90.0,
                radius_per_level: 25.0,
                force: 35.0,
                duration: 1.5,
                cooldown: 6.0,
                size_threshold_multiplier: 1.25,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Simulation updates per second.
    pub tick_rate: u32,
    pub max_players: usize,
    /// Minimum radius ratio required for one player to eat another.
    pub eat_ratio_threshold: f64,
    /// Fraction of the victim's score awarded to the eater.
    pub eat_score_transfer: f64,
    pub respawn_cooldown_secs: f64,
    /// Spawn points keep this distance from other players' centers.
    pub min_spawn_distance: f64,
    /// Rejection-sampling attempts before falling back to the
    /// least-crowded candidate.
    pub spawn_attempts: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            tick_rate: 30,
            max_players: 10,
            eat_ratio_threshold: 1.2,
            eat_score_transfer: 1.0,
            respawn_cooldown_secs: 3.0,
            min_spawn_distance: 150.0,
            spawn_attempts: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    /// Frames with a larger length prefix close the connection before the
    /// payload is read.
    pub max_packet_bytes: usize,
    /// Keepalive window; sessions silent for longer are dropped.
    pub client_timeout_secs: f64,
    pub handshake_timeout_secs: f64,
    pub rate_limit_window_secs: f64,
    pub rate_limit_max_attempts: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_packet_bytes: 64 * 1024,
            client_timeout_secs: 10.0,
            handshake_timeout_secs: 5.0,
            rate_limit_window_secs: 60.0,
            rate_limit_max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SurvivalConfig {
    pub max_health: f64,
    pub max_calories: f64,
    pub max_hydration: f64,
    pub max_blood: f64,
    pub calories_drain_idle: f64,
    pub hydration_drain_idle: f64,
    pub move_mult: f64,
    pub sprint_mult: f64,
    pub crafting_mult: f64,
    pub starve_hp_loss: f64,
    pub dehydrate_hp_loss: f64,
    pub bleed_loss_per_sec: f64,
    pub low_blood_threshold: f64,
    pub low_blood_hp_loss: f64,
    pub infection_hp_loss: f64,
    pub hypothermia_temp: f64,
    pub hypothermia_hp_loss: f64,
    pub heatstroke_temp: f64,
    pub heatstroke_hydration_drain: f64,
}

impl Default for SurvivalConfig {
    fn default() -> Self {
        SurvivalConfig {
            max_health: 100.0,
            max_calories: 3000.0,
            max_hydration: 5000.0,
            max_blood: 5000.0,
            calories_drain_idle: 0.25,
            hydration_drain_idle: 0.4,
            move_mult: 1.5,
            sprint_mult: 2.5,
            crafting_mult: 1.2,
            starve_hp_loss: 1.0,
            dehydrate_hp_loss: 1.5,
            bleed_loss_per_sec: 20.0,
            low_blood_threshold: 3000.0,
            low_blood_hp_loss: 2.0,
            infection_hp_loss: 0.5,
            hypothermia_temp: 35.0,
            hypothermia_hp_loss: 1.0,
            heatstroke_temp: 40.0,
            heatstroke_hydration_drain: 2.0,
        }
    }
}

/// Root configuration handed to [`crate::config`] consumers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub world: WorldConfig,
    pub player: PlayerConfig,
    pub food: FoodConfig,
    pub skills: SkillsConfig,
    pub game: GameConfig,
    pub network: NetworkConfig,
    pub survival: SurvivalConfig,
}

impl Config {
    /// Rejects geometrically or numerically impossible configurations.
    /// Called once at startup; failures are fatal to the process.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.width <= 0.0
            || self.world.height <= 0.0
            || !self.world.width.is_finite()
            || !self.world.height.is_finite()
        {
            return Err(ConfigError::InvalidWorld {
                width: self.world.width,
                height: self.world.height,
            });
        }
        if self.game.tick_rate == 0 {
            return Err(ConfigError::InvalidTickRate);
        }
        if self.food.min_count > self.food.max_count {
            return Err(ConfigError::InvalidFoodBounds {
                min: self.food.min_count,
                max: self.food.max_count,
            });
        }
        if self.player.base_radius <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "player.base_radius",
                value: self.player.base_radius,
            });
        }
        if self.food.radius <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "food.radius",
                value: self.food.radius,
            });
        }
        if self.game.eat_ratio_threshold <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "game.eat_ratio_threshold",
                value: self.game.eat_ratio_threshold,
            });
        }
        Ok(())
    }
}
