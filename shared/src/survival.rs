//! Server-authoritative survival stats: hunger, hydration, blood and
//! temperature effects.
//!
//! This subsystem is a periodic extension point. The simulation core does
//! not call [`SurvivalSystem::update`] from its tick; an embedding that
//! wants survival pressure drives it at its own cadence. Player snapshots
//! expose `stats.health` either way.

use serde::{Deserialize, Serialize};

use crate::config::SurvivalConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalStats {
    pub health: f64,
    pub calories: f64,
    pub hydration: f64,
    pub blood: f64,
    pub bleeding: bool,
    pub infection: bool,
    /// Body temperature in Celsius.
    pub temperature: f64,
}

impl Default for SurvivalStats {
    fn default() -> Self {
        SurvivalStats {
            health: 100.0,
            calories: 3000.0,
            hydration: 5000.0,
            blood: 5000.0,
            bleeding: false,
            infection: false,
            temperature: 37.0,
        }
    }
}

impl SurvivalStats {
    pub fn clamp(&mut self, config: &SurvivalConfig) {
        self.health = self.health.max(0.0).min(config.max_health);
        self.calories = self.calories.max(0.0).min(config.max_calories);
        self.hydration = self.hydration.max(0.0).min(config.max_hydration);
        self.blood = self.blood.max(0.0).min(config.max_blood);
    }
}

/// What the player was doing during the elapsed interval; scales the
/// base drains.
#[derive(Debug, Clone, Copy, Default)]
pub struct Activity {
    pub moving: bool,
    pub sprinting: bool,
    pub crafting: bool,
}

pub struct SurvivalSystem {
    config: SurvivalConfig,
}

impl SurvivalSystem {
    pub fn new(config: SurvivalConfig) -> Self {
        SurvivalSystem { config }
    }

    /// Advances the stats by `dt` seconds.
    pub fn update(&self, stats: &mut SurvivalStats, dt: f64, activity: Activity) {
        let c = &self.config;

        let mut mult = 1.0;
        if activity.moving {
            mult *= c.move_mult;
        }
        if activity.sprinting {
            mult *= c.sprint_mult;
        }
        if activity.crafting {
            mult *= c.crafting_mult;
        }

        stats.calories -= c.calories_drain_idle * mult * dt;
        stats.hydration -= c.hydration_drain_idle * mult * dt;

        if stats.calories <= 0.0 {
            stats.health -= c.starve_hp_loss * dt;
        }
        if stats.hydration <= 0.0 {
            stats.health -= c.dehydrate_hp_loss * dt;
        }

        if stats.bleeding {
            stats.blood -= c.bleed_loss_per_sec * dt;
        }
        if stats.blood < c.low_blood_threshold {
            stats.health -= c.low_blood_hp_loss * dt;
        }

        if stats.infection {
            stats.health -= c.infection_hp_loss * dt;
        }

        if stats.temperature < c.hypothermia_temp {
            stats.health -= c.hypothermia_hp_loss * dt;
        } else if stats.temperature > c.heatstroke_temp {
            stats.hydration -= c.heatstroke_hydration_drain * dt;
        }

        stats.clamp(&self.config);
    }

    pub fn eat(&self, stats: &mut SurvivalStats, kcal: f64) {
        stats.calories += kcal.max(0.0);
        stats.clamp(&self.config);
    }

    pub fn drink(&self, stats: &mut SurvivalStats, amount: f64) {
        stats.hydration += amount.max(0.0);
        stats.clamp(&self.config);
    }

    pub fn take_damage(&self, stats: &mut SurvivalStats, hp: f64) {
        stats.health -= hp.max(0.0);
        stats.clamp(&self.config);
    }

    pub fn set_bleeding(&self, stats: &mut SurvivalStats, on: bool) {
        stats.bleeding = on;
    }

    pub fn bandage(&self, stats: &mut SurvivalStats) {
        stats.bleeding = false;
    }

    pub fn transfuse(&self, stats: &mut SurvivalStats, amount: f64) {
        stats.blood += amount.max(0.0);
        stats.clamp(&self.config);
    }

    pub fn set_infection(&self, stats: &mut SurvivalStats, on: bool) {
        stats.infection = on;
    }
}
