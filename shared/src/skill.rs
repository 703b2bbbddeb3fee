//! Per-player skill instances and their activation state machines.
//!
//! A skill is either idle, active (for `duration` seconds after a
//! successful [`SkillState::activate`]), or cooling down. Cooldown is not a
//! stored state: it falls out of the `last_used` timestamp, so the state
//! machine cannot desynchronize from the clock. All transitions take an
//! explicit `now` so tests control time.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::SkillConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillKind {
    Push,
    Pull,
}

impl SkillKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillKind::Push => "push",
            SkillKind::Pull => "pull",
        }
    }

    /// Parses the `skill_name` field of a skill packet.
    pub fn from_name(name: &str) -> Option<SkillKind> {
        match name {
            "push" => Some(SkillKind::Push),
            "pull" => Some(SkillKind::Pull),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkillState {
    pub kind: SkillKind,
    pub level: u32,
    pub active: bool,
    config: SkillConfig,
    last_used: Option<Instant>,
    activated_at: Option<Instant>,
}

impl SkillState {
    pub fn new(kind: SkillKind, config: SkillConfig) -> Self {
        SkillState {
            kind,
            level: 1,
            active: false,
            config,
            last_used: None,
            activated_at: None,
        }
    }

    pub fn config(&self) -> &SkillConfig {
        &self.config
    }

    /// Attempts to fire the skill. Fails while active or while
    /// `now - last_used < cooldown`; on success the skill becomes active
    /// and both timestamps are set to `now`.
    pub fn activate(&mut self, now: Instant) -> bool {
        if self.active {
            return false;
        }
        if let Some(last) = self.last_used {
            if now.duration_since(last).as_secs_f64() < self.config.cooldown {
                return false;
            }
        }
        self.active = true;
        self.activated_at = Some(now);
        self.last_used = Some(now);
        true
    }

    /// Expires the active window once `duration` has elapsed.
    pub fn update(&mut self, now: Instant) {
        if self.active {
            if let Some(started) = self.activated_at {
                if now.duration_since(started).as_secs_f64() >= self.config.duration {
                    self.active = false;
                    self.activated_at = None;
                }
            }
        }
    }

    /// Skill reach: base radius, level bonus, plus the caster's own body
    /// radius so the area always extends beyond the caster's rim.
    pub fn effective_radius(&self, player_radius: f64) -> f64 {
        self.config.base_radius + self.level as f64 * self.config.radius_per_level + player_radius
    }

    pub fn remaining_cooldown(&self, now: Instant) -> f64 {
        match self.last_used {
            Some(last) => {
                (self.config.cooldown - now.duration_since(last).as_secs_f64()).max(0.0)
            }
            None => 0.0,
        }
    }

    /// Back to idle and ready, as if never used. Applied on respawn.
    pub fn reset(&mut self) {
        self.active = false;
        self.last_used = None;
        self.activated_at = None;
    }
}
