//! Entity model: players, food, and the geometry they share.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{PlayerConfig, SkillsConfig};
use crate::math::Vec2;
use crate::skill::{SkillKind, SkillState};
use crate::survival::SurvivalStats;

pub const MIN_NAME_LENGTH: usize = 3;
pub const MAX_NAME_LENGTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Food,
}

/// Anything with a position and a circular body.
pub trait Entity {
    fn position(&self) -> Vec2;
    fn radius(&self) -> f64;
    fn color(&self) -> &str;
    fn kind(&self) -> EntityKind;

    fn distance_to(&self, other: &dyn Entity) -> f64 {
        self.position().distance_to(other.position())
    }

    /// True when the two bodies touch or overlap.
    fn overlaps(&self, other: &dyn Entity) -> bool {
        self.distance_to(other) <= self.radius() + other.radius()
    }
}

/// Checks the `name` field of a connect packet: 3-20 characters drawn from
/// ASCII alphanumerics, underscore, and dash. Uniqueness is the
/// simulation's job since it requires the connected-player registry.
pub fn validate_name(name: &str) -> Result<(), String> {
    let len = name.chars().count();
    if len < MIN_NAME_LENGTH || len > MAX_NAME_LENGTH {
        return Err(format!(
            "name must be {}-{} characters, got {}",
            MIN_NAME_LENGTH, MAX_NAME_LENGTH, len
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("name may only contain letters, digits, '_' and '-'".to_string());
    }
    Ok(())
}

pub fn random_color() -> String {
    let colors = [
        "#FF4136", "#FF6B35", "#FFDC00", "#2ECC40", "#0074D9", "#7FDBFF", "#B10DC9", "#F012BE",
        "#FF69B4", "#01FF70", "#3D9970", "#39CCCC",
    ];
    let mut rng = rand::thread_rng();
    colors[rng.gen_range(0..colors.len())].to_string()
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub position: Vec2,
    pub score: u32,
    pub alive: bool,
    /// Highest movement sequence applied; stale packets are discarded.
    pub last_move_sequence: u32,
    pub stats: SurvivalStats,
    pub skills: HashMap<SkillKind, SkillState>,
    pending_intent: Vec2,
    config: PlayerConfig,
}

impl Player {
    pub fn new(
        id: u32,
        name: String,
        position: Vec2,
        player_config: &PlayerConfig,
        skills_config: &SkillsConfig,
    ) -> Self {
        let mut skills = HashMap::new();
        skills.insert(
            SkillKind::Push,
            SkillState::new(SkillKind::Push, skills_config.push.clone()),
        );
        skills.insert(
            SkillKind::Pull,
            SkillState::new(SkillKind::Pull, skills_config.pull.clone()),
        );

        Player {
            id,
            name,
            color: random_color(),
            position,
            score: 0,
            alive: true,
            last_move_sequence: 0,
            stats: SurvivalStats::default(),
            skills,
            pending_intent: Vec2::ZERO,
            config: player_config.clone(),
        }
    }

    /// Body radius derived from score:
    /// `clamp(base + (score * growth_factor) ^ growth_exponent, base, max)`.
    /// Recomputed on read so it can never drift from the score.
    pub fn radius(&self) -> f64 {
        let grown = (self.score as f64 * self.config.growth_factor)
            .powf(self.config.growth_exponent);
        let radius = self.config.base_radius + grown;
        if !radius.is_finite() {
            return self.config.max_radius;
        }
        radius
            .max(self.config.base_radius)
            .min(self.config.max_radius)
    }

    /// Movement speed, reduced as the body grows.
    pub fn speed(&self) -> f64 {
        let ratio = self.config.base_radius / self.radius();
        self.config.base_speed * ratio.powf(self.config.speed_falloff)
    }

    pub fn grow(&mut self, amount: u32) {
        self.score = self.score.saturating_add(amount);
    }

    /// Records a movement intent if `sequence` is fresher than anything
    /// applied so far. The direction is normalized (corrupt values become
    /// zero) and overwrites any intent from earlier in the same tick.
    pub fn record_move(&mut self, dx: f64, dy: f64, sequence: u32) -> bool {
        if sequence <= self.last_move_sequence {
            return false;
        }
        self.last_move_sequence = sequence;
        self.pending_intent = Vec2::new(dx, dy).normalized_or_zero();
        true
    }

    /// Consumes the pending intent; absent a new move packet the player
    /// stands still next tick.
    pub fn take_intent(&mut self) -> Vec2 {
        std::mem::take(&mut self.pending_intent)
    }

    pub fn pending_intent(&self) -> Vec2 {
        self.pending_intent
    }

    pub fn skill_mut(&mut self, kind: SkillKind) -> Option<&mut SkillState> {
        self.skills.get_mut(&kind)
    }

    pub fn skill_active(&self, kind: SkillKind) -> bool {
        self.skills.get(&kind).map(|s| s.active).unwrap_or(false)
    }

    /// Re-enters the world after death: fresh position, zero score, idle
    /// skills, full survival stats. Identity (id, name, color) survives.
    pub fn reset_for_respawn(&mut self, position: Vec2) {
        self.position = position;
        self.score = 0;
        self.alive = true;
        self.pending_intent = Vec2::ZERO;
        self.stats = SurvivalStats::default();
        for skill in self.skills.values_mut() {
            skill.reset();
        }
    }
}

impl Entity for Player {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn radius(&self) -> f64 {
        Player::radius(self)
    }

    fn color(&self) -> &str {
        &self.color
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Player
    }
}

#[derive(Debug, Clone)]
pub struct Food {
    pub id: u32,
    pub position: Vec2,
    pub radius: f64,
    pub color: String,
    pub value: u32,
}

impl Food {
    pub fn new(id: u32, position: Vec2, radius: f64, value: u32) -> Self {
        Food {
            id,
            position,
            // radius > 0 is an entity invariant; clamp rather than panic
            radius: radius.max(f64::MIN_POSITIVE),
            color: random_color(),
            value,
        }
    }
}

impl Entity for Food {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn radius(&self) -> f64 {
        self.radius
    }

    fn color(&self) -> &str {
        &self.color
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Food
    }
}
