//! Authoritative simulation core.
//!
//! All world mutation funnels through [`GameManager`]. Sessions record
//! intents and skill activations under the shared lock; the tick loop then
//! runs the fixed-order state transition and publishes an immutable
//! snapshot frame for broadcast. The step order is part of the contract:
//! reordering it changes collision outcomes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::Rng;

use shared::config::Config;
use shared::entity::{EntityKind, Food, Player};
use shared::protocol::{encode_frame, FoodSnapshot, Packet, PlayerSnapshot};
use shared::skill::SkillKind;
use shared::Vec2;

use crate::grid::SpatialGrid;
use crate::utils::get_timestamp;

/// Why a handshake could not create a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    NameTaken,
    ServerFull,
}

/// A dead player waiting out the respawn cooldown. Identity is retained;
/// world state is rebuilt on re-entry.
struct PendingRespawn {
    player: Player,
    ready_at: Instant,
}

/// Outcome of the radial force computation for one caster/target pair.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SkillEffect {
    None,
    MoveTarget(Vec2),
    /// Oversized push target: the force lands on the caster instead.
    MoveCaster(Vec2),
}

pub struct GameManager {
    config: Arc<Config>,
    players: HashMap<u32, Player>,
    food: Vec<Food>,
    respawns: Vec<PendingRespawn>,
    tick: u64,
    next_food_id: u32,
    food_spawn_budget: f64,
    latest_frame: Option<Arc<Vec<u8>>>,
}

impl GameManager {
    pub fn new(config: Arc<Config>) -> Self {
        let mut manager = GameManager {
            config,
            players: HashMap::new(),
            food: Vec::new(),
            respawns: Vec::new(),
            tick: 0,
            next_food_id: 0,
            food_spawn_budget: 0.0,
            latest_frame: None,
        };
        for _ in 0..manager.config.food.min_count {
            manager.spawn_food();
        }
        manager
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Active players plus those waiting to respawn; the number a capacity
    /// check has to count.
    pub fn player_count(&self) -> usize {
        self.players.len() + self.respawns.len()
    }

    pub fn food_count(&self) -> usize {
        self.food.len()
    }

    pub fn latest_frame(&self) -> Option<Arc<Vec<u8>>> {
        self.latest_frame.clone()
    }

    /// Creates the player for a successful handshake. Capacity and name
    /// uniqueness are checked under the same lock that inserts, so two
    /// simultaneous connects with the same name cannot both win.
    pub fn try_add_player(&mut self, id: u32, name: &str) -> Result<Vec2, JoinError> {
        if self.player_count() >= self.config.game.max_players {
            return Err(JoinError::ServerFull);
        }
        let taken = self.players.values().any(|p| p.name == name)
            || self.respawns.iter().any(|r| r.player.name == name);
        if taken {
            return Err(JoinError::NameTaken);
        }

        let spawn = self.spawn_point();
        let player = Player::new(
            id,
            name.to_string(),
            spawn,
            &self.config.player,
            &self.config.skills,
        );
        info!(
            "Player '{}' (ID: {}) spawned at ({:.0}, {:.0})",
            name, id, spawn.x, spawn.y
        );
        self.players.insert(id, player);
        Ok(spawn)
    }

    /// Drops a player entirely (disconnect). Safe to call twice.
    pub fn remove_player(&mut self, id: u32) {
        if let Some(player) = self.players.remove(&id) {
            info!("Player '{}' (ID: {}) removed", player.name, id);
        }
        self.respawns.retain(|r| r.player.id != id);
    }

    pub fn record_move(&mut self, id: u32, dx: f64, dy: f64, sequence: u32) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => player.record_move(dx, dy, sequence),
            None => false,
        }
    }

    pub fn activate_skill(&mut self, id: u32, kind: SkillKind, now: Instant) -> bool {
        match self.players.get_mut(&id).and_then(|p| p.skill_mut(kind)) {
            Some(skill) => skill.activate(now),
            None => false,
        }
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    /// One authoritative simulation step. The order of the phases is fixed.
    pub fn step(&mut self, dt: f64, now: Instant) {
        self.tick += 1;
        self.apply_intents(dt);
        self.resolve_skills(now);
        self.resolve_food_collisions();
        self.resolve_player_collisions();
        self.process_deaths_and_respawns(now);
        self.replenish_food(dt);
        self.publish_snapshot();
    }

    fn sorted_player_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.players.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn apply_intents(&mut self, dt: f64) {
        let world = &self.config.world;
        for player in self.players.values_mut() {
            let intent = player.take_intent();
            if intent != Vec2::ZERO {
                let step = intent.scale(player.speed() * dt);
                player.position = player.position.add(step);
            }
            player.position = world.clamp_position(player.position, player.radius());
        }
        for food in &mut self.food {
            food.position = world.clamp_position(food.position, food.radius);
        }
    }

    fn resolve_skills(&mut self, now: Instant) {
        for player in self.players.values_mut() {
            for skill in player.skills.values_mut() {
                skill.update(now);
            }
        }

        // Casters act in id order so concurrent skills resolve the same
        // way every tick.
        let ids = self.sorted_player_ids();
        for &caster_id in &ids {
            for kind in [SkillKind::Push, SkillKind::Pull] {
                let (caster_pos, caster_radius, eff_radius, force, threshold) = {
                    let caster = match self.players.get(&caster_id) {
                        Some(p) => p,
                        None => continue,
                    };
                    let skill = match caster.skills.get(&kind) {
                        Some(s) if s.active => s,
                        _ => continue,
                    };
                    let radius = caster.radius();
                    (
                        caster.position,
                        radius,
                        skill.effective_radius(radius),
                        skill.config().force,
                        skill.config().size_threshold_multiplier,
                    )
                };

                let mut caster_displacement = Vec2::ZERO;

                for &target_id in &ids {
                    if target_id == caster_id {
                        continue;
                    }
                    let (target_pos, target_radius) = match self.players.get(&target_id) {
                        Some(t) => (t.position, t.radius()),
                        None => continue,
                    };
                    match radial_effect(
                        kind,
                        caster_pos,
                        caster_radius,
                        eff_radius,
                        force,
                        threshold,
                        target_pos,
                        target_radius,
                    ) {
                        SkillEffect::MoveTarget(d) => {
                            if let Some(target) = self.players.get_mut(&target_id) {
                                let radius = target.radius();
                                target.position = self
                                    .config
                                    .world
                                    .clamp_position(target.position.add(d), radius);
                            }
                        }
                        SkillEffect::MoveCaster(d) => {
                            caster_displacement = caster_displacement.add(d);
                        }
                        SkillEffect::None => {}
                    }
                }

                for food in &mut self.food {
                    match radial_effect(
                        kind,
                        caster_pos,
                        caster_radius,
                        eff_radius,
                        force,
                        threshold,
                        food.position,
                        food.radius,
                    ) {
                        SkillEffect::MoveTarget(d) => {
                            food.position = self
                                .config
                                .world
                                .clamp_position(food.position.add(d), food.radius);
                        }
                        // Food can never out-size a player with sane
                        // configs; ignore the degenerate case.
                        SkillEffect::MoveCaster(_) | SkillEffect::None => {}
                    }
                }

                if caster_displacement != Vec2::ZERO {
                    if let Some(caster) = self.players.get_mut(&caster_id) {
                        let radius = caster.radius();
                        caster.position = self
                            .config
                            .world
                            .clamp_position(caster.position.add(caster_displacement), radius);
                    }
                }
            }
        }
    }

    fn resolve_food_collisions(&mut self) {
        if self.food.is_empty() || self.players.is_empty() {
            return;
        }

        let cell_size = self.config.player.max_radius + self.config.food.radius;
        let mut grid = SpatialGrid::new(cell_size);
        for (i, food) in self.food.iter().enumerate() {
            grid.insert(food.position, i);
        }

        let mut consumed = vec![false; self.food.len()];
        for id in self.sorted_player_ids() {
            let (position, radius) = match self.players.get(&id) {
                Some(p) => (p.position, p.radius()),
                None => continue,
            };

            let mut gained = 0u32;
            for i in grid.query_circle(position, radius + self.config.food.radius) {
                if consumed[i] {
                    continue;
                }
                let food = &self.food[i];
                if position.distance_to(food.position) <= radius + food.radius {
                    consumed[i] = true;
                    gained += food.value;
                }
            }

            if gained > 0 {
                if let Some(player) = self.players.get_mut(&id) {
                    player.grow(gained);
                    debug!("Player {} ate food worth {}", id, gained);
                }
            }
        }

        let mut index = 0;
        self.food.retain(|_| {
            let keep = !consumed[index];
            index += 1;
            keep
        });
    }

    fn resolve_player_collisions(&mut self) {
        let ids = self.sorted_player_ids();
        let threshold = self.config.game.eat_ratio_threshold;

        // victim id -> (eater id, eater radius); the largest eligible
        // eater wins, ties broken by lowest id.
        let mut chosen: HashMap<u32, (u32, f64)> = HashMap::new();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let pa = &self.players[&a];
                let pb = &self.players[&b];
                let (ra, rb) = (pa.radius(), pb.radius());
                if pa.position.distance_to(pb.position) > ra + rb {
                    continue;
                }

                let (eater, victim, eater_radius) = if ra >= rb * threshold {
                    (a, b, ra)
                } else if rb >= ra * threshold {
                    (b, a, rb)
                } else {
                    continue;
                };

                let better = match chosen.get(&victim) {
                    Some(&(current_id, current_radius)) => {
                        eater_radius > current_radius
                            || (eater_radius == current_radius && eater < current_id)
                    }
                    None => true,
                };
                if better {
                    chosen.insert(victim, (eater, eater_radius));
                }
            }
        }

        let mut kills: Vec<(u32, u32)> = chosen
            .into_iter()
            .map(|(victim, (eater, _))| (victim, eater))
            .collect();
        kills.sort_unstable();

        for (victim_id, eater_id) in kills {
            let (reward, victim_name) = {
                let victim = &self.players[&victim_id];
                (
                    (victim.score as f64 * self.config.game.eat_score_transfer).round() as u32,
                    victim.name.clone(),
                )
            };
            if let Some(eater) = self.players.get_mut(&eater_id) {
                eater.grow(reward);
                info!("Player '{}' ate '{}' (+{})", eater.name, victim_name, reward);
            }
            if let Some(victim) = self.players.get_mut(&victim_id) {
                victim.alive = false;
            }
        }
    }

    fn process_deaths_and_respawns(&mut self, now: Instant) {
        let mut dead: Vec<u32> = self
            .players
            .iter()
            .filter(|(_, p)| !p.alive)
            .map(|(id, _)| *id)
            .collect();
        dead.sort_unstable();

        let cooldown = Duration::from_secs_f64(self.config.game.respawn_cooldown_secs.max(0.0));
        for id in dead {
            if let Some(player) = self.players.remove(&id) {
                debug!(
                    "Player '{}' (ID: {}) waiting {:.1}s to respawn",
                    player.name, id, self.config.game.respawn_cooldown_secs
                );
                self.respawns.push(PendingRespawn {
                    player,
                    ready_at: now + cooldown,
                });
            }
        }

        let mut i = 0;
        while i < self.respawns.len() {
            if self.respawns[i].ready_at <= now {
                let mut pending = self.respawns.remove(i);
                let spawn = self.spawn_point();
                pending.player.reset_for_respawn(spawn);
                info!(
                    "Player '{}' (ID: {}) respawned at ({:.0}, {:.0})",
                    pending.player.name, pending.player.id, spawn.x, spawn.y
                );
                self.players.insert(pending.player.id, pending.player);
            } else {
                i += 1;
            }
        }
    }

    fn replenish_food(&mut self, dt: f64) {
        let cfg = &self.config.food;
        // The budget accumulates fractionally and is capped at one
        // second's worth so an idle stretch cannot bank a burst.
        self.food_spawn_budget =
            (self.food_spawn_budget + cfg.spawn_rate * dt).min(cfg.spawn_rate.max(1.0));

        if self.food.len() >= cfg.min_count {
            return;
        }
        let deficit = cfg.min_count - self.food.len();
        let room = cfg.max_count.saturating_sub(self.food.len());
        let allowed = (self.food_spawn_budget.floor() as usize)
            .min(deficit)
            .min(room);
        for _ in 0..allowed {
            self.spawn_food();
        }
        self.food_spawn_budget -= allowed as f64;
    }

    fn spawn_food(&mut self) {
        let cfg = &self.config.food;
        let min_dist = cfg.min_player_distance;

        let mut position = self.random_position(cfg.radius);
        if min_dist > 0.0 {
            for _ in 0..8 {
                if self.clearance(position) >= min_dist {
                    break;
                }
                position = self.random_position(cfg.radius);
            }
        }

        let id = self.next_food_id;
        self.next_food_id = self.next_food_id.wrapping_add(1);
        self.food
            .push(Food::new(id, position, cfg.radius, cfg.value));
    }

    /// Picks a spawn point at least `min_spawn_distance` from every active
    /// player's edge. The search is attempt-capped; a saturated world
    /// falls back to the least-crowded candidate seen instead of spinning.
    pub fn spawn_point(&self) -> Vec2 {
        let radius = self.config.player.base_radius;
        let min_dist = self.config.game.min_spawn_distance;
        let attempts = self.config.game.spawn_attempts.max(1);

        let mut best = self.random_position(radius);
        let mut best_clearance = self.clearance(best);

        for _ in 0..attempts {
            let candidate = self.random_position(radius);
            let clearance = self.clearance(candidate);
            if clearance >= min_dist {
                return candidate;
            }
            if clearance > best_clearance {
                best = candidate;
                best_clearance = clearance;
            }
        }
        debug!("spawn search exhausted, using least-crowded candidate");
        best
    }

    /// Distance from `point` to the nearest active player's edge;
    /// infinite on an empty map.
    fn clearance(&self, point: Vec2) -> f64 {
        self.players
            .values()
            .map(|p| point.distance_to(p.position) - p.radius())
            .fold(f64::INFINITY, f64::min)
    }

    fn random_position(&self, radius: f64) -> Vec2 {
        let mut rng = rand::thread_rng();
        let world = &self.config.world;
        let x = if world.width - radius > radius {
            rng.gen_range(radius..world.width - radius)
        } else {
            world.width / 2.0
        };
        let y = if world.height - radius > radius {
            rng.gen_range(radius..world.height - radius)
        } else {
            world.height / 2.0
        };
        Vec2::new(x, y)
    }

    /// Builds the immutable per-tick state copy.
    pub fn snapshot(&self) -> Packet {
        let players: HashMap<String, PlayerSnapshot> = self
            .players
            .values()
            .map(|p| {
                (
                    p.id.to_string(),
                    PlayerSnapshot {
                        id: p.id,
                        name: p.name.clone(),
                        position: p.position,
                        radius: p.radius(),
                        score: p.score,
                        health: Some(p.stats.health),
                        color: p.color.clone(),
                        skills: p
                            .skills
                            .iter()
                            .map(|(kind, skill)| (kind.as_str().to_string(), skill.active))
                            .collect(),
                    },
                )
            })
            .collect();

        let food = self
            .food
            .iter()
            .map(|f| FoodSnapshot {
                id: f.id,
                position: f.position,
                kind: EntityKind::Food,
                value: f.value,
            })
            .collect();

        Packet::GameState {
            players,
            food,
            server_tick: self.tick,
            timestamp: get_timestamp(),
        }
    }

    fn publish_snapshot(&mut self) {
        match encode_frame(&self.snapshot()) {
            Ok(frame) => self.latest_frame = Some(Arc::new(frame)),
            // A snapshot that cannot serialize is a bug, not a reason to
            // kill the tick loop; keep the previous frame.
            Err(err) => debug!("failed to encode snapshot: {}", err),
        }
    }
}

/// Radial skill math for one caster/target pair.
///
/// Force scales with proximity (`force * (1 - distance / effective_radius)`,
/// floored at zero) and the distance used in the falloff is floored at one
/// unit to avoid singular blowups at point-blank range. Push against an
/// oversized target (radius above `caster_radius * threshold`) inverts onto
/// the caster; pull against one does nothing.
#[allow(clippy::too_many_arguments)]
fn radial_effect(
    kind: SkillKind,
    caster_pos: Vec2,
    caster_radius: f64,
    effective_radius: f64,
    force: f64,
    threshold: f64,
    target_pos: Vec2,
    target_radius: f64,
) -> SkillEffect {
    let delta = target_pos.sub(caster_pos);
    let distance = delta.length();
    if distance > effective_radius + target_radius {
        return SkillEffect::None;
    }
    let direction = delta.normalized_or_zero();
    if direction == Vec2::ZERO {
        // Coincident centers: no defined direction to apply force along.
        return SkillEffect::None;
    }

    let scale = (force * (1.0 - distance.max(1.0) / effective_radius)).max(0.0);
    if scale == 0.0 {
        return SkillEffect::None;
    }
    let oversized = target_radius > caster_radius * threshold;

    match kind {
        SkillKind::Push => {
            if oversized {
                SkillEffect::MoveCaster(direction.scale(-scale))
            } else {
                SkillEffect::MoveTarget(direction.scale(scale))
            }
        }
        SkillKind::Pull => {
            if oversized {
                SkillEffect::None
            } else {
                SkillEffect::MoveTarget(direction.scale(-scale))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Linear growth (radius = 10 + score) keeps the scenarios easy to
    /// reason about.
    fn test_config() -> Config {
        let mut config = Config::default();
        config.world.width = 2000.0;
        config.world.height = 2000.0;
        config.player.base_radius = 10.0;
        config.player.max_radius = 1000.0;
        config.player.growth_factor = 1.0;
        config.player.growth_exponent = 1.0;
        config.player.base_speed = 100.0;
        config.player.speed_falloff = 0.0;
        config.food.min_count = 0;
        config.food.max_count = 0;
        config.game.eat_ratio_threshold = 1.2;
        config.game.eat_score_transfer = 1.0;
        config.game.respawn_cooldown_secs = 1.0;
        config.game.min_spawn_distance = 100.0;
        config
    }

    fn manager_with(config: Config) -> GameManager {
        GameManager::new(Arc::new(config))
    }

    fn add_player_at(manager: &mut GameManager, id: u32, name: &str, pos: Vec2, score: u32) {
        manager.try_add_player(id, name).unwrap();
        let player = manager.players.get_mut(&id).unwrap();
        player.position = pos;
        player.score = score;
    }

    #[test]
    fn test_food_consumption_scenario() {
        let mut manager = manager_with(test_config());
        add_player_at(&mut manager, 1, "alice", Vec2::new(100.0, 100.0), 0);
        manager
            .food
            .push(Food::new(0, Vec2::new(112.0, 100.0), 5.0, 10));

        manager.step(0.0, Instant::now());

        let player = manager.player(1).unwrap();
        assert_eq!(player.score, 10);
        // Linear growth: radius 10 + 10.
        assert_approx_eq!(player.radius(), 20.0);
        assert!(manager.food.is_empty());
    }

    #[test]
    fn test_each_food_consumed_once() {
        let mut manager = manager_with(test_config());
        // Two players both overlapping the same food item; the lower id
        // wins and the value is granted exactly once.
        add_player_at(&mut manager, 1, "alice", Vec2::new(100.0, 100.0), 0);
        add_player_at(&mut manager, 2, "bob", Vec2::new(1000.0, 1000.0), 10);
        manager.players.get_mut(&2).unwrap().position = Vec2::new(110.0, 100.0);
        manager
            .food
            .push(Food::new(0, Vec2::new(105.0, 100.0), 5.0, 10));

        manager.step(0.0, Instant::now());

        assert_eq!(manager.player(1).unwrap().score, 10);
        assert_eq!(manager.player(2).unwrap().score, 10);
        assert!(manager.food.is_empty());
    }

    #[test]
    fn test_eat_and_respawn_scenario() {
        let mut manager = manager_with(test_config());
        let now = Instant::now();
        // A: radius 50, B: radius 30, overlapping. 50 >= 30 * 1.2.
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 40);
        add_player_at(&mut manager, 2, "bob", Vec2::new(1500.0, 1500.0), 20);
        manager.players.get_mut(&2).unwrap().position = Vec2::new(510.0, 500.0);

        manager.step(0.0, now);

        assert_eq!(manager.player(1).unwrap().score, 60);
        assert!(manager.player(2).is_none());
        assert_eq!(manager.player_count(), 2);

        // Still waiting out the cooldown.
        manager.step(0.0, now + Duration::from_millis(500));
        assert!(manager.player(2).is_none());

        manager.step(0.0, now + Duration::from_millis(1100));
        let bob = manager.player(2).expect("bob should have respawned");
        assert_eq!(bob.score, 0);
        assert!(bob.alive);

        let alice = manager.player(1).unwrap();
        let clearance = bob.position.distance_to(alice.position) - alice.radius();
        assert!(
            clearance >= manager.config.game.min_spawn_distance,
            "respawn clearance {} below minimum",
            clearance
        );
    }

    #[test]
    fn test_players_below_threshold_coexist() {
        let mut manager = manager_with(test_config());
        // Radii 50 vs 45: 50 < 45 * 1.2, nobody eats anybody.
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 40);
        add_player_at(&mut manager, 2, "bob", Vec2::new(1500.0, 1500.0), 35);
        manager.players.get_mut(&2).unwrap().position = Vec2::new(505.0, 500.0);

        manager.step(0.0, Instant::now());
        assert!(manager.player(1).is_some());
        assert!(manager.player(2).is_some());
    }

    #[test]
    fn test_eater_tie_resolved_to_lowest_id() {
        let mut manager = manager_with(test_config());
        // Equal-radius eaters flanking one victim: id 1 gets the reward.
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 40);
        add_player_at(&mut manager, 2, "bob", Vec2::new(1500.0, 1500.0), 40);
        add_player_at(&mut manager, 3, "carol", Vec2::new(800.0, 800.0), 10);
        manager.players.get_mut(&2).unwrap().position = Vec2::new(560.0, 500.0);
        manager.players.get_mut(&3).unwrap().position = Vec2::new(530.0, 500.0);

        manager.step(0.0, Instant::now());

        assert_eq!(manager.player(1).unwrap().score, 50);
        assert_eq!(manager.player(2).unwrap().score, 40);
        assert!(manager.player(3).is_none());
    }

    #[test]
    fn test_movement_intent_applied_then_consumed() {
        let mut manager = manager_with(test_config());
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 0);

        assert!(manager.record_move(1, 1.0, 0.0, 1));
        manager.step(1.0, Instant::now());
        let x_after_move = manager.player(1).unwrap().position.x;
        assert_approx_eq!(x_after_move, 600.0); // speed 100 * 1s

        // No new intent: the player stands still.
        manager.step(1.0, Instant::now());
        assert_approx_eq!(manager.player(1).unwrap().position.x, x_after_move);
    }

    #[test]
    fn test_stale_move_rejected() {
        let mut manager = manager_with(test_config());
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 0);

        assert!(manager.record_move(1, 1.0, 0.0, 5));
        assert!(!manager.record_move(1, 0.0, 1.0, 5));
        assert!(!manager.record_move(1, 0.0, 1.0, 4));

        manager.step(1.0, Instant::now());
        let pos = manager.player(1).unwrap().position;
        assert_approx_eq!(pos.x, 600.0);
        assert_approx_eq!(pos.y, 500.0);
    }

    #[test]
    fn test_non_finite_intent_becomes_zero() {
        let mut manager = manager_with(test_config());
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 0);

        assert!(manager.record_move(1, f64::NAN, f64::INFINITY, 1));
        manager.step(1.0, Instant::now());
        let pos = manager.player(1).unwrap().position;
        assert_approx_eq!(pos.x, 500.0);
        assert_approx_eq!(pos.y, 500.0);
    }

    #[test]
    fn test_position_clamped_to_world() {
        let mut manager = manager_with(test_config());
        add_player_at(&mut manager, 1, "alice", Vec2::new(15.0, 15.0), 0);

        manager.record_move(1, -1.0, -1.0, 1);
        manager.step(10.0, Instant::now());
        let player = manager.player(1).unwrap();
        assert_approx_eq!(player.position.x, player.radius());
        assert_approx_eq!(player.position.y, player.radius());
    }

    #[test]
    fn test_food_count_stays_within_bounds() {
        let mut config = test_config();
        config.food.min_count = 30;
        config.food.max_count = 60;
        config.food.spawn_rate = 1000.0;
        let mut manager = manager_with(config);

        assert_eq!(manager.food_count(), 30);
        for _ in 0..10 {
            manager.step(0.05, Instant::now());
            assert!(manager.food_count() >= 30);
            assert!(manager.food_count() <= 60);
        }

        // Simulate consumption, then confirm replenishment to the floor.
        manager.food.truncate(5);
        manager.step(1.0, Instant::now());
        assert_eq!(manager.food_count(), 30);
    }

    #[test]
    fn test_food_replenishment_is_rate_limited() {
        let mut config = test_config();
        config.food.min_count = 50;
        config.food.max_count = 100;
        config.food.spawn_rate = 10.0;
        let mut manager = manager_with(config);

        manager.food.clear();
        manager.food_spawn_budget = 0.0;
        // One tick of 0.1s at 10 items/s allows a single spawn.
        manager.step(0.1, Instant::now());
        assert_eq!(manager.food_count(), 1);
        manager.step(0.1, Instant::now());
        assert_eq!(manager.food_count(), 2);
    }

    #[test]
    fn test_spawn_point_respects_min_distance() {
        let mut manager = manager_with(test_config());
        add_player_at(&mut manager, 1, "alice", Vec2::new(1000.0, 1000.0), 90);

        for _ in 0..20 {
            let spawn = manager.spawn_point();
            let alice = manager.player(1).unwrap();
            let clearance = spawn.distance_to(alice.position) - alice.radius();
            assert!(clearance >= manager.config.game.min_spawn_distance);
        }
    }

    #[test]
    fn test_join_rejects_duplicate_name() {
        let mut manager = manager_with(test_config());
        manager.try_add_player(1, "alice").unwrap();
        assert_eq!(
            manager.try_add_player(2, "alice"),
            Err(JoinError::NameTaken)
        );
        // A dead player's name stays reserved while awaiting respawn.
        manager.players.get_mut(&1).unwrap().alive = false;
        manager.step(0.0, Instant::now());
        assert_eq!(
            manager.try_add_player(3, "alice"),
            Err(JoinError::NameTaken)
        );
    }

    #[test]
    fn test_join_rejects_when_full() {
        let mut config = test_config();
        config.game.max_players = 1;
        let mut manager = manager_with(config);
        manager.try_add_player(1, "alice").unwrap();
        assert_eq!(manager.try_add_player(2, "bob"), Err(JoinError::ServerFull));
    }

    #[test]
    fn test_remove_player_is_idempotent() {
        let mut manager = manager_with(test_config());
        manager.try_add_player(1, "alice").unwrap();
        manager.remove_player(1);
        manager.remove_player(1);
        assert_eq!(manager.player_count(), 0);
        // The name frees up immediately on disconnect.
        assert!(manager.try_add_player(2, "alice").is_ok());
    }

    #[test]
    fn test_push_displaces_smaller_target() {
        let mut manager = manager_with(test_config());
        let now = Instant::now();
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 0);
        add_player_at(&mut manager, 2, "bob", Vec2::new(1500.0, 1500.0), 0);
        manager.players.get_mut(&2).unwrap().position = Vec2::new(550.0, 500.0);

        assert!(manager.activate_skill(1, SkillKind::Push, now));
        manager.step(0.0, now);

        let bob = manager.player(2).unwrap();
        assert!(bob.position.x > 550.0, "push should move bob away");
        assert_approx_eq!(bob.position.y, 500.0);
        // The caster holds position against a smaller target.
        assert_approx_eq!(manager.player(1).unwrap().position.x, 500.0);
    }

    #[test]
    fn test_push_against_oversized_target_inverts() {
        let mut manager = manager_with(test_config());
        let now = Instant::now();
        // Bob's radius 30 > alice's 10 * 1.5, but the gap of 60 keeps the
        // pair clear of the eating overlap (radii sum 40).
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 0);
        add_player_at(&mut manager, 2, "bob", Vec2::new(1500.0, 1500.0), 20);
        manager.players.get_mut(&2).unwrap().position = Vec2::new(560.0, 500.0);

        assert!(manager.activate_skill(1, SkillKind::Push, now));
        manager.step(0.0, now);

        // Alice is flung away from bob; bob does not move.
        assert!(manager.player(1).unwrap().position.x < 500.0);
        assert_approx_eq!(manager.player(2).unwrap().position.x, 560.0);
    }

    #[test]
    fn test_pull_draws_target_and_ignores_oversized() {
        let mut manager = manager_with(test_config());
        let now = Instant::now();
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 0);
        add_player_at(&mut manager, 2, "bob", Vec2::new(1500.0, 1500.0), 0);
        manager.players.get_mut(&2).unwrap().position = Vec2::new(560.0, 500.0);

        assert!(manager.activate_skill(1, SkillKind::Pull, now));
        manager.step(0.0, now);
        assert!(manager.player(2).unwrap().position.x < 560.0);

        // Oversized target: pull has no effect either way.
        manager.players.get_mut(&2).unwrap().score = 20;
        manager.players.get_mut(&2).unwrap().position = Vec2::new(560.0, 500.0);
        let later = now + Duration::from_secs(30);
        assert!(manager.activate_skill(1, SkillKind::Pull, later));
        manager.step(0.0, later);
        assert_approx_eq!(manager.player(2).unwrap().position.x, 560.0);
        assert_approx_eq!(manager.player(1).unwrap().position.x, 500.0);
    }

    #[test]
    fn test_push_moves_food() {
        let mut manager = manager_with(test_config());
        let now = Instant::now();
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 0);
        manager
            .food
            .push(Food::new(0, Vec2::new(560.0, 500.0), 5.0, 10));

        manager.activate_skill(1, SkillKind::Push, now);
        manager.step(0.0, now);
        assert!(manager.food[0].position.x > 560.0);
    }

    #[test]
    fn test_skill_expires_after_duration() {
        let mut manager = manager_with(test_config());
        let now = Instant::now();
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 0);

        manager.activate_skill(1, SkillKind::Push, now);
        manager.step(0.0, now);
        assert!(manager.player(1).unwrap().skill_active(SkillKind::Push));

        manager.step(0.0, now + Duration::from_secs(2));
        assert!(!manager.player(1).unwrap().skill_active(SkillKind::Push));
    }

    #[test]
    fn test_radial_effect_thresholds() {
        let caster = Vec2::new(0.0, 0.0);
        let target = Vec2::new(50.0, 0.0);

        // Small target is pushed outward.
        match radial_effect(SkillKind::Push, caster, 20.0, 100.0, 40.0, 1.5, target, 10.0) {
            SkillEffect::MoveTarget(d) => assert!(d.x > 0.0),
            other => panic!("expected MoveTarget, got {:?}", other),
        }

        // Oversized target inverts the push onto the caster.
        match radial_effect(SkillKind::Push, caster, 20.0, 100.0, 40.0, 1.5, target, 31.0) {
            SkillEffect::MoveCaster(d) => assert!(d.x < 0.0),
            other => panic!("expected MoveCaster, got {:?}", other),
        }

        // Pull draws a small target inward, skips an oversized one.
        match radial_effect(SkillKind::Pull, caster, 20.0, 100.0, 40.0, 1.25, target, 10.0) {
            SkillEffect::MoveTarget(d) => assert!(d.x < 0.0),
            other => panic!("expected MoveTarget, got {:?}", other),
        }
        assert_eq!(
            radial_effect(SkillKind::Pull, caster, 20.0, 100.0, 40.0, 1.25, target, 26.0),
            SkillEffect::None
        );

        // Out of range entirely.
        assert_eq!(
            radial_effect(
                SkillKind::Push,
                caster,
                20.0,
                100.0,
                40.0,
                1.5,
                Vec2::new(500.0, 0.0),
                10.0
            ),
            SkillEffect::None
        );
    }

    #[test]
    fn test_radial_effect_closer_is_stronger() {
        let caster = Vec2::ZERO;
        let near = match radial_effect(
            SkillKind::Push,
            caster,
            20.0,
            100.0,
            40.0,
            1.5,
            Vec2::new(20.0, 0.0),
            10.0,
        ) {
            SkillEffect::MoveTarget(d) => d.length(),
            other => panic!("unexpected {:?}", other),
        };
        let far = match radial_effect(
            SkillKind::Push,
            caster,
            20.0,
            100.0,
            40.0,
            1.5,
            Vec2::new(80.0, 0.0),
            10.0,
        ) {
            SkillEffect::MoveTarget(d) => d.length(),
            other => panic!("unexpected {:?}", other),
        };
        assert!(near > far);
    }

    #[test]
    fn test_snapshot_contents() {
        let mut manager = manager_with(test_config());
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 10);
        manager
            .food
            .push(Food::new(7, Vec2::new(505.0, 500.0), 5.0, 10));
        manager.step(0.0, Instant::now());

        match manager.snapshot() {
            Packet::GameState {
                players,
                food,
                server_tick,
                ..
            } => {
                assert_eq!(server_tick, 1);
                let alice = &players["1"];
                assert_eq!(alice.id, 1);
                assert_eq!(alice.name, "alice");
                assert_eq!(alice.score, 20); // ate the food during the step
                assert_eq!(alice.skills.len(), 2);
                assert!(!alice.skills["push"]);
                assert!(alice.health.is_some());
                assert!(food.is_empty());
            }
            other => panic!("unexpected packet {:?}", other),
        }
        assert!(manager.latest_frame().is_some());
    }

    #[test]
    fn test_dead_players_absent_from_snapshot() {
        let mut manager = manager_with(test_config());
        add_player_at(&mut manager, 1, "alice", Vec2::new(500.0, 500.0), 40);
        add_player_at(&mut manager, 2, "bob", Vec2::new(1500.0, 1500.0), 20);
        manager.players.get_mut(&2).unwrap().position = Vec2::new(510.0, 500.0);
        manager.step(0.0, Instant::now());

        match manager.snapshot() {
            Packet::GameState { players, .. } => {
                assert!(players.contains_key("1"));
                assert!(!players.contains_key("2"));
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }
}
