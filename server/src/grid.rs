//! Uniform spatial grid for broad-phase collision queries.
//!
//! Food is point-inserted into world-space cells; a player then only tests
//! food in the cells its query circle can reach, instead of every item on
//! the map. The grid is rebuilt each tick, which is cheap for point data
//! and avoids any incremental bookkeeping.

use std::collections::HashMap;

use shared::Vec2;

pub struct SpatialGrid {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f64) -> Self {
        SpatialGrid {
            // Degenerate cell sizes would collapse every point into one cell.
            cell_size: cell_size.max(1.0),
            cells: HashMap::new(),
        }
    }

    fn cell_for(&self, position: Vec2) -> (i64, i64) {
        (
            (position.x / self.cell_size).floor() as i64,
            (position.y / self.cell_size).floor() as i64,
        )
    }

    pub fn insert(&mut self, position: Vec2, index: usize) {
        let cell = self.cell_for(position);
        self.cells.entry(cell).or_default().push(index);
    }

    /// Indices whose inserted point may lie within `radius` of `center`.
    /// Candidates still need an exact distance check; the grid only prunes.
    pub fn query_circle(&self, center: Vec2, radius: f64) -> Vec<usize> {
        let min = self.cell_for(Vec2::new(center.x - radius, center.y - radius));
        let max = self.cell_for(Vec2::new(center.x + radius, center.y + radius));

        let mut result = Vec::new();
        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                if let Some(indices) = self.cells.get(&(cx, cy)) {
                    result.extend_from_slice(indices);
                }
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
