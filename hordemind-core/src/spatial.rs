//! Uniform grid spatial index over agent positions.
//!
//! World space is hashed into square cells; a radius query unions the
//! membership of every cell ring that could intersect the query circle.
//! The guarantee is one-sided: an agent within the radius is always
//! returned (no false negatives), while agents slightly beyond it may be
//! returned because cells are included whole. Callers that need the exact
//! radius filter by true distance afterwards.
//!
//! The scheduler rebuilds the index from scratch once per tick, which is
//! O(agents) and keeps removal trivial.

use std::collections::{HashMap, HashSet};

use crate::types::{AgentId, Position};

/// Sparse uniform grid mapping cells to the agents inside them.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: HashMap<(i64, i64), HashSet<AgentId>>,
    homes: HashMap<AgentId, (i64, i64)>,
}

impl SpatialGrid {
    /// Create an empty grid with the given cell size (world units).
    ///
    /// Non-positive sizes fall back to a single unit so cell math stays
    /// finite.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: if cell_size > 0.0 { cell_size } else { 1.0 },
            cells: HashMap::new(),
            homes: HashMap::new(),
        }
    }

    fn cell_of(&self, pos: Position) -> (i64, i64) {
        (
            (pos.x / self.cell_size).floor() as i64,
            (pos.y / self.cell_size).floor() as i64,
        )
    }

    /// Insert an agent at a position, replacing any previous placement.
    pub fn insert(&mut self, id: AgentId, pos: Position) {
        self.remove(id);
        let cell = self.cell_of(pos);
        self.cells.entry(cell).or_default().insert(id);
        self.homes.insert(id, cell);
    }

    /// Remove an agent from the grid. No-op if absent.
    pub fn remove(&mut self, id: AgentId) {
        if let Some(cell) = self.homes.remove(&id) {
            if let Some(members) = self.cells.get_mut(&cell) {
                members.remove(&id);
                if members.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
    }

    /// Remove every agent.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.homes.clear();
    }

    /// Number of indexed agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.homes.len()
    }

    /// True if no agents are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.homes.is_empty()
    }

    /// All agents whose cell ring could intersect the circle at `pos`
    /// with radius `radius`. Superset of the true in-radius set.
    #[must_use]
    pub fn query_radius(&self, pos: Position, radius: f64) -> HashSet<AgentId> {
        let mut found = HashSet::new();
        if radius < 0.0 {
            return found;
        }
        let center = self.cell_of(pos);
        // One ring beyond ceil(r / cell) guarantees the circle cannot
        // poke past the visited cells: no false negatives.
        let reach = (radius / self.cell_size).ceil() as i64 + 1;

        for dx in -reach..=reach {
            for dy in -reach..=reach {
                if let Some(members) = self.cells.get(&(center.0 + dx, center.1 + dy)) {
                    found.extend(members.iter().copied());
                }
            }
        }
        found
    }
}
