//! Uniform spatial grid for the collision broad phase.
//!
//! Each entity is filed under the cell containing its collision center
//! (`floor(position / cell_size)`). Candidate pairs are entities in the same
//! cell or in adjacent cells; each unordered pair is produced once by visiting
//! only half of the eight neighbors.
//!
//! The grid is rebuilt from scratch rather than updated incrementally, and
//! only when it is stale: never built, the world's structure changed, the
//! cell size changed, or the rebuild interval elapsed.

use std::collections::BTreeMap;

use ember_ecs::prelude::EntityId;

/// Integer cell coordinate.
pub type Cell = (i64, i64);

/// Neighbor offsets that, with the cell itself, cover every adjacent pair once.
const HALF_NEIGHBORHOOD: [(i64, i64); 4] = [(1, 0), (-1, 1), (0, 1), (1, 1)];

#[derive(Debug)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: BTreeMap<Cell, Vec<EntityId>>,
    /// World structure version at the last rebuild.
    built_version: Option<u64>,
    since_rebuild: f64,
    rebuilds: u64,
}

impl SpatialGrid {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: BTreeMap::new(),
            built_version: None,
            since_rebuild: 0.0,
            rebuilds: 0,
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Change the cell size; the grid must be rebuilt before its next use.
    pub fn set_cell_size(&mut self, cell_size: f64) {
        if cell_size != self.cell_size {
            self.cell_size = cell_size;
            self.invalidate();
        }
    }

    /// Force a rebuild on the next [`needs_rebuild`](Self::needs_rebuild) check.
    pub fn invalidate(&mut self) {
        self.built_version = None;
    }

    /// Advance the rebuild timer by `dt` and report whether the grid is stale.
    pub fn needs_rebuild(&mut self, dt: f64, structure_version: u64, interval: f64) -> bool {
        self.since_rebuild += dt;
        self.built_version != Some(structure_version) || self.since_rebuild >= interval
    }

    /// Refile every entity from `(id, x, y)` positions.
    pub fn rebuild(&mut self, positions: impl IntoIterator<Item = (EntityId, f64, f64)>, structure_version: u64) {
        for bucket in self.cells.values_mut() {
            bucket.clear();
        }
        for (entity, x, y) in positions {
            let cell = self.cell_of(x, y);
            self.cells.entry(cell).or_default().push(entity);
        }
        self.cells.retain(|_, bucket| !bucket.is_empty());
        self.built_version = Some(structure_version);
        self.since_rebuild = 0.0;
        self.rebuilds += 1;
    }

    /// Cell containing `(x, y)`. Coordinates beyond the `i64` range saturate
    /// into the outermost cells.
    pub fn cell_of(&self, x: f64, y: f64) -> Cell {
        ((x / self.cell_size).floor() as i64, (y / self.cell_size).floor() as i64)
    }

    /// Entities filed under `cell`.
    pub fn entities_in(&self, cell: Cell) -> &[EntityId] {
        self.cells.get(&cell).map_or(&[], Vec::as_slice)
    }

    /// Every pair of entities sharing a cell or in adjacent cells, each once.
    pub fn candidate_pairs(&self) -> Vec<(EntityId, EntityId)> {
        let mut pairs = Vec::new();
        for (&(cx, cy), bucket) in &self.cells {
            for (i, &a) in bucket.iter().enumerate() {
                for &b in &bucket[i + 1..] {
                    pairs.push((a, b));
                }
            }
            for (dx, dy) in HALF_NEIGHBORHOOD {
                // Cells at the edge of the coordinate range have no neighbor there.
                let (Some(nx), Some(ny)) = (cx.checked_add(dx), cy.checked_add(dy)) else {
                    continue;
                };
                let Some(neighbor) = self.cells.get(&(nx, ny)) else {
                    continue;
                };
                for &a in bucket {
                    for &b in neighbor {
                        pairs.push((a, b));
                    }
                }
            }
        }
        pairs
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
