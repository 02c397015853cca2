use std::collections::HashMap;

use glam::{IVec2, Vec2};

use crate::entity::EntityId;

/// Round a position so a footprint's corner lands on a cell boundary.
///
/// Returns the centre of the aligned footprint.
pub fn snap(position: Vec2, footprint: Vec2) -> Vec2 {
    let half = footprint / 2.0;
    (position - half).round() + half
}

/// Cells covered by a footprint centred on `position` after snapping.
pub fn covered_cells(position: Vec2, footprint: Vec2) -> Vec<IVec2> {
    let snapped = snap(position, footprint);
    let origin = (snapped - footprint / 2.0).round().as_ivec2();
    let extent = footprint.ceil().as_ivec2().max(IVec2::ONE);
    let mut cells = Vec::with_capacity((extent.x * extent.y) as usize);
    for dx in 0..extent.x {
        for dy in 0..extent.y {
            cells.push(origin + IVec2::new(dx, dy));
        }
    }
    cells
}

/// Occupancy of the map's cells.
///
/// Cell `(x, y)` spans `[x, x+1) × [y, y+1)`; valid cells are
/// `0..width` by `0..height`.
#[derive(Debug, Clone)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: HashMap<IVec2, EntityId>,
}

impl Grid {
    /// An empty `width` by `height` grid.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as i32,
            height: height as i32,
            cells: HashMap::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width as u32
    }

    pub fn height(&self) -> u32 {
        self.height as u32
    }

    /// True if the cell lies on the map.
    pub fn in_bounds(&self, cell: IVec2) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    /// The entity occupying a cell, if any.
    pub fn occupant(&self, cell: IVec2) -> Option<EntityId> {
        self.cells.get(&cell).copied()
    }

    /// True if every cell is on the map and unoccupied.
    pub fn can_claim(&self, cells: &[IVec2]) -> bool {
        cells
            .iter()
            .all(|cell| self.in_bounds(*cell) && !self.cells.contains_key(cell))
    }

    /// Mark every cell as occupied by `entity`, or none if any is unavailable.
    pub fn claim(&mut self, cells: &[IVec2], entity: EntityId) -> bool {
        if !self.can_claim(cells) {
            return false;
        }
        for cell in cells {
            self.cells.insert(*cell, entity);
        }
        true
    }

    /// Free every cell held by `entity`. Returns how many were freed.
    pub fn release(&mut self, entity: EntityId) -> usize {
        let before = self.cells.len();
        self.cells.retain(|_, occupant| *occupant != entity);
        before - self.cells.len()
    }

    /// Cells held by `entity`, in no particular order.
    pub fn cells_of(&self, entity: EntityId) -> Vec<IVec2> {
        self.cells
            .iter()
            .filter(|(_, occupant)| **occupant == entity)
            .map(|(cell, _)| *cell)
            .collect()
    }

    /// Number of occupied cells.
    pub fn occupied(&self) -> usize {
        self.cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> EntityId {
        EntityId::new(index, 0)
    }

    #[test]
    fn snap_aligns_unit_footprint_to_cell_centre() {
        let snapped = snap(Vec2::new(3.3, 4.8), Vec2::ONE);
        assert_eq!(snapped, Vec2::new(3.5, 4.5));
    }

    #[test]
    fn snap_aligns_even_footprint_to_cell_corner() {
        let snapped = snap(Vec2::new(3.3, 4.8), Vec2::new(2.0, 2.0));
        assert_eq!(snapped, Vec2::new(3.0, 5.0));
    }

    #[test]
    fn snap_is_idempotent() {
        let footprint = Vec2::new(3.0, 1.0);
        let once = snap(Vec2::new(7.9, 2.2), footprint);
        assert_eq!(snap(once, footprint), once);
    }

    #[test]
    fn covered_cells_match_footprint_area() {
        let cells = covered_cells(Vec2::new(5.0, 5.0), Vec2::new(2.0, 3.0));
        assert_eq!(cells.len(), 6);
        assert!(cells.contains(&IVec2::new(4, 4)));
        assert!(cells.contains(&IVec2::new(5, 5)));
    }

    #[test]
    fn claim_is_all_or_nothing() {
        let mut grid = Grid::new(4, 4);
        assert!(grid.claim(&[IVec2::new(1, 1)], id(1)));

        let overlapping = [IVec2::new(0, 1), IVec2::new(1, 1)];
        assert!(!grid.claim(&overlapping, id(2)));
        assert_eq!(grid.occupant(IVec2::new(0, 1)), None);
        assert_eq!(grid.occupied(), 1);
    }

    #[test]
    fn out_of_bounds_cells_cannot_be_claimed() {
        let mut grid = Grid::new(4, 4);
        assert!(!grid.can_claim(&[IVec2::new(4, 0)]));
        assert!(!grid.can_claim(&[IVec2::new(-1, 0)]));
        assert!(!grid.claim(&[IVec2::new(0, 0), IVec2::new(0, 4)], id(1)));
        assert_eq!(grid.occupied(), 0);
    }

    #[test]
    fn release_frees_only_that_entity() {
        let mut grid = Grid::new(4, 4);
        grid.claim(&[IVec2::new(0, 0), IVec2::new(0, 1)], id(1));
        grid.claim(&[IVec2::new(2, 2)], id(2));
        assert_eq!(grid.release(id(1)), 2);
        assert_eq!(grid.occupant(IVec2::new(2, 2)), Some(id(2)));
        assert!(grid.cells_of(id(1)).is_empty());
    }
}
