//! Fixed-step grid cells and ladder subdivision.
//!
//! Cells at a given ladder level are aligned to a global grid whose
//! boundaries sit at integer multiples of that level's step, so cells
//! produced from different parents can never overlap. Subdivision tiles a
//! parent box exactly because configuration validation requires each
//! ladder step to divide the one above it evenly.

use crate::geo;
use crate::types::CellCode;

/// Tolerance, in grid-index units, applied to boundary comparisons.
const STEP_EPSILON: f64 = 1e-6;

/// A rectangular geographic region at one ladder level.
///
/// Immutable once created; cells are produced either by seeding a region
/// or by subdividing a denser parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridCell {
    /// Southern boundary latitude, degrees.
    pub south: f64,
    /// Western boundary longitude, degrees.
    pub west: f64,
    /// Northern boundary latitude, degrees.
    pub north: f64,
    /// Eastern boundary longitude, degrees.
    pub east: f64,
    /// Index into the resolution ladder (0 = coarsest).
    pub level: usize,
}

impl GridCell {
    /// Center point `(lat, lng)` of the bounding box.
    pub fn center(&self) -> (f64, f64) {
        ((self.south + self.north) / 2.0, (self.west + self.east) / 2.0)
    }

    /// Deterministic identity code for logs and reports, derived from the
    /// center point and level. Not used for correctness.
    pub fn code(&self) -> CellCode {
        let (lat, lng) = self.center();
        format!("L{}[{:.4},{:.4}]", self.level, lat, lng)
    }

    /// Smallest query radius that provably covers this cell: the
    /// half-diagonal plus a safety margin, clamped to the service limit.
    ///
    /// Intentionally over-fetches; overlap between adjacent cells'
    /// result sets collapses in the record store.
    pub fn covering_radius_km(&self, margin_km: f64, max_radius_km: f64) -> f64 {
        let radius = geo::half_diagonal_km(self.south, self.west, self.north, self.east);
        (radius + margin_km).min(max_radius_km)
    }

    /// Child cells at `child_level` tiling this cell's bounding box.
    pub fn children(&self, child_step: f64, child_level: usize) -> Vec<GridCell> {
        tile(
            self.south,
            self.west,
            self.north,
            self.east,
            child_step,
            child_level,
        )
    }
}

/// Tile a bounding box with cells aligned to the global `step` grid.
///
/// Every cell whose grid slot intersects the box is returned, so the
/// union always covers the box; boundaries land on integer multiples of
/// `step`, which may extend slightly past a box that is not itself
/// grid-aligned.
pub fn tile(
    south: f64,
    west: f64,
    north: f64,
    east: f64,
    step: f64,
    level: usize,
) -> Vec<GridCell> {
    let lat_lo = grid_floor(south, step);
    let lat_hi = grid_ceil(north, step);
    let lng_lo = grid_floor(west, step);
    let lng_hi = grid_ceil(east, step);

    let mut cells =
        Vec::with_capacity(((lat_hi - lat_lo).max(0) * (lng_hi - lng_lo).max(0)) as usize);
    for lat_idx in lat_lo..lat_hi {
        for lng_idx in lng_lo..lng_hi {
            cells.push(GridCell {
                south: lat_idx as f64 * step,
                west: lng_idx as f64 * step,
                north: (lat_idx + 1) as f64 * step,
                east: (lng_idx + 1) as f64 * step,
                level,
            });
        }
    }
    cells
}

/// Largest grid index whose boundary is at or below `value`.
fn grid_floor(value: f64, step: f64) -> i64 {
    (value / step + STEP_EPSILON).floor() as i64
}

/// Smallest grid index whose boundary is at or above `value`.
fn grid_ceil(value: f64, step: f64) -> i64 {
    (value / step - STEP_EPSILON).ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn children_exactly_tile_parent() {
        let parent = GridCell {
            south: -27.0,
            west: 28.0,
            north: -26.0,
            east: 29.0,
            level: 0,
        };
        let children = parent.children(0.05, 1);
        assert_eq!(children.len(), 400);

        // Union area equals parent area.
        let area: f64 = children
            .iter()
            .map(|c| (c.north - c.south) * (c.east - c.west))
            .sum();
        assert!((area - 1.0).abs() < 1e-6);

        // Every child is inside the parent.
        for child in &children {
            assert!(child.south >= parent.south - TOLERANCE);
            assert!(child.north <= parent.north + TOLERANCE);
            assert!(child.west >= parent.west - TOLERANCE);
            assert!(child.east <= parent.east + TOLERANCE);
            assert_eq!(child.level, 1);
        }

        // No two children overlap (strictly separated or share a boundary).
        for (i, a) in children.iter().enumerate() {
            for b in children.iter().skip(i + 1) {
                let lat_disjoint =
                    a.north <= b.south + TOLERANCE || b.north <= a.south + TOLERANCE;
                let lng_disjoint = a.east <= b.west + TOLERANCE || b.east <= a.west + TOLERANCE;
                assert!(lat_disjoint || lng_disjoint, "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn four_way_ladder_produces_four_children() {
        let parent = GridCell {
            south: 0.0,
            west: 0.0,
            north: 2.0,
            east: 2.0,
            level: 0,
        };
        let children = parent.children(1.0, 1);
        assert_eq!(children.len(), 4);
    }

    #[test]
    fn tiling_is_globally_aligned() {
        // Two adjacent parents produce children on the same global grid,
        // so no child from one parent can overlap a child of the other.
        let left = GridCell {
            south: 0.0,
            west: 0.0,
            north: 1.0,
            east: 1.0,
            level: 0,
        };
        let right = GridCell {
            south: 0.0,
            west: 1.0,
            north: 1.0,
            east: 2.0,
            level: 0,
        };
        let left_children = left.children(0.05, 1);
        let right_children = right.children(0.05, 1);
        for a in &left_children {
            for b in &right_children {
                assert!(a.east <= b.west + TOLERANCE || b.east <= a.west + TOLERANCE);
            }
        }
    }

    #[test]
    fn tile_covers_unaligned_boxes() {
        // A box that is not grid-aligned still ends up fully covered.
        let cells = tile(-26.43, 27.81, -25.97, 28.44, 1.0, 0);
        assert_eq!(cells.len(), 4);
        let south = cells.iter().map(|c| c.south).fold(f64::INFINITY, f64::min);
        let north = cells.iter().map(|c| c.north).fold(f64::NEG_INFINITY, f64::max);
        assert!(south <= -26.43 && north >= -25.97);
    }

    #[test]
    fn covering_radius_reaches_corners_and_clamps() {
        let cell = GridCell {
            south: -27.0,
            west: 28.0,
            north: -26.0,
            east: 29.0,
            level: 0,
        };
        let (clat, clng) = cell.center();
        let radius = cell.covering_radius_km(1.0, 200.0);
        assert!(radius <= 200.0);
        assert!(geo::haversine_km(clat, clng, cell.south, cell.west) <= radius);

        let huge = GridCell {
            south: -34.0,
            west: 18.0,
            north: -22.0,
            east: 33.0,
            level: 0,
        };
        assert_eq!(huge.covering_radius_km(1.0, 200.0), 200.0);
    }

    #[test]
    fn code_is_stable_for_identical_cells() {
        let cell = GridCell {
            south: -26.2,
            west: 28.05,
            north: -26.15,
            east: 28.1,
            level: 1,
        };
        assert_eq!(cell.code(), cell.code());
        assert!(cell.code().starts_with("L1["));
    }
}
