//! Occupancy grid for local navigation
//!
//! A fixed `width x height` array of cells centered on the robot's reference
//! frame. Obstacles are stamped as filled discs and cleared wholesale once per
//! sensor epoch. Occupied cells always carry infinite cost; free cells carry a
//! finite, non-negative cost that the social cost layer may raise.

use crate::common::Point2D;
use crate::config::GridConfig;
use crate::error::{NavError, Result};
use std::collections::BTreeSet;

/// Grid coordinate `(x, y)`
pub type CellIndex = (usize, usize);

/// A single cell of the occupancy grid
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub x: usize,
    pub y: usize,
    pub occupied: bool,
    /// Traversal cost; infinite iff `occupied`
    pub cost: f64,
    /// Search scratch, reset at the start of every planning run
    pub visited: bool,
    /// Search scratch, reset at the start of every planning run
    pub parent: Option<CellIndex>,
}

impl GridCell {
    fn free(x: usize, y: usize) -> Self {
        GridCell {
            x,
            y,
            occupied: false,
            cost: 0.0,
            visited: false,
            parent: None,
        }
    }
}

/// Occupancy grid over the locally known world
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    width: usize,
    height: usize,
    resolution: f64,
    origin: Point2D,
    cells: Vec<GridCell>,
    obstacles: BTreeSet<CellIndex>,
}

impl OccupancyGrid {
    /// Create an empty grid centered on the world origin
    pub fn new(width: usize, height: usize, resolution: f64) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(NavError::Config("Grid dimensions must be positive".to_string()));
        }
        if !(resolution > 0.0) || !resolution.is_finite() {
            return Err(NavError::Config("Grid resolution must be positive".to_string()));
        }

        let mut cells = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                cells.push(GridCell::free(x, y));
            }
        }

        Ok(OccupancyGrid {
            width,
            height,
            resolution,
            origin: Point2D::new(
                -(width as f64) * resolution / 2.0,
                -(height as f64) * resolution / 2.0,
            ),
            cells,
            obstacles: BTreeSet::new(),
        })
    }

    pub fn from_config(config: &GridConfig) -> Result<Self> {
        Self::new(config.width, config.height, config.resolution)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// World coordinate of the outer corner of cell (0, 0)
    pub fn origin(&self) -> Point2D {
        self.origin
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<&GridCell> {
        if x < self.width && y < self.height {
            self.cells.get(y * self.width + x)
        } else {
            None
        }
    }

    pub(crate) fn cell_mut(&mut self, x: usize, y: usize) -> Option<&mut GridCell> {
        if x < self.width && y < self.height {
            self.cells.get_mut(y * self.width + x)
        } else {
            None
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = &GridCell> {
        self.cells.iter()
    }

    /// Convert world coordinates to grid coordinates.
    ///
    /// Points off the grid are clamped onto the boundary cells.
    pub fn world_to_grid(&self, point: Point2D) -> CellIndex {
        let gx = ((point.x - self.origin.x) / self.resolution).floor();
        let gy = ((point.y - self.origin.y) / self.resolution).floor();
        (
            clamp_axis(gx, self.width),
            clamp_axis(gy, self.height),
        )
    }

    /// Convert grid coordinates to the world position of the cell center
    pub fn grid_to_world(&self, x: usize, y: usize) -> Point2D {
        Point2D::new(
            self.origin.x + (x as f64 + 0.5) * self.resolution,
            self.origin.y + (y as f64 + 0.5) * self.resolution,
        )
    }

    pub fn is_occupied(&self, x: usize, y: usize) -> bool {
        self.cell(x, y).map_or(false, |c| c.occupied)
    }

    pub fn is_occupied_at(&self, point: Point2D) -> bool {
        let (x, y) = self.world_to_grid(point);
        self.is_occupied(x, y)
    }

    /// Mark every cell whose center lies within `radius` of `center` as occupied.
    ///
    /// Discs that extend past the edge are cut at the boundary rather than
    /// aliased onto it. Invalid input is rejected before any cell is touched.
    pub fn set_obstacle(&mut self, center: Point2D, radius: f64) -> Result<()> {
        if !center.is_finite() {
            return Err(NavError::SensorFault(format!(
                "obstacle center is not finite: ({}, {})",
                center.x, center.y
            )));
        }
        if !(radius >= 0.0) || !radius.is_finite() {
            return Err(NavError::SensorFault(format!("invalid obstacle radius {}", radius)));
        }

        let res = self.resolution;
        let lo_x = ((center.x - radius - self.origin.x) / res).floor() as i64;
        let hi_x = ((center.x + radius - self.origin.x) / res).floor() as i64;
        let lo_y = ((center.y - radius - self.origin.y) / res).floor() as i64;
        let hi_y = ((center.y + radius - self.origin.y) / res).floor() as i64;

        let lo_x = lo_x.max(0);
        let lo_y = lo_y.max(0);
        let hi_x = hi_x.min(self.width as i64 - 1);
        let hi_y = hi_y.min(self.height as i64 - 1);

        let radius_sq = radius * radius;
        for gx in lo_x..=hi_x {
            for gy in lo_y..=hi_y {
                let (gx, gy) = (gx as usize, gy as usize);
                let cell_center = self.grid_to_world(gx, gy);
                let dx = cell_center.x - center.x;
                let dy = cell_center.y - center.y;
                if dx * dx + dy * dy <= radius_sq {
                    self.mark_occupied(gx, gy);
                }
            }
        }
        Ok(())
    }

    /// Free every recorded obstacle cell and empty the obstacle set
    pub fn clear_obstacles(&mut self) {
        let obstacles = std::mem::take(&mut self.obstacles);
        for (x, y) in obstacles {
            if let Some(cell) = self.cell_mut(x, y) {
                cell.occupied = false;
                cell.cost = 0.0;
            }
        }
    }

    /// Replace the current obstacle epoch with discs around `points`.
    ///
    /// Non-finite points are skipped. Returns the number of points stamped.
    pub fn rebuild_obstacles(&mut self, points: &[Point2D], radius: f64) -> Result<usize> {
        if !(radius >= 0.0) || !radius.is_finite() {
            return Err(NavError::SensorFault(format!("invalid obstacle radius {}", radius)));
        }
        self.clear_obstacles();
        let mut stamped = 0;
        for point in points {
            if self.set_obstacle(*point, radius).is_ok() {
                stamped += 1;
            }
        }
        Ok(stamped)
    }

    pub fn obstacles(&self) -> impl Iterator<Item = CellIndex> + '_ {
        self.obstacles.iter().copied()
    }

    pub fn obstacle_count(&self) -> usize {
        self.obstacles.len()
    }

    /// Set the traversal cost of a free cell; occupied cells are left alone
    pub fn set_cost(&mut self, x: usize, y: usize, cost: f64) {
        if !cost.is_finite() || cost < 0.0 {
            return;
        }
        if let Some(cell) = self.cell_mut(x, y) {
            if !cell.occupied {
                cell.cost = cost;
            }
        }
    }

    /// Reset the cost of every free cell to zero
    pub fn clear_costs(&mut self) {
        for cell in self.cells.iter_mut().filter(|c| !c.occupied) {
            cell.cost = 0.0;
        }
    }

    /// Fill free-cell costs from a function of the cell center
    pub fn apply_cost_field<F>(&mut self, cost_at: F)
    where
        F: Fn(Point2D) -> f64,
    {
        for y in 0..self.height {
            for x in 0..self.width {
                let center = self.grid_to_world(x, y);
                self.set_cost(x, y, cost_at(center));
            }
        }
    }

    /// Clear the search scratch fields of every cell
    pub fn reset_search(&mut self) {
        for cell in &mut self.cells {
            cell.visited = false;
            cell.parent = None;
        }
    }

    /// True if any waypoint falls on an occupied cell
    pub fn is_path_blocked(&self, path: &[Point2D]) -> bool {
        path.iter().any(|p| self.is_occupied_at(*p))
    }

    fn mark_occupied(&mut self, x: usize, y: usize) {
        if let Some(cell) = self.cell_mut(x, y) {
            cell.occupied = true;
            cell.cost = f64::INFINITY;
            self.obstacles.insert((x, y));
        }
    }
}

fn clamp_axis(value: f64, size: usize) -> usize {
    if value.is_nan() || value < 0.0 {
        0
    } else if value >= size as f64 {
        size - 1
    } else {
        value as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn grid() -> OccupancyGrid {
        OccupancyGrid::new(20, 20, 0.1).unwrap()
    }

    fn invariant_holds(grid: &OccupancyGrid) -> bool {
        grid.cells().all(|c| c.occupied == c.cost.is_infinite())
            && grid
                .cells()
                .all(|c| c.occupied == grid.obstacles().any(|o| o == (c.x, c.y)))
    }

    #[rstest]
    fn grid_is_centered(grid: OccupancyGrid) {
        assert_eq!(grid.origin(), Point2D::new(-1.0, -1.0));
        assert_eq!(grid.world_to_grid(Point2D::new(0.0, 0.0)), (10, 10));
        assert_eq!(grid.world_to_grid(Point2D::new(-0.01, -0.01)), (9, 9));
    }

    #[rstest]
    fn round_trip_stays_within_half_a_cell_diagonal(grid: OccupancyGrid) {
        let half_diagonal = grid.resolution() * std::f64::consts::SQRT_2 / 2.0;
        let mut x = -0.999;
        while x < 1.0 {
            let mut y = -0.999;
            while y < 1.0 {
                let p = Point2D::new(x, y);
                let (gx, gy) = grid.world_to_grid(p);
                let back = grid.grid_to_world(gx, gy);
                assert!(back.distance(&p) <= half_diagonal + 1e-9, "{:?} -> {:?}", p, back);
                y += 0.037;
            }
            x += 0.037;
        }
    }

    #[rstest]
    #[case(Point2D::new(-5.0, 0.0), (0, 10))]
    #[case(Point2D::new(5.0, 5.0), (19, 19))]
    #[case(Point2D::new(0.0, -7.5), (10, 0))]
    #[case(Point2D::new(f64::NAN, 0.0), (0, 10))]
    fn off_grid_points_clamp_to_boundary(
        grid: OccupancyGrid,
        #[case] point: Point2D,
        #[case] expected: CellIndex,
    ) {
        assert_eq!(grid.world_to_grid(point), expected);
    }

    #[rstest]
    fn set_obstacle_marks_disc(mut grid: OccupancyGrid) {
        grid.set_obstacle(Point2D::new(0.0, 0.0), 0.2).unwrap();
        // Centers at +-0.05 and +-0.15 on one axis with +-0.05 on the other
        assert_eq!(grid.obstacle_count(), 12);
        assert!(grid.is_occupied(10, 10));
        assert!(grid.is_occupied(8, 9));
        assert!(!grid.is_occupied(8, 8));
        assert!(invariant_holds(&grid));
    }

    #[rstest]
    fn set_obstacle_is_idempotent(mut grid: OccupancyGrid) {
        grid.set_obstacle(Point2D::new(0.3, -0.2), 0.15).unwrap();
        let first: Vec<_> = grid.obstacles().collect();
        grid.set_obstacle(Point2D::new(0.3, -0.2), 0.15).unwrap();
        let second: Vec<_> = grid.obstacles().collect();
        assert_eq!(first, second);
    }

    #[rstest]
    fn disc_past_the_edge_is_cut_not_aliased(mut grid: OccupancyGrid) {
        grid.set_obstacle(Point2D::new(3.0, 3.0), 0.2).unwrap();
        assert_eq!(grid.obstacle_count(), 0);

        grid.set_obstacle(Point2D::new(1.0, 0.0), 0.1).unwrap();
        assert!(grid.is_occupied(19, 9));
        assert!(grid.is_occupied(19, 10));
        assert_eq!(grid.obstacle_count(), 2);
    }

    #[rstest]
    fn invalid_obstacles_leave_grid_untouched(mut grid: OccupancyGrid) {
        assert!(grid.set_obstacle(Point2D::new(f64::NAN, 0.0), 0.2).is_err());
        assert!(grid.set_obstacle(Point2D::new(0.0, 0.0), -1.0).is_err());
        assert!(grid.set_obstacle(Point2D::new(0.0, 0.0), f64::INFINITY).is_err());
        assert_eq!(grid.obstacle_count(), 0);
        assert!(invariant_holds(&grid));
    }

    #[rstest]
    fn clear_restores_free_cells(mut grid: OccupancyGrid) {
        grid.set_obstacle(Point2D::new(0.0, 0.0), 0.3).unwrap();
        grid.set_obstacle(Point2D::new(-0.6, 0.4), 0.1).unwrap();
        assert!(invariant_holds(&grid));
        grid.clear_obstacles();
        assert_eq!(grid.obstacle_count(), 0);
        assert!(grid.cells().all(|c| !c.occupied && c.cost == 0.0));
        assert!(invariant_holds(&grid));
    }

    #[rstest]
    fn rebuild_replaces_previous_epoch(mut grid: OccupancyGrid) {
        grid.set_obstacle(Point2D::new(-0.5, -0.5), 0.1).unwrap();
        let stamped = grid
            .rebuild_obstacles(
                &[Point2D::new(0.5, 0.5), Point2D::new(f64::INFINITY, 0.0)],
                0.1,
            )
            .unwrap();
        assert_eq!(stamped, 1);
        assert!(!grid.is_occupied_at(Point2D::new(-0.5, -0.5)));
        assert!(grid.is_occupied_at(Point2D::new(0.5, 0.5)));
        assert!(invariant_holds(&grid));
    }

    #[rstest]
    fn costs_never_touch_occupied_cells(mut grid: OccupancyGrid) {
        grid.set_obstacle(Point2D::new(0.0, 0.0), 0.1).unwrap();
        grid.apply_cost_field(|_| 3.0);
        assert!(invariant_holds(&grid));
        assert_eq!(grid.cell(0, 0).unwrap().cost, 3.0);

        grid.set_cost(0, 0, f64::NAN);
        assert_eq!(grid.cell(0, 0).unwrap().cost, 3.0);

        grid.clear_costs();
        assert!(grid.cells().filter(|c| !c.occupied).all(|c| c.cost == 0.0));
        assert!(invariant_holds(&grid));
    }

    #[rstest]
    fn blocked_path_detection(mut grid: OccupancyGrid) {
        let path = vec![Point2D::new(-0.5, 0.0), Point2D::new(0.0, 0.0), Point2D::new(0.5, 0.0)];
        assert!(!grid.is_path_blocked(&path));
        grid.set_obstacle(Point2D::new(0.0, 0.0), 0.1).unwrap();
        assert!(grid.is_path_blocked(&path));
    }
}
