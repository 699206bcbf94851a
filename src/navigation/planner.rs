//! Path planning module

use super::costmap::{CellIndex, OccupancyGrid};
use crate::common::Point2D;
use crate::config::PlannerConfig;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Trait for path planning algorithms
pub trait PathPlanner: Send + Sync {
    /// Plan a path from start to goal over `grid`.
    ///
    /// Returns an empty path when no route exists. The grid's search
    /// scratch fields are overwritten.
    fn plan_path(
        &self,
        grid: &mut OccupancyGrid,
        start: Point2D,
        goal: Point2D,
        social_mode: bool,
    ) -> Vec<Point2D>;

    /// Smooth a planned path, keeping both endpoints
    fn smooth_path(&self, path: &[Point2D]) -> Vec<Point2D> {
        moving_average(path)
    }
}

/// 8-connected neighbourhood with the cost of each move
const DIRECTIONS: [(i64, i64, f64); 8] = [
    (0, 1, 1.0),
    (1, 0, 1.0),
    (0, -1, 1.0),
    (-1, 0, 1.0),
    (1, 1, 1.4),
    (1, -1, 1.4),
    (-1, 1, 1.4),
    (-1, -1, 1.4),
];

/// Open-set entry
#[derive(Debug, Clone)]
struct SearchNode {
    cell: CellIndex,
    f_score: f64,
}

impl PartialEq for SearchNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchNode {}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; ties resolve on the lower cell index
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Grid A* planner with an optional social cost term
#[derive(Debug, Clone)]
pub struct AStarPlanner {
    config: PlannerConfig,
}

impl Default for AStarPlanner {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

impl AStarPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        AStarPlanner { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    fn heuristic(a: CellIndex, b: CellIndex) -> f64 {
        let dx = a.0 as f64 - b.0 as f64;
        let dy = a.1 as f64 - b.1 as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Proximity penalty of `cell` against every occupied cell within the
    /// social radius, plus the weighted comfort cost stored on the cell.
    fn social_cost(&self, grid: &OccupancyGrid, cell: CellIndex) -> f64 {
        let radius = self.config.social_radius_cells;
        let reach = radius.ceil().max(0.0) as i64;
        let (cx, cy) = (cell.0 as i64, cell.1 as i64);

        let mut cost = 0.0;
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                let (ox, oy) = (cx + dx, cy + dy);
                if !grid.contains(ox, oy) || !grid.is_occupied(ox as usize, oy as usize) {
                    continue;
                }
                let dist = ((dx * dx + dy * dy) as f64).sqrt();
                if dist < radius {
                    cost += self.config.social_cost_weight / (dist + 0.1).powi(2);
                }
            }
        }

        if let Some(c) = grid.cell(cell.0, cell.1) {
            if c.cost.is_finite() {
                cost += self.config.human_cost_weight * c.cost;
            }
        }
        cost
    }

    fn reconstruct(grid: &OccupancyGrid, goal: CellIndex) -> Vec<Point2D> {
        let mut path = Vec::new();
        let mut current = Some(goal);
        while let Some((x, y)) = current {
            path.push(grid.grid_to_world(x, y));
            current = grid.cell(x, y).and_then(|c| c.parent);
        }
        path.reverse();
        path
    }
}

impl PathPlanner for AStarPlanner {
    fn plan_path(
        &self,
        grid: &mut OccupancyGrid,
        start: Point2D,
        goal: Point2D,
        social_mode: bool,
    ) -> Vec<Point2D> {
        let start_cell = grid.world_to_grid(start);
        let goal_cell = grid.world_to_grid(goal);

        grid.reset_search();

        if grid.is_occupied(goal_cell.0, goal_cell.1) {
            tracing::warn!("Goal position {:?} is in an obstacle", goal_cell);
            return Vec::new();
        }

        let width = grid.width();
        let index = |c: CellIndex| c.1 * width + c.0;
        let mut g_score = vec![f64::INFINITY; width * grid.height()];
        let mut open = BinaryHeap::new();

        g_score[index(start_cell)] = 0.0;
        open.push(SearchNode {
            cell: start_cell,
            f_score: Self::heuristic(start_cell, goal_cell),
        });

        let mut expanded = 0usize;
        while let Some(SearchNode { cell: current, .. }) = open.pop() {
            match grid.cell(current.0, current.1) {
                Some(c) if c.visited => continue,
                Some(_) => {}
                None => continue,
            }

            if current == goal_cell {
                let path = Self::reconstruct(grid, goal_cell);
                tracing::debug!(
                    "A* found {} waypoints after expanding {} cells (social: {})",
                    path.len(),
                    expanded,
                    social_mode
                );
                return path;
            }

            if let Some(c) = grid.cell_mut(current.0, current.1) {
                c.visited = true;
            }
            expanded += 1;

            let current_g = g_score[index(current)];
            for &(dx, dy, step_cost) in DIRECTIONS.iter() {
                let nx = current.0 as i64 + dx;
                let ny = current.1 as i64 + dy;
                if !grid.contains(nx, ny) {
                    continue;
                }
                let neighbor = (nx as usize, ny as usize);
                match grid.cell(neighbor.0, neighbor.1) {
                    Some(c) if c.visited || c.occupied => continue,
                    Some(_) => {}
                    None => continue,
                }

                let mut move_cost = step_cost;
                if social_mode {
                    move_cost += self.social_cost(grid, neighbor);
                }

                let tentative_g = current_g + move_cost;
                if tentative_g >= g_score[index(neighbor)] {
                    continue;
                }

                g_score[index(neighbor)] = tentative_g;
                if let Some(c) = grid.cell_mut(neighbor.0, neighbor.1) {
                    c.parent = Some(current);
                }
                open.push(SearchNode {
                    cell: neighbor,
                    f_score: tentative_g + Self::heuristic(neighbor, goal_cell),
                });
            }
        }

        tracing::warn!("No path found from {:?} to {:?}", start_cell, goal_cell);
        Vec::new()
    }
}

/// Single-pass three-point moving average; endpoints are kept as-is
pub fn moving_average(path: &[Point2D]) -> Vec<Point2D> {
    if path.len() <= 2 {
        return path.to_vec();
    }

    let mut smoothed = Vec::with_capacity(path.len());
    smoothed.push(path[0]);
    for window in path.windows(3) {
        smoothed.push(Point2D::new(
            (window[0].x + window[1].x + window[2].x) / 3.0,
            (window[0].y + window[1].y + window[2].y) / 3.0,
        ));
    }
    smoothed.push(path[path.len() - 1]);
    smoothed
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn grid() -> OccupancyGrid {
        OccupancyGrid::new(20, 20, 0.1).unwrap()
    }

    fn min_clearance(grid: &OccupancyGrid, path: &[Point2D]) -> f64 {
        let mut best = f64::INFINITY;
        for (ox, oy) in grid.obstacles() {
            let center = grid.grid_to_world(ox, oy);
            for p in path {
                best = best.min(p.distance(&center));
            }
        }
        best
    }

    #[rstest]
    fn plans_across_empty_grid(mut grid: OccupancyGrid) {
        let planner = AStarPlanner::default();
        let start = Point2D::new(-0.5, -0.5);
        let goal = Point2D::new(0.5, 0.5);
        let path = planner.plan_path(&mut grid, start, goal, false);

        assert!(!path.is_empty());
        let first = path[0];
        let last = path[path.len() - 1];
        assert_eq!(grid.world_to_grid(first), grid.world_to_grid(start));
        assert_eq!(grid.world_to_grid(last), grid.world_to_grid(goal));
        // Straight diagonal: start cell plus ten diagonal steps
        assert_eq!(path.len(), 11);
    }

    #[rstest]
    fn path_avoids_obstacle(mut grid: OccupancyGrid) {
        grid.set_obstacle(Point2D::new(0.0, 0.0), 0.2).unwrap();
        let planner = AStarPlanner::default();
        let path = planner.plan_path(
            &mut grid,
            Point2D::new(-0.5, -0.5),
            Point2D::new(0.5, 0.5),
            false,
        );

        assert!(!path.is_empty());
        for p in &path {
            assert!(!grid.is_occupied_at(*p));
            assert!(p.distance(&Point2D::ORIGIN) > 0.15, "{:?} too close", p);
        }
    }

    #[rstest]
    fn wall_blocks_every_route(mut grid: OccupancyGrid) {
        for y in 0..grid.height() {
            let center = grid.grid_to_world(10, y);
            grid.set_obstacle(center, 0.05).unwrap();
        }
        let planner = AStarPlanner::default();
        let path = planner.plan_path(
            &mut grid,
            Point2D::new(-0.5, 0.0),
            Point2D::new(0.5, 0.0),
            false,
        );
        assert!(path.is_empty());
    }

    #[rstest]
    fn occupied_goal_yields_empty_path(mut grid: OccupancyGrid) {
        grid.set_obstacle(Point2D::new(0.5, 0.5), 0.1).unwrap();
        let planner = AStarPlanner::default();
        let path = planner.plan_path(
            &mut grid,
            Point2D::new(-0.5, -0.5),
            Point2D::new(0.5, 0.5),
            true,
        );
        assert!(path.is_empty());
    }

    #[rstest]
    fn occupied_start_still_escapes(mut grid: OccupancyGrid) {
        grid.set_obstacle(Point2D::new(-0.45, -0.45), 0.05).unwrap();
        assert!(grid.is_occupied_at(Point2D::new(-0.45, -0.45)));
        let planner = AStarPlanner::default();
        let path = planner.plan_path(
            &mut grid,
            Point2D::new(-0.45, -0.45),
            Point2D::new(0.5, 0.5),
            false,
        );
        assert!(!path.is_empty());
    }

    #[rstest]
    fn start_equal_to_goal_is_single_waypoint(mut grid: OccupancyGrid) {
        let planner = AStarPlanner::default();
        let p = Point2D::new(0.23, -0.31);
        let path = planner.plan_path(&mut grid, p, p, false);
        assert_eq!(path.len(), 1);
        assert_eq!(grid.world_to_grid(path[0]), grid.world_to_grid(p));
    }

    #[rstest]
    fn planning_is_deterministic(mut grid: OccupancyGrid) {
        grid.set_obstacle(Point2D::new(0.0, 0.1), 0.25).unwrap();
        let planner = AStarPlanner::default();
        let start = Point2D::new(-0.7, 0.1);
        let goal = Point2D::new(0.7, 0.1);
        let first = planner.plan_path(&mut grid, start, goal, true);
        let second = planner.plan_path(&mut grid, start, goal, true);
        assert_eq!(first, second);
    }

    #[rstest]
    fn social_mode_keeps_at_least_as_much_clearance(mut grid: OccupancyGrid) {
        grid.set_obstacle(Point2D::new(0.0, 0.0), 0.2).unwrap();
        let planner = AStarPlanner::default();
        let start = Point2D::new(-0.75, 0.05);
        let goal = Point2D::new(0.75, 0.05);

        let normal = planner.plan_path(&mut grid, start, goal, false);
        let social = planner.plan_path(&mut grid, start, goal, true);

        assert!(!normal.is_empty());
        assert!(!social.is_empty());
        assert!(min_clearance(&grid, &social) >= min_clearance(&grid, &normal));
    }

    #[rstest]
    fn social_mode_routes_around_costly_cells(mut grid: OccupancyGrid) {
        for y in 5..15 {
            grid.set_cost(10, y, 100.0);
        }
        let planner = AStarPlanner::default();
        let start = Point2D::new(-0.5, 0.05);
        let goal = Point2D::new(0.5, 0.05);

        let cost_on = |grid: &OccupancyGrid, path: &[Point2D]| {
            path.iter()
                .map(|p| {
                    let (x, y) = grid.world_to_grid(*p);
                    grid.cell(x, y).map_or(0.0, |c| c.cost)
                })
                .sum::<f64>()
        };

        let normal = planner.plan_path(&mut grid, start, goal, false);
        let social = planner.plan_path(&mut grid, start, goal, true);
        assert!(cost_on(&grid, &normal) > 0.0);
        assert_eq!(cost_on(&grid, &social), 0.0);
    }

    #[test]
    fn smoothing_keeps_short_paths() {
        let planner = AStarPlanner::default();
        let two = vec![Point2D::new(0.0, 0.0), Point2D::new(1.0, 1.0)];
        assert_eq!(planner.smooth_path(&two), two);
        assert!(planner.smooth_path(&[]).is_empty());
    }

    #[test]
    fn smoothing_averages_interior_points() {
        let planner = AStarPlanner::default();
        let path = vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 1.0),
            Point2D::new(2.0, 0.0),
            Point2D::new(3.0, 0.0),
        ];
        let smoothed = planner.smooth_path(&path);
        assert_eq!(smoothed.len(), path.len());
        assert_eq!(smoothed[0], path[0]);
        assert_eq!(smoothed[3], path[3]);
        assert_relative_eq!(smoothed[1].x, 1.0);
        assert_relative_eq!(smoothed[1].y, 1.0 / 3.0);
        assert_relative_eq!(smoothed[2].x, 2.0);
        assert_relative_eq!(smoothed[2].y, 1.0 / 3.0);
    }
}
