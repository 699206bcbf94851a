//! Human tracking and proxemic comfort costs
//!
//! Each tracked human projects a personal-space field shaped by Hall's
//! intimate, personal and social distances, stretched in front of the person
//! and shortened behind. Fields of all tracked humans add up, so crowds
//! compound.

use super::DetectionRecord;
use crate::common::{normalize_angle, point_to_segment_distance, Point2D};
use crate::config::HumanConfig;
use nalgebra::Vector2;
use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

/// Speed on either axis above which a human is treated as walking
const MOVING_THRESHOLD: f64 = 0.1;

/// Another human closer than this to the approach bearing blocks it
const APPROACH_BLOCK_ANGLE: f64 = 0.5;
const APPROACH_BLOCK_DISTANCE: f64 = 2.0;

/// Proxemic cost model around a single person
#[derive(Debug, Clone, PartialEq)]
pub struct PersonalSpaceModel {
    pub intimate_distance: f64,
    pub personal_distance: f64,
    pub social_distance: f64,
    pub front_scaling: f64,
    pub side_scaling: f64,
    pub back_scaling: f64,
    /// Flat cost inside the intimate zone
    pub intimate_cost: f64,
    /// Cost at the inner edge of the personal zone
    pub personal_space_cost: f64,
    /// Cost at the inner edge of the social zone
    pub social_space_cost: f64,
}

impl Default for PersonalSpaceModel {
    fn default() -> Self {
        PersonalSpaceModel {
            intimate_distance: 0.45,
            personal_distance: 1.2,
            social_distance: 3.6,
            front_scaling: 1.5,
            side_scaling: 1.0,
            back_scaling: 0.8,
            intimate_cost: 10.0,
            personal_space_cost: 2.0,
            social_space_cost: 0.5,
        }
    }
}

impl PersonalSpaceModel {
    /// Zone scaling for a point at `relative_angle` from the human's facing
    fn scaling(&self, relative_angle: f64) -> f64 {
        let a = relative_angle.abs();
        if a < FRAC_PI_4 {
            self.front_scaling
        } else if a > 3.0 * FRAC_PI_4 {
            self.back_scaling
        } else {
            self.side_scaling
        }
    }

    /// Comfort cost of `point` for a human at `human` facing `facing`.
    ///
    /// Inside the intimate zone the cost is flat. Across the personal zone it
    /// falls linearly from `personal_space_cost` to zero, and across the
    /// social zone from `social_space_cost` to zero. The cost therefore steps
    /// up from zero to `social_space_cost` at the personal boundary.
    pub fn personal_space_cost(&self, point: Point2D, human: Point2D, facing: f64) -> f64 {
        let distance = human.distance(&point);
        let relative_angle = normalize_angle(human.bearing_to(&point) - facing);
        let scaling = self.scaling(relative_angle);

        let personal_boundary = self.personal_distance * scaling;
        let social_boundary = self.social_distance * scaling;

        if distance < self.intimate_distance {
            self.intimate_cost
        } else if distance < personal_boundary {
            let n = (distance - self.intimate_distance) / (personal_boundary - self.intimate_distance);
            self.personal_space_cost * (1.0 - n)
        } else if distance < social_boundary {
            let n = (distance - personal_boundary) / (social_boundary - personal_boundary);
            self.social_space_cost * (1.0 - n)
        } else {
            0.0
        }
    }
}

/// A tracked human
#[derive(Debug, Clone, PartialEq)]
pub struct HumanDetection {
    pub id: u64,
    pub position: Point2D,
    pub velocity: Vector2<f64>,
    /// Detection confidence in `[0, 1]`
    pub confidence: f64,
    /// Seconds, in the detector's clock
    pub last_seen: f64,
}

impl HumanDetection {
    pub fn is_moving(&self) -> bool {
        self.velocity.x.abs() > MOVING_THRESHOLD || self.velocity.y.abs() > MOVING_THRESHOLD
    }

    /// Facing direction when evaluating `point`: the walking direction, or
    /// straight at `point` when standing still.
    pub fn facing(&self, point: Point2D) -> f64 {
        if self.is_moving() {
            self.velocity.y.atan2(self.velocity.x)
        } else {
            self.position.bearing_to(&point)
        }
    }
}

/// Tracks humans by id and aggregates their comfort costs
#[derive(Debug, Clone)]
pub struct HumanTracker {
    model: PersonalSpaceModel,
    humans: BTreeMap<u64, HumanDetection>,
    tracking_timeout: f64,
    default_confidence: f64,
}

impl Default for HumanTracker {
    fn default() -> Self {
        Self::new(&HumanConfig::default())
    }
}

impl HumanTracker {
    pub fn new(config: &HumanConfig) -> Self {
        HumanTracker {
            model: PersonalSpaceModel::default(),
            humans: BTreeMap::new(),
            tracking_timeout: config.tracking_timeout_secs,
            default_confidence: config.default_confidence,
        }
    }

    pub fn with_model(mut self, model: PersonalSpaceModel) -> Self {
        self.model = model;
        self
    }

    pub fn model(&self) -> &PersonalSpaceModel {
        &self.model
    }

    pub fn humans(&self) -> impl Iterator<Item = &HumanDetection> {
        self.humans.values()
    }

    pub fn get(&self, id: u64) -> Option<&HumanDetection> {
        self.humans.get(&id)
    }

    pub fn len(&self) -> usize {
        self.humans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.humans.is_empty()
    }

    pub fn clear(&mut self) {
        self.humans.clear();
    }

    /// Upsert `detections` seen at `now`, then prune stale tracks.
    ///
    /// Records with non-finite fields are dropped individually. Returns the
    /// number of records accepted.
    pub fn update(&mut self, detections: &[DetectionRecord], now: f64) -> usize {
        let mut accepted = 0;
        for record in detections {
            let velocity = record.velocity.unwrap_or_else(Vector2::zeros);
            let confidence = record.confidence.unwrap_or(self.default_confidence);
            if !record.position.is_finite()
                || !velocity.iter().all(|v| v.is_finite())
                || !confidence.is_finite()
            {
                tracing::warn!("Dropping malformed detection for human {}", record.id);
                continue;
            }

            self.humans.insert(
                record.id,
                HumanDetection {
                    id: record.id,
                    position: record.position,
                    velocity,
                    confidence: confidence.clamp(0.0, 1.0),
                    last_seen: now,
                },
            );
            accepted += 1;
        }

        let pruned = self.prune(now);
        tracing::debug!(
            "Human tracker: {} accepted, {} pruned, {} tracked",
            accepted,
            pruned,
            self.humans.len()
        );
        accepted
    }

    /// Drop humans not seen within the tracking timeout of `now`
    pub fn prune(&mut self, now: f64) -> usize {
        let before = self.humans.len();
        let timeout = self.tracking_timeout;
        self.humans.retain(|_, h| now - h.last_seen <= timeout);
        before - self.humans.len()
    }

    /// Summed comfort cost of `point` over all tracked humans
    pub fn social_cost(&self, point: Point2D) -> f64 {
        self.humans
            .values()
            .map(|h| {
                self.model.personal_space_cost(point, h.position, h.facing(point)) * h.confidence
            })
            .sum()
    }

    /// Humans within `threshold` of any segment of `path`
    pub fn humans_in_path(&self, path: &[Point2D], threshold: f64) -> Vec<&HumanDetection> {
        if path.is_empty() {
            return Vec::new();
        }

        self.humans
            .values()
            .filter(|h| {
                let min_distance = if path.len() == 1 {
                    h.position.distance(&path[0])
                } else {
                    path.windows(2)
                        .map(|w| point_to_segment_distance(h.position, w[0], w[1]))
                        .fold(f64::INFINITY, f64::min)
                };
                min_distance <= threshold
            })
            .collect()
    }

    /// Bearing from `human` toward `target`, turned a quarter circle when
    /// another tracked human stands in that direction nearby.
    pub fn preferred_approach_direction(&self, target: Point2D, human: Point2D) -> f64 {
        let base = human.bearing_to(&target);

        let blocked = self.humans.values().any(|other| {
            if other.position == human {
                return false;
            }
            let other_angle = human.bearing_to(&other.position);
            normalize_angle(other_angle - base).abs() < APPROACH_BLOCK_ANGLE
                && human.distance(&other.position) < APPROACH_BLOCK_DISTANCE
        });

        if blocked {
            base + FRAC_PI_2
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn model() -> PersonalSpaceModel {
        PersonalSpaceModel::default()
    }

    /// Samples `(from, to)` at 1 cm steps and checks the cost strictly falls
    fn assert_strictly_falls(model: &PersonalSpaceModel, facing: f64, from: f64, to: f64) {
        let human = Point2D::ORIGIN;
        let mut previous = f64::INFINITY;
        let mut d = from;
        while d < to {
            let cost = model.personal_space_cost(Point2D::new(d, 0.0), human, facing);
            assert!(cost < previous, "cost rose at {} (facing {})", d, facing);
            previous = cost;
            d += 0.01;
        }
    }

    #[rstest]
    #[case::front(0.0, 1.5)]
    #[case::side(FRAC_PI_2, 1.0)]
    #[case::back(std::f64::consts::PI, 0.8)]
    fn cost_decreases_within_each_zone(
        model: PersonalSpaceModel,
        #[case] facing: f64,
        #[case] scaling: f64,
    ) {
        let personal = 1.2 * scaling;
        let social = 3.6 * scaling;
        assert_strictly_falls(&model, facing, 0.46, personal - 0.005);
        assert_strictly_falls(&model, facing, personal + 0.005, social - 0.005);
    }

    #[rstest]
    fn personal_zone_falls_to_zero_then_social_zone_restarts(model: PersonalSpaceModel) {
        let human = Point2D::ORIGIN;
        // Side sector: personal boundary at 1.2, social boundary at 3.6
        let inner = model.personal_space_cost(Point2D::new(0.0, 1.1999), human, 0.0);
        let outer = model.personal_space_cost(Point2D::new(0.0, 1.2), human, 0.0);
        assert!(inner < 1e-3);
        assert_relative_eq!(outer, 0.5, epsilon = 1e-9);
        assert_relative_eq!(
            model.personal_space_cost(Point2D::new(0.0, 0.825), human, 0.0),
            1.0,
            epsilon = 1e-9
        );
    }

    #[rstest]
    fn cost_reaches_zero_at_social_boundary(model: PersonalSpaceModel) {
        let human = Point2D::ORIGIN;
        // Front boundary is 3.6 * 1.5
        assert!(model.personal_space_cost(Point2D::new(5.39, 0.0), human, 0.0) > 0.0);
        assert_eq!(model.personal_space_cost(Point2D::new(5.41, 0.0), human, 0.0), 0.0);
        assert_eq!(model.personal_space_cost(Point2D::new(9.0, 0.0), human, 0.0), 0.0);
    }

    #[rstest]
    #[case::intimate(0.3, 0.0, 10.0)]
    #[case::front_personal(1.0, 0.0, 2.0 * (1.0 - 0.55 / 1.35))]
    #[case::side_personal(0.0, 1.0, 2.0 * (1.0 - 0.55 / 0.75))]
    #[case::back_social(-1.0, 0.0, 0.5 * (1.0 - 0.04 / 1.92))]
    fn zone_costs_for_human_facing_east(
        model: PersonalSpaceModel,
        #[case] x: f64,
        #[case] y: f64,
        #[case] expected: f64,
    ) {
        let cost = model.personal_space_cost(Point2D::new(x, y), Point2D::ORIGIN, 0.0);
        assert_relative_eq!(cost, expected, epsilon = 1e-9);
    }

    #[test]
    fn stationary_human_faces_the_point() {
        let human = HumanDetection {
            id: 1,
            position: Point2D::ORIGIN,
            velocity: Vector2::new(0.05, 0.0),
            confidence: 1.0,
            last_seen: 0.0,
        };
        assert!(!human.is_moving());
        assert_relative_eq!(human.facing(Point2D::new(0.0, -2.0)), -FRAC_PI_2);

        let walking = HumanDetection {
            velocity: Vector2::new(0.0, 0.5),
            ..human
        };
        assert!(walking.is_moving());
        assert_relative_eq!(walking.facing(Point2D::new(0.0, -2.0)), FRAC_PI_2);
    }

    #[test]
    fn walking_human_costs_less_behind_than_ahead() {
        let mut tracker = HumanTracker::default();
        tracker.update(&[DetectionRecord::new(1, Point2D::ORIGIN).with_velocity(1.0, 0.0)], 0.0);
        let ahead = tracker.social_cost(Point2D::new(1.5, 0.0));
        let behind = tracker.social_cost(Point2D::new(-1.5, 0.0));
        assert!(ahead > behind);
    }

    #[test]
    fn cost_scales_with_confidence() {
        let point = Point2D::new(1.0, 0.0);
        let mut full = HumanTracker::default();
        full.update(&[DetectionRecord::new(1, Point2D::ORIGIN).with_confidence(1.0)], 0.0);
        let mut half = HumanTracker::default();
        half.update(&[DetectionRecord::new(1, Point2D::ORIGIN).with_confidence(0.5)], 0.0);
        assert_relative_eq!(half.social_cost(point), full.social_cost(point) * 0.5);
    }

    #[test]
    fn defaults_and_clamping_apply_to_records() {
        let mut tracker = HumanTracker::default();
        let accepted = tracker.update(
            &[
                DetectionRecord::new(1, Point2D::new(1.0, 1.0)),
                DetectionRecord::new(2, Point2D::new(2.0, 0.0)).with_confidence(1.7),
                DetectionRecord::new(3, Point2D::new(f64::NAN, 0.0)),
            ],
            10.0,
        );
        assert_eq!(accepted, 2);
        assert_eq!(tracker.get(1).unwrap().confidence, 0.8);
        assert_eq!(tracker.get(1).unwrap().velocity, Vector2::zeros());
        assert_eq!(tracker.get(2).unwrap().confidence, 1.0);
        assert!(tracker.get(3).is_none());
    }

    #[test]
    fn crowds_compound() {
        let point = Point2D::new(1.0, 0.0);
        let mut one = HumanTracker::default();
        one.update(&[DetectionRecord::new(1, Point2D::ORIGIN)], 0.0);
        let mut two = HumanTracker::default();
        two.update(
            &[
                DetectionRecord::new(1, Point2D::ORIGIN),
                DetectionRecord::new(2, Point2D::new(2.0, 0.0)),
            ],
            0.0,
        );
        assert_relative_eq!(two.social_cost(point), 2.0 * one.social_cost(point));
    }

    #[test]
    fn upsert_and_prune() {
        let mut tracker = HumanTracker::default();
        tracker.update(&[DetectionRecord::new(1, Point2D::ORIGIN)], 0.0);
        tracker.update(&[DetectionRecord::new(2, Point2D::new(1.0, 0.0))], 3.0);
        tracker.update(&[DetectionRecord::new(2, Point2D::new(1.5, 0.0))], 5.0);
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.get(2).unwrap().position, Point2D::new(1.5, 0.0));

        // Human 1 last seen at 0.0
        assert_eq!(tracker.prune(5.5), 1);
        assert!(tracker.get(1).is_none());
        assert_eq!(tracker.prune(10.0), 0);
        assert_eq!(tracker.prune(10.01), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn humans_near_the_path_are_reported() {
        let mut tracker = HumanTracker::default();
        tracker.update(
            &[
                DetectionRecord::new(1, Point2D::new(1.0, 0.5)),
                DetectionRecord::new(2, Point2D::new(1.0, 3.0)),
                DetectionRecord::new(3, Point2D::new(3.0, 0.0)),
            ],
            0.0,
        );
        let path = vec![Point2D::ORIGIN, Point2D::new(2.0, 0.0)];
        let ids: Vec<u64> = tracker.humans_in_path(&path, 1.0).iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(tracker.humans_in_path(&[], 1.0).is_empty());
    }

    #[test]
    fn approach_turns_when_blocked() {
        let mut tracker = HumanTracker::default();
        let human = Point2D::ORIGIN;
        let target = Point2D::new(3.0, 0.0);
        tracker.update(&[DetectionRecord::new(1, human)], 0.0);
        assert_relative_eq!(tracker.preferred_approach_direction(target, human), 0.0);

        tracker.update(&[DetectionRecord::new(2, Point2D::new(1.0, 0.1))], 0.0);
        assert_relative_eq!(tracker.preferred_approach_direction(target, human), FRAC_PI_2);

        let far = Point2D::new(-5.0, 0.0);
        let mut spread = HumanTracker::default();
        spread.update(
            &[DetectionRecord::new(1, human), DetectionRecord::new(2, far)],
            0.0,
        );
        assert_relative_eq!(spread.preferred_approach_direction(target, human), 0.0);
    }
}
