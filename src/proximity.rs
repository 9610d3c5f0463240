use crate::{domain::KeyPoint, geo::Coordinates};

/// Default reach radius, matching the 0.05 km the tour backend has always used.
pub const DEFAULT_PROXIMITY_THRESHOLD_M: f64 = 50.0;

/// Decides which key points a position reaches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityEvaluator {
    threshold_m: f64,
}

impl Default for ProximityEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_PROXIMITY_THRESHOLD_M)
    }
}

impl ProximityEvaluator {
    pub fn new(threshold_m: f64) -> Self {
        Self { threshold_m }
    }

    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }

    /// Ids of key points within the threshold of `position` that are not in
    /// `completed`, in key point order. Each id appears at most once.
    pub fn evaluate(
        &self,
        key_points: &[KeyPoint],
        completed: &[u64],
        position: &Coordinates,
    ) -> Vec<u64> {
        let mut reached: Vec<u64> = Vec::new();

        for kp in key_points {
            if completed.contains(&kp.id) || reached.contains(&kp.id) {
                continue;
            }
            if kp.position().distance_m(position) <= self.threshold_m {
                reached.push(kp.id);
            }
        }

        reached
    }
}
