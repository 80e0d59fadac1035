// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use float_cmp::approx_eq;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationMethod {
    #[default]
    Step,
    NearestStep,
    Linear,
    Cubic,
}

impl InterpolationMethod {
    /// Parses the attribute spelling; unknown spellings are `None`.
    pub fn from_attr(name: &str) -> Option<Self> {
        match name {
            "step" => Some(InterpolationMethod::Step),
            "nearestStep" => Some(InterpolationMethod::NearestStep),
            "linear" => Some(InterpolationMethod::Linear),
            "cubic" => Some(InterpolationMethod::Cubic),
            _ => None,
        }
    }
}

/// A scalar function of one input defined by sample points.
///
/// Points are held sorted by x; lookups outside the sampled range clamp
/// to the first/last y value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphicalFn {
    points: Vec<(f64, f64)>,
    pub method: InterpolationMethod,
}

impl GraphicalFn {
    pub fn new(mut points: Vec<(f64, f64)>, method: InterpolationMethod) -> Self {
        points.sort_by_key(|(x, _)| OrderedFloat(*x));
        GraphicalFn { points, method }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn lookup(&self, input: f64) -> f64 {
        let table = &self.points;
        if table.is_empty() {
            return f64::NAN;
        }

        if input.is_nan() {
            // things get wonky below if we try to binary search for NaN
            return f64::NAN;
        }

        {
            let (x, y) = table[0];
            if input <= x {
                return y;
            }
        }

        let size = table.len();
        {
            let (x, y) = table[size - 1];
            if input >= x {
                return y;
            }
        }

        // index of the first sample with x >= input; bounded to [1, size-1]
        // by the range checks above
        let mut low = 0;
        let mut high = size;
        while low < high {
            let mid = low + (high - low) / 2;
            if table[mid].0 < input {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        let i = low;

        // landing on a sample returns its y under every method
        if approx_eq!(f64, table[i].0, input) {
            return table[i].1;
        }

        match self.method {
            InterpolationMethod::Step => table[i - 1].1,
            InterpolationMethod::NearestStep => {
                let below = table[i - 1];
                let above = table[i];
                // on a tie the lower x wins
                if input - below.0 <= above.0 - input {
                    below.1
                } else {
                    above.1
                }
            }
            InterpolationMethod::Linear => {
                let slope = (table[i].1 - table[i - 1].1) / (table[i].0 - table[i - 1].0);
                (input - table[i - 1].0) * slope + table[i - 1].1
            }
            InterpolationMethod::Cubic => self.hermite(i, input),
        }
    }

    /// Cubic Hermite segment interpolation with finite-difference
    /// tangents; endpoint tangents use the one-sided secant.
    fn hermite(&self, i: usize, input: f64) -> f64 {
        let table = &self.points;
        let (x1, y1) = table[i - 1];
        let (x2, y2) = table[i];
        let h = x2 - x1;
        if h == 0.0 {
            return y1;
        }
        let secant = (y2 - y1) / h;

        let m1 = if i >= 2 {
            let (x0, y0) = table[i - 2];
            (y2 - y0) / (x2 - x0)
        } else {
            secant
        };
        let m2 = if i + 1 < table.len() {
            let (x3, y3) = table[i + 1];
            (y3 - y1) / (x3 - x1)
        } else {
            secant
        };

        let t = (input - x1) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        (2.0 * t3 - 3.0 * t2 + 1.0) * y1
            + (t3 - 2.0 * t2 + t) * h * m1
            + (-2.0 * t3 + 3.0 * t2) * y2
            + (t3 - t2) * h * m2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    fn ramp(method: InterpolationMethod) -> GraphicalFn {
        GraphicalFn::new(vec![(0.0, 0.0), (10.0, 100.0)], method)
    }

    #[test]
    fn linear_interpolation() {
        let gf = ramp(InterpolationMethod::Linear);
        assert_eq!(50.0, gf.lookup(5.0));
        assert_eq!(0.0, gf.lookup(0.0));
        assert_eq!(100.0, gf.lookup(10.0));
    }

    #[test]
    fn step_holds_lower_sample() {
        let gf = ramp(InterpolationMethod::Step);
        assert_eq!(0.0, gf.lookup(5.0));
        assert_eq!(0.0, gf.lookup(9.9));
        assert_eq!(100.0, gf.lookup(10.0));

        let three = GraphicalFn::new(
            vec![(0.0, 0.0), (5.0, 50.0), (10.0, 100.0)],
            InterpolationMethod::Step,
        );
        assert_eq!(50.0, three.lookup(5.0));
        assert_eq!(50.0, three.lookup(7.0));
        assert_eq!(0.0, three.lookup(4.999));
    }

    #[test]
    fn nearest_step_ties_go_low() {
        let gf = ramp(InterpolationMethod::NearestStep);
        assert_eq!(0.0, gf.lookup(5.0));
        assert_eq!(100.0, gf.lookup(5.1));
        assert_eq!(0.0, gf.lookup(4.9));
    }

    #[test]
    fn clamping_and_degenerate_tables() {
        let gf = ramp(InterpolationMethod::Linear);
        assert_eq!(0.0, gf.lookup(-5.0));
        assert_eq!(100.0, gf.lookup(50.0));

        let empty = GraphicalFn::new(vec![], InterpolationMethod::Linear);
        assert!(empty.lookup(1.0).is_nan());
        assert!(gf.lookup(f64::NAN).is_nan());
    }

    #[test]
    fn points_are_sorted_on_construction() {
        let gf = GraphicalFn::new(
            vec![(10.0, 100.0), (0.0, 0.0), (5.0, 25.0)],
            InterpolationMethod::Linear,
        );
        assert_eq!(&[(0.0, 0.0), (5.0, 25.0), (10.0, 100.0)], gf.points());
    }

    #[test]
    fn cubic_passes_through_samples_and_stays_smooth() {
        let gf = GraphicalFn::new(
            vec![(0.0, 0.0), (1.0, 1.0), (2.0, 4.0), (3.0, 9.0)],
            InterpolationMethod::Cubic,
        );
        for (x, y) in gf.points() {
            assert!(approx_eq!(f64, *y, gf.lookup(*x)), "at x={}", x);
        }
        // between x^2 samples the spline should be close to x^2
        let mid = gf.lookup(1.5);
        assert!((mid - 2.25).abs() < 0.2, "got {}", mid);
    }
}
