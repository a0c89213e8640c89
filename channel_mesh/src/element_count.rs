//! Number of mesh elements across a cross-line.

use crate::config::ElementCountMethod;
use crate::error::{MeshError, Result};
use crate::features::CrossSection;

/// Elements are three times as long (along the flow) as they are wide.
pub const ELEMENT_ASPECT: f64 = 3.0;

/// Element count from a fixed table keyed by cross-line length in metres.
pub fn element_count_fix(length: f64) -> usize {
    if length < 7.0 {
        3
    } else if length < 10.0 {
        4
    } else if length < 15.0 {
        5
    } else if length < 21.0 {
        6
    } else if length < 70.0 {
        // one more element per started 7 m from 21 m on
        let mut count = 6;
        let mut i = 21.0;
        while i <= length {
            i += 7.0;
            count += 1;
        }
        count
    } else {
        14
    }
}

/// Length classes derived from the shortest and longest cross-section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementCountRanges {
    pub lower: f64,
    pub upper: f64,
    pub width: f64,
}

impl ElementCountRanges {
    /// Five equal classes between 80 % of the (rounded down) shortest and
    /// 120 % of the (rounded up) longest length.
    pub fn from_lengths<I: IntoIterator<Item = f64>>(lengths: I) -> Result<Self> {
        let (min, max) = lengths
            .into_iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), l| (lo.min(l), hi.max(l)));
        if !min.is_finite() || !max.is_finite() {
            return Err(MeshError::configuration(
                "element_count_method",
                "VARIABLE needs at least one cross-section length",
            ));
        }
        let min = (min - 1.0).trunc();
        let max = (max + 1.0).trunc();
        let lower = (min - min * 0.2).trunc();
        let upper = (max + max * 0.2).trunc();
        Ok(Self {
            lower,
            upper,
            width: (upper - lower) / 5.0,
        })
    }
}

/// Element count from the length class `length` falls in.
pub fn element_count_variable(length: f64, ranges: &ElementCountRanges) -> usize {
    if length < ranges.lower {
        5
    } else if length < ranges.upper && ranges.width > 0.0 {
        let mut count = 5;
        let mut i = ranges.lower;
        while i <= length {
            i += ranges.width;
            count += 1;
        }
        count
    } else {
        11
    }
}

/// Element count policy bound to its input data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementCounter {
    Fix,
    Variable(ElementCountRanges),
}

impl ElementCounter {
    pub fn new(method: ElementCountMethod, sections: &[CrossSection]) -> Result<Self> {
        Ok(match method {
            ElementCountMethod::Fix => ElementCounter::Fix,
            ElementCountMethod::Variable => ElementCounter::Variable(ElementCountRanges::from_lengths(
                sections.iter().map(|s| s.line.length()),
            )?),
        })
    }

    pub fn count(&self, length: f64) -> usize {
        match self {
            ElementCounter::Fix => element_count_fix(length),
            ElementCounter::Variable(ranges) => element_count_variable(length, ranges),
        }
    }

    /// Distance to the next cross-line for a line of `length`.
    pub fn cross_line_distance(&self, length: f64) -> f64 {
        ELEMENT_ASPECT * length / self.count(length) as f64
    }
}
