//! Elevations of longitudinal profile points.
//!
//! Points on surveyed cross-sections take the elevation of the nearest
//! surveyed point. The remaining points are interpolated along their profile
//! between the bracketing points with known elevation.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::config::{HeightAssignmentMethod, InterpolationMethod};
use crate::error::{MeshError, Result};
use crate::features::{CrossSection, LongitudinalSection, LongitudinalSectionPoint};
use crate::geometry::{distance, Point3, XY_TOLERANCE};

/// Known sample on a profile: station and elevation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub station: f64,
    pub z: f64,
}

/// Strategy computing an elevation between two bracketing samples.
pub trait ProfileInterpolator: Send + Sync {
    fn value_at(&self, station: f64, before: Sample, after: Sample) -> f64;
}

/// Linear interpolation by along-profile distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolation;

impl ProfileInterpolator for LinearInterpolation {
    fn value_at(&self, station: f64, before: Sample, after: Sample) -> f64 {
        let span = after.station - before.station;
        if span.abs() < f64::EPSILON {
            return before.z;
        }
        before.z + (station - before.station) / span * (after.z - before.z)
    }
}

pub fn interpolator_for(method: InterpolationMethod) -> Box<dyn ProfileInterpolator> {
    match method {
        InterpolationMethod::Linear => Box::new(LinearInterpolation),
    }
}

/// Assigns elevations to the points on surveyed cross-sections and
/// interpolates all other points along their profile.
pub fn interpolate_longitudinal_sections(
    profile_points: &[LongitudinalSectionPoint],
    profile_lines: &[LongitudinalSection],
    cross_section_points: &[Point3],
    cross_section_lines: &[CrossSection],
    assignment_method: HeightAssignmentMethod,
    interpolation_method: InterpolationMethod,
) -> Result<Vec<LongitudinalSectionPoint>> {
    let assigned = assign_heights(profile_points, cross_section_points, cross_section_lines, assignment_method)?;
    let interpolator = interpolator_for(interpolation_method);
    interpolate_heights(&assigned, profile_lines, interpolator.as_ref())
}

/// Nearest-point elevation for every point on a surveyed cross-section.
/// `NearInsideWlb` only considers surveyed points lying on the (bounded)
/// cross-section lines, boundary points included.
pub fn assign_heights(
    profile_points: &[LongitudinalSectionPoint],
    cross_section_points: &[Point3],
    cross_section_lines: &[CrossSection],
    method: HeightAssignmentMethod,
) -> Result<Vec<LongitudinalSectionPoint>> {
    let candidates: Vec<&Point3> = match method {
        HeightAssignmentMethod::NearAll => cross_section_points.iter().collect(),
        HeightAssignmentMethod::NearInsideWlb => cross_section_points
            .iter()
            .filter(|p| {
                cross_section_lines
                    .iter()
                    .any(|l| l.line.touches(p.xy(), XY_TOLERANCE))
            })
            .collect(),
    };
    log::debug!(
        "{} of {} surveyed points are height candidates ({method:?}).",
        candidates.len(),
        cross_section_points.len()
    );

    profile_points
        .iter()
        .map(|point| {
            if !point.key.is_surveyed() {
                return Ok(point.clone());
            }
            let nearest = candidates
                .iter()
                .min_by(|a, b| {
                    distance(a.xy(), point.point).total_cmp(&distance(b.xy(), point.point))
                })
                .ok_or_else(|| {
                    MeshError::topology_at(
                        "assign heights",
                        point.key.section_id,
                        point.key.intermediate_id,
                        "no surveyed point to take the elevation from",
                    )
                })?;
            Ok(LongitudinalSectionPoint {
                z: Some(nearest.z),
                ..point.clone()
            })
        })
        .collect()
}

/// Fills every unknown elevation from the nearest known points before and
/// after it on the same profile. Profiles are processed in parallel.
pub fn interpolate_heights(
    points: &[LongitudinalSectionPoint],
    profile_lines: &[LongitudinalSection],
    interpolator: &dyn ProfileInterpolator,
) -> Result<Vec<LongitudinalSectionPoint>> {
    let mut profiles: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, p) in points.iter().enumerate() {
        profiles.entry(p.relative_position).or_default().push(i);
    }
    let profiles: Vec<(usize, Vec<usize>)> = profiles.into_iter().collect();

    let filled: Vec<Vec<(usize, f64)>> = profiles
        .par_iter()
        .map(|(relative_position, members)| {
            let line = profile_lines
                .iter()
                .find(|l| l.relative_position == *relative_position)
                .ok_or_else(|| {
                    MeshError::topology(
                        "interpolate heights",
                        format!("no longitudinal section line for profile {relative_position}"),
                    )
                })?;
            interpolate_profile(points, members, line, interpolator)
        })
        .collect::<Result<_>>()?;

    let mut result = points.to_vec();
    for (index, z) in filled.into_iter().flatten() {
        result[index].z = Some(z);
    }
    log::info!("Interpolated heights on {} profiles.", profiles.len());
    Ok(result)
}

fn interpolate_profile(
    points: &[LongitudinalSectionPoint],
    members: &[usize],
    line: &LongitudinalSection,
    interpolator: &dyn ProfileInterpolator,
) -> Result<Vec<(usize, f64)>> {
    let mut ordered: Vec<(usize, f64)> = members
        .iter()
        .map(|&i| {
            let station = line.line.station_of(points[i].point).map_or(0.0, |(s, _)| s);
            (i, station)
        })
        .collect();
    ordered.sort_by(|a, b| points[a.0].key.cmp(&points[b.0].key).then(a.1.total_cmp(&b.1)));

    let known: Vec<Option<Sample>> = ordered
        .iter()
        .map(|&(i, station)| points[i].z.map(|z| Sample { station, z }))
        .collect();

    let mut filled = Vec::new();
    for (pos, &(index, station)) in ordered.iter().enumerate() {
        if known[pos].is_some() {
            continue;
        }
        let before = known[..pos].iter().rev().find_map(|s| *s);
        let after = known[pos + 1..].iter().find_map(|s| *s);
        match (before, after) {
            (Some(before), Some(after)) => {
                filled.push((index, interpolator.value_at(station, before, after)));
            }
            _ => {
                let point = &points[index];
                return Err(MeshError::InterpolationGap {
                    relative_position: point.relative_position,
                    section_id: point.key.section_id,
                    intermediate_id: point.key.intermediate_id,
                });
            }
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::SectionKey;
    use crate::geometry::{Point, Polyline};
    use crate::longitudinal::connect_profiles;

    fn profile_point(x: f64, z: Option<f64>, key: SectionKey) -> LongitudinalSectionPoint {
        LongitudinalSectionPoint {
            point: Point::new(x, 0.0),
            z,
            relative_position: 0,
            key,
        }
    }

    #[test]
    fn linear_value_between_samples() {
        let z = LinearInterpolation.value_at(
            4.0,
            Sample { station: 0.0, z: 5.0 },
            Sample { station: 10.0, z: 15.0 },
        );
        assert!((z - 9.0).abs() < 1e-9);
    }

    #[test]
    fn interpolates_along_profile() {
        let points = vec![
            profile_point(0.0, Some(5.0), SectionKey::surveyed(1)),
            profile_point(4.0, None, SectionKey::new(1, 1)),
            profile_point(10.0, Some(15.0), SectionKey::surveyed(2)),
        ];
        let lines = connect_profiles(&points);
        let result = interpolate_heights(&points, &lines, &LinearInterpolation).unwrap();
        assert!((result[1].z.unwrap() - 9.0).abs() < 1e-9);
        assert_eq!(result[0].z, Some(5.0));
    }

    #[test]
    fn missing_bracket_is_reported() {
        let points = vec![
            profile_point(0.0, Some(5.0), SectionKey::surveyed(1)),
            profile_point(4.0, None, SectionKey::new(1, 1)),
        ];
        let lines = connect_profiles(&points);
        let err = interpolate_heights(&points, &lines, &LinearInterpolation).unwrap_err();
        assert!(matches!(
            err,
            MeshError::InterpolationGap {
                relative_position: 0,
                section_id: 1,
                intermediate_id: 1
            }
        ));
    }

    #[test]
    fn inside_wlb_ignores_foreshore_points() {
        let section = CrossSection::surveyed(
            1,
            Polyline::new(vec![Point3::new(0.0, 20.0, 0.0), Point3::new(0.0, 0.0, 0.0)]),
        );
        let surveyed = vec![
            Point3::new(0.0, 20.0, 3.0),
            Point3::new(0.0, 10.0, 1.0),
            // foreshore point, nearer to the bank point in plan
            Point3::new(0.5, 21.0, 8.0),
        ];
        let points = vec![LongitudinalSectionPoint {
            point: Point::new(0.3, 20.6),
            z: None,
            relative_position: 0,
            key: SectionKey::surveyed(1),
        }];
        let inside = assign_heights(
            &points,
            &surveyed,
            std::slice::from_ref(&section),
            HeightAssignmentMethod::NearInsideWlb,
        )
        .unwrap();
        assert_eq!(inside[0].z, Some(3.0));
        let all = assign_heights(
            &points,
            &surveyed,
            std::slice::from_ref(&section),
            HeightAssignmentMethod::NearAll,
        )
        .unwrap();
        assert_eq!(all[0].z, Some(8.0));
    }

    #[test]
    fn generated_points_are_not_assigned() {
        let points = vec![profile_point(3.0, None, SectionKey::new(1, 2))];
        let out = assign_heights(&points, &[Point3::new(3.0, 0.0, 1.0)], &[], HeightAssignmentMethod::NearAll).unwrap();
        assert_eq!(out[0].z, None);
    }
}
