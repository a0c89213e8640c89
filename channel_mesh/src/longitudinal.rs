//! Longitudinal profiles resliced from the cross-lines.

use std::collections::BTreeMap;

use crate::error::{MeshError, Result};
use crate::features::{Bank, CrossLine, LongitudinalSection, LongitudinalSectionPoint, WlbPart};
use crate::geometry::{Point, Point3, Polyline, XY_TOLERANCE};

/// Points at the fractions `p / (profile_count - 1)` of every cross-line, and
/// one line per profile connecting them downstream.
///
/// Profiles 0 and `profile_count - 1` must lie on the left and right water
/// land border; a mismatch is reported as a topology error.
pub fn create_longitudinal_sections(
    cross_lines: &[CrossLine],
    profile_count: usize,
    wlb_parts: &[WlbPart],
) -> Result<(Vec<LongitudinalSectionPoint>, Vec<LongitudinalSection>)> {
    if profile_count < 3 {
        return Err(MeshError::configuration(
            "profile_count",
            format!("{profile_count} profiles, at least 3 needed"),
        ));
    }
    let mut ordered: Vec<&CrossLine> = cross_lines.iter().collect();
    ordered.sort_by_key(|l| l.key);
    let last = profile_count - 1;

    let mut points = Vec::with_capacity(ordered.len() * profile_count);
    for cross_line in ordered {
        for p in 0..profile_count {
            let location = cross_line.line.point_at_fraction(p as f64 / last as f64).ok_or_else(|| {
                MeshError::topology_at(
                    "create longitudinal sections",
                    cross_line.key.section_id,
                    cross_line.key.intermediate_id,
                    "cross line has no vertices",
                )
            })?;
            let bank = match p {
                0 => Some(Bank::Left),
                p if p == last => Some(Bank::Right),
                _ => None,
            };
            if let Some(bank) = bank {
                if !on_bank(location.xy(), wlb_parts, bank) {
                    return Err(MeshError::topology_at(
                        "create longitudinal sections",
                        cross_line.key.section_id,
                        cross_line.key.intermediate_id,
                        format!(
                            "profile {p} at ({:.3}, {:.3}) is not on water land border {}",
                            location.x,
                            location.y,
                            bank.wlb_id()
                        ),
                    ));
                }
            }
            points.push(LongitudinalSectionPoint {
                point: location.xy(),
                z: None,
                relative_position: p,
                key: cross_line.key,
            });
        }
    }

    let lines = connect_profiles(&points);
    log::info!(
        "Created {} longitudinal section points on {} profiles.",
        points.len(),
        lines.len()
    );
    Ok((points, lines))
}

fn on_bank(p: Point, parts: &[WlbPart], bank: Bank) -> bool {
    parts
        .iter()
        .filter(|part| part.bank == bank)
        .any(|part| part.line.touches(p, XY_TOLERANCE))
}

/// One line per profile through its points in `(section, intermediate)` order.
/// Unknown elevations are drawn at zero.
pub fn connect_profiles(points: &[LongitudinalSectionPoint]) -> Vec<LongitudinalSection> {
    let mut profiles: BTreeMap<usize, Vec<&LongitudinalSectionPoint>> = BTreeMap::new();
    for point in points {
        profiles.entry(point.relative_position).or_default().push(point);
    }
    profiles
        .into_iter()
        .map(|(relative_position, mut members)| {
            members.sort_by_key(|p| p.key);
            let vertices = members
                .iter()
                .map(|p| Point3::new(p.point.x, p.point.y, p.z.unwrap_or(0.0)))
                .collect();
            LongitudinalSection {
                relative_position,
                line: Polyline::new(vertices),
            }
        })
        .collect()
}
