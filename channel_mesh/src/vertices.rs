//! Mesh vertices along the cross-lines.

use crate::config::ElementCountMethod;
use crate::element_count::ElementCounter;
use crate::error::{MeshError, Result};
use crate::features::{CrossLine, CrossSection, Vertex};
use crate::geometry::{Point, Point3, XY_TOLERANCE};
use crate::terrain::TerrainSurface;

/// Largest accepted ratio between the spacings of adjacent rows.
pub const MAX_SPACING_RATIO: f64 = 1.5;

/// Largest accepted change in element count between adjacent rows.
pub const MAX_COUNT_STEP: usize = 2;

const STATION_EPSILON: f64 = 1e-6;

/// Places equally spaced vertices on every cross-line, processed downstream.
///
/// The first line takes its element count from `element_count_method`; every
/// later count is pulled towards the previous row so spacing changes stay
/// within [`MAX_SPACING_RATIO`] and counts within [`MAX_COUNT_STEP`]. On
/// surveyed cross-sections, vertices snap to surveyed points nearby and keep
/// their measured elevation; all other elevations come from `terrain`.
pub fn create_vertices(
    cross_lines: &[CrossLine],
    cross_sections: &[CrossSection],
    terrain: &dyn TerrainSurface,
    element_count_method: ElementCountMethod,
) -> Result<Vec<Vertex>> {
    let counter = ElementCounter::new(element_count_method, cross_sections)?;
    let mut ordered: Vec<&CrossLine> = cross_lines.iter().collect();
    ordered.sort_by_key(|l| l.key);

    let mut vertices = Vec::new();
    let mut previous: Option<(usize, f64)> = None;
    for cross_line in ordered {
        let key = cross_line.key;
        let length = cross_line.line.length();
        if length <= 0.0 {
            return Err(MeshError::topology_at(
                "create vertices",
                key.section_id,
                key.intermediate_id,
                "cross line has no length",
            ));
        }
        let target = counter.count(length);
        let count = match previous {
            None => target,
            Some((previous_count, previous_spacing)) => {
                smoothed_count(target, length, previous_count, previous_spacing)
            }
        };
        if count != target {
            log::debug!("Cross line {key}: element count {target} adjusted to {count}.");
        }
        let spacing = length / count as f64;
        previous = Some((count, spacing));

        let mut stations: Vec<f64> = (0..=count).map(|i| i as f64 * spacing).collect();
        let mut surveyed_z: Vec<Option<f64>> = vec![None; stations.len()];
        if key.is_surveyed() {
            let surveyed = surveyed_stations(cross_line, cross_sections);
            snap_to_surveyed(&mut stations, &mut surveyed_z, &surveyed, spacing, length);
        }

        let positions: Vec<Point3> = stations
            .iter()
            .filter_map(|&s| cross_line.line.point_at(s))
            .collect();
        let plan: Vec<Point> = positions.iter().map(Point3::xy).collect();
        let terrain_z = terrain.elevations_at(&plan);

        for (i, position) in positions.iter().enumerate() {
            let vertex_id = i as u32 + 1;
            let z = surveyed_z[i].or(terrain_z[i]).ok_or(MeshError::TerrainGap {
                section_id: key.section_id,
                intermediate_id: key.intermediate_id,
                vertex_id,
                x: position.x,
                y: position.y,
            })?;
            vertices.push(Vertex {
                key,
                vertex_id,
                point: Point3::new(position.x, position.y, z),
            });
        }
    }
    log::info!("Created {} vertices.", vertices.len());
    Ok(vertices)
}

/// Count closest to `target` that keeps the spacing ratio and count step to
/// the previous row. The count step wins when both cannot be met.
fn smoothed_count(target: usize, length: f64, previous_count: usize, previous_spacing: f64) -> usize {
    let step_lo = previous_count.saturating_sub(MAX_COUNT_STEP).max(1);
    let step_hi = previous_count + MAX_COUNT_STEP;
    let ratio_lo = ((length / (previous_spacing * MAX_SPACING_RATIO)) - STATION_EPSILON).ceil().max(1.0) as usize;
    let ratio_hi = ((length * MAX_SPACING_RATIO / previous_spacing) + STATION_EPSILON).floor().max(1.0) as usize;

    let lo = step_lo.max(ratio_lo);
    let hi = step_hi.min(ratio_hi);
    if lo <= hi {
        target.clamp(lo, hi)
    } else if ratio_hi < step_lo {
        step_lo
    } else if ratio_lo > step_hi {
        step_hi
    } else {
        target.clamp(step_lo, step_hi)
    }
}

/// Stations and elevations of surveyed points on the cross-line, sorted.
fn surveyed_stations(cross_line: &CrossLine, cross_sections: &[CrossSection]) -> Vec<(f64, f64)> {
    let source = cross_sections
        .iter()
        .find(|s| s.key == cross_line.key)
        .map_or(&cross_line.line, |s| &s.line);
    let mut stations: Vec<(f64, f64)> = source
        .vertices
        .iter()
        .filter_map(|v| {
            let (station, offset) = cross_line.line.station_of(v.xy())?;
            (offset <= XY_TOLERANCE).then_some((station, v.z))
        })
        .collect();
    stations.sort_by(|a, b| a.0.total_cmp(&b.0));
    stations
}

/// Moves interior stations onto the nearest unused surveyed station within
/// half a spacing, keeping the stations strictly increasing.
fn snap_to_surveyed(
    stations: &mut [f64],
    surveyed_z: &mut [Option<f64>],
    surveyed: &[(f64, f64)],
    spacing: f64,
    length: f64,
) {
    let last = stations.len().saturating_sub(1);
    let mut next_candidate = 0;
    for i in 1..last {
        let nominal = stations[i];
        let floor = stations[i - 1] + STATION_EPSILON;
        let best = surveyed[next_candidate..]
            .iter()
            .enumerate()
            .filter(|(_, (s, _))| *s > floor && *s < length - STATION_EPSILON)
            .filter(|(_, (s, _))| (s - nominal).abs() <= spacing / 2.0)
            .min_by(|a, b| (a.1 .0 - nominal).abs().total_cmp(&(b.1 .0 - nominal).abs()));
        if let Some((offset, &(station, z))) = best {
            stations[i] = station;
            surveyed_z[i] = Some(z);
            next_candidate += offset + 1;
        }
    }
}
