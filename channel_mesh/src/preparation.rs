//! Preparation of surveyed input: cross-sections from points, bounding to the
//! water-land border and splitting the border into per-span parts.

use crate::error::{MeshError, Result};
use crate::features::{Bank, CrossSection, SurveyedPoint, WaterLandBorder, WlbPart};
use crate::geometry::{distance, distance3, Point, Point3, Polyline, XY_TOLERANCE};

/// How surveyed points are grouped into cross-sections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectPolicy {
    /// Group by the point's grouping key. Points without any key fall back
    /// to breaking at `fallback_distance`.
    ByKey { fallback_distance: f64 },
    /// Start a new cross-section where successive points are further apart
    /// (3D) than the given distance.
    ByMaxDistance(f64),
}

/// Connects surveyed points into cross-sections numbered from 1.
pub fn connect_cross_sections(points: &[SurveyedPoint], policy: ConnectPolicy) -> Result<Vec<CrossSection>> {
    let groups = match policy {
        ConnectPolicy::ByKey { fallback_distance } => {
            if points.iter().all(|p| p.key.is_none()) {
                log::warn!("No point carries a grouping key; connecting by maximum distance {fallback_distance}.");
                group_by_distance(points, fallback_distance)
            } else {
                group_by_key(points)?
            }
        }
        ConnectPolicy::ByMaxDistance(max) => group_by_distance(points, max),
    };

    let mut sections = Vec::with_capacity(groups.len());
    for (i, group) in groups.into_iter().enumerate() {
        let section_id = i as u32 + 1;
        if group.len() < 2 {
            return Err(MeshError::topology_at(
                "connect cross sections",
                section_id,
                0,
                "cross-section has fewer than two points",
            ));
        }
        sections.push(CrossSection::surveyed(section_id, Polyline::new(group)));
    }
    log::info!("Connected {} points into {} cross sections.", points.len(), sections.len());
    Ok(sections)
}

fn group_by_key(points: &[SurveyedPoint]) -> Result<Vec<Vec<Point3>>> {
    let mut keys: Vec<&str> = Vec::new();
    let mut groups: Vec<Vec<Point3>> = Vec::new();
    for (i, p) in points.iter().enumerate() {
        let key = p.key.as_deref().ok_or_else(|| {
            MeshError::topology("connect cross sections", format!("point {i} has no grouping key"))
        })?;
        match keys.iter().position(|k| *k == key) {
            Some(idx) => groups[idx].push(p.point),
            None => {
                keys.push(key);
                groups.push(vec![p.point]);
            }
        }
    }
    Ok(groups)
}

fn group_by_distance(points: &[SurveyedPoint], max: f64) -> Vec<Vec<Point3>> {
    let mut groups: Vec<Vec<Point3>> = Vec::new();
    let mut current: Vec<Point3> = Vec::new();
    for p in points {
        if let Some(last) = current.last() {
            if distance3(*last, p.point) > max {
                groups.push(std::mem::take(&mut current));
            }
        }
        current.push(p.point);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Drops the first of two successive cross-sections that have their centres
/// on each other, then renumbers from 1 if anything was dropped.
pub fn remove_duplicated_cross_sections(sections: &[CrossSection]) -> Vec<CrossSection> {
    let mut sorted = sections.to_vec();
    sorted.sort_by_key(|s| s.key);
    let duplicated = |a: &CrossSection, b: &CrossSection| {
        let centre_on = |x: &CrossSection, y: &CrossSection| {
            x.line.midpoint().map_or(false, |m| y.line.touches(m.xy(), XY_TOLERANCE))
        };
        centre_on(a, b) && centre_on(b, a)
    };

    let mut kept: Vec<CrossSection> = Vec::with_capacity(sorted.len());
    for (i, section) in sorted.iter().enumerate() {
        match sorted.get(i + 1) {
            Some(next) if duplicated(section, next) => {
                log::warn!("Cross section {} duplicates {}; deleted.", section.key.section_id, next.key.section_id);
            }
            _ => kept.push(section.clone()),
        }
    }
    if kept.len() != sorted.len() {
        for (i, section) in kept.iter_mut().enumerate() {
            section.key.section_id = i as u32 + 1;
        }
    }
    kept
}

fn first_crossing(line: &Polyline, other: &Polyline) -> Option<f64> {
    line.crossings(other).first().map(|c| c.station)
}

/// Clips every cross-section to the part between the two banks.
pub fn bound_cross_sections_to_wlb(sections: &[CrossSection], wlb: &WaterLandBorder) -> Result<Vec<CrossSection>> {
    sections
        .iter()
        .map(|section| {
            let left = first_crossing(&section.line, &wlb.left);
            let right = first_crossing(&section.line, &wlb.right);
            match (left, right) {
                (Some(l), Some(r)) => Ok(CrossSection::new(section.key, section.line.sub_line(l, r))),
                _ => Err(MeshError::topology_at(
                    "bound cross sections",
                    section.key.section_id,
                    section.key.intermediate_id,
                    "cross-section does not cross both water land borders",
                )),
            }
        })
        .collect()
}

/// Reverses each bank that runs from the last cross-section towards the
/// first one, so both banks point downstream.
pub fn orient_water_land_border(wlb: &WaterLandBorder, sections: &[CrossSection]) -> Result<WaterLandBorder> {
    let first = sections.iter().min_by_key(|s| s.key);
    let last = sections.iter().max_by_key(|s| s.key);
    let (Some(first), Some(last)) = (first, last) else {
        return Err(MeshError::topology("orient water land border", "no cross sections"));
    };
    let orient = |bank: Bank| -> Result<Polyline> {
        let line = wlb.line(bank);
        let at = |section: &CrossSection| {
            first_crossing(line, &section.line).ok_or_else(|| {
                MeshError::topology_at(
                    "orient water land border",
                    section.key.section_id,
                    section.key.intermediate_id,
                    format!("cross-section does not cross water land border {}", bank.wlb_id()),
                )
            })
        };
        if at(first)? > at(last)? {
            log::info!("Water land border {} flipped to run downstream.", bank.wlb_id());
            Ok(line.reversed())
        } else {
            Ok(line.clone())
        }
    };
    Ok(WaterLandBorder {
        left: orient(Bank::Left)?,
        right: orient(Bank::Right)?,
    })
}

/// Splits both banks at their crossings with the cross-sections. Each part
/// carries the id of its upstream cross-section; parts outside the first and
/// last cross-section are dropped.
pub fn subdivide_water_land_border(wlb: &WaterLandBorder, sections: &[CrossSection]) -> Result<Vec<WlbPart>> {
    let mut sorted: Vec<&CrossSection> = sections.iter().collect();
    sorted.sort_by_key(|s| s.key);
    if sorted.len() < 2 {
        return Err(MeshError::topology(
            "subdivide water land border",
            format!("{} cross sections, at least two needed", sorted.len()),
        ));
    }

    let mut parts = Vec::with_capacity(2 * (sorted.len() - 1));
    for bank in [Bank::Left, Bank::Right] {
        let border = wlb.line(bank);
        let mut stations = Vec::with_capacity(sorted.len());
        for section in &sorted {
            let station = first_crossing(border, &section.line).ok_or_else(|| {
                MeshError::topology_at(
                    "subdivide water land border",
                    section.key.section_id,
                    0,
                    format!("cross-section does not cross water land border {}", bank.wlb_id()),
                )
            })?;
            stations.push(station);
        }
        for (i, pair) in stations.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(MeshError::topology_at(
                    "subdivide water land border",
                    sorted[i + 1].key.section_id,
                    0,
                    format!("water land border {} runs against the section order", bank.wlb_id()),
                ));
            }
            parts.push(WlbPart {
                section_id: sorted[i].key.section_id,
                bank,
                line: border.sub_line(pair[0], pair[1]),
            });
        }
    }

    let expected = 2 * (sorted.len() - 1);
    if parts.len() != expected {
        return Err(MeshError::topology(
            "subdivide water land border",
            format!("{} parts created, expected {expected}", parts.len()),
        ));
    }
    parts.sort_by_key(|p| (p.section_id, p.bank));
    log::info!("Subdivided water land border into {} parts.", parts.len());
    Ok(parts)
}

/// Plan outline of the investigated water area: left bank downstream, then
/// the right bank back upstream.
pub fn stream_polygon(parts: &[WlbPart]) -> Result<Vec<Point>> {
    let mut ordered: Vec<&WlbPart> = parts.iter().collect();
    ordered.sort_by_key(|p| p.section_id);
    let mut ring: Vec<Point> = Vec::new();
    let mut push = |p: Point| {
        if ring.last().map_or(true, |last| distance(*last, p) > XY_TOLERANCE) {
            ring.push(p);
        }
    };
    for part in ordered.iter().filter(|p| p.bank == Bank::Left) {
        part.line.vertices.iter().for_each(|v| push(v.xy()));
    }
    for part in ordered.iter().rev().filter(|p| p.bank == Bank::Right) {
        part.line.vertices.iter().rev().for_each(|v| push(v.xy()));
    }
    if ring.len() < 3 {
        return Err(MeshError::topology("stream polygon", "water land border parts do not enclose an area"));
    }
    Ok(ring)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{point_in_polygon, polygon_area, Point3};

    fn straight(a: (f64, f64), b: (f64, f64)) -> Polyline {
        Polyline::new(vec![Point3::new(a.0, a.1, 0.0), Point3::new(b.0, b.1, 0.0)])
    }

    fn border() -> WaterLandBorder {
        WaterLandBorder {
            left: straight((-10.0, 20.0), (210.0, 20.0)),
            right: straight((-10.0, 0.0), (210.0, 0.0)),
        }
    }

    fn long_sections() -> Vec<CrossSection> {
        (0..5)
            .map(|i| {
                let x = 50.0 * i as f64;
                CrossSection::surveyed(i + 1, straight((x, 25.0), (x, -5.0)))
            })
            .collect()
    }

    #[test]
    fn connects_points_by_key() {
        let points: Vec<SurveyedPoint> = [("a", 0.0), ("a", 1.0), ("b", 0.0), ("a", 2.0), ("b", 1.0)]
            .iter()
            .map(|&(k, y)| SurveyedPoint::new(Point3::new(0.0, y, 0.0), Some(k.to_string())))
            .collect();
        let sections =
            connect_cross_sections(&points, ConnectPolicy::ByKey { fallback_distance: 5.0 }).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].line.len(), 3);
        assert_eq!(sections[1].key.section_id, 2);
    }

    #[test]
    fn connects_points_by_distance() {
        let points: Vec<SurveyedPoint> = [0.0, 1.0, 2.0, 50.0, 51.0]
            .iter()
            .map(|&x| SurveyedPoint::new(Point3::new(x, 0.0, 0.0), None))
            .collect();
        let sections = connect_cross_sections(&points, ConnectPolicy::ByMaxDistance(10.0)).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].line.len(), 3);
        assert!(sections.iter().all(|s| s.key.is_surveyed()));

        let by_key = connect_cross_sections(&points, ConnectPolicy::ByKey { fallback_distance: 10.0 }).unwrap();
        assert_eq!(by_key, sections);
    }

    #[test]
    fn single_point_section_is_rejected() {
        let points: Vec<SurveyedPoint> = [0.0, 1.0, 50.0]
            .iter()
            .map(|&x| SurveyedPoint::new(Point3::new(x, 0.0, 0.0), None))
            .collect();
        assert!(matches!(
            connect_cross_sections(&points, ConnectPolicy::ByMaxDistance(10.0)),
            Err(MeshError::Topology { section_id: Some(2), .. })
        ));
    }

    #[test]
    fn duplicated_sections_are_removed() {
        let mut sections = long_sections();
        sections.insert(1, CrossSection::surveyed(2, straight((0.0, 24.0), (0.0, -4.0))));
        for (i, s) in sections.iter_mut().enumerate() {
            s.key.section_id = i as u32 + 1;
        }
        let cleaned = remove_duplicated_cross_sections(&sections);
        assert_eq!(cleaned.len(), 5);
        let ids: Vec<u32> = cleaned.iter().map(|s| s.key.section_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(cleaned[0].line, straight((0.0, 24.0), (0.0, -4.0)));
        assert_eq!(remove_duplicated_cross_sections(&long_sections()), long_sections());
    }

    #[test]
    fn sections_are_clipped_to_banks() {
        let bounded = bound_cross_sections_to_wlb(&long_sections(), &border()).unwrap();
        for section in &bounded {
            assert!((section.line.length() - 20.0).abs() < 1e-6);
            let start = section.line.start().unwrap();
            assert!((start.y - 20.0).abs() < 1e-6);
        }
        let short = vec![CrossSection::surveyed(1, straight((0.0, 25.0), (0.0, 10.0)))];
        assert!(bound_cross_sections_to_wlb(&short, &border()).is_err());
    }

    #[test]
    fn border_is_split_per_span() {
        let parts = subdivide_water_land_border(&border(), &long_sections()).unwrap();
        assert_eq!(parts.len(), 8);
        assert_eq!(parts[0].section_id, 1);
        assert_eq!(parts[0].bank, Bank::Left);
        assert_eq!(parts[1].bank, Bank::Right);
        for part in &parts {
            assert!((part.line.length() - 50.0).abs() < 1e-6);
        }
        let polygon = stream_polygon(&parts).unwrap();
        assert!((polygon_area(&polygon) - 4000.0).abs() < 1e-6);
        assert!(point_in_polygon(Point::new(100.0, 10.0), &polygon));
        assert!(point_in_polygon(Point::new(100.0, 20.0), &polygon));
        assert!(!point_in_polygon(Point::new(205.0, 10.0), &polygon));
    }

    #[test]
    fn reversed_border_is_rejected() {
        let wlb = WaterLandBorder {
            left: border().left.reversed(),
            right: border().right,
        };
        assert!(matches!(
            subdivide_water_land_border(&wlb, &long_sections()),
            Err(MeshError::Topology { .. })
        ));
        let oriented = orient_water_land_border(&wlb, &long_sections()).unwrap();
        assert_eq!(oriented, border());
        assert_eq!(subdivide_water_land_border(&oriented, &long_sections()).unwrap().len(), 8);
    }
}
