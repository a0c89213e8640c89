//! Intermediate cross-lines between surveyed cross-sections.

use crate::config::CrossLinePolicy;
use crate::element_count::ElementCounter;
use crate::error::{MeshError, Result};
use crate::features::{Bank, CrossLine, CrossSection, SectionKey, WlbPart};
use crate::geometry::{Point3, Polyline};

const FRACTION_EPSILON: f64 = 1e-9;

/// Creates the cross-lines of the whole reach: every surveyed cross-section
/// (intermediate id 0) followed by the lines generated up to the next one.
///
/// Bank positions of a generated line sit at the same fraction of both bank
/// parts, so the spacing on the shorter (inner) bank shrinks with the ratio
/// of the two parts.
pub fn create_cross_lines(
    cross_sections: &[CrossSection],
    wlb_parts: &[WlbPart],
    policy: CrossLinePolicy,
) -> Result<Vec<CrossLine>> {
    let mut sections: Vec<&CrossSection> = cross_sections.iter().collect();
    sections.sort_by_key(|s| s.key);
    if sections.len() < 2 {
        return Err(MeshError::topology(
            "create cross lines",
            format!("{} cross sections, at least two needed", sections.len()),
        ));
    }
    let mode = match policy {
        CrossLinePolicy::Distance(distance) => SpanMode::Distance(distance),
        CrossLinePolicy::Count {
            method,
            remain_percentage,
        } => SpanMode::Count {
            counter: ElementCounter::new(method, cross_sections)?,
            remain_percentage,
        },
    };

    let mut lines = Vec::new();
    for pair in sections.windows(2) {
        let (upstream, downstream) = (pair[0], pair[1]);
        let section_id = upstream.key.section_id;
        let left = bank_part(wlb_parts, section_id, Bank::Left)?;
        let right = bank_part(wlb_parts, section_id, Bank::Right)?;
        let (left_length, right_length) = (left.length(), right.length());
        let longer = left_length.max(right_length);
        if longer <= 0.0 {
            return Err(MeshError::topology_at(
                "create cross lines",
                section_id,
                0,
                "water land border parts have no length",
            ));
        }

        lines.push(CrossLine::new(SectionKey::surveyed(section_id), upstream.line.clone()));
        let span = SpanGeometry {
            upstream: &upstream.line,
            downstream: &downstream.line,
            left,
            right,
            left_length,
            right_length,
        };
        let generated = match &mode {
            SpanMode::Distance(distance) => span_by_distance(&span, longer, *distance)?,
            SpanMode::Count {
                counter,
                remain_percentage,
            } => span_by_count(&span, longer, upstream.line.length(), counter, *remain_percentage)?,
        };
        log::debug!("Section {section_id}: {} intermediate cross lines.", generated.len());
        lines.extend(
            generated
                .into_iter()
                .enumerate()
                .map(|(i, line)| CrossLine::new(SectionKey::new(section_id, i as u32 + 1), line)),
        );
    }
    if let Some(last) = sections.last() {
        lines.push(CrossLine::new(SectionKey::surveyed(last.key.section_id), last.line.clone()));
    }
    log::info!("Created {} cross lines.", lines.len());
    Ok(lines)
}

fn bank_part(parts: &[WlbPart], section_id: u32, bank: Bank) -> Result<&Polyline> {
    parts
        .iter()
        .find(|p| p.section_id == section_id && p.bank == bank)
        .map(|p| &p.line)
        .ok_or_else(|| {
            MeshError::topology_at(
                "create cross lines",
                section_id,
                0,
                format!("no water land border part with WLBID {}", bank.wlb_id()),
            )
        })
}

enum SpanMode {
    Distance(f64),
    Count {
        counter: ElementCounter,
        remain_percentage: u32,
    },
}

struct SpanGeometry<'a> {
    upstream: &'a Polyline,
    downstream: &'a Polyline,
    left: &'a Polyline,
    right: &'a Polyline,
    left_length: f64,
    right_length: f64,
}

impl SpanGeometry<'_> {
    /// Cross-line at fraction `t` of the span.
    fn line_at(&self, t: f64) -> Result<Polyline> {
        let left = self.left.point_at(t * self.left_length);
        let right = self.right.point_at(t * self.right_length);
        match (left, right) {
            (Some(l), Some(r)) => Ok(blend(self.upstream, self.downstream, t, l, r)),
            _ => Err(MeshError::topology("create cross lines", "empty water land border part")),
        }
    }
}

fn span_by_distance(span: &SpanGeometry<'_>, longer: f64, distance: f64) -> Result<Vec<Polyline>> {
    if !(distance > 0.0) {
        return Err(MeshError::configuration("cross_line_spacing", "must be positive"));
    }
    let segments = (longer / distance - FRACTION_EPSILON).ceil().max(1.0) as usize;
    (1..segments)
        .map(|k| span.line_at(k as f64 / segments as f64))
        .collect()
}

fn span_by_count(
    span: &SpanGeometry<'_>,
    longer: f64,
    section_length: f64,
    counter: &ElementCounter,
    remain_percentage: u32,
) -> Result<Vec<Polyline>> {
    let remain_factor = f64::from(remain_percentage) / 100.0;
    let mut distance = counter.cross_line_distance(section_length);
    if !(distance > 0.0) {
        return Err(MeshError::topology("create cross lines", "cross section has no length"));
    }
    let mut covered = distance;
    let mut lines = Vec::new();
    while covered < longer - FRACTION_EPSILON {
        let remain = longer - covered;
        if distance >= remain {
            if distance * remain_factor > remain {
                break;
            }
            // halfway between the previous line and the end of the span
            covered = covered - distance + (distance + remain) / 2.0;
        }
        let line = span.line_at(covered / longer)?;
        distance = counter.cross_line_distance(line.length());
        if !(distance > 0.0) {
            return Err(MeshError::topology("create cross lines", "degenerate cross line"));
        }
        lines.push(line);
        covered += distance;
    }
    Ok(lines)
}

fn vertex_fractions(line: &Polyline) -> Vec<f64> {
    let length = line.length();
    if length <= 0.0 {
        return vec![0.0, 1.0];
    }
    line.vertex_stations().into_iter().map(|s| s / length).collect()
}

/// Shape blended between the bracketing cross-sections at matching fractions
/// of their length, then shifted so that its ends land on the bank points.
fn blend(upstream: &Polyline, downstream: &Polyline, t: f64, left: Point3, right: Point3) -> Polyline {
    let mut fractions = vertex_fractions(upstream);
    fractions.extend(vertex_fractions(downstream));
    fractions.sort_by(f64::total_cmp);
    fractions.dedup_by(|a, b| (*a - *b).abs() < FRACTION_EPSILON);

    let shape: Vec<Point3> = fractions
        .iter()
        .filter_map(|&f| {
            let a = upstream.point_at_fraction(f)?;
            let b = downstream.point_at_fraction(f)?;
            Some(a.lerp(b, t))
        })
        .collect();
    let (Some(&first), Some(&last)) = (shape.first(), shape.last()) else {
        return Polyline::new(vec![left, right]);
    };
    let vertices = fractions
        .iter()
        .zip(&shape)
        .map(|(&f, p)| {
            Point3::new(
                p.x + (1.0 - f) * (left.x - first.x) + f * (right.x - last.x),
                p.y + (1.0 - f) * (left.y - first.y) + f * (right.y - last.y),
                p.z,
            )
        })
        .collect();
    Polyline::new(vertices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ElementCountMethod;
    use crate::geometry::{distance, Point};

    fn straight(a: (f64, f64), b: (f64, f64)) -> Polyline {
        Polyline::new(vec![Point3::new(a.0, a.1, 0.0), Point3::new(b.0, b.1, 0.0)])
    }

    /// Straight channel, 20 m wide, flowing along +x with the left bank at y = 20.
    fn reach(count: u32, spacing: f64) -> (Vec<CrossSection>, Vec<WlbPart>) {
        let sections = (0..count)
            .map(|i| {
                let x = spacing * i as f64;
                CrossSection::surveyed(i + 1, straight((x, 20.0), (x, 0.0)))
            })
            .collect();
        let mut parts = Vec::new();
        for i in 0..count - 1 {
            let (x0, x1) = (spacing * i as f64, spacing * (i + 1) as f64);
            parts.push(WlbPart {
                section_id: i + 1,
                bank: Bank::Left,
                line: straight((x0, 20.0), (x1, 20.0)),
            });
            parts.push(WlbPart {
                section_id: i + 1,
                bank: Bank::Right,
                line: straight((x0, 0.0), (x1, 0.0)),
            });
        }
        (sections, parts)
    }

    fn start_x(line: &CrossLine) -> f64 {
        line.line.start().map(|p| p.x).unwrap_or(f64::NAN)
    }

    #[test]
    fn distance_mode_spacing() {
        let (sections, parts) = reach(2, 50.0);
        let lines = create_cross_lines(&sections, &parts, CrossLinePolicy::Distance(10.0)).unwrap();
        let xs: Vec<f64> = lines.iter().map(start_x).collect();
        assert_eq!(lines.len(), 6);
        for (x, expected) in xs.iter().zip([0.0, 10.0, 20.0, 30.0, 40.0, 50.0]) {
            assert!((x - expected).abs() < 1e-6);
        }
        assert_eq!(lines[5].key, SectionKey::surveyed(2));
        assert_eq!(lines[4].key, SectionKey::new(1, 4));
    }

    #[test]
    fn distance_mode_rounds_count_up() {
        let (sections, parts) = reach(2, 45.0);
        let lines = create_cross_lines(&sections, &parts, CrossLinePolicy::Distance(10.0)).unwrap();
        assert_eq!(lines.len(), 6);
        assert!((start_x(&lines[1]) - 9.0).abs() < 1e-6);
    }

    fn count_policy(remain_percentage: u32) -> CrossLinePolicy {
        CrossLinePolicy::Count {
            method: ElementCountMethod::Fix,
            remain_percentage,
        }
    }

    #[test]
    fn count_mode_places_half_step_before_end() {
        // 20 m lines have 6 elements, so cross lines are 10 m apart.
        let (sections, parts) = reach(2, 45.0);
        let lines = create_cross_lines(&sections, &parts, count_policy(50)).unwrap();
        let xs: Vec<f64> = lines.iter().map(start_x).collect();
        assert_eq!(xs.len(), 6);
        for (x, expected) in xs.iter().zip([0.0, 10.0, 20.0, 30.0, 37.5, 45.0]) {
            assert!((x - expected).abs() < 1e-6, "{xs:?}");
        }
    }

    #[test]
    fn count_mode_skips_short_remainder() {
        let (sections, parts) = reach(2, 42.0);
        let lines = create_cross_lines(&sections, &parts, count_policy(30)).unwrap();
        let xs: Vec<f64> = lines.iter().map(start_x).collect();
        assert_eq!(xs.len(), 5);
        assert!((xs[3] - 30.0).abs() < 1e-6);
    }

    #[test]
    fn count_mode_spacing_follows_narrowing_lines() {
        // right bank rises from y = 0 to y = 10, so the channel narrows from 20 m to 10 m
        let sections = vec![
            CrossSection::surveyed(1, straight((0.0, 20.0), (0.0, 0.0))),
            CrossSection::surveyed(2, straight((60.0, 20.0), (60.0, 10.0))),
        ];
        let parts = vec![
            WlbPart {
                section_id: 1,
                bank: Bank::Left,
                line: straight((0.0, 20.0), (60.0, 20.0)),
            },
            WlbPart {
                section_id: 1,
                bank: Bank::Right,
                line: straight((0.0, 0.0), (60.0, 10.0)),
            },
        ];
        let lines = create_cross_lines(&sections, &parts, count_policy(50)).unwrap();
        let longer = 3700f64.sqrt();
        // first step from the 20 m section (6 elements), second from the first generated line
        let first_width = 20.0 - 10.0 * 10.0 / longer;
        assert!((lines[1].line.length() - first_width).abs() < 1e-6);
        let second_station = 10.0 + 3.0 * first_width / 6.0;
        assert!((start_x(&lines[2]) - 60.0 * second_station / longer).abs() < 1e-6);
    }

    #[test]
    fn inner_bank_spacing_follows_length_ratio() {
        let sections = vec![
            CrossSection::surveyed(1, straight((0.0, 20.0), (0.0, 0.0))),
            CrossSection::surveyed(2, straight((60.0, 20.0), (40.0, 0.0))),
        ];
        let parts = vec![
            WlbPart {
                section_id: 1,
                bank: Bank::Left,
                line: straight((0.0, 20.0), (60.0, 20.0)),
            },
            WlbPart {
                section_id: 1,
                bank: Bank::Right,
                line: straight((0.0, 0.0), (40.0, 0.0)),
            },
        ];
        let lines = create_cross_lines(&sections, &parts, CrossLinePolicy::Distance(10.0)).unwrap();
        assert_eq!(lines.len(), 7);
        let mid = &lines[3].line;
        let start = mid.start().unwrap();
        let end = mid.end().unwrap();
        assert!((start.x - 30.0).abs() < 1e-6 && (start.y - 20.0).abs() < 1e-6);
        assert!((end.x - 20.0).abs() < 1e-6 && end.y.abs() < 1e-6);
    }

    #[test]
    fn generated_lines_keep_section_shape() {
        let bent = |x: f64| {
            Polyline::new(vec![
                Point3::new(x, 20.0, 0.0),
                Point3::new(x + 2.0, 10.0, 0.0),
                Point3::new(x, 0.0, 0.0),
            ])
        };
        let sections = vec![CrossSection::surveyed(1, bent(0.0)), CrossSection::surveyed(2, bent(20.0))];
        let (_, parts) = reach(2, 20.0);
        let lines = create_cross_lines(&sections, &parts, CrossLinePolicy::Distance(10.0)).unwrap();
        assert_eq!(lines.len(), 3);
        let middle = &lines[1].line;
        assert_eq!(middle.len(), 3);
        let apex = middle.vertices[1];
        assert!(distance(apex.xy(), Point::new(12.0, 10.0)) < 1e-6);
    }

    #[test]
    fn missing_border_part_is_topology_error() {
        let (sections, mut parts) = reach(3, 50.0);
        parts.retain(|p| !(p.section_id == 2 && p.bank == Bank::Right));
        let err = create_cross_lines(&sections, &parts, CrossLinePolicy::Distance(10.0)).unwrap_err();
        assert!(matches!(err, MeshError::Topology { section_id: Some(2), .. }));
    }
}
