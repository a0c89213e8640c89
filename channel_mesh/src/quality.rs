//! Diagnostic angle and area checks on the mesh elements.
//!
//! Findings never abort the pipeline. They are collected in a
//! [`QualityReport`] that can be written as a numbered plain-text list.

use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{MeshConfig, OutputSettings};
use crate::error::Result;
use crate::features::{ElementShape, MeshElement, SectionKey};
use crate::geometry::{signed_area, Point};

/// Bounds the elements are checked against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityCriteria {
    pub check_angles: bool,
    pub check_areas: bool,
    /// Degrees.
    pub min_angle: f64,
    /// Degrees.
    pub max_angle: f64,
    pub area_factor: f64,
}

impl Default for QualityCriteria {
    fn default() -> Self {
        Self::from(&MeshConfig::default())
    }
}

impl From<&MeshConfig> for QualityCriteria {
    fn from(config: &MeshConfig) -> Self {
        Self {
            check_angles: config.check_angles,
            check_areas: config.check_areas,
            min_angle: config.min_angle,
            max_angle: config.max_angle,
            area_factor: config.area_factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    MinAngle,
    MaxAngle,
    /// Smaller than the largest neighbour allows.
    MinArea,
    /// Larger than the smallest neighbour allows.
    MaxArea,
}

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Metric::MinAngle => "min_angle",
            Metric::MaxAngle => "max_angle",
            Metric::MinArea => "min_area",
            Metric::MaxArea => "max_area",
        }
    }

    pub fn is_angle(self) -> bool {
        matches!(self, Metric::MinAngle | Metric::MaxAngle)
    }
}

/// Element an area violation was measured against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceElement {
    pub key: SectionKey,
    pub element_id: u32,
    pub area: f64,
}

/// One violated bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub key: SectionKey,
    pub element_id: u32,
    pub shape: ElementShape,
    pub metric: Metric,
    pub observed: f64,
    pub bound: f64,
    pub reference: Option<ReferenceElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub element_count: usize,
    pub violations: Vec<Violation>,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn angle_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.metric.is_angle())
    }

    pub fn area_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.metric.is_angle())
    }

    /// Plain-text report: a header with the element count and the bounds,
    /// then numbered quadrilateral angle, triangle angle and area warnings.
    pub fn write_text<W: Write>(&self, writer: &mut W, dataset: &str, criteria: &QualityCriteria) -> Result<()> {
        writeln!(writer, "Checked elements: {dataset}")?;
        writeln!(writer, "Element count: {}", self.element_count)?;
        let mut number = 1;
        if criteria.check_angles {
            writeln!(
                writer,
                "Warnings for plan angles (minimum angle: {} degrees, maximum angle: {} degrees):",
                criteria.min_angle, criteria.max_angle
            )?;
            for shape in [ElementShape::Quadrilateral, ElementShape::Triangle] {
                for violation in self.angle_violations().filter(|v| v.shape == shape) {
                    writeln!(writer, "{number}: {}", angle_message(violation))?;
                    number += 1;
                }
                if shape == ElementShape::Quadrilateral {
                    writeln!(writer)?;
                }
            }
        }
        if criteria.check_areas {
            writeln!(writer, "\nWarnings for areas (area factor: {}):", criteria.area_factor)?;
            for violation in self.area_violations() {
                writeln!(writer, "{number}: {}", area_message(violation))?;
                number += 1;
            }
        }
        Ok(())
    }

    /// Writes the text report to `path`, renamed with a timestamp when the
    /// file exists and overwriting is off. Returns the path written.
    pub fn write_report(
        &self,
        path: &Path,
        dataset: &str,
        criteria: &QualityCriteria,
        output: &OutputSettings,
    ) -> Result<PathBuf> {
        let path = output.resolve_path(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(fs::File::create(&path)?);
        self.write_text(&mut writer, dataset, criteria)?;
        writer.flush()?;
        log::info!("Quality report written to {}.", path.display());
        Ok(path)
    }
}

fn shape_name(shape: ElementShape) -> &'static str {
    match shape {
        ElementShape::Quadrilateral => "Quadrilateral",
        ElementShape::Triangle => "Triangle",
    }
}

fn angle_message(v: &Violation) -> String {
    let relation = if v.metric == Metric::MinAngle { "lower" } else { "larger" };
    let limit = if v.metric == Metric::MinAngle { "minimum" } else { "maximum" };
    format!(
        "{} (SECTIONID {}, INTERMEDIATEID {}, ELEMENTID {}) has an angle of {:.2} degrees which is {relation} than the {limit} angle of {} degrees.",
        shape_name(v.shape),
        v.key.section_id,
        v.key.intermediate_id,
        v.element_id,
        v.observed,
        v.bound
    )
}

fn area_message(v: &Violation) -> String {
    let (limit, verdict) = if v.metric == Metric::MinArea {
        ("minimum", "undersized")
    } else {
        ("maximum", "oversized")
    };
    let mut message = format!(
        "Element (SECTIONID {}, INTERMEDIATEID {}, ELEMENTID {}) has an area of {:.2} square meters. The {limit} area of the element should be {:.2} square meters.",
        v.key.section_id, v.key.intermediate_id, v.element_id, v.observed, v.bound
    );
    if let Some(reference) = v.reference {
        message.push_str(&format!(
            " The element is {verdict} compared with the element (SECTIONID {}, INTERMEDIATEID {}, ELEMENTID {}) with an area of {:.2} square meters.",
            reference.key.section_id, reference.key.intermediate_id, reference.element_id, reference.area
        ));
    }
    message
}

/// Checks interior angles and neighbour area ratios of every element.
///
/// Angles are planar and reflex aware. Areas are compared with the elements
/// sharing at least one vertex; triangle areas count double so that they
/// compare with quadrilaterals of the same row spacing. Violations come out
/// in element order, angles before areas.
pub fn check_channel_mesh_elements(elements: &[MeshElement], criteria: &QualityCriteria) -> QualityReport {
    let areas: Vec<f64> = elements.iter().map(normalised_area).collect();
    let neighbours = if criteria.check_areas {
        vertex_neighbours(elements)
    } else {
        vec![Vec::new(); elements.len()]
    };

    let violations: Vec<Violation> = elements
        .par_iter()
        .enumerate()
        .map(|(index, element)| {
            let mut found = Vec::new();
            if criteria.check_angles {
                check_angles(element, criteria, &mut found);
            }
            if criteria.check_areas {
                check_area(index, elements, &areas, &neighbours[index], criteria, &mut found);
            }
            found
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();

    if violations.is_empty() {
        log::info!("Checked {} elements, no violations.", elements.len());
    } else {
        log::warn!("Checked {} elements, {} violations.", elements.len(), violations.len());
    }
    QualityReport {
        element_count: elements.len(),
        violations,
    }
}

fn check_angles(element: &MeshElement, criteria: &QualityCriteria, found: &mut Vec<Violation>) {
    for angle in interior_angles(&element.plan_ring()) {
        let (metric, bound) = if angle < criteria.min_angle {
            (Metric::MinAngle, criteria.min_angle)
        } else if angle > criteria.max_angle {
            (Metric::MaxAngle, criteria.max_angle)
        } else {
            continue;
        };
        found.push(Violation {
            key: element.key,
            element_id: element.element_id,
            shape: element.shape(),
            metric,
            observed: angle,
            bound,
            reference: None,
        });
    }
}

fn check_area(
    index: usize,
    elements: &[MeshElement],
    areas: &[f64],
    neighbours: &[usize],
    criteria: &QualityCriteria,
    found: &mut Vec<Violation>,
) {
    let area = areas[index];
    let element = &elements[index];
    let reference = |i: usize| ReferenceElement {
        key: elements[i].key,
        element_id: elements[i].element_id,
        area: areas[i],
    };
    let smallest = neighbours.iter().copied().min_by(|&a, &b| areas[a].total_cmp(&areas[b]));
    let largest = neighbours.iter().copied().max_by(|&a, &b| areas[a].total_cmp(&areas[b]));

    if let Some(i) = smallest {
        let bound = criteria.area_factor * areas[i];
        if area > bound {
            found.push(Violation {
                key: element.key,
                element_id: element.element_id,
                shape: element.shape(),
                metric: Metric::MaxArea,
                observed: area,
                bound,
                reference: Some(reference(i)),
            });
        }
    }
    if let Some(i) = largest {
        let bound = areas[i] / criteria.area_factor;
        if area < bound {
            found.push(Violation {
                key: element.key,
                element_id: element.element_id,
                shape: element.shape(),
                metric: Metric::MinArea,
                observed: area,
                bound,
                reference: Some(reference(i)),
            });
        }
    }
}

fn normalised_area(element: &MeshElement) -> f64 {
    match element.shape() {
        ElementShape::Triangle => 2.0 * element.area(),
        ElementShape::Quadrilateral => element.area(),
    }
}

/// Interior angles in degrees, in ring order, measured in plan (z ignored).
pub fn interior_angles(ring: &[Point]) -> Vec<f64> {
    let n = ring.len();
    if n < 3 {
        return Vec::new();
    }
    let orientation = if signed_area(ring) < 0.0 { -1.0 } else { 1.0 };
    (0..n)
        .map(|i| {
            let prev = ring[(i + n - 1) % n];
            let cur = ring[i];
            let next = ring[(i + 1) % n];
            let (ax, ay) = (next.x - cur.x, next.y - cur.y);
            let (bx, by) = (prev.x - cur.x, prev.y - cur.y);
            let cross = orientation * (ax * by - ay * bx);
            let dot = ax * bx + ay * by;
            let angle = cross.atan2(dot).to_degrees();
            if angle < 0.0 {
                angle + 360.0
            } else {
                angle
            }
        })
        .collect()
}

/// Indices of the elements sharing a vertex with each element.
fn vertex_neighbours(elements: &[MeshElement]) -> Vec<Vec<usize>> {
    let mut by_vertex: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (index, element) in elements.iter().enumerate() {
        for v in &element.vertices {
            by_vertex.entry(vertex_key(v.x, v.y)).or_default().push(index);
        }
    }
    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let mut found: Vec<usize> = element
                .vertices
                .iter()
                .filter_map(|v| by_vertex.get(&vertex_key(v.x, v.y)))
                .flatten()
                .copied()
                .filter(|&i| i != index)
                .collect();
            found.sort_unstable();
            found.dedup();
            found
        })
        .collect()
}

/// Millimetre grid key.
fn vertex_key(x: f64, y: f64) -> (i64, i64) {
    ((x * 1000.0).round() as i64, (y * 1000.0).round() as i64)
}
