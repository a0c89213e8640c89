//! Quadrilateral and triangular elements between adjacent vertex rows.

use std::collections::BTreeMap;

use crate::error::{MeshError, Result};
use crate::features::{MeshElement, SectionKey, Vertex};
use crate::geometry::{signed_area, Point3};

/// Largest vertex count difference between adjacent rows that can be meshed.
pub const MAX_ROW_DIFFERENCE: usize = 2;

/// Builds the elements between every pair of adjacent cross-line rows.
///
/// Rows with equal counts get quadrilaterals only. A difference of one is
/// absorbed by a triangle at the lateral middle, a difference of two by a
/// triangle next to each bank. Elements are counter-clockwise, tagged with
/// the front row and numbered from 1 across each row pair.
pub fn create_channel_mesh_elements(vertices: &[Vertex]) -> Result<Vec<MeshElement>> {
    let mut rows: BTreeMap<SectionKey, Vec<&Vertex>> = BTreeMap::new();
    for vertex in vertices {
        rows.entry(vertex.key).or_default().push(vertex);
    }
    let rows: Vec<(SectionKey, Vec<Point3>)> = rows
        .into_iter()
        .map(|(key, mut row)| {
            row.sort_by_key(|v| v.vertex_id);
            (key, row.iter().map(|v| v.point).collect())
        })
        .collect();
    if rows.len() < 2 {
        return Err(MeshError::topology(
            "create mesh elements",
            format!("{} vertex rows, at least two needed", rows.len()),
        ));
    }

    let mut elements = Vec::new();
    for pair in rows.windows(2) {
        let (front_key, front) = (&pair[0].0, &pair[0].1);
        let (back_key, back) = (&pair[1].0, &pair[1].1);
        for (key, row) in [(front_key, front), (back_key, back)] {
            if row.len() < 2 {
                return Err(MeshError::topology_at(
                    "create mesh elements",
                    key.section_id,
                    key.intermediate_id,
                    format!("row has {} vertices", row.len()),
                ));
            }
        }
        let rings = row_pair(front, back).ok_or_else(|| {
            MeshError::topology_at(
                "create mesh elements",
                front_key.section_id,
                front_key.intermediate_id,
                format!(
                    "row counts {} and {} (next row {back_key}) differ by more than {MAX_ROW_DIFFERENCE}",
                    front.len(),
                    back.len()
                ),
            )
        })?;
        log::debug!(
            "Rows {front_key} ({}) and {back_key} ({}): {} elements.",
            front.len(),
            back.len(),
            rings.len()
        );
        elements.extend(rings.into_iter().enumerate().map(|(i, ring)| MeshElement {
            key: *front_key,
            element_id: i as u32 + 1,
            vertices: counter_clockwise(ring),
        }));
    }
    log::info!("Created {} mesh elements.", elements.len());
    Ok(elements)
}

/// Element rings between two rows, or `None` when the counts differ by more
/// than [`MAX_ROW_DIFFERENCE`].
fn row_pair(front: &[Point3], back: &[Point3]) -> Option<Vec<Vec<Point3>>> {
    let (long, short) = if front.len() >= back.len() {
        (front, back)
    } else {
        (back, front)
    };
    match long.len() - short.len() {
        0 => Some(
            (0..long.len() - 1)
                .map(|j| vec![front[j], front[j + 1], back[j + 1], back[j]])
                .collect(),
        ),
        1 => Some(one_triangle(long, short)),
        2 => Some(two_triangles(long, short)),
        _ => None,
    }
}

fn one_triangle(long: &[Point3], short: &[Point3]) -> Vec<Vec<Point3>> {
    let middle = (short.len() - 1) / 2;
    (0..long.len() - 1)
        .map(|j| {
            if j < middle {
                vec![long[j], long[j + 1], short[j + 1], short[j]]
            } else if j == middle {
                vec![long[j], long[j + 1], short[j]]
            } else {
                vec![long[j], long[j + 1], short[j], short[j - 1]]
            }
        })
        .collect()
}

/// Triangles as second element from each bank, or at the banks when the
/// longer row is too short for that.
fn two_triangles(long: &[Point3], short: &[Point3]) -> Vec<Vec<Point3>> {
    let segments = long.len() - 1;
    let (first, second) = if long.len() >= 5 {
        (1, segments - 2)
    } else {
        (0, segments - 1)
    };
    let mut offset = 0;
    let mut rings = Vec::with_capacity(segments);
    for j in 0..segments {
        if j == first || j == second {
            rings.push(vec![long[j], long[j + 1], short[j - offset]]);
            offset += 1;
        } else {
            rings.push(vec![long[j], long[j + 1], short[j - offset + 1], short[j - offset]]);
        }
    }
    rings
}

fn counter_clockwise(mut ring: Vec<Point3>) -> Vec<Point3> {
    let plan: Vec<_> = ring.iter().map(Point3::xy).collect();
    if signed_area(&plan) < 0.0 {
        ring.reverse();
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ElementShape;

    /// Row of `count` vertices across a 21 m wide channel at `x`.
    fn row(key: SectionKey, x: f64, count: usize) -> Vec<Vertex> {
        let spacing = 21.0 / (count - 1) as f64;
        (0..count)
            .map(|i| Vertex {
                key,
                vertex_id: i as u32 + 1,
                point: Point3::new(x, 21.0 - i as f64 * spacing, 0.0),
            })
            .collect()
    }

    fn mesh(front: usize, back: usize) -> Result<Vec<MeshElement>> {
        let mut vertices = row(SectionKey::new(1, 1), 0.0, front);
        vertices.extend(row(SectionKey::new(1, 2), 10.0, back));
        create_channel_mesh_elements(&vertices)
    }

    fn assert_covers_row_pair(elements: &[MeshElement], area: f64) {
        let total: f64 = elements.iter().map(MeshElement::area).sum();
        assert!((total - area).abs() < 1e-6, "total {total}");
        for element in elements {
            assert!(element.signed_area() > 0.0, "{element:?}");
        }
    }

    #[test]
    fn equal_rows_give_quadrilaterals() {
        let elements = mesh(5, 5).unwrap();
        assert_eq!(elements.len(), 4);
        assert!(elements.iter().all(|e| e.shape() == ElementShape::Quadrilateral));
        assert_covers_row_pair(&elements, 210.0);
        let ids: Vec<u32> = elements.iter().map(|e| e.element_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(elements.iter().all(|e| e.key == SectionKey::new(1, 1)));
    }

    #[test]
    fn difference_of_one_adds_middle_triangle() {
        for (front, back) in [(7, 6), (6, 7), (3, 2)] {
            let elements = mesh(front, back).unwrap();
            assert_eq!(elements.len(), front.max(back) - 1);
            let triangles: Vec<&MeshElement> =
                elements.iter().filter(|e| e.shape() == ElementShape::Triangle).collect();
            assert_eq!(triangles.len(), 1);
            assert_covers_row_pair(&elements, 210.0);
        }
    }

    #[test]
    fn difference_of_two_adds_bank_triangles() {
        let elements = mesh(8, 6).unwrap();
        assert_eq!(elements.len(), 7);
        let shapes: Vec<ElementShape> = elements.iter().map(MeshElement::shape).collect();
        assert_eq!(shapes[1], ElementShape::Triangle);
        assert_eq!(shapes[5], ElementShape::Triangle);
        assert_eq!(shapes.iter().filter(|s| **s == ElementShape::Quadrilateral).count(), 5);
        assert_covers_row_pair(&elements, 210.0);

        for (front, back) in [(6, 8), (4, 2), (2, 4), (5, 3)] {
            let elements = mesh(front, back).unwrap();
            assert_eq!(elements.len(), front.max(back) - 1);
            assert_covers_row_pair(&elements, 210.0);
        }
    }

    #[test]
    fn larger_difference_is_topology_error() {
        let err = mesh(9, 5).unwrap_err();
        assert!(matches!(
            err,
            MeshError::Topology {
                section_id: Some(1),
                intermediate_id: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn single_row_is_rejected() {
        let vertices = row(SectionKey::surveyed(1), 0.0, 4);
        assert!(create_channel_mesh_elements(&vertices).is_err());
    }
}
