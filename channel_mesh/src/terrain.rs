//! Terrain surface queries and the watercourse terrain model (DTM-W).

use crate::geometry::{distance_to_ring, point_in_polygon, Point, Point3};

const BARYCENTRIC_TOLERANCE: f64 = -1e-9;

/// Elevation lookup on an external surface.
pub trait TerrainSurface: Sync {
    fn elevation_at(&self, x: f64, y: f64) -> Option<f64>;

    /// Elevations for a batch of plan positions, in input order.
    fn elevations_at(&self, points: &[Point]) -> Vec<Option<f64>> {
        points.iter().map(|p| self.elevation_at(p.x, p.y)).collect()
    }
}

/// Triangulated irregular network.
#[derive(Debug, Clone, Default)]
pub struct Tin {
    /// Vertices of the TIN.
    pub vertices: Vec<Point3>,
    /// Indices into `vertices` forming triangles.
    pub triangles: Vec<[usize; 3]>,
}

impl Tin {
    /// Builds a TIN from the provided vertices using Delaunay triangulation on the XY plane.
    pub fn from_points(points: Vec<Point3>) -> Self {
        let coords: Vec<delaunator::Point> = points
            .iter()
            .map(|p| delaunator::Point { x: p.x, y: p.y })
            .collect();
        let triangulation = delaunator::triangulate(&coords);
        let triangles = triangulation
            .triangles
            .chunks(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        log::debug!("Triangulated {} points.", points.len());
        Self {
            vertices: points,
            triangles,
        }
    }
}

impl TerrainSurface for Tin {
    /// Barycentric interpolation in the triangle containing `(x, y)`; points
    /// on shared edges are accepted.
    fn elevation_at(&self, x: f64, y: f64) -> Option<f64> {
        for tri in &self.triangles {
            let a = self.vertices[tri[0]];
            let b = self.vertices[tri[1]];
            let c = self.vertices[tri[2]];
            if let Some((u, v, w)) = barycentric(Point::new(x, y), a, b, c) {
                if u >= BARYCENTRIC_TOLERANCE && v >= BARYCENTRIC_TOLERANCE && w >= BARYCENTRIC_TOLERANCE {
                    return Some(u * a.z + v * b.z + w * c.z);
                }
            }
        }
        None
    }
}

fn barycentric(p: Point, a: Point3, b: Point3, c: Point3) -> Option<(f64, f64, f64)> {
    let det = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
    if det.abs() < f64::EPSILON {
        return None;
    }
    let u = ((b.y - c.y) * (p.x - c.x) + (c.x - b.x) * (p.y - c.y)) / det;
    let v = ((c.y - a.y) * (p.x - c.x) + (a.x - c.x) * (p.y - c.y)) / det;
    let w = 1.0 - u - v;
    Some((u, v, w))
}

/// Merges the channel bed points with the foreshore points outside the
/// stream polygon. With `buffer`, foreshore points further than that from the
/// polygon are dropped too.
pub fn create_dtmw(
    channel_points: &[Point3],
    foreshore_points: &[Point3],
    stream_polygon: &[Point],
    buffer: Option<f64>,
) -> Vec<Point3> {
    let foreshore: Vec<Point3> = foreshore_points
        .iter()
        .filter(|p| !point_in_polygon(p.xy(), stream_polygon))
        .filter(|p| buffer.map_or(true, |b| distance_to_ring(p.xy(), stream_polygon) <= b))
        .copied()
        .collect();
    log::info!(
        "DTM-W: {} channel points, {} of {} foreshore points.",
        channel_points.len(),
        foreshore.len(),
        foreshore_points.len()
    );
    let mut merged = channel_points.to_vec();
    merged.extend(foreshore);
    merged
}
