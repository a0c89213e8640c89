//! Basic geometry primitives for channel meshing.
//!
//! Lines carry 3D vertices but every length, station and spatial predicate is
//! evaluated in plan (XY). Elevations ride along and are interpolated linearly.

/// Plan tolerance used for identity and touch tests (1 cm).
pub const XY_TOLERANCE: f64 = 0.01;

const PARAM_EPSILON: f64 = 1e-9;

/// Representation of a 2D point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Representation of a 3D point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Plan position of the point.
    pub fn xy(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Linear interpolation between `self` and `other` at parameter `t`.
    pub fn lerp(&self, other: Point3, t: f64) -> Point3 {
        Point3::new(
            self.x + t * (other.x - self.x),
            self.y + t * (other.y - self.y),
            self.z + t * (other.z - self.z),
        )
    }
}

/// Calculates the Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}

/// Calculates the Euclidean distance between two 3D points.
pub fn distance3(a: Point3, b: Point3) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2) + (b.z - a.z).powi(2)).sqrt()
}

/// Signed area of a simple polygon (shoelace). Positive for counter-clockwise rings.
pub fn signed_area(vertices: &[Point]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..vertices.len() {
        let j = (i + 1) % vertices.len();
        sum += vertices[i].x * vertices[j].y - vertices[j].x * vertices[i].y;
    }
    sum * 0.5
}

/// Calculates the area of a simple polygon using the shoelace formula.
pub fn polygon_area(vertices: &[Point]) -> f64 {
    signed_area(vertices).abs()
}

/// Projects `p` onto segment `a`-`b`, returning the clamped segment parameter
/// and the plan distance from `p` to the projected point.
pub fn project_on_segment(p: Point, a: Point, b: Point) -> (f64, f64) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx * dx + dy * dy;
    let t = if len2 < f64::EPSILON {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0)
    };
    let q = Point::new(a.x + t * dx, a.y + t * dy);
    (t, distance(p, q))
}

/// Returns `true` if `p` lies within `tol` of segment `a`-`b`.
pub fn point_on_segment(p: Point, a: Point, b: Point, tol: f64) -> bool {
    project_on_segment(p, a, b).1 <= tol
}

/// Returns `true` if point `p` is inside the polygon `poly` or on its
/// boundary. The ring may be open or closed.
pub fn point_in_polygon(p: Point, poly: &[Point]) -> bool {
    if poly.is_empty() {
        return false;
    }
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        if point_on_segment(p, poly[j], poly[i], PARAM_EPSILON) {
            return true;
        }
        j = i;
    }
    let mut inside = false;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        let pi = poly[i];
        let pj = poly[j];
        if ((pi.y > p.y) != (pj.y > p.y))
            && (p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Plan distance from `p` to the boundary of `poly`.
pub fn distance_to_ring(p: Point, poly: &[Point]) -> f64 {
    if poly.is_empty() {
        return f64::INFINITY;
    }
    let mut best = f64::INFINITY;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        best = best.min(project_on_segment(p, poly[j], poly[i]).1);
        j = i;
    }
    best
}

/// Intersection of segments `a1`-`a2` and `b1`-`b2`. Returns the parameters
/// along both segments when they cross or touch; collinear overlaps are ignored.
pub fn segment_intersection(a1: Point, a2: Point, b1: Point, b2: Point) -> Option<(f64, f64)> {
    let rx = a2.x - a1.x;
    let ry = a2.y - a1.y;
    let sx = b2.x - b1.x;
    let sy = b2.y - b1.y;
    let denom = rx * sy - ry * sx;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let qpx = b1.x - a1.x;
    let qpy = b1.y - a1.y;
    let t = (qpx * sy - qpy * sx) / denom;
    let u = (qpx * ry - qpy * rx) / denom;
    let range = -PARAM_EPSILON..=1.0 + PARAM_EPSILON;
    if range.contains(&t) && range.contains(&u) {
        Some((t.clamp(0.0, 1.0), u.clamp(0.0, 1.0)))
    } else {
        None
    }
}

/// Crossing between two polylines, expressed as stations on both lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// Station along the first line.
    pub station: f64,
    /// Station along the second line.
    pub other_station: f64,
    /// Location, with the elevation of the first line.
    pub point: Point3,
}

/// Representation of a series of connected line segments.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Polyline {
    pub vertices: Vec<Point3>,
}

impl Polyline {
    /// Creates a new polyline from a list of vertices.
    pub fn new(vertices: Vec<Point3>) -> Self {
        Self { vertices }
    }

    /// Creates a plan polyline; elevations are set to zero.
    pub fn from_plan(points: &[Point]) -> Self {
        Self::new(points.iter().map(|p| Point3::new(p.x, p.y, 0.0)).collect())
    }

    /// Returns the total plan length of all segments in the polyline.
    pub fn length(&self) -> f64 {
        self.vertices
            .windows(2)
            .map(|pair| distance(pair[0].xy(), pair[1].xy()))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn start(&self) -> Option<Point3> {
        self.vertices.first().copied()
    }

    pub fn end(&self) -> Option<Point3> {
        self.vertices.last().copied()
    }

    /// Returns a copy with the vertex order reversed.
    pub fn reversed(&self) -> Polyline {
        let mut vertices = self.vertices.clone();
        vertices.reverse();
        Polyline::new(vertices)
    }

    /// Station of every vertex.
    pub fn vertex_stations(&self) -> Vec<f64> {
        let mut stations = Vec::with_capacity(self.vertices.len());
        let mut acc = 0.0;
        for (i, v) in self.vertices.iter().enumerate() {
            if i > 0 {
                acc += distance(self.vertices[i - 1].xy(), v.xy());
            }
            stations.push(acc);
        }
        stations
    }

    /// Position at plan distance `station` from the start. Stations outside
    /// the line are clamped to its ends.
    pub fn point_at(&self, station: f64) -> Option<Point3> {
        let first = self.start()?;
        if station <= 0.0 || self.vertices.len() == 1 {
            return Some(first);
        }
        let mut acc = 0.0;
        for pair in self.vertices.windows(2) {
            let seg = distance(pair[0].xy(), pair[1].xy());
            if acc + seg >= station {
                let t = if seg < f64::EPSILON {
                    0.0
                } else {
                    (station - acc) / seg
                };
                return Some(pair[0].lerp(pair[1], t));
            }
            acc += seg;
        }
        self.end()
    }

    /// Position at `fraction` (0 = start, 1 = end) of the plan length.
    pub fn point_at_fraction(&self, fraction: f64) -> Option<Point3> {
        self.point_at(fraction.clamp(0.0, 1.0) * self.length())
    }

    /// Station of the orthogonal projection of `p`, and the plan offset of `p`
    /// from the line.
    pub fn station_of(&self, p: Point) -> Option<(f64, f64)> {
        let first = self.start()?;
        if self.vertices.len() == 1 {
            return Some((0.0, distance(p, first.xy())));
        }
        let mut best: Option<(f64, f64)> = None;
        let mut acc = 0.0;
        for pair in self.vertices.windows(2) {
            let a = pair[0].xy();
            let b = pair[1].xy();
            let seg = distance(a, b);
            let (t, d) = project_on_segment(p, a, b);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((acc + t * seg, d));
            }
            acc += seg;
        }
        best
    }

    /// Returns `true` if `p` lies on the line within `tol`.
    pub fn touches(&self, p: Point, tol: f64) -> bool {
        self.station_of(p).map_or(false, |(_, d)| d <= tol)
    }

    /// Point halfway along the line.
    pub fn midpoint(&self) -> Option<Point3> {
        self.point_at(self.length() / 2.0)
    }

    /// Part of the line between two stations (in line direction).
    pub fn sub_line(&self, from: f64, to: f64) -> Polyline {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        let stations = self.vertex_stations();
        let mut vertices = Vec::new();
        if let Some(p) = self.point_at(from) {
            vertices.push(p);
        }
        for (v, s) in self.vertices.iter().zip(&stations) {
            if *s > from + PARAM_EPSILON && *s < to - PARAM_EPSILON {
                vertices.push(*v);
            }
        }
        if let Some(p) = self.point_at(to) {
            vertices.push(p);
        }
        Polyline::new(vertices)
    }

    /// All crossings with `other`, ordered by station along `self`.
    pub fn crossings(&self, other: &Polyline) -> Vec<Crossing> {
        let own = self.vertex_stations();
        let theirs = other.vertex_stations();
        let mut found: Vec<Crossing> = Vec::new();
        for (i, a) in self.vertices.windows(2).enumerate() {
            for (j, b) in other.vertices.windows(2).enumerate() {
                if let Some((t, u)) = segment_intersection(a[0].xy(), a[1].xy(), b[0].xy(), b[1].xy()) {
                    let station = own[i] + t * (own[i + 1] - own[i]);
                    let crossing = Crossing {
                        station,
                        other_station: theirs[j] + u * (theirs[j + 1] - theirs[j]),
                        point: a[0].lerp(a[1], t),
                    };
                    // Crossings exactly at shared vertices are reported by both segments.
                    if !found.iter().any(|c| (c.station - station).abs() < PARAM_EPSILON * 1e3) {
                        found.push(crossing);
                    }
                }
            }
        }
        found.sort_by(|a, b| a.station.total_cmp(&b.station));
        found
    }
}
