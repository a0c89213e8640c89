//! Domain features flowing between the pipeline stages and their record form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, Result};
use crate::geometry::{signed_area, Point, Point3, Polyline};
use crate::store::{Feature, FieldDef, FieldType, FieldValue, Geometry, GeometryKind, Record};

pub const SECTION_ID: &str = "SECTIONID";
pub const INTERMEDIATE_ID: &str = "INTERMEDIATEID";
pub const WLB_ID: &str = "WLBID";
pub const POINT_ID: &str = "POINTID";
pub const VERTEX_ID: &str = "VERTEXID";
pub const ELEMENT_ID: &str = "ELEMENTID";
pub const ELEVATION: &str = "Z";
pub const GROUPING_KEY: &str = "KEY";

/// Identity of a cross-line: `intermediate_id == 0` is the surveyed section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SectionKey {
    pub section_id: u32,
    pub intermediate_id: u32,
}

impl SectionKey {
    pub fn new(section_id: u32, intermediate_id: u32) -> Self {
        Self {
            section_id,
            intermediate_id,
        }
    }

    pub fn surveyed(section_id: u32) -> Self {
        Self::new(section_id, 0)
    }

    pub fn is_surveyed(&self) -> bool {
        self.intermediate_id == 0
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.section_id, self.intermediate_id)
    }
}

/// A surveyed cross-section or a generated intermediate line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossLine {
    pub key: SectionKey,
    pub line: Polyline,
}

/// Surveyed cross-sections are cross-lines with `intermediate_id == 0`.
pub type CrossSection = CrossLine;

impl CrossLine {
    pub fn new(key: SectionKey, line: Polyline) -> Self {
        Self { key, line }
    }

    pub fn surveyed(section_id: u32, line: Polyline) -> Self {
        Self::new(SectionKey::surveyed(section_id), line)
    }
}

/// Side of the channel, stored as `WLBID` 1 (left) or 2 (right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bank {
    Left,
    Right,
}

impl Bank {
    pub fn wlb_id(self) -> u32 {
        match self {
            Bank::Left => 1,
            Bank::Right => 2,
        }
    }

    pub fn from_wlb_id(id: u32) -> Option<Bank> {
        match id {
            1 => Some(Bank::Left),
            2 => Some(Bank::Right),
            _ => None,
        }
    }
}

/// One water-land border line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorderLine {
    pub bank: Bank,
    pub line: Polyline,
}

/// The left and right water-land border.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterLandBorder {
    pub left: Polyline,
    pub right: Polyline,
}

impl WaterLandBorder {
    /// Builds the border from its two tagged lines.
    pub fn from_lines(lines: &[BorderLine]) -> Result<Self> {
        let pick = |bank: Bank| -> Result<Polyline> {
            let mut found = lines.iter().filter(|l| l.bank == bank);
            let line = found.next().ok_or_else(|| {
                MeshError::topology("water land border", format!("no line with WLBID {}", bank.wlb_id()))
            })?;
            if found.next().is_some() {
                return Err(MeshError::topology(
                    "water land border",
                    format!("more than one line with WLBID {}", bank.wlb_id()),
                ));
            }
            Ok(line.line.clone())
        };
        Ok(Self {
            left: pick(Bank::Left)?,
            right: pick(Bank::Right)?,
        })
    }

    pub fn lines(&self) -> [BorderLine; 2] {
        [
            BorderLine {
                bank: Bank::Left,
                line: self.left.clone(),
            },
            BorderLine {
                bank: Bank::Right,
                line: self.right.clone(),
            },
        ]
    }

    pub fn line(&self, bank: Bank) -> &Polyline {
        match bank {
            Bank::Left => &self.left,
            Bank::Right => &self.right,
        }
    }
}

/// Part of one bank between two successive cross-sections, tagged with the
/// upstream section id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WlbPart {
    pub section_id: u32,
    pub bank: Bank,
    pub line: Polyline,
}

/// Plan outline of the investigated water area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPolygon {
    pub ring: Vec<Point>,
}

/// A surveyed point, optionally carrying the key that groups it into a
/// cross-section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyedPoint {
    pub point: Point3,
    pub key: Option<String>,
}

impl SurveyedPoint {
    pub fn new(point: Point3, key: Option<String>) -> Self {
        Self { point, key }
    }
}

/// A point of longitudinal profile `relative_position` on cross-line `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongitudinalSectionPoint {
    pub point: Point,
    pub z: Option<f64>,
    pub relative_position: usize,
    pub key: SectionKey,
}

impl LongitudinalSectionPoint {
    pub fn point3(&self) -> Option<Point3> {
        self.z.map(|z| Point3::new(self.point.x, self.point.y, z))
    }
}

/// Line connecting all points of one longitudinal profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongitudinalSection {
    pub relative_position: usize,
    pub line: Polyline,
}

/// Mesh node on a cross-line, numbered from the left bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub key: SectionKey,
    pub vertex_id: u32,
    pub point: Point3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementShape {
    Triangle,
    Quadrilateral,
}

/// Triangular or quadrilateral mesh element with counter-clockwise vertices,
/// tagged with the front row of its row pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshElement {
    pub key: SectionKey,
    pub element_id: u32,
    pub vertices: Vec<Point3>,
}

impl MeshElement {
    pub fn shape(&self) -> ElementShape {
        if self.vertices.len() == 3 {
            ElementShape::Triangle
        } else {
            ElementShape::Quadrilateral
        }
    }

    pub fn plan_ring(&self) -> Vec<Point> {
        self.vertices.iter().map(Point3::xy).collect()
    }

    /// Signed plan area, positive for counter-clockwise winding.
    pub fn signed_area(&self) -> f64 {
        signed_area(&self.plan_ring())
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }
}

fn id_field(value: u32) -> FieldValue {
    FieldValue::Integer(i64::from(value))
}

fn key_fields(record: Record, key: SectionKey) -> Record {
    record
        .with(SECTION_ID, id_field(key.section_id))
        .with(INTERMEDIATE_ID, id_field(key.intermediate_id))
}

fn read_key(record: &Record) -> Result<SectionKey> {
    Ok(SectionKey::new(record.id(SECTION_ID)?, record.id(INTERMEDIATE_ID)?))
}

fn read_bank(record: &Record) -> Result<Bank> {
    let id = record.id(WLB_ID)?;
    Bank::from_wlb_id(id).ok_or_else(|| MeshError::store("record", format!("WLBID {id} is neither 1 nor 2")))
}

fn key_defs() -> Vec<FieldDef> {
    vec![
        FieldDef::new(SECTION_ID, FieldType::Integer),
        FieldDef::new(INTERMEDIATE_ID, FieldType::Integer),
    ]
}

impl Feature for CrossLine {
    const KIND: GeometryKind = GeometryKind::Polyline;

    fn fields() -> Vec<FieldDef> {
        key_defs()
    }

    fn to_record(&self) -> Record {
        key_fields(Record::new(Geometry::Polyline(self.line.clone())), self.key)
    }

    /// Cross-sections without `INTERMEDIATEID` are read as surveyed.
    fn from_record(record: &Record) -> Result<Self> {
        let section_id = record.id(SECTION_ID)?;
        let intermediate_id = match record.fields.get(INTERMEDIATE_ID) {
            Some(_) => record.id(INTERMEDIATE_ID)?,
            None => 0,
        };
        Ok(CrossLine::new(
            SectionKey::new(section_id, intermediate_id),
            record.polyline()?.clone(),
        ))
    }
}

impl Feature for BorderLine {
    const KIND: GeometryKind = GeometryKind::Polyline;

    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::new(WLB_ID, FieldType::Integer)]
    }

    fn to_record(&self) -> Record {
        Record::new(Geometry::Polyline(self.line.clone())).with(WLB_ID, id_field(self.bank.wlb_id()))
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(BorderLine {
            bank: read_bank(record)?,
            line: record.polyline()?.clone(),
        })
    }
}

impl Feature for WlbPart {
    const KIND: GeometryKind = GeometryKind::Polyline;

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new(SECTION_ID, FieldType::Integer),
            FieldDef::new(WLB_ID, FieldType::Integer),
        ]
    }

    fn to_record(&self) -> Record {
        Record::new(Geometry::Polyline(self.line.clone()))
            .with(SECTION_ID, id_field(self.section_id))
            .with(WLB_ID, id_field(self.bank.wlb_id()))
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(WlbPart {
            section_id: record.id(SECTION_ID)?,
            bank: read_bank(record)?,
            line: record.polyline()?.clone(),
        })
    }
}

impl Feature for StreamPolygon {
    const KIND: GeometryKind = GeometryKind::Polygon;

    fn fields() -> Vec<FieldDef> {
        Vec::new()
    }

    fn to_record(&self) -> Record {
        Record::new(Geometry::Polygon(
            self.ring.iter().map(|p| Point3::new(p.x, p.y, 0.0)).collect(),
        ))
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(StreamPolygon {
            ring: record.polygon()?.iter().map(Point3::xy).collect(),
        })
    }
}

impl Feature for SurveyedPoint {
    const KIND: GeometryKind = GeometryKind::Point;

    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::new(GROUPING_KEY, FieldType::Text)]
    }

    fn to_record(&self) -> Record {
        let record = Record::new(Geometry::Point(self.point));
        match &self.key {
            Some(key) => record.with(GROUPING_KEY, FieldValue::Text(key.clone())),
            None => record,
        }
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(SurveyedPoint {
            point: record.point()?,
            key: record.text(GROUPING_KEY).map(str::to_string),
        })
    }
}

impl Feature for LongitudinalSectionPoint {
    const KIND: GeometryKind = GeometryKind::Point;

    fn fields() -> Vec<FieldDef> {
        let mut fields = key_defs();
        fields.push(FieldDef::new(POINT_ID, FieldType::Integer));
        fields.push(FieldDef::new(ELEVATION, FieldType::Double));
        fields
    }

    /// Unknown elevations are stored as a null `Z` field over a zero geometry z.
    fn to_record(&self) -> Record {
        let geometry = Geometry::Point(Point3::new(self.point.x, self.point.y, self.z.unwrap_or(0.0)));
        key_fields(Record::new(geometry), self.key)
            .with(POINT_ID, FieldValue::Integer(self.relative_position as i64))
            .with(ELEVATION, self.z.map_or(FieldValue::Null, FieldValue::Double))
    }

    fn from_record(record: &Record) -> Result<Self> {
        let p = record.point()?;
        Ok(LongitudinalSectionPoint {
            point: p.xy(),
            z: record.double(ELEVATION)?,
            relative_position: record.id(POINT_ID)? as usize,
            key: read_key(record)?,
        })
    }
}

impl Feature for LongitudinalSection {
    const KIND: GeometryKind = GeometryKind::Polyline;

    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::new(POINT_ID, FieldType::Integer)]
    }

    fn to_record(&self) -> Record {
        Record::new(Geometry::Polyline(self.line.clone()))
            .with(POINT_ID, FieldValue::Integer(self.relative_position as i64))
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(LongitudinalSection {
            relative_position: record.id(POINT_ID)? as usize,
            line: record.polyline()?.clone(),
        })
    }
}

impl Feature for Vertex {
    const KIND: GeometryKind = GeometryKind::Point;

    fn fields() -> Vec<FieldDef> {
        let mut fields = key_defs();
        fields.push(FieldDef::new(VERTEX_ID, FieldType::Integer));
        fields
    }

    fn to_record(&self) -> Record {
        key_fields(Record::new(Geometry::Point(self.point)), self.key).with(VERTEX_ID, id_field(self.vertex_id))
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Vertex {
            key: read_key(record)?,
            vertex_id: record.id(VERTEX_ID)?,
            point: record.point()?,
        })
    }
}

impl Feature for MeshElement {
    const KIND: GeometryKind = GeometryKind::Polygon;

    fn fields() -> Vec<FieldDef> {
        let mut fields = key_defs();
        fields.push(FieldDef::new(ELEMENT_ID, FieldType::Integer));
        fields
    }

    fn to_record(&self) -> Record {
        key_fields(Record::new(Geometry::Polygon(self.vertices.clone())), self.key)
            .with(ELEMENT_ID, id_field(self.element_id))
    }

    fn from_record(record: &Record) -> Result<Self> {
        let ring = record.polygon()?;
        if !(3..=4).contains(&ring.len()) {
            return Err(MeshError::store(
                "record",
                format!("mesh element with {} vertices", ring.len()),
            ));
        }
        Ok(MeshElement {
            key: read_key(record)?,
            element_id: record.id(ELEMENT_ID)?,
            vertices: ring.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_keys_order_downstream() {
        let mut keys = vec![
            SectionKey::new(2, 0),
            SectionKey::new(1, 3),
            SectionKey::new(1, 0),
            SectionKey::new(1, 1),
        ];
        keys.sort();
        assert_eq!(keys[0], SectionKey::surveyed(1));
        assert_eq!(keys[2], SectionKey::new(1, 3));
        assert!(keys[3].is_surveyed());
    }

    #[test]
    fn profile_point_keeps_unknown_elevation() {
        let point = LongitudinalSectionPoint {
            point: Point::new(1.0, 2.0),
            z: None,
            relative_position: 3,
            key: SectionKey::new(1, 2),
        };
        let record = point.to_record();
        assert_eq!(record.fields.get(ELEVATION), Some(&FieldValue::Null));
        assert_eq!(LongitudinalSectionPoint::from_record(&record).unwrap(), point);
    }

    #[test]
    fn cross_section_without_intermediate_field_is_surveyed() {
        let record = Record::new(Geometry::Polyline(Polyline::new(vec![])))
            .with(SECTION_ID, FieldValue::Integer(7));
        let line = CrossLine::from_record(&record).unwrap();
        assert_eq!(line.key, SectionKey::surveyed(7));
    }

    #[test]
    fn border_requires_both_banks() {
        let left = BorderLine {
            bank: Bank::Left,
            line: Polyline::new(vec![]),
        };
        assert!(matches!(
            WaterLandBorder::from_lines(&[left.clone()]),
            Err(MeshError::Topology { .. })
        ));
        let right = BorderLine {
            bank: Bank::Right,
            ..left.clone()
        };
        assert!(WaterLandBorder::from_lines(&[right, left]).is_ok());
        let record = Record::new(Geometry::Polyline(Polyline::new(vec![])))
            .with(WLB_ID, FieldValue::Integer(3));
        assert!(BorderLine::from_record(&record).is_err());
    }

    #[test]
    fn element_area_and_shape() {
        let element = MeshElement {
            key: SectionKey::surveyed(1),
            element_id: 1,
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(0.0, 2.0, 0.0),
            ],
        };
        assert_eq!(element.shape(), ElementShape::Triangle);
        assert!((element.signed_area() - 2.0).abs() < 1e-6);
    }
}
