//! Spatial feature store abstraction.
//!
//! Stages exchange datasets through [`FeatureStore`]; the core never touches a
//! file format directly. [`MemoryStore`] keeps everything in memory, the
//! GeoJSON backed store lives in [`crate::io`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::OutputSettings;
use crate::error::{MeshError, Result};
use crate::geometry::{Point3, Polyline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Polyline,
    Polygon,
}

/// Geometry of a single record. Polygon rings are stored open.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point3),
    Polyline(Polyline),
    Polygon(Vec<Point3>),
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::Polyline(_) => GeometryKind::Polyline,
            Geometry::Polygon(_) => GeometryKind::Polygon,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Double(f64),
    Text(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Double,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldType,
}

impl FieldDef {
    pub fn new(name: &str, kind: FieldType) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

pub type FieldMap = BTreeMap<String, FieldValue>;

/// A `(geometry, field_map)` tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub geometry: Geometry,
    pub fields: FieldMap,
}

impl Record {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            fields: FieldMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn integer(&self, name: &str) -> Result<i64> {
        match self.fields.get(name) {
            Some(FieldValue::Integer(v)) => Ok(*v),
            Some(FieldValue::Double(v)) if v.fract() == 0.0 => Ok(*v as i64),
            other => Err(field_error(name, "an integer", other)),
        }
    }

    /// Integer field that must fit an id.
    pub fn id(&self, name: &str) -> Result<u32> {
        let value = self.integer(name)?;
        u32::try_from(value)
            .map_err(|_| MeshError::store("record", format!("field {name} = {value} is not a valid id")))
    }

    /// Double field; `Null` and a missing field yield `None`.
    pub fn double(&self, name: &str) -> Result<Option<f64>> {
        match self.fields.get(name) {
            Some(FieldValue::Double(v)) => Ok(Some(*v)),
            Some(FieldValue::Integer(v)) => Ok(Some(*v as f64)),
            Some(FieldValue::Null) | None => Ok(None),
            other => Err(field_error(name, "a number", other)),
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn point(&self) -> Result<Point3> {
        match &self.geometry {
            Geometry::Point(p) => Ok(*p),
            other => Err(geometry_error(GeometryKind::Point, other)),
        }
    }

    pub fn polyline(&self) -> Result<&Polyline> {
        match &self.geometry {
            Geometry::Polyline(l) => Ok(l),
            other => Err(geometry_error(GeometryKind::Polyline, other)),
        }
    }

    pub fn polygon(&self) -> Result<&[Point3]> {
        match &self.geometry {
            Geometry::Polygon(ring) => Ok(ring),
            other => Err(geometry_error(GeometryKind::Polygon, other)),
        }
    }
}

fn field_error(name: &str, expected: &str, found: Option<&FieldValue>) -> MeshError {
    MeshError::store("record", format!("field {name} is not {expected}: {found:?}"))
}

fn geometry_error(expected: GeometryKind, found: &Geometry) -> MeshError {
    MeshError::store(
        "record",
        format!("expected {expected:?} geometry, found {:?}", found.kind()),
    )
}

/// Identifies a dataset inside a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHandle {
    pub name: String,
    pub kind: GeometryKind,
}

/// Declared shape of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub kind: GeometryKind,
    pub fields: Vec<FieldDef>,
    /// Opaque label; coordinate reference systems are not interpreted.
    pub spatial_reference: Option<String>,
}

impl Schema {
    /// Checks that `records` fit this schema.
    pub fn check(&self, dataset: &str, records: &[Record]) -> Result<()> {
        for (i, record) in records.iter().enumerate() {
            if record.geometry.kind() != self.kind {
                return Err(MeshError::store(
                    dataset,
                    format!(
                        "record {i} has {:?} geometry, dataset holds {:?}",
                        record.geometry.kind(),
                        self.kind
                    ),
                ));
            }
            for name in record.fields.keys() {
                if !self.fields.iter().any(|f| &f.name == name) {
                    return Err(MeshError::store(dataset, format!("record {i} has undeclared field {name}")));
                }
            }
        }
        Ok(())
    }
}

/// Abstract spatial feature store.
pub trait FeatureStore {
    fn create(
        &mut self,
        name: &str,
        kind: GeometryKind,
        fields: &[FieldDef],
        spatial_reference: Option<&str>,
    ) -> Result<DatasetHandle>;

    /// Handle of an existing dataset.
    fn open(&self, name: &str) -> Result<DatasetHandle>;

    fn read(&self, handle: &DatasetHandle) -> Result<Vec<Record>>;

    /// Appends `records` to the dataset.
    fn write(&mut self, handle: &DatasetHandle, records: Vec<Record>) -> Result<()>;

    fn delete(&mut self, handle: DatasetHandle) -> Result<()>;

    fn exists(&self, name: &str) -> bool;
}

/// Conversion between a domain type and a store record.
pub trait Feature: Sized {
    const KIND: GeometryKind;

    fn fields() -> Vec<FieldDef>;

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> Result<Self>;
}

/// Writes `features` into a fresh dataset and returns its handle. An existing
/// dataset is replaced or kept according to `output`.
pub fn write_features<F: Feature>(
    store: &mut dyn FeatureStore,
    name: &str,
    features: &[F],
    output: &OutputSettings,
) -> Result<DatasetHandle> {
    let exists = store.exists(name);
    let target = output.resolve_name(name, exists);
    if store.exists(&target) {
        let old = store.open(&target)?;
        store.delete(old)?;
    }
    let handle = store.create(&target, F::KIND, &F::fields(), None)?;
    store.write(&handle, features.iter().map(F::to_record).collect())?;
    log::info!("Wrote {} features to {}.", features.len(), target);
    Ok(handle)
}

pub fn read_features<F: Feature>(store: &dyn FeatureStore, name: &str) -> Result<Vec<F>> {
    let handle = store.open(name)?;
    if handle.kind != F::KIND {
        return Err(MeshError::store(
            name,
            format!("holds {:?} geometry, expected {:?}", handle.kind, F::KIND),
        ));
    }
    store.read(&handle)?.iter().map(F::from_record).collect()
}

/// In-memory feature store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    datasets: BTreeMap<String, (Schema, Vec<Record>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all datasets, sorted.
    pub fn names(&self) -> Vec<String> {
        self.datasets.keys().cloned().collect()
    }
}

impl FeatureStore for MemoryStore {
    fn create(
        &mut self,
        name: &str,
        kind: GeometryKind,
        fields: &[FieldDef],
        spatial_reference: Option<&str>,
    ) -> Result<DatasetHandle> {
        if self.datasets.contains_key(name) {
            return Err(MeshError::store(name, "dataset already exists"));
        }
        let schema = Schema {
            kind,
            fields: fields.to_vec(),
            spatial_reference: spatial_reference.map(str::to_string),
        };
        self.datasets.insert(name.to_string(), (schema, Vec::new()));
        Ok(DatasetHandle {
            name: name.to_string(),
            kind,
        })
    }

    fn open(&self, name: &str) -> Result<DatasetHandle> {
        self.datasets
            .get(name)
            .map(|(schema, _)| DatasetHandle {
                name: name.to_string(),
                kind: schema.kind,
            })
            .ok_or_else(|| MeshError::store(name, "dataset does not exist"))
    }

    fn read(&self, handle: &DatasetHandle) -> Result<Vec<Record>> {
        self.datasets
            .get(&handle.name)
            .map(|(_, records)| records.clone())
            .ok_or_else(|| MeshError::store(&handle.name, "dataset does not exist"))
    }

    fn write(&mut self, handle: &DatasetHandle, records: Vec<Record>) -> Result<()> {
        let (schema, stored) = self
            .datasets
            .get_mut(&handle.name)
            .ok_or_else(|| MeshError::store(&handle.name, "dataset does not exist"))?;
        schema.check(&handle.name, &records)?;
        stored.extend(records);
        Ok(())
    }

    fn delete(&mut self, handle: DatasetHandle) -> Result<()> {
        self.datasets
            .remove(&handle.name)
            .map(|_| ())
            .ok_or_else(|| MeshError::store(&handle.name, "dataset does not exist"))
    }

    fn exists(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_fields() -> Vec<FieldDef> {
        vec![FieldDef::new("VERTEXID", FieldType::Integer)]
    }

    #[test]
    fn create_write_read_delete() {
        let mut store = MemoryStore::new();
        let handle = store
            .create("pts", GeometryKind::Point, &point_fields(), Some("EPSG:25832"))
            .unwrap();
        let record = Record::new(Geometry::Point(Point3::new(1.0, 2.0, 3.0)))
            .with("VERTEXID", FieldValue::Integer(4));
        store.write(&handle, vec![record.clone()]).unwrap();
        let records = store.read(&handle).unwrap();
        assert_eq!(records, vec![record]);
        assert_eq!(records[0].id("VERTEXID").unwrap(), 4);
        assert!(store.exists("pts"));
        store.delete(handle).unwrap();
        assert!(!store.exists("pts"));
    }

    #[test]
    fn rejects_records_outside_schema() {
        let mut store = MemoryStore::new();
        let handle = store
            .create("pts", GeometryKind::Point, &point_fields(), None)
            .unwrap();
        let wrong_field = Record::new(Geometry::Point(Point3::new(0.0, 0.0, 0.0)))
            .with("OTHER", FieldValue::Integer(1));
        assert!(matches!(
            store.write(&handle, vec![wrong_field]),
            Err(MeshError::Store { .. })
        ));
        let wrong_kind = Record::new(Geometry::Polyline(Polyline::new(vec![])));
        assert!(store.write(&handle, vec![wrong_kind]).is_err());
        assert!(store.create("pts", GeometryKind::Point, &[], None).is_err());
    }

    #[test]
    fn record_field_access() {
        let record = Record::new(Geometry::Point(Point3::new(0.0, 0.0, 0.0)))
            .with("Z", FieldValue::Null)
            .with("KEY", FieldValue::Text("P1".into()))
            .with("SECTIONID", FieldValue::Integer(-1));
        assert_eq!(record.double("Z").unwrap(), None);
        assert_eq!(record.text("KEY"), Some("P1"));
        assert!(record.id("SECTIONID").is_err());
        assert!(record.integer("MISSING").is_err());
        assert!(record.polyline().is_err());
    }
}
