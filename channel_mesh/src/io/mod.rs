//! GeoJSON backed feature store.
//!
//! Every dataset is one `<name>.geojson` FeatureCollection inside a directory.
//! The declared schema travels with the collection as a foreign member;
//! collections written by other tools get a schema inferred from their
//! first feature.

use std::fs;
use std::path::{Path, PathBuf};

use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue, Value};

use crate::error::{MeshError, Result};
use crate::geometry::{Point3, Polyline};
use crate::store::{
    DatasetHandle, FeatureStore, FieldDef, FieldMap, FieldType, FieldValue, Geometry, GeometryKind, Record, Schema,
};

/// Foreign member holding the dataset schema.
pub const SCHEMA_MEMBER: &str = "channel_mesh:schema";

const EXTENSION: &str = "geojson";

/// Directory of GeoJSON FeatureCollections.
#[derive(Debug, Clone)]
pub struct GeoJsonStore {
    root: PathBuf,
}

impl GeoJsonStore {
    /// Opens the store at `root`, creating the directory when missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding dataset `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{EXTENSION}"))
    }

    /// Store and dataset name for a `.geojson` file path.
    pub fn for_file(path: &Path) -> Result<(Self, String)> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| MeshError::store(path.display().to_string(), "path has no file name"))?;
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok((Self::new(root)?, name))
    }

    fn load(&self, name: &str) -> Result<(Schema, FeatureCollection)> {
        let path = self.path(name);
        if !path.exists() {
            return Err(MeshError::store(name, "dataset does not exist"));
        }
        let text = fs::read_to_string(&path)?;
        let collection = match text.parse::<GeoJson>() {
            Ok(GeoJson::FeatureCollection(collection)) => collection,
            Ok(_) => return Err(MeshError::store(name, "not a FeatureCollection")),
            Err(e) => return Err(MeshError::store(name, e.to_string())),
        };
        let schema = match collection.foreign_members.as_ref().and_then(|m| m.get(SCHEMA_MEMBER)) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => infer_schema(name, &collection)?,
        };
        Ok((schema, collection))
    }

    fn save(&self, name: &str, schema: &Schema, mut collection: FeatureCollection) -> Result<()> {
        let members = collection.foreign_members.get_or_insert_with(JsonObject::new);
        members.insert(SCHEMA_MEMBER.to_string(), serde_json::to_value(schema)?);
        let text = serde_json::to_string_pretty(&collection)?;
        fs::write(self.path(name), text)?;
        log::debug!("Saved {} features to {}.", collection.features.len(), self.path(name).display());
        Ok(())
    }
}

impl FeatureStore for GeoJsonStore {
    fn create(
        &mut self,
        name: &str,
        kind: GeometryKind,
        fields: &[FieldDef],
        spatial_reference: Option<&str>,
    ) -> Result<DatasetHandle> {
        if self.exists(name) {
            return Err(MeshError::store(name, "dataset already exists"));
        }
        let schema = Schema {
            kind,
            fields: fields.to_vec(),
            spatial_reference: spatial_reference.map(str::to_string),
        };
        let collection = FeatureCollection {
            bbox: None,
            features: Vec::new(),
            foreign_members: None,
        };
        self.save(name, &schema, collection)?;
        Ok(DatasetHandle {
            name: name.to_string(),
            kind,
        })
    }

    fn open(&self, name: &str) -> Result<DatasetHandle> {
        let (schema, _) = self.load(name)?;
        Ok(DatasetHandle {
            name: name.to_string(),
            kind: schema.kind,
        })
    }

    fn read(&self, handle: &DatasetHandle) -> Result<Vec<Record>> {
        let (schema, collection) = self.load(&handle.name)?;
        collection
            .features
            .iter()
            .enumerate()
            .map(|(i, feature)| {
                let geometry = feature
                    .geometry
                    .as_ref()
                    .ok_or_else(|| MeshError::store(&handle.name, format!("feature {i} has no geometry")))?;
                Ok(Record {
                    geometry: from_value(&handle.name, &geometry.value)?,
                    fields: from_properties(&schema, feature.properties.as_ref()),
                })
            })
            .collect()
    }

    fn write(&mut self, handle: &DatasetHandle, records: Vec<Record>) -> Result<()> {
        let (schema, mut collection) = self.load(&handle.name)?;
        schema.check(&handle.name, &records)?;
        collection.features.extend(records.iter().map(to_feature));
        self.save(&handle.name, &schema, collection)
    }

    fn delete(&mut self, handle: DatasetHandle) -> Result<()> {
        let path = self.path(&handle.name);
        if !path.exists() {
            return Err(MeshError::store(&handle.name, "dataset does not exist"));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }
}

fn position(p: &Point3) -> Vec<f64> {
    vec![p.x, p.y, p.z]
}

fn to_value(geometry: &Geometry) -> Value {
    match geometry {
        Geometry::Point(p) => Value::Point(position(p)),
        Geometry::Polyline(line) => Value::LineString(line.vertices.iter().map(position).collect()),
        Geometry::Polygon(ring) => {
            let mut closed: Vec<Vec<f64>> = ring.iter().map(position).collect();
            if let Some(first) = closed.first().cloned() {
                closed.push(first);
            }
            Value::Polygon(vec![closed])
        }
    }
}

fn to_feature(record: &Record) -> geojson::Feature {
    let properties: JsonObject = record
        .fields
        .iter()
        .map(|(name, value)| {
            let json = match value {
                FieldValue::Integer(v) => JsonValue::from(*v),
                FieldValue::Double(v) => JsonValue::from(*v),
                FieldValue::Text(v) => JsonValue::from(v.clone()),
                FieldValue::Null => JsonValue::Null,
            };
            (name.clone(), json)
        })
        .collect();
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(to_value(&record.geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn point3(dataset: &str, position: &[f64]) -> Result<Point3> {
    match position {
        [x, y] => Ok(Point3::new(*x, *y, 0.0)),
        [x, y, z, ..] => Ok(Point3::new(*x, *y, *z)),
        _ => Err(MeshError::store(dataset, format!("position with {} coordinates", position.len()))),
    }
}

fn from_value(dataset: &str, value: &Value) -> Result<Geometry> {
    match value {
        Value::Point(p) => Ok(Geometry::Point(point3(dataset, p)?)),
        Value::LineString(line) => {
            let vertices = line.iter().map(|p| point3(dataset, p)).collect::<Result<Vec<_>>>()?;
            Ok(Geometry::Polyline(Polyline::new(vertices)))
        }
        Value::Polygon(rings) => {
            let outer = rings
                .first()
                .ok_or_else(|| MeshError::store(dataset, "polygon without rings"))?;
            let mut ring = outer.iter().map(|p| point3(dataset, p)).collect::<Result<Vec<_>>>()?;
            if ring.len() > 1 && ring.first() == ring.last() {
                ring.pop();
            }
            Ok(Geometry::Polygon(ring))
        }
        _ => Err(MeshError::store(
            dataset,
            "only Point, LineString and Polygon geometries are supported",
        )),
    }
}

fn from_properties(schema: &Schema, properties: Option<&JsonObject>) -> FieldMap {
    let mut fields = FieldMap::new();
    let Some(properties) = properties else {
        return fields;
    };
    for def in &schema.fields {
        let Some(json) = properties.get(&def.name) else {
            continue;
        };
        let value = match (def.kind, json) {
            (_, JsonValue::Null) => FieldValue::Null,
            (FieldType::Integer, v) if v.is_i64() => v.as_i64().map_or(FieldValue::Null, FieldValue::Integer),
            (FieldType::Integer | FieldType::Double, v) if v.is_number() => {
                v.as_f64().map_or(FieldValue::Null, FieldValue::Double)
            }
            (_, JsonValue::String(s)) => FieldValue::Text(s.clone()),
            (_, other) => FieldValue::Text(other.to_string()),
        };
        fields.insert(def.name.clone(), value);
    }
    fields
}

/// Schema of a collection without a declared one: geometry kind and
/// property types of the first feature.
fn infer_schema(name: &str, collection: &FeatureCollection) -> Result<Schema> {
    let first = collection
        .features
        .first()
        .ok_or_else(|| MeshError::store(name, "empty collection without schema"))?;
    let kind = match first.geometry.as_ref().map(|g| &g.value) {
        Some(Value::Point(_)) => GeometryKind::Point,
        Some(Value::LineString(_)) => GeometryKind::Polyline,
        Some(Value::Polygon(_)) => GeometryKind::Polygon,
        _ => return Err(MeshError::store(name, "first feature has no supported geometry")),
    };
    let fields = first
        .properties
        .iter()
        .flatten()
        .map(|(key, value)| {
            let kind = if value.is_i64() {
                FieldType::Integer
            } else if value.is_number() {
                FieldType::Double
            } else {
                FieldType::Text
            };
            FieldDef::new(key, kind)
        })
        .collect();
    log::debug!("Inferred schema of {name}: {kind:?}.");
    Ok(Schema {
        kind,
        fields,
        spatial_reference: None,
    })
}
