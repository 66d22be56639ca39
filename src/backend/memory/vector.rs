use std::path::{Path, PathBuf};

use geo_types::Geometry;

use super::{MemoryBackend, StoredDataset};
use crate::backend::{Extent, FeatureRecord, FieldValue, VectorLayer, VectorSource};
use crate::errors::{ConformanceError, Result};
use crate::geometry::IntoGeometryNode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Real,
    String,
    Date,
    DateTime,
}

impl FieldType {
    fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (_, FieldValue::Null)
                | (FieldType::Integer, FieldValue::Integer(_))
                | (FieldType::Real, FieldValue::Real(_) | FieldValue::Integer(_))
                | (FieldType::String, FieldValue::String(_))
                | (FieldType::Date, FieldValue::Date(_))
                | (FieldType::DateTime, FieldValue::DateTime(..))
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefn {
    pub name: String,
    pub field_type: FieldType,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerData {
    pub name: String,
    /// Declared geometry type, e.g. `"Point"` or `"Multi Polygon"`.
    pub geometry_type: String,
    pub fields: Vec<FieldDefn>,
    pub features: Vec<FeatureRecord<Geometry<f64>>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorData {
    pub driver: String,
    pub layers: Vec<LayerData>,
}

/// Handle to an in-memory vector dataset.
///
/// Changes made through a writable handle are published when it is dropped.
#[derive(Debug)]
pub struct MemVector {
    backend: MemoryBackend,
    path: PathBuf,
    data: VectorData,
    writable: bool,
    dirty: bool,
}

impl MemVector {
    pub(super) fn new(
        backend: MemoryBackend,
        path: &Path,
        data: VectorData,
        writable: bool,
        dirty: bool,
    ) -> Self {
        Self {
            backend,
            path: path.to_path_buf(),
            data,
            writable,
            dirty,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn modify(&mut self, operation: &'static str) -> Result<&mut VectorData> {
        if !self.writable {
            return Err(ConformanceError::UnsupportedOperation {
                driver: self.data.driver.clone(),
                operation,
            });
        }
        self.dirty = true;
        Ok(&mut self.data)
    }

    /// Add a layer and return its index.
    pub fn create_layer(
        &mut self,
        name: &str,
        geometry_type: &str,
        fields: &[(&str, FieldType)],
    ) -> Result<usize> {
        let data = self.modify("create_layer")?;
        if data.layers.iter().any(|l| l.name == name) {
            return Err(ConformanceError::Backend {
                msg: format!("layer '{name}' already exists"),
            });
        }
        data.layers.push(LayerData {
            name: name.to_string(),
            geometry_type: geometry_type.to_string(),
            fields: fields
                .iter()
                .map(|(name, field_type)| FieldDefn {
                    name: name.to_string(),
                    field_type: *field_type,
                })
                .collect(),
            features: Vec::new(),
        });
        Ok(data.layers.len() - 1)
    }

    /// Append a feature to `layer` and return its fid.
    ///
    /// Fields left out are set to null.
    pub fn add_feature(
        &mut self,
        layer: usize,
        fields: &[(&str, FieldValue)],
        geometry: Option<Geometry<f64>>,
    ) -> Result<u64> {
        let data = self.modify("add_feature")?;
        let layer = data
            .layers
            .get_mut(layer)
            .ok_or_else(|| ConformanceError::Backend {
                msg: format!("no layer at index {layer}"),
            })?;

        for (name, value) in fields {
            let defn = layer
                .fields
                .iter()
                .find(|f| f.name == *name)
                .ok_or_else(|| ConformanceError::Backend {
                    msg: format!("layer '{}' has no field '{name}'", layer.name),
                })?;
            if !defn.field_type.accepts(value) {
                return Err(ConformanceError::Backend {
                    msg: format!(
                        "field '{name}' is {:?}, cannot hold {value:?}",
                        defn.field_type
                    ),
                });
            }
        }

        let fid = layer.features.len() as u64;
        let values = layer
            .fields
            .iter()
            .map(|defn| {
                let value = fields
                    .iter()
                    .find(|(name, _)| *name == defn.name)
                    .map(|(_, value)| value.clone())
                    .unwrap_or(FieldValue::Null);
                (defn.name.clone(), value)
            })
            .collect();
        layer.features.push(FeatureRecord {
            fid: Some(fid),
            fields: values,
            geometry,
            texts: Vec::new(),
        });
        Ok(fid)
    }

    /// Publish pending changes now rather than on drop.
    pub fn flush(&mut self) {
        if self.dirty {
            self.backend
                .publish(&self.path, StoredDataset::Vector(self.data.clone()));
            self.dirty = false;
        }
    }
}

impl Drop for MemVector {
    fn drop(&mut self) {
        self.flush();
    }
}

impl VectorSource for MemVector {
    type Geometry = Geometry<f64>;
    type Layer<'a> = MemLayer<'a>;

    fn description(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn driver_short_name(&self) -> String {
        self.data.driver.clone()
    }

    fn layer_count(&self) -> usize {
        self.data.layers.len()
    }

    fn layer(&self, index: usize) -> Result<MemLayer<'_>> {
        self.data
            .layers
            .get(index)
            .map(MemLayer::new)
            .ok_or_else(|| ConformanceError::Backend {
                msg: format!("no layer at index {index}"),
            })
    }

    fn layer_by_name(&self, name: &str) -> Result<MemLayer<'_>> {
        self.data
            .layers
            .iter()
            .find(|l| l.name == name)
            .map(MemLayer::new)
            .ok_or_else(|| ConformanceError::Backend {
                msg: format!("no layer named '{name}'"),
            })
    }
}

/// A layer of a [`MemVector`] with its own read cursor.
#[derive(Debug)]
pub struct MemLayer<'a> {
    data: &'a LayerData,
    cursor: usize,
}

impl<'a> MemLayer<'a> {
    fn new(data: &'a LayerData) -> Self {
        Self { data, cursor: 0 }
    }
}

impl VectorLayer for MemLayer<'_> {
    type Geometry = Geometry<f64>;

    fn name(&self) -> String {
        self.data.name.clone()
    }

    fn feature_count(&self) -> u64 {
        self.data.features.len() as u64
    }

    fn geometry_type_name(&self) -> String {
        self.data.geometry_type.clone()
    }

    fn field_count(&self) -> usize {
        self.data.fields.len()
    }

    fn extent(&self) -> Result<Extent> {
        let mut extent: Option<Extent> = None;
        for geometry in self.data.features.iter().filter_map(|f| f.geometry.as_ref()) {
            let node = geometry.to_geometry_node();
            for (x, y, _) in node.all_points() {
                let e = extent.get_or_insert(Extent {
                    min_x: *x,
                    max_x: *x,
                    min_y: *y,
                    max_y: *y,
                });
                e.min_x = e.min_x.min(*x);
                e.max_x = e.max_x.max(*x);
                e.min_y = e.min_y.min(*y);
                e.max_y = e.max_y.max(*y);
            }
        }
        extent.ok_or_else(|| ConformanceError::Backend {
            msg: format!("layer '{}' has no extent", self.data.name),
        })
    }

    fn reset_reading(&mut self) {
        self.cursor = 0;
    }

    fn next_feature(&mut self) -> Result<Option<FeatureRecord<Geometry<f64>>>> {
        let feature = self.data.features.get(self.cursor).cloned();
        if feature.is_some() {
            self.cursor += 1;
        }
        Ok(feature)
    }
}
