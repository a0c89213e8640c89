//! Error type shared by every pipeline stage.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Failures that abort a pipeline stage.
///
/// Quality violations are not errors; they end up in a
/// [`QualityReport`](crate::quality::QualityReport).
#[derive(Error, Debug)]
pub enum MeshError {
    /// Bracketing features are missing, misordered or mismatched.
    #[error("topology error in {context} (section {section_id:?}, intermediate {intermediate_id:?}): {details}")]
    Topology {
        context: &'static str,
        section_id: Option<u32>,
        intermediate_id: Option<u32>,
        details: String,
    },

    /// A profile point has no elevation-bearing neighbour on one side.
    #[error("no elevation to interpolate from on profile {relative_position} at section {section_id}, intermediate {intermediate_id}")]
    InterpolationGap {
        relative_position: usize,
        section_id: u32,
        intermediate_id: u32,
    },

    #[error("invalid configuration for {parameter}: {details}")]
    Configuration {
        parameter: &'static str,
        details: String,
    },

    /// The terrain surface has no elevation below a vertex.
    #[error("terrain has no elevation at ({x:.3}, {y:.3}) for vertex {vertex_id} of section {section_id}, intermediate {intermediate_id}")]
    TerrainGap {
        section_id: u32,
        intermediate_id: u32,
        vertex_id: u32,
        x: f64,
        y: f64,
    },

    #[error("pipeline cancelled before {stage}")]
    Cancelled { stage: &'static str },

    #[error("feature store error on dataset {dataset}: {details}")]
    Store { dataset: String, details: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MeshError {
    /// Topology error without identifying ids.
    pub fn topology(context: &'static str, details: impl Into<String>) -> Self {
        MeshError::Topology {
            context,
            section_id: None,
            intermediate_id: None,
            details: details.into(),
        }
    }

    /// Topology error located at a cross-line.
    pub fn topology_at(
        context: &'static str,
        section_id: u32,
        intermediate_id: u32,
        details: impl Into<String>,
    ) -> Self {
        MeshError::Topology {
            context,
            section_id: Some(section_id),
            intermediate_id: Some(intermediate_id),
            details: details.into(),
        }
    }

    pub fn configuration(parameter: &'static str, details: impl Into<String>) -> Self {
        MeshError::Configuration {
            parameter,
            details: details.into(),
        }
    }

    pub fn store(dataset: impl Into<String>, details: impl Into<String>) -> Self {
        MeshError::Store {
            dataset: dataset.into(),
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_message_names_ids() {
        let err = MeshError::topology_at("mesh elements", 3, 2, "row counts 9 and 5 differ by 4");
        let msg = err.to_string();
        assert!(msg.contains("section Some(3)"));
        assert!(msg.contains("intermediate Some(2)"));
        assert!(msg.contains("differ by 4"));
    }

    #[test]
    fn io_errors_convert() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(MeshError::Io(_))));
    }
}
