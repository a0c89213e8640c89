//! Runs every stage from surveyed input to checked mesh elements.
//!
//! Each stage consumes the full output of its predecessor and writes a fresh
//! dataset into the feature store. Cancellation is honoured between stages.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{MeshConfig, OutputSettings};
use crate::cross_lines::create_cross_lines;
use crate::elements::create_channel_mesh_elements;
use crate::error::{MeshError, Result};
use crate::features::{
    Bank, BorderLine, CrossLine, CrossSection, MeshElement, StreamPolygon, SurveyedPoint, Vertex, WaterLandBorder,
};
use crate::geometry::Point3;
use crate::interpolation::interpolate_longitudinal_sections;
use crate::longitudinal::create_longitudinal_sections;
use crate::orientation::{flip_line_direction, flip_line_numeration};
use crate::preparation::{
    bound_cross_sections_to_wlb, connect_cross_sections, orient_water_land_border, remove_duplicated_cross_sections,
    stream_polygon, subdivide_water_land_border, ConnectPolicy,
};
use crate::quality::{check_channel_mesh_elements, QualityCriteria, QualityReport};
use crate::store::{write_features, DatasetHandle, Feature, FeatureStore};
use crate::terrain::{create_dtmw, Tin};
use crate::vertices::create_vertices;

/// Dataset names written by [`Pipeline::run`].
pub mod datasets {
    pub const CROSS_SECTIONS: &str = "cross_sections";
    pub const WATER_LAND_BORDER: &str = "water_land_border";
    pub const WLB_PARTS: &str = "water_land_border_parts";
    pub const STREAM_POLYGON: &str = "stream_polygon";
    pub const CROSS_LINES: &str = "cross_lines";
    pub const LONGITUDINAL_SECTION_POINTS: &str = "longitudinal_section_points";
    pub const LONGITUDINAL_SECTIONS: &str = "longitudinal_sections";
    pub const DTM_CHANNEL: &str = "dtm_channel";
    pub const DTM_WATERCOURSE: &str = "dtm_watercourse";
    pub const MESH_VERTICES: &str = "mesh_vertices";
    pub const MESH_ELEMENTS: &str = "mesh_elements";
}

/// Where the surveyed cross-sections come from.
#[derive(Debug, Clone)]
pub enum CrossSectionSource {
    /// Surveyed points still to be connected.
    Points {
        points: Vec<SurveyedPoint>,
        policy: ConnectPolicy,
    },
    /// Ready cross-section lines; their vertices double as surveyed points.
    Lines(Vec<CrossSection>),
}

#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub cross_sections: CrossSectionSource,
    /// Left (`WLBID` 1) and right (`WLBID` 2) water-land border.
    pub border_lines: Vec<BorderLine>,
    /// Terrain points of the foreshore.
    pub foreshore_points: Vec<Point3>,
    /// Reverse the section numbering when the sections were surveyed
    /// from downstream.
    pub flip_numeration: bool,
}

#[derive(Debug)]
pub struct PipelineOutput {
    /// Handles of the datasets written, in stage order.
    pub datasets: Vec<DatasetHandle>,
    pub cross_lines: Vec<CrossLine>,
    pub vertices: Vec<Vertex>,
    pub elements: Vec<MeshElement>,
    pub quality: QualityReport,
    /// Text report, when one was requested.
    pub report_path: Option<PathBuf>,
}

/// Configured pipeline.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: MeshConfig,
    report_path: Option<PathBuf>,
}

/// Store access and cancellation shared by the stages of one run.
struct Run<'a> {
    store: &'a mut dyn FeatureStore,
    cancel: &'a AtomicBool,
    output: OutputSettings,
    written: Vec<DatasetHandle>,
}

impl Run<'_> {
    fn stage(&self, stage: &'static str) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            log::warn!("Pipeline cancelled before {stage}.");
            return Err(MeshError::Cancelled { stage });
        }
        log::info!("Stage: {stage}.");
        Ok(())
    }

    fn write<F: Feature>(&mut self, name: &str, features: &[F]) -> Result<()> {
        let handle = write_features(&mut *self.store, name, features, &self.output)?;
        self.written.push(handle);
        Ok(())
    }
}

impl Pipeline {
    pub fn new(config: MeshConfig) -> Self {
        Self {
            config,
            report_path: None,
        }
    }

    /// Also write the quality report as text to `path`.
    pub fn with_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Executes all stages. The configuration is validated before any
    /// geometry is processed; `cancel` is polled between stages.
    pub fn run(
        &self,
        store: &mut dyn FeatureStore,
        inputs: PipelineInputs,
        cancel: &AtomicBool,
    ) -> Result<PipelineOutput> {
        self.config.validate()?;
        let config = &self.config;
        let mut run = Run {
            store,
            cancel,
            output: config.output,
            written: Vec::new(),
        };

        run.stage("connect cross sections")?;
        let (sections, surveyed_points) = match inputs.cross_sections {
            CrossSectionSource::Points { points, policy } => {
                let sections = connect_cross_sections(&points, policy)?;
                (sections, points.iter().map(|p| p.point).collect::<Vec<_>>())
            }
            CrossSectionSource::Lines(lines) => {
                let points = lines.iter().flat_map(|l| l.line.vertices.iter().copied()).collect();
                (lines, points)
            }
        };

        run.stage("prepare cross sections")?;
        let sections = if inputs.flip_numeration {
            flip_line_numeration(&sections)
        } else {
            sections
        };
        let sections = remove_duplicated_cross_sections(&sections);
        let wlb = WaterLandBorder::from_lines(&inputs.border_lines)?;
        let wlb = orient_water_land_border(&wlb, &sections)?;
        let sections = bound_cross_sections_to_wlb(&sections, &wlb)?;
        let sections = flip_line_direction(&sections, &wlb.lines(), |b: &BorderLine| b.bank == Bank::Left)?;
        run.write(datasets::CROSS_SECTIONS, &sections)?;
        run.write(datasets::WATER_LAND_BORDER, &wlb.lines())?;

        run.stage("subdivide water land border")?;
        let parts = subdivide_water_land_border(&wlb, &sections)?;
        let polygon = stream_polygon(&parts)?;
        run.write(datasets::WLB_PARTS, &parts)?;
        run.write(
            datasets::STREAM_POLYGON,
            &[StreamPolygon {
                ring: polygon.clone(),
            }],
        )?;

        run.stage("create cross lines")?;
        let cross_lines = create_cross_lines(&sections, &parts, config.cross_line_policy())?;
        run.write(datasets::CROSS_LINES, &cross_lines)?;

        run.stage("create longitudinal sections")?;
        let (profile_points, profile_lines) =
            create_longitudinal_sections(&cross_lines, config.profile_count, &parts)?;
        run.write(datasets::LONGITUDINAL_SECTION_POINTS, &profile_points)?;
        run.write(datasets::LONGITUDINAL_SECTIONS, &profile_lines)?;

        run.stage("interpolate longitudinal sections")?;
        let interpolated = interpolate_longitudinal_sections(
            &profile_points,
            &profile_lines,
            &surveyed_points,
            &sections,
            config.height_assignment_method,
            config.interpolation_method,
        )?;
        run.write(datasets::DTM_CHANNEL, &interpolated)?;
        let channel: Vec<Point3> = interpolated.iter().filter_map(|p| p.point3()).collect();

        run.stage("create dtmw")?;
        let dtmw = create_dtmw(&channel, &inputs.foreshore_points, &polygon, config.dtmw_buffer);
        let dtmw_features: Vec<SurveyedPoint> = dtmw.iter().map(|p| SurveyedPoint::new(*p, None)).collect();
        run.write(datasets::DTM_WATERCOURSE, &dtmw_features)?;
        let terrain = Tin::from_points(dtmw);

        run.stage("create vertices")?;
        let vertices = create_vertices(&cross_lines, &sections, &terrain, config.element_count_method)?;
        run.write(datasets::MESH_VERTICES, &vertices)?;

        run.stage("create mesh elements")?;
        let elements = create_channel_mesh_elements(&vertices)?;
        run.write(datasets::MESH_ELEMENTS, &elements)?;

        run.stage("check mesh elements")?;
        let criteria = QualityCriteria::from(config);
        let quality = check_channel_mesh_elements(&elements, &criteria);
        let report_path = match &self.report_path {
            Some(path) => Some(quality.write_report(path, datasets::MESH_ELEMENTS, &criteria, &config.output)?),
            None => None,
        };

        log::info!(
            "Pipeline finished: {} cross lines, {} vertices, {} elements.",
            cross_lines.len(),
            vertices.len(),
            elements.len()
        );
        Ok(PipelineOutput {
            datasets: run.written,
            cross_lines,
            vertices,
            elements,
            quality,
            report_path,
        })
    }
}
