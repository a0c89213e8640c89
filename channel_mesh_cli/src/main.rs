use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::AtomicBool;

use channel_mesh::{
    config::MeshConfig,
    cross_lines::create_cross_lines,
    elements::create_channel_mesh_elements,
    features::{Bank, BorderLine, CrossLine, CrossSection, MeshElement, SurveyedPoint, Vertex, WaterLandBorder},
    interpolation::interpolate_longitudinal_sections,
    io::GeoJsonStore,
    longitudinal::{connect_profiles, create_longitudinal_sections},
    orientation::{flip_line_direction, flip_line_numeration},
    pipeline::{CrossSectionSource, Pipeline, PipelineInputs},
    preparation::{
        bound_cross_sections_to_wlb, connect_cross_sections, orient_water_land_border, remove_duplicated_cross_sections,
        subdivide_water_land_border, ConnectPolicy,
    },
    quality::{check_channel_mesh_elements, QualityCriteria},
    store::{read_features, write_features, Feature},
    terrain::Tin,
    vertices::create_vertices,
    Result,
};
use clap::{Parser, Subcommand, ValueEnum};
use point_import::{read_point_file, read_surveyed_points, PointFileFormat};

/// Largest gap between successive points of one cross-section when the
/// points carry no grouping key.
const DEFAULT_MAX_DISTANCE: f64 = 10.0;

#[derive(Parser)]
#[command(name = "channel_mesh_cli", version, about = "Channel bed mesh generation")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Replace existing outputs instead of writing timestamped copies
    #[arg(long, global = true)]
    overwrite: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BankArg {
    Left,
    Right,
}

impl From<BankArg> for Bank {
    fn from(b: BankArg) -> Self {
        match b {
            BankArg::Left => Bank::Left,
            BankArg::Right => Bank::Right,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Connect surveyed points into cross-sections.
    ConnectCrossSections {
        points: PathBuf,
        output: PathBuf,
        #[arg(long, default_value = "pnezd")]
        format: PointFileFormat,
        /// Break sections where successive points are further apart, ignoring descriptions
        #[arg(long)]
        max_distance: Option<f64>,
    },
    /// Flip cross-sections that do not start on the selected bank.
    FlipDirection {
        input: PathBuf,
        /// Water-land border file
        reference: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum, default_value = "left")]
        bank: BankArg,
    },
    /// Reverse the numbering of cross-sections.
    FlipNumeration { input: PathBuf, output: PathBuf },
    /// Bound cross-sections to the water-land border and create intermediate cross-lines.
    CrossLines {
        sections: PathBuf,
        wlb: PathBuf,
        output: PathBuf,
        /// Distance between cross-lines; derived from the element count when omitted
        #[arg(long)]
        spacing: Option<f64>,
    },
    /// Create and interpolate longitudinal section points.
    LongitudinalSections {
        cross_lines: PathBuf,
        sections: PathBuf,
        wlb: PathBuf,
        output: PathBuf,
        /// Also write the longitudinal section lines
        #[arg(long)]
        lines_output: Option<PathBuf>,
    },
    /// Create mesh vertices and elements on a terrain point file. The
    /// surveyed rows of the cross-lines file serve as the bounded cross-sections.
    Mesh {
        cross_lines: PathBuf,
        terrain: PathBuf,
        vertices_output: PathBuf,
        elements_output: PathBuf,
        #[arg(long, default_value = "xyz")]
        terrain_format: PointFileFormat,
    },
    /// Check angles and areas of mesh elements and write a text report.
    CheckElements { elements: PathBuf, report: PathBuf },
    /// Run the whole pipeline into an output directory.
    Run {
        /// Surveyed cross-section points
        points: PathBuf,
        wlb: PathBuf,
        /// Foreshore terrain points
        foreshore: PathBuf,
        out_dir: PathBuf,
        #[arg(long, default_value = "pnezd")]
        format: PointFileFormat,
        #[arg(long, default_value = "xyz")]
        foreshore_format: PointFileFormat,
        /// Sections were numbered from downstream
        #[arg(long)]
        flip_numeration: bool,
    },
}

fn read<F: Feature>(path: &Path) -> Result<Vec<F>> {
    let (store, name) = GeoJsonStore::for_file(path)?;
    read_features(&store, &name)
}

fn write<F: Feature>(path: &Path, features: &[F], config: &MeshConfig) -> Result<()> {
    let (mut store, name) = GeoJsonStore::for_file(path)?;
    let handle = write_features(&mut store, &name, features, &config.output)?;
    println!("Wrote {}", store.path(&handle.name).display());
    Ok(())
}

fn load_config(cli: &Cli) -> Result<MeshConfig> {
    let mut config = match &cli.config {
        Some(path) => MeshConfig::load(path)?,
        None => MeshConfig::default(),
    };
    if cli.overwrite {
        config.output.overwrite = true;
    }
    config.validate()?;
    Ok(config)
}

/// Water-land border oriented downstream and the cross-sections bounded
/// to it, starting on the left bank.
fn prepared(sections: &Path, wlb: &Path) -> Result<(Vec<CrossSection>, WaterLandBorder)> {
    let sections: Vec<CrossSection> = read(sections)?;
    let borders: Vec<BorderLine> = read(wlb)?;
    let wlb = WaterLandBorder::from_lines(&borders)?;
    let wlb = orient_water_land_border(&wlb, &sections)?;
    let bounded = bound_cross_sections_to_wlb(&sections, &wlb)?;
    let bounded = flip_line_direction(&bounded, &wlb.lines(), |b: &BorderLine| b.bank == Bank::Left)?;
    Ok((bounded, wlb))
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    log::debug!("Using {config:?}");
    match cli.command {
        Commands::ConnectCrossSections {
            points,
            output,
            format,
            max_distance,
        } => {
            let points = read_surveyed_points(&points, format)?;
            let policy = match max_distance {
                Some(distance) => ConnectPolicy::ByMaxDistance(distance),
                None => ConnectPolicy::ByKey {
                    fallback_distance: DEFAULT_MAX_DISTANCE,
                },
            };
            let sections = connect_cross_sections(&points, policy)?;
            write(&output, &remove_duplicated_cross_sections(&sections), &config)
        }
        Commands::FlipDirection {
            input,
            reference,
            output,
            bank,
        } => {
            let lines: Vec<CrossLine> = read(&input)?;
            let borders: Vec<BorderLine> = read(&reference)?;
            let bank = Bank::from(bank);
            let flipped = flip_line_direction(&lines, &borders, |b: &BorderLine| b.bank == bank)?;
            write(&output, &flipped, &config)
        }
        Commands::FlipNumeration { input, output } => {
            let lines: Vec<CrossLine> = read(&input)?;
            write(&output, &flip_line_numeration(&lines), &config)
        }
        Commands::CrossLines {
            sections,
            wlb,
            output,
            spacing,
        } => {
            let (sections, wlb) = prepared(&sections, &wlb)?;
            let parts = subdivide_water_land_border(&wlb, &sections)?;
            let config = MeshConfig {
                cross_line_spacing: spacing.or(config.cross_line_spacing),
                ..config
            };
            config.validate()?;
            let lines = create_cross_lines(&sections, &parts, config.cross_line_policy())?;
            write(&output, &lines, &config)
        }
        Commands::LongitudinalSections {
            cross_lines,
            sections,
            wlb,
            output,
            lines_output,
        } => {
            let surveyed: Vec<_> = read::<CrossSection>(&sections)?
                .iter()
                .flat_map(|s| s.line.vertices.clone())
                .collect();
            let (sections, wlb) = prepared(&sections, &wlb)?;
            let parts = subdivide_water_land_border(&wlb, &sections)?;
            let cross_lines: Vec<CrossLine> = read(&cross_lines)?;
            let (points, lines) = create_longitudinal_sections(&cross_lines, config.profile_count, &parts)?;
            let interpolated = interpolate_longitudinal_sections(
                &points,
                &lines,
                &surveyed,
                &sections,
                config.height_assignment_method,
                config.interpolation_method,
            )?;
            write(&output, &interpolated, &config)?;
            if let Some(path) = lines_output {
                write(&path, &connect_profiles(&interpolated), &config)?;
            }
            Ok(())
        }
        Commands::Mesh {
            cross_lines,
            terrain,
            vertices_output,
            elements_output,
            terrain_format,
        } => {
            let cross_lines: Vec<CrossLine> = read(&cross_lines)?;
            let sections: Vec<CrossSection> = cross_lines.iter().filter(|l| l.key.is_surveyed()).cloned().collect();
            let terrain = Tin::from_points(read_point_file(&terrain, terrain_format)?.into_iter().map(|p| p.point).collect());
            let vertices: Vec<Vertex> = create_vertices(&cross_lines, &sections, &terrain, config.element_count_method)?;
            let elements = create_channel_mesh_elements(&vertices)?;
            write(&vertices_output, &vertices, &config)?;
            write(&elements_output, &elements, &config)
        }
        Commands::CheckElements { elements, report } => {
            let (_, name) = GeoJsonStore::for_file(&elements)?;
            let elements: Vec<MeshElement> = read(&elements)?;
            let criteria = QualityCriteria::from(&config);
            let quality = check_channel_mesh_elements(&elements, &criteria);
            let path = quality.write_report(&report, &name, &criteria, &config.output)?;
            println!("{} violations in {} elements", quality.violations.len(), quality.element_count);
            println!("Wrote {}", path.display());
            Ok(())
        }
        Commands::Run {
            points,
            wlb,
            foreshore,
            out_dir,
            format,
            foreshore_format,
            flip_numeration,
        } => {
            let points: Vec<SurveyedPoint> = read_surveyed_points(&points, format)?;
            let border_lines: Vec<BorderLine> = read(&wlb)?;
            let foreshore_points = read_point_file(&foreshore, foreshore_format)?
                .into_iter()
                .map(|p| p.point)
                .collect();
            let inputs = PipelineInputs {
                cross_sections: CrossSectionSource::Points {
                    points,
                    policy: ConnectPolicy::ByKey {
                        fallback_distance: DEFAULT_MAX_DISTANCE,
                    },
                },
                border_lines,
                foreshore_points,
                flip_numeration,
            };
            let mut store = GeoJsonStore::new(&out_dir)?;
            let cancel = AtomicBool::new(false);
            let output = Pipeline::new(config)
                .with_report(out_dir.join("mesh_quality.txt"))
                .run(&mut store, inputs, &cancel)?;
            for handle in &output.datasets {
                println!("Wrote {}", store.path(&handle.name).display());
            }
            if let Some(path) = output.report_path {
                println!("Wrote {}", path.display());
            }
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
