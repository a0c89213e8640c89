//! Loader for delimited survey point files.
//!
//! Returns `(x, y, z, optional grouping key)` records; the grouping key is the
//! point description and links the points of one cross-section.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use channel_mesh::features::SurveyedPoint;
use channel_mesh::geometry::Point3;

/// Survey point with optional point number and description.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyPoint {
    pub number: Option<u32>,
    pub point: Point3,
    pub description: Option<String>,
}

impl SurveyPoint {
    /// Key grouping the point into a cross-section.
    pub fn grouping_key(&self) -> Option<&str> {
        self.description.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }
}

impl From<SurveyPoint> for SurveyedPoint {
    fn from(p: SurveyPoint) -> Self {
        let key = p.grouping_key().map(str::to_string);
        SurveyedPoint::new(p.point, key)
    }
}

/// Decimal separator of XYZ files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecimalSeparator {
    #[default]
    Point,
    Comma,
}

/// Column layouts of supported point files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointFileFormat {
    PNEZD,
    PENZD,
    PNEZ,
    PENZ,
    NEZ,
    ENZ,
    NEZD,
    ENZD,
    /// `x y z`, whitespace or semicolon separated.
    XYZ(DecimalSeparator),
}

/// Column positions of one layout.
struct Layout {
    number: Option<usize>,
    east: usize,
    north: usize,
    elevation: usize,
    description: Option<usize>,
}

impl PointFileFormat {
    fn layout(self) -> Layout {
        let (number, east, north, elevation, description) = match self {
            PointFileFormat::PNEZD => (Some(0), 2, 1, 3, Some(4)),
            PointFileFormat::PENZD => (Some(0), 1, 2, 3, Some(4)),
            PointFileFormat::PNEZ => (Some(0), 2, 1, 3, None),
            PointFileFormat::PENZ => (Some(0), 1, 2, 3, None),
            PointFileFormat::NEZ => (None, 1, 0, 2, None),
            PointFileFormat::ENZ | PointFileFormat::XYZ(_) => (None, 0, 1, 2, None),
            PointFileFormat::NEZD => (None, 1, 0, 2, Some(3)),
            PointFileFormat::ENZD => (None, 0, 1, 2, Some(3)),
        };
        Layout {
            number,
            east,
            north,
            elevation,
            description,
        }
    }

    /// Fields needed before the optional trailing description.
    fn required_fields(self) -> usize {
        let layout = self.layout();
        let coordinates = layout.elevation.max(layout.east).max(layout.north) + 1;
        match layout.description {
            // NEZD and ENZD always carry a description
            Some(d) if layout.number.is_none() => d + 1,
            _ => coordinates,
        }
    }
}

impl FromStr for PointFileFormat {
    type Err = String;

    /// Case insensitive; `xyz` uses a decimal point, `xyz-comma` a comma.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pnezd" => Ok(Self::PNEZD),
            "penzd" => Ok(Self::PENZD),
            "pnez" => Ok(Self::PNEZ),
            "penz" => Ok(Self::PENZ),
            "nez" => Ok(Self::NEZ),
            "enz" => Ok(Self::ENZ),
            "nezd" => Ok(Self::NEZD),
            "enzd" => Ok(Self::ENZD),
            "xyz" => Ok(Self::XYZ(DecimalSeparator::Point)),
            "xyz-comma" => Ok(Self::XYZ(DecimalSeparator::Comma)),
            other => Err(format!("unknown point file format '{other}'")),
        }
    }
}

impl fmt::Display for PointFileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointFileFormat::XYZ(DecimalSeparator::Point) => write!(f, "xyz"),
            PointFileFormat::XYZ(DecimalSeparator::Comma) => write!(f, "xyz-comma"),
            other => write!(f, "{}", format!("{other:?}").to_ascii_lowercase()),
        }
    }
}

fn invalid(line: usize, message: impl fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("line {line}: {message}"))
}

fn split_fields(line: &str, format: PointFileFormat) -> Vec<&str> {
    match format {
        PointFileFormat::XYZ(_) => line
            .split(|c: char| c.is_whitespace() || c == ';')
            .filter(|f| !f.is_empty())
            .collect(),
        _ if line.contains(',') => line.split(',').map(str::trim).collect(),
        _ => line.split_whitespace().collect(),
    }
}

fn parse_coordinate(field: &str, format: PointFileFormat, line: usize) -> io::Result<f64> {
    let text = match format {
        PointFileFormat::XYZ(DecimalSeparator::Comma) => field.trim().replace(',', "."),
        _ => field.trim().to_string(),
    };
    text.parse::<f64>()
        .map_err(|e| invalid(line, format!("'{field}' is not a number ({e})")))
}

/// Parses one non-empty line.
fn parse_line(text: &str, format: PointFileFormat, line: usize) -> io::Result<SurveyPoint> {
    let fields = split_fields(text, format);
    let required = format.required_fields();
    if fields.len() < required {
        return Err(invalid(
            line,
            format!("{format} needs {required} fields, found {}", fields.len()),
        ));
    }
    let layout = format.layout();
    let coordinate = |i: usize| parse_coordinate(fields[i], format, line);
    let description = layout
        .description
        .filter(|&d| fields.len() > d)
        .map(|d| fields[d..].join(" "));
    Ok(SurveyPoint {
        number: layout.number.and_then(|i| fields[i].trim().parse().ok()),
        point: Point3::new(coordinate(layout.east)?, coordinate(layout.north)?, coordinate(layout.elevation)?),
        description,
    })
}

/// Reads a survey point file using the specified [`PointFileFormat`].
/// Empty lines and lines starting with `#` are skipped.
pub fn read_point_file(path: impl AsRef<Path>, format: PointFileFormat) -> io::Result<Vec<SurveyPoint>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut points = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        points.push(parse_line(trimmed, format, i + 1)?);
    }
    log::info!("Read {} points from {} ({format}).", points.len(), path.display());
    Ok(points)
}

/// Reads a point file straight into surveyed points.
pub fn read_surveyed_points(path: impl AsRef<Path>, format: PointFileFormat) -> io::Result<Vec<SurveyedPoint>> {
    Ok(read_point_file(path, format)?.into_iter().map(SurveyedPoint::from).collect())
}
