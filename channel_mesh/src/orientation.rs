//! Line orientation and section numbering.

use crate::error::{MeshError, Result};
use crate::features::{BorderLine, CrossLine, WlbPart};
use crate::geometry::{Polyline, XY_TOLERANCE};

/// A feature carrying a line geometry.
pub trait LineFeature: Clone {
    fn line(&self) -> &Polyline;

    fn with_line(&self, line: Polyline) -> Self;
}

impl LineFeature for Polyline {
    fn line(&self) -> &Polyline {
        self
    }

    fn with_line(&self, line: Polyline) -> Self {
        line
    }
}

impl LineFeature for CrossLine {
    fn line(&self) -> &Polyline {
        &self.line
    }

    fn with_line(&self, line: Polyline) -> Self {
        CrossLine::new(self.key, line)
    }
}

impl LineFeature for BorderLine {
    fn line(&self) -> &Polyline {
        &self.line
    }

    fn with_line(&self, line: Polyline) -> Self {
        BorderLine {
            bank: self.bank,
            line,
        }
    }
}

impl LineFeature for WlbPart {
    fn line(&self) -> &Polyline {
        &self.line
    }

    fn with_line(&self, line: Polyline) -> Self {
        WlbPart {
            section_id: self.section_id,
            bank: self.bank,
            line,
        }
    }
}

/// A feature numbered by `SECTIONID`.
pub trait SectionNumbered: Clone {
    fn section_id(&self) -> u32;

    fn with_section_id(&self, section_id: u32) -> Self;
}

impl SectionNumbered for CrossLine {
    fn section_id(&self) -> u32 {
        self.key.section_id
    }

    fn with_section_id(&self, section_id: u32) -> Self {
        let mut line = self.clone();
        line.key.section_id = section_id;
        line
    }
}

impl SectionNumbered for WlbPart {
    fn section_id(&self) -> u32 {
        self.section_id
    }

    fn with_section_id(&self, section_id: u32) -> Self {
        WlbPart {
            section_id,
            ..self.clone()
        }
    }
}

/// Reverses every adjusting line whose start point does not touch one of the
/// references picked by `reference_selector`. A start within [`XY_TOLERANCE`]
/// (1 cm) of a reference counts as touching.
pub fn flip_line_direction<T, R, F>(
    adjusting_lines: &[T],
    reference_lines: &[R],
    reference_selector: F,
) -> Result<Vec<T>>
where
    T: LineFeature,
    R: LineFeature,
    F: Fn(&R) -> bool,
{
    let references: Vec<&Polyline> = reference_lines
        .iter()
        .filter(|r| reference_selector(r))
        .map(LineFeature::line)
        .collect();
    if references.is_empty() {
        return Err(MeshError::topology(
            "flip line direction",
            "no reference feature matches the selection",
        ));
    }
    let touches = |line: &Polyline, first: bool| {
        let point = if first { line.start() } else { line.end() };
        point.map_or(false, |p| references.iter().any(|r| r.touches(p.xy(), XY_TOLERANCE)))
    };

    let mut flipped = 0;
    let corrected = adjusting_lines
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let line = feature.line();
            if line.len() < 2 || touches(line, true) {
                return feature.clone();
            }
            if !touches(line, false) {
                log::warn!("Line {i} touches the reference with neither end.");
            }
            flipped += 1;
            feature.with_line(line.reversed())
        })
        .collect();
    log::info!("Flipped {flipped} of {} lines.", adjusting_lines.len());
    Ok(corrected)
}

/// Reverses the section numbering (`new = max + 1 - old`), keeping the lines
/// in their given order.
pub fn flip_line_numeration<T: SectionNumbered>(lines: &[T]) -> Vec<T> {
    let Some(max_id) = lines.iter().map(SectionNumbered::section_id).max() else {
        return Vec::new();
    };
    log::debug!("Flip numeration of {} lines, highest id {max_id}.", lines.len());
    lines
        .iter()
        .map(|l| l.with_section_id(max_id + 1 - l.section_id()))
        .collect()
}
