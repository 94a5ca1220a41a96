use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::SizeError;
use crate::gerber::coord::Units;
use crate::gerber::layers::{identify_from_filename, LayerKind};
use crate::types::{extend, BoundingBox, SizeResult};

/// Measured extent of one fabrication file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSize {
    pub path: PathBuf,
    pub kind: LayerKind,
    /// `None` for drill and unrecognized files, files without geometry and
    /// silkscreens that failed to measure. Always millimeters.
    pub size: Option<SizeResult>,
}

/// Board size aggregated over a set of layer files, in millimeters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSize {
    pub size: SizeResult,
    pub copper_layers: usize,
    pub layers: Vec<LayerSize>,
}

/// Measure every file and combine them into one board size.
///
/// The first board outline with geometry decides the size. Without one the
/// size is the union of every copper, mask, paste and slot layer. Drill,
/// silkscreen and unrecognized files never contribute; unrecognized files are
/// not read at all and a silkscreen that fails to measure is skipped.
pub fn measure_board<P: AsRef<Path>>(paths: &[P]) -> Result<BoardSize, SizeError> {
    let mut layers = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let kind = identify_from_filename(path);
        let size = match kind {
            LayerKind::Drills | LayerKind::Unknown => None,
            _ => match crate::measure_file(path) {
                Ok(size) => Some(size.to_millimeters()),
                Err(SizeError::NoGeometry) => {
                    debug!("{}: no geometry, skipped", path.display());
                    None
                }
                Err(e) if !kind.contributes_to_board() => {
                    warn!("{}: {e}, skipped", path.display());
                    None
                }
                Err(e) => return Err(e),
            },
        };
        layers.push(LayerSize {
            path: path.to_path_buf(),
            kind,
            size,
        });
    }

    let copper_layers = layers.iter().filter(|l| l.kind.is_copper()).count();
    let size = board_extent(&layers)?;
    info!(
        "board: {:.3} x {:.3} mm from {} files ({} copper)",
        size.x,
        size.y,
        layers.len(),
        copper_layers
    );

    Ok(BoardSize {
        size,
        copper_layers,
        layers,
    })
}

fn board_extent(layers: &[LayerSize]) -> Result<SizeResult, SizeError> {
    let outline = layers
        .iter()
        .filter(|l| l.kind == LayerKind::BoardOutline)
        .find_map(|l| l.size);
    if let Some(size) = outline {
        return Ok(size);
    }

    let mut bbox: Option<BoundingBox> = None;
    for layer in layers.iter().filter(|l| l.kind.contributes_to_board()) {
        if let Some(size) = layer.size {
            extend(&mut bbox, size.bounding_box());
        }
    }
    let b = bbox.ok_or(SizeError::NoGeometry)?;

    Ok(SizeResult {
        x: b.width(),
        y: b.height(),
        min_x: b.min_x,
        max_x: b.max_x,
        min_y: b.min_y,
        max_y: b.max_y,
        units: Units::Millimeters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(kind: LayerKind, min: (f64, f64), max: (f64, f64)) -> LayerSize {
        LayerSize {
            path: PathBuf::from("board"),
            kind,
            size: Some(SizeResult {
                x: max.0 - min.0,
                y: max.1 - min.1,
                min_x: min.0,
                max_x: max.0,
                min_y: min.1,
                max_y: max.1,
                units: Units::Millimeters,
            }),
        }
    }

    #[test]
    fn test_outline_wins() {
        let layers = vec![
            layer(LayerKind::CopperTop, (-5.0, -5.0), (60.0, 40.0)),
            layer(LayerKind::BoardOutline, (0.0, 0.0), (50.0, 30.0)),
        ];
        let size = board_extent(&layers).unwrap();
        assert_eq!(size.x, 50.0);
        assert_eq!(size.y, 30.0);
    }

    #[test]
    fn test_union_without_outline() {
        let layers = vec![
            layer(LayerKind::CopperTop, (0.0, 0.0), (10.0, 5.0)),
            layer(LayerKind::SolderMaskBottom, (-2.0, 1.0), (8.0, 7.0)),
            layer(LayerKind::SilkscreenTop, (-50.0, -50.0), (50.0, 50.0)),
            layer(LayerKind::Unknown, (-50.0, -50.0), (50.0, 50.0)),
        ];
        let size = board_extent(&layers).unwrap();
        assert_eq!(size.bounding_box(), BoundingBox {
            min_x: -2.0,
            max_x: 10.0,
            min_y: 0.0,
            max_y: 7.0,
        });
        assert_eq!(size.x, 12.0);
        assert_eq!(size.y, 7.0);
    }

    #[test]
    fn test_empty_outline_falls_back_to_union() {
        let mut outline = layer(LayerKind::BoardOutline, (0.0, 0.0), (1.0, 1.0));
        outline.size = None;
        let layers = vec![outline, layer(LayerKind::CopperBottom, (0.0, 0.0), (3.0, 4.0))];
        assert_eq!(board_extent(&layers).unwrap().x, 3.0);
    }

    #[test]
    fn test_nothing_contributes() {
        let layers = vec![layer(LayerKind::SilkscreenTop, (0.0, 0.0), (1.0, 1.0))];
        assert!(matches!(board_extent(&layers), Err(SizeError::NoGeometry)));
        assert!(matches!(board_extent(&[]), Err(SizeError::NoGeometry)));
    }
}
