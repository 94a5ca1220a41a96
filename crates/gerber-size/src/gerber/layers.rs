use std::path::Path;

use serde::Serialize;

/// What role a fabrication file plays in the board stackup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LayerKind {
    Drills,
    Slots,
    CopperTop,
    CopperBottom,
    CopperInner1,
    CopperInner2,
    SolderMaskTop,
    SolderMaskBottom,
    PasteTop,
    PasteBottom,
    SilkscreenTop,
    SilkscreenBottom,
    BoardOutline,
    Unknown,
}

impl LayerKind {
    pub fn is_copper(self) -> bool {
        matches!(
            self,
            LayerKind::CopperTop
                | LayerKind::CopperBottom
                | LayerKind::CopperInner1
                | LayerKind::CopperInner2
        )
    }

    pub fn is_silkscreen(self) -> bool {
        matches!(self, LayerKind::SilkscreenTop | LayerKind::SilkscreenBottom)
    }

    /// Whether the layer's extent counts toward the board size when no
    /// outline is present.
    pub fn contributes_to_board(self) -> bool {
        !matches!(self, LayerKind::Drills | LayerKind::Unknown) && !self.is_silkscreen()
    }
}

/// Identify layer kind from the file extension (Protel naming).
///
/// The comparison is case-insensitive; a path without an extension is unknown.
pub fn identify_from_filename<P: AsRef<Path>>(path: P) -> LayerKind {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("txt") => LayerKind::Drills,
        Some("gml") => LayerKind::Slots,
        // Copper
        Some("gtl") => LayerKind::CopperTop,
        Some("gbl") => LayerKind::CopperBottom,
        Some("g1l") => LayerKind::CopperInner1,
        Some("g2l") => LayerKind::CopperInner2,
        // Solder mask
        Some("gts") => LayerKind::SolderMaskTop,
        Some("gbs") => LayerKind::SolderMaskBottom,
        // Paste
        Some("gtp") => LayerKind::PasteTop,
        Some("gbp") => LayerKind::PasteBottom,
        // Silkscreen
        Some("gto") => LayerKind::SilkscreenTop,
        Some("gbo") => LayerKind::SilkscreenBottom,
        // Board outline
        Some("goo") | Some("gko") | Some("gm1") => LayerKind::BoardOutline,
        _ => LayerKind::Unknown,
    }
}
