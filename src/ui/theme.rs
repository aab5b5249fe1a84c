//! Application theme - light background with a dark QR code.

use gpui::*;

/// The application's theme.
pub struct Theme {
    /// Window background.
    pub background: Hsla,
    /// Primary text and dark QR modules.
    pub foreground: Hsla,
    /// Secondary text.
    pub muted: Hsla,
    /// Card and button surfaces.
    pub surface: Hsla,
    /// Paired / connected status.
    pub success: Hsla,
    /// Error status.
    pub error: Hsla,
}

impl Theme {
    pub fn light() -> Self {
        Self {
            background: hsla(0.0, 0.0, 0.98, 1.0),
            foreground: hsla(0.0, 0.0, 0.0, 1.0),
            muted: hsla(0.0, 0.0, 0.45, 1.0),
            surface: hsla(0.0, 0.0, 0.92, 1.0),
            success: hsla(0.37, 0.62, 0.33, 1.0),
            error: hsla(0.0, 0.7, 0.45, 1.0),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::light()
    }
}

impl Global for Theme {}
