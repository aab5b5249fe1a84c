//! QR code generation for pairing payloads.
//!
//! Encoding is delegated to the `qrcode` crate. This module only keeps the
//! resulting module matrix (with a quiet zone) in a form the UI can paint
//! cell by cell, plus a few sizing helpers.

use std::fmt;
use std::sync::Arc;

use qrcode::{Color, EcLevel, QrCode};
use thiserror::Error;

/// Light modules added around the symbol on every side.
pub const QUIET_ZONE: usize = 2;

/// Errors that can occur while generating a QR code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QrError {
    /// Nothing to encode.
    #[error("cannot encode an empty payload")]
    EmptyPayload,

    /// The QR library rejected the data (usually because it is too long).
    #[error("failed to encode QR code: {0}")]
    Encode(Arc<str>),
}

/// A square matrix of dark/light modules, quiet zone included.
///
/// Cloning is cheap; the module grid is shared.
#[derive(Clone, PartialEq, Eq)]
pub struct QrMatrix {
    width: usize,
    modules: Arc<[bool]>,
}

impl QrMatrix {
    /// Encodes `data` at error correction level L.
    pub fn encode(data: &str) -> Result<Self, QrError> {
        if data.is_empty() {
            return Err(QrError::EmptyPayload);
        }

        let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
            .map_err(|e| QrError::Encode(Arc::from(e.to_string())))?;

        let inner = code.width();
        let colors = code.to_colors();
        let width = inner + 2 * QUIET_ZONE;

        let mut modules = vec![false; width * width];
        for y in 0..inner {
            for x in 0..inner {
                if colors[y * inner + x] == Color::Dark {
                    modules[(y + QUIET_ZONE) * width + x + QUIET_ZONE] = true;
                }
            }
        }

        Ok(Self {
            width,
            modules: Arc::from(modules),
        })
    }

    /// Number of modules per side, quiet zone included.
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Whether the module at column `x`, row `y` is dark.
    /// Anything outside the matrix is light.
    #[inline]
    #[must_use]
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.width && self.modules[y * self.width + x]
    }

    /// Iterates over rows, each row yielding its modules left to right.
    pub fn rows(&self) -> impl Iterator<Item = &[bool]> + '_ {
        self.modules.chunks(self.width)
    }

    /// Pixel size of one module when scaling towards `target_px`.
    /// Never smaller than one pixel.
    #[inline]
    #[must_use]
    pub fn module_px(&self, target_px: u32) -> u32 {
        (target_px / self.width as u32).max(1)
    }

    /// Final edge length of the rendered image for `target_px`.
    #[inline]
    #[must_use]
    pub fn image_px(&self, target_px: u32) -> u32 {
        self.module_px(target_px) * self.width as u32
    }

    /// Renders the matrix with Unicode half blocks, two rows per line.
    ///
    /// Dark modules are drawn as blank cells so that the code scans on a
    /// dark terminal background.
    pub fn to_terminal_string(&self) -> String {
        let mut out = String::with_capacity((self.width + 1) * self.width.div_ceil(2) * 3);
        for y in (0..self.width).step_by(2) {
            for x in 0..self.width {
                let top = !self.is_dark(x, y);
                let bottom = y + 1 < self.width && !self.is_dark(x, y + 1);
                out.push(match (top, bottom) {
                    (true, true) => '█',
                    (true, false) => '▀',
                    (false, true) => '▄',
                    (false, false) => ' ',
                });
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Debug for QrMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QrMatrix")
            .field("width", &self.width)
            .finish_non_exhaustive()
    }
}
