use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ErrorKind};
use crate::qr_code::ErrorCorrectionLevel;

/// Width of an ISO A4 page in points.
pub const A4_WIDTH: f32 = 595.28;
/// Height of an ISO A4 page in points.
pub const A4_HEIGHT: f32 = 841.89;

/// All the defaults of the composers and of the stamper, gathered in one immutable value
/// which is passed explicitly to every operation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Size of the pages created by the builder, of padding pages and of pages without explicit size.
    pub page_size: PageSize,
    pub qr: QrSettings,
    pub builder: BuilderLayout,
    pub elements: ElementDefaults,
}

impl Settings {
    /// Reads the settings from a JSON file, every omitted field keeps its default value.
    pub fn from_path(settings_path: &Path) -> Result<Settings, ContextError> {
        let settings_content = std::fs::read_to_string(settings_path).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Configuration,
                format!("Unable to read the configuration {:?}", settings_path),
                &error,
            )
        })?;
        let settings: Settings = serde_json::from_str(&settings_content).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Configuration,
                format!("Unable to parse the configuration {:?}", settings_path),
                &error,
            )
        })?;
        log::debug!("Loaded the configuration {:?}: {:?}", settings_path, settings);

        Ok(settings)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize {
            width: A4_WIDTH,
            height: A4_HEIGHT,
        }
    }
}

/// Geometry and appearance of the stamped QR codes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct QrSettings {
    /// Side of the square occupied by the modules, in points.
    pub size: f32,
    /// Distance of the default position from the right and bottom edges of the page.
    pub margin: f32,
    /// Extra white space around the modules, on every side of the backing plate.
    pub plate_padding: f32,
    pub plate_border_width: f32,
    pub plate_border_gray: f32,
    pub error_correction: ErrorCorrectionLevel,
}

impl Default for QrSettings {
    fn default() -> Self {
        QrSettings {
            size: 80.0,
            margin: 20.0,
            plate_padding: 5.0,
            plate_border_width: 0.5,
            plate_border_gray: 0.8,
            error_correction: ErrorCorrectionLevel::Medium,
        }
    }
}

/// Constants of the top-down layout used by the builder composer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BuilderLayout {
    pub left_margin: f32,
    /// The cursor starts this far below the top edge of the page.
    pub top_margin: f32,
    /// Lines of content are no longer emitted once the cursor goes below this height.
    pub bottom_limit: f32,
    pub title: TextStyle,
    pub subtitle: TextStyle,
    pub body: TextStyle,
}

impl Default for BuilderLayout {
    fn default() -> Self {
        BuilderLayout {
            left_margin: 50.0,
            top_margin: 60.0,
            bottom_limit: 60.0,
            title: TextStyle {
                font_size: 24.0,
                advance: 40.0,
                gray: 0.1,
                bold: true,
            },
            subtitle: TextStyle {
                font_size: 14.0,
                advance: 30.0,
                gray: 0.4,
                bold: false,
            },
            body: TextStyle {
                font_size: 12.0,
                advance: 18.0,
                gray: 0.2,
                bold: false,
            },
        }
    }
}

/// How one kind of builder text is drawn and how far it moves the cursor down.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub font_size: f32,
    pub advance: f32,
    pub gray: f32,
    pub bold: bool,
}

/// Values used by the JSON composer for the fields omitted from an element.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ElementDefaults {
    pub text_position: [f32; 2],
    pub font_size: f32,
    pub rect_position: [f32; 2],
    pub rect_size: [f32; 2],
    pub line_start: [f32; 2],
    pub line_end: [f32; 2],
    pub line_thickness: f32,
    pub circle_center: [f32; 2],
    pub circle_radius: f32,
    /// Color of every element without a `color` field, expressed in the 0-255 range.
    pub color: [f32; 3],
}

impl Default for ElementDefaults {
    fn default() -> Self {
        ElementDefaults {
            text_position: [50.0, 750.0],
            font_size: 12.0,
            rect_position: [0.0, 0.0],
            rect_size: [100.0, 50.0],
            line_start: [0.0, 0.0],
            line_end: [100.0, 0.0],
            line_thickness: 1.0,
            circle_center: [100.0, 100.0],
            circle_radius: 50.0,
            color: [0.0, 0.0, 0.0],
        }
    }
}
