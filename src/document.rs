use serde::{Deserialize, Serialize};

use crate::error::ContextError;
use crate::pdf::PdfDocument;

/// An RGB color with channels nominally between 0.0 and 1.0.
///
/// Channels are stored as given: values outside of the nominal range are neither clamped
/// nor rejected, PDF viewers clamp them when painting.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

impl Color {
    pub const BLACK: Color = Color::gray(0.0);
    pub const WHITE: Color = Color::gray(1.0);

    pub const fn new(red: f32, green: f32, blue: f32) -> Color {
        Color { red, green, blue }
    }

    /// A color with the same value on the three channels.
    pub const fn gray(level: f32) -> Color {
        Color::new(level, level, level)
    }

    /// Converts channels expressed between 0 and 255 by dividing them by 255.
    pub fn from_rgb255([red, green, blue]: [f32; 3]) -> Color {
        Color::new(red / 255.0, green / 255.0, blue / 255.0)
    }

    pub fn channels(&self) -> [f32; 3] {
        [self.red, self.green, self.blue]
    }
}

/// One of the two font faces available for text, both standard Helvetica faces
/// which PDF viewers provide without any embedding.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum FontFace {
    Regular,
    Bold,
}

impl FontFace {
    pub fn from_bold(bold: bool) -> FontFace {
        if bold {
            FontFace::Bold
        } else {
            FontFace::Regular
        }
    }

    /// The PostScript name of the standard font backing the face.
    pub fn base_font(self) -> &'static str {
        match self {
            FontFace::Regular => "Helvetica",
            FontFace::Bold => "Helvetica-Bold",
        }
    }

    /// The preferred name of the face inside the resource dictionary of a page.
    pub(crate) fn resource_name(self) -> &'static str {
        match self {
            FontFace::Regular => "FHelv",
            FontFace::Bold => "FHelvB",
        }
    }
}

/// A single vector drawing instruction, in page coordinates (points, origin at the
/// bottom left corner of the page, y growing upward).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DrawOp {
    /// A single line of text whose baseline starts at `(x, y)`.
    Text {
        content: String,
        x: f32,
        y: f32,
        font_size: f32,
        face: FontFace,
        color: Color,
    },
    /// A filled rectangle whose bottom left corner is `(x, y)`. The border is stroked
    /// only when both its color and its width are given.
    Rectangle {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Color,
        border_color: Option<Color>,
        border_width: Option<f32>,
    },
    Line {
        start: [f32; 2],
        end: [f32; 2],
        thickness: f32,
        color: Color,
    },
    /// A filled circle, approximated by four Bézier curves.
    Circle {
        x: f32,
        y: f32,
        radius: f32,
        color: Color,
    },
}

impl DrawOp {
    /// The font face the operation needs in the page resources, if any.
    pub fn font_face(&self) -> Option<FontFace> {
        match self {
            DrawOp::Text { face, .. } => Some(*face),
            _ => None,
        }
    }
}

/// One page of a document: fixed dimensions and the drawing operations painted on it,
/// later operations painting over earlier ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    width: f32,
    height: f32,
    operations: Vec<DrawOp>,
}

impl Page {
    pub fn new(width: f32, height: f32) -> Page {
        Page {
            width,
            height,
            operations: Vec::new(),
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn push(&mut self, operation: DrawOp) {
        self.operations.push(operation);
    }

    pub fn operations(&self) -> &[DrawOp] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// The intermediate representation of a composed document, an ordered list of pages
/// which is turned into an actual PDF document by `to_pdf_document`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pages: Vec<Page>,
}

impl Document {
    pub fn new() -> Document {
        Document::default()
    }

    /// Appends an empty page of the given size and returns it for drawing.
    pub fn add_page(&mut self, width: f32, height: f32) -> &mut Page {
        self.pages.push(Page::new(width, height));
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Writes every page, with its drawing operations, into a new PDF document.
    pub fn to_pdf_document(&self, identifier: &str) -> Result<PdfDocument, ContextError> {
        let mut pdf_document = PdfDocument::new(identifier);
        for page in &self.pages {
            let page_index = pdf_document.add_page(page.width, page.height)?;
            if !page.is_empty() {
                pdf_document.draw_on_page(page_index, page.operations())?;
            }
        }
        log::debug!(
            "Converted a document of {} pages into a PDF document",
            self.pages.len()
        );

        Ok(pdf_document)
    }

    /// Shorthand for `to_pdf_document` followed by `PdfDocument::save_to_bytes`.
    pub fn save_to_bytes(&self, identifier: &str) -> Result<Vec<u8>, ContextError> {
        self.to_pdf_document(identifier)?.save_to_bytes()
    }
}
