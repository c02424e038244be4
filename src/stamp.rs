use serde::{Deserialize, Serialize};

use crate::configuration::Settings;
use crate::document::{Color, DrawOp, Page};
use crate::error::ContextError;
use crate::pdf::PdfDocument;
use crate::qr_code::QrMatrix;

/// The bottom left corner of a QR code on its page, in points.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Placement overrides for the QR codes, every omitted field falling back to the settings.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct QrOptions {
    pub qr_size: Option<f32>,
    pub page1_pos: Option<Position>,
    pub page2_pos: Option<Position>,
}

/// Draws the QR code of `text` on the page, its modules filling the square of side `size`
/// whose bottom left corner is `(x, y)`.
///
/// A white plate with a thin gray border is drawn first, extending `plate_padding` beyond the
/// square on every side, so that the code stays readable over any background. Then every dark
/// module becomes a black square, the first row of the matrix being the topmost one.
pub fn stamp_qr(
    page: &mut Page,
    text: &str,
    x: f32,
    y: f32,
    size: f32,
    settings: &Settings,
) -> Result<(), ContextError> {
    let qr_matrix = QrMatrix::generate(text, settings.qr.error_correction)?;
    let padding = settings.qr.plate_padding;
    page.push(DrawOp::Rectangle {
        x: x - padding,
        y: y - padding,
        width: size + 2.0 * padding,
        height: size + 2.0 * padding,
        color: Color::WHITE,
        border_color: Some(Color::gray(settings.qr.plate_border_gray)),
        border_width: Some(settings.qr.plate_border_width),
    });

    let module_count = qr_matrix.size();
    let cell = size / module_count as f32;
    for (row, column) in qr_matrix.dark_modules() {
        page.push(DrawOp::Rectangle {
            x: x + column as f32 * cell,
            y: y + (module_count - 1 - row) as f32 * cell,
            width: cell,
            height: cell,
            color: Color::BLACK,
            border_color: None,
            border_width: None,
        });
    }
    log::debug!(
        "Stamped a QR code of version {}-{:?} ({} modules) for {:?} at ({}, {})",
        qr_matrix.version(),
        qr_matrix.error_correction(),
        module_count,
        text,
        x,
        y
    );

    Ok(())
}

/// Stamps the viewer URL on the first page and the download URL on the second one. The other
/// pages are left untouched, and a document without a first (or second) page simply does not
/// receive the corresponding code.
///
/// Unless the options say otherwise, the codes are placed in the bottom right corner of
/// their page, `settings.qr.margin` away from both edges.
pub fn stamp_qr_codes(
    bytes: &[u8],
    viewer_url: &str,
    download_url: &str,
    options: &QrOptions,
    settings: &Settings,
) -> Result<Vec<u8>, ContextError> {
    let mut pdf_document = PdfDocument::load_from_bytes(bytes)
        .map_err(|error| error.recontextualize("Unable to stamp the QR codes"))?;
    let size = options.qr_size.unwrap_or(settings.qr.size);

    let stamps = [(viewer_url, options.page1_pos), (download_url, options.page2_pos)];
    for (page_index, (url, position)) in stamps.into_iter().enumerate() {
        if page_index >= pdf_document.page_count() {
            log::debug!(
                "The document has no page with index {}, skipping its QR code",
                page_index
            );
            continue;
        }
        let (width, height) = pdf_document.page_size(page_index)?;
        let Position { x, y } = position.unwrap_or(Position {
            x: width - size - settings.qr.margin,
            y: settings.qr.margin,
        });

        let mut page = Page::new(width, height);
        stamp_qr(&mut page, url, x, y, size, settings)?;
        pdf_document.draw_on_page(page_index, page.operations())?;
    }

    pdf_document.save_to_bytes()
}
