use crate::configuration::Settings;
use crate::error::ContextError;
use crate::pdf::PdfDocument;

/// Every stamped document needs a page for each of its two QR codes.
const MINIMUM_PAGE_COUNT: usize = 2;

/// Loads an uploaded PDF document and appends blank pages of the configured size until it
/// has at least two pages. The document is serialized again even when nothing was added.
pub fn ensure_two_pages(bytes: &[u8], settings: &Settings) -> Result<Vec<u8>, ContextError> {
    let mut pdf_document = PdfDocument::load_from_bytes(bytes)
        .map_err(|error| error.recontextualize("Unable to normalize the uploaded document"))?;

    let page_count = pdf_document.page_count();
    for _ in page_count..MINIMUM_PAGE_COUNT {
        pdf_document.add_page(settings.page_size.width, settings.page_size.height)?;
    }
    if page_count < MINIMUM_PAGE_COUNT {
        log::debug!(
            "Padded the uploaded document from {} to {} pages",
            page_count,
            MINIMUM_PAGE_COUNT
        );
    }

    pdf_document.save_to_bytes()
}

/// Copies the page at the 0-based `page_index` into a standalone one-page document.
///
/// An index outside of the document is not an error: `None` is returned instead, which
/// callers usually turn into a "page not found" answer.
pub fn extract_single_page(bytes: &[u8], page_index: i64) -> Result<Option<Vec<u8>>, ContextError> {
    let pdf_document = PdfDocument::load_from_bytes(bytes)
        .map_err(|error| error.recontextualize("Unable to extract a page"))?;
    let Ok(page_index) = usize::try_from(page_index) else {
        return Ok(None);
    };

    match pdf_document.extract_page(page_index)? {
        Some(mut extracted) => Ok(Some(extracted.save_to_bytes()?)),
        None => Ok(None),
    }
}
