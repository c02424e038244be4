use serde::{Deserialize, Serialize};

use crate::configuration::{Settings, TextStyle};
use crate::document::{Color, Document, DrawOp, FontFace, Page};
use crate::error::ContextError;

/// Identifier of the PDF documents composed from builder fields.
const BUILDER_DOCUMENT_IDENTIFIER: &str = "pdfqr-builder";

/// The fields of the two-page form filled in by the user. Every field is optional, and an
/// empty field is treated exactly like an absent one.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BuilderFields {
    pub title: Option<String>,
    /// Shown under the title of the first page only.
    pub subtitle: Option<String>,
    /// Lines of the first page, separated by `\n`.
    pub content: Option<String>,
    pub page2_title: Option<String>,
    pub page2_content: Option<String>,
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|field| !field.is_empty())
}

/// Lays out the texts of one page from the top down. The cursor starts `top_margin` below
/// the top edge and moves down after every text by the advance of its style.
struct PageCursor<'a> {
    page: &'a mut Page,
    settings: &'a Settings,
    y: f32,
}

impl<'a> PageCursor<'a> {
    fn new(page: &'a mut Page, settings: &'a Settings) -> Self {
        let y = page.height() - settings.builder.top_margin;
        PageCursor { page, settings, y }
    }

    fn write(&mut self, text: &str, style: TextStyle) {
        self.page.push(DrawOp::Text {
            content: text.to_string(),
            x: self.settings.builder.left_margin,
            y: self.y,
            font_size: style.font_size,
            face: FontFace::from_bold(style.bold),
            color: Color::gray(style.gray),
        });
        self.y -= style.advance;
    }

    /// Writes the lines of the content until the cursor goes below the bottom limit, the
    /// remaining lines being dropped.
    fn write_lines(&mut self, content: &str) {
        let body = self.settings.builder.body;
        for line in content.split('\n') {
            if self.y < self.settings.builder.bottom_limit {
                log::debug!("The content overflows the page, truncating it");
                break;
            }
            self.write(line.strip_suffix('\r').unwrap_or(line), body);
        }
    }
}

/// Lays out the builder fields on exactly two pages of the configured size.
pub fn builder_document(fields: &BuilderFields, settings: &Settings) -> Document {
    let layout = &settings.builder;
    let mut document = Document::new();

    let first_page = document.add_page(settings.page_size.width, settings.page_size.height);
    let mut cursor = PageCursor::new(first_page, settings);
    if let Some(title) = non_empty(&fields.title) {
        cursor.write(title, layout.title);
    }
    if let Some(subtitle) = non_empty(&fields.subtitle) {
        cursor.write(subtitle, layout.subtitle);
    }
    if let Some(content) = non_empty(&fields.content) {
        cursor.write_lines(content);
    }

    let second_page = document.add_page(settings.page_size.width, settings.page_size.height);
    let mut cursor = PageCursor::new(second_page, settings);
    if let Some(title) = non_empty(&fields.page2_title) {
        cursor.write(title, layout.title);
    }
    if let Some(content) = non_empty(&fields.page2_content) {
        cursor.write_lines(content);
    }

    document
}

/// Composes the two-page PDF document of the builder fields. Content which does not fit is
/// silently truncated, so this only fails if the document cannot be serialized.
pub fn compose_from_builder(
    fields: &BuilderFields,
    settings: &Settings,
) -> Result<Vec<u8>, ContextError> {
    builder_document(fields, settings).save_to_bytes(BUILDER_DOCUMENT_IDENTIFIER)
}

#[cfg(test)]
mod tests {
    use rand::Rng as _;

    use super::*;
    use crate::configuration::{A4_HEIGHT, A4_WIDTH};
    use crate::pdf::PdfDocument;

    fn text_at(operation: &DrawOp) -> (&str, f32) {
        match operation {
            DrawOp::Text { content, y, .. } => (content.as_str(), *y),
            other => panic!("Expected a text, found {:?}", other),
        }
    }

    #[test]
    fn empty_fields_give_two_blank_pages() {
        let fields = BuilderFields {
            title: Some(String::new()),
            ..Default::default()
        };
        let document = builder_document(&fields, &Settings::default());

        assert_eq!(document.page_count(), 2);
        for page in document.pages() {
            assert_eq!((page.width(), page.height()), (A4_WIDTH, A4_HEIGHT));
            assert!(page.is_empty());
        }
    }

    #[test]
    fn first_page_layout() {
        let fields = BuilderFields {
            title: Some("Report".into()),
            subtitle: Some("Quarterly".into()),
            content: Some("one\r\ntwo".into()),
            ..Default::default()
        };
        let document = builder_document(&fields, &Settings::default());
        let operations = document.pages()[0].operations();

        let top = A4_HEIGHT - 60.0;
        assert_eq!(text_at(&operations[0]), ("Report", top));
        assert_eq!(text_at(&operations[1]), ("Quarterly", top - 40.0));
        assert_eq!(text_at(&operations[2]), ("one", top - 70.0));
        assert_eq!(text_at(&operations[3]), ("two", top - 88.0));
        assert!(matches!(
            operations[0],
            DrawOp::Text {
                face: FontFace::Bold,
                font_size,
                ..
            } if font_size == 24.0
        ));
        assert!(document.pages()[1].is_empty());
    }

    #[test]
    fn second_page_has_no_subtitle() {
        let fields = BuilderFields {
            subtitle: Some("Only on the first page".into()),
            page2_title: Some("Annex".into()),
            page2_content: Some("details".into()),
            ..Default::default()
        };
        let document = builder_document(&fields, &Settings::default());
        let operations = document.pages()[1].operations();

        let top = A4_HEIGHT - 60.0;
        assert_eq!(operations.len(), 2);
        assert_eq!(text_at(&operations[0]), ("Annex", top));
        assert_eq!(text_at(&operations[1]), ("details", top - 40.0));
    }

    #[test]
    fn overflowing_content_is_truncated() {
        let content = vec!["line"; 1000].join("\n");
        let fields = BuilderFields {
            content: Some(content),
            ..Default::default()
        };
        let document = builder_document(&fields, &Settings::default());
        let operations = document.pages()[0].operations();

        // Lines are written from 781.89 down to the last position not below 60
        let expected = ((A4_HEIGHT - 60.0 - 60.0) / 18.0).floor() as usize + 1;
        assert_eq!(operations.len(), expected);
        for operation in operations {
            assert!(text_at(operation).1 >= 60.0);
        }
    }

    #[test]
    fn random_content_always_composes() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let mut random_text = || {
                let length = rng.gen_range(1..=200);
                Some(rand_utf8::rand_utf8(&mut rng, length).to_string())
            };
            let fields = BuilderFields {
                title: random_text(),
                subtitle: random_text(),
                content: random_text(),
                page2_title: random_text(),
                page2_content: random_text(),
            };

            let bytes = compose_from_builder(&fields, &Settings::default()).unwrap();
            let pdf_document = PdfDocument::load_from_bytes(&bytes).unwrap();
            assert_eq!(pdf_document.page_count(), 2);
        }
    }
}
