use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::configuration::{ElementDefaults, Settings};
use crate::document::{Color, Document, DrawOp, FontFace};
use crate::error::{ContextError, ErrorKind};

/// Identifier of the PDF documents composed from JSON definitions.
const JSON_DOCUMENT_IDENTIFIER: &str = "pdfqr-json";

/// Documents composed from definitions always have at least this many pages.
const MINIMUM_PAGE_COUNT: usize = 2;

/// Deserializes `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The declarative description of a document: `{"pages": [{"width", "height", "elements"}]}`.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct JsonDefinition {
    #[serde(default, deserialize_with = "null_as_default")]
    pub pages: Vec<PageDefinition>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct PageDefinition {
    /// Width in points, the configured page width when absent or not positive.
    #[serde(default)]
    pub width: Option<f32>,
    #[serde(default)]
    pub height: Option<f32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub elements: Vec<Element>,
}

/// A color as written in definitions, each channel between 0 and 255.
pub type Rgb255 = [f32; 3];

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    /// Strings are taken as is, numbers and booleans are written out and `null` is empty.
    #[serde(default, deserialize_with = "text_content")]
    pub text: String,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub font_size: Option<f32>,
    pub bold: Option<bool>,
    pub color: Option<Rgb255>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RectElement {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub color: Option<Rgb255>,
    pub border_color: Option<Rgb255>,
    pub border_width: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct LineElement {
    pub x1: Option<f32>,
    pub y1: Option<f32>,
    pub x2: Option<f32>,
    pub y2: Option<f32>,
    pub thickness: Option<f32>,
    pub color: Option<Rgb255>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CircleElement {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub radius: Option<f32>,
    pub color: Option<Rgb255>,
}

/// One element of a page definition, dispatched on its `type` field.
///
/// Elements whose type is missing or unknown are kept as `Skipped` with the type they had,
/// so that they are reported instead of failing the whole definition.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(try_from = "serde_json::Value")]
pub enum Element {
    Text(TextElement),
    Rect(RectElement),
    Line(LineElement),
    Circle(CircleElement),
    Skipped(Option<String>),
}

impl TryFrom<serde_json::Value> for Element {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let serde_json::Value::Object(fields) = &value else {
            return Err(format!("an element must be an object, found {}", value));
        };
        let element_type = match fields.get("type") {
            Some(serde_json::Value::String(element_type)) => element_type.clone(),
            Some(other) => return Ok(Element::Skipped(Some(other.to_string()))),
            None => return Ok(Element::Skipped(None)),
        };

        let element = match element_type.as_str() {
            "text" => serde_json::from_value(value).map(Element::Text),
            "rect" => serde_json::from_value(value).map(Element::Rect),
            "line" => serde_json::from_value(value).map(Element::Line),
            "circle" => serde_json::from_value(value).map(Element::Circle),
            _ => return Ok(Element::Skipped(Some(element_type))),
        };

        element.map_err(|error| format!("invalid {} element: {}", element_type, error))
    }
}

fn text_content<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null | serde_json::Value::Bool(false) => Ok(String::new()),
        serde_json::Value::Bool(true) => Ok("true".to_string()),
        serde_json::Value::String(text) => Ok(text),
        serde_json::Value::Number(number) => Ok(number.to_string()),
        other => Err(D::Error::custom(format!(
            "the text must be a string or a number, found {}",
            other
        ))),
    }
}

fn color_or(color: Option<Rgb255>, defaults: &ElementDefaults) -> Color {
    Color::from_rgb255(color.unwrap_or(defaults.color))
}

impl Element {
    /// The drawing operation of the element, every omitted field taking its default value.
    /// Skipped elements have none.
    pub fn to_draw_operation(&self, defaults: &ElementDefaults) -> Option<DrawOp> {
        let draw_operation = match self {
            Element::Text(text) => DrawOp::Text {
                content: text.text.clone(),
                x: text.x.unwrap_or(defaults.text_position[0]),
                y: text.y.unwrap_or(defaults.text_position[1]),
                font_size: text.font_size.unwrap_or(defaults.font_size),
                face: FontFace::from_bold(text.bold.unwrap_or(false)),
                color: color_or(text.color, defaults),
            },
            Element::Rect(rect) => DrawOp::Rectangle {
                x: rect.x.unwrap_or(defaults.rect_position[0]),
                y: rect.y.unwrap_or(defaults.rect_position[1]),
                width: rect.width.unwrap_or(defaults.rect_size[0]),
                height: rect.height.unwrap_or(defaults.rect_size[1]),
                color: color_or(rect.color, defaults),
                border_color: rect.border_color.map(Color::from_rgb255),
                border_width: rect.border_width,
            },
            Element::Line(line) => DrawOp::Line {
                start: [
                    line.x1.unwrap_or(defaults.line_start[0]),
                    line.y1.unwrap_or(defaults.line_start[1]),
                ],
                end: [
                    line.x2.unwrap_or(defaults.line_end[0]),
                    line.y2.unwrap_or(defaults.line_end[1]),
                ],
                thickness: line.thickness.unwrap_or(defaults.line_thickness),
                color: color_or(line.color, defaults),
            },
            Element::Circle(circle) => DrawOp::Circle {
                x: circle.x.unwrap_or(defaults.circle_center[0]),
                y: circle.y.unwrap_or(defaults.circle_center[1]),
                radius: circle.radius.unwrap_or(defaults.circle_radius),
                color: color_or(circle.color, defaults),
            },
            Element::Skipped(_) => return None,
        };

        Some(draw_operation)
    }
}

impl JsonDefinition {
    /// Interprets an already parsed JSON value as a definition.
    pub fn from_value(value: serde_json::Value) -> Result<JsonDefinition, ContextError> {
        serde_json::from_value(value).map_err(|error| {
            ContextError::with_error(
                ErrorKind::MalformedDefinition,
                "Unable to interpret the document definition",
                &error,
            )
        })
    }

    /// Renders the definition, padded with empty pages up to two pages.
    pub fn to_document(&self, settings: &Settings) -> Document {
        let mut page_definitions = self.pages.clone();
        if page_definitions.len() < MINIMUM_PAGE_COUNT {
            log::debug!(
                "Padding a definition of {} pages with empty pages",
                page_definitions.len()
            );
            page_definitions.resize_with(MINIMUM_PAGE_COUNT, PageDefinition::default);
        }

        let mut document = Document::new();
        for (page_index, page_definition) in page_definitions.iter().enumerate() {
            let positive = |dimension: Option<f32>| dimension.filter(|dimension| *dimension > 0.0);
            let page = document.add_page(
                positive(page_definition.width).unwrap_or(settings.page_size.width),
                positive(page_definition.height).unwrap_or(settings.page_size.height),
            );
            for element in &page_definition.elements {
                match element.to_draw_operation(&settings.elements) {
                    Some(draw_operation) => page.push(draw_operation),
                    None => log::warn!(
                        "Skipping an element of unknown type {:?} on the page with index {}",
                        element,
                        page_index
                    ),
                }
            }
        }

        document
    }
}

impl FromStr for JsonDefinition {
    type Err = ContextError;

    fn from_str(definition: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(definition).map_err(|error| {
            ContextError::with_error(
                ErrorKind::MalformedDefinition,
                "Unable to parse the document definition",
                &error,
            )
        })
    }
}

/// Composes the PDF document of an already parsed definition.
pub fn compose_from_definition(
    definition: &JsonDefinition,
    settings: &Settings,
) -> Result<Vec<u8>, ContextError> {
    definition
        .to_document(settings)
        .save_to_bytes(JSON_DOCUMENT_IDENTIFIER)
}

/// Parses the JSON definition and composes its PDF document, with at least two pages.
pub fn compose_from_json(definition: &str, settings: &Settings) -> Result<Vec<u8>, ContextError> {
    let definition = JsonDefinition::from_str(definition)?;
    compose_from_definition(&definition, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{A4_HEIGHT, A4_WIDTH};

    fn parse(definition: &str) -> JsonDefinition {
        definition.parse().unwrap()
    }

    #[test]
    fn hello_definition() {
        let definition = parse(
            r#"{"pages": [{"elements": [{"type": "text", "text": "Hello", "x": 50, "y": 750, "fontSize": 12, "color": [0, 0, 0]}]}]}"#,
        );
        let document = definition.to_document(&Settings::default());

        assert_eq!(document.page_count(), 2);
        similar_asserts::assert_eq!(
            document.pages()[0].operations(),
            &[DrawOp::Text {
                content: "Hello".into(),
                x: 50.0,
                y: 750.0,
                font_size: 12.0,
                face: FontFace::Regular,
                color: Color::BLACK,
            }]
        );
        assert!(document.pages()[1].is_empty());
    }

    #[test]
    fn missing_or_null_pages_are_empty() {
        for definition in ["{}", r#"{"pages": null}"#, r#"{"pages": []}"#] {
            let document = parse(definition).to_document(&Settings::default());
            assert_eq!(document.page_count(), 2);
            for page in document.pages() {
                assert_eq!((page.width(), page.height()), (A4_WIDTH, A4_HEIGHT));
                assert!(page.is_empty());
            }
        }
    }

    #[test]
    fn defaults_of_omitted_fields() {
        let definition = parse(
            r#"{"pages": [{"width": 300, "height": 0, "elements": [
                {"type": "text"},
                {"type": "rect", "borderWidth": 2},
                {"type": "line"},
                {"type": "circle", "color": [255, 0, 127.5]}
            ]}]}"#,
        );
        let document = definition.to_document(&Settings::default());
        let page = &document.pages()[0];

        assert_eq!((page.width(), page.height()), (300.0, A4_HEIGHT));
        similar_asserts::assert_eq!(
            page.operations(),
            &[
                DrawOp::Text {
                    content: String::new(),
                    x: 50.0,
                    y: 750.0,
                    font_size: 12.0,
                    face: FontFace::Regular,
                    color: Color::BLACK,
                },
                DrawOp::Rectangle {
                    x: 0.0,
                    y: 0.0,
                    width: 100.0,
                    height: 50.0,
                    color: Color::BLACK,
                    border_color: None,
                    border_width: Some(2.0),
                },
                DrawOp::Line {
                    start: [0.0, 0.0],
                    end: [100.0, 0.0],
                    thickness: 1.0,
                    color: Color::BLACK,
                },
                DrawOp::Circle {
                    x: 100.0,
                    y: 100.0,
                    radius: 50.0,
                    color: Color::new(1.0, 0.0, 0.5),
                },
            ]
        );
    }

    #[test]
    fn unknown_elements_are_skipped() {
        let definition = parse(
            r#"{"pages": [{"elements": [{"type": "star"}, {"x": 3}, {"type": 7}, {"type": "text", "text": 42}]}]}"#,
        );
        assert_eq!(
            definition.pages[0].elements[..3],
            [
                Element::Skipped(Some("star".into())),
                Element::Skipped(None),
                Element::Skipped(Some("7".into())),
            ]
        );

        let document = definition.to_document(&Settings::default());
        let operations = document.pages()[0].operations();
        assert_eq!(operations.len(), 1);
        assert!(matches!(&operations[0], DrawOp::Text { content, .. } if content == "42"));
    }

    #[test]
    fn malformed_definitions() {
        for definition in [
            r#"{"pages": "abc"}"#,
            r#"{"pages": [{"elements": 3}]}"#,
            r#"{"pages": [{"elements": [{"type": "rect", "x": "left"}]}]}"#,
            r#"{"pages": [{"elements": [{"type": "text", "color": [1, 2]}]}]}"#,
            "[1, 2]",
            "not json",
        ] {
            let error = JsonDefinition::from_str(definition).unwrap_err();
            assert_eq!(error.kind, ErrorKind::MalformedDefinition, "{}", definition);
        }
    }

    #[test]
    fn colors_are_divided_without_clamping() {
        let element: Element =
            serde_json::from_str(r#"{"type": "circle", "color": [510, -255, 0]}"#).unwrap();
        let draw_operation = element
            .to_draw_operation(&ElementDefaults::default())
            .unwrap();
        assert!(
            matches!(draw_operation, DrawOp::Circle { color, .. } if color == Color::new(2.0, -1.0, 0.0))
        );
    }

    #[test]
    fn three_pages_are_kept() {
        let bytes = compose_from_json(r#"{"pages": [{}, {}, {}]}"#, &Settings::default()).unwrap();
        let pdf_document = crate::pdf::PdfDocument::load_from_bytes(&bytes).unwrap();
        assert_eq!(pdf_document.page_count(), 3);
    }
}
