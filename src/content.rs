use std::collections::HashMap;

use lopdf::content::Operation;
use lopdf::{Object, StringFormat};
use unicode_normalization::UnicodeNormalization as _;

use crate::document::{Color, DrawOp, FontFace};

/// Distance of the Bézier control points from the on-curve points, for a unit circle.
const CIRCLE_KAPPA: f32 = 0.552_284_8;

/// Characters of the 0x80-0x9F range of WinAnsiEncoding, `None` where the code is unused.
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// Encodes the text for a standard font with WinAnsiEncoding. The text is first normalized
/// in the NFC form, control characters become spaces and characters outside of the encoding
/// become question marks.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    let mut substituted = Vec::new();
    let bytes = text
        .nfc()
        .map(|character| match character {
            ' '..='~' | '\u{A0}'..='\u{FF}' => character as u8,
            character if character.is_control() => b' ',
            character => match WIN_ANSI_HIGH
                .iter()
                .position(|candidate| *candidate == Some(character))
            {
                Some(position) => 0x80 + position as u8,
                None => {
                    substituted.push(character);
                    b'?'
                }
            },
        })
        .collect();

    if !substituted.is_empty() {
        log::warn!(
            "Unable to encode the characters {:?} with the standard fonts, replacing them with '?'",
            substituted
        );
    }

    bytes
}

/// Decodes bytes written with WinAnsiEncoding, unused codes become the replacement character.
pub fn decode_win_ansi(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&byte| match byte {
            0x80..=0x9F => WIN_ANSI_HIGH[usize::from(byte - 0x80)].unwrap_or('\u{FFFD}'),
            byte => char::from(byte),
        })
        .collect()
}

fn real(value: f32) -> Object {
    Object::Real(value)
}

fn color_operands(color: &Color) -> Vec<Object> {
    color.channels().into_iter().map(real).collect()
}

/// Translates a drawing operation into the content stream operators which paint it, each
/// operation being isolated in its own graphics state block (`q`/`Q`).
///
/// `font_name` gives the name under which a font face is registered in the page resources.
pub fn encode_draw_operation(
    operation: &DrawOp,
    font_name: impl Fn(FontFace) -> Vec<u8>,
) -> Vec<Operation> {
    let mut operations = vec![Operation::new("q", vec![])];
    match operation {
        DrawOp::Text {
            content,
            x,
            y,
            font_size,
            face,
            color,
        } => {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("rg", color_operands(color)),
                Operation::new("Tf", vec![Object::Name(font_name(*face)), real(*font_size)]),
                Operation::new("Td", vec![real(*x), real(*y)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        encode_win_ansi(content),
                        StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ]);
        }
        DrawOp::Rectangle {
            x,
            y,
            width,
            height,
            color,
            border_color,
            border_width,
        } => {
            operations.push(Operation::new("rg", color_operands(color)));
            let border = border_color.zip(*border_width);
            if let Some((border_color, border_width)) = border {
                operations.push(Operation::new("RG", color_operands(&border_color)));
                operations.push(Operation::new("w", vec![real(border_width)]));
            }
            operations.push(Operation::new(
                "re",
                vec![real(*x), real(*y), real(*width), real(*height)],
            ));
            // Fill and stroke when there is a border, otherwise fill only
            let painting = if border.is_some() { "B" } else { "f" };
            operations.push(Operation::new(painting, vec![]));
        }
        DrawOp::Line {
            start,
            end,
            thickness,
            color,
        } => {
            operations.extend([
                Operation::new("RG", color_operands(color)),
                Operation::new("w", vec![real(*thickness)]),
                Operation::new("m", vec![real(start[0]), real(start[1])]),
                Operation::new("l", vec![real(end[0]), real(end[1])]),
                Operation::new("S", vec![]),
            ]);
        }
        DrawOp::Circle {
            x,
            y,
            radius,
            color,
        } => {
            let (x, y, radius) = (*x, *y, *radius);
            let control = radius * CIRCLE_KAPPA;
            operations.push(Operation::new("rg", color_operands(color)));
            operations.push(Operation::new("m", vec![real(x + radius), real(y)]));
            // Four quarter arcs, counterclockwise starting from the rightmost point
            let quarters = [
                [x + radius, y + control, x + control, y + radius, x, y + radius],
                [x - control, y + radius, x - radius, y + control, x - radius, y],
                [x - radius, y - control, x - control, y - radius, x, y - radius],
                [x + control, y - radius, x + radius, y - control, x + radius, y],
            ];
            for quarter in quarters {
                operations.push(Operation::new(
                    "c",
                    quarter.into_iter().map(real).collect(),
                ));
            }
            operations.push(Operation::new("f", vec![]));
        }
    }
    operations.push(Operation::new("Q", vec![]));

    operations
}

/// Reads a numeric operand, PDF writers freely choose between integers and reals.
fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    if operands.len() < N {
        return None;
    }
    let mut values = [0.0; N];
    for (value, operand) in values.iter_mut().zip(operands) {
        *value = number(operand)?;
    }

    Some(values)
}

#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    fill: Color,
    stroke: Color,
    line_width: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        GraphicsState {
            fill: Color::BLACK,
            stroke: Color::BLACK,
            line_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PathElement {
    MoveTo([f32; 2]),
    LineTo([f32; 2]),
    CurveTo([f32; 6]),
    Rectangle([f32; 4]),
}

/// Recovers the drawing operations from content stream operators.
///
/// This understands the operators written by `encode_draw_operation` and the simple
/// constructs of other writers (rectangles, straight lines, single `Tj` texts). Operators
/// it does not model, transformation matrices included, are ignored, so positions are
/// reported in the coordinate space the operators were written in.
pub fn decode_draw_operations(
    operations: &[Operation],
    font_faces: &HashMap<Vec<u8>, FontFace>,
) -> Vec<DrawOp> {
    let mut state = GraphicsState::default();
    let mut saved_states = Vec::new();
    let mut path: Vec<PathElement> = Vec::new();
    let mut text_font = (FontFace::Regular, 12.0);
    let mut text_position = [0.0f32; 2];
    let mut decoded = Vec::new();

    for operation in operations {
        let operands = &operation.operands;
        match operation.operator.as_str() {
            "q" => saved_states.push(state),
            "Q" => state = saved_states.pop().unwrap_or_default(),
            "rg" => {
                if let Some([red, green, blue]) = numbers(operands) {
                    state.fill = Color::new(red, green, blue);
                }
            }
            "RG" => {
                if let Some([red, green, blue]) = numbers(operands) {
                    state.stroke = Color::new(red, green, blue);
                }
            }
            "g" => {
                if let Some([level]) = numbers(operands) {
                    state.fill = Color::gray(level);
                }
            }
            "G" => {
                if let Some([level]) = numbers(operands) {
                    state.stroke = Color::gray(level);
                }
            }
            "w" => {
                if let Some([width]) = numbers(operands) {
                    state.line_width = width;
                }
            }
            "m" => {
                if let Some(point) = numbers(operands) {
                    path.push(PathElement::MoveTo(point));
                }
            }
            "l" => {
                if let Some(point) = numbers(operands) {
                    path.push(PathElement::LineTo(point));
                }
            }
            "c" => {
                if let Some(points) = numbers(operands) {
                    path.push(PathElement::CurveTo(points));
                }
            }
            "re" => {
                if let Some(rectangle) = numbers(operands) {
                    path.push(PathElement::Rectangle(rectangle));
                }
            }
            "f" | "F" | "f*" => {
                decoded.extend(painted_path(&path, &state, false));
                path.clear();
            }
            "B" | "B*" => {
                decoded.extend(painted_path(&path, &state, true));
                path.clear();
            }
            "S" => {
                if let [PathElement::MoveTo(start), PathElement::LineTo(end)] = path[..] {
                    decoded.push(DrawOp::Line {
                        start,
                        end,
                        thickness: state.line_width,
                        color: state.stroke,
                    });
                }
                path.clear();
            }
            "n" | "s" | "b" | "b*" => path.clear(),
            "BT" => text_position = [0.0, 0.0],
            "Tf" => {
                if let [Object::Name(name), size] = &operands[..] {
                    let face = font_faces.get(name).copied().unwrap_or(FontFace::Regular);
                    text_font = (face, number(size).unwrap_or(text_font.1));
                }
            }
            "Td" => {
                if let Some([x, y]) = numbers(operands) {
                    text_position = [text_position[0] + x, text_position[1] + y];
                }
            }
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    decoded.push(DrawOp::Text {
                        content: decode_win_ansi(bytes),
                        x: text_position[0],
                        y: text_position[1],
                        font_size: text_font.1,
                        face: text_font.0,
                        color: state.fill,
                    });
                }
            }
            _ => {}
        }
    }

    decoded
}

/// Interprets a filled path as a rectangle or as a circle made of four curves.
fn painted_path(path: &[PathElement], state: &GraphicsState, stroked: bool) -> Option<DrawOp> {
    match path {
        [PathElement::Rectangle([x, y, width, height])] => Some(DrawOp::Rectangle {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
            color: state.fill,
            border_color: stroked.then_some(state.stroke),
            border_width: stroked.then_some(state.line_width),
        }),
        [PathElement::MoveTo(start), curves @ ..]
            if curves.len() == 4
                && curves
                    .iter()
                    .all(|element| matches!(element, PathElement::CurveTo(_))) =>
        {
            // The bounding box of the on-curve points gives the center and the radius
            let mut minimum = *start;
            let mut maximum = *start;
            for element in curves {
                if let PathElement::CurveTo([.., x, y]) = element {
                    minimum = [minimum[0].min(*x), minimum[1].min(*y)];
                    maximum = [maximum[0].max(*x), maximum[1].max(*y)];
                }
            }
            Some(DrawOp::Circle {
                x: (minimum[0] + maximum[0]) / 2.0,
                y: (minimum[1] + maximum[1]) / 2.0,
                radius: (maximum[0] - minimum[0]) / 2.0,
                color: state.fill,
            })
        }
        _ => None,
    }
}
