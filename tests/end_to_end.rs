use pdfqr::builder::{compose_from_builder, BuilderFields};
use pdfqr::configuration::{Settings, A4_HEIGHT, A4_WIDTH};
use pdfqr::definition::compose_from_json;
use pdfqr::document::{Color, DrawOp, FontFace};
use pdfqr::error::ErrorKind;
use pdfqr::pages::{ensure_two_pages, extract_single_page};
use pdfqr::pdf::PdfDocument;
use pdfqr::qr_code::QrMatrix;
use pdfqr::stamp::{stamp_qr_codes, QrOptions};
use rand::Rng as _;

const VIEWER_URL: &str = "https://x/v/abc";
const DOWNLOAD_URL: &str = "https://x/d/abc";
const TOLERANCE: f32 = 1e-3;

fn load(bytes: &[u8]) -> PdfDocument {
    PdfDocument::load_from_bytes(bytes).unwrap()
}

fn assert_size(pdf_document: &PdfDocument, page_index: usize, expected: (f32, f32)) {
    let (width, height) = pdf_document.page_size(page_index).unwrap();
    assert!(
        (width - expected.0).abs() < TOLERANCE && (height - expected.1).abs() < TOLERANCE,
        "Page {} measures {}x{}, expected {:?}",
        page_index,
        width,
        height,
        expected
    );
}

fn operations(bytes: &[u8], page_index: usize) -> Vec<DrawOp> {
    load(bytes).page_draw_operations(page_index).unwrap()
}

fn document_with_text_pages(page_count: usize) -> Vec<u8> {
    let pages: Vec<serde_json::Value> = (0..page_count)
        .map(|index| {
            serde_json::json!({
                "elements": [{"type": "text", "text": format!("Page {}", index + 1), "x": 50, "y": 50}]
            })
        })
        .collect();
    compose_from_json(
        &serde_json::json!({ "pages": pages }).to_string(),
        &Settings::default(),
    )
    .unwrap()
}

#[test]
fn builder_output_has_two_a4_pages() {
    let fields = BuilderFields {
        title: Some("Invoice".into()),
        content: Some("First line\nSecond line".into()),
        page2_title: Some("Terms".into()),
        ..Default::default()
    };
    let bytes = compose_from_builder(&fields, &Settings::default()).unwrap();

    let pdf_document = load(&bytes);
    assert_eq!(pdf_document.page_count(), 2);
    assert_size(&pdf_document, 0, (A4_WIDTH, A4_HEIGHT));
    assert_size(&pdf_document, 1, (A4_WIDTH, A4_HEIGHT));
    assert_eq!(pdf_document.page_draw_operations(0).unwrap().len(), 3);
    assert_eq!(pdf_document.page_draw_operations(1).unwrap().len(), 1);
}

#[test]
fn short_definitions_are_padded_with_empty_pages() {
    for definition in [
        r#"{"pages": []}"#,
        r#"{"pages": [{"width": 300, "height": 200, "elements": [{"type": "circle"}]}]}"#,
    ] {
        let bytes = compose_from_json(definition, &Settings::default()).unwrap();
        let pdf_document = load(&bytes);
        assert!(pdf_document.page_count() >= 2);
        assert!(pdf_document.page_draw_operations(1).unwrap().is_empty());
        assert_size(&pdf_document, 1, (A4_WIDTH, A4_HEIGHT));
    }
}

#[test]
fn hello_scenario() {
    let bytes = compose_from_json(
        r#"{"pages": [{"elements": [{"type": "text", "text": "Hello", "x": 50, "y": 750, "fontSize": 12, "color": [0, 0, 0]}]}]}"#,
        &Settings::default(),
    )
    .unwrap();

    let pdf_document = load(&bytes);
    assert_eq!(pdf_document.page_count(), 2);
    similar_asserts::assert_eq!(
        pdf_document.page_draw_operations(0).unwrap(),
        vec![DrawOp::Text {
            content: "Hello".into(),
            x: 50.0,
            y: 750.0,
            font_size: 12.0,
            face: FontFace::Regular,
            color: Color::BLACK,
        }]
    );
    assert!(pdf_document.page_draw_operations(1).unwrap().is_empty());
}

#[test]
fn extracted_pages_keep_their_dimensions() {
    let bytes = compose_from_json(
        r#"{"pages": [{"width": 300, "height": 400}, {}, {"width": 500, "height": 250}]}"#,
        &Settings::default(),
    )
    .unwrap();

    for (page_index, size) in [(0, (300.0, 400.0)), (1, (A4_WIDTH, A4_HEIGHT)), (2, (500.0, 250.0))] {
        let extracted = extract_single_page(&bytes, page_index).unwrap().unwrap();
        let pdf_document = load(&extracted);
        assert_eq!(pdf_document.page_count(), 1);
        assert_size(&pdf_document, 0, size);
    }
    assert_eq!(extract_single_page(&bytes, 3).unwrap(), None);
    assert_eq!(extract_single_page(&bytes, -1).unwrap(), None);
}

#[test]
fn extracted_pages_keep_their_content() {
    let bytes = document_with_text_pages(3);
    let extracted = extract_single_page(&bytes, 2).unwrap().unwrap();

    similar_asserts::assert_eq!(operations(&extracted, 0), operations(&bytes, 2));
}

#[test]
fn padding_uploads_is_idempotent() {
    for page_count in 1..=3 {
        let bytes = document_with_text_pages(page_count);
        let once = ensure_two_pages(&bytes, &Settings::default()).unwrap();
        let twice = ensure_two_pages(&once, &Settings::default()).unwrap();
        assert_eq!(load(&once).page_count(), page_count.max(2));
        assert_eq!(load(&twice).page_count(), load(&once).page_count());
    }
}

#[test]
fn stamping_only_changes_the_first_two_pages() {
    let bytes = document_with_text_pages(4);
    let stamped = stamp_qr_codes(
        &bytes,
        VIEWER_URL,
        DOWNLOAD_URL,
        &QrOptions::default(),
        &Settings::default(),
    )
    .unwrap();

    assert_eq!(load(&stamped).page_count(), 4);
    for page_index in 0..2 {
        let before = operations(&bytes, page_index);
        let after = operations(&stamped, page_index);
        assert!(after.len() > before.len());
        similar_asserts::assert_eq!(&after[..before.len()], &before[..]);
    }
    for page_index in 2..4 {
        similar_asserts::assert_eq!(operations(&stamped, page_index), operations(&bytes, page_index));
    }
}

#[test]
fn stamped_codes_fill_the_bottom_right_corner() {
    let settings = Settings::default();
    let bytes = compose_from_json(r#"{"pages": []}"#, &settings).unwrap();
    let stamped =
        stamp_qr_codes(&bytes, VIEWER_URL, DOWNLOAD_URL, &QrOptions::default(), &settings).unwrap();

    let (left, bottom) = (A4_WIDTH - 80.0 - 20.0, 20.0);
    for (page_index, url) in [(0, VIEWER_URL), (1, DOWNLOAD_URL)] {
        let qr_matrix = QrMatrix::generate(url, settings.qr.error_correction).unwrap();
        let page_operations = operations(&stamped, page_index);
        assert_eq!(page_operations.len(), 1 + qr_matrix.dark_modules().count());

        match &page_operations[0] {
            DrawOp::Rectangle {
                x,
                y,
                width,
                color,
                border_color,
                ..
            } => {
                assert!((x - (left - 5.0)).abs() < TOLERANCE);
                assert!((y - (bottom - 5.0)).abs() < TOLERANCE);
                assert!((width - 90.0).abs() < TOLERANCE);
                assert_eq!(*color, Color::WHITE);
                assert!(border_color.is_some());
            }
            other => panic!("Expected the backing plate, found {:?}", other),
        }
        for operation in &page_operations[1..] {
            let DrawOp::Rectangle {
                x,
                y,
                width,
                height,
                color,
                ..
            } = operation
            else {
                panic!("Expected a module, found {:?}", operation);
            };
            assert_eq!(*color, Color::BLACK);
            assert!(*x >= left - TOLERANCE && x + width <= left + 80.0 + TOLERANCE);
            assert!(*y >= bottom - TOLERANCE && y + height <= bottom + 80.0 + TOLERANCE);
        }
    }
}

#[test]
fn stamping_honors_the_options() {
    let settings = Settings::default();
    let bytes = compose_from_json(r#"{"pages": []}"#, &settings).unwrap();
    let options: QrOptions =
        serde_json::from_str(r#"{"qrSize": 100, "page2Pos": {"x": 10, "y": 700}}"#).unwrap();
    let stamped = stamp_qr_codes(&bytes, VIEWER_URL, DOWNLOAD_URL, &options, &settings).unwrap();

    let plate_of = |page_index| match operations(&stamped, page_index).first() {
        Some(DrawOp::Rectangle { x, y, width, .. }) => (*x, *y, *width),
        other => panic!("Expected the backing plate, found {:?}", other),
    };
    let (x, y, width) = plate_of(0);
    assert!((x - (A4_WIDTH - 100.0 - 20.0 - 5.0)).abs() < TOLERANCE);
    assert!((y - 15.0).abs() < TOLERANCE);
    assert!((width - 110.0).abs() < TOLERANCE);
    let (x, y, _) = plate_of(1);
    assert!((x - 5.0).abs() < TOLERANCE);
    assert!((y - 695.0).abs() < TOLERANCE);
}

#[test]
fn string_pages_are_malformed() {
    let error = compose_from_json(r#"{"pages": "abc"}"#, &Settings::default()).unwrap_err();
    assert_eq!(error.kind, ErrorKind::MalformedDefinition);
}

#[test]
fn non_pdf_uploads_are_unparsable() {
    let mut rng = rand::thread_rng();
    let mut inputs = vec![b"not a pdf".to_vec(), Vec::new()];
    inputs.push((0..512).map(|_| rng.gen::<u8>()).collect());

    for input in inputs {
        let error = ensure_two_pages(&input, &Settings::default()).unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnparsablePdf);
        let error = stamp_qr_codes(
            &input,
            VIEWER_URL,
            DOWNLOAD_URL,
            &QrOptions::default(),
            &Settings::default(),
        )
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnparsablePdf);
    }
}

#[test]
fn random_texts_survive_the_pipeline() {
    let mut rng = rand::thread_rng();
    for _ in 0..10 {
        let length = rng.gen_range(1..=80);
        let text = rand_utf8::rand_utf8(&mut rng, length).to_string();
        let definition = serde_json::json!({
            "pages": [{"elements": [{"type": "text", "text": text, "bold": rng.gen::<bool>()}]}]
        });
        let bytes = compose_from_json(&definition.to_string(), &Settings::default()).unwrap();
        let stamped = stamp_qr_codes(
            &bytes,
            VIEWER_URL,
            DOWNLOAD_URL,
            &QrOptions::default(),
            &Settings::default(),
        )
        .unwrap();

        assert_eq!(load(&stamped).page_count(), 2);
        assert!(matches!(
            operations(&stamped, 0).first(),
            Some(DrawOp::Text { .. })
        ));
    }
}
