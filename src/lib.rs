//! pdfqr composes two-page PDF documents and stamps them with QR codes: the first page
//! carries a code pointing at the viewer URL of the document, the second one a code pointing
//! at its download URL.
//!
//! Documents can be composed from the fields of a simple form (`builder`), from a declarative
//! JSON definition of pages and drawing elements (`definition`), or uploaded as existing PDF
//! documents which are padded to two pages (`pages`). The `service` module ties the composers,
//! the stamper and a blob store together into the create, list, serve and delete operations.
//!
//! PDF documents are represented by the struct `PdfDocument`, which offers a high-level
//! interface for direct PDF manipulation on top of `lopdf`, while the struct `Document` is the
//! intermediate representation produced by the composers.

/// This module contains the `ContextError` type which is the error type used throughout this library.
///
/// Every error carries an `ErrorKind`, so that callers can tell a malformed definition from an
/// unparsable upload or an invalid request, a human-readable context and, when the error was
/// propagated from another library, the description of the original error.
///
/// The `ContextError` type implements `std::fmt::Display` and `Debug`, so it can be explicitly printed out.
pub mod error;

/// The `Settings` holding every default of the composers and of the stamper, readable from a
/// JSON file in which any field can be omitted.
pub mod configuration;

/// Generation of QR code symbols (ISO/IEC 18004) in byte, alphanumeric and numeric mode, for
/// versions 1 to 40 and all four error correction levels.
pub mod qr_code;

mod reed_solomon;

/// The module were the `Document` interface is presented.
///
/// # Introduction
///
/// The entry point of this module is the `Document` struct, an ordered list of pages each
/// holding the drawing operations (`DrawOp`) to be painted on it: texts in the standard
/// Helvetica fonts, rectangles, lines and circles. This acts as an intermediate representation
/// between the composers, which lay out their input in terms of drawing operations, and the
/// PDF document, which is obtained with the `to_pdf_document` (or `save_to_bytes`) method.
pub mod document;

/// Encoding of drawing operations into PDF content stream operations and the reverse
/// decoding, together with the WinAnsi text encoding of the standard fonts.
pub mod content;

/// The module were the `PdfDocument` interface for working with PDF documents is presented.
///
/// # Introduction
///
/// The main component of this module is the struct `PdfDocument`, which can either be created
/// empty or loaded from bytes. Pages can be appended with `add_page`, drawn upon with
/// `draw_on_page` (the previous content of the page is preserved) and copied into a standalone
/// document with `extract_page`. The fonts are added at most once per document and shared
/// across its pages.
///
/// The documents produced by `save_to_bytes` are always pruned of their unreachable objects,
/// renumbered and compressed.
pub mod pdf;

/// Stamping of the viewer and download QR codes onto the first two pages of a document.
pub mod stamp;

/// The builder composer, laying out a title, a subtitle and lines of content on two pages.
pub mod builder;

/// The JSON composer, turning a declarative definition of pages and elements into a document.
pub mod definition;

/// Normalization of uploaded documents to at least two pages and extraction of single pages.
pub mod pages;

pub mod storage;

/// The document service: creation, listing, retrieval and deletion of stamped documents.
pub mod service;
