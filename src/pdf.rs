use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    io::BufWriter,
    mem,
};

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, StringFormat};
use time::OffsetDateTime;

use crate::configuration::{A4_HEIGHT, A4_WIDTH};
use crate::content::{decode_draw_operations, encode_draw_operation};
use crate::document::{DrawOp, FontFace};
use crate::error::{ContextError, ErrorKind};

/// Attributes which a page inherits from its ancestors in the page tree when it does not
/// define them itself.
const INHERITABLE_ATTRIBUTES: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Bound on the length of reference chains and on the depth of the page tree, so that
/// cyclic documents cannot make the traversals loop forever.
const MAXIMUM_DEPTH: usize = 64;

fn lopdf_error(context: impl Into<String>) -> impl FnOnce(lopdf::Error) -> ContextError {
    let context = context.into();
    move |error| ContextError::with_error(ErrorKind::UnparsablePdf, context, &error)
}

/// A PDF document on a high level: an interface to the underlying `lopdf::Document` which
/// knows how to add pages, paint drawing operations on them, read them back and extract
/// them into standalone documents.
///
/// Pages are addressed by their 0-based index in the order of the page tree. The standard
/// fonts needed by text operations are added to the document once and then shared by every
/// page which uses them.
#[derive(Debug)]
pub struct PdfDocument {
    /// The underlying PDF document: this is a low-level interface and shouldn't be directly
    /// interacted with unless strictly necessary.
    pub inner_document: lopdf::Document,
    /// The identifier of the document, it is used in order to set the PDF `ID` tag.
    pub identifier: String,
    /// The font objects already added to the document by this instance.
    fonts: BTreeMap<FontFace, ObjectId>,
}

impl PdfDocument {
    /// Create a new `PdfDocument` without pages, defaulting the underlying PDF document to
    /// version 1.5 of the PDF specification, with the given identifier.
    ///
    /// The creation date is the UNIX epoch so that the output only depends on the contents.
    pub fn new(identifier: &str) -> Self {
        let mut inner_document = lopdf::Document::with_version("1.5");
        let literal = |bytes: &[u8]| Object::String(bytes.to_vec(), StringFormat::Literal);

        // Construct the (empty) page tree and the catalog pointing at it
        let pages_id = inner_document.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(vec![])),
            ("Count", Object::Integer(0)),
        ]));
        let catalog_id = inner_document.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("PageLayout", Object::Name(b"OneColumn".to_vec())),
            ("PageMode", Object::Name(b"UseNone".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));

        let epoch = to_pdf_timestamp_format(&OffsetDateTime::UNIX_EPOCH);
        let document_info = Dictionary::from_iter(vec![
            ("Trapped", Object::Name(b"False".to_vec())),
            ("CreationDate", literal(epoch.as_bytes())),
            ("ModDate", literal(epoch.as_bytes())),
            ("Producer", literal(b"pdfqr")),
            ("Identifier", literal(identifier.as_bytes())),
        ]);
        let document_info_id = inner_document.add_object(document_info);

        inner_document.trailer.set("Root", Object::Reference(catalog_id));
        inner_document
            .trailer
            .set("Info", Object::Reference(document_info_id));
        inner_document.trailer.set(
            "ID",
            Object::Array(vec![
                literal(identifier.as_bytes()),
                literal(identifier.as_bytes()),
            ]),
        );

        PdfDocument {
            inner_document,
            identifier: identifier.to_string(),
            fonts: BTreeMap::new(),
        }
    }

    /// Loads a PDF document from its bytes. Encrypted documents are refused because their
    /// streams cannot be read nor written back.
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Self, ContextError> {
        let inner_document = lopdf::Document::load_mem(bytes)
            .map_err(lopdf_error("Unable to load the PDF document"))?;
        if inner_document.trailer.get(b"Encrypt").is_ok() {
            return Err(ContextError::with_context(
                ErrorKind::UnparsablePdf,
                "Unable to modify an encrypted PDF document",
            ));
        }

        // Keep the identifier of the document, if it has any
        let identifier = match inner_document
            .trailer
            .get(b"ID")
            .and_then(Object::as_array)
            .map(|identifiers| identifiers.first())
        {
            Ok(Some(Object::String(identifier, _))) => {
                String::from_utf8_lossy(identifier).into_owned()
            }
            _ => String::new(),
        };
        log::debug!(
            "Loaded a PDF document of {} bytes and {} pages",
            bytes.len(),
            inner_document.get_pages().len()
        );

        Ok(PdfDocument {
            inner_document,
            identifier,
            fonts: BTreeMap::new(),
        })
    }

    /// The object IDs of the pages, in page order.
    pub fn page_ids(&self) -> Vec<ObjectId> {
        self.inner_document.get_pages().into_values().collect()
    }

    pub fn page_count(&self) -> usize {
        self.inner_document.get_pages().len()
    }

    fn page_id(&self, page_index: usize) -> Result<ObjectId, ContextError> {
        self.page_ids()
            .get(page_index)
            .copied()
            .ok_or(ContextError::with_context(
                ErrorKind::InvalidRequest,
                format!(
                    "Failed to find the page with index {} in a document of {} pages",
                    page_index,
                    self.page_count()
                ),
            ))
    }

    /// Width and height of the page in points, from its (possibly inherited) media box. Pages
    /// without a usable media box are considered A4.
    pub fn page_size(&self, page_index: usize) -> Result<(f32, f32), ContextError> {
        let page_id = self.page_id(page_index)?;
        let media_box = inherited_attribute(&self.inner_document, page_id, b"MediaBox")
            .and_then(|media_box| resolve(&self.inner_document, media_box))
            .and_then(|media_box| media_box.as_array().ok())
            .and_then(|media_box| {
                let corners = media_box.iter().map(number).collect::<Option<Vec<f32>>>()?;
                match corners[..] {
                    [left, bottom, right, top] => Some(((right - left).abs(), (top - bottom).abs())),
                    _ => None,
                }
            });

        Ok(media_box.unwrap_or_else(|| {
            log::warn!(
                "The page with index {} has no usable media box, assuming A4",
                page_index
            );
            (A4_WIDTH, A4_HEIGHT)
        }))
    }

    /// Appends an empty page of the given size in points at the end of the document and
    /// returns its index.
    pub fn add_page(&mut self, width: f32, height: f32) -> Result<usize, ContextError> {
        let pages_id = self.root_pages_id()?;
        let page_dictionary = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(width),
                    Object::Real(height),
                ]),
            ),
            ("Resources", Object::Dictionary(Dictionary::new())),
        ]);
        let page_id = self.inner_document.add_object(page_dictionary);
        self.append_to_page_tree(pages_id, page_id)?;

        Ok(self.page_count() - 1)
    }

    /// Paints the drawing operations on the page, over whatever the page already shows.
    ///
    /// The existing content is isolated in its own graphics state block so that the state it
    /// leaves behind (transformations, colors) does not leak into the new operations. The
    /// resources of the page are copied onto the page itself before being extended, so that
    /// resources shared with other pages are never modified.
    pub fn draw_on_page(
        &mut self,
        page_index: usize,
        operations: &[DrawOp],
    ) -> Result<(), ContextError> {
        if operations.is_empty() {
            return Ok(());
        }
        let page_id = self.page_id(page_index)?;

        // Register the fonts needed by the operations into the resources of the page
        let needed_faces: BTreeSet<FontFace> =
            operations.iter().filter_map(DrawOp::font_face).collect();
        let mut resources = self.page_resources(page_id);
        let mut font_resources = match resources.get(b"Font") {
            Ok(font_resources) => resolve(&self.inner_document, font_resources)
                .and_then(|font_resources| font_resources.as_dict().ok())
                .cloned()
                .unwrap_or_default(),
            Err(_) => Dictionary::new(),
        };
        let mut font_names = HashMap::new();
        for face in needed_faces {
            let font_name = match self.matching_font_name(&font_resources, face) {
                Some(font_name) => font_name,
                None => {
                    let font_id = self.font_object(face);
                    let font_name = free_resource_name(&font_resources, face.resource_name());
                    font_resources.set(font_name.clone(), Object::Reference(font_id));
                    font_name
                }
            };
            font_names.insert(face, font_name);
        }
        if !font_names.is_empty() {
            resources.set("Font", Object::Dictionary(font_resources));
        }

        // Encode the operations into a new content stream
        let mut new_operations = Vec::new();
        for operation in operations {
            new_operations.extend(encode_draw_operation(operation, |face| {
                font_names
                    .get(&face)
                    .cloned()
                    .unwrap_or_else(|| face.resource_name().as_bytes().to_vec())
            }));
        }
        let new_content_id = self.add_content_stream(new_operations)?;

        let mut contents = self.page_content_references(page_id);
        if !contents.is_empty() {
            let save_id = self.add_content_stream(vec![Operation::new("q", vec![])])?;
            let restore_id = self.add_content_stream(vec![Operation::new("Q", vec![])])?;
            contents.insert(0, Object::Reference(save_id));
            contents.push(Object::Reference(restore_id));
        }
        contents.push(Object::Reference(new_content_id));

        let page = self
            .inner_document
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(lopdf_error(format!(
                "Unable to find the dictionary of the page with index {}",
                page_index
            )))?;
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Array(contents));
        log::debug!(
            "Painted {} operations on the page with index {}",
            operations.len(),
            page_index
        );

        Ok(())
    }

    /// Reads the drawing operations back from the content of the page. Constructs which do
    /// not correspond to a drawing operation are ignored.
    pub fn page_draw_operations(&self, page_index: usize) -> Result<Vec<DrawOp>, ContextError> {
        let page_id = self.page_id(page_index)?;
        let content = self
            .inner_document
            .get_page_content(page_id)
            .map_err(lopdf_error("Unable to read the content of the page"))?;
        let content = Content::decode(&content)
            .map_err(lopdf_error("Unable to decode the content of the page"))?;

        // Recognize the standard fonts among the fonts of the page
        let mut font_faces = HashMap::new();
        let resources = self.page_resources(page_id);
        if let Some(Object::Dictionary(font_resources)) = resources
            .get(b"Font")
            .ok()
            .and_then(|font_resources| resolve(&self.inner_document, font_resources))
        {
            for (font_name, font) in font_resources.iter() {
                let base_font = resolve(&self.inner_document, font)
                    .and_then(|font| font.as_dict().ok())
                    .and_then(|font| font.get(b"BaseFont").ok())
                    .and_then(|base_font| base_font.as_name().ok());
                if base_font == Some(FontFace::Bold.base_font().as_bytes()) {
                    font_faces.insert(font_name.clone(), FontFace::Bold);
                } else if base_font == Some(FontFace::Regular.base_font().as_bytes()) {
                    font_faces.insert(font_name.clone(), FontFace::Regular);
                }
            }
        }

        Ok(decode_draw_operations(&content.operations, &font_faces))
    }

    /// Copies the page into a new document of its own, or returns `None` when there is no
    /// page with the given index.
    ///
    /// Every object reachable from the page is deep-copied with fresh object IDs, the
    /// attributes the page inherits are set on the copy and references to the other pages of
    /// this document (such as link destinations) are dropped.
    pub fn extract_page(&self, page_index: usize) -> Result<Option<PdfDocument>, ContextError> {
        let Some(&source_page_id) = self.page_ids().get(page_index) else {
            return Ok(None);
        };
        let source_page = self
            .inner_document
            .get_object(source_page_id)
            .and_then(Object::as_dict)
            .map_err(lopdf_error("Unable to find the dictionary of the page"))?;

        let mut extracted = PdfDocument::new(&self.identifier);
        let pages_id = extracted.root_pages_id()?;
        let page_id = extracted.inner_document.new_object_id();

        let mut page = {
            let mut copier = ObjectCopier::new(&self.inner_document, &mut extracted.inner_document);
            // References to the page itself, from its annotations for example, are kept
            copier.copied.insert(source_page_id, page_id);

            let mut page = source_page.clone();
            page.remove(b"Parent");
            let mut page = copier.copy_dictionary(&page);
            for attribute in INHERITABLE_ATTRIBUTES {
                if page.has(attribute) {
                    continue;
                }
                if let Some(value) = inherited_attribute(&self.inner_document, source_page_id, attribute)
                {
                    page.set(attribute.to_vec(), copier.copy_object(value));
                }
            }
            log::debug!(
                "Copied {} objects for extracting the page with index {}",
                copier.copied.len(),
                page_index
            );

            page
        };
        if !page.has(b"MediaBox") {
            page.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(A4_WIDTH),
                    Object::Real(A4_HEIGHT),
                ]),
            );
        }
        page.set("Parent", Object::Reference(pages_id));
        extracted
            .inner_document
            .objects
            .insert(page_id, Object::Dictionary(page));
        extracted.append_to_page_tree(pages_id, page_id)?;

        Ok(Some(extracted))
    }

    /// Optimize the PDF document (only superficially): unreachable objects, such as
    /// resources replaced by `draw_on_page`, are dropped and the streams compressed.
    pub fn optimize(&mut self) {
        self.inner_document.prune_objects();
        self.inner_document.delete_zero_length_streams();
        self.inner_document.renumber_objects();
        self.inner_document.compress();
        // Renumbering invalidates the object IDs of the fonts
        self.fonts.clear();
    }

    /// Optimizes the `PdfDocument` and saves it to bytes in order for it to be written to a
    /// file or further processed.
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, ContextError> {
        self.optimize();

        let mut pdf_document_bytes = Vec::new();
        let mut writer = BufWriter::new(&mut pdf_document_bytes);
        self.inner_document.save_to(&mut writer).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Serialization,
                "Error while saving the PDF document to bytes",
                &error,
            )
        })?;
        mem::drop(writer);

        Ok(pdf_document_bytes)
    }

    /// Retrieve the root of the page tree from the catalog.
    fn root_pages_id(&self) -> Result<ObjectId, ContextError> {
        let catalog_id = self
            .inner_document
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(lopdf_error("Unable to find the catalog of the document"))?;
        self.inner_document
            .get_object(catalog_id)
            .and_then(Object::as_dict)
            .and_then(|catalog| catalog.get(b"Pages"))
            .and_then(Object::as_reference)
            .map_err(lopdf_error("Unable to find the page tree of the document"))
    }

    fn append_to_page_tree(&mut self, pages_id: ObjectId, page_id: ObjectId) -> Result<(), ContextError> {
        let pages = self
            .inner_document
            .get_object_mut(pages_id)
            .and_then(Object::as_dict_mut)
            .map_err(lopdf_error("Unable to find the page tree of the document"))?;
        let count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
        match pages.get_mut(b"Kids").and_then(Object::as_array_mut) {
            Ok(kids) => kids.push(Object::Reference(page_id)),
            Err(_) => pages.set("Kids", Object::Array(vec![Object::Reference(page_id)])),
        }
        pages.set("Count", Object::Integer(count + 1));

        Ok(())
    }

    /// A copy of the resources of the page, inherited or not, with the indirection resolved.
    fn page_resources(&self, page_id: ObjectId) -> Dictionary {
        inherited_attribute(&self.inner_document, page_id, b"Resources")
            .and_then(|resources| resolve(&self.inner_document, resources))
            .and_then(|resources| resources.as_dict().ok())
            .cloned()
            .unwrap_or_default()
    }

    /// The references to the content streams of the page, whether `Contents` is a single
    /// stream, an array or a reference to an array.
    fn page_content_references(&self, page_id: ObjectId) -> Vec<Object> {
        let contents = self
            .inner_document
            .get_object(page_id)
            .and_then(Object::as_dict)
            .and_then(|page| page.get(b"Contents"));
        match contents {
            Ok(Object::Reference(contents_id)) => match self.inner_document.get_object(*contents_id) {
                Ok(Object::Array(contents)) => contents.clone(),
                Ok(_) => vec![Object::Reference(*contents_id)],
                Err(_) => Vec::new(),
            },
            Ok(Object::Array(contents)) => contents.clone(),
            _ => Vec::new(),
        }
    }

    fn add_content_stream(&mut self, operations: Vec<Operation>) -> Result<ObjectId, ContextError> {
        let content = Content { operations }.encode().map_err(|error| {
            ContextError::with_error(
                ErrorKind::Serialization,
                "Failed to encode the page content",
                &error,
            )
        })?;

        Ok(self
            .inner_document
            .add_object(lopdf::Stream::new(Dictionary::new(), content)))
    }

    /// The name under which the font resources of a page already provide the standard font
    /// of the face, with the encoding used for writing text.
    fn matching_font_name(&self, font_resources: &Dictionary, face: FontFace) -> Option<Vec<u8>> {
        font_resources.iter().find_map(|(font_name, font)| {
            let font = resolve(&self.inner_document, font)?.as_dict().ok()?;
            let is_matching = font.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Type1".as_slice())
                && font.get(b"BaseFont").and_then(Object::as_name).ok()
                    == Some(face.base_font().as_bytes())
                && font.get(b"Encoding").and_then(Object::as_name).ok()
                    == Some(b"WinAnsiEncoding".as_slice());

            is_matching.then(|| font_name.clone())
        })
    }

    /// The font object of the face, added to the document the first time it is needed.
    fn font_object(&mut self, face: FontFace) -> ObjectId {
        if let Some(font_id) = self.fonts.get(&face) {
            return *font_id;
        }

        let font = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(face.base_font().as_bytes().to_vec())),
            ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
        ]);
        let font_id = self.inner_document.add_object(font);
        self.fonts.insert(face, font_id);

        font_id
    }
}

/// Deep copy of objects from one document into another, every copied object receiving a
/// new object ID in the target document. Objects reachable through several paths are
/// copied once.
struct ObjectCopier<'a> {
    source: &'a lopdf::Document,
    target: &'a mut lopdf::Document,
    copied: HashMap<ObjectId, ObjectId>,
}

impl<'a> ObjectCopier<'a> {
    fn new(source: &'a lopdf::Document, target: &'a mut lopdf::Document) -> Self {
        ObjectCopier {
            source,
            target,
            copied: HashMap::new(),
        }
    }

    fn copy_reference(&mut self, object_id: ObjectId) -> Object {
        if let Some(copied_id) = self.copied.get(&object_id) {
            return Object::Reference(*copied_id);
        }
        let source = self.source;
        let Ok(object) = source.get_object(object_id) else {
            return Object::Null;
        };
        // Only the extracted page belongs to the new page tree
        if is_page_tree_node(object) {
            return Object::Null;
        }

        let copied_id = self.target.new_object_id();
        self.copied.insert(object_id, copied_id);
        let copy = self.copy_object(object);
        self.target.objects.insert(copied_id, copy);

        Object::Reference(copied_id)
    }

    fn copy_object(&mut self, object: &Object) -> Object {
        match object {
            Object::Reference(object_id) => self.copy_reference(*object_id),
            Object::Array(items) => {
                Object::Array(items.iter().map(|item| self.copy_object(item)).collect())
            }
            Object::Dictionary(dictionary) => Object::Dictionary(self.copy_dictionary(dictionary)),
            Object::Stream(stream) => {
                let mut copy = stream.clone();
                copy.dict = self.copy_dictionary(&stream.dict);
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    fn copy_dictionary(&mut self, dictionary: &Dictionary) -> Dictionary {
        dictionary
            .iter()
            .map(|(key, value)| (key.clone(), self.copy_object(value)))
            .collect()
    }
}

fn is_page_tree_node(object: &Object) -> bool {
    object
        .as_dict()
        .and_then(|dictionary| dictionary.get(b"Type"))
        .and_then(Object::as_name)
        .map_or(false, |name| name == b"Page" || name == b"Pages")
}

/// Follows references until a direct object is reached.
fn resolve<'a>(document: &'a lopdf::Document, object: &'a Object) -> Option<&'a Object> {
    let mut object = object;
    for _ in 0..MAXIMUM_DEPTH {
        match object {
            Object::Reference(object_id) => object = document.get_object(*object_id).ok()?,
            direct => return Some(direct),
        }
    }

    None
}

/// Looks the attribute up on the page, then on its ancestors in the page tree.
fn inherited_attribute<'a>(
    document: &'a lopdf::Document,
    page_id: ObjectId,
    attribute: &[u8],
) -> Option<&'a Object> {
    let mut node = document.get_object(page_id).and_then(Object::as_dict).ok()?;
    for _ in 0..MAXIMUM_DEPTH {
        if let Ok(value) = node.get(attribute) {
            return Some(value);
        }
        let parent_id = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = document.get_object(parent_id).and_then(Object::as_dict).ok()?;
    }

    None
}

/// A name which is not yet used in the font resources, starting from the preferred one.
fn free_resource_name(font_resources: &Dictionary, preferred: &str) -> Vec<u8> {
    let mut candidate = preferred.as_bytes().to_vec();
    let mut suffix = 1;
    while font_resources.has(&candidate) {
        candidate = format!("{}{}", preferred, suffix).into_bytes();
        suffix += 1;
    }

    candidate
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

/// Formats the given time so that it matches what the PDF specification expects.
/// An example of it is the following: D:20170505150224+02'00'.
fn to_pdf_timestamp_format(date: &OffsetDateTime) -> String {
    let offset = date.offset();
    let offset_sign = if offset.is_negative() { '-' } else { '+' };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}{offset_sign}{:02}'{:02}'",
        date.year(),
        u8::from(date.month()),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
        offset.whole_hours().abs(),
        offset.minutes_past_hour().abs(),
    )
}
