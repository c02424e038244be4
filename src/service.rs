use base64::Engine as _;
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::builder::{compose_from_builder, BuilderFields};
use crate::configuration::Settings;
use crate::definition::{compose_from_definition, JsonDefinition};
use crate::error::{ContextError, ErrorKind};
use crate::pages::{ensure_two_pages, extract_single_page};
use crate::stamp::{stamp_qr_codes, QrOptions};
use crate::storage::BlobStore;

/// Number of random base36 characters at the end of a document ID.
const RANDOM_ID_SUFFIX_LENGTH: usize = 7;
const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// How the content of a document was provided.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CreationMethod {
    /// Fields of the two-page form, laid out by the builder.
    Builder,
    /// A declarative definition of pages and elements.
    Json,
    /// An existing PDF document, encoded in base64.
    Upload,
}

impl CreationMethod {
    pub fn parse(method: &str) -> Option<CreationMethod> {
        match method {
            "builder" => Some(CreationMethod::Builder),
            "json" => Some(CreationMethod::Json),
            "upload" => Some(CreationMethod::Upload),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CreationMethod::Builder => "builder",
            CreationMethod::Json => "json",
            CreationMethod::Upload => "upload",
        }
    }
}

/// A request for creating a document, as submitted by a client.
///
/// `data` holds the builder fields, the JSON definition or `{"base64": ...}` depending on
/// the method, and may carry the `qrOptions` in every case.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SubmissionRequest {
    pub method: Option<String>,
    pub name: Option<String>,
    pub data: Option<serde_json::Value>,
}

/// The metadata kept alongside every stored document.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub name: String,
    pub method: CreationMethod,
    /// RFC 3339 timestamp of the creation.
    pub created_at: String,
    pub viewer_url: String,
    pub download_url: String,
}

impl DocumentRecord {
    fn created_at_time(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.created_at, &Rfc3339).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Displayed by the client.
    Inline,
    /// Saved by the client.
    Attachment,
}

/// A document, or one of its pages, ready to be sent to a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ServedDocument {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub disposition: Disposition,
}

impl ServedDocument {
    /// The value of the `Content-Disposition` header for the document.
    pub fn content_disposition(&self) -> String {
        let disposition = match self.disposition {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        };
        format!("{}; filename=\"{}\"", disposition, self.file_name)
    }

    /// The value of the `Content-Type` header for the document.
    pub fn content_type(&self) -> &'static str {
        PDF_CONTENT_TYPE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServeOutcome {
    Document(ServedDocument),
    DocumentNotFound,
    PageNotFound,
}

/// Formats the number in base 36 with lowercase digits.
fn to_base36(mut value: u128) -> String {
    let mut digits = Vec::new();
    loop {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    digits.reverse();

    String::from_utf8_lossy(&digits).into_owned()
}

/// Generates a new document ID: the milliseconds since the UNIX epoch in base 36, followed by
/// 7 random base36 characters. IDs generated later sort after, as long as their timestamps
/// have the same number of digits.
pub fn generate_id() -> String {
    let milliseconds = (OffsetDateTime::now_utc() - OffsetDateTime::UNIX_EPOCH)
        .whole_milliseconds()
        .max(0) as u128;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..RANDOM_ID_SUFFIX_LENGTH)
        .map(|_| char::from(BASE36_DIGITS[rng.gen_range(0..BASE36_DIGITS.len())]))
        .collect();

    format!("{}{}", to_base36(milliseconds), suffix)
}

fn invalid_request(context: impl Into<String>) -> ContextError {
    ContextError::with_context(ErrorKind::InvalidRequest, context)
}

/// Creates, stamps, stores and serves documents.
///
/// Documents and their records live in two separate stores under the same key, the
/// document ID. Every created document carries on its first page a QR code of its viewer URL
/// and on its second page a QR code of its download URL.
pub struct DocumentService<S: BlobStore> {
    documents: S,
    records: S,
    site_url: String,
    settings: Settings,
}

impl<S: BlobStore> DocumentService<S> {
    pub fn new(documents: S, records: S, site_url: &str, settings: Settings) -> Self {
        DocumentService {
            documents,
            records,
            site_url: site_url.trim_end_matches('/').to_string(),
            settings,
        }
    }

    pub fn viewer_url(&self, id: &str) -> String {
        format!("{}/pdf/viewer/{}/", self.site_url, id)
    }

    pub fn download_url(&self, id: &str) -> String {
        format!("{}/pdf/download/{}/", self.site_url, id)
    }

    /// Composes the document of the request, stamps its QR codes and stores it together with
    /// its record, which is returned.
    pub fn submit(&self, request: &SubmissionRequest) -> Result<DocumentRecord, ContextError> {
        let method = request.method.as_deref().ok_or_else(|| {
            invalid_request("Missing \"method\" field, use one of: builder, json, upload")
        })?;
        let method = CreationMethod::parse(method).ok_or_else(|| {
            invalid_request(format!(
                "Invalid method {:?}, use one of: builder, json, upload",
                method
            ))
        })?;
        let data = request.data.clone().unwrap_or(serde_json::Value::Null);

        let id = generate_id();
        let viewer_url = self.viewer_url(&id);
        let download_url = self.download_url(&id);

        let composed = self.compose(method, &data)?;
        let qr_options = match data.get("qrOptions") {
            None | Some(serde_json::Value::Null) => QrOptions::default(),
            Some(qr_options) => serde_json::from_value(qr_options.clone()).map_err(|error| {
                ContextError::with_error(
                    ErrorKind::InvalidRequest,
                    "Unable to interpret the QR options",
                    &error,
                )
            })?,
        };
        let stamped = stamp_qr_codes(
            &composed,
            &viewer_url,
            &download_url,
            &qr_options,
            &self.settings,
        )?;

        let created_at = OffsetDateTime::now_utc().format(&Rfc3339).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Serialization,
                "Unable to format the creation date",
                &error,
            )
        })?;
        let record = DocumentRecord {
            name: request
                .name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| format!("Document-{}", id)),
            id,
            method,
            created_at,
            viewer_url,
            download_url,
        };
        let record_bytes = serde_json::to_vec(&record).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Serialization,
                "Unable to serialize the document record",
                &error,
            )
        })?;

        self.documents.put(&record.id, &stamped)?;
        if let Err(error) = self.records.put(&record.id, &record_bytes) {
            // A document without its record could never be listed nor deleted
            if let Err(rollback_error) = self.documents.delete(&record.id) {
                log::warn!(
                    "Unable to remove the document {} left without a record: {}",
                    record.id,
                    rollback_error
                );
            }
            return Err(error);
        }
        log::info!(
            "Stored the document {} ({:?}, {} bytes) created with the {} method",
            record.id,
            record.name,
            stamped.len(),
            method.as_str()
        );

        Ok(record)
    }

    fn compose(
        &self,
        method: CreationMethod,
        data: &serde_json::Value,
    ) -> Result<Vec<u8>, ContextError> {
        match method {
            CreationMethod::Builder => {
                let fields: BuilderFields = match data {
                    serde_json::Value::Null => BuilderFields::default(),
                    data => serde_json::from_value(data.clone()).map_err(|error| {
                        ContextError::with_error(
                            ErrorKind::InvalidRequest,
                            "Unable to interpret the builder fields",
                            &error,
                        )
                    })?,
                };
                compose_from_builder(&fields, &self.settings)
            }
            CreationMethod::Json => {
                let definition = match data {
                    serde_json::Value::Null => JsonDefinition::default(),
                    data => JsonDefinition::from_value(data.clone())?,
                };
                compose_from_definition(&definition, &self.settings)
            }
            CreationMethod::Upload => {
                let encoded = data
                    .get("base64")
                    .and_then(serde_json::Value::as_str)
                    .ok_or_else(|| invalid_request("Missing base64 PDF data"))?;
                let uploaded = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|error| {
                        ContextError::with_error(
                            ErrorKind::InvalidRequest,
                            "Unable to decode the base64 PDF data",
                            &error,
                        )
                    })?;
                ensure_two_pages(&uploaded, &self.settings)
            }
        }
    }

    /// The records of all the stored documents, the most recent first. Records which cannot
    /// be read back are left out.
    pub fn list(&self) -> Result<Vec<DocumentRecord>, ContextError> {
        let mut records = Vec::new();
        for id in self.records.list()? {
            match self.record(&id) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(error) => log::warn!("Skipping the record {}: {}", id, error),
            }
        }
        records.sort_by(|left, right| right.created_at_time().cmp(&left.created_at_time()));

        Ok(records)
    }

    pub fn record(&self, id: &str) -> Result<Option<DocumentRecord>, ContextError> {
        let Some(record_bytes) = self.records.get(id)? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&record_bytes).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Serialization,
                format!("Unable to parse the record of the document {}", id),
                &error,
            )
        })?;

        Ok(Some(record))
    }

    /// Retrieves a stored document, or only one of its pages when `page` holds a 1-based page
    /// number. A page which is not a number or not in the document is not found.
    pub fn serve(
        &self,
        id: &str,
        page: Option<&str>,
        download: bool,
    ) -> Result<ServeOutcome, ContextError> {
        let Some(document_bytes) = self.documents.get(id)? else {
            return Ok(ServeOutcome::DocumentNotFound);
        };
        let disposition = if download {
            Disposition::Attachment
        } else {
            Disposition::Inline
        };

        let served = match page.filter(|page| !page.is_empty()) {
            None => ServedDocument {
                bytes: document_bytes,
                file_name: format!("document-{}.pdf", id),
                disposition,
            },
            Some(page) => {
                let page = page.trim();
                let Ok(page_number) = page.parse::<i64>() else {
                    return Ok(ServeOutcome::PageNotFound);
                };
                match extract_single_page(&document_bytes, page_number.saturating_sub(1))? {
                    Some(page_bytes) => ServedDocument {
                        bytes: page_bytes,
                        file_name: format!("document-{}-page{}.pdf", id, page),
                        disposition,
                    },
                    None => return Ok(ServeOutcome::PageNotFound),
                }
            }
        };

        Ok(ServeOutcome::Document(served))
    }

    /// Removes the record and then the document, so that a listed record always has its
    /// document. Removing a missing document is not an error.
    pub fn delete(&self, id: &str) -> Result<(), ContextError> {
        self.records.delete(id)?;
        self.documents.delete(id)?;
        log::info!("Deleted the document {}", id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::PdfDocument;
    use crate::storage::MemoryStore;

    fn service() -> DocumentService<MemoryStore> {
        DocumentService::new(
            MemoryStore::new(),
            MemoryStore::new(),
            "https://example.org/",
            Settings::default(),
        )
    }

    fn request(method: &str, data: serde_json::Value) -> SubmissionRequest {
        SubmissionRequest {
            method: Some(method.into()),
            name: None,
            data: Some(data),
        }
    }

    #[test]
    fn base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn generated_ids_are_keys() {
        let id = generate_id();
        assert!(id.len() > RANDOM_ID_SUFFIX_LENGTH);
        assert!(crate::storage::validate_key(&id).is_ok());
        assert_ne!(generate_id(), id);
    }

    #[test]
    fn builder_submission() {
        let service = service();
        let record = service
            .submit(&request("builder", serde_json::json!({"title": "Hello"})))
            .unwrap();

        assert_eq!(record.method, CreationMethod::Builder);
        assert_eq!(record.name, format!("Document-{}", record.id));
        assert_eq!(
            record.viewer_url,
            format!("https://example.org/pdf/viewer/{}/", record.id)
        );
        assert_eq!(
            record.download_url,
            format!("https://example.org/pdf/download/{}/", record.id)
        );
        assert_eq!(service.record(&record.id).unwrap(), Some(record.clone()));

        let ServeOutcome::Document(served) = service.serve(&record.id, None, false).unwrap() else {
            panic!("The document should be served");
        };
        assert_eq!(served.file_name, format!("document-{}.pdf", record.id));
        assert_eq!(
            served.content_disposition(),
            format!("inline; filename=\"document-{}.pdf\"", record.id)
        );
        assert_eq!(served.content_type(), "application/pdf");
        assert_eq!(PdfDocument::load_from_bytes(&served.bytes).unwrap().page_count(), 2);
    }

    #[test]
    fn serving_pages() {
        let service = service();
        let record = service
            .submit(&request("json", serde_json::json!({"pages": [{}, {}, {}]})))
            .unwrap();

        let ServeOutcome::Document(served) = service.serve(&record.id, Some("3"), true).unwrap()
        else {
            panic!("The third page should be served");
        };
        assert_eq!(served.disposition, Disposition::Attachment);
        assert_eq!(served.file_name, format!("document-{}-page3.pdf", record.id));
        assert_eq!(PdfDocument::load_from_bytes(&served.bytes).unwrap().page_count(), 1);

        // Trailing garbage is not read as a page number
        for page in ["0", "4", "-1", "two", "2abc", "2.5"] {
            assert_eq!(
                service.serve(&record.id, Some(page), false).unwrap(),
                ServeOutcome::PageNotFound
            );
        }
        assert_eq!(
            service.serve("unknown", None, false).unwrap(),
            ServeOutcome::DocumentNotFound
        );

        let ServeOutcome::Document(served) = service.serve(&record.id, Some(" 2 "), false).unwrap()
        else {
            panic!("The second page should be served");
        };
        assert_eq!(served.file_name, format!("document-{}-page2.pdf", record.id));
    }

    #[test]
    fn upload_submission() {
        let mut pdf_document = PdfDocument::new("upload");
        pdf_document.add_page(300.0, 300.0).unwrap();
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(pdf_document.save_to_bytes().unwrap());

        let service = service();
        let record = service
            .submit(&SubmissionRequest {
                method: Some("upload".into()),
                name: Some("Scanned".into()),
                data: Some(serde_json::json!({"base64": encoded, "qrOptions": {"qrSize": 40}})),
            })
            .unwrap();
        assert_eq!(record.name, "Scanned");

        let ServeOutcome::Document(served) = service.serve(&record.id, None, false).unwrap() else {
            panic!("The document should be served");
        };
        let stamped = PdfDocument::load_from_bytes(&served.bytes).unwrap();
        assert_eq!(stamped.page_count(), 2);
        assert_eq!(stamped.page_size(0).unwrap(), (300.0, 300.0));
    }

    #[test]
    fn invalid_requests() {
        let service = service();
        for request in [
            SubmissionRequest::default(),
            request("fax", serde_json::Value::Null),
            request("upload", serde_json::json!({})),
            request("upload", serde_json::json!({"base64": "***"})),
            request("builder", serde_json::json!({"qrOptions": {"qrSize": "big"}})),
        ] {
            let error = service.submit(&request).unwrap_err();
            assert_eq!(error.kind, ErrorKind::InvalidRequest, "{:?}", request);
        }

        let error = service
            .submit(&request("json", serde_json::json!({"pages": "abc"})))
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::MalformedDefinition);
        assert!(service.list().unwrap().is_empty());
    }

    #[test]
    fn listing_and_deleting() {
        let service = service();
        let first = service
            .submit(&request("builder", serde_json::Value::Null))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = service
            .submit(&request("json", serde_json::Value::Null))
            .unwrap();

        let records = service.list().unwrap();
        assert_eq!(records, vec![second.clone(), first.clone()]);

        service.delete(&second.id).unwrap();
        service.delete(&second.id).unwrap();
        assert_eq!(service.list().unwrap(), vec![first]);
        assert_eq!(service.record(&second.id).unwrap(), None);
        assert_eq!(
            service.serve(&second.id, None, false).unwrap(),
            ServeOutcome::DocumentNotFound
        );
    }

    /// A memory store whose writes or deletions can be made to fail.
    #[derive(Default)]
    struct FailingStore {
        blobs: MemoryStore,
        failing_puts: bool,
        failing_deletes: bool,
    }

    impl FailingStore {
        fn failure() -> ContextError {
            ContextError::with_context(ErrorKind::Storage, "Disk full")
        }
    }

    impl BlobStore for FailingStore {
        fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ContextError> {
            if self.failing_puts {
                return Err(FailingStore::failure());
            }
            self.blobs.put(key, bytes)
        }

        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ContextError> {
            self.blobs.get(key)
        }

        fn delete(&self, key: &str) -> Result<(), ContextError> {
            if self.failing_deletes {
                return Err(FailingStore::failure());
            }
            self.blobs.delete(key)
        }

        fn list(&self) -> Result<Vec<String>, ContextError> {
            self.blobs.list()
        }
    }

    #[test]
    fn failed_record_write_removes_the_document() {
        let service = DocumentService::new(
            FailingStore::default(),
            FailingStore {
                failing_puts: true,
                ..Default::default()
            },
            "https://example.org",
            Settings::default(),
        );

        let error = service
            .submit(&request("builder", serde_json::Value::Null))
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Storage);
        assert_eq!(error.context, "Disk full");
        assert!(service.documents.list().unwrap().is_empty());
        assert!(service.list().unwrap().is_empty());
    }

    #[test]
    fn failed_document_deletion_leaves_no_dangling_record() {
        let service = DocumentService::new(
            FailingStore {
                failing_deletes: true,
                ..Default::default()
            },
            FailingStore::default(),
            "https://example.org",
            Settings::default(),
        );
        let record = service
            .submit(&request("json", serde_json::Value::Null))
            .unwrap();

        let error = service.delete(&record.id).unwrap_err();
        assert_eq!(error.kind, ErrorKind::Storage);
        assert!(service.list().unwrap().is_empty());
        assert_eq!(service.record(&record.id).unwrap(), None);
    }
}
