use serde::{Deserialize, Serialize};

/// The broad category of an error, so that callers can tell broken input apart from
/// broken infrastructure without parsing the message.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The JSON page definitions are structurally invalid.
    MalformedDefinition,
    /// The supplied bytes cannot be loaded as a PDF document.
    UnparsablePdf,
    /// The text does not fit into any QR version at the requested error correction level.
    EncodingOverflow,
    /// A submission request is missing required fields or names an unknown method.
    InvalidRequest,
    /// The blob store failed to read, write, list or delete.
    Storage,
    /// A document or record could not be serialized.
    Serialization,
    /// The configuration file could not be read or parsed.
    Configuration,
}

/// A struct that represents an error with a context and possibly the propagated source error.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ContextError {
    pub kind: ErrorKind,
    pub context: String,
    pub source_error: Option<String>,
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source_error {
            Some(source_error) => write!(
                formatter,
                "{}: {}",
                self.context,
                minimize_first_letter(source_error.to_string()),
            ),
            None => write!(formatter, "{}", self.context),
        }
    }
}

impl std::error::Error for ContextError {}

impl ContextError {
    /// Create a new `ContextError` of the given kind with the given context.
    pub fn with_context<S: Into<String>>(kind: ErrorKind, context: S) -> ContextError {
        ContextError {
            kind,
            context: context.into(),
            source_error: None,
        }
    }

    /// Create a new `ContextError` of the given kind with the given context and source error.
    pub fn with_error<S: Into<String>>(
        kind: ErrorKind,
        context: S,
        error: &dyn std::error::Error,
    ) -> ContextError {
        ContextError {
            kind,
            context: context.into(),
            source_error: Some(error.to_string()),
        }
    }

    /// Keeps the kind and the source of the error but replaces its context, used when an
    /// error crosses a boundary where the caller knows more about what was being attempted.
    pub fn recontextualize<S: Into<String>>(self, context: S) -> ContextError {
        let source_error = match self.source_error {
            Some(source_error) => format!("{}: {}", self.context, source_error),
            None => self.context,
        };

        ContextError {
            kind: self.kind,
            context: context.into(),
            source_error: Some(source_error),
        }
    }
}

/// Minimizes the first letter of a string, it is used for standardizing the error message.
fn minimize_first_letter(string: String) -> String {
    let mut characters = string.chars();
    match characters.next() {
        None => String::new(),
        Some(character) => character.to_lowercase().chain(characters).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lowercases_the_source_error() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file");
        let error = ContextError::with_error(ErrorKind::Storage, "Failed to read blob", &source);

        assert_eq!(error.to_string(), "Failed to read blob: no such file");
        assert_eq!(error.kind, ErrorKind::Storage);
    }

    #[test]
    fn recontextualize_keeps_the_kind() {
        let error = ContextError::with_context(ErrorKind::UnparsablePdf, "Missing catalog")
            .recontextualize("Failed to stamp the QR codes");

        assert_eq!(error.kind, ErrorKind::UnparsablePdf);
        assert_eq!(
            error.to_string(),
            "Failed to stamp the QR codes: missing catalog"
        );
    }
}
