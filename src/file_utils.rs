//! The selected file and the checks run on it before anything else happens.

use crate::data_url;
use crate::schema::HandlerError;

/// The only content type the handler accepts.
pub const PDF_MIME: &str = "application/pdf";

/// A user-selected file, as far as the handler needs to see it.
///
/// The preview reads its own copy through [`SourceFile::read_data_url`]; the
/// upload hands the file itself to the [`Transport`](crate::handler::Transport).
#[allow(async_fn_in_trait)]
pub trait SourceFile {
    /// Display name, used for the viewer and the multipart `filename`.
    fn name(&self) -> String;

    /// Content type declared by whoever produced the file (the browser).
    fn content_type(&self) -> String;

    /// The whole file as a `data:` URL.
    async fn read_data_url(&self) -> Result<String, HandlerError>;
}

/// A file held entirely in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

impl SourceFile for MemoryFile {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn content_type(&self) -> String {
        self.content_type.clone()
    }

    async fn read_data_url(&self) -> Result<String, HandlerError> {
        Ok(data_url::encode(&self.content_type, &self.bytes))
    }
}

/// Accepts a selection only if there is a file and its declared type is
/// exactly `application/pdf`.
///
/// The comparison is exact: `application/PDF` or a type with parameters is
/// rejected, as is a PDF the browser could not type (empty content type).
pub fn validate_selection<F: SourceFile>(selected: Option<F>) -> Result<F, HandlerError> {
    let file = selected.ok_or(HandlerError::NoFileSelected)?;
    let content_type = file.content_type();
    if content_type != PDF_MIME {
        return Err(HandlerError::NotPdf { content_type });
    }
    Ok(file)
}
