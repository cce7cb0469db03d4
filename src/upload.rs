use crate::storage::secure_filename;
use crate::types::{extension_of, has_allowed_extension, ConversionError};
use actix_multipart::Multipart;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content: Bytes,
}

impl UploadedFile {
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    pub fn safe_name(&self) -> String {
        secure_filename(&self.file_name)
    }

    /// Extension of the sanitized name, lower-cased.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.safe_name())
    }

    pub fn is_allowed(&self, allowed: &[&str]) -> bool {
        has_allowed_extension(&self.safe_name(), allowed)
    }
}

/// A multipart request body held in memory: file parts in arrival order and
/// plain text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    files: Vec<UploadedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Drain a multipart stream, failing once more than `limit` bytes of part
    /// data have arrived.
    ///
    /// A file part with an empty filename (an untouched file input) is
    /// dropped. For repeated text fields the first value wins.
    pub async fn collect(mut payload: Multipart, limit: usize) -> Result<Self, ConversionError> {
        let mut form = UploadForm::default();
        let mut total = 0usize;

        while let Some(item) = payload.next().await {
            let mut field = item.map_err(|e| ConversionError::Multipart(e.to_string()))?;

            let (name, file_name) = {
                let disposition = field.content_disposition();
                (
                    disposition.get_name().unwrap_or_default().to_string(),
                    disposition.get_filename().map(str::to_string),
                )
            };

            let mut data = BytesMut::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk.map_err(|e| ConversionError::Multipart(e.to_string()))?;
                total += chunk.len();
                if total > limit {
                    log::warn!("Upload rejected: more than {} bytes", limit);
                    return Err(ConversionError::UploadTooLarge { limit });
                }
                data.extend_from_slice(&chunk);
            }

            match file_name {
                Some(file_name) if !file_name.is_empty() => {
                    log::debug!("Received file {} ({} bytes) in field {}", file_name, data.len(), name);
                    form.files.push(UploadedFile::new(name, file_name, data.freeze()));
                }
                Some(_) => {}
                None => {
                    form.fields
                        .entry(name)
                        .or_insert_with(|| String::from_utf8_lossy(&data).into_owned());
                }
            }
        }

        Ok(form)
    }

    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.entry(name.into()).or_insert(value.into());
        self
    }

    /// Every file uploaded under `field`, in upload order.
    pub fn files<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files.iter().filter(move |f| f.field == field)
    }

    /// First file uploaded under `field`.
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn total_files(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_uses_sanitized_name() {
        let file = UploadedFile::new("pdf", "../My Scan.PDF", &b"%PDF"[..]);
        assert_eq!(file.safe_name(), "My_Scan.PDF");
        assert_eq!(file.extension().as_deref(), Some("pdf"));
        assert!(file.is_allowed(&["pdf"]));
        assert!(!UploadedFile::new("pdf", "noext", &b""[..]).is_allowed(&["pdf"]));
    }

    #[test]
    fn test_form_lookup_by_field() {
        let form = UploadForm::default()
            .with_file(UploadedFile::new("pdfs", "a.pdf", &b"a"[..]))
            .with_file(UploadedFile::new("other", "x.pdf", &b"x"[..]))
            .with_file(UploadedFile::new("pdfs", "b.pdf", &b"b"[..]))
            .with_field("ranges", "1-3")
            .with_field("ranges", "ignored");

        let names: Vec<&str> = form.files("pdfs").map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
        assert_eq!(form.file("other").unwrap().content.as_ref(), b"x");
        assert!(form.file("missing").is_none());
        assert_eq!(form.text("ranges"), Some("1-3"));
        assert_eq!(form.total_files(), 3);
    }

    #[test]
    fn test_file_lookup_outlives_field_name() {
        let form = UploadForm::default().with_file(UploadedFile::new("pdf", "doc.pdf", &b"%PDF"[..]));
        let found = {
            let field = String::from("pdf");
            form.file(&field).map(|f| f.file_name.as_str())
        };
        assert_eq!(found, Some("doc.pdf"));
    }
}
