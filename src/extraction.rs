//! PDF text extraction and transient upload storage.
//!
//! Text layers are read with `pdf-extract` on a blocking thread. Scanned, image-only PDFs have
//! no text layer and come back empty; the pipeline reports those as empty documents. Uploaded
//! bytes are written to a [`TempUpload`] whose file is removed when the guard drops, so the copy
//! never outlives the request regardless of how it ends.

use crate::processing::ExtractionError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Uploaded document persisted for the duration of one request.
#[derive(Debug)]
pub struct TempUpload {
    file: NamedTempFile,
}

impl TempUpload {
    /// Write `bytes` into a fresh file under `dir`, creating the directory if needed.
    pub fn persist(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<Self, ExtractionError> {
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&upload_suffix(file_name))
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        tracing::debug!(
            path = %file.path().display(),
            bytes = bytes.len(),
            "Persisted upload"
        );
        Ok(Self { file })
    }

    /// Location of the temporary copy.
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

fn upload_suffix(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| ".pdf".to_string())
}

/// Extract the text layer of every page, concatenated in page order.
pub async fn extract_pdf_text(path: &Path) -> Result<String, ExtractionError> {
    let bytes = tokio::fs::read(path).await?;
    let source: PathBuf = path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|error| ExtractionError::Parse(format!("extraction task failed: {error}")))?
        .map_err(|error| ExtractionError::Parse(error.to_string()))?;
    tracing::info!(
        path = %source.display(),
        chars = text.chars().count(),
        "PDF text extraction complete"
    );
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a one-page PDF with a Helvetica text layer.
    fn make_test_pdf(text: &str) -> Vec<u8> {
        use lopdf::dictionary;
        use lopdf::{Document, Object, Stream};

        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("serialize pdf");
        bytes
    }

    #[tokio::test]
    async fn extracts_text_layer() {
        let dir = tempfile::tempdir().expect("temp dir");
        let upload = TempUpload::persist(
            dir.path(),
            "lease.pdf",
            &make_test_pdf("Lease agreement between parties"),
        )
        .expect("persist");

        let text = extract_pdf_text(upload.path()).await.expect("extract");

        assert!(text.contains("Lease agreement"));
    }

    #[tokio::test]
    async fn garbage_bytes_are_a_parse_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let upload =
            TempUpload::persist(dir.path(), "broken.pdf", b"definitely not a pdf").expect("persist");

        let error = extract_pdf_text(upload.path()).await.expect_err("parse error");

        assert!(matches!(error, ExtractionError::Parse(_)));
    }

    #[test]
    fn upload_is_removed_on_drop() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = {
            let upload = TempUpload::persist(dir.path(), "doc.pdf", b"%PDF-1.4").expect("persist");
            let path = upload.path().to_path_buf();
            assert!(path.exists());
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("pdf"));
            path
        };
        assert!(!path.exists());
    }

    #[test]
    fn suffix_ignores_suspicious_extensions() {
        assert_eq!(upload_suffix("report.PDF"), ".PDF");
        assert_eq!(upload_suffix("../../etc/passwd"), ".pdf");
        assert_eq!(upload_suffix("weird.p/df"), ".pdf");
    }
}
