use actix_multipart::Multipart;
use actix_web::web;
use futures_util::TryStreamExt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "doc", "docx"];
/// Files accepted in one multipart request.
pub const MAX_FILES_PER_UPLOAD: usize = 5;

#[derive(Debug)]
pub struct SavedFile {
    pub original_name: String,
    pub stored_name: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
}

/// Lower-cased extension of an accepted attachment name.
pub fn validated_extension(filename: &str) -> ApiResult<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| ApiError::bad_request(format!("File '{filename}' has no extension")))?;

    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(ApiError::bad_request(format!(
            "File type '.{ext}' is not allowed (accepted: {})",
            ALLOWED_EXTENSIONS.join(", ")
        )))
    }
}

/// Strips any client-supplied directory part.
pub fn display_name(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .to_string()
}

pub fn stored_name(ext: &str) -> String {
    format!("{}.{}", Uuid::new_v4(), ext)
}

fn ensure_file_slot(already_read: usize) -> ApiResult<()> {
    if already_read >= MAX_FILES_PER_UPLOAD {
        return Err(ApiError::bad_request(format!(
            "At most {MAX_FILES_PER_UPLOAD} files can be uploaded at once"
        )));
    }
    Ok(())
}

/// Reads every file field of the payload and writes it under `dir`.
/// Nothing is written unless every part is accepted.
pub async fn save_multipart(
    mut payload: Multipart,
    dir: &Path,
    max_bytes: usize,
) -> ApiResult<Vec<SavedFile>> {
    let mut pending: Vec<(SavedFile, Vec<u8>)> = Vec::new();

    while let Some(mut field) = payload.try_next().await? {
        let Some(filename) = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(display_name)
        else {
            // plain form fields carry no attachment
            continue;
        };

        ensure_file_slot(pending.len())?;
        let ext = validated_extension(&filename)?;
        let content_type = field.content_type().map(|m| m.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(ApiError::bad_request(format!(
                    "File '{filename}' exceeds the {max_bytes} byte limit"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        pending.push((
            SavedFile {
                original_name: filename,
                stored_name: stored_name(&ext),
                content_type,
                size_bytes: bytes.len() as u64,
            },
            bytes,
        ));
    }

    if pending.is_empty() {
        return Err(ApiError::bad_request("No file found in the upload"));
    }

    let mut saved: Vec<SavedFile> = Vec::with_capacity(pending.len());
    for (file, bytes) in pending {
        let path: PathBuf = dir.join(&file.stored_name);
        let written = web::block(move || std::fs::write(path, bytes))
            .await
            .map_err(|e| ApiError::internal(format!("upload worker failed: {e}")))
            .and_then(|r| r.map_err(ApiError::from));
        if let Err(e) = written {
            remove_files(dir, saved.into_iter().map(|f| f.stored_name).collect()).await;
            return Err(e);
        }
        saved.push(file);
    }
    Ok(saved)
}

/// Best-effort removal of stored attachments.
pub async fn remove_files(dir: &Path, stored_names: Vec<String>) {
    for name in stored_names {
        let path = dir.join(&name);
        match web::block(move || std::fs::remove_file(path)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, file = %name, "Failed to remove attachment"),
            Err(e) => tracing::warn!(error = %e, file = %name, "Attachment removal worker failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_extensions_case_insensitively() {
        assert_eq!(validated_extension("certificate.PDF").unwrap(), "pdf");
        assert_eq!(validated_extension("scan.jpeg").unwrap(), "jpeg");
    }

    #[test]
    fn refuses_unknown_or_missing_extensions() {
        assert!(validated_extension("payload.exe").is_err());
        assert!(validated_extension("README").is_err());
    }

    #[test]
    fn client_paths_are_stripped() {
        assert_eq!(display_name("../../etc/passwd.pdf"), "passwd.pdf");
        assert_eq!(display_name(r"C:\docs\note.docx"), "note.docx");
    }

    #[test]
    fn file_count_is_capped() {
        assert!(ensure_file_slot(0).is_ok());
        assert!(ensure_file_slot(MAX_FILES_PER_UPLOAD - 1).is_ok());
        assert!(ensure_file_slot(MAX_FILES_PER_UPLOAD).is_err());
    }

    #[test]
    fn stored_names_are_unique_and_keep_the_extension() {
        let a = stored_name("pdf");
        let b = stored_name("pdf");
        assert_ne!(a, b);
        assert!(a.ends_with(".pdf"));
    }
}
