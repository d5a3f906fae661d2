use axum::extract::Multipart;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::{ClaimField, ClaimForm, ReceiptImage};

const FALLBACK_MIME: &str = "application/octet-stream";

pub struct MimeValidator;

impl MimeValidator {
    /// Image type detected from magic bytes.
    pub fn sniff(data: &[u8]) -> Option<&'static str> {
        match data {
            // JPEG
            [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
            // PNG
            [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("image/png"),
            // GIF87a or GIF89a
            [0x47, 0x49, 0x46, 0x38, 0x37, 0x61, ..] | [0x47, 0x49, 0x46, 0x38, 0x39, 0x61, ..] => {
                Some("image/gif")
            }
            // WebP
            d if d.len() >= 12 && &d[0..4] == b"RIFF" && &d[8..12] == b"WEBP" => Some("image/webp"),
            // HEIC / HEIF (ISO BMFF `ftyp` box)
            d if d.len() >= 12 && &d[4..8] == b"ftyp" && matches!(&d[8..12], b"heic" | b"heix" | b"mif1" | b"msf1") => {
                Some("image/heic")
            }
            _ => None,
        }
    }

    /// MIME type to forward to the model. A declared `image/*` type wins;
    /// otherwise the bytes must look like an image.
    pub fn resolve(declared: Option<&str>, data: &[u8]) -> Result<String, String> {
        let declared = declared
            .map(|d| d.split(';').next().unwrap_or(d).trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty() && d != FALLBACK_MIME);

        match declared {
            Some(d) if d.starts_with("image/") => Ok(d),
            Some(d) => Err(format!("content type '{}' is not an image", d)),
            None => Self::sniff(data)
                .map(str::to_string)
                .ok_or_else(|| "could not detect image type from content".to_string()),
        }
    }
}

/// Collects the expense form from a multipart body.
///
/// Text fields are kept as sent; an empty file part becomes an empty image
/// so presence validation can report it. A part that is not an image is
/// recorded in `receipt_error` rather than failing the whole form.
pub async fn read_claim_form(multipart: &mut Multipart) -> Result<ClaimForm, AppError> {
    let mut form = ClaimForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading multipart body: {}", e);
                return Err(AppError::BadRequest(
                    "フォームデータを読み取れませんでした。".to_string(),
                ));
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "applicant" | "title" | "amount" => {
                let text = field.text().await.map_err(|e| {
                    warn!("Error reading field {}: {}", name, e);
                    AppError::BadRequest("フォームデータを読み取れませんでした。".to_string())
                })?;
                match name.as_str() {
                    "applicant" => form.applicant = Some(text),
                    "title" => form.title = Some(text),
                    _ => form.amount = Some(text),
                }
            }
            name if name == ClaimField::ReceiptImage.as_str() => {
                let declared = field.content_type().map(str::to_string);
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    warn!("Error reading receipt image: {}", e);
                    AppError::BadRequest("画像ファイルを読み取れませんでした。".to_string())
                })?;

                if bytes.is_empty() {
                    form.receipt = Some(ReceiptImage::new(bytes, FALLBACK_MIME));
                    form.receipt_error = None;
                    continue;
                }

                let mime_type = match MimeValidator::resolve(declared.as_deref(), &bytes) {
                    Ok(mime_type) => mime_type,
                    Err(reason) => {
                        warn!("Receipt upload refused: {}", reason);
                        form.receipt = None;
                        form.receipt_error = Some(reason);
                        continue;
                    }
                };
                debug!(
                    file_name = file_name.as_deref().unwrap_or("unknown"),
                    mime_type = %mime_type,
                    size = bytes.len(),
                    "Received receipt image"
                );
                form.receipt = Some(ReceiptImage::new(bytes, mime_type));
                form.receipt_error = None;
            }
            other => {
                warn!("Unexpected field in multipart: {}", other);
            }
        }
    }

    Ok(form)
}
