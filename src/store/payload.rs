use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, ImageReader};

use crate::error::PayloadError;
use crate::store::{compute_hash, get_extension_from_mime_type};

const IMAGE_DIR: &str = "images";

/// Image bytes accepted for upload.
///
/// `format` is sniffed from the content. Formats the decoder does not know,
/// such as SVG, are kept with `format` unset and the declared mime type.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub file_name: String,
    pub format: Option<ImageFormat>,
    pub bytes: Vec<u8>,
    mime_type: String,
}

impl ImagePayload {
    /// Accept raw uploaded bytes. A declared content type, if any, must be `image/*`.
    /// Without one the bytes must be in a format that can be sniffed.
    pub fn from_upload(
        file_name: &str,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<Self, PayloadError> {
        let declared = content_type.map(media_type);
        if let Some(declared) = &declared {
            if !declared.starts_with("image/") {
                return Err(PayloadError::NotAnImage(declared.clone()));
            }
        }
        if bytes.is_empty() {
            return Err(PayloadError::Empty);
        }
        let format = image::guess_format(&bytes).ok();
        let mime_type = match (format, declared) {
            (Some(format), _) => format.to_mime_type().to_string(),
            (None, Some(declared)) => declared,
            (None, None) => return Err(PayloadError::UnknownFormat),
        };
        Ok(Self {
            file_name: file_name.to_string(),
            format,
            bytes,
            mime_type,
        })
    }

    /// Accept a `data:<mime>;base64,<data>` URI as produced by a browser file reader.
    pub fn from_data_uri(file_name: &str, uri: &str) -> Result<Self, PayloadError> {
        let (mime_type, bytes) = decode_data_uri(uri)?;
        Self::from_upload(file_name, Some(&mime_type), bytes)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Content-addressed storage key; identical bytes always share a key.
    pub fn content_key(&self) -> String {
        let hash = compute_hash(&self.bytes);
        let ext = get_extension_from_mime_type(self.mime_type());
        format!("{IMAGE_DIR}/{hash}.{ext}")
    }

    /// Width and height from the image header, when the format can be read.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let format = self.format?;
        ImageReader::with_format(Cursor::new(&self.bytes), format)
            .into_dimensions()
            .ok()
    }
}

/// `image/SVG+xml; charset=utf-8` -> `image/svg+xml`
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Split a base64 `data:` URI into its mime type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), PayloadError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| PayloadError::MalformedDataUri("missing data: prefix".to_string()))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| PayloadError::MalformedDataUri("missing data separator".to_string()))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| {
            PayloadError::MalformedDataUri("only base64 payloads are supported".to_string())
        })?;
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|err| PayloadError::MalformedDataUri(err.to_string()))?;
    Ok((mime_type.to_string(), bytes))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 80, 160]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_upload_sniffs_format_and_dimensions() {
        let bytes = png_bytes(3, 2);
        let payload =
            ImagePayload::from_upload("tiny.png", Some("image/png"), bytes.clone()).unwrap();
        assert_eq!(payload.format, Some(ImageFormat::Png));
        assert_eq!(payload.mime_type(), "image/png");
        assert_eq!(payload.dimensions(), Some((3, 2)));

        let key = payload.content_key();
        assert_eq!(key, format!("images/{}.png", compute_hash(&bytes)));
    }

    #[test]
    fn test_upload_rejects_non_images() {
        assert!(matches!(
            ImagePayload::from_upload("notes.txt", Some("text/plain"), b"hello".to_vec()),
            Err(PayloadError::NotAnImage(_))
        ));
        assert!(matches!(
            ImagePayload::from_upload("empty.png", None, Vec::new()),
            Err(PayloadError::Empty)
        ));
        assert!(matches!(
            ImagePayload::from_upload("fake.png", None, b"not really".to_vec()),
            Err(PayloadError::UnknownFormat)
        ));
    }

    #[test]
    fn test_upload_keeps_declared_type_when_unsniffable() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="8"/>"#.to_vec();
        let payload =
            ImagePayload::from_upload("logo.svg", Some("image/SVG+xml; charset=utf-8"), svg.clone())
                .unwrap();
        assert_eq!(payload.format, None);
        assert_eq!(payload.mime_type(), "image/svg+xml");
        assert_eq!(payload.dimensions(), None);
        assert_eq!(payload.content_key(), format!("images/{}.svg", compute_hash(&svg)));

        // sniffed content wins over the declared type
        let payload =
            ImagePayload::from_upload("mislabeled.jpg", Some("image/jpeg"), png_bytes(1, 1))
                .unwrap();
        assert_eq!(payload.mime_type(), "image/png");
        assert!(payload.content_key().ends_with(".png"));
    }

    #[test]
    fn test_data_uri() {
        let bytes = png_bytes(1, 1);
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(&bytes));

        let (mime_type, decoded) = decode_data_uri(&uri).unwrap();
        assert_eq!(mime_type, "image/png");
        assert_eq!(decoded, bytes);

        let payload = ImagePayload::from_data_uri("dot.png", &uri).unwrap();
        assert_eq!(payload.bytes, bytes);

        assert!(decode_data_uri("image/png;base64,AAAA").is_err());
        assert!(decode_data_uri("data:image/png,AAAA").is_err());
        assert!(decode_data_uri("data:image/png;base64,@@@").is_err());
    }
}
