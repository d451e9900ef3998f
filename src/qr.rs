//! QR code decoding
//!
//! Images come in as raw bytes or as `data:` URLs from a browser upload.
//! Anything that does not yield a payload is a `Decode` error; there is no
//! default answer for an image we cannot read.

use crate::error::{PipelineError, PipelineResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Decode the first readable QR code in an image.
pub fn decode_qr(image_bytes: &[u8]) -> PipelineResult<String> {
    if image_bytes.is_empty() {
        return Err(PipelineError::Decode("image is empty".to_string()));
    }

    let image = image::load_from_memory(image_bytes)
        .map_err(|e| PipelineError::Decode(format!("unreadable image: {}", e)))?
        .to_luma8();
    let (width, height) = image.dimensions();

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        width as usize,
        height as usize,
        |x, y| image.get_pixel(x as u32, y as u32).0[0],
    );

    let grids = prepared.detect_grids();
    log::debug!("Found {} QR grid candidates", grids.len());

    for grid in grids {
        match grid.decode() {
            Ok((_meta, payload)) => {
                let payload = payload.trim().to_string();
                if !payload.is_empty() {
                    return Ok(payload);
                }
            }
            Err(e) => log::debug!("QR grid failed to decode: {:?}", e),
        }
    }

    Err(PipelineError::Decode("no QR code found in image".to_string()))
}

/// Image bytes from a `data:image/...;base64,` URL, or the input itself
/// base64-decoded when it has no prefix.
pub fn decode_data_url(data: &str) -> PipelineResult<Vec<u8>> {
    let encoded = match data.trim().split_once(',') {
        Some((header, body)) if header.starts_with("data:") => {
            if !header.ends_with(";base64") {
                return Err(PipelineError::Decode(
                    "data URL is not base64 encoded".to_string(),
                ));
            }
            body
        }
        _ => data.trim(),
    };

    STANDARD
        .decode(encoded)
        .map_err(|e| PipelineError::Decode(format!("invalid base64 image: {}", e)))
}

/// Image bytes from an upload that may be raw image data, a `data:` URL or
/// bare base64 text. Binary input passes through untouched.
pub fn image_bytes(upload: Vec<u8>) -> PipelineResult<Vec<u8>> {
    let text = match std::str::from_utf8(&upload) {
        Ok(text) => text.trim(),
        Err(_) => return Ok(upload),
    };
    if text.starts_with("data:") {
        return decode_data_url(text);
    }
    match STANDARD.decode(text) {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        _ => Ok(upload),
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    /// PNG bytes of a QR code for `payload`, with a quiet zone.
    pub fn qr_png(payload: &str) -> Vec<u8> {
        let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
        let modules = code.width();
        let colors = code.to_colors();
        let scale = 8usize;
        let quiet = 4usize;
        let size = ((modules + 2 * quiet) * scale) as u32;

        let img = GrayImage::from_fn(size, size, |x, y| {
            let mx = (x as usize / scale).checked_sub(quiet);
            let my = (y as usize / scale).checked_sub(quiet);
            match (mx, my) {
                (Some(mx), Some(my)) if mx < modules && my < modules => {
                    if colors[my * modules + mx] == qrcode::Color::Dark {
                        Luma([0u8])
                    } else {
                        Luma([255u8])
                    }
                }
                _ => Luma([255u8]),
            }
        });
        png(img)
    }

    pub fn blank_png() -> Vec<u8> {
        png(GrayImage::from_pixel(96, 96, Luma([255u8])))
    }

    fn png(img: GrayImage) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::test_images::*;
    use super::*;

    #[test]
    fn test_decode_generated_code() {
        let png = qr_png("https://example.org/parcel?id=42");
        assert_eq!(decode_qr(&png).unwrap(), "https://example.org/parcel?id=42");
    }

    #[test]
    fn test_blank_image_is_decode_error() {
        assert!(matches!(
            decode_qr(&blank_png()),
            Err(PipelineError::Decode(_))
        ));
    }

    #[test]
    fn test_garbage_bytes_are_decode_error() {
        assert!(matches!(
            decode_qr(b"definitely not an image"),
            Err(PipelineError::Decode(_))
        ));
        assert!(matches!(decode_qr(&[]), Err(PipelineError::Decode(_))));
    }

    #[test]
    fn test_data_url_round_trip() {
        let png = blank_png();
        let url = format!("data:image/png;base64,{}", STANDARD.encode(&png));
        assert_eq!(decode_data_url(&url).unwrap(), png);
        assert_eq!(decode_data_url(&STANDARD.encode(&png)).unwrap(), png);
    }

    #[test]
    fn test_image_bytes_accepts_every_upload_form() {
        let png = qr_png("https://example.org/track");
        let encoded = STANDARD.encode(&png);

        assert_eq!(image_bytes(png.clone()).unwrap(), png);
        let url = format!("data:image/png;base64,{}\n", encoded);
        assert_eq!(image_bytes(url.into_bytes()).unwrap(), png);
        assert_eq!(image_bytes(encoded.into_bytes()).unwrap(), png);

        let decoded = decode_qr(&image_bytes(png).unwrap()).unwrap();
        assert_eq!(decoded, "https://example.org/track");
    }

    #[test]
    fn test_image_bytes_rejects_broken_data_url() {
        assert!(matches!(
            image_bytes(b"data:image/png;base64,@@@".to_vec()),
            Err(PipelineError::Decode(_))
        ));
        // Plain text that is not base64 is left for the image decoder to reject
        let text = b"not an image".to_vec();
        assert_eq!(image_bytes(text.clone()).unwrap(), text);
        assert!(image_bytes(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_data_url_must_be_base64() {
        assert!(decode_data_url("data:image/svg+xml,<svg/>").is_err());
        assert!(decode_data_url("data:image/png;base64,!!!").is_err());
    }
}
