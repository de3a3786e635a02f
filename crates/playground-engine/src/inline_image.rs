use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::MIN_IMAGE_DIM;

/// Image payload ready for a `generateContent` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    /// Standard base64, no data-URL prefix.
    pub data: String,
    pub sha256: String,
}

impl InlineImage {
    pub fn from_bytes(bytes: &[u8], name_hint: Option<&Path>) -> Result<Self> {
        let Some(mime_type) = sniff_image_mime(bytes).or_else(|| name_hint.and_then(mime_for_path))
        else {
            bail!("not a supported image file");
        };
        Ok(Self {
            mime_type: mime_type.to_string(),
            data: BASE64.encode(bytes),
            sha256: sha256_hex(bytes),
        })
    }

    /// Reads `path` and encodes it. With `max_dim`, images whose longest edge
    /// exceeds it are flattened onto white, downscaled and re-encoded as JPEG.
    pub fn from_path(path: &Path, max_dim: Option<u32>) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        if let Some(max_dim) = max_dim {
            if let Some(resized) = downscale_to_jpeg(&bytes, max_dim)? {
                return Self::from_bytes(&resized, None);
            }
        }
        Self::from_bytes(&bytes, Some(path))
    }

    pub fn to_part(&self) -> Value {
        json!({
            "inlineData": {
                "mimeType": self.mime_type,
                "data": self.data,
            }
        })
    }
}

/// What the terminal shows for a selected file in place of a thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePreview {
    pub path: PathBuf,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub byte_len: u64,
    pub sha256: String,
}

impl ImagePreview {
    pub fn inspect(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let Some(mime_type) = sniff_image_mime(&bytes).or_else(|| mime_for_path(path)) else {
            bail!("{} is not a supported image file", path.display());
        };
        let (width, height) = image::load_from_memory(&bytes)
            .map(|decoded| (decoded.width(), decoded.height()))
            .unwrap_or((0, 0));
        Ok(Self {
            path: path.to_path_buf(),
            mime_type: mime_type.to_string(),
            width,
            height,
            byte_len: bytes.len() as u64,
            sha256: sha256_hex(&bytes),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Tiff => Some("image/tiff"),
        _ => None,
    }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

/// `Ok(None)` when the bytes do not decode or already fit within `max_dim`.
fn downscale_to_jpeg(bytes: &[u8], max_dim: u32) -> Result<Option<Vec<u8>>> {
    let dim = max_dim.max(MIN_IMAGE_DIM);
    let Ok(image) = image::load_from_memory(bytes) else {
        return Ok(None);
    };
    if image.width().max(image.height()) <= dim {
        return Ok(None);
    }

    let rgba = image.to_rgba8();
    let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(
            x,
            y,
            Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
        );
    }
    let resized = DynamicImage::ImageRgba8(flattened)
        .resize(dim, dim, FilterType::Triangle)
        .to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode_image(&DynamicImage::ImageRgb8(resized))
        .context("failed to re-encode downscaled image")?;
    Ok(Some(out))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use base64::Engine as _;
    use image::{Rgba, RgbaImage};

    use super::{ImagePreview, InlineImage, BASE64};

    fn write_png(path: &Path, width: u32, height: u32) -> anyhow::Result<()> {
        let mut image = RgbaImage::new(width, height);
        for pixel in image.pixels_mut() {
            *pixel = Rgba([200, 40, 40, 128]);
        }
        image.save(path)?;
        Ok(())
    }

    #[test]
    fn from_path_sniffs_mime_and_keeps_bytes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        // Extension lies on purpose; content sniffing wins.
        let path = temp.path().join("photo.jpg");
        write_png(&temp.path().join("source.png"), 8, 6)?;
        fs::copy(temp.path().join("source.png"), &path)?;

        let image = InlineImage::from_path(&path, None)?;
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(BASE64.decode(image.data.as_bytes())?, fs::read(&path)?);
        assert_eq!(image.sha256.len(), 64);
        Ok(())
    }

    #[test]
    fn from_path_downscales_large_images_to_jpeg() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("big.png");
        write_png(&path, 400, 200)?;

        let image = InlineImage::from_path(&path, Some(100))?;
        assert_eq!(image.mime_type, "image/jpeg");
        let decoded = image::load_from_memory(&BASE64.decode(image.data.as_bytes())?)?;
        assert_eq!((decoded.width(), decoded.height()), (100, 50));

        let small = InlineImage::from_path(&path, Some(1000))?;
        assert_eq!(small.mime_type, "image/png");
        Ok(())
    }

    #[test]
    fn non_image_files_are_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes.txt");
        fs::write(&path, "hello")?;

        assert!(InlineImage::from_path(&path, None).is_err());
        assert!(ImagePreview::inspect(&path).is_err());
        assert!(InlineImage::from_path(&temp.path().join("missing.png"), None).is_err());
        Ok(())
    }

    #[test]
    fn unsniffable_bytes_fall_back_to_file_extension() -> anyhow::Result<()> {
        let image = InlineImage::from_bytes(b"heic-body-bytes", Some(Path::new("IMG_0001.HEIC")))?;
        assert_eq!(image.mime_type, "image/heic");

        let sniffed = InlineImage::from_bytes(b"GIF89a-not-really", Some(Path::new("x.png")))?;
        assert_eq!(sniffed.mime_type, "image/gif");

        assert!(InlineImage::from_bytes(b"plain text", Some(Path::new("notes.txt"))).is_err());
        assert!(InlineImage::from_bytes(b"plain text", None).is_err());
        Ok(())
    }

    #[test]
    fn inline_part_uses_camel_case_keys() -> anyhow::Result<()> {
        let image = InlineImage::from_bytes(b"\x89PNG\r\n\x1a\n", None)?;
        let part = image.to_part();
        assert_eq!(part["inlineData"]["mimeType"], "image/png");
        assert_eq!(part["inlineData"]["data"], image.data.as_str());
        Ok(())
    }

    #[test]
    fn preview_reports_dimensions_and_size() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("cat.png");
        write_png(&path, 12, 7)?;

        let preview = ImagePreview::inspect(&path)?;
        assert_eq!(preview.mime_type, "image/png");
        assert_eq!((preview.width, preview.height), (12, 7));
        assert_eq!(preview.byte_len, fs::metadata(&path)?.len());
        assert_eq!(preview.file_name(), "cat.png");
        Ok(())
    }
}
