//! Image decode and encode at the filesystem boundary
//!
//! Loads source photos (common raster formats, plus HEIF/HEIC behind the
//! `heif` cargo feature), downsizes them to the display bound, and writes
//! rectified results. Photos arriving in the HEIF container are re-encoded
//! as plain JPEG on save.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest side of the raster shown on the canvas
pub const DISPLAY_BOUND: u32 = 1000;

/// Quality for JPEG re-encoding of HEIF sources
pub const JPEG_QUALITY: u8 = 95;

/// A source image that cannot be decoded. The session layer skips the
/// file and moves on to the next candidate.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("HEIF support is not built in, rebuild with the `heif` feature to load {path:?}")]
    HeifDisabled { path: PathBuf },

    #[cfg(feature = "heif")]
    #[error("failed to decode HEIF {path:?}: {source}")]
    Heif {
        path: PathBuf,
        #[source]
        source: libheif_rs::HeifError,
    },

    #[cfg(feature = "heif")]
    #[error("HEIF image {path:?} has no interleaved pixel plane")]
    MissingPlane { path: PathBuf },
}

/// Failure writing a rectified result. Reported to the user, never
/// retried automatically.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to create destination folder {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Destination filename for a source image. The proprietary HEIF container
/// is rewritten to plain JPEG; every other format keeps its name.
pub fn saved_file_name(source_name: &str) -> String {
    if is_heif_name(source_name) {
        let stem = Path::new(source_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(source_name);
        format!("{stem}.jpg")
    } else {
        source_name.to_string()
    }
}

fn extension_lower(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_heif_name(name: &str) -> bool {
    matches!(extension_lower(name).as_deref(), Some("heic") | Some("heif"))
}

/// Decode a source photo and downsize it to fit the display bound,
/// preserving aspect ratio.
pub fn load_display(path: &Path) -> Result<RgbaImage, DecodeError> {
    let image = if is_heif_name(&path.to_string_lossy()) {
        decode_heif(path)?
    } else {
        image::open(path).map_err(|source| DecodeError::Decode {
            path: path.to_path_buf(),
            source,
        })?
    };

    let image = if image.width() > DISPLAY_BOUND || image.height() > DISPLAY_BOUND {
        image.thumbnail(DISPLAY_BOUND, DISPLAY_BOUND)
    } else {
        image
    };

    Ok(image.to_rgba8())
}

#[cfg(feature = "heif")]
fn decode_heif(path: &Path) -> Result<DynamicImage, DecodeError> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let heif_err = |source: libheif_rs::HeifError| DecodeError::Heif {
        path: path.to_path_buf(),
        source,
    };

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_file(&path.to_string_lossy()).map_err(|e| heif_err(e))?;
    let handle = ctx.primary_image_handle().map_err(|e| heif_err(e))?;
    let decoded = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgba), None)
        .map_err(|e| heif_err(e))?;

    let planes = decoded.planes();
    let plane = planes.interleaved.ok_or_else(|| DecodeError::MissingPlane {
        path: path.to_path_buf(),
    })?;

    // The stride may be wider than the row; copy row by row.
    let width = plane.width;
    let height = plane.height;
    let row_bytes = width as usize * 4;
    let mut buf = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * plane.stride;
        buf.extend_from_slice(&plane.data[start..start + row_bytes]);
    }

    let img = RgbaImage::from_raw(width, height, buf).ok_or_else(|| DecodeError::MissingPlane {
        path: path.to_path_buf(),
    })?;
    Ok(DynamicImage::ImageRgba8(img))
}

#[cfg(not(feature = "heif"))]
fn decode_heif(path: &Path) -> Result<DynamicImage, DecodeError> {
    Err(DecodeError::HeifDisabled {
        path: path.to_path_buf(),
    })
}

/// Write a rectified raster into the destination folder, creating the
/// folder if needed. Returns the path actually written.
pub fn save_rectified(
    img: &RgbaImage,
    dest_dir: &Path,
    source_name: &str,
) -> Result<PathBuf, SaveError> {
    std::fs::create_dir_all(dest_dir).map_err(|source| SaveError::CreateDir {
        path: dest_dir.to_path_buf(),
        source,
    })?;

    let name = saved_file_name(source_name);
    let path = dest_dir.join(&name);

    match extension_lower(&name).as_deref() {
        Some("jpg" | "jpeg") => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            let file = std::fs::File::create(&path).map_err(|source| SaveError::Write {
                path: path.clone(),
                source,
            })?;
            let mut writer = BufWriter::new(file);
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
            encoder
                .encode_image(&rgb)
                .map_err(|source| SaveError::Encode {
                    path: path.clone(),
                    source,
                })?;
        }
        _ => {
            img.save(&path).map_err(|source| SaveError::Encode {
                path: path.clone(),
                source,
            })?;
        }
    }

    tracing::info!("Saved {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn heif_names_are_rewritten_to_jpg() {
        assert_eq!(saved_file_name("photo.heic"), "photo.jpg");
        assert_eq!(saved_file_name("photo.HEIC"), "photo.jpg");
        assert_eq!(saved_file_name("scan.heif"), "scan.jpg");
        assert_eq!(saved_file_name("photo.jpg"), "photo.jpg");
        assert_eq!(saved_file_name("photo.png"), "photo.png");
        assert_eq!(saved_file_name("noext"), "noext");
    }

    #[test]
    fn save_of_heic_source_writes_jpg() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbaImage::from_pixel(16, 16, Rgba([120, 40, 200, 255]));

        let path = save_rectified(&img, dir.path(), "photo.heic").unwrap();
        assert_eq!(path.file_name().unwrap(), "photo.jpg");
        assert!(path.exists());
        assert!(!dir.path().join("photo.heic").exists());

        let reloaded = image::open(&path).unwrap();
        assert_eq!(reloaded.width(), 16);
        assert_eq!(reloaded.height(), 16);
    }

    #[test]
    fn save_creates_destination_folder() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out").join("rectified");
        let img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));

        let path = save_rectified(&img, &dest, "shot.png").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn load_display_downsizes_oversized_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        RgbaImage::new(1500, 500).save(&path).unwrap();

        let display = load_display(&path).unwrap();
        let (w, h) = display.dimensions();
        assert_eq!(w, 1000);
        assert!(h <= 334 && h >= 333);
    }

    #[test]
    fn load_display_keeps_small_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        RgbaImage::new(300, 200).save(&path).unwrap();

        let display = load_display(&path).unwrap();
        assert_eq!(display.dimensions(), (300, 200));
    }

    #[test]
    fn corrupt_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        assert!(matches!(
            load_display(&path),
            Err(DecodeError::Decode { .. })
        ));
    }

    #[cfg(not(feature = "heif"))]
    #[test]
    fn heic_without_feature_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.heic");
        std::fs::write(&path, b"").unwrap();

        assert!(matches!(
            load_display(&path),
            Err(DecodeError::HeifDisabled { .. })
        ));
    }
}
