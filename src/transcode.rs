use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader, Rgb, RgbImage};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Content-area width of the target frontend; wider images get downscaled.
pub const MAX_WIDTH: u32 = 1400;

const JPEG_QUALITY: u8 = 80;
const DENSITY_PPI: u16 = 72;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("progressive pass failed for {}: {source}", path.display())]
    Progressive {
        path: PathBuf,
        source: jpeg_encoder::EncodingError,
    },

    #[error("{} is {width}x{height}, beyond the encoder's dimension limit", path.display())]
    Oversized {
        path: PathBuf,
        width: u32,
        height: u32,
    },

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Rewrite an image as a normalized JPEG sibling named `<stem>.jpg`.
///
/// Fixed policy: metadata stripped, quality 80, progressive scan, 4:2:0
/// chroma subsampling, 72 PPI density tag, and a downscale to width 1400
/// when the source is wider. Non-JPEG originals are removed once the
/// output is written; `.jpg`/`.jpeg` sources stay (a `.jpg` source is
/// rewritten in place).
pub fn normalize_to_jpeg(image_path: &Path) -> Result<PathBuf, TranscodeError> {
    let io_error = |source: std::io::Error| TranscodeError::Io {
        path: image_path.to_path_buf(),
        source,
    };

    // Guess the format from content, not the extension; misnamed files
    // still decode.
    let decoded = ImageReader::open(image_path)
        .map_err(io_error)?
        .with_guessed_format()
        .map_err(io_error)?
        .decode()
        .map_err(|source| TranscodeError::Decode {
            path: image_path.to_path_buf(),
            source,
        })?;

    let decoded = downscale_to_width(decoded, MAX_WIDTH);
    let output_path = image_path.with_extension("jpg");

    // First stage: full pixel re-encode at the target quality. Decoding to
    // raw pixels drops whatever EXIF/ICC/comment payload the source carried.
    let rgb = flatten_alpha(&decoded);
    let mut baseline = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut baseline, JPEG_QUALITY);
    encoder
        .encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|source| TranscodeError::Encode {
            path: image_path.to_path_buf(),
            source,
        })?;

    // Second stage: re-encode the first stage's output with the settings
    // that encoder cannot express (progressive scan, 4:2:0 subsampling,
    // density tag).
    let refined = image::load_from_memory(&baseline)
        .map_err(|source| TranscodeError::Decode {
            path: output_path.clone(),
            source,
        })?
        .to_rgb8();

    let oversized = |width: u32, height: u32| TranscodeError::Oversized {
        path: image_path.to_path_buf(),
        width,
        height,
    };
    let width = u16::try_from(refined.width())
        .map_err(|_| oversized(refined.width(), refined.height()))?;
    let height = u16::try_from(refined.height())
        .map_err(|_| oversized(refined.width(), refined.height()))?;

    let mut progressive = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut progressive, JPEG_QUALITY);
    encoder.set_progressive(true);
    encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
    encoder.set_density(jpeg_encoder::Density::Inch {
        x: DENSITY_PPI,
        y: DENSITY_PPI,
    });
    encoder
        .encode(refined.as_raw(), width, height, jpeg_encoder::ColorType::Rgb)
        .map_err(|source| TranscodeError::Progressive {
            path: output_path.clone(),
            source,
        })?;

    fs::write(&output_path, &progressive).map_err(|source| TranscodeError::Io {
        path: output_path.clone(),
        source,
    })?;

    if !is_jpeg_name(image_path) {
        fs::remove_file(image_path).map_err(|source| TranscodeError::Io {
            path: image_path.to_path_buf(),
            source,
        })?;
    }

    Ok(output_path)
}

/// Whether the filename already carries a `.jpg`/`.jpeg` extension.
pub fn is_jpeg_name(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lowered = ext.to_ascii_lowercase();
            lowered == "jpg" || lowered == "jpeg"
        })
        .unwrap_or(false)
}

/// Human-readable stats line for log output; degrades to an explanation
/// when the file cannot be inspected.
pub fn image_stats(path: &Path) -> String {
    match try_image_stats(path) {
        Ok(stats) => stats,
        Err(error) => format!("Could not find stats: {error}"),
    }
}

fn try_image_stats(path: &Path) -> Result<String, TranscodeError> {
    let io_error = |source: std::io::Error| TranscodeError::Io {
        path: path.to_path_buf(),
        source,
    };

    let byte_len = fs::metadata(path).map_err(io_error)?.len();

    let mut head = Vec::with_capacity(4096);
    fs::File::open(path)
        .map_err(io_error)?
        .take(4096)
        .read_to_end(&mut head)
        .map_err(io_error)?;
    let dpi = density_ppi(&head).unwrap_or(72);

    let reader = ImageReader::open(path)
        .map_err(io_error)?
        .with_guessed_format()
        .map_err(io_error)?;
    let format = match reader.format() {
        Some(format) => format!("{format:?}").to_uppercase(),
        None => "UNKNOWN".to_string(),
    };
    let (width, height) = reader
        .into_dimensions()
        .map_err(|source| TranscodeError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(format!(
        "Format: {format}, Size: {}, Resolution: ({width}, {height}), DPI: {dpi}",
        human_size(byte_len)
    ))
}

fn human_size(byte_len: u64) -> String {
    if byte_len < 1024 {
        format!("{byte_len} bytes")
    } else if byte_len < 1024 * 1024 {
        format!("{:.2} KB", byte_len as f64 / 1024.0)
    } else {
        format!("{:.2} MB", byte_len as f64 / (1024.0 * 1024.0))
    }
}

fn downscale_to_width(decoded: DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = decoded.dimensions();
    if width <= max_width {
        return decoded;
    }
    let scaled_height = (f64::from(height) * f64::from(max_width) / f64::from(width)).round() as u32;
    decoded.resize_exact(max_width, scaled_height.max(1), FilterType::Lanczos3)
}

/// JPEG has no alpha channel; transparent regions are flattened onto white.
fn flatten_alpha(decoded: &DynamicImage) -> RgbImage {
    if !decoded.color().has_alpha() {
        return decoded.to_rgb8();
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (target, source) in rgb.pixels_mut().zip(rgba.pixels()) {
        let alpha = u32::from(source[3]);
        let mut channels = [0u8; 3];
        for (slot, value) in channels.iter_mut().zip(source.0.iter()) {
            *slot = ((u32::from(*value) * alpha + 255 * (255 - alpha)) / 255) as u8;
        }
        *target = Rgb(channels);
    }
    rgb
}

/// Encoded density from the file's leading bytes, JPEG and PNG forms.
fn density_ppi(head: &[u8]) -> Option<u32> {
    jpeg_density(head).map(u32::from).or_else(|| png_density(head))
}

/// Pixels-per-inch from a PNG `pHYs` chunk, when one appears before the
/// pixel data. Per-metre density is converted and rounded.
fn png_density(head: &[u8]) -> Option<u32> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    if head.len() < SIGNATURE.len() || head[..8] != SIGNATURE {
        return None;
    }

    let mut offset = SIGNATURE.len();
    while offset + 8 <= head.len() {
        let length = u32::from_be_bytes([
            head[offset],
            head[offset + 1],
            head[offset + 2],
            head[offset + 3],
        ]) as usize;
        let kind = &head[offset + 4..offset + 8];
        // pHYs must precede the pixel data.
        if kind == b"IDAT" || kind == b"IEND" {
            return None;
        }
        let data = offset + 8;
        if kind == b"pHYs" {
            if length < 9 || data + 9 > head.len() {
                return None;
            }
            // Unit byte 1 means pixels per metre; 0 is aspect-ratio only.
            if head[data + 8] != 1 {
                return None;
            }
            let per_metre = u32::from_be_bytes([
                head[data],
                head[data + 1],
                head[data + 2],
                head[data + 3],
            ]);
            return Some((f64::from(per_metre) * 0.0254).round() as u32);
        }
        offset = data + length + 4;
    }
    None
}

/// Pixels-per-inch density from a JPEG's leading JFIF APP0 segment.
fn jpeg_density(head: &[u8]) -> Option<u16> {
    if head.len() < 18 || head[0..2] != [0xFF, 0xD8] || head[2..4] != [0xFF, 0xE0] {
        return None;
    }
    if &head[6..11] != b"JFIF\0" {
        return None;
    }
    // Unit byte 1 means pixels per inch; 0 and 2 are aspect-only and per-cm.
    if head[13] != 1 {
        return None;
    }
    Some(u16::from_be_bytes([head[14], head[15]]))
}
