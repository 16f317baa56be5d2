//! Image Codec
//!
//! 图像在线路上以 base64 字符串传输。
//! 输出总是自描述的 data URL（`data:image/png;base64,...`），
//! 输入同时接受 data URL 和裸 base64。

use std::io::Cursor;

use base64::prelude::*;
use image::{DynamicImage, ImageFormat, RgbaImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Could not decode image: {0}")]
    Decode(String),

    #[error("Could not encode image: {0}")]
    Encode(String),
}

/// 支持的导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodeFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tiff,
}

impl EncodeFormat {
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            "bmp" => Ok(Self::Bmp),
            "tif" | "tiff" => Ok(Self::Tiff),
            other => Err(CodecError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Webp => ImageFormat::WebP,
            Self::Bmp => ImageFormat::Bmp,
            Self::Tiff => ImageFormat::Tiff,
        }
    }
}

/// 去掉 `data:<mime>;base64,` 前缀并解码
pub fn decode_bytes(encoded: &str) -> Result<Vec<u8>, CodecError> {
    let payload = match encoded.trim().split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded.trim(),
    };
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    BASE64_STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))
}

pub fn decode_image(encoded: &str) -> Result<RgbaImage, CodecError> {
    let bytes = decode_bytes(encoded)?;
    let image = image::load_from_memory(&bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
    Ok(image.to_rgba8())
}

pub fn encode_image(image: &RgbaImage, format: EncodeFormat) -> Result<String, CodecError> {
    let dynamic = match format {
        // JPEG 不支持 alpha 通道
        EncodeFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image.clone()).to_rgb8()),
        _ => DynamicImage::ImageRgba8(image.clone()),
    };

    let mut buf = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut buf, format.image_format())
        .map_err(|e| CodecError::Encode(e.to_string()))?;

    Ok(format!(
        "data:{};base64,{}",
        format.mime(),
        BASE64_STANDARD.encode(buf.into_inner())
    ))
}

pub fn encode_png(image: &RgbaImage) -> Result<String, CodecError> {
    encode_image(image, EncodeFormat::Png)
}
