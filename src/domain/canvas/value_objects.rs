//! Canvas Context - Value Objects

use image::Rgba;
use serde::{Deserialize, Serialize};

use super::CanvasError;

/// 图层句柄 - 画布 arena 中的槽位索引
///
/// 句柄不会被复用：删除图层后旧句柄永久失效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerHandle(u32);

impl LayerHandle {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for LayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 图层混合模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    Addition,
    Difference,
}

impl BlendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::Addition => "addition",
            BlendMode::Difference => "difference",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CanvasError> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(BlendMode::Normal),
            "multiply" => Ok(BlendMode::Multiply),
            "screen" => Ok(BlendMode::Screen),
            "overlay" => Ok(BlendMode::Overlay),
            "darken" | "darken_only" => Ok(BlendMode::Darken),
            "lighten" | "lighten_only" => Ok(BlendMode::Lighten),
            "addition" | "add" => Ok(BlendMode::Addition),
            "difference" => Ok(BlendMode::Difference),
            other => Err(CanvasError::InvalidBlendMode(other.to_string())),
        }
    }

    /// 单通道混合，输入输出均为 [0, 1]
    pub fn blend(&self, base: f32, top: f32) -> f32 {
        match self {
            BlendMode::Normal => top,
            BlendMode::Multiply => base * top,
            BlendMode::Screen => 1.0 - (1.0 - base) * (1.0 - top),
            BlendMode::Overlay => {
                if base < 0.5 {
                    2.0 * base * top
                } else {
                    1.0 - 2.0 * (1.0 - base) * (1.0 - top)
                }
            }
            BlendMode::Darken => base.min(top),
            BlendMode::Lighten => base.max(top),
            BlendMode::Addition => (base + top).min(1.0),
            BlendMode::Difference => (base - top).abs(),
        }
    }
}

/// 不透明度（0-100，与宿主编辑器一致）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Opacity(f32);

impl Opacity {
    pub const OPAQUE: Opacity = Opacity(100.0);

    pub fn new(value: f32) -> Result<Self, CanvasError> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(CanvasError::InvalidOpacity(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn fraction(&self) -> f32 {
        self.0 / 100.0
    }
}

impl Default for Opacity {
    fn default() -> Self {
        Self::OPAQUE
    }
}

/// RGBA 颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color([u8; 4]);

impl Color {
    pub const WHITE: Color = Color([255, 255, 255, 255]);
    pub const BLACK: Color = Color([0, 0, 0, 255]);
    pub const TRANSPARENT: Color = Color([0, 0, 0, 0]);

    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// 解析颜色名或十六进制颜色（`#rgb`、`#rrggbb`、`#rrggbbaa`）
    pub fn parse(s: &str) -> Result<Self, CanvasError> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "white" => return Ok(Self::WHITE),
            "black" => return Ok(Self::BLACK),
            "transparent" => return Ok(Self::TRANSPARENT),
            "red" => return Ok(Self::rgba(255, 0, 0, 255)),
            "green" => return Ok(Self::rgba(0, 128, 0, 255)),
            "blue" => return Ok(Self::rgba(0, 0, 255, 255)),
            "gray" | "grey" => return Ok(Self::rgba(128, 128, 128, 255)),
            _ => {}
        }

        let hex = trimmed
            .strip_prefix('#')
            .ok_or_else(|| CanvasError::InvalidColor(s.to_string()))?;
        let invalid = || CanvasError::InvalidColor(s.to_string());
        let digit = |i: usize| -> Result<u8, CanvasError> {
            u8::from_str_radix(hex.get(i..i + 2).ok_or_else(invalid)?, 16).map_err(|_| invalid())
        };

        match hex.len() {
            3 => {
                let mut out = [0u8; 4];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16).ok_or_else(invalid)? as u8;
                    out[i] = v * 17;
                }
                out[3] = 255;
                Ok(Self(out))
            }
            6 => Ok(Self([digit(0)?, digit(2)?, digit(4)?, 255])),
            8 => Ok(Self([digit(0)?, digit(2)?, digit(4)?, digit(6)?])),
            _ => Err(invalid()),
        }
    }

    /// 从 `[r, g, b]` 或 `[r, g, b, a]` 构造
    pub fn from_channels(channels: &[u8]) -> Result<Self, CanvasError> {
        match channels {
            [r, g, b] => Ok(Self([*r, *g, *b, 255])),
            [r, g, b, a] => Ok(Self([*r, *g, *b, *a])),
            _ => Err(CanvasError::InvalidColor(format!("{:?}", channels))),
        }
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parse() {
        assert_eq!(Color::parse("white").unwrap(), Color::WHITE);
        assert_eq!(Color::parse("#ff0000").unwrap(), Color::rgba(255, 0, 0, 255));
        assert_eq!(Color::parse("#0f08").unwrap_err().to_string(), "Invalid color: #0f08");
        assert_eq!(Color::parse("#fff").unwrap(), Color::WHITE);
        assert_eq!(
            Color::parse("#11223380").unwrap(),
            Color::rgba(0x11, 0x22, 0x33, 0x80)
        );
        assert!(Color::parse("chartreuse-ish").is_err());
    }

    #[test]
    fn test_opacity_bounds() {
        assert!(Opacity::new(0.0).is_ok());
        assert!(Opacity::new(100.0).is_ok());
        assert!(Opacity::new(-1.0).is_err());
        assert!(Opacity::new(f32::NAN).is_err());
    }

    #[test]
    fn test_blend_modes() {
        assert_eq!(BlendMode::Multiply.blend(0.5, 0.5), 0.25);
        assert_eq!(BlendMode::Screen.blend(0.5, 0.5), 0.75);
        assert_eq!(BlendMode::Addition.blend(0.8, 0.8), 1.0);
        assert_eq!(BlendMode::parse("Darken_Only").unwrap(), BlendMode::Darken);
        assert!(BlendMode::parse("dissolve").is_err());
    }
}
