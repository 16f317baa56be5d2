//! Canvas Aggregate
//!
//! 画布由图层 arena 组成：
//! - `slots` 保存图层，删除后槽位置空，句柄不复用
//! - `stack` 记录从底到顶的绘制顺序
//! - `active` 指向当前活动图层

use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::Serialize;

use super::{BlendMode, CanvasError, Color, LayerHandle, Opacity};

/// 单边最大像素数
pub const MAX_DIMENSION: u32 = 16_384;

/// 图层
#[derive(Debug, Clone)]
pub struct Layer {
    name: String,
    visible: bool,
    opacity: Opacity,
    blend_mode: BlendMode,
    pixels: RgbaImage,
}

impl Layer {
    pub fn new(name: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            name: name.into(),
            visible: true,
            opacity: Opacity::OPAQUE,
            blend_mode: BlendMode::Normal,
            pixels,
        }
    }

    pub fn filled(name: impl Into<String>, width: u32, height: u32, color: Color) -> Self {
        Self::new(name, RgbaImage::from_pixel(width, height, color.to_rgba()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn opacity(&self) -> Opacity {
        self.opacity
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn apply_patch(&mut self, patch: LayerPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(visible) = patch.visible {
            self.visible = visible;
        }
        if let Some(opacity) = patch.opacity {
            self.opacity = opacity;
        }
        if let Some(mode) = patch.blend_mode {
            self.blend_mode = mode;
        }
    }
}

/// 图层属性的部分更新
#[derive(Debug, Clone, Default)]
pub struct LayerPatch {
    pub name: Option<String>,
    pub visible: Option<bool>,
    pub opacity: Option<Opacity>,
    pub blend_mode: Option<BlendMode>,
}

impl LayerPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.visible.is_none()
            && self.opacity.is_none()
            && self.blend_mode.is_none()
    }
}

/// 画布（图像聚合根）
#[derive(Debug, Clone, Default)]
pub struct Canvas {
    width: u32,
    height: u32,
    slots: Vec<Option<Layer>>,
    stack: Vec<LayerHandle>,
    active: Option<LayerHandle>,
}

impl Canvas {
    /// 空画布（会话尚未载入图像）
    pub fn empty() -> Self {
        Self::default()
    }

    /// 新建纯色画布，带一个 Background 图层
    pub fn new(width: u32, height: u32, fill: Color) -> Result<Self, CanvasError> {
        check_dimensions(width, height)?;
        Self::from_image(RgbaImage::from_pixel(width, height, fill.to_rgba()))
    }

    pub fn from_image(image: RgbaImage) -> Result<Self, CanvasError> {
        let (width, height) = image.dimensions();
        check_dimensions(width, height)?;

        let mut canvas = Self {
            width,
            height,
            ..Self::default()
        };
        canvas.push_layer(Layer::new("Background", image))?;
        Ok(canvas)
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn layer_count(&self) -> usize {
        self.stack.len()
    }

    pub fn layer(&self, handle: LayerHandle) -> Result<&Layer, CanvasError> {
        self.slots
            .get(handle.index())
            .and_then(|slot| slot.as_ref())
            .ok_or(CanvasError::LayerNotFound(handle))
    }

    fn layer_mut(&mut self, handle: LayerHandle) -> Result<&mut Layer, CanvasError> {
        self.slots
            .get_mut(handle.index())
            .and_then(|slot| slot.as_mut())
            .ok_or(CanvasError::LayerNotFound(handle))
    }

    pub fn active_handle(&self) -> Result<LayerHandle, CanvasError> {
        self.active.ok_or(CanvasError::Empty)
    }

    pub fn active_layer(&self) -> Result<&Layer, CanvasError> {
        self.layer(self.active_handle()?)
    }

    /// 按从底到顶顺序遍历图层
    pub fn layers(&self) -> impl Iterator<Item = (LayerHandle, &Layer)> + '_ {
        self.stack
            .iter()
            .filter_map(|h| self.layer(*h).ok().map(|layer| (*h, layer)))
    }

    /// 下一个 push_layer 将分配的句柄
    pub fn next_handle(&self) -> LayerHandle {
        LayerHandle::new(self.slots.len() as u32)
    }

    /// 在顶部添加图层并设为活动图层
    pub fn push_layer(&mut self, layer: Layer) -> Result<LayerHandle, CanvasError> {
        self.check_layer_size(layer.pixels())?;
        if self.width == 0 {
            (self.width, self.height) = layer.pixels().dimensions();
        }

        let handle = LayerHandle::new(self.slots.len() as u32);
        self.slots.push(Some(layer));
        self.stack.push(handle);
        self.active = Some(handle);
        Ok(handle)
    }

    pub fn replace_pixels(
        &mut self,
        handle: LayerHandle,
        pixels: RgbaImage,
    ) -> Result<(), CanvasError> {
        self.check_layer_size(&pixels)?;
        self.layer_mut(handle)?.pixels = pixels;
        Ok(())
    }

    pub fn update_layer(&mut self, handle: LayerHandle, patch: LayerPatch) -> Result<(), CanvasError> {
        self.layer_mut(handle)?.apply_patch(patch);
        Ok(())
    }

    pub fn set_active(&mut self, handle: LayerHandle) -> Result<(), CanvasError> {
        self.layer(handle)?;
        self.active = Some(handle);
        Ok(())
    }

    /// 删除图层；活动图层被删时切换到最顶层
    pub fn remove_layer(&mut self, handle: LayerHandle) -> Result<Layer, CanvasError> {
        self.layer(handle)?;
        if self.stack.len() <= 1 {
            return Err(CanvasError::LastLayer);
        }

        self.stack.retain(|h| *h != handle);
        let removed = self.slots[handle.index()]
            .take()
            .ok_or(CanvasError::LayerNotFound(handle))?;
        if self.active == Some(handle) {
            self.active = self.stack.last().copied();
        }
        Ok(removed)
    }

    /// 所有图层一起缩放，返回新画布
    pub fn resized(&self, width: u32, height: u32, filter: FilterType) -> Result<Canvas, CanvasError> {
        if self.is_empty() {
            return Err(CanvasError::Empty);
        }
        check_dimensions(width, height)?;

        let mut out = self.clone();
        out.width = width;
        out.height = height;
        for layer in out.slots.iter_mut().flatten() {
            layer.pixels = imageops::resize(&layer.pixels, width, height, filter);
        }
        Ok(out)
    }

    /// 所有图层一起裁剪，返回新画布
    pub fn cropped(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Canvas, CanvasError> {
        if self.is_empty() {
            return Err(CanvasError::Empty);
        }
        check_dimensions(width, height)?;
        let fits = x
            .checked_add(width)
            .zip(y.checked_add(height))
            .map(|(right, bottom)| right <= self.width && bottom <= self.height)
            .unwrap_or(false);
        if !fits {
            return Err(CanvasError::OutOfBounds(format!(
                "{}x{}+{}+{} outside {}x{}",
                width, height, x, y, self.width, self.height
            )));
        }

        let mut out = self.clone();
        out.width = width;
        out.height = height;
        for layer in out.slots.iter_mut().flatten() {
            layer.pixels = imageops::crop_imm(&layer.pixels, x, y, width, height).to_image();
        }
        Ok(out)
    }

    /// 合成所有可见图层
    pub fn flatten(&self) -> Result<RgbaImage, CanvasError> {
        if self.is_empty() {
            return Err(CanvasError::Empty);
        }

        let mut out = RgbaImage::new(self.width, self.height);
        for (_, layer) in self.layers() {
            if !layer.visible() || layer.opacity().value() == 0.0 {
                continue;
            }
            composite(&mut out, layer);
        }
        Ok(out)
    }

    /// 合并为单图层画布
    pub fn flattened(&self) -> Result<Canvas, CanvasError> {
        Canvas::from_image(self.flatten()?)
    }

    pub fn summary(&self) -> CanvasSummary {
        CanvasSummary {
            width: self.width,
            height: self.height,
            active_layer: self.active,
            layers: self
                .layers()
                .map(|(handle, layer)| LayerSummary {
                    id: handle,
                    name: layer.name().to_string(),
                    visible: layer.visible(),
                    opacity: layer.opacity().value(),
                    blend_mode: layer.blend_mode(),
                })
                .collect(),
        }
    }

    fn check_layer_size(&self, pixels: &RgbaImage) -> Result<(), CanvasError> {
        let (w, h) = pixels.dimensions();
        if self.is_empty() && self.width == 0 {
            return check_dimensions(w, h);
        }
        if (w, h) != (self.width, self.height) {
            return Err(CanvasError::SizeMismatch {
                width: self.width,
                height: self.height,
                actual_width: w,
                actual_height: h,
            });
        }
        Ok(())
    }
}

/// 画布结构摘要（不含像素）
#[derive(Debug, Clone, Serialize)]
pub struct CanvasSummary {
    pub width: u32,
    pub height: u32,
    pub active_layer: Option<LayerHandle>,
    pub layers: Vec<LayerSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub id: LayerHandle,
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
}

fn check_dimensions(width: u32, height: u32) -> Result<(), CanvasError> {
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(CanvasError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// source-over 合成，颜色按混合模式计算
fn composite(base: &mut RgbaImage, layer: &Layer) {
    let opacity = layer.opacity().fraction();
    let mode = layer.blend_mode();

    for (dst, src) in base.pixels_mut().zip(layer.pixels().pixels()) {
        let src_a = src[3] as f32 / 255.0 * opacity;
        if src_a == 0.0 {
            continue;
        }
        let dst_a = dst[3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);

        for c in 0..3 {
            let cs = src[c] as f32 / 255.0;
            let cb = dst[c] as f32 / 255.0;
            let mixed = (1.0 - dst_a) * cs + dst_a * mode.blend(cb, cs);
            let co = (src_a * mixed + dst_a * cb * (1.0 - src_a)) / out_a;
            dst[c] = (co * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}
