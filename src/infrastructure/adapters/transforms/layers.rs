//! Layer Transforms - 图层管理

use async_trait::async_trait;
use image::imageops::{self, FilterType};

use crate::application::ports::{
    Transform, TransformError, TransformInput, TransformOutcome, TransformParams,
};
use crate::domain::canvas::{BlendMode, Canvas, Color, Layer, LayerHandle, LayerPatch, Opacity};
use crate::domain::session::CanvasMutation;

fn default_layer_name(canvas: &Canvas) -> String {
    format!("Layer {}", canvas.layer_count() + 1)
}

/// create_layer - 在顶部添加图层
///
/// 二进制参数 `image` 存在时作为图层内容（按画布尺寸缩放），
/// 否则用 `fill` 填充，缺省透明。
pub struct CreateLayer;

#[async_trait]
impl Transform for CreateLayer {
    fn name(&self) -> &'static str {
        "create_layer"
    }

    fn description(&self) -> &'static str {
        "Add a new layer on top of the stack"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let (width, height) = canvas.dimensions();
        let name = match input.params.str("name")? {
            Some(name) => name.to_string(),
            None => default_layer_name(canvas),
        };

        let layer = match input.image("image") {
            Some(image) if image.dimensions() == (width, height) => Layer::new(name, image.clone()),
            Some(image) => Layer::new(name, imageops::resize(image, width, height, FilterType::Lanczos3)),
            None => {
                let fill = input.params.color_or("fill", Color::TRANSPARENT)?;
                Layer::filled(name, width, height, fill)
            }
        };
        let layer = with_properties(layer, input.params)?;

        Ok(TransformOutcome::mutate(CanvasMutation::AppendLayer(layer))
            .with_field("layer_id", canvas.next_handle().as_u32()))
    }
}

/// 应用可选的 opacity / blend_mode / visible 参数
fn with_properties(mut layer: Layer, params: &TransformParams) -> Result<Layer, TransformError> {
    layer.apply_patch(layer_patch(params, false)?);
    Ok(layer)
}

fn layer_patch(params: &TransformParams, include_name: bool) -> Result<LayerPatch, TransformError> {
    let name = if include_name {
        params.str("name")?.map(str::to_string)
    } else {
        None
    };
    let opacity = params
        .f64("opacity")?
        .map(|v| Opacity::new(v as f32))
        .transpose()?;
    let blend_mode = params.str("blend_mode")?.map(BlendMode::parse).transpose()?;

    let visible = match params.get("visible") {
        None => None,
        Some(_) => Some(params.bool_or("visible", true)?),
    };

    Ok(LayerPatch {
        name,
        visible,
        opacity,
        blend_mode,
    })
}

/// duplicate_layer - 复制图层到顶部
pub struct DuplicateLayer;

#[async_trait]
impl Transform for DuplicateLayer {
    fn name(&self) -> &'static str {
        "duplicate_layer"
    }

    fn description(&self) -> &'static str {
        "Copy a layer to the top of the stack"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let handle = input.params.layer_or_active(canvas)?;
        let source = canvas.layer(handle)?;
        let name = match input.params.str("name")? {
            Some(name) => name.to_string(),
            None => format!("{} copy", source.name()),
        };

        Ok(
            TransformOutcome::mutate(CanvasMutation::AppendLayer(source.clone().with_name(name)))
                .with_field("layer_id", canvas.next_handle().as_u32()),
        )
    }
}

/// remove_layer - 删除图层（不能删除最后一个）
pub struct RemoveLayer;

#[async_trait]
impl Transform for RemoveLayer {
    fn name(&self) -> &'static str {
        "remove_layer"
    }

    fn description(&self) -> &'static str {
        "Delete a layer"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let handle = input.params.layer_or_active(canvas)?;
        if canvas.layer_count() <= 1 {
            return Err(TransformError::invalid("cannot remove the last layer"));
        }
        Ok(TransformOutcome::mutate(CanvasMutation::RemoveLayer(handle)))
    }
}

/// set_active_layer
pub struct SetActiveLayer;

#[async_trait]
impl Transform for SetActiveLayer {
    fn name(&self) -> &'static str {
        "set_active_layer"
    }

    fn description(&self) -> &'static str {
        "Select the layer that filters operate on"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let handle = LayerHandle::new(input.params.require_u32("layer")?);
        canvas.layer(handle)?;
        Ok(TransformOutcome::mutate(CanvasMutation::SetActiveLayer(handle)))
    }
}

/// set_layer_properties - 名称、可见性、不透明度、混合模式
pub struct SetLayerProperties;

#[async_trait]
impl Transform for SetLayerProperties {
    fn name(&self) -> &'static str {
        "set_layer_properties"
    }

    fn description(&self) -> &'static str {
        "Change name, visibility, opacity or blend mode of a layer"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let layer = input.params.layer_or_active(canvas)?;
        let patch = layer_patch(input.params, true)?;
        if patch.is_empty() {
            return Err(TransformError::invalid(
                "at least one of name, visible, opacity, blend_mode is required",
            ));
        }
        Ok(TransformOutcome::mutate(CanvasMutation::UpdateLayer { layer, patch }))
    }
}
