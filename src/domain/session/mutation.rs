//! Canvas Mutations
//!
//! 变换只读取画布，返回一个待提交的变更；
//! 会话在提交时先校验再修改，失败时状态保持不变。

use image::RgbaImage;

use crate::domain::canvas::{Canvas, Layer, LayerHandle, LayerPatch};

#[derive(Debug, Clone)]
pub enum CanvasMutation {
    /// 整体替换画布（新建、缩放、裁剪、合并）
    Replace(Canvas),
    /// 替换某个图层的像素
    ReplacePixels {
        layer: LayerHandle,
        pixels: RgbaImage,
    },
    /// 在顶部添加图层
    AppendLayer(Layer),
    UpdateLayer {
        layer: LayerHandle,
        patch: LayerPatch,
    },
    RemoveLayer(LayerHandle),
    SetActiveLayer(LayerHandle),
    /// 开始撤销组：保存当前画布作为检查点
    BeginUndoGroup,
    EndUndoGroup,
    /// 回到最近一次检查点
    Undo,
}

impl CanvasMutation {
    pub fn kind(&self) -> &'static str {
        match self {
            CanvasMutation::Replace(_) => "replace",
            CanvasMutation::ReplacePixels { .. } => "replace_pixels",
            CanvasMutation::AppendLayer(_) => "append_layer",
            CanvasMutation::UpdateLayer { .. } => "update_layer",
            CanvasMutation::RemoveLayer(_) => "remove_layer",
            CanvasMutation::SetActiveLayer(_) => "set_active_layer",
            CanvasMutation::BeginUndoGroup => "begin_undo_group",
            CanvasMutation::EndUndoGroup => "end_undo_group",
            CanvasMutation::Undo => "undo",
        }
    }
}
