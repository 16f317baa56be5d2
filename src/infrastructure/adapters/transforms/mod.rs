//! Transform Adapters - 内置图像变换
//!
//! - canvas: 新建、缩放、裁剪、合并、导出
//! - filters: 模糊、锐化、亮度对比度、去色
//! - layers: 图层增删改
//! - history: 撤销组与撤销
//! - analysis: 只读的图像统计
//! - ai: 基于模型后端的 AI 变换

mod ai;
mod analysis;
mod canvas;
mod filters;
mod history;
mod layers;

use std::sync::Arc;

use crate::application::ports::{ModelBackendPort, TransformError};
use crate::application::registry::{RegistryError, TransformRegistry};

pub use ai::ModelTransform;
pub use analysis::AnalyzeImage;
pub use canvas::{CreateImage, CropImage, ExportImage, FlattenImage, ResizeImage};
pub use filters::{AdjustBrightnessContrast, ApplyBlur, ApplySharpen, Desaturate};
pub use history::{Undo, UndoGroupEnd, UndoGroupStart};
pub use layers::{CreateLayer, DuplicateLayer, RemoveLayer, SetActiveLayer, SetLayerProperties};

/// 注册全部内置变换
pub fn standard_registry(
    backend: Arc<dyn ModelBackendPort>,
    styles: Vec<String>,
) -> Result<TransformRegistry, RegistryError> {
    let mut builder = TransformRegistry::builder()
        .register(CreateImage)
        .register(ResizeImage)
        .register(CropImage)
        .register(FlattenImage)
        .register(ExportImage)
        .register(ApplyBlur)
        .register(ApplySharpen)
        .register(AdjustBrightnessContrast)
        .register(Desaturate)
        .register(AnalyzeImage)
        .register(CreateLayer)
        .register(DuplicateLayer)
        .register(RemoveLayer)
        .register(SetActiveLayer)
        .register(SetLayerProperties)
        .register(UndoGroupStart)
        .register(UndoGroupEnd)
        .register(Undo);

    let styles = Arc::new(styles);
    for transform in ModelTransform::all(backend, styles) {
        builder = builder.register(transform);
    }

    builder.build()
}

/// 在阻塞线程池执行像素运算
async fn run_blocking<T, F>(f: F) -> Result<T, TransformError>
where
    F: FnOnce() -> Result<T, TransformError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransformError::Fault(format!("worker thread failed: {}", e)))?
}
