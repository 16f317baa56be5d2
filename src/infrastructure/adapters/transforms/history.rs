//! History Transforms - 撤销组
//!
//! undo_group_start 保存检查点，undo 回到最近的检查点。

use async_trait::async_trait;

use crate::application::ports::{Transform, TransformError, TransformInput, TransformOutcome};
use crate::domain::session::CanvasMutation;

pub struct UndoGroupStart;

#[async_trait]
impl Transform for UndoGroupStart {
    fn name(&self) -> &'static str {
        "undo_group_start"
    }

    fn description(&self) -> &'static str {
        "Save a checkpoint that undo returns to"
    }

    async fn apply(&self, _input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        Ok(TransformOutcome::mutate(CanvasMutation::BeginUndoGroup))
    }
}

pub struct UndoGroupEnd;

#[async_trait]
impl Transform for UndoGroupEnd {
    fn name(&self) -> &'static str {
        "undo_group_end"
    }

    fn description(&self) -> &'static str {
        "Close the current undo group"
    }

    async fn apply(&self, _input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        Ok(TransformOutcome::mutate(CanvasMutation::EndUndoGroup))
    }
}

pub struct Undo;

#[async_trait]
impl Transform for Undo {
    fn name(&self) -> &'static str {
        "undo"
    }

    fn description(&self) -> &'static str {
        "Restore the canvas saved by the last undo_group_start"
    }

    async fn apply(&self, _input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        Ok(TransformOutcome::mutate(CanvasMutation::Undo))
    }
}
