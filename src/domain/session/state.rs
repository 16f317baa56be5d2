//! Editing State
//!
//! 会话持有的全部可变状态：画布、撤销检查点、操作历史

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::CanvasMutation;
use crate::domain::canvas::{Canvas, CanvasError};

/// 历史记录上限
const MAX_HISTORY: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub operation: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct EditingState {
    canvas: Canvas,
    checkpoint: Option<Canvas>,
    undo_group_open: bool,
    history: VecDeque<HistoryEntry>,
}

impl EditingState {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            canvas,
            ..Default::default()
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// 从旧到新
    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    pub fn undo_group_open(&self) -> bool {
        self.undo_group_open
    }

    /// 提交变更
    ///
    /// 所有校验都在修改之前完成；返回 Err 时状态未被改动。
    pub fn apply(&mut self, operation: &str, mutation: CanvasMutation) -> Result<(), CanvasError> {
        match mutation {
            CanvasMutation::Replace(canvas) => {
                self.canvas = canvas;
            }
            CanvasMutation::ReplacePixels { layer, pixels } => {
                self.canvas.replace_pixels(layer, pixels)?;
            }
            CanvasMutation::AppendLayer(layer) => {
                self.canvas.push_layer(layer)?;
            }
            CanvasMutation::UpdateLayer { layer, patch } => {
                self.canvas.update_layer(layer, patch)?;
            }
            CanvasMutation::RemoveLayer(layer) => {
                self.canvas.remove_layer(layer)?;
            }
            CanvasMutation::SetActiveLayer(layer) => {
                self.canvas.set_active(layer)?;
            }
            CanvasMutation::BeginUndoGroup => {
                self.checkpoint = Some(self.canvas.clone());
                self.undo_group_open = true;
            }
            CanvasMutation::EndUndoGroup => {
                self.undo_group_open = false;
            }
            CanvasMutation::Undo => {
                let checkpoint = self.checkpoint.take().ok_or(CanvasError::NoCheckpoint)?;
                self.canvas = checkpoint;
                self.undo_group_open = false;
            }
        }

        self.record(operation);
        Ok(())
    }

    /// 记录未产生变更的操作
    pub fn record(&mut self, operation: &str) {
        if self.history.len() >= MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(HistoryEntry {
            operation: operation.to_string(),
            at: Utc::now(),
        });
    }

    /// 释放所有图像缓冲区
    pub fn release(&mut self) {
        self.canvas = Canvas::empty();
        self.checkpoint = None;
        self.undo_group_open = false;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::canvas::{Color, Layer};

    fn state() -> EditingState {
        EditingState::new(Canvas::new(4, 4, Color::WHITE).unwrap())
    }

    #[test]
    fn test_failed_mutation_leaves_state_untouched() {
        let mut s = state();
        let bg = s.canvas().active_handle().unwrap();

        let err = s
            .apply("remove_layer", CanvasMutation::RemoveLayer(bg))
            .unwrap_err();
        assert!(matches!(err, CanvasError::LastLayer));
        assert_eq!(s.canvas().layer_count(), 1);
        assert!(s.history().is_empty());

        let err = s
            .apply(
                "create_layer",
                CanvasMutation::AppendLayer(Layer::filled("x", 3, 3, Color::BLACK)),
            )
            .unwrap_err();
        assert!(matches!(err, CanvasError::SizeMismatch { .. }));
        assert_eq!(s.canvas().layer_count(), 1);
    }

    #[test]
    fn test_undo_restores_checkpoint() {
        let mut s = state();
        s.apply("undo_group_start", CanvasMutation::BeginUndoGroup).unwrap();
        assert!(s.undo_group_open());

        s.apply(
            "create_layer",
            CanvasMutation::AppendLayer(Layer::filled("x", 4, 4, Color::BLACK)),
        )
        .unwrap();
        assert_eq!(s.canvas().layer_count(), 2);

        s.apply("undo", CanvasMutation::Undo).unwrap();
        assert_eq!(s.canvas().layer_count(), 1);
        assert!(!s.has_checkpoint());
        assert!(matches!(
            s.apply("undo", CanvasMutation::Undo),
            Err(CanvasError::NoCheckpoint)
        ));
    }

    #[test]
    fn test_history_keeps_newest_entries() {
        let mut s = state();
        for i in 0..MAX_HISTORY + 5 {
            s.record(&format!("op{}", i));
        }
        assert_eq!(s.history().len(), MAX_HISTORY);
        assert_eq!(s.history().front().unwrap().operation, "op5");
        assert_eq!(
            s.history().back().unwrap().operation,
            format!("op{}", MAX_HISTORY + 4)
        );
    }

    #[test]
    fn test_release_drops_buffers() {
        let mut s = state();
        s.apply("undo_group_start", CanvasMutation::BeginUndoGroup).unwrap();
        s.release();
        assert!(s.canvas().is_empty());
        assert!(!s.has_checkpoint());
        assert!(s.history().is_empty());
    }
}
