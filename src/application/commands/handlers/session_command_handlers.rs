//! Session Command Handlers

use std::sync::Arc;

use crate::application::commands::handlers::batch_handlers::decode_canvas;
use crate::application::commands::session_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::SessionStorePort;
use crate::domain::canvas::{Canvas, Color};
use crate::domain::session::EditingState;

/// Create Session Handler - 创建编辑会话
pub struct CreateSessionHandler {
    session_store: Arc<dyn SessionStorePort>,
}

impl CreateSessionHandler {
    pub fn new(session_store: Arc<dyn SessionStorePort>) -> Self {
        Self { session_store }
    }

    pub async fn handle(
        &self,
        cmd: CreateSessionCommand,
    ) -> Result<CreateSessionResponse, ApplicationError> {
        let canvas = match (&cmd.image_data, cmd.width, cmd.height) {
            (Some(data), _, _) => decode_canvas(data)?,
            (None, Some(width), Some(height)) => {
                Canvas::new(width, height, cmd.fill.unwrap_or(Color::WHITE))
                    .map_err(|e| ApplicationError::invalid_params(e.to_string()))?
            }
            (None, None, None) => Canvas::empty(),
            _ => {
                return Err(ApplicationError::invalid_params(
                    "width and height must be given together",
                ))
            }
        };

        let summary = canvas.summary();
        let session_id = self.session_store.create(EditingState::new(canvas));

        tracing::info!(
            session_id = %session_id,
            width = summary.width,
            height = summary.height,
            "Editing session created"
        );

        Ok(CreateSessionResponse {
            session_id,
            canvas: summary,
        })
    }
}

/// Close Session Handler - 关闭会话并释放图像
pub struct CloseSessionHandler {
    session_store: Arc<dyn SessionStorePort>,
}

impl CloseSessionHandler {
    pub fn new(session_store: Arc<dyn SessionStorePort>) -> Self {
        Self { session_store }
    }

    pub async fn handle(
        &self,
        cmd: CloseSessionCommand,
    ) -> Result<CloseSessionResponse, ApplicationError> {
        self.session_store.close(&cmd.session_id).await?;

        Ok(CloseSessionResponse {
            session_id: cmd.session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::error::ErrorKind;
    use crate::domain::canvas::codec;
    use crate::infrastructure::memory::InMemorySessionStore;
    use image::RgbaImage;

    #[tokio::test]
    async fn test_create_variants() {
        let store = InMemorySessionStore::new().arc();
        let handler = CreateSessionHandler::new(store.clone());

        let empty = handler.handle(CreateSessionCommand::default()).await.unwrap();
        assert!(empty.canvas.layers.is_empty());

        let sized = handler
            .handle(CreateSessionCommand {
                width: Some(5),
                height: Some(4),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!((sized.canvas.width, sized.canvas.height), (5, 4));

        let data = codec::encode_png(&RgbaImage::new(7, 3)).unwrap();
        let from_image = handler
            .handle(CreateSessionCommand {
                image_data: Some(data),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(from_image.canvas.width, 7);
        assert_eq!(store.len(), 3);

        let err = handler
            .handle(CreateSessionCommand {
                width: Some(5),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
    }

    #[tokio::test]
    async fn test_close_twice() {
        let store = InMemorySessionStore::new().arc();
        let created = CreateSessionHandler::new(store.clone())
            .handle(CreateSessionCommand::default())
            .await
            .unwrap();

        let close = CloseSessionHandler::new(store.clone());
        close
            .handle(CloseSessionCommand {
                session_id: created.session_id.clone(),
            })
            .await
            .unwrap();
        let err = close
            .handle(CloseSessionCommand {
                session_id: created.session_id,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
