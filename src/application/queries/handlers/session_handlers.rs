//! Session Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{BusyPolicy, SessionStorePort};
use crate::application::queries::{GetSessionQuery, GetSessionResponse};

/// Get Session Handler
///
/// 读取画布结构需要持有会话租约，因此会排在进行中的批次之后。
pub struct GetSessionHandler {
    session_store: Arc<dyn SessionStorePort>,
    busy_policy: BusyPolicy,
}

impl GetSessionHandler {
    pub fn new(session_store: Arc<dyn SessionStorePort>, busy_policy: BusyPolicy) -> Self {
        Self {
            session_store,
            busy_policy,
        }
    }

    pub async fn handle(&self, query: GetSessionQuery) -> Result<GetSessionResponse, ApplicationError> {
        let lease = self
            .session_store
            .acquire(&query.session_id, self.busy_policy)
            .await?;
        let info = self.session_store.get(&query.session_id)?;

        let state = lease.state();
        let image = if query.include_image_data && !state.canvas().is_empty() {
            Some(
                state
                    .canvas()
                    .flatten()
                    .map_err(|e| ApplicationError::internal(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(GetSessionResponse {
            session_id: info.session_id,
            created_at: info.created_at,
            last_access: info.last_access,
            canvas: state.canvas().summary(),
            history: state.history().iter().map(|h| h.operation.clone()).collect(),
            undo_available: state.has_checkpoint(),
            image,
        })
    }
}
