//! Catalog Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::queries::{ListOperationsQuery, ListStylesQuery};
use crate::application::registry::{OperationDescriptor, TransformRegistry};

/// List Operations Handler
pub struct ListOperationsHandler {
    registry: Arc<TransformRegistry>,
}

impl ListOperationsHandler {
    pub fn new(registry: Arc<TransformRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle(
        &self,
        _query: ListOperationsQuery,
    ) -> Result<Vec<OperationDescriptor>, ApplicationError> {
        Ok(self.registry.descriptors())
    }
}

/// List Styles Handler - 风格迁移可用的风格
pub struct ListStylesHandler {
    styles: Vec<String>,
}

impl ListStylesHandler {
    pub fn new(styles: Vec<String>) -> Self {
        Self { styles }
    }

    pub async fn handle(&self, _query: ListStylesQuery) -> Result<Vec<String>, ApplicationError> {
        Ok(self.styles.clone())
    }
}
