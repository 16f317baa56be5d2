//! Transform Registry
//!
//! 按名称查找变换。注册表在启动时构建并校验，之后只读。

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::ports::{Transform, TransformKind};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Duplicate transform name: {0}")]
    Duplicate(String),

    #[error("Invalid transform name: {0:?}")]
    InvalidName(String),
}

/// 对外展示的变换描述
#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub kind: TransformKind,
    pub description: &'static str,
}

#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<&'static str, Arc<dyn Transform>>,
}

impl TransformRegistry {
    pub fn builder() -> TransformRegistryBuilder {
        TransformRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transform>> {
        self.transforms.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// 按名称排序
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.transforms.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn descriptors(&self) -> Vec<OperationDescriptor> {
        self.names()
            .into_iter()
            .filter_map(|name| self.transforms.get(name))
            .map(|t| OperationDescriptor {
                name: t.name(),
                kind: t.kind(),
                description: t.description(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.names())
            .finish()
    }
}

#[derive(Default)]
pub struct TransformRegistryBuilder {
    entries: Vec<Arc<dyn Transform>>,
}

impl TransformRegistryBuilder {
    pub fn register<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.entries.push(Arc::new(transform));
        self
    }

    pub fn register_arc(mut self, transform: Arc<dyn Transform>) -> Self {
        self.entries.push(transform);
        self
    }

    /// 校验名称格式与唯一性
    pub fn build(self) -> Result<TransformRegistry, RegistryError> {
        let mut transforms = HashMap::with_capacity(self.entries.len());

        for transform in self.entries {
            let name = transform.name();
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            if !valid {
                return Err(RegistryError::InvalidName(name.to_string()));
            }
            if transforms.insert(name, transform).is_some() {
                return Err(RegistryError::Duplicate(name.to_string()));
            }
        }

        Ok(TransformRegistry { transforms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{TransformError, TransformInput, TransformOutcome};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Transform for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn apply(&self, _input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
            Ok(TransformOutcome::new())
        }
    }

    #[test]
    fn test_lookup_and_sorted_names() {
        let registry = TransformRegistry::builder()
            .register(Named("resize_image"))
            .register(Named("apply_blur"))
            .build()
            .unwrap();

        assert_eq!(registry.names(), vec!["apply_blur", "resize_image"]);
        assert!(registry.get("apply_blur").is_some());
        assert!(registry.get("Apply_Blur").is_none());
        assert_eq!(registry.descriptors()[0].kind, TransformKind::Edit);
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = TransformRegistry::builder()
            .register(Named("apply_blur"))
            .register(Named("apply_blur"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(name) if name == "apply_blur"));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let err = TransformRegistry::builder()
            .register(Named("Apply Blur"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidName(_)));
    }
}
