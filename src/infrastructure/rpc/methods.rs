//! RPC 方法表
//!
//! 方法集合是封闭的枚举；名称与别名在启动时建表并校验唯一性。

use std::collections::HashMap;

use thiserror::Error;

use crate::application::ports::ModelKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Initialize,
    Shutdown,
    CreateSession,
    CloseSession,
    GetSession,
    ExecuteCommands,
    RunOperation,
    GetProgress,
    CancelTask,
    ListOperations,
    GetAvailableStyles,
    Model(ModelKind),
}

impl Method {
    pub const ALL: [Method; 15] = [
        Method::Initialize,
        Method::Shutdown,
        Method::CreateSession,
        Method::CloseSession,
        Method::GetSession,
        Method::ExecuteCommands,
        Method::RunOperation,
        Method::GetProgress,
        Method::CancelTask,
        Method::ListOperations,
        Method::GetAvailableStyles,
        Method::Model(ModelKind::Inpainting),
        Method::Model(ModelKind::StyleTransfer),
        Method::Model(ModelKind::BackgroundRemoval),
        Method::Model(ModelKind::Upscale),
    ];

    /// 规范名称
    pub fn name(&self) -> &'static str {
        match self {
            Method::Initialize => "initialize",
            Method::Shutdown => "shutdown",
            Method::CreateSession => "create_session",
            Method::CloseSession => "close_session",
            Method::GetSession => "get_session",
            Method::ExecuteCommands => "execute_commands",
            Method::RunOperation => "run_operation",
            Method::GetProgress => "get_progress",
            Method::CancelTask => "cancel_task",
            Method::ListOperations => "list_operations",
            Method::GetAvailableStyles => "get_available_styles",
            Method::Model(kind) => kind.operation(),
        }
    }

    /// 兼容旧客户端的别名
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Method::CloseSession => &["mcp_close_session"],
            Method::ExecuteCommands => &["execute_gimp_commands"],
            Method::RunOperation => &["mcp_operation"],
            _ => &[],
        }
    }
}

#[derive(Debug, Error)]
pub enum MethodTableError {
    #[error("Duplicate RPC method name: {0}")]
    Duplicate(&'static str),
}

/// 名称 → 方法
#[derive(Debug, Clone)]
pub struct MethodTable {
    methods: HashMap<&'static str, Method>,
}

impl MethodTable {
    pub fn new() -> Result<Self, MethodTableError> {
        let mut methods = HashMap::new();
        for method in Method::ALL {
            for name in std::iter::once(method.name()).chain(method.aliases().iter().copied()) {
                if methods.insert(name, method).is_some() {
                    return Err(MethodTableError::Duplicate(name));
                }
            }
        }
        Ok(Self { methods })
    }

    pub fn resolve(&self, name: &str) -> Option<Method> {
        self.methods.get(name).copied()
    }

    /// 规范名称，按字母排序
    pub fn canonical_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = Method::ALL.iter().map(Method::name).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_resolves_names_and_aliases() {
        let table = MethodTable::new().unwrap();
        for method in Method::ALL {
            assert_eq!(table.resolve(method.name()), Some(method));
        }
        assert_eq!(table.resolve("execute_gimp_commands"), Some(Method::ExecuteCommands));
        assert_eq!(table.resolve("mcp_operation"), Some(Method::RunOperation));
        assert_eq!(table.resolve("mcp_close_session"), Some(Method::CloseSession));
        assert_eq!(table.resolve("ai_upscale"), Some(Method::Model(ModelKind::Upscale)));
        assert_eq!(table.resolve("nope"), None);
        assert_eq!(table.len(), Method::ALL.len() + 3);
        assert_eq!(table.canonical_names().len(), Method::ALL.len());
    }
}
