//! Catalog Queries - 能力目录

/// 列出已注册的操作
#[derive(Debug, Clone, Default)]
pub struct ListOperationsQuery;

/// 列出可用的风格
#[derive(Debug, Clone, Default)]
pub struct ListStylesQuery;
