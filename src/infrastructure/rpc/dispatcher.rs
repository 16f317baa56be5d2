//! RPC Dispatcher
//!
//! 无状态：只持有方法表与装配好的服务。每个调用在独立的 tokio 任务中执行，
//! 截止时间到达时向调用方返回 Timeout，底层任务继续运行，task_id 仍可查询。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::dto::*;
use super::envelope::{parse_request, RpcRequest, RpcResponse};
use super::methods::{Method, MethodTable, MethodTableError};
use super::services::RpcServices;
use crate::application::ports::TransformParams;
use crate::application::{
    ApplicationError, CancelTaskCommand, CloseSessionCommand, CreateSessionCommand, ErrorKind,
    ExecuteBatchCommand, GetProgressQuery, GetSessionQuery, ListOperationsQuery, ListStylesQuery,
    RunModelOperationCommand,
};

/// 调用截止时间
#[derive(Debug, Clone, Copy)]
pub struct RpcTimeouts {
    pub default: Duration,
    pub max: Duration,
}

impl RpcTimeouts {
    pub fn new(default: Duration, max: Duration) -> Self {
        Self { default, max }
    }

    /// 客户端请求的截止时间，不超过上限
    pub fn deadline(&self, requested_ms: Option<u64>) -> Duration {
        requested_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default)
            .min(self.max)
    }
}

impl Default for RpcTimeouts {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(3600))
    }
}

pub struct RpcDispatcher {
    services: Arc<RpcServices>,
    table: MethodTable,
    timeouts: RpcTimeouts,
    shutdown: CancellationToken,
}

impl RpcDispatcher {
    pub fn new(
        services: Arc<RpcServices>,
        timeouts: RpcTimeouts,
        shutdown: CancellationToken,
    ) -> Result<Self, MethodTableError> {
        let table = MethodTable::new()?;
        tracing::info!(methods = table.len(), "RPC method table ready");
        Ok(Self {
            services,
            table,
            timeouts,
            shutdown,
        })
    }

    pub fn services(&self) -> &Arc<RpcServices> {
        &self.services
    }

    /// 处理一条原始请求文本
    pub async fn handle_text(&self, text: &str) -> RpcResponse {
        match parse_request(text) {
            Ok(request) => self.dispatch(request).await,
            Err((id, err)) => {
                tracing::warn!(kind = %err.kind(), error = %err, "Rejected RPC envelope");
                RpcResponse::failure(id, &err)
            }
        }
    }

    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest {
            id,
            method: name,
            params,
            timeout_ms,
            ..
        } = request;

        let Some(method) = self.table.resolve(&name) else {
            tracing::warn!(method = %name, "Unknown RPC method");
            return RpcResponse::failure(id, &ApplicationError::UnknownMethod(name));
        };

        let deadline = self.timeouts.deadline(timeout_ms);
        let started = Instant::now();
        let call = tokio::spawn(route(
            Arc::clone(&self.services),
            method,
            params,
            self.table.canonical_names(),
            self.shutdown.clone(),
        ));

        let outcome = match tokio::time::timeout(deadline, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ApplicationError::internal(format!(
                "handler for {} aborted: {}",
                method.name(),
                e
            ))),
            Err(_) => Err(ApplicationError::Timeout(deadline.as_millis() as u64)),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(result) => {
                tracing::debug!(method = %method.name(), id = %id, elapsed_ms, "RPC call completed");
                RpcResponse::success(id, result)
            }
            Err(err) => {
                if err.kind() == ErrorKind::InternalError {
                    tracing::error!(
                        method = %method.name(),
                        id = %id,
                        elapsed_ms,
                        error = %err,
                        "RPC call failed with internal error"
                    );
                } else {
                    tracing::warn!(
                        method = %method.name(),
                        id = %id,
                        elapsed_ms,
                        kind = %err.kind(),
                        error = %err,
                        "RPC call failed"
                    );
                }
                RpcResponse::failure(id, &err)
            }
        }
    }
}

async fn route(
    services: Arc<RpcServices>,
    method: Method,
    params: Value,
    method_names: Vec<&'static str>,
    shutdown: CancellationToken,
) -> Result<Value, ApplicationError> {
    match method {
        Method::Initialize => to_json(InitializeResult {
            server: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: super::envelope::JSONRPC_VERSION,
            methods: method_names,
            operations: services.registry.names(),
        }),

        Method::Shutdown => {
            tracing::info!("Shutdown requested over RPC");
            shutdown.cancel();
            Ok(json!({ "status": "shutting_down" }))
        }

        Method::CreateSession => {
            let p: CreateSessionParams = parse_params(params)?;
            let fill = p.fill_color()?;
            let response = services
                .create_session_handler
                .handle(CreateSessionCommand {
                    image_data: p.image_data,
                    width: p.width,
                    height: p.height,
                    fill,
                })
                .await?;
            to_json(CreateSessionResult {
                session_id: response.session_id,
                canvas: response.canvas,
            })
        }

        Method::CloseSession => {
            let p: SessionIdParams = parse_params(params)?;
            let response = services
                .close_session_handler
                .handle(CloseSessionCommand {
                    session_id: p.session_id,
                })
                .await?;
            to_json(CloseSessionResult {
                session_id: response.session_id,
                closed: true,
            })
        }

        Method::GetSession => {
            let p: GetSessionParams = parse_params(params)?;
            let response = services
                .get_session_handler
                .handle(GetSessionQuery {
                    session_id: p.session_id,
                    include_image_data: p.include_image_data,
                })
                .await?;
            to_json(GetSessionResult::encode(response)?)
        }

        Method::ExecuteCommands => {
            let p: ExecuteCommandsParams = parse_params(params)?;
            let result = services
                .executor
                .execute(ExecuteBatchCommand {
                    session_id: p.session_id,
                    image_data: p.image_data,
                    commands: p.commands,
                    include_image_data: p.include_image_data,
                    task_id: p.task_id,
                })
                .await?;
            to_json(BatchResultDto::encode(result)?)
        }

        Method::RunOperation => {
            let p: RunOperationParams = parse_params(params)?;
            let result = services.executor.execute(p.into_batch()).await?;

            // 失败的回复不带会话 ID，本次调用创建的会话随即关闭
            if result.session_created && !result.success {
                if let Err(e) = services.session_store.close(&result.session_id).await {
                    tracing::warn!(
                        session_id = %result.session_id,
                        error = %e,
                        "Failed to close session of failed operation"
                    );
                }
            }
            flat_operation_result(result)
        }

        Method::GetProgress => {
            let p: TaskIdParams = parse_params(params)?;
            let snapshot = services
                .get_progress_handler
                .handle(GetProgressQuery { task_id: p.task_id })
                .await?;
            to_json(snapshot)
        }

        Method::CancelTask => {
            let p: TaskIdParams = parse_params(params)?;
            let response = services
                .cancel_task_handler
                .handle(CancelTaskCommand { task_id: p.task_id })
                .await?;
            to_json(CancelTaskResult {
                task_id: response.task_id,
                cancelled: response.cancelled,
            })
        }

        Method::ListOperations => {
            let operations = services.list_operations_handler.handle(ListOperationsQuery).await?;
            Ok(json!({ "operations": operations }))
        }

        Method::GetAvailableStyles => {
            let styles = services.list_styles_handler.handle(ListStylesQuery).await?;
            Ok(json!({ "styles": styles }))
        }

        Method::Model(kind) => {
            let p: ModelOperationParams = parse_params(params)?;
            let response = services
                .run_model_handler
                .handle(RunModelOperationCommand {
                    kind,
                    image_data: p.image_data,
                    mask_data: p.mask_data,
                    params: TransformParams::new(p.params),
                    task_id: p.task_id,
                    detach: p.detach,
                })
                .await?;
            model_operation_result(response)
        }
    }
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, ApplicationError> {
    serde_json::to_value(value).map_err(|e| ApplicationError::internal(e.to_string()))
}
