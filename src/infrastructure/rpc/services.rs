//! RPC Services
//!
//! 分发器使用的端口与 Command/Query Handlers，启动时一次性装配。

use std::sync::Arc;

use crate::application::{
    // Command handlers
    CancelTaskHandler, CloseSessionHandler, CommandExecutor, CreateSessionHandler,
    RunModelOperationHandler,
    // Query handlers
    GetProgressHandler, GetSessionHandler, ListOperationsHandler, ListStylesHandler,
    // Ports
    BusyPolicy, ProgressTrackerPort, SessionStorePort, TransformRegistry,
};

pub struct RpcServices {
    // ========== Ports ==========
    pub session_store: Arc<dyn SessionStorePort>,
    pub progress_tracker: Arc<dyn ProgressTrackerPort>,
    pub registry: Arc<TransformRegistry>,

    // ========== Command Handlers ==========
    pub executor: Arc<CommandExecutor>,
    pub create_session_handler: CreateSessionHandler,
    pub close_session_handler: CloseSessionHandler,
    pub run_model_handler: RunModelOperationHandler,
    pub cancel_task_handler: CancelTaskHandler,

    // ========== Query Handlers ==========
    pub get_session_handler: GetSessionHandler,
    pub get_progress_handler: GetProgressHandler,
    pub list_operations_handler: ListOperationsHandler,
    pub list_styles_handler: ListStylesHandler,
}

impl RpcServices {
    pub fn new(
        session_store: Arc<dyn SessionStorePort>,
        progress_tracker: Arc<dyn ProgressTrackerPort>,
        registry: Arc<TransformRegistry>,
        styles: Vec<String>,
        busy_policy: BusyPolicy,
    ) -> Self {
        let executor = Arc::new(CommandExecutor::new(
            session_store.clone(),
            progress_tracker.clone(),
            registry.clone(),
            busy_policy,
        ));

        Self {
            // Ports
            session_store: session_store.clone(),
            progress_tracker: progress_tracker.clone(),
            registry: registry.clone(),

            // Command handlers
            executor: executor.clone(),
            create_session_handler: CreateSessionHandler::new(session_store.clone()),
            close_session_handler: CloseSessionHandler::new(session_store.clone()),
            run_model_handler: RunModelOperationHandler::new(executor, progress_tracker.clone()),
            cancel_task_handler: CancelTaskHandler::new(progress_tracker.clone()),

            // Query handlers
            get_session_handler: GetSessionHandler::new(session_store, busy_policy),
            get_progress_handler: GetProgressHandler::new(progress_tracker),
            list_operations_handler: ListOperationsHandler::new(registry),
            list_styles_handler: ListStylesHandler::new(styles),
        }
    }
}
