//! 优雅关闭
//!
//! 统一的关闭信号：Ctrl+C / SIGTERM 触发后，定时通知循环与长轮询循环退出；
//! 正在进行中的投递重试随任务一起被丢弃（不保证送达）。

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
    /// 致命错误（如 HTTP 端口绑定失败、服务异常退出）
    FatalError(String),
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(1);
        Self {
            shutdown_token: CancellationToken::new(),
            reason_tx,
        }
    }

    /// 获取关闭 token（交给调度循环 / 轮询循环）
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        let _ = self.reason_tx.send(reason);
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, stopping plant relay...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, stopping plant relay...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 运行服务直到其自然结束或收到关闭信号
///
/// 返回触发关闭的原因；服务自然结束且无人调用 shutdown 时返回 None。
pub async fn run_until_shutdown<F>(
    shutdown_manager: Arc<ShutdownManager>,
    app: F,
) -> Option<ShutdownReason>
where
    F: Future<Output = ()>,
{
    let mut reasons = shutdown_manager.subscribe();
    shutdown_manager.install_signal_handlers();

    tokio::select! {
        _ = app => {
            tracing::info!("Plant relay finished normally");
        }
        _ = shutdown_manager.wait_for_shutdown() => {
            tracing::info!("Shutdown signal received, dropping in-flight deliveries");
        }
    }

    reasons.try_recv().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_manager_new() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutdown());
    }

    #[test]
    fn test_shutdown_manager_token() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        assert!(!token.is_cancelled());
        manager.shutdown(ShutdownReason::UserInitiated);
        assert!(token.is_cancelled());
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_shutdown_reason_broadcast() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe();
        manager.shutdown(ShutdownReason::FatalError("bind failed".to_string()));
        let reason = rx.recv().await.unwrap();
        assert_eq!(reason, ShutdownReason::FatalError("bind failed".to_string()));
    }

    #[tokio::test]
    async fn test_run_until_shutdown_stops_pending_app() {
        let manager = Arc::new(ShutdownManager::new());
        let trigger = Arc::clone(&manager);
        tokio::spawn(async move {
            trigger.shutdown(ShutdownReason::UserInitiated);
        });
        let reason = run_until_shutdown(manager.clone(), std::future::pending::<()>()).await;
        assert!(manager.is_shutdown());
        assert_eq!(reason, Some(ShutdownReason::UserInitiated));
    }

    #[tokio::test]
    async fn test_run_until_shutdown_reports_fatal_error_from_app() {
        let manager = Arc::new(ShutdownManager::new());
        let inner = Arc::clone(&manager);
        let reason = run_until_shutdown(manager.clone(), async move {
            inner.shutdown(ShutdownReason::FatalError("address in use".to_string()));
        })
        .await;
        assert_eq!(
            reason,
            Some(ShutdownReason::FatalError("address in use".to_string()))
        );
    }

    #[tokio::test]
    async fn test_run_until_shutdown_normal_completion_has_no_reason() {
        let manager = Arc::new(ShutdownManager::new());
        let reason = run_until_shutdown(manager.clone(), async {}).await;
        assert_eq!(reason, None);
        assert!(!manager.is_shutdown());
    }
}
