//! 라이프사이클 관리.
//!
//! 종료 신호 전파와 OS 시그널 대기.

use tokio::sync::watch;
use tracing::{error, info, warn};

/// 라이프사이클 관리자
pub struct LifecycleManager {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    /// 종료 수신기 복제
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// 종료 신호 발송
    pub fn shutdown(&self) {
        info!("종료 신호 발송");
        let _ = self.shutdown_tx.send(true);
    }

    /// OS 시그널 또는 내부 종료 신호 대기
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe();
        tokio::select! {
            _ = wait_for_signal() => self.shutdown(),
            _ = rx.wait_for(|stop| *stop) => {}
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

/// OS 시그널 대기 (SIGINT, SIGTERM)
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("SIGINT 수신"),
                    _ = sigterm.recv() => info!("SIGTERM 수신"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("시그널 핸들러 등록 실패, Ctrl+C만 대기: {}", e);
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C 수신"),
        Err(e) => {
            error!("Ctrl+C 핸들러 등록 실패: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn lifecycle_creation() {
        let lm = LifecycleManager::new();
        let rx = lm.subscribe();
        assert!(!*rx.borrow());
    }

    #[test]
    fn shutdown_signal() {
        let lm = LifecycleManager::new();
        let rx = lm.subscribe();
        lm.shutdown();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn internal_shutdown_ends_wait() {
        let lm = std::sync::Arc::new(LifecycleManager::new());
        let waiter = {
            let lm = lm.clone();
            tokio::spawn(async move { lm.wait_for_shutdown().await })
        };
        lm.shutdown();
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
