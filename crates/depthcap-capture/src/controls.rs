//! 촬영 컨트롤 활성화 게이트.
//!
//! 세션의 촬영 가능 여부와 서버 생존 확인을 결합한다.
//! 세션 상태가 바뀔 때마다 프로브하며, 두 조건이 모두 참일 때만 활성화된다.

use std::sync::Arc;

use depthcap_core::error::CoreError;
use depthcap_core::models::health::HealthStatus;
use depthcap_core::ports::health::HealthProbe;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 촬영 컨트롤 상태 관리자
pub struct CaptureControls {
    probe: Arc<dyn HealthProbe>,
    running_rx: watch::Receiver<bool>,
    enabled_tx: Arc<watch::Sender<bool>>,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CaptureControls {
    /// 세션 실행 관찰을 구독하는 태스크 시작
    pub fn spawn(running_rx: watch::Receiver<bool>, probe: Arc<dyn HealthProbe>) -> Self {
        let (enabled_tx, _) = watch::channel(false);
        let enabled_tx = Arc::new(enabled_tx);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = {
            let probe = probe.clone();
            let enabled_tx = enabled_tx.clone();
            let mut running_rx = running_rx.clone();
            tokio::spawn(async move {
                loop {
                    let status = if *running_rx.borrow_and_update() {
                        probe.probe().await
                    } else {
                        HealthStatus::Offline
                    };
                    // 확인 중에 세션이 멈췄을 수 있으므로 발행 시점의 값을 쓴다
                    publish(&enabled_tx, *running_rx.borrow(), status);

                    tokio::select! {
                        changed = running_rx.changed() => {
                            if changed.is_err() {
                                publish(&enabled_tx, false, HealthStatus::Offline);
                                break;
                            }
                        }
                        _ = stop_rx.changed() => break,
                    }
                }
                debug!("촬영 컨트롤 감시 종료");
            })
        };

        Self {
            probe,
            running_rx,
            enabled_tx,
            stop_tx,
            handle,
        }
    }

    /// 활성화 여부 구독
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.enabled_tx.subscribe()
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled_tx.borrow()
    }

    /// 즉시 다시 프로브. 오프라인 후 복구되면 다시 활성화된다.
    pub async fn refresh(&self) -> HealthStatus {
        let status = self.probe.probe().await;
        let running = *self.running_rx.borrow();
        publish(&self.enabled_tx, running, status);
        status
    }

    /// 분석 단계로 넘어가기 전 서버 확인
    pub async fn check_before_analysis(&self) -> Result<(), CoreError> {
        match self.refresh().await {
            HealthStatus::Alive => Ok(()),
            HealthStatus::Offline => Err(CoreError::Network(
                "서버에 연결할 수 없어 분석을 시작할 수 없습니다".to_string(),
            )),
        }
    }

    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!("촬영 컨트롤 태스크 종료 에러: {}", e);
        }
    }
}

fn publish(enabled_tx: &watch::Sender<bool>, running: bool, status: HealthStatus) {
    let enabled = running && status.is_alive();
    let changed = enabled_tx.send_if_modified(|current| {
        if *current == enabled {
            false
        } else {
            *current = enabled;
            true
        }
    });
    if changed {
        info!("촬영 컨트롤 {} (서버 {})", if enabled { "활성" } else { "비활성" }, status);
    }
}
