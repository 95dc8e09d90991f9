//! 볼륨 버튼 촬영 트리거.
//!
//! 하드웨어 출력 레벨 변화를 셔터 입력으로 해석한다.
//! 레벨이 상한에 닿으면 기준 레벨로 되돌려 버튼을 계속 누를 수 있게 한다.

use std::sync::Arc;

use depthcap_core::ports::volume::OutputLevelSource;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::SessionHandle;

/// 이 레벨을 넘으면 촬영
pub const FIRE_THRESHOLD: f32 = 0.2;

/// 이 레벨을 넘으면 기준 레벨로 되돌림
pub const RESET_THRESHOLD: f32 = 0.9;

/// 되돌릴 기준 레벨
pub const RESET_LEVEL: f32 = 0.2;

/// 레벨 관찰 결과
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeDecision {
    /// 촬영 여부
    pub fire: bool,
    /// 소스에 강제로 설정할 레벨
    pub reset_to: Option<f32>,
}

/// 레벨 해석기 (순수 상태 머신)
#[derive(Debug, Clone)]
pub struct VolumeTrigger {
    level: f32,
}

impl VolumeTrigger {
    /// 등록 시점 레벨로 시작
    pub fn new(initial_level: f32) -> Self {
        Self {
            level: initial_level,
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// 새 레벨 관찰
    pub fn observe(&mut self, level: f32) -> VolumeDecision {
        self.level = level;
        let fire = level > FIRE_THRESHOLD;

        let reset_to = if level > RESET_THRESHOLD {
            self.level = RESET_LEVEL;
            Some(RESET_LEVEL)
        } else {
            None
        };

        VolumeDecision { fire, reset_to }
    }
}

/// 출력 레벨 구독 태스크
///
/// 발사 결정을 세션의 `capture()`로 전달한다. `stop()`으로 구독을 해제한다.
pub struct VolumeTriggerTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl VolumeTriggerTask {
    pub fn spawn(source: Arc<dyn OutputLevelSource>, session: SessionHandle) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mut levels = source.subscribe();
        let mut trigger = VolumeTrigger::new(source.current_level());
        info!("볼륨 트리거 등록 (레벨 {:.2})", trigger.level());

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    received = levels.recv() => {
                        let level = match received {
                            Ok(level) => level,
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("볼륨 이벤트 {}개 유실", n);
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        };

                        let decision = trigger.observe(level);
                        if decision.fire {
                            debug!("볼륨 트리거 발사 (레벨 {:.2})", level);
                            if let Err(e) = session.capture().await {
                                debug!("볼륨 트리거 촬영 거부: {}", e);
                            }
                        }
                        if let Some(reset) = decision.reset_to {
                            source.set_level(reset);
                        }
                    }
                }
            }
            debug!("볼륨 트리거 해제");
        });

        Self { stop_tx, handle }
    }

    /// 구독 해제 후 태스크 종료 대기
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!("볼륨 트리거 태스크 종료 에러: {}", e);
        }
    }
}
