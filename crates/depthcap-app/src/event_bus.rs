//! 내부 이벤트 버스.
//!
//! `tokio::broadcast` 기반 내부 이벤트 라우팅.
//! 세션/업로드/컨트롤 관찰 채널을 하나의 타임스탬프 이벤트 흐름으로 합친다.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use depthcap_core::models::analysis::MeasurementResult;
use depthcap_core::models::capture::{CaptureEffect, SessionState};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// 내부 앱 이벤트
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// 세션 상태 변경
    SessionChanged(SessionState),
    /// 촬영 효과 (깜빡임, 진행 표시, 종료)
    Capture(CaptureEffect),
    /// 업로드 성공 카운터 갱신
    UploadCounted(u64),
    /// 촬영 컨트롤 활성화 변경
    ControlsChanged(bool),
    /// 분석 완료
    AnalysisCompleted(MeasurementResult),
    /// 모델 파일 저장 완료
    ModelDownloaded(PathBuf),
    /// 에러 발생
    Error(String),
}

/// 발행 시각이 붙은 이벤트
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub at: DateTime<Utc>,
    pub event: AppEvent,
}

/// 내부 이벤트 버스
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 이벤트 발행
    pub fn publish(&self, event: AppEvent) {
        debug!("이벤트 발행: {:?}", std::mem::discriminant(&event));
        let _ = self.tx.send(BusEvent {
            at: Utc::now(),
            event,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// watch 관찰 채널을 버스로 중계. 송신측이 닫히면 태스크가 끝난다.
    pub fn forward_watch<T, F>(&self, mut rx: watch::Receiver<T>, map: F) -> JoinHandle<()>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(T) -> AppEvent + Send + 'static,
    {
        let bus = self.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let value = rx.borrow_and_update().clone();
                bus.publish(map(value));
            }
        })
    }

    /// 촬영 효과 broadcast를 버스로 중계
    pub fn forward_effects(&self, mut rx: broadcast::Receiver<CaptureEffect>) -> JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(effect) => bus.publish(AppEvent::Capture(effect)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("촬영 효과 {}개 유실", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(128)
    }
}
