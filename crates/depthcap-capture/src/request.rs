//! 촬영 요청 상태 머신.
//!
//! 셔터 입력부터 완성된 이미지 바이트까지 한 장의 촬영을 추적한다.
//! 하드웨어 콜백은 세션 실행기에서 `apply()`로 하나씩 적용되며,
//! 종료 결과는 oneshot으로 정확히 한 번 전달된다.

use std::time::Duration;

use depthcap_core::models::capture::{
    CaptureEffect, CaptureId, CaptureOutcome, CaptureSettings, HardwareCallback,
};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// 진행 표시를 띄우는 처리 시간 임계값
pub const LONG_PROCESSING_THRESHOLD: Duration = Duration::from_secs(1);

/// 예상 처리 시간이 임계값을 넘는지
pub fn is_long_processing(max_processing: Duration) -> bool {
    max_processing > LONG_PROCESSING_THRESHOLD
}

/// 요청 단계
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    /// 하드웨어에 제출됨
    Submitted,
    /// 노출 직전
    CaptureImminent,
    /// 사진 데이터 처리 완료, 촬영 종료 대기
    Processing,
    Finished,
    Failed(String),
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Finished | RequestState::Failed(_))
    }
}

/// 콜백 하나를 적용한 결과
#[derive(Debug, Default)]
pub struct Transition {
    /// UI로 내보낼 효과
    pub effects: Vec<CaptureEffect>,
    /// 요청이 종료되었으면 결과
    pub outcome: Option<CaptureOutcome>,
}

/// 진행 중인 촬영 요청
#[derive(Debug)]
pub struct CaptureRequest {
    settings: CaptureSettings,
    state: RequestState,
    max_processing: Option<Duration>,
    deadline: Option<Duration>,
    long_processing: bool,
    bytes: Option<Vec<u8>>,
    processing_error: Option<String>,
    completion: Option<oneshot::Sender<CaptureOutcome>>,
}

impl CaptureRequest {
    /// 새 요청과 완료 수신기 생성
    pub fn new(settings: CaptureSettings) -> (Self, oneshot::Receiver<CaptureOutcome>) {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            settings,
            state: RequestState::Submitted,
            max_processing: None,
            deadline: None,
            long_processing: false,
            bytes: None,
            processing_error: None,
            completion: Some(tx),
        };
        (request, rx)
    }

    pub fn id(&self) -> CaptureId {
        self.settings.id
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// 노출 시점에 확정되는 예상 처리 마감
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// 하드웨어 콜백 적용
    pub fn apply(&mut self, callback: HardwareCallback) -> Transition {
        let id = self.id();
        let mut transition = Transition::default();

        if self.state.is_terminal() {
            debug!("종료된 요청에 대한 콜백 무시: {} {:?}", id, callback);
            return transition;
        }

        match callback {
            HardwareCallback::WillBeginCapture { processing } => {
                self.max_processing = Some(processing.max());
            }
            HardwareCallback::WillCapture => {
                self.state = RequestState::CaptureImminent;
                self.deadline = self.max_processing;
                transition.effects.push(CaptureEffect::WillCapture { id });

                if self.deadline.is_some_and(is_long_processing) {
                    self.long_processing = true;
                    transition
                        .effects
                        .push(CaptureEffect::LongProcessingStarted { id });
                }
            }
            HardwareCallback::DidFinishProcessing(result) => {
                if self.long_processing {
                    self.long_processing = false;
                    transition
                        .effects
                        .push(CaptureEffect::LongProcessingEnded { id });
                }
                match result {
                    Ok(bytes) => self.bytes = Some(bytes),
                    Err(reason) => {
                        warn!("사진 처리 에러: {} ({})", id, reason);
                        self.processing_error = Some(reason);
                    }
                }
                self.state = RequestState::Processing;
            }
            HardwareCallback::DidFinishCapture(error) => {
                if self.long_processing {
                    self.long_processing = false;
                    transition
                        .effects
                        .push(CaptureEffect::LongProcessingEnded { id });
                }
                let outcome = match (error, self.processing_error.take(), self.bytes.take()) {
                    (None, None, Some(bytes)) => {
                        self.state = RequestState::Finished;
                        CaptureOutcome::Finished { id, bytes }
                    }
                    (Some(reason), _, _) | (None, Some(reason), _) => {
                        self.state = RequestState::Failed(reason.clone());
                        CaptureOutcome::Failed { id, reason }
                    }
                    (None, None, None) => {
                        let reason = "사진 데이터 없음".to_string();
                        self.state = RequestState::Failed(reason.clone());
                        CaptureOutcome::Failed { id, reason }
                    }
                };
                transition.effects.push(CaptureEffect::Completed {
                    id,
                    success: outcome.is_finished(),
                });
                transition.outcome = Some(outcome);
            }
        }

        transition
    }

    /// 외부 사유로 요청 종료 (하드웨어 거부, 세션 중지)
    ///
    /// 진행 표시가 켜져 있었으면 종료 효과를 먼저 내보낸다.
    pub fn fail(&mut self, reason: impl Into<String>) -> Transition {
        let id = self.id();
        let mut transition = Transition::default();
        if self.state.is_terminal() {
            return transition;
        }
        if self.long_processing {
            self.long_processing = false;
            transition
                .effects
                .push(CaptureEffect::LongProcessingEnded { id });
        }
        let reason = reason.into();
        self.state = RequestState::Failed(reason.clone());
        transition
            .effects
            .push(CaptureEffect::Completed { id, success: false });
        transition.outcome = Some(CaptureOutcome::Failed { id, reason });
        transition
    }

    /// 완료 송신기. 한 번 꺼내면 이후 호출은 `None`이다.
    pub fn take_completion(&mut self) -> Option<oneshot::Sender<CaptureOutcome>> {
        self.completion.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthcap_core::models::capture::ProcessingTimeRange;

    fn settings() -> CaptureSettings {
        CaptureSettings {
            id: CaptureId::new(),
            codec: None,
            pixel_format: None,
            depth_delivery: true,
            depth_filtered: false,
            embeds_depth: true,
            quality_priority: true,
        }
    }

    fn begin(start_ms: u64, duration_ms: u64) -> HardwareCallback {
        HardwareCallback::WillBeginCapture {
            processing: ProcessingTimeRange::new(
                Duration::from_millis(start_ms),
                Duration::from_millis(duration_ms),
            ),
        }
    }

    #[test]
    fn long_processing_threshold() {
        assert!(!is_long_processing(Duration::from_millis(1000)));
        assert!(is_long_processing(Duration::from_millis(1001)));
        assert!(!is_long_processing(Duration::ZERO));
    }

    #[test]
    fn happy_path_finishes_with_bytes() {
        let (mut request, mut rx) = CaptureRequest::new(settings());
        let id = request.id();

        assert!(request.apply(begin(100, 300)).effects.is_empty());

        let t = request.apply(HardwareCallback::WillCapture);
        assert_eq!(t.effects, vec![CaptureEffect::WillCapture { id }]);
        assert_eq!(request.state(), &RequestState::CaptureImminent);
        assert_eq!(request.deadline(), Some(Duration::from_millis(400)));

        request.apply(HardwareCallback::DidFinishProcessing(Ok(vec![1, 2, 3])));
        assert_eq!(request.state(), &RequestState::Processing);

        let t = request.apply(HardwareCallback::DidFinishCapture(None));
        assert_eq!(
            t.outcome,
            Some(CaptureOutcome::Finished {
                id,
                bytes: vec![1, 2, 3]
            })
        );
        assert_eq!(
            t.effects,
            vec![CaptureEffect::Completed { id, success: true }]
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn long_processing_emits_start_and_end() {
        let (mut request, _rx) = CaptureRequest::new(settings());
        let id = request.id();

        request.apply(begin(600, 900));
        let t = request.apply(HardwareCallback::WillCapture);
        assert!(t
            .effects
            .contains(&CaptureEffect::LongProcessingStarted { id }));

        let t = request.apply(HardwareCallback::DidFinishProcessing(Ok(vec![9])));
        assert_eq!(t.effects, vec![CaptureEffect::LongProcessingEnded { id }]);

        let t = request.apply(HardwareCallback::DidFinishCapture(None));
        assert!(!t
            .effects
            .contains(&CaptureEffect::LongProcessingEnded { id }));
    }

    #[test]
    fn failing_during_long_processing_closes_indicator() {
        let (mut request, _rx) = CaptureRequest::new(settings());
        let id = request.id();

        request.apply(begin(600, 900));
        request.apply(HardwareCallback::WillCapture);

        let t = request.fail("session stopped");
        assert_eq!(
            t.effects,
            vec![
                CaptureEffect::LongProcessingEnded { id },
                CaptureEffect::Completed { id, success: false },
            ]
        );
        assert!(matches!(t.outcome, Some(CaptureOutcome::Failed { .. })));
    }

    #[test]
    fn failing_short_request_only_completes() {
        let (mut request, _rx) = CaptureRequest::new(settings());
        let id = request.id();

        request.apply(begin(0, 100));
        request.apply(HardwareCallback::WillCapture);

        let t = request.fail("거부");
        assert_eq!(t.effects, vec![CaptureEffect::Completed { id, success: false }]);
    }

    #[test]
    fn processing_error_fails_request() {
        let (mut request, _rx) = CaptureRequest::new(settings());
        request.apply(begin(0, 100));
        request.apply(HardwareCallback::WillCapture);
        request.apply(HardwareCallback::DidFinishProcessing(Err("센서 에러".into())));

        let t = request.apply(HardwareCallback::DidFinishCapture(None));
        match t.outcome {
            Some(CaptureOutcome::Failed { reason, .. }) => assert_eq!(reason, "센서 에러"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn capture_error_from_submitted_state() {
        let (mut request, _rx) = CaptureRequest::new(settings());
        let t = request.apply(HardwareCallback::DidFinishCapture(Some("중단".into())));
        assert!(matches!(t.outcome, Some(CaptureOutcome::Failed { .. })));
        assert!(request.state().is_terminal());
    }

    #[test]
    fn missing_bytes_is_failure() {
        let (mut request, _rx) = CaptureRequest::new(settings());
        request.apply(HardwareCallback::WillCapture);
        let t = request.apply(HardwareCallback::DidFinishCapture(None));
        assert!(matches!(t.outcome, Some(CaptureOutcome::Failed { .. })));
    }

    #[test]
    fn callbacks_after_terminal_are_ignored() {
        let (mut request, _rx) = CaptureRequest::new(settings());
        request.apply(HardwareCallback::DidFinishProcessing(Ok(vec![1])));
        assert!(request
            .apply(HardwareCallback::DidFinishCapture(None))
            .outcome
            .is_some());

        let t = request.apply(HardwareCallback::DidFinishCapture(None));
        assert!(t.outcome.is_none());
        assert!(t.effects.is_empty());
        let late = request.fail("늦은 실패");
        assert!(late.outcome.is_none());
        assert!(late.effects.is_empty());
    }

    #[test]
    fn completion_taken_once() {
        let (mut request, mut rx) = CaptureRequest::new(settings());
        let outcome = request.fail("session stopped").outcome.unwrap();

        let tx = request.take_completion().unwrap();
        tx.send(outcome.clone()).unwrap();
        assert!(request.take_completion().is_none());
        assert_eq!(rx.try_recv().unwrap(), outcome);
    }
}
