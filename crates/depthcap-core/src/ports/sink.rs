//! 촬영 결과 싱크 포트.
//!
//! 구현: `depthcap-network::upload_dispatcher::UploadDispatcher`

use crate::models::capture::FinishedCapture;

/// 완료된 촬영을 받아 업로드 경로로 넘기는 싱크
///
/// 세션 실행기에서 호출되므로 절대 블로킹하면 안 된다.
pub trait CaptureSink: Send + Sync {
    fn on_capture_finished(&self, capture: FinishedCapture);
}
