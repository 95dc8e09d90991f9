//! depthcap 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 외부 에러를 `CoreError` 변형으로 매핑한다.
//! 이 코어의 어떤 에러도 프로세스 종료로 이어지지 않는다.

use thiserror::Error;

use crate::models::capture::CaptureId;

/// 코어 레이어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 카메라 접근 권한 거부. 세션은 Unauthorized로 고정된다
    #[error("카메라 접근 권한 거부")]
    PermissionDenied,

    /// 장치/포맷 미발견, 잠금 또는 적용 실패
    #[error("구성 실패: {0}")]
    ConfigurationFailed(String),

    /// 단일 촬영 실패 (세션은 계속 동작)
    #[error("촬영 실패 ({id}): {reason}")]
    CaptureFailed {
        /// 실패한 촬영 요청 ID
        id: CaptureId,
        /// 실패 사유
        reason: String,
    },

    /// 네트워크 에러 (연결 실패, 타임아웃)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 현재 세션 상태에서 허용되지 않는 요청
    #[error("잘못된 세션 상태: {0}")]
    InvalidState(String),

    /// 세션 실행기가 종료됨
    #[error("세션이 종료됨")]
    SessionClosed,

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}

impl CoreError {
    /// 사용자가 명시적으로 조치해야 하는 에러인지 여부
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            CoreError::PermissionDenied | CoreError::ConfigurationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_action_errors() {
        assert!(CoreError::PermissionDenied.requires_user_action());
        assert!(CoreError::ConfigurationFailed("no device".into()).requires_user_action());
        assert!(!CoreError::SessionClosed.requires_user_action());
        assert!(!CoreError::Network("refused".into()).requires_user_action());
    }

    #[test]
    fn capture_failed_display_contains_reason() {
        let id = CaptureId::new();
        let err = CoreError::CaptureFailed {
            id,
            reason: "codec error".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("codec error"));
        assert!(text.contains(&id.to_string()));
    }
}
