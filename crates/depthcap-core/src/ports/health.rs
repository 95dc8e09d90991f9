//! 서버 생존 프로브 포트.
//!
//! 구현: `depthcap-network::health::HttpHealthGate`

use async_trait::async_trait;

use crate::models::health::HealthStatus;

/// 원격 서비스 생존 확인
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// 네트워크 에러나 비정상 상태는 모두 `Offline`으로 보고한다
    async fn probe(&self) -> HealthStatus;
}
