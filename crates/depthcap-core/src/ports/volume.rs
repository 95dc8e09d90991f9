//! 하드웨어 출력 레벨(볼륨) 포트.
//!
//! 구현: `depthcap-capture::virtual_rig::VirtualVolume`

use tokio::sync::broadcast;

/// 0.0 ~ 1.0 범위의 출력 레벨 신호
pub trait OutputLevelSource: Send + Sync {
    /// 현재 레벨
    fn current_level(&self) -> f32;

    /// 레벨 변경 구독. 수신기를 drop하면 구독이 해제된다.
    fn subscribe(&self) -> broadcast::Receiver<f32>;

    /// 레벨 강제 설정
    fn set_level(&self, level: f32);
}
