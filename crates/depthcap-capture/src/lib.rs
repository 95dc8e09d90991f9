//! # depthcap-capture
//!
//! 카메라 세션 제어 크레이트.
//! 장치 구성, 촬영 요청 상태 머신, 직렬 세션 실행기,
//! 볼륨 버튼 트리거와 촬영 컨트롤 게이트를 담당한다.
//! 실기기 없이 파이프라인을 돌릴 수 있는 가상 장비도 포함한다.

pub mod controls;
pub mod device;
pub mod request;
pub mod session;
pub mod virtual_rig;
pub mod volume_trigger;
