//! 카메라 하드웨어 포트.
//!
//! 구현: `depthcap-capture::virtual_rig` (인프로세스 가상 장비),
//! 실제 기기에서는 플랫폼 카메라 프레임워크 어댑터가 구현한다.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::capture::{
    AuthorizationStatus, CaptureCallbackSender, CaptureFormat, CaptureSettings, DepthFormat,
    DeviceKind, DevicePosition, PhotoCodec, PhotoOutput, PixelFormat,
};

/// 장치 탐색 및 권한 관리
#[async_trait]
pub trait CaptureHardware: Send + Sync {
    /// 현재 카메라 접근 권한 상태
    fn authorization_status(&self) -> AuthorizationStatus;

    /// 권한 요청 프롬프트. 사용자가 응답할 때까지 대기한다.
    async fn request_access(&self) -> bool;

    /// 지정 종류/위치의 물리 장치 목록
    fn discover_devices(
        &self,
        kind: DeviceKind,
        position: DevicePosition,
    ) -> Vec<Arc<dyn CaptureDevice>>;
}

/// 물리 캡처 장치
pub trait CaptureDevice: Send + Sync {
    /// 장치 고유 ID
    fn unique_id(&self) -> &str;

    fn kind(&self) -> DeviceKind;

    /// 지원 포맷 (하드웨어 보고 순서 그대로)
    fn formats(&self) -> Vec<CaptureFormat>;

    /// 현재 활성 포맷
    fn active_format(&self) -> Option<CaptureFormat>;

    /// 현재 활성 깊이 포맷
    fn active_depth_format(&self) -> Option<DepthFormat>;

    /// 독점 구성 잠금 획득. 반환된 가드가 drop되면 잠금이 해제된다.
    fn lock_for_configuration(&self) -> Result<Box<dyn DeviceConfigurationLock + '_>, CoreError>;
}

/// 장치 구성 잠금 가드
pub trait DeviceConfigurationLock {
    fn set_active_format(&mut self, format: &CaptureFormat) -> Result<(), CoreError>;

    fn set_active_depth_format(&mut self, format: &DepthFormat) -> Result<(), CoreError>;
}

/// 하드웨어 캡처 세션
///
/// 모든 메서드는 세션 실행기에서만 호출된다.
pub trait CaptureSessionBackend: Send {
    /// 구성 블록 시작 (commit 전까지 변경이 묶여서 적용됨)
    fn begin_configuration(&mut self);

    fn commit_configuration(&mut self);

    /// 부착된 입력 장치
    fn inputs(&self) -> Vec<Arc<dyn CaptureDevice>>;

    /// 부착된 사진 출력
    fn outputs(&self) -> Vec<PhotoOutput>;

    /// 기존 입력을 모두 떼어낸 뒤 이 장치를 부착할 수 있는지
    fn can_add_input(&self, device: &dyn CaptureDevice) -> bool;

    /// 이 출력을 부착할 수 있는지
    fn can_add_output(&self, output: &PhotoOutput) -> bool;

    /// 입력 부착 (세션이 받아들일 수 없으면 에러)
    fn add_input(&mut self, device: Arc<dyn CaptureDevice>) -> Result<(), CoreError>;

    fn remove_input(&mut self, device_id: &str);

    /// 출력 부착 (세션이 받아들일 수 없으면 에러)
    fn add_output(&mut self, output: PhotoOutput) -> Result<(), CoreError>;

    fn remove_output(&mut self, output_id: &str);

    fn start_running(&mut self);

    fn stop_running(&mut self);

    fn is_running(&self) -> bool;

    /// 출력이 지원하는 코덱
    fn available_codecs(&self) -> Vec<PhotoCodec>;

    /// 출력이 지원하는 내부 픽셀 포맷
    fn available_pixel_formats(&self) -> Vec<PixelFormat>;

    /// 촬영 요청 제출. 이후 콜백은 `callbacks`로 다른 스레드에서 전달된다.
    fn capture_photo(
        &mut self,
        settings: &CaptureSettings,
        callbacks: CaptureCallbackSender,
    ) -> Result<(), CoreError>;
}
