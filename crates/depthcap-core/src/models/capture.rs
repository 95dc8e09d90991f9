//! 촬영 도메인 모델.
//!
//! 장치 프로필, 캡처 포맷, 촬영 설정, 세션 상태,
//! 하드웨어 콜백과 촬영 결과를 정의한다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// 물리 카메라 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// 광각 듀얼 카메라
    #[default]
    DualWide,
    /// 깊이 측정 카메라 (LiDAR)
    DepthRanging,
}

impl DeviceKind {
    /// 모드 토글 (듀얼 ↔ 깊이)
    pub fn toggled(self) -> Self {
        match self {
            DeviceKind::DualWide => DeviceKind::DepthRanging,
            DeviceKind::DepthRanging => DeviceKind::DualWide,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::DualWide => write!(f, "DualCam"),
            DeviceKind::DepthRanging => write!(f, "LiDAR"),
        }
    }
}

/// 카메라 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DevicePosition {
    Back,
    Front,
}

/// 픽셀 포맷
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 4:2:0 bi-planar, full range
    YCbCr420BiPlanarFullRange,
    /// 4:2:0 bi-planar, video range
    YCbCr420BiPlanarVideoRange,
    Bgra32,
}

/// 깊이 데이터 인코딩
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthEncoding {
    DepthFloat16,
    DepthFloat32,
    DisparityFloat16,
}

/// 사진 코덱
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhotoCodec {
    Hevc,
    Jpeg,
}

/// 요청 장치 프로필. 한 번의 구성 패스 동안 불변
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// 요청 장치 종류
    pub kind: DeviceKind,
    /// 장치 위치 (항상 후면)
    pub position: DevicePosition,
    /// 목표 가로 해상도
    pub target_width: u32,
    /// 요구 픽셀 포맷
    pub pixel_format: PixelFormat,
    /// 요구 깊이 인코딩 (`None`이면 포맷 탐색 없이 기본 포맷 사용)
    pub depth: Option<DepthEncoding>,
}

impl DeviceProfile {
    /// 듀얼 카메라 프로필 (기본 포맷 사용)
    pub fn dual_camera(target_width: u32) -> Self {
        Self {
            kind: DeviceKind::DualWide,
            position: DevicePosition::Back,
            target_width,
            pixel_format: PixelFormat::YCbCr420BiPlanarFullRange,
            depth: None,
        }
    }

    /// 깊이 카메라 프로필 (고해상도 + DepthFloat16)
    pub fn depth_ranging(target_width: u32) -> Self {
        Self {
            kind: DeviceKind::DepthRanging,
            position: DevicePosition::Back,
            target_width,
            pixel_format: PixelFormat::YCbCr420BiPlanarFullRange,
            depth: Some(DepthEncoding::DepthFloat16),
        }
    }

    /// 장치 종류에 맞는 프로필
    pub fn for_kind(kind: DeviceKind, target_width: u32) -> Self {
        match kind {
            DeviceKind::DualWide => Self::dual_camera(target_width),
            DeviceKind::DepthRanging => Self::depth_ranging(target_width),
        }
    }

    /// 포맷 탐색이 필요한 프로필인지
    pub fn requires_format_search(&self) -> bool {
        self.depth.is_some()
    }
}

/// 깊이 데이터 포맷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthFormat {
    pub encoding: DepthEncoding,
    pub width: u32,
    pub height: u32,
}

/// 장치가 지원하는 캡처 포맷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// 비닝된 센서 출력 여부
    pub binned: bool,
    /// 이 포맷에서 지원하는 깊이 포맷 목록
    pub depth_formats: Vec<DepthFormat>,
}

/// 촬영 요청 ID (촬영 설정의 고유 식별자)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureId(Uuid);

impl CaptureId {
    /// 새 고유 ID 생성
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CaptureId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated().to_string().to_uppercase())
    }
}

/// 촬영 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// 고유 식별자
    pub id: CaptureId,
    /// 파일 코덱 (`None`이면 하드웨어 기본값)
    pub codec: Option<PhotoCodec>,
    /// 내부 픽셀 포맷 (`None`이면 하드웨어 기본값)
    pub pixel_format: Option<PixelFormat>,
    /// 깊이 데이터 전달
    pub depth_delivery: bool,
    /// 깊이 데이터 필터링 (원본 깊이를 위해 비활성화)
    pub depth_filtered: bool,
    /// 깊이 맵을 이미지 파일에 포함
    pub embeds_depth: bool,
    /// 품질 우선 처리
    pub quality_priority: bool,
}

/// 사진 출력 구성
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoOutputConfig {
    pub high_resolution: bool,
    pub depth_delivery: bool,
    pub quality_priority: bool,
}

impl Default for PhotoOutputConfig {
    fn default() -> Self {
        Self {
            high_resolution: true,
            depth_delivery: true,
            quality_priority: true,
        }
    }
}

/// 세션에 부착된 사진 출력
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoOutput {
    pub id: String,
    pub config: PhotoOutputConfig,
}

impl PhotoOutput {
    pub fn new(config: PhotoOutputConfig) -> Self {
        Self {
            id: format!("photo-output-{}", Uuid::new_v4()),
            config,
        }
    }
}

/// 카메라 접근 권한 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    Authorized,
    NotDetermined,
    Denied,
    Restricted,
}

/// 캡처 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    AwaitingPermission,
    Configuring,
    Running,
    Stopped,
    ConfigurationFailed,
    Unauthorized,
}

impl SessionState {
    /// 더 이상 구성을 받지 않는 상태
    pub fn is_closed(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Unauthorized)
    }

    /// 구성 중간 단계 (외부에 running으로 보고되면 안 됨)
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            SessionState::AwaitingPermission | SessionState::Configuring
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 하드웨어가 보고하는 처리 시간 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingTimeRange {
    pub start: Duration,
    pub duration: Duration,
}

impl ProcessingTimeRange {
    pub fn new(start: Duration, duration: Duration) -> Self {
        Self { start, duration }
    }

    /// 최대 처리 시간 (start + duration)
    pub fn max(&self) -> Duration {
        self.start + self.duration
    }
}

/// 하드웨어 촬영 콜백 (시스템 스레드에서 전달됨)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareCallback {
    /// 촬영 시작 예정. 처리 시간 범위 보고
    WillBeginCapture { processing: ProcessingTimeRange },
    /// 노출 시작 직전
    WillCapture,
    /// 사진 데이터 처리 완료 (성공 시 파일 바이트)
    DidFinishProcessing(Result<Vec<u8>, String>),
    /// 촬영 전체 완료 (에러 시 사유)
    DidFinishCapture(Option<String>),
}

/// 하드웨어 콜백 채널 송신측
pub type CaptureCallbackSender =
    tokio::sync::mpsc::UnboundedSender<(CaptureId, HardwareCallback)>;

/// UI 쪽으로 노출되는 촬영 효과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEffect {
    /// 화면 깜빡임 효과
    WillCapture { id: CaptureId },
    /// 처리 시간이 길어 진행 표시 시작
    LongProcessingStarted { id: CaptureId },
    /// 진행 표시 종료
    LongProcessingEnded { id: CaptureId },
    /// 촬영 종료
    Completed { id: CaptureId, success: bool },
}

/// 촬영 종료 결과. 요청당 정확히 한 번 전달
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Finished { id: CaptureId, bytes: Vec<u8> },
    Failed { id: CaptureId, reason: String },
}

impl CaptureOutcome {
    pub fn id(&self) -> CaptureId {
        match self {
            CaptureOutcome::Finished { id, .. } | CaptureOutcome::Failed { id, .. } => *id,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, CaptureOutcome::Finished { .. })
    }
}

/// 업로드 경로로 넘겨지는 완료된 촬영
#[derive(Debug, Clone)]
pub struct FinishedCapture {
    pub id: CaptureId,
    pub bytes: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}
