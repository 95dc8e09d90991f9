//! 애플리케이션 설정 구조체.
//!
//! 서버 엔드포인트, 타임아웃, 촬영 모드, 업로드/분석 설정을 정의한다.
//! 시작 시 한 번 해석되어 각 어댑터에 주입된다.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::analysis::{DetailLevel, FeatureSensitivity};
use crate::models::capture::{DeviceKind, DeviceProfile};

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 서버 연결 설정
    pub server: ServerConfig,
    /// 촬영 설정
    #[serde(default)]
    pub capture: CaptureConfig,
    /// 업로드 설정
    #[serde(default)]
    pub upload: UploadConfig,
    /// 분석/모델 다운로드 설정
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// 볼륨 버튼 트리거 설정
    #[serde(default)]
    pub volume_trigger: VolumeTriggerConfig,
}

// ============================================================
// 서버 설정
// ============================================================

/// 서버 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// API 서버 기본 URL (예: "http://192.168.0.10:8000")
    pub base_url: String,
    /// 업로드/생존 확인 요청 타임아웃 (밀리초)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_alive_path")]
    pub alive_path: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    #[serde(default = "default_analyse_path")]
    pub analyse_path: String,
    #[serde(default = "default_model_path")]
    pub model_path: String,
}

// ============================================================
// 촬영 설정
// ============================================================

/// 촬영 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// 시작 시 장치 모드
    #[serde(default)]
    pub mode: DeviceKind,
    /// 깊이 모드 목표 가로 해상도
    #[serde(default = "default_preferred_width")]
    pub preferred_width: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: DeviceKind::default(),
            preferred_width: default_preferred_width(),
        }
    }
}

// ============================================================
// 업로드 설정
// ============================================================

/// 업로드 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 동시 업로드 상한 (`None`이면 제한 없음)
    #[serde(default)]
    pub max_concurrent_uploads: Option<usize>,
}

// ============================================================
// 분석 설정
// ============================================================

/// 분석 요청 및 모델 다운로드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// 분석 요청 타임아웃 (초). 서버 측 재구성이 수십 분 걸린다.
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub detail_level: DetailLevel,
    #[serde(default)]
    pub feature_sensitivity: FeatureSensitivity,
    /// 모델 파일 저장 디렉토리 (None이면 플랫폼 데이터 디렉토리)
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_analysis_timeout_secs(),
            detail_level: DetailLevel::default(),
            feature_sensitivity: FeatureSensitivity::default(),
            model_dir: None,
        }
    }
}

// ============================================================
// 볼륨 트리거 설정
// ============================================================

/// 볼륨 버튼 트리거 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeTriggerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for VolumeTriggerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ============================================================
// AppConfig impl
// ============================================================

impl AppConfig {
    /// 기본 설정값 반환
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://localhost:8000".to_string(),
                request_timeout_ms: default_request_timeout_ms(),
                alive_path: default_alive_path(),
                upload_path: default_upload_path(),
                analyse_path: default_analyse_path(),
                model_path: default_model_path(),
            },
            capture: CaptureConfig::default(),
            upload: UploadConfig::default(),
            analysis: AnalysisConfig::default(),
            volume_trigger: VolumeTriggerConfig::default(),
        }
    }

    /// 업로드/생존 확인 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    /// 분석 요청 타임아웃
    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis.timeout_secs)
    }

    pub fn alive_url(&self) -> String {
        self.endpoint(&self.server.alive_path)
    }

    pub fn upload_url(&self) -> String {
        self.endpoint(&self.server.upload_path)
    }

    pub fn analyse_url(&self) -> String {
        self.endpoint(&self.server.analyse_path)
    }

    pub fn model_url(&self) -> String {
        self.endpoint(&self.server.model_path)
    }

    /// 현재 모드의 장치 프로필
    pub fn device_profile(&self) -> DeviceProfile {
        DeviceProfile::for_kind(self.capture.mode, self.capture.preferred_width)
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.server.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

// ============================================================
// 기본값 함수
// ============================================================

fn default_true() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_alive_path() -> String {
    "/alive".to_string()
}
fn default_upload_path() -> String {
    "/upload-image".to_string()
}
fn default_analyse_path() -> String {
    "/analyse-object".to_string()
}
fn default_model_path() -> String {
    "/get-3d-model".to_string()
}
fn default_preferred_width() -> u32 {
    1920
}
fn default_analysis_timeout_secs() -> u64 {
    2_700 // 45분
}
