//! 장치 구성.
//!
//! 요청 프로필에 맞는 후면 장치를 찾고, 깊이 요구가 있으면
//! 포맷을 탐색해 독점 잠금 아래에서 적용한다.

use std::sync::Arc;

use depthcap_core::error::CoreError;
use depthcap_core::models::capture::{
    CaptureFormat, DepthEncoding, DepthFormat, DeviceProfile,
};
use depthcap_core::ports::camera::{CaptureDevice, CaptureHardware};
use tracing::{debug, info, warn};

/// 구성이 끝난 장치
#[derive(Clone)]
pub struct ActiveDeviceHandle {
    pub device: Arc<dyn CaptureDevice>,
    pub profile: DeviceProfile,
    /// 적용된 주 포맷 (기본 포맷을 쓰면 `None`)
    pub format: Option<CaptureFormat>,
    pub depth_format: Option<DepthFormat>,
}

impl std::fmt::Debug for ActiveDeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveDeviceHandle")
            .field("device", &self.device.unique_id())
            .field("profile", &self.profile)
            .field("format", &self.format)
            .field("depth_format", &self.depth_format)
            .finish()
    }
}

/// 프로필 기반 장치 구성기
pub struct DeviceConfigurator {
    hardware: Arc<dyn CaptureHardware>,
}

impl DeviceConfigurator {
    pub fn new(hardware: Arc<dyn CaptureHardware>) -> Self {
        Self { hardware }
    }

    /// 프로필에 맞게 장치를 선택하고 포맷을 적용
    ///
    /// 실패는 자동 재시도하지 않는다.
    pub fn configure(&self, profile: &DeviceProfile) -> Result<ActiveDeviceHandle, CoreError> {
        let device = self
            .hardware
            .discover_devices(profile.kind, profile.position)
            .into_iter()
            .next()
            .ok_or_else(|| {
                CoreError::ConfigurationFailed(format!("{} 장치를 찾을 수 없음", profile.kind))
            })?;
        debug!("장치 선택: {} ({})", device.unique_id(), profile.kind);

        let Some(encoding) = profile.depth else {
            return Ok(ActiveDeviceHandle {
                device,
                profile: profile.clone(),
                format: None,
                depth_format: None,
            });
        };

        let formats = device.formats();
        let format = select_format(&formats, profile).ok_or_else(|| {
            CoreError::ConfigurationFailed(format!(
                "조건에 맞는 포맷 없음 (width={}, {:?})",
                profile.target_width, profile.pixel_format
            ))
        })?;
        let depth_format = select_depth_format(format, encoding).ok_or_else(|| {
            CoreError::ConfigurationFailed(format!("{:?} 깊이 포맷 없음", encoding))
        })?;

        apply_formats(device.as_ref(), format, depth_format)?;
        info!(
            "장치 포맷 적용: {} {}x{} depth {}x{}",
            device.unique_id(),
            format.width,
            format.height,
            depth_format.width,
            depth_format.height
        );

        Ok(ActiveDeviceHandle {
            profile: profile.clone(),
            format: Some(format.clone()),
            depth_format: Some(depth_format.clone()),
            device,
        })
    }
}

/// 주 포맷 탐색. 하드웨어가 오름차순으로 나열하므로 마지막 일치가 우선한다.
pub fn select_format<'a>(
    formats: &'a [CaptureFormat],
    profile: &DeviceProfile,
) -> Option<&'a CaptureFormat> {
    formats.iter().rev().find(|f| {
        f.width == profile.target_width
            && f.pixel_format == profile.pixel_format
            && !f.binned
            && !f.depth_formats.is_empty()
    })
}

/// 깊이 포맷 탐색 (마지막 일치 우선)
pub fn select_depth_format(
    format: &CaptureFormat,
    encoding: DepthEncoding,
) -> Option<&DepthFormat> {
    format
        .depth_formats
        .iter()
        .rev()
        .find(|d| d.encoding == encoding)
}

fn apply_formats(
    device: &dyn CaptureDevice,
    format: &CaptureFormat,
    depth_format: &DepthFormat,
) -> Result<(), CoreError> {
    let mut lock = device.lock_for_configuration().map_err(|e| {
        warn!("장치 잠금 실패: {}: {}", device.unique_id(), e);
        CoreError::ConfigurationFailed(format!("장치 잠금 실패: {e}"))
    })?;
    lock.set_active_format(format)
        .map_err(|e| CoreError::ConfigurationFailed(format!("포맷 적용 실패: {e}")))?;
    lock.set_active_depth_format(depth_format)
        .map_err(|e| CoreError::ConfigurationFailed(format!("깊이 포맷 적용 실패: {e}")))?;
    Ok(())
}
