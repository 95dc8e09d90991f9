//! 인프로세스 가상 촬영 장비.
//!
//! 카메라 하드웨어 포트(`CaptureHardware`, `CaptureDevice`,
//! `CaptureSessionBackend`)와 볼륨 포트(`OutputLevelSource`)를 구현한다.
//! 촬영 콜백은 실제 하드웨어처럼 별도 OS 스레드에서 전달된다.
//! 디렉토리의 이미지 파일을 촬영 결과로 재생할 수 있다.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use depthcap_core::error::CoreError;
use depthcap_core::models::capture::{
    AuthorizationStatus, CaptureCallbackSender, CaptureFormat, CaptureId, CaptureSettings,
    DepthEncoding, DepthFormat, DeviceKind, DevicePosition, HardwareCallback, PhotoCodec,
    PhotoOutput, PixelFormat, ProcessingTimeRange,
};
use depthcap_core::ports::camera::{
    CaptureDevice, CaptureHardware, CaptureSessionBackend, DeviceConfigurationLock,
};
use depthcap_core::ports::volume::OutputLevelSource;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// 재생 대상 이미지 확장자
const PAYLOAD_EXTENSIONS: &[&str] = &["heic", "heif", "jpg", "jpeg", "png"];

// ============================================================
// 가상 장치
// ============================================================

/// 가상 캡처 장치
pub struct VirtualDevice {
    id: String,
    kind: DeviceKind,
    formats: Vec<CaptureFormat>,
    active_format: Mutex<Option<CaptureFormat>>,
    active_depth_format: Mutex<Option<DepthFormat>>,
    locked: AtomicBool,
    lock_fails: AtomicBool,
}

impl VirtualDevice {
    pub fn new(id: impl Into<String>, kind: DeviceKind, formats: Vec<CaptureFormat>) -> Self {
        Self {
            id: id.into(),
            kind,
            formats,
            active_format: Mutex::new(None),
            active_depth_format: Mutex::new(None),
            locked: AtomicBool::new(false),
            lock_fails: AtomicBool::new(false),
        }
    }

    /// 광각 듀얼 카메라 (포맷 탐색 없이 사용)
    pub fn dual_wide() -> Self {
        Self::new(
            "virtual-dual-wide",
            DeviceKind::DualWide,
            vec![CaptureFormat {
                width: 4032,
                height: 3024,
                pixel_format: PixelFormat::YCbCr420BiPlanarFullRange,
                binned: false,
                depth_formats: vec![DepthFormat {
                    encoding: DepthEncoding::DisparityFloat16,
                    width: 768,
                    height: 576,
                }],
            }],
        )
    }

    /// 깊이 측정 카메라. 해상도 오름차순, 같은 해상도 안에서는 비닝/픽셀 포맷이 섞여 있다.
    pub fn depth_ranging() -> Self {
        let depth = |encoding, width| DepthFormat {
            encoding,
            width,
            height: width * 3 / 4,
        };
        let format = |width: u32, pixel_format, binned, depth_formats| CaptureFormat {
            width,
            height: width * 3 / 4,
            pixel_format,
            binned,
            depth_formats,
        };
        Self::new(
            "virtual-depth-ranging",
            DeviceKind::DepthRanging,
            vec![
                format(640, PixelFormat::YCbCr420BiPlanarFullRange, false, vec![depth(DepthEncoding::DepthFloat16, 256)]),
                format(1920, PixelFormat::YCbCr420BiPlanarVideoRange, false, vec![depth(DepthEncoding::DepthFloat16, 320)]),
                format(1920, PixelFormat::YCbCr420BiPlanarFullRange, true, vec![depth(DepthEncoding::DepthFloat16, 320)]),
                format(
                    1920,
                    PixelFormat::YCbCr420BiPlanarFullRange,
                    false,
                    vec![
                        depth(DepthEncoding::DepthFloat32, 256),
                        depth(DepthEncoding::DepthFloat16, 256),
                        depth(DepthEncoding::DepthFloat16, 320),
                    ],
                ),
                format(4032, PixelFormat::YCbCr420BiPlanarFullRange, false, vec![depth(DepthEncoding::DepthFloat16, 320)]),
            ],
        )
    }

    /// 구성 잠금 실패 주입
    pub fn set_lock_fails(&self, fails: bool) {
        self.lock_fails.store(fails, Ordering::SeqCst);
    }
}

impl CaptureDevice for VirtualDevice {
    fn unique_id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn formats(&self) -> Vec<CaptureFormat> {
        self.formats.clone()
    }

    fn active_format(&self) -> Option<CaptureFormat> {
        self.active_format.lock().clone()
    }

    fn active_depth_format(&self) -> Option<DepthFormat> {
        self.active_depth_format.lock().clone()
    }

    fn lock_for_configuration(&self) -> Result<Box<dyn DeviceConfigurationLock + '_>, CoreError> {
        if self.lock_fails.load(Ordering::SeqCst) {
            return Err(CoreError::ConfigurationFailed(format!(
                "{}: 장치 사용 중",
                self.id
            )));
        }
        if self.locked.swap(true, Ordering::SeqCst) {
            return Err(CoreError::ConfigurationFailed(format!(
                "{}: 이미 잠겨 있음",
                self.id
            )));
        }
        Ok(Box::new(VirtualDeviceLock { device: self }))
    }
}

/// 구성 잠금 가드. drop 시 잠금 해제.
struct VirtualDeviceLock<'a> {
    device: &'a VirtualDevice,
}

impl DeviceConfigurationLock for VirtualDeviceLock<'_> {
    fn set_active_format(&mut self, format: &CaptureFormat) -> Result<(), CoreError> {
        if !self.device.formats.contains(format) {
            return Err(CoreError::ConfigurationFailed(
                "지원하지 않는 포맷".to_string(),
            ));
        }
        *self.device.active_format.lock() = Some(format.clone());
        Ok(())
    }

    fn set_active_depth_format(&mut self, format: &DepthFormat) -> Result<(), CoreError> {
        let supported = self
            .device
            .active_format
            .lock()
            .as_ref()
            .is_some_and(|f| f.depth_formats.contains(format));
        if !supported {
            return Err(CoreError::ConfigurationFailed(
                "활성 포맷이 지원하지 않는 깊이 포맷".to_string(),
            ));
        }
        *self.device.active_depth_format.lock() = Some(format.clone());
        Ok(())
    }
}

impl Drop for VirtualDeviceLock<'_> {
    fn drop(&mut self) {
        self.device.locked.store(false, Ordering::SeqCst);
    }
}

// ============================================================
// 장비 공유 상태
// ============================================================

struct SessionSlots {
    inputs: Vec<Arc<dyn CaptureDevice>>,
    outputs: Vec<PhotoOutput>,
    running: bool,
    configuring: bool,
    commits: usize,
}

struct Behavior {
    authorization: AuthorizationStatus,
    grant_access: bool,
    rejected_devices: HashSet<String>,
    fail_next_output: bool,
    break_next_output: bool,
    codecs: Vec<PhotoCodec>,
    pixel_formats: Vec<PixelFormat>,
    processing: ProcessingTimeRange,
    callback_delay: Duration,
    capture_error: Option<String>,
    hold_captures: bool,
    payloads: Vec<Vec<u8>>,
}

struct RigShared {
    devices: Mutex<Vec<Arc<VirtualDevice>>>,
    slots: Mutex<SessionSlots>,
    behavior: Mutex<Behavior>,
    held: Mutex<Vec<(CaptureId, CaptureCallbackSender)>>,
    last_settings: Mutex<Option<CaptureSettings>>,
    submitted: AtomicUsize,
    payload_cursor: AtomicUsize,
}

// ============================================================
// 가상 장비
// ============================================================

/// 가상 촬영 장비 (복제 시 같은 상태를 공유)
#[derive(Clone)]
pub struct VirtualRig {
    shared: Arc<RigShared>,
}

impl VirtualRig {
    /// 듀얼 카메라와 깊이 카메라를 갖춘 장비
    pub fn new() -> Self {
        let rig = Self::empty();
        rig.add_device(VirtualDevice::dual_wide());
        rig.add_device(VirtualDevice::depth_ranging());
        rig
    }

    /// 장치가 없는 장비
    pub fn empty() -> Self {
        Self {
            shared: Arc::new(RigShared {
                devices: Mutex::new(Vec::new()),
                slots: Mutex::new(SessionSlots {
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                    running: false,
                    configuring: false,
                    commits: 0,
                }),
                behavior: Mutex::new(Behavior {
                    authorization: AuthorizationStatus::Authorized,
                    grant_access: true,
                    rejected_devices: HashSet::new(),
                    fail_next_output: false,
                    break_next_output: false,
                    codecs: vec![PhotoCodec::Hevc, PhotoCodec::Jpeg],
                    pixel_formats: vec![
                        PixelFormat::YCbCr420BiPlanarVideoRange,
                        PixelFormat::YCbCr420BiPlanarFullRange,
                        PixelFormat::Bgra32,
                    ],
                    processing: ProcessingTimeRange::new(
                        Duration::from_millis(50),
                        Duration::from_millis(150),
                    ),
                    callback_delay: Duration::from_millis(5),
                    capture_error: None,
                    hold_captures: false,
                    payloads: Vec::new(),
                }),
                held: Mutex::new(Vec::new()),
                last_settings: Mutex::new(None),
                submitted: AtomicUsize::new(0),
                payload_cursor: AtomicUsize::new(0),
            }),
        }
    }

    pub fn add_device(&self, device: VirtualDevice) -> Arc<VirtualDevice> {
        let device = Arc::new(device);
        self.shared.devices.lock().push(device.clone());
        device
    }

    pub fn devices(&self) -> Vec<Arc<VirtualDevice>> {
        self.shared.devices.lock().clone()
    }

    /// 이 장비에 연결된 캡처 세션 생성
    pub fn session(&self) -> VirtualSession {
        VirtualSession {
            shared: self.shared.clone(),
        }
    }

    // --- 동작 주입 ---

    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.shared.behavior.lock().authorization = status;
    }

    /// 권한 프롬프트에 대한 사용자 응답
    pub fn set_grant_access(&self, grant: bool) {
        self.shared.behavior.lock().grant_access = grant;
    }

    /// 세션이 해당 장치 입력을 거부하게 한다
    pub fn reject_device(&self, device_id: &str) {
        self.shared
            .behavior
            .lock()
            .rejected_devices
            .insert(device_id.to_string());
    }

    pub fn clear_rejections(&self) {
        self.shared.behavior.lock().rejected_devices.clear();
    }

    /// 다음 출력 부착을 한 번 거부한다 (사전 확인에서도 거부로 보고)
    pub fn fail_next_output(&self) {
        self.shared.behavior.lock().fail_next_output = true;
    }

    /// 사전 확인은 통과시키고 실제 출력 부착만 한 번 실패시킨다
    pub fn break_next_output(&self) {
        self.shared.behavior.lock().break_next_output = true;
    }

    pub fn set_codecs(&self, codecs: Vec<PhotoCodec>) {
        self.shared.behavior.lock().codecs = codecs;
    }

    pub fn set_pixel_formats(&self, formats: Vec<PixelFormat>) {
        self.shared.behavior.lock().pixel_formats = formats;
    }

    pub fn set_processing_time(&self, processing: ProcessingTimeRange) {
        self.shared.behavior.lock().processing = processing;
    }

    /// 콜백 사이 지연
    pub fn set_callback_delay(&self, delay: Duration) {
        self.shared.behavior.lock().callback_delay = delay;
    }

    /// 이후 촬영이 이 사유로 실패한다
    pub fn set_capture_error(&self, error: Option<String>) {
        self.shared.behavior.lock().capture_error = error;
    }

    /// 촬영 콜백을 `release_held()` 호출까지 보류
    pub fn set_hold_captures(&self, hold: bool) {
        self.shared.behavior.lock().hold_captures = hold;
    }

    /// 보류된 촬영의 콜백 전달 시작
    pub fn release_held(&self) -> usize {
        let held: Vec<_> = self.shared.held.lock().drain(..).collect();
        let count = held.len();
        for (id, tx) in held {
            self.spawn_callbacks(id, tx);
        }
        count
    }

    /// 촬영 결과로 쓸 바이트 목록 (순환 재생)
    pub fn set_payloads(&self, payloads: Vec<Vec<u8>>) {
        self.shared.behavior.lock().payloads = payloads;
        self.shared.payload_cursor.store(0, Ordering::SeqCst);
    }

    /// 디렉토리의 이미지 파일을 이름 순으로 읽어 재생 목록으로 설정
    pub fn load_payload_dir(&self, dir: &Path) -> Result<usize, CoreError> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| PAYLOAD_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            })
            .collect();
        paths.sort();

        let payloads = paths
            .iter()
            .map(std::fs::read)
            .collect::<Result<Vec<_>, _>>()?;
        let count = payloads.len();
        info!("재생 이미지 {}개 로드: {}", count, dir.display());
        self.set_payloads(payloads);
        Ok(count)
    }

    // --- 관찰 ---

    pub fn attached_input_ids(&self) -> Vec<String> {
        self.shared
            .slots
            .lock()
            .inputs
            .iter()
            .map(|d| d.unique_id().to_string())
            .collect()
    }

    pub fn attached_output_ids(&self) -> Vec<String> {
        self.shared
            .slots
            .lock()
            .outputs
            .iter()
            .map(|o| o.id.clone())
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.shared.slots.lock().running
    }

    pub fn commit_count(&self) -> usize {
        self.shared.slots.lock().commits
    }

    pub fn submitted_captures(&self) -> usize {
        self.shared.submitted.load(Ordering::SeqCst)
    }

    pub fn last_settings(&self) -> Option<CaptureSettings> {
        self.shared.last_settings.lock().clone()
    }

    fn next_payload(&self, id: CaptureId) -> Vec<u8> {
        let behavior = self.shared.behavior.lock();
        if behavior.payloads.is_empty() {
            let mut bytes = b"\x00\x00\x00\x18ftypheic".to_vec();
            bytes.extend_from_slice(id.as_uuid().as_bytes());
            return bytes;
        }
        let index = self.shared.payload_cursor.fetch_add(1, Ordering::SeqCst);
        behavior.payloads[index % behavior.payloads.len()].clone()
    }

    /// 하드웨어 스레드에서 콜백 순서대로 전달
    fn spawn_callbacks(&self, id: CaptureId, tx: CaptureCallbackSender) {
        let (processing, delay, error) = {
            let behavior = self.shared.behavior.lock();
            (
                behavior.processing,
                behavior.callback_delay,
                behavior.capture_error.clone(),
            )
        };
        let payload = self.next_payload(id);

        thread::spawn(move || {
            let send = |callback| {
                // 세션이 먼저 종료되면 수신측이 닫혀 있을 수 있다
                let _ = tx.send((id, callback));
            };
            send(HardwareCallback::WillBeginCapture { processing });
            thread::sleep(delay);
            send(HardwareCallback::WillCapture);
            thread::sleep(delay);
            match error {
                Some(reason) => {
                    send(HardwareCallback::DidFinishProcessing(Err(reason.clone())));
                    send(HardwareCallback::DidFinishCapture(Some(reason)));
                }
                None => {
                    send(HardwareCallback::DidFinishProcessing(Ok(payload)));
                    send(HardwareCallback::DidFinishCapture(None));
                }
            }
        });
    }
}

impl Default for VirtualRig {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureHardware for VirtualRig {
    fn authorization_status(&self) -> AuthorizationStatus {
        self.shared.behavior.lock().authorization
    }

    async fn request_access(&self) -> bool {
        let granted = {
            let mut behavior = self.shared.behavior.lock();
            let granted = behavior.grant_access;
            behavior.authorization = if granted {
                AuthorizationStatus::Authorized
            } else {
                AuthorizationStatus::Denied
            };
            granted
        };
        tokio::task::yield_now().await;
        debug!("카메라 권한 응답: {}", granted);
        granted
    }

    fn discover_devices(
        &self,
        kind: DeviceKind,
        position: DevicePosition,
    ) -> Vec<Arc<dyn CaptureDevice>> {
        if position != DevicePosition::Back {
            return Vec::new();
        }
        self.shared
            .devices
            .lock()
            .iter()
            .filter(|d| d.kind == kind)
            .map(|d| d.clone() as Arc<dyn CaptureDevice>)
            .collect()
    }
}

// ============================================================
// 가상 세션
// ============================================================

/// 가상 캡처 세션
pub struct VirtualSession {
    shared: Arc<RigShared>,
}

impl VirtualSession {
    fn rig(&self) -> VirtualRig {
        VirtualRig {
            shared: self.shared.clone(),
        }
    }
}

impl CaptureSessionBackend for VirtualSession {
    fn begin_configuration(&mut self) {
        self.shared.slots.lock().configuring = true;
    }

    fn commit_configuration(&mut self) {
        let mut slots = self.shared.slots.lock();
        slots.configuring = false;
        slots.commits += 1;
    }

    fn inputs(&self) -> Vec<Arc<dyn CaptureDevice>> {
        self.shared.slots.lock().inputs.clone()
    }

    fn outputs(&self) -> Vec<PhotoOutput> {
        self.shared.slots.lock().outputs.clone()
    }

    fn can_add_input(&self, device: &dyn CaptureDevice) -> bool {
        !self
            .shared
            .behavior
            .lock()
            .rejected_devices
            .contains(device.unique_id())
    }

    fn can_add_output(&self, _output: &PhotoOutput) -> bool {
        !self.shared.behavior.lock().fail_next_output
    }

    fn add_input(&mut self, device: Arc<dyn CaptureDevice>) -> Result<(), CoreError> {
        if self
            .shared
            .behavior
            .lock()
            .rejected_devices
            .contains(device.unique_id())
        {
            return Err(CoreError::ConfigurationFailed(format!(
                "입력 추가 불가: {}",
                device.unique_id()
            )));
        }
        let mut slots = self.shared.slots.lock();
        if slots
            .inputs
            .iter()
            .any(|d| d.unique_id() == device.unique_id())
        {
            return Err(CoreError::ConfigurationFailed(format!(
                "이미 부착된 입력: {}",
                device.unique_id()
            )));
        }
        slots.inputs.push(device);
        Ok(())
    }

    fn remove_input(&mut self, device_id: &str) {
        self.shared
            .slots
            .lock()
            .inputs
            .retain(|d| d.unique_id() != device_id);
    }

    fn add_output(&mut self, output: PhotoOutput) -> Result<(), CoreError> {
        {
            let mut behavior = self.shared.behavior.lock();
            if behavior.fail_next_output || behavior.break_next_output {
                behavior.fail_next_output = false;
                behavior.break_next_output = false;
                return Err(CoreError::ConfigurationFailed(
                    "출력 추가 불가".to_string(),
                ));
            }
        }
        self.shared.slots.lock().outputs.push(output);
        Ok(())
    }

    fn remove_output(&mut self, output_id: &str) {
        self.shared
            .slots
            .lock()
            .outputs
            .retain(|o| o.id != output_id);
    }

    fn start_running(&mut self) {
        self.shared.slots.lock().running = true;
    }

    fn stop_running(&mut self) {
        self.shared.slots.lock().running = false;
    }

    fn is_running(&self) -> bool {
        self.shared.slots.lock().running
    }

    fn available_codecs(&self) -> Vec<PhotoCodec> {
        self.shared.behavior.lock().codecs.clone()
    }

    fn available_pixel_formats(&self) -> Vec<PixelFormat> {
        self.shared.behavior.lock().pixel_formats.clone()
    }

    fn capture_photo(
        &mut self,
        settings: &CaptureSettings,
        callbacks: CaptureCallbackSender,
    ) -> Result<(), CoreError> {
        {
            let slots = self.shared.slots.lock();
            if !slots.running || slots.outputs.is_empty() {
                return Err(CoreError::CaptureFailed {
                    id: settings.id,
                    reason: "세션이 실행 중이 아님".to_string(),
                });
            }
        }

        self.shared.submitted.fetch_add(1, Ordering::SeqCst);
        *self.shared.last_settings.lock() = Some(settings.clone());

        if self.shared.behavior.lock().hold_captures {
            self.shared.held.lock().push((settings.id, callbacks));
            return Ok(());
        }
        self.rig().spawn_callbacks(settings.id, callbacks);
        Ok(())
    }
}

// ============================================================
// 가상 볼륨
// ============================================================

/// 가상 출력 레벨 (볼륨 버튼)
pub struct VirtualVolume {
    level: Mutex<f32>,
    tx: broadcast::Sender<f32>,
}

impl VirtualVolume {
    /// 볼륨 버튼 한 칸
    pub const STEP: f32 = 1.0 / 16.0;

    pub fn new(initial: f32) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            level: Mutex::new(initial.clamp(0.0, 1.0)),
            tx,
        }
    }

    /// 볼륨 올림 버튼
    pub fn press_up(&self) {
        let level = (self.current_level() + Self::STEP).min(1.0);
        self.set_level(level);
    }

    /// 볼륨 내림 버튼
    pub fn press_down(&self) {
        let level = (self.current_level() - Self::STEP).max(0.0);
        self.set_level(level);
    }
}

impl OutputLevelSource for VirtualVolume {
    fn current_level(&self) -> f32 {
        *self.level.lock()
    }

    fn subscribe(&self) -> broadcast::Receiver<f32> {
        self.tx.subscribe()
    }

    fn set_level(&self, level: f32) {
        let level = level.clamp(0.0, 1.0);
        *self.level.lock() = level;
        // 구독자가 없으면 전송 실패는 무시
        let _ = self.tx.send(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn discovers_rear_devices_by_kind() {
        let rig = VirtualRig::new();
        let lidar = rig.discover_devices(DeviceKind::DepthRanging, DevicePosition::Back);
        assert_eq!(lidar.len(), 1);
        assert_eq!(lidar[0].unique_id(), "virtual-depth-ranging");
        assert!(rig
            .discover_devices(DeviceKind::DualWide, DevicePosition::Front)
            .is_empty());
    }

    #[test]
    fn lock_guard_releases_on_drop() {
        let device = VirtualDevice::depth_ranging();
        {
            let _guard = device.lock_for_configuration().unwrap();
            assert!(device.lock_for_configuration().is_err());
        }
        assert!(device.lock_for_configuration().is_ok());
    }

    #[test]
    fn depth_format_requires_active_format() {
        let device = VirtualDevice::depth_ranging();
        let format = device.formats()[3].clone();
        let depth = format.depth_formats[1].clone();

        let mut lock = device.lock_for_configuration().unwrap();
        assert!(lock.set_active_depth_format(&depth).is_err());
        lock.set_active_format(&format).unwrap();
        lock.set_active_depth_format(&depth).unwrap();
        drop(lock);

        assert_eq!(device.active_depth_format(), Some(depth));
    }

    #[tokio::test]
    async fn capture_callbacks_arrive_in_order() {
        let rig = VirtualRig::new();
        rig.set_callback_delay(Duration::ZERO);
        let mut session = rig.session();
        session.add_output(PhotoOutput::new(Default::default())).unwrap();
        session.start_running();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let settings = CaptureSettings {
            id: CaptureId::new(),
            codec: Some(PhotoCodec::Hevc),
            pixel_format: None,
            depth_delivery: true,
            depth_filtered: false,
            embeds_depth: true,
            quality_priority: true,
        };
        session.capture_photo(&settings, tx).unwrap();

        let mut kinds = Vec::new();
        while let Some((id, callback)) = rx.recv().await {
            assert_eq!(id, settings.id);
            let done = matches!(callback, HardwareCallback::DidFinishCapture(_));
            kinds.push(callback);
            if done {
                break;
            }
        }
        assert_eq!(kinds.len(), 4);
        assert!(matches!(kinds[0], HardwareCallback::WillBeginCapture { .. }));
        assert_eq!(kinds[1], HardwareCallback::WillCapture);
        assert!(matches!(kinds[2], HardwareCallback::DidFinishProcessing(Ok(_))));
        assert_eq!(kinds[3], HardwareCallback::DidFinishCapture(None));
    }

    #[test]
    fn attach_checks_do_not_consume_faults() {
        let rig = VirtualRig::new();
        let mut session = rig.session();
        let dual = VirtualDevice::dual_wide();
        let output = PhotoOutput::new(Default::default());

        rig.reject_device("virtual-dual-wide");
        assert!(!session.can_add_input(&dual));
        assert!(session.can_add_input(&VirtualDevice::depth_ranging()));

        rig.fail_next_output();
        assert!(!session.can_add_output(&output));
        assert!(!session.can_add_output(&output));
        assert!(session.add_output(output.clone()).is_err());
        assert!(session.can_add_output(&output));

        // 확인은 통과하지만 부착은 한 번 실패
        rig.break_next_output();
        assert!(session.can_add_output(&output));
        assert!(session.add_output(output.clone()).is_err());
        session.add_output(output).unwrap();
        assert_eq!(rig.attached_output_ids().len(), 1);
    }

    #[test]
    fn capture_refused_when_not_running() {
        let rig = VirtualRig::new();
        let mut session = rig.session();
        let (tx, _rx) = mpsc::unbounded_channel();
        let settings = CaptureSettings {
            id: CaptureId::new(),
            codec: None,
            pixel_format: None,
            depth_delivery: false,
            depth_filtered: false,
            embeds_depth: false,
            quality_priority: false,
        };
        assert!(session.capture_photo(&settings, tx).is_err());
        assert_eq!(rig.submitted_captures(), 0);
    }

    #[test]
    fn payload_dir_replays_sorted_images() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.heic"), b"second").unwrap();
        std::fs::write(dir.path().join("a.HEIC"), b"first").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip").unwrap();

        let rig = VirtualRig::new();
        assert_eq!(rig.load_payload_dir(dir.path()).unwrap(), 2);
        let id = CaptureId::new();
        assert_eq!(rig.next_payload(id), b"first");
        assert_eq!(rig.next_payload(id), b"second");
        assert_eq!(rig.next_payload(id), b"first");
    }

    #[test]
    fn volume_clamps_and_broadcasts() {
        let volume = VirtualVolume::new(0.5);
        let mut rx = volume.subscribe();
        volume.set_level(1.5);
        assert_eq!(volume.current_level(), 1.0);
        assert_eq!(rx.try_recv().unwrap(), 1.0);

        volume.press_down();
        assert_eq!(volume.current_level(), 1.0 - VirtualVolume::STEP);
    }

    #[test]
    fn access_prompt_updates_authorization() {
        let rig = VirtualRig::new();
        rig.set_authorization(AuthorizationStatus::NotDetermined);
        rig.set_grant_access(false);

        assert!(!tokio_test::block_on(rig.request_access()));
        assert_eq!(rig.authorization_status(), AuthorizationStatus::Denied);

        rig.set_grant_access(true);
        assert!(tokio_test::block_on(rig.request_access()));
        assert_eq!(rig.authorization_status(), AuthorizationStatus::Authorized);
    }
}
