//! 캡처 세션 컨트롤러.
//!
//! 세션의 모든 변경은 하나의 tokio 태스크(직렬 실행기)에서만 일어난다.
//! 외부에서는 복제 가능한 [`SessionHandle`]로 명령을 보내고,
//! 상태는 watch/broadcast 구독으로 관찰한다.
//!
//! 하드웨어 콜백은 다른 스레드에서 unbounded 채널로 들어와
//! 해당 요청의 상태 전이로 적용된다.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use depthcap_core::error::CoreError;
use depthcap_core::models::capture::{
    AuthorizationStatus, CaptureEffect, CaptureId, CaptureOutcome, CaptureSettings,
    DeviceKind, DeviceProfile, FinishedCapture, HardwareCallback, PhotoCodec, PhotoOutput,
    PhotoOutputConfig, PixelFormat, SessionState,
};
use depthcap_core::ports::camera::{CaptureHardware, CaptureSessionBackend};
use depthcap_core::ports::sink::CaptureSink;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::device::{ActiveDeviceHandle, DeviceConfigurator};
use crate::request::CaptureRequest;

/// 세션 중지 시 진행 중 요청의 실패 사유
pub const SESSION_STOPPED_REASON: &str = "session stopped";

const COMMAND_CAPACITY: usize = 32;
const EFFECT_CAPACITY: usize = 64;

enum Command {
    Configure {
        kind: DeviceKind,
        reply: oneshot::Sender<Result<SessionState, CoreError>>,
    },
    ToggleMode {
        reply: oneshot::Sender<Result<DeviceKind, CoreError>>,
    },
    Capture {
        reply: oneshot::Sender<Result<PendingCapture, CoreError>>,
    },
    InFlight {
        reply: oneshot::Sender<Vec<CaptureId>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// 제출된 촬영. 종료 결과를 한 번 받을 수 있다.
#[derive(Debug)]
pub struct PendingCapture {
    pub id: CaptureId,
    completion: oneshot::Receiver<CaptureOutcome>,
}

impl PendingCapture {
    /// 종료 결과 대기
    pub async fn outcome(self) -> Result<CaptureOutcome, CoreError> {
        self.completion.await.map_err(|_| CoreError::SessionClosed)
    }
}

/// 세션 컨트롤러 핸들 (복제 가능)
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state_rx: watch::Receiver<SessionState>,
    running_rx: watch::Receiver<bool>,
    effects_tx: broadcast::Sender<CaptureEffect>,
}

impl SessionHandle {
    /// 지정 모드로 세션 구성 (권한 확인 포함)
    pub async fn configure(&self, kind: DeviceKind) -> Result<SessionState, CoreError> {
        self.request(|reply| Command::Configure { kind, reply })
            .await?
    }

    /// 듀얼 ↔ 깊이 모드 전환. 성공 시 새 모드 반환
    pub async fn toggle_mode(&self) -> Result<DeviceKind, CoreError> {
        self.request(|reply| Command::ToggleMode { reply }).await?
    }

    /// 촬영 제출. 하드웨어 제출까지만 기다리고 결과는 기다리지 않는다.
    pub async fn capture(&self) -> Result<PendingCapture, CoreError> {
        self.request(|reply| Command::Capture { reply }).await?
    }

    /// 진행 중인 촬영 ID
    pub async fn in_flight(&self) -> Result<Vec<CaptureId>, CoreError> {
        self.request(|reply| Command::InFlight { reply }).await
    }

    /// 세션 중지. 이후 모든 명령은 `SessionClosed`로 실패한다.
    pub async fn stop(&self) -> Result<(), CoreError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// 촬영 가능 여부 구독 (정착된 상태에서만 갱신)
    pub fn subscribe_running(&self) -> watch::Receiver<bool> {
        self.running_rx.clone()
    }

    pub fn subscribe_effects(&self) -> broadcast::Receiver<CaptureEffect> {
        self.effects_tx.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| CoreError::SessionClosed)?;
        rx.await.map_err(|_| CoreError::SessionClosed)
    }
}

/// 세션 실행기
pub struct CaptureSessionController {
    hardware: Arc<dyn CaptureHardware>,
    configurator: DeviceConfigurator,
    backend: Box<dyn CaptureSessionBackend>,
    sink: Arc<dyn CaptureSink>,
    preferred_width: u32,
    mode: DeviceKind,
    active: Option<ActiveDeviceHandle>,
    in_flight: HashMap<CaptureId, CaptureRequest>,
    callbacks_tx: mpsc::UnboundedSender<(CaptureId, HardwareCallback)>,
    state_tx: watch::Sender<SessionState>,
    running_tx: watch::Sender<bool>,
    effects_tx: broadcast::Sender<CaptureEffect>,
}

impl CaptureSessionController {
    /// 실행기 태스크를 띄우고 핸들 반환
    pub fn spawn(
        hardware: Arc<dyn CaptureHardware>,
        backend: Box<dyn CaptureSessionBackend>,
        sink: Arc<dyn CaptureSink>,
        preferred_width: u32,
    ) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (callbacks_tx, callbacks_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (running_tx, running_rx) = watch::channel(false);
        let (effects_tx, _) = broadcast::channel(EFFECT_CAPACITY);

        let controller = Self {
            configurator: DeviceConfigurator::new(hardware.clone()),
            hardware,
            backend,
            sink,
            preferred_width,
            mode: DeviceKind::default(),
            active: None,
            in_flight: HashMap::new(),
            callbacks_tx,
            state_tx,
            running_tx,
            effects_tx: effects_tx.clone(),
        };
        tokio::spawn(controller.run(commands_rx, callbacks_rx));

        SessionHandle {
            commands: commands_tx,
            state_rx,
            running_rx,
            effects_tx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut callbacks: mpsc::UnboundedReceiver<(CaptureId, HardwareCallback)>,
    ) {
        debug!("세션 실행기 시작");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        // 모든 핸들이 drop됨
                        self.teardown();
                        break;
                    };
                    if let Command::Stop { reply } = command {
                        self.teardown();
                        let _ = reply.send(());
                        break;
                    }
                    self.handle(command).await;
                }
                Some((id, callback)) = callbacks.recv() => {
                    self.on_callback(id, callback);
                }
            }
        }
        info!("세션 실행기 종료");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Configure { kind, reply } => {
                let result = self.configure(kind).await;
                let _ = reply.send(result);
            }
            Command::ToggleMode { reply } => {
                let target = self.mode.toggled();
                let result = self.configure(target).await.map(|_| self.mode);
                let _ = reply.send(result);
            }
            Command::Capture { reply } => {
                let _ = reply.send(self.capture());
            }
            Command::InFlight { reply } => {
                let _ = reply.send(self.in_flight.keys().copied().collect());
            }
            Command::Stop { .. } => {}
        }
    }

    // ============================================================
    // 구성
    // ============================================================

    async fn configure(&mut self, kind: DeviceKind) -> Result<SessionState, CoreError> {
        match self.state() {
            SessionState::Unauthorized => return Err(CoreError::PermissionDenied),
            SessionState::Stopped => return Err(CoreError::SessionClosed),
            _ => {}
        }

        self.ensure_authorized().await?;

        self.set_state(SessionState::Configuring);
        let profile = DeviceProfile::for_kind(kind, self.preferred_width);

        match self.configure_pass(&profile) {
            Ok(handle) => {
                info!("세션 구성 완료: {} ({})", kind, handle.device.unique_id());
                self.active = Some(handle);
                self.mode = kind;
                if !self.backend.is_running() {
                    self.backend.start_running();
                }
                self.settle(SessionState::Running);
                Ok(SessionState::Running)
            }
            Err(e) if self.active.is_some() && self.backend.is_running() => {
                // 기존 구성이 그대로 남아 있으면 계속 촬영 가능
                warn!("세션 전환 실패, 기존 구성 유지: {} → {}: {}", self.mode, kind, e);
                self.settle(SessionState::Running);
                Err(e)
            }
            Err(e) => {
                error!("세션 구성 실패: {}: {}", kind, e);
                self.active = None;
                self.settle(SessionState::ConfigurationFailed);
                Err(e)
            }
        }
    }

    async fn ensure_authorized(&mut self) -> Result<(), CoreError> {
        match self.hardware.authorization_status() {
            AuthorizationStatus::Authorized => Ok(()),
            AuthorizationStatus::NotDetermined => {
                self.set_state(SessionState::AwaitingPermission);
                info!("카메라 권한 요청 대기");
                if self.hardware.request_access().await {
                    Ok(())
                } else {
                    warn!("카메라 권한 거부됨");
                    self.settle(SessionState::Unauthorized);
                    Err(CoreError::PermissionDenied)
                }
            }
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted => {
                warn!("카메라 권한 없음");
                self.settle(SessionState::Unauthorized);
                Err(CoreError::PermissionDenied)
            }
        }
    }

    fn configure_pass(&mut self, profile: &DeviceProfile) -> Result<ActiveDeviceHandle, CoreError> {
        // 세션을 건드리기 전에 장치를 먼저 검증한다
        let handle = self.configurator.configure(profile)?;
        self.attach(&handle)?;
        Ok(handle)
    }

    /// 입력/출력 교체.
    ///
    /// 새 입력/출력을 백엔드가 받을 수 있는지 먼저 확인하고, 거부되면
    /// 세션을 건드리지 않는다. 확인 후 추가가 실패하면 기존 구성을
    /// 복원하며, 복원까지 실패하면 활성 장치를 잃은 것으로 본다.
    fn attach(&mut self, handle: &ActiveDeviceHandle) -> Result<(), CoreError> {
        let output = PhotoOutput::new(PhotoOutputConfig::default());
        if !self.backend.can_add_input(&*handle.device) {
            return Err(CoreError::ConfigurationFailed(format!(
                "입력 거부: {}",
                handle.device.unique_id()
            )));
        }
        if !self.backend.can_add_output(&output) {
            return Err(CoreError::ConfigurationFailed(format!(
                "출력 거부: {}",
                output.id
            )));
        }

        let backend = &mut self.backend;
        backend.begin_configuration();

        let old_inputs = backend.inputs();
        let old_outputs = backend.outputs();
        for input in &old_inputs {
            backend.remove_input(input.unique_id());
        }
        for output in &old_outputs {
            backend.remove_output(&output.id);
        }

        let mut input_added = false;
        let result = backend
            .add_input(handle.device.clone())
            .and_then(|()| {
                input_added = true;
                backend.add_output(output.clone())
            });

        let Err(e) = result else {
            backend.commit_configuration();
            debug!("세션 부착 완료: output={}", output.id);
            return Ok(());
        };

        warn!("세션 부착 실패, 기존 구성 복원: {}", e);
        if input_added {
            backend.remove_input(handle.device.unique_id());
        }
        let mut restored = true;
        for input in old_inputs {
            let id = input.unique_id().to_string();
            if let Err(e) = backend.add_input(input) {
                error!("기존 입력 복원 실패: {}: {}", id, e);
                restored = false;
            }
        }
        for output in old_outputs {
            let id = output.id.clone();
            if let Err(e) = backend.add_output(output) {
                error!("기존 출력 복원 실패: {}: {}", id, e);
                restored = false;
            }
        }
        backend.commit_configuration();
        if !restored {
            self.active = None;
        }
        Err(CoreError::ConfigurationFailed(format!("세션 부착 실패: {e}")))
    }

    // ============================================================
    // 촬영
    // ============================================================

    fn capture(&mut self) -> Result<PendingCapture, CoreError> {
        match self.state() {
            SessionState::Running => {}
            SessionState::Stopped | SessionState::Unauthorized => {
                return Err(CoreError::SessionClosed)
            }
            other => {
                return Err(CoreError::InvalidState(format!("촬영 불가 상태: {other}")));
            }
        }

        let settings = negotiate_settings(
            &self.backend.available_codecs(),
            &self.backend.available_pixel_formats(),
        );
        let id = settings.id;
        let (request, completion) = CaptureRequest::new(settings);

        self.backend
            .capture_photo(request.settings(), self.callbacks_tx.clone())?;
        self.in_flight.insert(id, request);
        debug!("촬영 제출: {} (진행 중 {})", id, self.in_flight.len());

        Ok(PendingCapture { id, completion })
    }

    fn on_callback(&mut self, id: CaptureId, callback: HardwareCallback) {
        let Some(request) = self.in_flight.get_mut(&id) else {
            debug!("알 수 없는 요청의 콜백 무시: {}", id);
            return;
        };

        let transition = request.apply(callback);
        for effect in transition.effects {
            let _ = self.effects_tx.send(effect);
        }

        if let Some(outcome) = transition.outcome {
            if let Some(request) = self.in_flight.remove(&id) {
                self.complete(request, outcome);
            }
        }
    }

    fn complete(&self, mut request: CaptureRequest, outcome: CaptureOutcome) {
        match &outcome {
            CaptureOutcome::Finished { id, bytes } => {
                info!("촬영 완료: {} ({} bytes)", id, bytes.len());
                self.sink.on_capture_finished(FinishedCapture {
                    id: *id,
                    bytes: bytes.clone(),
                    captured_at: Utc::now(),
                });
            }
            CaptureOutcome::Failed { id, reason } => {
                warn!("촬영 실패: {}: {}", id, reason);
            }
        }
        if let Some(tx) = request.take_completion() {
            let _ = tx.send(outcome);
        }
    }

    // ============================================================
    // 종료
    // ============================================================

    fn teardown(&mut self) {
        let pending: Vec<_> = self.in_flight.drain().map(|(_, r)| r).collect();
        for mut request in pending {
            let transition = request.fail(SESSION_STOPPED_REASON);
            for effect in transition.effects {
                let _ = self.effects_tx.send(effect);
            }
            if let Some(outcome) = transition.outcome {
                self.complete(request, outcome);
            }
        }
        if self.backend.is_running() {
            self.backend.stop_running();
        }
        self.active = None;
        self.settle(SessionState::Stopped);
    }

    // ============================================================
    // 상태 발행
    // ============================================================

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SessionState) {
        debug!("세션 상태: {} → {}", self.state(), state);
        self.state_tx.send_replace(state);
    }

    /// 정착 상태로 전이하고 촬영 가능 여부를 발행
    fn settle(&self, state: SessionState) {
        self.set_state(state);
        let running = state == SessionState::Running;
        self.running_tx.send_if_modified(|current| {
            if *current == running {
                false
            } else {
                *current = running;
                true
            }
        });
    }
}

/// 촬영 설정 협상
///
/// 출력이 지원하면 HEVC와 full-range 4:2:0 포맷을 쓰고,
/// 원본 깊이 맵을 필터링 없이 파일에 포함한다.
pub fn negotiate_settings(codecs: &[PhotoCodec], pixel_formats: &[PixelFormat]) -> CaptureSettings {
    CaptureSettings {
        id: CaptureId::new(),
        codec: codecs.contains(&PhotoCodec::Hevc).then_some(PhotoCodec::Hevc),
        pixel_format: pixel_formats
            .contains(&PixelFormat::YCbCr420BiPlanarFullRange)
            .then_some(PixelFormat::YCbCr420BiPlanarFullRange),
        depth_delivery: true,
        depth_filtered: false,
        embeds_depth: true,
        quality_priority: true,
    }
}
