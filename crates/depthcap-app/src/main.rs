//! # depthcap-app
//!
//! depthcap 바이너리 진입점.
//! DI 와이어링, 콘솔 명령 루프, 라이프사이클 관리.

mod console;
mod event_bus;
mod lifecycle;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use depthcap_capture::controls::CaptureControls;
use depthcap_capture::session::CaptureSessionController;
use depthcap_capture::virtual_rig::{VirtualRig, VirtualVolume};
use depthcap_capture::volume_trigger::VolumeTriggerTask;
use depthcap_core::config::AppConfig;
use depthcap_core::config_manager::ConfigManager;
use depthcap_core::models::analysis::{AnalysisRequest, DetailLevel, FeatureSensitivity};
use depthcap_core::models::capture::{CaptureEffect, DeviceKind};
use depthcap_network::analysis_client::AnalysisClient;
use depthcap_network::health::HttpHealthGate;
use depthcap_network::upload_dispatcher::UploadDispatcher;
use tokio::io::BufReader;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::console::Console;
use crate::event_bus::{AppEvent, EventBus};
use crate::lifecycle::LifecycleManager;

/// 촬영 모드
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// 광각 듀얼 카메라
    Dual,
    /// 깊이 측정 카메라
    Lidar,
}

impl From<Mode> for DeviceKind {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Dual => DeviceKind::DualWide,
            Mode::Lidar => DeviceKind::DepthRanging,
        }
    }
}

/// depthcap 깊이 사진 촬영/업로드 클라이언트
#[derive(Parser, Debug)]
#[command(name = "depthcap")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 서버 URL 지정 (기본: http://localhost:8000)
    #[arg(long, short = 's')]
    server: Option<String>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 시작 촬영 모드
    #[arg(long, short = 'm', value_enum)]
    mode: Option<Mode>,

    /// 가상 촬영 결과로 재생할 이미지 디렉토리
    #[arg(long)]
    payload_dir: Option<PathBuf>,

    /// 동시 업로드 상한 (기본: 무제한)
    #[arg(long)]
    max_uploads: Option<usize>,

    /// 분석 상세 수준 (preview, reduced, medium, full, raw)
    #[arg(long)]
    detail_level: Option<DetailLevel>,

    /// 특징점 민감도 (normal, high)
    #[arg(long)]
    feature_sensitivity: Option<FeatureSensitivity>,

    /// 볼륨 버튼 촬영 끄기
    #[arg(long)]
    no_volume_trigger: bool,
}

impl Args {
    /// CLI 인자를 설정 위에 덮어쓴다
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(server) = &self.server {
            config.server.base_url = server.clone();
        }
        if let Some(mode) = self.mode {
            config.capture.mode = mode.into();
        }
        if let Some(max) = self.max_uploads {
            config.upload.max_concurrent_uploads = Some(max);
        }
        if let Some(dl) = self.detail_level {
            config.analysis.detail_level = dl;
        }
        if let Some(fs) = self.feature_sensitivity {
            config.analysis.feature_sensitivity = fs;
        }
        if self.no_volume_trigger {
            config.volume_trigger.enabled = false;
        }
    }
}

fn print_banner(config: &AppConfig) {
    println!();
    println!("╔══════════════════════════════════════════════╗");
    println!("║                                              ║");
    println!("║   depthcap  깊이 사진 촬영 / 업로드          ║");
    println!("║                                              ║");
    println!("╚══════════════════════════════════════════════╝");
    println!("  서버   : {}", config.server.base_url);
    println!("  모드   : {}", config.capture.mode);
    println!("  분석   : dl={} fs={}", config.analysis.detail_level, config.analysis.feature_sensitivity);
    println!("  'help' 입력 시 명령 목록");
    println!();
}

/// 버스 이벤트를 터미널에 출력
fn spawn_event_printer(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let bus_event = match rx.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("이벤트 {}개 유실", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let at = bus_event.at.format("%H:%M:%S");
            match bus_event.event {
                AppEvent::SessionChanged(state) => println!("[{at}] 세션 {state}"),
                AppEvent::Capture(CaptureEffect::WillCapture { .. }) => println!("[{at}] *찰칵*"),
                AppEvent::Capture(CaptureEffect::LongProcessingStarted { id }) => {
                    println!("[{at}] 처리 중... ({id})")
                }
                AppEvent::Capture(CaptureEffect::LongProcessingEnded { .. }) => {}
                AppEvent::Capture(CaptureEffect::Completed { id, success }) => {
                    println!("[{at}] 촬영 {} ({id})", if success { "완료" } else { "실패" })
                }
                AppEvent::UploadCounted(count) => println!("[{at}] 업로드 {count}장"),
                AppEvent::ControlsChanged(enabled) => {
                    println!("[{at}] 촬영 {}", if enabled { "가능" } else { "불가" })
                }
                AppEvent::AnalysisCompleted(result) => {
                    match serde_json::to_string_pretty(&result) {
                        Ok(json) => println!("[{at}] 분석 완료\n{json}"),
                        Err(e) => warn!("분석 결과 출력 실패: {}", e),
                    }
                }
                AppEvent::ModelDownloaded(path) => {
                    println!("[{at}] 모델 저장: {}", path.display())
                }
                AppEvent::Error(message) => println!("[{at}] 에러: {message}"),
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    // 1. 설정 로드 + CLI 덮어쓰기
    let config_manager = match &args.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    }
    .context("설정 로드 실패")?;
    let mut config = config_manager.get();
    args.apply_overrides(&mut config);
    info!("설정 파일: {}", config_manager.config_path().display());

    print_banner(&config);

    // 2. 가상 카메라 장비
    let rig = VirtualRig::new();
    if let Some(dir) = &args.payload_dir {
        let loaded = rig
            .load_payload_dir(dir)
            .with_context(|| format!("촬영 이미지 디렉토리 로드 실패: {}", dir.display()))?;
        info!("촬영 이미지 {}개 로드", loaded);
    }

    // 3. 업로드 디스패처 (촬영 싱크)
    let dispatcher = Arc::new(UploadDispatcher::new(
        &config.upload_url(),
        config.request_timeout(),
        config.upload.max_concurrent_uploads,
    )?);

    // 4. 캡처 세션
    let session = CaptureSessionController::spawn(
        Arc::new(rig.clone()),
        Box::new(rig.session()),
        dispatcher.clone(),
        config.capture.preferred_width,
    );

    // 5. 서버 생존 게이트 + 촬영 컨트롤
    let gate = HttpHealthGate::new(&config.alive_url(), config.request_timeout())?;
    let controls = Arc::new(CaptureControls::spawn(
        session.subscribe_running(),
        Arc::new(gate),
    ));

    // 6. 볼륨 트리거
    let volume = Arc::new(VirtualVolume::new(0.5));
    let volume_task = if config.volume_trigger.enabled {
        Some(VolumeTriggerTask::spawn(volume.clone(), session.clone()))
    } else {
        info!("볼륨 트리거 비활성");
        None
    };

    // 7. 분석 클라이언트
    let analysis = Arc::new(AnalysisClient::new(
        &config.analyse_url(),
        &config.model_url(),
        config.analysis_timeout(),
    )?);
    let model_dir = config_manager.model_dir()?;

    // 8. 이벤트 버스 중계
    let bus = EventBus::default();
    let forwarders = vec![
        bus.forward_watch(session.subscribe_state(), AppEvent::SessionChanged),
        bus.forward_effects(session.subscribe_effects()),
        bus.forward_watch(dispatcher.subscribe_counter(), AppEvent::UploadCounted),
        bus.forward_watch(controls.subscribe(), AppEvent::ControlsChanged),
    ];
    let printer = spawn_event_printer(&bus);

    // 9. 세션 구성
    match session.configure(config.capture.mode).await {
        Ok(state) => info!("세션 구성 완료: {}", state),
        Err(e) if e.requires_user_action() => error!("세션 구성 실패: {}", e),
        Err(e) => warn!("세션 구성 실패: {}", e),
    }

    // 10. 콘솔 루프 + 시그널 대기
    let lifecycle = Arc::new(LifecycleManager::new());
    let console = Console {
        session: session.clone(),
        controls: controls.clone(),
        volume,
        dispatcher: dispatcher.clone(),
        analysis,
        bus: bus.clone(),
        model_dir,
        defaults: AnalysisRequest {
            detail_level: config.analysis.detail_level,
            feature_sensitivity: config.analysis.feature_sensitivity,
        },
    };

    let signal_waiter = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.wait_for_shutdown().await })
    };
    let stdin = BufReader::new(tokio::io::stdin());
    if let Err(e) = console.run(stdin, lifecycle.subscribe()).await {
        error!("콘솔 입력 에러: {}", e);
    }
    lifecycle.shutdown();
    drop(console);

    // 11. 정리
    info!("종료 중...");
    if let Some(task) = volume_task {
        task.stop().await;
    }
    if let Err(e) = session.stop().await {
        warn!("세션 중지 실패: {}", e);
    }
    match Arc::try_unwrap(controls) {
        Ok(controls) => controls.stop().await,
        Err(_) => debug!("촬영 컨트롤이 아직 사용 중, 정리 생략"),
    }
    for forwarder in forwarders {
        forwarder.abort();
    }
    printer.abort();
    signal_waiter.abort();

    info!("업로드 성공 {}장, 종료", dispatcher.uploaded_count());
    Ok(())
}
