//! 콘솔 명령 처리.
//!
//! 표준 입력 한 줄을 명령 하나로 해석해 세션/업로드/분석 구성요소에 전달한다.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use depthcap_capture::controls::CaptureControls;
use depthcap_capture::session::SessionHandle;
use depthcap_capture::virtual_rig::VirtualVolume;
use depthcap_core::models::analysis::{AnalysisRequest, DetailLevel, FeatureSensitivity};
use depthcap_core::models::capture::CaptureOutcome;
use depthcap_core::ports::volume::OutputLevelSource;
use depthcap_network::analysis_client::AnalysisClient;
use depthcap_network::upload_dispatcher::UploadDispatcher;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::event_bus::{AppEvent, EventBus};

const HELP: &str = "\
명령:
  capture | c            촬영
  up | down              볼륨 버튼 (볼륨 트리거)
  toggle | t             듀얼 / LiDAR 전환
  status | s             세션/컨트롤/업로드 상태
  refresh                서버 생존 재확인
  analyse [dl] [fs]      분석 요청 후 모델 다운로드
  model                  모델만 다운로드
  help | h               도움말
  quit | q               종료";

/// 콘솔 명령
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Capture,
    VolumeUp,
    VolumeDown,
    Toggle,
    Status,
    Refresh,
    Analyse(AnalysisRequest),
    Model,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// 한 줄 해석. 빈 줄이면 `None`.
    ///
    /// `analyse`의 생략된 인자는 `defaults`에서 채운다.
    pub fn parse(line: &str, defaults: AnalysisRequest) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };

        let command = match head.to_lowercase().as_str() {
            "capture" | "c" => ConsoleCommand::Capture,
            "up" => ConsoleCommand::VolumeUp,
            "down" => ConsoleCommand::VolumeDown,
            "toggle" | "t" => ConsoleCommand::Toggle,
            "status" | "s" => ConsoleCommand::Status,
            "refresh" => ConsoleCommand::Refresh,
            "analyse" | "analyze" | "a" => {
                let detail_level = match words.next() {
                    Some(dl) => dl.parse::<DetailLevel>()?,
                    None => defaults.detail_level,
                };
                let feature_sensitivity = match words.next() {
                    Some(fs) => fs.parse::<FeatureSensitivity>()?,
                    None => defaults.feature_sensitivity,
                };
                ConsoleCommand::Analyse(AnalysisRequest {
                    detail_level,
                    feature_sensitivity,
                })
            }
            "model" => ConsoleCommand::Model,
            "help" | "h" | "?" => ConsoleCommand::Help,
            "quit" | "q" | "exit" => ConsoleCommand::Quit,
            other => return Err(anyhow!("알 수 없는 명령: {other} (help 참고)")),
        };

        if words.next().is_some() && !matches!(command, ConsoleCommand::Analyse(_)) {
            return Err(anyhow!("{head}: 인자를 받지 않는 명령"));
        }
        Ok(Some(command))
    }
}

/// 콘솔 명령 실행기
pub struct Console {
    pub session: SessionHandle,
    pub controls: Arc<CaptureControls>,
    pub volume: Arc<VirtualVolume>,
    pub dispatcher: Arc<UploadDispatcher>,
    pub analysis: Arc<AnalysisClient>,
    pub bus: EventBus,
    pub model_dir: PathBuf,
    pub defaults: AnalysisRequest,
}

impl Console {
    /// 입력이 끝나거나 `quit` 또는 종료 신호가 올 때까지 명령 처리
    pub async fn run<R>(&self, input: R, mut shutdown: watch::Receiver<bool>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        info!("콘솔 입력 종료");
                        break;
                    };
                    match ConsoleCommand::parse(&line, self.defaults) {
                        Ok(Some(command)) => {
                            if self.execute(command).await.is_break() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => println!("{e}"),
                    }
                }
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }
        Ok(())
    }

    /// 명령 하나 실행
    pub async fn execute(&self, command: ConsoleCommand) -> ControlFlow<()> {
        debug!("콘솔 명령: {:?}", command);
        match command {
            ConsoleCommand::Capture => self.capture().await,
            ConsoleCommand::VolumeUp => self.volume.press_up(),
            ConsoleCommand::VolumeDown => self.volume.press_down(),
            ConsoleCommand::Toggle => match self.session.toggle_mode().await {
                Ok(mode) => println!("모드 전환: {mode}"),
                Err(e) => println!("모드 전환 실패: {e}"),
            },
            ConsoleCommand::Status => self.print_status().await,
            ConsoleCommand::Refresh => {
                let status = self.controls.refresh().await;
                println!("서버 {status}");
            }
            ConsoleCommand::Analyse(request) => {
                self.spawn_analysis(Some(request));
            }
            ConsoleCommand::Model => {
                self.spawn_analysis(None);
            }
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    async fn capture(&self) {
        if !self.controls.is_enabled() {
            println!("촬영 비활성 (세션 미실행 또는 서버 오프라인)");
            return;
        }

        let pending = match self.session.capture().await {
            Ok(pending) => pending,
            Err(e) => {
                println!("촬영 요청 실패: {e}");
                return;
            }
        };
        println!("촬영 요청 {}", pending.id);

        tokio::spawn(async move {
            match pending.outcome().await {
                Ok(CaptureOutcome::Finished { id, bytes }) => {
                    info!("촬영 완료 {} ({} bytes)", id, bytes.len());
                }
                Ok(CaptureOutcome::Failed { id, reason }) => {
                    warn!("촬영 실패 {}: {}", id, reason);
                }
                Err(e) => warn!("촬영 결과 수신 실패: {}", e),
            }
        });
    }

    async fn print_status(&self) {
        let in_flight = match self.session.in_flight().await {
            Ok(ids) => ids.len().to_string(),
            Err(e) => format!("- ({e})"),
        };
        println!("세션     : {}", self.session.state());
        println!("컨트롤   : {}", if self.controls.is_enabled() { "활성" } else { "비활성" });
        println!("진행 중  : {in_flight}");
        println!("업로드   : {}", self.dispatcher.uploaded_count());
        println!("볼륨     : {:.3}", self.volume.current_level());
    }

    /// `request`가 `None`이면 분석 없이 모델만 내려받는다
    fn spawn_analysis(&self, request: Option<AnalysisRequest>) {
        let controls = self.controls.clone();
        let analysis = self.analysis.clone();
        let bus = self.bus.clone();
        let model_dir = self.model_dir.clone();

        tokio::spawn(async move {
            if let Some(request) = request {
                if let Err(e) = controls.check_before_analysis().await {
                    bus.publish(AppEvent::Error(e.to_string()));
                    return;
                }
                match analysis.analyse(request).await {
                    Ok(result) => bus.publish(AppEvent::AnalysisCompleted(result)),
                    Err(e) => {
                        bus.publish(AppEvent::Error(e.to_string()));
                        return;
                    }
                }
            }

            match analysis.download_model(&model_dir).await {
                Ok(path) => bus.publish(AppEvent::ModelDownloaded(path)),
                Err(e) => bus.publish(AppEvent::Error(e.to_string())),
            }
        });
    }
}
