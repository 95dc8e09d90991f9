//! 촬영 → 업로드 파이프라인 통합 테스트.
//!
//! 가상 장비 + 세션 실행기 + 업로드 디스패처 + mockito 서버.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use depthcap_capture::controls::CaptureControls;
use depthcap_capture::session::{CaptureSessionController, SessionHandle, SESSION_STOPPED_REASON};
use depthcap_capture::virtual_rig::{VirtualRig, VirtualVolume};
use depthcap_capture::volume_trigger::VolumeTriggerTask;
use depthcap_core::models::capture::{CaptureOutcome, DeviceKind, SessionState};
use depthcap_core::models::health::HealthStatus;
use depthcap_core::ports::health::HealthProbe;
use depthcap_core::ports::volume::OutputLevelSource;
use depthcap_network::upload_dispatcher::UploadDispatcher;
use mockito::Matcher;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Pipeline {
    rig: VirtualRig,
    session: SessionHandle,
    dispatcher: Arc<UploadDispatcher>,
}

async fn pipeline(server: &mockito::ServerGuard) -> Pipeline {
    let rig = VirtualRig::new();
    let dispatcher = Arc::new(
        UploadDispatcher::new(&format!("{}/upload-image", server.url()), WAIT, None).unwrap(),
    );
    let session = CaptureSessionController::spawn(
        Arc::new(rig.clone()),
        Box::new(rig.session()),
        dispatcher.clone(),
        1920,
    );
    Pipeline {
        rig,
        session,
        dispatcher,
    }
}

async fn upload_ok(server: &mut mockito::ServerGuard, times: usize) -> mockito::Mock {
    server
        .mock("POST", "/upload-image")
        .match_body(Matcher::Regex(r#"filename="[0-9A-F-]{36}\.heic""#.into()))
        .with_status(200)
        .with_body(r#"{"statusCode":"200"}"#)
        .expect(times)
        .create_async()
        .await
}

async fn wait_count(dispatcher: &UploadDispatcher, count: u64) {
    let mut counter = dispatcher.subscribe_counter();
    timeout(WAIT, counter.wait_for(|c| *c == count))
        .await
        .expect("업로드 카운터 대기 시간 초과")
        .unwrap();
}

#[tokio::test]
async fn each_capture_is_uploaded_once() {
    let mut server = mockito::Server::new_async().await;
    let mock = upload_ok(&mut server, 3).await;
    let p = pipeline(&server).await;

    p.session.configure(DeviceKind::DualWide).await.unwrap();
    for _ in 0..3 {
        let pending = p.session.capture().await.unwrap();
        let outcome = timeout(WAIT, pending.outcome()).await.unwrap().unwrap();
        assert!(outcome.is_finished());
    }

    wait_count(&p.dispatcher, 3).await;
    mock.assert_async().await;
}

#[tokio::test]
async fn overlapping_captures_all_complete() {
    let mut server = mockito::Server::new_async().await;
    let mock = upload_ok(&mut server, 3).await;
    let p = pipeline(&server).await;
    p.session.configure(DeviceKind::DualWide).await.unwrap();

    p.rig.set_hold_captures(true);
    let mut pending = Vec::new();
    for _ in 0..3 {
        pending.push(p.session.capture().await.unwrap());
    }
    assert_eq!(p.session.in_flight().await.unwrap().len(), 3);
    assert_eq!(p.rig.release_held(), 3);

    for capture in pending {
        let id = capture.id;
        let outcome = timeout(WAIT, capture.outcome()).await.unwrap().unwrap();
        assert_eq!(outcome.id(), id);
        assert!(outcome.is_finished());
    }
    assert!(p.session.in_flight().await.unwrap().is_empty());

    wait_count(&p.dispatcher, 3).await;
    mock.assert_async().await;
}

#[tokio::test]
async fn failed_capture_is_not_uploaded() {
    let mut server = mockito::Server::new_async().await;
    let mock = upload_ok(&mut server, 1).await;
    let p = pipeline(&server).await;
    p.session.configure(DeviceKind::DualWide).await.unwrap();

    p.rig.set_capture_error(Some("sensor fault".to_string()));
    let outcome = p.session.capture().await.unwrap().outcome().await.unwrap();
    assert!(matches!(outcome, CaptureOutcome::Failed { ref reason, .. } if reason.contains("sensor fault")));

    // 단일 실패 후에도 세션은 계속 동작
    assert_eq!(p.session.state(), SessionState::Running);
    p.rig.set_capture_error(None);
    let outcome = p.session.capture().await.unwrap().outcome().await.unwrap();
    assert!(outcome.is_finished());

    wait_count(&p.dispatcher, 1).await;
    mock.assert_async().await;
}

#[tokio::test]
async fn rejected_upload_does_not_stop_capturing() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/upload-image")
        .with_status(500)
        .with_body(r#"{"statusCode":"500"}"#)
        .expect(2)
        .create_async()
        .await;
    let p = pipeline(&server).await;
    p.session.configure(DeviceKind::DualWide).await.unwrap();

    for _ in 0..2 {
        let outcome = p.session.capture().await.unwrap().outcome().await.unwrap();
        assert!(outcome.is_finished());
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(p.dispatcher.uploaded_count(), 0);
    assert_eq!(p.session.state(), SessionState::Running);
}

#[tokio::test]
async fn stop_fails_held_captures_without_upload() {
    let mut server = mockito::Server::new_async().await;
    let mock = upload_ok(&mut server, 0).await;
    let p = pipeline(&server).await;
    p.session.configure(DeviceKind::DualWide).await.unwrap();

    p.rig.set_hold_captures(true);
    let pending = p.session.capture().await.unwrap();
    p.session.stop().await.unwrap();

    match pending.outcome().await.unwrap() {
        CaptureOutcome::Failed { reason, .. } => assert_eq!(reason, SESSION_STOPPED_REASON),
        other => panic!("unexpected outcome: {other:?}"),
    }
    // 늦게 도착한 콜백은 무시된다
    p.rig.release_held();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(p.dispatcher.uploaded_count(), 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn toggled_mode_keeps_uploading() {
    let mut server = mockito::Server::new_async().await;
    let mock = upload_ok(&mut server, 2).await;
    let p = pipeline(&server).await;
    p.session.configure(DeviceKind::DualWide).await.unwrap();

    p.session.capture().await.unwrap().outcome().await.unwrap();
    assert_eq!(p.session.toggle_mode().await.unwrap(), DeviceKind::DepthRanging);
    assert_eq!(p.rig.attached_input_ids(), vec!["virtual-depth-ranging".to_string()]);
    p.session.capture().await.unwrap().outcome().await.unwrap();

    wait_count(&p.dispatcher, 2).await;
    mock.assert_async().await;
}

#[tokio::test]
async fn payload_bytes_reach_server() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/upload-image")
        .match_body(Matcher::Regex("replayed-heic-payload".into()))
        .with_status(200)
        .with_body(r#"{"statusCode":"200"}"#)
        .create_async()
        .await;
    let p = pipeline(&server).await;
    p.rig.set_payloads(vec![b"replayed-heic-payload".to_vec()]);
    p.session.configure(DeviceKind::DualWide).await.unwrap();

    p.session.capture().await.unwrap().outcome().await.unwrap();
    wait_count(&p.dispatcher, 1).await;
    mock.assert_async().await;
}

#[tokio::test]
async fn volume_presses_trigger_uploads() {
    let mut server = mockito::Server::new_async().await;
    let mock = upload_ok(&mut server, 2).await;
    let p = pipeline(&server).await;
    p.session.configure(DeviceKind::DualWide).await.unwrap();

    let volume = Arc::new(VirtualVolume::new(0.1));
    let trigger = VolumeTriggerTask::spawn(volume.clone(), p.session.clone());

    // 0.1 → 0.05: 임계값 아래, 발사 안 함
    volume.set_level(0.05);
    // 0.95: 발사 후 0.2로 되돌림
    volume.set_level(0.95);
    wait_count(&p.dispatcher, 1).await;
    timeout(WAIT, async {
        while (volume.current_level() - 0.2).abs() > f32::EPSILON {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    volume.set_level(0.3);
    wait_count(&p.dispatcher, 2).await;

    trigger.stop().await;
    mock.assert_async().await;
}

/// 상태를 바꿀 수 있는 생존 프로브
struct SwitchProbe(AtomicBool);

#[async_trait]
impl HealthProbe for SwitchProbe {
    async fn probe(&self) -> HealthStatus {
        if self.0.load(Ordering::SeqCst) {
            HealthStatus::Alive
        } else {
            HealthStatus::Offline
        }
    }
}

#[tokio::test]
async fn controls_follow_session_and_server() {
    let server = mockito::Server::new_async().await;
    let p = pipeline(&server).await;
    let probe = Arc::new(SwitchProbe(AtomicBool::new(true)));
    let controls = CaptureControls::spawn(p.session.subscribe_running(), probe.clone());
    let mut enabled = controls.subscribe();

    // 세션 구성 전에는 비활성
    assert!(!controls.is_enabled());

    p.session.configure(DeviceKind::DualWide).await.unwrap();
    timeout(WAIT, enabled.wait_for(|e| *e)).await.unwrap().unwrap();

    // 서버 오프라인 → 비활성, 분석 진입 거부
    probe.0.store(false, Ordering::SeqCst);
    assert_eq!(controls.refresh().await, HealthStatus::Offline);
    assert!(!controls.is_enabled());
    assert!(controls.check_before_analysis().await.is_err());

    // 복구 → 다시 활성
    probe.0.store(true, Ordering::SeqCst);
    controls.check_before_analysis().await.unwrap();
    assert!(controls.is_enabled());

    // 세션 중지 → 비활성
    p.session.stop().await.unwrap();
    timeout(WAIT, enabled.wait_for(|e| !*e)).await.unwrap().unwrap();
    controls.stop().await;
}

#[tokio::test]
async fn unauthorized_rig_never_enables_controls() {
    let server = mockito::Server::new_async().await;
    let p = pipeline(&server).await;
    p.rig.set_authorization(depthcap_core::models::capture::AuthorizationStatus::Denied);
    let controls = CaptureControls::spawn(
        p.session.subscribe_running(),
        Arc::new(SwitchProbe(AtomicBool::new(true))),
    );

    assert!(p.session.configure(DeviceKind::DualWide).await.is_err());
    assert_eq!(p.session.state(), SessionState::Unauthorized);
    assert!(p.session.capture().await.is_err());
    assert!(!controls.is_enabled());
    controls.stop().await;
}
