//! 촬영 이미지 업로드 디스패처.
//!
//! `CaptureSink` 포트 구현. 완료된 촬영마다 독립 태스크로 멀티파트 POST를 보낸다.
//! 재시도는 없고 실패는 로그만 남긴다.
//! 성공 카운터는 단일 카운터 태스크만 쓰고 watch 채널로 발행한다.

use std::sync::Arc;
use std::time::Duration;

use depthcap_core::error::CoreError;
use depthcap_core::models::capture::{CaptureId, FinishedCapture};
use depthcap_core::models::upload::{UploadJob, UploadOutcome};
use depthcap_core::ports::sink::CaptureSink;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::multipart::{encode_multipart, generate_boundary};

/// 응답 JSON에 포함되어야 하는 성공 표시
const SUCCESS_MARKER: &str = "200";

/// 업로드 성공 판정
///
/// 서버는 `statusCode`를 문자열로 돌려주므로 직렬화된 JSON 전체에서 표시를 찾는다.
/// 본문 어딘가에 "200"이 있으면 HTTP 상태와 무관하게 성공으로 본다.
pub fn is_upload_success(response: &serde_json::Value) -> bool {
    response.to_string().contains(SUCCESS_MARKER)
}

/// 업로드 디스패처
pub struct UploadDispatcher {
    client: reqwest::Client,
    upload_url: String,
    limiter: Option<Arc<Semaphore>>,
    counter_tx: mpsc::UnboundedSender<CaptureId>,
    counter_rx: watch::Receiver<u64>,
}

impl UploadDispatcher {
    /// 새 디스패처 생성. 카운터 태스크를 띄우므로 tokio 런타임 안에서 호출해야 한다.
    ///
    /// `max_concurrent`가 `None`이면 동시 업로드 수를 제한하지 않는다.
    pub fn new(
        upload_url: &str,
        timeout: Duration,
        max_concurrent: Option<usize>,
    ) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {}", e)))?;

        let (counter_tx, counter_rx) = spawn_counter();

        Ok(Self {
            client,
            upload_url: upload_url.to_string(),
            limiter: max_concurrent.map(|n| Arc::new(Semaphore::new(n.max(1)))),
            counter_tx,
            counter_rx,
        })
    }

    /// 업로드 작업 제출. 반환된 핸들은 무시해도 된다.
    pub fn submit(&self, job: UploadJob) -> JoinHandle<UploadOutcome> {
        let client = self.client.clone();
        let url = self.upload_url.clone();
        let limiter = self.limiter.clone();
        let counter_tx = self.counter_tx.clone();

        tokio::spawn(async move {
            let _permit = match limiter {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            let outcome = post_job(&client, &url, &job).await;
            match &outcome {
                UploadOutcome::Uploaded => {
                    info!("이미지 업로드 성공: {}", job.filename);
                    let _ = counter_tx.send(job.capture_id);
                }
                UploadOutcome::Rejected { body } => {
                    warn!("이미지 업로드 거부: {}: {}", job.filename, body);
                }
                UploadOutcome::Failed { reason } => {
                    warn!("이미지 업로드 실패: {}: {}", job.filename, reason);
                }
            }
            outcome
        })
    }

    /// 성공 업로드 수 구독
    pub fn subscribe_counter(&self) -> watch::Receiver<u64> {
        self.counter_rx.clone()
    }

    pub fn uploaded_count(&self) -> u64 {
        *self.counter_rx.borrow()
    }
}

impl CaptureSink for UploadDispatcher {
    fn on_capture_finished(&self, capture: FinishedCapture) {
        let job = UploadJob::from_capture(capture, generate_boundary());
        debug!("업로드 작업 생성: {} ({} bytes)", job.filename, job.bytes.len());
        drop(self.submit(job));
    }
}

/// 단일 작성자 카운터 태스크
fn spawn_counter() -> (mpsc::UnboundedSender<CaptureId>, watch::Receiver<u64>) {
    let (report_tx, mut report_rx) = mpsc::unbounded_channel::<CaptureId>();
    let (count_tx, count_rx) = watch::channel(0u64);

    tokio::spawn(async move {
        let mut count = 0u64;
        while let Some(id) = report_rx.recv().await {
            count += 1;
            debug!("업로드 카운터 {} ({})", count, id);
            count_tx.send_replace(count);
        }
    });

    (report_tx, count_rx)
}

async fn post_job(client: &reqwest::Client, url: &str, job: &UploadJob) -> UploadOutcome {
    let body = encode_multipart(&[job.to_part()], &job.boundary);

    let resp = match client
        .post(url)
        .header(CONTENT_TYPE, job.content_type())
        .body(body)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            return UploadOutcome::Failed {
                reason: format!("업로드 요청 실패: {e}"),
            }
        }
    };

    let status = resp.status();
    let text = match resp.text().await {
        Ok(text) => text,
        Err(e) => {
            return UploadOutcome::Failed {
                reason: format!("응답 본문 읽기 실패 ({status}): {e}"),
            }
        }
    };

    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) if is_upload_success(&json) => UploadOutcome::Uploaded,
        Ok(json) => UploadOutcome::Rejected {
            body: json.to_string(),
        },
        Err(e) => UploadOutcome::Failed {
            reason: format!("응답 JSON 파싱 실패 ({status}): {e}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockito::Matcher;
    use serde_json::json;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn job(bytes: &[u8]) -> UploadJob {
        UploadJob::from_capture(
            FinishedCapture {
                id: CaptureId::new(),
                bytes: bytes.to_vec(),
                captured_at: Utc::now(),
            },
            generate_boundary(),
        )
    }

    fn dispatcher(server: &mockito::ServerGuard, cap: Option<usize>) -> UploadDispatcher {
        UploadDispatcher::new(
            &format!("{}/upload-image", server.url()),
            Duration::from_secs(5),
            cap,
        )
        .unwrap()
    }

    #[test]
    fn success_marker_heuristic() {
        assert!(is_upload_success(&json!({"statusCode": "200"})));
        assert!(is_upload_success(&json!({"statusCode": 200})));
        assert!(!is_upload_success(&json!({"statusCode": "500"})));
        // 의도적으로 느슨한 판정
        assert!(is_upload_success(&json!({"statusCode": "500", "id": "x2001"})));
    }

    #[tokio::test]
    async fn upload_success_increments_counter() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload-image")
            .match_header(
                "content-type",
                Matcher::Regex(r"^multipart/form-data; boundary=Boundary-[0-9A-F-]{36}$".into()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="file"; filename="[0-9A-F-]{36}\.heic""#.into()),
                Matcher::Regex("Content-Type: image/heic".into()),
                Matcher::Regex("photo-bytes".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"statusCode":"200"}"#)
            .create_async()
            .await;

        let dispatcher = dispatcher(&server, None);
        let mut counter = dispatcher.subscribe_counter();

        let outcome = dispatcher.submit(job(b"photo-bytes")).await.unwrap();
        assert_eq!(outcome, UploadOutcome::Uploaded);
        timeout(WAIT, counter.wait_for(|c| *c == 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dispatcher.uploaded_count(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn json_without_marker_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/upload-image")
            .with_status(200)
            .with_body(r#"{"statusCode":"500","message":"disk full"}"#)
            .create_async()
            .await;

        let dispatcher = dispatcher(&server, None);
        let outcome = dispatcher.submit(job(b"x")).await.unwrap();
        assert!(matches!(outcome, UploadOutcome::Rejected { .. }));
        tokio::task::yield_now().await;
        assert_eq!(dispatcher.uploaded_count(), 0);
    }

    #[tokio::test]
    async fn non_json_body_is_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/upload-image")
            .with_status(200)
            .with_body("OK 200")
            .create_async()
            .await;

        let dispatcher = dispatcher(&server, None);
        let outcome = dispatcher.submit(job(b"x")).await.unwrap();
        assert!(matches!(outcome, UploadOutcome::Failed { .. }));
        assert_eq!(dispatcher.uploaded_count(), 0);
    }

    #[tokio::test]
    async fn error_status_with_marker_still_counts() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/upload-image")
            .with_status(500)
            .with_body(r#"{"detail":"retry after 200 ms"}"#)
            .create_async()
            .await;

        let dispatcher = dispatcher(&server, None);
        let outcome = dispatcher.submit(job(b"x")).await.unwrap();
        assert_eq!(outcome, UploadOutcome::Uploaded);
    }

    #[tokio::test]
    async fn unreachable_server_is_failure() {
        let dispatcher = UploadDispatcher::new(
            "http://127.0.0.1:9/upload-image",
            Duration::from_secs(2),
            None,
        )
        .unwrap();
        let outcome = dispatcher.submit(job(b"x")).await.unwrap();
        assert!(matches!(outcome, UploadOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn concurrency_cap_still_delivers_all() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload-image")
            .with_status(200)
            .with_body(r#"{"statusCode":"200"}"#)
            .expect(3)
            .create_async()
            .await;

        let dispatcher = dispatcher(&server, Some(1));
        let handles: Vec<_> = (0..3).map(|_| dispatcher.submit(job(b"x"))).collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_uploaded());
        }

        let mut counter = dispatcher.subscribe_counter();
        timeout(WAIT, counter.wait_for(|c| *c == 3))
            .await
            .unwrap()
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sink_uploads_finished_capture() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/upload-image")
            .with_status(200)
            .with_body(r#"{"statusCode":"200"}"#)
            .create_async()
            .await;

        let dispatcher = dispatcher(&server, None);
        let mut counter = dispatcher.subscribe_counter();
        let sink: &dyn CaptureSink = &dispatcher;
        sink.on_capture_finished(FinishedCapture {
            id: CaptureId::new(),
            bytes: b"heic".to_vec(),
            captured_at: Utc::now(),
        });

        timeout(WAIT, counter.wait_for(|c| *c == 1))
            .await
            .unwrap()
            .unwrap();
    }
}
