//! 서버 생존 확인.
//!
//! `HealthProbe` 포트 구현. `GET /alive`가 200으로 응답하면 온라인이다.

use std::time::Duration;

use async_trait::async_trait;
use depthcap_core::error::CoreError;
use depthcap_core::models::health::HealthStatus;
use depthcap_core::ports::health::HealthProbe;
use reqwest::StatusCode;
use tracing::{debug, warn};

/// HTTP 생존 프로브
pub struct HttpHealthGate {
    client: reqwest::Client,
    alive_url: String,
}

impl HttpHealthGate {
    pub fn new(alive_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {}", e)))?;

        Ok(Self {
            client,
            alive_url: alive_url.to_string(),
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthGate {
    async fn probe(&self) -> HealthStatus {
        let resp = match self.client.get(&self.alive_url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("서버 생존 확인 실패: {}", e);
                return HealthStatus::Offline;
            }
        };

        if resp.status() != StatusCode::OK {
            warn!("서버 생존 확인 비정상 응답: {}", resp.status());
            return HealthStatus::Offline;
        }

        match resp.bytes().await {
            Ok(body) => {
                debug!("서버 온라인 ({} bytes)", body.len());
                HealthStatus::Alive
            }
            Err(e) => {
                warn!("서버 생존 응답 읽기 실패: {}", e);
                HealthStatus::Offline
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(server: &mockito::ServerGuard) -> HttpHealthGate {
        HttpHealthGate::new(&format!("{}/alive", server.url()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn ok_is_alive() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/alive")
            .with_status(200)
            .with_body(r#"{"statusCode":"200"}"#)
            .create_async()
            .await;

        assert_eq!(gate(&server).probe().await, HealthStatus::Alive);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_offline() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/alive")
            .with_status(503)
            .create_async()
            .await;

        assert_eq!(gate(&server).probe().await, HealthStatus::Offline);
    }

    #[tokio::test]
    async fn unreachable_is_offline() {
        let gate = HttpHealthGate::new("http://127.0.0.1:9/alive", Duration::from_secs(2)).unwrap();
        assert_eq!(gate.probe().await, HealthStatus::Offline);
    }

    #[test]
    fn liveness_check_from_sync_context() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/alive").with_status(200).with_body("{}").create();
        let gate = HttpHealthGate::new(&format!("{}/alive", server.url()), Duration::from_secs(5)).unwrap();

        let status = tokio_test::block_on(gate.probe());
        assert!(status.is_alive());
    }
}
