//! 분석 요청 및 3D 모델 다운로드.
//!
//! 업로드가 끝난 뒤 서버에 재구성/측정을 요청하고,
//! 재구성된 메시 파일을 스트리밍으로 내려받는다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use depthcap_core::error::CoreError;
use depthcap_core::models::analysis::{AnalysisRequest, MeasurementResult};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// 다운로드한 메시 파일 이름
pub const MODEL_FILE_NAME: &str = "baked_mesh.obj";

/// 분석/모델 클라이언트
pub struct AnalysisClient {
    client: reqwest::Client,
    analyse_url: String,
    model_url: String,
}

impl AnalysisClient {
    /// `timeout`은 재구성 시간을 감안해 길게 잡는다 (기본 45분)
    pub fn new(analyse_url: &str, model_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {}", e)))?;

        Ok(Self {
            client,
            analyse_url: analyse_url.to_string(),
            model_url: model_url.to_string(),
        })
    }

    /// 업로드된 이미지로 분석 실행
    pub async fn analyse(&self, request: AnalysisRequest) -> Result<MeasurementResult, CoreError> {
        info!(
            "분석 요청: dl={} fs={}",
            request.detail_level, request.feature_sensitivity
        );

        let resp = self
            .client
            .get(&self.analyse_url)
            .query(&[
                ("dl", request.detail_level.as_str()),
                ("fs", request.feature_sensitivity.as_str()),
            ])
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("분석 요청 실패: {e}")))?;

        let text = resp
            .text()
            .await
            .map_err(|e| CoreError::Network(format!("분석 응답 읽기 실패: {e}")))?;
        let json: Value = serde_json::from_str(&text)?;

        match status_code(&json) {
            Some(200) => {}
            code => {
                let message = json
                    .get("errorMessage")
                    .and_then(Value::as_str)
                    .unwrap_or("알 수 없는 에러");
                warn!("분석 실패 ({:?}): {}", code, message);
                return Err(CoreError::Internal(format!(
                    "분석 실패 ({}): {}",
                    code.map_or_else(|| "-".to_string(), |c| c.to_string()),
                    message
                )));
            }
        }

        let result: MeasurementResult = serde_json::from_value(json)?;
        info!(
            "분석 완료: {:.1} cm3, {:.1}초, 이미지 {}장",
            result.volume_in_cm3, result.measurement_time_in_sec, result.number_input_images
        );
        Ok(result)
    }

    /// 재구성된 메시를 `dest_dir/baked_mesh.obj`로 스트리밍 저장
    ///
    /// 중간 실패 시 기존 파일은 건드리지 않는다.
    pub async fn download_model(&self, dest_dir: &Path) -> Result<PathBuf, CoreError> {
        let resp = self
            .client
            .get(&self.model_url)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("모델 다운로드 요청 실패: {e}")))?;

        if !resp.status().is_success() {
            return Err(CoreError::Network(format!(
                "모델 다운로드 실패: HTTP {}",
                resp.status()
            )));
        }

        fs::create_dir_all(dest_dir).await?;
        let target = dest_dir.join(MODEL_FILE_NAME);
        let partial = dest_dir.join(format!("{MODEL_FILE_NAME}.part"));

        let written = match stream_to_file(resp, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        fs::rename(&partial, &target).await?;

        info!("모델 다운로드 완료: {} ({} bytes)", target.display(), written);
        Ok(target)
    }
}

async fn stream_to_file(resp: reqwest::Response, path: &Path) -> Result<u64, CoreError> {
    let mut file = fs::File::create(path).await?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| CoreError::Network(format!("모델 수신 중단: {e}")))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    debug!("모델 스트림 {} bytes 기록", written);
    Ok(written)
}

/// `statusCode`를 숫자 또는 숫자 문자열에서 읽는다
fn status_code(json: &Value) -> Option<u64> {
    match json.get("statusCode")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
