//! 업로드 모델.
//!
//! 멀티파트 파일 필드와 촬영 1장당 생성되는 업로드 작업.

use serde::{Deserialize, Serialize};

use crate::models::capture::{CaptureId, FinishedCapture};

/// 업로드 파일 필드명
pub const UPLOAD_FIELD_NAME: &str = "file";

/// HEIC MIME 타입
pub const HEIC_MIME_TYPE: &str = "image/heic";

/// 멀티파트 본문의 파일 파트 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFieldPart {
    /// 폼 필드명
    pub field_name: String,
    /// 파일명
    pub filename: String,
    /// MIME 타입
    pub mime_type: String,
    /// 원본 바이트
    pub bytes: Vec<u8>,
}

impl FileFieldPart {
    pub fn new(
        field_name: impl Into<String>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

/// 업로드 작업. 요청/응답 한 번으로 끝나며 재시도 상태를 갖지 않는다
#[derive(Debug, Clone)]
pub struct UploadJob {
    /// 원본 촬영 ID
    pub capture_id: CaptureId,
    /// 이미지 바이트
    pub bytes: Vec<u8>,
    /// 생성된 파일명 (`<id>.heic`)
    pub filename: String,
    /// 폼 필드명 (`file`)
    pub field_name: String,
    /// 멀티파트 경계 토큰
    pub boundary: String,
}

impl UploadJob {
    /// 완료된 촬영에서 업로드 작업 생성 (경계 토큰은 호출자가 생성)
    pub fn from_capture(capture: FinishedCapture, boundary: String) -> Self {
        Self {
            capture_id: capture.id,
            filename: format!("{}.heic", capture.id),
            field_name: UPLOAD_FIELD_NAME.to_string(),
            bytes: capture.bytes,
            boundary,
        }
    }

    /// 이 작업의 파일 파트
    pub fn to_part(&self) -> FileFieldPart {
        FileFieldPart::new(
            self.field_name.clone(),
            self.filename.clone(),
            HEIC_MIME_TYPE,
            self.bytes.clone(),
        )
    }

    /// 요청 Content-Type 헤더 값
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

/// 업로드 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadOutcome {
    /// 성공 표시("200")가 응답에 포함됨
    Uploaded,
    /// JSON 응답이지만 성공 표시가 없음
    Rejected { body: String },
    /// 네트워크 또는 파싱 실패
    Failed { reason: String },
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn job_from_capture() {
        let id = CaptureId::new();
        let job = UploadJob::from_capture(
            FinishedCapture {
                id,
                bytes: vec![1, 2, 3],
                captured_at: Utc::now(),
            },
            "Boundary-X".to_string(),
        );
        assert_eq!(job.filename, format!("{id}.heic"));
        assert_eq!(job.field_name, "file");
        assert_eq!(job.content_type(), "multipart/form-data; boundary=Boundary-X");

        let part = job.to_part();
        assert_eq!(part.mime_type, "image/heic");
        assert_eq!(part.bytes, vec![1, 2, 3]);
    }
}
