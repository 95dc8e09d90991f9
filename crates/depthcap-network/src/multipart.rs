//! multipart/form-data 본문 인코더.
//!
//! 순수 함수. 경계 토큰은 호출자가 [`generate_boundary`]로 만든다.

use depthcap_core::models::upload::FileFieldPart;
use uuid::Uuid;

const CRLF: &[u8] = b"\r\n";

/// `Boundary-<UUID>` 형식의 경계 토큰 생성
pub fn generate_boundary() -> String {
    format!(
        "Boundary-{}",
        Uuid::new_v4().as_hyphenated().to_string().to_uppercase()
    )
}

/// 파트 목록을 멀티파트 본문으로 인코딩
pub fn encode_multipart(parts: &[FileFieldPart], boundary: &str) -> Vec<u8> {
    let payload: usize = parts.iter().map(|p| p.bytes.len() + 160).sum();
    let mut body = Vec::with_capacity(payload + boundary.len() + 8);

    for part in parts {
        body.extend_from_slice(format!("--{boundary}").as_bytes());
        body.extend_from_slice(CRLF);
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"",
                part.field_name, part.filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(CRLF);
        body.extend_from_slice(format!("Content-Type: {}", part.mime_type).as_bytes());
        body.extend_from_slice(CRLF);
        body.extend_from_slice(CRLF);
        body.extend_from_slice(&part.bytes);
        body.extend_from_slice(CRLF);
    }

    body.extend_from_slice(format!("--{boundary}--").as_bytes());
    body.extend_from_slice(CRLF);
    body
}
