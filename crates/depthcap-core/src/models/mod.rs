//! depthcap 도메인 모델.
//!
//! 촬영 파이프라인, 업로드, 분석 요청에서 공유하는 데이터 구조체를 정의한다.

pub mod analysis;
pub mod capture;
pub mod health;
pub mod upload;
