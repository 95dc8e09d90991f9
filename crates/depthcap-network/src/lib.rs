//! # depthcap-network
//!
//! 처리 서버와의 HTTP 통신 어댑터.
//! 촬영 이미지를 멀티파트로 업로드하고, 서버 생존을 확인하며,
//! 분석 요청과 재구성된 3D 모델 다운로드를 담당한다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use depthcap_network::upload_dispatcher::UploadDispatcher;
//! use depthcap_network::health::HttpHealthGate;
//!
//! let dispatcher = UploadDispatcher::new(&config.upload_url(), config.request_timeout(), None)?;
//! let gate = HttpHealthGate::new(&config.alive_url(), config.request_timeout())?;
//! ```

pub mod analysis_client;
pub mod health;
pub mod multipart;
pub mod upload_dispatcher;
