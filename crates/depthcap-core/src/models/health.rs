//! 서버 생존 상태 모델.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 생존 프로브 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Alive,
    Offline,
}

impl HealthStatus {
    pub fn is_alive(self) -> bool {
        matches!(self, HealthStatus::Alive)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Alive => write!(f, "online"),
            HealthStatus::Offline => write!(f, "offline"),
        }
    }
}
