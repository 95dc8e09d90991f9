//! 분석 요청/측정 결과 모델.
//!
//! 서버 측 3D 재구성 파라미터와 측정 응답.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 재구성 상세 수준
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Preview,
    Reduced,
    #[default]
    Medium,
    Full,
    Raw,
}

impl DetailLevel {
    /// 쿼리 파라미터 값
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailLevel::Preview => "preview",
            DetailLevel::Reduced => "reduced",
            DetailLevel::Medium => "medium",
            DetailLevel::Full => "full",
            DetailLevel::Raw => "raw",
        }
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetailLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "preview" => Ok(DetailLevel::Preview),
            "reduced" => Ok(DetailLevel::Reduced),
            "medium" => Ok(DetailLevel::Medium),
            "full" => Ok(DetailLevel::Full),
            "raw" => Ok(DetailLevel::Raw),
            other => Err(CoreError::Config(format!("알 수 없는 상세 수준: {other}"))),
        }
    }
}

/// 특징점 민감도
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureSensitivity {
    #[default]
    Normal,
    High,
}

impl FeatureSensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureSensitivity::Normal => "normal",
            FeatureSensitivity::High => "high",
        }
    }
}

impl fmt::Display for FeatureSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureSensitivity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(FeatureSensitivity::Normal),
            "high" => Ok(FeatureSensitivity::High),
            other => Err(CoreError::Config(format!("알 수 없는 민감도: {other}"))),
        }
    }
}

/// 분석 요청 파라미터
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub detail_level: DetailLevel,
    pub feature_sensitivity: FeatureSensitivity,
}

/// 서버 측정 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementResult {
    /// 응답 상태 코드 (서버는 숫자 또는 숫자 문자열로 보낸다)
    #[serde(deserialize_with = "status_code_from_number_or_string")]
    pub status_code: u16,
    /// 적용된 상세 수준
    pub detail_level: String,
    /// 적용된 특징점 민감도
    pub feature_sensitivity: String,
    /// 측정 부피 (cm³)
    pub volume_in_cm3: f64,
    /// 재구성 소요 시간 (초)
    pub measurement_time_in_sec: f64,
    /// 입력 이미지 수
    pub number_input_images: u32,
}

impl MeasurementResult {
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// `statusCode`를 숫자 또는 문자열에서 읽는다
fn status_code_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u16),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_level_parse() {
        assert_eq!("Medium".parse::<DetailLevel>().unwrap(), DetailLevel::Medium);
        assert_eq!("raw".parse::<DetailLevel>().unwrap(), DetailLevel::Raw);
        assert!("ultra".parse::<DetailLevel>().is_err());
        assert_eq!(DetailLevel::default().as_str(), "medium");
    }

    #[test]
    fn sensitivity_parse() {
        assert_eq!(
            "HIGH".parse::<FeatureSensitivity>().unwrap(),
            FeatureSensitivity::High
        );
        assert_eq!(FeatureSensitivity::default().to_string(), "normal");
    }

    #[test]
    fn measurement_accepts_numeric_status() {
        let json = r#"{"statusCode":200,"detailLevel":"medium","featureSensitivity":"normal",
            "volumeInCm3":182.4,"measurementTimeInSec":95.2,"numberInputImages":24}"#;
        let result: MeasurementResult = serde_json::from_str(json).unwrap();
        assert!(result.is_success());
        assert_eq!(result.number_input_images, 24);
    }

    #[test]
    fn measurement_accepts_string_status() {
        let json = r#"{"statusCode":"500","detailLevel":"full","featureSensitivity":"high",
            "volumeInCm3":0.0,"measurementTimeInSec":1.0,"numberInputImages":0}"#;
        let result: MeasurementResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.status_code, 500);
        assert!(!result.is_success());
    }
}
