//! 설정 파일 관리.
//!
//! `AppConfig`를 JSON 파일 하나로 보관한다. 파일이 없으면 기본값으로 만들고,
//! 저장은 임시 파일에 쓴 뒤 이름을 바꿔서 중간에 끊겨도 기존 파일이 남는다.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::CoreError;

const CONFIG_FILE_NAME: &str = "config.json";
const MODEL_DIR_NAME: &str = "models";

/// 디스크 위의 설정 파일
#[derive(Debug, Clone)]
struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    /// 파일이 없으면 `None`
    fn read(&self) -> Result<Option<AppConfig>, CoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error("읽기", e)),
        };
        let config = serde_json::from_str(&text).map_err(|e| self.error("파싱", e))?;
        debug!("설정 로드: {}", self.path.display());
        Ok(Some(config))
    }

    fn write(&self, config: &AppConfig) -> Result<(), CoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| self.error("디렉토리 생성", e))?;
                info!("설정 디렉토리 생성: {}", dir.display());
            }
        }

        let text = serde_json::to_string_pretty(config).map_err(|e| self.error("직렬화", e))?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, text).map_err(|e| self.error("저장", e))?;
        fs::rename(&staging, &self.path).map_err(|e| {
            if let Err(cleanup) = fs::remove_file(&staging) {
                warn!("임시 설정 파일 삭제 실패: {}: {}", staging.display(), cleanup);
            }
            self.error("교체", e)
        })
    }

    fn error(&self, action: &str, cause: impl std::fmt::Display) -> CoreError {
        CoreError::Config(format!(
            "설정 파일 {action} 실패: {}: {cause}",
            self.path.display()
        ))
    }
}

/// 런타임 설정 보관소
///
/// 복제해도 같은 설정을 공유한다.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    current: Arc<RwLock<AppConfig>>,
    file: ConfigFile,
}

impl ConfigManager {
    /// 플랫폼 설정 디렉토리의 `config.json` 사용
    pub fn new() -> Result<Self, CoreError> {
        Self::with_path(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// 지정된 파일 사용. 없으면 기본 설정으로 만든다.
    pub fn with_path(path: PathBuf) -> Result<Self, CoreError> {
        let file = ConfigFile { path };
        let config = match file.read()? {
            Some(config) => config,
            None => {
                let config = AppConfig::default_config();
                file.write(&config)?;
                info!("기본 설정 파일 생성: {}", file.path.display());
                config
            }
        };
        Ok(Self {
            current: Arc::new(RwLock::new(config)),
            file,
        })
    }

    pub fn get(&self) -> AppConfig {
        self.current.read().clone()
    }

    /// 설정 전체 교체
    pub fn update(&self, config: AppConfig) -> Result<(), CoreError> {
        self.update_with(move |current| *current = config).map(drop)
    }

    /// 현재 설정을 고쳐서 저장. 파일 저장에 실패하면 메모리도 그대로다.
    pub fn update_with<F>(&self, edit: F) -> Result<AppConfig, CoreError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut current = self.current.write();
        let mut next = current.clone();
        edit(&mut next);
        self.file.write(&next)?;
        *current = next.clone();
        debug!("설정 저장: {}", self.file.path.display());
        Ok(next)
    }

    pub fn config_path(&self) -> &Path {
        &self.file.path
    }

    /// 파일에서 다시 읽는다. 그사이 파일이 사라졌으면 에러.
    pub fn reload(&self) -> Result<AppConfig, CoreError> {
        let config = self
            .file
            .read()?
            .ok_or_else(|| self.file.error("읽기", "파일 없음"))?;
        *self.current.write() = config.clone();
        info!("설정 다시 로드: {}", self.file.path.display());
        Ok(config)
    }

    /// 3D 모델 저장 디렉토리. 설정값이 없으면 플랫폼 데이터 디렉토리 아래.
    pub fn model_dir(&self) -> Result<PathBuf, CoreError> {
        if let Some(dir) = &self.current.read().analysis.model_dir {
            return Ok(dir.clone());
        }
        Ok(project_dirs()?.data_dir().join(MODEL_DIR_NAME))
    }

    pub fn config_dir() -> Result<PathBuf, CoreError> {
        Ok(project_dirs()?.config_dir().to_path_buf())
    }
}

fn project_dirs() -> Result<ProjectDirs, CoreError> {
    ProjectDirs::from("com", "depthcap", "depthcap")
        .ok_or_else(|| CoreError::Config("홈 디렉토리를 찾을 수 없습니다".to_string()))
}
