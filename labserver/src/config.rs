//! 랩 서버 환경 설정 모듈
//!
//! .env 파일과 시스템 환경변수에서 설정을 로드하고 검증합니다.

use anyhow::Result;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::time::Duration;

use crate::tool::error::LabServerError;

/// 로그 레벨 환경변수 키 (`RUST_LOG`가 없을 때 사용)
pub const LOG_LEVEL_KEY: &str = "lab_log_level";

/// 입장 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionMode {
    /// 이름 프롬프트를 보내고 한 줄 읽기
    #[default]
    Prompt,
    /// 프롬프트 없이 클라이언트가 처음 보낸 줄을 이름으로 사용
    Unprompted,
    /// 읽지 않고 항상 `Student<id>` 이름 생성
    AutoName,
}

impl FromStr for AdmissionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" => Ok(Self::Prompt),
            "unprompted" => Ok(Self::Unprompted),
            "auto" | "autoname" => Ok(Self::AutoName),
            other => Err(format!(
                "알 수 없는 입장 방식: {} (prompt | unprompted | auto)",
                other
            )),
        }
    }
}

impl fmt::Display for AdmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prompt => write!(f, "prompt"),
            Self::Unprompted => write!(f, "unprompted"),
            Self::AutoName => write!(f, "auto"),
        }
    }
}

/// 랩 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct LabServerConfig {
    /// 리스닝 호스트 주소
    pub host: String,
    /// 리스닝 포트 번호
    pub port: u16,
    /// listen 백로그
    pub backlog: u32,
    /// 입장 방식
    pub admission_mode: AdmissionMode,
    /// 입장 시 이름 읽기 제한 시간 (밀리초)
    pub admission_timeout_ms: u64,
    /// 소켓 쓰기 제한 시간 (밀리초)
    pub write_timeout_ms: u64,
    /// 구분자 없는 라인의 최대 바이트 수
    pub max_line_bytes: usize,
    /// 표시 이름 최대 문자 수
    pub max_name_len: usize,
    /// 퇴장한 학생 레코드를 정리 전까지 보존
    pub retain_dead_records: bool,
    /// 종료 시 전체 공지 문구
    pub farewell: String,
    /// 종료 시 연결 핸들러 대기 제한 시간 (밀리초)
    pub drain_timeout_ms: u64,
}

impl Default for LabServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            backlog: 50,
            admission_mode: AdmissionMode::Prompt,
            admission_timeout_ms: 5000,
            write_timeout_ms: 2000,
            max_line_bytes: 1024,
            max_name_len: 32,
            retain_dead_records: false,
            farewell: "Lab complete - Goodbye everyone!".to_string(),
            drain_timeout_ms: 3000,
        }
    }
}

impl LabServerConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. 시스템 환경변수 (`main`에서 미리 로드한 .env 포함)
    /// 2. 기본값
    ///
    /// 값이 있지만 해석할 수 없으면 에러입니다. 조용히 기본값으로 대체하지 않습니다.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 키 조회 함수로 설정을 구성합니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            host: lookup("lab_host").unwrap_or(defaults.host),
            port: parse_key(&lookup, "lab_port", defaults.port)?,
            backlog: parse_key(&lookup, "lab_backlog", defaults.backlog)?,
            admission_mode: parse_key(&lookup, "lab_admission_mode", defaults.admission_mode)?,
            admission_timeout_ms: parse_key(
                &lookup,
                "lab_admission_timeout_ms",
                defaults.admission_timeout_ms,
            )?,
            write_timeout_ms: parse_key(&lookup, "lab_write_timeout_ms", defaults.write_timeout_ms)?,
            max_line_bytes: parse_key(&lookup, "lab_max_line_bytes", defaults.max_line_bytes)?,
            max_name_len: parse_key(&lookup, "lab_max_name_len", defaults.max_name_len)?,
            retain_dead_records: parse_key(&lookup, "lab_retain_dead", defaults.retain_dead_records)?,
            farewell: lookup("lab_farewell").unwrap_or(defaults.farewell),
            drain_timeout_ms: parse_key(&lookup, "lab_drain_timeout_ms", defaults.drain_timeout_ms)?,
        };

        Ok(config)
    }

    /// 리스닝 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn admission_timeout(&self) -> Duration {
        Duration::from_millis(self.admission_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// .env 파일을 로드합니다.
    ///
    /// 로깅 초기화 전에 호출되므로 찾은 경로를 반환하고 로깅은 호출자가 합니다.
    pub fn load_env_file() -> Option<&'static str> {
        // 여러 위치에서 .env 파일 찾기
        let env_paths = [
            "../.env",    // 상위 디렉토리
            ".env",       // 현재 디렉토리
            "../../.env", // 상위의 상위 디렉토리 (프로젝트 루트)
        ];

        env_paths
            .into_iter()
            .find(|path| Path::new(path).exists() && dotenv::from_filename(path).is_ok())
    }
}

fn parse_key<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            anyhow::Error::from(LabServerError::Configuration {
                key: key.to_string(),
                message: format!("'{}' 해석 실패: {}", raw, e),
            })
        }),
    }
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &LabServerConfig) -> Result<()> {
    // 포트 범위 검증 - u16 최대값은 65535이므로 0만 확인
    if config.port == 0 {
        anyhow::bail!("유효하지 않은 포트 번호: {}", config.port);
    }

    if config.host.trim().is_empty() {
        anyhow::bail!("호스트 주소가 비어있습니다");
    }

    if config.backlog == 0 {
        anyhow::bail!("listen 백로그는 0보다 커야 합니다");
    }

    if config.admission_timeout_ms == 0
        || config.write_timeout_ms == 0
        || config.drain_timeout_ms == 0
    {
        anyhow::bail!("제한 시간 설정은 0보다 커야 합니다");
    }

    if config.max_line_bytes == 0 {
        anyhow::bail!("최대 라인 길이는 0보다 커야 합니다");
    }

    if config.max_name_len == 0 {
        anyhow::bail!("최대 이름 길이는 0보다 커야 합니다");
    }

    if config.farewell.trim().is_empty() {
        anyhow::bail!("종료 공지 문구가 비어있습니다");
    }

    Ok(())
}
