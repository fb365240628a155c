//! 공통 에러 처리 시스템
//!
//! 랩 서버에서 발생하는 모든 에러를 체계적으로 분류하고 심각도별로 로깅합니다.
//!
//! # 에러 분류
//!
//! - **StreamClosed**: 학생 연결 종료 (정상/비정상). 해당 연결만 정리됩니다.
//! - **Unreachable**: 라우팅 대상에게 메시지를 전달할 수 없음. 운영자에게 보고됩니다.
//! - **DuplicateId**: 내부 불변식 위반. 할당기가 올바르면 절대 발생하지 않습니다.
//! - **AdmissionClosed**: 종료 중이라 새 학생을 등록하지 않음. 해당 연결만 닫힙니다.
//! - **BindFailure**: 리스닝 소켓을 열 수 없음. 프로세스 전체가 종료됩니다.

use std::io;
use thiserror::Error;
use tracing::{error, info, warn};

/// 스트림 종료 원인
///
/// 로깅 목적으로만 정상 종료와 비정상 종료를 구분합니다.
/// 두 경우 모두 재시도 없이 연결을 닫습니다.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamClosed {
    /// 상대방이 연결을 정상 종료함 (0바이트 읽기)
    #[error("상대방이 연결을 종료했습니다")]
    Orderly,

    /// 읽기 에러로 인한 비정상 종료
    #[error("연결이 비정상 종료되었습니다: {0}")]
    Abrupt(String),
}

/// 랩 서버 에러 타입
#[derive(Debug, Error)]
pub enum LabServerError {
    #[error("스트림 종료: {0}")]
    StreamClosed(#[from] StreamClosed),

    #[error("학생 #{client_id}에게 메시지를 전달할 수 없습니다")]
    Unreachable { client_id: u32 },

    #[error("쓰기 시간 초과 ({timeout_ms}ms)")]
    WriteTimeout { timeout_ms: u64 },

    #[error("이미 닫힌 연결입니다")]
    TransportClosed,

    #[error("중복된 클라이언트 ID: {0}")]
    DuplicateId(u32),

    #[error("입장이 마감되어 학생 #{client_id}를 등록하지 않습니다")]
    AdmissionClosed { client_id: u32 },

    #[error("리스너 바인드 실패 [{addr}]: {source}")]
    BindFailure {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("설정 에러 [키: {key}]: {message}")]
    Configuration { key: String, message: String },

    #[error("I/O 에러: {0}")]
    Io(#[from] io::Error),
}

impl LabServerError {
    /// 에러 종류에 따른 기본 심각도
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::StreamClosed(_) | Self::TransportClosed | Self::AdmissionClosed { .. } => {
                ErrorSeverity::Info
            }
            Self::Unreachable { .. } | Self::WriteTimeout { .. } => ErrorSeverity::Warning,
            Self::Io(_) => ErrorSeverity::Error,
            Self::DuplicateId(_) | Self::BindFailure { .. } | Self::Configuration { .. } => {
                ErrorSeverity::Critical
            }
        }
    }
}

/// 에러 심각도 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// 정보성 - 정상 동작 중 발생하는 예상 가능한 상황
    Info,
    /// 경고 - 주의가 필요하지만 서비스는 계속 가능
    Warning,
    /// 에러 - 기능에 영향을 주지만 복구 가능
    Error,
    /// 치명적 - 로직 버그 또는 서비스 중단이 필요한 심각한 문제
    Critical,
}

/// 에러 핸들러
///
/// 모든 에러를 중앙에서 로깅합니다. 연결 단위 에러는 여기서 기록된 뒤
/// 해당 연결 안에서만 처리되고 다른 컴포넌트로 전파되지 않습니다.
pub struct ErrorHandler;

impl ErrorHandler {
    /// 에러를 지정한 심각도로 로깅합니다.
    ///
    /// # Arguments
    ///
    /// * `error` - 처리할 에러
    /// * `severity` - 에러 심각도
    /// * `component` - 에러가 발생한 컴포넌트
    /// * `operation` - 에러가 발생한 작업
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let error = LabServerError::Unreachable { client_id: 5 };
    /// ErrorHandler::handle_error(&error, ErrorSeverity::Warning, "Router", "unicast");
    /// ```
    pub fn handle_error(
        error: &LabServerError,
        severity: ErrorSeverity,
        component: &str,
        operation: &str,
    ) {
        let log_message = format!("[{}] [{}] {}", component, operation, error);

        match severity {
            ErrorSeverity::Info => info!("{}", log_message),
            ErrorSeverity::Warning => warn!("{}", log_message),
            ErrorSeverity::Error => error!("{}", log_message),
            ErrorSeverity::Critical => {
                error!("🚨 CRITICAL: {}", log_message);
            }
        }
    }

}

/// 결과 타입 별칭
pub type LabResult<T> = Result<T, LabServerError>;
