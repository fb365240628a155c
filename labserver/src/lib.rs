//! 랩 채팅 서버 라이브러리
//!
//! 실습실용 텍스트 채팅 중계 서버입니다. 교사 프로세스 하나가 여러 학생의 TCP 연결을
//! 받아 신원을 기록하고, 메시지를 학생 한 명 또는 전원에게 전달합니다.
//!
//! # 주요 기능
//!
//! - **연결 레지스트리**: 고유 ID 할당, 생존 추적, 일관된 스냅샷
//! - **메시지 라우팅**: 1:1 답장, 전체 공지, 강제 퇴장
//! - **라인 프레이밍**: 나눠 도착한 라인 재조립과 제어 문자 정제
//! - **세션 로그**: 입장부터 퇴장까지 순서 있는 기록
//! - **운영자 콘솔**: 대시보드와 명령 셸
//!
//! # 아키텍처
//!
//! ```text
//! Lab Server
//! ├── Service Layer (핵심 로직)
//! │   ├── LabService (세션 객체, 순서 있는 종료)
//! │   ├── ClientRegistry (연결 레지스트리)
//! │   ├── Router (1:1 / 전체 / 강제 퇴장)
//! │   ├── Acceptor (연결 수락 루프)
//! │   └── SessionLog (세션 로그)
//! ├── Handler Layer (요청 처리)
//! │   ├── ConnectionHandler (학생 연결 상태 기계)
//! │   └── ConsoleHandler (운영자 콘솔)
//! ├── Tool Layer (유틸리티)
//! │   ├── SimpleUtils (문자열/시각 유틸)
//! │   └── Error (에러 처리)
//! └── Protocol (와이어 프로토콜)
//!     ├── ServerMessage (서버 → 학생 라인)
//!     └── LineFramer (학생 → 서버 라인 재조립)
//! ```
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! use labserver::{LabServerConfig, LabService};
//!
//! let service = LabService::bind(LabServerConfig::default()).await?;
//! service.start()?;
//!
//! // 전체 공지
//! let delivered = service.broadcast("hello").await;
//!
//! // 1:1 답장
//! service.reply(1, "good job").await?;
//! ```

/// 환경 설정 관리
///
/// 서버 실행에 필요한 환경변수 및 설정을 관리합니다.
pub mod config;

/// 와이어 프로토콜 정의
///
/// 서버 메시지 라인과 수신 라인 프레이머를 정의합니다.
pub mod protocol;

/// 핵심 서비스 레이어
///
/// 레지스트리, 라우터, 세션 로그, 연결 수락, 세션 객체를 포함합니다.
pub mod service;

/// 요청 처리 핸들러 레이어
///
/// 학생 연결 생명주기와 운영자 콘솔을 처리합니다.
pub mod handler;

/// 공통 유틸리티 도구들
pub mod tool;

#[cfg(test)]
mod tests;

// 주요 타입들 재노출
pub use config::{validate_config, AdmissionMode, LabServerConfig};
pub use handler::{ConnectionHandler, ConsoleHandler};
pub use protocol::{FramedReader, LineFramer, MessageKind, ServerMessage};
pub use service::{
    ClientRegistry, ClientSummary, DisconnectReason, LabService, RegistryStats, Router, Sent,
    SessionEvent, SessionLog, SessionLogEntry,
};
pub use tool::{LabResult, LabServerError, SimpleUtils, StreamClosed};
