//! 랩 서버 서비스 모듈
//!
//! 클라이언트 레지스트리, 라우팅, 세션 로그, 연결 수락, 세션 객체를 제공합니다.

pub mod acceptor;
pub mod client_registry;
pub mod client_transport;
pub mod lab_service;
pub mod router;
pub mod session_log;

pub use acceptor::{bind_listener, Acceptor};
pub use client_registry::{ClientRecord, ClientRegistry, ClientSummary, RegistryStats};
pub use client_transport::{ClientTransport, DisconnectReason};
pub use lab_service::LabService;
pub use router::{Router, Sent};
pub use session_log::{SessionEvent, SessionLog, SessionLogEntry};
