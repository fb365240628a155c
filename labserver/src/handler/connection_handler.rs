//! 연결 핸들러
//!
//! 학생 연결 하나의 전체 생명주기를 담당합니다.
//!
//! ```text
//! Connecting → Admitting → Active → Closing → Closed
//! ```
//!
//! - **Admitting**: ID 할당 후 입장 방식에 따라 이름을 받습니다. 입장은 거부되지 않지만,
//!   서버 종료로 입장이 마감되면 등록 없이 바로 닫힙니다.
//! - **Active**: 레코드 등록, 환영 메시지 전송 후 수신 라인을 세션 로그로 전달합니다.
//! - **Closing**: 사망 처리, 쓰기 측 종료, 퇴장 기록.
//! - **Closed**: 종료 상태. 다시 살아나지 않습니다.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::{AdmissionMode, LabServerConfig};
use crate::protocol::{FramedReader, ServerMessage};
use crate::service::client_registry::{ClientRecord, ClientRegistry};
use crate::service::client_transport::{ClientTransport, DisconnectReason};
use crate::service::session_log::{SessionEvent, SessionLog};
use crate::tool::error::{ErrorHandler, ErrorSeverity, LabResult, LabServerError};
use crate::tool::SimpleUtils;

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Admitting,
    Active,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "Connecting",
            Self::Admitting => "Admitting",
            Self::Active => "Active",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
        };
        write!(f, "{}", name)
    }
}

/// 연결 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOutcome {
    pub client_id: u32,
    pub display_name: String,
    pub reason: DisconnectReason,
    pub final_state: ConnectionState,
    pub messages_received: u64,
}

/// 입력 이름을 표시 이름으로 확정합니다.
///
/// 비었거나 없으면 `Student<id>`, 길면 `max_len` 문자에서 자릅니다.
pub fn resolve_display_name(client_id: u32, supplied: Option<&str>, max_len: usize) -> String {
    match supplied.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => SimpleUtils::truncate_chars(name, max_len),
        None => format!("Student{}", client_id),
    }
}

/// 연결 핸들러
#[derive(Debug, Clone)]
pub struct ConnectionHandler {
    registry: Arc<ClientRegistry>,
    session_log: Arc<SessionLog>,
    config: LabServerConfig,
}

impl ConnectionHandler {
    /// 새로운 연결 핸들러 생성
    pub fn new(
        registry: Arc<ClientRegistry>,
        session_log: Arc<SessionLog>,
        config: LabServerConfig,
    ) -> Self {
        Self {
            registry,
            session_log,
            config,
        }
    }

    /// 연결 하나를 종료될 때까지 처리합니다.
    ///
    /// 연결 단위 에러는 여기서 끝나며 호출자에게는 결과만 전달됩니다.
    /// `Err`는 레코드 등록이 실패한 내부 불변식 위반뿐입니다.
    pub async fn handle_connection<S>(
        &self,
        stream: S,
        remote_addr: SocketAddr,
    ) -> LabResult<ConnectionOutcome>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut state = ConnectionState::Connecting;
        let (read_half, write_half) = tokio::io::split(stream);
        let transport = ClientTransport::new(write_half);
        let mut reader = FramedReader::new(read_half, self.config.max_line_bytes);

        let client_id = self.registry.allocate();
        Self::transition(client_id, &mut state, ConnectionState::Admitting);

        let admitted = tokio::select! {
            biased;

            _ = self.registry.admissions_closed() => None,
            supplied = self.admit(client_id, &transport, &mut reader) => Some(supplied),
        };
        let Some(supplied) = admitted else {
            debug!("학생 #{} 입장 중 서버 종료", client_id);
            return Ok(self.abandon(client_id, None, &transport, state).await);
        };
        let display_name =
            resolve_display_name(client_id, supplied.as_deref(), self.config.max_name_len);

        let record = ClientRecord::new(
            client_id,
            remote_addr,
            display_name.clone(),
            transport.clone(),
        );
        if let Err(e) = self.registry.register(record) {
            ErrorHandler::handle_error(&e, e.severity(), "ConnectionHandler", "register");
            if let LabServerError::AdmissionClosed { .. } = e {
                return Ok(self.abandon(client_id, Some(display_name), &transport, state).await);
            }
            transport.shutdown(self.config.write_timeout()).await;
            return Err(e);
        }
        Self::transition(client_id, &mut state, ConnectionState::Active);

        self.session_log.append(SessionEvent::Joined {
            client_id,
            name: display_name.clone(),
            addr: remote_addr,
        });

        let welcome = ServerMessage::Welcome {
            client_id,
            name: display_name.clone(),
        };
        if let Err(e) = transport.send(&welcome, self.config.write_timeout()).await {
            ErrorHandler::handle_error(&e, ErrorSeverity::Info, "ConnectionHandler", "welcome");
            self.registry.mark_dead(client_id, DisconnectReason::WriteFailed);
        }

        let mut messages_received = 0u64;
        let read_reason = loop {
            tokio::select! {
                biased;

                reason = transport.closed() => break reason,

                result = reader.read_line() => match result {
                    Ok(line) if line.is_empty() => continue,
                    Ok(line) => {
                        messages_received = self
                            .registry
                            .record_inbound(client_id)
                            .unwrap_or(messages_received + 1);
                        self.session_log.append(SessionEvent::Inbound {
                            client_id,
                            name: display_name.clone(),
                            text: line,
                        });
                    }
                    Err(closed) => {
                        let error = LabServerError::from(closed.clone());
                        ErrorHandler::handle_error(&error, ErrorSeverity::Info, "ConnectionHandler", "read_line");
                        break DisconnectReason::from(closed);
                    }
                },
            }
        };

        Self::transition(client_id, &mut state, ConnectionState::Closing);
        self.registry.mark_dead(client_id, read_reason.clone());
        // 강제 퇴장이나 서버 종료가 먼저 기록되었다면 그 사유가 우선
        let reason = transport.close_reason().unwrap_or(read_reason);
        transport.shutdown(self.config.write_timeout()).await;

        self.session_log.append(SessionEvent::Left {
            client_id,
            name: display_name.clone(),
            reason: reason.to_string(),
        });

        if !self.config.retain_dead_records {
            self.registry.remove(client_id);
        }
        Self::transition(client_id, &mut state, ConnectionState::Closed);

        info!("✅ 학생 #{} ({}) 연결 처리 완료: {}", client_id, display_name, reason);
        Ok(ConnectionOutcome {
            client_id,
            display_name,
            reason,
            final_state: state,
            messages_received,
        })
    }

    /// 등록 전에 입장이 마감된 연결 정리
    ///
    /// 레코드가 없으므로 세션 로그에는 남기지 않습니다.
    async fn abandon(
        &self,
        client_id: u32,
        display_name: Option<String>,
        transport: &ClientTransport,
        mut state: ConnectionState,
    ) -> ConnectionOutcome {
        Self::transition(client_id, &mut state, ConnectionState::Closing);
        transport.close(DisconnectReason::ServerShutdown);
        transport.shutdown(self.config.write_timeout()).await;
        Self::transition(client_id, &mut state, ConnectionState::Closed);

        ConnectionOutcome {
            client_id,
            display_name: display_name.unwrap_or_else(|| format!("Student{}", client_id)),
            reason: DisconnectReason::ServerShutdown,
            final_state: state,
            messages_received: 0,
        }
    }

    /// 입장 처리: 학생이 보낸 이름 (없으면 `None`)
    async fn admit<R>(
        &self,
        client_id: u32,
        transport: &ClientTransport,
        reader: &mut FramedReader<R>,
    ) -> Option<String>
    where
        R: AsyncRead + Unpin,
    {
        match self.config.admission_mode {
            AdmissionMode::AutoName => return None,
            AdmissionMode::Prompt => {
                if let Err(e) = transport
                    .send(&ServerMessage::NamePrompt, self.config.write_timeout())
                    .await
                {
                    ErrorHandler::handle_error(&e, ErrorSeverity::Info, "ConnectionHandler", "admit");
                    return None;
                }
            }
            AdmissionMode::Unprompted => {}
        }

        match timeout(self.config.admission_timeout(), reader.read_line()).await {
            Ok(Ok(line)) => Some(line),
            Ok(Err(closed)) => {
                debug!("학생 #{} 입장 중 연결 종료: {}", client_id, closed);
                None
            }
            Err(_) => {
                debug!(
                    "학생 #{} 이름 입력 시간 초과 ({}ms)",
                    client_id, self.config.admission_timeout_ms
                );
                None
            }
        }
    }

    fn transition(client_id: u32, state: &mut ConnectionState, next: ConnectionState) {
        debug!("학생 #{} 상태 전이: {} → {}", client_id, state, next);
        *state = next;
    }
}
