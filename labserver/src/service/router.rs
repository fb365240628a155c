//! 메시지 라우터
//!
//! 교사의 1:1 답장, 전체 공지, 강제 퇴장을 처리합니다.
//!
//! - 모든 다중 클라이언트 전송은 레지스트리의 불변 스냅샷 위에서 동작합니다.
//! - 수신자별 쓰기는 각각 독립된 태스크에서 제한 시간 안에 실행되므로
//!   멈춘 학생 하나가 다른 학생에게의 전달을 막지 못합니다.
//! - 쓰기에 실패한 학생은 즉시 사망 처리되어 이후 트래픽을 받지 않습니다.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::protocol::ServerMessage;
use crate::service::client_registry::ClientRegistry;
use crate::service::client_transport::DisconnectReason;
use crate::service::session_log::{SessionEvent, SessionLog};
use crate::tool::error::{ErrorHandler, ErrorSeverity, LabResult, LabServerError};

/// 1:1 전송 성공 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sent {
    pub client_id: u32,
}

/// 메시지 라우터
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<ClientRegistry>,
    session_log: Arc<SessionLog>,
    write_timeout: Duration,
}

impl Router {
    pub fn new(
        registry: Arc<ClientRegistry>,
        session_log: Arc<SessionLog>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            session_log,
            write_timeout,
        }
    }

    /// 학생 한 명에게 답장
    ///
    /// 없거나 사망한 대상이면 상태 변경 없이 `Unreachable`을 반환합니다.
    /// 쓰기 실패나 시간 초과는 대상을 사망 처리한 뒤 `Unreachable`을 반환합니다.
    pub async fn unicast(&self, client_id: u32, text: &str) -> LabResult<Sent> {
        let Some(record) = self.registry.get_live(client_id) else {
            self.session_log.append(SessionEvent::ReplyFailed {
                client_id,
                text: text.to_string(),
                reason: "offline".to_string(),
            });
            let error = LabServerError::Unreachable { client_id };
            ErrorHandler::handle_error(&error, ErrorSeverity::Warning, "Router", "unicast");
            return Err(error);
        };

        let message = ServerMessage::Reply { text: text.to_string() };
        match record.transport.send(&message, self.write_timeout).await {
            Ok(()) => {
                self.session_log.append(SessionEvent::Replied {
                    client_id,
                    name: record.display_name,
                    text: text.to_string(),
                });
                Ok(Sent { client_id })
            }
            Err(e) => {
                ErrorHandler::handle_error(&e, ErrorSeverity::Warning, "Router", "unicast");
                self.registry.mark_dead(client_id, DisconnectReason::WriteFailed);
                self.session_log.append(SessionEvent::ReplyFailed {
                    client_id,
                    text: text.to_string(),
                    reason: format!("write failed: {}", e),
                });
                Err(LabServerError::Unreachable { client_id })
            }
        }
    }

    /// 모든 생존 학생에게 공지
    ///
    /// 성공적으로 전달된 수를 반환합니다. 수신자 간 원자성은 없습니다.
    pub async fn broadcast_all(&self, text: &str) -> usize {
        let start_time = Instant::now();
        let recipients = self.registry.snapshot_live();
        let attempted = recipients.len();

        if attempted == 0 {
            debug!("생존 학생이 없어 공지 전송 건너뜀");
        }

        let message = Arc::new(ServerMessage::Broadcast { text: text.to_string() });
        let mut tasks = JoinSet::new();

        for record in recipients {
            let message = message.clone();
            let write_timeout = self.write_timeout;
            tasks.spawn(async move {
                let result = record.transport.send(&message, write_timeout).await;
                (record.id, result)
            });
        }

        let mut delivered = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => delivered += 1,
                Ok((client_id, Err(e))) => {
                    ErrorHandler::handle_error(&e, ErrorSeverity::Warning, "Router", "broadcast_all");
                    if self.registry.mark_dead(client_id, DisconnectReason::WriteFailed) {
                        warn!("⚠️ 공지 전송 실패로 학생 #{} 사망 처리", client_id);
                    }
                }
                Err(e) => error!("공지 전송 작업 실행 실패: {}", e),
            }
        }

        self.session_log.append(SessionEvent::Broadcast {
            text: text.to_string(),
            delivered,
            attempted,
        });
        debug!(
            "공지 완료: 성공 {}, 실패 {}, 시간 {}ms",
            delivered,
            attempted - delivered,
            start_time.elapsed().as_millis()
        );

        delivered
    }

    /// 학생 강제 퇴장
    ///
    /// 퇴장 알림은 최선 노력으로 보냅니다. 사망 처리가 전송을 닫으므로
    /// 연결 핸들러의 블로킹된 읽기도 함께 취소됩니다.
    pub async fn kick(&self, client_id: u32) -> bool {
        let Some(record) = self.registry.get_live(client_id) else {
            debug!("강제 퇴장 대상 없음: #{}", client_id);
            return false;
        };

        if let Err(e) = record.transport.send(&ServerMessage::Kicked, self.write_timeout).await {
            debug!("퇴장 알림 전송 실패 #{}: {}", client_id, e);
        }

        // 알림을 보내는 사이 스스로 나갔을 수 있음
        if !self.registry.mark_dead(client_id, DisconnectReason::Kicked) {
            return false;
        }

        self.session_log.append(SessionEvent::Kicked {
            client_id,
            name: record.display_name.clone(),
        });
        info!("🚫 학생 #{} ({}) 강제 퇴장", client_id, record.display_name);
        true
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
}
