//! 클라이언트 전송 핸들
//!
//! 연결의 쓰기 측과 대역 외 종료 신호를 함께 묶습니다.
//! 라우터와 연결 핸들러가 쓰기를 공유하고, 읽기는 연결 핸들러만 합니다.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::protocol::ServerMessage;
use crate::tool::error::{LabResult, LabServerError, StreamClosed};

/// 연결 종료 사유
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// 학생이 연결을 정상 종료
    PeerClosed,
    /// 읽기 에러
    ReadError(String),
    /// 쓰기 실패 또는 쓰기 시간 초과
    WriteFailed,
    /// 교사가 강제 퇴장
    Kicked,
    /// 서버 종료
    ServerShutdown,
}

impl From<StreamClosed> for DisconnectReason {
    fn from(closed: StreamClosed) -> Self {
        match closed {
            StreamClosed::Orderly => Self::PeerClosed,
            StreamClosed::Abrupt(reason) => Self::ReadError(reason),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed"),
            Self::ReadError(reason) => write!(f, "read error: {}", reason),
            Self::WriteFailed => write!(f, "write failed"),
            Self::Kicked => write!(f, "kicked"),
            Self::ServerShutdown => write!(f, "server shutdown"),
        }
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 공유 전송 핸들
///
/// 한 연결에 대한 쓰기는 비동기 뮤텍스로 직렬화되어 라인이 섞이지 않습니다.
/// 종료 신호가 한 번 올라가면 이후 쓰기는 모두 거부됩니다.
pub struct ClientTransport {
    writer: Mutex<BoxedWriter>,
    close_tx: watch::Sender<Option<DisconnectReason>>,
    lines_sent: AtomicU64,
}

impl ClientTransport {
    pub fn new<W>(writer: W) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (close_tx, _) = watch::channel(None);
        Arc::new(Self {
            writer: Mutex::new(Box::new(writer)),
            close_tx,
            lines_sent: AtomicU64::new(0),
        })
    }

    /// 메시지 한 줄 전송
    ///
    /// 잠금 대기와 쓰기 전체가 `write_timeout` 안에 끝나야 합니다.
    pub async fn send(&self, message: &ServerMessage, write_timeout: Duration) -> LabResult<()> {
        if self.is_closed() {
            return Err(LabServerError::TransportClosed);
        }

        let bytes = message.to_bytes();
        let write = async {
            let mut writer = self.writer.lock().await;
            // 잠금을 기다리는 동안 닫혔을 수 있음
            if self.is_closed() {
                return Err(LabServerError::TransportClosed);
            }
            writer.write_all(&bytes).await?;
            writer.flush().await?;
            Ok(())
        };

        match timeout(write_timeout, write).await {
            Ok(Ok(())) => {
                self.lines_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LabServerError::WriteTimeout {
                timeout_ms: write_timeout.as_millis() as u64,
            }),
        }
    }

    /// 종료 신호 올리기
    ///
    /// 첫 번째 사유만 기록됩니다. 새로 닫았으면 `true`.
    pub fn close(&self, reason: DisconnectReason) -> bool {
        self.close_tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        })
    }

    pub fn close_reason(&self) -> Option<DisconnectReason> {
        self.close_tx.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.close_tx.borrow().is_some()
    }

    /// 종료 신호가 올라갈 때까지 대기
    ///
    /// 연결 핸들러가 읽기와 함께 `select!`하여 강제 퇴장 시 블로킹된 읽기를 취소합니다.
    pub async fn closed(&self) -> DisconnectReason {
        let mut rx = self.close_tx.subscribe();
        let result = match rx.wait_for(|reason| reason.is_some()).await {
            Ok(reason) => (*reason).clone(),
            Err(_) => None,
        };
        result.unwrap_or(DisconnectReason::ServerShutdown)
    }

    /// 쓰기 측 종료 (제한 시간 내 최선 노력)
    pub async fn shutdown(&self, limit: Duration) {
        let result = timeout(limit, async {
            let mut writer = self.writer.lock().await;
            writer.shutdown().await
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("쓰기 측 종료 실패: {}", e),
            Err(_) => debug!("쓰기 측 종료 시간 초과 ({}ms)", limit.as_millis()),
        }
    }

    /// 성공적으로 전송한 라인 수
    pub fn lines_sent(&self) -> u64 {
        self.lines_sent.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ClientTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTransport")
            .field("close_reason", &self.close_reason())
            .field("lines_sent", &self.lines_sent())
            .finish()
    }
}
