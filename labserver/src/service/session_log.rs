//! 세션 로그
//!
//! 입장, 수신 메시지, 답장, 공지, 강제 퇴장, 퇴장을 순서대로 기록하는
//! 추가 전용 로그입니다. 항목은 수정되거나 재정렬되지 않으며 프로세스가
//! 살아있는 동안 삭제되지 않습니다.
//!
//! 실시간 구독자는 추가된 순서 그대로 항목을 받습니다.

use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::tool::SimpleUtils;

/// 실시간 구독 채널 용량
const LIVE_CHANNEL_CAPACITY: usize = 256;

/// 세션 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ServerStarted { addr: SocketAddr },
    Joined { client_id: u32, name: String, addr: SocketAddr },
    Inbound { client_id: u32, name: String, text: String },
    Replied { client_id: u32, name: String, text: String },
    ReplyFailed { client_id: u32, text: String, reason: String },
    Broadcast { text: String, delivered: usize, attempted: usize },
    Kicked { client_id: u32, name: String },
    Left { client_id: u32, name: String, reason: String },
    ServerStopped { farewell_delivered: usize },
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerStarted { addr } => write!(f, "🚀 Lab server listening on {}", addr),
            Self::Joined { client_id, name, addr } => {
                write!(f, "🔗 #{} {} joined from {}", client_id, name, addr)
            }
            Self::Inbound { client_id, name, text } => {
                write!(f, "📨 #{} {}: {}", client_id, name, text)
            }
            Self::Replied { client_id, name, text } => {
                write!(f, "📤 -> #{} {}: {}", client_id, name, text)
            }
            Self::ReplyFailed { client_id, text, reason } => {
                write!(f, "❌ -> #{} ({}): {}", client_id, reason, text)
            }
            Self::Broadcast { text, delivered, attempted } => {
                write!(f, "📢 ALL ({}/{}): {}", delivered, attempted, text)
            }
            Self::Kicked { client_id, name } => write!(f, "🚫 #{} {} kicked", client_id, name),
            Self::Left { client_id, name, reason } => {
                write!(f, "👋 #{} {} left ({})", client_id, name, reason)
            }
            Self::ServerStopped { farewell_delivered } => {
                write!(f, "🛑 Lab server stopped (farewell sent to {})", farewell_delivered)
            }
        }
    }
}

/// 세션 로그 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLogEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: SessionEvent,
}

impl fmt::Display for SessionLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", SimpleUtils::clock_string(&self.at), self.event)
    }
}

#[derive(Debug)]
struct LogInner {
    entries: Vec<SessionLogEntry>,
    next_seq: u64,
}

/// 추가 전용 세션 로그
#[derive(Debug)]
pub struct SessionLog {
    inner: Mutex<LogInner>,
    live_tx: broadcast::Sender<SessionLogEntry>,
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLog {
    pub fn new() -> Self {
        let (live_tx, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(LogInner {
                entries: Vec::new(),
                next_seq: 1,
            }),
            live_tx,
        }
    }

    /// 이벤트 추가
    ///
    /// 실시간 전송도 같은 잠금 안에서 하므로 구독자가 보는 순서와 로그 순서가 같습니다.
    pub fn append(&self, event: SessionEvent) -> SessionLogEntry {
        let mut inner = self.inner.lock();
        let entry = SessionLogEntry {
            seq: inner.next_seq,
            at: Utc::now(),
            event,
        };
        inner.next_seq += 1;
        inner.entries.push(entry.clone());

        // 구독자가 없으면 에러지만 정상 상황
        let _ = self.live_tx.send(entry.clone());
        drop(inner);

        info!("{}", entry);
        entry
    }

    /// 최근 `count`개 항목 (오래된 것이 먼저)
    pub fn recent(&self, count: usize) -> Vec<SessionLogEntry> {
        let inner = self.inner.lock();
        let start = inner.entries.len().saturating_sub(count);
        inner.entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 이후 추가되는 항목의 실시간 구독
    pub fn subscribe(&self) -> broadcast::Receiver<SessionLogEntry> {
        self.live_tx.subscribe()
    }
}
