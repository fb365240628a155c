//! 클라이언트 레코드 저장소
//!
//! 할당된 ID를 연결 상태(전송 핸들, 원격 주소, 표시 이름, 생존 여부)에 매핑하는
//! 유일한 권위 있는 레지스트리입니다.
//!
//! 모든 읽기-수정-쓰기와 스냅샷 읽기는 하나의 뮤텍스로 보호됩니다.
//! 잠금을 쥔 채로 네트워크 I/O를 하지 않습니다.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::service::client_transport::{ClientTransport, DisconnectReason};
use crate::tool::error::{LabResult, LabServerError};

/// 입장한 연결 하나의 레코드
#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub id: u32,
    pub remote_addr: SocketAddr,
    pub display_name: String,
    pub alive: bool,
    pub connected_at: DateTime<Utc>,
    /// 입장 후 받은 메시지 수
    pub messages_received: u64,
    pub transport: Arc<ClientTransport>,
}

impl ClientRecord {
    pub fn new(
        id: u32,
        remote_addr: SocketAddr,
        display_name: String,
        transport: Arc<ClientTransport>,
    ) -> Self {
        Self {
            id,
            remote_addr,
            display_name,
            alive: true,
            connected_at: Utc::now(),
            messages_received: 0,
            transport,
        }
    }

    pub fn summary(&self) -> ClientSummary {
        ClientSummary {
            id: self.id,
            name: self.display_name.clone(),
            address: self.remote_addr,
            alive: self.alive,
            connected_at: self.connected_at,
            messages: self.messages_received,
        }
    }
}

/// 대시보드/운영자용 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSummary {
    pub id: u32,
    pub name: String,
    pub address: SocketAddr,
    pub alive: bool,
    pub connected_at: DateTime<Utc>,
    pub messages: u64,
}

/// 레지스트리 통계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_admitted: u64,
    pub current_live: usize,
    pub peak_live: usize,
    pub retained_dead: usize,
}

#[derive(Debug)]
struct RegistryInner {
    next_id: u32,
    records: BTreeMap<u32, ClientRecord>,
    total_admitted: u64,
    peak_live: usize,
    admissions_closed: bool,
}

impl RegistryInner {
    fn live_count(&self) -> usize {
        self.records.values().filter(|r| r.alive).count()
    }
}

/// 클라이언트 레지스트리
#[derive(Debug)]
pub struct ClientRegistry {
    inner: Mutex<RegistryInner>,
    admission_tx: watch::Sender<bool>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_id: 1,
                records: BTreeMap::new(),
                total_admitted: 0,
                peak_live: 0,
                admissions_closed: false,
            }),
            admission_tx: watch::channel(false).0,
        }
    }

    /// 다음 ID 할당
    ///
    /// 1부터 시작해 엄격하게 증가하며 재사용되지 않습니다.
    pub fn allocate(&self) -> u32 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    /// 생존 레코드 등록
    ///
    /// [`stop_admissions`](Self::stop_admissions) 이후에는 `AdmissionClosed`로 거절합니다.
    pub fn register(&self, mut record: ClientRecord) -> LabResult<()> {
        let mut inner = self.inner.lock();
        if inner.admissions_closed {
            return Err(LabServerError::AdmissionClosed { client_id: record.id });
        }
        if inner.records.contains_key(&record.id) {
            return Err(LabServerError::DuplicateId(record.id));
        }

        record.alive = true;
        let id = record.id;
        inner.records.insert(id, record);
        inner.total_admitted += 1;

        let live = inner.live_count();
        if live > inner.peak_live {
            inner.peak_live = live;
        }

        debug!("레코드 등록: #{} (생존 {}명)", id, live);
        Ok(())
    }

    /// 사망 처리
    ///
    /// `alive = false`로 바꾸고 전송 핸들의 종료 신호를 올립니다. 두 작업이 같은 잠금 안에서
    /// 일어나므로 사망 레코드는 항상 닫힌 전송을 가집니다.
    /// 없는 ID이거나 이미 사망했으면 `false`.
    pub fn mark_dead(&self, id: u32, reason: DisconnectReason) -> bool {
        let mut inner = self.inner.lock();
        match inner.records.get_mut(&id) {
            Some(record) if record.alive => {
                record.alive = false;
                record.transport.close(reason);
                true
            }
            _ => false,
        }
    }

    /// 수신 메시지 수 증가, 증가된 값 반환 (없는 ID면 `None`)
    pub fn record_inbound(&self, id: u32) -> Option<u64> {
        let mut inner = self.inner.lock();
        let record = inner.records.get_mut(&id)?;
        record.messages_received += 1;
        Some(record.messages_received)
    }

    /// 레코드 삭제
    pub fn remove(&self, id: u32) -> Option<ClientRecord> {
        self.inner.lock().records.remove(&id)
    }

    /// 생존 레코드 하나의 사본
    pub fn get_live(&self, id: u32) -> Option<ClientRecord> {
        self.inner
            .lock()
            .records
            .get(&id)
            .filter(|r| r.alive)
            .cloned()
    }

    /// 모든 생존 레코드의 시점 스냅샷 (ID 오름차순)
    pub fn snapshot_live(&self) -> Vec<ClientRecord> {
        self.inner
            .lock()
            .records
            .values()
            .filter(|r| r.alive)
            .cloned()
            .collect()
    }

    /// 생존 학생 요약 목록
    pub fn list_active(&self) -> Vec<ClientSummary> {
        self.inner
            .lock()
            .records
            .values()
            .filter(|r| r.alive)
            .map(ClientRecord::summary)
            .collect()
    }

    /// 보존된 사망 레코드 포함 전체 목록
    pub fn list_all(&self) -> Vec<ClientSummary> {
        self.inner
            .lock()
            .records
            .values()
            .map(ClientRecord::summary)
            .collect()
    }

    /// 모든 생존 레코드 사망 처리, 처리한 수 반환
    pub fn mark_all_dead(&self, reason: DisconnectReason) -> usize {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for record in inner.records.values_mut().filter(|r| r.alive) {
            record.alive = false;
            record.transport.close(reason.clone());
            count += 1;
        }
        count
    }

    /// 입장 마감
    ///
    /// 이후의 [`register`](Self::register)는 모두 거절되고, 입장 중인 핸들러는
    /// [`admissions_closed`](Self::admissions_closed)로 깨어납니다.
    /// 마감 이전에 등록된 레코드는 그대로 생존합니다.
    pub fn stop_admissions(&self) {
        let newly_closed = {
            let mut inner = self.inner.lock();
            !std::mem::replace(&mut inner.admissions_closed, true)
        };
        if newly_closed {
            self.admission_tx.send_replace(true);
            info!("🚧 신규 입장 마감");
        }
    }

    /// 입장이 마감될 때까지 대기
    pub async fn admissions_closed(&self) {
        let mut rx = self.admission_tx.subscribe();
        // 송신자는 레지스트리가 소유하므로 여기서 닫히지 않음
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// 레지스트리 닫기
    ///
    /// 입장을 마감하고 모든 생존 레코드를 사망 처리합니다.
    pub fn close(&self, reason: DisconnectReason) -> usize {
        self.stop_admissions();
        self.mark_all_dead(reason)
    }

    /// 보존된 사망 레코드 제거
    pub fn purge_dead(&self) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.records.len();
        inner.records.retain(|_, r| r.alive);
        before - inner.records.len()
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().live_count()
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        let current_live = inner.live_count();
        RegistryStats {
            total_admitted: inner.total_admitted,
            current_live,
            peak_live: inner.peak_live,
            retained_dead: inner.records.len() - current_live,
        }
    }
}
