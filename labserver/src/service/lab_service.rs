//! 랩 서비스
//!
//! 레지스트리, 세션 로그, 라우터, 연결 수락기를 소유하는 명시적 세션 객체입니다.
//! 운영자 제어 기능을 제공하고 순서 있는 종료를 수행합니다.
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! let service = LabService::bind(LabServerConfig::default()).await?;
//! service.start()?;
//! service.broadcast("Lab starts now").await;
//! service.shutdown("Lab complete - Goodbye everyone!").await;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::LabServerConfig;
use crate::handler::connection_handler::ConnectionHandler;
use crate::service::acceptor::{bind_listener, Acceptor};
use crate::service::client_registry::{ClientRegistry, ClientSummary, RegistryStats};
use crate::service::client_transport::DisconnectReason;
use crate::service::router::{Router, Sent};
use crate::service::session_log::{SessionEvent, SessionLog, SessionLogEntry};
use crate::tool::error::LabResult;

/// 랩 서비스
pub struct LabService {
    config: LabServerConfig,
    registry: Arc<ClientRegistry>,
    session_log: Arc<SessionLog>,
    router: Router,
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    shutdown_tx: watch::Sender<bool>,
    acceptor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl LabService {
    /// 리스너를 열고 서비스를 구성합니다. 수락은 [`start`](Self::start)에서 시작합니다.
    pub async fn bind(config: LabServerConfig) -> LabResult<Self> {
        let bind_address = config.bind_address();
        info!("🚀 랩 서버 시작 중... ({})", bind_address);

        let listener = bind_listener(&bind_address, config.backlog).await?;
        let local_addr = listener.local_addr()?;

        let registry = Arc::new(ClientRegistry::new());
        let session_log = Arc::new(SessionLog::new());
        let router = Router::new(registry.clone(), session_log.clone(), config.write_timeout());
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            registry,
            session_log,
            router,
            local_addr,
            listener: Mutex::new(Some(listener)),
            shutdown_tx,
            acceptor_handle: Mutex::new(None),
        })
    }

    /// 연결 수락 시작
    pub fn start(&self) -> LabResult<()> {
        let Some(listener) = self.listener.lock().take() else {
            warn!("랩 서버가 이미 실행 중이거나 종료되었습니다");
            return Ok(());
        };

        let handler = Arc::new(ConnectionHandler::new(
            self.registry.clone(),
            self.session_log.clone(),
            self.config.clone(),
        ));
        let acceptor = Acceptor::new(
            listener,
            handler,
            self.shutdown_tx.subscribe(),
            self.config.drain_timeout(),
        );

        *self.acceptor_handle.lock() = Some(tokio::spawn(acceptor.run()));
        self.session_log.append(SessionEvent::ServerStarted { addr: self.local_addr });
        info!("✅ 랩 서버가 {}에서 실행 중입니다", self.local_addr);
        Ok(())
    }

    /// 생존 학생 목록
    pub fn list_active(&self) -> Vec<ClientSummary> {
        self.registry.list_active()
    }

    /// 보존된 사망 레코드 포함 전체 목록
    pub fn list_all(&self) -> Vec<ClientSummary> {
        self.registry.list_all()
    }

    /// 학생 한 명에게 답장
    pub async fn reply(&self, client_id: u32, text: &str) -> LabResult<Sent> {
        self.router.unicast(client_id, text).await
    }

    /// 전체 공지, 전달된 수 반환
    pub async fn broadcast(&self, text: &str) -> usize {
        self.router.broadcast_all(text).await
    }

    pub async fn kick(&self, client_id: u32) -> bool {
        self.router.kick(client_id).await
    }

    /// 최근 세션 로그 (가장 최근 항목이 마지막)
    pub fn recent_history(&self, count: usize) -> Vec<SessionLogEntry> {
        self.session_log.recent(count)
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn purge_dead(&self) -> usize {
        self.registry.purge_dead()
    }

    pub fn subscribe_log(&self) -> broadcast::Receiver<SessionLogEntry> {
        self.session_log.subscribe()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// 순서 있는 종료
    ///
    /// 1. 신규 입장 마감 (입장 중인 연결은 등록 없이 닫힘)
    /// 2. 생존 학생 전원에게 종료 공지
    /// 3. 수락 중지 및 리스닝 소켓 닫기
    /// 4. 모든 레코드 사망 처리 (전송 닫기)
    /// 5. 연결 핸들러 종료 대기
    /// 6. 종료 기록
    ///
    /// 입장 마감 후에는 생존 학생 집합이 늘지 않습니다.
    /// 종료 공지가 전달된 학생 수를 반환합니다.
    pub async fn shutdown(&self, farewell: &str) -> usize {
        info!("🛑 랩 서버 중지 중...");
        self.registry.stop_admissions();
        let farewell_delivered = self.router.broadcast_all(farewell).await;

        self.shutdown_tx.send_replace(true);
        // 시작하지 않은 경우 리스너가 아직 여기 있음
        drop(self.listener.lock().take());

        let closed = self.registry.close(DisconnectReason::ServerShutdown);
        info!("연결 {}개 종료 신호 전송", closed);

        let handle = self.acceptor_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("연결 수락 태스크 실패: {}", e);
            }
        }

        self.session_log
            .append(SessionEvent::ServerStopped { farewell_delivered });
        info!("✅ 랩 서버가 성공적으로 중지되었습니다");
        farewell_delivered
    }
}
