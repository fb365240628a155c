//! 랩 서버 테스트 모듈
//!
//! 각 기능별로 분리된 테스트 파일들을 관리합니다.

mod test_connection;
mod test_framer;

// 테스트 유틸리티
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{duplex, AsyncBufReadExt, AsyncRead, BufReader, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};

use crate::config::{AdmissionMode, LabServerConfig};
use crate::handler::{ConnectionHandler, ConnectionOutcome};
use crate::service::{ClientRecord, ClientRegistry, ClientTransport, SessionLog};
use crate::tool::LabResult;

/// 테스트 대기 제한 시간
pub const TEST_WAIT: Duration = Duration::from_secs(2);

/// 테스트용 설정 (짧은 제한 시간, 로컬 임시 포트)
pub fn test_config() -> LabServerConfig {
    LabServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        admission_mode: AdmissionMode::Unprompted,
        admission_timeout_ms: 200,
        write_timeout_ms: 200,
        drain_timeout_ms: 500,
        ..LabServerConfig::default()
    }
}

/// 테스트용 레지스트리와 세션 로그
pub fn create_test_state() -> (Arc<ClientRegistry>, Arc<SessionLog>) {
    (Arc::new(ClientRegistry::new()), Arc::new(SessionLog::new()))
}

pub fn test_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// 메모리 전송으로 학생 하나를 직접 등록합니다.
///
/// 반환된 스트림에서 서버가 보낸 라인을 읽을 수 있습니다.
pub fn register_duplex_client(
    registry: &ClientRegistry,
    name: &str,
    buffer: usize,
) -> (u32, DuplexStream) {
    let (server, client) = duplex(buffer);
    let id = registry.allocate();
    let record = ClientRecord::new(
        id,
        test_addr(40000 + id as u16),
        name.to_string(),
        ClientTransport::new(server),
    );
    registry.register(record).expect("등록 실패");
    (id, client)
}

/// 연결 핸들러를 메모리 스트림 위에서 실행합니다.
pub fn spawn_connection(
    handler: &Arc<ConnectionHandler>,
    port: u16,
) -> (JoinHandle<LabResult<ConnectionOutcome>>, DuplexStream) {
    let (server, client) = duplex(4096);
    let handler = handler.clone();
    let task = tokio::spawn(async move { handler.handle_connection(server, test_addr(port)).await });
    (task, client)
}

/// 서버가 보낸 라인 하나 읽기 (종결자 제거). EOF나 시간 초과면 `None`.
pub async fn read_server_line<R>(reader: &mut BufReader<R>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    match timeout(TEST_WAIT, reader.read_line(&mut line)).await {
        Ok(Ok(n)) if n > 0 => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        _ => None,
    }
}

/// 조건이 참이 될 때까지 폴링
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + TEST_WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
