//! 연결 수락 루프
//!
//! 리스닝 소켓에서 새 연결을 받아 연결마다 핸들러 태스크를 생성합니다.
//! 수락 에러는 로깅 후 잠시 쉬고 계속하며 루프를 끝내지 않습니다.

use std::io;
use std::sync::Arc;

use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::handler::connection_handler::ConnectionHandler;
use crate::tool::error::{ErrorHandler, ErrorSeverity, LabResult, LabServerError};

/// 수락 에러 후 대기 시간
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

fn bind_failure(addr: &str, source: io::Error) -> LabServerError {
    LabServerError::BindFailure {
        addr: addr.to_string(),
        source,
    }
}

/// 주소 재사용과 listen 백로그를 적용해 리스너를 엽니다.
pub async fn bind_listener(bind_address: &str, backlog: u32) -> LabResult<TcpListener> {
    let addr = lookup_host(bind_address)
        .await
        .map_err(|e| bind_failure(bind_address, e))?
        .next()
        .ok_or_else(|| {
            bind_failure(
                bind_address,
                io::Error::new(io::ErrorKind::AddrNotAvailable, "주소를 해석할 수 없습니다"),
            )
        })?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| bind_failure(bind_address, e))?;

    socket
        .set_reuseaddr(true)
        .map_err(|e| bind_failure(bind_address, e))?;
    socket.bind(addr).map_err(|e| bind_failure(bind_address, e))?;

    socket
        .listen(backlog)
        .map_err(|e| bind_failure(bind_address, e))
}

/// 연결 수락기
pub struct Acceptor {
    listener: TcpListener,
    handler: Arc<ConnectionHandler>,
    shutdown_rx: watch::Receiver<bool>,
    drain_timeout: Duration,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        handler: Arc<ConnectionHandler>,
        shutdown_rx: watch::Receiver<bool>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            listener,
            handler,
            shutdown_rx,
            drain_timeout,
        }
    }

    /// 종료 신호가 올 때까지 연결을 수락합니다.
    ///
    /// 종료 시 리스닝 소켓을 닫고, 진행 중인 핸들러를 `drain_timeout`까지 기다린 뒤
    /// 남은 태스크는 중단합니다.
    pub async fn run(self) {
        let Self {
            listener,
            handler,
            mut shutdown_rx,
            drain_timeout,
        } = self;
        let mut tasks = JoinSet::new();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        // 서비스가 사라짐
                        break;
                    }
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("🔗 새 학생 연결: {}", addr);
                        let handler = handler.clone();
                        tasks.spawn(async move {
                            match handler.handle_connection(stream, addr).await {
                                Ok(outcome) => debug!(
                                    "연결 종료 #{} ({}): 수신 {}건",
                                    outcome.client_id, outcome.reason, outcome.messages_received
                                ),
                                Err(e) => error!("학생 연결 처리 오류 [{}]: {}", addr, e),
                            }
                        });
                    }
                    Err(e) => {
                        let error = LabServerError::Io(e);
                        ErrorHandler::handle_error(&error, ErrorSeverity::Error, "Acceptor", "accept");
                        sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("연결 태스크 실패: {}", e);
                    }
                }
            }
        }

        drop(listener);
        info!("🛑 연결 수락 중지, 진행 중인 연결 {}개 대기", tasks.len());

        let drained = timeout(drain_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!("연결 태스크 실패: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "⚠️ 연결 정리 시간 초과 ({}ms), 남은 {}개 태스크 중단",
                drain_timeout.as_millis(),
                tasks.len()
            );
            tasks.abort_all();
        }
    }
}
