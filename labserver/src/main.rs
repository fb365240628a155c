//! 랩 채팅 서버
//!
//! 학생 연결을 받고, 표준 입력의 운영자 콘솔로 답장/공지/강제 퇴장을 수행합니다.

use anyhow::{Context, Result};
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use labserver::config::LOG_LEVEL_KEY;
use labserver::{validate_config, ConsoleHandler, LabServerConfig, LabService};

/// 콘솔 입력 채널 용량
const CONSOLE_CHANNEL_CAPACITY: usize = 64;

/// 랩 서버 메인 진입점
///
/// 환경 설정은 .env 파일과 시스템 환경변수에서 로드됩니다.
///
/// 환경변수:
/// - lab_host: 리스닝 호스트 (기본값: "0.0.0.0")
/// - lab_port: 리스닝 포트 (기본값: "8080")
/// - lab_backlog: listen 백로그 (기본값: "50")
/// - lab_admission_mode: prompt | unprompted | auto (기본값: "prompt")
/// - lab_admission_timeout_ms / lab_write_timeout_ms / lab_drain_timeout_ms
/// - lab_max_line_bytes / lab_max_name_len
/// - lab_retain_dead: 퇴장 학생 레코드 보존 (기본값: "false")
/// - lab_farewell: 종료 공지 문구
/// - lab_log_level: `RUST_LOG`가 없을 때의 로그 레벨 (기본값: "info")
#[tokio::main]
async fn main() -> Result<()> {
    let env_file = LabServerConfig::load_env_file();

    // 로깅 설정 (표준 출력은 콘솔이 사용)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var(LOG_LEVEL_KEY).unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(level)
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match env_file {
        Some(path) => info!(".env 파일 로드 성공: {}", path),
        None => warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다."),
    }

    // 환경 설정 로드 및 검증
    let config = LabServerConfig::from_env()?;
    validate_config(&config)?;

    info!("=== 랩 서버 설정 ===");
    info!("리스닝 주소: {}", config.bind_address());
    info!("입장 방식: {}", config.admission_mode);
    info!("쓰기 제한 시간: {}ms", config.write_timeout_ms);
    info!("퇴장 레코드 보존: {}", config.retain_dead_records);
    info!("====================");

    let service = LabService::bind(config.clone())
        .await
        .context("랩 서버 리스너 바인드 실패")?;
    service.start()?;

    // 표준 입력은 블로킹이므로 별도 스레드에서 읽어 채널로 전달
    let (input_tx, input_rx) = mpsc::channel(CONSOLE_CHANNEL_CAPACITY);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if input_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let console = ConsoleHandler::new(&service);
    tokio::select! {
        result = console.run(input_rx, tokio::io::stdout()) => {
            if let Err(e) = result {
                error!("운영자 콘솔 오류: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("종료 시그널 대기 실패: {}", e);
            }
            info!("종료 시그널 수신, 서버를 중지합니다...");
        }
    }

    let delivered = service.shutdown(&config.farewell).await;
    info!("종료 공지 전달: {}명", delivered);

    Ok(())
}
