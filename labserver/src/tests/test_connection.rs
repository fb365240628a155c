//! 연결 핸들러 테스트
//!
//! 입장 방식, 이름 대체, 수신 기록, 강제 퇴장, 퇴장 정리 테스트

use std::sync::Arc;

use tokio::io::{split, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use super::{create_test_state, read_server_line, spawn_connection, test_config, wait_until, TEST_WAIT};
use crate::config::{AdmissionMode, LabServerConfig};
use crate::handler::{ConnectionHandler, ConnectionState};
use crate::service::{ClientRegistry, DisconnectReason, Router, SessionEvent, SessionLog};

fn create_handler(config: LabServerConfig) -> (Arc<ConnectionHandler>, Arc<ClientRegistry>, Arc<SessionLog>) {
    let (registry, session_log) = create_test_state();
    let handler = Arc::new(ConnectionHandler::new(registry.clone(), session_log.clone(), config));
    (handler, registry, session_log)
}

fn inbound_texts(session_log: &SessionLog) -> Vec<String> {
    session_log
        .recent(usize::MAX)
        .into_iter()
        .filter_map(|entry| match entry.event {
            SessionEvent::Inbound { text, .. } => Some(text),
            _ => None,
        })
        .collect()
}

/// 프롬프트 입장 테스트
#[tokio::test]
async fn test_prompt_admission() {
    let mut config = test_config();
    config.admission_mode = AdmissionMode::Prompt;
    let (handler, registry, _) = create_handler(config);

    let (_task, client) = spawn_connection(&handler, 50001);
    let (rd, mut wr) = split(client);
    let mut rd = BufReader::new(rd);

    assert_eq!(read_server_line(&mut rd).await.as_deref(), Some("Enter your name:"));
    wr.write_all(b"Alice\n").await.unwrap();
    assert_eq!(
        read_server_line(&mut rd).await.as_deref(),
        Some("[SYS] Connected as Alice (#1)! Send messages to teacher.")
    );

    let active = registry.list_active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].name, "Alice");
    assert_eq!(active[0].address.port(), 50001);

    println!("✅ 프롬프트 입장 테스트 통과");
}

/// 프롬프트 없는 입장 테스트
#[tokio::test]
async fn test_unprompted_admission_uses_first_line() {
    let (handler, registry, _) = create_handler(test_config());

    let (_task, client) = spawn_connection(&handler, 50002);
    let (rd, mut wr) = split(client);
    let mut rd = BufReader::new(rd);

    wr.write_all(b"Bob\n").await.unwrap();
    assert_eq!(
        read_server_line(&mut rd).await.as_deref(),
        Some("[SYS] Connected as Bob (#1)! Send messages to teacher.")
    );
    assert_eq!(registry.list_active()[0].name, "Bob");

    println!("✅ 프롬프트 없는 입장 테스트 통과");
}

/// 이름 미입력 대체 테스트
#[tokio::test]
async fn test_silent_client_gets_fallback_name() {
    let (handler, registry, _) = create_handler(test_config());

    let (_task, client) = spawn_connection(&handler, 50003);
    let mut client = BufReader::new(client);

    // 아무것도 보내지 않으면 입장 제한 시간 후 대체 이름
    assert_eq!(
        read_server_line(&mut client).await.as_deref(),
        Some("[SYS] Connected as Student1 (#1)! Send messages to teacher.")
    );
    let active = registry.list_active();
    assert_eq!(active[0].name, "Student1");
    assert!(active[0].alive);

    println!("✅ 대체 이름 테스트 통과");
}

/// 제어 문자뿐인 이름 테스트
#[tokio::test]
async fn test_garbled_name_gets_fallback() {
    let (handler, registry, _) = create_handler(test_config());

    let (_task, client) = spawn_connection(&handler, 50004);
    let (rd, mut wr) = split(client);
    let mut rd = BufReader::new(rd);

    wr.write_all(b"\x07\x00\r\n").await.unwrap();
    assert!(read_server_line(&mut rd).await.unwrap().contains("Student1"));
    assert_eq!(registry.list_active()[0].name, "Student1");

    println!("✅ 깨진 이름 대체 테스트 통과");
}

/// 긴 이름 자르기 테스트
#[tokio::test]
async fn test_long_name_is_capped() {
    let mut config = test_config();
    config.max_name_len = 5;
    let (handler, registry, _) = create_handler(config);

    let (_task, client) = spawn_connection(&handler, 50005);
    let (rd, mut wr) = split(client);
    let mut rd = BufReader::new(rd);

    wr.write_all(b"Bartholomew\n").await.unwrap();
    assert!(read_server_line(&mut rd).await.is_some());
    assert_eq!(registry.list_active()[0].name, "Barth");

    println!("✅ 이름 길이 제한 테스트 통과");
}

/// 자동 이름 입장 테스트
#[tokio::test]
async fn test_auto_name_does_not_consume_first_line() {
    let mut config = test_config();
    config.admission_mode = AdmissionMode::AutoName;
    let (handler, registry, session_log) = create_handler(config);

    let (_task, client) = spawn_connection(&handler, 50006);
    let (rd, mut wr) = split(client);
    let mut rd = BufReader::new(rd);

    wr.write_all(b"Carol\n").await.unwrap();
    assert!(read_server_line(&mut rd).await.unwrap().contains("Student1"));

    // 첫 줄은 이름이 아니라 일반 메시지
    assert!(wait_until(|| inbound_texts(&session_log) == vec!["Carol".to_string()]).await);
    assert_eq!(registry.list_active()[0].name, "Student1");

    println!("✅ 자동 이름 입장 테스트 통과");
}

/// 수신 메시지 기록 테스트
#[tokio::test]
async fn test_inbound_lines_are_logged_in_order() {
    let (handler, _, session_log) = create_handler(test_config());

    let (_task, client) = spawn_connection(&handler, 50007);
    let (rd, mut wr) = split(client);
    let mut rd = BufReader::new(rd);

    wr.write_all(b"Dana\n").await.unwrap();
    assert!(read_server_line(&mut rd).await.is_some());

    wr.write_all(b"need help\n\r\nsec").await.unwrap();
    wr.write_all(b"ond\n").await.unwrap();

    let expected = vec!["need help".to_string(), "second".to_string()];
    assert!(wait_until(|| inbound_texts(&session_log) == expected).await);

    let tagged = session_log.recent(usize::MAX).into_iter().any(|entry| {
        entry.event
            == SessionEvent::Inbound { client_id: 1, name: "Dana".to_string(), text: "need help".to_string() }
    });
    assert!(tagged, "수신 기록에 ID와 이름이 있어야 함");

    println!("✅ 수신 기록 테스트 통과");
}

/// 강제 퇴장 종료 상태 테스트
#[tokio::test]
async fn test_kick_reaches_closed_state() {
    let (handler, registry, session_log) = create_handler(test_config());
    let router = Router::new(registry.clone(), session_log.clone(), test_config().write_timeout());

    let (task, client) = spawn_connection(&handler, 50008);
    let (rd, mut wr) = split(client);
    let mut rd = BufReader::new(rd);

    wr.write_all(b"Eve\n").await.unwrap();
    assert!(read_server_line(&mut rd).await.is_some());

    assert!(router.kick(1).await);
    let outcome = timeout(TEST_WAIT, task).await.expect("핸들러가 끝나지 않음").unwrap().unwrap();

    assert_eq!(outcome.final_state, ConnectionState::Closed);
    assert_eq!(outcome.reason, DisconnectReason::Kicked);
    assert!(registry.list_active().is_empty());
    assert!(!router.kick(1).await, "두 번째 강제 퇴장은 무시되어야 함");

    // 퇴장 알림 후 스트림 종료
    assert!(read_server_line(&mut rd).await.unwrap().starts_with("[SYS] You have been removed"));
    assert_eq!(read_server_line(&mut rd).await, None);

    let left = session_log.recent(usize::MAX).into_iter().any(|entry| {
        matches!(entry.event, SessionEvent::Left { client_id: 1, ref reason, .. } if reason == "kicked")
    });
    assert!(left);

    println!("✅ 강제 퇴장 종료 테스트 통과");
}

/// 학생 연결 종료 테스트
#[tokio::test]
async fn test_peer_close_removes_record() {
    let (handler, registry, session_log) = create_handler(test_config());

    let (task, client) = spawn_connection(&handler, 50009);
    let (rd, mut wr) = split(client);
    let mut rd = BufReader::new(rd);

    wr.write_all(b"Finn\nbye\n").await.unwrap();
    assert!(read_server_line(&mut rd).await.is_some());
    drop(wr);
    drop(rd);

    let outcome = timeout(TEST_WAIT, task).await.unwrap().unwrap().unwrap();
    assert_eq!(outcome.reason, DisconnectReason::PeerClosed);
    assert_eq!(outcome.display_name, "Finn");
    assert_eq!(outcome.messages_received, 1);
    assert!(registry.list_all().is_empty(), "기본 설정은 퇴장 레코드를 제거");

    let last = session_log.recent(1).pop().unwrap();
    assert_eq!(
        last.event,
        SessionEvent::Left { client_id: 1, name: "Finn".to_string(), reason: "peer closed".to_string() }
    );

    println!("✅ 연결 종료 정리 테스트 통과");
}

/// 퇴장 레코드 보존 테스트
#[tokio::test]
async fn test_retained_dead_record_until_purge() {
    let mut config = test_config();
    config.retain_dead_records = true;
    let (handler, registry, _) = create_handler(config);

    let (task, client) = spawn_connection(&handler, 50010);
    let (rd, mut wr) = split(client);
    let mut rd = BufReader::new(rd);

    wr.write_all(b"Gus\n").await.unwrap();
    assert!(read_server_line(&mut rd).await.is_some());
    drop(wr);
    drop(rd);
    timeout(TEST_WAIT, task).await.unwrap().unwrap().unwrap();

    let all = registry.list_all();
    assert_eq!(all.len(), 1);
    assert!(!all[0].alive);
    assert!(registry.list_active().is_empty());

    assert_eq!(registry.purge_dead(), 1);
    assert!(registry.list_all().is_empty());

    println!("✅ 퇴장 레코드 보존 테스트 통과");
}

/// 입장 중 서버 종료 테스트
#[tokio::test]
async fn test_admission_closes_when_admissions_stop() {
    let mut config = test_config();
    config.admission_mode = AdmissionMode::Prompt;
    config.admission_timeout_ms = 60_000;
    let (handler, registry, session_log) = create_handler(config);

    let (task, client) = spawn_connection(&handler, 50011);
    let (rd, _wr) = split(client);
    let mut rd = BufReader::new(rd);
    assert_eq!(read_server_line(&mut rd).await.as_deref(), Some("Enter your name:"));

    registry.stop_admissions();
    let outcome = timeout(TEST_WAIT, task)
        .await
        .expect("입장 대기 중인 핸들러가 끝나지 않음")
        .unwrap()
        .unwrap();

    assert_eq!(outcome.reason, DisconnectReason::ServerShutdown);
    assert_eq!(outcome.final_state, ConnectionState::Closed);
    assert_eq!(outcome.display_name, "Student1");
    assert_eq!(read_server_line(&mut rd).await, None, "연결이 닫혀야 함");
    assert!(registry.list_all().is_empty());
    assert!(session_log.is_empty(), "등록되지 않은 연결은 기록하지 않음");

    println!("✅ 입장 중 종료 테스트 통과");
}

/// 실시간 수신 메시지 수 테스트
#[tokio::test]
async fn test_live_message_count_on_record() {
    let (handler, registry, _) = create_handler(test_config());

    let (_task, client) = spawn_connection(&handler, 50012);
    let (rd, mut wr) = split(client);
    let mut rd = BufReader::new(rd);

    wr.write_all(b"Hana\n").await.unwrap();
    assert!(read_server_line(&mut rd).await.is_some());
    wr.write_all(b"first\n\nsecond\n").await.unwrap();

    let counted = wait_until(|| {
        registry
            .list_active()
            .first()
            .map_or(false, |client| client.messages == 2)
    })
    .await;
    assert!(counted, "빈 줄을 제외한 메시지 2건이 집계되어야 함");

    println!("✅ 실시간 메시지 수 테스트 통과");
}
