//! 라인 프레이머 테스트
//!
//! FramedReader의 재조립, 정제, 종료 처리 테스트

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{duplex, AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::time::{sleep, timeout, Duration};

use crate::protocol::FramedReader;
use crate::tool::StreamClosed;

/// 데이터를 한 번 돌려준 뒤 읽기 에러를 내는 리더
struct FailingReader {
    data: Option<Vec<u8>>,
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.data.take() {
            Some(data) => {
                buf.put_slice(&data);
                Poll::Ready(Ok(()))
            }
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
        }
    }
}

/// 제어 문자 정제 테스트
#[tokio::test]
async fn test_control_bytes_are_dropped() {
    let (mut client, server) = duplex(64);
    let mut reader = FramedReader::new(server, 1024);

    client.write_all(b"Hi\x07\x00there\n").await.unwrap();
    assert_eq!(reader.read_line().await, Ok("Hithere".to_string()));

    println!("✅ 제어 문자 정제 테스트 통과");
}

/// 나눠 도착한 메시지 재조립 테스트
#[tokio::test]
async fn test_split_reads_are_joined() {
    let (mut client, server) = duplex(64);
    let mut reader = FramedReader::new(server, 1024);

    tokio::spawn(async move {
        client.write_all(b"Hel").await.unwrap();
        sleep(Duration::from_millis(20)).await;
        client.write_all(b"lo\r\nWorld\n").await.unwrap();
        sleep(Duration::from_millis(20)).await;
    });

    assert_eq!(reader.read_line().await, Ok("Hello".to_string()));
    assert_eq!(reader.read_line().await, Ok("World".to_string()));

    println!("✅ 분할 수신 재조립 테스트 통과");
}

/// 빈 라인 테스트
#[tokio::test]
async fn test_empty_line_is_reported() {
    let (mut client, server) = duplex(64);
    let mut reader = FramedReader::new(server, 1024);

    client.write_all(b"\r\n \x01 \nnext\n").await.unwrap();
    assert_eq!(reader.read_line().await, Ok(String::new()));
    assert_eq!(reader.read_line().await, Ok(String::new()));
    assert_eq!(reader.read_line().await, Ok("next".to_string()));

    println!("✅ 빈 라인 테스트 통과");
}

/// 긴 라인 분할 테스트
#[tokio::test]
async fn test_overlong_line_is_bounded() {
    let (mut client, server) = duplex(64);
    let mut reader = FramedReader::new(server, 8);

    let mut payload = vec![b'a'; 20];
    payload.push(b'\n');
    client.write_all(&payload).await.unwrap();

    assert_eq!(reader.read_line().await, Ok("aaaaaaaa".to_string()));
    assert_eq!(reader.read_line().await, Ok("aaaaaaaa".to_string()));
    assert_eq!(reader.read_line().await, Ok("aaaa".to_string()));

    println!("✅ 긴 라인 분할 테스트 통과");
}

/// 정상 종료 시 남은 데이터 테스트
#[tokio::test]
async fn test_remainder_then_orderly_close() {
    let (mut client, server) = duplex(64);
    let mut reader = FramedReader::new(server, 1024);

    client.write_all(b"done\npartial").await.unwrap();
    drop(client);

    assert_eq!(reader.read_line().await, Ok("done".to_string()));
    assert_eq!(reader.read_line().await, Ok("partial".to_string()));
    assert_eq!(reader.read_line().await, Err(StreamClosed::Orderly));
    // 이후 호출도 같은 결과
    assert_eq!(reader.read_line().await, Err(StreamClosed::Orderly));
    assert!(reader.is_closed());

    println!("✅ 정상 종료 테스트 통과");
}

/// 비정상 종료 테스트
#[tokio::test]
async fn test_read_error_is_abrupt_close() {
    let reader = FailingReader {
        data: Some(b"abc\nxyz".to_vec()),
    };
    let mut reader = FramedReader::new(reader, 1024);

    assert_eq!(reader.read_line().await, Ok("abc".to_string()));
    assert_eq!(reader.read_line().await, Ok("xyz".to_string()));

    match reader.read_line().await {
        Err(StreamClosed::Abrupt(reason)) => assert!(reason.contains("reset")),
        other => panic!("비정상 종료가 보고되어야 함: {:?}", other),
    }
    assert!(matches!(reader.read_line().await, Err(StreamClosed::Abrupt(_))));

    println!("✅ 비정상 종료 테스트 통과");
}

/// 취소 후 재사용 테스트
#[tokio::test]
async fn test_cancelled_read_loses_nothing() {
    let (mut client, server) = duplex(64);
    let mut reader = FramedReader::new(server, 1024);

    client.write_all(b"half").await.unwrap();
    let first = timeout(Duration::from_millis(50), reader.read_line()).await;
    assert!(first.is_err(), "구분자 전에는 라인이 나오면 안 됨");

    client.write_all(b" line\n").await.unwrap();
    assert_eq!(reader.read_line().await, Ok("half line".to_string()));

    println!("✅ 취소 안전성 테스트 통과");
}
