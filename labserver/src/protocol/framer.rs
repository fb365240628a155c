//! 라인 프레이머
//!
//! TCP 바이트 스트림을 정제된 텍스트 라인 시퀀스로 변환합니다.
//!
//! 한 번의 읽기가 한 메시지라는 가정을 하지 않습니다. 여러 번에 나눠 도착한
//! 메시지는 `\n`까지 모아서 합치고, 한 번에 여러 줄이 도착하면 하나씩 꺼냅니다.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::tool::error::StreamClosed;

/// 한 번의 소켓 읽기 크기
const READ_CHUNK_SIZE: usize = 1024;

/// 출력 가능한 ASCII `[32, 126]` 범위 밖의 바이트를 모두 버리고 앞뒤 공백을 제거합니다.
///
/// `\r`, NUL, BEL, 텔넷 협상 바이트, 비 ASCII 바이트가 모두 제거됩니다.
///
/// # Examples
///
/// ```rust,ignore
/// assert_eq!(sanitize(b"Hi\x07\x00there"), "Hithere");
/// ```
pub fn sanitize(bytes: &[u8]) -> String {
    let kept: String = bytes
        .iter()
        .filter(|b| (32..=126).contains(*b))
        .map(|&b| b as char)
        .collect();
    kept.trim().to_string()
}

/// 버퍼 기반 라인 재조립기
///
/// I/O를 하지 않는 순수 상태 기계입니다. [`FramedReader`]가 소켓에서 읽은
/// 바이트를 넣고 완성된 라인을 꺼냅니다.
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    max_line_bytes: usize,
}

impl LineFramer {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    /// 수신 바이트 추가
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// 완성된 라인 하나를 꺼냅니다.
    ///
    /// 구분자 없이 `max_line_bytes`를 넘긴 라인은 그 길이에서 잘라 한 메시지로 내보냅니다.
    pub fn next_line(&mut self) -> Option<String> {
        let window = self.buffer.len().min(self.max_line_bytes + 1);

        if let Some(pos) = self.buffer[..window].iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            return Some(sanitize(&line[..pos]));
        }

        if self.buffer.len() > self.max_line_bytes {
            let line = self.buffer.split_to(self.max_line_bytes);
            return Some(sanitize(&line));
        }

        None
    }

    /// 스트림 종료 시 남은 미완성 라인
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        Some(sanitize(&rest))
    }

    /// 버퍼에 남아 있는 바이트 수
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// 비동기 스트림 위의 라인 리더
///
/// 종료가 감지되면 남은 버퍼를 먼저 내보내고, 그 이후의 모든 호출은
/// 같은 [`StreamClosed`] 원인을 반환합니다. 재시도하지 않습니다.
///
/// `read_line`은 취소해도 안전합니다. 읽은 바이트는 `await` 사이에
/// 버퍼로 옮겨지므로 `select!`에서 다른 분기가 선택되어도 데이터를 잃지 않습니다.
pub struct FramedReader<R> {
    reader: R,
    framer: LineFramer,
    closed: Option<StreamClosed>,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            framer: LineFramer::new(max_line_bytes),
            closed: None,
            chunk: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// 다음 라인 읽기
    ///
    /// 빈 문자열은 "내용 없음" 라인입니다 (예: 제어 문자만 있던 라인).
    pub async fn read_line(&mut self) -> Result<String, StreamClosed> {
        loop {
            if let Some(line) = self.framer.next_line() {
                return Ok(line);
            }

            if let Some(reason) = &self.closed {
                return match self.framer.take_remainder() {
                    Some(rest) => Ok(rest),
                    None => Err(reason.clone()),
                };
            }

            match self.reader.read(&mut self.chunk).await {
                Ok(0) => self.closed = Some(StreamClosed::Orderly),
                Ok(n) => self.framer.push(&self.chunk[..n]),
                Err(e) => self.closed = Some(StreamClosed::Abrupt(e.to_string())),
            }
        }
    }

    /// 스트림 종료 여부 (남은 버퍼와 무관)
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }
}
