//! 랩 채팅 와이어 프로토콜 정의
//!
//! 학생 클라이언트와 서버 간 통신은 TCP 위의 평문 텍스트 라인입니다.
//!
//! # 프로토콜 구조
//!
//! **서버 → 클라이언트:** 메시지 하나당 한 줄, `\r\n`으로 끝납니다.
//! ```text
//! Enter your name:
//! [SYS] Connected as Alice (#1)! Send messages to teacher.
//! [DM] Teacher: <text>
//! [ALL] Teacher: <text>
//! [SYS] You have been removed from the lab by the teacher.
//! ```
//!
//! **클라이언트 → 서버:** `\n`으로 끝나는 라인. 재조립과 정제는 [`framer`]가 담당합니다.
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! let message = ServerMessage::Reply { text: "Good job".to_string() };
//! assert_eq!(message.to_line(), "[DM] Teacher: Good job\r\n");
//! ```

pub mod framer;

pub use framer::{sanitize, FramedReader, LineFramer};

/// 라인 종결자
pub const LINE_TERMINATOR: &str = "\r\n";

/// 이름 요청 프롬프트
pub const NAME_PROMPT: &str = "Enter your name:";

/// 1:1 답장 태그
pub const TAG_DIRECT: &str = "[DM]";

/// 전체 공지 태그
pub const TAG_BROADCAST: &str = "[ALL]";

/// 서버 알림 태그
pub const TAG_SYSTEM: &str = "[SYS]";

/// 서버가 학생에게 보내는 메시지
///
/// - **NamePrompt**: 입장 시 이름 요청
/// - **Welcome**: 입장 완료 알림
/// - **Reply**: 교사의 1:1 답장
/// - **Broadcast**: 교사의 전체 공지
/// - **Kicked**: 강제 퇴장 알림
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    NamePrompt,
    Welcome { client_id: u32, name: String },
    Reply { text: String },
    Broadcast { text: String },
    Kicked,
}

impl ServerMessage {
    /// 종결자를 포함한 와이어 라인
    ///
    /// 운영자 텍스트는 출력 가능한 ASCII로 축소되므로 한 줄 프레이밍이 깨지지 않습니다.
    pub fn to_line(&self) -> String {
        let body = match self {
            Self::NamePrompt => NAME_PROMPT.to_string(),
            Self::Welcome { client_id, name } => format!(
                "{} Connected as {} (#{})! Send messages to teacher.",
                TAG_SYSTEM,
                sanitize(name.as_bytes()),
                client_id
            ),
            Self::Reply { text } => {
                format!("{} Teacher: {}", TAG_DIRECT, sanitize(text.as_bytes()))
            }
            Self::Broadcast { text } => {
                format!("{} Teacher: {}", TAG_BROADCAST, sanitize(text.as_bytes()))
            }
            Self::Kicked => format!(
                "{} You have been removed from the lab by the teacher.",
                TAG_SYSTEM
            ),
        };
        body + LINE_TERMINATOR
    }

    /// 소켓에 쓸 바이트
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_line().into_bytes()
    }
}

/// 수신한 서버 라인의 종류
///
/// 클라이언트 측 표시와 테스트에서 사용합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Direct,
    Broadcast,
    System,
    Prompt,
    Unknown,
}

impl MessageKind {
    /// `\n`과 `\r\n` 모두 허용
    pub fn of(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.starts_with(TAG_DIRECT) {
            Self::Direct
        } else if line.starts_with(TAG_BROADCAST) {
            Self::Broadcast
        } else if line.starts_with(TAG_SYSTEM) {
            Self::System
        } else if line == NAME_PROMPT {
            Self::Prompt
        } else {
            Self::Unknown
        }
    }
}
