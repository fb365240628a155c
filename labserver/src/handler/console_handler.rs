//! 운영자 콘솔 핸들러
//!
//! 교사용 텍스트 명령 셸입니다. 랩 서비스의 제어 기능만 호출하고 결과를 출력합니다.
//!
//! | 명령             | 동작                                  |
//! |------------------|---------------------------------------|
//! | `l` / 빈 줄      | 대시보드 출력                          |
//! | `r<id> [text]`   | 학생 한 명에게 답장                    |
//! | `a [text]`       | 전체 공지                             |
//! | `k<id>`          | 강제 퇴장                             |
//! | `h [n]`          | 최근 세션 로그 n개 (기본 20)           |
//! | `p`              | 보존된 사망 레코드 정리                |
//! | `q`              | 종료                                  |
//!
//! `r`과 `a`에 텍스트가 없으면 다음 줄을 텍스트로 읽습니다.
//! 출력 가능한 ASCII가 하나도 없는 텍스트는 보내지 않습니다.

use std::fmt::Write as _;

use anyhow::Result;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::protocol::sanitize;
use crate::service::client_registry::{ClientSummary, RegistryStats};
use crate::service::lab_service::LabService;
use crate::tool::SimpleUtils;

/// 기본 로그 조회 개수
pub const DEFAULT_HISTORY_COUNT: usize = 20;

/// 도움말
pub const HELP: &str =
    "Commands: l (list) | r<id> [text] (reply) | a [text] (all) | k<id> (kick) | h [n] (history) | p (purge) | q (quit)";

/// 대시보드 이름 열 너비
const NAME_COLUMN_CHARS: usize = 10;

/// 운영자 명령
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Dashboard,
    Reply { client_id: u32, text: Option<String> },
    Broadcast { text: Option<String> },
    Kick { client_id: u32 },
    History { count: usize },
    Purge,
    Quit,
}

/// 명령 해석 에러
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("invalid student id: {0}")]
    BadTarget(String),

    #[error("invalid count: {0}")]
    BadCount(String),
}

/// 한 줄을 운영자 명령으로 해석합니다.
pub fn parse_command(line: &str) -> Result<OperatorCommand, CommandError> {
    let line = line.trim();
    if line.is_empty() || line == "l" {
        return Ok(OperatorCommand::Dashboard);
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, non_empty(rest)),
        None => (line, None),
    };

    match head {
        "q" => Ok(OperatorCommand::Quit),
        "p" => Ok(OperatorCommand::Purge),
        "a" => Ok(OperatorCommand::Broadcast { text: rest }),
        "h" => {
            let count = match rest {
                None => DEFAULT_HISTORY_COUNT,
                Some(raw) => raw.parse().map_err(|_| CommandError::BadCount(raw))?,
            };
            Ok(OperatorCommand::History { count })
        }
        _ if head.starts_with('r') => Ok(OperatorCommand::Reply {
            client_id: parse_target(&head[1..])?,
            text: rest,
        }),
        _ if head.starts_with('k') && rest.is_none() => Ok(OperatorCommand::Kick {
            client_id: parse_target(&head[1..])?,
        }),
        _ => Err(CommandError::Unknown(line.to_string())),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// 학생에게 실제로 전달될 글자가 있는 텍스트만 통과
fn sendable(text: Option<String>) -> Option<String> {
    text.filter(|text| !sanitize(text.as_bytes()).is_empty())
}

fn parse_target(raw: &str) -> Result<u32, CommandError> {
    match raw.parse::<u32>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(CommandError::BadTarget(raw.to_string())),
    }
}

/// 대시보드 문자열
pub fn render_dashboard(clients: &[ClientSummary], stats: &RegistryStats) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "=== Lab dashboard: {} live / {} peak / {} total ===",
        stats.current_live, stats.peak_live, stats.total_admitted
    );

    if clients.is_empty() {
        let _ = writeln!(out, "(no students connected)");
        return out;
    }

    let _ = writeln!(
        out,
        "{:>4}  {:<10}  {:<21}  {:<8}  {:>5}  {}",
        "ID", "NAME", "ADDRESS", "SINCE", "MSGS", "STATUS"
    );
    for client in clients {
        let status = if client.alive { "🟢" } else { "🔴" };
        let _ = writeln!(
            out,
            "{:>4}  {:<10}  {:<21}  {:<8}  {:>5}  {}",
            client.id,
            SimpleUtils::truncate_chars(&client.name, NAME_COLUMN_CHARS),
            client.address.to_string(),
            SimpleUtils::clock_string(&client.connected_at),
            client.messages,
            status
        );
    }
    out
}

/// 운영자 콘솔
pub struct ConsoleHandler<'a> {
    service: &'a LabService,
}

impl<'a> ConsoleHandler<'a> {
    pub fn new(service: &'a LabService) -> Self {
        Self { service }
    }

    /// 입력이 끝나거나 `q`가 들어올 때까지 명령을 처리합니다.
    ///
    /// 입력 끝은 `q`와 같습니다. 종료 자체는 호출자가 수행합니다.
    pub async fn run<W>(&self, mut input: mpsc::Receiver<String>, mut output: W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        output.write_all(format!("{}\n", HELP).as_bytes()).await?;
        output.flush().await?;

        while let Some(line) = input.recv().await {
            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(e) => {
                    debug!("잘못된 운영자 명령: {}", e);
                    Self::print(&mut output, &format!("❌ {}\n{}", e, HELP)).await?;
                    continue;
                }
            };

            if command == OperatorCommand::Quit {
                info!("운영자 종료 명령 수신");
                return Ok(());
            }

            let response = self.execute(command, &mut input, &mut output).await?;
            Self::print(&mut output, &response).await?;
        }

        info!("운영자 입력 종료");
        Ok(())
    }

    async fn execute<W>(
        &self,
        command: OperatorCommand,
        input: &mut mpsc::Receiver<String>,
        output: &mut W,
    ) -> Result<String>
    where
        W: AsyncWrite + Unpin,
    {
        let response = match command {
            OperatorCommand::Dashboard => {
                render_dashboard(&self.service.list_all(), &self.service.stats())
            }
            OperatorCommand::Reply { client_id, text } => {
                let text = match text {
                    Some(text) => Some(text),
                    None => Self::read_text(&format!("Reply to #{}: ", client_id), input, output).await?,
                };
                match sendable(text) {
                    None => "❌ Empty message, nothing sent".to_string(),
                    Some(text) => match self.service.reply(client_id, &text).await {
                        Ok(sent) => format!("✅ Replied #{}", sent.client_id),
                        Err(_) => format!("❌ #{} offline", client_id),
                    },
                }
            }
            OperatorCommand::Broadcast { text } => {
                let text = match text {
                    Some(text) => Some(text),
                    None => Self::read_text("Message to all: ", input, output).await?,
                };
                match sendable(text) {
                    None => "❌ Empty message, nothing sent".to_string(),
                    Some(text) => {
                        let delivered = self.service.broadcast(&text).await;
                        format!("📢 Sent to {} students", delivered)
                    }
                }
            }
            OperatorCommand::Kick { client_id } => {
                if self.service.kick(client_id).await {
                    format!("🚫 Kicked #{}", client_id)
                } else {
                    format!("❌ #{} is not connected", client_id)
                }
            }
            OperatorCommand::History { count } => {
                let entries = self.service.recent_history(count);
                if entries.is_empty() {
                    "(session log is empty)".to_string()
                } else {
                    entries
                        .iter()
                        .map(|entry| entry.to_string())
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            OperatorCommand::Purge => {
                format!("🧹 Purged {} dead records", self.service.purge_dead())
            }
            OperatorCommand::Quit => String::new(),
        };
        Ok(response)
    }

    /// 프롬프트를 출력하고 다음 줄을 텍스트로 읽습니다. 비었으면 `None`.
    async fn read_text<W>(
        prompt: &str,
        input: &mut mpsc::Receiver<String>,
        output: &mut W,
    ) -> Result<Option<String>>
    where
        W: AsyncWrite + Unpin,
    {
        output.write_all(prompt.as_bytes()).await?;
        output.flush().await?;
        Ok(input.recv().await.and_then(|line| non_empty(&line)))
    }

    async fn print<W>(output: &mut W, text: &str) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        output.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            output.write_all(b"\n").await?;
        }
        output.flush().await?;
        Ok(())
    }
}
