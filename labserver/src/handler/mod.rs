//! 핸들러 모듈
//!
//! 학생 연결과 운영자 콘솔 처리를 담당합니다.

pub mod connection_handler;
pub mod console_handler;

pub use connection_handler::{
    resolve_display_name, ConnectionHandler, ConnectionOutcome, ConnectionState,
};
pub use console_handler::{parse_command, render_dashboard, CommandError, ConsoleHandler, OperatorCommand};
