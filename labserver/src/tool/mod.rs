//! 랩 서버 공통 유틸리티 모듈
//!
//! 에러 처리, 문자열/시각 변환 등 공통 기능을 제공합니다.

pub mod error;
pub mod simple_utils;

pub use error::{ErrorHandler, ErrorSeverity, LabResult, LabServerError, StreamClosed};
pub use simple_utils::*;
