//! 간단한 공통 유틸리티

use chrono::{DateTime, Local, Utc};

/// 간단한 데이터 유틸리티
pub struct SimpleUtils;

impl SimpleUtils {
    /// UTC 시각을 로컬 `HH:MM:SS` 문자열로 변환
    ///
    /// 세션 로그와 대시보드 표시용입니다.
    pub fn clock_string(at: &DateTime<Utc>) -> String {
        at.with_timezone(&Local).format("%H:%M:%S").to_string()
    }

    /// 문자 단위로 문자열 자르기
    ///
    /// 바이트가 아닌 문자 개수 기준으로 자르므로 멀티바이트 문자도 안전합니다.
    /// 잘린 뒤 끝에 남은 공백은 제거합니다.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// assert_eq!(SimpleUtils::truncate_chars("Hello World", 6), "Hello");
    /// ```
    pub fn truncate_chars(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
            None => text.to_string(),
        }
    }
}
