//! 프로토콜 설정

use crate::frame::FramingMode;
use crate::{
    DEFAULT_DIAL_RETRY_DELAY_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT,
    DEFAULT_RECV_BUFFER_SIZE, DEFAULT_SERVER_ADDRESS,
};

/// TGEN 프로토콜 설정
///
/// 주소/포트는 프로세스 전역 설정이며 세션마다 협상하지 않음
#[derive(Debug, Clone)]
pub struct Config {
    /// 서버 주소 (생성기가 바인드, 수신기가 접속)
    pub server_address: String,

    /// TCP 포트
    pub port: u16,

    /// 수신 버퍼 크기 (바이트)
    pub recv_buffer_size: usize,

    /// 수신측 유휴 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,

    /// 접속 실패 시 재시도 간격 (밀리초)
    pub dial_retry_delay_ms: u64,

    /// 패킷 프레이밍 모드
    /// Delimited가 원본 와이어 포맷 (청크 단위 카운팅 유지)
    pub framing: FramingMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            dial_retry_delay_ms: DEFAULT_DIAL_RETRY_DELAY_MS,
            framing: FramingMode::Delimited,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 교정 프레이밍 설정 (패킷마다 4바이트 길이 프리픽스)
    ///
    /// 수신측이 읽기 단위가 아니라 길이 기준으로 패킷 경계를 복원함
    pub fn length_prefixed() -> Self {
        Self {
            framing: FramingMode::LengthPrefixed,
            ..Self::default()
        }
    }

    /// 접속 대상 주소 문자열
    pub fn server_endpoint(&self) -> String {
        format!("{}:{}", self.server_address, self.port)
    }
}
