//! # TGEN (TCP Traffic Generator)
//!
//! 단일 TCP 스트림 기반 점대점 트래픽 생성기/수신기
//!
//! ## 핵심 특징
//! - **세션 프레이밍**: 8바이트 헤더(세션 ID + 패킷 수) 뒤에 패킷 스트림, `END` 종료 마커
//! - **속도 제어**: 패킷 간 지연으로 부하 조절 (coarse pacing)
//! - **통계 엔진**: 처리율(KB/s), 패킷당 평균 지연, 손실률 계산
//! - **단일 클라이언트**: 순차 세션만 지원, 멀티플렉싱 없음
//! - **교정 프레이밍(선택)**: 길이 프리픽스 모드로 패킷 경계를 결정적으로 복원

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod generator;
pub mod receiver;
pub mod report;
pub mod stats;

pub use config::Config;
pub use connection::{dial, listen, Listener, Peer};
pub use error::{Error, Result};
pub use frame::{FramingMode, SessionHeader};
pub use generator::{Generator, SessionParams};
pub use receiver::Receiver;
pub use report::{ReportReceiver, Reporter};
pub use stats::ReceptionOutcome;

/// 기본 TCP 포트
pub const DEFAULT_PORT: u16 = 12345;

/// 기본 서버 주소 (루프백)
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";

/// 세션 헤더 크기 (바이트): 세션 ID 4 + 패킷 수 4
pub const SESSION_HEADER_LEN: usize = 8;

/// 세션 종료 마커
pub const SESSION_END_MARKER: &[u8; 3] = b"END";

/// 수신 버퍼 크기 (바이트)
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1024;

/// 길이 프리픽스 모드에서 수용하는 패킷 길이 상한 (바이트)
///
/// 피어가 선언한 길이만큼 할당하므로 악의적/손상된 길이로부터 보호함
pub const MAX_PACKET_LEN: u32 = 16 * 1024 * 1024;

/// 수신측 유휴 폴링 간격 (밀리초)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// 접속 재시도 간격 (밀리초)
pub const DEFAULT_DIAL_RETRY_DELAY_MS: u64 = 2000;
