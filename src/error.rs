//! 에러 타입 정의

use thiserror::Error;

/// TGEN 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("포트 {port} 이미 사용 중")]
    AddressInUse { port: u16 },

    #[error("바인드 실패: {0}")]
    Bind(std::io::Error),

    #[error("세션 헤더 읽기 실패")]
    HeaderTruncated,

    #[error("선언된 패킷 길이 초과: {len} 바이트")]
    FrameTooLarge { len: u32 },

    #[error("연결 끊김")]
    ConnectionBroken,

    #[error("연결된 피어 없음")]
    ConnectionClosed,

    #[error("대기 중 인터럽트")]
    Interrupted,

    #[error("유효하지 않은 입력: {0}")]
    InvalidInput(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
