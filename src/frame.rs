//! 세션 프레이밍 정의
//!
//! 헤더 코덱, 종료 마커 판별, 패킷 생성.
//! 송신/수신 상태 기계가 공유하는 유일한 와이어 포맷 로직.

use bytes::Bytes;
use rand::RngCore;

use crate::{SESSION_END_MARKER, SESSION_HEADER_LEN};

/// 길이 프리픽스 모드의 세션 종료 예약값
pub const LENGTH_PREFIX_END: u32 = 0;

/// 패킷 프레이밍 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    /// 원본 와이어 포맷: 경계 없는 패킷 스트림 + `END` 마커
    ///
    /// 수신측은 읽기 1회를 패킷 1개로 세며, 마커는 읽기 말미에
    /// 통째로 들어올 때만 검출됨 (알려진 한계, 의도적으로 유지)
    Delimited,

    /// 교정 포맷: 패킷마다 4바이트 빅엔디언 길이 프리픽스,
    /// 길이 0이 세션 종료
    LengthPrefixed,
}

impl FramingMode {
    /// CLI 인자 문자열 파싱
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delimited" => Some(Self::Delimited),
            "length-prefixed" => Some(Self::LengthPrefixed),
            _ => None,
        }
    }
}

/// 세션 헤더
///
/// 모든 세션의 패킷 스트림에 선행하는 8바이트:
/// 세션 ID 4바이트 + 선언된 패킷 수 4바이트, 빅엔디언
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHeader {
    /// 세션 ID (프로세스 수명 내 1부터 단조 증가)
    pub session_id: u32,

    /// 송신측이 선언한 패킷 수
    pub packet_count: u32,
}

impl SessionHeader {
    pub fn new(session_id: u32, packet_count: u32) -> Self {
        Self {
            session_id,
            packet_count,
        }
    }

    /// 와이어 인코딩
    pub fn encode(&self) -> [u8; SESSION_HEADER_LEN] {
        let mut buf = [0u8; SESSION_HEADER_LEN];
        buf[..4].copy_from_slice(&self.session_id.to_be_bytes());
        buf[4..].copy_from_slice(&self.packet_count.to_be_bytes());
        buf
    }

    /// 와이어 디코딩
    pub fn decode(buf: &[u8; SESSION_HEADER_LEN]) -> Self {
        let session_id = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let packet_count = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Self {
            session_id,
            packet_count,
        }
    }
}

/// 패킷 생성
///
/// 매 호출마다 새로 생성한 의사난수 바이트. 재사용/중복 제거 없음.
pub fn generate_packet(size: usize) -> Bytes {
    let mut data = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut data);
    Bytes::from(data)
}

/// 종료 마커 판별
///
/// 해당 읽기의 마지막 3바이트가 `END`와 일치할 때만 true.
/// 청크 경계를 넘는 재조립은 하지 않음.
pub fn chunk_ends_with_marker(chunk: &[u8]) -> bool {
    if chunk.len() < SESSION_END_MARKER.len() {
        return false;
    }
    &chunk[chunk.len() - SESSION_END_MARKER.len()..] == SESSION_END_MARKER
}
