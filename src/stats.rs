//! 전송 통계
//!
//! 송신/수신 양측이 공유하는 파생 지표 계산.
//! 상속 없이 독립 함수로 구성되며 결과는 표시용 텍스트 라인.

use std::time::Instant;

use tracing::{info, warn};

/// 수신 1회분 결과
///
/// 한 세션의 수신 패스가 끝날 때 생성되고 통계 엔진이 1회 소비함
#[derive(Debug, Clone, Copy)]
pub struct ReceptionOutcome {
    /// 세션 ID (헤더에서 복원)
    pub session_id: u32,

    /// 송신측이 선언한 패킷 수
    pub expected_packet_count: u32,

    /// 관측된 패킷 수 (마커가 아닌 읽기 횟수)
    ///
    /// TCP 읽기 단위에 따라 논리 패킷 수와 다를 수 있음
    pub observed_packet_count: u32,

    /// 읽은 총 바이트
    pub total_bytes_read: u64,

    /// 헤더 판독 완료 시각
    pub started_at: Instant,

    /// 수신 루프 종료 시각
    pub finished_at: Instant,
}

/// 송신측 통계 라인 생성
///
/// 경과 시간이 측정 불가능하면 처리율을 계산하지 않음
pub fn generator_report(packets_sent: u32, total_bytes: u64, started_at: Instant) -> Vec<String> {
    let elapsed = match Instant::now().checked_duration_since(started_at) {
        Some(d) if !d.is_zero() => d,
        _ => {
            warn!("Transfer time is too short to measure");
            return vec!["Transfer time is too short to measure.".to_string()];
        }
    };

    let seconds = elapsed.as_secs_f64();
    let speed = total_bytes as f64 / (1024.0 * seconds);

    info!("Sent {} packets in {:.2} seconds", packets_sent, seconds);
    info!("Transfer speed: {:.2} KB/s", speed);

    vec![
        format!("Sent {} packets in {:.2} seconds.", packets_sent, seconds),
        format!("Transfer speed: {:.2} KB/s.", speed),
    ]
}

/// 수신측 통계 라인 생성
///
/// 패킷 0개면 0으로 나누지 않고 즉시 종료
pub fn receiver_report(outcome: &ReceptionOutcome) -> Vec<String> {
    if outcome.observed_packet_count == 0 {
        warn!("No packets received");
        return vec!["No packets received.".to_string()];
    }

    let elapsed = outcome
        .finished_at
        .checked_duration_since(outcome.started_at)
        .unwrap_or_default();
    let millis = elapsed.as_secs_f64() * 1000.0;
    let seconds = elapsed.as_secs_f64();

    let mut lines = vec![
        format!(
            "Received {} packets in {:.2} ms.",
            outcome.observed_packet_count, millis
        ),
        format!(
            "Average delay per packet: {:.2} ms.",
            millis / outcome.observed_packet_count as f64
        ),
    ];
    info!(
        "Received {} packets in {:.2} ms",
        outcome.observed_packet_count, millis
    );

    if seconds > 0.0 {
        let speed = outcome.total_bytes_read as f64 / (1024.0 * seconds);
        info!("Receiving speed: {:.2} KB/s", speed);
        lines.push(format!("Receiving speed: {:.2} KB/s", speed));
    } else {
        warn!("Transfer time is too short to measure speed");
        lines.push("Transfer time is too short to measure speed.".to_string());
    }

    lines
}

/// 손실률 라인 생성
///
/// 선언 수가 0이면 출력 없음. 손실 수는 부호 있는 값으로,
/// 관측 읽기가 선언보다 많으면 음수 손실률이 나옴 (의도적으로 유지)
pub fn loss_report(observed: u32, expected: u32) -> Option<String> {
    if expected == 0 {
        warn!("Expected packet count is zero, cannot calculate packet loss");
        return None;
    }

    let lost = observed as i64 - expected as i64;
    let loss_percent = lost as f64 / observed as f64 * 100.0;

    info!("Packet loss: {:.2}%", loss_percent);
    Some(format!("Packet loss: {:.2}%.", loss_percent))
}
