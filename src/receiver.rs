//! 트래픽 수신기 (접속측)
//!
//! - 고정 간격 재시도 dial
//! - 유휴 폴링 루프: 데이터 없으면 잠시 쉬고 재폴링
//! - 세션 단위 수신 패스: 헤더 → 청크 읽기 → 마커/EOF 종료
//! - 수신 결과를 통계 엔진으로 전달

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::connection::{dial, Peer};
use crate::frame::{self, FramingMode, SessionHeader, LENGTH_PREFIX_END};
use crate::report::Reporter;
use crate::stats::{self, ReceptionOutcome};
use crate::{Config, Error, Result, MAX_PACKET_LEN, SESSION_HEADER_LEN};

/// 트래픽 수신기 엔드포인트
pub struct Receiver {
    config: Config,
    reporter: Reporter,
    running: AtomicBool,
    cancel: Notify,
}

impl Receiver {
    /// 새 수신기 생성
    pub fn new(config: Config, reporter: Reporter) -> Self {
        Self {
            config,
            reporter,
            running: AtomicBool::new(true),
            cancel: Notify::new(),
        }
    }

    /// 생성기에 접속 (성공 또는 취소까지 고정 간격 재시도)
    pub async fn connect(&self) -> Result<TcpStream> {
        dial(
            &self.config.server_address,
            self.config.port,
            Duration::from_millis(self.config.dial_retry_delay_ms),
            &self.cancel,
            &self.reporter,
        )
        .await
    }

    /// 수신 루프 실행
    ///
    /// 연결이 끊기거나 취소될 때까지 같은 연결에서 세션을 반복 처리함.
    /// 종료 시 에러 경로와 무관하게 연결을 닫음 (멱등).
    pub async fn run(&self, stream: TcpStream) -> Result<()> {
        let addr = stream.peer_addr()?;
        let mut peer = Peer::from_stream(stream, addr);

        self.reporter.line("Waiting for data...");
        info!("Waiting for data");

        let result = self.poll_loop(&mut peer).await;

        if let Err(e) = &result {
            match e {
                Error::Interrupted => {
                    warn!("The stream was interrupted");
                    self.reporter.line("The stream was interrupted.");
                }
                Error::HeaderTruncated => {
                    warn!("Failed to read session header from input stream");
                    self.reporter.line("Failed to read session header.");
                }
                _ => {
                    warn!("Error receiving data: {}", e);
                    self.reporter.line(format!("Error receiving data: {}", e));
                }
            }
        }

        peer.close().await;
        result
    }

    /// 유휴 폴링 + 세션 처리 루프
    async fn poll_loop(&self, peer: &mut Peer) -> Result<()> {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        while self.running.load(Ordering::SeqCst) {
            let stream = peer.stream_mut()?;

            // 데이터 대기: poll_interval 안에 안 오면 유휴로 보고 재폴링
            let mut probe = [0u8; 1];
            let peeked = tokio::select! {
                _ = self.cancel.notified() => return Err(Error::Interrupted),
                r = tokio::time::timeout(poll_interval, stream.peek(&mut probe)) => r,
            };

            match peeked {
                // 유휴 상태에서 EOF = 연결 끊김
                Ok(Ok(0)) => {
                    warn!("The connection is broken");
                    return Err(Error::ConnectionBroken);
                }
                Ok(Ok(_)) => {
                    let outcome = run_receive_pass(
                        stream,
                        self.config.recv_buffer_size,
                        self.config.framing,
                        &self.reporter,
                    )
                    .await?;
                    self.report_outcome(&outcome);
                }
                Ok(Err(e)) => return Err(Error::Io(e)),
                // 타임아웃 = 아직 유휴
                Err(_) => continue,
            }
        }

        Ok(())
    }

    /// 세션 결과를 통계 라인으로 변환해 보고
    fn report_outcome(&self, outcome: &ReceptionOutcome) {
        if outcome.observed_packet_count == 0 {
            warn!("No packets received in session # {}", outcome.session_id);
            self.reporter.line("No packets received.");
            return;
        }

        self.reporter.lines(stats::receiver_report(outcome));
        if let Some(line) = stats::loss_report(
            outcome.observed_packet_count,
            outcome.expected_packet_count,
        ) {
            self.reporter.line(line);
        }
        info!(
            "Total packets received: {}",
            outcome.observed_packet_count
        );
    }

    /// 수신 루프 중단 (유휴 폴링 중이면 즉시)
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // 취소 대기자는 한 시점에 하나뿐 (dial 또는 유휴 폴링)
        self.cancel.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// 수신 패스 상태 기계
///
/// AWAITING_HEADER → RECEIVING → SESSION_CLOSED.
///
/// Delimited 모드에서는 읽기 1회를 패킷 1개로 세고, 해당 읽기의
/// 마지막 3바이트가 `END`일 때만 세션 종료로 본다. TCP가 쓰기를
/// 합치거나 쪼개면 관측 수가 논리 패킷 수와 달라진다 (알려진 한계).
async fn run_receive_pass<R: AsyncRead + Unpin>(
    stream: &mut R,
    buffer_size: usize,
    framing: FramingMode,
    reporter: &Reporter,
) -> Result<ReceptionOutcome> {
    // AWAITING_HEADER: 정확히 8바이트
    let mut header_buf = [0u8; SESSION_HEADER_LEN];
    if let Err(e) = stream.read_exact(&mut header_buf).await {
        if e.kind() == ErrorKind::UnexpectedEof {
            return Err(Error::HeaderTruncated);
        }
        return Err(Error::Io(e));
    }
    let header = SessionHeader::decode(&header_buf);

    reporter.line(format!("Receiving session # {}", header.session_id));
    info!("Receiving session # {}", header.session_id);

    let started_at = Instant::now();
    let mut observed = 0u32;
    let mut total_bytes = 0u64;

    match framing {
        FramingMode::Delimited => {
            let mut buf = vec![0u8; buffer_size];
            loop {
                let n = stream.read(&mut buf).await?;
                // EOF = 암묵적 세션 종료 (에러 아님)
                if n == 0 {
                    break;
                }
                if frame::chunk_ends_with_marker(&buf[..n]) {
                    info!("Session end marker received");
                    break;
                }
                observed += 1;
                total_bytes += n as u64;
            }
        }
        FramingMode::LengthPrefixed => loop {
            let mut len_buf = [0u8; 4];
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(Error::Io(e)),
            }
            let len = u32::from_be_bytes(len_buf);
            if len == LENGTH_PREFIX_END {
                info!("Session end frame received");
                break;
            }
            // 선언된 길이만큼 할당하므로 상한을 먼저 검사
            if len > MAX_PACKET_LEN {
                warn!("Declared packet length {} exceeds the limit", len);
                return Err(Error::FrameTooLarge { len });
            }

            let mut payload = vec![0u8; len as usize];
            stream.read_exact(&mut payload).await?;
            observed += 1;
            total_bytes += len as u64;
        },
    }

    Ok(ReceptionOutcome {
        session_id: header.session_id,
        expected_packet_count: header.packet_count,
        observed_packet_count: observed,
        total_bytes_read: total_bytes,
        started_at,
        finished_at: Instant::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{Generator, SessionParams};
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;

    fn reporter() -> Reporter {
        Reporter::channel().0
    }

    async fn write_session(
        stream: &mut (impl tokio::io::AsyncWrite + Unpin),
        session_id: u32,
        declared: u32,
        packets: &[&[u8]],
        end_marker: bool,
    ) {
        stream
            .write_all(&SessionHeader::new(session_id, declared).encode())
            .await
            .unwrap();
        for packet in packets {
            stream.write_all(packet).await.unwrap();
            stream.flush().await.unwrap();
            // 패킷 간 지연으로 읽기당 패킷 1개를 보장 (생성기의 pacing과 동일)
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if end_marker {
            stream.write_all(b"END").await.unwrap();
        }
        stream.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_pass_counts_chunks() {
        let (mut near, mut far) = tokio::io::duplex(1024);

        let writer = tokio::spawn(async move {
            let packets = [[7u8; 100]; 5];
            let refs: Vec<&[u8]> = packets.iter().map(|p| p.as_slice()).collect();
            write_session(&mut near, 1, 5, &refs, true).await;
        });

        let outcome = run_receive_pass(&mut far, 1024, FramingMode::Delimited, &reporter())
            .await
            .unwrap();
        writer.await.unwrap();

        assert_eq!(outcome.session_id, 1);
        assert_eq!(outcome.expected_packet_count, 5);
        assert_eq!(outcome.observed_packet_count, 5);
        assert_eq!(outcome.total_bytes_read, 500);
        assert!(outcome.finished_at >= outcome.started_at);
    }

    #[tokio::test]
    async fn test_receive_pass_eof_is_implicit_end() {
        let (mut near, mut far) = tokio::io::duplex(1024);

        let writer = tokio::spawn(async move {
            write_session(&mut near, 2, 5, &[&[1u8; 100][..], &[2u8; 100][..]], false).await;
            // 마커 없이 스트림 종료
        });

        let outcome = run_receive_pass(&mut far, 1024, FramingMode::Delimited, &reporter())
            .await
            .unwrap();
        writer.await.unwrap();

        assert_eq!(outcome.observed_packet_count, 2);
        assert_eq!(outcome.total_bytes_read, 200);
    }

    #[tokio::test]
    async fn test_receive_pass_zero_packets() {
        let (mut near, mut far) = tokio::io::duplex(1024);

        let writer = tokio::spawn(async move {
            write_session(&mut near, 3, 0, &[], true).await;
        });

        let outcome = run_receive_pass(&mut far, 1024, FramingMode::Delimited, &reporter())
            .await
            .unwrap();
        writer.await.unwrap();

        assert_eq!(outcome.observed_packet_count, 0);
        assert_eq!(outcome.total_bytes_read, 0);
    }

    #[tokio::test]
    async fn test_receive_pass_truncated_header() {
        let (mut near, mut far) = tokio::io::duplex(1024);

        near.write_all(&[0, 0, 0, 1, 0]).await.unwrap();
        drop(near);

        let result = run_receive_pass(&mut far, 1024, FramingMode::Delimited, &reporter()).await;
        assert!(matches!(result, Err(Error::HeaderTruncated)));
    }

    #[tokio::test]
    async fn test_length_prefixed_survives_write_coalescing() {
        // 모든 바이트를 한 번에 밀어 넣어도 길이 기준으로 경계 복원
        let (mut near, mut far) = tokio::io::duplex(64 * 1024);

        let mut wire = Vec::new();
        wire.extend_from_slice(&SessionHeader::new(4, 3).encode());
        for fill in [0xAAu8, 0xBB, 0xCC] {
            wire.extend_from_slice(&200u32.to_be_bytes());
            wire.extend_from_slice(&[fill; 200]);
        }
        wire.extend_from_slice(&0u32.to_be_bytes());
        near.write_all(&wire).await.unwrap();
        drop(near);

        let outcome =
            run_receive_pass(&mut far, 1024, FramingMode::LengthPrefixed, &reporter())
                .await
                .unwrap();

        assert_eq!(outcome.observed_packet_count, 3);
        assert_eq!(outcome.total_bytes_read, 600);
    }

    #[tokio::test]
    async fn test_length_prefixed_rejects_oversized_frame() {
        // 상한을 넘는 선언 길이는 할당 전에 거부됨
        let (mut near, mut far) = tokio::io::duplex(1024);

        let mut wire = Vec::new();
        wire.extend_from_slice(&SessionHeader::new(5, 1).encode());
        wire.extend_from_slice(&u32::MAX.to_be_bytes());
        near.write_all(&wire).await.unwrap();
        drop(near);

        let result = run_receive_pass(&mut far, 1024, FramingMode::LengthPrefixed, &reporter()).await;
        assert!(matches!(
            result,
            Err(Error::FrameTooLarge { len: u32::MAX })
        ));
    }

    #[tokio::test]
    async fn test_loopback_end_to_end() {
        let mut config = Config::length_prefixed();
        config.port = 0;

        let (gen_reporter, _gen_rx) = Reporter::channel();
        let generator = Arc::new(Generator::new(config.clone(), gen_reporter));
        generator.start_listening().await.unwrap();

        let accept_task = {
            let generator = generator.clone();
            tokio::spawn(async move { generator.run_accept_loop().await })
        };

        let mut recv_config = config.clone();
        recv_config.port = generator.local_port();
        recv_config.dial_retry_delay_ms = 50;

        let (recv_reporter, mut recv_rx) = Reporter::channel();
        let receiver = Arc::new(Receiver::new(recv_config, recv_reporter));
        let stream = receiver.connect().await.unwrap();

        let run_task = {
            let receiver = receiver.clone();
            tokio::spawn(async move { receiver.run(stream).await })
        };

        while !generator.is_peer_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let session_id = generator
            .begin_session(SessionParams {
                packet_count: 5,
                packet_size: 100,
                delay_ms: 1,
            })
            .await
            .unwrap();
        assert_eq!(session_id, 1);

        // 수신측 통계 라인 대기
        tokio::time::timeout(Duration::from_secs(10), async {
            let mut saw_session = false;
            let mut saw_received = false;
            loop {
                let line = recv_rx.recv().await.expect("report channel closed");
                if line == "Receiving session # 1" {
                    saw_session = true;
                }
                if line.starts_with("Received 5 packets in") {
                    saw_received = true;
                }
                if line == "Packet loss: 0.00%." {
                    break;
                }
            }
            assert!(saw_session);
            assert!(saw_received);
        })
        .await
        .unwrap();

        receiver.stop();
        generator.shutdown().await;
        let _ = run_task.await.unwrap();
        accept_task.await.unwrap().unwrap();
    }
}
