//! 트래픽 생성기 (대기측)
//!
//! - 단일 피어 순차 accept
//! - 세션 헤더 + 속도 제어된 패킷 스트림 + 종료 마커 송신
//! - 세션 ID는 프로세스 수명 내 1부터 단조 증가

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::connection::{listen, Listener, Peer};
use crate::frame::{self, FramingMode, SessionHeader, LENGTH_PREFIX_END};
use crate::report::Reporter;
use crate::stats;
use crate::{Config, Error, Result, SESSION_END_MARKER};

/// 세션 파라미터
///
/// 운영자 입력으로 만들어지며 송신 시작 후에는 불변
#[derive(Debug, Clone, Copy)]
pub struct SessionParams {
    /// 보낼 패킷 수
    pub packet_count: u32,

    /// 패킷 크기 (바이트)
    pub packet_size: usize,

    /// 패킷 간 지연 (밀리초)
    pub delay_ms: u64,
}

impl SessionParams {
    /// 로컬 검증: 와이어에 닿기 전에 실패함
    pub fn validate(&self) -> Result<()> {
        if self.packet_count == 0 {
            return Err(Error::InvalidInput("packet count must be positive".into()));
        }
        if self.packet_size == 0 {
            return Err(Error::InvalidInput("packet size must be positive".into()));
        }
        Ok(())
    }
}

/// 송신 패스 결과
struct SendPassOutput {
    packets_sent: u32,
    bytes_sent: u64,
    started_at: Instant,
}

/// 트래픽 생성기 엔드포인트
pub struct Generator {
    config: Config,
    reporter: Reporter,

    /// accept 루프가 기동 시 가져가는 대기 소켓
    listener_slot: Mutex<Option<Listener>>,

    /// 실제 바인드된 포트 (포트 0 바인드 지원)
    bound_port: AtomicU16,

    /// 가장 최근 수락된 피어. 활성 세션이 잠금을 쥐고 스트림을 배타 소유함.
    peer: Mutex<Option<Peer>>,

    /// 동기 조회용 피어 주소
    peer_addr: RwLock<Option<SocketAddr>>,

    /// 다음 세션 ID (1부터, 재사용 없음)
    next_session_id: AtomicU32,

    running: AtomicBool,

    /// 프로세스 종료 신호 (accept 루프 + 세션 공통)
    shutdown_signal: Notify,

    /// 세션 취소 신호 (accept 루프에는 영향 없음)
    session_cancel: Notify,

    /// 래칭 취소 플래그. Notify는 지연 대기 중에만 관측되므로
    /// 쓰기/플러시 중 날아온 취소는 이 플래그로 다음 반복에서 잡음.
    /// 세션 시작 시 초기화됨 (이전 세션의 취소가 넘어오지 않음).
    session_cancelled: AtomicBool,
}

impl Generator {
    /// 새 생성기 생성
    pub fn new(config: Config, reporter: Reporter) -> Self {
        Self {
            config,
            reporter,
            listener_slot: Mutex::new(None),
            bound_port: AtomicU16::new(0),
            peer: Mutex::new(None),
            peer_addr: RwLock::new(None),
            next_session_id: AtomicU32::new(1),
            running: AtomicBool::new(true),
            shutdown_signal: Notify::new(),
            session_cancel: Notify::new(),
            session_cancelled: AtomicBool::new(false),
        }
    }

    /// 대기 소켓 바인드
    pub async fn start_listening(&self) -> Result<()> {
        let listener = listen(self.config.port).await?;
        self.bound_port.store(listener.local_port(), Ordering::SeqCst);
        *self.listener_slot.lock().await = Some(listener);
        Ok(())
    }

    /// 실제 바인드된 포트
    pub fn local_port(&self) -> u16 {
        self.bound_port.load(Ordering::SeqCst)
    }

    /// accept 루프 실행 (프로세스 수명 동안 독립 태스크)
    ///
    /// 순차 단일 클라이언트 전용: 가장 최근 수락된 연결만 유효함
    pub async fn run_accept_loop(&self) -> Result<()> {
        let mut listener = match self.listener_slot.lock().await.take() {
            Some(listener) => listener,
            None => return Err(Error::ConnectionClosed),
        };

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = self.shutdown_signal.notified() => break,
                accepted = listener.accept_next(&self.reporter) => {
                    match accepted {
                        Ok(new_peer) => {
                            *self.peer_addr.write() = Some(new_peer.addr());
                            *self.peer.lock().await = Some(new_peer);
                        }
                        Err(e) => {
                            warn!("An error occurred while accepting the connection: {}", e);
                        }
                    }
                }
            }
        }

        listener.close();
        Ok(())
    }

    /// 피어 연결 여부
    pub fn is_peer_connected(&self) -> bool {
        self.peer_addr.read().is_some()
    }

    /// 세션 1회 실행: 헤더 → 패킷 스트림 → 종료 마커 → 송신 통계
    ///
    /// 반환값은 할당된 세션 ID. 세션이 진행되는 동안 피어 스트림을
    /// 배타적으로 소유함.
    pub async fn begin_session(&self, params: SessionParams) -> Result<u32> {
        params.validate()?;

        let mut guard = self.peer.lock().await;
        let peer = guard.as_mut().ok_or(Error::ConnectionClosed)?;

        // ID는 실제로 시작되는 세션에만 할당됨
        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        self.session_cancelled.store(false, Ordering::SeqCst);

        self.reporter.line(format!("Generation session # {}", session_id));
        info!("Starting generation session # {}", session_id);

        let header = SessionHeader::new(session_id, params.packet_count);
        let result = run_send_pass(
            peer.stream_mut()?,
            header,
            params,
            self.config.framing,
            &self.session_cancel,
            &self.session_cancelled,
        )
        .await;

        match result {
            Ok(output) => {
                self.reporter.lines(stats::generator_report(
                    output.packets_sent,
                    output.bytes_sent,
                    output.started_at,
                ));
                info!(
                    "Finished sending packets. Total packets sent: {}",
                    output.packets_sent
                );
                Ok(session_id)
            }
            Err(Error::Interrupted) => {
                // 취소는 세션만 중단. 이미 보낸 패킷은 회수하지 않고
                // 연결도 유지함.
                warn!("Generation session # {} interrupted", session_id);
                self.reporter
                    .line(format!("Generation session # {} was interrupted.", session_id));
                Err(Error::Interrupted)
            }
            Err(e) => {
                // 스트림 오류: 세션 중단, 연결은 재사용 불가로 간주하고 닫음
                warn!("Error sending data: {}", e);
                self.reporter.line(format!("Error sending data: {}", e));
                if let Some(mut dead) = guard.take() {
                    dead.close().await;
                }
                *self.peer_addr.write() = None;
                Err(e)
            }
        }
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 진행 중인 세션만 취소 (accept 루프는 계속)
    ///
    /// 플래그를 먼저 올리고 깨움: 지연 대기 중이 아니어도 송신 루프가
    /// 다음 반복에서 취소를 관측함
    pub fn cancel_session(&self) {
        self.session_cancelled.store(true, Ordering::SeqCst);
        self.session_cancel.notify_waiters();
    }

    /// 전체 종료: 세션 취소 + accept 루프 중단 + 소켓 해제 (멱등)
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.session_cancelled.store(true, Ordering::SeqCst);
        self.session_cancel.notify_waiters();
        // notify_one은 대기자가 없어도 허가를 남기므로 accept 루프가
        // select에 진입하기 직전이어도 신호가 유실되지 않음
        self.shutdown_signal.notify_one();

        if let Some(mut peer) = self.peer.lock().await.take() {
            peer.close().await;
        }
        *self.peer_addr.write() = None;

        if let Some(mut listener) = self.listener_slot.lock().await.take() {
            listener.close();
        }
    }
}

/// 송신 패스 상태 기계
///
/// SENDING_HEADER → SENDING_PACKETS → SENDING_SENTINEL 순서.
/// 각 쓰기는 다음 쓰기 전에 플러시되므로 헤더 → 패킷 → 마커의
/// 와이어 순서가 TCP 전달 순서로 보존됨.
async fn run_send_pass<W: AsyncWrite + Unpin>(
    stream: &mut W,
    header: SessionHeader,
    params: SessionParams,
    framing: FramingMode,
    cancel: &Notify,
    cancelled: &AtomicBool,
) -> Result<SendPassOutput> {
    // SENDING_HEADER: 필드별 플러시 (원본 동작 유지)
    stream.write_all(&header.session_id.to_be_bytes()).await?;
    stream.flush().await?;
    stream.write_all(&header.packet_count.to_be_bytes()).await?;
    stream.flush().await?;
    info!(
        "Session info sent: session_id={}, packet_count={}",
        header.session_id, header.packet_count
    );

    let started_at = Instant::now();
    let mut packets_sent = 0u32;
    let mut bytes_sent = 0u64;

    // SENDING_PACKETS: 패킷마다 새로 생성, 쓰기 + 플러시 + 지연
    for i in 0..params.packet_count {
        // 지연 대기 바깥(쓰기/플러시 중, 또는 지연 0)에서 발생한
        // 취소는 래칭 플래그로 여기서 관측됨
        if cancelled.load(Ordering::SeqCst) {
            return Err(Error::Interrupted);
        }

        let packet = frame::generate_packet(params.packet_size);

        if framing == FramingMode::LengthPrefixed {
            stream.write_all(&(packet.len() as u32).to_be_bytes()).await?;
        }
        stream.write_all(&packet).await?;
        stream.flush().await?;

        packets_sent += 1;
        bytes_sent += packet.len() as u64;
        debug!("Packet {} sent with size {}", i + 1, params.packet_size);

        if params.delay_ms > 0 {
            tokio::select! {
                _ = cancel.notified() => return Err(Error::Interrupted),
                _ = tokio::time::sleep(Duration::from_millis(params.delay_ms)) => {}
            }
        }
    }

    // 마지막 지연 중 깨우기를 놓쳤더라도 마커 전에 한 번 더 확인
    if cancelled.load(Ordering::SeqCst) {
        return Err(Error::Interrupted);
    }

    // SENDING_SENTINEL
    match framing {
        FramingMode::Delimited => stream.write_all(SESSION_END_MARKER).await?,
        FramingMode::LengthPrefixed => {
            stream.write_all(&LENGTH_PREFIX_END.to_be_bytes()).await?
        }
    }
    stream.flush().await?;

    Ok(SendPassOutput {
        packets_sent,
        bytes_sent,
        started_at,
    })
}
