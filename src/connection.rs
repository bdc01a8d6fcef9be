//! 연결 수명주기
//!
//! - 수동 대기 엔드포인트 (생성기측): bind + 순차 accept
//! - 능동 접속 엔드포인트 (수신기측): 고정 간격 무한 재시도 dial
//! - 멱등 close: 종료 경로와 에러 경로의 close가 안전하게 합쳐짐

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::report::Reporter;
use crate::{Error, Result};

/// 수동 대기 엔드포인트 생성
///
/// 포트가 이미 점유돼 있으면 `AddressInUse`, 그 외 bind 실패는 `Bind`.
/// 둘 다 기동 단계에서 치명적이며 자동 재시도하지 않음.
pub async fn listen(port: u16) -> Result<Listener> {
    match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(inner) => {
            info!("The server socket is created on the port {}", port);
            Ok(Listener {
                inner: Some(inner),
                port,
            })
        }
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            warn!("Port {} is already in use", port);
            Err(Error::AddressInUse { port })
        }
        Err(e) => {
            warn!("An error occurred when creating the server socket: {}", e);
            Err(Error::Bind(e))
        }
    }
}

/// 대기 소켓
///
/// 한 번에 하나의 연결만 의미를 가짐. 순차 accept 전용.
#[derive(Debug)]
pub struct Listener {
    inner: Option<TcpListener>,
    port: u16,
}

impl Listener {
    /// 다음 피어 접속까지 대기
    ///
    /// 접속된 피어 주소를 상태 싱크로 보고함
    pub async fn accept_next(&self, reporter: &Reporter) -> Result<Peer> {
        let listener = self.inner.as_ref().ok_or(Error::ConnectionClosed)?;
        let (stream, addr) = listener.accept().await?;

        info!("The client is connected: {}", addr.ip());
        reporter.line(format!("The client is connected: {}", addr.ip()));

        Ok(Peer {
            stream: Some(stream),
            addr,
        })
    }

    /// 실제 바인드된 포트
    pub fn local_port(&self) -> u16 {
        self.inner
            .as_ref()
            .and_then(|l| l.local_addr().ok())
            .map(|a| a.port())
            .unwrap_or(self.port)
    }

    /// 대기 소켓 해제 (멱등)
    pub fn close(&mut self) {
        match self.inner.take() {
            Some(_) => info!("The server socket is closed"),
            None => debug!("server socket already closed"),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

/// 수락된/접속된 피어 연결
///
/// 활성 세션이 스트림을 배타적으로 소유함
#[derive(Debug)]
pub struct Peer {
    stream: Option<TcpStream>,
    addr: SocketAddr,
}

impl Peer {
    /// 이미 수립된 스트림으로 피어 생성 (수신기측 dial 결과용)
    pub fn from_stream(stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            stream: Some(stream),
            addr,
        }
    }

    /// 피어 주소
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// 연결이 아직 열려 있는지
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// 스트림 핸들
    pub fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::ConnectionBroken)
    }

    /// 피어 소켓 종료 (멱등)
    ///
    /// 두 번째 호출은 로그만 남기고 에러를 내지 않음
    pub async fn close(&mut self) {
        match self.stream.take() {
            Some(mut stream) => {
                if let Err(e) = stream.shutdown().await {
                    debug!("socket shutdown error (swallowed): {}", e);
                }
                info!("The socket is closed");
            }
            None => debug!("socket already closed"),
        }
    }
}

/// 능동 접속
///
/// 실패 시 고정 간격으로 무한 재시도. 성공 또는 취소 신호로만 탈출.
pub async fn dial(
    address: &str,
    port: u16,
    retry_delay: Duration,
    cancel: &Notify,
    reporter: &Reporter,
) -> Result<TcpStream> {
    loop {
        match TcpStream::connect((address, port)).await {
            Ok(stream) => {
                info!("Connected to {}:{}", address, port);
                return Ok(stream);
            }
            Err(e) => {
                warn!("접속 실패: {}, {}ms 후 재시도", e, retry_delay.as_millis());
                reporter.line(format!("Connection failed: {}. Retrying...", e));

                tokio::select! {
                    _ = cancel.notified() => return Err(Error::Interrupted),
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listen_rejects_port_in_use() {
        let first = listen(0).await.unwrap();
        let port = first.local_port();

        match listen(port).await {
            Err(Error::AddressInUse { port: p }) => assert_eq!(p, port),
            other => panic!("expected AddressInUse, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_accept_and_idempotent_close() {
        let (reporter, mut rx) = Reporter::channel();
        let mut listener = listen(0).await.unwrap();
        let port = listener.local_port();

        let dial_task =
            tokio::spawn(
                async move { TcpStream::connect(("127.0.0.1", port)).await.unwrap() },
            );

        let mut peer = listener.accept_next(&reporter).await.unwrap();
        let _client = dial_task.await.unwrap();

        let notice = rx.recv().await.unwrap();
        assert!(notice.starts_with("The client is connected:"));
        assert!(peer.is_open());

        // 두 번 닫아도 에러 없음
        peer.close().await;
        peer.close().await;
        assert!(!peer.is_open());
        assert!(matches!(peer.stream_mut(), Err(Error::ConnectionBroken)));

        listener.close();
        listener.close();
        assert!(listener.is_closed());
    }

    #[tokio::test]
    async fn test_dial_retries_until_cancelled() {
        let (reporter, _rx) = Reporter::channel();
        let cancel = Notify::new();

        // 포트만 확보하고 즉시 닫아 접속이 거부되게 함
        let probe = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        cancel.notify_one();
        let result = dial(
            "127.0.0.1",
            port,
            Duration::from_millis(20),
            &cancel,
            &reporter,
        )
        .await;

        assert!(matches!(result, Err(Error::Interrupted)));
    }
}
