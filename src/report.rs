//! 상태 보고 채널
//!
//! 코어 → 표시 셸 방향의 텍스트 상태/통계 라인 전달.
//! 원래 GUI 영역이 맡던 역할을 언바운드 채널로 대체함.

use tokio::sync::mpsc;
use tracing::warn;

use crate::{Error, Result};

/// 셸 쪽에서 소비하는 상태 라인 수신기
pub type ReportReceiver = mpsc::UnboundedReceiver<String>;

/// 상태 라인 송신 핸들
///
/// 복제 가능하며 셸이 수신기를 버려도 전송 실패는 무시됨
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: mpsc::UnboundedSender<String>,
}

impl Reporter {
    /// 보고 채널 생성
    pub fn channel() -> (Self, ReportReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// 상태 라인 전송
    pub fn line(&self, msg: impl Into<String>) {
        let _ = self.tx.send(msg.into());
    }

    /// 여러 라인 전송
    pub fn lines(&self, msgs: Vec<String>) {
        for msg in msgs {
            self.line(msg);
        }
    }

    /// 입력 오류 보고
    ///
    /// 빈 메시지는 즉시 실패 처리 (와이어까지 도달하지 않음)
    pub fn input_error(&self, msg: &str) -> Result<()> {
        if msg.is_empty() {
            return Err(Error::InvalidInput("message cannot be empty".into()));
        }
        warn!("Input Error: {}", msg);
        self.line(format!("Input Error: {}", msg));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_delivery() {
        let (reporter, mut rx) = Reporter::channel();
        reporter.line("Waiting for data...");
        assert_eq!(rx.try_recv().unwrap(), "Waiting for data...");
    }

    #[test]
    fn test_empty_input_error_fails_fast() {
        let (reporter, _rx) = Reporter::channel();
        assert!(matches!(
            reporter.input_error(""),
            Err(Error::InvalidInput(_))
        ));
        assert!(reporter.input_error("bad packet count").is_ok());
    }

    #[test]
    fn test_dropped_receiver_is_harmless() {
        let (reporter, rx) = Reporter::channel();
        drop(rx);
        reporter.line("no listener");
    }
}
