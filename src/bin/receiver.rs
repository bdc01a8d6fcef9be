//! TGEN 수신기 (접속측) - TCP Traffic Receiver
//!
//! 생성기에 접속해 세션을 수신하고 처리율/손실 통계를 출력함.
//! 접속 실패와 연결 끊김은 고정 간격으로 재시도함.
//!
//! 사용법:
//!   cargo run --release --bin tgen-receiver -- [OPTIONS]

use std::sync::Arc;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tgen::{Config, Error, FramingMode, Receiver, Reporter};

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    config.server_address = args[i + 1].clone();
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    config.port = args[i + 1].parse().expect("유효한 포트 필요");
                    i += 1;
                }
            }
            "--buffer" | "-b" => {
                if i + 1 < args.len() {
                    config.recv_buffer_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--framing" => {
                if i + 1 < args.len() {
                    config.framing =
                        FramingMode::parse(&args[i + 1]).expect("delimited 또는 length-prefixed");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"TGEN Receiver - TCP 트래픽 수신기

생성기의 패킷 세션을 수신해 처리율과 손실률을 계산함

사용법:
  cargo run --release --bin tgen-receiver -- [OPTIONS]

옵션:
  -s, --server <ADDR>    생성기 주소 (기본: 127.0.0.1)
  -p, --port <PORT>      생성기 포트 (기본: 12345)
  -b, --buffer <BYTES>   수신 버퍼 크기 (기본: 1024)
  --framing <MODE>       delimited | length-prefixed (기본: delimited)
  -h, --help             이 도움말 출력

예시:
  cargo run --release --bin tgen-receiver -- -s 192.168.0.10 -p 12345
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = parse_args();

    info!("TGEN Receiver starting...");
    info!("Server: {}", config.server_endpoint());

    // 상태 라인 출력 태스크 (표시 셸 역할)
    let (reporter, mut report_rx) = Reporter::channel();
    tokio::spawn(async move {
        while let Some(line) = report_rx.recv().await {
            println!("{}", line);
        }
    });

    let receiver = Arc::new(Receiver::new(config, reporter));

    {
        let receiver = receiver.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping");
                receiver.stop();
            }
        });
    }

    // 바깥 연결 루프: 연결이 깨지면 고정 간격으로 재접속
    while receiver.is_running() {
        let stream = match receiver.connect().await {
            Ok(stream) => stream,
            Err(Error::Interrupted) => break,
            Err(e) => {
                warn!("Connection failed: {}", e);
                break;
            }
        };

        match receiver.run(stream).await {
            Ok(()) | Err(Error::Interrupted) => break,
            Err(e) => {
                warn!("Session loop ended: {}, reconnecting", e);
            }
        }
    }

    info!("Receiver stopped");
    Ok(())
}
