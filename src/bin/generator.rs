//! TGEN 생성기 (대기측) - TCP Traffic Generator
//!
//! 포트에 바인드해 피어 접속을 기다린 뒤, 설정된 수/크기/간격으로
//! 의사난수 패킷 세션을 송신하고 송신 통계를 출력함
//!
//! 사용법:
//!   cargo run --release --bin tgen-generator -- [OPTIONS]
//!
//! 예시:
//!   # 기본 포트(12345)에서 1000개 x 512바이트, 10ms 간격
//!   cargo run --release --bin tgen-generator -- --count 1000 --size 512 --delay 10

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tgen::{Config, FramingMode, Generator, Reporter, SessionParams};

/// 생성기 CLI 설정
struct GeneratorConfig {
    sessions: u32,
    params: SessionParams,
    config: Config,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sessions: 1,
            params: SessionParams {
                packet_count: 100,
                packet_size: 1024,
                delay_ms: 10,
            },
            config: Config::default(),
        }
    }
}

fn parse_args() -> GeneratorConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = GeneratorConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    config.config.port = args[i + 1].parse().expect("유효한 포트 필요");
                    i += 1;
                }
            }
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    config.params.packet_count = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--size" | "-s" => {
                if i + 1 < args.len() {
                    config.params.packet_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--delay" | "-d" => {
                if i + 1 < args.len() {
                    config.params.delay_ms = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--sessions" | "-n" => {
                if i + 1 < args.len() {
                    config.sessions = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--framing" => {
                if i + 1 < args.len() {
                    config.config.framing =
                        FramingMode::parse(&args[i + 1]).expect("delimited 또는 length-prefixed");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"TGEN Generator - TCP 트래픽 생성기

단일 피어에게 속도 제어된 패킷 세션을 송신하고 처리율을 측정함

사용법:
  cargo run --release --bin tgen-generator -- [OPTIONS]

옵션:
  -p, --port <PORT>      대기 포트 (기본: 12345)
  -c, --count <N>        세션당 패킷 수 (기본: 100)
  -s, --size <BYTES>     패킷 크기 바이트 (기본: 1024)
  -d, --delay <MS>       패킷 간 지연 밀리초 (기본: 10)
  -n, --sessions <N>     실행할 세션 수 (기본: 1)
  --framing <MODE>       delimited | length-prefixed (기본: delimited)
  -h, --help             이 도움말 출력

예시:
  # 500개 x 256바이트, 5ms 간격, 세션 3회
  cargo run --release --bin tgen-generator -- -c 500 -s 256 -d 5 -n 3
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

    let cli = parse_args();
    cli.params.validate()?;

    info!("TGEN Generator starting...");
    info!("Port: {}", cli.config.port);
    info!(
        "Session: {} packets x {} bytes, {}ms delay",
        cli.params.packet_count, cli.params.packet_size, cli.params.delay_ms
    );

    // 상태 라인 출력 태스크 (표시 셸 역할)
    let (reporter, mut report_rx) = Reporter::channel();
    tokio::spawn(async move {
        while let Some(line) = report_rx.recv().await {
            println!("{}", line);
        }
    });

    let generator = Arc::new(Generator::new(cli.config, reporter));
    generator.start_listening().await?;

    let accept_task = {
        let generator = generator.clone();
        tokio::spawn(async move { generator.run_accept_loop().await })
    };

    // Ctrl+C: 진행 중 세션 취소 + 전체 종료
    {
        let generator = generator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, shutting down");
                generator.shutdown().await;
            }
        });
    }

    // 피어 접속 대기
    info!("Waiting for a peer connection...");
    while generator.is_running() && !generator.is_peer_connected() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    for _ in 0..cli.sessions {
        match generator.begin_session(cli.params).await {
            Ok(session_id) => info!("Session # {} complete", session_id),
            Err(tgen::Error::Interrupted) => break,
            Err(e) => {
                warn!("Session aborted: {}", e);
                break;
            }
        }
    }

    generator.shutdown().await;
    let _ = accept_task.await;

    Ok(())
}
