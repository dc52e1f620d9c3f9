//! 两台主机之间的 TCP 批量传输
//!
//! client 主动连接 server:80，写入指定字节数后关闭；server 计数、校验并在对端
//! 关闭后关闭。结束时向 stdout 打印一行 JSON 摘要。

use clap::Parser;
use scone_tcp::capture::CaptureLog;
use scone_tcp::mailbox::{LoopTime, Mailbox};
use scone_tcp::net::{BulkSender, HostId, NetWorld, Sink};
use scone_tcp::proto::tcp::{ConnId, TcpConfig, TcpState};
use serde::Serialize;
use std::fs;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "tcp-transfer", about = "在两台模拟主机之间做一次 TCP 批量传输")]
struct Args {
    /// 要发送的应用数据量（字节）
    #[arg(long, default_value_t = 100_000)]
    bytes: u64,

    /// 覆盖配置中的 MSS（字节）
    #[arg(long)]
    mss: Option<u16>,

    /// 覆盖配置中的接收窗口（字节）
    #[arg(long)]
    wnd: Option<u16>,

    /// 单向链路时延（毫秒）
    #[arg(long, default_value_t = 10)]
    latency_ms: u64,

    /// 每条链路每第 N 个数据报丢弃一个；不填则不丢包
    #[arg(long)]
    drop_every: Option<u64>,

    /// 运行到多少毫秒
    #[arg(long, default_value_t = 60_000)]
    until_ms: u64,

    /// JSON 格式的 TcpConfig；命令行参数会覆盖其中的字段
    #[arg(long)]
    config: Option<PathBuf>,

    /// 把链路上的报文记录写成 JSON 数组
    #[arg(long)]
    capture_json: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Summary {
    bytes_sent: u64,
    bytes_received: u64,
    retransmissions: u64,
    client_state: Option<TcpState>,
    server_state: Option<TcpState>,
    elapsed_ms: Option<u64>,
    datagrams: u64,
    dropped: u64,
}

fn load_config(args: &Args) -> Result<TcpConfig, String> {
    let mut cfg = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|e| format!("read {}: {e}", path.display()))?;
            serde_json::from_str(&raw).map_err(|e| format!("parse {}: {e}", path.display()))?
        }
        None => TcpConfig::default(),
    };
    if let Some(mss) = args.mss {
        cfg.mss = mss;
    }
    if let Some(wnd) = args.wnd {
        cfg.wnd = wnd;
    }
    if cfg.mss == 0 {
        return Err("mss must be positive".to_string());
    }
    Ok(cfg)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    let cfg = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut mb = Mailbox::default();
    let mut world = NetWorld::default();

    let client_addr = Ipv4Addr::new(10, 0, 0, 1);
    let server_addr = Ipv4Addr::new(10, 0, 0, 2);
    let client = world.net.add_host("client", client_addr, cfg.clone());
    let server = world.net.add_host("server", server_addr, cfg);
    world.net.connect(
        client,
        server,
        LoopTime::from_millis(args.latency_ms),
        args.drop_every,
    );
    if args.capture_json.is_some() {
        world.net.capture = Some(CaptureLog::default());
    }

    let sink = Sink::new(80);
    let sink_progress = sink.progress();
    world.net.set_app(server, sink);
    let sender = BulkSender::new(SocketAddrV4::new(server_addr, 80), args.bytes);
    let sender_progress = sender.progress();
    world.net.set_app(client, sender);

    // 第一次 flush 让应用开始工作
    world.net.flush(&mut mb);
    mb.run_until(LoopTime::from_millis(args.until_ms), &mut world);

    if let Some(path) = &args.capture_json {
        if let Some(cap) = world.net.capture.take() {
            let written = cap
                .to_json()
                .map_err(|e| e.to_string())
                .and_then(|json| fs::write(path, json).map_err(|e| e.to_string()));
            if let Err(e) = written {
                eprintln!("error: write {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
            eprintln!("wrote capture to {}", path.display());
        }
    }

    let sp = sender_progress.lock().map(|p| p.clone()).unwrap_or_default();
    let rp = sink_progress.lock().map(|p| p.clone()).unwrap_or_default();
    let state_of = |host: HostId, conn: Option<ConnId>| -> Option<TcpState> {
        let h = world.net.host(host)?;
        h.tcp.state(conn?)
    };
    let elapsed_ms = match (sp.connected_at, rp.done_at) {
        (Some(s), Some(e)) if e >= s => Some(e.as_millis() - s.as_millis()),
        _ => None,
    };
    let retransmissions: u64 = world.net.hosts().map(|h| h.tcp.stats.rexmit).sum();

    let summary = Summary {
        bytes_sent: sp.written,
        bytes_received: rp.received,
        retransmissions,
        client_state: state_of(client, sp.conn),
        server_state: state_of(server, rp.conn),
        elapsed_ms,
        datagrams: world.net.stats.datagrams,
        dropped: world.net.stats.dropped,
    };
    match serde_json::to_string(&summary) {
        Ok(line) => println!("{line}"),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    }
    if rp.first_mismatch.is_some() {
        eprintln!("error: received data does not match what was sent");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
