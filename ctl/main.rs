#![forbid(unsafe_code)]

//! `monitored-cluster-ctl`: admin CLI for the monitored cluster server.
//!
//! Sends one admin command per invocation over the network admin channel,
//! or over the local admin socket when `--ipc-name` is given, and prints
//! the reply. A reply that does not arrive within `--timeout-ms` is
//! reported as a failure; there is no retry.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

type CtlResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Parser)]
#[command(
    name = "monitored-cluster-ctl",
    about = "Admin CLI for the monitored cluster server",
    version,
    long_about = None
)]
struct Cli {
    /// Network admin channel address (`host:port`).
    #[arg(short = 'a', long, default_value = "localhost:5559")]
    addr: String,

    /// Local admin socket name; takes precedence over `--addr`.
    #[arg(short = 's', long)]
    ipc_name: Option<String>,

    /// How long to wait for a reply, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Restart every worker process.
    Restart,
    /// Stop every worker and the scheduler.
    Shutdown,
    /// Restart the scheduler, then every worker.
    Reset,
    /// Print a cluster summary.
    Info,
    /// Print a cluster summary every second until interrupted.
    Monitor,
}

impl Command {
    fn verb(self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Shutdown => "exit",
            Self::Reset => "reset",
            Self::Info | Self::Monitor => "info",
        }
    }
}

fn main() {
    let args = Cli::parse();
    let timeout = Duration::from_millis(args.timeout_ms);
    let request = serde_json::json!({ "type": "command", "cmd": args.command.verb() });

    if matches!(args.command, Command::Monitor) {
        loop {
            match send_command(&args, &request, timeout) {
                Ok(reply) => {
                    print_info(&reply);
                    println!("{}", "-".repeat(40));
                }
                Err(err) => eprintln!("no reply from server: {err}"),
            }
            std::thread::sleep(Duration::from_secs(1));
        }
    }

    match send_command(&args, &request, timeout) {
        Ok(reply) => {
            if matches!(args.command, Command::Info) {
                println!("{}", serde_json::to_string_pretty(&reply).unwrap_or_default());
                return;
            }
            let status = reply
                .get("status")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("fail");
            if status == "ok" {
                println!("OK");
            } else {
                let reason = reply
                    .get("reason")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("request failed");
                eprintln!("Error: {reason}");
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("Failed: {err}");
            match args.ipc_name {
                Some(ref name) => eprintln!("Is the server running with ipc name '{name}'?"),
                None => eprintln!("Is the server listening on '{}'?", args.addr),
            }
            std::process::exit(1);
        }
    }
}

fn print_info(reply: &serde_json::Value) {
    let field = |key: &str| reply.get(key).cloned().unwrap_or(serde_json::Value::Null);
    let workload = field("workload");
    println!(
        "host={} scheduler={} workers={} ave_cpu={:.1} workload={} pending={} working={}",
        field("host"),
        field("shost"),
        field("n_workers"),
        field("ave_cpu").as_f64().unwrap_or(0.0),
        workload.get("status").cloned().unwrap_or_default(),
        workload.get("n_pending").cloned().unwrap_or_default(),
        workload.get("n_working").cloned().unwrap_or_default(),
    );
}

/// Send one request line and read one reply line.
fn send_command(
    args: &Cli,
    request: &serde_json::Value,
    timeout: Duration,
) -> CtlResult<serde_json::Value> {
    let mut line = serde_json::to_string(request)?;
    line.push('\n');

    let response = match args.ipc_name {
        Some(ref name) => exchange_ipc(name, &line, timeout)?,
        None => exchange_tcp(&args.addr, &line, timeout)?,
    };
    if response.trim().is_empty() {
        return Err("server closed the connection without replying".into());
    }
    Ok(serde_json::from_str(response.trim())?)
}

fn exchange_tcp(addr: &str, line: &str, timeout: Duration) -> CtlResult<String> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.write_all(line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response = String::new();
    reader.read_line(&mut response)?;
    Ok(response)
}

/// Local sockets have no read timeout, so the blocking read runs on a
/// helper thread and is abandoned once `timeout` passes.
fn exchange_ipc(name: &str, line: &str, timeout: Duration) -> CtlResult<String> {
    let ns_name = name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(ns_name)?;
    stream.write_all(line.as_bytes())?;
    stream.flush()?;

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let mut reader = BufReader::new(&stream);
        let mut response = String::new();
        let result = reader.read_line(&mut response).map(|_| response);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => Ok(result?),
        Err(_) => Err(format!("no reply within {} ms", timeout.as_millis()).into()),
    }
}
