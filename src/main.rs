// EsoxSolutions.ResourcePool - integration harness
// Starts a mock TCP server, pools connections to it and checks the idle
// bookkeeping end to end.

use clap::Parser;
use esox_resourcepool::{Context, Pool, PoolError};
use std::io::{self, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing::{info, trace};
use tracing_subscriber::EnvFilter;

const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "resource-pool-harness", about = "Run the TCP connection pool checks")]
struct Args {
    /// Address the mock TCP server listens on
    #[arg(long, default_value = "127.0.0.1:9999")]
    addr: SocketAddr,

    #[arg(long, default_value_t = 20)]
    max_idle_size: usize,

    #[arg(long, default_value_t = 5)]
    max_idle_time_secs: u64,

    /// Workers in the second concurrent round
    #[arg(long, default_value_t = 100)]
    workers: usize,
}

#[derive(Error, Debug)]
enum HarnessError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError<io::Error>),

    #[error("unexpected idle count: expected {expected}, got {actual}")]
    IdleCount { expected: usize, actual: usize },

    #[error("connection is not to the mock server (peer {0:?})")]
    UnexpectedPeer(Option<SocketAddr>),

    #[error("worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

type TcpPool = Pool<TcpStream, io::Error>;

async fn run_mock_server(listener: TcpListener) {
    loop {
        let (mut socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                trace!(error = %e, "accept failed");
                continue;
            }
        };
        trace!(%peer, "accepted connection");

        // hold the socket open until the client hangs up
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        });
    }
}

fn dial(ctx: &Context, addr: SocketAddr) -> io::Result<TcpStream> {
    if ctx.is_cancelled() {
        return Err(io::Error::new(ErrorKind::TimedOut, "context cancelled before dial"));
    }
    let timeout = ctx.remaining().unwrap_or(DEFAULT_DIAL_TIMEOUT);
    TcpStream::connect_timeout(&addr, timeout)
}

fn hang_up(_: &Context, conn: TcpStream) {
    if let Err(e) = conn.shutdown(Shutdown::Both) {
        trace!(error = %e, "shutdown of pooled connection failed");
    }
}

fn build_pool(
    addr: SocketAddr,
    max_idle_size: usize,
    max_idle_time: Duration,
) -> Result<TcpPool, HarnessError> {
    let pool = Pool::builder()
        .creator(move |ctx: &Context| dial(ctx, addr))
        .destroyer(hang_up)
        .max_idle_size(max_idle_size)
        .max_idle_time(max_idle_time)
        .build()?;
    Ok(pool)
}

fn check_idle(pool: &TcpPool, expected: usize) -> Result<(), HarnessError> {
    let actual = pool.num_idle();
    if actual != expected {
        return Err(HarnessError::IdleCount { expected, actual });
    }
    Ok(())
}

fn check_peer(conn: &TcpStream, addr: SocketAddr) -> Result<(), HarnessError> {
    let peer = conn.peer_addr().ok();
    if peer != Some(addr) {
        return Err(HarnessError::UnexpectedPeer(peer));
    }
    Ok(())
}

fn simple_check(pool: &TcpPool, addr: SocketAddr) -> Result<(), HarnessError> {
    let ctx = Context::background();
    let capacity = pool.max_idle_size();

    check_idle(pool, capacity)?;

    let conn = pool.acquire(&ctx)?;
    check_peer(&conn, addr)?;
    check_idle(pool, capacity - 1)?;

    pool.release(&ctx, conn);
    check_idle(pool, capacity)
}

/// Idle count after `workers` acquisitions where every third worker releases.
/// Assumes every acquisition lands before the first release.
fn expected_idle(before: usize, workers: usize, capacity: usize) -> usize {
    let releases = workers.div_ceil(3);
    (before.saturating_sub(workers) + releases).min(capacity)
}

async fn concurrent_round(
    pool: &TcpPool,
    addr: SocketAddr,
    workers: usize,
) -> Result<(), HarnessError> {
    let before = pool.num_idle();
    let mut handles = Vec::with_capacity(workers);

    for i in 0..workers {
        let pool = pool.clone();
        handles.push(tokio::task::spawn_blocking(move || -> Result<(), HarnessError> {
            let ctx = Context::with_timeout(DEFAULT_DIAL_TIMEOUT);
            let conn = pool.acquire(&ctx)?;
            check_peer(&conn, addr)?;

            if i % 3 == 0 {
                std::thread::sleep(Duration::from_millis(100));
                pool.release(&ctx, conn);
            }
            Ok(())
        }));
    }

    for handle in handles {
        handle.await??;
    }

    check_idle(pool, expected_idle(before, workers, pool.max_idle_size()))
}

#[tokio::main]
async fn main() -> Result<(), HarnessError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let listener = TcpListener::bind(args.addr).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(run_mock_server(listener));
    info!(%addr, "mock TCP server listening");

    info!(max_idle_size = args.max_idle_size, "creating TCP connection pool");
    let max_idle_size = args.max_idle_size;
    let max_idle_time = Duration::from_secs(args.max_idle_time_secs);
    let pool = tokio::task::spawn_blocking(move || build_pool(addr, max_idle_size, max_idle_time))
        .await??;

    info!("running simple check");
    {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || simple_check(&pool, addr)).await??;
    }
    info!("simple check passed");

    let first_round = pool.max_idle_size().saturating_sub(3).max(1);
    info!(workers = first_round, "running concurrent round 1");
    concurrent_round(&pool, addr, first_round).await?;

    info!(workers = args.workers, "running concurrent round 2");
    concurrent_round(&pool, addr, args.workers).await?;

    info!(metrics = ?pool.metrics(), "all checks passed");

    let ctx = Context::background();
    tokio::task::spawn_blocking(move || pool.close(&ctx)).await?;
    Ok(())
}
