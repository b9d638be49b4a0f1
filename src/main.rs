//! fanout-mysqld, the fan-out proxy daemon.
//!
//! Binds the listen address and serves each accepted client on its own OS
//! thread. A session is single-threaded end to end: the thread owns the
//! client socket, one connection per delegate, and all conversation state,
//! so sessions share nothing.

use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Context;
use tracing::{debug, error, info};

use fanout_mysql::config::ProxyConfig;
use fanout_mysql::delegate::DelegatePool;
use fanout_mysql::driver::ReducePolicy;
use fanout_mysql::opts::DelegateOpts;
use fanout_mysql::session::Session;
use fanout_mysql::stream::Stream;

#[derive(Parser)]
#[command(name = "fanout-mysqld", about = "MySQL fan-out proxy daemon")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "fanout-mysql.toml")]
    config: PathBuf,

    /// Override the configured listen address.
    #[arg(long)]
    listen: Option<String>,
}

fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ProxyConfig::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    let delegates = config.delegate_opts()?;

    let listener = bind(&config.listen)?;
    info!(listen = %config.listen, delegates = delegates.len(), "listening");

    for incoming in listener.incoming() {
        let client = match incoming {
            Ok(client) => client,
            Err(err) => {
                error!(%err, "accept failed");
                continue;
            }
        };
        let delegates = delegates.clone();
        let policy = config.reduce_policy;
        std::thread::Builder::new()
            .name("session".to_string())
            .spawn(move || serve(client, delegates, policy))
            .wrap_err("spawning session thread")?;
    }

    Ok(())
}

/// Bind with SO_REUSEADDR so a restarted daemon can rebind immediately.
fn bind(listen: &str) -> color_eyre::eyre::Result<TcpListener> {
    let addr: std::net::SocketAddr = listen
        .parse()
        .wrap_err_with(|| format!("invalid listen address '{}'", listen))?;

    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    Ok(socket.into())
}

/// One client session, start to finish, on the calling thread.
fn serve(client: TcpStream, delegates: Vec<DelegateOpts>, policy: ReducePolicy) {
    let peer = client
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    info!(%peer, "client connected");

    if let Err(err) = client.set_nodelay(true) {
        debug!(%peer, %err, "could not set TCP_NODELAY");
    }

    let mut pool = DelegatePool::new(delegates);
    if let Err(err) = pool.connect() {
        error!(%peer, %err, "error connecting to a delegate");
        return;
    }

    let mut client = Stream::tcp(client);
    match Session::new(policy).run(&mut client, &mut pool) {
        Ok(()) => info!(%peer, "session finished"),
        Err(err) => error!(%peer, %err, "session failed"),
    }
}
