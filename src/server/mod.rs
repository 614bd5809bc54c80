use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub mod commands;
pub mod credentials;
pub mod pool;
pub mod session;

mod ftp;
mod listing;
mod transfer;

use credentials::Credentials;
use pool::TransferPool;
use session::Session;

#[derive(Debug, Error)]
pub enum ServerError {
  #[error("failed to bind {addr}: {source}")]
  Bind { addr: String, source: io::Error },
  #[error("failed to resolve startup directory: {0}")]
  StartupDir(io::Error),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub host: String,
  pub port: u16,
  /// Workers in the transfer pool.
  pub task_workers: usize,
  /// Transfer submissions queued beyond the running ones before rejection.
  pub task_queue_len: usize,
  pub users_file: PathBuf,
  /// Address advertised and bound for passive data connections. Defaults to
  /// the local address of each accepted control connection.
  pub pasv_addr: Option<IpAddr>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host: String::from("127.0.0.1"),
      port: 0,
      task_workers: 4,
      task_queue_len: 100,
      users_file: PathBuf::from("userfile.txt"),
      pasv_addr: None,
    }
  }
}

/// Accepts control connections and spawns one session task per client.
/// Sessions share the credential table and the transfer pool.
pub struct Server {
  listener: TcpListener,
  credentials: Arc<Credentials>,
  pool: Arc<TransferPool>,
  startup_dir: PathBuf,
  pasv_addr: Option<IpAddr>,
}

impl Server {
  pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
      .await
      .map_err(|source| ServerError::Bind { addr, source })?;
    let credentials = Credentials::load(&config.users_file);
    if credentials.is_empty() {
      warn!("credential table is empty, every login will fail");
    }
    let startup_dir = std::env::current_dir().map_err(ServerError::StartupDir)?;
    Ok(Self {
      listener,
      credentials: Arc::new(credentials),
      pool: Arc::new(TransferPool::new(config.task_workers, config.task_queue_len)),
      startup_dir,
      pasv_addr: config.pasv_addr,
    })
  }

  pub fn local_addr(&self) -> io::Result<SocketAddr> {
    self.listener.local_addr()
  }

  /// Serves until SIGINT, then shuts down cooperatively: stop accepting,
  /// drain the transfer pool, and tear down the remaining sessions.
  pub async fn run(self) -> io::Result<()> {
    let mut sessions = JoinSet::new();
    loop {
      tokio::select! {
        accepted = self.listener.accept() => {
          match accepted {
            Ok((stream, peer)) => {
              info!(%peer, "control connection accepted");
              let credentials = Arc::clone(&self.credentials);
              let pool = Arc::clone(&self.pool);
              let cwd = self.startup_dir.clone();
              let pasv_addr = self.pasv_addr;
              sessions.spawn(async move {
                if let Err(err) = Session::run(stream, peer, credentials, pool, cwd, pasv_addr).await {
                  warn!(%peer, "session ended with error: {err}");
                }
              });
            }
            Err(err) => warn!("accept failed: {err}"),
          }
        }
        _ = tokio::signal::ctrl_c() => {
          info!("received SIGINT, shutting down");
          break;
        }
      }
      // Reap finished sessions so the set doesn't grow without bound.
      while sessions.try_join_next().is_some() {}
    }
    drop(self.listener);
    self.pool.shutdown().await;
    sessions.abort_all();
    while sessions.join_next().await.is_some() {}
    info!("server shutdown complete");
    Ok(())
  }
}
