use std::error::Error;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use rftpd::args::Args;
use rftpd::{Server, ServerConfig};

fn main() -> Result<(), Box<dyn Error>> {
  let args = Args::parse_args();
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  // The reactor_workers argument sizes the runtime servicing control
  // connections; transfers run on the bounded pool, not here.
  let runtime = tokio::runtime::Builder::new_multi_thread()
    .worker_threads(args.reactor_workers.max(1))
    .enable_all()
    .build()?;
  runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
  let server = Server::bind(ServerConfig {
    host: args.host,
    port: args.port,
    task_workers: args.task_workers,
    users_file: PathBuf::from(args.users_file),
    ..ServerConfig::default()
  })
  .await?;
  info!(
    "listening on {}, {} reactor workers, {} transfer workers",
    server.local_addr()?,
    args.reactor_workers,
    args.task_workers
  );
  server.run().await?;
  Ok(())
}
