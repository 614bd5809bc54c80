use clap::Parser;

/// Multi-user FTP server speaking a pragmatic subset of RFC 959
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// Port for the control-connection listener
  pub port: u16,

  /// Worker threads servicing control connections
  #[arg(default_value_t = 4)]
  pub reactor_workers: usize,

  /// Workers in the transfer pool
  #[arg(default_value_t = 4)]
  pub task_workers: usize,

  /// Listening host
  #[arg(long, default_value_t = String::from("127.0.0.1"))]
  pub host: String,

  /// Path to the credentials file
  #[arg(long, default_value_t = String::from("userfile.txt"))]
  pub users_file: String,
}

impl Args {
  pub fn parse_args() -> Args {
    self::Parser::parse()
  }
}
