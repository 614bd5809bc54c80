use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::commands::{parse_command, FtpCommand};
use super::credentials::Credentials;
use super::ftp::FtpHandlers;
use super::pool::TransferPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
  Ascii,
  Binary,
}

/// Per-connection protocol state.
///
/// A session is created on accept and dropped when the control connection
/// closes; it is owned by its task and never serviced concurrently with
/// itself. The write half of the control socket sits behind a mutex because
/// transfer bodies running on the pool write status lines on it too.
pub struct Session {
  pub(crate) peer: SocketAddr,
  pub(crate) control: Arc<Mutex<OwnedWriteHalf>>,
  pub(crate) logged_in: bool,
  pub(crate) username: String,
  pub(crate) transfer_type: TransferType,
  pub(crate) cwd: PathBuf,
  /// Bound passive acceptor; `Some` is the passive latch. Every data
  /// command takes it out, so the latch clears on all exit paths.
  pub(crate) data: Option<TcpListener>,
  pub(crate) pasv_addr: IpAddr,
  pub(crate) credentials: Arc<Credentials>,
  pub(crate) pool: Arc<TransferPool>,
}

impl Session {
  /// Runs one control connection to completion: greet, then read a line,
  /// parse, dispatch, reply, until the client quits or the socket drops.
  pub async fn run(
    stream: TcpStream,
    peer: SocketAddr,
    credentials: Arc<Credentials>,
    pool: Arc<TransferPool>,
    cwd: PathBuf,
    pasv_addr: Option<IpAddr>,
  ) -> io::Result<()> {
    let local_ip = stream.local_addr()?.ip();
    let (read_half, write_half) = stream.into_split();
    let mut session = Session {
      peer,
      control: Arc::new(Mutex::new(write_half)),
      logged_in: false,
      username: String::new(),
      transfer_type: TransferType::Ascii,
      cwd,
      data: None,
      pasv_addr: pasv_addr.unwrap_or(local_ip),
      credentials,
      pool,
    };
    session.reply("220 Service ready for new user.").await?;

    let mut reader = BufReader::with_capacity(4096, read_half);
    let mut line = Vec::new();
    loop {
      line.clear();
      if reader.read_until(b'\n', &mut line).await? == 0 {
        debug!(peer = %session.peer, "control connection closed by client");
        break;
      }
      let text = String::from_utf8_lossy(&line);
      let Some(command) = parse_command(&text) else {
        continue;
      };
      debug!(peer = %session.peer, ?command, "dispatching");
      if matches!(command, FtpCommand::Quit) {
        info!(peer = %session.peer, "session quit");
        break;
      }
      session.dispatch(command).await?;
    }
    Ok(())
  }

  async fn dispatch(&mut self, command: FtpCommand) -> io::Result<()> {
    if command.requires_login() && !self.logged_in {
      return self.reply("530 Please login first.").await;
    }
    match command {
      FtpCommand::User(username) => self.user(username).await,
      FtpCommand::Pass(password) => self.pass(password).await,
      FtpCommand::Syst => self.syst().await,
      FtpCommand::Pwd(arg) => self.pwd(arg).await,
      FtpCommand::Cwd(path) => self.change_dir(path).await,
      FtpCommand::Type(code) => self.set_type(code).await,
      FtpCommand::Pasv => self.pasv().await,
      FtpCommand::Epsv => self.epsv().await,
      FtpCommand::Stor(file_name) => self.stor(file_name).await,
      FtpCommand::Retr(file_name) => self.retr(file_name).await,
      FtpCommand::List => self.list().await,
      FtpCommand::Mkd(dir_name) => self.make_dir(dir_name).await,
      FtpCommand::Rmd(path) => self.remove_dir(path).await,
      FtpCommand::Dele(path) => self.delete(path).await,
      FtpCommand::Size(path) => self.size(path).await,
      FtpCommand::Unknown(verb) => {
        self
          .reply(&format!("500 Unknown command: \"{verb}\"."))
          .await
      }
      FtpCommand::Quit => Ok(()),
    }
  }

  /// Writes one reply line on the control connection. Errors propagate so a
  /// fatally broken control socket terminates the session.
  pub(crate) async fn reply(&self, text: &str) -> io::Result<()> {
    send_reply(&self.control, text).await
  }
}

pub(crate) async fn send_reply(control: &Mutex<OwnedWriteHalf>, text: &str) -> io::Result<()> {
  let mut control = control.lock().await;
  control.write_all(format!("{text}\r\n").as_bytes()).await
}
