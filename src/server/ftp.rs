use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tokio::fs;
use tokio::net::TcpListener;
use tracing::{debug, warn};

use super::session::{Session, TransferType};
use super::transfer;

const PASV_BIND_ATTEMPTS: usize = 5;

#[cfg(target_os = "linux")]
const SYST_REPLY: &str = "215 UNIX Type: L8 (Linux)";
#[cfg(target_os = "macos")]
const SYST_REPLY: &str = "215 UNIX Type: L8 (Mac OS)";
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const SYST_REPLY: &str = "215 UNIX Type: L8";

/// One method per FTP command family. Implemented by [`Session`], which owns
/// all the state the handlers touch.
#[async_trait]
pub(crate) trait FtpHandlers {
  async fn user(&mut self, username: String) -> io::Result<()>;
  async fn pass(&mut self, password: String) -> io::Result<()>;
  async fn syst(&self) -> io::Result<()>;
  async fn pwd(&self, arg: String) -> io::Result<()>;
  async fn change_dir(&mut self, path: String) -> io::Result<()>;
  async fn set_type(&mut self, code: String) -> io::Result<()>;
  async fn pasv(&mut self) -> io::Result<()>;
  async fn epsv(&mut self) -> io::Result<()>;
  async fn stor(&mut self, file_name: String) -> io::Result<()>;
  async fn retr(&mut self, file_name: String) -> io::Result<()>;
  async fn list(&mut self) -> io::Result<()>;
  async fn make_dir(&self, dir_name: String) -> io::Result<()>;
  async fn remove_dir(&self, path: String) -> io::Result<()>;
  async fn delete(&self, path: String) -> io::Result<()>;
  async fn size(&self, path: String) -> io::Result<()>;
}

#[async_trait]
impl FtpHandlers for Session {
  async fn user(&mut self, username: String) -> io::Result<()> {
    // A new USER always restarts authentication. The reply does not reveal
    // whether the account exists.
    self.logged_in = false;
    self.username = username;
    self.reply("331 Username okay, need password.").await
  }

  async fn pass(&mut self, password: String) -> io::Result<()> {
    if self.credentials.verify(&self.username, &password) {
      self.logged_in = true;
      debug!(peer = %self.peer, user = %self.username, "login succeeded");
      self.reply("230 User logged in, proceed.").await
    } else {
      debug!(peer = %self.peer, user = %self.username, "login failed");
      self.reply("530 Login incorrect.").await
    }
  }

  async fn syst(&self) -> io::Result<()> {
    self.reply(SYST_REPLY).await
  }

  async fn pwd(&self, arg: String) -> io::Result<()> {
    if !arg.is_empty() {
      return self
        .reply(&format!("500 Unknown command: \"PWD{arg}\"."))
        .await;
    }
    self
      .reply(&format!(
        "257 \"{}\" is the current directory.",
        self.cwd.display()
      ))
      .await
  }

  async fn change_dir(&mut self, path: String) -> io::Result<()> {
    if path.is_empty() {
      return self
        .reply("550 Failed to change directory. Path not specified.")
        .await;
    }
    let joined = if path == ".." {
      self.cwd.join("..")
    } else if path.starts_with('/') {
      PathBuf::from(&path)
    } else {
      self.cwd.join(&path)
    };
    let resolved = match fs::canonicalize(&joined).await {
      Ok(resolved) => resolved,
      Err(_) => {
        return self
          .reply(&format!("550 Failed to resolve path: \"{}\".", joined.display()))
          .await;
      }
    };
    match fs::metadata(&resolved).await {
      Ok(metadata) if metadata.is_dir() => {
        self.cwd = resolved.clone();
        self
          .reply(&format!(
            "250 Directory successfully changed to \"{}\".",
            resolved.display()
          ))
          .await
      }
      _ => {
        self
          .reply(&format!(
            "550 Directory does not exist or is not a directory: \"{}\".",
            resolved.display()
          ))
          .await
      }
    }
  }

  async fn set_type(&mut self, code: String) -> io::Result<()> {
    match code.as_str() {
      "I" => {
        self.transfer_type = TransferType::Binary;
        self.reply("200 Type set to I.").await
      }
      "A" => {
        self.transfer_type = TransferType::Ascii;
        self.reply("200 Type set to A.").await
      }
      _ => {
        self
          .reply("500 Unrecognized TYPE command. Supported types are I (binary) and A (ASCII).")
          .await
      }
    }
  }

  async fn pasv(&mut self) -> io::Result<()> {
    // PASV advertises a dotted quad; IPv6 sessions must negotiate via EPSV.
    let IpAddr::V4(host) = self.pasv_addr else {
      return self.reply("500 Failed to enter passive mode.").await;
    };
    let mut bound = None;
    for _ in 0..PASV_BIND_ATTEMPTS {
      let port = rand::thread_rng().gen_range(1024u16..=65535);
      match TcpListener::bind((self.pasv_addr, port)).await {
        Ok(listener) => {
          bound = Some(listener);
          break;
        }
        Err(err) => debug!(port, "passive bind attempt failed: {err}"),
      }
    }
    let Some(listener) = bound else {
      warn!(peer = %self.peer, "all passive bind attempts failed");
      return self.reply("500 Failed to enter passive mode.").await;
    };
    let port = listener.local_addr()?.port();
    self.data = Some(listener);
    let [h1, h2, h3, h4] = host.octets();
    self
      .reply(&format!(
        "227 Entering Passive Mode ({h1},{h2},{h3},{h4},{},{}).",
        port / 256,
        port % 256
      ))
      .await
  }

  async fn epsv(&mut self) -> io::Result<()> {
    let listener = match TcpListener::bind((self.pasv_addr, 0)).await {
      Ok(listener) => listener,
      Err(err) => {
        warn!(peer = %self.peer, "extended passive bind failed: {err}");
        return self.reply("500 Failed to enter extended passive mode.").await;
      }
    };
    let port = listener.local_addr()?.port();
    self.data = Some(listener);
    self
      .reply(&format!("229 Entering Extended Passive Mode (|||{port}|)."))
      .await
  }

  async fn stor(&mut self, file_name: String) -> io::Result<()> {
    let Some(listener) = self.data.take() else {
      return self.reply("425 Use PASV first.").await;
    };
    let control = Arc::clone(&self.control);
    self
      .run_transfer(transfer::store(listener, control, file_name))
      .await
  }

  async fn retr(&mut self, file_name: String) -> io::Result<()> {
    let Some(listener) = self.data.take() else {
      return self.reply("425 Use PASV first.").await;
    };
    let control = Arc::clone(&self.control);
    let transfer_type = self.transfer_type;
    self
      .run_transfer(transfer::retrieve(listener, control, file_name, transfer_type))
      .await
  }

  async fn list(&mut self) -> io::Result<()> {
    let Some(listener) = self.data.take() else {
      return self.reply("425 Use PASV first.").await;
    };
    let control = Arc::clone(&self.control);
    let dir = self.cwd.clone();
    self
      .run_transfer(transfer::list(listener, control, dir))
      .await
  }

  async fn make_dir(&self, dir_name: String) -> io::Result<()> {
    if dir_name.is_empty() {
      return self.reply("550 Directory name not specified.").await;
    }
    let target = self.cwd.join(&dir_name);
    if fs::metadata(&target).await.is_ok() {
      return self.reply("550 Directory already exists.").await;
    }
    match fs::create_dir(&target).await {
      Ok(()) => {
        let _ = fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).await;
        self.reply("257 Directory created.").await
      }
      Err(err) => {
        self
          .reply(&format!("550 Failed to create directory: {err}."))
          .await
      }
    }
  }

  async fn remove_dir(&self, path: String) -> io::Result<()> {
    // RMD, DELE and SIZE take the argument as given; a relative path
    // resolves against the server process's working directory.
    match fs::remove_dir(&path).await {
      Ok(()) => self.reply("250 Directory deleted.").await,
      Err(_) => self.reply("550 Failed to remove directory.").await,
    }
  }

  async fn delete(&self, path: String) -> io::Result<()> {
    match fs::remove_file(&path).await {
      Ok(()) => self.reply("250 File deleted.").await,
      Err(_) => self.reply("550 Failed to delete file.").await,
    }
  }

  async fn size(&self, path: String) -> io::Result<()> {
    match fs::metadata(&path).await {
      Ok(metadata) => self.reply(&format!("213 {}", metadata.len())).await,
      Err(_) => self.reply("550 File not found.").await,
    }
  }
}

impl Session {
  /// Hands a transfer body to the pool and parks until it completes, so the
  /// same session never interleaves two transfers. The passive listener was
  /// already taken out of the session: whether the body runs, is rejected,
  /// or is dropped during shutdown, the latch is clear afterwards.
  async fn run_transfer<F>(&mut self, body: F) -> io::Result<()>
  where
    F: Future<Output = ()> + Send + 'static,
  {
    match self.pool.submit(body).await {
      Ok(done) => {
        let _ = done.await;
        Ok(())
      }
      Err(err) => {
        warn!(peer = %self.peer, "transfer rejected: {err}");
        self.reply("425 Could not open data connection.").await
      }
    }
  }
}
