use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, warn};

use super::listing;
use super::session::{send_reply, TransferType};

const CHUNK_SIZE: usize = 65536;
const SMALL_FILE_THRESHOLD: usize = 8192;
const STOR_RECV_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
enum StoreError {
  #[error("data connection error or timeout")]
  Receive,
  #[error("file write failed")]
  Write,
}

#[derive(Debug, Error)]
enum SendError {
  #[error("file open or read failed")]
  File,
  #[error("data connection closed")]
  Data,
}

/// STOR body: accept the data connection, read it to EOF (the client
/// half-closes to signal completion), then store the received bytes as the
/// file's new contents.
pub(crate) async fn store(
  listener: TcpListener,
  control: Arc<Mutex<OwnedWriteHalf>>,
  file_name: String,
) {
  let Some(mut data) = accept(listener, &control).await else {
    return;
  };
  send_status(&control, "150 Opening data connection.").await;
  let status = match receive_file(&mut data, &file_name).await {
    Ok(()) => "226 Transfer complete.",
    Err(StoreError::Receive) => "426 Transfer aborted due to connection error or timeout.",
    Err(StoreError::Write) => "550 Failed to write to file.",
  };
  drop(data);
  send_status(&control, status).await;
}

async fn receive_file(data: &mut TcpStream, file_name: &str) -> Result<(), StoreError> {
  let mut payload = Vec::new();
  let mut buf = vec![0u8; CHUNK_SIZE];
  loop {
    let n = match timeout(STOR_RECV_TIMEOUT, data.read(&mut buf)).await {
      Ok(Ok(n)) => n,
      Ok(Err(err)) => {
        warn!("data connection receive failed: {err}");
        return Err(StoreError::Receive);
      }
      Err(_) => {
        warn!("data connection receive timed out");
        return Err(StoreError::Receive);
      }
    };
    if n == 0 {
      break;
    }
    payload.extend_from_slice(&buf[..n]);
  }
  debug!(file = file_name, bytes = payload.len(), "upload received");
  write_payload(file_name, &payload)
    .await
    .map_err(|err| {
      warn!("failed to write {file_name}: {err}");
      StoreError::Write
    })
}

/// Small uploads are written in one shot; larger ones go through a
/// pre-sized file in 64 KiB windows.
async fn write_payload(file_name: &str, payload: &[u8]) -> std::io::Result<()> {
  if payload.len() <= SMALL_FILE_THRESHOLD {
    return tokio::fs::write(file_name, payload).await;
  }
  let mut file = tokio::fs::File::create(file_name).await?;
  file.set_len(payload.len() as u64).await?;
  for chunk in payload.chunks(CHUNK_SIZE) {
    file.write_all(chunk).await?;
  }
  file.flush().await
}

/// RETR body: accept the data connection, then stream the file's bytes to
/// it, raw in BINARY mode and line-by-line with CRLF appended in ASCII mode.
pub(crate) async fn retrieve(
  listener: TcpListener,
  control: Arc<Mutex<OwnedWriteHalf>>,
  file_name: String,
  transfer_type: TransferType,
) {
  let Some(mut data) = accept(listener, &control).await else {
    return;
  };
  if tokio::fs::metadata(&file_name).await.is_err() {
    send_status(&control, "550 File not found.").await;
    return;
  }
  send_status(&control, "150 Opening data connection.").await;
  let result = match transfer_type {
    TransferType::Ascii => send_text_lines(&mut data, &file_name).await,
    TransferType::Binary => send_binary(&mut data, &file_name).await,
  };
  let status = match result {
    Ok(()) => {
      if let Err(err) = data.shutdown().await {
        debug!("data connection shutdown failed: {err}");
      }
      "226 Transfer complete."
    }
    Err(SendError::File) => "550 Failed to read file.",
    Err(SendError::Data) => "426 Transfer aborted: Connection closed.",
  };
  drop(data);
  send_status(&control, status).await;
}

async fn send_text_lines(data: &mut TcpStream, file_name: &str) -> Result<(), SendError> {
  let file = tokio::fs::File::open(file_name)
    .await
    .map_err(|_| SendError::File)?;
  let mut lines = BufReader::new(file);
  let mut line = Vec::new();
  loop {
    line.clear();
    let n = lines
      .read_until(b'\n', &mut line)
      .await
      .map_err(|_| SendError::File)?;
    if n == 0 {
      break;
    }
    if line.last() == Some(&b'\n') {
      line.pop();
    }
    line.extend_from_slice(b"\r\n");
    data.write_all(&line).await.map_err(|_| SendError::Data)?;
  }
  Ok(())
}

async fn send_binary(data: &mut TcpStream, file_name: &str) -> Result<(), SendError> {
  let mut file = tokio::fs::File::open(file_name)
    .await
    .map_err(|_| SendError::File)?;
  let len = file.metadata().await.map_err(|_| SendError::File)?.len();
  if len <= SMALL_FILE_THRESHOLD as u64 {
    let contents = tokio::fs::read(file_name).await.map_err(|_| SendError::File)?;
    return data.write_all(&contents).await.map_err(|_| SendError::Data);
  }
  // Large files stream through a 64 KiB window.
  let mut buf = vec![0u8; CHUNK_SIZE];
  loop {
    let n = file.read(&mut buf).await.map_err(|_| SendError::File)?;
    if n == 0 {
      return Ok(());
    }
    data.write_all(&buf[..n]).await.map_err(|_| SendError::Data)?;
  }
}

/// LIST body: accept the data connection and send a long-format listing of
/// the session's working directory.
pub(crate) async fn list(listener: TcpListener, control: Arc<Mutex<OwnedWriteHalf>>, dir: PathBuf) {
  let Some(mut data) = accept(listener, &control).await else {
    return;
  };
  send_status(&control, "150 Here comes the directory listing.").await;
  let rows = match listing::format_directory(&dir).await {
    Ok(rows) => rows,
    Err(err) => {
      warn!("failed to list {}: {err}", dir.display());
      send_status(&control, "550 Could not open directory.").await;
      return;
    }
  };
  let status = match data.write_all(rows.as_bytes()).await {
    Ok(()) => {
      if let Err(err) = data.shutdown().await {
        debug!("data connection shutdown failed: {err}");
      }
      "226 Directory send OK."
    }
    Err(_) => "426 Transfer aborted: Connection closed.",
  };
  drop(data);
  send_status(&control, status).await;
}

/// Waits for the client to connect to the passive port. The listener is
/// consumed, so the acceptor is closed as soon as this returns.
async fn accept(listener: TcpListener, control: &Mutex<OwnedWriteHalf>) -> Option<TcpStream> {
  match listener.accept().await {
    Ok((stream, peer)) => {
      debug!(%peer, "data connection accepted");
      Some(stream)
    }
    Err(err) => {
      warn!("failed to accept data connection: {err}");
      send_status(control, "425 Could not open data connection.").await;
      None
    }
  }
}

/// Status writes from a transfer body never fail silently; the session
/// itself terminates on its next control-socket operation if the socket is
/// fatally broken.
async fn send_status(control: &Mutex<OwnedWriteHalf>, text: &str) {
  if let Err(err) = send_reply(control, text).await {
    error!("failed to write {text:?} on control connection: {err}");
  }
}
