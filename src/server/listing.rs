use std::fs::Metadata;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use chrono::{DateTime, Datelike, Local};

// https://files.stairways.com/other/ftp-list-specs-info.txt
// http://cr.yp.to/ftp/list/binls.html

/// Builds a long-format listing of `dir` in the shape of `ls -ln`: mode,
/// link count, numeric uid and gid, size, mtime and name, one CRLF-terminated
/// row per entry, sorted by name.
pub(crate) async fn format_directory(dir: &Path) -> io::Result<String> {
  let mut entries = tokio::fs::read_dir(dir).await?;
  let mut rows = Vec::new();
  while let Some(entry) = entries.next_entry().await? {
    let metadata = entry.metadata().await?;
    rows.push((entry.file_name().to_string_lossy().into_owned(), metadata));
  }
  rows.sort_by(|(a, _), (b, _)| a.cmp(b));
  let mut listing = String::new();
  for (name, metadata) in &rows {
    listing.push_str(&format_entry(name, metadata));
  }
  Ok(listing)
}

fn format_entry(name: &str, metadata: &Metadata) -> String {
  format!(
    "{} {:>3} {:>8} {:>8} {:>12} {} {}\r\n",
    mode_string(metadata),
    metadata.nlink(),
    metadata.uid(),
    metadata.gid(),
    metadata.len(),
    mtime_column(metadata),
    name
  )
}

fn mode_string(metadata: &Metadata) -> String {
  let kind = if metadata.is_dir() {
    'd'
  } else if metadata.file_type().is_symlink() {
    'l'
  } else {
    '-'
  };
  let mode = metadata.mode();
  let mut out = String::with_capacity(10);
  out.push(kind);
  for shift in [6u32, 3, 0] {
    let bits = (mode >> shift) & 0o7;
    out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
    out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
    out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
  }
  out
}

/// Recent entries show month, day and time; older ones show the year, as
/// `ls -l` does.
fn mtime_column(metadata: &Metadata) -> String {
  let mtime = DateTime::from_timestamp(metadata.mtime(), 0)
    .unwrap_or_default()
    .with_timezone(&Local);
  let age = Local::now().signed_duration_since(mtime);
  if age.num_days().abs() > 180 {
    format!("{} {:>5}", mtime.format("%b %e"), mtime.year())
  } else {
    mtime.format("%b %e %H:%M").to_string()
  }
}
