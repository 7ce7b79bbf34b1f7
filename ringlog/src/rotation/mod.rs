
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::errors::RingLogError;

const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Revision bookkeeping for one logger's output file.
///
/// The active file is `rev_path(base, cur_rev)`: the bare base path for
/// revision 0, `<base>.N` afterwards. Compressed revisions carry a
/// `.tar.gz` suffix on top. The highest revision found on disk at open time
/// is where appending resumes; the lowest bounds retention trimming.
pub struct Rotation {
  base: PathBuf,
  size_limit: u64,
  max_files: u64,
  cur_rev: AtomicU64,
  min_rev: Arc<AtomicU64>,
  workers: Arc<AtomicU32>,
}

impl Rotation {
  pub fn new(base: PathBuf, size_limit: u64, max_files: u64) -> Self {
    Self {
      base,
      size_limit,
      max_files,
      cur_rev: AtomicU64::new(0),
      min_rev: Arc::new(AtomicU64::new(0)),
      workers: Arc::new(AtomicU32::new(0)),
    }
  }

  /// Scan the base path's directory and adopt the revision range found
  /// there. Called at `start` so a reopened logger resumes at the highest
  /// existing revision.
  pub fn discover(&self) {
    let (min, max) = find_rev_range(&self.base);
    self.min_rev.store(min, Ordering::Release);
    self.cur_rev.store(max, Ordering::Release);
  }

  pub fn active_path(&self) -> PathBuf {
    rev_path(&self.base, self.cur_rev())
  }

  #[inline]
  pub fn cur_rev(&self) -> u64 {
    self.cur_rev.load(Ordering::Acquire)
  }

  #[inline]
  pub fn min_rev(&self) -> u64 {
    self.min_rev.load(Ordering::Acquire)
  }

  #[inline]
  pub fn size_limit(&self) -> u64 {
    self.size_limit
  }

  #[inline]
  pub fn max_files(&self) -> u64 {
    self.max_files
  }

  #[inline]
  pub fn should_rotate(&self, written: u64) -> bool {
    self.size_limit > 0 && written > self.size_limit
  }

  /// Advance to the next revision. Returns the finished revision number and
  /// the path of the new active file. Only the thread holding the logger's
  /// flush flag calls this.
  pub fn advance(&self) -> (u64, PathBuf) {
    let old = self.cur_rev.fetch_add(1, Ordering::AcqRel);
    (old, rev_path(&self.base, old + 1))
  }

  /// Spawn a detached compression worker for a finished revision. `report`
  /// receives a description of any archive failure; deletions stay
  /// best-effort and unreported.
  pub fn spawn_compress<F>(&self, rev: u64, report: F)
  where
    F: FnOnce(String) + Send + 'static,
  {
    self.workers.fetch_add(1, Ordering::AcqRel);
    let base = self.base.clone();
    let max_files = self.max_files;
    let min_rev = Arc::clone(&self.min_rev);
    let workers = Arc::clone(&self.workers);
    thread::spawn(move || {
      compress_and_trim(&base, rev, max_files, &min_rev, report);
      workers.fetch_sub(1, Ordering::AcqRel);
    });
  }

  /// Wait until every spawned compression worker has finished.
  pub fn wait_workers(&self) {
    while self.workers.load(Ordering::Acquire) > 0 {
      thread::yield_now();
    }
  }
}

/// Path of revision `rev`: the base itself for 0, `<base>.N` otherwise.
pub fn rev_path(base: &Path, rev: u64) -> PathBuf {
  if rev == 0 {
    return base.to_path_buf();
  }
  let mut name = base.as_os_str().to_os_string();
  name.push(format!(".{}", rev));
  PathBuf::from(name)
}

/// Path of the compressed form of revision `rev`.
pub fn archive_path(base: &Path, rev: u64) -> PathBuf {
  let mut name = rev_path(base, rev).into_os_string();
  name.push(ARCHIVE_SUFFIX);
  PathBuf::from(name)
}

/// Minimum and maximum revision present in the base path's directory.
/// `(0, 0)` when nothing is there yet.
pub fn find_rev_range(base: &Path) -> (u64, u64) {
  let base_name = match base.file_name().and_then(|n| n.to_str()) {
    Some(name) => name,
    None => return (0, 0),
  };
  let entries = match fs::read_dir(parent_dir(base)) {
    Ok(entries) => entries,
    Err(_) => return (0, 0),
  };

  let mut min = u64::MAX;
  let mut max = 0;
  for entry in entries.flatten() {
    let name = entry.file_name();
    if let Some(rev) = name.to_str().and_then(|n| parse_rev(base_name, n)) {
      min = min.min(rev);
      max = max.max(rev);
    }
  }
  if min == u64::MAX {
    (0, 0)
  } else {
    (min, max)
  }
}

fn parent_dir(base: &Path) -> &Path {
  match base.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  }
}

fn parse_rev(base_name: &str, entry_name: &str) -> Option<u64> {
  let stem = entry_name.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(entry_name);
  if stem == base_name {
    return Some(0);
  }
  stem
    .strip_prefix(base_name)?
    .strip_prefix('.')?
    .parse()
    .ok()
}

fn compress_and_trim<F>(
  base: &Path,
  rev: u64,
  max_files: u64,
  min_rev: &AtomicU64,
  report: F,
) where
  F: FnOnce(String),
{
  let src = rev_path(base, rev);
  match archive(&src, &archive_path(base, rev)) {
    Ok(()) => {
      let _ = fs::remove_file(&src);
    },
    Err(err) => report(format!("{}: {}", err, src.display())),
  }

  if max_files > 0 && rev >= max_files {
    let first = min_rev.load(Ordering::Acquire);
    let last = rev - max_files;
    for r in first..=last {
      let _ = fs::remove_file(rev_path(base, r));
      let _ = fs::remove_file(archive_path(base, r));
    }
    min_rev.fetch_max(last + 1, Ordering::AcqRel);
  }
}

fn archive(src: &Path, dst: &Path) -> Result<(), RingLogError> {
  let wrap = |source| RingLogError::Archive {
    path: src.to_path_buf(),
    source,
  };

  let out = File::create(dst).map_err(wrap)?;
  let encoder = GzEncoder::new(out, Compression::default());
  let mut builder = tar::Builder::new(encoder);
  let entry_name = src
    .file_name()
    .map(Path::new)
    .unwrap_or_else(|| Path::new("log"));
  builder.append_path_with_name(src, entry_name).map_err(wrap)?;
  builder.into_inner().map_err(wrap)?.finish().map_err(wrap)?;
  Ok(())
}
