//! Output discovery for out-of-process enhancement
//!
//! The external tool does not reliably name or place its product. The
//! locator gathers audio files from a directory and its immediate
//! subdirectories and ranks them with [`select`]:
//!
//! 1. the exact expected output path, if it exists
//! 2. files carrying the product and "processed" name markers, newest first
//! 3. any audio file, newest first

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};
use vasr_common::audio::has_audio_extension;
use walkdir::WalkDir;

/// Combined marker some tool versions embed in output names
const COMBINED_MARKER: &str = "_audiosr_processed_";
const PRODUCT_MARKER: &str = "audiosr";
const PROCESSED_MARKER: &str = "processed";

/// An audio file seen during a directory scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl Candidate {
    fn from_path(path: &Path) -> Option<Self> {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
        Some(Self {
            path: path.to_path_buf(),
            modified,
        })
    }

    pub fn is_marker_match(&self) -> bool {
        is_marker_match(&self.path)
    }
}

/// Whether a file name carries the product markers
pub fn is_marker_match(path: &Path) -> bool {
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy().to_lowercase(),
        None => return false,
    };
    name.contains(COMBINED_MARKER)
        || (name.contains(PRODUCT_MARKER) && name.contains(PROCESSED_MARKER))
}

/// Pick the most plausible product among `candidates`
///
/// Marker matches win regardless of modification time. Ties on time are
/// broken by path so the choice is deterministic.
pub fn select(candidates: &[Candidate]) -> Option<&Candidate> {
    newest(candidates.iter().filter(|c| c.is_marker_match())).or_else(|| newest(candidates.iter()))
}

fn newest<'a>(pool: impl Iterator<Item = &'a Candidate>) -> Option<&'a Candidate> {
    pool.max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| b.path.cmp(&a.path)))
}

/// Locates the file an external command produced
#[derive(Debug, Clone, Default)]
pub struct OutputLocator {
    expected: Option<PathBuf>,
    exclude: Vec<PathBuf>,
}

impl OutputLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path that wins outright when it exists
    pub fn expecting(mut self, path: impl Into<PathBuf>) -> Self {
        self.expected = Some(path.into());
        self
    }

    /// Path that must never be returned (typically the input itself)
    pub fn excluding(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude.push(path.into());
        self
    }

    /// Return the most probable produced file under `dir`, if any
    pub fn locate(&self, dir: &Path) -> Option<PathBuf> {
        if let Some(expected) = self.locate_expected() {
            return Some(expected);
        }

        let candidates = self.scan(dir);
        let chosen = select(&candidates)?;
        debug!(
            path = %chosen.path.display(),
            marker = chosen.is_marker_match(),
            candidates = candidates.len(),
            "Located produced file"
        );
        Some(chosen.path.clone())
    }

    /// The expected path alone, without scanning any directory
    pub fn locate_expected(&self) -> Option<PathBuf> {
        let expected = self.expected.as_ref()?;
        if expected.is_file() && !self.is_excluded(expected) {
            debug!(path = %expected.display(), "Expected output present");
            return Some(expected.clone());
        }
        None
    }

    /// Audio files in `dir` and its immediate subdirectories
    pub fn scan(&self, dir: &Path) -> Vec<Candidate> {
        if !dir.is_dir() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        let walker = WalkDir::new(dir).min_depth(1).max_depth(2).follow_links(false);
        for entry in walker {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_file() || !has_audio_extension(entry.path()) {
                        continue;
                    }
                    if self.is_excluded(entry.path()) {
                        continue;
                    }
                    if let Some(candidate) = Candidate::from_path(entry.path()) {
                        candidates.push(candidate);
                    }
                }
                Err(e) => warn!("Error accessing entry: {}", e),
            }
        }
        candidates
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.exclude.iter().any(|ex| same_file(ex, path))
    }
}

/// Path equality that tolerates relative vs. absolute spellings
pub fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Newest audio file directly inside `dir`
///
/// Files modified within `within` of now are preferred; if there are none the
/// newest audio file of any age is returned.
pub fn latest_audio_in_dir(dir: &Path, within: Duration) -> Option<Candidate> {
    let entries = std::fs::read_dir(dir).ok()?;
    let files: Vec<Candidate> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_audio_extension(p))
        .filter_map(|p| Candidate::from_path(&p))
        .collect();

    let cutoff = SystemTime::now().checked_sub(within);
    let recent = cutoff.and_then(|cutoff| newest(files.iter().filter(|c| c.modified >= cutoff)));
    recent.or_else(|| newest(files.iter())).cloned()
}

/// Wait for a product to appear
///
/// Checks `output` first, then each of `dirs` for a recent audio file, every
/// `interval` until `timeout` elapses. A file in a directory is accepted only
/// if it was modified no earlier than `timeout + 10s` ago. `exclude` (the
/// input) is never returned.
pub fn poll_for_output(
    output: &Path,
    dirs: &[PathBuf],
    exclude: &Path,
    timeout: Duration,
    interval: Duration,
) -> Option<PathBuf> {
    let deadline = Instant::now() + timeout;
    let freshness = timeout + Duration::from_secs(10);

    loop {
        if output.is_file() {
            return Some(output.to_path_buf());
        }

        for dir in dirs {
            let Some(found) = latest_audio_in_dir(dir, Duration::from_secs(600)) else {
                continue;
            };
            if same_file(&found.path, exclude) {
                continue;
            }
            let age = SystemTime::now()
                .duration_since(found.modified)
                .unwrap_or(Duration::ZERO);
            if age <= freshness {
                debug!(path = %found.path.display(), "Polled product");
                return Some(found.path);
            }
        }

        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(interval);
    }
}
