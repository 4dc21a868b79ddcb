//! # pdfium-auto
//!
//! Find a [PDFium](https://pdfium.googlesource.com/pdfium/) shared library
//! and bind `pdfium-render` to it, downloading a prebuilt copy when the host
//! has none.
//!
//! ## Resolution order
//!
//! [`ensure_pdfium_library`] walks these sources and stops at the first hit:
//!
//! 1. `PDFIUM_LIB_PATH`: an explicit path to `libpdfium.{so,dylib}` / `pdfium.dll`.
//! 2. The per-version cache directory (see [`pdfium_cache_dir`]).
//! 3. A fresh download of the platform archive from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries),
//!    unpacked into the cache directory.
//!
//! [`bind_pdfium_offline`] never touches the network: it tries (1), (2) and
//! then the system loader path. Test suites and servers that must not download
//! at request time use it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pdfium_auto::{bind_pdfium, bind_pdfium_offline};
//!
//! // Download on first use, report progress.
//! let pdfium = bind_pdfium(Some(&|done, total| {
//!     if let Some(t) = total {
//!         eprint!("\rpdfium: {done}/{t} bytes");
//!     }
//! }))
//! .expect("pdfium unavailable");
//!
//! // Or never hit the network.
//! let maybe = bind_pdfium_offline();
//! ```
//!
//! ## Environment variables
//!
//! - `PDFIUM_LIB_PATH`: use this library file; skips cache and download.
//! - `PDFIUM_AUTO_CACHE_DIR`: root of the cache instead of the OS cache dir.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;
use tracing::{debug, info, warn};

/// pdfium-binaries release tag (`chromium/<PDFIUM_VERSION>`) fetched on download.
pub const PDFIUM_VERSION: &str = "7690";

const RELEASE_BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

const ENV_LIB_PATH: &str = "PDFIUM_LIB_PATH";
const ENV_CACHE_DIR: &str = "PDFIUM_AUTO_CACHE_DIR";

/// Progress sink for downloads: `(bytes_received, content_length)`.
pub type DownloadProgress<'a> = &'a dyn Fn(u64, Option<u64>);

/// Errors returned while locating, downloading or binding pdfium.
#[derive(Error, Debug)]
pub enum PdfiumAutoError {
    /// No prebuilt pdfium archive exists for this OS/architecture.
    #[error("no prebuilt pdfium for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// The cache directory could not be created.
    #[error("cannot create pdfium cache directory '{path}': {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fetching the release archive failed.
    #[error("pdfium download failed: {0}")]
    Download(String),

    /// The archive was fetched but the library could not be unpacked from it.
    #[error("pdfium archive extraction failed: {0}")]
    Extract(String),

    /// The library file exists but could not be loaded.
    #[error("cannot bind pdfium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },

    /// Offline binding found no library anywhere.
    #[error("no pdfium library found (set {ENV_LIB_PATH} or allow a download)")]
    NotFound,
}

/// Where a resolved library came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySource {
    /// `PDFIUM_LIB_PATH` pointed at an existing file.
    Override(PathBuf),
    /// Already present in the cache directory.
    Cached(PathBuf),
    /// Downloaded during this call.
    Downloaded(PathBuf),
}

impl LibrarySource {
    pub fn path(&self) -> &Path {
        match self {
            LibrarySource::Override(p) | LibrarySource::Cached(p) | LibrarySource::Downloaded(p) => p,
        }
    }
}

// ── Platform table ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Platform {
    archive: &'static str,
    member: &'static str,
    file_name: &'static str,
}

const fn plat(archive: &'static str, member: &'static str, file_name: &'static str) -> Platform {
    Platform {
        archive,
        member,
        file_name,
    }
}

const WINDOWS_MEMBER: &str = "bin/pdfium.dll";

fn platform_for(os: &str, arch: &str) -> Option<Platform> {
    let p = match (os, arch) {
        ("linux", "x86_64") => plat("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so"),
        ("linux", "aarch64") => plat("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so"),
        ("macos", "x86_64") => plat("pdfium-mac-x64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
        ("macos", "aarch64") => {
            plat("pdfium-mac-arm64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib")
        }
        ("windows", "x86_64") => plat("pdfium-win-x64.tgz", WINDOWS_MEMBER, "pdfium.dll"),
        ("windows", "aarch64") => plat("pdfium-win-arm64.tgz", WINDOWS_MEMBER, "pdfium.dll"),
        ("windows", "x86") => plat("pdfium-win-x86.tgz", WINDOWS_MEMBER, "pdfium.dll"),
        _ => return None,
    };
    Some(p)
}

fn current_platform() -> Result<Platform, PdfiumAutoError> {
    let (os, arch) = (std::env::consts::OS, std::env::consts::ARCH);
    platform_for(os, arch).ok_or_else(|| PdfiumAutoError::UnsupportedPlatform {
        os: os.to_string(),
        arch: arch.to_string(),
    })
}

// ── Cache ────────────────────────────────────────────────────────────────────

/// Directory holding the cached library for [`PDFIUM_VERSION`].
///
/// `$PDFIUM_AUTO_CACHE_DIR/pdfium-{VERSION}` when the variable is set,
/// otherwise `<os cache dir>/pdf2tiff/pdfium-{VERSION}`.
pub fn pdfium_cache_dir() -> PathBuf {
    let versioned = format!("pdfium-{PDFIUM_VERSION}");
    if let Some(root) = std::env::var_os(ENV_CACHE_DIR) {
        return PathBuf::from(root).join(versioned);
    }
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("pdf2tiff")
        .join(versioned)
}

fn env_override() -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var_os(ENV_LIB_PATH)?);
    if path.is_file() {
        Some(path)
    } else {
        warn!("{ENV_LIB_PATH}={} does not exist; ignoring", path.display());
        None
    }
}

/// Find a library without downloading anything.
pub fn locate_pdfium_library() -> Option<LibrarySource> {
    if let Some(p) = env_override() {
        return Some(LibrarySource::Override(p));
    }
    let platform = current_platform().ok()?;
    let cached = pdfium_cache_dir().join(platform.file_name);
    cached.is_file().then_some(LibrarySource::Cached(cached))
}

/// `true` when [`ensure_pdfium_library`] would not need the network.
pub fn is_pdfium_cached() -> bool {
    locate_pdfium_library().is_some()
}

static RESOLVED: OnceLock<PathBuf> = OnceLock::new();

/// Make sure a pdfium library is on disk, downloading it if needed.
///
/// The resolved path is memoised for the rest of the process.
pub fn ensure_pdfium_library(
    on_progress: Option<DownloadProgress<'_>>,
) -> Result<PathBuf, PdfiumAutoError> {
    if let Some(p) = RESOLVED.get() {
        return Ok(p.clone());
    }

    let source = match locate_pdfium_library() {
        Some(found) => found,
        None => download_into_cache(on_progress)?,
    };
    debug!("pdfium library: {:?}", source);

    Ok(RESOLVED.get_or_init(|| source.path().to_path_buf()).clone())
}

/// Bind to pdfium, downloading the library first when necessary.
pub fn bind_pdfium(on_progress: Option<DownloadProgress<'_>>) -> Result<Pdfium, PdfiumAutoError> {
    let path = ensure_pdfium_library(on_progress)?;
    bind_pdfium_from_path(&path)
}

/// [`bind_pdfium`] without progress reporting.
pub fn bind_pdfium_silent() -> Result<Pdfium, PdfiumAutoError> {
    bind_pdfium(None)
}

/// Bind using the override, the cache, or the system loader path. No network.
pub fn bind_pdfium_offline() -> Result<Pdfium, PdfiumAutoError> {
    if let Some(source) = locate_pdfium_library() {
        return bind_pdfium_from_path(source.path());
    }
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|_| PdfiumAutoError::NotFound)
}

/// Bind to the library file at `path`.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, PdfiumAutoError> {
    let bindings = Pdfium::bind_to_library(path).map_err(|e| PdfiumAutoError::Bind {
        path: path.to_path_buf(),
        reason: format!("{e:?}"),
    })?;
    Ok(Pdfium::new(bindings))
}

// ── Download ─────────────────────────────────────────────────────────────────

fn release_url(platform: &Platform) -> String {
    format!(
        "{RELEASE_BASE_URL}/chromium%2F{PDFIUM_VERSION}/{}",
        platform.archive
    )
}

fn download_into_cache(
    on_progress: Option<DownloadProgress<'_>>,
) -> Result<LibrarySource, PdfiumAutoError> {
    let platform = current_platform()?;
    let dir = pdfium_cache_dir();
    std::fs::create_dir_all(&dir).map_err(|source| PdfiumAutoError::CacheDir {
        path: dir.clone(),
        source,
    })?;

    let url = release_url(&platform);
    info!("Downloading pdfium from {url}");
    let archive = fetch(&url, on_progress)?;

    let dest = dir.join(platform.file_name);
    unpack_member(&archive, platform.member, &dest)?;
    info!("pdfium cached at {}", dest.display());

    Ok(LibrarySource::Downloaded(dest))
}

fn fetch(url: &str, on_progress: Option<DownloadProgress<'_>>) -> Result<Vec<u8>, PdfiumAutoError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-auto/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PdfiumAutoError::Download(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| PdfiumAutoError::Download(format!("GET {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(PdfiumAutoError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let mut body = Vec::with_capacity(total.unwrap_or(0) as usize);
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PdfiumAutoError::Download(format!("read error: {e}"))),
        };
        body.extend_from_slice(&chunk[..n]);
        if let Some(cb) = on_progress {
            cb(body.len() as u64, total);
        }
    }
    Ok(body)
}

/// Copy `member` out of a `.tgz` archive into `dest`.
fn unpack_member(archive: &[u8], member: &str, dest: &Path) -> Result<(), PdfiumAutoError> {
    let extract = |e: std::io::Error| PdfiumAutoError::Extract(e.to_string());
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(archive));

    for entry in tar.entries().map_err(extract)? {
        let mut entry = entry.map_err(extract)?;
        let path = entry.path().map_err(extract)?.into_owned();
        if path.strip_prefix("./").unwrap_or(&path) == Path::new(member) {
            entry.unpack(dest).map_err(extract)?;
            return Ok(());
        }
    }
    Err(PdfiumAutoError::Extract(format!(
        "'{member}' not present in archive"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_platform_has_consistent_names() {
        for (os, arch) in [
            ("linux", "x86_64"),
            ("linux", "aarch64"),
            ("macos", "x86_64"),
            ("macos", "aarch64"),
            ("windows", "x86_64"),
            ("windows", "aarch64"),
            ("windows", "x86"),
        ] {
            let p = platform_for(os, arch).expect("listed platform");
            assert!(p.archive.ends_with(".tgz"));
            assert!(p.member.ends_with(p.file_name), "{os}/{arch}");
        }
    }

    #[test]
    fn unknown_platform_is_rejected() {
        assert!(platform_for("haiku", "riscv64").is_none());
    }

    #[test]
    fn release_url_names_version_and_archive() {
        let p = platform_for("linux", "x86_64").unwrap();
        let url = release_url(&p);
        assert!(url.contains(PDFIUM_VERSION));
        assert!(url.ends_with("pdfium-linux-x64.tgz"));
    }

    #[test]
    fn unpack_member_extracts_only_the_named_file() {
        let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
            Vec::new(),
            flate2::Compression::fast(),
        ));
        for (name, body) in [("include/fpdfview.h", &b"header"[..]), ("lib/libpdfium.so", &b"ELF"[..])] {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, body).unwrap();
        }
        let archive = builder.into_inner().unwrap().finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("libpdfium.so");
        unpack_member(&archive, "lib/libpdfium.so", &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"ELF");

        let missing = unpack_member(&archive, "lib/libpdfium.dylib", &dir.path().join("x"));
        assert!(matches!(missing, Err(PdfiumAutoError::Extract(_))));
    }

    #[test]
    fn library_source_exposes_path() {
        let src = LibrarySource::Cached(PathBuf::from("/tmp/libpdfium.so"));
        assert_eq!(src.path(), Path::new("/tmp/libpdfium.so"));
    }
}
