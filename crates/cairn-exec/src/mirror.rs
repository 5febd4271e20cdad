//! A fetch engine that copies distfiles out of a local mirror directory.

use crate::{ExecError, FetchEngine, FetchFailureKind};
use blake3::Hasher;
use cairn_types::{CandidateRecord, Distfile};
use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Compute the BLAKE3 hash of a file, hex encoded.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

pub struct MirrorFetcher {
    mirror: PathBuf,
    distdir: PathBuf,
}

impl MirrorFetcher {
    pub fn new(mirror: impl Into<PathBuf>, distdir: impl Into<PathBuf>) -> Self {
        Self {
            mirror: mirror.into(),
            distdir: distdir.into(),
        }
    }

    pub fn distdir(&self) -> &Path {
        &self.distdir
    }

    /// An existing distfile is reused when it still verifies.
    fn up_to_date(target: &Path, distfile: &Distfile) -> bool {
        if !target.is_file() {
            return false;
        }
        match &distfile.blake3 {
            Some(expected) => hash_file(target).is_ok_and(|actual| actual.eq_ignore_ascii_case(expected)),
            None => true,
        }
    }

    fn fetch_one(&self, candidate: &CandidateRecord, distfile: &Distfile) -> Result<(), ExecError> {
        let target = self.distdir.join(&distfile.name);
        if Self::up_to_date(&target, distfile) {
            debug!("{} already fetched", distfile.name);
            return Ok(());
        }

        let source = self.mirror.join(&distfile.name);
        if let Err(e) = fs::copy(&source, &target) {
            let kind = if e.kind() == ErrorKind::NotFound {
                FetchFailureKind::ManualFetchRequired
            } else {
                FetchFailureKind::Network
            };
            return Err(ExecError::fetch(
                candidate,
                kind,
                format!("{}: {}", source.display(), e),
            ));
        }

        if let Some(expected) = &distfile.blake3 {
            let actual = hash_file(&target)?;
            if !actual.eq_ignore_ascii_case(expected) {
                fs::remove_file(&target)?;
                return Err(ExecError::fetch(
                    candidate,
                    FetchFailureKind::ChecksumMismatch,
                    format!("{}: expected {}, got {}", distfile.name, expected, actual),
                ));
            }
        }
        debug!("Fetched {} -> {}", source.display(), target.display());
        Ok(())
    }
}

impl FetchEngine for MirrorFetcher {
    fn fetch(&self, candidate: &CandidateRecord) -> Result<(), ExecError> {
        fs::create_dir_all(&self.distdir)?;
        for distfile in &candidate.distfiles {
            self.fetch_one(candidate, distfile)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::Version;
    use tempfile::TempDir;

    fn setup() -> (TempDir, MirrorFetcher) {
        let temp_dir = TempDir::new().unwrap();
        let mirror = temp_dir.path().join("mirror");
        fs::create_dir_all(&mirror).unwrap();
        fs::write(mirror.join("zlib-1.3.tar"), b"zlib sources").unwrap();
        let fetcher = MirrorFetcher::new(mirror, temp_dir.path().join("distfiles"));
        (temp_dir, fetcher)
    }

    fn candidate(blake3: Option<String>) -> CandidateRecord {
        CandidateRecord::new("zlib", Version::new(1, 3, 0)).with_distfile("zlib-1.3.tar", blake3)
    }

    #[test]
    fn test_copies_and_verifies() {
        let (_temp, fetcher) = setup();
        let digest = blake3::hash(b"zlib sources").to_hex().to_string();

        fetcher.fetch(&candidate(Some(digest.clone()))).unwrap();

        let fetched = fetcher.distdir().join("zlib-1.3.tar");
        assert_eq!(hash_file(&fetched).unwrap(), digest);
    }

    #[test]
    fn test_checksum_mismatch_removes_file() {
        let (_temp, fetcher) = setup();

        let err = fetcher.fetch(&candidate(Some("00".repeat(32)))).unwrap_err();

        assert_eq!(err.fetch_kind(), Some(FetchFailureKind::ChecksumMismatch));
        assert!(!fetcher.distdir().join("zlib-1.3.tar").exists());
    }

    #[test]
    fn test_missing_distfile_needs_manual_fetch() {
        let (_temp, fetcher) = setup();
        let candidate = CandidateRecord::new("bzip2", Version::new(1, 0, 8)).with_distfile("bzip2-1.0.8.tar", None);

        let err = fetcher.fetch(&candidate).unwrap_err();

        assert_eq!(err.fetch_kind(), Some(FetchFailureKind::ManualFetchRequired));
    }
}
