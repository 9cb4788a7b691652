//! Bundle staging: extraction, digest verification, secure wipe

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use rand::RngCore;
use tar::Archive;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::db::models::Artifact;
use crate::errors::AgentError;
use crate::utils::sha256_hash;

/// A per-job scratch directory holding the staged payload.
///
/// Dropping a `Staging` removes the directory, but callers should go
/// through [`purge`](Self::purge) so payload bytes are overwritten
/// before removal.
pub struct Staging {
    dir: TempDir,
}

impl Staging {
    /// Create a fresh scratch directory in the system temp location.
    pub fn create(prefix: &str) -> Result<Self, AgentError> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        debug!("Created staging dir {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write the artifact tarball into the staging dir.
    pub async fn write_payload(&self, payload: &[u8]) -> Result<PathBuf, AgentError> {
        let tarball = self.dir.path().join("artifact.tar.gz");
        tokio::fs::write(&tarball, payload).await?;
        Ok(tarball)
    }

    /// Securely wipe and remove the staging dir. Never fails the job:
    /// wipe problems are logged and the directory removal proceeds.
    pub async fn purge(self) {
        let path = self.dir.path().to_path_buf();
        let result = tokio::task::spawn_blocking(move || secure_remove_dir(&path)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Secure wipe failed: {}", e),
            Err(e) => warn!("Secure wipe task failed: {}", e),
        }
        // TempDir drop removes anything the wipe left behind.
    }
}

/// Verify the stored sha256 digest against the payload bytes.
pub fn verify_digest(artifact: &Artifact) -> Result<(), AgentError> {
    let computed = sha256_hash(&artifact.payload);
    if !computed.eq_ignore_ascii_case(&artifact.sha256) {
        return Err(AgentError::ExecutionError(format!(
            "artifact {} digest mismatch: expected {}, got {}",
            artifact.id, artifact.sha256, computed
        )));
    }
    Ok(())
}

/// Extract a gzipped tarball into `dest`.
pub async fn extract_tar_gz(tarball: &Path, dest: &Path) -> Result<(), AgentError> {
    let tarball = tarball.to_path_buf();
    let unpack_dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), AgentError> {
        let file = fs::File::open(&tarball)?;
        let mut archive = Archive::new(GzDecoder::new(file));
        archive.unpack(&unpack_dest)?;
        Ok(())
    })
    .await
    .map_err(|e| AgentError::Internal(e.to_string()))??;

    debug!("Extracted bundle into {}", dest.display());
    Ok(())
}

/// Overwrite every file under `path` with random bytes, then remove the
/// whole tree. Blocking; call from `spawn_blocking`.
pub fn secure_remove_dir(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        wipe_tree(path)?;
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

fn wipe_tree(dir: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            wipe_tree(&path)?;
        } else {
            wipe_file(&path)?;
        }
    }
    Ok(())
}

// Overwrite in fixed-size chunks; staged bundles can run to hundreds of
// megabytes and a full-size buffer would double peak memory.
const WIPE_CHUNK: usize = 64 * 1024;

fn wipe_file(path: &Path) -> std::io::Result<()> {
    let mut remaining = fs::metadata(path)?.len();
    let mut noise = vec![0u8; WIPE_CHUNK];
    let mut rng = rand::thread_rng();

    let mut file = fs::OpenOptions::new().write(true).open(path)?;
    while remaining > 0 {
        let n = remaining.min(WIPE_CHUNK as u64) as usize;
        rng.fill_bytes(&mut noise[..n]);
        file.write_all(&noise[..n])?;
        remaining -= n as u64;
    }
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn make_tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[tokio::test]
    async fn test_stage_and_extract() {
        let staging = Staging::create("drydock-test-").unwrap();
        let payload = make_tarball(&[("docker-compose.yaml", "services: {}\n")]);

        let tarball = staging.write_payload(&payload).await.unwrap();
        extract_tar_gz(&tarball, staging.path()).await.unwrap();

        assert!(staging.path().join("docker-compose.yaml").exists());
    }

    #[tokio::test]
    async fn test_purge_removes_dir() {
        let staging = Staging::create("drydock-test-").unwrap();
        let payload = make_tarball(&[("secret.env", "TOKEN=abc\n")]);
        staging.write_payload(&payload).await.unwrap();

        let path = staging.path().to_path_buf();
        staging.purge().await;
        assert!(!path.exists());
    }

    #[test]
    fn test_wipe_file_larger_than_one_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        let original = vec![0xAAu8; WIPE_CHUNK * 2 + 123];
        fs::write(&path, &original).unwrap();

        wipe_file(&path).unwrap();

        let wiped = fs::read(&path).unwrap();
        assert_eq!(wiped.len(), original.len());
        assert_ne!(wiped, original);
    }

    #[test]
    fn test_verify_digest_mismatch() {
        use chrono::Utc;
        let artifact = Artifact {
            id: uuid::Uuid::new_v4(),
            version: "v1".to_string(),
            target_kind: crate::db::models::TargetKind::Compose,
            payload: b"bundle-bytes".to_vec(),
            env_overlay: None,
            values_overlay: None,
            sha256: "deadbeef".to_string(),
            is_current: false,
            is_previous: false,
            applied_at: None,
            created_at: Utc::now(),
        };
        assert!(verify_digest(&artifact).is_err());

        let mut good = artifact.clone();
        good.sha256 = crate::utils::sha256_hash(&good.payload);
        assert!(verify_digest(&good).is_ok());
    }
}
