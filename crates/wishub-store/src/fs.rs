//! Filesystem-backed `ArtifactStore`: code blobs at `<root>/<skill_id>/<version>/skill.<ext>`.

use async_trait::async_trait;
use wishub_core::skill::{CodePointer, Language};
use wishub_core::traits::{ArtifactError, ArtifactStore};

pub struct FilesystemArtifactStore {
    root: std::path::PathBuf,
}

impl FilesystemArtifactStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        FilesystemArtifactStore { root: root.into() }
    }

    fn extension(language: Language) -> &'static str {
        match language {
            Language::Python => "py",
            Language::Typescript => "ts",
            Language::Go => "go",
            Language::Java => "java",
            Language::Rust => "rs",
        }
    }

    fn dir_for(&self, skill_id: &str, version: &str) -> std::path::PathBuf {
        self.root.join(skill_id).join(version)
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    async fn fetch(&self, pointer: &CodePointer) -> Result<Vec<u8>, ArtifactError> {
        let (skill_id, version) = pointer
            .as_str()
            .split_once('/')
            .ok_or_else(|| ArtifactError::NotFound(pointer.as_str().to_string()))?;
        let dir = self.dir_for(skill_id, version);

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ArtifactError::NotFound(format!("{}: {e}", dir.display())))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ArtifactError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.file_stem().map(|s| s == "skill").unwrap_or(false) {
                return tokio::fs::read(&path)
                    .await
                    .map_err(|e| ArtifactError::Storage(e.to_string()));
            }
        }
        Err(ArtifactError::NotFound(pointer.as_str().to_string()))
    }

    async fn put(
        &self,
        skill_id: &str,
        version: &str,
        language: Language,
        bytes: &[u8],
    ) -> Result<CodePointer, ArtifactError> {
        let dir = self.dir_for(skill_id, version);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ArtifactError::Storage(e.to_string()))?;

        let path = dir.join(format!("skill.{}", Self::extension(language)));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ArtifactError::Storage(e.to_string()))?;

        Ok(CodePointer::new(skill_id, version))
    }

    async fn delete(&self, skill_id: &str, version: &str) -> Result<(), ArtifactError> {
        let dir = self.dir_for(skill_id, version);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ArtifactError::Storage(e.to_string())),
        }
    }
}
