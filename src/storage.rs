//
// storage.rs
// dicom-veil
//
// Output directory that receives exported artifacts, with name sanitization and collision-safe naming.
//

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::Result;
use crate::exporter::{Artifact, ArtifactSink};

#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
    written: Vec<PathBuf>,
}

impl OutputDir {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        // Create the output directory eagerly so a late export cannot fail on it.
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            written: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths written so far, in emission order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Saves `bytes` under the final component of `name`, never overwriting an existing file.
    pub fn save(&mut self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let file_name = sanitize_filename(name);
        let mut path = self.root.join(&file_name);
        if path.exists() {
            // Same name already delivered: disambiguate with a content hash.
            let hash = hex::encode(Sha256::digest(bytes));
            let stem = Path::new(&file_name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("dicom");
            let renamed = match Path::new(&file_name).extension().and_then(|e| e.to_str()) {
                Some(ext) => format!("{}-{}.{}", stem, &hash[..12], ext),
                None => format!("{}-{}", stem, &hash[..12]),
            };
            path = self.root.join(renamed);
        }
        fs::write(&path, bytes)?;
        self.written.push(path.clone());
        Ok(path)
    }
}

impl ArtifactSink for OutputDir {
    fn emit(&mut self, artifact: Artifact) -> Result<()> {
        let path = self.save(&artifact.name, &artifact.bytes)?;
        info!(path = %path.display(), kind = ?artifact.kind, size = artifact.bytes.len(), "artifact written");
        Ok(())
    }
}

fn sanitize_filename(input: &str) -> String {
    // Drop any directory part (archive members carry one) and keep a safe character set.
    let last = input.rsplit(['/', '\\']).next().unwrap_or(input);
    let cleaned: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "dicom.dcm".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::ArtifactKind;
    use tempfile::tempdir;

    #[test]
    fn sanitize_strips_dangerous_characters() {
        assert_eq!(sanitize_filename("../weird name 123.dcm"), "weirdname123.dcm");
        assert_eq!(sanitize_filename("series\\..\\x.dcm"), "x.dcm");
        assert_eq!(sanitize_filename("study/sub/IM0001.dcm"), "IM0001.dcm");
        assert_eq!(sanitize_filename("../.."), "dicom.dcm");
    }

    #[test]
    fn emitted_artifacts_stay_inside_root_and_never_overwrite() {
        let root = tempdir().expect("tmpdir");
        let mut out = OutputDir::new(root.path().join("out")).expect("output dir");

        for bytes in [&b"first"[..], &b"second"[..]] {
            out.emit(Artifact {
                name: "../escape.dcm".into(),
                kind: ArtifactKind::Dicom,
                bytes: bytes.to_vec(),
            })
            .expect("emit");
        }

        let written = out.written().to_vec();
        assert_eq!(written.len(), 2);
        assert_ne!(written[0], written[1]);
        for path in &written {
            assert!(path.starts_with(out.root()));
        }
        assert_eq!(fs::read(&written[0]).unwrap(), b"first");
        assert_eq!(fs::read(&written[1]).unwrap(), b"second");
        assert!(!root.path().join("escape.dcm").exists());
    }
}
