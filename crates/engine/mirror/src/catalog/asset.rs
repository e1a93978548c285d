use std::{io, path::Path};
use tempfile::TempPath;

/// A downloaded asset living in a temp file.
///
/// The file is removed when this value is dropped, whichever way the caller
/// leaves the scope that holds it.
#[derive(Debug)]
pub struct DownloadedAsset {
    name: String,
    path: TempPath,
}

impl DownloadedAsset {
    pub(crate) fn new(name: impl Into<String>, path: TempPath) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file now and reports whether that worked.
    pub fn close(self) -> io::Result<()> {
        self.path.close()
    }
}

/// Reduces a model name to characters that are safe in a file name.
pub(crate) fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect();

    if cleaned.is_empty() {
        "asset".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sanitize_strips_path_characters() {
        assert_eq!(sanitize_name("../evil/name"), "___evil_name");
        assert_eq!(sanitize_name("Chair v2.glb"), "Chair_v2_glb");
        assert_eq!(sanitize_name(""), "asset");
    }

    #[test]
    fn file_is_removed_on_drop() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"glTF").unwrap();
        let asset = DownloadedAsset::new("chair", file.into_temp_path());
        let path = asset.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(asset.name(), "chair");

        drop(asset);
        assert!(!path.exists());
    }

    #[test]
    fn close_removes_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let asset = DownloadedAsset::new("lamp", file.into_temp_path());
        let path = asset.path().to_path_buf();
        asset.close().unwrap();
        assert!(!path.exists());
    }
}
