//! Input resolution: validate a user-supplied path and open it.
//!
//! Fetching remote documents is left to the caller; a URL handed to the
//! engine is rejected with a hint to download it first and pass the bytes
//! through [`crate::DocumentEngine::convert_with_metadata`].

use crate::error::Doc2MdError;
use crate::pipeline::detect::is_url;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A validated local input, opened for reading.
#[derive(Debug)]
pub struct ResolvedInput {
    pub path: PathBuf,
    pub file: File,
}

/// Resolve the input string to an open local file.
pub fn resolve_input(input: &str) -> Result<ResolvedInput, Doc2MdError> {
    if is_url(input) {
        return Err(Doc2MdError::InvalidInput {
            input: input.to_string(),
            reason: "URLs are not fetched by the engine; download the document and use \
                     convert_with_metadata() or a local path"
                .to_string(),
        });
    }
    if input.trim().is_empty() {
        return Err(Doc2MdError::InvalidInput {
            input: input.to_string(),
            reason: "empty path".to_string(),
        });
    }
    resolve_local(Path::new(input))
}

/// Open a local file, mapping the common failures to precise errors.
pub fn resolve_local(path: &Path) -> Result<ResolvedInput, Doc2MdError> {
    if !path.exists() {
        return Err(Doc2MdError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if path.is_dir() {
        return Err(Doc2MdError::InvalidInput {
            input: path.display().to_string(),
            reason: "is a directory".to_string(),
        });
    }

    match File::open(path) {
        Ok(file) => {
            debug!("Resolved local input: {}", path.display());
            Ok(ResolvedInput {
                path: path.to_path_buf(),
                file,
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(Doc2MdError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(Doc2MdError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn urls_are_rejected() {
        let err = resolve_input("https://example.com/doc.pdf").unwrap_err();
        assert!(matches!(err, Doc2MdError::InvalidInput { .. }));
        assert!(err.to_string().contains("convert_with_metadata"));
    }

    #[test]
    fn missing_file() {
        let err = resolve_input("/no/such/file.txt").unwrap_err();
        assert!(matches!(err, Doc2MdError::FileNotFound { .. }));
    }

    #[test]
    fn directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_local(dir.path()).unwrap_err();
        assert!(err.to_string().contains("is a directory"));
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(
            resolve_input("  ").unwrap_err(),
            Doc2MdError::InvalidInput { .. }
        ));
    }

    #[test]
    fn existing_file_opens() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hi").unwrap();
        let resolved = resolve_input(tmp.path().to_str().unwrap()).unwrap();
        assert_eq!(resolved.path, tmp.path());
    }
}
