//! Registry Store: reads strap's `registry.json`.
//!
//! The document is edited by strap itself and by hand; this crate only reads
//! it. A missing document means "nothing registered yet" and yields an empty
//! registry. Unreadable or malformed documents are errors for the caller to
//! degrade.

use fs_err as fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{AllmindError, Result};
use crate::types::Registry;

/// Reads the registry document, distinguishing "absent" from "empty".
pub fn read_registry(path: &Path) -> Result<Option<Registry>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(AllmindError::RegistryRead {
                path: path.to_path_buf(),
                source: err,
            })
        }
    };

    // strap writes the file non-atomically; treat a truncated-to-zero file as empty.
    if content.trim().is_empty() {
        return Ok(Some(Registry::default()));
    }

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| AllmindError::RegistryMalformed {
            path: path.to_path_buf(),
            source,
        })
}

/// Loads the registry, treating an absent document as an empty registry.
pub fn load_registry(path: &Path) -> Result<Registry> {
    Ok(read_registry(path)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_document_is_empty_registry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.json");

        assert_eq!(read_registry(&path).unwrap(), None);
        assert!(load_registry(&path).unwrap().repos.is_empty());
    }

    #[test]
    fn empty_file_is_empty_registry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.json");
        std::fs::write(&path, "  \n").unwrap();

        assert_eq!(read_registry(&path).unwrap(), Some(Registry::default()));
    }

    #[test]
    fn document_without_repos_key_is_empty_registry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.json");
        std::fs::write(&path, r#"{"version": 2}"#).unwrap();

        assert!(load_registry(&path).unwrap().repos.is_empty());
    }

    #[test]
    fn malformed_document_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_registry(&path).unwrap_err();
        assert!(matches!(err, AllmindError::RegistryMalformed { .. }));
    }

    #[test]
    fn directory_in_place_of_document_is_a_read_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.json");
        std::fs::create_dir(&path).unwrap();

        let err = load_registry(&path).unwrap_err();
        assert!(matches!(err, AllmindError::RegistryRead { .. }));
    }

    #[test]
    fn preserves_registry_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.json");
        std::fs::write(
            &path,
            r#"{"repos": [{"name": "zeta"}, {"name": "alpha"}, {"name": "mid"}]}"#,
        )
        .unwrap();

        let names: Vec<_> = load_registry(&path)
            .unwrap()
            .repos
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }
}
