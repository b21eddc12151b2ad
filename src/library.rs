//! Work-queue selection over the source and destination folders
//!
//! The queue is the set difference between the two folder listings: a
//! source photo is pending until a file with its name (or the name the
//! save step rewrites it to) appears in the destination folder.

use crate::codec;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("failed to list folder {path:?}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A source photo waiting to be rectified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub name: String,
    pub path: PathBuf,
}

/// The source/destination folder pair
#[derive(Debug, Clone)]
pub struct ImageLibrary {
    source: PathBuf,
    destination: PathBuf,
}

impl ImageLibrary {
    pub fn new(source: PathBuf, destination: PathBuf) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Unprocessed source images in lexicographic name order.
    ///
    /// A source file counts as processed when the destination holds either
    /// its exact name or its save-rewritten name (HEIC sources are written
    /// as JPEG, and would otherwise be offered again forever). A
    /// destination folder that does not exist yet means nothing is
    /// processed; it is created on first save.
    pub fn unprocessed(&self) -> Result<Vec<SourceImage>, LibraryError> {
        let mut names = list_file_names(&self.source).map_err(|source| LibraryError::List {
            path: self.source.clone(),
            source,
        })?;
        names.sort();

        let done: HashSet<String> = if self.destination.exists() {
            list_file_names(&self.destination)
                .map_err(|source| LibraryError::List {
                    path: self.destination.clone(),
                    source,
                })?
                .into_iter()
                .collect()
        } else {
            HashSet::new()
        };

        Ok(names
            .into_iter()
            .filter(|n| !done.contains(n) && !done.contains(&codec::saved_file_name(n)))
            .map(|name| SourceImage {
                path: self.source.join(&name),
                name,
            })
            .collect())
    }
}

fn list_file_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn next_image_is_first_not_in_destination() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        touch(src.path(), "a.jpg");
        touch(src.path(), "b.jpg");
        touch(dst.path(), "a.jpg");

        let library = ImageLibrary::new(src.path().to_path_buf(), dst.path().to_path_buf());
        let pending = library.unprocessed().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "b.jpg");
        assert_eq!(pending[0].path, src.path().join("b.jpg"));
    }

    #[test]
    fn listing_is_sorted_by_name() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        touch(src.path(), "c.jpg");
        touch(src.path(), "a.jpg");
        touch(src.path(), "b.jpg");

        let library = ImageLibrary::new(src.path().to_path_buf(), dst.path().to_path_buf());
        let names: Vec<_> = library
            .unprocessed()
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, ["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn heic_source_is_processed_once_its_jpg_exists() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        touch(src.path(), "x.heic");
        touch(dst.path(), "x.jpg");

        let library = ImageLibrary::new(src.path().to_path_buf(), dst.path().to_path_buf());
        assert!(library.unprocessed().unwrap().is_empty());
    }

    #[test]
    fn missing_destination_folder_means_nothing_processed() {
        let src = tempfile::tempdir().unwrap();
        touch(src.path(), "a.jpg");

        let library = ImageLibrary::new(
            src.path().to_path_buf(),
            src.path().join("not-created-yet"),
        );
        assert_eq!(library.unprocessed().unwrap().len(), 1);
    }

    #[test]
    fn empty_source_folder_is_an_empty_queue() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        let library = ImageLibrary::new(src.path().to_path_buf(), dst.path().to_path_buf());
        assert!(library.unprocessed().unwrap().is_empty());
    }

    #[test]
    fn unreadable_source_folder_is_an_error() {
        let src = tempfile::tempdir().unwrap();
        let library = ImageLibrary::new(src.path().join("gone"), src.path().to_path_buf());
        assert!(matches!(
            library.unprocessed(),
            Err(LibraryError::List { .. })
        ));
    }
}
