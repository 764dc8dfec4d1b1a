//! Read-only memory-mapped module images.
//!
//! Module images can reach several megabytes for a full game build. Mapping them instead of
//! reading them into a buffer lets the decoder work directly on the page cache, and the
//! mapping is dropped as soon as the [`Module`] has been built.
//!
//! # Safety
//!
//! The mapping is created with [`Mmap::map`], which is `unsafe` because another process
//! could truncate or rewrite the file while it is mapped. Images are only mapped for the
//! duration of a single decode, and the patched result is always written to a different
//! file (see [`crate::project::PatchProject::output_path`]).

use memmap2::Mmap;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{metadata::Module, Error, Result};

/// A module image mapped into memory.
pub(crate) struct MappedImage {
    path: PathBuf,
    data: Mmap,
}

impl MappedImage {
    /// Maps the image at `path`.
    ///
    /// `role` names what the module is used for in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingModule`] if there is no file at `path`,
    /// [`Error::InvalidModule`] if it is empty or cannot be mapped, and
    /// [`Error::FileError`] if it cannot be opened.
    pub(crate) fn open(role: &str, path: &Path) -> Result<MappedImage> {
        if !path.is_file() {
            return Err(Error::MissingModule {
                role: role.to_string(),
                path: path.to_path_buf(),
            });
        }

        let file = fs::File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(Error::InvalidModule {
                name: display_name(path),
                message: "empty image".to_string(),
            });
        }

        let data = unsafe { Mmap::map(&file) }.map_err(|error| Error::InvalidModule {
            name: display_name(path),
            message: error.to_string(),
        })?;

        Ok(MappedImage {
            path: path.to_path_buf(),
            data,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Decodes the mapped bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModule`] if the bytes are not a module image.
    pub(crate) fn decode(&self) -> Result<Module> {
        Module::from_json(&display_name(&self.path), &self.data)
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}
