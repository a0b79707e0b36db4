//! Path resolution from the root directory.
use super::{
    FatError, FatFs, FatResult,
    dir::DirectoryEntry,
    file::{OpenFile, OpenOptions},
};
use crate::{
    BlockDevice,
    fs::{Component, FileType, Path},
};
use alloc::vec::Vec;

impl<D: BlockDevice> FatFs<D> {
    /// Walks `path` from the root directory and returns the entry it names.
    ///
    /// `.` is skipped and `..` goes up one level, never above the root. A
    /// file must be the last component. If `file_type` is given, the entry
    /// must be of that type.
    ///
    /// Descending into more than `MountOptions::max_depth` directories fails
    /// with [`FatError::BadInput`].
    pub fn resolve(
        &mut self,
        path: &str,
        file_type: Option<FileType>,
    ) -> FatResult<DirectoryEntry> {
        let mut stack: Vec<DirectoryEntry> = Vec::with_capacity(4);
        stack.push(self.root());
        let mut file = None;

        for component in Path::new(path).components() {
            if file.is_some() {
                return Err(FatError::NotFound);
            }
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                Component::Normal(name) => {
                    let Some(dir) = stack.last() else {
                        return Err(FatError::Inconsistent);
                    };
                    let mut cursor = self.dir_cursor(dir)?;
                    let entry = self.find_or_create(name, &mut cursor, false, false)?;
                    if entry.is_directory() {
                        if stack.len() > self.options.max_depth() {
                            log::debug!("Path \"{path}\" is nested too deeply");
                            return Err(FatError::BadInput);
                        }
                        stack.push(entry);
                    } else {
                        file = Some(entry);
                    }
                }
            }
        }

        let entry = match file {
            Some(entry) => entry,
            None => stack.pop().ok_or(FatError::Inconsistent)?,
        };
        match file_type {
            Some(file_type) if entry.file_type() != file_type => Err(FatError::NotFound),
            _ => Ok(entry),
        }
    }

    /// Opens the file or directory at `path`.
    ///
    /// With `create`, a missing last component is created in its containing
    /// directory, which must exist.
    pub fn open(&mut self, path: &str, options: OpenOptions) -> FatResult<OpenFile> {
        match self.resolve(path, None) {
            Ok(entry) => Ok(OpenFile::new(entry)),
            Err(FatError::NotFound) if options.is_create() => {
                let (parent, name) = Path::new(path).split_parent();
                let parent = self.resolve(parent.as_str(), Some(FileType::Directory))?;
                self.open_in(name, &parent, options)
            }
            Err(err) => Err(err),
        }
    }
}
