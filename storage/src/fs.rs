pub mod fat;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
/// A `/`-separated path, relative to the root directory whether or not it
/// starts with a slash.
pub struct Path<'a>(&'a str);

impl<'a> Path<'a> {
    #[must_use]
    #[inline]
    /// Creates a new `Path` from the given string slice.
    pub const fn new(path: &'a str) -> Self {
        Self(path)
    }

    #[must_use]
    #[inline]
    pub const fn as_str(&self) -> &'a str {
        self.0
    }

    /// Iterates over the components of the path, skipping empty ones.
    pub fn components(&self) -> impl Iterator<Item = Component<'a>> + use<'a> {
        self.0
            .split('/')
            .filter(|part| !part.is_empty())
            .map(|part| match part {
                "." => Component::CurDir,
                ".." => Component::ParentDir,
                name => Component::Normal(name),
            })
    }

    #[must_use]
    /// Splits the path into its containing directory and its last part.
    ///
    /// A path without a slash lives in the root directory.
    pub fn split_parent(&self) -> (Self, &'a str) {
        self.0
            .rsplit_once('/')
            .map_or((Self(""), self.0), |(parent, name)| (Self(parent), name))
    }
}

impl<'a> From<&'a str> for Path<'a> {
    #[inline]
    fn from(value: &'a str) -> Self {
        Self(value)
    }
}

impl core::ops::Deref for Path<'_> {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Component<'a> {
    /// `.`
    CurDir,
    /// `..`
    ParentDir,
    Normal(&'a str),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FileType {
    File,
    Directory,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_components() {
        let path = Path::new("/sub//dir/./../file.txt/");
        let components: Vec<_> = path.components().collect();
        assert_eq!(
            components,
            [
                Component::Normal("sub"),
                Component::Normal("dir"),
                Component::CurDir,
                Component::ParentDir,
                Component::Normal("file.txt"),
            ]
        );
        assert_eq!(Path::new("/").components().count(), 0);
        assert_eq!(Path::new("").components().count(), 0);
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(
            Path::new("sub/dir/file.txt").split_parent(),
            (Path::new("sub/dir"), "file.txt")
        );
        assert_eq!(Path::new("file.txt").split_parent(), (Path::new(""), "file.txt"));
        assert_eq!(Path::new("/file.txt").split_parent(), (Path::new(""), "file.txt"));
        assert_eq!(Path::from("a/b").as_str(), "a/b");
        assert_eq!(Path::new("a/b").len(), 3);
    }
}
