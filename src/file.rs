use crate::error::{Error, Result};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Name used in prompts for standard input.
pub const STDIN_NAME: &str = "<stdin>";

/// One input and its raw contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Where the text came from, `None` for standard input
    pub path: Option<PathBuf>,

    /// Name substituted for `{filename}`
    pub name: String,

    /// Full contents, in whatever encoding the input uses
    pub contents: Vec<u8>,
}

impl SourceFile {
    /// Creates a source from contents already in memory.
    #[must_use]
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: None,
            name: name.into(),
            contents: contents.into(),
        }
    }

    /// Reads a whole file. The file is never modified.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read(path).map_err(|e| Error::io(path, e))?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            name: path.to_string_lossy().into_owned(),
            contents,
        })
    }

    /// Reads everything from `reader` as the standard-input source.
    ///
    /// # Errors
    ///
    /// Returns an IO error if reading fails.
    pub fn read_stdin(reader: &mut dyn Read) -> Result<Self> {
        let mut contents = Vec::new();
        reader
            .read_to_end(&mut contents)
            .map_err(|e| Error::io(STDIN_NAME, e))?;

        Ok(Self::new(STDIN_NAME, contents))
    }

    /// Size of the contents in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.contents.len()
    }

    /// Number of lines in the contents.
    #[must_use]
    pub fn line_count(&self) -> usize {
        let newlines = memchr::memchr_iter(b'\n', &self.contents).count();
        if self.contents.last().is_some_and(|&b| b != b'\n') {
            newlines + 1
        } else {
            newlines
        }
    }
}
