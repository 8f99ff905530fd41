use crate::process::{CommandRunner, Invocation};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Text inserted for `{tags}` when no tag block could be produced.
pub const NO_TAGS: &str = "NO CTAGS";

/// Default symbol indexing program.
pub const DEFAULT_CTAGS: &str = "ctags";

/// Produces an advisory symbol summary for a file.
///
/// Extraction is best effort: any failure is reported as `None`.
pub trait TagExtractor: Send + Sync {
    /// Returns the tag block for the file at `path`, or `None` if nothing
    /// usable was produced.
    fn extract(&self, path: &Path) -> Option<Vec<u8>>;
}

/// Runs `ctags -x` through a [`CommandRunner`].
#[derive(Clone)]
pub struct CtagsExtractor {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl CtagsExtractor {
    /// Creates an extractor running the default `ctags` program.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            program: DEFAULT_CTAGS.to_string(),
        }
    }

    /// Overrides the program that is run.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// The invocation used for `path`. Options end at `--`, so a file name
    /// starting with `-` is still read as a file.
    #[must_use]
    pub fn invocation(&self, path: &Path) -> Invocation {
        Invocation::new(&self.program)
            .args(["-x", "--sort=no", "--"])
            .arg(path)
            .discard_stderr()
    }
}

impl TagExtractor for CtagsExtractor {
    fn extract(&self, path: &Path) -> Option<Vec<u8>> {
        let output = match self.runner.run(&self.invocation(path)) {
            Ok(output) => output,
            Err(e) => {
                debug!("Tag extraction unavailable: {e}");
                return None;
            }
        };

        if !output.success() || output.stdout.is_empty() {
            debug!(
                "Tag extraction for {} gave no tags (status {:?})",
                path.display(),
                output.code
            );
            return None;
        }

        Some(output.stdout)
    }
}

impl std::fmt::Debug for CtagsExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtagsExtractor")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}
