use crate::error::{Error, Result};
use crate::store::ConfigSource;
use std::path::{Path, PathBuf};

/// Mode selected when none is given.
pub const DEFAULT_MODE: &str = "vamp";

/// System-wide config layer.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/vamp/vamprc";

/// Per-user config layer, relative to the home directory.
pub const USER_CONFIG_NAME: &str = ".vamprc";

/// Returns the default ordered config layers: system file, then the user
/// file when a home directory is known.
#[must_use]
pub fn default_sources(home: Option<&Path>) -> Vec<ConfigSource> {
    layered_sources(Path::new(SYSTEM_CONFIG_PATH), None, home)
}

/// Returns the ordered config layers for an explicit system file and an
/// optional user file override.
///
/// Without an override the user layer is `<home>/.vamprc`, and it is left out
/// when `home` is unknown or empty.
#[must_use]
pub fn layered_sources(system: &Path, user: Option<&Path>, home: Option<&Path>) -> Vec<ConfigSource> {
    let mut sources = vec![ConfigSource::file(system)];

    let user = user.map(Path::to_path_buf).or_else(|| {
        home.filter(|h| !h.as_os_str().is_empty())
            .map(|h| h.join(USER_CONFIG_NAME))
    });
    sources.extend(user.map(ConfigSource::file));

    sources
}

/// Where input text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Standard input; the response goes to standard output
    Stdin,
    /// Files processed in order; each response replaces its file
    Files(Vec<PathBuf>),
}

/// What to do with each built prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Send to the completion service and persist the response
    #[default]
    Fetch,
    /// Print the prompt and stop
    PromptOnly,
    /// Print the shell command that would be run and stop
    PrintCommand,
}

/// Configuration for one vamp run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Config section to use
    pub mode: String,

    /// Config layers, loaded in order
    pub sources: Vec<ConfigSource>,

    /// Input selection
    pub input: Input,

    /// What to do with prompts
    pub action: Action,

    /// Back up files before overwriting them
    pub backup_existing: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use vamp::Config;
    ///
    /// let config = Config::builder()
    ///     .mode("fix")
    ///     .file("src/main.c")
    ///     .build()
    ///     .expect("valid configuration");
    /// assert_eq!(config.mode, "fix");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The mode name is empty
    /// - File input was selected with no files
    pub fn validate(&self) -> Result<()> {
        if self.mode.is_empty() {
            return Err(Error::config("mode name must not be empty"));
        }

        if let Input::Files(files) = &self.input {
            if files.is_empty() {
                return Err(Error::config("no files specified"));
            }
        }

        if self.backup_existing && self.input == Input::Stdin {
            tracing::warn!("backups only apply to file inputs; stdin output goes to stdout");
        }

        Ok(())
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    mode: Option<String>,
    sources: Option<Vec<ConfigSource>>,
    extra_sources: Vec<ConfigSource>,
    input: Option<Input>,
    files: Vec<PathBuf>,
    action: Action,
    backup_existing: bool,
}

impl ConfigBuilder {
    /// Sets the config section to use.
    #[must_use]
    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Replaces the base config layers (default: [`default_sources`] from `$HOME`).
    #[must_use]
    pub fn sources(mut self, sources: Vec<ConfigSource>) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Appends one layer after the base layers.
    #[must_use]
    pub fn source(mut self, source: ConfigSource) -> Self {
        self.extra_sources.push(source);
        self
    }

    /// Reads from standard input.
    #[must_use]
    pub fn stdin(mut self) -> Self {
        self.input = Some(Input::Stdin);
        self
    }

    /// Adds one input file.
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Adds input files.
    #[must_use]
    pub fn files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Sets what happens to each prompt.
    #[must_use]
    pub const fn action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Enables or disables backups before overwriting.
    #[must_use]
    pub const fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let mut sources = self.sources.unwrap_or_else(|| {
            let home = std::env::var_os("HOME").map(PathBuf::from);
            default_sources(home.as_deref())
        });
        sources.extend(self.extra_sources);

        let input = match self.input {
            Some(Input::Stdin) if self.files.is_empty() => Input::Stdin,
            Some(Input::Stdin) => {
                return Err(Error::config("stdin input cannot be combined with files"));
            }
            Some(Input::Files(mut files)) => {
                files.extend(self.files);
                Input::Files(files)
            }
            None => Input::Files(self.files),
        };

        let config = Config {
            mode: self.mode.unwrap_or_else(|| DEFAULT_MODE.to_string()),
            sources,
            input,
            action: self.action,
            backup_existing: self.backup_existing,
        };

        config.validate()?;
        Ok(config)
    }
}
