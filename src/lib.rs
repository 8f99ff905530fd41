//! # vamp
//!
//! Turns source files into completion prompts, sends them to a completion
//! endpoint and writes the answers back.
//!
//! ## Features
//!
//! - Layered INI modes (`/etc/vamp/vamprc`, then `~/.vamprc`)
//! - Literal placeholder templates with optional `ctags` tag blocks
//! - Hand-built JSON bodies with numeric settings passed through verbatim
//! - Byte-exact handling of inputs in any encoding
//! - Shell-free HTTP client invocation and atomic write-back
//!
//! ## Quick Start
//!
//! ```no_run
//! use vamp::{Config, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .mode("fix")
//!     .file("src/main.c")
//!     .build()?;
//!
//! Pipeline::new(config)?.run()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **Store**: overlays config layers and selects the mode's section
//! 2. **Template**: fills `{instructions}`, `{filename}`, `{file}` and `{tags}`
//! 3. **Payload**: escapes the prompt into a JSON request body
//! 4. **Completion**: runs the HTTP client and captures its output
//! 5. **Writer**: persists the response over the source file

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod completion;
mod config;
mod error;
mod file;
mod payload;
mod pipeline;
mod process;
mod store;
mod tags;
mod template;
mod writer;

pub use completion::{CONTENT_TYPE_HEADER, CompletionClient, DEFAULT_CLIENT, build_command};
pub use config::{
    Action, Config, ConfigBuilder, DEFAULT_MODE, Input, SYSTEM_CONFIG_PATH, USER_CONFIG_NAME,
    default_sources, layered_sources,
};
pub use error::{Error, Result};
pub use file::{STDIN_NAME, SourceFile};
pub use payload::{DEFAULT_MODEL, build_request_body, escape_json_string};
pub use pipeline::{Pipeline, PipelineStats};
pub use process::{CommandOutput, CommandRunner, Invocation, StderrMode, SystemRunner};
pub use store::{ConfigSource, ConfigStore, Section};
pub use tags::{CtagsExtractor, DEFAULT_CTAGS, NO_TAGS, TagExtractor};
pub use template::{
    FILE_PLACEHOLDER, FILENAME_PLACEHOLDER, INSTRUCTIONS_PLACEHOLDER, PromptBuilder,
    TAGS_PLACEHOLDER, TemplateVariant, load_template, substitute_all,
};

/// Runs the complete pipeline with the given configuration.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The selected mode has no config section
/// - An input cannot be read or its prompt cannot be built
/// - The completion call fails
/// - A response cannot be written
///
/// # Examples
///
/// ```no_run
/// use vamp::{Action, Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .file("notes.md")
///     .action(Action::PromptOnly)
///     .build()?;
///
/// run(config)?;
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<PipelineStats> {
    Pipeline::new(config)?.run()
}
