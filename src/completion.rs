use crate::{
    error::{Error, Result},
    payload::build_request_body,
    process::{CommandRunner, Invocation},
    store::Section,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Default HTTP client program.
pub const DEFAULT_CLIENT: &str = "curl";

/// Header sent with every request.
pub const CONTENT_TYPE_HEADER: &str = "Content-Type: application/json";

/// Builds the POST invocation of the HTTP client for `body`.
///
/// The body and URL are separate argv entries, so quotes inside the prompt
/// cannot change the command.
#[must_use]
pub fn build_command(program: &str, url: &str, body: Vec<u8>) -> Invocation {
    Invocation::new(program)
        .args(["-sS", "-X", "POST", "-H", CONTENT_TYPE_HEADER, "--data"])
        .arg_bytes(body)
        .arg("--url")
        .arg(url)
}

/// Sends prompts to the completion endpoint through an external HTTP client.
#[derive(Clone)]
pub struct CompletionClient {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl CompletionClient {
    /// Creates a client running the default `curl` program.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            program: DEFAULT_CLIENT.to_string(),
        }
    }

    /// Overrides the client program.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// The client program.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Builds the invocation that [`fetch`](Self::fetch) would run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingKey`] if `posturl` is absent or empty, or an
    /// allocation error from body construction.
    pub fn request(&self, section: &Section, prompt: &[u8]) -> Result<Invocation> {
        let url = section
            .get_non_empty("posturl")
            .ok_or_else(|| Error::missing_key(section.name(), "posturl"))?;

        let body = build_request_body(section, prompt)?;
        debug!("Request body is {} bytes for {}", body.len(), url);

        Ok(build_command(&self.program, url, body))
    }

    /// Runs `invocation` and returns its complete stdout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the process cannot be run and
    /// [`Error::CommandFailed`] if it exits non-zero, even when it wrote
    /// output.
    pub fn execute(&self, invocation: &Invocation) -> Result<Vec<u8>> {
        let output = self.runner.run(invocation)?;

        if !output.success() {
            return Err(Error::command_failed(invocation.program(), output.code));
        }

        Ok(output.stdout)
    }

    /// Sends `prompt` with the section's settings and returns the raw response.
    ///
    /// # Errors
    ///
    /// Fails before anything is spawned if `posturl` is missing; otherwise
    /// see [`execute`](Self::execute).
    #[instrument(skip(self, section, prompt), fields(mode = section.name(), prompt_len = prompt.len()))]
    pub fn fetch(&self, section: &Section, prompt: &[u8]) -> Result<Vec<u8>> {
        let invocation = self.request(section, prompt)?;
        let response = self.execute(&invocation)?;
        info!("Received {} bytes from {}", response.len(), self.program);
        Ok(response)
    }
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}
