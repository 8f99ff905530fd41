use crate::{
    completion::CompletionClient,
    config::{Action, Config, Input},
    error::{Error, Result},
    file::SourceFile,
    process::{CommandRunner, SystemRunner},
    store::{ConfigStore, Section},
    tags::CtagsExtractor,
    template::{PromptBuilder, TemplateVariant},
    writer::Writer,
};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

const STDOUT_NAME: &str = "<stdout>";

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Inputs turned into prompts
    pub files_processed: usize,

    /// Total size of all prompts
    pub prompt_bytes: usize,

    /// Total size of all responses written
    pub response_bytes: usize,

    /// Total execution time
    pub duration: Duration,
}

/// Runs one mode over its inputs: prompt, request, persist.
pub struct Pipeline {
    config: Config,
    section: Section,
    prompts: PromptBuilder,
    client: CompletionClient,
    writer: Writer,
}

impl Pipeline {
    /// Creates a pipeline that runs external programs for real.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::with_runner`].
    pub fn new(config: Config) -> Result<Self> {
        Self::with_runner(config, SystemRunner::shared())
    }

    /// Creates a pipeline that runs external programs through `runner`.
    ///
    /// Loads every config layer, then selects the mode's section.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - A present config layer cannot be read
    /// - The mode has no section
    /// - The section names an unknown template variant
    pub fn with_runner(config: Config, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        config.validate()?;

        let store = ConfigStore::from_sources(&config.sources)?;
        let section = store
            .section(&config.mode)
            .cloned()
            .ok_or_else(|| Error::config_missing(&config.mode))?;
        debug!("Using section [{}] with {} keys", section.name(), section.len());

        let variant = TemplateVariant::from_section(&section)?;

        let mut tags = CtagsExtractor::new(Arc::clone(&runner));
        if let Some(program) = section.get_non_empty("ctags") {
            tags = tags.with_program(program);
        }

        let mut client = CompletionClient::new(runner);
        if let Some(program) = section.get_non_empty("curl") {
            client = client.with_program(program);
        }

        Ok(Self {
            writer: Writer::new(config.backup_existing),
            prompts: PromptBuilder::new(variant, Arc::new(tags)),
            client,
            section,
            config,
        })
    }

    /// The selected config section.
    #[must_use]
    pub const fn section(&self) -> &Section {
        &self.section
    }

    /// Runs against the process's standard streams.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run_with`].
    pub fn run(self) -> Result<PipelineStats> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.run_with(&mut stdin.lock(), &mut stdout.lock())
    }

    /// Runs every input in order, stopping at the first failure.
    ///
    /// Files already rewritten before a failure stay rewritten.
    ///
    /// # Errors
    ///
    /// Returns the first error from reading an input, building its prompt,
    /// the completion call, or writing the result.
    #[instrument(skip_all, fields(mode = %self.config.mode))]
    pub fn run_with(self, stdin: &mut dyn Read, stdout: &mut dyn Write) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let mut stats = PipelineStats::default();

        match &self.config.input {
            Input::Stdin => {
                let source = SourceFile::read_stdin(stdin)?;
                self.process_source(&source, stdout, &mut stats)?;
            }
            Input::Files(files) => {
                for (index, path) in files.iter().enumerate() {
                    let source = SourceFile::read(path)?;
                    self.process_source(&source, stdout, &mut stats)?;

                    if self.config.action == Action::PromptOnly && index + 1 < files.len() {
                        emit(stdout, b"\n")?;
                    }
                }
            }
        }

        stdout.flush().map_err(|e| Error::io(STDOUT_NAME, e))?;
        stats.duration = start_time.elapsed();

        info!(
            "✓ Processed {} input(s): {} prompt bytes, {} response bytes in {:.2}s",
            stats.files_processed,
            stats.prompt_bytes,
            stats.response_bytes,
            stats.duration.as_secs_f64()
        );

        Ok(stats)
    }

    /// Builds the prompt for one source and delivers the result: a file's
    /// response replaces the file, a stdin response goes to `stdout`.
    #[instrument(skip_all, fields(file = %source.name))]
    fn process_source(
        &self,
        source: &SourceFile,
        stdout: &mut dyn Write,
        stats: &mut PipelineStats,
    ) -> Result<()> {
        debug!("Read {} bytes, {} lines", source.size_bytes(), source.line_count());
        let prompt = self.prompts.build(&self.section, source)?;
        stats.prompt_bytes += prompt.len();

        if let Some(response) = self.handle_prompt(&prompt, stdout)? {
            stats.response_bytes += response.len();
            match &source.path {
                Some(path) => {
                    self.writer.write_file_atomic(path, &response)?;
                    info!("Rewrote {}", path.display());
                }
                None => emit(stdout, &response)?,
            }
        }

        stats.files_processed += 1;
        Ok(())
    }

    /// Applies the configured action to a prompt. Returns the completion
    /// response when the action fetches one; the print actions write to
    /// `stdout` and return `None`.
    fn handle_prompt(&self, prompt: &[u8], stdout: &mut dyn Write) -> Result<Option<Vec<u8>>> {
        match self.config.action {
            Action::PromptOnly => {
                emit(stdout, prompt)?;
                Ok(None)
            }
            Action::PrintCommand => {
                let mut line = self.client.request(&self.section, prompt)?.shell_line()?;
                line.push(b'\n');
                emit(stdout, &line)?;
                Ok(None)
            }
            Action::Fetch => self.client.fetch(&self.section, prompt).map(Some),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("section", &self.section.name())
            .field("prompts", &self.prompts)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

fn emit(stdout: &mut dyn Write, bytes: &[u8]) -> Result<()> {
    stdout
        .write_all(bytes)
        .map_err(|e| Error::io(STDOUT_NAME, e))
}
