use anyhow::{Context, bail};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vamp::{Action, Config, ConfigSource, DEFAULT_MODE, Pipeline, SYSTEM_CONFIG_PATH, layered_sources};

#[derive(Parser, Debug)]
#[command(
    name = "vamp",
    version,
    author,
    about = "Rewrite files with a completion service, one prompt per file",
    long_about = "Builds a prompt for each file from the selected mode's config section, \
    sends it to the mode's posturl and writes the answer back over the file.\n\n\
    Modes are [sections] of /etc/vamp/vamprc and ~/.vamprc; the user file wins.\n\n\
    USAGE EXAMPLES:\n  \
      # Rewrite two files with the default [vamp] mode\n  \
      vamp src/a.c src/b.c\n\n  \
      # Use the [fix] mode and keep backups\n  \
      vamp --mode fix --backup src/a.c\n\n  \
      # Pipe text through and print the answer\n  \
      cat notes.md | vamp -m summarize\n\n  \
      # Show the prompt without calling anything\n  \
      vamp --prompt-only src/a.c"
)]
struct Cli {
    /// Config section to use
    #[arg(short, long, default_value = DEFAULT_MODE, value_name = "NAME")]
    mode: String,

    /// Files to rewrite; reads stdin when omitted and stdin is not a terminal
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// System-wide config layer
    #[arg(long, env = "VAMP_SYSTEM_RC", default_value = SYSTEM_CONFIG_PATH, value_name = "PATH")]
    system_config: PathBuf,

    /// Per-user config layer [default: ~/.vamprc]
    #[arg(long, env = "VAMP_USER_RC", value_name = "PATH")]
    user_config: Option<PathBuf>,

    /// Extra config layer loaded after the user layer (repeatable)
    #[arg(short, long = "config", value_name = "PATH")]
    config: Vec<PathBuf>,

    /// Print prompts instead of sending them
    #[arg(short, long, conflicts_with = "print_command")]
    prompt_only: bool,

    /// Print the client command line instead of running it
    #[arg(long)]
    print_command: bool,

    /// Copy each file to <name>.backup.<nanos> before overwriting it
    #[arg(long)]
    backup: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn sources(&self) -> Vec<ConfigSource> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        let mut sources =
            layered_sources(&self.system_config, self.user_config.as_deref(), home.as_deref());
        sources.extend(self.config.iter().map(ConfigSource::file));
        sources
    }

    const fn action(&self) -> Action {
        if self.prompt_only {
            Action::PromptOnly
        } else if self.print_command {
            Action::PrintCommand
        } else {
            Action::Fetch
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("vamp: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut builder = Config::builder()
        .mode(&cli.mode)
        .sources(cli.sources())
        .action(cli.action())
        .backup_existing(cli.backup);

    if cli.files.is_empty() {
        if std::io::stdin().is_terminal() {
            bail!("no files specified");
        }
        builder = builder.stdin();
    } else {
        builder = builder.files(cli.files);
    }

    let config = builder.build().context("invalid arguments")?;

    let stats = Pipeline::new(config)?.run()?;
    tracing::debug!("{stats:?}");

    Ok(())
}

fn setup_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::new("vamp=warn"),
        1 => EnvFilter::new("vamp=info"),
        2 => EnvFilter::new("vamp=debug"),
        _ => EnvFilter::new("vamp=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .init();
}
