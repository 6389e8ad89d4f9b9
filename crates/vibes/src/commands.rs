use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
pub use clap_complete::Shell;
use vibes_core::Engine;

const LONG_ABOUT: &str = r#"vibes runs codex and claude agent sessions in your projects.

A session binds a name to a working directory and an engine. Each run sends
one prompt to the engine; the conversation is resumed on the next run unless
--new is given. Output is rendered live while the engine works and kept in
log files afterwards.

EXAMPLES:
    vibes new api --path ~/src/api
    vibes run api "add a health check endpoint"
    vibes logs api
    vibes run api --new "start over: write the README"
    vibes model api gpt-5.2 --effort medium
    vibes delete api

Press Ctrl-C during a run to stop the engine gracefully; press it again to
exit immediately."#;

#[derive(Parser)]
#[command(name = "vibes")]
#[command(author, version)]
#[command(about = "Run codex and claude agent sessions and follow their output live")]
#[command(long_about = LONG_ABOUT)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the state file and run logs
    #[arg(long, global = true, env = "VIBES_RUNTIME_DIR")]
    pub runtime_dir: Option<PathBuf>,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineArg {
    Codex,
    Claude,
}

impl From<EngineArg> for Engine {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Codex => Engine::Codex,
            EngineArg::Claude => Engine::Claude,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a session bound to a directory
    New {
        /// Session name (letters, digits, '.', '_' and '-'); generated when omitted
        name: Option<String>,

        /// Working directory of the session
        #[arg(long, short, default_value = ".")]
        path: PathBuf,

        /// Engine that runs the prompts
        #[arg(long, short, value_enum)]
        engine: Option<EngineArg>,
    },

    /// List sessions
    #[command(alias = "ls")]
    List,

    /// Show a session and its last answer
    Show {
        name: String,
    },

    /// Change the model used by later runs
    Model {
        name: String,

        model: String,

        /// Reasoning effort (codex only)
        #[arg(long)]
        effort: Option<String>,
    },

    /// Send a prompt to the session's engine and follow the output
    Run {
        name: String,

        /// Start a new conversation instead of resuming the last one
        #[arg(long)]
        new: bool,

        /// The prompt; multiple words are joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },

    /// Print the tail of the last run's output
    Logs {
        name: String,

        /// Show stderr instead of the rendered output
        #[arg(long)]
        stderr: bool,
    },

    /// Forget the conversation and logs of a session
    Clear {
        name: String,
    },

    /// Delete a session and its logs (the directory is kept)
    #[command(alias = "rm")]
    Delete {
        name: String,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
