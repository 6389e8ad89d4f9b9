use std::io::IsTerminal;
use std::sync::Arc;

use clap::CommandFactory;
use clap::Parser;
use clap_complete::generate;

use vibes::commands::Cli;
use vibes::commands::Commands;
use vibes::handlers;
use vibes::handlers::HandlerContext;
use vibes::telemetry::init_tracing;
use vibes::ConsoleChannel;
use vibes_common::color_init;
use vibes_common::Colors;
use vibes_daemon::DaemonConfig;
use vibes_daemon::SessionError;
use vibes_daemon::SessionManager;
use vibes_process::UnixProcessController;

fn main() {
    match run() {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if let Some(session_error) = e.downcast_ref::<SessionError>() {
                eprintln!("{} {}", Colors::error("Error:"), session_error);
                eprintln!(
                    "{} {}",
                    Colors::dim("Suggestion:"),
                    session_error.suggestion()
                );
                if session_error.is_retryable() {
                    eprintln!(
                        "{}",
                        Colors::dim("(This error may be transient - retry may succeed)")
                    );
                }
                std::process::exit(exit_code_for_session_error(session_error));
            } else {
                eprintln!("{} {:#}", Colors::error("Error:"), e);
                std::process::exit(1);
            }
        }
    }
}

fn exit_code_for_session_error(error: &SessionError) -> i32 {
    match error {
        SessionError::InvalidName(_) | SessionError::DirectoryNotFound(_) => 64, // EX_USAGE
        SessionError::NotFound(_) | SessionError::NotRunning(_) => 69, // EX_UNAVAILABLE
        SessionError::AlreadyExists(_) | SessionError::Running(_) => 73, // EX_CANTCREAT
        SessionError::Process(_) | SessionError::Channel(_) | SessionError::Persistence { .. } => {
            74 // EX_IOERR
        }
    }
}

fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    color_init(cli.no_color);

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "vibes", &mut std::io::stdout());
        return Ok(0);
    }

    let mut config = DaemonConfig::from_env();
    if let Some(dir) = &cli.runtime_dir {
        config = config.with_runtime_dir(dir);
    }
    let _telemetry = init_tracing("info", config.bot_log_path());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(cli.command, config))
}

async fn dispatch(command: Commands, config: DaemonConfig) -> anyhow::Result<i32> {
    let console = ConsoleChannel::new(std::io::stdout().is_terminal());
    let manager = SessionManager::new(
        config,
        Arc::new(console.clone()),
        Arc::new(UnixProcessController),
    );
    let ctx = HandlerContext::new(manager, console);

    match command {
        Commands::Completions { .. } => unreachable!(),

        Commands::New { name, path, engine } => {
            handlers::handle_new(&ctx, name, path, engine.map(Into::into)).await?
        }
        Commands::List => handlers::handle_list(&ctx)?,
        Commands::Show { name } => handlers::handle_show(&ctx, &name)?,
        Commands::Model {
            name,
            model,
            effort,
        } => handlers::handle_model(&ctx, &name, &model, effort.as_deref()).await?,
        Commands::Run { name, new, prompt } => {
            return handlers::handle_run(&ctx, &name, new, &prompt.join(" ")).await;
        }
        Commands::Logs { name, stderr } => handlers::handle_logs(&ctx, &name, stderr)?,
        Commands::Clear { name } => handlers::handle_clear(&ctx, &name).await?,
        Commands::Delete { name } => handlers::handle_delete(&ctx, &name).await?,
    }

    Ok(0)
}
