use clap::Parser;
use miette::{IntoDiagnostic, Result};
use thingstore::cli::{Cli, Commands, GlobalOpts};
use thingstore::core::{Config, Project};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    init_tracing(&global);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Init(args) => thingstore::cli::commands::init::run(args),
            Commands::New(args) => thingstore::cli::commands::new::run(args, &global).await,
            Commands::Set(args) => thingstore::cli::commands::set::run(args, &global).await,
            Commands::Link(args) => thingstore::cli::commands::link::run(args, &global).await,
            Commands::Delete(args) => thingstore::cli::commands::delete::run(args, &global).await,
            Commands::List(args) => thingstore::cli::commands::list::run(args, &global).await,
            Commands::Show(args) => thingstore::cli::commands::show::run(args, &global).await,
            Commands::Status(args) => thingstore::cli::commands::status::run(args, &global).await,
            Commands::Completions(args) => thingstore::cli::commands::completions::run(args),
        }
    })
}

/// Log to stderr: `--verbose`, else TTS_LOG, else the config's `log` field
fn init_tracing(global: &GlobalOpts) {
    let directive = if global.verbose {
        "debug".to_string()
    } else {
        let project = match &global.project {
            Some(path) => Project::discover_from(path).ok(),
            None => Project::discover().ok(),
        };
        // TTS_LOG overrides the config files inside load_for
        Config::load_for(project.as_ref()).log_filter()
    };

    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
