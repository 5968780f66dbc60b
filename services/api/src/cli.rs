use crate::demo::{run_demo, write_template, DemoArgs, ScoreTemplateArgs};
use crate::server;
use admission_core::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Admission Workflow Orchestrator",
    about = "Run the admission workflow engine and its HTTP surface from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Write the bulk score upload template as CSV
    ScoreTemplate(ScoreTemplateArgs),
    /// Run an end-to-end CLI demo of the admission pipeline
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::ScoreTemplate(args) => write_template(args),
        Command::Demo(args) => run_demo(args),
    }
}
