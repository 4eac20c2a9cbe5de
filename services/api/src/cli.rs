use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use mbkm_registration::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "mbkm-registration",
    about = "MBKM registration approval and eligibility engine",
    long_about = "Serves the registration API (eligibility checks, advisor and program office \
approvals, report schedule generation) or runs a scripted walk-through against in-memory \
adapters.",
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
    /// Register a demo student, show the overlap refusal, collect advisor and program office
    /// approvals, then print the weekly and final report schedule
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
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn demo_arguments_parse() {
        let cli = Cli::try_parse_from(["mbkm-registration", "demo", "--months", "2", "--json"])
            .expect("demo args parse");
        match cli.command {
            Some(Command::Demo(args)) => {
                assert_eq!(args.months, 2);
                assert!(args.json);
                assert!(args.start.is_none());
            }
            other => panic!("expected demo command, got {other:?}"),
        }
    }

    #[test]
    fn serve_is_the_default_and_help_names_the_walk_through() {
        let cli = Cli::try_parse_from(["mbkm-registration"]).expect("no args parse");
        assert!(cli.command.is_none());

        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("walk-through"));
    }
}
