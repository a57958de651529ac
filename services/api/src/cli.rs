use crate::demo::{run_attendance_summary, run_demo, DemoArgs, SummaryArgs};
use crate::server;
use attendance_engine::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Club Attendance Engine",
    about = "Run and demonstrate the club attendance processing engine from the command line",
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
    /// Attendance reporting utilities
    Attendance {
        #[command(subcommand)]
        command: AttendanceCommand,
    },
    /// Run an end-to-end CLI demo covering a synthetic day of punches
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum AttendanceCommand {
    /// Summarize a biometric device export against branch policy
    Summary(SummaryArgs),
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
        Command::Attendance {
            command: AttendanceCommand::Summary(args),
        } => run_attendance_summary(args),
        Command::Demo(args) => run_demo(args),
    }
}
