use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use iam_role_keeper::{RoleKeeperService, ServicePrincipal};

mod commands;

/// Exit code for operations refused without explicit confirmation
pub(crate) const EXIT_REFUSED: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "iam-role-keeper",
    version,
    about = "Adopt or create an AWS IAM role, and tear it down again"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    aws: AwsArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
pub(crate) struct AwsArgs {
    /// AWS region to use instead of the one from the environment or profile
    #[arg(long, env = "AWS_REGION", global = true)]
    region: Option<String>,

    /// Named AWS profile to load credentials from
    #[arg(long, env = "AWS_PROFILE", global = true)]
    profile: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Adopt the role if it exists, otherwise create it
    Ensure(EnsureArgs),

    /// Show whether a role exists and its live configuration
    Probe {
        /// Role name
        name: String,
    },

    /// Print the ARN of the first instance profile bound to a role
    InstanceProfile {
        /// Role name
        name: String,
    },

    /// Detach policies, remove the instance profile and delete the role
    Destroy(DestroyArgs),
}

#[derive(Args, Debug)]
pub(crate) struct EnsureArgs {
    /// Role name
    #[arg(long, required_unless_present = "spec")]
    pub(crate) name: Option<String>,

    /// Description for a newly created role
    #[arg(long, conflicts_with = "spec")]
    pub(crate) description: Option<String>,

    /// Service allowed to assume a newly created role
    #[arg(long, default_value = "ecs-tasks", conflicts_with = "spec")]
    pub(crate) service: ServicePrincipal,

    /// Managed policy to attach (repeatable)
    #[arg(long = "policy", value_name = "POLICY", conflicts_with = "spec")]
    pub(crate) policies: Vec<String>,

    /// Create an instance profile and bind the role to it
    #[arg(long, conflicts_with = "spec")]
    pub(crate) instance_profile: bool,

    /// Read the role configuration from a JSON file
    #[arg(long, value_name = "FILE", conflicts_with = "name")]
    pub(crate) spec: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct DestroyArgs {
    /// Role name
    pub(crate) name: String,

    /// Also unbind and delete the instance profile bound to the role
    #[arg(long)]
    pub(crate) with_instance_profile: bool,

    /// Do not ask for confirmation
    #[arg(long, short = 'y')]
    pub(crate) yes: bool,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Build the service from the default AWS provider chain plus CLI overrides
pub(crate) async fn load_service(aws: &AwsArgs) -> RoleKeeperService {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &aws.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    if let Some(profile) = &aws.profile {
        loader = loader.profile_name(profile);
    }
    let config = loader.load().await;
    log::debug!("Loaded AWS configuration for region {:?}", config.region());
    RoleKeeperService::from_sdk_config(&config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Ensure(args) => commands::ensure(&cli.aws, args).await,
        Command::Probe { name } => commands::probe(&cli.aws, &name).await,
        Command::InstanceProfile { name } => commands::instance_profile(&cli.aws, &name).await,
        Command::Destroy(args) => commands::destroy(&cli.aws, args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
