//! Subcommand handlers

use std::process::ExitCode;

use anyhow::Context;
use iam_role_keeper::{validate_role_name, PolicyInput, RoleSpec};

use crate::{load_service, AwsArgs, DestroyArgs, EnsureArgs, EXIT_REFUSED};

/// Turn the ensure arguments into a role spec without touching AWS
fn spec_from_args(args: EnsureArgs) -> anyhow::Result<RoleSpec> {
    if let Some(path) = args.spec {
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read role spec {}", path.display()))?;
        return RoleSpec::from_json_str(&json)
            .with_context(|| format!("Failed to load role spec {}", path.display()));
    }

    let name = args
        .name
        .context("--name is required when --spec is not given")?;
    let mut spec = RoleSpec::new(name)
        .service(args.service)
        .policies(args.policies.into_iter().collect::<PolicyInput>())
        .instance_profile(args.instance_profile);
    if let Some(description) = args.description {
        spec = spec.description(description);
    }
    Ok(spec)
}

pub(crate) async fn ensure(aws: &AwsArgs, args: EnsureArgs) -> anyhow::Result<ExitCode> {
    let spec = spec_from_args(args)?;
    validate_role_name(&spec.name)?;

    let service = load_service(aws).await;
    let role = service
        .ensure_role(&spec)
        .await
        .with_context(|| format!("Failed to ensure role {}", spec.name))?;

    if role.pre_existing() {
        eprintln!(
            "Adopted existing role {}; requested configuration was not applied",
            role.name()
        );
    } else {
        eprintln!("Created role {}", role.name());
    }
    println!("{}", serde_json::to_string_pretty(&role)?);
    Ok(ExitCode::SUCCESS)
}

pub(crate) async fn probe(aws: &AwsArgs, name: &str) -> anyhow::Result<ExitCode> {
    validate_role_name(name)?;

    let service = load_service(aws).await;
    let snapshot = service
        .probe(name)
        .await
        .with_context(|| format!("Failed to probe role {name}"))?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(ExitCode::SUCCESS)
}

pub(crate) async fn instance_profile(aws: &AwsArgs, name: &str) -> anyhow::Result<ExitCode> {
    validate_role_name(name)?;

    let service = load_service(aws).await;
    let Some(role) = service.adopt(name).await? else {
        eprintln!("Role {name} does not exist");
        return Ok(ExitCode::FAILURE);
    };
    if let Some(arn) = service.instance_profile_arn(&role).await? {
        println!("{arn}");
    }
    Ok(ExitCode::SUCCESS)
}

pub(crate) async fn destroy(aws: &AwsArgs, args: DestroyArgs) -> anyhow::Result<ExitCode> {
    validate_role_name(&args.name)?;

    if !args.yes && !atty::is(atty::Stream::Stdin) {
        eprintln!(
            "Refusing to destroy role {} without confirmation: pass --yes or run interactively in a TTY",
            args.name
        );
        return Ok(ExitCode::from(EXIT_REFUSED));
    }
    if !args.yes && !confirm(&format!("Destroy IAM role {}?", args.name))? {
        eprintln!("Aborted");
        return Ok(ExitCode::from(EXIT_REFUSED));
    }

    let service = load_service(aws).await;
    let Some(role) = service.adopt(&args.name).await? else {
        eprintln!("Role {} does not exist, nothing to destroy", args.name);
        return Ok(ExitCode::SUCCESS);
    };

    // Adopted roles never know about their instance profile; ask IAM directly
    let bound_profile = service.instance_profile_arn(&role).await?;
    let role = match profile_step(bound_profile.as_deref(), args.with_instance_profile) {
        ProfileStep::Refuse(arn) => {
            log::warn!("Role {} is bound to instance profile {}", role.name(), arn);
            eprintln!(
                "Role {} is bound to instance profile {arn}; rerun with --with-instance-profile to delete it too",
                role.name()
            );
            return Ok(ExitCode::from(EXIT_REFUSED));
        }
        ProfileStep::NothingBound => {
            eprintln!(
                "Role {} has no instance profile bound; deleting the role only",
                role.name()
            );
            role.with_instance_profile(false)
        }
        ProfileStep::Delete => role.with_instance_profile(true),
        ProfileStep::Skip => role.with_instance_profile(false),
    };

    service
        .destroy(&role)
        .await
        .with_context(|| format!("Failed to destroy role {}", role.name()))?;
    eprintln!("Deleted role {}", role.name());
    Ok(ExitCode::SUCCESS)
}

/// What destroy does about the instance profile IAM reports for the role
#[derive(Debug, PartialEq, Eq)]
enum ProfileStep<'a> {
    /// A profile is bound and the user did not ask to delete it
    Refuse(&'a str),
    /// The user asked for profile deletion but nothing is bound
    NothingBound,
    Delete,
    Skip,
}

fn profile_step(bound_profile: Option<&str>, with_instance_profile: bool) -> ProfileStep<'_> {
    match (bound_profile, with_instance_profile) {
        (Some(arn), false) => ProfileStep::Refuse(arn),
        (Some(_), true) => ProfileStep::Delete,
        (None, true) => ProfileStep::NothingBound,
        (None, false) => ProfileStep::Skip,
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    use std::io::Write;

    eprint!("{prompt} [y/N] ");
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
