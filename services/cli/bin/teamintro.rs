//! Main Entrypoint for the `teamintro` command line client
//!
//! Loads configuration, initializes logging and runs one command against the
//! introductions API.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use teamintro_cli::{
    config::Config,
    console::{ConsoleHost, describe},
    input::{parse_member, parse_photo_arg, read_photo},
};
use teamintro_core::{
    coordinator::IntroCard,
    delivery::DeliveryModeSelector,
    draft::TeamDraft,
    gateway::{HttpGateway, RequestGateway},
    models::Team,
};
use tracing::info;

#[derive(Parser)]
#[command(version, about = "Create teams and play their avatar introductions")]
struct Cli {
    /// Overrides TEAMINTRO_API_BASE.
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Print raw JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the avatars the backend can assign.
    Avatars,
    /// List stored teams.
    Teams,
    /// Show one team and its members.
    Show { team_id: String },
    /// Create a team.
    Create {
        #[arg(long)]
        name: String,
        /// A member as NAME:INTRO TEXT. Repeat for each member.
        #[arg(long = "member", value_name = "NAME:TEXT")]
        members: Vec<String>,
        /// A photo as INDEX=PATH, INDEX being the position of its --member.
        #[arg(long = "photo", value_name = "INDEX=PATH")]
        photos: Vec<String>,
    },
    /// Request a member's introduction.
    Intro { team_id: String, member_index: usize },
    /// Check the rendering status of an introduction video.
    VideoStatus { video_id: String },
}

fn print_team(team: &Team) {
    println!("{} ({})", team.team_name, team.team_id);
    for (index, member) in team.members.iter().enumerate() {
        let badge = match member.video_status.as_deref() {
            Some("completed") => " [ready]",
            _ => "",
        };
        let avatar = member.avatar_name.as_deref().unwrap_or("no avatar");
        println!(
            "  {}. [{}] {}{} - {}",
            index,
            member.placeholder_initial().unwrap_or('?'),
            member.name,
            badge,
            avatar
        );
    }
}

fn build_draft(name: String, members: &[String], photos: &[String]) -> anyhow::Result<TeamDraft> {
    let mut parsed = members
        .iter()
        .map(|raw| parse_member(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;
    for raw in photos {
        let (index, path) = parse_photo_arg(raw)?;
        let Some(member) = parsed.get_mut(index) else {
            bail!("Photo index {} has no matching --member", index);
        };
        member.photo = Some(read_photo(&PathBuf::from(path))?);
    }
    Ok(parsed
        .into_iter()
        .fold(TeamDraft::new(name), |draft, member| draft.member(member)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(api_base) = cli.api_base.clone() {
        config = config
            .with_api_base(api_base)
            .context("Invalid --api-base")?;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(api_base = %config.api_base, "Configuration loaded");

    // --- 3. Initialize the Gateway ---
    let gateway = Arc::new(
        HttpGateway::new(&config.api_base, config.request_timeout)
            .context("Failed to build HTTP client")?,
    );

    // --- 4. Run the Command ---
    match cli.command {
        Command::Avatars => {
            let avatars = gateway.list_avatars().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&avatars)?);
            } else {
                for avatar in &avatars {
                    println!("{}  {} ({})", avatar.avatar_id, avatar.avatar_name, avatar.gender);
                }
            }
        }
        Command::Teams => {
            let teams = gateway.list_teams().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&teams)?);
            } else if teams.is_empty() {
                println!("No teams yet.");
            } else {
                for team in &teams {
                    println!(
                        "{}  {} ({} members)",
                        team.team_id, team.team_name, team.member_count
                    );
                }
            }
        }
        Command::Show { team_id } => {
            let team = gateway.get_team(&team_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&team)?);
            } else {
                print_team(&team);
            }
        }
        Command::Create {
            name,
            members,
            photos,
        } => {
            let new_team = build_draft(name, &members, &photos)?.finalize()?;
            let team = gateway.create_team(&new_team).await?;
            info!(team_id = %team.team_id, "Team created");
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&team)?);
            } else {
                print_team(&team);
            }
        }
        Command::Intro {
            team_id,
            member_index,
        } => {
            let team = gateway.get_team(&team_id).await?;
            let member = team
                .member(member_index)
                .with_context(|| {
                    format!("Team '{}' has no member at index {}", team_id, member_index)
                })?
                .clone();
            let host = Arc::new(ConsoleHost::default());
            let selector = Arc::new(DeliveryModeSelector::new(gateway.clone()));
            let card = IntroCard::new(team.team_id, member_index, member, selector, host.clone());

            card.activate().await;
            println!("{}", describe(&card.view(), host.last().as_ref()));
        }
        Command::VideoStatus { video_id } => {
            let status = gateway.video_status(&video_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                match status.video_url {
                    Some(url) => println!("{}: {}", status.status, url),
                    None => println!("{}", status.status),
                }
            }
        }
    }

    Ok(())
}
