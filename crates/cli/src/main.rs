mod config;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::{Args, Parser, Subcommand};
use engine::{GrantView, PolicyWrite, Service};
use policy::{CapabilityFlags, CapabilityKind, CapabilityOverrides, RuleSet, Tier};
use serde::Serialize;
use stewardship::{
    AppealFiling, AppealId, AppealType, AuthorityBasis, Delegation, GrantId, InterventionId,
    NewGrant, NewIntervention, RelationshipLevel,
};
use storage::{AuditEvent, Store};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "steward.toml";

#[derive(Parser)]
#[command(name = "steward")]
#[command(about = "Stewardship policy and consensus engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Database file, overriding [storage] path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Agent id to act as
    #[arg(long = "as", global = true, env = "STEWARD_AGENT")]
    agent: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-RPC on stdio as the acting agent
    Serve,
    /// Read and write policy layers
    #[command(subcommand)]
    Policy(PolicyCommand),
    /// Manage stewardship grants
    #[command(subcommand)]
    Grant(GrantCommand),
    /// File and decide appeals
    #[command(subcommand)]
    Appeal(AppealCommand),
    /// Start and support community interventions
    #[command(subcommand)]
    Intervention(InterventionCommand),
    /// Apply every lapsed deadline now
    Sweep,
    /// Show audit events
    Audit {
        /// Only events for this entity id
        #[arg(short, long)]
        entity: Option<String>,
        /// Show only the last N events
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum PolicyCommand {
    /// Show the acting agent's computed policy
    Show {
        #[arg(long)]
        device: Option<String>,
    },
    /// Show a subject's policy chain
    Chain { subject: String },
    /// Write the acting agent's layer from a rules file
    Apply {
        /// TOML file with [content], [time], [features] and [monitoring]
        rules: PathBuf,
        /// Subject the layer restricts; the acting agent if omitted
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        device: Option<String>,
        /// Version last read; required when replacing an existing layer
        #[arg(long)]
        expected_version: Option<u64>,
    },
}

#[derive(Args)]
struct Capabilities {
    /// Capability to include (repeatable)
    #[arg(long = "cap", value_parser = parse_capability)]
    caps: Vec<CapabilityKind>,
}

#[derive(Subcommand)]
enum GrantCommand {
    /// Create an original grant held by the acting agent
    Create {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        basis: AuthorityBasis,
        /// Hash of the supporting evidence
        #[arg(long)]
        evidence: Option<String>,
        #[arg(long)]
        verified_by: String,
        #[arg(long)]
        tier: Option<Tier>,
        #[command(flatten)]
        capabilities: Capabilities,
        #[arg(long)]
        delegatable: bool,
        #[arg(long, default_value = "365")]
        expires_days: u32,
        #[arg(long, default_value = "90")]
        review_days: u32,
    },
    /// Delegate part of a grant to another steward
    Delegate {
        parent: GrantId,
        #[arg(long)]
        to: String,
        /// Capability to withhold from the delegate (repeatable)
        #[arg(long = "drop", value_parser = parse_capability)]
        drop: Vec<CapabilityKind>,
        #[arg(long)]
        delegatable: bool,
        #[arg(long, default_value = "90")]
        expires_days: u32,
    },
    Revoke { grant: GrantId },
    /// Confirm a grant is still warranted
    Review { grant: GrantId },
    /// Grants held by and over the acting agent
    List,
}

#[derive(Subcommand)]
enum AppealCommand {
    File {
        grant: GrantId,
        #[arg(long = "type")]
        appeal_type: AppealType,
        /// Ground for the appeal (repeatable)
        #[arg(long = "ground", required = true)]
        grounds: Vec<String>,
        /// Evidence hash (repeatable)
        #[arg(long)]
        evidence: Vec<String>,
        #[arg(long)]
        advocate: Option<String>,
    },
    /// Appeals the acting agent filed, is subject of, or can decide
    List,
    Decide {
        appeal: AppealId,
        #[arg(long, required_unless_present = "deny", conflicts_with = "deny")]
        approve: bool,
        #[arg(long)]
        deny: bool,
        #[arg(long, default_value = "")]
        notes: String,
    },
}

#[derive(Subcommand)]
enum InterventionCommand {
    Initiate {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        level: RelationshipLevel,
        #[arg(long)]
        pattern: String,
        #[arg(long = "category")]
        categories: Vec<String>,
        #[arg(long)]
        evidence: Vec<String>,
    },
    Support {
        intervention: InterventionId,
        #[arg(long)]
        level: RelationshipLevel,
        #[arg(long)]
        reason: Option<String>,
    },
    List,
}

fn parse_capability(s: &str) -> std::result::Result<CapabilityKind, String> {
    CapabilityKind::ALL
        .into_iter()
        .find(|k| k.as_str() == s)
        .ok_or_else(|| format!("unknown capability '{s}'"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let service = open_service(&cli, &config)?;
    let agent = cli.agent.as_deref();

    match cli.command {
        Commands::Serve => {
            let server = Arc::new(rpc::Server::new(service, require(agent)?));
            server.serve_stdio(config.sweep.interval()).await?;
            Ok(())
        }
        Commands::Policy(cmd) => cmd_policy(&service, require(agent)?, cmd),
        Commands::Grant(cmd) => cmd_grant(&service, require(agent)?, cmd),
        Commands::Appeal(cmd) => cmd_appeal(&service, require(agent)?, cmd),
        Commands::Intervention(cmd) => cmd_intervention(&service, require(agent)?, cmd),
        Commands::Sweep => print_json(&service.sweep()?),
        Commands::Audit { entity, limit } => cmd_audit(&service, entity.as_deref(), limit),
    }
}

fn require(agent: Option<&str>) -> Result<&str> {
    agent.filter(|a| !a.trim().is_empty()).ok_or(Error::NoAgent)
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Ok(Config::load(path)?)
    } else {
        Ok(Config::default())
    }
}

fn open_service(cli: &Cli, config: &Config) -> Result<Service> {
    let db_path = match cli.db.clone().or_else(|| config.storage.path.clone()) {
        Some(path) => path,
        None => dirs_data_dir()
            .map(|d| d.join("steward.db"))
            .ok_or_else(|| Error::NoDatabasePath {
                config: cli.config.clone(),
            })?,
    };
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!(path = %db_path.display(), "opening store");

    Ok(Service::new(Store::open(&db_path)?)
        .with_limits(config.limits)
        .with_arbitrators(config.arbitration.clone())
        .with_fail_mode(config.access.fail_mode))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_policy(service: &Service, agent: &str, cmd: PolicyCommand) -> Result<()> {
    match cmd {
        PolicyCommand::Show { device } => {
            print_json(&*service.get_my_computed_policy(agent, device.as_deref())?)
        }
        PolicyCommand::Chain { subject } => {
            let links = service.get_policy_chain(agent, &subject)?;
            if links.is_empty() {
                println!("No layers for {subject}.");
                return Ok(());
            }
            println!("{:<4}  {:<15}  POLICY", "ORD", "TIER");
            println!("{}", "-".repeat(60));
            for link in links {
                println!("{:<4}  {:<15}  {}", link.ordinal, link.author_tier.as_str(), link.policy_id);
            }
            Ok(())
        }
        PolicyCommand::Apply {
            rules,
            subject,
            device,
            expected_version,
        } => {
            let write = PolicyWrite {
                subject_id: subject,
                device_id: device,
                rules: RuleSet::load(&rules)?,
                expected_version,
                ..Default::default()
            };
            let policy = service.upsert_policy(agent, write)?;
            println!(
                "Layer {} for {} at version {} ({})",
                policy.id, policy.subject_id, policy.version, policy.author_tier
            );
            Ok(())
        }
    }
}

fn cmd_grant(service: &Service, agent: &str, cmd: GrantCommand) -> Result<()> {
    match cmd {
        GrantCommand::Create {
            subject,
            basis,
            evidence,
            verified_by,
            tier,
            capabilities,
            delegatable,
            expires_days,
            review_days,
        } => {
            let grant = service.create_stewardship_grant(
                agent,
                NewGrant {
                    subject_id: subject,
                    tier,
                    authority_basis: basis,
                    evidence_hash: evidence,
                    verified_by,
                    capabilities: CapabilityFlags::from_kinds(capabilities.caps),
                    delegatable,
                    expires_in_days: expires_days,
                    review_in_days: review_days,
                },
            )?;
            println!("Grant {} ({}) over {}", grant.id, grant.tier, grant.subject_id);
            Ok(())
        }
        GrantCommand::Delegate {
            parent,
            to,
            drop,
            delegatable,
            expires_days,
        } => {
            let mut overrides = CapabilityOverrides::default();
            for kind in drop {
                match kind {
                    CapabilityKind::ContentFiltering => overrides.content_filtering = Some(false),
                    CapabilityKind::TimeLimits => overrides.time_limits = Some(false),
                    CapabilityKind::FeatureRestrictions => overrides.feature_restrictions = Some(false),
                    CapabilityKind::ActivityMonitoring => overrides.activity_monitoring = Some(false),
                    CapabilityKind::PolicyDelegation => overrides.policy_delegation = Some(false),
                }
            }
            let grant = service.delegate_grant(
                agent,
                Delegation {
                    parent_grant_id: parent,
                    new_steward_id: to,
                    overrides,
                    delegatable,
                    expires_in_days: expires_days,
                },
            )?;
            println!("Grant {} delegated at depth {}", grant.id, grant.delegation_depth);
            Ok(())
        }
        GrantCommand::Revoke { grant } => {
            if service.revoke_grant(agent, &grant)? {
                println!("Grant {grant} revoked.");
            } else {
                println!("Grant {grant} was already inactive.");
            }
            Ok(())
        }
        GrantCommand::Review { grant } => {
            let grant = service.review_grant(agent, &grant)?;
            let next = Local.from_utc_datetime(&grant.review_at.naive_utc()).format("%Y-%m-%d");
            println!("Grant {} reviewed; next review {next}", grant.id);
            Ok(())
        }
        GrantCommand::List => {
            print_grants("Held by you", &service.get_my_subjects(agent)?);
            print_grants("Held over you", &service.get_my_stewards(agent)?);
            Ok(())
        }
    }
}

fn print_grants(title: &str, grants: &[GrantView]) {
    println!("{title}:");
    if grants.is_empty() {
        println!("  (none)\n");
        return;
    }
    println!(
        "  {:<36}  {:<16}  {:<16}  {:<14}  {:<9}  EXPIRES",
        "GRANT", "STEWARD", "SUBJECT", "TIER", "STATUS"
    );
    for view in grants {
        let grant = &view.grant;
        let expires = Local.from_utc_datetime(&grant.expires_at.naive_utc()).format("%Y-%m-%d");
        println!(
            "  {:<36}  {:<16}  {:<16}  {:<14}  {:<9}  {expires}",
            grant.id,
            grant.steward_id,
            grant.subject_id,
            grant.tier.as_str(),
            view.effective_status.as_str()
        );
    }
    println!();
}

fn cmd_appeal(service: &Service, agent: &str, cmd: AppealCommand) -> Result<()> {
    match cmd {
        AppealCommand::File {
            grant,
            appeal_type,
            grounds,
            evidence,
            advocate,
        } => {
            let appeal = service.file_appeal(
                agent,
                AppealFiling {
                    grant_id: grant,
                    policy_id: None,
                    appeal_type,
                    grounds,
                    evidence,
                    advocate_id: advocate,
                    advocate_notes: None,
                },
            )?;
            println!(
                "Appeal {} filed; arbitrated by {}",
                appeal.id, appeal.arbitration_layer
            );
            Ok(())
        }
        AppealCommand::List => {
            let mine = service.get_my_appeals(agent)?;
            let to_decide = service.get_appeals_to_decide(agent)?;
            println!("{:<36}  {:<20}  {:<14}  {:<10}  FILED", "APPEAL", "TYPE", "LAYER", "STATUS");
            println!("{}", "-".repeat(100));
            for appeal in mine.iter().chain(to_decide.iter().filter(|a| !mine.iter().any(|m| m.id == a.id))) {
                let filed = Local.from_utc_datetime(&appeal.filed_at.naive_utc()).format("%Y-%m-%d %H:%M");
                println!(
                    "{:<36}  {:<20}  {:<14}  {:<10}  {filed}",
                    appeal.id,
                    appeal.appeal_type.as_str(),
                    appeal.arbitration_layer.as_str(),
                    appeal.status.as_str()
                );
            }
            Ok(())
        }
        AppealCommand::Decide {
            appeal,
            approve,
            deny: _,
            notes,
        } => {
            let appeal = service.decide_appeal(agent, &appeal, approve, &notes)?;
            println!("Appeal {} {}", appeal.id, appeal.status);
            Ok(())
        }
    }
}

fn cmd_intervention(service: &Service, agent: &str, cmd: InterventionCommand) -> Result<()> {
    match cmd {
        InterventionCommand::Initiate {
            subject,
            level,
            pattern,
            categories,
            evidence,
        } => {
            let intervention = service.initiate_intervention(
                agent,
                NewIntervention {
                    subject_id: subject,
                    relationship_level: level,
                    pattern_description: pattern,
                    categories: categories.into_iter().collect(),
                    evidence_hashes: evidence,
                    reason: None,
                },
            )?;
            println!(
                "Intervention {} at weight {:.1}",
                intervention.id,
                intervention.total_weight()
            );
            Ok(())
        }
        InterventionCommand::Support {
            intervention,
            level,
            reason,
        } => {
            let (intervention, outcome) =
                service.support_intervention(agent, &intervention, level, reason)?;
            println!(
                "Intervention {} at weight {:.1} from {} supporters ({outcome:?}, {})",
                intervention.id,
                intervention.total_weight(),
                intervention.supporter_count(),
                intervention.status
            );
            Ok(())
        }
        InterventionCommand::List => print_json(&service.get_my_interventions(agent)?),
    }
}

fn cmd_audit(service: &Service, entity: Option<&str>, limit: usize) -> Result<()> {
    let events = match entity {
        Some(id) => service.audit_trail(id)?,
        None => service.recent_audit(limit)?,
    };
    if events.is_empty() {
        println!("No events found.");
        return Ok(());
    }
    for event in events.iter().take(limit) {
        print_event(event);
    }
    Ok(())
}

fn print_event(event: &AuditEvent) {
    let time = Local
        .from_utc_datetime(&event.timestamp.naive_utc())
        .format("%Y-%m-%d %H:%M:%S");
    println!(
        "[{time}] {:<22} {:<36} by {}",
        event.kind.name(),
        event.entity_id,
        event.actor_id
    );
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/steward"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("steward"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("steward"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn grant_create_collects_capabilities() {
        let cli = Cli::try_parse_from([
            "steward", "--as", "parent", "grant", "create", "--subject", "kid", "--basis",
            "minor_guardianship", "--verified-by", "registry", "--cap", "content_filtering",
            "--cap", "time_limits",
        ])
        .unwrap();
        match cli.command {
            Commands::Grant(GrantCommand::Create { capabilities, expires_days, .. }) => {
                assert_eq!(
                    capabilities.caps,
                    vec![CapabilityKind::ContentFiltering, CapabilityKind::TimeLimits]
                );
                assert_eq!(expires_days, 365);
            }
            _ => panic!("expected grant create"),
        }
    }

    #[test]
    fn decide_needs_a_verdict() {
        let id = GrantId::new().to_string();
        assert!(Cli::try_parse_from(["steward", "appeal", "decide", id.as_str()]).is_err());
        assert!(Cli::try_parse_from(["steward", "appeal", "decide", id.as_str(), "--approve", "--deny"]).is_err());
        assert!(Cli::try_parse_from(["steward", "appeal", "decide", id.as_str(), "--deny"]).is_ok());
    }
}
