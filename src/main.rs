//! domsnap CLI - Manage libvirt domain snapshots

use clap::{Parser, Subcommand};
use domsnap::{
    output, prompt::Console, session, Config, Domain, Error, Outcome, PendingSnapshot, Result,
    RevertTarget, Session, SnapshotBackend, SnapshotId, SnapshotManager,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(feature = "libvirt")]
use domsnap::backend::LibvirtBackend as Backend;
#[cfg(not(feature = "libvirt"))]
use domsnap::backend::VirshBackend as Backend;

#[derive(Parser)]
#[command(name = "domsnap")]
#[command(about = "Manage internal and external libvirt domain snapshots", long_about = None)]
#[command(version)]
struct Cli {
    /// Hypervisor connection URI
    #[arg(short = 'c', long, env = "LIBVIRT_DEFAULT_URI", default_value = "qemu:///system")]
    connect: String,

    /// Directory holding external snapshot files
    #[arg(long, env = "DOMSNAP_SNAPSHOT_DIR", default_value = "/var/lib/libvirt/images")]
    snapshot_dir: PathBuf,

    /// Suffix of the base image an external chain starts from
    #[arg(long, env = "DOMSNAP_BASE_SUFFIX", default_value = "qcow2")]
    base_suffix: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Select domains and actions from menus (default)
    Interactive,

    /// List a domain's external and internal snapshots
    List {
        /// Domain to inspect
        domain: String,
        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// List a domain's disk devices
    Disks {
        /// Domain to inspect
        domain: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Create a snapshot
    Create {
        /// Domain to snapshot
        domain: String,
        /// Name for the new snapshot
        name: String,
        /// Free-form description stored with the snapshot
        #[arg(short, long, default_value = "")]
        description: String,
        /// Take a disk-only external snapshot of --disk
        #[arg(long, requires = "disk")]
        external: bool,
        /// Target device to snapshot (e.g. vda)
        #[arg(long, requires = "external")]
        disk: Option<String>,
        /// Proceed even if the domain is running
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete a snapshot and, for external ones, its delta file
    Delete {
        /// Domain owning the snapshot
        domain: String,
        /// Snapshot to delete
        snapshot: String,
        /// Proceed even if the domain is running
        #[arg(short, long)]
        yes: bool,
    },

    /// Revert to a snapshot or to the original base image
    Revert {
        /// Domain to revert
        domain: String,
        /// Snapshot to revert to
        #[arg(required_unless_present = "original")]
        snapshot: Option<String>,
        /// Point the disk back at the base image
        #[arg(long, conflicts_with = "snapshot")]
        original: bool,
        /// Target device to repoint for external reverts (e.g. vda)
        #[arg(long)]
        disk: Option<String>,
        /// Proceed even if the domain is running
        #[arg(short, long)]
        yes: bool,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn check_root() {
    if !nix::unistd::geteuid().is_root() {
        output::warn("Running as non-root user; the libvirt API may be inaccessible");
    }
}

fn snapshot_id(name: &str) -> Result<SnapshotId> {
    SnapshotId::new(name).map_err(Error::InvalidName)
}

/// Running domains are only touched when --yes was given
fn confirmed<B: SnapshotBackend>(manager: &SnapshotManager<'_, B>, domain: &Domain, yes: bool) -> Result<bool> {
    if yes || !manager.is_active(domain)? {
        return Ok(true);
    }
    output::warn(&format!(
        "Domain '{}' is currently running; pass --yes to continue",
        domain
    ));
    Ok(false)
}

fn cmd_interactive<B: SnapshotBackend>(manager: SnapshotManager<'_, B>) -> Result<()> {
    Session::new(manager, Console).run()
}

fn cmd_list<B: SnapshotBackend>(manager: &SnapshotManager<'_, B>, domain: &str, json: bool) -> Result<()> {
    let domain = manager.domain(domain)?;
    let table = manager.list(&domain)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
    } else {
        session::report(&domain, &Outcome::Listed(table));
    }
    Ok(())
}

fn cmd_disks<B: SnapshotBackend>(manager: &SnapshotManager<'_, B>, domain: &str, json: bool) -> Result<()> {
    let domain = manager.domain(domain)?;
    let disks = manager.disks(&domain)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&disks)?);
    } else {
        output::info(&format!("Disks of domain '{}':", domain));
        output::print_disks(&disks);
    }
    Ok(())
}

fn cmd_create<B: SnapshotBackend>(
    manager: &SnapshotManager<'_, B>,
    domain: &str,
    name: &str,
    description: &str,
    disk: Option<String>,
    yes: bool,
) -> Result<()> {
    let domain = manager.domain(domain)?;
    let name = snapshot_id(name)?;
    if !confirmed(manager, &domain, yes)? {
        session::report(&domain, &Outcome::Abandoned);
        return Ok(());
    }

    let pending = match disk {
        Some(disk) => PendingSnapshot::external(name, disk),
        None => PendingSnapshot::internal(name),
    }
    .with_description(description);

    output::info(&format!("Creating {} snapshot '{}'...", pending.kind, pending.name));
    let id = manager.create(&domain, &pending)?;
    session::report(&domain, &Outcome::Created(id));
    Ok(())
}

fn cmd_delete<B: SnapshotBackend>(manager: &SnapshotManager<'_, B>, domain: &str, snapshot: &str, yes: bool) -> Result<()> {
    let domain = manager.domain(domain)?;
    let snapshot = snapshot_id(snapshot)?;
    if !confirmed(manager, &domain, yes)? {
        session::report(&domain, &Outcome::Abandoned);
        return Ok(());
    }

    output::info(&format!("Deleting snapshot '{}'...", snapshot));
    let removed_file = manager.delete(&domain, &snapshot)?;
    session::report(
        &domain,
        &Outcome::Deleted {
            snapshot,
            removed_file,
        },
    );
    Ok(())
}

fn cmd_revert<B: SnapshotBackend>(
    manager: &SnapshotManager<'_, B>,
    domain: &str,
    snapshot: Option<String>,
    disk: Option<String>,
    yes: bool,
) -> Result<()> {
    let domain = manager.domain(domain)?;
    let target = match snapshot {
        Some(name) => RevertTarget::Snapshot(snapshot_id(&name)?),
        None => RevertTarget::Original,
    };
    if !confirmed(manager, &domain, yes)? {
        session::report(&domain, &Outcome::Abandoned);
        return Ok(());
    }

    output::info(&format!("Reverting domain '{}' to {}...", domain, target));
    manager.revert(&domain, &target, disk.as_deref())?;
    session::report(&domain, &Outcome::Reverted(target));
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    check_root();

    let config = Config {
        uri: cli.connect,
        snapshot_dir: cli.snapshot_dir,
        base_image_suffix: cli.base_suffix,
    };
    let backend = Backend::connect(&config.uri)?;
    let manager = SnapshotManager::new(&backend, &config);

    match cli.command {
        None | Some(Commands::Interactive) => cmd_interactive(manager),
        Some(Commands::List { domain, json }) => cmd_list(&manager, &domain, json),
        Some(Commands::Disks { domain, json }) => cmd_disks(&manager, &domain, json),
        Some(Commands::Create {
            domain,
            name,
            description,
            external,
            disk,
            yes,
        }) => {
            let disk = if external { disk } else { None };
            cmd_create(&manager, &domain, &name, &description, disk, yes)
        }
        Some(Commands::Delete {
            domain,
            snapshot,
            yes,
        }) => cmd_delete(&manager, &domain, &snapshot, yes),
        Some(Commands::Revert {
            domain,
            snapshot,
            original: _,
            disk,
            yes,
        }) => cmd_revert(&manager, &domain, snapshot, disk, yes),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            session::report_error(&e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_every_subcommand_argument_has_help() {
        let cmd = Cli::command();
        for sub in cmd.get_subcommands() {
            for arg in sub.get_arguments() {
                let id = arg.get_id().as_str();
                if id == "help" || id == "version" {
                    continue;
                }
                assert!(
                    arg.get_help().is_some(),
                    "{} {} has no help text",
                    sub.get_name(),
                    id
                );
            }
        }
    }

    #[test]
    fn test_revert_accepts_original_without_snapshot() {
        let cli = Cli::try_parse_from(["domsnap", "revert", "vm1", "--original", "--disk", "vda"]).unwrap();
        match cli.command {
            Some(Commands::Revert {
                snapshot, original, ..
            }) => {
                assert_eq!(snapshot, None);
                assert!(original);
            }
            _ => panic!("expected revert"),
        }
    }
}
