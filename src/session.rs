//! Interactive operator session
//!
//! Each round selects a domain and an action, runs it to completion and
//! reports the outcome. Errors end the current action only.

use crate::backend::SnapshotBackend;
use crate::error::{Error, Result};
use crate::manager::SnapshotManager;
use crate::output;
use crate::prompt::{self, Prompt};
use crate::types::{
    Action, DiskDevice, Domain, Outcome, PendingSnapshot, RevertTarget, SnapshotChoice, SnapshotId,
    SnapshotKind,
};
use tracing::debug;

pub struct Session<'a, B: SnapshotBackend, P: Prompt> {
    manager: SnapshotManager<'a, B>,
    prompt: P,
}

impl<'a, B: SnapshotBackend, P: Prompt> Session<'a, B, P> {
    pub fn new(manager: SnapshotManager<'a, B>, prompt: P) -> Self {
        Self { manager, prompt }
    }

    pub fn prompt(&self) -> &P {
        &self.prompt
    }

    /// Run rounds until the operator exits or input ends
    pub fn run(&mut self) -> Result<()> {
        match self.run_rounds() {
            Err(Error::EndOfInput) => Ok(()),
            other => other,
        }
    }

    fn run_rounds(&mut self) -> Result<()> {
        loop {
            let domain = match self.select_domain() {
                Ok(domain) => domain,
                Err(e @ (Error::EndOfInput | Error::NotFound(_))) => return Err(e),
                Err(e) => {
                    report_error(&e);
                    continue;
                }
            };
            let action = self.select_action()?;
            debug!(domain = %domain, ?action, "Running action");

            match self.run_action(&domain, action) {
                Ok(Outcome::Exit) => return Ok(()),
                Ok(outcome) => report(&domain, &outcome),
                Err(Error::EndOfInput) => return Err(Error::EndOfInput),
                Err(e) => report_error(&e),
            }
        }
    }

    /// Run one action on a domain, confirming first if it is running
    pub fn run_action(&mut self, domain: &Domain, action: Action) -> Result<Outcome> {
        if action.is_mutating() && !self.confirm_domain(domain)? {
            return Ok(Outcome::Abandoned);
        }

        match action {
            Action::List => Ok(Outcome::Listed(self.manager.list(domain)?)),
            Action::Create => self.create(domain),
            Action::Revert => self.revert(domain),
            Action::Delete => self.delete(domain),
            Action::Exit => Ok(Outcome::Exit),
        }
    }

    fn select_domain(&mut self) -> Result<Domain> {
        let domains = self.manager.domains()?;
        let names: Vec<&str> = domains.iter().map(Domain::name).collect();
        let index = prompt::menu(&mut self.prompt, "Select a domain:", &names)?;
        domains
            .into_iter()
            .nth(index)
            .ok_or(Error::NotFound("domains"))
    }

    fn select_action(&mut self) -> Result<Action> {
        let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();
        let index = prompt::menu(&mut self.prompt, "Select an action:", &labels)?;
        Ok(Action::ALL[index])
    }

    /// Running domains need an explicit yes before they are touched
    fn confirm_domain(&mut self, domain: &Domain) -> Result<bool> {
        if !self.manager.is_active(domain)? {
            return Ok(true);
        }
        output::warn(&format!("Domain '{}' is currently running", domain));
        prompt::confirm(&mut self.prompt, "Continue anyway?")
    }

    fn select_disk(&mut self, domain: &Domain) -> Result<DiskDevice> {
        let disks = self.manager.disks(domain)?;
        if disks.is_empty() {
            return Err(Error::NotFound("disks"));
        }
        let labels: Vec<String> = disks.iter().map(DiskDevice::label).collect();
        let index = prompt::menu(&mut self.prompt, "Select disk:", &labels)?;
        disks.into_iter().nth(index).ok_or(Error::NotFound("disks"))
    }

    /// Pick from all snapshots; `offer_original` appends the base image
    fn select_snapshot(&mut self, domain: &Domain, title: &str, offer_original: bool) -> Result<SnapshotChoice> {
        let snapshots = self.manager.snapshots(domain)?;
        if snapshots.is_empty() && !offer_original {
            return Ok(SnapshotChoice::NoneFound);
        }

        let mut choices: Vec<SnapshotChoice> = snapshots.into_iter().map(SnapshotChoice::Existing).collect();
        if offer_original {
            choices.push(SnapshotChoice::RevertToOriginal);
        }
        let labels: Vec<String> = choices
            .iter()
            .map(|choice| match choice {
                SnapshotChoice::Existing(id) => id.name().to_string(),
                SnapshotChoice::RevertToOriginal => "Original (base image)".to_string(),
                SnapshotChoice::NoneFound => String::new(),
            })
            .collect();

        let index = prompt::menu(&mut self.prompt, title, &labels)?;
        Ok(choices.into_iter().nth(index).unwrap_or(SnapshotChoice::NoneFound))
    }

    /// Ask for a snapshot name until a valid one is given
    fn read_snapshot_name(&mut self) -> Result<SnapshotId> {
        loop {
            let input = self.prompt.read_line("Enter snapshot name: ")?;
            match SnapshotId::new(input) {
                Ok(id) => return Ok(id),
                Err(msg) => output::error(&msg),
            }
        }
    }

    fn create(&mut self, domain: &Domain) -> Result<Outcome> {
        let kind = match prompt::menu(
            &mut self.prompt,
            "Select snapshot type:",
            &["External (recommended)", "Internal"],
        )? {
            0 => SnapshotKind::External,
            _ => SnapshotKind::Internal,
        };

        let name = self.read_snapshot_name()?;
        let description = self
            .prompt
            .read_line("Enter snapshot description (optional): ")?;

        let pending = match kind {
            SnapshotKind::Internal => PendingSnapshot::internal(name),
            SnapshotKind::External => {
                let disk = self.select_disk(domain)?;
                PendingSnapshot::external(name, disk.target)
            }
        }
        .with_description(description);

        let id = self.manager.create(domain, &pending)?;
        Ok(Outcome::Created(id))
    }

    fn delete(&mut self, domain: &Domain) -> Result<Outcome> {
        match self.select_snapshot(domain, "Select snapshot to delete:", false)? {
            SnapshotChoice::Existing(snapshot) => {
                let removed_file = self.manager.delete(domain, &snapshot)?;
                Ok(Outcome::Deleted {
                    snapshot,
                    removed_file,
                })
            }
            SnapshotChoice::RevertToOriginal | SnapshotChoice::NoneFound => Ok(Outcome::NothingFound),
        }
    }

    fn revert(&mut self, domain: &Domain) -> Result<Outcome> {
        let target = match self.select_snapshot(domain, "Select snapshot to revert to:", true)? {
            SnapshotChoice::Existing(id) => RevertTarget::Snapshot(id),
            SnapshotChoice::RevertToOriginal => RevertTarget::Original,
            SnapshotChoice::NoneFound => return Ok(Outcome::NothingFound),
        };

        // The snapshot does not record which disk it covers, so the
        // operator picks the disk again here.
        let needs_disk = match &target {
            RevertTarget::Original => true,
            RevertTarget::Snapshot(id) => self.manager.kind_of(domain, id)? == SnapshotKind::External,
        };
        let disk = if needs_disk {
            Some(self.select_disk(domain)?.target)
        } else {
            None
        };

        self.manager.revert(domain, &target, disk.as_deref())?;
        Ok(Outcome::Reverted(target))
    }
}

/// Print the result of an action
pub fn report(domain: &Domain, outcome: &Outcome) {
    match outcome {
        Outcome::Listed(table) => output::print_table(table),
        Outcome::Created(id) => output::success(&format!(
            "Successfully created snapshot \"{}\" for domain \"{}\"",
            id, domain
        )),
        Outcome::Deleted {
            snapshot,
            removed_file,
        } => {
            output::success(&format!(
                "Deleted snapshot \"{}\" of domain \"{}\"",
                snapshot, domain
            ));
            if let Some(path) = removed_file {
                output::info(&format!("Removed {}", path.display()));
            }
        }
        Outcome::Reverted(target) => output::success(&format!(
            "Domain \"{}\" reverted to {}",
            domain, target
        )),
        Outcome::NothingFound => output::warn("No snapshots found"),
        Outcome::Abandoned => output::info("Action abandoned"),
        Outcome::Exit => {}
    }
}

/// Print an action's error with any follow-up the operator needs
pub fn report_error(e: &Error) {
    output::error(&e.to_string());
    match e {
        Error::PartialDeleteFailure { path, .. } => output::warn(&format!(
            "Snapshot metadata is gone; remove {} manually",
            path.display()
        )),
        e if e.is_hypervisor_failure() => output::warn("Nothing was rolled back"),
        _ => {}
    }
}
