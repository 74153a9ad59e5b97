//! Operator-facing console output

use crate::types::{DiskDevice, SnapshotKind, SnapshotRow, SnapshotTable};
use colored::Colorize;

pub fn info(msg: &str) {
    println!("{} {}", "[INFO]".blue(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "[OK]".green(), msg);
}

pub fn warn(msg: &str) {
    println!("{} {}", "[WARN]".yellow(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red(), msg);
}

fn print_rows(rows: &[SnapshotRow]) {
    if rows.is_empty() {
        println!("  (no snapshots)");
        return;
    }

    println!("  {:<8} {:<20} {}", "CURRENT", "NAME", "PARENT");
    println!("  {:<8} {:<20} {}", "-------", "----", "------");
    for row in rows {
        let current = if row.current { "*" } else { "" };
        let parent = row
            .parent
            .as_ref()
            .map(|p| p.name())
            .unwrap_or("-");
        println!("  {:<8} {:<20} {}", current, row.name.name(), parent);
    }
}

/// Print both snapshot tables, external first
pub fn print_table(table: &SnapshotTable) {
    for kind in SnapshotKind::ALL {
        println!();
        let title = match kind {
            SnapshotKind::External => "External snapshots:",
            SnapshotKind::Internal => "Internal snapshots:",
        };
        info(title);
        print_rows(table.rows(kind));
    }
}

pub fn print_disks(disks: &[DiskDevice]) {
    if disks.is_empty() {
        println!("  (no disks)");
        return;
    }

    println!("  {:<8} {:<8} {}", "TARGET", "TYPE", "SOURCE");
    println!("  {:<8} {:<8} {}", "------", "----", "------");
    for disk in disks {
        println!(
            "  {:<8} {:<8} {}",
            disk.target,
            disk.driver_type.as_deref().unwrap_or("-"),
            disk.source.as_deref().unwrap_or("-")
        );
    }
}
