//! Human-readable rendering of engine results for the one-shot CLI.

use kcube::index::VersionSummary;
use kcube::repo::StatusReport;
use kcube::sync::SyncResult;

pub fn status(report: &StatusReport) {
    if report.is_clean() {
        println!("nothing to commit, working tree clean");
        return;
    }
    print_section("staged for commit, new:", &report.staged_new);
    print_section("staged for commit, modified:", &report.staged_modified);
    print_section("staged for commit, deleted:", &report.staged_deleted);
    print_section("not staged, modified:", &report.unstaged_modified);
    print_section("not staged, deleted:", &report.unstaged_deleted);
    print_section("untracked:", &report.untracked);
}

fn print_section(label: &str, paths: &[String]) {
    if paths.is_empty() {
        return;
    }
    println!("{label}");
    for path in paths {
        println!("  {path}");
    }
}

pub fn commit(summary: &VersionSummary) {
    println!("[{}] {}", &summary.hash[..12.min(summary.hash.len())], summary.message.summary);
}

pub fn history(versions: &[VersionSummary]) {
    for summary in versions {
        println!(
            "{} {} {}",
            &summary.hash[..12.min(summary.hash.len())],
            summary.timestamp,
            summary.message.summary
        );
    }
}

pub fn sync_result(result: &SyncResult) {
    match result.direction {
        kcube::sync::SyncDirection::None => println!("already up to date"),
        _ => println!("synced: {} uploaded, {} downloaded", result.uploaded, result.downloaded),
    }
}
