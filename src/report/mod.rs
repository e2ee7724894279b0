pub mod types;

pub use types::Report;

use crate::config::SideProject;
use crate::pr::PullRequestRecord;
use std::cmp::Ordering;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Report order: repository name descending, then newest PR first.
/// The PR URL breaks remaining ties so the order is total.
pub fn compare_records(a: &PullRequestRecord, b: &PullRequestRecord) -> Ordering {
    b.repo_name
        .cmp(&a.repo_name)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.url.cmp(&a.url))
}

pub fn sort_records(records: &mut [PullRequestRecord]) {
    records.sort_by(compare_records);
}

/// Whether `record` matches any ignore entry. Entries are expected
/// lower-cased; a match is a substring of the lower-cased repository name or
/// title. An exact `owner/repo` entry is a substring of that name, so it
/// drops the whole repository.
pub fn is_ignored(record: &PullRequestRecord, ignore: &[String]) -> bool {
    let repo_name = record.repo_name.to_lowercase();
    let title = record.title.to_lowercase();
    ignore
        .iter()
        .any(|entry| repo_name.contains(entry.as_str()) || title.contains(entry.as_str()))
}

/// Sort, drop ignored PRs and attach the side projects.
#[instrument(skip_all, fields(records = records.len(), ignore = ignore.len()))]
pub fn build(
    mut records: Vec<PullRequestRecord>,
    ignore: &[String],
    side_projects: Vec<SideProject>,
) -> Report {
    sort_records(&mut records);
    let before = records.len();
    records.retain(|record| !is_ignored(record, ignore));
    debug!(dropped = before - records.len(), kept = records.len(), "applied ignore list");

    Report {
        pull_requests: records,
        side_projects,
    }
}

fn star_label(star_count: Option<u64>) -> String {
    match star_count {
        Some(stars) => stars.to_string(),
        None => "?".to_string(),
    }
}

/// Render the contributions section:
///
/// ## 3 merged PRs
///
/// * [**acme/widget**(★42)](https://github.com/acme/widget)
///   * [Fix typo](https://github.com/acme/widget/pull/7)
pub fn render_contributions(report: &Report) -> String {
    let mut md = String::new();
    md.push_str(&format!("## {} merged PRs\n\n", report.pull_requests.len()));

    for group in report.groups() {
        md.push_str(&format!(
            "* [**{}**(★{})]({})\n",
            group.repo_name,
            star_label(group.star_count),
            group.repo_web_url
        ));
        for pr in group.pull_requests {
            md.push_str(&format!("  * [{}]({})\n", pr.title, pr.url));
        }
    }

    md
}

/// Render the personal projects section, or nothing when there are none.
pub fn render_side_projects(projects: &[SideProject]) -> String {
    if projects.is_empty() {
        return String::new();
    }

    let mut md = String::from("\n## Side projects\n\n");
    for project in projects {
        if project.description.is_empty() {
            md.push_str(&format!("* [{}]({})\n", project.name, project.url));
        } else {
            md.push_str(&format!(
                "* [{}]({}): {}\n",
                project.name, project.url, project.description
            ));
        }
    }
    md
}

/// The complete markdown document.
pub fn render(report: &Report) -> String {
    let mut md = render_contributions(report);
    md.push_str(&render_side_projects(&report.side_projects));
    md
}

/// Write the report to stdout (default) or to a markdown file.
#[instrument(skip(report), fields(prs = report.pull_requests.len()))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    let markdown = render(report);
    match output_path {
        None => {
            debug!("writing report to stdout");
            print!("{markdown}");
            Ok(())
        }
        Some(path) => {
            std::fs::write(path, markdown.as_bytes())?;
            info!(path = %path.display(), bytes = markdown.len(), "report written");
            Ok(())
        }
    }
}
