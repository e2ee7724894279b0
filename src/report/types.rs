use std::collections::HashMap;

use crate::config::SideProject;
use crate::pr::PullRequestRecord;

/// Render-time view of the PRs that share one repository.
#[derive(Debug)]
pub struct RepoGroup<'a> {
    pub repo_name: &'a str,
    pub repo_web_url: &'a str,
    /// `None` when the star lookup did not resolve
    pub star_count: Option<u64>,
    pub pull_requests: Vec<&'a PullRequestRecord>,
}

/// The finished report: filtered, sorted PRs plus the side-project list.
#[derive(Debug)]
pub struct Report {
    pub pull_requests: Vec<PullRequestRecord>,
    pub side_projects: Vec<SideProject>,
}

impl Report {
    /// Group PRs by repository in order of first appearance.
    pub fn groups(&self) -> Vec<RepoGroup<'_>> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<RepoGroup<'_>> = Vec::new();

        for record in &self.pull_requests {
            let slot = *index.entry(record.repo_name.as_str()).or_insert_with(|| {
                groups.push(RepoGroup {
                    repo_name: &record.repo_name,
                    repo_web_url: &record.repo_web_url,
                    star_count: record.repo_star_count,
                    pull_requests: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].pull_requests.push(record);
        }

        groups
    }

    pub fn repository_count(&self) -> usize {
        self.groups().len()
    }
}
