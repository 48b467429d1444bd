//! [`VersionControlClient`] backed by the system `git` executable.

use super::{
    CommitResult, CommitSummary, Remote, RenamedPath, RepoStatus, VcsError, VersionControlClient,
};
use async_trait::async_trait;
use chrono::DateTime;
use std::path::{Path, PathBuf};
use tokio::process::Command;

const FIELD_SEP: char = '\x1f';
const RECORD_SEP: char = '\x1e';

/// Git operations through the CLI, scoped to one repository root.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Run a git command in the repository and return stdout.
    async fn run_git(&self, args: &[&str]) -> Result<String, VcsError> {
        self.run_git_with(args, &[]).await
    }

    async fn run_git_with(&self, args: &[&str], envs: &[(&str, &str)]) -> Result<String, VcsError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(args)
            .envs(envs.iter().copied())
            .output()
            .await
            .map_err(|e| VcsError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                message: failure_message(&output),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Some commands (`commit` with nothing staged) explain themselves on stdout
/// and leave stderr empty.
fn failure_message(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return stderr.trim().to_string();
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        return stdout.trim().to_string();
    }

    format!("exited with {}", output.status)
}

#[async_trait]
impl VersionControlClient for GitCli {
    async fn status(&self) -> Result<RepoStatus, VcsError> {
        // Optional locks off: a status poll must not take the index lock or
        // rewrite the index behind the user's back.
        let output = self
            .run_git_with(
                &[
                    "status",
                    "--porcelain=v2",
                    "--branch",
                    "--untracked-files=all",
                    "-z",
                ],
                &[("GIT_OPTIONAL_LOCKS", "0")],
            )
            .await?;
        parse_status_v2(&output)
    }

    async fn add(&self, paths: &[String]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_git(&args).await?;
        Ok(())
    }

    async fn reset(&self, paths: &[String]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["reset", "--quiet", "HEAD", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_git(&args).await?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<CommitResult, VcsError> {
        self.run_git(&["commit", "--quiet", "-m", message]).await?;
        let commit_id = self.run_git(&["rev-parse", "HEAD"]).await?;
        Ok(CommitResult {
            commit_id: commit_id.trim().to_string(),
        })
    }

    async fn diff(&self, path: &str) -> Result<String, VcsError> {
        self.run_git(&["diff", "--", path]).await
    }

    async fn log(&self, max_count: usize) -> Result<Vec<CommitSummary>, VcsError> {
        let max_count = format!("--max-count={max_count}");
        let output = self
            .run_git(&[
                "log",
                &max_count,
                "--format=%H%x1f%an%x1f%ae%x1f%aI%x1f%s%x1e",
            ])
            .await?;
        parse_log(&output)
    }

    async fn pull(&self) -> Result<(), VcsError> {
        self.run_git(&["pull"]).await?;
        Ok(())
    }

    async fn push(&self) -> Result<(), VcsError> {
        self.run_git(&["push"]).await?;
        Ok(())
    }

    async fn remotes(&self) -> Result<Vec<Remote>, VcsError> {
        let output = self.run_git(&["remote", "-v"]).await?;
        Ok(parse_remotes(&output))
    }

    fn backend_name(&self) -> &'static str {
        "cli"
    }
}

/// Parse `git status --porcelain=v2 --branch -z`.
pub(crate) fn parse_status_v2(output: &str) -> Result<RepoStatus, VcsError> {
    let mut status = RepoStatus::default();
    let mut records = output.split('\0').filter(|r| !r.is_empty());

    while let Some(record) = records.next() {
        if let Some(header) = record.strip_prefix("# ") {
            parse_branch_header(&mut status, header)?;
            continue;
        }

        let (tag, rest) = record
            .split_once(' ')
            .ok_or_else(|| VcsError::Parse(format!("unexpected status record: {record}")))?;

        match tag {
            // 1 XY sub mH mI mW hH hI path
            "1" => {
                let fields: Vec<&str> = rest.splitn(8, ' ').collect();
                if fields.len() != 8 {
                    return Err(VcsError::Parse(format!("short changed entry: {record}")));
                }
                classify_entry(&mut status, fields[0], fields[7]);
            }
            // 2 XY sub mH mI mW hH hI Xscore path, original path in the next record
            "2" => {
                let fields: Vec<&str> = rest.splitn(9, ' ').collect();
                if fields.len() != 9 {
                    return Err(VcsError::Parse(format!("short rename entry: {record}")));
                }
                let (xy, path) = (fields[0], fields[8]);
                let from = records
                    .next()
                    .ok_or_else(|| VcsError::Parse(format!("rename without source: {path}")))?;
                status.renamed.push(RenamedPath {
                    from: from.to_string(),
                    to: path.to_string(),
                });
                classify_entry(&mut status, xy, path);
            }
            // u XY sub m1 m2 m3 mW h1 h2 h3 path
            "u" => {
                let fields: Vec<&str> = rest.splitn(10, ' ').collect();
                if fields.len() != 10 {
                    return Err(VcsError::Parse(format!("short unmerged entry: {record}")));
                }
                status.conflicted.push(fields[9].to_string());
            }
            "?" => status.not_added.push(rest.to_string()),
            "!" => {}
            other => {
                return Err(VcsError::Parse(format!("unknown status tag '{other}'")));
            }
        }
    }

    Ok(status)
}

fn parse_branch_header(status: &mut RepoStatus, header: &str) -> Result<(), VcsError> {
    let (key, value) = header.split_once(' ').unwrap_or((header, ""));
    match key {
        "branch.head" => {
            status.current = (value != "(detached)").then(|| value.to_string());
        }
        "branch.upstream" => status.tracking = Some(value.to_string()),
        "branch.ab" => {
            let mut counts = value.split_whitespace();
            let ahead = counts.next().and_then(|a| a.strip_prefix('+'));
            let behind = counts.next().and_then(|b| b.strip_prefix('-'));
            match (ahead, behind) {
                (Some(ahead), Some(behind)) => {
                    status.ahead = ahead
                        .parse()
                        .map_err(|_| VcsError::Parse(format!("bad ahead count: {value}")))?;
                    status.behind = behind
                        .parse()
                        .map_err(|_| VcsError::Parse(format!("bad behind count: {value}")))?;
                }
                _ => return Err(VcsError::Parse(format!("bad branch.ab header: {value}"))),
            }
        }
        // branch.oid and any future headers
        _ => {}
    }
    Ok(())
}

/// Sort a changed entry into the change sets from its two-letter XY code.
fn classify_entry(status: &mut RepoStatus, xy: &str, path: &str) {
    let mut codes = xy.chars();
    let index = codes.next().unwrap_or('.');
    let worktree = codes.next().unwrap_or('.');

    if matches!(index, 'M' | 'T') || matches!(worktree, 'M' | 'T') {
        status.modified.push(path.to_string());
    }
    if index == 'A' {
        status.created.push(path.to_string());
    }
    if index == 'D' || worktree == 'D' {
        status.deleted.push(path.to_string());
    }
    if index != '.' {
        status.staged.push(path.to_string());
    }
}

/// Parse the `%H %an %ae %aI %s` records produced by [`GitCli::log`].
pub(crate) fn parse_log(output: &str) -> Result<Vec<CommitSummary>, VcsError> {
    output
        .split(RECORD_SEP)
        .map(|record| record.trim_start_matches(['\n', '\r']))
        .filter(|record| !record.trim().is_empty())
        .map(|record| {
            let fields: Vec<&str> = record.splitn(5, FIELD_SEP).collect();
            let [hash, author_name, author_email, date, message] = fields.as_slice() else {
                return Err(VcsError::Parse(format!("short log record: {record:?}")));
            };
            let date = DateTime::parse_from_rfc3339(date)
                .map_err(|e| VcsError::Parse(format!("bad commit date '{date}': {e}")))?;
            Ok(CommitSummary {
                hash: hash.to_string(),
                author_name: author_name.to_string(),
                author_email: author_email.to_string(),
                date,
                message: message.trim_end().to_string(),
            })
        })
        .collect()
}

/// Parse `git remote -v`, keeping first-seen order of remote names.
pub(crate) fn parse_remotes(output: &str) -> Vec<Remote> {
    let mut remotes: Vec<Remote> = Vec::new();

    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(name), Some(url)) = (parts.next(), parts.next()) else {
            continue;
        };
        let direction = parts.next().unwrap_or("(fetch)");

        let index = match remotes.iter().position(|r| r.name == name) {
            Some(index) => index,
            None => {
                remotes.push(Remote {
                    name: name.to_string(),
                    fetch_url: None,
                    push_url: None,
                });
                remotes.len() - 1
            }
        };

        let remote = &mut remotes[index];
        if direction == "(push)" {
            remote.push_url = Some(url.to_string());
        } else {
            remote.fetch_url = Some(url.to_string());
        }
    }

    remotes
}
