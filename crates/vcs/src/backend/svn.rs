//! Centralized backend driver, wrapping the `svn`, `svnadmin` and `svnmucc`
//! command-line tools.
//!
//! Addressing is path-hierarchical: the base URL grows a `/trunk`,
//! `/branches/<name>` or `/tags/<name>` suffix. Tag and branch creation go
//! through `svnmucc`, the atomic multi-change-commit helper, so they need no
//! local working copy; commit messages are always passed as their own argv
//! element, never interpolated into a shell string.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::error::VcsError;
use crate::exec::{self, ExecOptions, ExecResult};
use crate::traits::VcsDriver;
use crate::types::*;
use crate::workspace::TempWorkspace;

/// Configuration for the svn driver
#[derive(Debug, Clone, Default)]
pub struct SvnConfig {
    /// Root for temporary workspaces; system temp dir when absent
    pub temp_root: Option<PathBuf>,
}

/// Subversion implementation of the driver contract
pub struct SvnDriver {
    config: SvnConfig,
}

/// Append the target suffix (and an optional path) to a base URL
fn join_url(url: &str, target: Option<&Target>, suffix: Option<&str>) -> String {
    let base = url.trim_end_matches('/');
    let mut result = match target {
        Some(Target::Branch(name)) => format!("{base}/branches/{name}"),
        Some(Target::Tag(name)) => format!("{base}/tags/{name}"),
        Some(Target::Trunk) | None => format!("{base}/trunk"),
    };
    if let Some(suffix) = suffix {
        result.push('/');
        result.push_str(&suffix.replace('\\', "/"));
    }
    result
}

/// Pull the committed revision number out of `svn commit` / `svnmucc` output.
/// `svn` prints `Committed revision N.`; `svnmucc` prints `rN committed ...`.
fn parse_committed_revision(output: &str) -> Option<Revision> {
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Committed revision ") {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            if !digits.is_empty() {
                return Some(Revision::new(digits));
            }
        }
        if let Some(rest) = line.strip_prefix('r') {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            if !digits.is_empty() && rest[digits.len()..].trim_start().starts_with("committed") {
                return Some(Revision::new(digits));
            }
        }
    }
    None
}

impl SvnDriver {
    pub fn new(config: SvnConfig) -> Self {
        Self { config }
    }

    async fn svn<I, S>(&self, args: I, opts: ExecOptions) -> Result<ExecResult, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full: Vec<String> = vec!["--non-interactive".into()];
        full.extend(args.into_iter().map(Into::into));
        exec::run("svn", &full, &opts).await
    }

    async fn svnmucc<I, S>(&self, args: I, opts: ExecOptions) -> Result<ExecResult, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full: Vec<String> = vec!["--non-interactive".into()];
        full.extend(args.into_iter().map(Into::into));
        exec::run("svnmucc", &full, &opts).await
    }

    fn temp_workspace(&self) -> Result<TempWorkspace, VcsError> {
        TempWorkspace::new(self.config.temp_root.as_deref())
    }

    /// Server-side repository directory to durable `file://` URL
    fn format_repo_url(&self, dir: &Path) -> Result<String, VcsError> {
        let abs = std::path::absolute(dir)?;
        let disp = abs.to_string_lossy().replace('\\', "/");
        Ok(format!("file://{disp}"))
    }

    /// Decompose a working-copy URL around its trunk/branches/tags pivot
    /// segment into (root url, target, project name).
    fn parse_url(&self, url: &str) -> Result<(String, Target, String), VcsError> {
        let trimmed = url.trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            let target = match *segment {
                "trunk" => Target::Trunk,
                "branches" | "tags" => {
                    let name = segments.get(i + 1).ok_or_else(|| {
                        VcsError::Parse(format!("no name after '{segment}' in url '{url}'"))
                    })?;
                    if *segment == "branches" {
                        Target::branch(*name)
                    } else {
                        Target::tag(*name)
                    }
                }
                _ => continue,
            };
            if i == 0 {
                return Err(VcsError::Parse(format!("no project root in url '{url}'")));
            }
            let root = segments[..i].join("/");
            let name = segments[i - 1].to_string();
            return Ok((root, target, name));
        }
        Err(VcsError::Parse(format!(
            "no trunk/branches/tags segment in url '{url}'"
        )))
    }

    /// `svn info` for an address, returned as the raw field lines
    async fn info(&self, address: &str, quiet: bool) -> Result<String, VcsError> {
        let mut opts = ExecOptions::default().capture();
        if quiet {
            opts = opts.quiet();
        }
        let result = self.svn(["info", address], opts).await?;
        Ok(result.output)
    }

    fn info_field(output: &str, field: &str) -> Option<String> {
        output.lines().find_map(|line| {
            line.strip_prefix(field)
                .and_then(|rest| rest.strip_prefix(':'))
                .map(|value| value.trim().to_string())
        })
    }

    async fn last_changed_rev(&self, address: &str) -> Result<Revision, VcsError> {
        let output = self.info(address, false).await?;
        Self::info_field(&output, "Last Changed Rev")
            .map(Revision::new)
            .ok_or_else(|| {
                VcsError::Parse(format!(
                    "no 'Last Changed Rev' field in svn info output for '{address}'"
                ))
            })
    }

    /// Stage tag files in a temp workspace and commit them onto the tag URL
    /// as one `svnmucc` transaction.
    async fn put_files(
        &self,
        url: &str,
        tag_name: &str,
        files: &[TagFile],
        message: &str,
    ) -> Result<(), VcsError> {
        let workspace = self.temp_workspace()?;
        let mut args: Vec<String> = vec!["-m".into(), message.into()];
        for (i, file) in files.iter().enumerate() {
            let local = workspace.path().join(format!("put-{i}"));
            tokio::fs::write(&local, &file.contents).await?;
            args.push("put".into());
            args.push(local.to_string_lossy().into_owned());
            args.push(join_url(
                url,
                Some(&Target::tag(tag_name)),
                Some(&file.path.to_string_lossy()),
            ));
        }
        self.svnmucc(args, ExecOptions::default()).await?;
        Ok(())
    }

    /// The merge-back step of `create_tag`: check the target line out into a
    /// scoped temp workspace, cherry-pick the tag-time revision onto it
    /// (reverting excluded files before the commit), and commit. The
    /// workspace is discarded on every exit path, which is also the rollback.
    async fn cherry_pick_merge(
        &self,
        tag_url: &str,
        committed: &Revision,
        url: &str,
        merge: &MergeOptions,
        prefix: &str,
    ) -> Result<(), VcsError> {
        let target_name = merge
            .target
            .as_ref()
            .map(|target| target.name_or("trunk"))
            .unwrap_or("trunk")
            .to_string();
        let workspace = self.temp_workspace()?;
        let dir = workspace.path();

        let full_url = join_url(url, merge.target.as_ref(), None);
        let dir_str = dir.to_string_lossy();
        self.svn(
            ["checkout", full_url.as_str(), dir_str.as_ref()],
            ExecOptions::default(),
        )
        .await?;

        let rev_spec = format!("-c{}", committed.as_str());
        self.svn(
            ["merge", rev_spec.as_str(), tag_url],
            ExecOptions::in_dir(dir).quiet(),
        )
        .await?;

        let mut excluded: Vec<String> = Vec::new();
        for path in &merge.exclude {
            if dir.join(path).exists() {
                excluded.push(path.to_string_lossy().into_owned());
            }
        }
        if !excluded.is_empty() {
            let mut args: Vec<String> = vec!["revert".into()];
            args.extend(excluded);
            self.svn(args, ExecOptions::in_dir(dir).quiet()).await?;
        }

        let message = format!("{prefix}Merging changes with original branch '{target_name}'");
        self.svn(
            ["commit", ".", "-m", message.as_str()],
            ExecOptions::in_dir(dir).quiet(),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl VcsDriver for SvnDriver {
    fn name(&self) -> &'static str {
        "svn"
    }

    fn is_working_copy(&self, dir: &Path) -> bool {
        dir.exists() && dir.join(".svn").exists()
    }

    fn is_repo_folder(&self, dir: &Path) -> bool {
        dir.exists() && dir.join("format").exists()
    }

    fn project_name_from_url(&self, url: &str) -> String {
        if let Ok((_, _, name)) = self.parse_url(url) {
            return name;
        }
        // no pivot segment; fall back to the last portion of the url
        let trimmed = url.trim_end_matches('/');
        match trimmed.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => trimmed.to_string(),
        }
    }

    fn dependency_url(&self, url: &str, target: Option<&Target>) -> String {
        let name = match target {
            Some(target) => target.name_or("trunk"),
            None => "trunk",
        };
        format!("svn+{url}#{name}")
    }

    async fn create_repo(
        &self,
        dir: &Path,
        options: CreateRepoOptions,
    ) -> Result<RepoHandle, VcsError> {
        if dir.exists() {
            return Err(VcsError::repo_creation(
                dir,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "path already exists")
                    .into(),
            ));
        }

        let result: Result<String, VcsError> = async {
            let root = dir.parent().unwrap_or_else(|| Path::new("."));
            let name = dir
                .file_name()
                .ok_or_else(|| VcsError::Parse(format!("bad repo path '{}'", dir.display())))?;
            tokio::fs::create_dir_all(root).await?;
            exec::run(
                "svnadmin",
                &["create".to_string(), name.to_string_lossy().into_owned()],
                &ExecOptions::in_dir(root),
            )
            .await?;

            let url = self.format_repo_url(dir)?;
            let mut dirs = vec![
                format!("{url}/trunk"),
                format!("{url}/tags"),
                format!("{url}/branches"),
            ];
            for target in &options.targets {
                match target {
                    Target::Trunk => {}
                    Target::Branch(name) => dirs.push(format!("{url}/branches/{name}")),
                    Target::Tag(name) => dirs.push(format!("{url}/tags/{name}")),
                }
            }
            let mut args: Vec<String> = vec![
                "mkdir".into(),
                "--parents".into(),
                "-m".into(),
                "Creating repo: Creating dirs".into(),
            ];
            args.extend(dirs);
            self.svn(args, ExecOptions::default()).await?;
            Ok(url)
        }
        .await;

        match result {
            Ok(url) => Ok(RepoHandle {
                url,
                dir: dir.to_path_buf(),
            }),
            Err(source) => Err(VcsError::repo_creation(dir, source)),
        }
    }

    async fn checkout(
        &self,
        url: &str,
        target: Option<&Target>,
        dir: &Path,
    ) -> Result<(), VcsError> {
        let full_url = join_url(url, target, None);
        let result: Result<(), VcsError> = async {
            if let Some(parent) = dir.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let dir_str = dir.to_string_lossy();
            self.svn(
                ["checkout", full_url.as_str(), dir_str.as_ref()],
                ExecOptions::default(),
            )
            .await?;
            Ok(())
        }
        .await;
        result.map_err(|source| VcsError::checkout(&full_url, source))
    }

    async fn is_working_copy_clean(
        &self,
        dir: &Path,
        paths: &[PathBuf],
    ) -> Result<bool, VcsError> {
        let mut args: Vec<String> = vec!["status".into(), "-q".into()];
        args.extend(paths.iter().map(|path| path.to_string_lossy().into_owned()));
        let result = self.svn(args, ExecOptions::in_dir(dir).capture()).await?;
        Ok(result.output.trim().is_empty())
    }

    async fn update(&self, dirs: &[PathBuf]) -> UpdateReport {
        // svn update handles multiple working copies in one invocation
        let mut report = UpdateReport::default();
        if dirs.is_empty() {
            return report;
        }
        let mut args: Vec<String> = vec!["update".into()];
        args.extend(dirs.iter().map(|dir| dir.to_string_lossy().into_owned()));
        match self.svn(args, ExecOptions::default()).await {
            Ok(_) => report.updated.extend(dirs.iter().cloned()),
            Err(err) => {
                warn!(error = %err, "batch update failed");
                let detail = err.to_string();
                report
                    .failed
                    .extend(dirs.iter().map(|dir| (dir.clone(), detail.clone())));
            }
        }
        report
    }

    async fn exists(&self, url: &str, target: Option<&Target>, paths: &[PathBuf]) -> bool {
        for path in paths {
            let address = join_url(url, target, Some(&path.to_string_lossy()));
            let probe = self
                .svn(["info", address.as_str()], ExecOptions::default().quiet())
                .await;
            if probe.is_err() {
                return false;
            }
        }
        true
    }

    async fn cat(
        &self,
        url: &str,
        target: Option<&Target>,
        path: &Path,
    ) -> Result<String, VcsError> {
        let address = join_url(url, target, Some(&path.to_string_lossy()));
        let result = self
            .svn(["cat", address.as_str()], ExecOptions::default().capture())
            .await?;
        Ok(result.output)
    }

    async fn un_cat(
        &self,
        url: &str,
        target: Option<&Target>,
        path: &Path,
        options: UnCatOptions,
    ) -> Result<Revision, VcsError> {
        // `put` overwrites or creates in one committed transaction; no
        // working copy, no pre-delete
        let address = join_url(url, target, Some(&path.to_string_lossy()));
        let workspace = self.temp_workspace()?;
        let local = workspace.path().join("contents");
        tokio::fs::write(&local, &options.contents).await?;

        let message = options.message.as_deref().unwrap_or("commit");
        let result = self
            .svnmucc(
                [
                    "put",
                    local.to_string_lossy().as_ref(),
                    address.as_str(),
                    "-m",
                    message,
                ],
                ExecOptions::default().capture(),
            )
            .await?;
        match parse_committed_revision(&result.output) {
            Some(revision) => Ok(revision),
            // output format varies between svnmucc versions; ask the server
            None => self.last_changed_rev(&address).await,
        }
    }

    async fn working_copy_info(&self, dir: &Path) -> Result<WorkingCopyInfo, VcsError> {
        let output = self.info(&dir.to_string_lossy(), true).await?;
        let url = Self::info_field(&output, "URL").ok_or_else(|| {
            VcsError::Parse(format!(
                "no 'URL' field in svn info output for '{}'",
                dir.display()
            ))
        })?;
        let (root, target, name) = self.parse_url(&url)?;
        Ok(WorkingCopyInfo {
            name,
            url: root,
            target,
        })
    }

    async fn url_head_revision(
        &self,
        url: &str,
        target: Option<&Target>,
    ) -> Result<Revision, VcsError> {
        self.last_changed_rev(&join_url(url, target, None)).await
    }

    async fn working_copy_revision(&self, dir: &Path) -> Result<Revision, VcsError> {
        self.last_changed_rev(&dir.to_string_lossy()).await
    }

    async fn list_tags(&self, url: &str) -> Result<Vec<String>, VcsError> {
        let tags_url = format!("{}/tags", url.trim_end_matches('/'));
        let result = self
            .svn(["ls", tags_url.as_str()], ExecOptions::default().capture())
            .await?;
        Ok(result
            .output
            .lines()
            .map(|line| line.trim().trim_end_matches('/'))
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn export_dir(&self, dir: &Path, out_dir: &Path) -> Result<(), VcsError> {
        self.svn(
            [
                "export",
                "--force",
                dir.to_string_lossy().as_ref(),
                out_dir.to_string_lossy().as_ref(),
            ],
            ExecOptions::default(),
        )
        .await?;
        Ok(())
    }

    async fn create_branch(
        &self,
        dir: &Path,
        name: &str,
        options: CreateBranchOptions,
    ) -> Result<(), VcsError> {
        let info = self.working_copy_info(dir).await?;
        let revision = self.working_copy_revision(dir).await?;
        let wc_url = join_url(&info.url, Some(&info.target), None);
        let branch_url = join_url(&info.url, Some(&Target::branch(name)), None);

        let message = options.message.as_deref().unwrap_or("Create branch");
        self.svnmucc(
            [
                "-m",
                message,
                "cp",
                revision.as_str(),
                wc_url.as_str(),
                branch_url.as_str(),
            ],
            ExecOptions::default(),
        )
        .await?;

        if options.switch {
            let dir_str = dir.to_string_lossy();
            self.svn(
                ["switch", branch_url.as_str(), dir_str.as_ref()],
                ExecOptions::default(),
            )
            .await?;
        }
        Ok(())
    }

    async fn create_tag(
        &self,
        dir: &Path,
        url: &str,
        target: Option<&Target>,
        tag_name: &str,
        options: CreateTagOptions,
    ) -> Result<MergeOutcome, VcsError> {
        let prefix = options.comment_prefix.as_str();
        let branch_url = join_url(url, target, None);
        let tag_url = join_url(url, Some(&Target::tag(tag_name)), None);
        let tag_comment = format!("{prefix}Creation");
        let rev_arg = options
            .revision
            .as_ref()
            .map(|revision| revision.as_str().to_string())
            .unwrap_or_else(|| "HEAD".to_string());

        if !options.commit {
            // no working copy involved: copy plus file puts as one atomic
            // svnmucc transaction
            let workspace = self.temp_workspace()?;
            let mut args: Vec<String> = vec![
                "-m".into(),
                tag_comment,
                "cp".into(),
                rev_arg,
                branch_url,
                tag_url,
            ];
            for (i, file) in options.files.iter().enumerate() {
                let local = workspace.path().join(format!("put-{i}"));
                tokio::fs::write(&local, &file.contents).await?;
                args.push("put".into());
                args.push(local.to_string_lossy().into_owned());
                args.push(join_url(
                    url,
                    Some(&Target::tag(tag_name)),
                    Some(&file.path.to_string_lossy()),
                ));
            }
            self.svnmucc(args, ExecOptions::default()).await?;
            return Ok(MergeOutcome::NotRequested);
        }

        // commit path: create the tag, switch the caller's working copy onto
        // it to commit local changes, then restore the working copy whatever
        // happened in between
        self.svnmucc(
            [
                "-m",
                tag_comment.as_str(),
                "cp",
                rev_arg.as_str(),
                branch_url.as_str(),
                tag_url.as_str(),
            ],
            ExecOptions::default(),
        )
        .await?;

        let dir_str = dir.to_string_lossy().into_owned();
        self.svn(
            ["switch", tag_url.as_str(), dir_str.as_str()],
            ExecOptions::default(),
        )
        .await?;

        let staged: Result<MergeOutcome, VcsError> = async {
            let message = format!("{prefix}Committing local changes");
            let commit = self
                .svn(
                    ["commit", dir_str.as_str(), "-m", message.as_str()],
                    ExecOptions::default().capture(),
                )
                .await?;

            let mut outcome = MergeOutcome::NotRequested;
            if let Some(merge) = options.merge.as_ref() {
                if let Some(committed) = parse_committed_revision(&commit.output) {
                    outcome = match self
                        .cherry_pick_merge(&tag_url, &committed, url, merge, prefix)
                        .await
                    {
                        Ok(()) => MergeOutcome::Merged,
                        Err(err) => {
                            warn!(
                                error = %err,
                                "merge-back failed; discarding merge checkout and keeping the tag"
                            );
                            MergeOutcome::RolledBack
                        }
                    };
                }
            }

            if !options.files.is_empty() {
                let message = format!("{prefix}Adding files");
                self.put_files(url, tag_name, &options.files, &message)
                    .await?;
            }
            Ok(outcome)
        }
        .await;

        // switch back even when a staged step failed
        let restore = self
            .svn(
                ["switch", branch_url.as_str(), dir_str.as_str()],
                ExecOptions::default(),
            )
            .await;
        let outcome = staged?;
        restore?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_maps_targets_to_path_suffixes() {
        assert_eq!(join_url("file:///srv/r", None, None), "file:///srv/r/trunk");
        assert_eq!(
            join_url("file:///srv/r/", Some(&Target::Trunk), None),
            "file:///srv/r/trunk"
        );
        assert_eq!(
            join_url("file:///srv/r", Some(&Target::branch("dev")), None),
            "file:///srv/r/branches/dev"
        );
        assert_eq!(
            join_url("file:///srv/r", Some(&Target::tag("1.0.0")), Some("a/b.txt")),
            "file:///srv/r/tags/1.0.0/a/b.txt"
        );
    }

    #[test]
    fn parse_url_finds_the_pivot_segment() {
        let driver = SvnDriver::new(SvnConfig::default());
        let (root, target, name) = driver
            .parse_url("file:///srv/repos/myproject/trunk")
            .unwrap();
        assert_eq!(root, "file:///srv/repos/myproject");
        assert_eq!(target, Target::Trunk);
        assert_eq!(name, "myproject");

        let (root, target, name) = driver
            .parse_url("http://host/svn/proj/branches/dev/sub")
            .unwrap();
        assert_eq!(root, "http://host/svn/proj");
        assert_eq!(target, Target::branch("dev"));
        assert_eq!(name, "proj");

        let (_, target, _) = driver
            .parse_url("http://host/svn/proj/tags/1.2.3")
            .unwrap();
        assert_eq!(target, Target::tag("1.2.3"));

        assert!(driver.parse_url("http://host/svn/proj").is_err());
    }

    #[test]
    fn project_name_falls_back_to_last_segment() {
        let driver = SvnDriver::new(SvnConfig::default());
        assert_eq!(
            driver.project_name_from_url("http://host/svn/proj/trunk"),
            "proj"
        );
        assert_eq!(driver.project_name_from_url("http://host/svn/proj/"), "proj");
    }

    #[test]
    fn dependency_url_is_svn_prefixed() {
        let driver = SvnDriver::new(SvnConfig::default());
        assert_eq!(
            driver.dependency_url("http://host/svn/proj", None),
            "svn+http://host/svn/proj#trunk"
        );
        assert_eq!(
            driver.dependency_url("http://host/svn/proj", Some(&Target::branch("dev"))),
            "svn+http://host/svn/proj#dev"
        );
    }

    #[test]
    fn committed_revision_parses_both_tools() {
        assert_eq!(
            parse_committed_revision("Sending a.txt\nCommitted revision 12.\n"),
            Some(Revision::new("12"))
        );
        assert_eq!(
            parse_committed_revision("r7 committed by someone at 2016-01-01\n"),
            Some(Revision::new("7"))
        );
        assert_eq!(parse_committed_revision("nothing to commit\n"), None);
    }

    #[test]
    fn info_field_extraction() {
        let output = "Path: .\nURL: file:///srv/r/trunk\nLast Changed Rev: 42\n";
        assert_eq!(
            SvnDriver::info_field(output, "URL").as_deref(),
            Some("file:///srv/r/trunk")
        );
        assert_eq!(
            SvnDriver::info_field(output, "Last Changed Rev").as_deref(),
            Some("42")
        );
        assert_eq!(SvnDriver::info_field(output, "Repository Root"), None);
    }
}
