//! Distributed backend driver, wrapping the `git` command-line tool.
//!
//! Addressing is ref-based: one repository URL plus a branch/tag name, with
//! trunk mapping to the configured primary branch. Addressed operations that
//! have no working copy to hand (`exists`, `cat`, `un_cat`, `list_tags`,
//! `create_repo`) stage their work in a scoped temporary clone, minimal
//! (`--no-checkout`) wherever only the object store is needed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::error::VcsError;
use crate::exec::{self, ExecOptions, ExecResult};
use crate::traits::VcsDriver;
use crate::types::*;
use crate::workspace::TempWorkspace;

/// Configuration for the git driver
#[derive(Debug, Clone)]
pub struct GitConfig {
    /// Remote name assumed for all published refs
    pub remote: String,
    /// Name of the primary line (`Target::Trunk` resolves to this)
    pub primary_branch: String,
    /// Identity injected into every invocation, so commits made inside
    /// internally provisioned workspaces do not depend on global config
    pub committer_name: String,
    pub committer_email: String,
    /// When set, `create_repo` hands out SSH-style `<user>@127.0.0.1:<path>`
    /// URLs; otherwise plain `file://` URLs
    pub server_user: Option<String>,
    /// Root for temporary workspaces; system temp dir when absent
    pub temp_root: Option<PathBuf>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            primary_branch: "master".to_string(),
            committer_name: "vcs-bridge".to_string(),
            committer_email: "vcs-bridge@localhost".to_string(),
            server_user: None,
            temp_root: None,
        }
    }
}

/// Git implementation of the driver contract
pub struct GitDriver {
    config: GitConfig,
}

impl GitDriver {
    pub fn new(config: GitConfig) -> Self {
        Self { config }
    }

    fn ref_for<'a>(&'a self, target: Option<&'a Target>) -> &'a str {
        match target {
            Some(target) => target.name_or(&self.config.primary_branch),
            None => &self.config.primary_branch,
        }
    }

    async fn git<I, S>(&self, args: I, opts: ExecOptions) -> Result<ExecResult, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full: Vec<String> = vec![
            "-c".into(),
            format!("user.name={}", self.config.committer_name),
            "-c".into(),
            format!("user.email={}", self.config.committer_email),
            "-c".into(),
            format!("init.defaultBranch={}", self.config.primary_branch),
        ];
        full.extend(args.into_iter().map(Into::into));
        exec::run("git", &full, &opts).await
    }

    fn temp_workspace(&self) -> Result<TempWorkspace, VcsError> {
        TempWorkspace::new(self.config.temp_root.as_deref())
    }

    /// Server-side repository directory to durable URL
    fn format_repo_url(&self, dir: &Path) -> Result<String, VcsError> {
        let abs = std::path::absolute(dir)?;
        let disp = abs.to_string_lossy().replace('\\', "/");
        match &self.config.server_user {
            Some(user) => Ok(format!("{user}@127.0.0.1:{disp}")),
            None => Ok(format!("file://{disp}")),
        }
    }

    /// Clone the addressed line into `dir`. Minimal mode skips materializing
    /// working files; used for read-only introspection.
    async fn clone_into(
        &self,
        url: &str,
        target: Option<&Target>,
        dir: &Path,
        minimal: bool,
    ) -> Result<(), VcsError> {
        let mut args: Vec<String> = vec!["clone".into()];
        if minimal {
            args.push("--no-checkout".into());
        }
        args.push(url.into());
        args.push(dir.to_string_lossy().into_owned());
        if let Some(target) = target {
            if !target.is_trunk() {
                args.push("-b".into());
                args.push(target.name_or(&self.config.primary_branch).into());
            }
        }
        tokio::fs::create_dir_all(dir).await?;
        self.git(args, ExecOptions::default()).await?;
        Ok(())
    }

    /// Branch / tag the working copy currently points at. A symbolic HEAD on
    /// the primary branch reads as trunk; a detached HEAD falls back to an
    /// exact tag match.
    async fn current_target(&self, dir: &Path) -> Result<Target, VcsError> {
        let result = self
            .git(
                ["symbolic-ref", "--short", "-q", "HEAD"],
                ExecOptions::in_dir(dir).capture().ignore_error().quiet(),
            )
            .await?;
        let name = result.output.trim();
        if result.success() && !name.is_empty() {
            return Ok(if name == self.config.primary_branch {
                Target::Trunk
            } else {
                Target::Branch(name.to_string())
            });
        }

        let result = self
            .git(
                ["describe", "--tags", "--exact-match"],
                ExecOptions::in_dir(dir).capture(),
            )
            .await?;
        Ok(Target::Tag(result.output.trim().to_string()))
    }

    /// Best-effort update of a single working copy, wrapping the pull in a
    /// stash save/pop pair so uncommitted local changes survive. The stash is
    /// named with a fresh uuid and popped only if `stash list` confirms an
    /// entry was actually created (a clean tree makes `stash save` a no-op).
    async fn update_one(&self, dir: &Path) -> Result<(), VcsError> {
        let clean = self.is_working_copy_clean(dir, &[]).await?;
        let mut stashed = false;
        if !clean {
            let stash_name = Uuid::new_v4().to_string();
            self.git(
                ["stash", "save", stash_name.as_str()],
                ExecOptions::in_dir(dir),
            )
            .await?;
            let list = self
                .git(["stash", "list"], ExecOptions::in_dir(dir).capture())
                .await?;
            stashed = list.output.contains(&stash_name);
        }
        self.git(["pull"], ExecOptions::in_dir(dir)).await?;
        self.git(["push"], ExecOptions::in_dir(dir)).await?;
        if stashed {
            self.git(["stash", "pop"], ExecOptions::in_dir(dir)).await?;
        }
        Ok(())
    }

    async fn exists_one(&self, workspace: &Path, refname: &str, path: &Path) -> bool {
        let spec = format!("{}:{}", refname, path.to_string_lossy().replace('\\', "/"));
        self.git(
            ["cat-file", "-e", spec.as_str()],
            ExecOptions::in_dir(workspace).quiet(),
        )
        .await
        .is_ok()
    }

    /// The merge-back step of `create_tag`: pull the target line, cherry-pick
    /// the committed revision onto it (holding back any excluded files), and
    /// push. Failures propagate to the caller, which rolls back.
    async fn merge_back(
        &self,
        dir: &Path,
        target_branch: &str,
        committed: &Revision,
        merge: &MergeOptions,
        prefix: &str,
    ) -> Result<(), VcsError> {
        self.git(["pull"], ExecOptions::in_dir(dir)).await?;

        let mut excluded: Vec<String> = Vec::new();
        for path in &merge.exclude {
            if dir.join(path).exists() {
                excluded.push(path.to_string_lossy().into_owned());
            }
        }

        if excluded.is_empty() {
            self.git(
                ["cherry-pick", committed.as_str()],
                ExecOptions::in_dir(dir).quiet(),
            )
            .await?;
        } else {
            // apply without committing, revert the held-back files, then commit
            self.git(
                ["cherry-pick", "-n", committed.as_str()],
                ExecOptions::in_dir(dir).quiet(),
            )
            .await?;
            let mut args: Vec<String> = vec!["checkout".into(), "HEAD".into(), "--".into()];
            args.extend(excluded);
            self.git(args, ExecOptions::in_dir(dir).quiet()).await?;
            let message = format!("{prefix}Merging changes with original branch '{target_branch}'");
            self.git(
                ["commit", "-m", message.as_str()],
                ExecOptions::in_dir(dir).quiet(),
            )
            .await?;
        }

        self.git(
            ["push", "-u", self.config.remote.as_str(), target_branch],
            ExecOptions::in_dir(dir),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl VcsDriver for GitDriver {
    fn name(&self) -> &'static str {
        "git"
    }

    fn is_working_copy(&self, dir: &Path) -> bool {
        dir.exists() && dir.join(".git").exists()
    }

    fn is_repo_folder(&self, dir: &Path) -> bool {
        dir.exists() && dir.join("HEAD").exists()
    }

    fn project_name_from_url(&self, url: &str) -> String {
        let url = url.strip_suffix(".git").unwrap_or(url);
        let url = url.strip_suffix('/').unwrap_or(url);
        match url.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => url.to_string(),
        }
    }

    fn dependency_url(&self, url: &str, target: Option<&Target>) -> String {
        format!("{url}#{}", self.ref_for(target))
    }

    async fn create_repo(
        &self,
        dir: &Path,
        options: CreateRepoOptions,
    ) -> Result<RepoHandle, VcsError> {
        let dir = if dir.to_string_lossy().ends_with(".git") {
            dir.to_path_buf()
        } else {
            PathBuf::from(format!("{}.git", dir.display()))
        };
        if dir.exists() {
            return Err(VcsError::repo_creation(
                &dir,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "path already exists")
                    .into(),
            ));
        }

        let result: Result<String, VcsError> = async {
            tokio::fs::create_dir_all(&dir).await?;
            let url = self.format_repo_url(&dir)?;
            let primary = self.config.primary_branch.as_str();
            let remote = self.config.remote.as_str();

            let dir_str = dir.to_string_lossy();
            self.git(["init", "--bare", dir_str.as_ref()], ExecOptions::default())
                .await?;

            // a bare repo has no head until something is pushed, so stage a
            // seed commit in a scoped checkout
            let seed = self.temp_workspace()?;
            let seed_dir = seed.path();
            let seed_str = seed_dir.to_string_lossy();
            self.git(["init", seed_str.as_ref()], ExecOptions::default())
                .await?;
            tokio::fs::write(seed_dir.join(".gitignore"), "").await?;
            self.git(["add", "."], ExecOptions::in_dir(seed_dir)).await?;
            self.git(
                ["commit", "-m", "Creating repo: Initial commit"],
                ExecOptions::in_dir(seed_dir),
            )
            .await?;
            self.git(
                ["remote", "add", remote, url.as_str()],
                ExecOptions::in_dir(seed_dir),
            )
            .await?;
            self.git(
                ["push", "-u", remote, primary],
                ExecOptions::in_dir(seed_dir),
            )
            .await?;

            for target in &options.targets {
                match target {
                    Target::Trunk => {}
                    Target::Branch(name) => {
                        self.git(["branch", name.as_str()], ExecOptions::in_dir(seed_dir))
                            .await?;
                        self.git(
                            ["push", "-u", remote, name.as_str()],
                            ExecOptions::in_dir(seed_dir),
                        )
                        .await?;
                    }
                    Target::Tag(name) => {
                        let message = format!("Creating repo: Creating tag {name}");
                        self.git(
                            ["tag", "-a", name.as_str(), "-m", message.as_str()],
                            ExecOptions::in_dir(seed_dir),
                        )
                        .await?;
                        self.git(
                            ["push", remote, name.as_str()],
                            ExecOptions::in_dir(seed_dir),
                        )
                        .await?;
                    }
                }
            }
            Ok(url)
        }
        .await;

        match result {
            Ok(url) => Ok(RepoHandle { url, dir }),
            Err(source) => Err(VcsError::repo_creation(&dir, source)),
        }
    }

    async fn checkout(
        &self,
        url: &str,
        target: Option<&Target>,
        dir: &Path,
    ) -> Result<(), VcsError> {
        self.clone_into(url, target, dir, false)
            .await
            .map_err(|source| VcsError::checkout(url, source))
    }

    async fn is_working_copy_clean(
        &self,
        dir: &Path,
        paths: &[PathBuf],
    ) -> Result<bool, VcsError> {
        let mut args: Vec<String> = vec!["diff".into(), "HEAD".into()];
        if !paths.is_empty() {
            args.push("--".into());
            args.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
        }
        let result = self.git(args, ExecOptions::in_dir(dir).capture()).await?;
        Ok(result.output.trim().is_empty())
    }

    async fn update(&self, dirs: &[PathBuf]) -> UpdateReport {
        let mut report = UpdateReport::default();
        for dir in dirs {
            match self.update_one(dir).await {
                Ok(()) => report.updated.push(dir.clone()),
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "update skipped directory");
                    report.failed.push((dir.clone(), err.to_string()));
                }
            }
        }
        report
    }

    async fn exists(&self, url: &str, target: Option<&Target>, paths: &[PathBuf]) -> bool {
        let workspace = match self.temp_workspace() {
            Ok(workspace) => workspace,
            Err(_) => return false,
        };
        if self
            .clone_into(url, target, workspace.path(), true)
            .await
            .is_err()
        {
            return false;
        }
        let refname = self.ref_for(target);
        for path in paths {
            if !self.exists_one(workspace.path(), refname, path).await {
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
        let workspace = self.temp_workspace()?;
        self.clone_into(url, target, workspace.path(), true).await?;
        let refname = self.ref_for(target);
        self.git(
            [
                "checkout",
                refname,
                "--",
                path.to_string_lossy().as_ref(),
            ],
            ExecOptions::in_dir(workspace.path()),
        )
        .await?;
        let contents = tokio::fs::read_to_string(workspace.path().join(path)).await?;
        Ok(contents)
    }

    async fn un_cat(
        &self,
        url: &str,
        target: Option<&Target>,
        path: &Path,
        options: UnCatOptions,
    ) -> Result<Revision, VcsError> {
        let workspace = self.temp_workspace()?;
        let dir = workspace.path();
        self.clone_into(url, target, dir, true).await?;

        let full_path = dir.join(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, &options.contents).await?;

        let rel = path.to_string_lossy();
        self.git(
            ["add", rel.as_ref()],
            ExecOptions::in_dir(dir).ignore_error(),
        )
        .await?;
        let message = options.message.as_deref().unwrap_or("uncat");
        // pathspec commit: only this file changes against head, regardless of
        // what the minimal clone left out of the index
        self.git(
            ["commit", "-m", message, "--", rel.as_ref()],
            ExecOptions::in_dir(dir),
        )
        .await?;
        self.git(
            ["push", self.config.remote.as_str(), self.ref_for(target)],
            ExecOptions::in_dir(dir),
        )
        .await?;
        self.working_copy_revision(dir).await
    }

    async fn working_copy_info(&self, dir: &Path) -> Result<WorkingCopyInfo, VcsError> {
        // a repo can have several remotes; assume the configured one
        let key = format!("remote.{}.url", self.config.remote);
        let result = self
            .git(
                ["config", "--get", key.as_str()],
                ExecOptions::in_dir(dir).capture(),
            )
            .await?;
        let url = result.output.trim().to_string();
        let target = self.current_target(dir).await?;
        Ok(WorkingCopyInfo {
            name: self.project_name_from_url(&url),
            url,
            target,
        })
    }

    async fn url_head_revision(
        &self,
        url: &str,
        target: Option<&Target>,
    ) -> Result<Revision, VcsError> {
        let refname = self.ref_for(target);
        let result = self
            .git(["ls-remote", url, refname], ExecOptions::default().capture())
            .await?;
        // format: f845c467b347b715ea9984b64e74911ef3f4c27c        refs/heads/master
        let line = result.output.trim();
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next()) {
            (Some(hash), Some(_ref)) => Ok(Revision::new(hash)),
            _ => Err(VcsError::Parse(format!(
                "could not parse commit hash from ls-remote output '{line}'"
            ))),
        }
    }

    async fn working_copy_revision(&self, dir: &Path) -> Result<Revision, VcsError> {
        let result = self
            .git(["rev-parse", "HEAD"], ExecOptions::in_dir(dir).capture())
            .await?;
        Ok(Revision::new(result.output.trim()))
    }

    async fn list_tags(&self, url: &str) -> Result<Vec<String>, VcsError> {
        let workspace = self.temp_workspace()?;
        self.clone_into(url, None, workspace.path(), true).await?;
        let result = self
            .git(["tag"], ExecOptions::in_dir(workspace.path()).capture())
            .await?;
        Ok(result
            .output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn export_dir(&self, dir: &Path, out_dir: &Path) -> Result<(), VcsError> {
        let mut prefix = out_dir.to_string_lossy().into_owned();
        if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
            prefix.push(std::path::MAIN_SEPARATOR);
        }
        self.git(
            ["checkout-index", "-a", "-f", "--prefix", prefix.as_str()],
            ExecOptions::in_dir(dir),
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
        self.git(["branch", name], ExecOptions::in_dir(dir)).await?;
        self.git(
            ["push", "-u", self.config.remote.as_str(), name],
            ExecOptions::in_dir(dir),
        )
        .await?;
        if options.switch {
            self.git(["checkout", name], ExecOptions::in_dir(dir))
                .await?;
        }
        Ok(())
    }

    async fn create_tag(
        &self,
        dir: &Path,
        _url: &str,
        _target: Option<&Target>,
        tag_name: &str,
        options: CreateTagOptions,
    ) -> Result<MergeOutcome, VcsError> {
        let prefix = options.comment_prefix.as_str();
        let remote = self.config.remote.as_str();
        let primary = self.config.primary_branch.as_str();

        let merge_branch = options
            .merge
            .as_ref()
            .and_then(|merge| merge.target.as_ref())
            .map(|target| target.name_or(primary))
            .unwrap_or(primary)
            .to_string();
        let original_branch = self
            .current_target(dir)
            .await?
            .name_or(primary)
            .to_string();

        // stage everything on a transient branch rooted at the requested
        // revision (or current head); deleted again before returning
        let transient = format!("{tag_name}_branch");
        self.git(["fetch"], ExecOptions::in_dir(dir)).await?;
        let mut args: Vec<String> =
            vec!["checkout".into(), "-b".into(), transient.clone()];
        if let Some(revision) = &options.revision {
            args.push(revision.as_str().into());
        }
        self.git(args, ExecOptions::in_dir(dir)).await?;

        let mut committed: Option<(Revision, &MergeOptions)> = None;
        if options.commit {
            let message = format!("{prefix}Committing local changes");
            self.git(
                ["commit", "-m", message.as_str(), "."],
                ExecOptions::in_dir(dir),
            )
            .await?;
            if let Some(merge) = options.merge.as_ref() {
                committed = Some((self.working_copy_revision(dir).await?, merge));
            }
        }

        if !options.files.is_empty() {
            let mut modified: Vec<String> = Vec::new();
            for file in &options.files {
                let full_path = dir.join(&file.path);
                if full_path.exists() {
                    tokio::fs::write(&full_path, &file.contents).await?;
                    modified.push(file.path.to_string_lossy().into_owned());
                }
            }
            if !modified.is_empty() {
                let mut args: Vec<String> = vec!["add".into()];
                args.extend(modified.iter().cloned());
                self.git(args, ExecOptions::in_dir(dir)).await?;

                let mut args: Vec<String> = vec![
                    "commit".into(),
                    "-m".into(),
                    format!("{prefix}Adding files"),
                ];
                args.extend(modified);
                self.git(args, ExecOptions::in_dir(dir)).await?;
            }
        }

        let message = format!("{prefix}Creation");
        self.git(
            [
                "tag",
                "-a",
                tag_name,
                "-m",
                message.as_str(),
                transient.as_str(),
            ],
            ExecOptions::in_dir(dir),
        )
        .await?;

        self.git(
            ["checkout", merge_branch.as_str()],
            ExecOptions::in_dir(dir),
        )
        .await?;
        self.git(
            ["branch", "-D", transient.as_str()],
            ExecOptions::in_dir(dir),
        )
        .await?;

        let mut outcome = MergeOutcome::NotRequested;
        if let Some((committed, merge)) = &committed {
            outcome = match self
                .merge_back(dir, &merge_branch, committed, merge, prefix)
                .await
            {
                Ok(()) => MergeOutcome::Merged,
                Err(err) => {
                    warn!(
                        branch = %merge_branch,
                        error = %err,
                        "merge-back failed; rolling back and keeping the tag"
                    );
                    let _ = self
                        .git(
                            ["reset", "--hard"],
                            ExecOptions::in_dir(dir).ignore_error().quiet(),
                        )
                        .await;
                    MergeOutcome::RolledBack
                }
            };
        }

        self.git(["push", "-u", remote, tag_name], ExecOptions::in_dir(dir))
            .await?;

        // restore the caller's working copy: original branch, original revision
        self.git(
            ["checkout", original_branch.as_str()],
            ExecOptions::in_dir(dir),
        )
        .await?;
        if let Some(revision) = &options.revision {
            self.git(
                ["reset", "--soft", revision.as_str()],
                ExecOptions::in_dir(dir),
            )
            .await?;
        }
        Ok(outcome)
    }
}
