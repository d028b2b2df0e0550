//! Steps of the device tree workflow.

use crate::collaborators::{
    DeviceTreeGenerator, Downloader, GeneratedTree, GithubCredentials, PushRequest,
    RemoteRepository, SourceHost, VcsPusher,
};
use crate::errors::Collaborator;
use crate::transcript::Progress;
use crate::workflow::{Completion, Step, StepResult};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::Url;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{error, info, warn};

/// Source of today's date for the fallback branch name.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// File name of the downloaded image inside the scratch directory.
pub const IMAGE_FILE: &str = "recovery.img";
/// Directory receiving the generated tree inside the scratch directory.
pub const WORKING_DIR: &str = "working";
/// Warning appended when no build description is available.
pub const NO_DESCRIPTION_WARNING: &str =
    "Failed to get build description prop, using date as a branch";

/// Downloaded image inside its scratch directory.
#[derive(Debug)]
pub struct Downloaded {
    scratch: TempDir,
    image: PathBuf,
}

/// Generated tree, still inside the scratch directory.
#[derive(Debug)]
pub struct Generated {
    scratch: TempDir,
    /// Generator output.
    pub tree: GeneratedTree,
}

/// Generated tree with the branch it will be pushed to.
#[derive(Debug)]
pub struct Branched {
    generated: Generated,
    /// Remote branch name.
    pub branch: String,
    /// Build description the branch was derived from.
    pub description: Option<String>,
}

/// Branched tree with the organization confirmed to exist.
#[derive(Debug)]
pub struct Targeted {
    branched: Branched,
    org: String,
}

/// Branched tree with its remote repository.
#[derive(Debug)]
pub struct Ensured {
    branched: Branched,
    repository: RemoteRepository,
}

/// A device tree pushed to its repository.
#[derive(Debug)]
pub struct Published {
    // Dropping the result removes the scratch directory.
    _scratch: TempDir,
    /// Generator output.
    pub tree: GeneratedTree,
    /// Pushed branch.
    pub branch: String,
    /// Build description, if the image had one.
    pub description: Option<String>,
    /// Repository the tree was pushed to.
    pub repository: RemoteRepository,
}

impl Completion for Published {
    fn reference(&self) -> String {
        self.repository.tree_url(&self.branch)
    }

    fn announcement(&self) -> Option<String> {
        Some(format!(
            "TWRP device tree generated\n\
             Codename: {}\n\
             Manufacturer: {}\n\
             Build description: {}\n\
             Device tree: {}",
            self.tree.codename,
            self.tree.manufacturer,
            self.description.as_deref().unwrap_or("unknown"),
            self.reference(),
        ))
    }
}

/// Name of the repository holding a device's tree.
#[must_use]
pub fn repository_name(tree: &GeneratedTree) -> String {
    format!("android_device_{}_{}", tree.manufacturer, tree.codename)
}

/// Branch name for a build description, or for `today` without one.
#[must_use]
pub fn branch_name(description: Option<&str>, today: NaiveDate) -> String {
    match description {
        Some(description) => description.replace(' ', "-"),
        None => format!("{}-{}-{}", today.year(), today.month(), today.day()),
    }
}

/// Downloads the image into a fresh scratch directory.
pub struct Download {
    pub(super) downloader: Arc<dyn Downloader>,
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download").finish_non_exhaustive()
    }
}

#[async_trait]
impl Step<Url> for Download {
    type Output = Downloaded;

    fn name(&self) -> &str {
        "download"
    }

    fn status(&self) -> Option<&str> {
        Some("Downloading file...")
    }

    async fn run(&self, url: Url, _progress: &mut Progress) -> StepResult<Downloaded> {
        let scratch = match tempfile::Builder::new().prefix("twrpdtgen").tempdir() {
            Ok(dir) => dir,
            Err(err) => {
                error!(error = %err, "Failed to create scratch directory");
                return StepResult::abort(Collaborator::Download, "Failed to download file");
            }
        };
        let image = scratch.path().join(IMAGE_FILE);

        match self.downloader.download(url.as_str(), &image).await {
            Ok(bytes) => {
                info!(%url, bytes, "Image downloaded");
                StepResult::Continue(Downloaded { scratch, image })
            }
            Err(err) => {
                error!(%url, error = %err, "Failed to download file");
                StepResult::abort(Collaborator::Download, "Failed to download file")
            }
        }
    }
}

/// Generates the device tree as a git repository.
pub struct Generate {
    pub(super) generator: Arc<dyn DeviceTreeGenerator>,
}

impl fmt::Debug for Generate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generate").finish_non_exhaustive()
    }
}

#[async_trait]
impl Step<Downloaded> for Generate {
    type Output = Generated;

    fn name(&self) -> &str {
        "generate"
    }

    fn status(&self) -> Option<&str> {
        Some("Generating device tree...")
    }

    async fn run(&self, input: Downloaded, _progress: &mut Progress) -> StepResult<Generated> {
        let output = input.scratch.path().join(WORKING_DIR);

        match self.generator.generate(&input.image, &output, true).await {
            Ok(tree) => StepResult::Continue(Generated {
                scratch: input.scratch,
                tree,
            }),
            Err(err) => {
                error!(error = ?err, "Device tree generation failed");
                StepResult::abort(
                    Collaborator::Generator,
                    format!("Device tree generation failed: {err}"),
                )
            }
        }
    }
}

/// Picks the branch name. Never fails.
pub struct DeriveBranch {
    pub(super) clock: Clock,
}

impl fmt::Debug for DeriveBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeriveBranch").finish_non_exhaustive()
    }
}

#[async_trait]
impl Step<Generated> for DeriveBranch {
    type Output = Branched;

    fn name(&self) -> &str {
        "derive_branch"
    }

    async fn run(&self, generated: Generated, progress: &mut Progress) -> StepResult<Branched> {
        let description = generated.tree.build_description().map(str::to_string);

        if description.is_none() {
            warn!(codename = %generated.tree.codename, "No build description prop");
            progress.warn(NO_DESCRIPTION_WARNING).await;
        }

        let branch = branch_name(description.as_deref(), (self.clock)());
        StepResult::Continue(Branched {
            generated,
            branch,
            description,
        })
    }
}

/// Confirms the target organization is reachable.
pub struct ResolveOrganization {
    pub(super) host: Arc<dyn SourceHost>,
    pub(super) credentials: Arc<GithubCredentials>,
}

impl fmt::Debug for ResolveOrganization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveOrganization")
            .field("org", &self.credentials.org)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Step<Branched> for ResolveOrganization {
    type Output = Targeted;

    fn name(&self) -> &str {
        "resolve_organization"
    }

    fn status(&self) -> Option<&str> {
        Some("Pushing to GitHub...")
    }

    async fn run(&self, branched: Branched, _progress: &mut Progress) -> StepResult<Targeted> {
        match self.host.organization(&self.credentials.org).await {
            Ok(org) => StepResult::Continue(Targeted { branched, org }),
            Err(err) => {
                error!(
                    org = %self.credentials.org,
                    error = %err,
                    "Failed to get GitHub organization"
                );
                StepResult::abort(Collaborator::SourceHost, "Failed to get GitHub organization")
            }
        }
    }
}

/// Creates the device repository, reusing it when it already exists.
pub struct EnsureRepository {
    pub(super) host: Arc<dyn SourceHost>,
}

impl fmt::Debug for EnsureRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnsureRepository").finish_non_exhaustive()
    }
}

#[async_trait]
impl Step<Targeted> for EnsureRepository {
    type Output = Ensured;

    fn name(&self) -> &str {
        "ensure_repository"
    }

    fn status(&self) -> Option<&str> {
        Some("Creating repo if needed...")
    }

    async fn run(&self, targeted: Targeted, _progress: &mut Progress) -> StepResult<Ensured> {
        let Targeted { branched, org } = targeted;
        let name = repository_name(&branched.generated.tree);

        let created = match self.host.create_repository(&org, &name).await {
            Err(err) if err.is_already_exists() => {
                info!(%org, %name, "Repository already exists");
                self.host.repository(&org, &name).await
            }
            other => other,
        };

        match created {
            Ok(repository) => StepResult::Continue(Ensured {
                branched,
                repository,
            }),
            Err(err) => {
                error!(%org, %name, error = %err, "Repo creation failed");
                StepResult::abort(
                    Collaborator::SourceHost,
                    format!("Repo creation failed {err}"),
                )
            }
        }
    }
}

/// Pushes the tree and makes its branch the default.
pub struct Push {
    pub(super) host: Arc<dyn SourceHost>,
    pub(super) pusher: Arc<dyn VcsPusher>,
    pub(super) credentials: Arc<GithubCredentials>,
}

impl fmt::Debug for Push {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Push").finish_non_exhaustive()
    }
}

#[async_trait]
impl Step<Ensured> for Push {
    type Output = Published;

    fn name(&self) -> &str {
        "push"
    }

    fn status(&self) -> Option<&str> {
        Some("Pushing...")
    }

    async fn run(&self, ensured: Ensured, _progress: &mut Progress) -> StepResult<Published> {
        let Ensured {
            branched,
            repository,
        } = ensured;

        let request = PushRequest {
            repository: branched.generated.tree.path.clone(),
            remote_url: repository.clone_url.clone(),
            branch: branched.branch.clone(),
            username: self.credentials.username.clone(),
            token: self.credentials.token.clone(),
        };

        if let Err(err) = self.pusher.push(request).await {
            error!(repository = %repository.html_url, error = %err, "Push to GitHub failed");
            return StepResult::abort(Collaborator::VersionControl, "Push to remote failed!");
        }

        if let Err(err) = self
            .host
            .set_default_branch(&repository, &branched.branch)
            .await
        {
            error!(
                repository = %repository.html_url,
                error = %err,
                "Failed to set default branch"
            );
            return StepResult::abort(Collaborator::SourceHost, "Push to remote failed!");
        }

        StepResult::Continue(Published {
            _scratch: branched.generated.scratch,
            tree: branched.generated.tree,
            branch: branched.branch,
            description: branched.description,
            repository,
        })
    }
}
