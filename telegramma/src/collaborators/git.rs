//! Version control push.

use async_trait::async_trait;
use git2::{Cred, PushOptions, RemoteCallbacks, Repository};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Errors raised while pushing.
#[derive(Debug, Error)]
pub enum PushError {
    /// libgit2 reported an error.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// The remote refused the reference update.
    #[error("remote rejected {reference}: {message}")]
    Rejected {
        /// The remote reference.
        reference: String,
        /// The reason given by the remote.
        message: String,
    },

    /// `HEAD` does not point at a branch.
    #[error("HEAD is not a branch")]
    DetachedHead,

    /// The blocking push task did not complete.
    #[error("push task failed: {0}")]
    Join(String),
}

/// What to push and where.
#[derive(Clone)]
pub struct PushRequest {
    /// Local repository.
    pub repository: PathBuf,
    /// HTTPS URL of the remote, without credentials.
    pub remote_url: String,
    /// Remote branch receiving the local `HEAD`.
    pub branch: String,
    /// User name for HTTPS authentication.
    pub username: String,
    /// Token used as the HTTPS password.
    pub token: String,
}

impl fmt::Debug for PushRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushRequest")
            .field("repository", &self.repository)
            .field("remote_url", &self.remote_url)
            .field("branch", &self.branch)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Pushes a local repository to a remote branch.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VcsPusher: Send + Sync {
    /// Pushes the local `HEAD` to `refs/heads/<branch>` on the remote.
    async fn push(&self, request: PushRequest) -> Result<(), PushError>;
}

/// Pushes with libgit2 on the blocking thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct Git2Pusher;

impl Git2Pusher {
    fn push_blocking(request: &PushRequest) -> Result<(), PushError> {
        let repo = Repository::open(&request.repository)?;
        let head = repo.head()?;
        if !head.is_branch() {
            return Err(PushError::DetachedHead);
        }
        let local = head.name().ok_or(PushError::DetachedHead)?;
        let target = format!("refs/heads/{}", request.branch);
        let refspec = format!("{local}:{target}");

        let mut rejection: Option<(String, String)> = None;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(|_url, _username, _allowed| {
            Cred::userpass_plaintext(&request.username, &request.token)
        });
        callbacks.push_update_reference(|reference, status| {
            if let Some(message) = status {
                rejection = Some((reference.to_string(), message.to_string()));
            }
            Ok(())
        });

        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        let mut remote = repo.remote_anonymous(&request.remote_url)?;
        remote.push(&[refspec.as_str()], Some(&mut options))?;
        drop(options);

        if let Some((reference, message)) = rejection {
            return Err(PushError::Rejected { reference, message });
        }

        debug!(refspec, remote = %request.remote_url, "Push finished");
        Ok(())
    }
}

#[async_trait]
impl VcsPusher for Git2Pusher {
    async fn push(&self, request: PushRequest) -> Result<(), PushError> {
        tokio::task::spawn_blocking(move || Self::push_blocking(&request))
            .await
            .map_err(|e| PushError::Join(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(repository: PathBuf, remote_url: String) -> PushRequest {
        PushRequest {
            repository,
            remote_url,
            branch: "lavender-user-10".to_string(),
            username: "bot".to_string(),
            token: "ghp_secret".to_string(),
        }
    }

    fn commit_all(repo: &Repository) {
        let sig = git2::Signature::now("twrpdtgen", "twrpdtgen@localhost").unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_to_local_bare_remote() {
        let dir = tempfile::tempdir().unwrap();
        let local_path = dir.path().join("working");
        let remote_path = dir.path().join("remote.git");

        let local = Repository::init(&local_path).unwrap();
        std::fs::write(local_path.join("BoardConfig.mk"), "TARGET_ARCH := arm64\n").unwrap();
        commit_all(&local);
        Repository::init_bare(&remote_path).unwrap();

        let url = format!("file://{}", remote_path.display());
        Git2Pusher
            .push(request(local_path.clone(), url))
            .await
            .unwrap();

        let remote = Repository::open_bare(&remote_path).unwrap();
        let pushed = remote
            .find_reference("refs/heads/lavender-user-10")
            .unwrap()
            .target()
            .unwrap();
        let head = local.head().unwrap().target().unwrap();
        assert_eq!(pushed, head);
    }

    #[tokio::test]
    async fn test_push_without_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Git2Pusher
            .push(request(
                dir.path().join("missing"),
                "https://github.com/TwrpDtGen/android_device_xiaomi_lavender".to_string(),
            ))
            .await;

        assert!(matches!(result, Err(PushError::Git(_))));
    }

    #[test]
    fn test_request_debug_hides_token() {
        let debug = format!(
            "{:?}",
            request(PathBuf::from("/tmp/working"), "https://github.com/a/b".to_string())
        );
        assert!(!debug.contains("ghp_secret"));
    }
}
