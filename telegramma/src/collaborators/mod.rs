//! External systems the device tree workflow talks to.
//!
//! Each collaborator sits behind an async trait so workflows can be driven
//! against test doubles. Implementations translate library errors into
//! their own error type at the call site; steps turn those into short
//! transcript lines.

mod devicetree;
mod download;
mod git;
mod github;

pub use devicetree::{
    BuildProperties, DeviceTreeGenerator, GeneratedTree, GeneratorError, PythonTwrpdtgen,
};
pub use download::{DownloadError, Downloader, HttpDownloader, MAX_REDIRECTS};
pub use git::{Git2Pusher, PushError, PushRequest, VcsPusher};
pub use github::{GithubCredentials, GithubHost, HostError, RemoteRepository, SourceHost};

use crate::errors::{Collaborator, CollaboratorError, TelegrammaError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Installs the process-wide rustls provider used by the HTTP clients.
///
/// Returns false when another provider was installed first; that one stays.
pub fn install_crypto_provider() -> bool {
    match rustls::crypto::ring::default_provider().install_default() {
        Ok(()) => {
            debug!("Installed ring crypto provider");
            true
        }
        Err(_) => {
            warn!("A rustls crypto provider was already installed, keeping it");
            false
        }
    }
}

/// The collaborators one device tree workflow needs.
#[derive(Clone)]
pub struct CollaboratorSet {
    /// Image download source.
    pub downloader: Arc<dyn Downloader>,
    /// Device tree generator.
    pub generator: Arc<dyn DeviceTreeGenerator>,
    /// Repository host.
    pub host: Arc<dyn SourceHost>,
    /// Git transport.
    pub pusher: Arc<dyn VcsPusher>,
}

impl std::fmt::Debug for CollaboratorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaboratorSet").finish_non_exhaustive()
    }
}

impl CollaboratorSet {
    /// Builds the production collaborators: `reqwest`, the `twrpdtgen`
    /// Python library, GitHub and libgit2.
    pub fn production(credentials: &GithubCredentials) -> Result<Self, TelegrammaError> {
        let downloader = HttpDownloader::new()
            .map_err(|e| CollaboratorError::new(Collaborator::Download, e.to_string()))?;
        let host = GithubHost::new(&credentials.token)
            .map_err(|e| CollaboratorError::new(Collaborator::SourceHost, e.to_string()))?;

        Ok(Self {
            downloader: Arc::new(downloader),
            generator: Arc::new(PythonTwrpdtgen::new()),
            host: Arc::new(host),
            pusher: Arc::new(Git2Pusher),
        })
    }
}

#[cfg(test)]
pub use devicetree::MockDeviceTreeGenerator;
#[cfg(test)]
pub use download::MockDownloader;
#[cfg(test)]
pub use git::MockVcsPusher;
#[cfg(test)]
pub use github::MockSourceHost;
