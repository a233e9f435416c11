//! Remote bioinformatics platform API
//!
//! The pipeline only talks to the platform through the [`Platform`] trait. [`http::HttpPlatform`]
//! is the real REST client, tests use an in-memory fake.

use std::path::Path;

use anyhow::Result;

/// Resources returned by the platform
pub mod model;
/// REST client built on reqwest
pub mod http;
#[cfg(test)]
pub mod fake;

use model::{PlatformId, RemoteAttachment, RemoteRun, RemoteSample};

#[allow(async_fn_in_trait)]
pub trait Platform {
    /// Look up a run by exact name
    async fn find_run(&self, name: &str) -> Result<Option<RemoteRun>>;

    async fn create_run(&self, name: &str) -> Result<RemoteRun>;

    /// Upload a local file as an attachment of a run
    async fn upload_attachment(&self, run_id: &PlatformId, path: &Path) -> Result<RemoteAttachment>;

    /// Look up a sample by exact name
    async fn find_sample(&self, name: &str) -> Result<Option<RemoteSample>>;

    /// Associate an uploaded attachment with a sample
    async fn link_sample(&self, sample_id: &PlatformId, attachment_id: &PlatformId) -> Result<()>;
}
