//! In-memory platform used by pipeline and watcher tests

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Result};

use crate::platform::model::{PlatformId, RemoteAttachment, RemoteRun, RemoteSample};
use crate::platform::Platform;

#[derive(Default)]
pub struct FakeState {
    pub runs: Vec<RemoteRun>,
    pub samples: Vec<RemoteSample>,
    pub created: Vec<String>,
    /// (run id, uploaded file name)
    pub uploads: Vec<(PlatformId, String)>,
    /// (sample id, attachment id)
    pub links: Vec<(PlatformId, PlatformId)>,
    pub fail_upload_of: Option<String>,
    pub fail_links: bool,
    next_id: i64,
}

impl FakeState {
    fn next_id(&mut self) -> PlatformId {
        self.next_id += 1;
        PlatformId::Int(1000 + self.next_id)
    }
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn with_samples(names: &[&str]) -> FakePlatform {
        let fake = FakePlatform::default();
        {
            let mut state = fake.state();
            for (i, name) in names.iter().enumerate() {
                state.samples.push(RemoteSample { id: PlatformId::Int(i as i64 + 1), name: name.to_string() });
            }
        }
        fake
    }

    pub fn add_run(&self, id: i64, name: &str) {
        self.state().runs.push(RemoteRun { id: PlatformId::Int(id), name: name.to_string() });
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

impl Platform for FakePlatform {
    async fn find_run(&self, name: &str) -> Result<Option<RemoteRun>> {
        Ok(self.state().runs.iter().find(|r| r.name == name).cloned())
    }

    async fn create_run(&self, name: &str) -> Result<RemoteRun> {
        let mut state = self.state();
        let run = RemoteRun { id: state.next_id(), name: name.to_string() };
        state.runs.push(run.clone());
        state.created.push(name.to_string());
        Ok(run)
    }

    async fn upload_attachment(&self, run_id: &PlatformId, path: &Path) -> Result<RemoteAttachment> {
        let mut state = self.state();
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        if state.fail_upload_of.as_deref() == Some(file_name.as_str()) {
            bail!("upload of {file_name} rejected");
        }
        state.uploads.push((run_id.clone(), file_name));
        Ok(RemoteAttachment { id: state.next_id() })
    }

    async fn find_sample(&self, name: &str) -> Result<Option<RemoteSample>> {
        Ok(self.state().samples.iter().find(|s| s.name == name).cloned())
    }

    async fn link_sample(&self, sample_id: &PlatformId, attachment_id: &PlatformId) -> Result<()> {
        let mut state = self.state();
        if state.fail_links {
            bail!("linking rejected");
        }
        state.links.push((sample_id.clone(), attachment_id.clone()));
        Ok(())
    }
}
