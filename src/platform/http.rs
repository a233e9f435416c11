use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ApiConfig;
use crate::platform::model::{
    Listing, NewRun, NewSampleLink, PlatformError, PlatformId, RemoteAttachment, RemoteRun, RemoteSample,
};
use crate::platform::Platform;

/// REST client for the platform
///
/// Endpoints, relative to the configured base URL:
/// - `GET runs?name=` / `POST runs`
/// - `POST runs/{id}/attachments` (multipart, field `file`)
/// - `GET samples?name=`
/// - `POST samples/{id}/attachments`
pub struct HttpPlatform {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpPlatform {
    pub fn new(config: &ApiConfig) -> Result<HttpPlatform> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Can't build HTTP client")?;

        Ok(HttpPlatform {
            client,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        })
    }

    /// Append path segments to the base URL, each segment is percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Base URL {} can't take a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn search_endpoint(&self, collection: &str, name: &str) -> Result<Url> {
        let mut url = self.endpoint(&[collection])?;
        url.query_pairs_mut().append_pair("name", name);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and turn any non-success status into a [`PlatformError`]
    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!("{method} {url}");

        let response = self.client.execute(request).await
            .with_context(|| format!("{method} {url} failed"))?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(PlatformError { method, url, status, body }.into())
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.send(builder).await?;
        let url = response.url().clone();
        response.json::<T>().await.with_context(|| format!("Unexpected response body from {url}"))
    }
}

impl Platform for HttpPlatform {
    async fn find_run(&self, name: &str) -> Result<Option<RemoteRun>> {
        let url = self.search_endpoint("runs", name)?;
        let listing: Listing<RemoteRun> = self.send_json(self.request(Method::GET, url)).await?;
        Ok(exact_match(listing.into_vec(), name, |run| &run.name))
    }

    async fn create_run(&self, name: &str) -> Result<RemoteRun> {
        let url = self.endpoint(&["runs"])?;
        let builder = self.request(Method::POST, url).json(&NewRun { name });
        self.send_json(builder).await
    }

    async fn upload_attachment(&self, run_id: &PlatformId, path: &Path) -> Result<RemoteAttachment> {
        let file_name = path.file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Can't upload {}, file name isn't valid UTF-8", path.display()))?
            .to_string();
        let file = tokio::fs::File::open(path).await
            .with_context(|| format!("Can't open {}", path.display()))?;
        let size = file.metadata().await?.len();
        info!("Uploading {} ({size} bytes)", path.display());

        let part = Part::stream_with_length(Body::from(file), size)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        let url = self.endpoint(&["runs", &run_id.to_string(), "attachments"])?;
        self.send_json(self.request(Method::POST, url).multipart(form)).await
    }

    async fn find_sample(&self, name: &str) -> Result<Option<RemoteSample>> {
        let url = self.search_endpoint("samples", name)?;
        let listing: Listing<RemoteSample> = self.send_json(self.request(Method::GET, url)).await?;
        Ok(exact_match(listing.into_vec(), name, |sample| &sample.name))
    }

    async fn link_sample(&self, sample_id: &PlatformId, attachment_id: &PlatformId) -> Result<()> {
        let url = self.endpoint(&["samples", &sample_id.to_string(), "attachments"])?;
        let builder = self.request(Method::POST, url).json(&NewSampleLink { attachment: attachment_id });
        self.send(builder).await?;
        Ok(())
    }
}

/// Name filters on the platform may be fuzzy, only an exact name counts as a match
fn exact_match<T>(items: Vec<T>, name: &str, name_of: impl Fn(&T) -> &String) -> Option<T> {
    items.into_iter().find(|item| name_of(item) == name)
}
