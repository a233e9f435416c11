use std::fmt;

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/// Platform-assigned identifier, some deployments use integers and some use strings
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PlatformId {
    Int(i64),
    Text(String),
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PlatformId::Int(id) => write!(f, "{id}"),
            PlatformId::Text(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RemoteRun {
    pub id: PlatformId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RemoteSample {
    pub id: PlatformId,
    pub name: String,
}

/// Only the id of an uploaded attachment is needed, other fields are ignored
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RemoteAttachment {
    pub id: PlatformId,
}

/// List endpoints answer with a plain array or a paginated `{"results": [...]}` object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Plain(Vec<T>),
    Page { results: Vec<T> },
}

impl<T> Listing<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Plain(items) => items,
            Listing::Page { results } => results,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NewRun<'a> {
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct NewSampleLink<'a> {
    pub attachment: &'a PlatformId,
}

/// A request the platform answered with a non-success status
#[derive(Debug)]
pub struct PlatformError {
    pub method: Method,
    pub url: Url,
    pub status: StatusCode,
    pub body: String,
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} returned {}", self.method, self.url, self.status)?;
        if !self.body.is_empty() {
            write!(f, ": {}", self.body)?;
        }
        Ok(())
    }
}

impl std::error::Error for PlatformError {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_accept_numbers_and_strings() {
        let run: RemoteRun = serde_json::from_value(json!({"id": 42, "name": "run1"})).unwrap();
        assert_eq!(run.id, PlatformId::Int(42));
        let run: RemoteRun = serde_json::from_value(json!({"id": "a1b2", "name": "run1", "created": "x"})).unwrap();
        assert_eq!(run.id.to_string(), "a1b2");
    }

    #[test]
    fn ids_serialise_in_their_original_form() {
        let link = NewSampleLink { attachment: &PlatformId::Int(7) };
        assert_eq!(serde_json::to_value(link).unwrap(), json!({"attachment": 7}));
    }

    #[test]
    fn listings_may_be_paginated() {
        let plain: Listing<RemoteSample> = serde_json::from_value(json!([{"id": 1, "name": "S1"}])).unwrap();
        assert_eq!(plain.into_vec().len(), 1);

        let page: Listing<RemoteSample> = serde_json::from_value(json!({
            "count": 2, "next": null, "results": [{"id": 1, "name": "S1"}, {"id": 2, "name": "S2"}]
        })).unwrap();
        assert_eq!(page.into_vec()[1].name, "S2");
    }

    #[test]
    fn error_message_includes_status_and_body() {
        let err = PlatformError {
            method: Method::POST,
            url: Url::parse("https://platform.example.org/runs").unwrap(),
            status: StatusCode::BAD_REQUEST,
            body: "{\"name\": [\"required\"]}".to_string(),
        };
        assert_eq!(err.to_string(),
            "POST https://platform.example.org/runs returned 400 Bad Request: {\"name\": [\"required\"]}");
    }
}
