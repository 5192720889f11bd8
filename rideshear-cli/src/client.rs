use std::fs;
use std::io;
use std::path::Path;

use colored::*;
use reqwest::Url;
use rideshear_rules::{
    DocumentPath, EvaluationRequest, EvaluationResponse, Fields, InMemoryStore, RuleSummary,
};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("policy service returned an error: {0}")]
    Service(String),
    #[error("could not read {path}: {message}")]
    Input { path: String, message: String },
    #[error("{0}")]
    Validation(String),
}

impl From<reqwest::Error> for CliError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

/// Thin client for a running `rideshear serve` instance.
pub struct PolicyClient {
    base_url: Url,
    http: reqwest::Client,
}

impl PolicyClient {
    pub fn new(base_url: &str) -> Result<Self, CliError> {
        let url = Url::parse(base_url)
            .map_err(|err| CliError::Validation(format!("invalid server URL: {err}")))?;
        Ok(Self {
            base_url: url,
            http: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CliError> {
        self.base_url
            .join(path)
            .map_err(|err| CliError::Validation(format!("invalid path: {err}")))
    }

    pub async fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResponse, CliError> {
        let url = self.endpoint("/evaluate")?;
        let response = self.http.post(url).json(request).send().await?;
        parse_response(response).await
    }

    pub async fn policies(&self) -> Result<Vec<RuleSummary>, CliError> {
        let url = self.endpoint("/policies")?;
        let response = self.http.get(url).send().await?;
        parse_response(response).await
    }
}

async fn parse_response<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, CliError> {
    if response.status().is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| CliError::Http(err.to_string()))
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ServiceError>(&body) {
            Ok(err) => Err(CliError::Service(format!("{status}: {}", err.message))),
            Err(_) => Err(CliError::Service(format!("{status}: {body}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    message: String,
}

/// Parses a JSON object given inline or as `@file`.
pub fn parse_fields(raw: &str) -> Result<Fields, CliError> {
    let (origin, text) = match raw.strip_prefix('@') {
        Some(file) => (file.to_string(), read_file(Path::new(file))?),
        None => ("<inline>".to_string(), raw.to_string()),
    };
    serde_json::from_str::<Fields>(&text).map_err(|err| CliError::Input {
        path: origin,
        message: err.to_string(),
    })
}

/// Loads a seed file shaped `{ "rides/r1": { ... }, ... }` into a store.
pub fn load_seed(path: &Path, store: &InMemoryStore) -> Result<usize, CliError> {
    let raw = read_file(path)?;
    let documents: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&raw).map_err(|err| CliError::Input {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

    let mut count = 0;
    for (key, value) in documents {
        let document = DocumentPath::parse(&key).map_err(|err| CliError::Validation(err.to_string()))?;
        let fields = value.as_object().cloned().ok_or_else(|| {
            CliError::Validation(format!("seed entry {key} is not an object"))
        })?;
        store.put(document, fields);
        count += 1;
    }
    Ok(count)
}

fn read_file(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|err: io::Error| CliError::Input {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

pub fn print_verdict(response: &EvaluationResponse, request: &EvaluationRequest) {
    let target = format!("{} {}", request.operation, request.path);
    if response.allowed {
        println!("{} {}", "✔ allowed:".green().bold(), target.bold());
    } else {
        println!("{} {}", "✘ denied:".red().bold(), target.bold());
        println!("  {}", response.message);
    }
    if let Some(reason) = &response.reason {
        println!("  reason: {}", reason.dimmed());
    }
}

pub fn print_rules(rules: &[RuleSummary]) {
    for rule in rules {
        println!("{} {}", rule.operation.to_string().cyan().bold(), rule.pattern.bold());
        println!("  {}", rule.predicate);
        if let Some(description) = &rule.description {
            println!("  {}", description.dimmed());
        }
    }
}
