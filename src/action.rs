use std::{num::ParseIntError, path::PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::{
    integrations::github::{GhCfg, GitHubError, IssueComments, PostedComment},
    repository::{InvalidRepository, Repository},
    settings::Settings,
    template::{SearchPath, TemplateError, TemplateRenderer},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("input required and not supplied: {0}")]
    MissingInput(&'static str),
    #[error("invalid issue number '{value}': {source}")]
    InvalidIssueNumber {
        value: String,
        source: ParseIntError,
    },
    #[error(transparent)]
    InvalidRepository(#[from] InvalidRepository),
    #[error("invalid JSON in 'result' input: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    GitHub(#[from] GitHubError),
}

/// Everything needed to render and post one comment, validated up front.
#[derive(Debug, Clone)]
pub struct CommentJob {
    pub repository: Repository,
    pub issue_number: u64,
    pub template_path: String,
    pub payload: Option<Value>,
    pub builtin_templates: PathBuf,
    pub workspace: PathBuf,
}

impl CommentJob {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let inputs = &settings.inputs;

        let template_path = required(&inputs.template_path, "template-path")?.to_string();

        let issue_number = required(&inputs.issue_number, "issue-number")?;
        let issue_number = issue_number
            .trim()
            .parse::<u64>()
            .map_err(|source| Error::InvalidIssueNumber {
                value: issue_number.to_string(),
                source,
            })?;

        let repository =
            required(&settings.runner.repository, "GITHUB_REPOSITORY")?.parse::<Repository>()?;

        let payload = match inputs.result.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(serde_json::from_str::<Value>(raw)?),
            _ => None,
        };

        Ok(Self {
            repository,
            issue_number,
            template_path,
            payload,
            builtin_templates: settings.builtin_templates(),
            workspace: settings.workspace(),
        })
    }

    pub fn search_path(&self) -> SearchPath {
        SearchPath::new(&self.builtin_templates, &self.workspace)
    }
}

/// Reads the credential and API location for the GitHub client.
pub fn gh_cfg(settings: &Settings) -> Result<GhCfg> {
    Ok(GhCfg {
        token: required(&settings.inputs.github_token, "github-token")?.to_string(),
        api_url: settings.runner.api_url.clone(),
    })
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(Error::MissingInput(name))
}

/// Renders the job's template and posts it as a single comment.
pub async fn render_and_post<C: IssueComments + ?Sized>(
    job: &CommentJob,
    comments: &C,
) -> Result<PostedComment> {
    let renderer = TemplateRenderer::new(job.search_path());

    info!("Rendering template '{}'...", job.template_path);
    let body = renderer.render(&job.template_path, job.payload.as_ref())?;
    info!("Template rendered successfully.");
    debug!("Rendered comment body ({} bytes)", body.len());

    info!(
        "Posting comment on issue {} in repository '{}'...",
        job.issue_number, job.repository
    );
    let posted = comments
        .create_comment(&job.repository, job.issue_number, &body)
        .await?;
    info!("Comment posted successfully: {}", posted.html_url);

    Ok(posted)
}
