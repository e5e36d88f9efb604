use async_trait::async_trait;
use octocrab::Octocrab;
use tracing::debug;

use crate::repository::Repository;

/// Minimal GitHub config for posting comments.
#[derive(Clone, Debug)]
pub struct GhCfg {
    pub token: String,           // PAT / Actions token
    pub api_url: Option<String>, // e.g. "https://ghe.example.com/api/v3"
}

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("failed to build GitHub client: {0}")]
    Client(#[source] octocrab::Error),
    #[error("GitHub API request failed: {0}")]
    Api(#[source] octocrab::Error),
}

/// A comment as created on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedComment {
    pub id: u64,
    pub html_url: String,
}

#[async_trait]
pub trait IssueComments: Send + Sync {
    async fn create_comment(
        &self,
        repo: &Repository,
        issue_number: u64,
        body: &str,
    ) -> Result<PostedComment, GitHubError>;
}

pub struct OctocrabComments {
    octo: Octocrab,
}

impl OctocrabComments {
    pub fn new(cfg: &GhCfg) -> Result<Self, GitHubError> {
        let mut builder = octocrab::OctocrabBuilder::default().personal_token(cfg.token.clone());

        if let Some(api_url) = cfg.api_url.as_deref().filter(|u| !u.is_empty()) {
            debug!("Using GitHub API at {api_url}");
            builder = builder.base_uri(api_url).map_err(GitHubError::Client)?;
        }

        let octo = builder.build().map_err(GitHubError::Client)?;
        Ok(Self { octo })
    }
}

#[async_trait]
impl IssueComments for OctocrabComments {
    async fn create_comment(
        &self,
        repo: &Repository,
        issue_number: u64,
        body: &str,
    ) -> Result<PostedComment, GitHubError> {
        let comment = self
            .octo
            .issues(&repo.owner, &repo.name)
            .create_comment(issue_number, body)
            .await
            .map_err(GitHubError::Api)?;

        Ok(PostedComment {
            id: comment.id.into_inner(),
            html_url: comment.html_url.to_string(),
        })
    }
}
