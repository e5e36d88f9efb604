use std::process::ExitCode;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::{
    action::{gh_cfg, render_and_post, CommentJob},
    integrations::github::{OctocrabComments, PostedComment},
    settings::Settings,
};

mod action;
mod integrations;
mod report;
mod repository;
mod settings;
mod template;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(posted) => {
            debug!("Created comment {}", posted.id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report::set_failed(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run() -> action::Result<PostedComment> {
    let settings = Settings::new()?;
    let job = CommentJob::from_settings(&settings)?;
    info!(
        "Using templates from '{}' then '{}'",
        job.builtin_templates.display(),
        job.workspace.display()
    );

    let comments = OctocrabComments::new(&gh_cfg(&settings)?)?;
    render_and_post(&job, &comments).await
}
