use std::{env, path::PathBuf};

use config::{Config, ConfigError, Environment, Map};
use serde_derive::Deserialize;
use tracing::debug;

/// Action inputs, as the runner exposes them through `INPUT_*` variables.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Inputs {
    #[serde(rename = "github-token")]
    pub github_token: Option<String>,
    #[serde(rename = "issue-number")]
    pub issue_number: Option<String>,
    pub result: Option<String>,
    #[serde(rename = "template-path")]
    pub template_path: Option<String>,
    #[serde(rename = "templates-dir")]
    pub templates_dir: Option<PathBuf>,
}

/// Context the runner provides through `GITHUB_*` variables.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Runner {
    pub workspace: Option<PathBuf>,
    pub repository: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub inputs: Inputs,
    pub runner: Runner,
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Reads settings from an explicit set of variables instead of the process
    /// environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<Map<String, String>>();
        Self::load(Some(vars))
    }

    fn load(vars: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let inputs = Config::builder()
            .add_source(Environment::with_prefix("INPUT").source(vars.clone()))
            .build()?
            .try_deserialize::<Inputs>()?;

        let runner = Config::builder()
            .add_source(Environment::with_prefix("GITHUB").source(vars))
            .build()?
            .try_deserialize::<Runner>()?;

        debug!(
            "Loaded inputs (template: {:?}, issue: {:?}) for repository {:?}",
            inputs.template_path, inputs.issue_number, runner.repository
        );

        Ok(Self { inputs, runner })
    }

    /// Workspace to search for templates, falling back to the working directory.
    pub fn workspace(&self) -> PathBuf {
        match &self.runner.workspace {
            Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
            _ => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Directory holding the templates shipped with the action.
    pub fn builtin_templates(&self) -> PathBuf {
        if let Some(dir) = self
            .inputs
            .templates_dir
            .as_ref()
            .filter(|d| !d.as_os_str().is_empty())
        {
            return dir.clone();
        }

        let exe_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));

        let sibling = exe_dir.join("..").join("templates");
        if sibling.is_dir() {
            sibling
        } else {
            exe_dir.join("templates")
        }
    }
}
