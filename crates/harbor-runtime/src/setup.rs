//! Shorthand setup: files, git clone, install, commands.
//!
//! Steps run in that order. The first non-zero exit aborts setup with
//! [`HarborError::Setup`] naming the step.

use harbor_core::{HarborError, SetupStep};
use harbor_sandbox::{Command, CommandOutput, SandboxFile};
use tracing::{debug, info, warn};

use crate::hooks::SandboxScope;

/// Repository to clone into the context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitClone {
    /// Clone URL.
    pub url: String,
    /// Branch or tag to check out.
    pub branch: Option<String>,
    /// Destination, relative to the working directory. Defaults to the
    /// working directory itself.
    pub destination: Option<String>,
    /// Shallow-clone depth.
    pub depth: Option<u32>,
}

impl GitClone {
    /// Clone `url` at its default branch.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: None,
            destination: None,
            depth: Some(1),
        }
    }

    /// Check out `branch`.
    #[must_use]
    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Clone into `destination`.
    #[must_use]
    pub fn into_dir(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    fn command(&self) -> Command {
        let mut args = vec!["clone".to_owned()];
        if let Some(depth) = self.depth {
            args.push("--depth".into());
            args.push(depth.to_string());
        }
        if let Some(branch) = &self.branch {
            args.push("--branch".into());
            args.push(branch.clone());
        }
        args.push(self.url.clone());
        args.push(self.destination.clone().unwrap_or_else(|| ".".into()));
        Command::new("git", args)
    }
}

/// Declarative setup applied before the first turn.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetupOptions {
    /// Files to write.
    pub files: Vec<SandboxFile>,
    /// Repository to clone.
    pub git: Option<GitClone>,
    /// Package-install command line (`npm ci`, `pip install -r ...`).
    pub install: Option<String>,
    /// Further command lines, run in order.
    pub commands: Vec<String>,
}

impl SetupOptions {
    /// Whether there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.git.is_none() && self.install.is_none() && self.commands.is_empty()
    }
}

fn check(step: SetupStep, output: CommandOutput) -> Result<(), HarborError> {
    if output.success() {
        return Ok(());
    }
    warn!(step = %step, exit_code = output.exit_code, "setup step failed");
    let stderr = if output.stderr.trim().is_empty() {
        output.stdout
    } else {
        output.stderr
    };
    Err(HarborError::Setup {
        step,
        exit_code: output.exit_code,
        stderr,
    })
}

/// Apply `setup` inside `scope`.
pub async fn run_setup(scope: &SandboxScope, setup: &SetupOptions) -> Result<(), HarborError> {
    if setup.is_empty() {
        return Ok(());
    }

    if !setup.files.is_empty() {
        debug!(count = setup.files.len(), "writing setup files");
        scope
            .write_files(&setup.files)
            .await
            .map_err(|e| HarborError::Setup {
                step: SetupStep::Files,
                exit_code: -1,
                stderr: e.to_string(),
            })?;
    }

    if let Some(git) = &setup.git {
        info!(url = %git.url, branch = ?git.branch, "cloning repository");
        check(SetupStep::GitClone, scope.run_command(git.command()).await?)?;
    }

    if let Some(install) = &setup.install {
        info!(command = %install, "installing packages");
        check(SetupStep::Install, scope.run(install.as_str()).await?)?;
    }

    for (index, command) in setup.commands.iter().enumerate() {
        debug!(index, command = %command, "running setup command");
        check(
            SetupStep::Command {
                index,
                command: command.clone(),
            },
            scope.run(command.as_str()).await?,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use harbor_sandbox::{SandboxOptions, SandboxProvider, ScriptedSandboxProvider};

    async fn scope(provider: &ScriptedSandboxProvider) -> SandboxScope {
        let sandbox = provider.create(&SandboxOptions::default()).await.unwrap();
        SandboxScope::new(sandbox, "/app")
    }

    fn full_setup() -> SetupOptions {
        SetupOptions {
            files: vec![SandboxFile::new("/app/.env", "MODE=test")],
            git: Some(GitClone::new("https://example.com/repo.git").branch("dev").into_dir("repo")),
            install: Some("npm ci".into()),
            commands: vec!["npm run build".into(), "npm test".into()],
        }
    }

    #[tokio::test]
    async fn runs_steps_in_order() {
        let provider = ScriptedSandboxProvider::new();
        run_setup(&scope(&provider).await, &full_setup()).await.unwrap();
        assert_eq!(provider.file("/app/.env"), Some(b"MODE=test".to_vec()));
        assert_eq!(
            provider.command_lines(),
            vec![
                "git clone --depth 1 --branch dev https://example.com/repo.git repo",
                "npm ci",
                "npm run build",
                "npm test",
            ]
        );
        assert!(provider.commands().iter().all(|c| c.cwd.as_deref() == Some("/app")));
    }

    #[tokio::test]
    async fn empty_setup_runs_nothing() {
        let provider = ScriptedSandboxProvider::new();
        run_setup(&scope(&provider).await, &SetupOptions::default()).await.unwrap();
        assert!(provider.commands().is_empty());
    }

    #[tokio::test]
    async fn clone_failure_names_step() {
        let provider = ScriptedSandboxProvider::new()
            .with_command_result("git clone", CommandOutput::failed(128, "repository not found"));
        let err = run_setup(&scope(&provider).await, &full_setup()).await.unwrap_err();
        assert_matches!(
            err,
            HarborError::Setup { step: SetupStep::GitClone, exit_code: 128, ref stderr } if stderr == "repository not found"
        );
        assert_eq!(provider.command_lines().len(), 1);
    }

    #[tokio::test]
    async fn failing_command_stops_the_rest() {
        let provider = ScriptedSandboxProvider::new()
            .with_command_result("npm run build", CommandOutput::failed(2, "tsc error"));
        let err = run_setup(&scope(&provider).await, &full_setup()).await.unwrap_err();
        assert_matches!(
            err,
            HarborError::Setup { step: SetupStep::Command { index: 0, ref command }, exit_code: 2, .. }
                if command == "npm run build"
        );
        assert!(!provider.command_lines().contains(&"npm test".to_owned()));
    }

    #[tokio::test]
    async fn install_failure_falls_back_to_stdout() {
        let provider = ScriptedSandboxProvider::new().with_command_result(
            "npm ci",
            CommandOutput {
                exit_code: 1,
                stdout: "npm ERR! missing lockfile".into(),
                stderr: String::new(),
            },
        );
        let err = run_setup(&scope(&provider).await, &full_setup()).await.unwrap_err();
        assert_matches!(
            err,
            HarborError::Setup { step: SetupStep::Install, ref stderr, .. } if stderr.contains("lockfile")
        );
    }
}
