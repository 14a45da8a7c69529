//! Restart contract
//!
//! Last-resort fallback when guided recovery fails. The bundled
//! implementation runs a configured command such as
//! `["docker", "restart", "{container}"]`.

use async_trait::async_trait;
use std::time::Duration;

use crate::topology::ServiceEntry;

/// Upper bound on a single restart command
const RESTART_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("no restart supervisor configured")]
    NotConfigured,
    #[error("failed to launch restart command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("restart command timed out after {0:?}")]
    Timeout(Duration),
    #[error("restart command exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

#[async_trait]
pub trait RestartSupervisor: Send + Sync {
    async fn restart(&self, service: &str, entry: &ServiceEntry) -> Result<(), SupervisorError>;
}

/// Runs `restart_command` with `{container}` and `{service}` substituted.
#[derive(Debug, Clone, Default)]
pub struct CommandSupervisor {
    command: Option<Vec<String>>,
}

impl CommandSupervisor {
    pub fn new(command: Option<Vec<String>>) -> Self {
        Self {
            command: command.filter(|c| !c.is_empty()),
        }
    }

    fn render(&self, service: &str, entry: &ServiceEntry) -> Option<Vec<String>> {
        let container = entry.container.as_deref().unwrap_or(service);
        self.command.as_ref().map(|parts| {
            parts
                .iter()
                .map(|p| p.replace("{container}", container).replace("{service}", service))
                .collect()
        })
    }
}

#[async_trait]
impl RestartSupervisor for CommandSupervisor {
    async fn restart(&self, service: &str, entry: &ServiceEntry) -> Result<(), SupervisorError> {
        let argv = self.render(service, entry).ok_or(SupervisorError::NotConfigured)?;
        let (program, args) = argv.split_first().ok_or(SupervisorError::NotConfigured)?;

        tracing::info!(service = %service, command = %argv.join(" "), "Running restart command");
        let mut command = tokio::process::Command::new(program);
        command.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(RESTART_COMMAND_TIMEOUT, command.output())
            .await
            .map_err(|_| SupervisorError::Timeout(RESTART_COMMAND_TIMEOUT))??;

        if output.status.success() {
            Ok(())
        } else {
            Err(SupervisorError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_container_and_service() {
        let supervisor = CommandSupervisor::new(Some(vec![
            "docker".into(),
            "restart".into(),
            "{container}".into(),
            "--label={service}".into(),
        ]));
        let mut entry = ServiceEntry::new("http://x", &[], false);
        assert_eq!(
            supervisor.render("coin", &entry).unwrap(),
            vec!["docker", "restart", "coin", "--label=coin"]
        );
        entry.container = Some("azora-coin".into());
        assert_eq!(supervisor.render("coin", &entry).unwrap()[2], "azora-coin");
    }

    #[tokio::test]
    async fn test_unconfigured_supervisor_errors() {
        let entry = ServiceEntry::new("http://x", &[], false);
        let err = CommandSupervisor::new(None).restart("coin", &entry).await.unwrap_err();
        assert!(matches!(err, SupervisorError::NotConfigured));
        let err = CommandSupervisor::new(Some(vec![]))
            .restart("coin", &entry)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::NotConfigured));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_exit_status() {
        let entry = ServiceEntry::new("http://x", &[], false);
        assert!(CommandSupervisor::new(Some(vec!["true".into()]))
            .restart("coin", &entry)
            .await
            .is_ok());
        let err = CommandSupervisor::new(Some(vec!["false".into()]))
            .restart("coin", &entry)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Failed { .. }));
    }
}
