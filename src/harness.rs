// Capture entry point: stage a program, run the helper under a pty, collect
// everything it draws

use std::ffi::OsString;
use std::future::Future;
use std::io::Write;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::interaction::Interaction;
use crate::program::SnapshotProgram;
use crate::pty::{PtySession, RunningSession};
use crate::snapshot::Snapshot;

#[derive(Debug, Clone)]
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Harness { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Same helper and environment, different terminal dimensions.
    pub fn sized(&self, rows: u16, cols: u16) -> Harness {
        Harness::new(self.config.clone().size(rows, cols))
    }

    /// Run `program` to completion and return everything it wrote.
    pub async fn capture(&self, program: &SnapshotProgram) -> Result<Snapshot> {
        let (session, _staged) = self.launch(program)?;
        session.capture().await
    }

    /// Like `capture`, with `interactions` driving the session while it runs.
    pub async fn capture_with<F, Fut>(&self, program: &SnapshotProgram, interactions: F) -> Result<Snapshot>
    where
        F: FnOnce(Interaction) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (session, _staged) = self.launch(program)?;
        session.capture_with(interactions).await
    }

    /// The staged file must outlive the helper; callers hold it until the
    /// capture completes.
    fn launch(&self, program: &SnapshotProgram) -> Result<(RunningSession, NamedTempFile)> {
        let staged = stage(program)?;
        let term = program.term.as_deref().unwrap_or(&self.config.term);

        let envs: Vec<(OsString, OsString)> = vec![
            (self.config.script_env.clone().into(), staged.path().as_os_str().to_owned()),
            ("TERM".into(), term.into()),
        ];

        debug!(path = %staged.path().display(), term, "staged program");

        let session = PtySession::open(self.config.rows, self.config.cols)?;
        let running = session.spawn(&self.config.helper, envs)?;
        Ok((running, staged))
    }
}

fn stage(program: &SnapshotProgram) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("ptysnap-")
        .suffix(".json")
        .tempfile()
        .map_err(Error::Stage)?;
    serde_json::to_writer(&mut file, program).map_err(|e| Error::Stage(e.into()))?;
    file.flush().map_err(Error::Stage)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HelperCommand;
    use crate::program::ProgramBuilder;
    use std::path::Path;

    fn sh(script: &str) -> Harness {
        Harness::new(HarnessConfig::new(HelperCommand::new("sh").arg("-c").arg(script)))
    }

    #[tokio::test]
    async fn test_helper_reads_staged_program() {
        let harness = sh("stty -onlcr; cat \"$PTYSNAP_SCRIPT\"");
        let program = ProgramBuilder::new().flush().build();
        let snapshot = harness.capture(&program).await.unwrap();
        let decoded: SnapshotProgram = serde_json::from_slice(snapshot.bytes()).unwrap();
        assert_eq!(decoded, program);
    }

    #[tokio::test]
    async fn test_term_defaults_and_program_override() {
        let harness = sh("printf '[%s]' \"$TERM\"");
        let plain = harness.capture(&SnapshotProgram::default()).await.unwrap();
        assert_eq!(plain.utf8_lossy(), "[xterm-256color]");

        let program = ProgramBuilder::new().term("vt100").build();
        let overridden = harness.capture(&program).await.unwrap();
        assert_eq!(overridden.utf8_lossy(), "[vt100]");
    }

    #[tokio::test]
    async fn test_staged_file_is_removed() {
        let harness = sh("printf %s \"$PTYSNAP_SCRIPT\"");
        let snapshot = harness.capture(&SnapshotProgram::default()).await.unwrap();
        let path = snapshot.utf8_lossy();
        assert!(path.ends_with(".json"), "got: {:?}", path);
        assert!(!Path::new(&path).exists());
    }

    #[tokio::test]
    async fn test_sized_overrides_dimensions() {
        let harness = sh("stty size").sized(7, 33);
        assert_eq!((harness.config().rows, harness.config().cols), (7, 33));
        let snapshot = harness.capture(&SnapshotProgram::default()).await.unwrap();
        assert_eq!((snapshot.rows(), snapshot.cols()), (7, 33));
        assert!(snapshot.utf8_lossy().starts_with("7 33"));
    }

    #[tokio::test]
    async fn test_custom_script_env() {
        let config = HarnessConfig::new(HelperCommand::new("sh").arg("-c").arg("test -n \"$OTHER_SCRIPT\""))
            .script_env("OTHER_SCRIPT");
        Harness::new(config).capture(&SnapshotProgram::default()).await.unwrap();
    }
}
