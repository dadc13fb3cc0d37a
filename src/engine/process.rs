use super::{EngineAdapter, EngineRequest, EngineResponse, RunRequest, RunResult};
use crate::config::EngineConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Engine running as a child process, one JSON message per line each way.
pub struct ProcessEngine {
    command: String,
    args: Vec<String>,
    conn: Option<Connection>,
}

struct Connection {
    // Held so the child is killed when the engine is dropped.
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl ProcessEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            conn: None,
        }
    }

    fn spawn(&self) -> Result<Connection> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start engine process `{}`", self.command))?;

        let stdin = child.stdin.take().context("engine stdin not captured")?;
        let stdout = child.stdout.take().context("engine stdout not captured")?;
        Ok(Connection {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn exchange(&mut self, request: &EngineRequest) -> Result<EngineResponse> {
        let conn = self.conn.as_mut().context("engine process not started")?;

        let mut line = serde_json::to_string(request).context("failed to encode engine request")?;
        line.push('\n');
        conn.stdin
            .write_all(line.as_bytes())
            .await
            .context("failed to write to engine process")?;
        conn.stdin.flush().await?;

        let reply = conn
            .stdout
            .next_line()
            .await
            .context("failed to read from engine process")?
            .context("engine process closed its output")?;
        serde_json::from_str(&reply).with_context(|| format!("malformed engine response: {}", truncate(&reply, 120)))
    }
}

#[async_trait]
impl EngineAdapter for ProcessEngine {
    async fn init(&mut self) -> Result<()> {
        self.conn = Some(self.spawn()?);
        tracing::info!(command = %self.command, "engine process started");
        match self.exchange(&EngineRequest::Init).await? {
            EngineResponse::Ready => Ok(()),
            EngineResponse::Error { message } => anyhow::bail!(message),
            other => anyhow::bail!("unexpected engine reply to init: {:?}", other),
        }
    }

    async fn run(&mut self, request: RunRequest) -> Result<RunResult> {
        match self.exchange(&EngineRequest::Run(request)).await? {
            EngineResponse::Result(result) => Ok(result),
            EngineResponse::Error { message } => anyhow::bail!(message),
            EngineResponse::Ready => anyhow::bail!("unexpected engine reply to run: ready"),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("héllo", 2), "hé");
    }

    #[tokio::test]
    async fn test_missing_binary_fails_init() {
        let mut engine = ProcessEngine::new(&EngineConfig {
            command: "/nonexistent/scrubchef-engine".to_string(),
            args: Vec::new(),
        });
        let err = engine.init().await.unwrap_err();
        assert!(format!("{:#}", err).contains("failed to start engine process"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_line_protocol_against_shell_engine() {
        // Replies ready to the first line, then a fixed result.
        let script = r#"read l; echo '{"op":"ready"}'; read l; echo '{"op":"result","output":"<EMAIL_1>","map":{"meta":{},"canonical":{}},"diffOriginal":"","diffModified":""}'"#;
        let mut engine = ProcessEngine::new(&EngineConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        });
        engine.init().await.unwrap();
        let result = engine
            .run(RunRequest {
                input: "a@b.io".to_string(),
                config: crate::normalize::PipelineConfig::empty(),
                inspect_target: None,
            })
            .await
            .unwrap();
        assert_eq!(result.output, "<EMAIL_1>");
    }
}
