pub mod inspect;
pub mod process;

use crate::canonical::CanonicalMap;
use crate::normalize::PipelineConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Messages sent to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum EngineRequest {
    Init,
    Run(RunRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub input: String,
    pub config: PipelineConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspect_target: Option<String>,
}

/// Messages the engine sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum EngineResponse {
    Ready,
    Result(RunResult),
    Error { message: String },
}

/// Output of one dispatch. `output` and `map` always come from the same
/// full-pipeline run; the diff fields are empty unless inspecting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub output: String,
    #[serde(default)]
    pub map: CanonicalMap,
    #[serde(default)]
    pub diff_original: String,
    #[serde(default)]
    pub diff_modified: String,
}

/// The external transformation engine.
#[async_trait]
pub trait EngineAdapter: Send {
    async fn init(&mut self) -> Result<()>;
    async fn run(&mut self, request: RunRequest) -> Result<RunResult>;
}

/// Channels to an engine running on its own task.
pub struct EngineHandle {
    pub requests: mpsc::Sender<EngineRequest>,
    pub responses: mpsc::Receiver<EngineResponse>,
    pub task: JoinHandle<()>,
}

/// Move `engine` onto a dedicated task that answers requests in order.
pub fn spawn_worker<E>(engine: E) -> EngineHandle
where
    E: EngineAdapter + 'static,
{
    let (req_tx, req_rx) = mpsc::channel(4);
    let (resp_tx, resp_rx) = mpsc::channel(4);
    let task = tokio::spawn(worker_loop(engine, req_rx, resp_tx));
    EngineHandle {
        requests: req_tx,
        responses: resp_rx,
        task,
    }
}

async fn worker_loop<E: EngineAdapter>(
    mut engine: E,
    mut requests: mpsc::Receiver<EngineRequest>,
    responses: mpsc::Sender<EngineResponse>,
) {
    let mut initialized = false;
    while let Some(request) = requests.recv().await {
        let response = match request {
            EngineRequest::Init => match engine.init().await {
                Ok(()) => {
                    initialized = true;
                    tracing::info!("engine ready");
                    EngineResponse::Ready
                }
                Err(e) => {
                    tracing::error!("engine init failed: {:#}", e);
                    EngineResponse::Error {
                        message: format!("Failed to initialize engine: {:#}", e),
                    }
                }
            },
            EngineRequest::Run(_) if !initialized => EngineResponse::Error {
                message: "engine not initialized".to_string(),
            },
            EngineRequest::Run(run) => {
                let steps = run.config.steps.len();
                match engine.run(run).await {
                    Ok(result) => {
                        tracing::debug!(steps, output_len = result.output.len(), "engine run complete");
                        EngineResponse::Result(result)
                    }
                    Err(e) => {
                        tracing::warn!(steps, "engine run failed: {:#}", e);
                        EngineResponse::Error {
                            message: format!("{:#}", e),
                        }
                    }
                }
            }
        };
        if responses.send(response).await.is_err() {
            break;
        }
    }
    tracing::debug!("engine worker stopped");
}
