//! Subprocess text-generation bridge.
//!
//! Spawns an external bridge process (by default a Bun script that talks to
//! the model provider) and exchanges JSON-lines messages over its
//! stdin/stdout. The bridge owns the provider protocol; this side only
//! frames requests and matches responses.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use linkscout_shared::{BridgeConfig, LinkScoutError, Result};

use crate::backend::TextGenerator;

// ---------------------------------------------------------------------------
// Protocol types (mirroring the bridge script's schemas)
// ---------------------------------------------------------------------------

/// Request message sent to the bridge.
#[derive(Debug, serde::Serialize)]
#[serde(tag = "type")]
enum RequestMessage<'a> {
    #[serde(rename = "generate")]
    Generate {
        id: String,
        prompt: &'a str,
        model: &'a str,
    },
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Response message received from the bridge.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type")]
enum ResponseMessage {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "result")]
    Result { id: String, result: BridgeResult },
    #[serde(rename = "error")]
    Error {
        #[allow(dead_code)]
        id: String,
        error: String,
    },
}

/// Completion returned by the bridge.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BridgeResult {
    pub text: String,
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub latency_ms: u64,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How to launch the bridge process.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Program to run (e.g., "bun").
    pub command: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Working directory for the process.
    pub working_dir: String,
    /// Model ID sent with every request.
    pub model: String,
}

impl From<&BridgeConfig> for BridgeOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: vec!["run".into(), config.script.clone()],
            working_dir: config.working_dir.clone(),
            model: config.model.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Bridge handle
// ---------------------------------------------------------------------------

/// Handle to the spawned bridge subprocess.
struct BridgeHandle {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    request_counter: u64,
    closed: bool,
}

impl BridgeHandle {
    /// Wait for the bridge to send its "ready" message.
    async fn wait_for_ready(&mut self) -> Result<()> {
        let line = self.read_line().await?;

        let msg: ResponseMessage = serde_json::from_str(line.trim()).map_err(|e| {
            LinkScoutError::Backend(format!("invalid bridge ready message: {e} (got: {line})"))
        })?;

        match msg {
            ResponseMessage::Ready => {
                info!("bridge is ready");
                Ok(())
            }
            _ => Err(LinkScoutError::Backend(format!(
                "expected ready message, got: {line}"
            ))),
        }
    }

    /// Send one prompt and wait for its response.
    async fn send_prompt(&mut self, prompt: &str, model: &str) -> Result<BridgeResult> {
        if self.closed {
            return Err(LinkScoutError::Backend("bridge has been shut down".into()));
        }

        self.request_counter += 1;
        let id = format!("req-{}", self.request_counter);

        let request = RequestMessage::Generate {
            id: id.clone(),
            prompt,
            model,
        };
        self.write_message(&request).await?;

        let line = self.read_line().await?;
        let msg: ResponseMessage = serde_json::from_str(line.trim()).map_err(|e| {
            LinkScoutError::Backend(format!(
                "invalid bridge response: {e} (got: {})",
                truncate_chars(&line, 200)
            ))
        })?;

        match msg {
            ResponseMessage::Result {
                id: resp_id,
                result,
            } if resp_id == id => Ok(result),
            ResponseMessage::Result { id: resp_id, .. } => Err(LinkScoutError::Backend(format!(
                "bridge answered {resp_id} while waiting for {id}"
            ))),
            ResponseMessage::Error { id: _, error } => Err(LinkScoutError::Backend(error)),
            ResponseMessage::Ready => Err(LinkScoutError::Backend(
                "unexpected ready message during generation".into(),
            )),
        }
    }

    async fn write_message(&mut self, msg: &RequestMessage<'_>) -> Result<()> {
        let json = serde_json::to_string(msg).map_err(|e| {
            LinkScoutError::Backend(format!("failed to serialize request: {e}"))
        })?;

        self.stdin
            .write_all(format!("{json}\n").as_bytes())
            .await
            .map_err(|e| {
                LinkScoutError::Backend(format!("failed to write to bridge stdin: {e}"))
            })?;
        self.stdin
            .flush()
            .await
            .map_err(|e| LinkScoutError::Backend(format!("failed to flush bridge stdin: {e}")))
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .await
            .map_err(|e| LinkScoutError::Backend(format!("bridge read error: {e}")))?;

        if line.is_empty() {
            return Err(LinkScoutError::Backend(
                "bridge closed stdout unexpectedly".into(),
            ));
        }
        Ok(line)
    }

    /// Send shutdown and wait for the bridge to exit.
    async fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self.write_message(&RequestMessage::Shutdown).await {
            warn!(error = %e, "could not send shutdown to bridge");
        }

        match self.child.wait().await {
            Ok(status) => {
                info!(?status, "bridge exited");
                Ok(())
            }
            Err(e) => {
                warn!("bridge wait error: {e}");
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public backend
// ---------------------------------------------------------------------------

/// [`TextGenerator`] backed by a bridge subprocess.
///
/// Requests are serialized through a mutex: the bridge sees at most one
/// outstanding request.
pub struct BridgeBackend {
    handle: Mutex<BridgeHandle>,
    model: String,
}

impl BridgeBackend {
    /// Spawn the bridge and wait until it reports ready.
    pub async fn spawn(options: &BridgeOptions) -> Result<Self> {
        info!(cmd = %options.command, args = ?options.args, "spawning text-generation bridge");

        let mut child = Command::new(&options.command)
            .args(&options.args)
            .current_dir(&options.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Bridge logs go to parent stderr
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                LinkScoutError::Backend(format!(
                    "failed to spawn bridge: {e}. Is `{}` installed?",
                    options.command
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LinkScoutError::Backend("failed to capture bridge stdin".into()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LinkScoutError::Backend("failed to capture bridge stdout".into()))?;

        let mut handle = BridgeHandle {
            child,
            stdin,
            reader: BufReader::new(stdout),
            request_counter: 0,
            closed: false,
        };

        handle.wait_for_ready().await?;

        Ok(Self {
            handle: Mutex::new(handle),
            model: options.model.clone(),
        })
    }

    /// Ask the bridge to exit and wait for it. Later requests fail.
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.lock().await.shutdown().await
    }
}

#[async_trait::async_trait]
impl TextGenerator for BridgeBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut handle = self.handle.lock().await;
        let result = handle.send_prompt(prompt, &self.model).await?;

        debug!(
            model = %result.model,
            tokens_in = result.tokens_in,
            tokens_out = result.tokens_out,
            latency_ms = result.latency_ms,
            "bridge completion received"
        );

        Ok(result.text)
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
