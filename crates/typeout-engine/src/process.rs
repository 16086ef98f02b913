//! Child-process engine link.
//!
//! Commands are written to the child's stdin and notifications read from its
//! stdout, one JSON object per line (see [`typeout_core::protocol`]). The
//! child's stderr is inherited so engine diagnostics land next to ours.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use typeout_core::error::{Result, TypeoutError};
use typeout_core::protocol::{decode_event, encode_command, EngineCommand, EngineLink};

use crate::EventSender;

/// Outbound half of a line-oriented engine connection.
#[derive(Debug)]
pub struct ProcessLink {
    commands: mpsc::UnboundedSender<EngineCommand>,
    closed: Arc<AtomicBool>,
}

impl EngineLink for ProcessLink {
    fn send(&self, command: EngineCommand) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TypeoutError::EngineUnavailable(
                "engine connection is closed".to_string(),
            ));
        }
        let name = command.name();
        self.commands.send(command).map_err(|_| {
            TypeoutError::EngineUnavailable("engine command channel closed".to_string())
        })?;
        debug!(command = name, "Engine command queued");
        Ok(())
    }
}

impl ProcessLink {
    /// Wire a link over an arbitrary reader/writer pair.
    ///
    /// Returns the link plus the reader and writer tasks. The link reports
    /// closed once either side of the connection ends.
    pub fn connect<R, W>(
        reader: R,
        writer: W,
        events: EventSender,
    ) -> (Arc<ProcessLink>, JoinHandle<()>, JoinHandle<()>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_events(reader, events, Arc::clone(&closed)));
        let writer_task = tokio::spawn(write_commands(writer, command_rx, Arc::clone(&closed)));

        let link = Arc::new(ProcessLink { commands, closed });
        (link, reader_task, writer_task)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn write_commands<W>(
    mut writer: W,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    closed: Arc<AtomicBool>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = commands.recv().await {
        let line = match encode_command(&command) {
            Ok(line) => line,
            Err(e) => {
                warn!(command = command.name(), error = %e, "Failed to encode engine command");
                continue;
            }
        };

        if let Err(e) = write_line(&mut writer, &line).await {
            warn!(error = %e, "Engine stdin closed, dropping link");
            break;
        }
    }
    closed.store(true, Ordering::SeqCst);
    debug!("Engine writer stopped");
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

async fn read_events<R>(reader: R, events: EventSender, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match decode_event(&line) {
                    Ok(event) => {
                        if events.send(event).is_err() {
                            debug!("Event receiver dropped, stopping engine reader");
                            break;
                        }
                    }
                    Err(e) => warn!(line = %line, error = %e, "Skipping unreadable engine line"),
                }
            }
            Ok(None) => {
                info!("Typing engine closed its output");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read from typing engine");
                break;
            }
        }
    }
    closed.store(true, Ordering::SeqCst);
}

/// A typing engine running as a child process.
pub struct ProcessEngine {
    child: Child,
    link: Arc<ProcessLink>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl ProcessEngine {
    /// Launch `command` and connect to its stdio.
    pub fn spawn(command: &str, args: &[String], events: EventSender) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TypeoutError::Engine(format!("Failed to spawn typing engine '{}': {}", command, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TypeoutError::Engine("Engine stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TypeoutError::Engine("Engine stdout not captured".to_string()))?;

        let (link, reader_task, writer_task) = ProcessLink::connect(stdout, stdin, events);
        info!(command = %command, pid = ?child.id(), "Typing engine process started");

        Ok(Self {
            child,
            link,
            reader_task,
            writer_task,
        })
    }

    pub fn link(&self) -> Arc<ProcessLink> {
        Arc::clone(&self.link)
    }

    /// Stop the engine process and its I/O tasks.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill typing engine process");
        }
        self.reader_task.abort();
        self.writer_task.abort();
        info!("Typing engine process stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};
    use typeout_core::protocol::EngineEvent;

    #[tokio::test]
    async fn test_commands_written_as_json_lines() {
        let (client_w, engine_r) = duplex(1024);
        let (_engine_w, client_r) = duplex(1024);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (link, _reader, _writer) = ProcessLink::connect(client_r, client_w, events_tx);

        link.send(EngineCommand::Start {
            text: "hi".to_string(),
            lower_delay: 10,
            upper_delay: 20,
        })
        .unwrap();
        link.send(EngineCommand::Abort).unwrap();

        let mut lines = BufReader::new(engine_r).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(value["type"], "start");
        assert_eq!(value["lowerDelay"], 10);
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            r#"{"type":"abort"}"#
        );
    }

    #[tokio::test]
    async fn test_events_read_and_bad_lines_skipped() {
        let (client_w, _engine_r) = duplex(1024);
        let (mut engine_w, client_r) = duplex(1024);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (link, reader, _writer) = ProcessLink::connect(client_r, client_w, events_tx);

        engine_w
            .write_all(
                b"{\"type\":\"engine-started\"}\n\
                  garbage\n\
                  \n\
                  {\"type\":\"progress\",\"progress\":0.25,\"timeLeftMs\":900}\n",
            )
            .await
            .unwrap();

        assert_eq!(events_rx.recv().await, Some(EngineEvent::EngineStarted));
        assert_eq!(
            events_rx.recv().await,
            Some(EngineEvent::Progress {
                progress: 0.25,
                time_left_ms: 900
            })
        );

        drop(engine_w);
        reader.await.unwrap();
        assert!(link.is_closed());
        assert!(matches!(
            link.send(EngineCommand::Abort),
            Err(TypeoutError::EngineUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let result = ProcessEngine::spawn("/nonexistent/typeout-engine-binary", &[], events_tx);
        assert!(matches!(result, Err(TypeoutError::Engine(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_process_round_trip() {
        let script = r#"read cmd
case "$cmd" in
  *'"type":"start"'*) printf '%s\n' '{"type":"engine-started"}' '{"type":"progress","progress":1.0,"timeLeftMs":0}' ;;
esac"#;
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let engine = ProcessEngine::spawn(
            "sh",
            &["-c".to_string(), script.to_string()],
            events_tx,
        )
        .unwrap();

        engine
            .link()
            .send(EngineCommand::Start {
                text: "abc".to_string(),
                lower_delay: 1,
                upper_delay: 2,
            })
            .unwrap();

        assert_eq!(events_rx.recv().await, Some(EngineEvent::EngineStarted));
        assert_eq!(
            events_rx.recv().await,
            Some(EngineEvent::Progress {
                progress: 1.0,
                time_left_ms: 0
            })
        );
        engine.shutdown().await;
    }
}
