//! The protocol engine task.
//!
//! One tokio task owns the write half of the transport, the stream of framed
//! lines, and the submission queue. A second task reads the transport and
//! forwards lines. The engine only takes a new submission once the previous
//! command has been answered, so replies can never be handed to the wrong
//! caller.

use crate::error::{Error, Result};
use crate::exchange::{Exchange, Outcome};
use crate::framer::LineFramer;
use crate::packet::Packet;
use futures::StreamExt;
use log::{debug, error, trace, warn};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// What to do with an unsolicited packet when the OOB queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OobPolicy {
    /// Wait for the consumer. Command traffic stalls meanwhile.
    #[default]
    Block,
    /// Drop the new packet and keep going.
    Drop,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub oob_capacity: usize,
    pub oob_policy: OobPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            oob_capacity: 16,
            oob_policy: OobPolicy::Block,
        }
    }
}

struct Submission {
    command: String,
    deadline: Option<Instant>,
    reply: oneshot::Sender<Result<Packet>>,
}

struct InFlight {
    command: String,
    deadline: Option<Instant>,
    reply: oneshot::Sender<Result<Packet>>,
}

/// Handle for submitting commands to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Submission>,
    cancel: CancellationToken,
}

impl EngineHandle {
    /// Write `command` verbatim and wait for its decoded reply.
    ///
    /// `timeout` covers the whole call, including time spent queued behind
    /// other commands.
    pub async fn submit(&self, command: String, timeout: Option<Duration>) -> Result<Packet> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let (reply_tx, reply_rx) = oneshot::channel();
        let tx = &self.tx;
        let call = async move {
            let submission = Submission {
                command,
                deadline,
                reply: reply_tx,
            };
            if tx.send(submission).await.is_err() {
                return Err(Error::Closed);
            }
            match reply_rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::Closed),
            }
        };
        match deadline {
            Some(d) => match timeout_at(d, call).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout),
            },
            None => call.await,
        }
    }

    /// Stop the engine. The in-flight call and any queued calls fail with
    /// [`Error::Closed`] and the OOB queue closes.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Start the line producer and engine tasks on `transport`.
///
/// Returns the submission handle and the receiving end of the OOB queue.
pub fn spawn<T>(transport: T, config: EngineConfig) -> (EngineHandle, mpsc::Receiver<Packet>)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(transport);
    let (line_tx, line_rx) = mpsc::channel(64);
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (oob_tx, oob_rx) = mpsc::channel(config.oob_capacity.max(1));
    let cancel = CancellationToken::new();

    let producer = tokio::spawn(produce_lines(LineFramer::new(reader), line_tx));
    let engine = Engine {
        writer,
        exchange: Exchange::new(),
        in_flight: None,
        oob_tx,
        oob_policy: config.oob_policy,
        cancel: cancel.clone(),
    };
    tokio::spawn(async move {
        engine.run(line_rx, cmd_rx).await;
        producer.abort();
    });

    (EngineHandle { tx: cmd_tx, cancel }, oob_rx)
}

async fn produce_lines<R>(framer: LineFramer<R>, tx: mpsc::Sender<Result<String>>)
where
    R: AsyncRead + Unpin,
{
    let lines = framer.into_stream();
    tokio::pin!(lines);
    while let Some(line) = lines.next().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
    debug!("Line producer finished");
}

struct Engine<T> {
    writer: WriteHalf<T>,
    exchange: Exchange,
    in_flight: Option<InFlight>,
    oob_tx: mpsc::Sender<Packet>,
    oob_policy: OobPolicy,
    cancel: CancellationToken,
}

impl<T: AsyncRead + AsyncWrite> Engine<T> {
    async fn run(
        mut self,
        mut lines: mpsc::Receiver<Result<String>>,
        mut commands: mpsc::Receiver<Submission>,
    ) {
        loop {
            let deadline = self.in_flight.as_ref().and_then(|f| f.deadline);
            let idle = self.in_flight.is_none();

            // Cancellation first, then pending input before new output.
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("Engine cancelled");
                    self.fail_in_flight(Error::Closed);
                    break;
                }
                line = lines.recv() => match line {
                    Some(Ok(line)) => self.on_line(line).await,
                    Some(Err(e)) => {
                        error!("Read error: {}", e);
                        self.fail_in_flight(e);
                        break;
                    }
                    None => {
                        warn!("Connection closed (EOF)");
                        self.fail_in_flight(Error::Transport("end of stream".into()));
                        break;
                    }
                },
                cmd = commands.recv(), if idle => match cmd {
                    Some(submission) => {
                        if let Err(e) = self.on_command(submission).await {
                            error!("Write error: {}", e);
                            break;
                        }
                    }
                    None => {
                        debug!("All session handles dropped, stopping engine");
                        break;
                    }
                },
                _ = wait_until(deadline) => self.expire_in_flight(),
            }
        }
        // refuse anything still queued
        commands.close();
    }

    async fn on_command(&mut self, submission: Submission) -> Result<()> {
        let Submission {
            command,
            deadline,
            reply,
        } = submission;
        // the caller already timed out while queued
        if reply.is_closed() || matches!(deadline, Some(d) if d <= Instant::now()) {
            debug!("Skipping expired command {}", command.trim_end());
            let _ = reply.send(Err(Error::Timeout));
            return Ok(());
        }
        trace!("Sending Command: {}", command.trim_end());
        self.exchange.begin(&command);

        if let Err(e) = self.write(&command).await {
            let _ = reply.send(Err(Error::Transport(e.to_string())));
            return Err(e);
        }
        self.in_flight = Some(InFlight {
            command: command.trim_end().to_string(),
            deadline,
            reply,
        });
        Ok(())
    }

    async fn write(&mut self, command: &str) -> Result<()> {
        self.writer
            .write_all(command.as_bytes())
            .await
            .map_err(|e| Error::Transport(format!("write failed: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| Error::Transport(format!("flush failed: {}", e)))
    }

    async fn on_line(&mut self, line: String) {
        match self.exchange.feed(line) {
            Outcome::Echo | Outcome::Header | Outcome::Body => {}
            Outcome::Reply(result) => match self.in_flight.take() {
                Some(f) => {
                    let result = match result {
                        Ok(Packet::Error) => Err(Error::Protocol { command: f.command }),
                        other => other,
                    };
                    if f.reply.send(result).is_err() {
                        debug!("Caller went away before its reply arrived");
                    }
                }
                None => warn!("Status line with no command in flight, dropped"),
            },
            Outcome::Unsolicited(Ok(Some(packet))) => self.deliver_oob(packet).await,
            Outcome::Unsolicited(Ok(None)) => debug!("Suppressed unsolicited nag"),
            Outcome::Unsolicited(Err(e)) => warn!("Dropping undecodable unsolicited line: {}", e),
        }
    }

    async fn deliver_oob(&mut self, packet: Packet) {
        debug!("OOB: {:?}", packet);
        match self.oob_policy {
            OobPolicy::Block => {
                let tx = self.oob_tx.clone();
                let cancel = self.cancel.clone();
                let send = tx.send(packet);
                tokio::pin!(send);
                // the in-flight deadline keeps running while we wait
                loop {
                    let deadline = self.in_flight.as_ref().and_then(|f| f.deadline);
                    tokio::select! {
                        res = &mut send => {
                            if res.is_err() {
                                debug!("OOB receiver dropped, discarding packet");
                            }
                            break;
                        }
                        _ = cancel.cancelled() => break,
                        _ = wait_until(deadline) => self.expire_in_flight(),
                    }
                }
            }
            OobPolicy::Drop => match self.oob_tx.try_send(packet) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(p)) => {
                    warn!("OOB queue full, dropping {:?}", p)
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("OOB receiver dropped, discarding packet")
                }
            },
        }
    }

    fn expire_in_flight(&mut self) {
        if let Some(f) = self.in_flight.take() {
            warn!("No response to {} before deadline", f.command);
            self.exchange.reset();
            let _ = f.reply.send(Err(Error::Timeout));
        }
    }

    fn fail_in_flight(&mut self, err: Error) {
        if let Some(f) = self.in_flight.take() {
            let _ = f.reply.send(Err(err));
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => sleep_until(d).await,
        None => std::future::pending().await,
    }
}
