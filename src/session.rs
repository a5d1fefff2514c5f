use crate::args::{format_command, Arg};
use crate::engine::{self, EngineConfig, EngineHandle, OobPolicy};
use crate::error::{Error, Result};
use crate::packet::{Message, Packet};
use log::{info, warn};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for each command; `None` waits forever.
    pub command_timeout: Option<Duration>,
    pub oob_capacity: usize,
    pub oob_policy: OobPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout: None,
            oob_capacity: 16,
            oob_policy: OobPolicy::Block,
        }
    }
}

/// An initialized connection to a GSM modem.
///
/// Commands are answered one at a time; concurrent [`Session::send`] calls
/// queue behind each other in arrival order. Unsolicited packets are
/// delivered on the queue returned by [`Session::take_oob`].
pub struct Session {
    engine: EngineHandle,
    oob: Option<mpsc::Receiver<Packet>>,
    command_timeout: Option<Duration>,
}

impl Session {
    /// Start the engine on `transport` and run the modem setup sequence.
    pub async fn open<T>(transport: T, config: SessionConfig) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (engine, oob) = engine::spawn(
            transport,
            EngineConfig {
                oob_capacity: config.oob_capacity,
                oob_policy: config.oob_policy,
            },
        );
        let session = Self {
            engine,
            oob: Some(oob),
            command_timeout: config.command_timeout,
        };
        if let Err(e) = session.init().await {
            session.close();
            return Err(e);
        }
        Ok(session)
    }

    async fn init(&self) -> Result<()> {
        // clear settings
        self.send("Z", &[]).await?;
        info!("Reset");
        self.send("E0", &[]).await?;
        info!("Echo off");
        // the modem delivers to SIM storage regardless, so read from there too
        self.send("+CPMS", &["SM".into(), "SM".into(), "SM".into()])
            .await?;
        info!("Set SMS storage");
        // often a benign error
        if let Err(e) = self.send("+CMGF", &[1.into()]).await {
            warn!("Selecting SMS text mode failed, ignoring: {}", e);
        }
        info!("Set SMS text mode");

        // The modem rejects sends until the SMSC is explicitly set, even
        // though it reports the stored one. Write back what it reports.
        let smsc = match self.send("+CSCA?", &[]).await? {
            Packet::SmscAddress { args } => args,
            other => {
                return Err(Error::UnexpectedResponse(format!(
                    "expected +CSCA, got {:?}",
                    other
                )))
            }
        };
        let number = smsc.first().and_then(Arg::as_text).unwrap_or("");
        let kind = smsc.get(1).and_then(Arg::as_number);
        info!("Got SMSC: {} (type {:?})", number, kind);
        self.send("+CSCA", &smsc).await?;
        info!("Set SMSC to: {}", number);
        Ok(())
    }

    /// Send `AT<code>[=<args>]` and wait for the reply.
    ///
    /// An `ERROR` reply comes back as [`Error::Protocol`].
    pub async fn send(&self, code: &str, args: &[Arg]) -> Result<Packet> {
        self.send_timeout(code, args, self.command_timeout).await
    }

    /// Like [`Session::send`] with an explicit deadline for this call.
    ///
    /// The deadline counts from the moment of the call, including time
    /// queued behind other commands. Replies carry no request id, so if the
    /// modem answers a timed-out command late, that `OK`/`ERROR` is taken as
    /// the reply to whichever command is in flight next.
    pub async fn send_timeout(
        &self,
        code: &str,
        args: &[Arg],
        timeout: Option<Duration>,
    ) -> Result<Packet> {
        self.engine
            .submit(format_command(code, args), timeout)
            .await
    }

    /// Read the stored message at `index`.
    pub async fn get_message(&self, index: i64) -> Result<Message> {
        match self.send("+CMGR", &[index.into()]).await? {
            Packet::Message(msg) => Ok(msg),
            _ => Err(Error::MessageNotFound(index)),
        }
    }

    pub async fn delete_message(&self, index: i64) -> Result<()> {
        self.send("+CMGD", &[index.into()]).await.map(|_| ())
    }

    /// Take the receiving end of the unsolicited packet queue. Returns
    /// `None` after the first call.
    pub fn take_oob(&mut self) -> Option<mpsc::Receiver<Packet>> {
        self.oob.take()
    }

    /// Stop the engine. Pending and later calls fail with [`Error::Closed`].
    pub fn close(&self) {
        self.engine.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}
