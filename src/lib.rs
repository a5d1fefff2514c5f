//! Client-side driver for GSM modems speaking the Hayes AT command set.
//!
//! A [`Session`] owns a background engine that writes one command at a
//! time, pairs it with its reply, and routes everything else (new-SMS
//! alerts, network status changes) to an out-of-band queue.
//!
//! ```no_run
//! # async fn demo() -> gsm_modem::Result<()> {
//! use gsm_modem::{config::Config, transport, Packet, Session};
//!
//! let config = Config::default();
//! let port = transport::connect(&config.modem).await?;
//! let mut session = Session::open(port, config.session).await?;
//! let mut oob = session.take_oob().expect("first call");
//! while let Some(Packet::MessageNotification { index, .. }) = oob.recv().await {
//!     let msg = session.get_message(index).await?;
//!     println!("{}: {}", msg.telephone, msg.body);
//!     session.delete_message(index).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod framer;
pub mod monitor;
pub mod packet;
pub mod session;
pub mod transport;

pub use args::{format_args, format_command, parse_args, Arg};
pub use engine::OobPolicy;
pub use error::{Error, Result};
pub use packet::{decode, parse_timestamp, Message, Packet};
pub use session::{Session, SessionConfig};
