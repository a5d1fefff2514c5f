use anyhow::Context;
use gsm_modem::config::Config;
use gsm_modem::{monitor, transport, Session};
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    info!("Starting GSM modem daemon...");

    let config = Config::load();
    let port = transport::connect(&config.modem)
        .await
        .context("Failed to open modem transport")?;
    let mut session = Session::open(port, config.session.clone())
        .await
        .context("Modem initialisation failed")?;
    let oob = session.take_oob().context("OOB queue already taken")?;
    let session = Arc::new(session);

    let monitor = tokio::spawn(monitor::run(
        session.clone(),
        oob,
        config.delete_after_read,
    ));

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutting down");
        }
        _ = monitor => {
            error!("Modem connection lost");
        }
    }
    session.close();
    Ok(())
}
