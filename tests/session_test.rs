use gsm_modem::{monitor, Arg, Error, OobPolicy, Packet, Session, SessionConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

/// Replies of a well-behaved modem with echo on, for the setup sequence.
fn init_reply(command: &str) -> Option<String> {
    let reply = match command {
        "ATZ" | "ATE0" => format!("{}\r\r\nOK\r\n", command),
        r#"AT+CPMS="SM","SM","SM""# => "\r\n+CPMS: 1,20,1,20,1,20\r\n\r\nOK\r\n".to_string(),
        // plenty of modems grumble about text mode
        "AT+CMGF=1" => "\r\nERROR\r\n".to_string(),
        "AT+CSCA?" => "\r\n+CSCA: \"+447785016005\",145\r\n\r\nOK\r\n".to_string(),
        r#"AT+CSCA="+447785016005",145"# => "\r\nOK\r\n".to_string(),
        _ => return None,
    };
    Some(reply)
}

struct FakeModem {
    /// Every command line the host wrote, in order.
    commands: mpsc::UnboundedReceiver<String>,
    /// Raw text pushed to the host outside any exchange.
    inject: mpsc::UnboundedSender<String>,
}

fn spawn_modem<F>(stream: DuplexStream, mut respond: F) -> FakeModem
where
    F: FnMut(&str) -> String + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (inject_tx, mut inject_rx) = mpsc::unbounded_channel::<String>();
    let (reader, mut writer) = tokio::io::split(stream);

    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Ok(Some(line)) = line else { break };
                    let command = line.trim_end().to_string();
                    let reply = respond(&command);
                    let _ = cmd_tx.send(command);
                    if writer.write_all(reply.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Some(text) = inject_rx.recv() => {
                    if writer.write_all(text.as_bytes()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    FakeModem {
        commands: cmd_rx,
        inject: inject_tx,
    }
}

async fn open_with<F>(config: SessionConfig, mut respond: F) -> (Session, FakeModem)
where
    F: FnMut(&str) -> String + Send + 'static,
{
    let (host, modem) = tokio::io::duplex(4096);
    let mut modem = spawn_modem(modem, move |cmd| {
        init_reply(cmd).unwrap_or_else(|| respond(cmd))
    });
    let session = Session::open(host, config).await.expect("init failed");
    // swallow the setup traffic
    for _ in 0..6 {
        modem.commands.recv().await.unwrap();
    }
    (session, modem)
}

fn stored_message(cmd: &str) -> String {
    match cmd {
        "AT+CMGR=3" => concat!(
            "\r\n+CMGR: \"REC UNREAD\",\"+15551234567\",,\"14/02/01,15:07:43+00\"\r\n",
            "Hello\r\n",
            "\r\nOK\r\n"
        )
        .to_string(),
        "AT+CMGR=5" => "\r\nOK\r\n".to_string(),
        "AT+CMGD=3" => "\r\nOK\r\n".to_string(),
        "AT+CMGD=8" => "\r\n+CMS ERROR: 321\r\nERROR\r\n".to_string(),
        _ => "\r\nERROR\r\n".to_string(),
    }
}

#[tokio::test]
async fn open_runs_setup_sequence() {
    let (host, modem) = tokio::io::duplex(4096);
    let mut modem = spawn_modem(modem, |cmd| {
        init_reply(cmd).unwrap_or_else(|| "\r\nERROR\r\n".to_string())
    });

    let session = Session::open(host, SessionConfig::default()).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..6 {
        seen.push(modem.commands.recv().await.unwrap());
    }
    assert_eq!(
        seen,
        vec![
            "ATZ",
            "ATE0",
            r#"AT+CPMS="SM","SM","SM""#,
            "AT+CMGF=1",
            "AT+CSCA?",
            r#"AT+CSCA="+447785016005",145"#,
        ]
    );
    assert!(!session.is_closed());
}

#[tokio::test]
async fn open_aborts_when_reset_fails() {
    let (host, modem) = tokio::io::duplex(4096);
    let _modem = spawn_modem(modem, |_| "\r\nERROR\r\n".to_string());

    match Session::open(host, SessionConfig::default()).await {
        Err(Error::Protocol { command }) => assert_eq!(command, "ATZ"),
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("open should fail"),
    }
}

#[tokio::test]
async fn open_aborts_when_smsc_query_is_unanswerable() {
    let (host, modem) = tokio::io::duplex(4096);
    let _modem = spawn_modem(modem, |cmd| match cmd {
        "AT+CSCA?" => "\r\nOK\r\n".to_string(),
        _ => init_reply(cmd).unwrap_or_default(),
    });

    let result = Session::open(host, SessionConfig::default()).await;
    assert!(matches!(result, Err(Error::UnexpectedResponse(_))));
}

#[tokio::test]
async fn reads_and_deletes_messages() {
    let (session, mut modem) = open_with(SessionConfig::default(), stored_message).await;

    let msg = session.get_message(3).await.unwrap();
    assert_eq!(msg.status, "REC UNREAD");
    assert_eq!(msg.telephone, "+15551234567");
    assert_eq!(msg.timestamp.to_rfc3339(), "2014-02-01T15:07:43+00:00");
    assert_eq!(msg.body, "Hello");
    assert_eq!(modem.commands.recv().await.unwrap(), "AT+CMGR=3");

    session.delete_message(3).await.unwrap();
    assert_eq!(modem.commands.recv().await.unwrap(), "AT+CMGD=3");
}

#[tokio::test]
async fn empty_slot_is_not_found() {
    let (session, _modem) = open_with(SessionConfig::default(), stored_message).await;
    assert!(matches!(
        session.get_message(5).await,
        Err(Error::MessageNotFound(5))
    ));
}

#[tokio::test]
async fn error_reply_is_protocol_error_and_session_recovers() {
    let (mut session, _modem) = open_with(SessionConfig::default(), stored_message).await;
    let mut oob = session.take_oob().unwrap();

    match session.delete_message(8).await {
        Err(Error::Protocol { command }) => assert_eq!(command, "AT+CMGD=8"),
        other => panic!("expected protocol error, got {:?}", other),
    }
    // the +CMS line had no header to belong to
    assert_eq!(
        oob.recv().await.unwrap(),
        Packet::Unknown {
            command: "+CMS ERROR".into(),
            args: vec![Arg::Number(321)],
        }
    );

    assert_eq!(session.get_message(3).await.unwrap().body, "Hello");
}

#[tokio::test]
async fn oob_queue_can_only_be_taken_once() {
    let (mut session, _modem) = open_with(SessionConfig::default(), stored_message).await;
    assert!(session.take_oob().is_some());
    assert!(session.take_oob().is_none());
}

#[tokio::test]
async fn concurrent_sends_get_their_own_replies() {
    let (session, _modem) = open_with(SessionConfig::default(), |cmd| match cmd {
        "AT+CSQ" => "\r\n+CSQ: 17,99\r\n\r\nOK\r\n".to_string(),
        "AT+CREG?" => "\r\n+CREG: 0,1\r\n\r\nOK\r\n".to_string(),
        _ => "\r\nERROR\r\n".to_string(),
    })
    .await;
    let session = Arc::new(session);

    let mut calls = Vec::new();
    for _ in 0..5 {
        let a = session.clone();
        calls.push(tokio::spawn(async move { ("+CSQ", a.send("+CSQ", &[]).await) }));
        let b = session.clone();
        calls.push(tokio::spawn(async move { ("+CREG", b.send("+CREG?", &[]).await) }));
    }
    for call in calls {
        let (code, result) = call.await.unwrap();
        match result.unwrap() {
            Packet::Unknown { command, .. } => assert_eq!(command, code),
            other => panic!("unexpected reply {:?}", other),
        }
    }
}

#[tokio::test]
async fn timeout_leaves_session_usable() {
    let config = SessionConfig {
        command_timeout: Some(Duration::from_millis(100)),
        ..SessionConfig::default()
    };
    let (session, _modem) = open_with(config, |cmd| match cmd {
        // no reply at all
        "AT+CSQ" => String::new(),
        _ => stored_message(cmd),
    })
    .await;

    assert!(matches!(session.send("+CSQ", &[]).await, Err(Error::Timeout)));
    assert_eq!(session.get_message(3).await.unwrap().body, "Hello");
}

#[tokio::test]
async fn close_fails_later_calls() {
    let (session, _modem) = open_with(SessionConfig::default(), stored_message).await;
    session.close();
    assert!(matches!(session.get_message(3).await, Err(Error::Closed)));
}

#[tokio::test]
async fn monitor_fetches_and_deletes_new_messages() {
    let (mut session, mut modem) = open_with(SessionConfig::default(), stored_message).await;
    let oob = session.take_oob().unwrap();
    let session = Arc::new(session);
    let task = tokio::spawn(monitor::run(session.clone(), oob, true));

    modem
        .inject
        .send("\r\n+CMTI: \"SM\",3\r\n".to_string())
        .unwrap();
    assert_eq!(modem.commands.recv().await.unwrap(), "AT+CMGR=3");
    assert_eq!(modem.commands.recv().await.unwrap(), "AT+CMGD=3");

    session.close();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("monitor did not stop")
        .unwrap();
}

#[tokio::test]
async fn timeout_holds_while_notifications_pile_up() {
    let config = SessionConfig {
        command_timeout: Some(Duration::from_millis(200)),
        oob_capacity: 1,
        oob_policy: OobPolicy::Block,
    };
    // nobody drains the OOB queue
    let (session, _modem) = open_with(config, |cmd| match cmd {
        "AT+CSQ" => concat!(
            "\r\n+CMTI: \"SM\",1\r\n",
            "\r\n+CMTI: \"SM\",2\r\n",
            "\r\n+CSQ: 17,99\r\n\r\nOK\r\n"
        )
        .to_string(),
        _ => "\r\nERROR\r\n".to_string(),
    })
    .await;

    let result = tokio::time::timeout(Duration::from_secs(2), session.send("+CSQ", &[]))
        .await
        .expect("send outlived its deadline");
    assert!(matches!(result, Err(Error::Timeout)));
}
