use crate::args::{parse_args, Arg};
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

/// Layout of AT timestamps once the trailing zone offset is removed.
const TIME_FORMAT: &str = "%y/%m/%d,%H:%M:%S";

/// A stored SMS as returned by `+CMGR` in text mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub status: String,
    pub telephone: String,
    pub timestamp: DateTime<Utc>,
    pub body: String,
}

/// One decoded response unit: a solicited reply or an unsolicited
/// notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Packet {
    /// `+ZPASR`
    ServiceStatus { status: String },
    /// `+ZDONR`
    NetworkStatus { network: String },
    /// `+CMTI`, a new SMS was stored.
    MessageNotification { storage: String, index: i64 },
    /// `+CSCA`
    SmscAddress { args: Vec<Arg> },
    /// `+CMGR`
    Message(Message),
    Ok,
    Error,
    Unknown { command: String, args: Vec<Arg> },
}

/// Parse an AT formatted time such as `14/02/01,15:07:43+00`.
///
/// The zone suffix is dropped, not applied.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let local = s
        .len()
        .checked_sub(3)
        .and_then(|end| s.get(..end))
        .ok_or_else(|| Error::Decode(format!("timestamp too short: {:?}", s)))?;
    let naive = NaiveDateTime::parse_from_str(local, TIME_FORMAT)
        .map_err(|e| Error::Decode(format!("bad timestamp {:?}: {}", s, e)))?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn arg<'a>(code: &str, args: &'a [Arg], i: usize) -> Result<&'a Arg> {
    args.get(i).ok_or_else(|| {
        Error::Decode(format!(
            "{}: missing argument {} (got {})",
            code,
            i,
            args.len()
        ))
    })
}

fn text_arg(code: &str, args: &[Arg], i: usize) -> Result<String> {
    match arg(code, args, i)? {
        Arg::Text(s) => Ok(s.clone()),
        Arg::Number(n) => Err(Error::Decode(format!(
            "{}: argument {} should be text, got {}",
            code, i, n
        ))),
    }
}

fn number_arg(code: &str, args: &[Arg], i: usize) -> Result<i64> {
    match arg(code, args, i)? {
        Arg::Number(n) => Ok(*n),
        Arg::Text(s) => Err(Error::Decode(format!(
            "{}: argument {} should be a number, got {:?}",
            code, i, s
        ))),
    }
}

fn status_packet(status: &str) -> Packet {
    if status == "OK" {
        Packet::Ok
    } else {
        Packet::Error
    }
}

/// Decode a completed exchange.
///
/// `Ok(None)` means the line is a known nag that should be dropped.
pub fn decode(status: &str, header: &str, body: &str) -> Result<Option<Packet>> {
    if header.is_empty() {
        return Ok(Some(status_packet(status)));
    }
    let Some((code, rest)) = header.split_once(':') else {
        return Ok(Some(Packet::Unknown {
            command: header.to_string(),
            args: Vec::new(),
        }));
    };
    let args = parse_args(rest.trim_start());

    let packet = match code {
        // message storage unset nag
        "+ZUSIMR" => return Ok(None),
        "+ZPASR" => Packet::ServiceStatus {
            status: text_arg(code, &args, 0)?,
        },
        "+ZDONR" => Packet::NetworkStatus {
            network: text_arg(code, &args, 0)?,
        },
        "+CMTI" => Packet::MessageNotification {
            storage: text_arg(code, &args, 0)?,
            index: number_arg(code, &args, 1)?,
        },
        "+CSCA" => Packet::SmscAddress { args },
        "+CMGR" => Packet::Message(Message {
            status: text_arg(code, &args, 0)?,
            telephone: text_arg(code, &args, 1)?,
            timestamp: parse_timestamp(&text_arg(code, &args, 3)?)?,
            body: body.to_string(),
        }),
        "" => status_packet(status),
        _ => Packet::Unknown {
            command: code.to_string(),
            args,
        },
    };
    Ok(Some(packet))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(status: &str, header: &str, body: &str) -> Packet {
        decode(status, header, body)
            .expect("decode failed")
            .expect("packet suppressed")
    }

    #[test]
    fn timestamp_drops_zone() {
        let t = parse_timestamp("14/02/01,15:07:43+00").unwrap();
        assert_eq!(t.to_rfc3339(), "2014-02-01T15:07:43+00:00");
        let t = parse_timestamp("14/02/01,15:07:43+04").unwrap();
        assert_eq!(t.to_rfc3339(), "2014-02-01T15:07:43+00:00");
    }

    #[test]
    fn timestamp_malformed() {
        assert!(matches!(parse_timestamp("+00"), Err(Error::Decode(_))));
        assert!(matches!(parse_timestamp("ab"), Err(Error::Decode(_))));
        assert!(matches!(
            parse_timestamp("14/13/01,15:07:43+00"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn bare_status_lines() {
        assert_eq!(decoded("OK", "", ""), Packet::Ok);
        assert_eq!(decoded("ERROR", "", ""), Packet::Error);
    }

    #[test]
    fn message_notification() {
        assert_eq!(
            decoded("OK", r#"+CMTI: "SM",4"#, ""),
            Packet::MessageNotification {
                storage: "SM".into(),
                index: 4
            }
        );
    }

    #[test]
    fn stored_message() {
        let header = r#"+CMGR: "REC UNREAD","+15551234567",,"14/02/01,15:07:43+00""#;
        match decoded("OK", header, "Hello") {
            Packet::Message(msg) => {
                assert_eq!(msg.status, "REC UNREAD");
                assert_eq!(msg.telephone, "+15551234567");
                assert_eq!(msg.timestamp, Utc.with_ymd_and_hms(2014, 2, 1, 15, 7, 43).unwrap());
                assert_eq!(msg.body, "Hello");
            }
            other => panic!("expected Message, got {:?}", other),
        }
    }

    #[test]
    fn stored_message_bad_timestamp() {
        let header = r#"+CMGR: "REC READ","+15551234567",,"yesterday""#;
        assert!(matches!(decode("OK", header, ""), Err(Error::Decode(_))));
    }

    #[test]
    fn service_and_network_status() {
        assert_eq!(
            decoded("OK", r#"+ZPASR: "UMTS""#, ""),
            Packet::ServiceStatus {
                status: "UMTS".into()
            }
        );
        assert_eq!(
            decoded("OK", r#"+ZDONR: "vodafone UK""#, ""),
            Packet::NetworkStatus {
                network: "vodafone UK".into()
            }
        );
    }

    #[test]
    fn smsc_address_keeps_args() {
        assert_eq!(
            decoded("OK", r#"+CSCA: "+447785016005",145"#, ""),
            Packet::SmscAddress {
                args: vec![Arg::Text("+447785016005".into()), Arg::Number(145)]
            }
        );
    }

    #[test]
    fn storage_nag_is_suppressed() {
        assert_eq!(decode("OK", "+ZUSIMR: 2", "").unwrap(), None);
    }

    #[test]
    fn unknown_prefix() {
        assert_eq!(
            decoded("OK", "+CSQ: 17,99", ""),
            Packet::Unknown {
                command: "+CSQ".into(),
                args: vec![Arg::Number(17), Arg::Number(99)]
            }
        );
    }

    #[test]
    fn header_without_colon() {
        assert_eq!(
            decoded("OK", "RING", ""),
            Packet::Unknown {
                command: "RING".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn short_argument_list_is_decode_error() {
        assert!(matches!(decode("OK", r#"+CMTI: "SM""#, ""), Err(Error::Decode(_))));
        assert!(matches!(
            decode("OK", r#"+CMGR: "REC READ","+1555""#, ""),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn ill_typed_argument_is_decode_error() {
        assert!(matches!(
            decode("OK", r#"+CMTI: "SM","4""#, ""),
            Err(Error::Decode(_))
        ));
        assert!(matches!(decode("OK", "+ZPASR: 3", ""), Err(Error::Decode(_))));
    }

    #[test]
    fn packet_serializes_with_type_tag() {
        let p = Packet::MessageNotification {
            storage: "SM".into(),
            index: 4,
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "MessageNotification");
        assert_eq!(json["index"], 4);
    }
}
