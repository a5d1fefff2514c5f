use serde::Serialize;
use std::fmt;

/// One argument of an AT command or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Arg {
    Text(String),
    Number(i64),
}

impl Arg {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Text(s) => Some(s),
            Arg::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Arg::Number(n) => Some(*n),
            Arg::Text(_) => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Text(s) => f.write_str(s),
            Arg::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Arg::Number(n)
    }
}

fn quote(arg: &Arg) -> String {
    match arg {
        // bare `?` is the query form, e.g. AT+CSCA?
        Arg::Text(s) if s == "?" => s.clone(),
        Arg::Text(s) => format!("\"{}\"", s),
        Arg::Number(n) => n.to_string(),
    }
}

/// Render an argument list the way the modem expects it: strings quoted,
/// numbers bare, comma separated.
pub fn format_args(args: &[Arg]) -> String {
    args.iter().map(quote).collect::<Vec<_>>().join(",")
}

/// Build a complete command line, `AT<code>[=<args>]\r\n`.
pub fn format_command(code: &str, args: &[Arg]) -> String {
    let mut line = format!("AT{}", code);
    if !args.is_empty() {
        line.push('=');
        line.push_str(&format_args(args));
    }
    line.push_str("\r\n");
    line
}

fn unquote(token: &str) -> Arg {
    if token.starts_with('"') {
        return Arg::Text(token.trim_matches('"').to_string());
    }
    match token.parse::<i64>() {
        Ok(n) => Arg::Number(n),
        Err(_) => Arg::Text(token.to_string()),
    }
}

/// Split a reply argument list into values.
///
/// Commas inside a double-quoted run don't split. Quoted tokens always stay
/// text; unquoted tokens become numbers only when the whole token is an
/// integer literal.
pub fn parse_args(text: &str) -> Vec<Arg> {
    let mut args = Vec::new();
    let mut token = String::new();
    let mut in_quotes = false;

    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                token.push(c);
            }
            ',' if !in_quotes => {
                args.push(unquote(&token));
                token.clear();
            }
            _ => token.push(c),
        }
    }
    args.push(unquote(&token));
    args
}
