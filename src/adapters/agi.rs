//! AGI session over the process's stdin/stdout.
//!
//! Asterisk first writes the `agi_*` environment block, one `key: value` per
//! line and terminated by an empty line. After that every command is one line
//! out and one reply in: `200 result=<n> [(<data>)] [key=value ...]`.
//!
//! With `AGISIGHUP=no` a remote hangup is announced by a bare `HANGUP` line
//! that may arrive ahead of any reply.

use async_trait::async_trait;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{AgiEnv, ChannelStatus, SessionControl, SessionError};

/// Parsed `200` reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgiReply {
    pub result: i32,
    pub data: Option<String>,
}

/// AGI session bound to a reader/writer pair
pub struct AgiSession<R, W> {
    env: AgiEnv,
    channel: Mutex<AgiChannel<R, W>>,
}

struct AgiChannel<R, W> {
    reader: R,
    writer: W,
}

impl AgiSession<BufReader<Stdin>, Stdout> {
    /// Attach to the switch through the process's standard streams
    pub async fn from_stdio() -> Result<Self, SessionError> {
        Self::open(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
    }
}

impl<R, W> AgiSession<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Read the environment block and take over the channel
    pub async fn open(mut reader: R, writer: W) -> Result<Self, SessionError> {
        let env = read_env(&mut reader).await?;
        debug!(keys = env.len(), "AGI environment received");

        Ok(Self {
            env,
            channel: Mutex::new(AgiChannel { reader, writer }),
        })
    }

    /// Use command-line arguments for any `agi_arg_N` the environment lacks
    pub fn fill_missing_args(&mut self, args: &[String]) {
        for (idx, arg) in args.iter().enumerate() {
            self.env
                .entry(format!("agi_arg_{}", idx + 1))
                .or_insert_with(|| arg.clone());
        }
    }

    /// Send one command line and wait for its reply
    pub async fn command(&self, command: &str) -> Result<AgiReply, SessionError> {
        let mut channel = self.channel.lock().await;
        channel.send(command).await?;
        channel.receive(command).await
    }
}

impl<R, W> AgiChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, command: &str) -> Result<(), SessionError> {
        debug!(%command, "AGI >>");
        self.writer
            .write_all(format!("{command}\n").as_bytes())
            .await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, SessionError> {
        read_line(&mut self.reader).await?.ok_or(SessionError::Hangup)
    }

    async fn receive(&mut self, command: &str) -> Result<AgiReply, SessionError> {
        let mut hangup_notified = false;

        loop {
            let line = self.read_line().await?;
            debug!(%line, "AGI <<");

            if line.trim() == "HANGUP" {
                hangup_notified = true;
                continue;
            }

            let (code, rest) = split_code(&line)?;
            return match code {
                200 => {
                    let reply = parse_result(rest, &line)?;
                    if reply.data.as_deref() == Some("hangup") || (hangup_notified && reply.result == -1) {
                        Err(SessionError::Hangup)
                    } else {
                        Ok(reply)
                    }
                }
                510 => Err(SessionError::InvalidCommand(command.to_string())),
                511 => Err(SessionError::Hangup),
                520 => {
                    let mut usage = vec![rest.to_string()];
                    loop {
                        let next = self.read_line().await?;
                        if let Some(last) = next.strip_prefix("520 ") {
                            usage.push(last.to_string());
                            break;
                        }
                        usage.push(next);
                    }
                    Err(SessionError::Usage(usage.join("\n")))
                }
                _ => Err(SessionError::UnexpectedReply(line)),
            };
        }
    }
}

#[async_trait]
impl<R, W> SessionControl for AgiSession<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn env(&self) -> &AgiEnv {
        &self.env
    }

    async fn answer(&self) -> Result<(), SessionError> {
        let reply = self.command("ANSWER").await?;
        if reply.result == -1 {
            return Err(SessionError::failed("ANSWER", "channel failure"));
        }
        Ok(())
    }

    async fn stream_file(&self, path: &str) -> Result<(), SessionError> {
        let reply = self
            .command(&format!("STREAM FILE {} \"\"", quote(path)))
            .await?;
        if reply.result == -1 {
            return Err(SessionError::failed(
                "STREAM FILE",
                format!("could not play {path}"),
            ));
        }
        Ok(())
    }

    async fn exec(&self, application: &str, args: &[&str]) -> Result<i32, SessionError> {
        let command = if args.is_empty() {
            format!("EXEC {application}")
        } else {
            format!("EXEC {application} {}", quote(&args.join(",")))
        };

        let reply = self.command(&command).await?;
        match reply.result {
            -2 => Err(SessionError::failed(application, "application not found")),
            -1 => Err(SessionError::failed(application, "application returned -1")),
            result => Ok(result),
        }
    }

    async fn get_variable(&self, name: &str) -> Result<Option<String>, SessionError> {
        let reply = self
            .command(&format!("GET VARIABLE {}", quote(name)))
            .await?;
        if reply.result == 1 {
            Ok(Some(reply.data.unwrap_or_default()))
        } else {
            Ok(None)
        }
    }

    async fn set_variable(&self, name: &str, value: &str) -> Result<(), SessionError> {
        let reply = self
            .command(&format!("SET VARIABLE {} {}", quote(name), quote(value)))
            .await?;
        if reply.result != 1 {
            return Err(SessionError::failed(
                "SET VARIABLE",
                format!("could not set {name}"),
            ));
        }
        Ok(())
    }

    async fn channel_status(&self) -> Result<ChannelStatus, SessionError> {
        let reply = self.command("CHANNEL STATUS").await?;
        if reply.result == -1 {
            return Err(SessionError::Hangup);
        }
        Ok(ChannelStatus::from_code(reply.result))
    }

    async fn hang_up(&self) -> Result<(), SessionError> {
        let reply = self.command("HANGUP").await?;
        if reply.result == -1 {
            warn!("HANGUP reported no channel to hang up");
            return Err(SessionError::Hangup);
        }
        Ok(())
    }
}

/// Read one line without its terminator. `None` at end of stream.
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>, SessionError> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Read `agi_*` lines up to the terminating empty line
async fn read_env<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<AgiEnv, SessionError> {
    let mut env = AgiEnv::new();

    loop {
        let line = read_line(reader).await?.ok_or(SessionError::Hangup)?;
        if line.trim().is_empty() {
            return Ok(env);
        }

        match line.split_once(':') {
            Some((key, value)) => {
                env.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => warn!(%line, "Ignoring malformed AGI environment line"),
        }
    }
}

/// Split `NNN rest` or `NNN-rest` into the status code and the remainder
fn split_code(line: &str) -> Result<(u16, &str), SessionError> {
    let code = line
        .get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| SessionError::UnexpectedReply(line.to_string()))?;
    let rest = line.get(4..).unwrap_or("");
    Ok((code, rest))
}

/// Parse `result=<n> [(<data>)] ...`
fn parse_result(rest: &str, line: &str) -> Result<AgiReply, SessionError> {
    let body = rest
        .trim()
        .strip_prefix("result=")
        .ok_or_else(|| SessionError::UnexpectedReply(line.to_string()))?;

    let (value, tail) = body.split_once(' ').unwrap_or((body, ""));
    let result = value
        .parse::<i32>()
        .map_err(|_| SessionError::UnexpectedReply(line.to_string()))?;

    let data = tail
        .trim_start()
        .strip_prefix('(')
        .and_then(|inner| inner.rfind(')').map(|end| inner[..end].to_string()));

    Ok(AgiReply { result, data })
}

/// Quote one AGI argument. Newlines would end the command, so they become spaces.
pub fn quote(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_result() {
        let reply = parse_result("result=0", "200 result=0").unwrap();
        assert_eq!(reply, AgiReply { result: 0, data: None });
    }

    #[test]
    fn test_parse_result_with_data() {
        let reply = parse_result("result=1 (2026-10-14 10:00:00)", "").unwrap();
        assert_eq!(reply.result, 1);
        assert_eq!(reply.data.as_deref(), Some("2026-10-14 10:00:00"));
    }

    #[test]
    fn test_parse_result_with_trailing_pairs() {
        let reply = parse_result("result=0 endpos=8000", "").unwrap();
        assert_eq!(reply, AgiReply { result: 0, data: None });

        let reply = parse_result("result=-1", "").unwrap();
        assert_eq!(reply.result, -1);
    }

    #[test]
    fn test_parse_result_rejects_garbage() {
        assert!(matches!(
            parse_result("resalt=1", "200 resalt=1"),
            Err(SessionError::UnexpectedReply(_))
        ));
        assert!(matches!(
            parse_result("result=x", "200 result=x"),
            Err(SessionError::UnexpectedReply(_))
        ));
    }

    #[test]
    fn test_split_code_variants() {
        assert_eq!(split_code("200 result=1").unwrap(), (200, "result=1"));
        assert_eq!(
            split_code("520-Invalid command syntax.").unwrap(),
            (520, "Invalid command syntax.")
        );
        assert!(split_code("OK").is_err());
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote("a\\b"), "\"a\\\\b\"");
        assert_eq!(quote("line1\nline2"), "\"line1 line2\"");
    }
}
