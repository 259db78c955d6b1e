use crate::core::protocol::{self, Banner, LineRead};
use crate::models::{
    DatabaseEntry, DefineResult, Definition, DisplayFormat, ErrorReply, InfoResult, LookupResult,
    MatchResult, StrategyEntry,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Errors that can occur while talking to a DICT server
#[derive(Debug, Error)]
pub enum DictError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Not connected to a DICT server")]
    NotConnected,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server replied {code}: {text}")]
    Status { code: u16, text: String },
}

/// Longest reply line accepted; definition text lines can exceed the command limit
pub const MAX_REPLY_LINE: usize = 64 * 1024;

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// DICT protocol client
///
/// Every network operation is bounded by the configured timeout.
pub struct DictClient {
    conn: Option<Connection>,
    timeout: Duration,
    banner: Banner,
    mime: bool,
}

impl DictClient {
    /// Create a client that is not yet connected
    pub fn new(timeout: Duration) -> Self {
        Self {
            conn: None,
            timeout,
            banner: Banner::default(),
            mime: false,
        }
    }

    /// Connect to `host:port` and read the greeting
    pub async fn open(&mut self, host: &str, port: u16) -> Result<(), DictError> {
        let stream = with_timeout(self.timeout, TcpStream::connect((host, port))).await??;
        let (read_half, write_half) = stream.into_split();
        self.conn = Some(Connection {
            reader: BufReader::new(read_half),
            writer: write_half,
        });
        self.mime = false;

        let (code, text) = self.read_status().await?;
        if code != 220 {
            self.conn = None;
            return Err(DictError::Status { code, text });
        }
        self.banner = protocol::parse_banner(&text);
        tracing::debug!(
            "Connected to {}:{} (capabilities: {:?})",
            host,
            port,
            self.banner.capabilities
        );
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Capabilities announced in the server greeting
    pub fn server_capas(&self) -> &[String] {
        &self.banner.capabilities
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.banner.capabilities.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn msg_id(&self) -> Option<&str> {
        self.banner.msg_id.as_deref()
    }

    /// Send `QUIT` and drop the connection
    pub async fn close(&mut self) -> Result<(), DictError> {
        if self.conn.is_none() {
            return Ok(());
        }
        let result = self.command("QUIT").await;
        self.conn = None;
        match result {
            Ok((221, _)) => Ok(()),
            Ok((code, text)) => Err(DictError::Status { code, text }),
            Err(e) => Err(e),
        }
    }

    /// Send `OPTION name [args]`; returns whether the server accepted it
    pub async fn option(&mut self, name: &str, args: Option<&str>) -> Result<bool, DictError> {
        let cmd = match args {
            Some(args) => format!("OPTION {} {}", name, args),
            None => format!("OPTION {}", name),
        };
        let (code, text) = self.command(&cmd).await?;
        let accepted = code == 250;
        if accepted && name.eq_ignore_ascii_case("MIME") {
            self.mime = true;
        }
        if !accepted {
            tracing::debug!("Server refused {}: {} {}", cmd, code, text);
        }
        Ok(accepted)
    }

    /// Identify the client to the server
    pub async fn client(&mut self, text: &str) -> Result<(), DictError> {
        let (code, text) = self.command(&format!("CLIENT {}", protocol::quote(text))).await?;
        if code != 250 {
            tracing::debug!("CLIENT rejected: {} {}", code, text);
        }
        Ok(())
    }

    /// Server status line (`210`)
    pub async fn status(&mut self) -> Result<String, DictError> {
        match self.command("STATUS").await? {
            (210, text) => Ok(text),
            (code, text) => Err(DictError::Status { code, text }),
        }
    }

    pub async fn show_databases(&mut self) -> Result<Vec<DatabaseEntry>, DictError> {
        let pairs = self.show_listing("SHOW DB", 110, 554).await?;
        Ok(pairs
            .into_iter()
            .map(|(name, descr)| DatabaseEntry { name, descr })
            .collect())
    }

    pub async fn show_strategies(&mut self) -> Result<Vec<StrategyEntry>, DictError> {
        let pairs = self.show_listing("SHOW STRAT", 111, 555).await?;
        Ok(pairs
            .into_iter()
            .map(|(name, descr)| StrategyEntry { name, descr })
            .collect())
    }

    async fn show_listing(
        &mut self,
        cmd: &str,
        ok_code: u16,
        empty_code: u16,
    ) -> Result<Vec<(String, String)>, DictError> {
        let (code, text) = self.command(cmd).await?;
        if code == empty_code {
            return Ok(Vec::new());
        }
        if code != ok_code {
            return Err(DictError::Status { code, text });
        }

        let entries = self
            .read_text()
            .await?
            .iter()
            .filter_map(|line| {
                let mut words = protocol::tokenize(line).into_iter();
                let name = words.next()?;
                let descr = words.collect::<Vec<_>>().join(" ");
                Some((name, descr))
            })
            .collect();
        self.expect_ok().await?;
        Ok(entries)
    }

    /// `SHOW INFO db`
    pub async fn show_info(&mut self, db: &str) -> Result<LookupResult, DictError> {
        let (code, text) = self.command(&format!("SHOW INFO {}", protocol::quote(db))).await?;
        if code != 112 {
            return reply_error(code, text);
        }
        let desc = self.read_text().await?.join("\n");
        self.expect_ok().await?;
        Ok(LookupResult::Info(InfoResult {
            db: db.to_string(),
            desc,
        }))
    }

    /// `DEFINE db word`
    pub async fn define(&mut self, db: &str, word: &str) -> Result<LookupResult, DictError> {
        let cmd = format!("DEFINE {} {}", protocol::quote(db), protocol::quote(word));
        let (code, text) = self.command(&cmd).await?;
        if code != 150 {
            return reply_error(code, text);
        }

        let mut definitions = Vec::new();
        loop {
            let (code, text) = self.read_status().await?;
            match code {
                151 => {
                    let mut words = protocol::tokenize(&text).into_iter();
                    let term = words.next().unwrap_or_default();
                    let db = words.next().unwrap_or_default();
                    let db_fullname = words.collect::<Vec<_>>().join(" ");
                    let lines = self.read_text().await?;
                    let (content_type, headers, desc) = if self.mime {
                        split_mime(lines)
                    } else {
                        (None, BTreeMap::new(), lines.join("\n"))
                    };
                    definitions.push(Definition {
                        db,
                        db_fullname,
                        term,
                        desc,
                        content_type,
                        headers,
                        display: DisplayFormat::default(),
                    });
                }
                250 => break,
                _ => return Err(DictError::Status { code, text }),
            }
        }

        Ok(LookupResult::Define(DefineResult {
            count: definitions.len(),
            definitions,
        }))
    }

    /// `MATCH db strategy word`
    pub async fn match_word(
        &mut self,
        db: &str,
        strategy: &str,
        word: &str,
    ) -> Result<LookupResult, DictError> {
        let cmd = format!(
            "MATCH {} {} {}",
            protocol::quote(db),
            protocol::quote(strategy),
            protocol::quote(word)
        );
        let (code, text) = self.command(&cmd).await?;
        if code != 152 {
            return reply_error(code, text);
        }

        let mut result = MatchResult {
            count: 0,
            matches: Vec::new(),
        };
        for line in self.read_text().await? {
            let words = protocol::tokenize(&line);
            if let [db, word, ..] = words.as_slice() {
                result.push(db, word.clone());
            }
        }
        self.expect_ok().await?;
        Ok(LookupResult::Match(result))
    }

    async fn command(&mut self, cmd: &str) -> Result<(u16, String), DictError> {
        self.send(cmd).await?;
        self.read_status().await
    }

    async fn send(&mut self, cmd: &str) -> Result<(), DictError> {
        let timeout = self.timeout;
        let conn = self.conn.as_mut().ok_or(DictError::NotConnected)?;
        tracing::trace!("DICT > {}", cmd);
        let line = format!("{}\r\n", cmd);
        with_timeout(timeout, async {
            conn.writer.write_all(line.as_bytes()).await?;
            conn.writer.flush().await
        })
        .await??;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, DictError> {
        let timeout = self.timeout;
        let conn = self.conn.as_mut().ok_or(DictError::NotConnected)?;
        let read = with_timeout(
            timeout,
            protocol::read_line_limited(&mut conn.reader, MAX_REPLY_LINE),
        )
        .await??;
        let buf = match read {
            LineRead::Line(buf) => buf,
            LineRead::Eof => {
                self.conn = None;
                return Err(DictError::Protocol("connection closed by server".to_string()));
            }
            LineRead::TooLong => {
                self.conn = None;
                return Err(DictError::Protocol(format!(
                    "reply line longer than {} bytes",
                    MAX_REPLY_LINE
                )));
            }
        };
        let line = buf.trim_end_matches(['\r', '\n']).to_string();
        tracing::trace!("DICT < {}", line);
        Ok(line)
    }

    async fn read_status(&mut self) -> Result<(u16, String), DictError> {
        let line = self.read_line().await?;
        protocol::parse_status(&line)
            .map(|(code, text)| (code, text.to_string()))
            .ok_or_else(|| DictError::Protocol(format!("malformed status line: {}", line)))
    }

    async fn read_text(&mut self) -> Result<Vec<String>, DictError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == protocol::END_OF_TEXT {
                return Ok(lines);
            }
            lines.push(protocol::dot_unstuff(&line).to_string());
        }
    }

    async fn expect_ok(&mut self) -> Result<(), DictError> {
        match self.read_status().await? {
            (250, _) => Ok(()),
            (code, text) => Err(DictError::Status { code, text }),
        }
    }
}

async fn with_timeout<F, T>(timeout: Duration, fut: F) -> Result<T, DictError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| DictError::Timeout(timeout))
}

/// Lookup failures the server reports as ordinary replies
fn reply_error(code: u16, text: String) -> Result<LookupResult, DictError> {
    match code {
        550..=555 => Ok(LookupResult::Error(ErrorReply { code, msg: text })),
        _ => Err(DictError::Status { code, text }),
    }
}

/// Separate MIME headers from the body of a definition
fn split_mime(lines: Vec<String>) -> (Option<String>, BTreeMap<String, String>, String) {
    let mut content_type = None;
    let mut headers = BTreeMap::new();
    let mut iter = lines.into_iter();

    for line in iter.by_ref() {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            if name == "content-type" {
                content_type = Some(value);
            } else {
                headers.insert(name, value);
            }
        }
    }

    (content_type, headers, iter.collect::<Vec<_>>().join("\n"))
}

/// Split `host[:port]` into its parts, defaulting to the DICT port
pub fn split_server(server: &str) -> (String, u16) {
    match server.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (server.to_string(), protocol::DICT_PORT),
        },
        _ => (server.to_string(), protocol::DICT_PORT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_server() {
        assert_eq!(split_server("gnu.org.ua"), ("gnu.org.ua".to_string(), 2628));
        assert_eq!(split_server("localhost:2629"), ("localhost".to_string(), 2629));
        assert_eq!(split_server("host:bad"), ("host:bad".to_string(), 2628));
    }

    #[test]
    fn test_split_mime() {
        let lines = vec![
            "Content-Type: text/x-wiki".to_string(),
            "X-Wiki-Language: pl".to_string(),
            "".to_string(),
            "body line 1".to_string(),
            "".to_string(),
            "body line 2".to_string(),
        ];
        let (ct, headers, body) = split_mime(lines);
        assert_eq!(ct.as_deref(), Some("text/x-wiki"));
        assert_eq!(headers.get("x-wiki-language").map(|s| s.as_str()), Some("pl"));
        assert_eq!(body, "body line 1\n\nbody line 2");
    }

    #[test]
    fn test_reply_error_mapping() {
        assert!(matches!(
            reply_error(552, "No match".to_string()),
            Ok(LookupResult::Error(ErrorReply { code: 552, .. }))
        ));
        assert!(matches!(
            reply_error(500, "unknown command".to_string()),
            Err(DictError::Status { code: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_overlong_reply_line_is_rejected() {
        use tokio::io::AsyncBufReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            write_half
                .write_all(b"220 fake <mime> <1@fake>\r\n")
                .await
                .unwrap();
            let mut command = String::new();
            reader.read_line(&mut command).await.unwrap();
            let mut reply = b"210 ".to_vec();
            reply.extend(std::iter::repeat(b'x').take(MAX_REPLY_LINE * 2));
            // the client may hang up before everything is written
            let _ = write_half.write_all(&reply).await;
            command
        });

        let mut client = DictClient::new(Duration::from_secs(5));
        client.open("127.0.0.1", addr.port()).await.unwrap();
        match client.status().await {
            Err(DictError::Protocol(msg)) => assert!(msg.contains("longer than")),
            other => panic!("expected protocol error, got {:?}", other),
        }
        assert!(!client.is_connected());
        assert_eq!(server.await.unwrap(), "STATUS\r\n");
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut client = DictClient::new(Duration::from_secs(1));
        assert!(!client.is_connected());
        assert!(matches!(client.show_databases().await, Err(DictError::NotConnected)));
        assert!(client.close().await.is_ok());
    }
}
