use super::{Database, ServerState};
use crate::core::protocol;
use crate::modules::ModuleContext;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const SERVER_NAME: &str = "dicoweb-dicod";
const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const SYNTAX_ERROR: &str = "syntax error, illegal parameters";
const INVALID_DATABASE: &str = "invalid database, use SHOW DB for list";
const INVALID_STRATEGY: &str = "invalid strategy, use SHOW STRAT for a list";

const HELP_TEXT: &str = "\
DEFINE database word         -- look up word in database
MATCH database strategy word -- match word in database using strategy
SHOW DB                      -- list all accessible databases
SHOW DATABASES               -- list all accessible databases
SHOW STRAT                   -- list available matching strategies
SHOW STRATEGIES              -- list available matching strategies
SHOW INFO database           -- provide information about the database
SHOW SERVER                  -- provide site-specific information
OPTION MIME                  -- use MIME headers
OPTION MARKUP [name]         -- select output markup or list markups
XLEV number|tell             -- set or show the Levenshtein threshold
CLIENT info                  -- identify client to server
STATUS                       -- display timing information
HELP                         -- display this help information
QUIT                         -- terminate connection";

/// What to send back for one command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub quit: bool,
}

impl Reply {
    fn new(text: String) -> Self {
        Self { text, quit: false }
    }
}

/// Append a status line
fn status(out: &mut String, code: u16, text: &str) {
    let _ = write!(out, "{} {}\r\n", code, text);
}

/// Append a dot-terminated text block
fn text_block(out: &mut String, body: &str) {
    for line in body.lines() {
        out.push_str(&protocol::dot_stuff(line));
        out.push_str("\r\n");
    }
    out.push_str(protocol::END_OF_TEXT);
    out.push_str("\r\n");
}

fn single(code: u16, text: &str) -> Reply {
    let mut out = String::new();
    status(&mut out, code, text);
    Reply::new(out)
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    defines: usize,
    matches: usize,
    compares: usize,
}

/// Per-connection protocol state
pub struct Session {
    state: Arc<ServerState>,
    msg_id: String,
    mime: bool,
    markup: String,
    lev_distance: usize,
    client: Option<String>,
    counters: Counters,
}

impl Session {
    pub fn new(state: Arc<ServerState>, id: u64) -> Self {
        let msg_id = format!(
            "<{}.{}.{}@{}>",
            std::process::id(),
            id,
            chrono::Utc::now().timestamp(),
            state.hostname
        );
        let lev_distance = state.lev_distance;
        Self {
            state,
            msg_id,
            mime: false,
            markup: crate::modules::DEFAULT_MARKUP.to_string(),
            lev_distance,
            client: None,
            counters: Counters::default(),
        }
    }

    /// The `220` greeting
    pub fn banner(&self) -> String {
        format!(
            "220 {} {} {} <{}> {}\r\n",
            self.state.hostname,
            SERVER_NAME,
            env!("CARGO_PKG_VERSION"),
            self.state.capabilities().join("."),
            self.msg_id
        )
    }

    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    fn context(&self) -> ModuleContext {
        ModuleContext {
            markup: self.markup.clone(),
            lev_distance: self.lev_distance,
        }
    }

    fn counters_text(&self) -> String {
        format!(
            "[d/m/c = {}/{}/{}]",
            self.counters.defines, self.counters.matches, self.counters.compares
        )
    }

    /// Execute one command line. Blank lines produce no reply.
    pub async fn execute(&mut self, line: &str) -> Option<Reply> {
        let words = protocol::tokenize(line);
        let (command, args) = words.split_first()?;
        tracing::trace!("dicod < {}", line.trim_end());

        let reply = match command.to_ascii_uppercase().as_str() {
            "CLIENT" => {
                self.client = Some(args.join(" "));
                single(250, "ok")
            }
            "SHOW" => self.show(args),
            "DEFINE" => self.define(args).await,
            "MATCH" => self.match_words(args).await,
            "OPTION" => self.option(args),
            "XLEV" => self.xlev(args),
            "STATUS" => single(
                210,
                &format!(
                    "up {}s, {} connections {}",
                    self.state.uptime().as_secs(),
                    self.state.connection_count(),
                    self.counters_text()
                ),
            ),
            "HELP" => {
                let mut out = String::new();
                status(&mut out, 113, "help text follows");
                text_block(&mut out, HELP_TEXT);
                status(&mut out, 250, "ok");
                Reply::new(out)
            }
            "QUIT" => Reply {
                text: format!("221 bye {}\r\n", self.counters_text()),
                quit: true,
            },
            _ => single(500, "unknown command"),
        };
        Some(reply)
    }

    fn show(&self, args: &[String]) -> Reply {
        let Some(what) = args.first() else {
            return single(501, SYNTAX_ERROR);
        };
        let mut out = String::new();

        match (what.to_ascii_uppercase().as_str(), args.len()) {
            ("DB" | "DATABASES", 1) => {
                if self.state.databases.is_empty() {
                    return single(554, "no databases present");
                }
                status(
                    &mut out,
                    110,
                    &format!("{} databases present", self.state.databases.len()),
                );
                let body: Vec<String> = self
                    .state
                    .databases
                    .iter()
                    .map(|db| format!("{} {}", db.name(), protocol::quote(&db.descr())))
                    .collect();
                text_block(&mut out, &body.join("\n"));
            }
            ("STRAT" | "STRATEGIES", 1) => {
                if self.state.strategies.is_empty() {
                    return single(555, "no strategies available");
                }
                status(
                    &mut out,
                    111,
                    &format!("{} strategies present", self.state.strategies.len()),
                );
                let body: Vec<String> = self
                    .state
                    .strategies
                    .iter()
                    .map(|s| format!("{} {}", s.name, protocol::quote(&s.descr)))
                    .collect();
                text_block(&mut out, &body.join("\n"));
            }
            ("INFO", 2) => {
                let Some(db) = self.state.find_database(&args[1]) else {
                    return single(550, INVALID_DATABASE);
                };
                status(&mut out, 112, "database information follows");
                text_block(&mut out, &db.info());
            }
            ("SERVER", 1) => {
                status(&mut out, 114, "server information follows");
                let info = format!(
                    "{} {} {}\nUp {} seconds, {} connections served.\n{} databases, {} strategies.",
                    self.state.hostname,
                    SERVER_NAME,
                    env!("CARGO_PKG_VERSION"),
                    self.state.uptime().as_secs(),
                    self.state.connection_count(),
                    self.state.databases.len(),
                    self.state.strategies.len()
                );
                text_block(&mut out, &info);
            }
            _ => return single(501, SYNTAX_ERROR),
        }

        status(&mut out, 250, "ok");
        Reply::new(out)
    }

    /// Databases named by `db`: one, all (`*` and `!`), or `None` if unknown
    fn select_databases<'a>(state: &'a ServerState, db: &str) -> Option<Vec<&'a Database>> {
        match db {
            "*" | "!" => Some(state.databases.iter().collect()),
            name => state.find_database(name).map(|db| vec![db]),
        }
    }

    async fn define(&mut self, args: &[String]) -> Reply {
        let [db, word] = args else {
            return single(501, SYNTAX_ERROR);
        };
        let state = Arc::clone(&self.state);
        let Some(databases) = Self::select_databases(&state, db) else {
            return single(550, INVALID_DATABASE);
        };
        let first_only = db == "!";
        let ctx = self.context();

        let mut body = String::new();
        let mut count = 0;
        for database in databases {
            let module = database.module();
            let Some(result) = module.define_word(&ctx, word).await else {
                continue;
            };
            self.counters.compares += module.compare_count(&result);

            let mut headers = BTreeMap::new();
            if self.mime {
                module.result_headers(&ctx, &result, &mut headers);
                if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                    headers.insert("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string());
                }
            }

            for n in 0..module.result_count(&result) {
                let mut text = String::new();
                if self.mime {
                    for (name, value) in &headers {
                        let _ = writeln!(text, "{}: {}", name, value);
                    }
                    text.push('\n');
                }
                if !module.output(&result, n, &mut text) {
                    continue;
                }
                status(
                    &mut body,
                    151,
                    &format!(
                        "{} {} {}",
                        protocol::quote(word),
                        database.name(),
                        protocol::quote(&database.descr())
                    ),
                );
                text_block(&mut body, &text);
                count += 1;
            }

            if first_only && count > 0 {
                break;
            }
        }

        if count == 0 {
            return single(552, "No match");
        }
        self.counters.defines += count;

        let mut out = String::new();
        status(&mut out, 150, &format!("{} definitions found: list follows", count));
        out.push_str(&body);
        status(&mut out, 250, &format!("ok {}", self.counters_text()));
        Reply::new(out)
    }

    async fn match_words(&mut self, args: &[String]) -> Reply {
        let [db, strategy, word] = args else {
            return single(501, SYNTAX_ERROR);
        };
        let state = Arc::clone(&self.state);
        let Some(databases) = Self::select_databases(&state, db) else {
            return single(550, INVALID_DATABASE);
        };
        let Some(strategy) = state.strategies.find(strategy) else {
            return single(551, INVALID_STRATEGY);
        };
        let first_only = db == "!";
        let ctx = self.context();

        let mut found: Vec<(&str, String)> = Vec::new();
        for database in databases {
            let module = database.module();
            let Some(result) = module.match_word(&ctx, strategy, word).await else {
                continue;
            };
            self.counters.compares += module.compare_count(&result);

            let before = found.len();
            for n in 0..module.result_count(&result) {
                let mut headword = String::new();
                if !module.output(&result, n, &mut headword) {
                    continue;
                }
                if !found[before..].iter().any(|(_, w)| *w == headword) {
                    found.push((database.name(), headword));
                }
            }

            if first_only && found.len() > before {
                break;
            }
        }

        if found.is_empty() {
            return single(552, "No match");
        }
        self.counters.matches += found.len();

        let mut out = String::new();
        status(&mut out, 152, &format!("{} matches found: list follows", found.len()));
        let body: Vec<String> = found
            .iter()
            .map(|(db, word)| format!("{} {}", db, protocol::quote(word)))
            .collect();
        text_block(&mut out, &body.join("\n"));
        status(&mut out, 250, &format!("ok {}", self.counters_text()));
        Reply::new(out)
    }

    fn option(&mut self, args: &[String]) -> Reply {
        let Some(name) = args.first() else {
            return single(501, SYNTAX_ERROR);
        };
        match name.to_ascii_uppercase().as_str() {
            "MIME" => {
                self.mime = true;
                single(250, "ok - using MIME headers")
            }
            "MARKUP" => match args.get(1) {
                None => {
                    let mut out = String::new();
                    status(&mut out, 280, "markup list follows");
                    text_block(&mut out, &self.state.markups().join("\n"));
                    status(&mut out, 250, "ok");
                    Reply::new(out)
                }
                Some(markup) => {
                    let markup = markup.to_lowercase();
                    if self.state.markups().contains(&markup.as_str()) {
                        self.markup = markup;
                        single(250, "ok")
                    } else {
                        single(500, "unsupported markup")
                    }
                }
            },
            _ => single(500, "unknown option"),
        }
    }

    fn xlev(&mut self, args: &[String]) -> Reply {
        match args {
            [arg] if arg.eq_ignore_ascii_case("tell") => {
                single(280, &self.lev_distance.to_string())
            }
            [arg] => match arg.parse::<usize>() {
                Ok(n) => {
                    self.lev_distance = n;
                    single(250, "ok")
                }
                Err(_) => single(501, SYNTAX_ERROR),
            },
            _ => single(501, SYNTAX_ERROR),
        }
    }
}

/// Run the protocol on one accepted connection
pub async fn serve(stream: TcpStream, state: Arc<ServerState>, id: u64) -> std::io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let timeout = state.inactivity_timeout;
    let mut session = Session::new(state, id);

    writer.write_all(session.banner().as_bytes()).await?;

    loop {
        let read = protocol::read_line_limited(&mut reader, protocol::MAX_COMMAND_LINE);
        let read = if timeout.is_zero() {
            read.await?
        } else {
            match tokio::time::timeout(timeout, read).await {
                Ok(read) => read?,
                Err(_) => {
                    tracing::debug!("Connection {} idle for {:?}, closing", id, timeout);
                    writer.write_all(b"221 timeout\r\n").await?;
                    return Ok(());
                }
            }
        };
        let line = match read {
            protocol::LineRead::Line(line) => line,
            protocol::LineRead::Eof => return Ok(()),
            protocol::LineRead::TooLong => {
                tracing::warn!("Connection {} sent an overlong command line", id);
                writer.write_all(b"500 line too long\r\n").await?;
                return Ok(());
            }
        };

        let Some(reply) = session.execute(&line).await else {
            continue;
        };
        writer.write_all(reply.text.as_bytes()).await?;
        writer.flush().await?;
        if reply.quit {
            tracing::debug!(
                "Connection {} ({}) closed",
                id,
                session.client().unwrap_or("anonymous")
            );
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DictdSettings;
    use crate::modules::FlatFileModule;
    use std::io::Write;

    async fn session_with(files: &[(&str, &str)]) -> (Session, Vec<tempfile::NamedTempFile>) {
        let mut databases = Vec::new();
        let mut temps = Vec::new();
        for (name, contents) in files {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(contents.as_bytes()).unwrap();
            let module = Box::new(FlatFileModule::new(file.path()));
            databases.push(Database::with_module(name, None, module).await.unwrap());
            temps.push(file);
        }
        let state = ServerState::new(&DictdSettings::default(), databases).unwrap();
        (Session::new(Arc::new(state), 1), temps)
    }

    async fn run(session: &mut Session, line: &str) -> String {
        session.execute(line).await.unwrap().text
    }

    const FRUIT: &str = "descr: Fruit\napple A round fruit.\napricot An orange fruit.\n";
    const TREES: &str = "descr: Trees\napple A tree.\noak A big tree.\n";

    #[tokio::test]
    async fn test_banner_and_show_db() {
        let (mut s, _t) = session_with(&[("fruit", FRUIT), ("trees", TREES)]).await;
        let banner = s.banner();
        assert!(banner.starts_with("220 localhost dicoweb-dicod"));
        assert!(banner.contains("<mime.markup.xlev>"));

        let reply = run(&mut s, "SHOW DB\r\n").await;
        assert_eq!(
            reply,
            "110 2 databases present\r\nfruit \"Fruit\"\r\ntrees \"Trees\"\r\n.\r\n250 ok\r\n"
        );
    }

    #[tokio::test]
    async fn test_define_all_and_first() {
        let (mut s, _t) = session_with(&[("fruit", FRUIT), ("trees", TREES)]).await;

        let all = run(&mut s, "DEFINE * apple").await;
        assert!(all.starts_with("150 2 definitions found"));
        assert!(all.contains("151 \"apple\" fruit \"Fruit\"\r\n1. A round fruit.\r\n---------\r\n.\r\n"));
        assert!(all.contains("151 \"apple\" trees \"Trees\""));

        let first = run(&mut s, "DEFINE ! apple").await;
        assert!(first.starts_with("150 1 definitions found"));
        assert!(!first.contains("trees"));

        assert_eq!(run(&mut s, "DEFINE fruit durian").await, "552 No match\r\n");
        assert!(run(&mut s, "DEFINE nosuch apple").await.starts_with("550 "));
        assert!(run(&mut s, "DEFINE fruit").await.starts_with("501 "));
    }

    #[tokio::test]
    async fn test_define_with_mime() {
        let (mut s, _t) = session_with(&[("fruit", FRUIT)]).await;
        assert_eq!(run(&mut s, "OPTION MIME").await, "250 ok - using MIME headers\r\n");
        let reply = run(&mut s, "DEFINE fruit apple").await;
        assert!(reply.contains("Content-Type: text/plain; charset=utf-8\r\n\r\n1. A round fruit."));
    }

    #[tokio::test]
    async fn test_match() {
        let (mut s, _t) = session_with(&[("fruit", FRUIT), ("trees", TREES)]).await;
        let reply = run(&mut s, "MATCH * prefix ap").await;
        assert!(reply.starts_with("152 3 matches found"));
        assert!(reply.contains("fruit \"apple\"\r\nfruit \"apricot\"\r\ntrees \"apple\"\r\n.\r\n250 ok"));

        let default = run(&mut s, "MATCH trees . oaks").await;
        assert!(default.contains("trees \"oak\""));

        assert!(run(&mut s, "MATCH * bogus ap").await.starts_with("551 "));
        assert_eq!(run(&mut s, "MATCH fruit exact kiwi").await, "552 No match\r\n");
    }

    #[tokio::test]
    async fn test_show_info_and_errors() {
        let (mut s, _t) = session_with(&[("fruit", "descr: Fruit\ninfo: All about fruit.\n")]).await;
        assert_eq!(
            run(&mut s, "SHOW INFO fruit").await,
            "112 database information follows\r\nAll about fruit.\r\n.\r\n250 ok\r\n"
        );
        assert!(run(&mut s, "SHOW INFO nosuch").await.starts_with("550 "));
        assert!(run(&mut s, "SHOW BOGUS").await.starts_with("501 "));
        assert!(run(&mut s, "FROB").await.starts_with("500 "));
        assert!(s.execute("   \r\n").await.is_none());
    }

    #[tokio::test]
    async fn test_options_and_xlev() {
        let (mut s, _t) = session_with(&[]).await;
        assert_eq!(
            run(&mut s, "OPTION MARKUP").await,
            "280 markup list follows\r\nnone\r\n.\r\n250 ok\r\n"
        );
        assert_eq!(run(&mut s, "OPTION MARKUP wiki").await, "500 unsupported markup\r\n");
        assert_eq!(run(&mut s, "OPTION MARKUP none").await, "250 ok\r\n");
        assert_eq!(run(&mut s, "XLEV tell").await, "280 1\r\n");
        assert_eq!(run(&mut s, "XLEV 2").await, "250 ok\r\n");
        assert_eq!(run(&mut s, "XLEV tell").await, "280 2\r\n");
        assert!(run(&mut s, "XLEV many").await.starts_with("501 "));
        assert_eq!(run(&mut s, "SHOW DB").await, "554 no databases present\r\n");
    }

    #[tokio::test]
    async fn test_client_and_quit() {
        let (mut s, _t) = session_with(&[]).await;
        assert_eq!(run(&mut s, "CLIENT \"test client\"").await, "250 ok\r\n");
        assert_eq!(s.client(), Some("test client"));
        let quit = s.execute("QUIT").await.unwrap();
        assert!(quit.quit);
        assert!(quit.text.starts_with("221 bye"));
    }

    #[tokio::test]
    async fn test_serve_rejects_overlong_line() {
        use tokio::io::{AsyncBufReadExt, AsyncReadExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::new(&DictdSettings::default(), Vec::new()).unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(stream, state, 1).await
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut banner = String::new();
        reader.read_line(&mut banner).await.unwrap();
        assert!(banner.starts_with("220 "));

        // one byte over the limit and no terminator
        let junk = vec![b'a'; protocol::MAX_COMMAND_LINE + 1];
        write_half.write_all(&junk).await.unwrap();

        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "500 line too long\r\n");
        assert!(server.await.unwrap().is_ok());
    }

    #[test]
    fn test_text_block_dot_stuffing() {
        let mut out = String::new();
        text_block(&mut out, "first\n.hidden");
        assert_eq!(out, "first\r\n..hidden\r\n.\r\n");
    }
}
