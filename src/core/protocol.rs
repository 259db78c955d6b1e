//! DICT (RFC 2229) wire helpers shared by the client and the server.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Default TCP port of a DICT server
pub const DICT_PORT: u16 = 2628;

/// A line consisting of a single dot terminates a text block
pub const END_OF_TEXT: &str = ".";

/// Longest command line a server accepts, terminator included
pub const MAX_COMMAND_LINE: usize = 1024;

/// Outcome of [`read_line_limited`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A line, with its terminator if one was received
    Line(String),
    /// More than the allowed bytes arrived without a line terminator
    TooLong,
    Eof,
}

/// Read one line, buffering at most `max` bytes of it.
///
/// Invalid UTF-8 is replaced rather than rejected.
pub async fn read_line_limited<R>(reader: &mut R, max: usize) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if n > max && buf.last() != Some(&b'\n') {
        return Ok(LineRead::TooLong);
    }
    Ok(LineRead::Line(String::from_utf8_lossy(&buf).into_owned()))
}

/// Split a status line into its three-digit code and the remaining text.
///
/// Returns `None` if the line does not start with a numeric code.
pub fn parse_status(line: &str) -> Option<(u16, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.len() < 3 || !line.is_char_boundary(3) {
        return None;
    }
    let (code, rest) = line.split_at(3);
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some((code.parse().ok()?, rest.trim_start()))
}

/// Quote a command argument, escaping embedded quotes and backslashes
pub fn quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for ch in arg.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Split a command or reply line into words.
///
/// Words are separated by whitespace. Double- and single-quoted strings form
/// one word, and a backslash escapes the next character.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote_char: Option<char> = None;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars();

    while let Some(ch) = chars.next() {
        match (quote_char, ch) {
            (_, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            (Some(q), c) if c == q => quote_char = None,
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote_char = Some(ch);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if in_word {
        words.push(current);
    }
    words
}

/// Capabilities and message id announced in a `220` banner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Banner {
    pub text: String,
    pub capabilities: Vec<String>,
    pub msg_id: Option<String>,
}

/// Parse the text of a `220` greeting: `host text <capa.capa> <msg-id>`
pub fn parse_banner(text: &str) -> Banner {
    let mut groups = Vec::new();
    let mut rest = text;
    let mut plain_end = text.len();

    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        if groups.is_empty() {
            plain_end = text.len() - rest.len() + start;
        }
        groups.push(&rest[start + 1..start + len]);
        rest = &rest[start + len + 1..];
    }

    let (capabilities, msg_id) = match groups.as_slice() {
        [] => (Vec::new(), None),
        [only] if only.contains('@') => (Vec::new(), Some(only.to_string())),
        [capas] => (split_capabilities(capas), None),
        [capas, msg_id, ..] => (split_capabilities(capas), Some(msg_id.to_string())),
    };

    Banner {
        text: text[..plain_end].trim().to_string(),
        capabilities,
        msg_id,
    }
}

fn split_capabilities(capas: &str) -> Vec<String> {
    capas
        .split('.')
        .filter(|c| !c.is_empty())
        .map(|c| c.to_string())
        .collect()
}

/// Escape a text-block line so it cannot be taken for the terminator
pub fn dot_stuff(line: &str) -> std::borrow::Cow<'_, str> {
    if line.starts_with('.') {
        std::borrow::Cow::Owned(format!(".{}", line))
    } else {
        std::borrow::Cow::Borrowed(line)
    }
}

/// Undo [`dot_stuff`] on a received text-block line
pub fn dot_unstuff(line: &str) -> &str {
    if line.starts_with("..") {
        &line[1..]
    } else {
        line
    }
}
