//! Boundary tokenizer for inbound protocol lines.
//!
//! A line is split into an optional `:prefix`, a command (word or 3-digit
//! numeric), and up to 15 space-separated parameters, the last optionally
//! introduced by `:` to allow embedded spaces. Anything deeper than this
//! split (mode strings, ISUPPORT tokens, message tags) is out of scope here.

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::take_while1,
    character::complete::char,
    combinator::opt,
    sequence::preceded,
    IResult,
};

use crate::error::LineParseError;

/// A tokenized protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLine {
    /// Message source, without the leading `:`.
    pub prefix: Option<String>,
    /// Command word or numeric, as received.
    pub command: String,
    /// Parameters, trailing parameter last with its `:` stripped.
    pub params: Vec<String>,
}

fn parse_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

fn parse_command(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric())(input)
}

impl ServerLine {
    /// Tokenize one line (no terminator).
    pub fn parse(input: &str) -> Result<Self, LineParseError> {
        if input.trim().is_empty() {
            return Err(LineParseError::EmptyLine);
        }

        let (rest, prefix) =
            opt(parse_prefix)(input).map_err(|_: nom::Err<_>| LineParseError::InvalidPrefix)?;
        let rest = rest.trim_start_matches(' ');
        let (mut rest, command) =
            parse_command(rest).map_err(|_: nom::Err<_>| LineParseError::InvalidCommand)?;

        let mut params: Vec<String> = Vec::new();
        while let Some(after_space) = rest.strip_prefix(' ') {
            rest = after_space;
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            let end = rest.find(' ').unwrap_or(rest.len());
            let param = &rest[..end];
            if param.is_empty() {
                break;
            }
            params.push(param.to_string());
            rest = &rest[end..];
        }

        Ok(ServerLine {
            prefix: prefix.map(str::to_string),
            command: command.to_string(),
            params,
        })
    }

    /// The source of this line, when a prefix is present.
    pub fn source(&self) -> Option<Source> {
        self.prefix.as_deref().map(Source::parse)
    }

    /// The last parameter, which is where trailing text lands.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// True when the command is a 3-digit numeric.
    pub fn is_numeric(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }
}

impl FromStr for ServerLine {
    type Err = LineParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        write!(f, "{}", self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            if i == last && (param.is_empty() || param.starts_with(':') || param.contains(' ')) {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }
        Ok(())
    }
}

/// The parsed origin of a prefixed line: `nick!user@host`, or a bare server
/// name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Nickname, or the full server name when no `!`/`@` is present.
    pub nick: String,
    /// Username (ident), if given.
    pub user: Option<String>,
    /// Host, if given.
    pub host: Option<String>,
}

impl Source {
    /// Split a prefix into its `nick!user@host` components.
    pub fn parse(prefix: &str) -> Self {
        let (nick_user, host) = match prefix.split_once('@') {
            Some((nu, h)) => (nu, Some(h.to_string())),
            None => (prefix, None),
        };
        let (nick, user) = match nick_user.split_once('!') {
            Some((n, u)) => (n.to_string(), Some(u.to_string())),
            None => (nick_user.to_string(), None),
        };
        Source { nick, user, host }
    }

    /// Case-insensitive nick comparison, ASCII folding.
    pub fn is_nick(&self, nick: &str) -> bool {
        self.nick.eq_ignore_ascii_case(nick)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nick)?;
        if let Some(user) = &self.user {
            write!(f, "!{}", user)?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{}", host)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let line = ServerLine::parse(":nick!user@host PRIVMSG #chan :hello world").unwrap();
        assert_eq!(line.prefix.as_deref(), Some("nick!user@host"));
        assert_eq!(line.command, "PRIVMSG");
        assert_eq!(line.params, vec!["#chan", "hello world"]);
        assert_eq!(line.trailing(), Some("hello world"));
    }

    #[test]
    fn test_parse_no_prefix() {
        let line = ServerLine::parse("PING :irc.test").unwrap();
        assert_eq!(line.prefix, None);
        assert_eq!(line.command, "PING");
        assert_eq!(line.params, vec!["irc.test"]);
    }

    #[test]
    fn test_parse_numeric() {
        let line = ServerLine::parse(":irc.test 001 nick :Welcome to the network").unwrap();
        assert_eq!(line.command, "001");
        assert!(line.is_numeric());
        assert_eq!(line.params[0], "nick");
    }

    #[test]
    fn test_parse_middle_params_only() {
        let line = ServerLine::parse("JOIN #a #b").unwrap();
        assert_eq!(line.params, vec!["#a", "#b"]);
        assert!(!line.is_numeric());
    }

    #[test]
    fn test_parse_empty_trailing() {
        let line = ServerLine::parse("TOPIC #chan :").unwrap();
        assert_eq!(line.params, vec!["#chan", ""]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(ServerLine::parse("  "), Err(LineParseError::EmptyLine));
        assert_eq!(ServerLine::parse(":prefix "), Err(LineParseError::InvalidCommand));
    }

    #[test]
    fn test_display_round_trip() {
        for raw in [
            ":irc.test 001 nick :Welcome to the network",
            "PING :irc.test",
            "JOIN #a #b",
            ":n!u@h PRIVMSG #chan :hello world",
        ] {
            let line: ServerLine = raw.parse().unwrap();
            assert_eq!(line.to_string(), raw);
        }
    }

    #[test]
    fn test_source_parse() {
        let src = Source::parse("nick!user@host.example");
        assert_eq!(src.nick, "nick");
        assert_eq!(src.user.as_deref(), Some("user"));
        assert_eq!(src.host.as_deref(), Some("host.example"));
        assert!(src.is_nick("NICK"));

        let server = Source::parse("irc.example.test");
        assert_eq!(server.nick, "irc.example.test");
        assert_eq!(server.user, None);
        assert_eq!(server.host, None);
    }

    #[test]
    fn test_source_display() {
        let src = Source::parse("nick!user@host");
        assert_eq!(src.to_string(), "nick!user@host");
    }
}
