//! Line protocol for the interactive driver.

use memoria_core::RecordId;
use thiserror::Error;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Remember(String),
    /// Recall within the current session.
    Recall { k: usize, text: String },
    /// Recall across every session.
    RecallAll { k: usize, text: String },
    Forget(RecordId),
    History,
    Stats,
    Compact,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(String);

pub const USAGE: &str = "commands: remember <text> | recall <k> <text> | recall-all <k> <text> \
                         | forget <record-id> | history | stats | compact | quit";

/// Parses a non-empty input line.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    match verb.to_ascii_lowercase().as_str() {
        "remember" => non_empty(rest, "remember").map(|t| Command::Remember(t.to_owned())),
        "recall" => {
            let (k, text) = k_and_text(rest, "recall")?;
            Ok(Command::Recall { k, text })
        }
        "recall-all" => {
            let (k, text) = k_and_text(rest, "recall-all")?;
            Ok(Command::RecallAll { k, text })
        }
        "forget" => {
            let id = non_empty(rest, "forget")?;
            id.parse::<RecordId>()
                .map(Command::Forget)
                .map_err(|e| ParseError(format!("invalid record id '{id}': {e}")))
        }
        "history" => Ok(Command::History),
        "stats" => Ok(Command::Stats),
        "compact" => Ok(Command::Compact),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(ParseError(format!("unknown command '{other}'; {USAGE}"))),
    }
}

fn non_empty<'a>(rest: &'a str, verb: &str) -> Result<&'a str, ParseError> {
    if rest.is_empty() {
        Err(ParseError(format!("'{verb}' needs an argument; {USAGE}")))
    } else {
        Ok(rest)
    }
}

fn k_and_text(rest: &str, verb: &str) -> Result<(usize, String), ParseError> {
    let rest = non_empty(rest, verb)?;
    let (k, text) = rest
        .split_once(char::is_whitespace)
        .ok_or_else(|| ParseError(format!("usage: {verb} <k> <text>")))?;
    let k = k
        .parse::<usize>()
        .map_err(|_| ParseError(format!("k must be a positive integer, got '{k}'")))?;
    if k == 0 {
        return Err(ParseError("k must be a positive integer, got '0'".into()));
    }
    Ok((k, text.trim().to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remember_keeps_full_text() {
        assert_eq!(
            parse("remember  I like green tea ").unwrap(),
            Command::Remember("I like green tea".into())
        );
    }

    #[test]
    fn test_parse_recall() {
        assert_eq!(
            parse("recall 3 what do I drink").unwrap(),
            Command::Recall {
                k: 3,
                text: "what do I drink".into()
            }
        );
        assert_eq!(
            parse("RECALL-ALL 1 tea").unwrap(),
            Command::RecallAll {
                k: 1,
                text: "tea".into()
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_k() {
        assert!(parse("recall x tea").is_err());
        assert!(parse("recall 0 tea").is_err());
        assert!(parse("recall 5").is_err());
    }

    #[test]
    fn test_parse_forget() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(parse(&format!("forget {id}")).unwrap(), Command::Forget(id));
        assert!(parse("forget not-a-uuid").is_err());
        assert!(parse("forget").is_err());
    }

    #[test]
    fn test_parse_bare_commands() {
        assert_eq!(parse("history").unwrap(), Command::History);
        assert_eq!(parse("stats").unwrap(), Command::Stats);
        assert_eq!(parse("compact").unwrap(), Command::Compact);
        assert_eq!(parse("exit").unwrap(), Command::Quit);
        assert!(parse("dance").is_err());
    }
}
