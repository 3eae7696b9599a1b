//! Interactive session (spec §6 "Interactive commands"): a line tokenizer
//! implementing the quoting/backslash-escape rules, and prefix-matched,
//! case-insensitive command dispatch over a shared [`crate::Session`].

use crate::Session;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("unterminated escape sequence")]
    UnterminatedEscape,
    #[error("invalid \\x escape")]
    InvalidHexEscape,
}

/// Split `line` on unquoted whitespace; `'` and `"` group fields; backslash
/// escapes `\\ \n \r \t \" \' \<space> \xHH`.
pub fn tokenize(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut current = Vec::<u8>::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            in_token = true;
            let esc = chars.next().ok_or(TokenizeError::UnterminatedEscape)?;
            push_escape(&mut current, esc, &mut chars)?;
            continue;
        }
        if let Some(q) = quote {
            if c == q {
                quote = None;
            } else {
                push_char(&mut current, c);
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                in_token = true;
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(take_token(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                push_char(&mut current, c);
            }
        }
    }

    if quote.is_some() {
        return Err(TokenizeError::UnterminatedQuote);
    }
    if in_token {
        tokens.push(take_token(&mut current));
    }
    Ok(tokens)
}

fn push_char(buf: &mut Vec<u8>, c: char) {
    let mut enc = [0u8; 4];
    buf.extend_from_slice(c.encode_utf8(&mut enc).as_bytes());
}

fn push_escape(buf: &mut Vec<u8>, esc: char, chars: &mut std::str::Chars) -> Result<(), TokenizeError> {
    match esc {
        '\\' => buf.push(b'\\'),
        'n' => buf.push(b'\n'),
        'r' => buf.push(b'\r'),
        't' => buf.push(b'\t'),
        '"' => buf.push(b'"'),
        '\'' => buf.push(b'\''),
        ' ' => buf.push(b' '),
        'x' => {
            let hi = chars.next().ok_or(TokenizeError::InvalidHexEscape)?;
            let lo = chars.next().ok_or(TokenizeError::InvalidHexEscape)?;
            let mut digits = String::with_capacity(2);
            digits.push(hi);
            digits.push(lo);
            let byte = u8::from_str_radix(&digits, 16).map_err(|_| TokenizeError::InvalidHexEscape)?;
            buf.push(byte);
        }
        _ => return Err(TokenizeError::InvalidHexEscape),
    }
    Ok(())
}

fn take_token(buf: &mut Vec<u8>) -> String {
    let s = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    s
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InteractiveError {
    #[error("empty input")]
    EmptyLine,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("command {0:?} matches more than one of help/exit/list/query")]
    AmbiguousCommand(String),
    #[error("query requires a path argument")]
    MissingPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Exit,
    List,
    Query { path: String, bindings: Vec<String> },
}

const COMMAND_NAMES: &[&str] = &["help", "exit", "list", "query"];

fn match_command(word: &str) -> Result<&'static str, InteractiveError> {
    if word == "?" {
        return Ok("help");
    }
    let lower = word.to_ascii_lowercase();
    let matches: Vec<&str> = COMMAND_NAMES.iter().copied().filter(|c| c.starts_with(lower.as_str())).collect();
    match matches.len() {
        1 => Ok(matches[0]),
        0 => Err(InteractiveError::UnknownCommand(word.to_string())),
        _ => Err(InteractiveError::AmbiguousCommand(word.to_string())),
    }
}

pub fn parse_command(tokens: &[String]) -> Result<Command, InteractiveError> {
    let first = tokens.first().ok_or(InteractiveError::EmptyLine)?;
    match match_command(first)? {
        "help" => Ok(Command::Help),
        "exit" => Ok(Command::Exit),
        "list" => Ok(Command::List),
        "query" => {
            let path = tokens.get(1).ok_or(InteractiveError::MissingPath)?.clone();
            let bindings = tokens[2..].to_vec();
            Ok(Command::Query { path, bindings })
        }
        _ => unreachable!("match_command only returns names in COMMAND_NAMES"),
    }
}

const HELP_TEXT: &str = "\
commands: help|?  exit  list  query <path> [var=value ...]
  help, ?   show this text
  exit      leave the session
  list      list every device/service/action the gateway exposes
  query     invoke <path> as [<device>/]<service>/<action>, binding any
            var=value pairs to the action's input arguments";

/// Run the interactive read-eval-print loop against `session` until `exit`
/// or EOF. Prefix-matched commands and parse errors are reported to stderr
/// through `session.diag` and do not end the session.
pub fn run(session: &mut Session) -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("tr64c> ");
        stdout.flush()?;

        let mut line = String::new();
        let n = stdin.lock().read_line(&mut line)?;
        if n == 0 {
            return Ok(());
        }
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }

        let tokens = match tokenize(line) {
            Ok(t) => t,
            Err(e) => {
                session.diag.error(&e);
                continue;
            }
        };
        if tokens.is_empty() {
            continue;
        }

        let command = match parse_command(&tokens) {
            Ok(c) => c,
            Err(e) => {
                session.diag.error(&e);
                continue;
            }
        };

        match command {
            Command::Help => println!("{HELP_TEXT}"),
            Command::Exit => return Ok(()),
            Command::List => match session.list() {
                Ok(text) => println!("{text}"),
                Err(e) => session.diag.error(&e),
            },
            Command::Query { path, bindings } => match session.query(&path, &bindings) {
                Ok(bytes) => {
                    stdout.write_all(&bytes)?;
                    if bytes.last() != Some(&b'\n') {
                        println!();
                    }
                }
                Err(e) => session.diag.error(&e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_unquoted_whitespace() {
        let tokens = tokenize("query WANIPConnection/GetExternalIPAddress").unwrap();
        assert_eq!(tokens, vec!["query", "WANIPConnection/GetExternalIPAddress"]);
    }

    #[test]
    fn single_and_double_quotes_group_fields() {
        let tokens = tokenize(r#"query a/b "New Name=hello world" 'x=y z'"#).unwrap();
        assert_eq!(tokens, vec!["query", "a/b", "New Name=hello world", "x=y z"]);
    }

    #[test]
    fn backslash_escapes_are_decoded() {
        let tokens = tokenize(r"a\ b\tc\x41").unwrap();
        assert_eq!(tokens, vec!["a b\tcA"]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(tokenize("\"unterminated"), Err(TokenizeError::UnterminatedQuote));
    }

    #[test]
    fn help_and_question_mark_are_aliases() {
        assert_eq!(parse_command(&["help".to_string()]).unwrap(), Command::Help);
        assert_eq!(parse_command(&["?".to_string()]).unwrap(), Command::Help);
    }

    #[test]
    fn commands_prefix_match_case_insensitively() {
        assert_eq!(parse_command(&["EX".to_string()]).unwrap(), Command::Exit);
        assert_eq!(parse_command(&["li".to_string()]).unwrap(), Command::List);
    }

    #[test]
    fn query_collects_path_and_bindings() {
        let tokens: Vec<String> = ["q", "a/b/c", "X=1", "Y=2"].iter().map(|s| s.to_string()).collect();
        let cmd = parse_command(&tokens).unwrap();
        assert_eq!(
            cmd,
            Command::Query {
                path: "a/b/c".to_string(),
                bindings: vec!["X=1".to_string(), "Y=2".to_string()],
            }
        );
    }

    #[test]
    fn query_without_a_path_is_an_error() {
        assert_eq!(parse_command(&["query".to_string()]), Err(InteractiveError::MissingPath));
    }
}
