//! Parsing of the interactive commands read from stdin.

use std::fmt;

use typeout_core::settings::SettingsPatch;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Start,
    Cancel,
    /// Replace the staged text.
    Text(String),
    /// Replace the staged text with a file's contents.
    Load(String),
    Clear,
    Reset,
    Settings,
    Set(SettingsPatch),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

pub const HELP: &str = "\
commands:
  start              hand the text to the engine and watch for the start key
  cancel             abort the current run
  text <TEXT>        stage TEXT (\\n for a newline)
  load <PATH>        stage the contents of PATH
  clear              clear the staged text
  reset              back to idle after a finished or aborted run
  settings           show delay bounds and post-completion behaviour
  set lower <MS>     minimum delay between keystrokes
  set upper <MS>     maximum delay between keystrokes
  set delete on|off  clear the text after a finished run
  status             show the current stage
  quit               exit (aborts an active run)";

/// Parse one input line. Returns `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<UserCommand>, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim_start();
    if trimmed.trim().is_empty() {
        return Ok(None);
    }

    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest),
        None => (trimmed, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "start" | "s" => UserCommand::Start,
        "cancel" | "c" | "abort" => UserCommand::Cancel,
        "text" | "t" => UserCommand::Text(unescape(rest)),
        "load" => {
            let path = rest.trim();
            if path.is_empty() {
                return Err(ParseError("load needs a file path".to_string()));
            }
            UserCommand::Load(path.to_string())
        }
        "clear" => UserCommand::Clear,
        "reset" => UserCommand::Reset,
        "settings" => UserCommand::Settings,
        "set" => UserCommand::Set(parse_set(rest)?),
        "status" => UserCommand::Status,
        "help" | "?" => UserCommand::Help,
        "quit" | "exit" | "q" => UserCommand::Quit,
        other => return Err(ParseError(format!("unknown command '{}', try 'help'", other))),
    };
    Ok(Some(command))
}

fn parse_set(rest: &str) -> Result<SettingsPatch, ParseError> {
    let mut parts = rest.split_whitespace();
    let (Some(field), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ParseError("usage: set lower|upper <MS> or set delete on|off".to_string()));
    };

    let mut patch = SettingsPatch::default();
    match field {
        "lower" | "upper" => {
            let ms: u64 = value
                .parse()
                .map_err(|_| ParseError(format!("'{}' is not a whole number of milliseconds", value)))?;
            if field == "lower" {
                patch.lower_delay_bound = Some(ms);
            } else {
                patch.upper_delay_bound = Some(ms);
            }
        }
        "delete" => {
            patch.delete_text_after_completion = Some(match value {
                "on" | "yes" | "true" => true,
                "off" | "no" | "false" => false,
                other => return Err(ParseError(format!("expected on or off, got '{}'", other))),
            });
        }
        other => return Err(ParseError(format!("unknown setting '{}'", other))),
    }
    Ok(patch)
}

/// Expand `\n`, `\t` and `\\` in staged text.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_line("start").unwrap(), Some(UserCommand::Start));
        assert_eq!(parse_line("  S \n").unwrap(), Some(UserCommand::Start));
        assert_eq!(parse_line("cancel").unwrap(), Some(UserCommand::Cancel));
        assert_eq!(parse_line("clear").unwrap(), Some(UserCommand::Clear));
        assert_eq!(parse_line("reset").unwrap(), Some(UserCommand::Reset));
        assert_eq!(parse_line("quit").unwrap(), Some(UserCommand::Quit));
        assert_eq!(parse_line("?").unwrap(), Some(UserCommand::Help));
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   \r\n").unwrap(), None);
    }

    #[test]
    fn test_text_keeps_inner_spacing_and_unescapes() {
        assert_eq!(
            parse_line("text hello  world\\nbye\\\\").unwrap(),
            Some(UserCommand::Text("hello  world\nbye\\".to_string()))
        );
        assert_eq!(
            parse_line("text").unwrap(),
            Some(UserCommand::Text(String::new()))
        );
    }

    #[test]
    fn test_load_requires_path() {
        assert!(parse_line("load").is_err());
        assert_eq!(
            parse_line("load notes.txt").unwrap(),
            Some(UserCommand::Load("notes.txt".to_string()))
        );
    }

    #[test]
    fn test_set_delays() {
        assert_eq!(
            parse_line("set lower 20").unwrap(),
            Some(UserCommand::Set(SettingsPatch {
                lower_delay_bound: Some(20),
                ..Default::default()
            }))
        );
        assert_eq!(
            parse_line("set upper 40").unwrap(),
            Some(UserCommand::Set(SettingsPatch {
                upper_delay_bound: Some(40),
                ..Default::default()
            }))
        );
    }

    #[test]
    fn test_set_rejects_non_numeric_delay() {
        let err = parse_line("set lower fast").unwrap_err();
        assert!(err.to_string().contains("fast"));
        assert!(parse_line("set upper -5").is_err());
        assert!(parse_line("set lower").is_err());
        assert!(parse_line("set lower 1 2").is_err());
    }

    #[test]
    fn test_set_delete_flag() {
        assert_eq!(
            parse_line("set delete on").unwrap(),
            Some(UserCommand::Set(SettingsPatch {
                delete_text_after_completion: Some(true),
                ..Default::default()
            }))
        );
        assert!(parse_line("set delete maybe").is_err());
        assert!(parse_line("set colour blue").is_err());
    }

    #[test]
    fn test_unknown_command() {
        let err = parse_line("launch").unwrap_err();
        assert!(err.to_string().contains("launch"));
    }
}
