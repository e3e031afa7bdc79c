use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use winit::event_loop::EventLoopProxy;

pub const HELP: &str = "\
commands:
  set <field> <value>       type a value into a field's widget
  slide <field> <value>     move a continuous field's slider
  toggle <field> [on|off]   flip or set a boolean field
  show [field]              print one field or every field
  publish                   push the tunable subset to the remote store
  save <name>               store the full configuration as a profile
  load <name>               merge a stored profile into the live configuration
  rename <old> <new>        rename a profile in place
  delete <name>             remove a profile
  profiles                  list stored profiles
  source                    print the generated fragment shader
  help                      print this list
  quit                      close the preview";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Set { field: String, value: String },
    Slide { field: String, value: f64 },
    Toggle { field: String, value: Option<bool> },
    Show(Option<String>),
    Publish,
    Save(String),
    Load(String),
    Rename { from: String, to: String },
    Delete(String),
    Profiles,
    Source,
    Help,
    Quit,
}

/// Events delivered to the preview's event loop.
#[derive(Debug)]
pub enum UserEvent {
    Console(ConsoleCommand),
    ConsoleClosed,
}

pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn required<'a>(value: Option<&'a str>, usage: &str) -> Result<&'a str, String> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(format!("usage: {usage}")),
    }
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let mut words = rest.split_whitespace();

        let command = match verb.to_ascii_lowercase().as_str() {
            "set" => {
                let field = required(words.next(), "set <field> <value>")?.to_string();
                let value = words.collect::<Vec<_>>().join(" ");
                ConsoleCommand::Set { field, value }
            }
            "slide" => {
                let field = required(words.next(), "slide <field> <value>")?.to_string();
                let raw = required(words.next(), "slide <field> <value>")?;
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| format!("'{raw}' is not a number"))?;
                ConsoleCommand::Slide { field, value }
            }
            "toggle" => {
                let field = required(words.next(), "toggle <field> [on|off]")?.to_string();
                let value = match words.next() {
                    Some(raw) => {
                        let flag = parse_flag(raw).ok_or_else(|| format!("'{raw}' is not on/off"))?;
                        Some(flag)
                    }
                    None => None,
                };
                ConsoleCommand::Toggle { field, value }
            }
            "show" => ConsoleCommand::Show(words.next().map(str::to_string)),
            "publish" => ConsoleCommand::Publish,
            "save" => ConsoleCommand::Save(required(Some(rest), "save <name>")?.to_string()),
            "load" => ConsoleCommand::Load(required(Some(rest), "load <name>")?.to_string()),
            "delete" => ConsoleCommand::Delete(required(Some(rest), "delete <name>")?.to_string()),
            "rename" => {
                let from = required(words.next(), "rename <old> <new>")?.to_string();
                let to = required(words.next(), "rename <old> <new>")?.to_string();
                if words.next().is_some() {
                    return Err("usage: rename <old> <new>".into());
                }
                ConsoleCommand::Rename { from, to }
            }
            "profiles" => ConsoleCommand::Profiles,
            "source" => ConsoleCommand::Source,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(format!("unknown command '{other}'; try 'help'")),
        };
        Ok(command)
    }
}

/// Reads commands from stdin and forwards them to the event loop until
/// stdin closes or the loop has gone away.
pub fn spawn_reader(proxy: EventLoopProxy<UserEvent>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("ribbontune-console".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("failed to read console input: {err}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match ConsoleCommand::parse(&line) {
                    Ok(command) => {
                        if proxy.send_event(UserEvent::Console(command)).is_err() {
                            debug!("event loop closed; stopping console reader");
                            return;
                        }
                    }
                    Err(message) => eprintln!("{message}"),
                }
            }
            let _ = proxy.send_event(UserEvent::ConsoleClosed);
        })
        .context("failed to spawn console reader thread")
}
