//! Interactive console
//!
//! The line editor runs on a blocking thread and forwards parsed commands;
//! `execute` runs them against the session.

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::debug;

use crate::bindings::BindingKind;
use crate::fixable::{Color, FixableId, FixableKind, FixableValue};
use crate::session::{SessionHandle, SessionSnapshot};

/// A parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    List,
    Set { id: FixableId, value: String },
    Learn { id: FixableId, kind: Option<BindingKind> },
    Cancel,
    Bindings,
    Unbind(u8),
    Store,
    Restore,
    Connect(String),
    HangUp,
    Help,
    Quit,
}

/// Parse one console line; `Ok(None)` for blank lines
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let parse_id = |text: Option<&&str>| -> Result<FixableId, String> {
        text.and_then(|t| FixableId::parse(t))
            .ok_or_else(|| "expected a fixable id (name or group/name)".to_string())
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "list" | "ls" => ConsoleCommand::List,
        "set" => {
            let id = parse_id(args.first())?;
            if args.len() < 2 {
                return Err("usage: set <id> <value>".to_string());
            }
            ConsoleCommand::Set {
                id,
                value: args[1..].join(" "),
            }
        }
        "learn" | "bind" => {
            let id = parse_id(args.first())?;
            let kind = args.get(1).map(|k| k.parse()).transpose()?;
            ConsoleCommand::Learn { id, kind }
        }
        "cancel" => ConsoleCommand::Cancel,
        "bindings" => ConsoleCommand::Bindings,
        "unbind" => match args.first().and_then(|n| n.parse::<u8>().ok()) {
            Some(number) if number <= 127 => ConsoleCommand::Unbind(number),
            _ => return Err("usage: unbind <input 0-127>".to_string()),
        },
        "store" => ConsoleCommand::Store,
        "restore" => ConsoleCommand::Restore,
        "connect" => match args.first() {
            Some(endpoint) => ConsoleCommand::Connect(endpoint.to_string()),
            None => return Err("usage: connect <ws://host:port>".to_string()),
        },
        "hangup" | "disconnect" => ConsoleCommand::HangUp,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{}' (try 'help')", other)),
    };
    Ok(Some(command))
}

/// Parse a value typed for a fixable of `kind`, clamping floats to `range`
pub fn parse_value(
    text: &str,
    kind: FixableKind,
    range: Option<(f32, f32)>,
) -> Result<FixableValue, String> {
    let text = text.trim();
    match kind {
        FixableKind::Bool => match text.to_ascii_lowercase().as_str() {
            "on" | "true" | "1" | "yes" => Ok(FixableValue::Bool(true)),
            "off" | "false" | "0" | "no" => Ok(FixableValue::Bool(false)),
            _ => Err(format!("'{}' is not on/off", text)),
        },
        FixableKind::Float => text
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| FixableValue::Float(v).clamped(range))
            .ok_or_else(|| format!("'{}' is not a number", text)),
        FixableKind::Color => Color::from_hex(text)
            .map(FixableValue::Color)
            .ok_or_else(|| format!("'{}' is not #rrggbb or #rrggbbaa", text)),
        FixableKind::Divider | FixableKind::Group => Err(format!("{} entries hold no value", kind)),
    }
}

/// Read lines on a blocking thread until EOF, Ctrl+C or `quit`
pub fn spawn_console(tx: mpsc::UnboundedSender<ConsoleCommand>) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Console unavailable: {}", e);
                return;
            }
        };

        loop {
            match rl.readline("fixa> ") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    match parse_command(&line) {
                        Ok(Some(command)) => {
                            let quit = command == ConsoleCommand::Quit;
                            if tx.send(command).is_err() || quit {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => println!("{}", e.red()),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    let _ = tx.send(ConsoleCommand::Quit);
                    break;
                }
                Err(e) => {
                    debug!("Console read failed: {}", e);
                    break;
                }
            }
        }
    })
}

/// Run one command; returns false when the console asked to quit
pub async fn execute(command: ConsoleCommand, session: &SessionHandle) -> Result<bool> {
    match command {
        ConsoleCommand::List => print_snapshot(&session.snapshot().await?),
        ConsoleCommand::Set { id, value } => {
            let snapshot = session.snapshot().await?;
            let Some(row) = snapshot.row(&id) else {
                println!("{}", format!("unknown fixable '{}'", id).red());
                return Ok(true);
            };
            match parse_value(&value, row.kind, row.range) {
                Ok(value) => session.apply_local_edit(id, value),
                Err(e) => println!("{}", e.red()),
            }
        }
        ConsoleCommand::Learn { id, kind } => {
            let result = match kind {
                Some(kind) => session.start_binding_as(id.clone(), kind).await,
                None => session.start_binding(id.clone()).await,
            };
            match result {
                Ok(kind) => println!(
                    "Move a control to bind {} as {} ({} to abort)",
                    id.to_string().yellow(),
                    kind,
                    "cancel".cyan()
                ),
                Err(e) => println!("{}", e.to_string().red()),
            }
        }
        ConsoleCommand::Cancel => session.cancel_binding(),
        ConsoleCommand::Bindings => {
            let bindings = session.bindings().await?;
            if bindings.is_empty() {
                println!("No bindings");
            }
            for (number, descriptor) in bindings {
                println!("  {:>3}  {}", number.to_string().green(), descriptor);
            }
        }
        ConsoleCommand::Unbind(number) => match session.unbind(number).await? {
            Some(descriptor) => println!("Input {} no longer drives {}", number, descriptor),
            None => println!("Input {} is not bound", number),
        },
        ConsoleCommand::Store => match session.persist().await {
            Ok(count) => println!("Stored {} values", count),
            Err(e) => println!("{}", e.to_string().red()),
        },
        ConsoleCommand::Restore => match session.restore().await {
            Ok(count) => println!("Restored {} values", count),
            Err(e) => println!("{}", e.to_string().red()),
        },
        ConsoleCommand::Connect(endpoint) => session.open_connection(endpoint),
        ConsoleCommand::HangUp => session.hang_up(),
        ConsoleCommand::Help => print_help(),
        ConsoleCommand::Quit => return Ok(false),
    }
    Ok(true)
}

pub fn print_snapshot(snapshot: &SessionSnapshot) {
    let title = snapshot.stream_name.as_deref().unwrap_or("(no session)");
    println!("\n{} [{}]", title.bold().cyan(), snapshot.state);

    for row in &snapshot.rows {
        let indent = "  ".repeat(row.depth + 1);
        match row.kind {
            FixableKind::Divider => println!("{}{}", indent, row.label.bold()),
            FixableKind::Group => println!("{}{}:", indent, row.label.bold()),
            _ => {
                let value = row
                    .value
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let dirty = if snapshot.dirty.contains(&row.id) { "*" } else { " " };
                let range = row
                    .range
                    .map(|(min, max)| format!(" [{} .. {}]", min, max))
                    .unwrap_or_default();
                println!(
                    "{}{}{} {} = {}{}",
                    indent,
                    dirty.yellow(),
                    row.label,
                    format!("({})", row.id).dimmed(),
                    value.green(),
                    range.dimmed()
                );
            }
        }
    }

    if let Some((id, kind)) = &snapshot.pending_binding {
        println!("\nWaiting for a control to bind {} as {}", id.to_string().yellow(), kind);
    }
}

pub fn print_help() {
    println!("\n{}", "Commands:".bold());
    let commands = [
        ("list", "show fixables and their values"),
        ("set <id> <value>", "edit a value (on/off, number, #rrggbb)"),
        ("learn <id> [kind]", "bind the next control (hold, toggle, stepper, event)"),
        ("cancel", "leave learn mode"),
        ("bindings", "list controller bindings"),
        ("unbind <input>", "remove the binding of an input number"),
        ("store / restore", "save or reload values for this stream"),
        ("connect <endpoint>", "connect to a target (ws://host:port)"),
        ("hangup", "end the session"),
        ("quit", "exit"),
    ];
    for (usage, text) in commands {
        println!("  {:<22} {}", usage.cyan(), text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("list"), Ok(Some(ConsoleCommand::List)));
        assert_eq!(parse_command("  QUIT "), Ok(Some(ConsoleCommand::Quit)));
        assert_eq!(parse_command("hangup"), Ok(Some(ConsoleCommand::HangUp)));
        assert_eq!(parse_command("   "), Ok(None));
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn test_parse_set() {
        assert_eq!(
            parse_command("set geometry/size 42.5"),
            Ok(Some(ConsoleCommand::Set {
                id: FixableId::in_group("size", "geometry"),
                value: "42.5".to_string(),
            }))
        );
        assert!(parse_command("set size").is_err());
        assert!(parse_command("set").is_err());
    }

    #[test]
    fn test_parse_learn_with_kind() {
        assert_eq!(
            parse_command("learn open toggle"),
            Ok(Some(ConsoleCommand::Learn {
                id: FixableId::new("open"),
                kind: Some(BindingKind::Toggle),
            }))
        );
        assert_eq!(
            parse_command("learn size"),
            Ok(Some(ConsoleCommand::Learn {
                id: FixableId::new("size"),
                kind: None,
            }))
        );
        assert!(parse_command("learn open knob").is_err());
    }

    #[test]
    fn test_parse_connect_requires_endpoint() {
        assert_eq!(
            parse_command("connect ws://localhost:9400"),
            Ok(Some(ConsoleCommand::Connect("ws://localhost:9400".to_string())))
        );
        assert!(parse_command("connect").is_err());
    }

    #[test]
    fn test_parse_value_by_kind() {
        assert_eq!(parse_value("on", FixableKind::Bool, None), Ok(FixableValue::Bool(true)));
        assert_eq!(parse_value("False", FixableKind::Bool, None), Ok(FixableValue::Bool(false)));
        assert_eq!(parse_value("-30", FixableKind::Float, None), Ok(FixableValue::Float(-30.0)));
        assert!(parse_value("nan", FixableKind::Float, None).is_err());
        assert!(parse_value("maybe", FixableKind::Bool, None).is_err());
        assert_eq!(
            parse_value("#ff0000", FixableKind::Color, None),
            Ok(FixableValue::Color(Color {
                r: 1.0,
                g: 0.0,
                b: 0.0,
                a: 1.0
            }))
        );
        assert!(parse_value("x", FixableKind::Divider, None).is_err());
    }

    #[test]
    fn test_parse_value_clamps_to_range() {
        let range = Some((10.0, 150.0));
        assert_eq!(
            parse_value("9999", FixableKind::Float, range),
            Ok(FixableValue::Float(150.0))
        );
        assert_eq!(
            parse_value("-4", FixableKind::Float, range),
            Ok(FixableValue::Float(10.0))
        );
        assert_eq!(parse_value("on", FixableKind::Bool, range), Ok(FixableValue::Bool(true)));
    }

    #[test]
    fn test_parse_unbind() {
        assert_eq!(parse_command("unbind 21"), Ok(Some(ConsoleCommand::Unbind(21))));
        assert!(parse_command("unbind").is_err());
        assert!(parse_command("unbind 200").is_err());
        assert!(parse_command("unbind knob").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_sends_clamped_value() {
        use crate::fixable::{FixableConfig, FixableDisplay};
        use crate::session::{SessionEvent, SessionSettings};
        use crate::transport::MemoryConnector;
        use crate::wire::WireMessage;
        use std::sync::Arc;

        let size = FixableId::new("size");
        let connector = Arc::new(MemoryConnector::new());
        let mut peer = connector.add_peer();
        let settings = SessionSettings {
            sync_on_start: false,
            ..SessionSettings::default()
        };
        let (session, mut events) = SessionHandle::spawn(settings, connector, None);

        session.open_connection("memory://envelope");
        peer.send(&WireMessage::SessionStart {
            stream_name: "envelope".to_string(),
            configs: vec![(
                size.clone(),
                FixableConfig::Float {
                    min: 10.0,
                    max: 150.0,
                    display: FixableDisplay::new("Envelope size", 0),
                },
            )],
            values: vec![(size.clone(), FixableValue::Float(50.0))],
        })
        .unwrap();
        loop {
            let event = events.recv().await.expect("event stream closed");
            if matches!(event, SessionEvent::Connected { .. }) {
                break;
            }
        }

        let command = parse_command("set size 9999").unwrap().unwrap();
        assert!(execute(command, &session).await.unwrap());

        match peer.recv().await {
            Some(Ok(WireMessage::ValueBatch { values })) => {
                assert_eq!(values, vec![(size, FixableValue::Float(150.0))]);
            }
            other => panic!("expected value batch, got {:?}", other),
        }
    }
}
