//! Line-oriented console front end.
//!
//! Reads one command per line from stdin, turns it into an orchestrator
//! intent and prints status changes as they are published.

use crate::domain::color::Rgb;
use crate::domain::error::{OrchestratorError, OrchestratorResult};
use crate::domain::led::LedMode;
use crate::domain::models::{ConnectionStatus, FanPreset, Snapshot};
use crate::domain::preferences::DeviceNameMap;
use crate::orchestrator::tasks::ScheduledTask;
use crate::orchestrator::Orchestrator;
use std::fmt::Write as _;
use std::iter::Peekable;
use std::str::SplitWhitespace;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const HELP: &str = "\
commands:
  status                          show connection and device state
  scan                            refresh the device list
  select <uuid|number>            choose the device to connect to
  connect [uuid]                  connect to the selected or given device
  disconnect | toggle
  led on <#rrggbb|r g b> [breathe] [rainbow] | led off
  fan on <duty> | fan off | fan preset <id> | fan +[n] | fan -[n]
  pump on <duty> <voltage> | pump off | pump +[n] | pump -[n]
  hold fan|pump <+[n]|-[n]>       repeat a nudge until 'release'
  release
  presets                         list the fan presets
  name [text]                     name the connected device, blank clears
  names                           list saved device names
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Fan,
    Pump,
}

/// Nudge size; a bare `+` or `-` uses the configured step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    By(i64),
    Up,
    Down,
}

impl Step {
    pub fn offset(self, default_step: i64) -> i64 {
        match self {
            Self::By(offset) => offset,
            Self::Up => default_step,
            Self::Down => -default_step,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorArg {
    Hex(String),
    /// Raw channel values, clamped to 0..=255 when applied
    Channels(i64, i64, i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Scan,
    Select(String),
    Connect(Option<String>),
    Disconnect,
    Toggle,
    LedOn {
        color: ColorArg,
        breathe: bool,
        rainbow: bool,
    },
    LedOff,
    FanOn(i64),
    FanOff,
    FanPreset(String),
    PumpOn(i64, u8),
    PumpOff,
    Nudge(Part, Step),
    Hold(Part, Step),
    Release,
    Presets,
    Name(String),
    Names,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

fn number<T: std::str::FromStr>(word: Option<&str>, usage: &'static str) -> Result<T, CommandError> {
    word.and_then(|w| w.parse().ok()).ok_or(CommandError::Usage(usage))
}

/// Signed offset such as `+5` or `-10`, or a bare sign
fn step(word: &str) -> Option<Step> {
    match word {
        "+" => Some(Step::Up),
        "-" => Some(Step::Down),
        _ if word.starts_with('+') || word.starts_with('-') => word.parse().ok().map(Step::By),
        _ => None,
    }
}

/// `#rrggbb` or three channel values. A lone number is read as hex.
fn color_arg(
    words: &mut Peekable<SplitWhitespace<'_>>,
    usage: &'static str,
) -> Result<ColorArg, CommandError> {
    let first = words.next().ok_or(CommandError::Usage(usage))?;
    let channels = words.peek().is_some_and(|next| next.parse::<i64>().is_ok());
    match first.parse::<i64>() {
        Ok(red) if channels => {
            let green = number(words.next(), usage)?;
            let blue = number(words.next(), usage)?;
            Ok(ColorArg::Channels(red, green, blue))
        }
        _ => Ok(ColorArg::Hex(first.to_string())),
    }
}

fn part(word: Option<&str>) -> Option<Part> {
    match word? {
        "fan" => Some(Part::Fan),
        "pump" => Some(Part::Pump),
        _ => None,
    }
}

pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let mut words = line.split_whitespace().peekable();
    let Some(head) = words.next() else {
        return Ok(None);
    };

    let command = match head.to_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "status" => Command::Status,
        "scan" | "list" => Command::Scan,
        "select" => Command::Select(
            words
                .next()
                .ok_or(CommandError::Usage("select <uuid|number>"))?
                .to_string(),
        ),
        "connect" => Command::Connect(words.next().map(str::to_string)),
        "disconnect" => Command::Disconnect,
        "toggle" => Command::Toggle,
        "led" => match words.next() {
            Some("off") => Command::LedOff,
            Some("on") => {
                let usage = "led on <#rrggbb|r g b> [breathe] [rainbow]";
                let color = color_arg(&mut words, usage)?;
                let (mut breathe, mut rainbow) = (false, false);
                for flag in words.by_ref() {
                    match flag {
                        "breathe" => breathe = true,
                        "rainbow" => rainbow = true,
                        _ => return Err(CommandError::Usage(usage)),
                    }
                }
                Command::LedOn {
                    color,
                    breathe,
                    rainbow,
                }
            }
            _ => {
                return Err(CommandError::Usage(
                    "led on <#rrggbb|r g b> [breathe] [rainbow] | led off",
                ))
            }
        },
        "fan" => match words.next() {
            Some("on") => Command::FanOn(number(words.next(), "fan on <duty>")?),
            Some("off") => Command::FanOff,
            Some("preset") => Command::FanPreset(
                words
                    .next()
                    .ok_or(CommandError::Usage("fan preset <id>"))?
                    .to_string(),
            ),
            word => {
                let usage = "fan on <duty> | off | preset <id> | +[n] | -[n]";
                Command::Nudge(Part::Fan, word.and_then(step).ok_or(CommandError::Usage(usage))?)
            }
        },
        "pump" => match words.next() {
            Some("on") => {
                let usage = "pump on <duty> <voltage>";
                let duty = number(words.next(), usage)?;
                Command::PumpOn(duty, number(words.next(), usage)?)
            }
            Some("off") => Command::PumpOff,
            word => {
                let usage = "pump on <duty> <voltage> | off | +[n] | -[n]";
                Command::Nudge(Part::Pump, word.and_then(step).ok_or(CommandError::Usage(usage))?)
            }
        },
        "hold" => {
            let usage = "hold fan|pump <+[n]|-[n]>";
            let target = part(words.next()).ok_or(CommandError::Usage(usage))?;
            let size = words.next().and_then(step).ok_or(CommandError::Usage(usage))?;
            Command::Hold(target, size)
        }
        "release" => Command::Release,
        "presets" => Command::Presets,
        "name" => Command::Name(words.collect::<Vec<_>>().join(" ")),
        "names" => Command::Names,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// Human readable summary of a snapshot
pub fn render_snapshot(snapshot: &Snapshot) -> String {
    let mut out = String::new();

    match (snapshot.status, snapshot.display_name()) {
        (ConnectionStatus::Connected, Some(name)) if snapshot.bluetooth_available => {
            let _ = writeln!(out, "{} {}", snapshot.status_line(), name);
        }
        _ => {
            let _ = writeln!(out, "{}", snapshot.status_line());
        }
    }

    for (index, device) in snapshot.devices.iter().enumerate() {
        let marker = if snapshot.selected_device.as_deref() == Some(device.uuid.as_str()) {
            '*'
        } else {
            ' '
        };
        let label = snapshot
            .device_names
            .get(&device.uuid)
            .or(device.discovered_name.as_deref())
            .unwrap_or("");
        let _ = writeln!(out, " {} [{}] {} {}", marker, index + 1, device.uuid, label);
    }

    if snapshot.status == ConnectionStatus::Connected && snapshot.state_initialized {
        let c = &snapshot.controls;
        let on_off = |on: bool| if on { "on" } else { "off" };
        let mode = LedMode::from(c.led_view);
        let _ = writeln!(out, "  led  {} {} {:?}", on_off(c.led_on), c.color, mode);
        let _ = writeln!(out, "  fan  {} {}", on_off(c.fan_on), c.fan_duty);
        let _ = writeln!(
            out,
            "  pump {} {} at {} V",
            on_off(c.pump_on),
            c.pump_duty,
            c.pump_voltage
        );
    }

    out.trim_end().to_string()
}

pub fn render_presets(presets: &[FanPreset]) -> String {
    presets
        .iter()
        .map(|preset| format!("  {:<8} {:<10} {}", preset.id, preset.name, preset.duty))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_names(names: &DeviceNameMap) -> String {
    let mut out = format!("{} saved name(s)", names.len());
    for (uuid, name) in names.iter() {
        let _ = write!(out, "\n  {} {}", uuid, name);
    }
    out
}

/// A `select` argument is either a 1-based list position or a uuid
fn resolve_device(snapshot: &Snapshot, word: &str) -> String {
    word.parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| snapshot.devices.get(i))
        .map(|device| device.uuid.clone())
        .unwrap_or_else(|| word.to_string())
}

async fn execute(orchestrator: &Arc<Orchestrator>, command: Command) -> OrchestratorResult<()> {
    match command {
        Command::Help => println!("{}", HELP),
        Command::Status => println!("{}", render_snapshot(&orchestrator.snapshot())),
        Command::Scan => {
            orchestrator.refresh_device_list().await?;
            println!("{}", render_snapshot(&orchestrator.snapshot()));
        }
        Command::Select(word) => {
            let uuid = resolve_device(&orchestrator.snapshot(), &word);
            orchestrator.select_device(&uuid)?;
        }
        Command::Connect(Some(uuid)) => orchestrator.connect(&uuid).await?,
        Command::Connect(None) => orchestrator.connect_selected().await?,
        Command::Disconnect => orchestrator.disconnect().await?,
        Command::Toggle => orchestrator.toggle_connection().await?,
        Command::LedOn {
            color: ColorArg::Hex(hex),
            breathe,
            rainbow,
        } => orchestrator.set_led_hex(true, &hex, breathe, rainbow).await?,
        Command::LedOn {
            color: ColorArg::Channels(red, green, blue),
            breathe,
            rainbow,
        } => {
            let color = Rgb::clamped(red, green, blue);
            orchestrator.set_led(true, color, breathe, rainbow).await?
        }
        Command::LedOff => orchestrator.stop_led().await?,
        Command::FanOn(duty) => orchestrator.set_fan(true, duty).await?,
        Command::FanOff => orchestrator.stop_fan().await?,
        Command::FanPreset(id) => orchestrator.apply_fan_preset(&id).await?,
        Command::PumpOn(duty, voltage) => orchestrator.set_pump(true, duty, voltage).await?,
        Command::PumpOff => orchestrator.stop_pump().await?,
        Command::Nudge(target, size) => {
            let offset = size.offset(orchestrator.config().nudge_step);
            match target {
                Part::Fan => orchestrator.nudge_fan(offset).await?,
                Part::Pump => orchestrator.nudge_pump(offset).await?,
            }
        }
        Command::Hold(target, size) => {
            let offset = size.offset(orchestrator.config().nudge_step);
            match target {
                Part::Fan => orchestrator.hold_fan_nudge(offset),
                Part::Pump => orchestrator.hold_pump_nudge(offset),
            }
        }
        Command::Release => orchestrator.release_hold(),
        Command::Presets => println!("{}", render_presets(&orchestrator.config().fan_presets)),
        Command::Name(name) => orchestrator.rename_selected_device(&name)?,
        Command::Names => println!("{}", render_names(&orchestrator.snapshot().device_names)),
        Command::Quit => {}
    }
    Ok(())
}

fn report(error: &OrchestratorError) {
    if error.is_silent() {
        debug!("Ignored: {}", error);
    } else {
        eprintln!("error: {}", error);
    }
}

/// Print the status line whenever the connection status or the capability
/// changes
fn watch_status(orchestrator: &Orchestrator) -> ScheduledTask {
    let mut updates = orchestrator.subscribe();
    ScheduledTask::spawn(async move {
        let mut shown = {
            let s = updates.borrow_and_update();
            (s.status, s.bluetooth_available)
        };
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            let current = (snapshot.status, snapshot.bluetooth_available);
            if current != shown {
                shown = current;
                println!("{}", render_snapshot(&snapshot));
            }
        }
    })
}

/// Run the console until `quit` or end of input
pub async fn run_console(orchestrator: Arc<Orchestrator>) -> anyhow::Result<()> {
    let mut watcher = watch_status(&orchestrator);
    println!("{}", render_snapshot(&orchestrator.snapshot()));
    println!("type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => {
                if let Err(e) = execute(&orchestrator, command).await {
                    report(&e);
                }
            }
            Ok(None) => {}
            Err(e) => eprintln!("{}", e),
        }
    }

    watcher.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DeviceIdentity;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("scan", Command::Scan)]
    #[case("  connect  ", Command::Connect(None))]
    #[case("connect A1", Command::Connect(Some("A1".to_string())))]
    #[case("led off", Command::LedOff)]
    #[case(
        "led on #00ff00 rainbow",
        Command::LedOn { color: ColorArg::Hex("#00ff00".to_string()), breathe: false, rainbow: true }
    )]
    #[case(
        "led on 300 20 -4 breathe",
        Command::LedOn { color: ColorArg::Channels(300, 20, -4), breathe: true, rainbow: false }
    )]
    #[case("fan on 55", Command::FanOn(55))]
    #[case("fan -5", Command::Nudge(Part::Fan, Step::By(-5)))]
    #[case("fan +", Command::Nudge(Part::Fan, Step::Up))]
    #[case("fan preset slow", Command::FanPreset("slow".to_string()))]
    #[case("pump on 70 12", Command::PumpOn(70, 12))]
    #[case("pump +10", Command::Nudge(Part::Pump, Step::By(10)))]
    #[case("hold pump -5", Command::Hold(Part::Pump, Step::By(-5)))]
    #[case("hold fan -", Command::Hold(Part::Fan, Step::Down))]
    #[case("presets", Command::Presets)]
    #[case("names", Command::Names)]
    #[case("name Desk  loop", Command::Name("Desk loop".to_string()))]
    #[case("name", Command::Name(String::new()))]
    #[case("EXIT", Command::Quit)]
    fn test_parse_command(#[case] line: &str, #[case] expected: Command) {
        assert_eq!(parse_command(line).unwrap(), Some(expected));
    }

    #[rstest]
    #[case("fan 5")]
    #[case("fan on fast")]
    #[case("pump on 70")]
    #[case("led on #00ff00 sparkle")]
    #[case("led on 10 20")]
    #[case("led on 10 20 x")]
    #[case("hold fan 5")]
    #[case("select")]
    fn test_parse_usage_errors(#[case] line: &str) {
        assert!(matches!(parse_command(line), Err(CommandError::Usage(_))));
    }

    #[test]
    fn test_blank_and_unknown_lines() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(
            parse_command("warp 9"),
            Err(CommandError::Unknown("warp".to_string()))
        );
    }

    #[test]
    fn test_select_accepts_list_position() {
        let snapshot = Snapshot {
            devices: vec![DeviceIdentity::new("A"), DeviceIdentity::new("B")],
            ..Default::default()
        };
        assert_eq!(resolve_device(&snapshot, "2"), "B");
        assert_eq!(resolve_device(&snapshot, "7"), "7");
        assert_eq!(resolve_device(&snapshot, "A"), "A");
    }

    #[test]
    fn test_render_marks_selection_and_names() {
        let mut snapshot = Snapshot {
            bluetooth_available: true,
            devices: vec![DeviceIdentity::named("A", "AQUARIS"), DeviceIdentity::new("B")],
            selected_device: Some("B".to_string()),
            ..Default::default()
        };
        snapshot.device_names.set("B", "Desk loop");

        assert_eq!(
            render_snapshot(&snapshot),
            "Looking for devices...\n   [1] A AQUARIS\n * [2] B Desk loop"
        );
    }

    #[test]
    fn test_bare_step_uses_configured_size() {
        assert_eq!(Step::Up.offset(5), 5);
        assert_eq!(Step::Down.offset(5), -5);
        assert_eq!(Step::By(-12).offset(5), -12);
    }

    #[test]
    fn test_render_presets_and_names() {
        let presets = vec![FanPreset::new("slow", "Slow", 50)];
        assert_eq!(render_presets(&presets), "  slow     Slow       50%");

        let mut names = DeviceNameMap::default();
        names.set("A", "Desk loop");
        names.set("B", "Rack");
        assert_eq!(render_names(&names), "2 saved name(s)\n  A Desk loop\n  B Rack");
    }

    #[tokio::test]
    async fn test_channel_color_is_clamped() {
        use crate::orchestrator::test_support::*;

        let h = connected(&["A"], "A").await;
        let command = parse_command("led on 300 20 -4").unwrap().unwrap();

        execute(&h.orchestrator, command).await.unwrap();

        let hardware = h.transport.hardware("A").unwrap();
        assert_eq!((hardware.red, hardware.green, hardware.blue), (255, 20, 0));
        assert_eq!(h.orchestrator.snapshot().controls.color, Rgb::new(255, 20, 0));
    }
}
