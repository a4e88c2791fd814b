//! Controller loop: answers the hub's posts and reports device changes.

use std::fmt::Write as _;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use roomhub_rpc::{CommandResponse, Message, RoomClient};
use roomhub_types::{ActionSet, DeviceKind, DeviceValue, DeviceValues};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::driver::{DeviceDriver, MemoryDriver};

pub const HELP: &str = "\
Commands:
  set <tag> <value>   change a device, e.g. `set door_sensor 1`
                      or `set temperature_humidity_sensor {\"temperature\":24,\"humidity\":50}`
  show                print every device value
  quit                disconnect";

/// One line typed at the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Empty,
    Set(String, DeviceValue),
    Show,
    Quit,
}

impl FromStr for Input {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (word, rest) = s.split_once(char::is_whitespace).unwrap_or((s, ""));
        match word {
            "" => Ok(Input::Empty),
            "show" => Ok(Input::Show),
            "quit" | "q" => Ok(Input::Quit),
            "set" => {
                let (tag, value) = rest
                    .trim()
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: set <tag> <value>"))?;
                let value = serde_json::from_str(value.trim())
                    .with_context(|| format!("invalid value for {tag}"))?;
                Ok(Input::Set(tag.to_string(), value))
            }
            other => bail!("unknown command: {other}"),
        }
    }
}

/// Current inputs and sensor readings, as pushed to the hub.
pub fn readings(driver: &impl DeviceDriver) -> DeviceValues {
    driver
        .devices()
        .into_iter()
        .filter_map(|spec| {
            let value = match spec.kind {
                DeviceKind::BinaryInput => driver.read_input(&spec.tag).map(DeviceValue::Level),
                DeviceKind::CompositeSensor => {
                    driver.read_sensor(&spec.tag).map(DeviceValue::Reading)
                }
                DeviceKind::BinaryOutput => None,
            }?;
            Some((spec.tag, value))
        })
        .collect()
}

/// Carry out a post and build the response. The first device that fails
/// turns the whole response into an error.
pub fn apply_post(driver: &mut impl DeviceDriver, actions: &ActionSet) -> CommandResponse {
    let mut data = DeviceValues::new();
    for (tag, action) in actions {
        match driver.write_output(tag, *action) {
            Ok(level) => {
                data.insert(tag.clone(), DeviceValue::Level(level));
            }
            Err(e) => {
                warn!("Post failed: {}", e);
                return CommandResponse::error(e.to_string());
            }
        }
    }
    CommandResponse::accepted(data)
}

fn render(driver: &MemoryDriver) -> String {
    let mut text = String::new();
    for (tag, value) in driver.values() {
        let _ = writeln!(text, "  {tag:<28} {value}");
    }
    text
}

/// Serve the hub until it disconnects or the operator quits.
///
/// Posts are answered in arrival order. Readings are pushed once on start,
/// after every `set` and every `push_interval`.
///
/// # Errors
///
/// Returns an error if the connection fails or `input` cannot be read.
pub async fn run<R>(
    mut client: RoomClient,
    mut driver: MemoryDriver,
    push_interval: Duration,
    input: R,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    client.push(readings(&driver)).await?;

    let mut ticker = tokio::time::interval(push_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut lines = input.lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            msg = client.recv() => match msg? {
                Some(Message::Post { data }) => {
                    let response = apply_post(&mut driver, &data);
                    debug!("Post {:?} -> {:?}", data, response.status);
                    client.respond(response).await?;
                }
                Some(other) => debug!("Ignoring {} from hub", other.kind()),
                None => {
                    info!("Hub closed the connection");
                    return Ok(());
                }
            },
            _ = ticker.tick() => client.push(readings(&driver)).await?,
            line = lines.next_line(), if input_open => match line? {
                Some(line) => match line.parse::<Input>() {
                    Ok(Input::Empty) => {}
                    Ok(Input::Set(tag, value)) => match driver.set(&tag, value) {
                        Ok(()) => client.push(DeviceValues::from([(tag, value)])).await?,
                        Err(e) => println!("{e}"),
                    },
                    Ok(Input::Show) => print!("{}", render(&driver)),
                    Ok(Input::Quit) => return Ok(()),
                    Err(e) => println!("{e:#}"),
                },
                None => input_open = false,
            },
        }
    }
}
