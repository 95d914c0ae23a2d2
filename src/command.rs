//! Remote configuration commands.
//!
//! ```text
//! LOC-<name>-<lat>-<lon>-ON|OFF      WPT-<name>-<lat>-<lon>-ON|OFF
//! LOC-<name>-CLEAR                   WPT-<name>-CLEAR
//! MODE-OFF|LOC|WPT
//! GET_LOCATIONS
//! SET_FUEL:<fuel>:<burn>[:<visible>]
//! GET_FUEL
//! SET_POI:POI1:<name>:<lat>:<lon>,POI2:...
//! ```
//!
//! A negative coordinate keeps its minus sign, so `LOC-L1--33.9-151.2-ON`
//! has an empty token before `33.9`. Coordinates are therefore read from the
//! right.

use core::fmt::{self, Write};

use heapless::{String, Vec};

use crate::config::MAX_LOCATIONS;
use crate::geo::Coordinate;
use crate::mode::NavigationMode;
use crate::registry::RegistryError;
use crate::target::{ReferencePoint, SlotKind};

pub const RESPONSE_CAPACITY: usize = 1536;
pub type Response = String<RESPONSE_CAPACITY>;

const MAX_TOKENS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    Malformed,
    UnknownCommand,
    SlotOutOfRange,
    InvalidCoordinate,
    InvalidValue,
    RegistryFull,
    /// The reply did not fit in [`Response`].
    ResponseTooLong,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Malformed => write!(f, "malformed command"),
            CommandError::UnknownCommand => write!(f, "unknown command"),
            CommandError::SlotOutOfRange => write!(f, "slot out of range"),
            CommandError::InvalidCoordinate => write!(f, "invalid coordinate"),
            CommandError::InvalidValue => write!(f, "invalid value"),
            CommandError::RegistryFull => write!(f, "no free slot"),
            CommandError::ResponseTooLong => write!(f, "response too long"),
        }
    }
}

impl From<RegistryError> for CommandError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::SlotOutOfRange => CommandError::SlotOutOfRange,
            RegistryError::RegistryFull => CommandError::RegistryFull,
            RegistryError::InvalidCoordinate => CommandError::InvalidCoordinate,
            RegistryError::InsufficientSatellites
            | RegistryError::RejectedJump
            | RegistryError::NoReferencePosition => CommandError::InvalidValue,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RemoteCommand {
    SetSlot {
        kind: SlotKind,
        /// `None` means the first unset slot.
        index: Option<u8>,
        point: ReferencePoint,
    },
    ClearSlot {
        kind: SlotKind,
        index: u8,
    },
    SetMode(NavigationMode),
    GetLocations,
    SetFuel {
        fuel: f64,
        burn_rate: f64,
        visible: Option<bool>,
    },
    GetFuel,
    /// Location slots from the companion web app, zero-based index first.
    SetPoi(Vec<(u8, Coordinate), MAX_LOCATIONS>),
}

pub fn parse(input: &str) -> Result<RemoteCommand, CommandError> {
    let input = input.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0');

    match input {
        "GET_LOCATIONS" => return Ok(RemoteCommand::GetLocations),
        "GET_FUEL" => return Ok(RemoteCommand::GetFuel),
        _ => {}
    }
    if let Some(rest) = input.strip_prefix("SET_FUEL:") {
        return parse_fuel(rest);
    }
    if let Some(rest) = input.strip_prefix("SET_POI:") {
        return parse_poi(rest);
    }
    if let Some(keyword) = input.strip_prefix("MODE-") {
        return NavigationMode::from_keyword(keyword)
            .map(RemoteCommand::SetMode)
            .ok_or(CommandError::Malformed);
    }

    let mut tokens: Vec<&str, MAX_TOKENS> = Vec::new();
    for token in input.split('-') {
        tokens.push(token).map_err(|_| CommandError::Malformed)?;
    }
    if tokens.len() < 3 {
        return Err(CommandError::UnknownCommand);
    }
    let kind = match tokens[0] {
        "LOC" | "L" => SlotKind::Location,
        "WPT" | "W" => SlotKind::Waypoint,
        _ => return Err(CommandError::UnknownCommand),
    };

    if tokens.len() == 3 && tokens[2] == "CLEAR" {
        let index = parse_label(kind, tokens[1])?.ok_or(CommandError::Malformed)?;
        return Ok(RemoteCommand::ClearSlot { kind, index });
    }

    let mut end = tokens.len() - 1;
    let active = match tokens[end] {
        "ON" => true,
        "OFF" => false,
        _ => return Err(CommandError::Malformed),
    };
    // Longitude needs type, name and latitude in front of its sign; latitude
    // needs type and name.
    let longitude = take_number(&tokens, &mut end, 3)?;
    let latitude = take_number(&tokens, &mut end, 2)?;
    if end != 2 {
        return Err(CommandError::Malformed);
    }

    let position = Coordinate::new(latitude, longitude);
    if !position.is_valid() {
        return Err(CommandError::InvalidCoordinate);
    }
    Ok(RemoteCommand::SetSlot {
        kind,
        index: parse_label(kind, tokens[1])?,
        point: ReferencePoint::new(position, active),
    })
}

/// Pop a number off `tokens[..end]`, folding in a preceding empty token as a
/// minus sign when at least `keep` tokens would remain in front of it.
fn take_number(tokens: &[&str], end: &mut usize, keep: usize) -> Result<f64, CommandError> {
    if *end <= keep {
        return Err(CommandError::Malformed);
    }
    *end -= 1;
    let mut value = parse_number(tokens[*end])?;
    if *end > keep && tokens[*end - 1].is_empty() {
        value = -value;
        *end -= 1;
    }
    Ok(value)
}

fn parse_number(text: &str) -> Result<f64, CommandError> {
    if text.is_empty() || text.starts_with('+') {
        return Err(CommandError::Malformed);
    }
    let value: f64 = text.parse().map_err(|_| CommandError::Malformed)?;
    if !value.is_finite() {
        return Err(CommandError::InvalidValue);
    }
    Ok(value)
}

/// `L3`, `W12` or bare `3`, one based. Empty means "first unset".
fn parse_label(kind: SlotKind, label: &str) -> Result<Option<u8>, CommandError> {
    if label.is_empty() {
        return Ok(None);
    }
    let digits = label.strip_prefix(kind.prefix()).unwrap_or(label);
    let number: u8 = digits.parse().map_err(|_| CommandError::Malformed)?;
    if number == 0 || number as usize > kind.capacity() {
        return Err(CommandError::SlotOutOfRange);
    }
    Ok(Some(number - 1))
}

fn parse_fuel(rest: &str) -> Result<RemoteCommand, CommandError> {
    let mut fields = rest.split(':');
    let fuel = parse_number(fields.next().unwrap_or(""))?;
    let burn_rate = parse_number(fields.next().ok_or(CommandError::Malformed)?)?;
    let visible = match fields.next() {
        None => None,
        Some("1") => Some(true),
        Some("0") => Some(false),
        Some(_) => return Err(CommandError::InvalidValue),
    };
    if fields.next().is_some() {
        return Err(CommandError::Malformed);
    }
    Ok(RemoteCommand::SetFuel {
        fuel,
        burn_rate,
        visible,
    })
}

fn parse_poi(rest: &str) -> Result<RemoteCommand, CommandError> {
    let mut points = Vec::new();
    for entry in rest.split(',').filter(|entry| !entry.is_empty()) {
        let mut fields = entry.split(':');
        let label = fields.next().unwrap_or("");
        let _name = fields.next().ok_or(CommandError::Malformed)?;
        let latitude = parse_number(fields.next().ok_or(CommandError::Malformed)?)?;
        let longitude = parse_number(fields.next().ok_or(CommandError::Malformed)?)?;
        if fields.next().is_some() {
            return Err(CommandError::Malformed);
        }

        let number: u8 = label
            .strip_prefix("POI")
            .ok_or(CommandError::Malformed)?
            .parse()
            .map_err(|_| CommandError::Malformed)?;
        if number == 0 || number as usize > MAX_LOCATIONS {
            return Err(CommandError::SlotOutOfRange);
        }
        let position = Coordinate::new(latitude, longitude);
        if !position.is_valid() {
            return Err(CommandError::InvalidCoordinate);
        }
        points
            .push((number - 1, position))
            .map_err(|_| CommandError::SlotOutOfRange)?;
    }
    if points.is_empty() {
        return Err(CommandError::Malformed);
    }
    Ok(RemoteCommand::SetPoi(points))
}

/// Decimal places written for coordinates, about 0.1 m.
pub const COORDINATE_DECIMALS: usize = 6;

/// `<lat>-<lon>` at fixed precision, so every line has a bounded width.
pub struct DecimalDegrees(pub Coordinate);

impl fmt::Display for DecimalDegrees {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.*}-{:.*}",
            COORDINATE_DECIMALS,
            self.0.latitude,
            COORDINATE_DECIMALS,
            self.0.longitude
        )
    }
}

/// One configured slot in the `SetSlot` grammar, so a dump can be replayed.
pub fn write_slot<W: Write>(out: &mut W, kind: SlotKind, index: u8, point: &ReferencePoint) -> fmt::Result {
    let keyword = match kind {
        SlotKind::Location => "LOC",
        SlotKind::Waypoint => "WPT",
    };
    write!(
        out,
        "{}-{}{}-{}-{}",
        keyword,
        kind.prefix(),
        index as u16 + 1,
        DecimalDegrees(point.position),
        if point.active { "ON" } else { "OFF" }
    )
}

pub fn write_error<W: Write>(out: &mut W, error: CommandError) -> fmt::Result {
    write!(out, "ERR {}", error)
}
