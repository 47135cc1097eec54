//! Rooms, the room directory, and the pair of rooms a visitor navigates between.
//!
//! Room payloads come from a web service that has changed shape over time, so parsing is
//! lenient: missing or malformed fields fall back to neutral values rather than failing the whole
//! list. Only a payload that is not a room list at all is an error.

use crate::coordinate_systems::{FloorPlan, PlanComponents};
use crate::coordinates::Coordinate;
use crate::error::{DirectoryError, SelectionError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uom::si::f64::Length;
use uom::si::length::meter;

/// Identifier of a room in the directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A room as listed by the room directory.
///
/// Rooms are never edited in place; a refresh of the directory replaces them wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub number: String,
    pub name: String,
    #[serde(rename = "type")]
    pub room_type: String,
    pub building: String,
    pub floor: String,
    pub floor_id: Option<u64>,
    /// Building-relative position as stored by the directory (unscaled).
    pub position: Coordinate<FloorPlan>,
    pub images: Vec<String>,
}

impl Room {
    /// Constructs a room with only an id, number, and position; everything else is defaulted.
    pub fn at(id: RoomId, number: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            id,
            number: number.into(),
            name: UNKNOWN.to_owned(),
            room_type: STANDARD.to_owned(),
            building: UNKNOWN.to_owned(),
            floor: UNKNOWN.to_owned(),
            floor_id: None,
            position: plan_coordinate(x, y, z),
            images: Vec::new(),
        }
    }

    /// Returns a copy of the room with `name` as its name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns a copy of the room located in `building` on `floor`.
    #[must_use]
    pub fn located(mut self, building: impl Into<String>, floor: impl Into<String>) -> Self {
        self.building = building.into();
        self.floor = floor.into();
        self
    }

    /// The text shown on the room's scene marker.
    pub fn marker_label(&self) -> String {
        format!("{} {}", self.name, self.number)
    }

    /// The text shown for the room in a selection list.
    pub fn option_label(&self) -> String {
        format!(
            "{} - {} ({}, {})",
            self.number, self.name, self.building, self.floor
        )
    }
}

const UNKNOWN: &str = "Unknown";
const STANDARD: &str = "Standard";

fn plan_coordinate(x: f64, y: f64, z: f64) -> Coordinate<FloorPlan> {
    let finite = |v: f64| if v.is_finite() { v } else { 0. };
    Coordinate::build(PlanComponents {
        x: Length::new::<meter>(finite(x)),
        y: Length::new::<meter>(finite(y)),
        elevation: Length::new::<meter>(finite(z)),
    })
}

/// The current room and the destination, guaranteed to be different rooms.
#[derive(Clone, Debug, PartialEq)]
pub struct NavigationPair {
    current: Room,
    destination: Room,
}

impl NavigationPair {
    pub fn new(current: Room, destination: Room) -> Result<Self, SelectionError> {
        if current.id == destination.id {
            return Err(SelectionError::SameRoom);
        }
        Ok(Self {
            current,
            destination,
        })
    }

    pub fn current(&self) -> &Room {
        &self.current
    }

    pub fn destination(&self) -> &Room {
        &self.destination
    }
}

/// Where rooms come from.
pub trait RoomDirectory {
    /// Fetches the raw JSON room payload.
    fn fetch(&mut self) -> Result<String, DirectoryError>;
}

/// Parses a room payload: either `{"rooms": [...]}` or a bare array of rooms.
///
/// Entries without a usable id are skipped.
pub fn parse_rooms(payload: &str) -> Result<Vec<Room>, DirectoryError> {
    let value: Value = serde_json::from_str(payload)?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object.remove("rooms") {
            Some(Value::Array(entries)) => entries,
            _ => return Err(DirectoryError::UnexpectedShape),
        },
        _ => return Err(DirectoryError::UnexpectedShape),
    };

    let rooms: Vec<Room> = entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(fields) => {
                let room = parse_room(fields);
                if room.is_none() {
                    log::warn!("skipping room without a usable id: {entry}");
                }
                room
            }
            _ => {
                log::warn!("skipping non-object room entry: {entry}");
                None
            }
        })
        .collect();
    log::debug!("parsed {} of {} rooms", rooms.len(), entries.len());
    Ok(rooms)
}

fn parse_room(fields: &Map<String, Value>) -> Option<Room> {
    let id = fields.get("id").and_then(as_id)?;
    let text = |key: &str| {
        fields
            .get(key)
            .and_then(as_text)
            .filter(|s| !s.trim().is_empty())
    };

    let [x, y, z] = match fields.get("coordinates") {
        Some(coordinates) => parse_coordinates(coordinates),
        // older payloads put the position at the top level
        None => ["x", "y", "z"].map(|k| fields.get(k).map_or(0., parse_float)),
    };

    Some(Room {
        id: RoomId(id),
        number: text("number").unwrap_or_else(|| id.to_string()),
        name: text("name").unwrap_or_else(|| UNKNOWN.to_owned()),
        room_type: text("type").unwrap_or_else(|| STANDARD.to_owned()),
        building: text("building").unwrap_or_else(|| UNKNOWN.to_owned()),
        floor: text("floor").unwrap_or_else(|| UNKNOWN.to_owned()),
        floor_id: fields.get("floor_id").and_then(as_id),
        position: plan_coordinate(x, y, z),
        images: fields
            .get("images")
            .and_then(Value::as_array)
            .map(|images| {
                images
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default(),
    })
}

fn as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coordinates are either `{"x": .., "y": .., "z": ..}` (numbers or numeric strings) or a
/// `"x,y,z"` string. Anything unparseable is 0.
fn parse_coordinates(value: &Value) -> [f64; 3] {
    match value {
        Value::Object(c) => ["x", "y", "z"].map(|k| c.get(k).map_or(0., parse_float)),
        Value::String(s) => {
            let mut parts = s.split(',').map(|p| p.trim().parse::<f64>().unwrap_or(0.));
            [(); 3].map(|()| parts.next().unwrap_or(0.))
        }
        _ => [0.; 3],
    }
}

fn parse_float(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.)
}

/// A room entry for a selection list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomOption {
    pub id: RoomId,
    pub label: String,
}

/// The most recent snapshot of the room directory.
#[derive(Clone, Debug, Default)]
pub struct RoomCache {
    rooms: Vec<Room>,
}

impl RoomCache {
    pub fn new(rooms: Vec<Room>) -> Self {
        Self { rooms }
    }

    /// Replaces the cached rooms with a fresh fetch from `directory`.
    ///
    /// On failure the previous snapshot is kept.
    pub fn refresh(&mut self, directory: &mut dyn RoomDirectory) -> Result<usize, DirectoryError> {
        let rooms = parse_rooms(&directory.fetch()?)?;
        log::info!("loaded {} rooms", rooms.len());
        self.rooms = rooms;
        Ok(self.rooms.len())
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn get(&self, id: RoomId) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    pub fn find_by_number(&self, number: &str) -> Option<&Room> {
        let number = number.trim();
        self.rooms.iter().find(|r| r.number == number)
    }

    /// Rooms for a selection list, ordered by building and then floor.
    pub fn options(&self) -> Vec<RoomOption> {
        let mut sorted: Vec<&Room> = self.rooms.iter().collect();
        sorted.sort_by(|a, b| {
            a.building
                .cmp(&b.building)
                .then_with(|| a.floor.cmp(&b.floor))
        });
        sorted
            .into_iter()
            .map(|r| RoomOption {
                id: r.id,
                label: r.option_label(),
            })
            .collect()
    }
}
