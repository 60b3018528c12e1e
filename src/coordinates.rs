//! Flow-cell coordinate model
//!
//! Physical locations form a strict hierarchy:
//! - lane: flow cell + lane number
//! - tile: lane + tile number
//! - subtile: tile + grid cell of the tile quality matrix
//! - sequence: tile + raw x/y position of one read
//! - tile base position: tile + sequencing cycle
//!
//! Flow-cell names are interned into a [`FlowCellRegistry`] so coordinate
//! values stay `Copy` and cheap to hash. The registry is the only state
//! shared between concurrently running file pipelines.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Compact id of an interned flow-cell name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowCellId(u32);

impl FlowCellId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Default)]
struct Interner {
    names: Vec<String>,
    ids: HashMap<String, FlowCellId>,
}

/// Append-only, thread-safe name <-> id table for flow cells
///
/// The first name seen gets id 0, the next new name id 1 and so on.
/// Ids are never reassigned.
#[derive(Debug, Default)]
pub struct FlowCellRegistry {
    table: RwLock<Interner>,
}

impl FlowCellRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `name`, assigning the next free id on first sight
    pub fn intern(&self, name: &str) -> FlowCellId {
        if let Some(&id) = self.table.read().ids.get(name) {
            return id;
        }

        let mut table = self.table.write();
        // Another pipeline may have interned the name between the two locks
        if let Some(&id) = table.ids.get(name) {
            return id;
        }
        let id = FlowCellId(table.names.len() as u32);
        table.names.push(name.to_string());
        table.ids.insert(name.to_string(), id);
        id
    }

    /// Id for an already interned name
    pub fn lookup(&self, name: &str) -> Option<FlowCellId> {
        self.table.read().ids.get(name).copied()
    }

    /// Name behind an id
    pub fn name(&self, id: FlowCellId) -> Option<String> {
        self.table.read().names.get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaneCoordinates {
    pub flow_cell: FlowCellId,
    pub lane: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoordinates {
    pub flow_cell: FlowCellId,
    pub lane: u32,
    pub tile: u32,
}

impl TileCoordinates {
    pub fn lane_coordinates(&self) -> LaneCoordinates {
        LaneCoordinates {
            flow_cell: self.flow_cell,
            lane: self.lane,
        }
    }

    /// Grid cell `(x, y)` of this tile
    pub fn subtile(&self, x: u32, y: u32) -> SubtileCoordinates {
        SubtileCoordinates {
            flow_cell: self.flow_cell,
            lane: self.lane,
            tile: self.tile,
            x,
            y,
        }
    }

    /// Sequencing cycle `base_position` of this tile
    pub fn base_position(&self, base_position: u32) -> TileBpCoordinates {
        TileBpCoordinates {
            flow_cell: self.flow_cell,
            lane: self.lane,
            tile: self.tile,
            base_position,
        }
    }
}

/// Cell of a tile quality matrix; `x`/`y` are grid indices, not pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubtileCoordinates {
    pub flow_cell: FlowCellId,
    pub lane: u32,
    pub tile: u32,
    pub x: u32,
    pub y: u32,
}

impl SubtileCoordinates {
    pub fn tile_coordinates(&self) -> TileCoordinates {
        TileCoordinates {
            flow_cell: self.flow_cell,
            lane: self.lane,
            tile: self.tile,
        }
    }
}

/// Raw position of one read as reported by the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceCoordinates {
    pub flow_cell: FlowCellId,
    pub lane: u32,
    pub tile: u32,
    pub x: u32,
    pub y: u32,
}

impl SequenceCoordinates {
    pub fn tile_coordinates(&self) -> TileCoordinates {
        TileCoordinates {
            flow_cell: self.flow_cell,
            lane: self.lane,
            tile: self.tile,
        }
    }
}

/// One base-call column of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileBpCoordinates {
    pub flow_cell: FlowCellId,
    pub lane: u32,
    pub tile: u32,
    pub base_position: u32,
}

impl TileBpCoordinates {
    pub fn tile_coordinates(&self) -> TileCoordinates {
        TileCoordinates {
            flow_cell: self.flow_cell,
            lane: self.lane,
            tile: self.tile,
        }
    }
}

/// Hierarchy level of a coordinate value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateLevel {
    Lane,
    Tile,
    Subtile,
    Sequence,
    TileBp,
}

impl CoordinateLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lane => "lane",
            Self::Tile => "tile",
            Self::Subtile => "subtile",
            Self::Sequence => "sequence",
            Self::TileBp => "tile_bp",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "lane" => Some(Self::Lane),
            "tile" => Some(Self::Tile),
            "subtile" => Some(Self::Subtile),
            "sequence" => Some(Self::Sequence),
            "tile_bp" => Some(Self::TileBp),
            _ => None,
        }
    }
}

impl fmt::Display for CoordinateLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any coordinate value; two values of different levels are never equal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coordinates {
    Lane(LaneCoordinates),
    Tile(TileCoordinates),
    Subtile(SubtileCoordinates),
    Sequence(SequenceCoordinates),
    TileBp(TileBpCoordinates),
}

/// Reasons a JSON object does not describe a coordinate
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinateJsonError {
    #[error("value is not a JSON object")]
    NotAnObject,
    #[error("missing key `{0}`")]
    MissingKey(&'static str),
    #[error("invalid value for key `{0}`")]
    InvalidValue(&'static str),
}

impl Coordinates {
    pub fn level(&self) -> CoordinateLevel {
        match self {
            Self::Lane(_) => CoordinateLevel::Lane,
            Self::Tile(_) => CoordinateLevel::Tile,
            Self::Subtile(_) => CoordinateLevel::Subtile,
            Self::Sequence(_) => CoordinateLevel::Sequence,
            Self::TileBp(_) => CoordinateLevel::TileBp,
        }
    }

    pub fn lane_coordinates(&self) -> LaneCoordinates {
        let (flow_cell, lane) = match self {
            Self::Lane(c) => (c.flow_cell, c.lane),
            Self::Tile(c) => (c.flow_cell, c.lane),
            Self::Subtile(c) => (c.flow_cell, c.lane),
            Self::Sequence(c) => (c.flow_cell, c.lane),
            Self::TileBp(c) => (c.flow_cell, c.lane),
        };
        LaneCoordinates { flow_cell, lane }
    }

    /// Tile part of the value, `None` for lane-level coordinates
    pub fn tile_coordinates(&self) -> Option<TileCoordinates> {
        match self {
            Self::Lane(_) => None,
            Self::Tile(c) => Some(*c),
            Self::Subtile(c) => Some(c.tile_coordinates()),
            Self::Sequence(c) => Some(c.tile_coordinates()),
            Self::TileBp(c) => Some(c.tile_coordinates()),
        }
    }

    /// JSON object with the flow cell spelled out by name
    pub fn to_json(&self, registry: &FlowCellRegistry) -> Value {
        let lane = self.lane_coordinates();
        let mut object = Map::new();
        object.insert("level".into(), Value::from(self.level().as_str()));
        object.insert(
            "flowCell".into(),
            Value::from(registry.name(lane.flow_cell).unwrap_or_default()),
        );
        object.insert("lane".into(), Value::from(lane.lane));
        if let Some(tile) = self.tile_coordinates() {
            object.insert("tile".into(), Value::from(tile.tile));
        }
        match self {
            Self::Subtile(SubtileCoordinates { x, y, .. })
            | Self::Sequence(SequenceCoordinates { x, y, .. }) => {
                object.insert("x".into(), Value::from(*x));
                object.insert("y".into(), Value::from(*y));
            }
            Self::TileBp(c) => {
                object.insert("basePosition".into(), Value::from(c.base_position));
            }
            Self::Lane(_) | Self::Tile(_) => {}
        }
        Value::Object(object)
    }

    /// Parse a JSON object produced by [`Coordinates::to_json`] or written by hand
    ///
    /// Numbers may also be given as strings. Without a `level` key the level
    /// is inferred from the keys present.
    pub fn from_json(
        value: &Value,
        registry: &FlowCellRegistry,
    ) -> Result<Self, CoordinateJsonError> {
        let object = value.as_object().ok_or(CoordinateJsonError::NotAnObject)?;

        let level = match object.get("level") {
            Some(Value::String(name)) => CoordinateLevel::from_name(name)
                .ok_or(CoordinateJsonError::InvalidValue("level"))?,
            Some(_) => return Err(CoordinateJsonError::InvalidValue("level")),
            None => infer_level(object),
        };

        let flow_cell_name = match object.get("flowCell") {
            Some(Value::String(name)) => name.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => return Err(CoordinateJsonError::InvalidValue("flowCell")),
            None => return Err(CoordinateJsonError::MissingKey("flowCell")),
        };

        // Every key the level needs is checked before the name is interned
        let lane = integer_field(object, "lane")?;
        let tile = match level {
            CoordinateLevel::Lane => 0,
            _ => integer_field(object, "tile")?,
        };
        let (x, y) = match level {
            CoordinateLevel::Subtile | CoordinateLevel::Sequence => {
                (integer_field(object, "x")?, integer_field(object, "y")?)
            }
            _ => (0, 0),
        };
        let base_position = match level {
            CoordinateLevel::TileBp => integer_field(object, "basePosition")?,
            _ => 0,
        };

        let flow_cell = registry.intern(&flow_cell_name);
        let tile_coordinates = TileCoordinates {
            flow_cell,
            lane,
            tile,
        };
        Ok(match level {
            CoordinateLevel::Lane => Self::Lane(LaneCoordinates { flow_cell, lane }),
            CoordinateLevel::Tile => Self::Tile(tile_coordinates),
            CoordinateLevel::Subtile => Self::Subtile(tile_coordinates.subtile(x, y)),
            CoordinateLevel::Sequence => Self::Sequence(SequenceCoordinates {
                flow_cell,
                lane,
                tile,
                x,
                y,
            }),
            CoordinateLevel::TileBp => Self::TileBp(tile_coordinates.base_position(base_position)),
        })
    }
}

fn infer_level(object: &Map<String, Value>) -> CoordinateLevel {
    if object.contains_key("basePosition") {
        CoordinateLevel::TileBp
    } else if object.contains_key("x") && object.contains_key("y") {
        CoordinateLevel::Subtile
    } else if object.contains_key("tile") {
        CoordinateLevel::Tile
    } else {
        CoordinateLevel::Lane
    }
}

/// Non-negative integer stored either as a JSON number or a numeric string
fn integer_field(
    object: &Map<String, Value>,
    key: &'static str,
) -> Result<u32, CoordinateJsonError> {
    let parsed = match object.get(key) {
        None | Some(Value::Null) => return Err(CoordinateJsonError::MissingKey(key)),
        Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
        Some(_) => None,
    };
    parsed.ok_or(CoordinateJsonError::InvalidValue(key))
}

impl From<LaneCoordinates> for Coordinates {
    fn from(c: LaneCoordinates) -> Self {
        Self::Lane(c)
    }
}

impl From<TileCoordinates> for Coordinates {
    fn from(c: TileCoordinates) -> Self {
        Self::Tile(c)
    }
}

impl From<SubtileCoordinates> for Coordinates {
    fn from(c: SubtileCoordinates) -> Self {
        Self::Subtile(c)
    }
}

impl From<SequenceCoordinates> for Coordinates {
    fn from(c: SequenceCoordinates) -> Self {
        Self::Sequence(c)
    }
}

impl From<TileBpCoordinates> for Coordinates {
    fn from(c: TileBpCoordinates) -> Self {
        Self::TileBp(c)
    }
}

/// Per-subtile statistic tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubtileProperty {
    ReadDensity,
    AverageQuality,
    RateOfLowqReads,
    MappingQuality,
}

/// Statistics of one subtile, keyed by property
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtileProperties {
    #[serde(skip)]
    pub coordinates: SubtileCoordinates,
    pub values: Vec<(SubtileProperty, f64)>,
}

impl SubtileProperties {
    pub fn new(coordinates: SubtileCoordinates) -> Self {
        Self {
            coordinates,
            values: Vec::with_capacity(4),
        }
    }

    pub fn get(&self, property: SubtileProperty) -> Option<f64> {
        self.values
            .iter()
            .find(|(p, _)| *p == property)
            .map(|(_, v)| *v)
    }

    pub fn set(&mut self, property: SubtileProperty, value: f64) {
        match self.values.iter_mut().find(|(p, _)| *p == property) {
            Some(slot) => slot.1 = value,
            None => self.values.push((property, value)),
        }
    }
}
