use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Version the server speaks; clients must match its major (and by default minor) part.
pub const PROTOCOL_VERSION: SemVer = SemVer::new(1, 0, 0);
/// Largest payload that fits in a single UDP datagram.
pub const MAX_PACKET_SIZE: usize = 65_507;

pub type ClientId = u32;

/// A square on the board. (0,0) is the top left corner and y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_on_board(&self, width: i32, height: i32) -> bool {
        self.x >= 0 && self.x < width && self.y >= 0 && self.y < height
    }

    /// The neighbouring point one step in `direction`.
    pub fn step(&self, direction: Direction) -> Point {
        let (dx, dy) = direction.offset();
        Point::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Left,
    Up,
    Right,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Up,
        Direction::Right,
        Direction::Down,
    ];

    /// Unit vector in screen coordinates.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Left => (-1, 0),
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Up => Direction::Down,
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeathReason {
    /// Left the game or stopped sending moves.
    Disconnect,
    /// Head shares a square with another snake or a wall.
    SnakeCollision,
    /// Head landed on the snake's own body. Reported instead of `SnakeCollision`.
    SelfCollision,
    /// Head moved off the board.
    BoardCollision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinError {
    #[error("another snake already uses this name")]
    PlayerExists,
    #[error("this session already controls a snake")]
    InvalidSession,
    #[error("client version is not compatible with the server")]
    VersionMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemVerError {
    #[error("version must have exactly three parts, got {0}")]
    PartCount(usize),
    #[error("invalid version part {0:?}")]
    InvalidPart(String),
}

/// A `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemVer {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Compares the major part always, and the minor/patch parts unless ignored.
    /// Ignoring the minor part also ignores the patch part.
    pub fn equals_ignoring(&self, other: &SemVer, ignore_minor: bool, ignore_patch: bool) -> bool {
        if !ignore_minor && self.minor != other.minor {
            return false;
        }
        if !(ignore_minor || ignore_patch) && self.patch != other.patch {
            return false;
        }
        self.major == other.major
    }
}

impl FromStr for SemVer {
    type Err = SemVerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(SemVerError::PartCount(parts.len()));
        }

        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| SemVerError::InvalidPart(part.to_string()))
        };

        Ok(SemVer::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Packed `0xRRGGBB` colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    pub fn components(&self) -> (u8, u8, u8) {
        ((self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnakeMetadata {
    pub name: String,
    pub color: Color,
}

impl SnakeMetadata {
    pub fn new(name: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            color,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnakeData {
    pub metadata: SnakeMetadata,
    pub head: Point,
    pub body: Vec<Point>,
    pub curled_length: u32,
    pub death_reason: Option<DeathReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppleData {
    pub position: Point,
    pub reward: u8,
    pub eaten: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallData {
    pub start: Point,
    pub end: Point,
}

/// One entity as sent to clients, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityData {
    Snake(SnakeData),
    Apple(AppleData),
    Wall(WallData),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardData {
    pub width: u16,
    pub height: u16,
}

/// Everything that changed in one tick: all live entities plus the ones removed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickData {
    pub tick: u64,
    pub entities: Vec<EntityData>,
    pub removed_entities: Vec<EntityData>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Join {
        snake: SnakeMetadata,
        version: SemVer,
    },
    Move {
        direction: Direction,
    },
    Leave,

    Joined {
        client_id: ClientId,
        board: BoardData,
    },
    JoinRejected {
        error: JoinError,
    },
    Tick(TickData),
    Disconnected {
        reason: String,
    },
}
