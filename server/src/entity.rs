//! Board entities: snakes, apples and walls.
//!
//! Entities live in a single table owned by the engine and are referred to
//! everywhere else by [`EntityId`]. Their state can be read by anyone but only
//! changed by the crate, so the engine stays in charge of every lifecycle step.

use shared::{
    AppleData, ClientId, DeathReason, Direction, EntityData, Point, SnakeData, SnakeMetadata,
    WallData,
};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use thiserror::Error;

/// Stable handle of an entity in the engine's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub(crate) u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The live entity table, ordered by ID so iteration is stable between ticks.
pub type Entities = BTreeMap<EntityId, Entity>;

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Snake(Snake),
    Apple(Apple),
    Wall(Wall),
}

impl Entity {
    /// Whether another snake's head dies when it enters a square holding this entity.
    pub fn is_collidable(&self) -> bool {
        match self {
            Entity::Snake(_) | Entity::Wall(_) => true,
            Entity::Apple(_) => false,
        }
    }

    pub fn as_snake(&self) -> Option<&Snake> {
        match self {
            Entity::Snake(snake) => Some(snake),
            _ => None,
        }
    }

    pub(crate) fn as_snake_mut(&mut self) -> Option<&mut Snake> {
        match self {
            Entity::Snake(snake) => Some(snake),
            _ => None,
        }
    }

    pub fn as_apple(&self) -> Option<&Apple> {
        match self {
            Entity::Apple(apple) => Some(apple),
            _ => None,
        }
    }

    pub(crate) fn as_apple_mut(&mut self) -> Option<&mut Apple> {
        match self {
            Entity::Apple(apple) => Some(apple),
            _ => None,
        }
    }

    pub fn to_data(&self) -> EntityData {
        match self {
            Entity::Snake(snake) => EntityData::Snake(snake.to_data()),
            Entity::Apple(apple) => EntityData::Apple(apple.to_data()),
            Entity::Wall(wall) => EntityData::Wall(wall.to_data()),
        }
    }
}

/// A player controlled snake.
///
/// The body is stored closest-to-head first and excludes both the head and the
/// curled part of the tail. The curled part is length that was earned from
/// apples but has not unrolled onto the board yet; it shrinks by one for every
/// move and keeps the tail in place while it does.
#[derive(Debug, Clone, PartialEq)]
pub struct Snake {
    client_id: ClientId,
    metadata: SnakeMetadata,
    head: Point,
    body: VecDeque<Point>,
    curled_length: u32,
    facing: Option<Direction>,
    death_reason: Option<DeathReason>,
    missed_ticks: u32,
}

impl Snake {
    pub(crate) fn new(client_id: ClientId, metadata: SnakeMetadata, head: Point) -> Self {
        Self {
            client_id,
            metadata,
            head,
            body: VecDeque::new(),
            curled_length: 0,
            facing: None,
            death_reason: None,
            missed_ticks: 0,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &SnakeMetadata {
        &self.metadata
    }

    pub fn head(&self) -> Point {
        self.head
    }

    pub fn body(&self) -> &VecDeque<Point> {
        &self.body
    }

    /// The last square of the snake, which is the head for a snake with no body.
    pub fn tail(&self) -> Point {
        self.body.back().copied().unwrap_or(self.head)
    }

    /// Every square the snake covers, head first.
    pub fn segments(&self) -> impl Iterator<Item = Point> + '_ {
        std::iter::once(self.head).chain(self.body.iter().copied())
    }

    /// Full length including the head and the curled tail.
    pub fn length(&self) -> usize {
        self.body.len() + 1 + self.curled_length as usize
    }

    pub fn curled_length(&self) -> u32 {
        self.curled_length
    }

    pub fn facing(&self) -> Option<Direction> {
        self.facing
    }

    pub fn death_reason(&self) -> Option<DeathReason> {
        self.death_reason
    }

    pub fn is_dead(&self) -> bool {
        self.death_reason.is_some()
    }

    pub fn missed_tick_count(&self) -> u32 {
        self.missed_ticks
    }

    /// Marks the snake dead. Returns false if it already had a death reason,
    /// which is kept.
    pub(crate) fn kill(&mut self, reason: DeathReason) -> bool {
        if self.death_reason.is_some() {
            return false;
        }
        self.death_reason = Some(reason);
        true
    }

    pub(crate) fn set_facing(&mut self, direction: Direction) {
        self.facing = Some(direction);
    }

    pub(crate) fn reset_missed_ticks(&mut self) {
        self.missed_ticks = 0;
    }

    /// Returns the new number of consecutive missed ticks.
    pub(crate) fn increment_missed_ticks(&mut self) -> u32 {
        self.missed_ticks += 1;
        self.missed_ticks
    }

    pub(crate) fn add_curled_length(&mut self, amount: u32) {
        self.curled_length += amount;
    }

    /// Moves the head to `new_head`, pushing the old head into the body.
    ///
    /// Returns the square the tail left, or `None` when a curled tail kept it in place.
    pub(crate) fn advance(&mut self, new_head: Point) -> Option<Point> {
        self.body.push_front(self.head);
        self.head = new_head;

        if self.curled_length > 0 {
            self.curled_length -= 1;
            None
        } else {
            self.body.pop_back()
        }
    }

    pub fn to_data(&self) -> SnakeData {
        SnakeData {
            metadata: self.metadata.clone(),
            head: self.head,
            body: self.body.iter().copied().collect(),
            curled_length: self.curled_length,
            death_reason: self.death_reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apple {
    position: Point,
    reward: u8,
    eaten: bool,
}

impl Apple {
    pub(crate) fn new(position: Point, reward: u8) -> Self {
        Self {
            position,
            reward,
            eaten: false,
        }
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn reward(&self) -> u8 {
        self.reward
    }

    pub fn is_eaten(&self) -> bool {
        self.eaten
    }

    pub(crate) fn mark_eaten(&mut self) {
        self.eaten = true;
    }

    pub fn to_data(&self) -> AppleData {
        AppleData {
            position: self.position,
            reward: self.reward,
            eaten: self.eaten,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WallError {
    #[error("wall from {start} to {end} is diagonal")]
    Diagonal { start: Point, end: Point },
}

/// A straight horizontal or vertical wall, or a single blocked square.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wall {
    start: Point,
    end: Point,
}

impl Wall {
    pub fn new(start: Point, end: Point) -> Result<Self, WallError> {
        if start != end && start.x != end.x && start.y != end.y {
            return Err(WallError::Diagonal { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn end(&self) -> Point {
        self.end
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    pub fn is_vertical(&self) -> bool {
        !self.is_single() && self.start.x == self.end.x
    }

    pub fn is_horizontal(&self) -> bool {
        !self.is_single() && self.start.y == self.end.y
    }

    pub fn contains(&self, point: Point) -> bool {
        let (min_x, max_x) = (self.start.x.min(self.end.x), self.start.x.max(self.end.x));
        let (min_y, max_y) = (self.start.y.min(self.end.y), self.start.y.max(self.end.y));
        (min_x..=max_x).contains(&point.x) && (min_y..=max_y).contains(&point.y)
    }

    /// Every square covered by the wall, from start to end.
    pub fn points(&self) -> Vec<Point> {
        let dx = (self.end.x - self.start.x).signum();
        let dy = (self.end.y - self.start.y).signum();
        let steps = (self.end.x - self.start.x)
            .abs()
            .max((self.end.y - self.start.y).abs());

        (0..=steps)
            .map(|i| Point::new(self.start.x + dx * i, self.start.y + dy * i))
            .collect()
    }

    pub fn to_data(&self) -> WallData {
        WallData {
            start: self.start,
            end: self.end,
        }
    }
}
