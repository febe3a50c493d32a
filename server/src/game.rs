use crate::board::{Board, BoardError};
use crate::config::GameConfig;
use crate::entity::{Apple, Entities, Entity, EntityId, Snake};
use log::{debug, info, log_enabled, trace, warn, Level};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    BoardData, ClientId, DeathReason, Direction, EntityData, JoinError, Point, SemVer,
    SnakeMetadata, TickData, PROTOCOL_VERSION,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard};

/// Highest reward an apple can carry.
pub const MAX_APPLE_REWARD: u8 = 4;

/// What the engine needs from the layer that talks to clients.
pub trait Transport: Send + Sync {
    /// Delivers one finished tick to every connected client.
    fn broadcast_tick(&self, tick: &TickData);

    /// Closes the session of a client whose snake was dropped for inactivity.
    fn disconnect(&self, client_id: ClientId);
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    #[error("join rejected: {0}")]
    Join(#[from] JoinError),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error("apple reward must be between 1 and {}, got {0}", MAX_APPLE_REWARD)]
    InvalidReward(u8),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TickError {
    #[error("tick {tick} aborted")]
    Aborted {
        tick: u64,
        #[source]
        source: BoardError,
    },
}

/// The authoritative game: every entity on the board plus the moves queued
/// for the next tick.
pub struct GameEngine {
    config: GameConfig,
    board: Board,
    entities: Entities,
    queued_moves: HashMap<ClientId, Direction>,
    next_entity_id: u64,
    tick: u64,
    transport: Arc<dyn Transport>,
}

impl GameEngine {
    pub fn new(config: GameConfig, transport: Arc<dyn Transport>) -> Result<Self, GameError> {
        Self::with_rng(config, transport, StdRng::from_entropy())
    }

    /// Builds the engine with a fixed random source and places the initial apples.
    pub fn with_rng(
        config: GameConfig,
        transport: Arc<dyn Transport>,
        rng: StdRng,
    ) -> Result<Self, GameError> {
        let board = Board::with_rng(config.board_width, config.board_height, rng)?;

        let mut engine = Self {
            config,
            board,
            entities: Entities::new(),
            queued_moves: HashMap::new(),
            next_entity_id: 0,
            tick: 0,
            transport,
        };

        for _ in 0..engine.config.apple_count {
            engine.spawn_apple();
        }

        info!(
            "Game created on a {}x{} board with {} apples",
            engine.config.board_width,
            engine.config.board_height,
            engine.apple_count()
        );

        Ok(engine)
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn board_data(&self) -> BoardData {
        self.config.board_data()
    }

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// Number of ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn apple_count(&self) -> usize {
        self.entities
            .values()
            .filter(|e| matches!(e, Entity::Apple(_)))
            .count()
    }

    pub fn snake_count(&self) -> usize {
        self.snakes().count()
    }

    pub fn snakes(&self) -> impl Iterator<Item = (EntityId, &Snake)> + '_ {
        self.entities
            .iter()
            .filter_map(|(id, e)| e.as_snake().map(|snake| (*id, snake)))
    }

    pub fn snake_for(&self, client_id: ClientId) -> Option<(EntityId, &Snake)> {
        self.snakes()
            .find(|(_, snake)| snake.client_id() == client_id)
    }

    pub fn queued_move(&self, client_id: ClientId) -> Option<Direction> {
        self.queued_moves.get(&client_id).copied()
    }

    fn next_id(&mut self) -> EntityId {
        let id = EntityId(self.next_entity_id);
        self.next_entity_id += 1;
        id
    }

    /// Handles a join request: checks the client's protocol version, then
    /// spawns its snake. Returns the board dimensions the client plays on.
    pub fn join(
        &mut self,
        client_id: ClientId,
        metadata: SnakeMetadata,
        version: &SemVer,
    ) -> Result<BoardData, GameError> {
        if !self.config.version_policy.accepts(&PROTOCOL_VERSION, version) {
            warn!(
                "Client {} rejected: version {} is incompatible with {}",
                client_id, version, PROTOCOL_VERSION
            );
            return Err(JoinError::VersionMismatch.into());
        }

        self.add_player(client_id, metadata)?;
        Ok(self.board_data())
    }

    fn check_join(&self, client_id: ClientId, metadata: &SnakeMetadata) -> Result<(), JoinError> {
        if self.snake_for(client_id).is_some() {
            return Err(JoinError::InvalidSession);
        }

        let name_taken = self
            .snakes()
            .any(|(_, snake)| !snake.is_dead() && snake.name() == metadata.name);
        if name_taken {
            return Err(JoinError::PlayerExists);
        }

        Ok(())
    }

    /// Spawns a snake for `client_id` on a random empty square.
    pub fn add_player(
        &mut self,
        client_id: ClientId,
        metadata: SnakeMetadata,
    ) -> Result<EntityId, GameError> {
        self.check_join(client_id, &metadata)?;
        let head = self.board.random_empty_point()?;
        self.insert_snake(client_id, metadata, head, None)
    }

    /// Spawns a snake at a fixed position, optionally already facing a direction.
    pub fn add_player_at(
        &mut self,
        client_id: ClientId,
        metadata: SnakeMetadata,
        head: Point,
        facing: Option<Direction>,
    ) -> Result<EntityId, GameError> {
        self.check_join(client_id, &metadata)?;
        self.insert_snake(client_id, metadata, head, facing)
    }

    fn insert_snake(
        &mut self,
        client_id: ClientId,
        metadata: SnakeMetadata,
        head: Point,
        facing: Option<Direction>,
    ) -> Result<EntityId, GameError> {
        let id = self.next_id();
        self.board.add_occupant(head, id)?;

        let mut snake = Snake::new(client_id, metadata, head);
        if let Some(direction) = facing {
            snake.set_facing(direction);
        }

        info!(
            "Client {} joined as '{}' (snake {}) at {}",
            client_id,
            snake.name(),
            id,
            head
        );
        self.entities.insert(id, Entity::Snake(snake));
        Ok(id)
    }

    /// Marks the client's snake as disconnected. It leaves the board on the
    /// next tick. Returns false if the client has no snake.
    pub fn remove_player(&mut self, client_id: ClientId) -> bool {
        self.queued_moves.remove(&client_id);

        let Some(snake) = self
            .entities
            .values_mut()
            .filter_map(Entity::as_snake_mut)
            .find(|snake| snake.client_id() == client_id)
        else {
            return false;
        };

        if snake.kill(DeathReason::Disconnect) {
            info!("Client {} left, snake '{}' disconnected", client_id, snake.name());
        }
        true
    }

    /// Queues a move for the next tick, replacing any earlier one.
    pub fn enqueue_move(&mut self, client_id: ClientId, direction: Direction) {
        self.queued_moves.insert(client_id, direction);
    }

    /// Places an apple with a fixed reward at `position`.
    pub fn spawn_apple_at(&mut self, position: Point, reward: u8) -> Result<EntityId, GameError> {
        if !(1..=MAX_APPLE_REWARD).contains(&reward) {
            return Err(GameError::InvalidReward(reward));
        }

        let id = self.next_id();
        self.board.add_occupant(position, id)?;
        self.entities
            .insert(id, Entity::Apple(Apple::new(position, reward)));
        Ok(id)
    }

    /// Places an apple on a random empty square. A full board is logged and
    /// the apple is skipped.
    fn spawn_apple(&mut self) -> Option<EntityId> {
        let id = self.next_id();
        match self.board.generate_apple(id) {
            Ok(apple) => {
                trace!("Apple {} spawned at {} worth {}", id, apple.position(), apple.reward());
                self.entities.insert(id, Entity::Apple(apple));
                Some(id)
            }
            Err(e) => {
                warn!("Could not spawn apple: {}", e);
                None
            }
        }
    }

    /// Advances the game by one step and broadcasts the result.
    pub fn tick(&mut self) -> Result<TickData, TickError> {
        let started = Instant::now();
        self.tick += 1;

        let result = self.run_tick();
        self.queued_moves.clear();

        let data = result.map_err(|source| TickError::Aborted {
            tick: self.tick,
            source,
        })?;

        if log_enabled!(Level::Trace) {
            trace!("Board after tick {}:\n{}", self.tick, self.board.render());
        }
        debug!(
            "Tick {} took {:?} ({} entities, {} removed)",
            self.tick,
            started.elapsed(),
            data.entities.len(),
            data.removed_entities.len()
        );

        self.transport.broadcast_tick(&data);
        Ok(data)
    }

    fn run_tick(&mut self) -> Result<TickData, BoardError> {
        let moves = self.choose_moves();
        self.apply_moves(moves)?;

        let mut removed = self.board.process_squares(&mut self.entities);
        self.collect_dead_snakes(&mut removed);

        let mut removed_entities = Vec::with_capacity(removed.len());
        let mut apples_to_replace = 0;
        for id in removed {
            let Some(entity) = self.entities.remove(&id) else {
                continue;
            };
            if let Entity::Apple(apple) = &entity {
                self.board.remove_all(apple.position(), id);
                apples_to_replace += 1;
            }
            removed_entities.push(entity.to_data());
        }
        for _ in 0..apples_to_replace {
            self.spawn_apple();
        }

        Ok(TickData {
            tick: self.tick,
            entities: self.entities.values().map(Entity::to_data).collect(),
            removed_entities,
        })
    }

    /// Picks each live snake's direction and returns the square its head moves to.
    fn choose_moves(&mut self) -> Vec<(EntityId, Point)> {
        let threshold = self.config.missed_tick_threshold;
        let half_width = self.board.width() / 2;
        let mut moves = Vec::new();

        for (id, entity) in self.entities.iter_mut() {
            let Some(snake) = entity.as_snake_mut() else {
                continue;
            };
            if snake.is_dead() {
                continue;
            }

            let direction = match self.queued_moves.get(&snake.client_id()) {
                Some(&direction) => {
                    snake.reset_missed_ticks();
                    direction
                }
                None => {
                    let missed = snake.increment_missed_ticks();
                    if missed > threshold {
                        snake.kill(DeathReason::Disconnect);
                        info!(
                            "Client {} missed {} ticks, disconnecting",
                            snake.client_id(),
                            missed
                        );
                        self.transport.disconnect(snake.client_id());
                        continue;
                    }

                    snake.facing().unwrap_or(if snake.head().x > half_width {
                        Direction::Left
                    } else {
                        Direction::Right
                    })
                }
            };

            snake.set_facing(direction);
            moves.push((*id, snake.head().step(direction)));
        }

        moves
    }

    fn apply_moves(&mut self, moves: Vec<(EntityId, Point)>) -> Result<(), BoardError> {
        for (id, new_head) in moves {
            let Some(snake) = self.entities.get_mut(&id).and_then(Entity::as_snake_mut) else {
                continue;
            };

            if !self.board.is_point_on_board(new_head) {
                snake.kill(DeathReason::BoardCollision);
                debug!("Snake {} ran off the board at {}", id, new_head);
                continue;
            }

            let vacated = snake.advance(new_head);
            self.board.add_occupant(new_head, id)?;
            if let Some(tail) = vacated {
                self.board.remove_occupant(tail, id);
            }
        }

        Ok(())
    }

    /// Takes every dead snake off the board and adds it to `removed`.
    fn collect_dead_snakes(&mut self, removed: &mut BTreeSet<EntityId>) {
        for (id, entity) in &self.entities {
            let Some(snake) = entity.as_snake() else {
                continue;
            };
            if !snake.is_dead() {
                continue;
            }

            for point in snake.segments() {
                self.board.remove_all(point, *id);
            }
            if let Some(reason) = snake.death_reason() {
                info!("Snake '{}' ({}) removed: {:?}", snake.name(), id, reason);
            }
            removed.insert(*id);
        }
    }
}

/// Shared, lock-guarded access to the engine from concurrent tasks.
///
/// Every mutation takes the write lock for its full duration, so a tick is
/// never interleaved with a join, leave or move.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<RwLock<GameEngine>>,
}

impl EngineHandle {
    pub fn new(engine: GameEngine) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
        }
    }

    pub async fn join(
        &self,
        client_id: ClientId,
        metadata: SnakeMetadata,
        version: &SemVer,
    ) -> Result<BoardData, GameError> {
        self.engine.write().await.join(client_id, metadata, version)
    }

    pub async fn enqueue_move(&self, client_id: ClientId, direction: Direction) {
        self.engine.write().await.enqueue_move(client_id, direction);
    }

    pub async fn remove_player(&self, client_id: ClientId) -> bool {
        self.engine.write().await.remove_player(client_id)
    }

    pub async fn tick(&self) -> Result<TickData, TickError> {
        self.engine.write().await.tick()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, GameEngine> {
        self.engine.read().await
    }

    /// Current state of every entity, for clients that just joined.
    pub async fn snapshot(&self) -> Vec<EntityData> {
        let engine = self.engine.read().await;
        engine.entities().values().map(Entity::to_data).collect()
    }
}
