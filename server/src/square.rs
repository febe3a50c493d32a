use crate::entity::{Entities, Entity, EntityId};
use shared::DeathReason;

/// Most entities one square can hold during a tick: the one already there,
/// four heads moving in from each side, and one static entity.
pub const MAX_OCCUPANTS: usize = 6;

/// Returned when a square would exceed [`MAX_OCCUPANTS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareFull;

/// One cell of the board and the entities currently covering it.
///
/// A snake appears once for every one of its segments in the square, so a
/// snake whose head lands on its own body is listed twice.
#[derive(Debug, Clone, Default)]
pub struct BoardSquare {
    occupants: Vec<EntityId>,
}

impl BoardSquare {
    pub fn new() -> Self {
        Self {
            occupants: Vec::with_capacity(MAX_OCCUPANTS),
        }
    }

    pub fn occupants(&self) -> &[EntityId] {
        &self.occupants
    }

    pub fn occupant_count(&self) -> usize {
        self.occupants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }

    pub fn add_occupant(&mut self, id: EntityId) -> Result<(), SquareFull> {
        if self.occupants.len() >= MAX_OCCUPANTS {
            return Err(SquareFull);
        }
        self.occupants.push(id);
        Ok(())
    }

    /// Removes one entry for `id`. Returns whether there was one.
    pub fn remove_occupant(&mut self, id: EntityId) -> bool {
        match self.occupants.iter().position(|o| *o == id) {
            Some(index) => {
                self.occupants.remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes every entry for `id`.
    pub fn remove_all(&mut self, id: EntityId) {
        self.occupants.retain(|o| *o != id);
    }

    fn entries_of(&self, id: EntityId) -> usize {
        self.occupants.iter().filter(|o| **o == id).count()
    }

    /// Resolves everything that happened in this square during the tick.
    ///
    /// Must run after every snake's new head has been registered. Two or more
    /// collidable entries kill every live snake here; a lone snake sharing the
    /// square with an apple eats it. Returns the entities this call removed
    /// from play: the snakes it killed and any apple in the square.
    pub fn process(&mut self, entities: &mut Entities) -> Vec<EntityId> {
        if self.occupants.len() <= 1 {
            return Vec::new();
        }

        let collidable = self
            .occupants
            .iter()
            .filter(|id| entities.get(*id).is_some_and(Entity::is_collidable))
            .count();

        let mut distinct = self.occupants.clone();
        distinct.sort();
        distinct.dedup();

        if collidable > 1 {
            let mut removed = Vec::new();

            for id in distinct {
                let reason = if self.entries_of(id) > 1 {
                    DeathReason::SelfCollision
                } else {
                    DeathReason::SnakeCollision
                };

                match entities.get_mut(&id) {
                    Some(Entity::Snake(snake)) => {
                        if snake.kill(reason) {
                            removed.push(id);
                        }
                    }
                    // Apples under a collision are trampled and respawned elsewhere
                    Some(Entity::Apple(_)) => removed.push(id),
                    _ => {}
                }
            }

            self.occupants.retain(|id| match entities.get(id) {
                Some(Entity::Apple(_)) => false,
                Some(Entity::Snake(snake)) => !snake.is_dead(),
                Some(Entity::Wall(_)) => true,
                None => false,
            });

            return removed;
        }

        let apple_id = distinct
            .iter()
            .copied()
            .find(|id| matches!(entities.get(id), Some(Entity::Apple(_))));
        let snake_id = distinct.iter().copied().find(|id| {
            entities
                .get(id)
                .and_then(Entity::as_snake)
                .is_some_and(|snake| !snake.is_dead())
        });

        let (Some(apple_id), Some(snake_id)) = (apple_id, snake_id) else {
            return Vec::new();
        };

        let reward = match entities.get_mut(&apple_id).and_then(Entity::as_apple_mut) {
            Some(apple) => {
                apple.mark_eaten();
                apple.reward()
            }
            None => return Vec::new(),
        };
        if let Some(snake) = entities.get_mut(&snake_id).and_then(Entity::as_snake_mut) {
            snake.add_curled_length(u32::from(reward));
        }

        self.remove_occupant(apple_id);
        vec![apple_id]
    }
}
