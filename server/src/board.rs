//! The board: a fixed grid of squares used as the spatial index of the game.

use crate::entity::{Apple, Entities, EntityId};
use crate::probability::{ProbabilityError, ProbabilityTable};
use crate::square::{BoardSquare, MAX_OCCUPANTS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::Point;
use std::collections::BTreeSet;
use thiserror::Error;

/// Apple reward -> chance of spawning with it.
const APPLE_REWARDS: [(u8, f64); 4] = [(1, 0.50), (2, 0.25), (3, 0.15), (4, 0.10)];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoardError {
    #[error("board dimensions must be at least 1x1, got {width}x{height}")]
    InvalidDimensions { width: u16, height: u16 },
    #[error("no empty square found on the board")]
    Full,
    #[error("{0} is outside the board")]
    OutOfBounds(Point),
    #[error("square {0} already holds {} occupants", MAX_OCCUPANTS)]
    SquareOverflow(Point),
    #[error("apple reward table: {0}")]
    Reward(#[from] ProbabilityError),
}

pub struct Board {
    width: i32,
    height: i32,
    /// Column-major, indexed by `x * height + y`.
    squares: Vec<BoardSquare>,
    apple_rewards: ProbabilityTable<u8>,
    rng: StdRng,
}

impl Board {
    pub fn new(width: u16, height: u16) -> Result<Self, BoardError> {
        Self::with_rng(width, height, StdRng::from_entropy())
    }

    /// Creates a board drawing from the given random source.
    pub fn with_rng(width: u16, height: u16, rng: StdRng) -> Result<Self, BoardError> {
        if width == 0 || height == 0 {
            return Err(BoardError::InvalidDimensions { width, height });
        }

        let mut apple_rewards = ProbabilityTable::new();
        for (reward, probability) in APPLE_REWARDS {
            apple_rewards.add_value(reward, probability)?;
        }

        let cells = width as usize * height as usize;
        Ok(Self {
            width: i32::from(width),
            height: i32::from(height),
            squares: (0..cells).map(|_| BoardSquare::new()).collect(),
            apple_rewards,
            rng,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn is_point_on_board(&self, point: Point) -> bool {
        point.is_on_board(self.width, self.height)
    }

    fn index(&self, point: Point) -> Option<usize> {
        if !self.is_point_on_board(point) {
            return None;
        }
        Some((point.x * self.height + point.y) as usize)
    }

    pub fn square(&self, point: Point) -> Option<&BoardSquare> {
        let index = self.index(point)?;
        Some(&self.squares[index])
    }

    pub fn square_mut(&mut self, point: Point) -> Option<&mut BoardSquare> {
        let index = self.index(point)?;
        Some(&mut self.squares[index])
    }

    /// All squares with their coordinates.
    pub fn squares(&self) -> impl Iterator<Item = (Point, &BoardSquare)> + '_ {
        let height = self.height;
        self.squares
            .iter()
            .enumerate()
            .map(move |(i, square)| (Point::new(i as i32 / height, i as i32 % height), square))
    }

    pub fn occupant_count(&self, point: Point) -> usize {
        self.square(point).map_or(0, BoardSquare::occupant_count)
    }

    pub fn add_occupant(&mut self, point: Point, id: EntityId) -> Result<(), BoardError> {
        let square = self
            .square_mut(point)
            .ok_or(BoardError::OutOfBounds(point))?;
        square
            .add_occupant(id)
            .map_err(|_| BoardError::SquareOverflow(point))
    }

    /// Removes one entry of `id` at `point`, returning whether it was there.
    pub fn remove_occupant(&mut self, point: Point, id: EntityId) -> bool {
        self.square_mut(point)
            .is_some_and(|square| square.remove_occupant(id))
    }

    pub fn remove_all(&mut self, point: Point, id: EntityId) {
        if let Some(square) = self.square_mut(point) {
            square.remove_all(id);
        }
    }

    /// Picks a random unoccupied square, giving up after one attempt per square.
    pub fn random_empty_point(&mut self) -> Result<Point, BoardError> {
        let attempts = self.squares.len();

        for _ in 0..attempts {
            let point = Point::new(
                self.rng.gen_range(0..self.width),
                self.rng.gen_range(0..self.height),
            );
            if self.occupant_count(point) == 0 {
                return Ok(point);
            }
        }

        Err(BoardError::Full)
    }

    /// Places a new apple with a weighted random reward on an empty square
    /// and registers it there under `id`.
    pub fn generate_apple(&mut self, id: EntityId) -> Result<Apple, BoardError> {
        let point = self.random_empty_point()?;
        let reward = self.apple_rewards.sample(&mut self.rng)?;
        self.add_occupant(point, id)?;
        Ok(Apple::new(point, reward))
    }

    /// Runs collision resolution on every square and returns the union of
    /// everything removed.
    pub fn process_squares(&mut self, entities: &mut Entities) -> BTreeSet<EntityId> {
        self.squares
            .iter_mut()
            .flat_map(|square| square.process(entities))
            .collect()
    }

    /// Text picture of the board, one row per line, `X` for occupied squares.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(((self.width + 1) * (self.height + 2)) as usize);
        let border = "-".repeat(self.width as usize);

        out.push_str(&border);
        out.push('\n');
        for y in 0..self.height {
            for x in 0..self.width {
                let occupied = self.occupant_count(Point::new(x, y)) > 0;
                out.push(if occupied { 'X' } else { '.' });
            }
            out.push('\n');
        }
        out.push_str(&border);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(width: u16, height: u16) -> Board {
        Board::with_rng(width, height, StdRng::seed_from_u64(11)).unwrap()
    }

    #[test]
    fn test_rejects_empty_dimensions() {
        assert!(matches!(
            Board::new(0, 5),
            Err(BoardError::InvalidDimensions { width: 0, height: 5 })
        ));
    }

    #[test]
    fn test_square_lookup() {
        let board = board(4, 3);
        assert!(board.square(Point::new(3, 2)).is_some());
        assert!(board.square(Point::new(4, 0)).is_none());
        assert!(board.square(Point::new(0, -1)).is_none());
        assert!(board.is_point_on_board(Point::new(0, 0)));
        assert!(!board.is_point_on_board(Point::new(0, 3)));
    }

    #[test]
    fn test_squares_iterator_reports_coordinates() {
        let mut board = board(3, 2);
        board.add_occupant(Point::new(2, 1), EntityId(5)).unwrap();

        let occupied: Vec<Point> = board
            .squares()
            .filter(|(_, square)| !square.is_empty())
            .map(|(point, _)| point)
            .collect();

        assert_eq!(occupied, vec![Point::new(2, 1)]);
        assert_eq!(board.squares().count(), 6);
    }

    #[test]
    fn test_add_occupant_out_of_bounds() {
        let mut board = board(2, 2);
        assert_eq!(
            board.add_occupant(Point::new(2, 0), EntityId(1)),
            Err(BoardError::OutOfBounds(Point::new(2, 0)))
        );
    }

    #[test]
    fn test_square_overflow_reported_with_point() {
        let mut board = board(2, 2);
        let point = Point::new(1, 1);
        for id in 0..MAX_OCCUPANTS as u64 {
            board.add_occupant(point, EntityId(id)).unwrap();
        }
        assert_eq!(
            board.add_occupant(point, EntityId(100)),
            Err(BoardError::SquareOverflow(point))
        );
    }

    #[test]
    fn test_random_empty_point_avoids_occupied() {
        let mut board = board(2, 1);
        board.add_occupant(Point::new(0, 0), EntityId(1)).unwrap();

        // With two squares there is a small chance both attempts hit the
        // occupied one, so only check successful draws.
        for _ in 0..20 {
            if let Ok(point) = board.random_empty_point() {
                assert_eq!(point, Point::new(1, 0));
            }
        }
    }

    #[test]
    fn test_full_board() {
        let mut board = board(2, 2);
        for x in 0..2 {
            for y in 0..2 {
                board.add_occupant(Point::new(x, y), EntityId(1)).unwrap();
            }
        }
        assert_eq!(board.random_empty_point(), Err(BoardError::Full));
        assert_eq!(board.generate_apple(EntityId(2)), Err(BoardError::Full));
    }

    #[test]
    fn test_generate_apple_registers_square() {
        let mut board = board(5, 5);
        let apple = board.generate_apple(EntityId(9)).unwrap();

        assert!((1..=4).contains(&apple.reward()));
        assert!(!apple.is_eaten());
        assert_eq!(
            board.square(apple.position()).unwrap().occupants(),
            &[EntityId(9)]
        );
    }

    #[test]
    fn test_render() {
        let mut board = board(3, 2);
        board.add_occupant(Point::new(1, 0), EntityId(1)).unwrap();
        board.add_occupant(Point::new(2, 1), EntityId(2)).unwrap();

        assert_eq!(board.render(), "---\n.X.\n..X\n---");
    }
}
