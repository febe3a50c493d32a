//! Integration tests for the snake arena server
//!
//! These tests drive the engine through its public API and exercise the real
//! UDP server end to end.

use bincode::{deserialize, serialize};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use server::config::GameConfig;
use server::entity::Entity;
use server::game::{GameEngine, GameError, Transport};
use server::network::Server;
use server::square::MAX_OCCUPANTS;
use shared::{
    ClientId, Color, DeathReason, Direction, EntityData, JoinError, Packet, Point, SemVer,
    SnakeMetadata, TickData, MAX_PACKET_SIZE, PROTOCOL_VERSION,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

#[derive(Default)]
struct CollectingTransport {
    ticks: Mutex<Vec<u64>>,
    disconnected: Mutex<Vec<ClientId>>,
}

impl Transport for CollectingTransport {
    fn broadcast_tick(&self, tick: &TickData) {
        self.ticks.lock().unwrap().push(tick.tick);
    }

    fn disconnect(&self, client_id: ClientId) {
        self.disconnected.lock().unwrap().push(client_id);
    }
}

fn engine(width: u16, height: u16, apples: usize, seed: u64) -> (GameEngine, Arc<CollectingTransport>) {
    let transport = Arc::new(CollectingTransport::default());
    let config = GameConfig {
        board_width: width,
        board_height: height,
        apple_count: apples,
        ..GameConfig::default()
    };
    let engine = GameEngine::with_rng(config, transport.clone(), StdRng::seed_from_u64(seed))
        .expect("engine");
    (engine, transport)
}

fn meta(name: &str) -> SnakeMetadata {
    SnakeMetadata::new(name, Color::rgb(30, 144, 255))
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Join and tick packets survive the wire format intact
    #[test]
    fn packet_serialization_roundtrip() {
        let packets = vec![
            Packet::Join {
                snake: meta("alice"),
                version: PROTOCOL_VERSION,
            },
            Packet::Tick(TickData {
                tick: 12,
                entities: vec![EntityData::Apple(shared::AppleData {
                    position: Point::new(3, 4),
                    reward: 2,
                    eaten: false,
                })],
                removed_entities: Vec::new(),
            }),
        ];

        for packet in packets {
            let bytes = serialize(&packet).unwrap();
            assert!(bytes.len() < MAX_PACKET_SIZE);
            assert_eq!(deserialize::<Packet>(&bytes).unwrap(), packet);
        }
    }

    /// Entities are tagged by kind on the JSON wire
    #[test]
    fn entity_json_is_tagged_by_kind() {
        let (mut engine, _) = engine(10, 10, 0, 1);
        engine
            .add_player_at(1, meta("alice"), Point::new(2, 3), Some(Direction::Up))
            .unwrap();

        let data = engine.tick().unwrap();
        let json = serde_json::to_value(&data).unwrap();

        let snake = &json["entities"][0]["SNAKE"];
        assert_eq!(snake["metadata"]["name"], "alice");
        assert_eq!(snake["head"]["x"], 2);
        assert_eq!(snake["head"]["y"], 2);
        assert!(json["removedEntities"].as_array().unwrap().is_empty());
    }

    /// Garbage datagrams do not decode as packets
    #[test]
    fn malformed_packet_handling() {
        let garbage = [0xffu8, 0xff, 0xff, 0xff, 0x01];
        assert!(deserialize::<Packet>(&garbage).is_err());
        assert!(deserialize::<Packet>(&[]).is_err());
    }
}

/// ENGINE SCENARIO TESTS
mod engine_tests {
    use super::*;

    #[test]
    fn apple_reward_unrolls_over_following_ticks() {
        let (mut engine, _) = engine(25, 25, 0, 2);
        let snake_id = engine
            .add_player_at(1, meta("alice"), Point::new(5, 5), Some(Direction::Right))
            .unwrap();
        engine.spawn_apple_at(Point::new(6, 5), 3).unwrap();

        let data = engine.tick().unwrap();
        let eaten = data.removed_entities.iter().any(|e| {
            matches!(e, EntityData::Apple(apple) if apple.eaten && apple.reward == 3)
        });
        assert!(eaten);

        let snake = engine.entities()[&snake_id].as_snake().unwrap();
        assert_eq!(snake.head(), Point::new(6, 5));
        assert_eq!(snake.curled_length(), 3);
        assert!(snake.body().is_empty());

        // Steer away from wherever the replacement apple landed
        let mut expected_min_body = 0;
        for _ in 0..3 {
            let head = engine.entities()[&snake_id].as_snake().unwrap().head();
            let direction = [Direction::Down, Direction::Right, Direction::Up]
                .into_iter()
                .find(|d| {
                    let next = head.step(*d);
                    engine.board().is_point_on_board(next)
                        && engine
                            .board()
                            .square(next)
                            .map_or(true, |square| square.is_empty())
                })
                .unwrap_or(Direction::Down);
            engine.enqueue_move(1, direction);
            engine.tick().unwrap();

            expected_min_body += 1;
            let snake = engine.entities()[&snake_id].as_snake().unwrap();
            assert_eq!(snake.body().len(), expected_min_body);
        }
        assert_eq!(
            engine.entities()[&snake_id].as_snake().unwrap().length(),
            4
        );
    }

    #[test]
    fn join_conflicts() {
        let (mut engine, _) = engine(25, 25, 5, 3);

        engine.join(1, meta("alice"), &PROTOCOL_VERSION).unwrap();

        assert_eq!(
            engine.join(2, meta("alice"), &PROTOCOL_VERSION),
            Err(GameError::Join(JoinError::PlayerExists))
        );
        assert_eq!(
            engine.join(1, meta("carol"), &PROTOCOL_VERSION),
            Err(GameError::Join(JoinError::InvalidSession))
        );
        assert_eq!(
            engine.join(3, meta("dave"), &SemVer::new(PROTOCOL_VERSION.major + 1, 0, 0)),
            Err(GameError::Join(JoinError::VersionMismatch))
        );
        assert_eq!(engine.snake_count(), 1);
    }

    #[test]
    fn idle_snake_is_disconnected_after_threshold() {
        let (mut engine, transport) = engine(40, 40, 0, 4);
        engine
            .add_player_at(9, meta("idle"), Point::new(5, 20), Some(Direction::Right))
            .unwrap();
        let threshold = engine.config().missed_tick_threshold;

        let mut removed = Vec::new();
        for _ in 0..=threshold {
            removed.extend(engine.tick().unwrap().removed_entities);
        }

        assert_eq!(*transport.disconnected.lock().unwrap(), vec![9]);
        assert_eq!(engine.snake_count(), 0);
        assert!(matches!(
            removed.as_slice(),
            [EntityData::Snake(s)] if s.death_reason == Some(DeathReason::Disconnect)
        ));
        assert_eq!(transport.ticks.lock().unwrap().len() as u32, threshold + 1);
    }

    /// Many snakes moving at random never break the board bookkeeping
    #[test]
    fn random_play_keeps_board_consistent() {
        let (mut engine, _) = engine(16, 16, 20, 5);
        let mut rng = StdRng::seed_from_u64(99);
        let mut next_client: ClientId = 0;

        for _ in 0..300 {
            while engine.snake_count() < 6 {
                let name = format!("snake{}", next_client);
                engine.add_player(next_client, meta(&name)).unwrap();
                next_client += 1;
            }

            let clients: Vec<ClientId> = engine
                .snakes()
                .map(|(_, snake)| snake.client_id())
                .collect();
            for client in clients {
                // Leave some clients idle so facing reuse and timeouts happen
                if rng.gen_bool(0.8) {
                    let direction = Direction::ALL[rng.gen_range(0..4)];
                    engine.enqueue_move(client, direction);
                }
            }

            let data = engine.tick().unwrap();
            assert_eq!(data.entities.len(), engine.entities().len());
            assert_eq!(engine.apple_count(), 20);

            for (point, square) in engine.board().squares() {
                assert!(square.occupant_count() <= MAX_OCCUPANTS);
                for id in square.occupants() {
                    match &engine.entities()[id] {
                        Entity::Snake(snake) => {
                            assert!(!snake.is_dead());
                            assert!(snake.segments().any(|p| p == point));
                        }
                        Entity::Apple(apple) => assert_eq!(apple.position(), point),
                        Entity::Wall(wall) => assert!(wall.contains(point)),
                    }
                }
            }

            for (id, snake) in engine.snakes() {
                assert_eq!(snake.length(), snake.body().len() + 1 + snake.curled_length() as usize);
                for point in snake.segments() {
                    assert!(engine.board().is_point_on_board(point));
                    assert!(engine.board().square(point).unwrap().occupants().contains(&id));
                }
            }
        }
    }
}

/// END TO END NETWORK TESTS
mod network_tests {
    use super::*;

    async fn recv_packet(socket: &UdpSocket) -> Packet {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for packet")
            .unwrap();
        deserialize(&buf[..len]).unwrap()
    }

    async fn send_packet(socket: &UdpSocket, packet: &Packet, to: std::net::SocketAddr) {
        socket.send_to(&serialize(packet).unwrap(), to).await.unwrap();
    }

    #[tokio::test]
    async fn udp_join_move_and_tick() {
        let config = GameConfig {
            board_width: 20,
            board_height: 20,
            apple_count: 5,
            tick_interval: Duration::from_millis(50),
            ..GameConfig::default()
        };
        let mut server = Server::new("127.0.0.1:0", config).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let engine = server.engine();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        send_packet(
            &client,
            &Packet::Join {
                snake: meta("net"),
                version: PROTOCOL_VERSION,
            },
            server_addr,
        )
        .await;

        // A tick broadcast can overtake the join reply
        let client_id = loop {
            match recv_packet(&client).await {
                Packet::Joined { client_id, board } => {
                    assert_eq!((board.width, board.height), (20, 20));
                    break client_id;
                }
                Packet::Tick(_) => continue,
                other => panic!("expected Joined, got {:?}", other),
            }
        };
        assert!(engine.read().await.snake_for(client_id).is_some());

        send_packet(
            &client,
            &Packet::Move {
                direction: Direction::Up,
            },
            server_addr,
        )
        .await;

        let mut saw_snake = false;
        for _ in 0..3 {
            match recv_packet(&client).await {
                Packet::Tick(tick) => {
                    assert!(tick.tick > 0);
                    saw_snake |= tick.entities.iter().any(|e| {
                        matches!(e, EntityData::Snake(s) if s.metadata.name == "net")
                    }) || tick.removed_entities.iter().any(|e| {
                        matches!(e, EntityData::Snake(s) if s.metadata.name == "net")
                    });
                }
                other => panic!("expected Tick, got {:?}", other),
            }
        }
        assert!(saw_snake);

        send_packet(&client, &Packet::Leave, server_addr).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(engine.read().await.snake_for(client_id).is_none());
    }

    #[tokio::test]
    async fn udp_join_rejected_for_old_version() {
        let config = GameConfig {
            board_width: 10,
            board_height: 10,
            apple_count: 0,
            tick_interval: Duration::from_secs(60),
            ..GameConfig::default()
        };
        let mut server = Server::new("127.0.0.1:0", config).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        send_packet(
            &client,
            &Packet::Join {
                snake: meta("old"),
                version: SemVer::new(0, 9, 0),
            },
            server_addr,
        )
        .await;

        assert_eq!(
            recv_packet(&client).await,
            Packet::JoinRejected {
                error: JoinError::VersionMismatch
            }
        );
    }
}
