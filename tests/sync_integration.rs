//! Integration tests for avatar info synchronization
//!
//! These tests drive the engine tick by tick and read the produced frames
//! back with the client-side decoder:
//! - Resolution changes (additions, removals, movements, low resolution)
//! - Shared block precomputation and buffer release
//! - Failure isolation between observers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use pretty_assertions::assert_eq;

use rustscape_protocol::config::{Execution, SyncConfig};
use rustscape_protocol::crypto::{
    Isaac, IsaacProvider, NopStreamCipher, StreamCipher, StreamCipherProvider,
};
use rustscape_protocol::error::{BufferError, ObserverFailure, ProtocolError, SyncError};
use rustscape_protocol::game::info::codec::SayEncoder;
use rustscape_protocol::game::info::{
    Appearance, BlockEncoder, ChatMessage, EncodeContext, EncoderSet, ExactMove, Headbar,
    HitMark, HitUpdate, HuffmanCodec, InfoBlock, InfoKind, Latin1Codec, Revision, Sequence,
    SpotAnim, Tinting,
};
use rustscape_protocol::game::sync::decoder::{DecodedAddition, DecodedLowRes, DecodedMovement};
use rustscape_protocol::game::sync::{decode_payload, split_frame, DecodedPacket, Placement, Step};
use rustscape_protocol::game::{AvatarRepository, CoordGrid, RegionRef};
use rustscape_protocol::net::PacketBuffer;
use rustscape_protocol::InfoSyncEngine;

fn config(revision: u32, execution: Execution) -> SyncConfig {
    SyncConfig {
        revision,
        execution,
        worker_threads: 2,
        ..SyncConfig::default()
    }
}

fn serial_engine() -> InfoSyncEngine {
    InfoSyncEngine::new(&config(530, Execution::Serial)).unwrap()
}

fn coord(x: u16, z: u16) -> CoordGrid {
    CoordGrid::new(x, z, 0).unwrap()
}

fn decode(engine: &InfoSyncEngine, frame: &Bytes) -> DecodedPacket {
    let (opcode, payload) = split_frame(frame, &mut NopStreamCipher).unwrap();
    assert_eq!(opcode, engine.opcode());
    decode_payload(payload, engine.encoders(), &Latin1Codec).unwrap()
}

fn payload(frame: &Bytes) -> &[u8] {
    &frame[3..]
}

/// Say encoder that counts how often it runs
struct CountingSay {
    calls: Arc<AtomicUsize>,
}

impl BlockEncoder for CountingSay {
    fn kind(&self) -> InfoKind {
        InfoKind::Say
    }

    fn encode(
        &self,
        block: &InfoBlock,
        buf: &mut PacketBuffer,
        ctx: &EncodeContext<'_>,
    ) -> Result<(), ProtocolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SayEncoder.encode(block, buf, ctx)
    }

    fn decode(
        &self,
        buf: &mut PacketBuffer,
        huffman: &dyn HuffmanCodec,
    ) -> Result<InfoBlock, ProtocolError> {
        SayEncoder.decode(buf, huffman)
    }
}

fn counting_engine(calls: &Arc<AtomicUsize>) -> InfoSyncEngine {
    let base = EncoderSet::for_revision(Revision::R530).unwrap();
    let set = (*base).clone().with_encoder(Arc::new(CountingSay {
        calls: Arc::clone(calls),
    }));
    serial_engine().with_encoders(Arc::new(set)).unwrap()
}

/// Cipher whose keystream blows up, failing its observer's frame
struct ExplodingCipher;

impl StreamCipher for ExplodingCipher {
    fn next_int(&mut self) -> u32 {
        panic!("cipher exploded")
    }
}

#[test]
fn test_first_tick_adds_own_avatar_and_neighbours() {
    let mut engine = serial_engine();
    let mut repo = AvatarRepository::new(16);
    let me = repo.insert(coord(3222, 3218)).unwrap();
    let other = repo.insert(coord(3225, 3220)).unwrap();
    engine.register(1, me, Box::new(NopStreamCipher));

    let output = engine.run_tick(&mut repo);
    assert!(output.is_complete());

    let packet = decode(&engine, output.packet(1).unwrap());
    assert_eq!(
        packet.additions,
        vec![
            DecodedAddition {
                index: me,
                placement: Placement::Absolute(coord(3222, 3218)),
                has_info: false,
            },
            DecodedAddition {
                index: other,
                placement: Placement::Absolute(coord(3225, 3220)),
                has_info: false,
            },
        ]
    );
    assert!(packet.removals.is_empty());
    assert!(packet.movements.is_empty());
}

#[test]
fn test_unchanged_avatar_has_no_entry() {
    let mut engine = serial_engine();
    let mut repo = AvatarRepository::new(16);
    let me = repo.insert(coord(3222, 3218)).unwrap();
    repo.insert(coord(3225, 3220)).unwrap();
    repo.insert(coord(3230, 3210)).unwrap();
    engine.register(1, me, Box::new(NopStreamCipher));

    engine.run_tick(&mut repo);
    for _ in 0..3 {
        let output = engine.run_tick(&mut repo);
        let packet = decode(&engine, output.packet(1).unwrap());
        assert_eq!(packet, DecodedPacket::default());
    }
}

#[test]
fn test_single_tile_move_is_a_walk() {
    let mut engine = serial_engine();
    let mut repo = AvatarRepository::new(16);
    let me = repo.insert(coord(105, 100)).unwrap();
    let x = repo.insert(coord(100, 100)).unwrap();
    engine.register(1, me, Box::new(NopStreamCipher));
    engine.run_tick(&mut repo);

    repo.set_coord(x, CoordGrid::new(101, 100, 0).unwrap()).unwrap();
    let output = engine.run_tick(&mut repo);
    let packet = decode(&engine, output.packet(1).unwrap());

    assert!(packet.removals.is_empty());
    assert!(packet.additions.is_empty());
    assert_eq!(
        packet.movements,
        vec![DecodedMovement {
            index: x,
            step: Step::Walk(4),
            has_info: false,
        }]
    );
}

#[test]
fn test_larger_moves_pick_wider_encodings() {
    let mut engine = serial_engine();
    let mut repo = AvatarRepository::new(16);
    let me = repo.insert(coord(3200, 3200)).unwrap();
    let runner = repo.insert(coord(3200, 3205)).unwrap();
    let jumper = repo.insert(coord(3205, 3200)).unwrap();
    engine.register(1, me, Box::new(NopStreamCipher));
    engine.run_tick(&mut repo);

    repo.set_coord(runner, coord(3202, 3207)).unwrap();
    repo.set_coord(jumper, coord(3195, 3190)).unwrap();
    let output = engine.run_tick(&mut repo);
    let packet = decode(&engine, output.packet(1).unwrap());

    assert_eq!(
        packet.movements,
        vec![
            DecodedMovement {
                index: runner,
                step: Step::Run(15),
                has_info: false,
            },
            DecodedMovement {
                index: jumper,
                step: Step::Jump {
                    dx: -10,
                    dz: -10,
                    dlevel: 0
                },
                has_info: false,
            },
        ]
    );
}

#[test]
fn test_remove_and_readd_same_index_in_one_tick() {
    let mut engine = serial_engine();
    let mut repo = AvatarRepository::new(16);
    let me = repo.insert(coord(3200, 3200)).unwrap();
    let old = repo.insert(coord(3201, 3201)).unwrap();
    engine.register(1, me, Box::new(NopStreamCipher));
    engine.run_tick(&mut repo);

    repo.remove(old).unwrap();
    let new = repo.insert(coord(3203, 3199)).unwrap();
    assert_eq!(new, old);

    let output = engine.run_tick(&mut repo);
    let packet = decode(&engine, output.packet(1).unwrap());
    assert_eq!(packet.removals, vec![old]);
    assert_eq!(
        packet.additions,
        vec![DecodedAddition {
            index: new,
            placement: Placement::Absolute(coord(3203, 3199)),
            has_info: false,
        }]
    );
    assert!(packet.movements.is_empty());
    assert!(engine.observer(1).unwrap().is_high_resolution(new));
}

#[test]
fn test_low_resolution_updates_and_region_relative_addition() {
    let mut engine = serial_engine();
    let mut repo = AvatarRepository::new(16);
    let me = repo.insert(coord(3210, 3210)).unwrap();
    let far = repo.insert(coord(3260, 3260)).unwrap();
    engine.register(1, me, Box::new(NopStreamCipher));

    let output = engine.run_tick(&mut repo);
    let packet = decode(&engine, output.packet(1).unwrap());
    assert_eq!(
        packet.low_res,
        vec![DecodedLowRes {
            index: far,
            region: Some(RegionRef {
                level: 0,
                x: 50,
                z: 50
            }),
        }]
    );

    // Walking into view inside the known region only sends the local tile
    repo.set_coord(far, coord(3215, 3212)).unwrap();
    let output = engine.run_tick(&mut repo);
    let packet = decode(&engine, output.packet(1).unwrap());
    assert_eq!(
        packet.additions,
        vec![DecodedAddition {
            index: far,
            placement: Placement::RegionLocal { x: 15, z: 12 },
            has_info: false,
        }]
    );
    assert!(packet.low_res.is_empty());
}

#[test]
fn test_low_resolution_removal() {
    let mut engine = serial_engine();
    let mut repo = AvatarRepository::new(16);
    let me = repo.insert(coord(3210, 3210)).unwrap();
    let far = repo.insert(coord(4000, 4000)).unwrap();
    engine.register(1, me, Box::new(NopStreamCipher));
    engine.run_tick(&mut repo);

    repo.remove(far).unwrap();
    let output = engine.run_tick(&mut repo);
    let packet = decode(&engine, output.packet(1).unwrap());
    assert_eq!(
        packet.low_res,
        vec![DecodedLowRes {
            index: far,
            region: None
        }]
    );
}

#[test]
fn test_precompute_runs_once_regardless_of_observers() {
    for observers in 0..=3u16 {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut engine = counting_engine(&calls);
        let mut repo = AvatarRepository::new(16);
        let speaker = repo.insert(coord(3200, 3200)).unwrap();
        for i in 0..observers {
            let index = repo.insert(coord(3201 + i, 3200)).unwrap();
            engine.register(index as u64, index, Box::new(NopStreamCipher));
        }
        engine.run_tick(&mut repo);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        repo.get_mut(speaker).unwrap().info.say("Buying gf");
        let output = engine.run_tick(&mut repo);

        assert!(output.is_complete());
        assert_eq!(output.packets.len(), observers as usize);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "{observers} observers");
        assert_eq!(output.stats.precomputed_blocks, 1);
        assert_eq!(engine.pool().outstanding(), 0);
    }
}

#[test]
fn test_two_observers_share_identical_say_bytes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut engine = counting_engine(&calls);
    let mut repo = AvatarRepository::new(16);
    let speaker = repo.insert(coord(3200, 3200)).unwrap();
    let first = repo.insert(coord(3203, 3200)).unwrap();
    let second = repo.insert(coord(3196, 3204)).unwrap();
    engine.register(1, first, Box::new(NopStreamCipher));
    engine.register(2, second, Box::new(NopStreamCipher));
    engine.run_tick(&mut repo);

    repo.get_mut(speaker).unwrap().info.say("hello");
    let output = engine.run_tick(&mut repo);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Say mask bit in 530, then the shared block bytes
    let expected_tail = [0x04, b'h', b'e', b'l', b'l', b'o', 0];
    for connection in [1, 2] {
        let frame = output.packet(connection).unwrap();
        assert!(payload(frame).ends_with(&expected_tail), "connection {connection}");

        let packet = decode(&engine, frame);
        assert_eq!(
            packet.info_for(speaker),
            Some(&[InfoBlock::Say("hello".to_string())][..])
        );
    }
}

fn full_snapshot(repo: &mut AvatarRepository, index: u16) -> Vec<InfoBlock> {
    let appearance = Appearance {
        name: "Zezima".to_string(),
        colours: [3, 7, 1, 0, 2],
        skull_icon: 0,
        ..Appearance::default()
    };
    let chat = ChatMessage {
        colour: 9,
        effects: 2,
        rights: 1,
        text: "selling lobbies".to_string(),
    };
    let exact_move = ExactMove {
        start_x: 1,
        start_z: 2,
        end_x: 3,
        end_z: 4,
        start_delay: 30,
        end_delay: 60,
        direction: 2,
    };
    let hit = HitMark {
        kind: 1,
        self_kind: 1,
        source: None,
        damage: 300,
        delay: 0,
    };
    let headbar = Headbar {
        id: 0,
        fill: 200,
        delay: 0,
    };
    let tinting = Tinting {
        start: 0,
        end: 45,
        hue: 20,
        saturation: 40,
        luminance: 60,
        opacity: 80,
        observer: None,
    };

    let info = &mut repo.get_mut(index).unwrap().info;
    info.set_appearance(appearance.clone());
    info.set_move_speed(2);
    info.set_temporary_move_speed(127);
    info.set_sequence(866, 3);
    info.set_face_angle(1536);
    info.set_face_pathing_entity(32768 + 12);
    info.say("Buying gf");
    info.set_chat(chat.clone());
    info.set_exact_move(exact_move);
    info.set_spot_anim(86, 100, 5);
    info.add_hit(hit);
    info.add_headbar(headbar);
    info.set_tinting(tinting);

    vec![
        InfoBlock::Appearance(appearance),
        InfoBlock::MoveSpeed(2),
        InfoBlock::TemporaryMoveSpeed(127),
        InfoBlock::Sequence(Sequence { id: 866, delay: 3 }),
        InfoBlock::FaceAngle(1536),
        InfoBlock::FacePathingEntity(32768 + 12),
        InfoBlock::Say("Buying gf".to_string()),
        InfoBlock::Chat(chat),
        InfoBlock::ExactMove(exact_move),
        InfoBlock::SpotAnim(SpotAnim {
            id: 86,
            height: 100,
            delay: 5,
        }),
        InfoBlock::Hit(HitUpdate {
            hits: vec![hit],
            headbars: vec![headbar],
        }),
        InfoBlock::Tinting(tinting),
    ]
}

#[test]
fn test_full_snapshot_round_trip_per_revision() {
    for revision in Revision::ALL {
        let mut engine =
            InfoSyncEngine::new(&config(revision.number(), Execution::Serial)).unwrap();
        let mut repo = AvatarRepository::new(16);
        let me = repo.insert(coord(3200, 3200)).unwrap();
        let subject = repo.insert(coord(3202, 3201)).unwrap();
        let expected = full_snapshot(&mut repo, subject);
        engine.register(1, me, Box::new(NopStreamCipher));

        let output = engine.run_tick(&mut repo);
        assert!(output.is_complete(), "revision {revision}");

        let packet = decode(&engine, output.packet(1).unwrap());
        let mut blocks = packet.info_for(subject).unwrap().to_vec();
        blocks.sort_by_key(InfoBlock::kind);
        assert_eq!(blocks, expected, "revision {revision}");
    }
}

#[test]
fn test_oversized_repository_keeps_indices_encodable() {
    let mut engine = serial_engine();
    let mut repo = AvatarRepository::new(2100);
    while repo.insert(coord(3200, 3200)).is_ok() {}
    assert_eq!(repo.len(), 2047);
    engine.register(1, 0, Box::new(NopStreamCipher));

    let output = engine.run_tick(&mut repo);
    assert!(output.is_complete());

    let packet = decode(&engine, output.packet(1).unwrap());
    assert_eq!(packet.additions.len(), 255);
    assert_eq!(packet.low_res.len(), 2047 - 255);
    assert_eq!(packet.low_res.last().map(|entry| entry.index), Some(2046));
}

#[test]
fn test_crowded_first_tick_spreads_additions() {
    let mut engine = serial_engine();
    let mut repo = AvatarRepository::new(512);
    let me = repo.insert(coord(3200, 3200)).unwrap();
    engine.register(1, me, Box::new(NopStreamCipher));

    let mut crowd = Vec::new();
    for i in 0..254u16 {
        let index = repo.insert(coord(3200 + i % 16, 3200 + i / 16)).unwrap();
        repo.get_mut(index).unwrap().info.set_appearance(Appearance {
            name: "n".repeat(200),
            ..Appearance::default()
        });
        crowd.push(index);
    }

    let mut added = 0;
    for tick in 0..3 {
        for &index in &crowd {
            let info = &mut repo.get_mut(index).unwrap().info;
            info.set_sequence(866, 0);
            info.say("s".repeat(80));
        }

        let output = engine.run_tick(&mut repo);
        assert!(output.is_complete(), "tick {tick}: {:?}", output.failure);
        let frame = output.packet(1).unwrap();
        let packet = decode(&engine, frame);
        if tick == 0 {
            assert!(packet.additions.len() < 255);
        }
        added += packet.additions.len();
    }

    assert_eq!(added, 255);
    assert_eq!(engine.observer(1).unwrap().high_resolution().count(), 255);
}

#[test]
fn test_observer_dependent_blocks_differ_per_connection() {
    let mut engine = InfoSyncEngine::new(&config(562, Execution::Pool)).unwrap();
    let mut repo = AvatarRepository::new(16);
    let tinted = repo.insert(coord(3200, 3200)).unwrap();
    let attacker = repo.insert(coord(3201, 3200)).unwrap();
    let subject = repo.insert(coord(3202, 3200)).unwrap();
    engine.register(1, tinted, Box::new(NopStreamCipher));
    engine.register(2, attacker, Box::new(NopStreamCipher));
    engine.run_tick(&mut repo);

    let tinting = Tinting {
        start: 0,
        end: 30,
        hue: 10,
        saturation: 20,
        luminance: 30,
        opacity: 40,
        observer: Some(tinted),
    };
    let info = &mut repo.get_mut(subject).unwrap().info;
    info.set_tinting(tinting);
    info.add_hit(HitMark {
        kind: 1,
        self_kind: 2,
        source: Some(attacker),
        damage: 12,
        delay: 0,
    });
    let output = engine.run_tick(&mut repo);
    assert!(output.is_complete());

    let hit_kind = |blocks: &[InfoBlock]| {
        blocks.iter().find_map(|block| match block {
            InfoBlock::Hit(update) => update.hits.first().map(|hit| hit.kind),
            _ => None,
        })
    };
    let has_tinting = |blocks: &[InfoBlock]| {
        blocks.iter().any(|block| block.kind() == InfoKind::Tinting)
    };

    let first = decode(&engine, output.packet(1).unwrap());
    let first_blocks = first.info_for(subject).unwrap();
    assert!(has_tinting(first_blocks));
    assert_eq!(hit_kind(first_blocks), Some(1));

    let second = decode(&engine, output.packet(2).unwrap());
    let second_blocks = second.info_for(subject).unwrap();
    assert!(!has_tinting(second_blocks));
    assert_eq!(hit_kind(second_blocks), Some(2));

    assert_ne!(first_blocks, second_blocks);
    assert_eq!(output.stats.precomputed_blocks, 0);
}

#[test]
fn test_cached_blocks_reach_late_observers() {
    let mut engine = serial_engine();
    let mut repo = AvatarRepository::new(16);
    let subject = repo.insert(coord(3200, 3200)).unwrap();
    repo.get_mut(subject).unwrap().info.set_move_speed(2);
    repo.get_mut(subject).unwrap().info.say("only once");
    engine.run_tick(&mut repo);

    let late = repo.insert(coord(3201, 3200)).unwrap();
    engine.register(9, late, Box::new(NopStreamCipher));
    let output = engine.run_tick(&mut repo);

    let packet = decode(&engine, output.packet(9).unwrap());
    assert_eq!(
        packet.info_for(subject),
        Some(&[InfoBlock::MoveSpeed(2)][..])
    );
}

#[test]
fn test_retain_release_settles_every_tick() {
    let mut engine = InfoSyncEngine::new(&config(562, Execution::Pool)).unwrap();
    let mut repo = AvatarRepository::new(64);
    for i in 0..40u16 {
        let index = repo.insert(coord(3200 + i % 8, 3200 + i / 8)).unwrap();
        engine.register(index as u64, index, Box::new(NopStreamCipher));
    }

    for tick in 0..20u16 {
        let indices: Vec<u16> = repo.iter().map(|avatar| avatar.index()).collect();
        for index in indices {
            let avatar = repo.get_mut(index).unwrap();
            if (index + tick) % 3 == 0 {
                avatar.info.say(format!("tick {tick}"));
            }
            if (index + tick) % 5 == 0 {
                avatar.info.set_sequence(808 + tick, 0);
            }
            if (index + tick) % 7 == 0 {
                avatar.info.add_hit(HitMark {
                    kind: 1,
                    self_kind: 2,
                    source: Some((index + 1) % 40),
                    damage: tick,
                    delay: 0,
                });
            }
            let dx = if tick % 2 == 0 { 1 } else { -1 };
            let next = avatar.coord().translate(dx, 0, 0).unwrap();
            avatar.set_coord(next);
        }

        let output = engine.run_tick(&mut repo);
        assert!(output.is_complete(), "tick {tick}");
        assert_eq!(output.packets.len(), 40);
        assert_eq!(output.stats.leaked_readers, 0);
        assert_eq!(engine.pool().outstanding(), 0);
        assert_eq!(engine.pool().acquired_total(), engine.pool().returned_total());
    }
}

#[test]
fn test_panicking_observer_is_isolated() {
    for execution in [Execution::Serial, Execution::Pool] {
        let mut engine = InfoSyncEngine::new(&config(578, execution)).unwrap();
        let mut repo = AvatarRepository::new(16);
        let a = repo.insert(coord(3200, 3200)).unwrap();
        let b = repo.insert(coord(3201, 3200)).unwrap();
        let c = repo.insert(coord(3202, 3200)).unwrap();
        engine.register(1, a, Box::new(NopStreamCipher));
        engine.register(2, b, Box::new(ExplodingCipher));
        engine.register(3, c, Box::new(NopStreamCipher));
        repo.get_mut(a).unwrap().info.say("hi");

        let output = engine.run_tick(&mut repo);

        assert_eq!(output.packets.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        let failure = output.failure.clone().unwrap();
        assert_eq!(
            failure.failures,
            vec![ObserverFailure {
                connection: 2,
                error: SyncError::Panicked("cipher exploded".to_string()),
            }]
        );

        // Survivors advanced, the failed observer did not
        assert_eq!(engine.observer(1).unwrap().high_resolution().count(), 3);
        assert_eq!(engine.observer(2).unwrap().high_resolution().count(), 0);
        assert_eq!(output.stats.leaked_readers, 0);
        assert_eq!(engine.pool().outstanding(), 0);
    }
}

#[test]
fn test_pool_exhaustion_fails_readers_of_missing_buffer() {
    let config = SyncConfig {
        pool_buffers: 1,
        ..config(530, Execution::Serial)
    };
    let mut engine = InfoSyncEngine::new(&config).unwrap();
    let mut repo = AvatarRepository::new(16);
    let me = repo.insert(coord(3200, 3200)).unwrap();
    let first = repo.insert(coord(3201, 3200)).unwrap();
    let second = repo.insert(coord(3202, 3200)).unwrap();
    engine.register(1, me, Box::new(NopStreamCipher));
    engine.run_tick(&mut repo);

    repo.get_mut(first).unwrap().info.say("one");
    repo.get_mut(second).unwrap().info.say("two");
    let output = engine.run_tick(&mut repo);

    assert!(output.packets.is_empty());
    assert_eq!(output.stats.precomputed_blocks, 1);
    assert_eq!(output.stats.precompute_failures, 1);
    assert_eq!(
        output.failure.unwrap().failures,
        vec![ObserverFailure {
            connection: 1,
            error: SyncError::BufferUnavailable {
                avatar: second,
                kind: "say",
                cause: BufferError::PoolExhausted { capacity: 1 },
            },
        }]
    );
    assert_eq!(output.stats.leaked_readers, 0);
    assert_eq!(engine.pool().outstanding(), 0);

    // The failed tick was not committed, so the next one still sees both as retained
    let output = engine.run_tick(&mut repo);
    assert!(output.is_complete());
}

#[test]
fn test_isaac_obfuscated_opcode() {
    let mut engine = serial_engine();
    let mut repo = AvatarRepository::new(4);
    let me = repo.insert(coord(3200, 3200)).unwrap();
    let seed = [17, 1021, 4099, 65537];
    engine.register(1, me, IsaacProvider.provide(&seed));

    let mut client = Isaac::new(&seed.map(|word| word + 50));
    for _ in 0..3 {
        let output = engine.run_tick(&mut repo);
        let (opcode, _) = split_frame(output.packet(1).unwrap(), &mut client).unwrap();
        assert_eq!(opcode, Revision::R530.info_opcode());
    }
}
