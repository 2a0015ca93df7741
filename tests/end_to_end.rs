//! End-to-end transfers between a sender and a receiver coordinator.
//!
//! Each test runs the two sides on separate threads, standing in for two
//! processes, over an in-process link or a Unix socket pair.

use parallax_bridge::channel::Channel;
use parallax_bridge::collection::{Column, PortableCollection, SoaLayout};
use parallax_bridge::communicator::PeerId;
use parallax_bridge::config::{CoordinatorConfig, CoordinatorKind};
use parallax_bridge::coordinator::{ProductDescription, ProductStore, Receiver, Scope, Sender, UnitContext};
use parallax_bridge::link::StreamLink;
use parallax_bridge::product::{ProductId, ProductType, RkyvStreamer, Streamer};
use parallax_bridge::provenance::{
    ExperimentType, ProcessHistoryId, RunProvenance, Timestamp, UnitProvenance, WindowProvenance,
};
use parallax_bridge::tag::Instance;
use parallax_bridge::token::Token;
use std::thread;
use tracing_subscriber::EnvFilter;

const UNITS: u64 = 3;

#[derive(Debug, Clone, PartialEq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
struct Cluster {
    seed: u32,
    energy: f32,
    hits: Vec<u32>,
}

struct Tracks;

impl SoaLayout for Tracks {
    const COLUMNS: &'static [Column] = &[Column::new("pt", 4), Column::new("charge", 1)];
}

fn hits_for(unit: u64) -> [u8; 64] {
    let mut hits = [0u8; 64];
    for (i, byte) in hits.iter_mut().enumerate() {
        *byte = (unit as u8).wrapping_mul(31).wrapping_add(i as u8);
    }
    hits
}

/// `unit + 1` clusters of `unit` hits each: between 10 and 200 bytes
/// serialized, growing with the unit.
fn clusters_for(unit: u64) -> Vec<Cluster> {
    let unit = unit as u32;
    (0..=unit)
        .map(|i| Cluster {
            seed: i,
            energy: i as f32 * 0.5,
            hits: (i..i + unit).collect(),
        })
        .collect()
}

fn tracks_for(unit: u64) -> PortableCollection<Tracks> {
    let len = unit as usize * 5 + 1;
    let mut tracks = PortableCollection::<Tracks>::new(len).unwrap();
    for i in 0..len {
        tracks.set(0, i, i as f32 + unit as f32).unwrap();
        tracks.set(1, i, if i % 2 == 0 { 1i8 } else { -1i8 }).unwrap();
    }
    tracks
}

fn provenance_for(unit: u64) -> UnitProvenance {
    UnitProvenance {
        run: 1,
        window: 2,
        unit,
        process_guid: (1..=16).collect(),
        time: Timestamp(1_700_000_000 + unit),
        real_data: true,
        experiment_type: ExperimentType::Physics,
        bunch_crossing: 42,
        orbit_number: 7,
        store_number: -1,
        process_history_id: ProcessHistoryId::new(b"0123456789abcdef".to_vec()),
    }
}

fn slots() -> Vec<ProductType> {
    vec![
        ProductType::trivial_copy::<[u8; 64]>(),
        ProductType::rkyv::<Vec<Cluster>>(),
        ProductType::trivial_copy::<PortableCollection<Tracks>>(),
    ]
}

fn sender() -> Sender {
    let (kind, config) = CoordinatorConfig::parse(
        r#"bridgesender name=send upstream=source: instance=7 products="hits:,clusters:*,tracks:""#,
    )
    .unwrap();
    assert_eq!(kind, CoordinatorKind::Sender);

    let mut sender = Sender::new(&config, slots()).unwrap();
    let registrations = [
        ProductDescription::of::<[u8; 64]>(ProductId::new("hits", ""), Scope::Unit),
        ProductDescription::of::<Vec<Cluster>>(ProductId::new("clusters", "barrel"), Scope::Unit),
        ProductDescription::of::<PortableCollection<Tracks>>(ProductId::new("tracks", ""), Scope::Unit),
        ProductDescription::of::<u32>(ProductId::new("clusters", "count"), Scope::Run),
    ];
    for description in &registrations {
        sender.on_product_registered(description).unwrap();
    }
    sender.verify_registrations().unwrap();
    sender
}

fn receiver() -> Receiver {
    let config = CoordinatorConfig::new("recv")
        .with_upstream(ProductId::new("source", ""))
        .with_instance(7)
        .with_product("hits", "")
        .with_product("clusters", "")
        .with_product("tracks", "");
    Receiver::new(&config, slots()).unwrap()
}

fn run_sender(channel: Channel) -> Token {
    let token = Token::new(channel);
    let sender = sender();

    token
        .channel()
        .send_run(
            Instance::BOOTSTRAP,
            &RunProvenance {
                run: 1,
                begin_time: Timestamp(10),
                end_time: Timestamp(0),
                process_history_id: ProcessHistoryId::new(b"history".to_vec()),
            },
        )
        .unwrap();
    token
        .channel()
        .send_window(
            Instance::BOOTSTRAP,
            &WindowProvenance {
                run: 1,
                window: 2,
                ..Default::default()
            },
        )
        .unwrap();

    for unit in 0..UNITS {
        token
            .channel()
            .send_unit(Instance::BOOTSTRAP, &provenance_for(unit))
            .unwrap();

        let mut store = ProductStore::new();
        store.insert_token(ProductId::new("source", ""), token.clone());
        store.insert(ProductId::new("hits", ""), hits_for(unit));
        store.insert(ProductId::new("clusters", "barrel"), clusters_for(unit));
        store.insert(ProductId::new("tracks", ""), tracks_for(unit));

        sender.produce(&mut store).unwrap();
        assert!(store.token(sender.token_id()).unwrap().ptr_eq(&token));
    }
    token
}

fn run_receiver(channel: Channel) {
    let token = Token::new(channel);
    let receiver = receiver();

    let run = token.channel().receive_run(Instance::BOOTSTRAP).unwrap();
    assert_eq!(run.run, 1);
    assert_eq!(run.begin_time, Timestamp(10));
    assert!(run
        .process_history_id
        .eq_ignoring_padding(&ProcessHistoryId::new(b"history".to_vec())));

    let window = token.channel().receive_window(Instance::BOOTSTRAP).unwrap();
    assert_eq!((window.run, window.window), (1, 2));

    for unit in 0..UNITS {
        let provenance = token.channel().receive_unit(Instance::BOOTSTRAP).unwrap();
        assert_eq!(provenance, provenance_for(unit));

        let mut store = ProductStore::new();
        store.insert_token(ProductId::new("source", ""), token.clone());
        receiver.produce(&mut store).unwrap();

        assert_eq!(store.take::<[u8; 64]>(&ProductId::new("recv", "hits")).unwrap(), hits_for(unit));
        assert_eq!(
            store.take::<Vec<Cluster>>(&ProductId::new("recv", "clusters")).unwrap(),
            clusters_for(unit)
        );
        assert_eq!(
            store
                .take::<PortableCollection<Tracks>>(&ProductId::new("recv", "tracks"))
                .unwrap(),
            tracks_for(unit)
        );
        assert!(store.token(receiver.token_id()).unwrap().ptr_eq(&token));
    }
}

/// Log output for failing runs, filtered by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn exchange(left: Channel, right: Channel) {
    init_tracing();
    let sender = thread::spawn(move || run_sender(left));
    let receiver = thread::spawn(move || run_receiver(right));
    // The sender's token stays alive until the receiver is done.
    receiver.join().unwrap();
    drop(sender.join().unwrap());
}

#[test]
fn test_serialized_sizes() {
    let mut previous = 0;
    for unit in 0..UNITS {
        let mut blob = Vec::new();
        RkyvStreamer.stream_out(&clusters_for(unit), &mut blob).unwrap();
        assert!((10..=200).contains(&blob.len()), "unit {unit}: {} bytes", blob.len());
        assert!(blob.len() > previous);
        previous = blob.len();
    }
}

#[test]
fn test_end_to_end_local() {
    let (left, right) = Channel::local_pair();
    exchange(left, right);
}

#[test]
fn test_end_to_end_unix_socket() {
    let (a, b) = StreamLink::unix_pair().unwrap();
    exchange(
        Channel::from_link(a, PeerId(1)),
        Channel::from_link(b, PeerId(0)),
    );
}

#[test]
fn test_coordinator_pairs_share_channel() {
    // Two pairs on instances 1 and 2 over one channel; the second pair's
    // traffic is sent first and must not be picked up by the first.
    let (left, right) = Channel::local_pair();
    let slot = || vec![ProductType::trivial_copy::<Vec<u8>>()];
    let config = |name: &str, instance: i64| {
        CoordinatorConfig::new(name)
            .with_upstream(ProductId::new("source", ""))
            .with_instance(instance)
            .with_product("payload", "")
    };

    let first = Sender::new(&config("send1", 1), slot()).unwrap();
    let second = Sender::new(&config("send2", 2), slot()).unwrap();
    let token = Token::new(left);

    let mut store = ProductStore::new();
    store.insert_token(ProductId::new("source", ""), token.clone());
    store.insert(ProductId::new("payload", ""), vec![2u8; 20]);
    second.produce(&mut store).unwrap();

    let mut store = ProductStore::new();
    store.insert_token(ProductId::new("source", ""), token);
    store.insert(ProductId::new("payload", ""), vec![1u8; 10]);
    first.produce(&mut store).unwrap();

    let right = Token::new(right);
    for (name, instance, expected) in [("recv1", 1, vec![1u8; 10]), ("recv2", 2, vec![2u8; 20])] {
        let receiver = Receiver::new(&config(name, instance), slot()).unwrap();
        let mut store = ProductStore::new();
        store.insert_token(ProductId::new("source", ""), right.clone());
        receiver.produce(&mut store).unwrap();
        assert_eq!(store.take::<Vec<u8>>(&ProductId::new(name, "payload")).unwrap(), expected);
    }
}

#[test]
fn test_duplicated_token_is_independent() {
    let (left, right) = Channel::local_pair();
    let (left, right) = (Token::new(left), Token::new(right));
    let (left_dup, right_dup) = (left.duplicate().unwrap(), right.duplicate().unwrap());
    let instance = Instance::new(3).unwrap();

    left_dup
        .channel()
        .send_trivial_copy_product(instance, &vec![5u8; 8])
        .unwrap();
    left.channel()
        .send_trivial_copy_product(instance, &vec![6u8; 4])
        .unwrap();

    assert_eq!(
        right.channel().receive_trivial_copy_product::<Vec<u8>>(instance).unwrap(),
        vec![6u8; 4]
    );
    assert_eq!(
        right_dup.channel().receive_trivial_copy_product::<Vec<u8>>(instance).unwrap(),
        vec![5u8; 8]
    );
}
