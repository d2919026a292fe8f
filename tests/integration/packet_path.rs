//! Packet-path matching mixed with control-plane mutations.

use std::sync::Arc;
use std::thread;

use portset_rs::{
    AddExt, BitmapPortSet, CounterMatch, CounterOp, Counters, CreateOptions, Direction,
    MatchOptions, PacketAction, PacketPorts, SetConfig,
};

#[test]
fn concurrent_packet_hits_and_control_plane_churn() {
    let set = Arc::new(
        BitmapPortSet::create(SetConfig::new(1000, 1999, None, true), CreateOptions::default())
            .unwrap(),
    );
    set.add(1500, &AddExt::default(), false).unwrap();

    let hitters: Vec<_> = (0..4)
        .map(|_| {
            let set = Arc::clone(&set);
            thread::spawn(move || {
                let pkt = PacketPorts {
                    src: 40_000,
                    dst: 1500,
                    len: 64,
                };
                let opts = MatchOptions {
                    direction: Direction::Dst,
                    ..MatchOptions::default()
                };
                for _ in 0..2_500 {
                    assert!(set.match_packet(&pkt, &opts).unwrap());
                }
            })
        })
        .collect();

    // Churn on unrelated ports must not disturb the counted entry.
    for round in 0..200u16 {
        let port = 1000 + (round % 400);
        set.add(port, &AddExt::default(), true).unwrap();
        set.del(port).unwrap();
    }
    for h in hitters {
        h.join().unwrap();
    }

    let entry = set.list().into_iter().find(|e| e.port == 1500).unwrap();
    assert_eq!(
        entry.counters,
        Some(Counters {
            packets: 10_000,
            bytes: 640_000
        })
    );
}

#[test]
fn add_on_match_then_counter_threshold() {
    let set = BitmapPortSet::create(SetConfig::new(1, 1024, Some(300), true), CreateOptions::default())
        .unwrap();
    let pkt = PacketPorts {
        src: 443,
        dst: 50_000,
        len: 1_000,
    };

    let learn = MatchOptions {
        action: PacketAction::Add,
        exist: true,
        ..MatchOptions::default()
    };
    assert!(set.match_packet(&pkt, &learn).unwrap());

    let heavy = MatchOptions {
        bytes: Some(CounterMatch {
            op: CounterOp::Gt,
            value: 2_500,
        }),
        ..MatchOptions::default()
    };
    // The learning packet itself is the first counted hit.
    assert!(!set.match_packet(&pkt, &heavy).unwrap()); // 2000
    assert!(set.match_packet(&pkt, &heavy).unwrap()); // 3000
}
