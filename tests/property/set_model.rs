//! Model-based checks of `BitmapPortSet`.
//!
//! A `BTreeMap<port, (deadline, packets)>` tracks what the set should
//! report. Every operation's result and every List snapshot is compared
//! with the model while a manual clock moves time forward in steps that
//! cross entry deadlines.

use std::collections::BTreeMap;
use std::time::Duration;

use proptest::prelude::*;

use portset_rs::{AddExt, BitmapPortSet, CreateOptions, ManualClock, SetConfig, SetError};

const FIRST: u16 = 100;
const LAST: u16 = 163;
const DEFAULT_TIMEOUT: u32 = 5;
const PERMANENT: u64 = u64::MAX;

#[derive(Clone, Debug)]
enum Op {
    Add {
        port: u16,
        port_to: Option<u16>,
        timeout: Option<u32>,
        packets: Option<u64>,
        exists_ok: bool,
    },
    Del {
        port: u16,
        port_to: Option<u16>,
        exists_ok: bool,
    },
    Test(u16),
    Advance(u64),
    Gc,
    Flush,
}

fn port_strategy() -> impl Strategy<Value = u16> {
    // Mostly in-domain, with a margin on both sides for Range errors.
    prop_oneof![
        9 => FIRST..=LAST,
        1 => (FIRST - 4)..=(LAST + 4),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (
            port_strategy(),
            prop::option::weighted(0.2, port_strategy()),
            prop::option::of(prop_oneof![Just(0u32), Just(1), Just(3)]),
            prop::option::of(0u64..100),
            any::<bool>(),
        )
            .prop_map(|(port, port_to, timeout, packets, exists_ok)| Op::Add {
                port,
                port_to,
                timeout,
                packets,
                exists_ok,
            }),
        3 => (
            port_strategy(),
            prop::option::weighted(0.2, port_strategy()),
            any::<bool>(),
        )
            .prop_map(|(port, port_to, exists_ok)| Op::Del {
                port,
                port_to,
                exists_ok,
            }),
        3 => port_strategy().prop_map(Op::Test),
        2 => (0u64..2_500).prop_map(Op::Advance),
        1 => Just(Op::Gc),
        1 => Just(Op::Flush),
    ]
}

#[derive(Default)]
struct Model {
    entries: BTreeMap<u16, (u64, u64)>,
}

impl Model {
    fn active(&self, port: u16, now: u64) -> bool {
        self.entries
            .get(&port)
            .is_some_and(|&(deadline, _)| deadline > now)
    }

    fn span(port: u16, port_to: Option<u16>) -> Option<std::ops::RangeInclusive<u16>> {
        let hi_in = port_to.unwrap_or(port);
        let (lo, hi) = if port > hi_in { (hi_in, port) } else { (port, hi_in) };
        (lo >= FIRST && hi <= LAST).then_some(lo..=hi)
    }

    fn add(
        &mut self,
        span: std::ops::RangeInclusive<u16>,
        timeout: Option<u32>,
        packets: Option<u64>,
        exists_ok: bool,
        now: u64,
    ) -> Result<(), ()> {
        let secs = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let deadline = if secs == 0 {
            PERMANENT
        } else {
            now + u64::from(secs) * 1_000
        };
        for port in span {
            let live = self.active(port, now);
            if live && !exists_ok {
                return Err(());
            }
            let count = match (live, packets) {
                (true, Some(p)) => p,
                (true, None) => self.entries[&port].1,
                (false, p) => p.unwrap_or(0),
            };
            self.entries.insert(port, (deadline, count));
        }
        Ok(())
    }

    fn del(&mut self, span: std::ops::RangeInclusive<u16>, exists_ok: bool, now: u64) -> Result<(), ()> {
        for port in span {
            let live = self.active(port, now);
            self.entries.remove(&port);
            if !live && !exists_ok {
                return Err(());
            }
        }
        Ok(())
    }

    fn listing(&self, now: u64) -> Vec<(u16, u32, u64)> {
        self.entries
            .iter()
            .filter(|&(_, &(deadline, _))| deadline > now)
            .map(|(&port, &(deadline, packets))| {
                let secs = if deadline == PERMANENT {
                    0
                } else {
                    (deadline - now).div_ceil(1_000) as u32
                };
                (port, secs, packets)
            })
            .collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn set_matches_model(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let clock = ManualClock::new(1_000);
        let opts = CreateOptions::default()
            .with_clock(clock.clone())
            .with_reaper_interval(Duration::from_secs(3_600));
        let set = BitmapPortSet::create(
            SetConfig::new(LAST, FIRST, Some(DEFAULT_TIMEOUT), true),
            opts,
        )
        .unwrap();
        let mut model = Model::default();
        let mut now = 1_000u64;

        for op in ops {
            match op {
                Op::Add { port, port_to, timeout, packets, exists_ok } => {
                    let ext = AddExt { timeout, packets, bytes: None };
                    let got = match port_to {
                        Some(to) => set.add_range(port, to, &ext, exists_ok),
                        None => set.add(port, &ext, exists_ok),
                    };
                    match Model::span(port, port_to) {
                        None => prop_assert!(matches!(got, Err(SetError::Range { .. })), "unexpected variant"),
                        Some(span) => {
                            let want = model.add(span, timeout, packets, exists_ok, now);
                            prop_assert_eq!(got.is_ok(), want.is_ok(), "add {:?}", got);
                            if want.is_err() {
                                prop_assert!(matches!(got, Err(SetError::AlreadyExists { .. })), "unexpected variant");
                            }
                        }
                    }
                }
                Op::Del { port, port_to, exists_ok } => {
                    let got = match port_to {
                        Some(to) => set.del_range(port, to, exists_ok),
                        None if exists_ok => set.del_range(port, port, true),
                        None => set.del(port),
                    };
                    match Model::span(port, port_to) {
                        None => prop_assert!(matches!(got, Err(SetError::Range { .. })), "unexpected variant"),
                        Some(span) => {
                            let want = model.del(span, exists_ok, now);
                            prop_assert_eq!(got.is_ok(), want.is_ok(), "del {:?}", got);
                            if want.is_err() {
                                prop_assert!(matches!(got, Err(SetError::NotFound { .. })), "unexpected variant");
                            }
                        }
                    }
                }
                Op::Test(port) => match set.test(port) {
                    Ok(present) => prop_assert_eq!(present, model.active(port, now)),
                    Err(err) => {
                        prop_assert!(Model::span(port, None).is_none());
                        prop_assert!(matches!(err, SetError::Range { .. }), "unexpected variant");
                    }
                },
                Op::Advance(ms) => {
                    clock.advance(Duration::from_millis(ms));
                    now += ms;
                }
                Op::Gc => {
                    let lapsed = model.entries.values().filter(|&&(d, _)| d <= now).count();
                    prop_assert_eq!(set.gc(), lapsed);
                    model.entries.retain(|_, &mut (d, _)| d > now);
                }
                Op::Flush => {
                    set.flush();
                    model.entries.clear();
                }
            }

            let listed: Vec<(u16, u32, u64)> = set
                .list()
                .into_iter()
                .map(|e| (e.port, e.timeout.unwrap(), e.counters.unwrap().packets))
                .collect();
            prop_assert_eq!(listed, model.listing(now));
        }
    }
}
