use std::collections::HashMap;
use std::time::{Duration, Instant};

use autosave_common::error::SaveFailure;
use autosave_common::types::{ChangeSignal, DocumentId, HostDocument, SignalSource};
use autosave_daemon::ledger::DebounceLedger;
use proptest::prelude::*;

fn doc(n: u8) -> HostDocument {
    HostDocument::new(format!("{n}"), format!("doc{n}.docx"))
        .with_path(format!("/docs/doc{n}.docx"))
}

fn at(base: Instant, millis: u64) -> Instant {
    base + Duration::from_millis(millis)
}

#[derive(Debug, Clone)]
enum Step {
    Signal { doc: u8, source: SignalSource },
    Tick { fail: bool },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u8..3, prop_oneof![Just(SignalSource::Push), Just(SignalSource::Poll)])
            .prop_map(|(doc, source)| Step::Signal { doc, source }),
        any::<bool>().prop_map(|fail| Step::Tick { fail }),
    ]
}

/// Drive the ledger the way a scheduler pass does: save every due entry.
fn run_schedule(steps: &[(u64, Step)], interval: Duration) -> HashMap<DocumentId, Vec<Instant>> {
    let base = Instant::now();
    let mut ledger = DebounceLedger::new();
    let mut saves: HashMap<DocumentId, Vec<Instant>> = HashMap::new();
    let mut clock = 0u64;

    for (advance, step) in steps {
        clock += advance;
        let now = at(base, clock);
        match step {
            Step::Signal { doc: n, source } => {
                ledger.record_signal(&ChangeSignal::new(doc(*n), now, *source));
            }
            Step::Tick { fail } => {
                for id in ledger.pending() {
                    if !ledger.is_due(&id, now, interval) {
                        continue;
                    }
                    if *fail {
                        ledger.record_save_result(&id, now, Err(SaveFailure::Timeout));
                        continue;
                    }
                    ledger.record_save_result(&id, now, Ok(()));
                    saves.entry(id).or_default().push(now);
                }
            }
        }
    }
    saves
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn successful_saves_are_at_least_one_interval_apart(
        steps in prop::collection::vec((0u64..4_000, step()), 1..80),
        interval_ms in 1u64..10_000,
    ) {
        let interval = Duration::from_millis(interval_ms);
        for times in run_schedule(&steps, interval).values() {
            for pair in times.windows(2) {
                prop_assert!(pair[1].duration_since(pair[0]) >= interval);
            }
        }
    }

    #[test]
    fn repeated_poll_signals_do_not_move_due_time(
        first_ms in 0u64..10_000,
        repeats in prop::collection::vec(0u64..20_000, 1..20),
    ) {
        let base = Instant::now();
        let interval = Duration::from_secs(10);
        let mut ledger = DebounceLedger::new();
        let id = doc(0).id();
        ledger.record_signal(&ChangeSignal::new(doc(0), at(base, first_ms), SignalSource::Push));
        let due = ledger.due_at(&id, interval);

        for offset in repeats {
            ledger.record_signal(&ChangeSignal::new(
                doc(0),
                at(base, first_ms + offset),
                SignalSource::Poll,
            ));
            prop_assert_eq!(ledger.due_at(&id, interval), due);
            prop_assert_eq!(ledger.len(), 1);
        }
    }

    #[test]
    fn due_exactly_once_until_consumed(
        signal_ms in 0u64..5_000,
        wait_ms in 0u64..30_000,
    ) {
        let base = Instant::now();
        let interval = Duration::from_secs(10);
        let mut ledger = DebounceLedger::new();
        let id = doc(1).id();

        ledger.record_signal(&ChangeSignal::new(doc(1), at(base, 0), SignalSource::Push));
        ledger.record_save_result(&id, at(base, 0), Ok(()));
        ledger.record_signal(&ChangeSignal::new(doc(1), at(base, signal_ms), SignalSource::Push));

        let now = at(base, 10_000 + wait_ms);
        prop_assert!(ledger.is_due(&id, now, interval));
        ledger.record_save_result(&id, now, Ok(()));
        prop_assert!(!ledger.is_due(&id, now, interval));
        prop_assert!(!ledger.is_due(&id, at(base, 100_000), interval));
    }
}
