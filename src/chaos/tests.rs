//! Randomized fault runs.
//!
//! Every run is seeded, so a failing seed replays exactly.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::CommConfig;
use crate::membership::ProcessId;
use crate::transport::ChaosConfig;

use super::{Checker, Cluster};

const PERIOD: Duration = Duration::from_millis(100);
const TIMEOUT: Duration = Duration::from_millis(300);
const SIZE: usize = 5;
const MAX_CRASHES: usize = 2;

fn run_with_crashes(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut cluster = Cluster::new(SIZE, CommConfig::with_heartbeat(PERIOD, TIMEOUT)).unwrap();
    cluster.start();
    let mut crashes = 0;

    for step in 0..80 {
        let live = cluster.live_ids();
        match rng.gen_range(0..10) {
            0..=5 => {
                let at = live[rng.gen_range(0..live.len())];
                let batch = rng.gen_range(1..=3);
                let messages = (0..batch).map(|k| format!("s{}-{}-{}", seed, step, k).into_bytes()).collect();
                cluster.submit(at, messages);
            }
            6 | 7 => {
                cluster.settle();
            }
            8 => cluster.advance(PERIOD),
            _ => {
                if crashes < MAX_CRASHES {
                    let victim = live[rng.gen_range(0..live.len())];
                    cluster.crash(victim);
                    crashes += 1;
                    // Let the survivors notice before more traffic arrives.
                    cluster.advance(PERIOD);
                }
            }
        }
    }
    cluster.run_for(TIMEOUT * 2);

    let live = cluster.live_ids();
    let leader = cluster.leader_of(live[0]);
    let epoch = cluster.epoch_of(live[0]);
    assert_eq!(leader, live.last().copied(), "seed {}", seed);
    for &id in &live {
        assert_eq!(cluster.leader_of(id), leader, "seed {}", seed);
        assert_eq!(cluster.epoch_of(id), epoch, "seed {}", seed);
        assert_eq!(cluster.deliveries(id), cluster.deliveries(live[0]), "seed {}", seed);
    }

    let result = Checker::verify(&cluster.history());
    assert!(result.passed, "seed {}: {:?}", seed, result.violations);
    assert_eq!(result.stats.holes, 0, "seed {}", seed);

    // The group still orders new messages.
    let before = cluster.deliveries(live[0]).len();
    let submitter: ProcessId = live[rng.gen_range(0..live.len())];
    cluster.submit(submitter, vec![b"final".to_vec()]);
    cluster.settle();
    for &id in &live {
        let deliveries = cluster.deliveries(id);
        assert_eq!(deliveries.len(), before + 1, "seed {}", seed);
        assert_eq!(deliveries[before].1, b"final".to_vec(), "seed {}", seed);
    }
}

#[test]
fn test_random_crashes_preserve_total_order() {
    for seed in 0..25 {
        run_with_crashes(seed);
    }
}

#[test]
fn test_message_loss_never_breaks_agreement() {
    // Timeout far above the period so loss alone never fails a member.
    let config = CommConfig::with_heartbeat(PERIOD, PERIOD * 50);
    for seed in 0..10 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cluster = Cluster::with_chaos(SIZE, config.clone(), ChaosConfig { drop_rate: 0.05, seed }).unwrap();
        cluster.start();
        cluster.run_for(PERIOD * 3);

        for step in 0..50 {
            let at = rng.gen_range(0..SIZE as ProcessId);
            cluster.submit(at, vec![format!("m{}-{}", seed, step).into_bytes()]);
            if rng.gen_bool(0.5) {
                cluster.advance(PERIOD);
            }
        }
        cluster.run_for(PERIOD * 5);

        let result = Checker::verify(&cluster.history());
        assert!(result.passed, "seed {}: {:?}", seed, result.violations);
        assert!(cluster.network().messages_dropped() > 0, "seed {}", seed);
    }
}
