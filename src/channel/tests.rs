//! End-to-end scenarios for a group running over the mock network.

use std::thread;
use std::time::Duration;

use crate::chaos::{Checker, Cluster, RecordingListener};
use crate::config::CommConfig;
use crate::error::CommError;
use crate::membership::{MembershipView, ProcessState};
use crate::protocol::{Payload, ProposalId};
use crate::transport::MockNetwork;

use super::{ChannelHandle, GroupChannel};

const PERIOD: Duration = Duration::from_millis(100);
const TIMEOUT: Duration = Duration::from_millis(300);

fn config() -> CommConfig {
    CommConfig::with_heartbeat(PERIOD, TIMEOUT)
}

fn started(size: usize) -> Cluster {
    let mut cluster = Cluster::new(size, config()).unwrap();
    cluster.start();
    cluster
}

fn msg(text: &str) -> Payload {
    text.as_bytes().to_vec()
}

fn delivered(text: &[(u64, &str)]) -> Vec<(u64, Payload)> {
    text.iter().map(|(serial, m)| (*serial, msg(m))).collect()
}

#[test]
fn test_group_forms_and_highest_id_leads() {
    let cluster = started(3);
    for id in 0..3 {
        let replica = cluster.replica(id);
        assert!(replica.listener().ready);
        assert!(replica.view().all_correct());
        assert_eq!(replica.leader(), Some(2));
        assert_eq!(replica.epoch(), 0);
    }
    assert!(cluster.replica(2).is_leader());
}

#[test]
fn test_batch_delivered_everywhere_in_order() {
    let mut cluster = started(3);
    cluster.submit(2, vec![msg("A"), msg("B")]);
    cluster.settle();

    for id in 0..3 {
        assert_eq!(cluster.deliveries(id), delivered(&[(1, "A"), (2, "B")]).as_slice());
        // Everyone accepted exactly the first proposal of epoch 0.
        let acceptor = cluster.replica(id).pipeline().acceptor();
        assert_eq!(acceptor.epoch(), 0);
        assert_eq!(acceptor.last_accepted_serial(), 1);
    }
    assert_eq!(cluster.replica(2).pipeline().proposer().next_message_start(), 3);
    assert_eq!(cluster.replica(2).pipeline().proposer().in_flight(), None);
}

#[test]
fn test_follower_submission_is_redirected() {
    let mut cluster = started(3);
    cluster.submit(0, vec![msg("from-0")]);
    cluster.submit(1, vec![msg("from-1")]);
    cluster.settle();

    let expected = cluster.deliveries(2).to_vec();
    assert_eq!(expected.len(), 2);
    assert_eq!(expected.iter().map(|(s, _)| *s).collect::<Vec<_>>(), vec![1, 2]);
    for id in 0..3 {
        assert_eq!(cluster.deliveries(id), expected.as_slice());
    }
}

#[test]
fn test_many_submissions_gap_free_and_valid() {
    let mut cluster = started(5);
    let mut submitted = Vec::new();
    for i in 0..40u32 {
        let payload = msg(&format!("m{}", i));
        submitted.push(payload.clone());
        cluster.submit(i % 5, vec![payload]);
        if i % 7 == 0 {
            cluster.settle();
        }
    }
    cluster.settle();

    let reference = cluster.deliveries(0).to_vec();
    assert_eq!(reference.len(), submitted.len());
    for (k, (serial, _)) in reference.iter().enumerate() {
        assert_eq!(*serial, k as u64 + 1);
    }
    let mut got: Vec<Payload> = reference.iter().map(|(_, p)| p.clone()).collect();
    got.sort();
    submitted.sort();
    assert_eq!(got, submitted);

    for id in 1..5 {
        assert_eq!(cluster.deliveries(id), reference.as_slice());
    }
    assert!(Checker::verify(&cluster.history()).passed);
}

#[test]
fn test_submission_before_group_forms_is_held() {
    let mut cluster = Cluster::new(2, config()).unwrap();
    cluster.submit(0, vec![msg("early")]);
    assert!(cluster.deliveries(0).is_empty());

    cluster.start();
    for id in 0..2 {
        assert_eq!(cluster.deliveries(id), delivered(&[(1, "early")]).as_slice());
    }
}

#[test]
fn test_crash_during_proposal() {
    let mut cluster = started(3);
    cluster.submit(2, vec![msg("A"), msg("B")]);
    // Replicas have the proposal queued; the leader dies before any accept
    // reaches it.
    cluster.crash(2);
    cluster.settle();

    for id in 0..2 {
        assert_eq!(cluster.leader_of(id), Some(1));
        assert_eq!(cluster.epoch_of(id), 1);
        assert_eq!(cluster.replica(id).view().state(2), Some(ProcessState::Failed));
        assert_eq!(cluster.replica(id).listener().failed, vec![2]);
    }

    cluster.submit(0, vec![msg("C")]);
    cluster.settle();

    for id in 0..2 {
        assert_eq!(cluster.deliveries(id), delivered(&[(1, "C")]).as_slice());
        assert_eq!(
            cluster.replica(id).pipeline().acceptor().last_accepted_serial(),
            ProposalId::new(1, 1).serial
        );
    }
    assert!(cluster.deliveries(2).is_empty());
}

#[test]
fn test_leader_failover_chain() {
    let mut cluster = started(5);
    assert_eq!(cluster.leader_of(0), Some(4));

    cluster.crash(4);
    cluster.advance(PERIOD);
    for id in cluster.live_ids() {
        assert_eq!(cluster.leader_of(id), Some(3));
        assert_eq!(cluster.epoch_of(id), 1);
    }

    cluster.crash(3);
    cluster.advance(PERIOD);
    for id in cluster.live_ids() {
        assert_eq!(cluster.leader_of(id), Some(2));
        assert_eq!(cluster.epoch_of(id), 2);
    }

    // The new leader orders messages.
    cluster.submit(0, vec![msg("after")]);
    cluster.settle();
    for id in cluster.live_ids() {
        assert_eq!(cluster.deliveries(id), delivered(&[(1, "after")]).as_slice());
    }
}

#[test]
fn test_numbering_continues_after_failover() {
    let mut cluster = started(3);
    cluster.submit(0, vec![msg("A"), msg("B"), msg("C")]);
    cluster.settle();

    cluster.crash(2);
    cluster.advance(PERIOD);
    cluster.submit(1, vec![msg("D")]);
    cluster.settle();

    for id in 0..2 {
        assert_eq!(
            cluster.deliveries(id),
            delivered(&[(1, "A"), (2, "B"), (3, "C"), (4, "D")]).as_slice()
        );
    }
}

#[test]
fn test_silent_member_times_out_after_t() {
    let mut cluster = started(3);
    cluster.isolate(1);

    // Exactly T of silence.
    cluster.advance(TIMEOUT);
    assert_eq!(cluster.replica(0).view().state(1), Some(ProcessState::Correct));

    cluster.advance(PERIOD);
    assert_eq!(cluster.replica(0).view().state(1), Some(ProcessState::Failed));
    assert_eq!(cluster.replica(0).listener().failed, vec![1]);
    // A follower failure does not change the leader.
    assert_eq!(cluster.leader_of(0), Some(2));
    assert_eq!(cluster.epoch_of(0), 0);
}

#[test]
fn test_unreachable_signal_fails_member_at_once() {
    let mut cluster = started(3);
    cluster.network().inject_undeliverable(0, 1);
    cluster.settle();
    assert_eq!(cluster.replica(0).view().state(1), Some(ProcessState::Failed));
    // Other replicas are unaffected.
    assert_eq!(cluster.replica(2).view().state(1), Some(ProcessState::Correct));
}

#[test]
fn test_p2p_passthrough() {
    let mut cluster = started(3);
    cluster.send_p2p(0, 2, msg("hi"));
    cluster.send_p2p(1, 1, msg("self"));
    cluster.settle();

    assert_eq!(cluster.replica(2).listener().p2p, vec![(0, msg("hi"))]);
    assert_eq!(cluster.replica(1).listener().p2p, vec![(1, msg("self"))]);
    // Not part of the total order.
    assert!(cluster.deliveries(2).is_empty());
}

#[test]
fn test_single_member_group() {
    let mut cluster = started(1);
    assert_eq!(cluster.leader_of(0), Some(0));
    cluster.submit(0, vec![msg("solo")]);
    assert_eq!(cluster.deliveries(0), delivered(&[(1, "solo")]).as_slice());
}

#[test]
fn test_transport_must_match_view() {
    let mut network = MockNetwork::new(2);
    let endpoint = network.endpoint(1).unwrap();
    let view = MembershipView::loopback(2, 0, 9000).unwrap();
    let result = GroupChannel::new(view, &config(), endpoint, RecordingListener::default());
    assert!(matches!(result, Err(CommError::Membership { .. })));
}

#[test]
fn test_run_loop_serves_handle() {
    let mut network = MockNetwork::new(1);
    let endpoint = network.endpoint(0).unwrap();
    let view = MembershipView::loopback(1, 0, 9000).unwrap();
    let config = CommConfig::with_heartbeat(Duration::from_millis(20), Duration::from_millis(60));
    let mut channel = GroupChannel::new(view, &config, endpoint, RecordingListener::default()).unwrap();

    let (handle, commands) = ChannelHandle::new();
    let worker = thread::spawn(move || {
        channel.run(commands).unwrap();
        channel
    });

    handle.submit(msg("one")).unwrap();
    handle.submit_batch(vec![msg("two"), msg("three")]).unwrap();
    handle.send_p2p(0, msg("note")).unwrap();
    handle.shutdown().unwrap();

    let channel = worker.join().unwrap();
    assert!(channel.listener().ready);
    assert_eq!(
        channel.listener().deliveries,
        delivered(&[(1, "one"), (2, "two"), (3, "three")])
    );
    assert_eq!(channel.listener().p2p, vec![(0, msg("note"))]);
    assert!(handle.submit(msg("late")).is_err());
}
