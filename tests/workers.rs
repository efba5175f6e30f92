use evq::{Event, EventFlags, EventId, EventQueue, QueueBuilder, Signal, Stats, Wait};
use std::collections::HashSet;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

const MAX_WAIT_OBJECTS: usize = 4;
const CAPACITY: usize = MAX_WAIT_OBJECTS - 1;

fn queue() -> EventQueue {
    QueueBuilder::new()
        .max_wait_objects(MAX_WAIT_OBJECTS)
        .completion_port(false)
        .thread_name("evq-test")
        .build()
        .expect("Failed to build queue")
}

fn pairs(n: usize) -> Vec<(UnixStream, UnixStream)> {
    (0..n)
        .map(|_| UnixStream::pair().expect("Failed to create socket pair"))
        .collect()
}

fn assert_balanced(stats: Stats) {
    assert_eq!(
        stats.events,
        stats.slots + stats.completion_port + stats.timers + stats.signals + stats.messages,
        "{stats:?}"
    );
}

#[test_log::test]
fn test_overflow_spreads_over_workers() {
    let mut queue = queue();
    let mut sockets = pairs(CAPACITY + 10);

    let ids: Vec<EventId> = sockets
        .iter()
        .map(|(a, _)| {
            queue
                .add(Event::socket(
                    a.as_raw_fd(),
                    EventFlags::READ | EventFlags::ONESHOT,
                ))
                .expect("Failed to add socket")
        })
        .collect();

    let stats = queue.stats();
    assert_eq!(stats.slots, CAPACITY + 10);
    assert!(stats.workers >= 1 + 10 / CAPACITY, "{stats:?}");
    assert_balanced(stats);

    for (_, b) in &mut sockets {
        b.write_all(b"x").expect("Failed to write");
    }

    let start = Instant::now();
    let mut seen = HashSet::new();
    while seen.len() < ids.len() && start.elapsed() < Duration::from_secs(5) {
        if let Wait::Ready(ready) = queue.wait(Some(Duration::from_secs(1))).expect("wait failed") {
            for event in ready {
                assert!(event.readiness().is_readable());
                assert!(event.is_released());
                assert!(seen.insert(event.id()), "delivered twice");
            }
        }
        assert_balanced(queue.stats());
    }

    assert_eq!(seen, ids.iter().copied().collect());
    assert!(queue.is_empty());

    // Emptied workers are torn down by the deliveries that emptied them.
    assert_eq!(queue.stats().workers, 1);
}

#[test_log::test]
fn test_adjacent_oneshots_ready_together() {
    let mut queue = queue();
    let mut sockets = pairs(CAPACITY);

    let ids: Vec<EventId> = sockets
        .iter()
        .map(|(a, _)| {
            queue
                .add(Event::socket(
                    a.as_raw_fd(),
                    EventFlags::READ | EventFlags::ONESHOT,
                ))
                .expect("Failed to add socket")
        })
        .collect();
    assert_eq!(queue.stats().workers, 1);

    for (_, b) in &mut sockets {
        b.write_all(b"x").expect("Failed to write");
    }

    let Wait::Ready(ready) = queue.wait(Some(Duration::from_secs(1))).expect("wait failed") else {
        panic!("every socket should be readable");
    };
    let fired: Vec<EventId> = ready.iter().map(|event| event.id()).collect();

    assert_eq!(fired, ids);
    assert!(queue.is_empty());
    assert!(matches!(
        queue.wait(Some(Duration::ZERO)).expect("wait failed"),
        Wait::NoEvents
    ));
}

#[test_log::test]
fn test_deleting_last_event_tears_worker_down() {
    let mut queue = queue();
    let sockets = pairs(CAPACITY + 1);

    let ids: Vec<EventId> = sockets
        .iter()
        .map(|(a, _)| {
            queue
                .add(Event::socket(a.as_raw_fd(), EventFlags::READ))
                .expect("Failed to add socket")
        })
        .collect();
    assert_eq!(queue.stats().workers, 2);

    // Let the worker block before reconfiguring it.
    assert!(matches!(
        queue.wait(Some(Duration::from_millis(10))).expect("wait failed"),
        Wait::Timeout
    ));

    let last = ids.last().copied().expect("ids");
    queue.delete(last, false).expect("Failed to delete");
    assert_eq!(queue.stats().workers, 1);
    assert_eq!(queue.len(), CAPACITY);

    // The freed head slot is used before spawning again.
    queue.delete(ids[0], false).expect("Failed to delete");
    queue
        .add(Event::socket(sockets[0].0.as_raw_fd(), EventFlags::READ))
        .expect("Failed to add socket");
    assert_eq!(queue.stats().workers, 1);
}

#[test_log::test]
fn test_worker_deadline_wakes_poller() {
    let mut queue = queue();
    let sockets = pairs(CAPACITY + 1);

    let ids: Vec<EventId> = sockets
        .iter()
        .map(|(a, _)| {
            queue
                .add(Event::socket(a.as_raw_fd(), EventFlags::READ))
                .expect("Failed to add socket")
        })
        .collect();

    let last = ids.last().copied().expect("ids");
    queue
        .set_timeout(last, Some(Duration::from_millis(30)))
        .expect("Failed to set timeout");

    let start = Instant::now();
    let mut fired = None;
    while fired.is_none() && start.elapsed() < Duration::from_secs(2) {
        if let Wait::Ready(ready) = queue.wait(Some(Duration::from_secs(2))).expect("wait failed") {
            fired = ready.into_iter().next();
        }
    }

    let fired = fired.expect("worker deadline should fire");
    assert_eq!(fired.id(), last);
    assert!(fired.readiness().is_timeout());
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test_log::test]
fn test_event_count_matches_subsystems() {
    let mut queue = queue();
    let sockets = pairs(CAPACITY * 2);
    let mut ids = Vec::new();

    for (a, _) in &sockets {
        ids.push(
            queue
                .add(Event::socket(a.as_raw_fd(), EventFlags::READ))
                .expect("Failed to add socket"),
        );
        assert_balanced(queue.stats());
    }
    ids.push(
        queue
            .add_timer(Event::timer(EventFlags::empty()), Duration::from_secs(60))
            .expect("Failed to add timer"),
    );
    ids.push(
        queue
            .add(Event::signal(Signal::INTERRUPT, EventFlags::empty()))
            .expect("Failed to add signal"),
    );
    assert_balanced(queue.stats());
    assert_eq!(queue.len(), CAPACITY * 2 + 2);

    for id in ids.iter().rev().step_by(2) {
        queue.delete(*id, false).expect("Failed to delete");
        assert_balanced(queue.stats());
    }
    for id in ids.iter().rev().skip(1).step_by(2) {
        queue.delete(*id, false).expect("Failed to delete");
        assert_balanced(queue.stats());
    }

    assert_eq!(queue.stats(), Stats {
        workers: 1,
        ..Stats::default()
    });
}
