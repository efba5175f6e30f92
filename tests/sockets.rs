use evq::{Event, EventFlags, EventQueue, QueueBuilder, Wait};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

fn queue() -> EventQueue {
    QueueBuilder::new()
        .completion_port(false)
        .build()
        .expect("Failed to build queue")
}

#[test_log::test]
fn test_socket_reports_readable() {
    let (a, mut b) = UnixStream::pair().expect("Failed to create socket pair");
    let mut queue = queue();

    let id = queue
        .add(Event::socket(a.as_raw_fd(), EventFlags::READ))
        .expect("Failed to add socket");

    assert!(matches!(
        queue.wait(Some(Duration::ZERO)).expect("wait failed"),
        Wait::Timeout
    ));

    b.write_all(b"hello").expect("Failed to write");

    let Wait::Ready(ready) = queue.wait(Some(Duration::from_secs(1))).expect("wait failed") else {
        panic!("socket should be readable");
    };
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id(), id);
    assert!(ready[0].readiness().is_readable());
    assert!(!ready[0].readiness().is_eof());
    assert!(!ready[0].is_released());

    let event = queue.event(id).expect("event should stay registered");
    assert!(event.readiness().is_readable());
}

#[test_log::test]
fn test_level_triggered_until_drained() {
    let (mut a, mut b) = UnixStream::pair().expect("Failed to create socket pair");
    let mut queue = queue();

    queue
        .add(Event::socket(a.as_raw_fd(), EventFlags::READ))
        .expect("Failed to add socket");
    b.write_all(b"ping").expect("Failed to write");

    for _ in 0..2 {
        assert!(matches!(
            queue.wait(Some(Duration::ZERO)).expect("wait failed"),
            Wait::Ready(_)
        ));
    }

    let mut buffer = [0; 4];
    a.read_exact(&mut buffer).expect("Failed to read");
    assert!(matches!(
        queue.wait(Some(Duration::ZERO)).expect("wait failed"),
        Wait::Timeout
    ));
}

#[test_log::test]
fn test_peer_close_reports_eof_on_both_directions() {
    let (a, b) = UnixStream::pair().expect("Failed to create socket pair");
    let mut queue = queue();

    queue
        .add(Event::socket(a.as_raw_fd(), EventFlags::READ))
        .expect("Failed to add socket");
    drop(b);

    let Wait::Ready(ready) = queue.wait(Some(Duration::from_secs(1))).expect("wait failed") else {
        panic!("closed socket should be ready");
    };
    assert!(ready[0].readiness().is_eof());
    assert!(ready[0].readiness().is_readable());
}

#[test_log::test]
fn test_listener_reports_pending_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local address");
    let mut queue = queue();

    let id = queue
        .add(Event::listener(listener.as_raw_fd(), EventFlags::empty()))
        .expect("Failed to add listener");

    let _client = TcpStream::connect(addr).expect("Failed to connect");

    let Wait::Ready(ready) = queue.wait(Some(Duration::from_secs(1))).expect("wait failed") else {
        panic!("listener should be readable");
    };
    assert_eq!(ready[0].id(), id);
    assert!(ready[0].readiness().is_readable());
}

#[test_log::test]
fn test_delete_hands_event_back() {
    let (a, _b) = UnixStream::pair().expect("Failed to create socket pair");
    let mut queue = queue();

    let id = queue
        .add(Event::socket(a.as_raw_fd(), EventFlags::READ | EventFlags::WRITE))
        .expect("Failed to add socket");
    assert_eq!(queue.len(), 1);

    let event = queue.delete(id, false).expect("Failed to delete");
    assert_eq!(event.raw_fd(), Some(a.as_raw_fd()));
    assert!(queue.is_empty());
    assert!(queue.event(id).is_none());

    // Registering the same event again yields a fresh id.
    let again = queue.add(event).expect("Failed to add again");
    assert_ne!(again, id);
    assert!(matches!(queue.set_timeout(id, None), Err(evq::Error::UnknownEvent)));
}

#[test_log::test]
fn test_empty_queue_does_not_block() {
    let mut queue = queue();

    assert!(matches!(queue.wait(None).expect("wait failed"), Wait::NoEvents));
}

#[test_log::test]
fn test_dead_descriptor_is_rejected() {
    let mut queue = queue();

    let err = queue
        .add(Event::socket(987_654, EventFlags::READ))
        .expect_err("a closed descriptor should be rejected");
    assert!(matches!(err, evq::Error::Registration(_)));
    assert_eq!(err.os_code(), Some(libc::EBADF));

    assert!(queue.is_empty());
    assert_eq!(queue.stats().slots, 0);
    assert!(matches!(
        queue.wait(Some(Duration::ZERO)).expect("wait failed"),
        Wait::NoEvents
    ));
}
