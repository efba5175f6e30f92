use evq::{Error, Event, EventFlags, EventQueue, MessagePort, Ready, Wait};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

fn wait_ready(queue: &mut EventQueue, limit: Duration) -> Vec<Ready> {
    let start = Instant::now();

    while start.elapsed() < limit {
        if let Wait::Ready(ready) = queue.wait(Some(limit)).expect("wait failed") {
            return ready;
        }
    }

    Vec::new()
}

#[test_log::test]
fn test_dirwatch_reports_new_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut queue = EventQueue::new().expect("Failed to build queue");

    let id = queue
        .add_dirwatch(Event::dirwatch(EventFlags::empty()), dir.path())
        .expect("Failed to watch directory");
    assert!(matches!(
        queue.wait(Some(Duration::ZERO)).expect("wait failed"),
        Wait::Timeout
    ));

    fs::write(dir.path().join("created.txt"), b"hello").expect("Failed to write file");

    let ready = wait_ready(&mut queue, Duration::from_secs(2));
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id(), id);
    assert!(ready[0].readiness().is_readable());

    // Notifications were consumed with the delivery.
    assert!(matches!(
        queue.wait(Some(Duration::ZERO)).expect("wait failed"),
        Wait::Timeout
    ));
}

#[test_log::test]
fn test_dirwatch_last_write_filter() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file = dir.path().join("data.txt");
    fs::write(&file, b"v1").expect("Failed to write file");

    let mut queue = EventQueue::new().expect("Failed to build queue");
    queue
        .add_dirwatch(
            Event::dirwatch(EventFlags::WATCH_LAST_WRITE),
            dir.path(),
        )
        .expect("Failed to watch directory");

    // Name-only changes are filtered out.
    fs::create_dir(dir.path().join("sub")).expect("Failed to create dir");
    assert!(matches!(
        queue.wait(Some(Duration::from_millis(50))).expect("wait failed"),
        Wait::Timeout
    ));

    fs::write(&file, b"v2").expect("Failed to write file");
    assert_eq!(wait_ready(&mut queue, Duration::from_secs(2)).len(), 1);
}

#[test_log::test]
fn test_dirwatch_rejects_missing_directory() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let missing = dir.path().join("missing");
    let mut queue = EventQueue::new().expect("Failed to build queue");

    let err = queue
        .add_dirwatch(Event::dirwatch(EventFlags::empty()), &missing)
        .expect_err("missing directory should be rejected");
    assert!(matches!(err, Error::InvalidPath(path) if path == missing));

    let err = queue
        .add_dirwatch(Event::dirwatch(EventFlags::empty()), Path::new("bad\0path"))
        .expect_err("nul byte should be rejected");
    assert!(matches!(err, Error::InvalidPath(_)));
    assert!(queue.is_empty());
}

#[test_log::test]
fn test_process_exit_reports_code() {
    let mut child = Command::new("sh")
        .args(["-c", "sleep 0.05; exit 3"])
        .spawn()
        .expect("Failed to spawn child");

    let mut queue = EventQueue::new().expect("Failed to build queue");
    let id = queue
        .add(Event::process(child.id(), EventFlags::ONESHOT).expect("Failed to open process"))
        .expect("Failed to add process");

    let ready = wait_ready(&mut queue, Duration::from_secs(5));
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id(), id);
    assert!(ready[0].readiness().has_exited());
    assert_eq!(ready[0].readiness().exit_code(), Some(3));

    let event = ready.into_iter().next().and_then(Ready::into_event).expect("released event");
    assert_eq!(event.pid(), Some(child.id()));

    // The status was left for the owner to collect.
    let status = child.wait().expect("Failed to reap child");
    assert_eq!(status.code(), Some(3));
}

#[test_log::test]
fn test_message_port_wakes_wait() {
    let port = MessagePort::new().expect("Failed to create message port");
    let mut queue = EventQueue::new().expect("Failed to build queue");

    let id = queue
        .add(port.event(EventFlags::empty()))
        .expect("Failed to add message event");
    assert!(matches!(
        queue.add(port.event(EventFlags::empty())),
        Err(Error::MessageSlotTaken)
    ));
    assert_eq!(queue.stats().messages, 1);

    let sender = port.clone();
    let poster = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        sender.post(42u32);
    });

    let ready = wait_ready(&mut queue, Duration::from_secs(5));
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id(), id);
    poster.join().expect("Thread panicked");

    assert_eq!(port.try_recv(), Some(42));
    assert!(matches!(
        queue.wait(Some(Duration::ZERO)).expect("wait failed"),
        Wait::Timeout
    ));

    queue.delete(id, false).expect("Failed to delete");
    queue
        .add(port.event(EventFlags::empty()))
        .expect("slot should be free again");
}
