use epoll::{Epoll, EpollBuilder, Error, Events};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const LONG: Option<Duration> = Some(Duration::from_secs(5));

fn pair() -> (Arc<UnixStream>, Arc<UnixStream>) {
    let (left, right) = UnixStream::pair().expect("socketpair");
    (Arc::new(left), Arc::new(right))
}

#[test]
fn test_wait_on_empty_set_fails_immediately() {
    let epoll = Epoll::<UnixStream>::new().unwrap();

    let started = Instant::now();
    let err = epoll.wait(None).unwrap_err();

    assert!(matches!(err, Error::InvalidState("empty interest set")));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_wait_after_everything_deleted_fails() {
    let (left, _right) = pair();
    let mut epoll = Epoll::new().unwrap();

    epoll.add(&left, Events::READABLE).unwrap();
    epoll.delete(&left).unwrap();

    assert!(matches!(epoll.wait(Some(Duration::ZERO)), Err(Error::InvalidState(_))));
}

#[test]
fn test_readable_event_carries_token() {
    let (reader, writer) = pair();
    let mut epoll = Epoll::new().unwrap();
    epoll.add(&reader, Events::READABLE).unwrap();

    (&*writer).write_all(b"ok").unwrap();
    let events = epoll.wait(LONG).unwrap();

    assert_eq!(events.len(), 1);
    assert!(Arc::ptr_eq(events[0].token(), &reader));
    assert!(events[0].events().is_readable());
}

#[test]
fn test_zero_timeout_polls() {
    let (reader, _writer) = pair();
    let mut epoll = Epoll::new().unwrap();
    epoll.add(&reader, Events::READABLE).unwrap();

    let started = Instant::now();
    let events = epoll.wait(Some(Duration::ZERO)).unwrap();

    assert!(events.is_empty());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_timeout_elapses_with_nothing_ready() {
    let (reader, _writer) = pair();
    let mut epoll = Epoll::new().unwrap();
    epoll.add(&reader, Events::READABLE).unwrap();

    let started = Instant::now();
    let events = epoll.wait(Some(Duration::from_millis(50))).unwrap();

    assert!(events.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(40));
}

#[test]
fn test_edge_triggered_pipe() {
    let mut fds = [0i32; 2];
    let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(res, 0, "pipe() failed");

    let reader = Arc::new(unsafe { File::from_raw_fd(fds[0]) });
    let writer = Arc::new(unsafe { File::from_raw_fd(fds[1]) });

    let mut epoll = Epoll::new().unwrap();
    epoll.add(&reader, Events::READABLE | Events::EDGE_TRIGGERED).unwrap();
    epoll.add(&writer, Events::WRITABLE | Events::EDGE_TRIGGERED).unwrap();

    let events = epoll.wait(LONG).unwrap();
    assert_eq!(events.len(), 1);
    assert!(Arc::ptr_eq(events[0].token(), &writer));
    assert_eq!(events[0].events(), Events::WRITABLE);

    (&*writer).write_all(b"ok").unwrap();

    let events = epoll.wait(LONG).unwrap();
    assert_eq!(events.len(), 1);
    assert!(Arc::ptr_eq(events[0].token(), &reader));
    assert_eq!(events[0].events(), Events::READABLE);
}

#[test]
fn test_every_ready_resource_reported_once() {
    const N: usize = 10;

    let pairs: Vec<_> = (0..N).map(|_| pair()).collect();
    let mut epoll = EpollBuilder::new().max_events(3).build().unwrap();

    for (reader, _) in &pairs {
        epoll.add(reader, Events::READABLE).unwrap();
    }

    for (_, writer) in &pairs {
        (&**writer).write_all(b"x").unwrap();
    }

    let mut seen = HashSet::new();
    let mut calls = 0;

    while seen.len() < N {
        let events = epoll.wait(LONG).unwrap();
        assert!(!events.is_empty());
        assert!(events.len() <= 3);
        calls += 1;

        for event in events {
            let mut byte = [0u8; 1];
            (&**event.token()).read_exact(&mut byte).unwrap();

            assert!(seen.insert(event.token().as_raw_fd()), "reported twice");
        }
    }

    assert_eq!(seen.len(), N);
    assert!(calls >= N.div_ceil(3));
    assert!(epoll.wait(Some(Duration::ZERO)).unwrap().is_empty());
}

#[test]
fn test_bounded_buffer_defers_one_shot_entries() {
    let pairs: Vec<_> = (0..5).map(|_| pair()).collect();
    let mut epoll = EpollBuilder::new().max_events(2).build().unwrap();

    for (left, _) in &pairs {
        epoll.add(left, Events::WRITABLE | Events::ONE_SHOT).unwrap();
    }

    let first = epoll.wait(LONG).unwrap();
    let second = epoll.wait(LONG).unwrap();
    let third = epoll.wait(LONG).unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(third.len(), 1);

    let reported: HashSet<_> = first
        .iter()
        .chain(&second)
        .chain(&third)
        .map(|event| event.token().as_raw_fd())
        .collect();
    assert_eq!(reported.len(), 5);

    // All entries are disarmed but still registered.
    assert_eq!(epoll.len(), 5);
    assert!(epoll.wait(Some(Duration::ZERO)).unwrap().is_empty());

    epoll.modify(&pairs[0].0, Events::WRITABLE).unwrap();
    assert_eq!(epoll.wait(Some(Duration::ZERO)).unwrap().len(), 1);
}

#[test]
fn test_hangup_is_reported() {
    let (left, right) = pair();
    let mut epoll = Epoll::new().unwrap();
    epoll.add(&left, Events::READABLE | Events::PEER_CLOSED).unwrap();

    drop(right);
    let events = epoll.wait(LONG).unwrap();

    assert_eq!(events.len(), 1);
    assert!(events[0].events().is_peer_closed());
}

#[test]
fn test_deleted_resource_is_not_reported() {
    let (left, right) = pair();
    let mut epoll = Epoll::new().unwrap();

    epoll.add(&left, Events::WRITABLE).unwrap();
    epoll.add(&right, Events::WRITABLE).unwrap();
    epoll.delete(&left).unwrap();

    let events = epoll.wait(LONG).unwrap();

    assert_eq!(events.len(), 1);
    assert!(Arc::ptr_eq(events[0].token(), &right));
}

#[test]
fn test_wait_from_another_thread() {
    let (reader, writer) = pair();
    let mut epoll = Epoll::new().unwrap();
    epoll.add(&reader, Events::READABLE).unwrap();

    let events = thread::scope(|scope| {
        let waiter = scope.spawn(|| epoll.wait(LONG));

        thread::sleep(Duration::from_millis(20));
        (&*writer).write_all(b"x").unwrap();

        waiter.join().unwrap()
    })
    .unwrap();

    assert_eq!(events.len(), 1);
    assert!(Arc::ptr_eq(events[0].token(), &reader));
}
