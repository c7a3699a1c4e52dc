use epoll::{DEFAULT_MAX_EVENTS, Epoll, EpollBuilder, Error, Events};
use std::os::unix::net::UnixStream;
use std::sync::Arc;

#[test]
fn test_create() {
    let epoll = Epoll::<UnixStream>::new().expect("create");

    assert!(!epoll.is_closed());
    assert!(epoll.fileno().unwrap() > 0);
    assert_eq!(epoll.len(), 0);
    assert!(epoll.is_empty());
}

#[test]
fn test_close() {
    let mut epoll = Epoll::<UnixStream>::new().unwrap();

    epoll.close().expect("close");

    assert!(epoll.is_closed());
    assert!(matches!(epoll.fileno(), Err(Error::ClosedHandle)));
}

#[test]
fn test_close_twice_is_an_error() {
    let mut epoll = Epoll::<UnixStream>::new().unwrap();

    epoll.close().unwrap();

    assert!(matches!(epoll.close(), Err(Error::AlreadyClosed)));
    assert!(matches!(epoll.close(), Err(Error::AlreadyClosed)));
    assert!(epoll.is_closed());
}

#[test]
fn test_use_after_close() {
    let (left, _right) = UnixStream::pair().unwrap();
    let left = Arc::new(left);
    let mut epoll = Epoll::new().unwrap();
    epoll.add(&left, Events::READABLE).unwrap();

    epoll.close().unwrap();

    assert!(matches!(epoll.fileno(), Err(Error::ClosedHandle)));
    assert!(matches!(
        epoll.add(&left, Events::READABLE),
        Err(Error::ClosedHandle)
    ));
    assert!(matches!(epoll.delete(&left), Err(Error::ClosedHandle)));
    assert!(matches!(epoll.wait(None), Err(Error::ClosedHandle)));
    assert!(matches!(epoll.is_close_on_exec(), Err(Error::ClosedHandle)));
    assert!(matches!(
        epoll.set_close_on_exec(true),
        Err(Error::ClosedHandle)
    ));
}

#[test]
fn test_close_drops_tokens() {
    let (left, right) = UnixStream::pair().unwrap();
    let left = Arc::new(left);
    let right = Arc::new(right);
    let mut epoll = Epoll::new().unwrap();

    epoll.add(&left, Events::READABLE).unwrap();
    epoll.add(&right, Events::WRITABLE).unwrap();
    assert_eq!(Arc::strong_count(&left), 2);
    assert_eq!(Arc::strong_count(&right), 2);

    epoll.close().unwrap();

    assert_eq!(epoll.len(), 0);
    assert_eq!(Arc::strong_count(&left), 1);
    assert_eq!(Arc::strong_count(&right), 1);
}

#[test]
fn test_drop_releases_tokens() {
    let (left, _right) = UnixStream::pair().unwrap();
    let left = Arc::new(left);

    {
        let mut epoll = Epoll::new().unwrap();
        epoll.add(&left, Events::READABLE).unwrap();
        assert_eq!(Arc::strong_count(&left), 2);
    }

    assert_eq!(Arc::strong_count(&left), 1);
}

#[test]
fn test_repeated_create_and_close() {
    for _ in 0..10 {
        let mut epoll = Epoll::<UnixStream>::new().unwrap();
        assert!(epoll.fileno().unwrap() > 0);
        epoll.close().unwrap();

        let dropped = Epoll::<UnixStream>::new().unwrap();
        drop(dropped);
    }
}

#[test]
fn test_display() {
    let mut epoll = Epoll::<UnixStream>::new().unwrap();
    let fd = epoll.fileno().unwrap();

    assert_eq!(epoll.to_string(), format!("Epoll(fd {fd})"));

    epoll.close().unwrap();

    assert_eq!(epoll.to_string(), "Epoll(closed)");
}

#[test]
fn test_close_on_exec() {
    let mut epoll = Epoll::<UnixStream>::new().unwrap();
    assert!(epoll.is_close_on_exec().unwrap());

    epoll.set_close_on_exec(false).unwrap();
    assert!(!epoll.is_close_on_exec().unwrap());

    epoll.set_close_on_exec(true).unwrap();
    assert!(epoll.is_close_on_exec().unwrap());
}

#[test]
fn test_builder_without_close_on_exec() {
    let epoll = EpollBuilder::new()
        .close_on_exec(false)
        .build::<UnixStream>()
        .unwrap();

    assert!(!epoll.is_close_on_exec().unwrap());
}

#[test]
fn test_builder_max_events() {
    let epoll = Epoll::<UnixStream>::builder()
        .max_events(8)
        .build::<UnixStream>()
        .unwrap();
    assert_eq!(epoll.max_events(), 8);

    let epoll = EpollBuilder::new().max_events(0).build::<UnixStream>().unwrap();
    assert_eq!(epoll.max_events(), 1);

    let epoll = EpollBuilder::default().build::<UnixStream>().unwrap();
    assert_eq!(epoll.max_events(), DEFAULT_MAX_EVENTS);
}
