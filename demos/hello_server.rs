//! Minimal HTTP responder driven by a single multiplexer.
//!
//! ```text
//! RUST_LOG=epoll=trace cargo run --example hello_server
//! curl http://127.0.0.1:4000/
//! ```

use epoll::{Epoll, Events};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const RESPONSE: &[u8] = b"HTTP/1.0 200 OK\r\n\
Content-Length: 7\r\n\
Content-Type: text/html\r\n\
\r\n\
HELLO\r\n";

enum Conn {
    Listener(TcpListener),
    Client(TcpStream),
}

impl AsRawFd for Conn {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Conn::Listener(listener) => listener.as_raw_fd(),
            Conn::Client(stream) => stream.as_raw_fd(),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let listener = TcpListener::bind("127.0.0.1:4000")?;
    listener.set_nonblocking(true)?;
    tracing::info!("listening on http://{}/", listener.local_addr()?);

    let mut epoll = Epoll::new()?;
    epoll.add(&Arc::new(Conn::Listener(listener)), Events::READABLE)?;

    loop {
        for event in epoll.wait(None)? {
            match &**event.token() {
                Conn::Listener(listener) => accept_all(&mut epoll, listener)?,
                Conn::Client(stream) if event.events().is_readable() => {
                    let mut request = [0u8; 1024];
                    match (&*stream).read(&mut request) {
                        Ok(0) => epoll.delete(event.token())?,
                        Ok(_) => {
                            epoll.modify(event.token(), Events::WRITABLE | Events::EDGE_TRIGGERED)?
                        }
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                        Err(err) => {
                            tracing::warn!("read failed: {err}");
                            epoll.delete(event.token())?;
                        }
                    }
                }
                Conn::Client(stream) if event.events().is_writable() => {
                    if let Err(err) = (&*stream).write_all(RESPONSE) {
                        tracing::warn!("write failed: {err}");
                    }
                    epoll.delete(event.token())?;
                }
                Conn::Client(_) => {
                    tracing::debug!(events = ?event.events(), "connection error or hangup");
                    epoll.delete(event.token())?;
                }
            }
        }
    }
}

fn accept_all(epoll: &mut Epoll<Conn>, listener: &TcpListener) -> io::Result<()> {
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(true)?;
                tracing::debug!(%peer, "accepted");

                let client = Arc::new(Conn::Client(stream));
                if let Err(err) = epoll.add(&client, Events::READABLE | Events::EDGE_TRIGGERED) {
                    tracing::warn!("cannot watch {peer}: {err}");
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}
