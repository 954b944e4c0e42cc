#![cfg(unix)]
//! Serial session tests against pseudo-terminals — a real OS handle
//! exercising the read loop, the mutex-serialized write path, and
//! deterministic close, with zero mocking.

mod common;

use anyhow::Result;
use common::init_tracing;
use espflasher_core::error::TransportError;
use espflasher_core::serial::{SerialConfig, SerialSession, SessionEvent, SessionState};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

#[test]
fn open_failure_returns_transport_error() {
    init_tracing();
    let result = SerialSession::open(SerialConfig::new("/dev/espflasher-does-not-exist", 115_200));
    match result {
        Err(TransportError::Open { port, .. }) => {
            assert_eq!(port, "/dev/espflasher-does-not-exist");
        }
        Ok(_) => panic!("opening a nonexistent device must fail"),
        Err(other) => panic!("expected Open error, got {other:?}"),
    }
}

#[test]
fn session_reads_and_writes_through_pty() -> Result<()> {
    init_tracing();
    let (mut master, slave) = serialport::TTYPort::pair()?;
    let path = slave.name().expect("pty slave has a path");
    drop(slave);

    let mut session = SerialSession::open(SerialConfig::new(path.as_str(), 115_200))?;
    assert_eq!(session.state(), SessionState::Open);

    // Device → session: bytes pushed into the master end must come out as
    // Data events.
    master.write_all(b"hello")?;
    master.flush()?;

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut received: Vec<u8> = Vec::new();
    while received.len() < 5 {
        assert!(
            Instant::now() < deadline,
            "no data from the read loop within 5 s"
        );
        if let Ok(SessionEvent::Data(chunk)) =
            session.events().recv_timeout(Duration::from_millis(100))
        {
            received.extend(chunk);
        }
    }
    assert_eq!(&received[..5], b"hello");

    // Session → device: write() flushes before reporting success.
    let written = session.write(b"ok\n")?;
    assert_eq!(written, 3);
    master.set_timeout(Duration::from_secs(5))?;
    let mut buf = [0u8; 3];
    master.read_exact(&mut buf)?;
    assert_eq!(&buf, b"ok\n");

    // Close is deterministic and idempotent; writes afterwards fail.
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    session.close();
    assert!(matches!(
        session.write(b"x"),
        Err(TransportError::NotOpen)
    ));
    Ok(())
}

#[test]
fn close_emits_closed_event() -> Result<()> {
    init_tracing();
    let (_master, slave) = serialport::TTYPort::pair()?;
    let path = slave.name().expect("pty slave has a path");
    drop(slave);

    let mut session = SerialSession::open(SerialConfig::new(path.as_str(), 115_200))?;
    session.close();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        assert!(Instant::now() < deadline, "no Closed event after close()");
        match session.events().recv_timeout(Duration::from_millis(100)) {
            Ok(SessionEvent::Closed) => break,
            Ok(_) => continue,
            Err(_) => continue,
        }
    }
    Ok(())
}
