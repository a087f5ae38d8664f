use std::io::Write;
use std::net::{Shutdown as SocketShutdown, TcpStream};
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use linemux::service::NetworkConfig;
use linemux::{
    AppResult, ConnectionToken, Listener, MioDriver, Multiplexer, MultiplexerConfig, Server,
    Shutdown,
};
use tokio::sync::{broadcast, mpsc};

const DEADLINE: Duration = Duration::from_secs(5);

fn loopback() -> NetworkConfig {
    NetworkConfig {
        ip: "127.0.0.1".to_string(),
        port: 0,
        cycle_interval_ms: 5,
    }
}

/// Cycles until `done` holds or the deadline passes.
fn cycle_until<F>(
    listener: &Listener,
    mux: &mut Multiplexer<MioDriver>,
    records: &mut Vec<(ConnectionToken, Bytes)>,
    mut done: F,
) -> AppResult<Vec<ConnectionToken>>
where
    F: FnMut(&[(ConnectionToken, Bytes)], &[ConnectionToken]) -> bool,
{
    let started = Instant::now();
    let mut closed = Vec::new();
    while started.elapsed() < DEADLINE {
        let accepted = listener.accept_pending()?;
        if !accepted.is_empty() {
            mux.register(accepted)?;
        }
        let report = mux.run_cycle()?;
        closed.extend(report.disconnects.iter().map(|d| d.token));
        records.extend(mux.take_all_records());
        if done(records, &closed) {
            return Ok(closed);
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out, got records {:?} and closes {:?}", records, closed);
}

#[test]
fn test_loopback_records_and_disconnect() -> AppResult<()> {
    let listener = Listener::bind(loopback().socket_addr()?)?;
    let mut mux = Multiplexer::new(MioDriver::new()?, &MultiplexerConfig::default());

    let mut first = TcpStream::connect(listener.local_addr())?;
    let mut second = TcpStream::connect(listener.local_addr())?;
    first.write_all(b"hello from first\npartial")?;
    second.write_all(b"second says hi\r\n")?;

    let mut records = Vec::new();
    cycle_until(&listener, &mut mux, &mut records, |records, _| records.len() >= 2)?;

    let mut texts: Vec<&[u8]> = records.iter().map(|(_, r)| &r[..]).collect();
    texts.sort();
    assert_eq!(texts, vec![&b"hello from first"[..], &b"second says hi\r"[..]]);
    assert_eq!(mux.live_tokens().len(), 2);

    let first_token = records
        .iter()
        .find(|(_, r)| r == "hello from first")
        .map(|(t, _)| *t)
        .expect("record from first connection");
    assert_eq!(mux.buffered(first_token), Some(b"partial".to_vec()));

    // the tail completes and the peer hangs up
    first.write_all(b" line\n")?;
    first.shutdown(SocketShutdown::Both)?;
    drop(first);

    let mut tail = Vec::new();
    let closed = cycle_until(&listener, &mut mux, &mut tail, |_, closed| {
        closed.contains(&first_token)
    })?;
    assert!(closed.contains(&first_token));
    assert!(tail.contains(&(first_token, Bytes::from_static(b"partial line"))));

    let removed = mux.remove_closed()?;
    assert_eq!(removed, vec![first_token]);
    assert_eq!(mux.live_tokens().len(), 1);
    assert_eq!(mux.table().poll_set_len(), 1);
    drop(second);
    Ok(())
}

#[tokio::test]
async fn test_server_hands_records_to_handler() -> AppResult<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut server = Server::bind(&loopback(), &MultiplexerConfig::default())?
        .with_record_handler(move |_, record| {
            let _ = tx.send(record);
        });

    let mut client = TcpStream::connect(server.local_addr())?;
    client.write_all(b"ping\npo")?;
    client.write_all(b"ng\n")?;

    let (notify_shutdown, _) = broadcast::channel(1);
    let run = server.run(Shutdown::subscribe(&notify_shutdown));
    tokio::pin!(run);

    let mut received = Vec::new();
    let collect = async {
        while received.len() < 2 {
            tokio::select! {
                res = &mut run => panic!("server stopped early: {:?}", res),
                record = rx.recv() => received.push(record.expect("handler dropped")),
            }
        }
    };
    tokio::time::timeout(DEADLINE, collect)
        .await
        .expect("records within deadline");
    assert_eq!(received, vec!["ping", "pong"]);

    notify_shutdown.send(()).expect("server listening");
    run.await?;
    drop(client);
    Ok(())
}

/// Cycles the server until `done` holds or the deadline passes.
fn cycle_server_until<F>(server: &mut Server, mut done: F) -> AppResult<()>
where
    F: FnMut(&Server) -> bool,
{
    let started = Instant::now();
    while started.elapsed() < DEADLINE {
        server.cycle()?;
        if done(server) {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!(
        "timed out with {} live connections",
        server.multiplexer().live_tokens().len()
    );
}

#[test]
fn test_server_survives_token_exhaustion() -> AppResult<()> {
    let config = MultiplexerConfig {
        token_capacity: 1,
        ..MultiplexerConfig::default()
    };
    let (tx, rx) = std_mpsc::channel();
    let mut server = Server::bind(&loopback(), &config)?.with_record_handler(move |token, record| {
        let _ = tx.send((token, record));
    });

    // both land in the backlog, so one accept pass sees a batch of two
    let first = TcpStream::connect(server.local_addr())?;
    let second = TcpStream::connect(server.local_addr())?;
    thread::sleep(Duration::from_millis(50));

    server.cycle()?;
    assert!(server.multiplexer().live_tokens().is_empty());
    assert_eq!(server.multiplexer().table().poll_set_len(), 0);
    drop(first);
    drop(second);

    // the freed capacity still serves a later client
    let mut late = TcpStream::connect(server.local_addr())?;
    late.write_all(b"late\n")?;
    let mut records = Vec::new();
    cycle_server_until(&mut server, |_| {
        records.extend(rx.try_iter());
        !records.is_empty()
    })?;
    assert_eq!(server.multiplexer().live_tokens().len(), 1);
    let late_token = records[0].0;
    assert_eq!(records[0].1, "late");

    // a client arriving at full capacity is dropped, the live one keeps going
    let extra = TcpStream::connect(server.local_addr())?;
    thread::sleep(Duration::from_millis(50));
    server.cycle()?;
    assert_eq!(server.multiplexer().live_tokens(), vec![late_token]);

    late.write_all(b"still here\n")?;
    cycle_server_until(&mut server, |_| {
        records.extend(rx.try_iter());
        records.len() >= 2
    })?;
    assert_eq!(records[1], (late_token, Bytes::from_static(b"still here")));
    drop(extra);
    Ok(())
}
