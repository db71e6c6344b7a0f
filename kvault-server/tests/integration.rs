//! End-to-end tests driving a live `kvault-server` over a real loopback
//! socket, exercising the scenarios from the distilled spec's §8
//! "End-to-end scenarios" list.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kvault_common::{Config, MaxMemoryPolicy};
use kvault_engine::Store;
use kvault_server::metrics::Metrics;
use kvault_server::monitor::MonitorBroadcaster;
use kvault_server::server::{self, ServerShared};
use kvault_server::slowlog::SlowLog;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Spins up a `ServerShared` + accept loop bound to an ephemeral port and
/// returns its address. The server runs for the lifetime of the test
/// process (the listener task is detached); each test binds its own port
/// so tests never interfere with each other.
async fn spawn_server(requirepass: Option<&str>, maxmemory: u64, policy: MaxMemoryPolicy) -> String {
    let store = Store::new(16, 16, policy);
    store.set_maxmemory(maxmemory);

    let shared = Arc::new(ServerShared {
        store,
        aof: None,
        monitor: Arc::new(MonitorBroadcaster::new()),
        slowlog: Arc::new(SlowLog::new()),
        metrics: Arc::new(Metrics::new()),
        requirepass: requirepass.map(kvault_common::PasswordHash::hash),
        start_time: Instant::now(),
        port: 0,
        maxclients: 0,
        timeout_secs: 0,
        connected_clients: AtomicUsize::new(0),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr").to_string();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let shared = Arc::clone(&shared);
            tokio::spawn(server::accept_connection(shared, stream));
        }
    });

    addr
}

/// Minimal RESP2 reply reader for test assertions: returns the raw bytes
/// of exactly one reply (including its leading type byte and the final
/// `\r\n`), consuming them from `stream`.
async fn read_reply(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];

    stream.read_exact(&mut byte).await.expect("read type byte");
    out.push(byte[0]);
    let kind = byte[0];

    let line = read_line(stream).await;
    out.extend_from_slice(&line);

    if kind == b'$' {
        let len: i64 = std::str::from_utf8(&line[..line.len() - 2]).unwrap().parse().unwrap();
        if len >= 0 {
            let mut body = vec![0u8; len as usize + 2];
            stream.read_exact(&mut body).await.expect("read bulk body");
            out.extend_from_slice(&body);
        }
    } else if kind == b'*' {
        let len: i64 = std::str::from_utf8(&line[..line.len() - 2]).unwrap().parse().unwrap();
        for _ in 0..len.max(0) {
            let elem = Box::pin(read_reply(stream)).await;
            out.extend_from_slice(&elem);
        }
    }
    out
}

async fn read_line(stream: &mut TcpStream) -> Vec<u8> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await.expect("read line byte");
        line.push(byte[0]);
        if line.ends_with(b"\r\n") {
            return line;
        }
    }
}

fn encode(args: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    kvault_server::resp::resp_array_of_bulks(&mut out, &args.iter().map(|a| a.to_vec()).collect::<Vec<_>>());
    out
}

async fn roundtrip(stream: &mut TcpStream, args: &[&[u8]]) -> Vec<u8> {
    stream.write_all(&encode(args)).await.expect("write command");
    read_reply(stream).await
}

#[tokio::test]
async fn set_get_del_roundtrip() {
    let addr = spawn_server(None, 0, MaxMemoryPolicy::NoEviction).await;
    let mut conn = TcpStream::connect(&addr).await.expect("connect");

    assert_eq!(roundtrip(&mut conn, &[b"SET", b"foo", b"bar"]).await, b"+OK\r\n");
    assert_eq!(roundtrip(&mut conn, &[b"GET", b"foo"]).await, b"$3\r\nbar\r\n");
    assert_eq!(roundtrip(&mut conn, &[b"DEL", b"foo"]).await, b":1\r\n");
    assert_eq!(roundtrip(&mut conn, &[b"GET", b"foo"]).await, b"$-1\r\n");
}

#[tokio::test]
async fn key_expires_and_disappears() {
    let addr = spawn_server(None, 0, MaxMemoryPolicy::NoEviction).await;
    let mut conn = TcpStream::connect(&addr).await.expect("connect");

    assert_eq!(roundtrip(&mut conn, &[b"SET", b"k", b"v", b"PX", b"100"]).await, b"+OK\r\n");
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(roundtrip(&mut conn, &[b"GET", b"k"]).await, b"$-1\r\n");
    assert_eq!(roundtrip(&mut conn, &[b"EXISTS", b"k"]).await, b":0\r\n");
}

#[tokio::test]
async fn incr_overflow_is_rejected() {
    let addr = spawn_server(None, 0, MaxMemoryPolicy::NoEviction).await;
    let mut conn = TcpStream::connect(&addr).await.expect("connect");

    assert_eq!(roundtrip(&mut conn, &[b"SET", b"counter", b"10"]).await, b"+OK\r\n");
    assert_eq!(roundtrip(&mut conn, &[b"INCR", b"counter"]).await, b":11\r\n");
    let reply = roundtrip(&mut conn, &[b"INCRBY", b"counter", b"9223372036854775800"]).await;
    assert!(reply.starts_with(b"-ERR"), "expected overflow error, got {:?}", String::from_utf8_lossy(&reply));
}

#[tokio::test]
async fn watch_aborts_exec_when_key_changes_first() {
    let addr = spawn_server(None, 0, MaxMemoryPolicy::NoEviction).await;
    let mut watcher = TcpStream::connect(&addr).await.expect("connect watcher");
    let mut other = TcpStream::connect(&addr).await.expect("connect other");

    assert_eq!(roundtrip(&mut watcher, &[b"WATCH", b"x"]).await, b"+OK\r\n");
    assert_eq!(roundtrip(&mut other, &[b"SET", b"x", b"1"]).await, b"+OK\r\n");

    assert_eq!(roundtrip(&mut watcher, &[b"MULTI"]).await, b"+OK\r\n");
    assert_eq!(roundtrip(&mut watcher, &[b"SET", b"x", b"2"]).await, b"+QUEUED\r\n");
    assert_eq!(roundtrip(&mut watcher, &[b"EXEC"]).await, b"*-1\r\n");
}

#[tokio::test]
async fn auth_gate_rejects_until_correct_password() {
    let addr = spawn_server(Some("secret"), 0, MaxMemoryPolicy::NoEviction).await;
    let mut conn = TcpStream::connect(&addr).await.expect("connect");

    let reply = roundtrip(&mut conn, &[b"GET", b"foo"]).await;
    assert!(reply.starts_with(b"-NOAUTH"));

    let reply = roundtrip(&mut conn, &[b"AUTH", b"wrong"]).await;
    assert!(reply.starts_with(b"-WRONGPASS"));

    assert_eq!(roundtrip(&mut conn, &[b"AUTH", b"secret"]).await, b"+OK\r\n");
    assert_eq!(roundtrip(&mut conn, &[b"GET", b"foo"]).await, b"$-1\r\n");
}

#[tokio::test]
async fn lru_eviction_keeps_recently_accessed_key_alive() {
    let addr = spawn_server(None, 1024, MaxMemoryPolicy::Scoped(
        kvault_common::EvictionScope::AllKeys,
        kvault_common::EvictionKind::Lru,
    )).await;
    let mut conn = TcpStream::connect(&addr).await.expect("connect");

    let value = vec![b'x'; 100];
    for i in 1..=30 {
        let key = format!("k{i}");
        roundtrip(&mut conn, &[b"SET", key.as_bytes(), &value]).await;
        // Re-touch k1 after every insert so it stays at the MRU end.
        roundtrip(&mut conn, &[b"GET", b"k1"]).await;
    }

    let k1 = roundtrip(&mut conn, &[b"GET", b"k1"]).await;
    assert_eq!(k1, [b"$100\r\n".as_slice(), value.as_slice(), b"\r\n"].concat());

    let k2 = roundtrip(&mut conn, &[b"GET", b"k2"]).await;
    assert_eq!(k2, b"$-1\r\n");
}

#[tokio::test]
async fn multi_database_selection_is_isolated() {
    let addr = spawn_server(None, 0, MaxMemoryPolicy::NoEviction).await;
    let mut conn = TcpStream::connect(&addr).await.expect("connect");

    assert_eq!(roundtrip(&mut conn, &[b"SET", b"shared", b"db0"]).await, b"+OK\r\n");
    assert_eq!(roundtrip(&mut conn, &[b"SELECT", b"1"]).await, b"+OK\r\n");
    assert_eq!(roundtrip(&mut conn, &[b"GET", b"shared"]).await, b"$-1\r\n");
    assert_eq!(roundtrip(&mut conn, &[b"SELECT", b"0"]).await, b"+OK\r\n");
    assert_eq!(roundtrip(&mut conn, &[b"GET", b"shared"]).await, b"$3\r\ndb0\r\n");
}

#[tokio::test]
async fn hash_and_list_commands_work_end_to_end() {
    let addr = spawn_server(None, 0, MaxMemoryPolicy::NoEviction).await;
    let mut conn = TcpStream::connect(&addr).await.expect("connect");

    assert_eq!(roundtrip(&mut conn, &[b"HSET", b"h", b"f", b"v"]).await, b":1\r\n");
    assert_eq!(roundtrip(&mut conn, &[b"HGET", b"h", b"f"]).await, b"$1\r\nv\r\n");

    assert_eq!(roundtrip(&mut conn, &[b"RPUSH", b"l", b"a", b"b", b"c"]).await, b":3\r\n");
    let range = roundtrip(&mut conn, &[b"LRANGE", b"l", b"0", b"-1"]).await;
    assert_eq!(
        range,
        b"*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n".to_vec()
    );
}

#[test]
fn config_parse_round_trips_through_config_struct() {
    let cfg = Config::parse("port 7000\nmaxmemory-policy allkeys-lru\n").unwrap();
    assert_eq!(cfg.port, 7000);
    assert_eq!(cfg.maxmemory_policy.to_string(), "allkeys-lru");
}
