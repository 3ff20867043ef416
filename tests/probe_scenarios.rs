//! End-to-end scenarios: literal client bytes through the probe chain, and
//! full forwarding through a running server to scratch backends.

use std::net::SocketAddr;
use std::time::Duration;

use rstest::rstest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing_test::traced_test;

use shunt::config::{ListenConfig, LogConfig, ProtocolSpec, ShuntConfig};
use shunt::{ProbeChain, ProbeOutcome, ShuntServer};

fn spec(name: &str, host: &str, port: u16) -> ProtocolSpec {
    ProtocolSpec {
        name: name.to_string(),
        host: host.to_string(),
        port,
        min_length: None,
        sni_hostnames: Vec::new(),
        alpn_protocols: Vec::new(),
        regex_patterns: Vec::new(),
    }
}

fn chain(names: &[&str]) -> ProbeChain {
    let entries = names
        .iter()
        .map(|name| spec(name, "localhost", 9).bind().unwrap())
        .collect();
    ProbeChain::new(entries, None).unwrap()
}

/// Minimal TLS ClientHello record carrying a single SNI entry.
fn client_hello_with_sni(host: &str) -> Vec<u8> {
    let name = host.as_bytes();
    let mut entry = vec![0x00];
    entry.extend_from_slice(&(name.len() as u16).to_be_bytes());
    entry.extend_from_slice(name);

    let mut sni_payload = (entry.len() as u16).to_be_bytes().to_vec();
    sni_payload.extend_from_slice(&entry);

    let mut extensions = vec![0x00, 0x00];
    extensions.extend_from_slice(&(sni_payload.len() as u16).to_be_bytes());
    extensions.extend_from_slice(&sni_payload);

    let mut body = Vec::new();
    body.extend_from_slice(&[0x03, 0x03]);
    body.extend_from_slice(&[0u8; 32]);
    body.push(0);
    body.extend_from_slice(&[0x00, 0x02, 0x13, 0x01]);
    body.extend_from_slice(&[0x01, 0x00]);
    body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    body.extend_from_slice(&extensions);

    let mut handshake = vec![0x01];
    handshake.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    handshake.extend_from_slice(&body);

    let mut record = vec![0x16, 0x03, 0x01];
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);
    record
}

#[rstest]
#[case::ssh_banner(b"SSH-2.0-OpenSSH_8.9\r\n".to_vec(), &["ssh", "tls", "anyprot"], Some("ssh"))]
#[case::http_get(b"GET / HTTP/1.1\r\n".to_vec(), &["ssh", "http", "anyprot"], Some("http"))]
#[case::socks5(vec![0x05, 0x02, 0x00, 0x01], &["ssh", "socks5", "anyprot"], Some("socks5"))]
#[case::socks5_truncated(vec![0x05, 0x02, 0x00], &["ssh", "socks5", "anyprot"], None)]
#[case::ssh_truncated(b"SSH".to_vec(), &["ssh", "anyprot"], None)]
fn probe_buffer_scenarios(
    #[case] input: Vec<u8>,
    #[case] names: &[&str],
    #[case] expected: Option<&str>,
) {
    let chain = chain(names);
    let (outcome, selected) = chain.probe_buffer(&input);
    match expected {
        Some(name) => {
            assert_eq!(outcome, ProbeOutcome::Match);
            assert_eq!(selected.unwrap().name, name);
        }
        None => {
            assert_eq!(outcome, ProbeOutcome::Again);
            assert!(selected.is_none());
        }
    }
}

#[test]
fn tls_sni_allowed_matches_tls_entry() {
    let mut tls = spec("tls", "localhost", 443);
    tls.sni_hostnames = vec!["example.com".to_string()];
    let entries = vec![
        tls.bind().unwrap(),
        spec("anyprot", "localhost", 80).bind().unwrap(),
    ];
    let chain = ProbeChain::new(entries, None).unwrap();

    let (outcome, selected) = chain.probe_buffer(&client_hello_with_sni("example.com"));
    assert_eq!(outcome, ProbeOutcome::Match);
    assert_eq!(selected.unwrap().name, "tls");
}

#[test]
fn tls_sni_rejected_falls_through_to_catch_all() {
    let mut tls = spec("tls", "localhost", 443);
    tls.sni_hostnames = vec!["example.com".to_string()];
    let entries = vec![
        tls.bind().unwrap(),
        spec("anyprot", "localhost", 80).bind().unwrap(),
    ];
    let chain = ProbeChain::new(entries, None).unwrap();

    let (outcome, selected) = chain.probe_buffer(&client_hello_with_sni("other.com"));
    assert_eq!(outcome, ProbeOutcome::Match);
    assert_eq!(selected.unwrap().name, "anyprot");
}

/// A scratch backend: accepts one connection, sends its tag, then drains
/// the client bytes and returns them.
async fn start_backend(tag: &'static str) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = stream.write_all(tag.as_bytes()).await;
        let mut received = Vec::new();
        let _ = stream.read_to_end(&mut received).await;
        received
    });
    (addr, handle)
}

fn server_config(protocols: Vec<ProtocolSpec>, timeout_s: u64, on_timeout: Option<&str>) -> ShuntConfig {
    ShuntConfig {
        listen: ListenConfig::default(),
        timeout_s,
        on_timeout: on_timeout.map(|s| s.to_string()),
        log: LogConfig::default(),
        protocols,
    }
}

async fn start_server(config: ShuntConfig) -> SocketAddr {
    let server = ShuntServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { server.serve(listener).await });
    addr
}

#[tokio::test]
async fn forwards_ssh_with_exact_replay() {
    let (ssh_addr, ssh_backend) = start_backend("ssh-backend").await;
    let (any_addr, _any_backend) = start_backend("any-backend").await;

    let config = server_config(
        vec![
            spec("ssh", "127.0.0.1", ssh_addr.port()),
            spec("anyprot", "127.0.0.1", any_addr.port()),
        ],
        5,
        None,
    );
    let server_addr = start_server(config).await;

    let banner = b"SSH-2.0-OpenSSH_8.9\r\nmore client data";
    let mut client = TcpStream::connect(server_addr).await.unwrap();
    client.write_all(banner).await.unwrap();
    client.shutdown().await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"ssh-backend");

    // The backend observed exactly the bytes the client sent, in order.
    let received = ssh_backend.await.unwrap();
    assert_eq!(received, banner);
}

#[tokio::test]
async fn accumulates_split_client_hello() {
    let (tls_addr, tls_backend) = start_backend("tls-backend").await;
    let (any_addr, _any_backend) = start_backend("any-backend").await;

    let mut tls = spec("tls", "127.0.0.1", tls_addr.port());
    tls.sni_hostnames = vec!["example.com".to_string()];
    let config = server_config(
        vec![tls, spec("anyprot", "127.0.0.1", any_addr.port())],
        5,
        None,
    );
    let server_addr = start_server(config).await;

    let hello = client_hello_with_sni("example.com");
    let split = hello.len() / 2;

    let mut client = TcpStream::connect(server_addr).await.unwrap();
    client.write_all(&hello[..split]).await.unwrap();
    client.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.write_all(&hello[split..]).await.unwrap();
    client.shutdown().await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"tls-backend");

    let received = tls_backend.await.unwrap();
    assert_eq!(received, hello);
}

#[tokio::test]
async fn unmatched_bytes_take_the_catch_all() {
    let (ssh_addr, _ssh_backend) = start_backend("ssh-backend").await;
    let (any_addr, any_backend) = start_backend("any-backend").await;

    let config = server_config(
        vec![
            spec("ssh", "127.0.0.1", ssh_addr.port()),
            spec("anyprot", "127.0.0.1", any_addr.port()),
        ],
        5,
        None,
    );
    let server_addr = start_server(config).await;

    let junk = b"\x99\x42 unidentifiable stream";
    let mut client = TcpStream::connect(server_addr).await.unwrap();
    client.write_all(junk).await.unwrap();
    client.shutdown().await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"any-backend");

    let received = any_backend.await.unwrap();
    assert_eq!(received, junk);
}

#[tokio::test]
async fn closed_client_still_reaches_the_last_backend() {
    let (ssh_addr, _ssh_backend) = start_backend("ssh-backend").await;
    let (any_addr, any_backend) = start_backend("any-backend").await;

    let config = server_config(
        vec![
            spec("ssh", "127.0.0.1", ssh_addr.port()),
            spec("http", "127.0.0.1", ssh_addr.port()),
            spec("anyprot", "127.0.0.1", any_addr.port()),
        ],
        5,
        None,
    );
    let server_addr = start_server(config).await;

    // Connect and close without sending a byte: the server still opens the
    // catch-all backend, which then observes the same empty stream.
    let client = TcpStream::connect(server_addr).await.unwrap();
    drop(client);

    let received = any_backend.await.unwrap();
    assert!(received.is_empty());
}

#[tokio::test]
#[traced_test]
async fn silent_client_takes_the_timeout_entry() {
    let (ssh_addr, _ssh_backend) = start_backend("ssh-backend").await;
    let (http_addr, http_backend) = start_backend("http-backend").await;
    let (any_addr, _any_backend) = start_backend("any-backend").await;

    let config = server_config(
        vec![
            spec("ssh", "127.0.0.1", ssh_addr.port()),
            spec("http", "127.0.0.1", http_addr.port()),
            spec("anyprot", "127.0.0.1", any_addr.port()),
        ],
        1,
        Some("http"),
    );
    let server_addr = start_server(config).await;

    let mut client = TcpStream::connect(server_addr).await.unwrap();

    // Send nothing; after the probe timeout the connection must land on
    // the on_timeout entry, not the catch-all.
    let mut response = vec![0u8; 12];
    client.read_exact(&mut response).await.unwrap();
    assert_eq!(&response, b"http-backend");
    assert!(logs_contain("connection dispatched"));

    client.shutdown().await.unwrap();
    let received = http_backend.await.unwrap();
    assert!(received.is_empty());
}
