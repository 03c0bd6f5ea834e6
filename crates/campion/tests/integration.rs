//! End-to-end tests: real sockets, the real handler, a scripted
//! upstream.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use campion::handler::CampionHandler;
use campion_cache::{CacheConfig, ForwardCache};
use campion_config::{BannedSection, Config};
use campion_filter::{Blocklist, SharedBlocklist};
use campion_proto::{Flags, Message, Name, Question, RecordType, ResponseCode};
use campion_resolver::{ForwardConfig, Forwarder};
use campion_server::{TcpServer, UdpServer};
use campion_zone::{SharedZone, ZoneTable};
use tokio::sync::broadcast;

const ZONE_YAML: &str = r#"
server_ip: 10.0.0.2
zones:
  - suffix: camp.local
    ttl: 300
    records:
      - { name: "@", type: A, value: server }
      - { name: pages, type: A, value: 10.0.0.5 }
      - { name: www, type: CNAME, value: pages }
"#;

/// Starts a scripted upstream that answers every query with a single
/// A record and counts queries.
async fn fake_upstream(hits: Arc<AtomicU64>) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 512];
        loop {
            let (len, src) = socket.recv_from(&mut buf).await.unwrap();
            hits.fetch_add(1, Ordering::Relaxed);

            let query = Message::parse(&buf[..len]).unwrap();
            let mut response = Message::response_from(&query);
            response.add_answer(campion_proto::ResourceRecord::a(
                query.question().unwrap().qname.clone(),
                Ipv4Addr::new(203, 0, 113, 10),
                90,
            ));
            socket.send_to(&response.to_wire(), src).await.unwrap();
        }
    });

    addr
}

struct TestServer {
    udp_addr: SocketAddr,
    tcp_addr: SocketAddr,
    zone: Arc<SharedZone>,
    upstream_hits: Arc<AtomicU64>,
    // Keeps the listeners' shutdown channel open for the test's life.
    _shutdown: broadcast::Sender<()>,
}

/// Boots UDP and TCP listeners on ephemeral ports around the real
/// handler, zone and forwarder.
async fn start_server(yaml: &str) -> TestServer {
    start_server_with(yaml, CacheConfig::default(), Blocklist::default()).await
}

async fn start_server_with(
    yaml: &str,
    cache: CacheConfig,
    blocklist: Blocklist,
) -> TestServer {
    let upstream_hits = Arc::new(AtomicU64::new(0));
    let upstream = fake_upstream(upstream_hits.clone()).await;

    let config = Config::from_yaml(yaml).unwrap();
    let zone = Arc::new(SharedZone::new(ZoneTable::from_config(&config).unwrap()));
    let forwarder = Arc::new(Forwarder::new(
        ForwardConfig {
            upstream,
            timeout: Duration::from_millis(500),
            retries: 1,
        },
        Arc::new(ForwardCache::new(cache)),
    ));
    let handler = Arc::new(CampionHandler::new(
        zone.clone(),
        Arc::new(SharedBlocklist::new(blocklist)),
        forwarder,
    ));

    let udp = UdpServer::bind("127.0.0.1:0".parse().unwrap(), handler.clone())
        .await
        .unwrap();
    let tcp = TcpServer::bind("127.0.0.1:0".parse().unwrap(), handler)
        .await
        .unwrap();
    let udp_addr = udp.local_addr();
    let tcp_addr = tcp.local_addr();

    let (shutdown, _) = broadcast::channel(1);
    let udp_rx = shutdown.subscribe();
    let tcp_rx = shutdown.subscribe();
    tokio::spawn(async move { udp.run(udp_rx).await });
    tokio::spawn(async move { tcp.run(tcp_rx).await });

    TestServer {
        udp_addr,
        tcp_addr,
        zone,
        upstream_hits,
        _shutdown: shutdown,
    }
}

fn make_query(name: &str, rtype: RecordType) -> Message {
    Message::query(Question::new(
        name.parse::<Name>().unwrap(),
        rtype,
        campion_proto::Class::IN,
    ))
}

async fn udp_query(addr: SocketAddr, query: &Message) -> std::io::Result<Message> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.send_to(&query.to_wire(), addr).await?;

    let mut buf = vec![0u8; 65535];
    let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf)).await??;

    Message::parse(&buf[..len])
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

async fn tcp_query(addr: SocketAddr, query: &Message) -> std::io::Result<Message> {
    let mut stream = TcpStream::connect(addr).await?;

    let wire = query.to_wire();
    stream.write_all(&(wire.len() as u16).to_be_bytes()).await?;
    stream.write_all(&wire).await?;

    let mut len_buf = [0u8; 2];
    timeout(Duration::from_secs(5), stream.read_exact(&mut len_buf)).await??;
    let mut body = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
    stream.read_exact(&mut body).await?;

    Message::parse(&body)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

#[tokio::test]
async fn test_udp_authoritative_answer() {
    let server = start_server(ZONE_YAML).await;
    let query = make_query("pages.camp.local", RecordType::A);

    let response = udp_query(server.udp_addr, &query).await.unwrap();
    assert_eq!(response.id(), query.id());
    assert_eq!(response.rcode(), ResponseCode::NoError);
    assert!(response.flags().contains(Flags::AA));
    assert_eq!(response.answers().len(), 1);
    assert_eq!(
        response.answers()[0].rdata.as_a(),
        Some(Ipv4Addr::new(10, 0, 0, 5))
    );
    assert_eq!(response.answers()[0].ttl, 300);
    assert_eq!(server.upstream_hits.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_udp_apex_resolves_to_server_ip() {
    let server = start_server(ZONE_YAML).await;
    let response = udp_query(server.udp_addr, &make_query("camp.local", RecordType::A))
        .await
        .unwrap();
    assert_eq!(
        response.answers()[0].rdata.as_a(),
        Some(Ipv4Addr::new(10, 0, 0, 2))
    );
}

#[tokio::test]
async fn test_udp_cname_chain_in_answer() {
    let server = start_server(ZONE_YAML).await;
    let response = udp_query(server.udp_addr, &make_query("www.camp.local", RecordType::A))
        .await
        .unwrap();

    assert_eq!(response.answers().len(), 2);
    assert_eq!(response.answers()[0].rtype, RecordType::CNAME);
    assert_eq!(
        response.answers()[1].rdata.as_a(),
        Some(Ipv4Addr::new(10, 0, 0, 5))
    );
}

#[tokio::test]
async fn test_udp_empty_answer_for_known_name() {
    let server = start_server(ZONE_YAML).await;
    let response = udp_query(
        server.udp_addr,
        &make_query("pages.camp.local", RecordType::AAAA),
    )
    .await
    .unwrap();

    assert_eq!(response.rcode(), ResponseCode::NoError);
    assert!(response.answers().is_empty());
}

#[tokio::test]
async fn test_udp_nxdomain() {
    let server = start_server(ZONE_YAML).await;
    let response = udp_query(
        server.udp_addr,
        &make_query("missing.camp.local", RecordType::A),
    )
    .await
    .unwrap();

    assert_eq!(response.rcode(), ResponseCode::NXDomain);
    assert!(response.flags().contains(Flags::AA));
}

#[tokio::test]
async fn test_forwarding_and_cache() {
    let server = start_server(ZONE_YAML).await;
    let question = make_query("outside.example.com", RecordType::A);

    let first = udp_query(server.udp_addr, &question).await.unwrap();
    assert_eq!(first.rcode(), ResponseCode::NoError);
    assert!(!first.flags().contains(Flags::AA));
    assert_eq!(
        first.answers()[0].rdata.as_a(),
        Some(Ipv4Addr::new(203, 0, 113, 10))
    );

    // A repeat of the same question is served from cache.
    let second = udp_query(server.udp_addr, &question).await.unwrap();
    assert_eq!(second.answers().len(), 1);
    assert_eq!(server.upstream_hits.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_malformed_query_gets_formerr() {
    let server = start_server(ZONE_YAML).await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    // A valid ID followed by a header that lies about its counts.
    let mut garbage = vec![0u8; 12];
    garbage[0] = 0xAB;
    garbage[1] = 0xCD;
    garbage[5] = 7; // qd_count = 7, no question bytes follow
    socket.send_to(&garbage, server.udp_addr).await.unwrap();

    let mut buf = vec![0u8; 512];
    let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let response = Message::parse(&buf[..len]).unwrap();

    assert_eq!(response.id(), 0xABCD);
    assert_eq!(response.rcode(), ResponseCode::FormErr);
}

#[tokio::test]
async fn test_single_byte_datagram_is_dropped() {
    let server = start_server(ZONE_YAML).await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&[0x00], server.udp_addr).await.unwrap();

    let mut buf = vec![0u8; 512];
    let result = timeout(Duration::from_millis(300), socket.recv_from(&mut buf)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_tcp_query() {
    let server = start_server(ZONE_YAML).await;
    let response = tcp_query(server.tcp_addr, &make_query("pages.camp.local", RecordType::A))
        .await
        .unwrap();
    assert_eq!(response.rcode(), ResponseCode::NoError);
    assert_eq!(response.answers().len(), 1);
}

#[tokio::test]
async fn test_oversized_answer_truncated_on_udp_full_on_tcp() {
    let mut yaml = String::from(
        "zones:\n  - suffix: camp.local\n    ttl: 60\n    records:\n",
    );
    for i in 0..12 {
        yaml.push_str(&format!(
            "      - {{ name: big, type: TXT, value: \"{}\" }}\n",
            format!("chunk-{i}-").repeat(8)
        ));
    }
    let server = start_server(&yaml).await;
    let query = make_query("big.camp.local", RecordType::TXT);

    let udp_response = udp_query(server.udp_addr, &query).await.unwrap();
    assert!(udp_response.flags().contains(Flags::TC));
    assert!(udp_response.wire_size() <= 512);
    assert!(udp_response.answers().len() < 12);

    let tcp_response = tcp_query(server.tcp_addr, &query).await.unwrap();
    assert!(!tcp_response.flags().contains(Flags::TC));
    assert_eq!(tcp_response.answers().len(), 12);
}

#[tokio::test]
async fn test_concurrent_queries() {
    let server = start_server(ZONE_YAML).await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let addr = server.udp_addr;
        tasks.push(tokio::spawn(async move {
            udp_query(addr, &make_query("pages.camp.local", RecordType::A)).await
        }));
    }

    for task in tasks {
        let response = task.await.unwrap().unwrap();
        assert_eq!(response.rcode(), ResponseCode::NoError);
        assert_eq!(response.answers().len(), 1);
    }
}

#[tokio::test]
async fn test_zone_swap_changes_answers() {
    let server = start_server(ZONE_YAML).await;

    let replacement = Config::from_yaml(
        r#"
zones:
  - suffix: camp.local
    records:
      - { name: pages, type: A, value: 10.0.0.99 }
"#,
    )
    .unwrap();
    server
        .zone
        .swap(ZoneTable::from_config(&replacement).unwrap());

    let response = udp_query(server.udp_addr, &make_query("pages.camp.local", RecordType::A))
        .await
        .unwrap();
    assert_eq!(
        response.answers()[0].rdata.as_a(),
        Some(Ipv4Addr::new(10, 0, 0, 99))
    );
}

#[tokio::test]
async fn test_dead_upstream_servfail() {
    let config = Config::from_yaml(ZONE_YAML).unwrap();
    let zone = Arc::new(SharedZone::new(ZoneTable::from_config(&config).unwrap()));
    let forwarder = Arc::new(Forwarder::new(
        ForwardConfig {
            upstream: "127.0.0.1:1".parse().unwrap(),
            timeout: Duration::from_millis(100),
            retries: 0,
        },
        Arc::new(ForwardCache::new(CacheConfig::default())),
    ));
    let handler = Arc::new(CampionHandler::new(
        zone,
        Arc::new(SharedBlocklist::new(Blocklist::default())),
        forwarder,
    ));
    let udp = UdpServer::bind("127.0.0.1:0".parse().unwrap(), handler)
        .await
        .unwrap();
    let addr = udp.local_addr();
    let (shutdown, _) = broadcast::channel(1);
    let rx = shutdown.subscribe();
    tokio::spawn(async move { udp.run(rx).await });

    let response = udp_query(addr, &make_query("outside.example.com", RecordType::A))
        .await
        .unwrap();
    assert_eq!(response.rcode(), ResponseCode::ServFail);
}

#[tokio::test]
async fn test_cache_expiry_triggers_single_refresh() {
    // Clamp cached lifetimes to 300ms so the upstream's 90s TTL does
    // not keep the entry alive across the test.
    let server = start_server_with(
        ZONE_YAML,
        CacheConfig {
            min_ttl: Duration::ZERO,
            max_ttl: Duration::from_millis(300),
            max_entries: 100,
        },
        Blocklist::default(),
    )
    .await;
    let query = make_query("outside.example.com", RecordType::A);

    udp_query(server.udp_addr, &query).await.unwrap();
    udp_query(server.udp_addr, &query).await.unwrap();
    assert_eq!(server.upstream_hits.load(Ordering::Relaxed), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;

    // The entry has expired; the next query refreshes it once and the
    // one after is served from cache again.
    udp_query(server.udp_addr, &query).await.unwrap();
    assert_eq!(server.upstream_hits.load(Ordering::Relaxed), 2);
    udp_query(server.udp_addr, &query).await.unwrap();
    assert_eq!(server.upstream_hits.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn test_banned_name_redirected() {
    let dir = std::env::temp_dir().join("campion-integration-test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("banned-{}.txt", std::process::id()));
    std::fs::write(&path, "# blocked for camp\ntracker.example\n").unwrap();

    let blocklist = Blocklist::from_config(&BannedSection {
        lists: vec![path.to_string_lossy().into_owned()],
        ip: "10.0.0.9".parse().unwrap(),
        ttl: 30,
        ..BannedSection::default()
    })
    .unwrap();
    let server = start_server_with(ZONE_YAML, CacheConfig::default(), blocklist).await;

    let response = udp_query(
        server.udp_addr,
        &make_query("ads.tracker.example", RecordType::A),
    )
    .await
    .unwrap();

    assert_eq!(response.rcode(), ResponseCode::NoError);
    assert_eq!(response.answers().len(), 1);
    assert_eq!(
        response.answers()[0].rdata.as_a(),
        Some("10.0.0.9".parse().unwrap())
    );
    // The blocklist answered; nothing went upstream.
    assert_eq!(server.upstream_hits.load(Ordering::Relaxed), 0);
}
