//! Integration tests for `WatchlistClient` against the in-process feed.
//!
//! Each test drives a real client task through a `MemoryConnector`, playing
//! the server side with `MemoryFeed` / `MemoryPeer`.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::timeout;

use quantpulse::prelude::*;
use quantpulse::ws::transport::CloseInfo;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const AAPL_UPDATE: &str = r#"{
    "type": "update",
    "data": {
        "AAPL": [
            {"Date": "2024-01-01", "Open": 100.0, "High": 106.0, "Low": 99.0, "Close": 105.0, "Volume": 1000}
        ]
    }
}"#;

fn test_config() -> WsConfig {
    WsConfig {
        url: "mem://feed".into(),
        backoff: BackoffConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: false,
        },
        idle_timeout: None,
        ..Default::default()
    }
}

fn client_with(config: WsConfig) -> (WatchlistClient, MemoryFeed) {
    let (connector, feed) = MemoryConnector::pair();
    (WatchlistClient::with_connector(config, connector), feed)
}

fn names(tickers: &[Ticker]) -> Vec<&str> {
    tickers.iter().map(Ticker::as_str).collect()
}

async fn accept(feed: &mut MemoryFeed) -> MemoryPeer {
    timeout(TEST_TIMEOUT, feed.accept())
        .await
        .expect("timed out waiting for a connection")
        .expect("connector dropped")
}

async fn subscription(peer: &mut MemoryPeer) -> MessageOut {
    timeout(TEST_TIMEOUT, peer.recv_subscription())
        .await
        .expect("timed out waiting for a subscription")
        .expect("client closed the connection")
}

/// Wait for the next event that matches the predicate, ignoring others.
/// The events stream is created and dropped within this call.
async fn next_matching(
    client: &WatchlistClient,
    predicate: impl Fn(&WatchEvent) -> bool,
) -> WatchEvent {
    let events = client.events();
    tokio::pin!(events);

    timeout(TEST_TIMEOUT, async {
        while let Some(ev) = events.next().await {
            if predicate(&ev) {
                return ev;
            }
        }
        panic!("event stream ended without a matching event");
    })
    .await
    .expect("timed out waiting for matching event")
}

/// Connect, accept the connection and consume the initial subscription.
async fn connected(
    tickers: &[&str],
    config: WsConfig,
) -> (WatchlistClient, MemoryFeed, MemoryPeer) {
    let (mut client, mut feed) = client_with(config);
    client.set_tickers(tickers);
    client.connect().expect("connect should start");
    let mut peer = accept(&mut feed).await;
    subscription(&mut peer).await;
    next_matching(&client, |ev| {
        matches!(ev, WatchEvent::State(ConnectionState::Connected))
    })
    .await;
    (client, feed, peer)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_subscribe_and_receive_history() {
    let (mut client, mut feed) = client_with(test_config());
    client.set_tickers(["aapl", "GOOGL", " aapl "]);
    client.connect().unwrap();

    let mut peer = accept(&mut feed).await;
    assert_eq!(peer.url, "mem://feed");
    let sub = subscription(&mut peer).await;
    assert_eq!(names(&sub.tickers), vec!["AAPL", "GOOGL"]);
    assert_eq!(sub.period, Period::Month1);

    peer.send_text(AAPL_UPDATE).unwrap();
    let ev = next_matching(&client, |ev| matches!(ev, WatchEvent::HistoryUpdated(_))).await;
    assert_eq!(ev, WatchEvent::HistoryUpdated(vec![Ticker::parse("AAPL").unwrap()]));

    let bar = client.latest("AAPL").expect("AAPL bar");
    assert_eq!(bar.close, 105.0);
    assert_eq!(bar.volume, 1000);
    assert_eq!(bar.gain().unwrap().to_string(), "+5.00%");
    assert!(client.latest("GOOGL").is_none());
    assert!(client.is_connected());

    client.shutdown().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_updates_replace_series() {
    let (client, _feed, peer) = connected(&["AAPL"], test_config()).await;
    let aapl = Ticker::parse("AAPL").unwrap();

    let bar = |day: u32, close: f64| PriceBar {
        date: format!("2024-01-{day:02}"),
        open: 100.0,
        high: close.max(100.0),
        low: close.min(100.0),
        close,
        volume: 10,
        sma: Vec::new(),
        rsi: Vec::new(),
    };

    peer.send_update(&[(aapl.clone(), vec![bar(1, 101.0), bar(2, 102.0), bar(3, 103.0)])])
        .unwrap();
    next_matching(&client, |ev| matches!(ev, WatchEvent::HistoryUpdated(_))).await;
    assert_eq!(client.series("AAPL").unwrap().len(), 3);

    peer.send_update(&[(aapl, vec![bar(4, 99.0)])]).unwrap();
    next_matching(&client, |ev| matches!(ev, WatchEvent::HistoryUpdated(_))).await;
    let series = client.series("aapl").unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].date, "2024-01-04");
    assert!(!client.gain("AAPL", GainPeriod::Daily).unwrap().is_positive());
}

#[tokio::test]
async fn test_add_ticker_resubscribes_full_set() {
    let (client, _feed, mut peer) = connected(&["AAPL", "GOOGL"], test_config()).await;

    let change = client.add_ticker("tsla");
    assert!(change.changed);

    let sub = subscription(&mut peer).await;
    assert_eq!(names(&sub.tickers), vec!["AAPL", "GOOGL", "TSLA"]);
}

#[tokio::test]
async fn test_set_same_tickers_resends_subscription() {
    let (client, _feed, mut peer) = connected(&["AAPL"], test_config()).await;

    let change = client.set_tickers([" aapl"]);
    assert!(!change.changed);

    let sub = subscription(&mut peer).await;
    assert_eq!(names(&sub.tickers), vec!["AAPL"]);
}

#[tokio::test]
async fn test_add_existing_ticker_sends_nothing() {
    let (client, _feed, mut peer) = connected(&["AAPL"], test_config()).await;

    assert!(!client.add_ticker("AAPL").changed);
    assert!(!client.remove_ticker("TSLA").changed);
    assert!(timeout(Duration::from_millis(100), peer.recv()).await.is_err());
}

#[tokio::test]
async fn test_remove_all_sends_empty_subscription() {
    let (client, _feed, mut peer) = connected(&["AAPL"], test_config()).await;

    client.remove_ticker("AAPL");
    let sub = subscription(&mut peer).await;
    assert!(sub.tickers.is_empty());
}

#[tokio::test]
async fn test_set_period_resubscribes() {
    let (client, _feed, mut peer) = connected(&["AAPL"], test_config()).await;

    client.set_period(Period::Year1);
    let sub = subscription(&mut peer).await;
    assert_eq!(sub.period, Period::Year1);
    assert_eq!(names(&sub.tickers), vec!["AAPL"]);
}

#[tokio::test]
async fn test_remove_ticker_evicts_and_ignores_late_bars() {
    let (client, _feed, peer) = connected(&["AAPL", "TSLA"], test_config()).await;

    peer.send_text(
        r#"{"type":"update","data":{"TSLA":[{"Date":"d","Open":1,"High":1,"Low":1,"Close":1,"Volume":1}]}}"#,
    )
    .unwrap();
    next_matching(&client, |ev| matches!(ev, WatchEvent::HistoryUpdated(_))).await;
    assert!(client.latest("TSLA").is_some());

    let change = client.remove_ticker("TSLA");
    assert_eq!(names(&change.evicted), vec!["TSLA"]);
    assert!(client.latest("TSLA").is_none());

    // The feed has not seen the new subscription yet and still sends TSLA.
    peer.send_text(
        r#"{"type":"update","data":{
            "TSLA":[{"Date":"d","Open":1,"High":1,"Low":1,"Close":2,"Volume":1}],
            "AAPL":[{"Date":"d","Open":1,"High":1,"Low":1,"Close":2,"Volume":1}]
        }}"#,
    )
    .unwrap();
    let ev = next_matching(&client, |ev| matches!(ev, WatchEvent::HistoryUpdated(_))).await;
    assert_eq!(ev, WatchEvent::HistoryUpdated(vec![Ticker::parse("AAPL").unwrap()]));
    assert!(client.latest("TSLA").is_none());
    assert!(!client.history().contains_key(&Ticker::parse("TSLA").unwrap()));
}

#[tokio::test]
async fn test_bad_frame_does_not_drop_connection() {
    let (client, _feed, peer) = connected(&["AAPL"], test_config()).await;

    peer.send_text("not json at all").unwrap();
    let ev = next_matching(&client, |ev| matches!(ev, WatchEvent::Diagnostic(_))).await;
    match ev {
        WatchEvent::Diagnostic(msg) => assert!(msg.starts_with("Decode error"), "{msg}"),
        other => panic!("unexpected event {other:?}"),
    }

    peer.send_text(AAPL_UPDATE).unwrap();
    next_matching(&client, |ev| matches!(ev, WatchEvent::HistoryUpdated(_))).await;
    assert!(client.is_connected());
    assert!(client.latest("AAPL").is_some());
}

#[tokio::test]
async fn test_binary_frame_decoded_as_text() {
    let (client, _feed, peer) = connected(&["AAPL"], test_config()).await;

    peer.send_binary(AAPL_UPDATE.as_bytes().to_vec()).unwrap();
    next_matching(&client, |ev| matches!(ev, WatchEvent::HistoryUpdated(_))).await;
    assert_eq!(client.latest("AAPL").unwrap().close, 105.0);
}

#[tokio::test]
async fn test_ping_answered_with_pong() {
    let (_client, _feed, mut peer) = connected(&["AAPL"], test_config()).await;

    peer.send(Frame::Ping(b"hb".to_vec())).unwrap();
    let frame = timeout(TEST_TIMEOUT, peer.recv()).await.unwrap();
    assert_eq!(frame, Some(Frame::Pong(b"hb".to_vec())));
}

#[tokio::test]
async fn test_reconnect_sends_current_set() {
    let (client, mut feed, peer) = connected(&["AAPL"], test_config()).await;

    drop(peer);
    client.set_tickers(["MSFT", "NVDA"]);

    next_matching(&client, |ev| {
        matches!(ev, WatchEvent::State(ConnectionState::Reconnecting))
    })
    .await;

    let mut peer = accept(&mut feed).await;
    let sub = subscription(&mut peer).await;
    assert_eq!(names(&sub.tickers), vec!["MSFT", "NVDA"]);
    next_matching(&client, |ev| {
        matches!(ev, WatchEvent::State(ConnectionState::Connected))
    })
    .await;
}

#[tokio::test]
async fn test_transport_error_triggers_reconnect() {
    let (client, mut feed, peer) = connected(&["AAPL"], test_config()).await;

    peer.fail(WsError::ConnectionFailed("reset by peer".into())).unwrap();
    let mut peer = accept(&mut feed).await;
    let sub = subscription(&mut peer).await;
    assert_eq!(names(&sub.tickers), vec!["AAPL"]);
    assert!(client.tickers().len() == 1);
}

#[tokio::test]
async fn test_idle_timeout_reconnects() {
    let config = WsConfig {
        idle_timeout: Some(Duration::from_millis(50)),
        ..test_config()
    };
    let (client, mut feed, _quiet_peer) = connected(&["AAPL"], config).await;

    next_matching(&client, |ev| {
        matches!(ev, WatchEvent::State(ConnectionState::Reconnecting))
    })
    .await;
    let mut peer = accept(&mut feed).await;
    subscription(&mut peer).await;
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let (mut client, mut feed) = client_with(test_config());
    feed.refuse_next(100);
    client.set_tickers(["AAPL"]);
    client.connect().unwrap();

    let ev = next_matching(&client, |ev| matches!(ev, WatchEvent::GaveUp { .. })).await;
    assert_eq!(ev, WatchEvent::GaveUp { attempts: 3 });
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // A fresh connect starts a new task once the old one gave up.
    feed.refuse_next(0);
    client.connect().unwrap();
    let mut peer = accept(&mut feed).await;
    assert_eq!(names(&subscription(&mut peer).await.tickers), vec!["AAPL"]);
}

#[tokio::test]
async fn test_gives_up_when_feed_drops_every_connection() {
    let (mut client, mut feed) = client_with(test_config());
    client.set_tickers(["AAPL"]);
    client.connect().unwrap();

    // Accept each connection and hang up before sending anything.
    let acceptor = tokio::spawn(async move {
        let mut accepted = 0u32;
        while let Some(peer) = feed.accept().await {
            accepted += 1;
            drop(peer);
        }
        accepted
    });

    let ev = next_matching(&client, |ev| matches!(ev, WatchEvent::GaveUp { .. })).await;
    assert_eq!(ev, WatchEvent::GaveUp { attempts: 3 });
    assert_eq!(client.state(), ConnectionState::Disconnected);

    drop(client);
    assert_eq!(acceptor.await.unwrap(), 4);
}

#[tokio::test]
async fn test_frame_resets_backoff() {
    let (client, mut feed, mut peer) = connected(&["AAPL"], test_config()).await;

    // Each healthy connection uses one retry and then resets the count.
    for _ in 0..3 {
        peer.send_text(AAPL_UPDATE).unwrap();
        next_matching(&client, |ev| matches!(ev, WatchEvent::HistoryUpdated(_))).await;
        drop(peer);
        peer = accept(&mut feed).await;
        subscription(&mut peer).await;
    }
    peer.send_text(AAPL_UPDATE).unwrap();
    next_matching(&client, |ev| matches!(ev, WatchEvent::HistoryUpdated(_))).await;
    drop(peer);

    let mut peer = accept(&mut feed).await;
    subscription(&mut peer).await;
}

#[tokio::test]
async fn test_reconnect_disabled() {
    let config = WsConfig {
        reconnect: false,
        ..test_config()
    };
    let (client, mut feed, peer) = connected(&["AAPL"], config).await;

    peer.close(1011, "server error").unwrap();
    next_matching(&client, |ev| {
        matches!(ev, WatchEvent::State(ConnectionState::Disconnected))
    })
    .await;
    assert!(timeout(Duration::from_millis(100), feed.accept()).await.is_err());
}

#[tokio::test]
async fn test_normal_close_from_feed_stops() {
    let (client, mut feed, peer) = connected(&["AAPL"], test_config()).await;

    peer.close(1000, "bye").unwrap();
    next_matching(&client, |ev| {
        matches!(ev, WatchEvent::State(ConnectionState::Disconnected))
    })
    .await;
    assert!(timeout(Duration::from_millis(100), feed.accept()).await.is_err());
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (mut client, mut feed, mut peer) = connected(&["AAPL"], test_config()).await;

    client.disconnect();
    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let frame = timeout(TEST_TIMEOUT, peer.recv()).await.unwrap();
    assert_eq!(
        frame,
        Some(Frame::Close(Some(CloseInfo::normal("Client disconnect"))))
    );

    // No reconnect after a user disconnect.
    assert!(timeout(Duration::from_millis(100), feed.accept()).await.is_err());

    // Local state survives and is sent again on the next connect.
    client.connect().unwrap();
    let mut peer = accept(&mut feed).await;
    assert_eq!(names(&subscription(&mut peer).await.tickers), vec!["AAPL"]);
}

#[tokio::test]
async fn test_connect_twice_opens_one_connection() {
    let (mut client, mut feed) = client_with(test_config());
    client.connect().unwrap();
    client.connect().unwrap();

    accept(&mut feed).await;
    assert!(timeout(Duration::from_millis(100), feed.accept()).await.is_err());
}

#[tokio::test]
async fn test_disconnect_during_backoff() {
    let config = WsConfig {
        backoff: BackoffConfig {
            max_attempts: 10,
            initial_delay: Duration::from_millis(200),
            ..test_config().backoff
        },
        ..test_config()
    };
    let (mut client, feed) = client_with(config);
    feed.refuse_next(100);
    client.connect().unwrap();

    next_matching(&client, |ev| {
        matches!(ev, WatchEvent::State(ConnectionState::Reconnecting))
    })
    .await;
    client.shutdown().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
