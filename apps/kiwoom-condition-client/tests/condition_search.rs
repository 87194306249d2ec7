//! Condition Search Integration Tests
//!
//! Drives the client against the in-process mock gateway: login, keepalive
//! echo, request shapes, response correlation, deadlines and pagination.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use common::{MockGateway, Reply, list_response, row, search_response, trnm};
use kiwoom_condition_client::infrastructure::kiwoom::Session;
use kiwoom_condition_client::{
    AccessToken, ConditionSearchClient, ConditionSearchError, ConditionSweep, ExchangeScope,
    GatewayConfig, ModeTally, ResponseWait, SearchMode, SessionState, SweepOptions, SweepStatus,
};

fn answer_list(frame: &serde_json::Value) -> Vec<Reply> {
    match trnm(frame) {
        "CNSRLST" => vec![Reply::Send(list_response(&[
            ("0", "거래량 급증"),
            ("3", "신고가 돌파"),
        ]))],
        _ => Vec::new(),
    }
}

// =============================================================================
// Login and Keepalive
// =============================================================================

#[tokio::test]
async fn login_precedes_every_request() {
    let gateway = MockGateway::start(answer_list).await;
    let client = ConditionSearchClient::new(gateway.config());

    let conditions = client.list_conditions().await.unwrap();
    assert_eq!(conditions.len(), 2);
    assert_eq!(conditions[0].id, "0");
    assert_eq!(conditions[1].name, "신고가 돌파");

    let received = gateway.received();
    let first: serde_json::Value = serde_json::from_str(&received[0]).unwrap();
    assert_eq!(first, json!({"trnm": "LOGIN", "token": common::TEST_TOKEN}));
    let second: serde_json::Value = serde_json::from_str(&received[1]).unwrap();
    assert_eq!(second, json!({"trnm": "CNSRLST"}));
    assert_eq!(gateway.connections(), 1);
}

#[tokio::test]
async fn rejected_login_is_authentication_error() {
    let gateway = MockGateway::start(answer_list).await;
    let mut config = gateway.config();
    config.session.token = AccessToken::new("expired-token").unwrap();
    let client = ConditionSearchClient::new(config);

    let err = client.list_conditions().await.unwrap_err();
    assert!(matches!(
        err,
        ConditionSearchError::Authentication { code: 8005, .. }
    ));
    assert!(!err.is_retryable());
    assert!(gateway.received_with("CNSRLST").is_empty());
}

#[tokio::test]
async fn keepalive_echoed_verbatim() {
    let ping = json!({"trnm": "PING", "ts": "20250102093000"});
    let gateway = MockGateway::start_with_greeting(vec![ping.clone()], |_| Vec::new()).await;

    let session = Session::open(&gateway.config().session).await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);

    let echo = gateway
        .wait_for("PING", Duration::from_secs(2))
        .await
        .expect("keepalive echo");
    assert_eq!(echo, ping);
    assert!(gateway.received().contains(&ping.to_string()));

    let counted = tokio::time::timeout(Duration::from_secs(2), async {
        while session.keepalive().echoed() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(counted.is_ok(), "echo never counted");

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
    let keepalive = session.keepalive().snapshot();
    assert_eq!(keepalive.received, 1);
    assert_eq!(keepalive.echoed, 1);
    assert_eq!(keepalive.unanswered(), 0);
    assert!(keepalive.since_keepalive.is_some());
}

#[tokio::test]
async fn keepalive_before_login_ack_is_echoed() {
    let ping = json!({"trnm": "PING", "ts": "20250102085959"});
    let gateway = MockGateway::start_scripted(vec![ping.clone()], Vec::new(), answer_list).await;
    let client = ConditionSearchClient::new(gateway.config());

    let conditions = client.list_conditions().await.unwrap();
    assert_eq!(conditions.len(), 2);

    let echo = gateway.wait_for("PING", Duration::from_secs(2)).await;
    assert_eq!(echo, Some(ping));
    let tags: Vec<String> = gateway
        .received()
        .iter()
        .filter_map(|text| serde_json::from_str::<serde_json::Value>(text).ok())
        .map(|frame| trnm(&frame).to_string())
        .collect();
    assert_eq!(tags[0], "LOGIN");
    assert!(tags.contains(&"CNSRLST".to_string()));
}

#[tokio::test]
async fn keepalive_does_not_disturb_pending_search() {
    let gateway = MockGateway::start(|frame| match trnm(frame) {
        "CNSRREQ" => vec![
            Reply::Send(json!({"trnm": "PING"})),
            Reply::After(
                Duration::from_millis(100),
                search_response("3", vec![row("A000660", "SK하이닉스", "+120000")], ""),
            ),
        ],
        _ => Vec::new(),
    })
    .await;
    let client = ConditionSearchClient::new(gateway.config());

    let page = client
        .search("3", SearchMode::General, ExchangeScope::All, None)
        .await
        .unwrap();
    assert_eq!(page.matches[0].instrument_code, "000660");
    let echo = gateway.wait_for("PING", Duration::from_secs(2)).await;
    assert_eq!(echo, Some(json!({"trnm": "PING"})));
}

// =============================================================================
// Request Shapes
// =============================================================================

#[tokio::test]
async fn general_and_realtime_frames_differ() {
    let gateway = MockGateway::start(|frame| match trnm(frame) {
        "CNSRREQ" => vec![Reply::Send(search_response("3", Vec::new(), ""))],
        _ => Vec::new(),
    })
    .await;
    let client = ConditionSearchClient::new(gateway.config());

    client
        .search("3", SearchMode::General, ExchangeScope::Kospi, None)
        .await
        .unwrap();
    client
        .search("3", SearchMode::Realtime, ExchangeScope::Kospi, None)
        .await
        .unwrap();

    let requests = gateway.received_with("CNSRREQ");
    assert_eq!(
        requests[0],
        json!({
            "trnm": "CNSRREQ",
            "seq": "3",
            "search_type": "0",
            "stex_tp": "K",
            "cont_yn": "N",
            "next_key": "",
        })
    );
    assert_eq!(
        requests[1],
        json!({"trnm": "CNSRREQ", "seq": "3", "search_type": "1"})
    );
    assert_eq!(gateway.connections(), 2);
}

// =============================================================================
// Responses
// =============================================================================

#[tokio::test]
async fn delayed_search_response_is_collected() {
    let gateway = MockGateway::start(|frame| match trnm(frame) {
        "CNSRREQ" => vec![Reply::After(
            Duration::from_secs(2),
            search_response("3", vec![row("A005930", "삼성전자", "+70000")], ""),
        )],
        _ => Vec::new(),
    })
    .await;
    let client = ConditionSearchClient::new(gateway.config());

    let started = Instant::now();
    let page = client
        .search("3", SearchMode::General, ExchangeScope::All, None)
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(page.condition_id, "3");
    assert_eq!(page.len(), 1);
    let matched = &page.matches[0];
    assert_eq!(matched.instrument_code, "005930");
    assert_eq!(matched.instrument_name, "삼성전자");
    assert_eq!(matched.last_price, 70000.0);
    assert_eq!(matched.status, "2");
    assert!(!page.more_available);
}

#[tokio::test]
async fn responses_for_other_conditions_are_not_taken() {
    let gateway = MockGateway::start(|frame| match trnm(frame) {
        "CNSRREQ" => vec![
            Reply::Send(search_response("7", vec![row("A035420", "NAVER", "200000")], "")),
            Reply::Send(json!({
                "trnm": "CNSRREQ",
                "seq": 3,
                "return_code": 0,
                "data": [row("A005930", "삼성전자", "-69900")],
            })),
        ],
        _ => Vec::new(),
    })
    .await;
    let client = ConditionSearchClient::new(gateway.config());

    let page = client
        .search("3", SearchMode::Realtime, ExchangeScope::All, None)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page.matches[0].instrument_code, "005930");
    assert_eq!(page.matches[0].last_price, 69900.0);
}

#[tokio::test]
async fn every_row_of_a_response_becomes_a_match() {
    let gateway = MockGateway::start(|frame| match trnm(frame) {
        "CNSRREQ" => vec![Reply::Send(search_response(
            "3",
            vec![
                row("A000001", "first", "+1"),
                row("Q000002", "second", "--"),
                row("000003", "third", "-3"),
                row("J000004", "fourth", "1,250"),
            ],
            "",
        ))],
        _ => Vec::new(),
    })
    .await;
    let client = ConditionSearchClient::new(gateway.config());

    let page = client
        .search("3", SearchMode::General, ExchangeScope::All, None)
        .await
        .unwrap();

    assert_eq!(page.len(), 4);
    let summary: Vec<(&str, f64)> = page
        .matches
        .iter()
        .map(|m| (m.instrument_code.as_str(), m.last_price))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("000001", 1.0),
            ("000002", 0.0),
            ("000003", 3.0),
            ("000004", 1250.0),
        ]
    );
}

#[tokio::test]
async fn empty_result_is_success() {
    let gateway = MockGateway::start(|frame| match trnm(frame) {
        "CNSRREQ" => vec![Reply::Send(json!({
            "trnm": "CNSRREQ",
            "seq": "3",
            "return_code": 0,
            "data": null,
        }))],
        _ => Vec::new(),
    })
    .await;
    let client = ConditionSearchClient::new(gateway.config());

    let page = client
        .search("3", SearchMode::General, ExchangeScope::All, None)
        .await
        .unwrap();
    assert!(page.is_empty());
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn rejected_list_is_protocol_error() {
    let gateway = MockGateway::start(|frame| match trnm(frame) {
        "CNSRLST" => vec![Reply::Send(json!({
            "trnm": "CNSRLST",
            "return_code": 1,
            "return_msg": "조건검색 조회 실패",
        }))],
        _ => Vec::new(),
    })
    .await;
    let client = ConditionSearchClient::new(gateway.config());

    let err = client.list_conditions().await.unwrap_err();
    match err {
        ConditionSearchError::Protocol { code, message, .. } => {
            assert_eq!(code, 1);
            assert_eq!(message, "조건검색 조회 실패");
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_response_is_codec_error() {
    let gateway = MockGateway::start(|frame| match trnm(frame) {
        "CNSRLST" => vec![Reply::Send(json!({
            "trnm": "CNSRLST",
            "return_code": 0,
            "data": "not-a-list",
        }))],
        _ => Vec::new(),
    })
    .await;
    let client = ConditionSearchClient::new(gateway.config());

    let err = client.list_conditions().await.unwrap_err();
    assert!(matches!(err, ConditionSearchError::Codec(_)));
}

// =============================================================================
// Deadlines and Closure
// =============================================================================

#[tokio::test]
async fn unanswered_search_times_out() {
    let gateway = MockGateway::start(|_| Vec::new()).await;
    let mut config = gateway.config();
    config.general_timeout = Duration::from_millis(300);
    let client = ConditionSearchClient::new(config);

    let started = Instant::now();
    let err = client
        .search("3", SearchMode::General, ExchangeScope::All, None)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout());
    assert!(err.is_retryable());
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
}

#[tokio::test]
async fn unanswered_login_times_out() {
    let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = silent.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = silent.accept().await.unwrap();
        let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let mut config = GatewayConfig::new(
        format!("ws://{addr}"),
        AccessToken::new(common::TEST_TOKEN).unwrap(),
    );
    config.session.login_timeout = Duration::from_millis(200);
    let client = ConditionSearchClient::new(config);

    let err = client.list_conditions().await.unwrap_err();
    assert!(matches!(err, ConditionSearchError::Timeout { .. }));
    server.abort();
}

#[tokio::test]
async fn gateway_close_ends_wait_early() {
    let gateway = MockGateway::start(|frame| match trnm(frame) {
        "CNSRREQ" => vec![Reply::Close],
        _ => Vec::new(),
    })
    .await;
    let client = ConditionSearchClient::new(gateway.config());

    let started = Instant::now();
    let err = client
        .search("3", SearchMode::Realtime, ExchangeScope::All, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ConditionSearchError::Closed));
    assert!(err.is_retryable());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn undecodable_frame_ends_wait_early() {
    let gateway = MockGateway::start(|frame| match trnm(frame) {
        "CNSRREQ" => vec![Reply::Raw("not json".to_string())],
        _ => Vec::new(),
    })
    .await;
    let client = ConditionSearchClient::new(gateway.config());

    let started = Instant::now();
    let err = client
        .search("3", SearchMode::General, ExchangeScope::All, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ConditionSearchError::Closed), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn search_response_without_seq_is_dropped() {
    let gateway = MockGateway::start(|frame| match trnm(frame) {
        "CNSRREQ" => vec![Reply::Send(json!({
            "trnm": "CNSRREQ",
            "return_code": 0,
            "data": [],
        }))],
        _ => Vec::new(),
    })
    .await;
    let mut config = gateway.config();
    config.general_timeout = Duration::from_millis(300);
    let client = ConditionSearchClient::new(config);

    let err = client
        .search("3", SearchMode::General, ExchangeScope::All, None)
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");
}

#[tokio::test]
async fn poll_wait_strategy_collects_response() {
    let gateway = MockGateway::start(|frame| match trnm(frame) {
        "CNSRREQ" => vec![Reply::After(
            Duration::from_millis(150),
            search_response("5", vec![row("A005930", "삼성전자", "70000")], ""),
        )],
        _ => Vec::new(),
    })
    .await;
    let mut config = gateway.config();
    config.wait = ResponseWait::Poll {
        interval: Duration::from_millis(20),
    };
    let client = ConditionSearchClient::new(config);

    let page = client
        .search("5", SearchMode::General, ExchangeScope::All, None)
        .await
        .unwrap();
    assert_eq!(page.matches[0].instrument_name, "삼성전자");
}

// =============================================================================
// Pagination and Realtime Clear
// =============================================================================

fn paged(frame: &serde_json::Value) -> Vec<Reply> {
    if trnm(frame) != "CNSRREQ" {
        return Vec::new();
    }
    match frame["next_key"].as_str() {
        Some("") => vec![Reply::Send(search_response(
            "3",
            vec![row("A005930", "삼성전자", "70000")],
            "page-2",
        ))],
        Some("page-2") => vec![Reply::Send(search_response(
            "3",
            vec![row("A000660", "SK하이닉스", "120000")],
            "",
        ))],
        _ => Vec::new(),
    }
}

#[tokio::test]
async fn pages_are_followed_until_exhausted() {
    let gateway = MockGateway::start(paged).await;
    let client = ConditionSearchClient::new(gateway.config());

    let page = client
        .search_all_pages("3", ExchangeScope::All, 5)
        .await
        .unwrap();

    assert_eq!(page.len(), 2);
    assert_eq!(page.matches[1].instrument_code, "000660");
    assert!(!page.more_available);
    assert!(page.next_cursor.is_none());
    assert_eq!(gateway.connections(), 2);

    let requests = gateway.received_with("CNSRREQ");
    assert_eq!(requests[1]["cont_yn"], "Y");
    assert_eq!(requests[1]["next_key"], "page-2");
}

#[tokio::test]
async fn page_limit_keeps_cursor() {
    let gateway = MockGateway::start(paged).await;
    let client = ConditionSearchClient::new(gateway.config());

    let page = client
        .search_all_pages("3", ExchangeScope::All, 1)
        .await
        .unwrap();

    assert_eq!(page.len(), 1);
    assert!(page.more_available);
    assert_eq!(page.continuation(), Some("page-2"));
    assert_eq!(gateway.connections(), 1);
}

#[tokio::test]
async fn realtime_clear_acknowledged() {
    let gateway = MockGateway::start(|frame| match (trnm(frame), frame["seq"].as_str()) {
        ("CNSRCLR", Some("3")) => vec![Reply::Send(
            json!({"trnm": "CNSRCLR", "return_code": 0, "return_msg": ""}),
        )],
        ("CNSRCLR", _) => vec![Reply::Send(
            json!({"trnm": "CNSRCLR", "return_code": 100, "return_msg": "unknown seq"}),
        )],
        _ => Vec::new(),
    })
    .await;
    let client = ConditionSearchClient::new(gateway.config());

    client.clear_realtime("3").await.unwrap();
    assert_eq!(
        gateway.received_with("CNSRCLR")[0],
        json!({"trnm": "CNSRCLR", "seq": "3"})
    );

    let err = client.clear_realtime("9").await.unwrap_err();
    assert!(matches!(
        err,
        ConditionSearchError::Protocol { code: 100, .. }
    ));
}

// =============================================================================
// Sweep
// =============================================================================

#[tokio::test]
async fn sweep_over_live_client() {
    let gateway = MockGateway::start(|frame| match (trnm(frame), frame["seq"].as_str()) {
        ("CNSRLST", _) => vec![Reply::Send(list_response(&[
            ("0", "거래량 급증"),
            ("3", "신고가 돌파"),
        ]))],
        ("CNSRREQ", Some("0")) => vec![Reply::Send(search_response(
            "0",
            vec![row("A005930", "삼성전자", "70000")],
            "",
        ))],
        ("CNSRREQ", Some("3")) if frame["search_type"] == "0" => vec![Reply::Send(json!({
            "trnm": "CNSRREQ",
            "seq": "3",
            "return_code": 1,
            "return_msg": "condition unavailable",
        }))],
        _ => Vec::new(),
    })
    .await;
    let mut config = gateway.config();
    config.realtime_timeout = Duration::from_millis(200);
    let client = Arc::new(ConditionSearchClient::new(config));

    let report = ConditionSweep::new(client, SweepOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(report.conditions.len(), 2);
    assert_eq!(
        report.tally(SearchMode::General),
        ModeTally {
            success: 1,
            failed: 1,
            timeout: 0
        }
    );
    assert_eq!(
        report.tally(SearchMode::Realtime),
        ModeTally {
            success: 1,
            failed: 0,
            timeout: 1
        }
    );
    assert_eq!(report.entries[0].status, SweepStatus::Success { matches: 1 });
}
