//! Terminal Round-Trip Integration Tests
//!
//! Runs the real transport and correlator against a local WebSocket server
//! that plays the terminal.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

use terminal_bridge::domain::catalog;
use terminal_bridge::domain::entry::Source;
use terminal_bridge::domain::payloads::{ArchiveQuery, CandleKind, Interval};
use terminal_bridge::{
    Channel, CorrelationError, CorrelationId, GatewayError, LinkState, RoutingRequest,
    TerminalConnection, TerminalGateway, TerminalPort, TerminalSettings, ToolCatalog,
    TransportError,
};

const STEP: Duration = Duration::from_secs(5);

/// What the fake terminal saw and can send.
struct FakeTerminal {
    endpoint: String,
    requests: mpsc::UnboundedReceiver<Message>,
    replies: mpsc::UnboundedSender<Message>,
}

impl FakeTerminal {
    /// Next text request as JSON.
    async fn next_request(&mut self) -> Value {
        loop {
            match timeout(STEP, self.requests.recv()).await.unwrap() {
                Some(Message::Text(text)) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(_) => {}
                None => panic!("terminal connection ended"),
            }
        }
    }

    fn send_text(&self, text: impl Into<String>) {
        self.replies.send(Message::Text(text.into().into())).unwrap();
    }

    fn respond(&self, id: &str, channel: &str, inner: &Value) {
        self.send_text(response_frame(id, channel, &inner.to_string()));
    }
}

/// Accept one connection and relay frames to and from the test.
async fn fake_terminal() -> FakeTerminal {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (requests_tx, requests) = mpsc::unbounded_channel();
    let (replies, mut replies_rx) = mpsc::unbounded_channel::<Message>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut write, mut read) = socket.split();
        loop {
            tokio::select! {
                incoming = read.next() => match incoming {
                    // Keep polling after a close so the handshake reply goes out.
                    Some(Ok(message)) => {
                        let _ = requests_tx.send(message);
                    }
                    _ => break,
                },
                outgoing = replies_rx.recv() => match outgoing {
                    Some(message) => {
                        let closing = message.is_close();
                        if write.send(message).await.is_err() || closing {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    FakeTerminal {
        endpoint: format!("ws://{addr}"),
        requests,
        replies,
    }
}

fn response_frame(id: &str, channel: &str, inner: &str) -> String {
    json!({
        "Id": id,
        "Command": "response",
        "Channel": channel,
        "Payload": serde_json::to_string(inner).unwrap(),
    })
    .to_string()
}

async fn connect(fake: &FakeTerminal, call_timeout: Duration) -> TerminalConnection {
    let settings = TerminalSettings::new(fake.endpoint.clone(), call_timeout).unwrap();
    TerminalConnection::open(&settings, CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn heartbeat_then_accounts_response() {
    let mut fake = fake_terminal().await;
    let connection = connect(&fake, STEP).await;
    let correlator = connection.correlator();

    let request = RoutingRequest::with_id(
        CorrelationId::new("abc").unwrap(),
        Channel::DataQuery,
        &json!({"Type": "Accounts"}),
    )
    .unwrap();
    let call = tokio::spawn({
        let correlator = Arc::clone(&correlator);
        async move {
            correlator
                .send_and_await(&request, Channel::DataQuery, &CancellationToken::new())
                .await
        }
    });

    let sent = fake.next_request().await;
    assert_eq!(sent["Id"], "abc");
    assert_eq!(sent["Command"], "request");
    assert_eq!(sent["Channel"], "#Data.Query");

    fake.send_text(json!({"heartbeat": true}).to_string());
    fake.send_text(
        r##"{"Id":"abc","Command":"response","Channel":"#Data.Query","Payload":"\"{\\\"Data\\\":[{\\\"IdAccount\\\":7,\\\"IIAType\\\":1}]}\""}"##,
    );

    let payload = timeout(STEP, call).await.unwrap().unwrap().unwrap();
    assert_eq!(payload, r#"{"Data":[{"IdAccount":7,"IIAType":1}]}"#);
    assert_eq!(
        catalog::accounts().run(&payload).unwrap(),
        json!([{"AccountId": 7, "IIAType": 1}])
    );

    connection.close().await;
}

#[tokio::test]
async fn concurrent_calls_through_gateway() {
    let mut fake = fake_terminal().await;
    let connection = connect(&fake, STEP).await;
    let gateway = TerminalGateway::new(connection.correlator());

    let balances = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.balances(7).await }
    });
    let first = fake.next_request().await;

    let query = ArchiveQuery::new(
        42,
        CandleKind::Ohlcv,
        Interval::Day,
        1,
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
    )
    .unwrap();
    let candles = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.candles(query).await }
    });
    let second = fake.next_request().await;
    assert_eq!(second["Channel"], "#Archive.Query");

    // Answer in reverse order, with a stray answer for an unknown id first.
    fake.respond("nobody", "#Data.Query", &json!({"Data": []}));
    fake.respond(
        second["Id"].as_str().unwrap(),
        "#Archive.Query",
        &json!({"OHLCV": [{
            "Open": 1.1, "Close": 1.2, "Low": 1.0, "High": 1.3,
            "Volume": 10, "VolumeAsk": 5, "OpenInt": 0, "DT": "2024-06-01"
        }]}),
    );
    fake.respond(
        first["Id"].as_str().unwrap(),
        "#Data.Query",
        &json!({"Data": [
            {"IdAccount": 7, "IdRazdel": 1, "Currency": "RUB", "Balance": 100.0, "Blocked": 10.0, "Available": 90.0},
            {"IdAccount": 8, "IdRazdel": 2, "Currency": "RUB", "Balance": 5.0, "Blocked": 0.0, "Available": 5.0}
        ]}),
    );

    let candles = timeout(STEP, candles).await.unwrap().unwrap().unwrap();
    assert_eq!(
        candles["candles"][0]["Open"],
        json!({"value": 1.1, "description": "Opening price"})
    );

    let balances = timeout(STEP, balances).await.unwrap().unwrap().unwrap();
    let rows = balances["balances"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["IdAccount"]["value"], 7);
    assert_eq!(rows[0]["Available"]["value"], 90.0);

    connection.close().await;
}

#[tokio::test]
async fn wrong_channel_answer_is_ignored() {
    let mut fake = fake_terminal().await;
    let connection = connect(&fake, STEP).await;
    let correlator = connection.correlator();

    let call = tokio::spawn(async move {
        correlator
            .request(Channel::OrderCancel, json!({"IdAccount": 7, "NumOrder": 99}))
            .await
    });
    let sent = fake.next_request().await;
    let id = sent["Id"].as_str().unwrap();

    fake.respond(id, "#Data.Query", &json!({"wrong": true}));
    fake.respond(id, "#Order.Cancel.Query", &json!({"right": true}));

    let payload = timeout(STEP, call).await.unwrap().unwrap().unwrap();
    assert_eq!(
        serde_json::from_str::<Value>(&payload).unwrap(),
        json!({"right": true})
    );

    connection.close().await;
}

#[tokio::test]
async fn terminal_close_fails_pending_request() {
    let mut fake = fake_terminal().await;
    let connection = connect(&fake, STEP).await;
    let link = connection.link();
    let gateway = TerminalGateway::new(connection.correlator());

    let call = tokio::spawn(async move { gateway.accounts().await });
    fake.next_request().await;
    fake.replies.send(Message::Close(None)).unwrap();

    let err = timeout(STEP, call).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Terminal(CorrelationError::NotReceived)
    ));

    let later = TerminalGateway::new(connection.correlator())
        .accounts()
        .await
        .unwrap_err();
    assert!(matches!(
        later,
        GatewayError::Terminal(CorrelationError::Closed)
    ));
    assert_ne!(link.state(), LinkState::Open);

    connection.close().await;
}

#[tokio::test]
async fn unanswered_request_times_out() {
    let mut fake = fake_terminal().await;
    let connection = connect(&fake, Duration::from_millis(100)).await;
    let gateway = TerminalGateway::new(connection.correlator());

    let call = tokio::spawn(async move { gateway.market_boards().await });
    fake.next_request().await;

    let err = timeout(STEP, call).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Terminal(CorrelationError::TimedOut(_))
    ));
    assert_eq!(connection.correlator().pending_count(), 0);

    connection.close().await;
}

#[tokio::test]
async fn close_sends_normal_close_frame() {
    let mut fake = fake_terminal().await;
    let connection = connect(&fake, STEP).await;
    let link = connection.link();
    assert_eq!(link.state(), LinkState::Open);

    connection.close().await;

    let close = timeout(STEP, fake.requests.recv()).await.unwrap().unwrap();
    match close {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("expected close frame, got {other:?}"),
    }
    assert_eq!(link.state(), LinkState::Closed);
}

#[tokio::test]
async fn unreachable_endpoint_fails_to_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let settings = TerminalSettings::new(format!("ws://{addr}"), STEP).unwrap();
    let err = TerminalConnection::open(&settings, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::ConnectFailed(_)));
}

#[tokio::test]
async fn tool_call_end_to_end() {
    let mut fake = fake_terminal().await;
    let connection = connect(&fake, STEP).await;
    let tools = ToolCatalog::new(TerminalGateway::new(connection.correlator()));

    let call = tokio::spawn(async move {
        tools
            .call("get_object_types", &Value::Null)
            .await
            .map_err(|e| e.to_string())
    });
    let sent = fake.next_request().await;
    assert_eq!(
        serde_json::from_str::<Value>(sent["Payload"].as_str().unwrap()).unwrap()["Type"],
        "ObjectTypes"
    );
    fake.respond(
        sent["Id"].as_str().unwrap(),
        "#Data.Query",
        &json!({"Data": []}),
    );

    let err = timeout(STEP, call).await.unwrap().unwrap().unwrap_err();
    assert!(err.contains("missing"), "{err}");

    connection.close().await;
}
