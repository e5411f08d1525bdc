use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

use crate::auth::Principal;
use crate::broker::{Delivery, Message, MessageKind, Notification, NotificationLevel};
use crate::supervisor::Supervisor;
use crate::test_support::{RecordingTransport, broker_with};
use crate::transport::handler::{handle_request, parse_request};
use crate::transport::message::{AckStatus, ClientMessage, ServerMessage};
use crate::transport::{Outbound, Transport, WsTransport};

fn supervisor_with(transport: &std::sync::Arc<RecordingTransport>) -> Supervisor {
    Supervisor::new(
        broker_with(transport),
        Duration::from_secs(300),
        Duration::from_secs(300),
    )
}

fn handle(supervisor: &Supervisor, id: &str, frame: Value) -> Option<Value> {
    let request = parse_request(&frame.to_string()).expect("frame should parse");
    handle_request(supervisor, id, request).map(|reply| serde_json::to_value(reply).unwrap())
}

fn text_of(outbound: Outbound) -> Value {
    match outbound {
        Outbound::Frame(WsMessage::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[test]
fn test_parse_client_frames() {
    let subscribe = parse_request(r#"{"type":"subscribe","topic":"public:a","messageId":"m1"}"#);
    assert!(matches!(
        subscribe,
        Ok(ClientMessage::Subscribe { ref topic, ref message_id })
            if topic == "public:a" && message_id == "m1"
    ));

    let publish = parse_request(
        r#"{"type":"publish","topic":"public:a","payload":{"x":1},"messageId":"m2","ackRequired":false}"#,
    );
    assert!(matches!(
        publish,
        Ok(ClientMessage::Publish { ack_required: Some(false), .. })
    ));

    let heartbeat = parse_request(r#"{"type":"heartbeat"}"#);
    assert!(matches!(heartbeat, Ok(ClientMessage::Heartbeat { timestamp: None })));
}

#[test]
fn test_heartbeat_accepts_any_numeric_timestamp() {
    for frame in [
        r#"{"type":"heartbeat","timestamp":1700000000000}"#,
        r#"{"type":"heartbeat","timestamp":1700000000000.5}"#,
    ] {
        assert!(
            matches!(parse_request(frame), Ok(ClientMessage::Heartbeat { timestamp: Some(_) })),
            "{frame} should parse"
        );
    }
}

#[test]
fn test_invalid_frame_with_message_id_gets_error_ack() {
    let reply = parse_request(r#"{"type":"teleport","messageId":"m9"}"#)
        .expect_err("unknown type must not parse")
        .expect("frame carried a messageId");
    let value = serde_json::to_value(reply).unwrap();

    assert_eq!(value["type"], "ack");
    assert_eq!(value["id"], "m9");
    assert_eq!(value["status"], "error");
    assert_eq!(value["code"], "INVALID_MESSAGE");
}

#[test]
fn test_invalid_frame_without_message_id_is_dropped() {
    assert!(matches!(parse_request("not json"), Err(None)));
    assert!(matches!(parse_request(r#"{"type":"subscribe"}"#), Err(None)));
}

#[test]
fn test_subscribe_request_acks_with_count() {
    let transport = RecordingTransport::new();
    let supervisor = supervisor_with(&transport);
    supervisor
        .broker()
        .connect("c1".into(), Principal::user("alice"))
        .unwrap();

    let reply = handle(
        &supervisor,
        "c1",
        json!({ "type": "subscribe", "topic": "public:news", "messageId": "m1" }),
    )
    .unwrap();

    assert_eq!(
        reply,
        json!({
            "type": "ack",
            "id": "m1",
            "status": "success",
            "topic": "public:news",
            "subscriberCount": 1,
        })
    );
}

#[test]
fn test_denied_subscribe_acks_with_code() {
    let transport = RecordingTransport::new();
    let supervisor = supervisor_with(&transport);
    supervisor
        .broker()
        .connect("c1".into(), Principal::user("alice"))
        .unwrap();

    let reply = handle(
        &supervisor,
        "c1",
        json!({ "type": "subscribe", "topic": "user:bob", "messageId": "m1" }),
    )
    .unwrap();

    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], "PERMISSION_DENIED");
    assert_eq!(reply["error"], "permission denied: cannot subscribe on user:bob");
}

#[test]
fn test_publish_request_acks_with_sequence() {
    let transport = RecordingTransport::new();
    let supervisor = supervisor_with(&transport);
    let broker = supervisor.broker();
    broker.connect("c1".into(), Principal::user("alice")).unwrap();
    broker.connect("c2".into(), Principal::user("bob")).unwrap();
    broker.subscribe("c2", "public:chat").unwrap();

    let reply = handle(
        &supervisor,
        "c1",
        json!({ "type": "publish", "topic": "public:chat", "payload": "hi", "messageId": "m7" }),
    )
    .unwrap();

    assert_eq!(reply["status"], "success");
    assert_eq!(reply["seq"], 1);
    assert_eq!(reply["deliveredCount"], 1);
    assert!(reply["messageId"].is_string());
    assert_eq!(transport.messages_to("c2")[0].payload, json!("hi"));
}

#[test]
fn test_publish_without_ack_only_reports_errors() {
    let transport = RecordingTransport::new();
    let supervisor = supervisor_with(&transport);
    let broker = supervisor.broker();
    broker.connect("c1".into(), Principal::user("alice")).unwrap();
    broker.subscribe("c1", "public:chat").unwrap();

    let ok = handle(
        &supervisor,
        "c1",
        json!({
            "type": "publish", "topic": "public:chat", "payload": 1,
            "messageId": "m1", "ackRequired": false,
        }),
    );
    assert!(ok.is_none());

    let failed = handle(
        &supervisor,
        "c1",
        json!({
            "type": "publish", "topic": "public:empty", "payload": 1,
            "messageId": "m2", "ackRequired": false,
        }),
    )
    .unwrap();
    assert_eq!(failed["code"], "TOPIC_NOT_FOUND");
}

#[test]
fn test_unsubscribe_request_for_unknown_connection() {
    let transport = RecordingTransport::new();
    let supervisor = supervisor_with(&transport);

    let reply = handle(
        &supervisor,
        "ghost",
        json!({ "type": "unsubscribe", "topic": "public:a", "messageId": "m1" }),
    )
    .unwrap();
    assert_eq!(reply["code"], "CONNECTION_NOT_FOUND");
}

#[test]
fn test_heartbeat_request_is_answered() {
    let transport = RecordingTransport::new();
    let supervisor = supervisor_with(&transport);
    supervisor
        .broker()
        .connect("c1".into(), Principal::user("alice"))
        .unwrap();

    let reply = handle(
        &supervisor,
        "c1",
        json!({ "type": "heartbeat", "timestamp": 1 }),
    )
    .unwrap();
    assert_eq!(reply["type"], "heartbeat_ack");
    assert!(reply["timestamp"].as_i64().unwrap() > 1);
}

#[test]
fn test_delivery_frames() {
    let message = Message::new(MessageKind::Message, "public:a", "alice", json!({ "k": 1 }), 3);
    let value = serde_json::to_value(ServerMessage::from(&Delivery::Message(message.clone()))).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "message",
            "id": message.id,
            "topic": "public:a",
            "payload": { "k": 1 },
            "timestamp": message.timestamp,
            "from": "alice",
            "seq": 3,
        })
    );

    let event = Message::new(MessageKind::Event, "system:a", "system", json!(null), 1);
    let value = serde_json::to_value(ServerMessage::from(&Delivery::Message(event))).unwrap();
    assert_eq!(value["type"], "event");
    assert_eq!(value["from"], "system");

    let notification = Notification::new(NotificationLevel::Error, "disk full");
    let value = serde_json::to_value(ServerMessage::from(&notification)).unwrap();
    assert_eq!(value["type"], "notification");
    assert_eq!(value["level"], "error");
    assert_eq!(value["message"], "disk full");
}

#[test]
fn test_success_ack_omits_error_field() {
    let value = serde_json::to_value(ServerMessage::ack_success("m1", json!({ "topic": "t" }))).unwrap();
    assert!(value.get("error").is_none());
    assert!(value.get("code").is_none());

    let parsed: ServerMessage = serde_json::from_value(value).unwrap();
    assert!(matches!(parsed, ServerMessage::Ack { status: AckStatus::Success, .. }));
}

#[test]
fn test_ws_transport_routes_frames() {
    let transport = WsTransport::new();
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();
    transport.attach("c1", tx1);
    transport.attach("c2", tx2);
    transport.join_group("c1", "public:a");
    transport.join_group("c2", "public:a");
    assert_eq!(transport.group_size("public:a"), 2);

    let notice = Delivery::Notification(Notification::new(NotificationLevel::Info, "hello"));
    assert_eq!(transport.broadcast_to_group("public:a", &notice), 2);
    assert_eq!(text_of(rx1.try_recv().unwrap())["message"], "hello");
    assert_eq!(text_of(rx2.try_recv().unwrap())["message"], "hello");

    let message = Message::new(MessageKind::Message, "public:a", "alice", json!(5), 1);
    transport
        .send_to_connection("c2", &Delivery::Message(message))
        .unwrap();
    assert_eq!(text_of(rx2.try_recv().unwrap())["payload"], 5);
    assert!(rx1.try_recv().is_err());

    transport.close_connection("c1", "timeout").unwrap();
    assert!(matches!(rx1.try_recv().unwrap(), Outbound::Close(reason) if reason == "timeout"));
}

#[test]
fn test_ws_transport_detach() {
    let transport = WsTransport::new();
    let (tx, rx) = mpsc::unbounded_channel();
    transport.attach("c1", tx);
    transport.join_group("c1", "public:a");

    transport.detach("c1");
    assert!(!transport.is_attached("c1"));
    assert_eq!(transport.group_size("public:a"), 0);

    let notice = Delivery::Notification(Notification::new(NotificationLevel::Info, "x"));
    assert!(transport.send_to_connection("c1", &notice).is_err());
    assert!(transport.close_connection("c1", "timeout").is_err());
    drop(rx);
}

#[test]
fn test_ws_transport_send_to_dropped_receiver_fails() {
    let transport = WsTransport::new();
    let (tx, rx) = mpsc::unbounded_channel();
    transport.attach("c1", tx);
    drop(rx);

    let notice = Delivery::Notification(Notification::new(NotificationLevel::Info, "x"));
    assert!(transport.send_to_connection("c1", &notice).is_err());
}
