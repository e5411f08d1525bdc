//! Translates client frames into broker calls and broker results into acks.

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::supervisor::Supervisor;
use crate::transport::message::{ClientMessage, ServerMessage};

/// Code used when a frame carries a `messageId` but cannot be understood.
pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";

/// Parses a text frame. On failure, returns the error ack to send back if the
/// frame carried a `messageId` to correlate it with.
pub fn parse_request(text: &str) -> Result<ClientMessage, Option<ServerMessage>> {
    serde_json::from_str::<ClientMessage>(text).map_err(|err| {
        let message_id = serde_json::from_str::<Value>(text).ok().and_then(|value| {
            value
                .get("messageId")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        message_id.map(|id| {
            ServerMessage::ack_failure(id, INVALID_MESSAGE, format!("invalid message: {err}"))
        })
    })
}

/// Executes one request for connection `id`, returning the reply frame, if
/// any.
pub fn handle_request(
    supervisor: &Supervisor,
    id: &str,
    request: ClientMessage,
) -> Option<ServerMessage> {
    let broker = supervisor.broker();

    match request {
        ClientMessage::Heartbeat { .. } => {
            supervisor.heartbeat(id);
            Some(ServerMessage::heartbeat_ack())
        }

        ClientMessage::Subscribe { topic, message_id } => {
            broker.touch(id);
            let reply = match broker.subscribe(id, &topic) {
                Ok(receipt) => ServerMessage::ack_success(
                    message_id,
                    json!({
                        "topic": receipt.topic,
                        "subscriberCount": receipt.subscriber_count,
                    }),
                ),
                Err(e) => {
                    warn!(connection = %id, topic = %topic, error = %e, "subscribe rejected");
                    ServerMessage::ack_error(message_id, &e)
                }
            };
            Some(reply)
        }

        ClientMessage::Unsubscribe { topic, message_id } => {
            broker.touch(id);
            let reply = match broker.unsubscribe(id, &topic) {
                Ok(receipt) => ServerMessage::ack_success(
                    message_id,
                    json!({
                        "topic": receipt.topic,
                        "subscriberCount": receipt.subscriber_count,
                    }),
                ),
                Err(e) => {
                    warn!(connection = %id, topic = %topic, error = %e, "unsubscribe rejected");
                    ServerMessage::ack_error(message_id, &e)
                }
            };
            Some(reply)
        }

        ClientMessage::Publish {
            topic,
            payload,
            message_id,
            ack_required,
        } => {
            broker.touch(id);
            match broker.publish(id, &topic, payload) {
                // Clients that opt out of acks only hear about failures.
                Ok(receipt) if ack_required.unwrap_or(true) => Some(ServerMessage::ack_success(
                    message_id,
                    json!({
                        "messageId": receipt.message_id,
                        "seq": receipt.sequence,
                        "deliveredCount": receipt.delivered_count,
                    }),
                )),
                Ok(receipt) => {
                    debug!(connection = %id, topic = %topic, seq = receipt.sequence, "published without ack");
                    None
                }
                Err(e) => {
                    warn!(connection = %id, topic = %topic, error = %e, "publish rejected");
                    Some(ServerMessage::ack_error(message_id, &e))
                }
            }
        }
    }
}
