use serde_json::json;

use super::*;
use crate::domain::{DisplayName, GroupName, MessageTarget};

#[test]
fn parses_client_requests_in_camel_case() {
    let request: ClientRequest = serde_json::from_value(json!({
        "type": "typing",
        "payload": { "chat": { "type": "private", "id": "bob" }, "isTyping": true }
    }))
    .expect("typing request");
    match request {
        ClientRequest::Typing { chat, is_typing } => {
            assert_eq!(chat, ChatRef::Private("bob".into()));
            assert!(is_typing);
        }
        other => panic!("unexpected request: {other:?}"),
    }

    let request: ClientRequest = serde_json::from_value(json!({
        "type": "load_private",
        "payload": { "withUser": "carol" }
    }))
    .expect("load request");
    assert!(matches!(request, ClientRequest::LoadPrivate { with_user } if with_user == "carol"));

    let request: ClientRequest =
        serde_json::from_value(json!({ "type": "get_chat_list", "payload": {} }))
            .expect("chat list request");
    assert!(matches!(request, ClientRequest::GetChatList {}));
}

#[test]
fn frames_without_payload_read_as_empty() {
    let request = ClientRequest::from_frame(r#"{"type":"get_chat_list"}"#).expect("bare frame");
    assert!(matches!(request, ClientRequest::GetChatList {}));

    let request =
        ClientRequest::from_frame(r#"{"type":"get_chat_list","payload":{}}"#).expect("frame");
    assert!(matches!(request, ClientRequest::GetChatList {}));

    let request = ClientRequest::from_frame(r#"{"type":"join","payload":{"name":"alice"}}"#)
        .expect("join frame");
    assert!(matches!(request, ClientRequest::Join { name } if name == "alice"));

    assert!(ClientRequest::from_frame(r#"{"type":"join"}"#).is_err());
    assert!(ClientRequest::from_frame("[1, 2]").is_err());
    assert!(ClientRequest::from_frame("not json").is_err());
}

#[test]
fn group_message_flattens_message_fields() {
    let message = Message::new(
        DisplayName::parse("alice").expect("name"),
        "hi".into(),
        42,
        MessageTarget::Group {
            group: GroupName::parse("General").expect("group"),
        },
    );
    let value = serde_json::to_value(ServerEvent::GroupMessage(message.clone())).expect("json");
    assert_eq!(value["type"], "group_message");
    assert_eq!(value["payload"]["user"], "alice");
    assert_eq!(value["payload"]["text"], "hi");
    assert_eq!(value["payload"]["group"], "General");
    assert_eq!(value["payload"]["kind"], "group");
    assert_eq!(value["payload"]["ts"], 42);
    assert!(value["payload"].get("system").is_none());

    let parsed: ServerEvent = serde_json::from_value(value).expect("parse back");
    assert_eq!(parsed, ServerEvent::GroupMessage(message));
}

#[test]
fn private_message_carries_mine_flag_only_for_echo() {
    let message = Message::new(
        DisplayName::parse("alice").expect("name"),
        "hello".into(),
        7,
        MessageTarget::Private {
            to: DisplayName::parse("bob").expect("name"),
        },
    );
    let echo = serde_json::to_value(ServerEvent::PrivateMessage(PrivateMessagePayload {
        message: message.clone(),
        mine: Some(true),
    }))
    .expect("json");
    assert_eq!(echo["payload"]["mine"], true);
    assert_eq!(echo["payload"]["to"], "bob");

    let delivered = serde_json::to_value(ServerEvent::PrivateMessage(PrivateMessagePayload {
        message,
        mine: None,
    }))
    .expect("json");
    assert!(delivered["payload"].get("mine").is_none());
}

#[test]
fn presence_and_chat_list_use_client_field_names() {
    let presence = serde_json::to_value(ServerEvent::Presence {
        online_names: vec![DisplayName::parse("alice").expect("name")],
    })
    .expect("json");
    assert_eq!(presence, json!({ "type": "presence", "payload": { "onlineNames": ["alice"] } }));

    let list = serde_json::to_value(ServerEvent::ChatList(ChatListPayload {
        contacts: vec![],
        groups: vec![GroupSummary {
            name: GroupName::parse("General").expect("group"),
            member_count: 3,
            joined: true,
        }],
    }))
    .expect("json");
    assert_eq!(list["payload"]["groups"][0]["memberCount"], 3);
    assert_eq!(list["payload"]["groups"][0]["joined"], true);

    let history = serde_json::to_value(ServerEvent::History {
        kind: ChatKind::Group,
        id: "General".into(),
        messages: vec![],
    })
    .expect("json");
    assert_eq!(history["payload"]["type"], "group");
}

#[test]
fn unit_events_serialize_without_payload() {
    let value = serde_json::to_value(ServerEvent::ChatListUpdate).expect("json");
    assert_eq!(value, json!({ "type": "chat_list_update" }));
}
