use shared::domain::{DisplayName, GroupName, MessageTarget};

use super::*;

fn message(text: &str, ts: i64) -> Message {
    Message::new(
        DisplayName::parse("alice").expect("name"),
        text.to_string(),
        ts,
        MessageTarget::Group {
            group: GroupName::general(),
        },
    )
}

fn texts(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.text.as_str()).collect()
}

#[test]
fn append_evicts_oldest_once_full() {
    let mut log = BoundedLog::new(3);
    for i in 0..3 {
        assert!(log.append(message(&format!("m{i}"), i)).is_none());
    }
    let evicted = log.append(message("m3", 3)).expect("oldest evicted");
    assert_eq!(evicted.text, "m0");
    assert_eq!(log.len(), 3);
    assert_eq!(texts(&log.to_vec()), ["m1", "m2", "m3"]);
}

#[test]
fn tail_never_exceeds_capacity() {
    let capacity = 10;
    let mut log = BoundedLog::new(capacity);
    for i in 0..(capacity + 7) {
        log.append(message(&format!("m{i}"), i as i64));
    }

    let tail = log.tail(capacity + 5);
    assert_eq!(tail.len(), capacity);
    assert_eq!(tail.last().map(|m| m.text.as_str()), Some("m16"));
    assert_eq!(tail.first().map(|m| m.text.as_str()), Some("m7"));
}

#[test]
fn tail_returns_newest_in_order() {
    let mut log = BoundedLog::new(5);
    for i in 0..4 {
        log.append(message(&format!("m{i}"), i));
    }
    assert_eq!(texts(&log.tail(2)), ["m2", "m3"]);
    assert!(log.tail(0).is_empty());
    assert_eq!(log.last().map(|m| m.ts), Some(3));
}

#[test]
fn zero_capacity_is_raised_to_one() {
    let mut log = BoundedLog::new(0);
    log.append(message("a", 1));
    log.append(message("b", 2));
    assert_eq!(texts(&log.to_vec()), ["b"]);
}

#[test]
fn from_messages_keeps_newest() {
    let stored = (0..6).map(|i| message(&format!("m{i}"), i)).collect();
    let log = BoundedLog::from_messages(4, stored);
    assert_eq!(texts(&log.to_vec()), ["m2", "m3", "m4", "m5"]);

    let empty = BoundedLog::from_messages(4, Vec::new());
    assert_eq!(empty.len(), 0);
}
