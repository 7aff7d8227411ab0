//! Line-oriented rendering of controller events.
//!
//! One line per change: a marker (`+` added, `~` updated, `>` moved,
//! `-` removed), the position, and a short summary of the entity.

use chatsync_core::{Change, Channel, EntityChange, LocalMessageState, Member, Message};

fn channel_summary(channel: &Channel) -> String {
    let name = channel.name().unwrap_or_default();
    let last = channel.last_message_at.map_or_else(
        || "-".into(),
        |at| at.format("%Y-%m-%d %H:%M").to_string(),
    );
    if name.is_empty() {
        format!("{}  last={last}", channel.cid)
    } else {
        format!("{}  {name}  last={last}", channel.cid)
    }
}

fn member_summary(member: &Member) -> String {
    match &member.role {
        Some(role) => format!("{} ({role})", member.user_id),
        None => member.user_id.clone(),
    }
}

fn message_summary(message: &Message) -> String {
    let state = match message.local_state {
        None => "",
        Some(LocalMessageState::Pending | LocalMessageState::Sending) => "  (sending)",
        Some(LocalMessageState::SendingFailed) => "  (failed)",
    };
    format!("{}: {}{state}", message.author_id, message.text)
}

fn change_line<T>(change: &Change<T>, summary: impl Fn(&T) -> String) -> String {
    match change {
        Change::Added { index, item } => format!("+ [{index}] {}", summary(item)),
        Change::Updated { index, item } => format!("~ [{index}] {}", summary(item)),
        Change::Moved { from, to, item } => format!("> [{from}->{to}] {}", summary(item)),
        Change::Removed { index, item } => format!("- [{index}] {}", summary(item)),
    }
}

pub fn print_channel_change(change: &Change<Channel>) {
    println!("{}", change_line(change, channel_summary));
}

pub fn print_member_change(change: &Change<Member>) {
    println!("  member {}", change_line(change, member_summary));
}

pub fn print_message_change(change: &Change<Message>) {
    println!("  message {}", change_line(change, message_summary));
}

pub fn print_entity_change(change: &EntityChange<Channel>) {
    let line = match change {
        EntityChange::Created(channel) => format!("+ {}", channel_summary(channel)),
        EntityChange::Updated(channel) => format!("~ {}", channel_summary(channel)),
        EntityChange::Removed(channel) => format!("- {} (deleted)", channel.cid),
    };
    println!("{line}");
}

pub fn print_fetch_state(started: bool, error: Option<&str>) {
    match (started, error) {
        (true, _) => eprintln!("… syncing"),
        (false, None) => eprintln!("✓ up to date"),
        (false, Some(error)) => eprintln!("✗ sync failed: {error}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn change_lines_carry_marker_and_position() {
        let channel = Channel::new("messaging:c1".parse().unwrap());
        assert_eq!(
            change_line(
                &Change::Moved {
                    from: 2,
                    to: 0,
                    item: channel.clone()
                },
                channel_summary
            ),
            "> [2->0] messaging:c1  last=-"
        );
        assert_eq!(
            change_line(&Change::Removed { index: 1, item: channel }, channel_summary),
            "- [1] messaging:c1  last=-"
        );
    }

    #[test]
    fn message_lines_show_delivery_state() {
        let mut message = Message {
            id: "m1".into(),
            cid: "messaging:c1".parse().unwrap(),
            author_id: "u1".into(),
            text: "hello".into(),
            kind: None,
            created_at: None,
            updated_at: None,
            local_state: Some(LocalMessageState::SendingFailed),
            extra_data: chatsync_core::ExtraData::default(),
        };
        assert_eq!(message_summary(&message), "u1: hello  (failed)");

        message.local_state = None;
        assert_eq!(message_summary(&message), "u1: hello");
    }
}
