use chatsync_core::{ChannelEvent, ChatClient};

use crate::error::CliError;
use crate::output::{
    print_entity_change, print_fetch_state, print_member_change, print_message_change,
};

use super::{interrupted, parse_cid};

pub async fn handle(raw_cid: &str, client: &ChatClient) -> Result<(), CliError> {
    let cid = parse_cid(raw_cid)?;
    let (mut controller, mut events) = client.channel_controller(cid);

    let completion = controller.start_updating();
    tokio::pin!(completion);
    let mut fetching = true;
    let mut outcome = Ok(());

    loop {
        tokio::select! {
            () = interrupted() => break,
            result = &mut completion, if fetching => {
                fetching = false;
                if let Err(e) = result {
                    if controller.channel().is_none() {
                        outcome = Err(e.into());
                        break;
                    }
                    tracing::warn!(error = %e, "channel fetch failed; showing cached state");
                }
            }
            event = events.recv() => match event {
                Some(ChannelEvent::ChannelChanged(change)) => print_entity_change(&change),
                Some(ChannelEvent::MembersChanged(changes)) => {
                    for change in &changes {
                        print_member_change(change);
                    }
                }
                Some(ChannelEvent::MessagesChanged(changes)) => {
                    for change in &changes {
                        print_message_change(change);
                    }
                }
                Some(ChannelEvent::WillStartFetching) => print_fetch_state(true, None),
                Some(ChannelEvent::DidStopFetching { error }) => {
                    print_fetch_state(false, error.as_deref());
                }
                None => break,
            },
        }
    }

    controller.stop();
    outcome
}
