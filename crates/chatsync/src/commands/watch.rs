use chatsync_core::{
    ChannelListEvent, ChannelListQuery, ChatClient, Filter, Pagination, Sort, SortField,
};

use crate::cli::WatchArgs;
use crate::error::CliError;
use crate::output::{print_channel_change, print_fetch_state};

use super::interrupted;

fn build_query(args: &WatchArgs, me: &str) -> ChannelListQuery {
    let members = if args.member.is_empty() {
        vec![me.to_owned()]
    } else {
        args.member.clone()
    };
    let mut filters = vec![Filter::is_in("members", members)];
    if let Some(kind) = &args.channel_type {
        filters.push(Filter::eq("type", kind.as_str()));
    }
    let filter = match filters.len() {
        1 => filters.remove(0),
        _ => Filter::and(filters),
    };
    ChannelListQuery::new(filter)
        .sorted_by(Sort::descending(SortField::LastMessageAt))
        .with_pagination(Pagination {
            limit: args.limit,
            offset: 0,
        })
}

pub async fn handle(args: &WatchArgs, client: &ChatClient) -> Result<(), CliError> {
    let query = build_query(args, &client.current_user().id);
    let (mut controller, mut events) = client.channel_list_controller(query);

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
                    if controller.channels().is_empty() {
                        outcome = Err(e.into());
                        break;
                    }
                    tracing::warn!(error = %e, "initial fetch failed; showing cached channels");
                }
            }
            event = events.recv() => match event {
                Some(ChannelListEvent::Changed(changes)) => {
                    for change in &changes {
                        print_channel_change(change);
                    }
                }
                Some(ChannelListEvent::WillStartFetching) => print_fetch_state(true, None),
                Some(ChannelListEvent::DidStopFetching { error }) => {
                    print_fetch_state(false, error.as_deref());
                }
                None => break,
            },
        }
    }

    controller.stop();
    outcome
}
