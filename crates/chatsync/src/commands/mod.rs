//! Command handlers. Each one owns a connected `ChatClient` for its
//! lifetime and disconnects it before returning.

mod channel;
mod send;
mod watch;

use chatsync_core::{ChannelId, ChatClient, CoreError};

use crate::cli::Command;
use crate::error::CliError;

pub async fn dispatch(cmd: Command, client: &ChatClient) -> Result<(), CliError> {
    client.connect().await?;
    let result = match cmd {
        Command::Watch(args) => watch::handle(&args, client).await,
        Command::Channel(args) => channel::handle(&args.cid, client).await,
        Command::Send(args) => send::handle(args, client).await,
    };
    client.disconnect().await;
    result
}

fn parse_cid(raw: &str) -> Result<ChannelId, CliError> {
    raw.parse::<ChannelId>()
        .map_err(|_| CoreError::InvalidChannelId(raw.into()).into())
}

/// Resolves on Ctrl-C. A failed signal registration never resolves, so the
/// command keeps running until its own work ends.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
