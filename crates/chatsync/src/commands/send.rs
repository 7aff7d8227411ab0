use chatsync_core::ChatClient;
use tracing::debug;

use crate::cli::SendArgs;
use crate::error::CliError;

use super::parse_cid;

pub async fn handle(args: SendArgs, client: &ChatClient) -> Result<(), CliError> {
    let cid = parse_cid(&args.cid)?;

    // The sender only posts to cached channels.
    if client.store().load_channel(&cid).is_none() {
        debug!(%cid, "channel not cached, fetching");
        client.channel_updater().update(&cid).await?;
    }

    let message = client
        .message_sender()
        .send(&cid, args.text, serde_json::Map::new())
        .await?;
    println!("{} {}", message.id, message.cid);
    Ok(())
}
