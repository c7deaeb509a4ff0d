/*
[INPUT]:  Symbol to watch on the public futures stream
[OUTPUT]: Orderbook and trade events printed to stdout
[POS]:    Examples - WebSocket stream handling
[UPDATE]: When WebSocket API changes
*/

use deepcoin_adapter::*;
use tokio::time::{Duration, sleep};

/// Example: subscribe to BTCUSDT orderbook and trades for ten seconds
#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Deepcoin Public Stream Example ===\n");

    let manager = DeepcoinWebsocketManager::new(Endpoint::PublicFutures)?;
    manager.register_callback(TopicId::Orderbook25, |message: &PushMessage| {
        println!("[orderbook] {}", message.payload);
    });
    manager.register_callback(TopicId::LastTransactions, |message: &PushMessage| {
        println!("[trade] {}", message.payload);
    });

    manager.start();
    if !manager.wait_until_alive(Duration::from_secs(10)).await {
        println!("connection did not open: {:?}", *manager.connection_state().borrow());
        return Err(DeepcoinError::NotConnected);
    }
    println!("✓ connected");

    manager.subscribe_orderbook("BTCUSDT").await?;
    manager.subscribe_trade("BTCUSDT").await?;

    sleep(Duration::from_secs(10)).await;

    manager.unsubscribe_all().await?;
    manager.stop().await;
    println!("\n✓ stream example complete");
    Ok(())
}
