//! Demo client - sends ten `TestConn` calls to the demo server.

#[path = "test_service.rs"]
mod test_service;

use std::time::Duration;

use carrier_rpc::{CallToken, Client};
use test_service::{TestConn, TestConnReq, PORT};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = Client::connect(("127.0.0.1", PORT), 4).await?;
    let token = CallToken::with_timeout(Duration::from_secs(15));

    for i in 0..10 {
        let req = TestConnReq {
            message: format!("Hello, server. Message {}", i),
        };
        match client.call::<TestConn>(&token, &req).await {
            Ok(rsp) => tracing::info!(
                "client_ip={}, client_message={}",
                rsp.client_ip,
                rsp.client_message
            ),
            Err(e) => {
                tracing::error!("TestConn failed: {}", e);
                break;
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Ok(())
}
