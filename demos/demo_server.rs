//! Demo server - answers `TestConn` until Ctrl-C, then drains.
//!
//! ```text
//! cargo run --example demo_server
//! cargo run --example demo_client
//! ```

#[path = "test_service.rs"]
mod test_service;

use carrier_rpc::handler::CallContext;
use carrier_rpc::Server;
use test_service::{TestConn, TestConnReq, TestConnRsp, PORT};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let server = Server::builder()
        .workers(5)
        .method::<TestConn, _, _>(|req: TestConnReq, ctx: CallContext| async move {
            Ok(TestConnRsp {
                client_ip: ctx.peer_addr().map(|a| a.ip().to_string()).unwrap_or_default(),
                client_message: req.message,
            })
        })
        .build()?;

    let serving = tokio::spawn({
        let server = server.clone();
        async move { server.bind_and_serve(("127.0.0.1", PORT)).await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, draining");
    server.graceful_shutdown().await?;
    serving.await??;

    Ok(())
}
