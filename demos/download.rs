//! Download - a call with progress, timeout and cancellation.
//!
//! This example demonstrates:
//! - Connecting two endpoints with an in-process channel
//! - A handler reporting progress with `ctx.notify`
//! - A handler that stops when its caller cancels
//! - Calls rejected by timeout and by a cancellation token

use std::time::Duration;

use npc::transport::{pair, ChannelConfig};
use npc::{CancellationToken, DeliverOptions, NpcError, RequestContext};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (main, worker) = pair(ChannelConfig::default());

    worker.on("download", |path: String, ctx: RequestContext| async move {
        for i in 1..=3 {
            tokio::select! {
                _ = ctx.cancelled() => {
                    println!("worker: download of {path} cancelled");
                    return Err("cancelled".to_string());
                }
                _ = tokio::time::sleep(Duration::from_millis(300)) => {}
            }
            ctx.notify(&format!("progress={i}/3")).await.ok();
        }
        Ok(format!("Did download to {path}"))
    });

    // Runs to completion
    let options = DeliverOptions::new().on_notify(|p| println!("main: {p}"));
    let result: String = main.deliver("download", "/path", options).await?;
    println!("main: {result}");

    // Gives up after the first progress report
    let options = DeliverOptions::new()
        .timeout(Duration::from_millis(500))
        .on_notify(|p| println!("main: {p}"));
    match main.deliver::<_, String>("download", "/slow", options).await {
        Err(NpcError::TimedOut) => println!("main: timed out"),
        other => println!("main: unexpected {other:?}"),
    }

    // Cancelled by the caller
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        trigger.cancel();
    });
    let options = DeliverOptions::new().cancel_on(token);
    match main.deliver::<_, String>("download", "/large", options).await {
        Err(NpcError::Cancelled) => println!("main: cancelled"),
        other => println!("main: unexpected {other:?}"),
    }

    // Nobody handles this one
    match main.deliver::<_, ()>("upload", "/path", DeliverOptions::new()).await {
        Err(NpcError::Unimplemented) => println!("main: upload is unimplemented"),
        other => println!("main: unexpected {other:?}"),
    }

    // give the worker a moment to see the last cancel
    tokio::time::sleep(Duration::from_millis(50)).await;
    main.close();
    Ok(())
}
