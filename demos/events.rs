//! Events - fire-and-forget emits in both directions over a MsgPack byte pipe.
//!
//! This example demonstrates:
//! - Hosting endpoints on a channel that carries bytes
//! - Encoding and decoding messages with `MsgPackCodec`
//! - Emitting without waiting for a reply
//! - Closing one side, which tears down the other

use bytes::Bytes;
use npc::codec::MsgPackCodec;
use npc::transport::transport_fn;
use npc::{Endpoint, Message, NpcError, RequestContext};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Serialize, Deserialize, Debug)]
struct LogLine {
    level: String,
    text: String,
}

/// Endpoint whose outbound messages are MsgPack frames on `tx`.
fn byte_endpoint(tx: mpsc::Sender<Bytes>) -> Endpoint {
    Endpoint::new(transport_fn(move |message: Message| {
        let tx = tx.clone();
        async move {
            let frame = MsgPackCodec::encode(&message)?;
            tx.send(frame).await.map_err(|_| NpcError::Disconnected)
        }
    }))
}

/// Decode frames from `rx` into `endpoint` until the pipe closes.
fn spawn_reader(endpoint: Endpoint, mut rx: mpsc::Receiver<Bytes>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match MsgPackCodec::decode(&frame) {
                Ok(message) => {
                    if let Err(e) = endpoint.receive(message).await {
                        eprintln!("receive failed: {e}");
                    }
                }
                Err(e) => eprintln!("bad frame: {e}"),
            }
        }
        endpoint.close();
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (to_worker, worker_rx) = mpsc::channel(64);
    let (to_main, main_rx) = mpsc::channel(64);

    let main = byte_endpoint(to_worker);
    let worker = byte_endpoint(to_main);

    main.on("log", |line: LogLine, _ctx: RequestContext| async move {
        println!("main: [{}] {}", line.level, line.text);
        Ok::<_, ()>(())
    });
    worker.on("config", |verbose: bool, _ctx: RequestContext| async move {
        println!("worker: verbose={verbose}");
        Ok::<_, ()>(())
    });

    let main_reader = spawn_reader(main.clone(), main_rx);
    let worker_reader = spawn_reader(worker.clone(), worker_rx);

    main.emit("config", &true).await?;
    for i in 1..=3 {
        let line = LogLine {
            level: "info".into(),
            text: format!("step {i}"),
        };
        worker.emit("log", &line).await?;
    }
    // nobody listens for this; it is dropped silently
    worker.emit("metrics", &42).await?;

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    main.close();
    worker_reader.await?;
    println!("worker connected after main closed: {}", worker.is_connected());
    main_reader.await?;
    Ok(())
}
