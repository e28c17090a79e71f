use std::time::Duration;

use trellis::{Emitter, Error, Result};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let emitter = Emitter::<u16>::default();
    let db = emitter.scope("service.db")?;

    // Registered before anything is emitted, so an immediate reply is not lost.
    let ready = emitter.wait_for("service.*.ready", Some(Duration::from_millis(500)))?;
    let stalled = emitter.wait_for("service.cache.ready", Some(Duration::from_millis(200)))?;

    let boot = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        db.emit("ready", 5432)
    };

    let (ready, stalled, booted) = tokio::join!(ready, stalled, boot);
    booted?;

    let message = ready?;
    println!("{} is up on port {}", message.topic(), message.payload());

    match stalled {
        Err(Error::Timeout(after)) => println!("cache did not report within {after:?}"),
        other => println!("unexpected: {other:?}"),
    }

    println!("{} listeners left", emitter.listener_count());
    Ok(())
}
