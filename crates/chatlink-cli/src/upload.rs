use std::path::PathBuf;

use anyhow::{bail, Result};
use tokio::sync::mpsc;

use chatlink_core::{ClientConfig, UploadEvent};
use chatlink_transport_client::FileUploader;

use crate::ServerArgs;

pub(crate) async fn run(config: ClientConfig, server: ServerArgs, file: PathBuf) -> Result<()> {
    let (mut uploader, events) = FileUploader::new(config);
    let printer = tokio::spawn(print_events(events));

    let cancel = uploader.cancel_token();
    let ok = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            false
        }
        ok = async {
            uploader.connect(&server.host, server.port).await
                && uploader.upload_file(&file, server.user.trim()).await
        } => ok,
    };

    uploader.disconnect().await;
    drop(uploader);
    let _ = printer.await;

    if !ok {
        bail!("upload of {} failed", file.display());
    }
    Ok(())
}

async fn print_events(mut events: mpsc::Receiver<UploadEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::Progress(pct) => eprint!("\r[{:<50}] {:>3}%", "#".repeat(pct as usize / 2), pct),
            UploadEvent::Status(text) => println!("* {}", text),
            UploadEvent::Completed(text) => println!("\n✓ {}", text),
            UploadEvent::Error(e) => eprintln!("\n! {}", e),
        }
    }
}
