use anyhow::Result;
use aria2_bridge::config::EntryConfig;
use aria2_bridge::integration::{Aria2Integration, StartDownload};
use std::env;
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let integration = Aria2Integration::setup(EntryConfig::from_env()?).await?;
    integration.poll().await?;

    for state in integration.states().await {
        println!("{}: {}", state.name, state.state.replace('\n', ", "));
    }

    for download in integration.download_list().await? {
        println!(
            "download: {}, name: {}, status: {:?}, size: {}, progress: {}% {}",
            download.gid, download.name, download.status, download.size, download.progress, download.speed
        );
    }

    if let Some(url) = env::args().nth(1) {
        let request = StartDownload {
            url,
            dir: env::args().nth(2),
            out: None,
        };
        let gid = integration.start_download(&request).await?;
        println!("started download {gid}");
    }

    let mut events = integration.subscribe();
    let poller = integration.spawn();
    let watch = async {
        while let Ok(event) = events.recv().await {
            println!(
                "{}: {} ({}) {:?} -> {}",
                event.event_type(),
                event.name,
                event.gid,
                event.previous,
                event.status
            );
        }
    };
    if tokio::time::timeout(Duration::from_secs(30), watch).await.is_err() {
        println!("stopped watching after 30 s");
    }
    poller.abort();

    Ok(())
}
