mod args;

use std::{ffi::OsStr, path::Path};

use clap::Parser;
use tessera::{
    config::Config,
    disk,
    error::Error,
    metainfo::MetaInfo,
    peer::PeerId,
    tracker,
    utils::to_human_readable,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use args::Args;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .without_time()
        .with_target(false)
        .with_file(false)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("could not set the logger: {e}");
    }

    let mut config = Config::load().await?;

    if let Some(download_dir) = args.download_dir {
        config.download_dir = download_dir;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    info!("config: {config:?}");

    let meta = MetaInfo::from_bytes(&tokio::fs::read(&args.torrent).await?)?;
    let peer_id = PeerId::generate();

    info!("{} info_hash: {}", meta.info.name, meta.info_hash());

    let peers =
        tracker::announce(&meta, &peer_id, config.port, config.tracker_timeout())
            .await?;

    let torrent = meta.to_torrent(peers, peer_id)?;
    let buf = torrent.download(config.download_opts()).await?;

    // never let the name of the torrent escape the download dir.
    let output = args.output.unwrap_or_else(|| {
        let name = Path::new(&meta.info.name)
            .file_name()
            .unwrap_or(OsStr::new("download"));
        config.download_dir.join(name)
    });

    disk::write_output(&output, &buf).await?;

    info!(
        "downloaded {} ({}) to {output:?}",
        meta.info.name,
        to_human_readable(buf.len() as u64)
    );

    Ok(())
}
