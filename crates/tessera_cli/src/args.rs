use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[clap(name = "Tessera")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path of the .torrent file to download.
    pub torrent: PathBuf,

    /// Where to write the downloaded file, defaults to the name of the
    /// torrent inside the download dir.
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Override the download dir of the configuration file.
    #[clap(short, long)]
    pub download_dir: Option<PathBuf>,

    /// Port announced to the tracker.
    #[clap(short, long)]
    pub port: Option<u16>,

    /// Log every message exchanged with the peers.
    #[clap(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flags() {
        let args = Args::parse_from([
            "tessera",
            "debian.torrent",
            "-o",
            "/tmp/debian.iso",
            "--port",
            "7000",
            "-v",
        ]);

        assert_eq!(args.torrent, PathBuf::from("debian.torrent"));
        assert_eq!(args.output, Some(PathBuf::from("/tmp/debian.iso")));
        assert_eq!(args.port, Some(7000));
        assert_eq!(args.download_dir, None);
        assert!(args.verbose);
    }
}
