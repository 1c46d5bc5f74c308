use std::{net::SocketAddr, time::Duration};

use tessera::{
    error::Error,
    metainfo::{Info, MetaInfo},
    peer::PeerId,
    torrent::InfoHash,
    tracker,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    spawn,
    sync::oneshot,
};

/// Answer one HTTP request with `body` and hand over its request line.
async fn mock_tracker(body: Vec<u8>) -> (SocketAddr, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let request = String::from_utf8_lossy(&request);
        let line = request.lines().next().unwrap_or_default().to_owned();
        let _ = tx.send(line);

        let mut res = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        res.extend_from_slice(&body);
        socket.write_all(&res).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    (addr, rx)
}

fn meta(announce: String) -> MetaInfo {
    MetaInfo {
        announce,
        info: Info {
            name: "file.bin".to_owned(),
            piece_length: 1024,
            pieces: vec![0; 40],
            file_length: Some(2000),
            has_files: false,
            info_hash: InfoHash([0x12; 20]),
        },
    }
}

#[tokio::test]
async fn announce_returns_compact_peers() {
    let mut body = b"d8:intervali1800e5:peers12:".to_vec();
    body.extend([127, 0, 0, 1, 0x1A, 0xE1, 192, 168, 0, 7, 0x1A, 0xE2]);
    body.push(b'e');

    let (addr, request) = mock_tracker(body).await;
    let meta = meta(format!("http://{addr}/announce"));

    let peers =
        tracker::announce(&meta, &PeerId::generate(), 6881, Duration::from_secs(5))
            .await
            .unwrap();

    assert_eq!(
        peers,
        vec![
            "127.0.0.1:6881".parse::<SocketAddr>().unwrap(),
            "192.168.0.7:6882".parse().unwrap(),
        ]
    );

    let line = request.await.unwrap();
    assert!(line.starts_with("GET /announce?info_hash=%12%12"));
    assert!(line.contains("&port=6881&uploaded=0&downloaded=0&compact=1&left=2000"));
}

#[tokio::test]
async fn tracker_failure_is_an_error() {
    let (addr, _request) =
        mock_tracker(b"d14:failure reason15:unknown torrente".to_vec()).await;
    let meta = meta(format!("http://{addr}/announce"));

    let r =
        tracker::announce(&meta, &PeerId::generate(), 6881, Duration::from_secs(5))
            .await;

    assert!(matches!(r, Err(Error::TrackerFailure(reason)) if reason == "unknown torrent"));
}
