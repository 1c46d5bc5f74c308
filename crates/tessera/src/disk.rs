//! Write the downloaded content to the filesystem.
use std::path::Path;

use tokio::fs::{create_dir_all, File};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::Error;

/// Write the whole buffer to `path`, creating the missing parent folders
/// and replacing the file if it exists.
#[tracing::instrument(skip(buf), fields(len = buf.len()))]
pub async fn write_output(path: &Path, buf: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).await?;
    }

    let mut file = File::create(path).await?;
    file.write_all(buf).await?;
    file.sync_all().await?;

    info!("wrote {} bytes to {path:?}", buf.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_into_new_folders() {
        let dir = std::env::temp_dir()
            .join(format!("tessera-disk-{}", rand::random::<u32>()));
        let path = dir.join("nested").join("out.bin");

        write_output(&path, b"first version").await.unwrap();
        write_output(&path, b"second").await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
