use crate::{ensure_success, SupabaseClient, LOG_TARGET};
use async_trait::async_trait;
use nebula_core::{BlobStore, CoreError};
use tracing::info;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Storage URL for `bucket/path`. Public objects live under `object/public`.
#[must_use]
pub fn object_url(base_url: &str, bucket: &str, path: &str, public: bool) -> String {
    let scope = if public { "object/public" } else { "object" };
    format!(
        "{}/storage/v1/{scope}/{}/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(bucket),
        encode_path(path)
    )
}

#[async_trait]
impl BlobStore for SupabaseClient {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), CoreError> {
        let url = object_url(&self.base_url, bucket, path, false);
        let size = bytes.len();
        info!(target: LOG_TARGET, "Uploading {} bytes to {}/{}", size, bucket, path);

        let request = self
            .client
            .post(&url)
            .header(
                reqwest::header::CONTENT_TYPE,
                content_type.unwrap_or(DEFAULT_CONTENT_TYPE),
            )
            .header("x-upsert", "false")
            .body(bytes);
        let response = self.authorize(request).await.send().await?;
        ensure_success("upload", response).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        object_url(&self.base_url, bucket, path, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_encodes_segments() {
        assert_eq!(
            object_url("https://demo.supabase.co/", "music", "1700000000000-my song.mp3", true),
            "https://demo.supabase.co/storage/v1/object/public/music/1700000000000-my%20song.mp3"
        );
        assert_eq!(
            object_url("https://demo.supabase.co", "covers", "a/b.jpg", false),
            "https://demo.supabase.co/storage/v1/object/covers/a/b.jpg"
        );
    }
}
