use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

use crate::state::AppState;

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Stores a profile picture and returns its public URL.
pub async fn upload_profile_picture(
    st: &AppState,
    user_id: Uuid,
    img: UploadItem,
) -> anyhow::Result<String> {
    anyhow::ensure!(!img.body.is_empty(), "empty image");
    let ext = ext_from_mime(&img.content_type)
        .with_context(|| format!("unsupported content type {}", img.content_type))?;

    let key = format!("avatars/{}/{}.{}", user_id, Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, img.body, &img.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    Ok(st.storage.public_url(&key))
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
