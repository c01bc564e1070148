//! Asynchronous asset loading.
//!
//! Every loader follows the same protocol: register with the world's
//! [`Tracker`] before the I/O is issued, apply the result to the texture,
//! mesh or font it owns, and only then resolve the registration. Loads run as
//! local tasks on the current thread (inside a `tokio::task::LocalSet`
//! natively, on the browser's event loop on wasm) and hand their outcome back
//! through a [`LoadHandle`].

use std::{
    future::Future,
    path::PathBuf,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{FutureExt, channel::oneshot};
use instant::Duration;

use crate::{
    error::{WorldError, WorldResult},
    tracker::{FailureKind, LoadToken},
};

#[cfg(feature = "text")]
pub mod font;
pub mod model;
#[cfg(feature = "text")]
pub mod text;
pub mod texture;
pub mod video;

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    if let Ok(url) = reqwest::Url::parse(file_name) {
        return Ok(url);
    }
    let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    let origin = window
        .location()
        .origin()
        .map_err(|_| anyhow::anyhow!("page has no origin"))?;
    let base = reqwest::Url::parse(&format!("{}/assets/", origin))?;
    Ok(base.join(file_name)?)
}

/// Where a native read of `file_name` goes: absolute paths and `file://` URLs
/// as given, anything else below the asset root.
pub fn resolve_asset_path(file_name: &str) -> PathBuf {
    if let Some(path) = file_name.strip_prefix("file://") {
        return PathBuf::from(path);
    }
    let path = PathBuf::from(file_name);
    if path.is_absolute() {
        path
    } else {
        crate::config::asset_root().join(path)
    }
}

/// Path of `relative` next to `base`, for files that reference siblings.
pub fn sibling_path(base: &str, relative: &str) -> String {
    match base.rfind('/') {
        Some(idx) => format!("{}/{}", &base[..idx], relative),
        None => relative.to_string(),
    }
}

pub async fn load_string(file_name: &str) -> anyhow::Result<String> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.error_for_status()?.text().await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = tokio::fs::read_to_string(resolve_asset_path(file_name)).await?;

    Ok(txt)
}

pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.error_for_status()?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = tokio::fs::read(resolve_asset_path(file_name)).await?;

    Ok(data)
}

/// Run `future` as a task on the current thread.
///
/// Natively this must be called from within a `tokio::task::LocalSet`.
pub fn spawn_local<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    #[cfg(not(target_arch = "wasm32"))]
    tokio::task::spawn_local(future);
    #[cfg(target_arch = "wasm32")]
    wasm_bindgen_futures::spawn_local(future);
}

/// The error a load resolves with when it ran out of time.
#[derive(thiserror::Error, Debug)]
#[error("no result after {0:?}")]
pub struct TimedOut(pub Duration);

async fn with_timeout<T>(
    timeout: Option<Duration>,
    future: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match timeout {
        #[cfg(not(target_arch = "wasm32"))]
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .unwrap_or_else(|_| Err(TimedOut(limit).into())),
        #[cfg(target_arch = "wasm32")]
        Some(_) => {
            log::warn!("Load timeouts are not supported on wasm, waiting indefinitely");
            future.await
        }
        None => future.await,
    }
}

/// Outcome of a spawned load.
///
/// The load itself keeps running when the handle is dropped; the handle only
/// observes it. If the task is torn down before finishing, the handle
/// resolves with [`WorldError::LoadCancelled`].
#[must_use = "a load handle does nothing unless awaited"]
#[derive(Debug)]
pub struct LoadHandle<T> {
    asset: String,
    rx: oneshot::Receiver<WorldResult<T>>,
}

impl<T> LoadHandle<T> {
    /// A handle that is already resolved with `value`.
    pub fn ready(asset: impl Into<String>, value: T) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(value));
        Self {
            asset: asset.into(),
            rx,
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }
}

impl<T> Future for LoadHandle<T> {
    type Output = WorldResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let asset = self.asset.clone();
        self.rx
            .poll_unpin(cx)
            .map(|received| received.unwrap_or_else(|_| Err(WorldError::LoadCancelled(asset))))
    }
}

/// Spawn `load` as a local task that resolves `token` when it finishes.
///
/// `load` is expected to apply its result to whatever it loads into before
/// returning, so that once the tracker fires every loaded asset is in place.
pub(crate) fn spawn_load<T, F>(token: LoadToken, timeout: Option<Duration>, load: F) -> LoadHandle<T>
where
    T: 'static,
    F: Future<Output = anyhow::Result<T>> + 'static,
{
    let asset = token.asset().to_string();
    let (tx, rx) = oneshot::channel();
    let handle_asset = asset.clone();
    spawn_local(async move {
        let result = match with_timeout(timeout, load).await {
            Ok(value) => {
                token.complete();
                Ok(value)
            }
            Err(err) => {
                let kind = if err.is::<TimedOut>() {
                    FailureKind::TimedOut
                } else {
                    FailureKind::Failed
                };
                token.fail(kind, format!("{err:#}"));
                Err(WorldError::load_failed(asset, err))
            }
        };
        // Nobody awaiting the handle is fine.
        let _ = tx.send(result);
    });
    LoadHandle {
        asset: handle_asset,
        rx,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn asset_paths_resolve_against_the_root_unless_absolute() {
        assert_eq!(resolve_asset_path("file:///tmp/a.png"), Path::new("/tmp/a.png"));
        assert_eq!(resolve_asset_path("/tmp/a.png"), Path::new("/tmp/a.png"));
        assert!(resolve_asset_path("textures/a.png").ends_with("textures/a.png"));
        assert!(resolve_asset_path("textures/a.png").starts_with(crate::config::asset_root()));
    }

    #[test]
    fn siblings_share_the_directory() {
        assert_eq!(sibling_path("models/hut.gltf", "hut.bin"), "models/hut.bin");
        assert_eq!(sibling_path("hut.gltf", "hut.bin"), "hut.bin");
    }

    #[test]
    fn ready_handles_resolve_immediately() {
        let value = futures::executor::block_on(LoadHandle::ready("x", 7));
        assert_eq!(value.unwrap(), 7);
    }
}
