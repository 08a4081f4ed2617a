//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (catalog, download
//! records, metadata, transfers, audio output) into one playback engine, one
//! download manager and one session store. Desktop apps typically enable the
//! `desktop-shims` feature (which depends on `bridge-desktop`) and start with
//! [`bootstrap_desktop`]; mobile hosts build a
//! [`CoreConfig`](core_runtime::config::CoreConfig) from their own adapters.

pub mod error;
mod service;

pub use error::{CoreError, Result};
pub use service::{CoreService, CoreServiceBuilder};

#[cfg(feature = "desktop-shims")]
use bridge_traits::AudioOutput;
#[cfg(feature = "desktop-shims")]
use std::path::PathBuf;
#[cfg(feature = "desktop-shims")]
use std::sync::Arc;

/// File name of the library database inside the data directory.
pub const DATABASE_FILE_NAME: &str = "qariee.db";

/// Convenience bootstrapper for desktop hosts.
///
/// Opens the library database in `data_dir` (default: the platform data
/// directory) and fills every other bridge with its desktop default.
/// Sessions can only be restored once an audio output is attached.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # async fn example(
/// #     output: std::sync::Arc<dyn bridge_traits::AudioOutput>,
/// # ) -> core_service::Result<()> {
/// use core_service::bootstrap_desktop;
///
/// let core = bootstrap_desktop(None, Some(output)).await?;
/// core.restore_session().await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    data_dir: Option<PathBuf>,
    audio_output: Option<Arc<dyn AudioOutput>>,
) -> Result<CoreService> {
    use bridge_desktop::{SqliteLibraryStore, TokioFileSystem};
    use core_runtime::config::CoreConfig;

    let data_dir = data_dir.unwrap_or_else(TokioFileSystem::default_data_dir);
    let database_path = data_dir.join(DATABASE_FILE_NAME);
    let store = SqliteLibraryStore::new(&database_path, data_dir.clone(), None)
        .await
        .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;

    let mut builder = CoreConfig::builder()
        .database_path(database_path)
        .data_dir(data_dir)
        .library_store(Arc::new(store));
    if let Some(output) = audio_output {
        builder = builder.audio_output(output);
    }

    CoreService::new(builder.build()?).await
}
