//! Tokio runtime shared by blocking object store calls

use crate::error::Result;
use std::future::Future;
use std::sync::OnceLock;
use tokio::runtime::{Builder, Runtime};

/// Get or create the shared runtime used to drive remote backends.
pub(crate) fn runtime() -> Result<&'static Runtime> {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();

    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }
    let runtime = Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("twinstore-remote")
        .build()?;
    Ok(RUNTIME.get_or_init(|| runtime))
}

/// Run `future` to completion on the shared runtime.
///
/// Must not be called from inside an async context; attachments are synchronous.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    Ok(runtime()?.block_on(future))
}
