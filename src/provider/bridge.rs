//! Blocking wrapper over cancellable async work.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Run `future` on `runtime` and block the calling thread until it
/// completes or `cancel` fires.
///
/// On cancellation `None` is returned at once, even when the future is
/// stuck in blocking code, and the future is dropped on the runtime as
/// soon as it yields. Must be called from a thread outside the runtime.
pub fn block_on_cancellable<F>(runtime: &Handle, cancel: &CancellationToken, future: F) -> Option<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    if cancel.is_cancelled() {
        return None;
    }

    let (tx, rx) = oneshot::channel();
    let token = cancel.clone();

    let task = runtime.spawn(async move {
        let result = tokio::select! {
            biased;
            () = token.cancelled() => None,
            value = future => Some(value),
        };
        let _ = tx.send(result);
    });

    runtime.block_on(async {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                task.abort();
                None
            }
            // a dropped sender means the runtime shut down underneath us
            result = rx => result.ok().flatten(),
        }
    })
}
