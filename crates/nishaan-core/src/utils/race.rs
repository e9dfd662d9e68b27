//! Async racing helpers.

use std::future::Future;
use std::pin::pin;

use futures::future::{self, Either};
use tokio::task::JoinHandle;

/// Wait for whichever of `left` or `right` settles first.
///
/// The loser is dropped. To let a losing leg run to completion anyway,
/// pass it in as a `detached` handle: dropping a `JoinHandle` does not
/// cancel the task behind it.
pub async fn first_to_settle<L, R>(left: L, right: R) -> Either<L::Output, R::Output>
where
    L: Future,
    R: Future,
{
    match future::select(pin!(left), pin!(right)).await {
        Either::Left((value, _)) => Either::Left(value),
        Either::Right((value, _)) => Either::Right(value),
    }
}

/// Run `task` on the runtime independently of whoever awaits the handle.
pub fn detached<F>(task: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(task)
}
