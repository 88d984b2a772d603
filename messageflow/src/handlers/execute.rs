//! Running a handler method and normalising its outcome.
//!
//! Handler errors and panics never escape from here: both come back as
//! `Err`, with [`InvocationError`] wrappers peeled off.

use super::{Dependencies, HandlerInstance, HandlerMethod, HandlerOutput, Invocation};
use crate::core::Payload;
use crate::errors::{HandlerPanic, InvocationError};
use futures::FutureExt;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Runs a handler on the calling thread.
///
/// Async handlers are driven to completion with a local executor.
pub fn run_sync(
    method: &HandlerMethod,
    instance: Option<&mut HandlerInstance>,
    message: &mut dyn Payload,
    deps: &Dependencies,
) -> HandlerOutput {
    let outcome = catch_unwind(AssertUnwindSafe(move || {
        match method.invoke(instance.map(HandlerInstance::as_any_mut), message, deps) {
            Invocation::Ready(output) => output,
            Invocation::Pending(future) => futures::executor::block_on(future),
        }
    }));
    normalize(outcome)
}

/// Runs a handler, awaiting it if it is async.
///
/// Synchronous handlers run inline without an async adapter.
pub async fn run_async(
    method: &HandlerMethod,
    instance: Option<&mut HandlerInstance>,
    message: &mut dyn Payload,
    deps: &Dependencies,
) -> HandlerOutput {
    let started = catch_unwind(AssertUnwindSafe(move || {
        method.invoke(instance.map(HandlerInstance::as_any_mut), message, deps)
    }));
    match started {
        Ok(Invocation::Ready(output)) => unwrap_invocation(output),
        Ok(Invocation::Pending(future)) => normalize(AssertUnwindSafe(future).catch_unwind().await),
        Err(panic) => Err(panic_error(panic.as_ref())),
    }
}

fn normalize(outcome: std::thread::Result<HandlerOutput>) -> HandlerOutput {
    match outcome {
        Ok(output) => unwrap_invocation(output),
        Err(panic) => Err(panic_error(panic.as_ref())),
    }
}

fn unwrap_invocation(output: HandlerOutput) -> HandlerOutput {
    output.map_err(|e| match e.downcast::<InvocationError>() {
        Ok(wrapper) => wrapper.into_inner(),
        Err(e) => e,
    })
}

fn panic_error(payload: &(dyn Any + Send)) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    HandlerPanic { message }.into()
}
