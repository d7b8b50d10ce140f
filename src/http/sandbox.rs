//! Failure isolation for application code.
//!
//! Handlers and middleware hooks run inside the sandbox. A panic is caught
//! and turned into [`HandlerError::Panicked`]; the connection and the
//! process keep running.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures_util::FutureExt;

use crate::http::clean_room::CleanRoom;
use crate::http::error::HandlerError;

pub struct Sandbox;

impl Sandbox {
    /// Run a synchronous callable against the room.
    pub fn run<T, F>(room: &mut CleanRoom, f: F) -> Result<T, HandlerError>
    where
        F: FnOnce(&mut CleanRoom) -> T,
    {
        panic::catch_unwind(AssertUnwindSafe(|| f(room))).map_err(Self::caught)
    }

    /// Drive a fallible future to completion, catching panics.
    pub async fn run_async<T, F>(future: F) -> Result<T, HandlerError>
    where
        F: Future<Output = Result<T, HandlerError>>,
    {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(Self::caught(payload)),
        }
    }

    fn caught(payload: Box<dyn Any + Send>) -> HandlerError {
        let message = panic_message(payload.as_ref());
        tracing::error!(panic = %message, "Handler panicked");
        HandlerError::Panicked(message)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
