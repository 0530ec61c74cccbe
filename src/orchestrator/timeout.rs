//! Running one action against its deadline

use crate::catalog::RecoveryAction;
use crate::errors::ActionFailure;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;

/// Result of one action run.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub result: Result<(), ActionFailure>,
    pub duration: Duration,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
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

/// Run `action` until it settles or its timeout elapses, whichever is first.
///
/// The operation future is dropped when the deadline wins, so a late
/// completion can never be observed. Panics inside the operation are
/// reported as failures.
pub async fn run_action(action: &RecoveryAction) -> ActionOutcome {
    let started = Instant::now();
    let operation = action.operation();
    let guarded = AssertUnwindSafe(async move { operation.execute().await }).catch_unwind();

    let result = match tokio::time::timeout(action.timeout(), guarded).await {
        Ok(Ok(Ok(true))) => Ok(()),
        Ok(Ok(Ok(false))) => Err(ActionFailure::Returned {
            action: action.id.clone(),
        }),
        Ok(Ok(Err(e))) => Err(ActionFailure::Errored {
            action: action.id.clone(),
            message: format!("{:#}", e),
        }),
        Ok(Err(payload)) => Err(ActionFailure::Panicked {
            action: action.id.clone(),
            message: panic_message(payload.as_ref()),
        }),
        Err(_) => Err(ActionFailure::TimedOut {
            action: action.id.clone(),
            timeout: action.timeout(),
        }),
    };

    ActionOutcome {
        result,
        duration: started.elapsed(),
    }
}
