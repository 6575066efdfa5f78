//! Batched assertions
//!
//! A [`BatchAssertion`] queues independent checks and runs all of them,
//! collecting every failure instead of stopping at the first one. A check
//! fails either by returning `Err(message)` or by panicking (for example
//! through `assert_eq!`); both are captured and aggregated in insertion
//! order into a single [`BatchFailure`].

use std::any::Any;
use std::fmt;
use std::fmt::Debug;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Outcome of a single queued check
pub type CheckResult = std::result::Result<(), String>;

type CheckFn<'a> = Box<dyn FnOnce() -> CheckResult + 'a>;

struct QueuedCheck<'a> {
    context: Option<String>,
    check: CheckFn<'a>,
}

/// One failed check, with the context it was queued under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    /// Position of the check in the batch (1-based)
    pub position: usize,
    /// Caller-supplied label, if any
    pub context: Option<String>,
    pub message: String,
}

/// Aggregated failure raised by [`BatchAssertion::assert_all`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Number of checks that ran
    pub total: usize,
    /// Failures in insertion order
    pub failures: Vec<CheckFailure>,
}

impl BatchFailure {
    /// Failure of a single, unbatched check
    pub fn single(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            total: 1,
            failures: vec![CheckFailure {
                position: 1,
                context: Some(context.into()),
                message: message.into(),
            }],
        }
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} of {} checks failed:",
            self.failures.len(),
            self.total
        )?;
        for failure in &self.failures {
            match &failure.context {
                Some(context) => writeln!(f, "\n[{}] {}:", failure.position, context)?,
                None => writeln!(f, "\n[{}]:", failure.position)?,
            }
            for line in failure.message.lines() {
                writeln!(f, "    {line}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for BatchFailure {}

/// Accumulator of independent checks
#[derive(Default)]
pub struct BatchAssertion<'a> {
    checks: Vec<QueuedCheck<'a>>,
}

impl<'a> BatchAssertion<'a> {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Number of queued checks
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Queue an unlabeled check
    pub fn add<F>(&mut self, check: F) -> &mut Self
    where
        F: FnOnce() -> CheckResult + 'a,
    {
        self.checks.push(QueuedCheck {
            context: None,
            check: Box::new(check),
        });
        self
    }

    /// Queue a check labeled with `context`
    pub fn add_labeled<F>(&mut self, context: impl Into<String>, check: F) -> &mut Self
    where
        F: FnOnce() -> CheckResult + 'a,
    {
        self.checks.push(QueuedCheck {
            context: Some(context.into()),
            check: Box::new(check),
        });
        self
    }

    /// Queue an equality check
    pub fn eq<T>(&mut self, context: impl Into<String>, expected: T, actual: T) -> &mut Self
    where
        T: PartialEq + Debug + 'a,
    {
        self.add_labeled(context, move || {
            if expected == actual {
                Ok(())
            } else {
                Err(format!("expected: {expected:?}\nactual:   {actual:?}"))
            }
        })
    }

    /// Queue a check that `haystack` contains `needle`
    pub fn contains(
        &mut self,
        context: impl Into<String>,
        haystack: impl Into<String>,
        needle: impl Into<String>,
    ) -> &mut Self {
        let haystack = haystack.into();
        let needle = needle.into();
        self.add_labeled(context, move || {
            if haystack.contains(&needle) {
                Ok(())
            } else {
                Err(format!("expected to find: {needle:?}\nin:               {haystack:?}"))
            }
        })
    }

    /// Queue a check that always fails with `message`
    pub fn fail(&mut self, context: impl Into<String>, message: impl Into<String>) -> &mut Self {
        let message = message.into();
        self.add_labeled(context, move || Err(message))
    }

    /// Run every queued check in insertion order and aggregate the failures
    pub fn assert_all(self) -> Result<(), BatchFailure> {
        let total = self.checks.len();
        let mut failures = Vec::new();

        for (index, queued) in self.checks.into_iter().enumerate() {
            let outcome = match catch_unwind(AssertUnwindSafe(queued.check)) {
                Ok(result) => result,
                Err(payload) => Err(panic_message(payload.as_ref())),
            };
            if let Err(message) = outcome {
                failures.push(CheckFailure {
                    position: index + 1,
                    context: queued.context,
                    message,
                });
            }
        }

        tracing::debug!("batch finished: {} of {} checks failed", failures.len(), total);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BatchFailure { total, failures })
        }
    }

    /// Like [`assert_all`](Self::assert_all), but panics with the aggregated report
    #[track_caller]
    pub fn assert(self) {
        if let Err(failure) = self.assert_all() {
            panic!("{failure}");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "check panicked".to_string()
    }
}
