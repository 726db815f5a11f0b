use crate::component::{Component, ComponentExt, LockGuard, Routine};
use crate::error::{DependencyFailure, LifelineError, Result};
use crate::lifecycle::Run;
use futures::future::{join_all, BoxFuture};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// A fixed set of components a composite needs while it runs.
///
/// Implemented for tuples of one to five `Arc<C>` with heterogeneous outputs
/// and for `Vec<Arc<C>>` with a common output.
pub trait Dependencies: Send + Sync + 'static {
    /// Results in declaration order
    type Results: Send + 'static;

    /// Number of components in the set
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start and lock every member concurrently and read their results.
    ///
    /// On failure every lock already acquired is released before returning.
    fn acquire(&self) -> BoxFuture<'_, Result<(Self::Results, Vec<LockGuard>)>>;
}

/// Drive every start-and-lock to completion and collect the guards.
///
/// All attempts run to the end so the error lists every failing member. Guards
/// from members that did lock are dropped (unlocked) if any member failed.
pub(crate) async fn lock_all(
    attempts: Vec<BoxFuture<'_, Result<LockGuard>>>,
) -> Result<Vec<LockGuard>> {
    let total = attempts.len();
    let mut guards = Vec::with_capacity(total);
    let mut failures = Vec::new();

    for (index, outcome) in join_all(attempts).await.into_iter().enumerate() {
        match outcome {
            Ok(guard) => guards.push(guard),
            Err(error) => failures.push(DependencyFailure { index, error }),
        }
    }

    if failures.is_empty() {
        return Ok(guards);
    }

    for failure in &failures {
        warn!("Dependency {} failed to start: {}", failure.index, failure.error);
    }
    if !guards.is_empty() {
        debug!(
            "Releasing {} locks acquired before the failure",
            guards.len()
        );
    }
    drop(guards);

    Err(LifelineError::Dependencies { total, failures })
}

impl<C: Component + ?Sized> Dependencies for Vec<Arc<C>> {
    type Results = Vec<C::Output>;

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn acquire(&self) -> BoxFuture<'_, Result<(Self::Results, Vec<LockGuard>)>> {
        Box::pin(async move {
            let guards = lock_all(self.iter().map(|member| member.start_and_lock()).collect()).await?;
            let results = self
                .iter()
                .map(|member| member.result())
                .collect::<Result<Vec<_>>>()?;
            Ok((results, guards))
        })
    }
}

macro_rules! tuple_dependencies {
    ($len:expr => $($dep:ident : $idx:tt),+) => {
        impl<$($dep),+> Dependencies for ($(Arc<$dep>,)+)
        where
            $($dep: Component + ?Sized,)+
        {
            type Results = ($(<$dep as Component>::Output,)+);

            fn len(&self) -> usize {
                $len
            }

            fn acquire(&self) -> BoxFuture<'_, Result<(Self::Results, Vec<LockGuard>)>> {
                Box::pin(async move {
                    let guards = lock_all(vec![$(self.$idx.start_and_lock()),+]).await?;
                    let results = ($(self.$idx.result()?,)+);
                    Ok((results, guards))
                })
            }
        }
    };
}

tuple_dependencies!(1 => A: 0);
tuple_dependencies!(2 => A: 0, B: 1);
tuple_dependencies!(3 => A: 0, B: 1, C: 2);
tuple_dependencies!(4 => A: 0, B: 1, C: 2, D: 3);
tuple_dependencies!(5 => A: 0, B: 1, C: 2, D: 3, E: 4);

/// Create a component whose routine runs while all `dependencies` are locked.
///
/// The routine receives the dependencies' results in declaration order. The
/// locks are held until the routine returns, cleanup included, so the
/// dependencies stay started for as long as this component is. If any
/// dependency fails to start, the component fails and `routine` is never called.
pub fn with_dependencies<T, D, F, Fut>(
    name: impl Into<String>,
    dependencies: D,
    routine: F,
) -> Arc<Routine<T>>
where
    T: Clone + Send + Sync + 'static,
    D: Dependencies,
    F: Fn(Run<T>, D::Results) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let dependencies = Arc::new(dependencies);
    let routine = Arc::new(routine);

    Routine::new(name, move |run| {
        let dependencies = Arc::clone(&dependencies);
        let routine = Arc::clone(&routine);
        async move {
            let (results, guards) = dependencies.acquire().await?;
            let outcome = (*routine)(run, results).await;
            drop(guards);
            outcome
        }
    })
}
