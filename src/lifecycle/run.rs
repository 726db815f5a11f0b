use super::machine::Machine;
use std::sync::Weak;
use tracing::trace;

/// Capability handed to a start routine to report that it is operational.
///
/// A routine receives exactly one `Run` per start and can signal at most once,
/// since [`Run::operational`] consumes it:
///
/// ```ignore
/// let database = Routine::new("database", |run| async move {
///     let pool = Pool::connect(url).await?;
///     run.operational(pool.clone()).await; // parked until Stop
///     pool.close().await;
///     Ok(())
/// });
/// ```
pub struct Run<T> {
    machine: Weak<Machine<T>>,
}

impl<T: Clone + Send + Sync + 'static> Run<T> {
    pub(crate) fn new(machine: Weak<Machine<T>>) -> Self {
        Self { machine }
    }

    /// Publish `result` as `Started` and park until the component is told to stop.
    ///
    /// Returns when `Stop` is received, or right away if the component can no
    /// longer become operational (it was dropped or has failed). Either way the
    /// code after the await is the routine's cleanup.
    pub async fn operational(self, result: T) {
        let resumed = match self.machine.upgrade() {
            Some(machine) => machine.operational(result),
            None => None,
        };

        if let Some(resumed) = resumed {
            // An error means the sender was dropped: failure or teardown
            if resumed.await.is_err() {
                trace!("Routine released without a stop request");
            }
        }
    }
}
