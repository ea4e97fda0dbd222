use std::future::Future;
use std::time::Instant;

use tracing::debug;

/// Await `work`, log how long it took, hand back its output unchanged.
///
/// One decorator covers every unit of work: synchronous callers wrap
/// themselves in an `async` block at the call site.
pub async fn timed<T>(label: &str, work: impl Future<Output = T>) -> T {
    let start = Instant::now();
    let output = work.await;
    debug!("{} took {:.1?}", label, start.elapsed());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_output_through() {
        assert_eq!(timed("answer", async { 42 }).await, 42);
    }

    #[tokio::test]
    async fn wraps_fallible_work() {
        let result: anyhow::Result<&str> = timed("ok", async { Ok("done") }).await;
        assert_eq!(result.unwrap(), "done");
    }
}
