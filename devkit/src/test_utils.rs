/*!
Helpers génériques pour tests async
*/

use std::time::{Duration, Instant};

/// Init logging pour tests (idempotent)
pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Réessaie `condition` toutes les 10ms jusqu'à `timeout`.
/// Retourne `true` si la condition a fini par être vraie.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if condition() {
            return true;
        }
        if start.elapsed() >= timeout {
            log::warn!("⏰ condition still false after {:?}", timeout);
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
