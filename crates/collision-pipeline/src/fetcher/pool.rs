//! Bounded worker pool with a single result collector.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::mpsc;
use std::thread;

/// Run `work` over `items` on at most `workers` threads.
///
/// Workers pull items from a shared queue and send each result over a
/// channel. `on_result` runs on the calling thread only, in completion
/// order, so it can own counters without synchronization. Returns once every
/// item has been processed.
pub(crate) fn run_pool<T, R, W, C>(items: Vec<T>, workers: usize, work: W, mut on_result: C)
where
    T: Send,
    R: Send,
    W: Fn(T) -> R + Sync,
    C: FnMut(R),
{
    if items.is_empty() {
        return;
    }

    let workers = workers.clamp(1, items.len());
    let queue = Mutex::new(VecDeque::from(items));
    let (tx, rx) = mpsc::channel::<R>();

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let queue = &queue;
            let work = &work;
            scope.spawn(move || {
                loop {
                    let next = queue.lock().pop_front();
                    let Some(item) = next else { break };
                    if tx.send(work(item)).is_err() {
                        break;
                    }
                }
            });
        }
        // Only worker clones remain, so the loop below ends once they exit.
        drop(tx);

        for result in rx {
            on_result(result);
        }
    });
}
