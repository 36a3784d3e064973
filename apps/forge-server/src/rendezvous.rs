use std::collections::HashMap;

use forge_protocol::Task;
use tokio::sync::{oneshot, Mutex};

/// One-shot mailboxes pairing a waiting `run_single_task` caller with the
/// agent's eventual report. At most one slot per task id; delivery is
/// non-blocking and a report with no waiter is dropped.
#[derive(Default)]
pub(crate) struct Rendezvous {
    slots: Mutex<HashMap<String, oneshot::Sender<Task>>>,
}

impl Rendezvous {
    /// Open a slot for `task_id` and return the receiving half.
    pub async fn subscribe(&self, task_id: &str) -> oneshot::Receiver<Task> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().await.insert(task_id.to_string(), tx);
        rx
    }

    /// Hand a reported task to its waiter, if any. Returns whether a
    /// caller was actually woken.
    pub async fn deliver(&self, task: Task) -> bool {
        let sender = self.slots.lock().await.remove(&task.task_id);
        match sender {
            Some(tx) => tx.send(task).is_ok(),
            None => false,
        }
    }

    /// Drop the slot for `task_id`; used on the caller's timeout path.
    pub async fn cancel(&self, task_id: &str) {
        self.slots.lock().await.remove(task_id);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_protocol::TaskStatus;

    fn task(id: &str, result: &str) -> Task {
        Task {
            task_id: id.into(),
            task_type: "PING".into(),
            do_status: TaskStatus::Success,
            create_at: Utc::now(),
            payload: String::new(),
            result: result.into(),
        }
    }

    #[tokio::test]
    async fn delivery_wakes_the_subscriber_once() {
        let rv = Rendezvous::default();
        let rx = rv.subscribe("t1").await;
        assert!(rv.deliver(task("t1", "world")).await);
        assert_eq!(rx.await.unwrap().result, "world");
        // The slot is consumed; a second report finds nobody.
        assert!(!rv.deliver(task("t1", "again")).await);
        assert_eq!(rv.len().await, 0);
    }

    #[tokio::test]
    async fn delivery_without_a_waiter_is_dropped() {
        let rv = Rendezvous::default();
        assert!(!rv.deliver(task("ghost", "x")).await);
    }

    #[tokio::test]
    async fn cancel_clears_the_slot() {
        let rv = Rendezvous::default();
        let rx = rv.subscribe("t2").await;
        rv.cancel("t2").await;
        assert_eq!(rv.len().await, 0);
        assert!(rx.await.is_err());
        assert!(!rv.deliver(task("t2", "late")).await);
    }
}
