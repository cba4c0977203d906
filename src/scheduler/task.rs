//! Probe task and the time-ordered queue holding it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::Endpoint;

/// A scheduled probe against one endpoint.
///
/// Tasks are owned exclusively by the scheduler: popped when due,
/// dispatched by value to the workers, and re-inserted with a fresh
/// `next_run`. They are destroyed only by a full config reload.
#[derive(Debug, Clone)]
pub struct Task {
    pub payer: String,
    pub endpoint: Endpoint,
    pub next_run: Instant,
    pub interval: Duration,
}

impl Task {
    /// Rate limiter key for this task's endpoint.
    pub fn limiter_key(&self) -> String {
        format!("{}:{}", self.payer, self.endpoint.endpoint_type)
    }
}

// Ordered by next_run only; ties between equally due tasks are arbitrary.
impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.next_run == other.next_run
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap max-heap yields the earliest next_run.
        other.next_run.cmp(&self.next_run)
    }
}

/// Min-heap of tasks keyed by `next_run`.
///
/// Not internally synchronized; the scheduler guards access with its own
/// mutex.
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: Task) {
        self.heap.push(task);
    }

    /// Remove and return the task with the earliest `next_run`.
    pub fn pop(&mut self) -> Option<Task> {
        self.heap.pop()
    }

    /// The earliest `next_run` without removing its task.
    pub fn peek_next_run(&self) -> Option<Instant> {
        self.heap.peek().map(|t| t.next_run)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(endpoint_type: &str) -> Endpoint {
        Endpoint {
            endpoint_type: endpoint_type.to_string(),
            url: Some("https://a.test".to_string()),
            path: None,
            url_contains: None,
            method: None,
            schedule: None,
            description: None,
        }
    }

    fn task(payer: &str, next_run: Instant) -> Task {
        Task {
            payer: payer.to_string(),
            endpoint: endpoint("login"),
            next_run,
            interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_pop_order_is_earliest_first() {
        let now = Instant::now();
        let mut queue = TaskQueue::new();
        queue.push(task("late", now + Duration::from_secs(30)));
        queue.push(task("early", now + Duration::from_secs(1)));
        queue.push(task("middle", now + Duration::from_secs(10)));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().unwrap().payer, "early");
        assert_eq!(queue.pop().unwrap().payer, "middle");
        assert_eq!(queue.pop().unwrap().payer, "late");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let now = Instant::now();
        let mut queue = TaskQueue::new();
        queue.push(task("only", now));

        assert_eq!(queue.peek_next_run(), Some(now));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_limiter_key() {
        let t = task("acme", Instant::now());
        assert_eq!(t.limiter_key(), "acme:login");
    }
}
