/// Deferred teardown of GPU objects, flushed most-recently-added-first so
/// destruction mirrors reverse creation order (a pipeline layout registered
/// before the pipelines built from it is destroyed after them).
///
/// Flushing is only valid once the device is idle; the engine calls
/// `device_wait_idle` before the single flush at shutdown.
pub struct DeletionQueue {
    deleters: Vec<Deleter>,
}

struct Deleter {
    label: &'static str,
    func: Box<dyn FnOnce()>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self {
            deleters: Vec::new(),
        }
    }

    /// Register a teardown action at the moment its resource is created.
    pub fn push<F>(&mut self, label: &'static str, func: F)
    where
        F: FnOnce() + 'static,
    {
        self.deleters.push(Deleter {
            label,
            func: Box::new(func),
        });
    }

    /// Run every pending action, newest first. Once flushed the queue is
    /// empty and flushing again is a no-op.
    pub fn flush(&mut self) {
        while let Some(deleter) = self.deleters.pop() {
            log::trace!("Destroying {}", deleter.label);
            (deleter.func)();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deleters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn flush_runs_in_reverse_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut queue = DeletionQueue::new();

        for i in 0..4 {
            let order = order.clone();
            queue.push("entry", move || order.borrow_mut().push(i));
        }
        queue.flush();

        assert_eq!(*order.borrow(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn flush_empties_the_queue_and_reflushing_is_a_noop() {
        let count = Rc::new(RefCell::new(0));
        let mut queue = DeletionQueue::new();

        {
            let count = count.clone();
            queue.push("entry", move || *count.borrow_mut() += 1);
        }

        queue.flush();
        assert!(queue.is_empty());
        assert_eq!(*count.borrow(), 1);

        // Each action runs exactly once
        queue.flush();
        assert_eq!(*count.borrow(), 1);
    }
}
