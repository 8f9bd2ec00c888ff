use core::cell::RefCell;

use alloc::{collections::VecDeque, sync::Arc, vec::Vec};
use critical_section::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("the queue has been closed")]
pub struct Closed;

#[derive(Debug, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// The queue is at capacity; try again once the consumer has run
    Full(T),
    Closed(T),
}

impl<T> TrySendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(t) | TrySendError::Closed(t) => t,
        }
    }
}

pub struct Sender<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Sender<T> {
    pub fn try_send(&self, item: T) -> Result<(), TrySendError<T>> {
        critical_section::with(|cs| {
            let mut q = self.inner.queue.borrow(cs).borrow_mut();
            if q.closed {
                Err(TrySendError::Closed(item))
            } else if q.items.len() >= q.capacity {
                Err(TrySendError::Full(item))
            } else {
                q.items.push_back(item);
                Ok(())
            }
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close(&self) {
        self.inner.close()
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Sender<T> {
        Sender {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Receiver<T> {
    /// Oldest item. `WouldBlock` while empty, `Closed` once empty and closed.
    pub fn try_recv(&self) -> nb::Result<T, Closed> {
        critical_section::with(|cs| {
            let mut q = self.inner.queue.borrow(cs).borrow_mut();
            match q.items.pop_front() {
                Some(item) => Ok(item),
                None if q.closed => Err(nb::Error::Other(Closed)),
                None => Err(nb::Error::WouldBlock),
            }
        })
    }

    /// Puts an item back at the head, ahead of everything queued. May exceed
    /// the capacity by the items taken out since the last check.
    pub fn requeue(&self, item: T) {
        critical_section::with(|cs| {
            self.inner.queue.borrow(cs).borrow_mut().items.push_front(item);
        })
    }

    /// Takes everything queued so far in one critical section
    pub fn recv_all(&self) -> Recv<T> {
        critical_section::with(|cs| {
            let mut q = self.inner.queue.borrow(cs).borrow_mut();
            Recv::new(q.items.drain(..).rev().collect())
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close(&self) {
        self.inner.close()
    }
}

struct Inner<T> {
    queue: Mutex<RefCell<Queue<T>>>,
}

struct Queue<T> {
    items: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

impl<T> Inner<T> {
    fn len(&self) -> usize {
        critical_section::with(|cs| self.queue.borrow(cs).borrow().items.len())
    }

    fn close(&self) {
        critical_section::with(|cs| self.queue.borrow(cs).borrow_mut().closed = true)
    }
}

/// Items in reverse order, popped from the back
pub struct Recv<T> {
    contents: Vec<T>,
}

impl<T> Recv<T> {
    pub fn new(contents: Vec<T>) -> Recv<T> {
        Recv { contents }
    }
}

impl<T> Iterator for Recv<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.contents.pop()
    }
}

/// A bounded FIFO shared by any number of producers and one consumer
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let inner = Inner {
        queue: Mutex::new(RefCell::new(Queue {
            items: VecDeque::with_capacity(capacity),
            capacity,
            closed: false,
        })),
    };
    let inner = Arc::new(inner);
    (
        Sender {
            inner: inner.clone(),
        },
        Receiver { inner },
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn items_come_out_in_order() {
        let (tx, rx) = channel(4);
        for i in 0..3 {
            tx.try_send(i).unwrap();
        }
        assert_eq!(rx.try_recv(), Ok(0));
        rx.requeue(9);
        assert_eq!(rx.recv_all().collect::<Vec<_>>(), [9, 1, 2]);
        assert_eq!(rx.try_recv(), Err(nb::Error::WouldBlock));
    }

    #[test]
    fn full_queue_hands_the_item_back() {
        let (tx, rx) = channel(2);
        tx.try_send('a').unwrap();
        tx.try_send('b').unwrap();
        assert_eq!(tx.try_send('c'), Err(TrySendError::Full('c')));
        assert_eq!(rx.len(), 2);
        rx.try_recv().unwrap();
        assert!(tx.try_send('c').is_ok());
    }

    #[test]
    fn closing_drains_then_reports_closed() {
        let (tx, rx) = channel(2);
        tx.try_send(1).unwrap();
        rx.close();
        assert_eq!(tx.try_send(2).map_err(TrySendError::into_inner), Err(2));
        assert_eq!(rx.try_recv(), Ok(1));
        assert_eq!(rx.try_recv(), Err(nb::Error::Other(Closed)));
    }
}
