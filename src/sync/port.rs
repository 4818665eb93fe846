//! Synchronous single-message ports.
//!
//! A port is a rendezvous channel for one `i32` at a time: a sender and a
//! receiver pair up one-to-one, and whichever arrives first blocks until
//! its partner shows up. The port cycles through three states — `Idle`
//! (no message), `Started` (a sender has deposited its message), `Ended`
//! (a receiver has taken it) — and a new exchange can only begin once the
//! previous one is back at `Idle`.

use crate::sync::{Condition, Lock, SpinLock};
use std::sync::Arc;

#[derive(Clone, Copy, PartialEq, Eq)]
enum PortState {
    Idle,
    Started,
    Ended,
}

struct PortBuffer {
    state: PortState,
    message: i32,
}

/// A one-shot synchronous rendezvous channel.
///
/// # Examples
///
/// ```
/// use pampero::sync::Port;
/// use pampero::thread::ThreadBuilder;
/// use std::sync::Arc;
///
/// let port = Arc::new(Port::new("answers"));
/// let sender = Arc::clone(&port);
/// ThreadBuilder::new("sender").spawn(move || sender.send(5));
/// assert_eq!(port.receive(), 5);
/// ```
pub struct Port {
    name: String,
    lock: Arc<Lock>,
    send_started: Condition,
    send_ended: Condition,
    receive_ended: Condition,
    buffer: SpinLock<PortBuffer>,
}

impl Port {
    /// Creates an idle port.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let lock = Arc::new(Lock::new(name.clone()));
        Self {
            send_started: Condition::new(format!("{name}:sendStarted"), Arc::clone(&lock)),
            send_ended: Condition::new(format!("{name}:sendEnded"), Arc::clone(&lock)),
            receive_ended: Condition::new(format!("{name}:receiveEnded"), Arc::clone(&lock)),
            name,
            lock,
            buffer: SpinLock::new(PortBuffer {
                state: PortState::Idle,
                message: 0,
            }),
        }
    }

    /// Debug name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> PortState {
        self.buffer.lock().state
    }

    /// Deposit `message` and block until a receiver has taken it.
    pub fn send(&self, message: i32) {
        self.lock.acquire();
        while self.state() != PortState::Idle {
            self.send_ended.wait();
        }
        {
            let mut buffer = self.buffer.lock();
            buffer.message = message;
            buffer.state = PortState::Started;
        }
        self.send_started.signal();
        while self.state() != PortState::Ended {
            self.receive_ended.wait();
        }
        self.buffer.lock().state = PortState::Idle;
        // Every queued sender gets to re-examine the now-idle port.
        self.send_ended.broadcast();
        self.lock.release();
    }

    /// Block until a sender has deposited a message, then take it.
    pub fn receive(&self) -> i32 {
        self.lock.acquire();
        while self.state() != PortState::Started {
            self.send_started.wait();
        }
        let message = {
            let mut buffer = self.buffer.lock();
            buffer.state = PortState::Ended;
            buffer.message
        };
        self.receive_ended.signal();
        self.lock.release();
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Semaphore;
    use crate::thread::ThreadBuilder;

    #[test]
    fn sender_first_rendezvous() {
        let port = Arc::new(Port::new("p"));
        let sender = Arc::clone(&port);
        let t = ThreadBuilder::new("sender").spawn(move || sender.send(5));
        assert_eq!(port.receive(), 5);
        t.join().unwrap();
    }

    #[test]
    fn receiver_first_blocks_until_send() {
        let port = Arc::new(Port::new("p"));
        let started = Arc::new(Semaphore::new("receiver started", 0));
        let t = {
            let port = Arc::clone(&port);
            let started = Arc::clone(&started);
            ThreadBuilder::new("receiver").spawn(move || {
                started.v();
                port.receive()
            })
        };
        // The receiver announced itself before receive(); the exchange
        // completes whichever side wins the remaining race.
        started.p();
        port.send(42);
        assert_eq!(t.join().unwrap(), 42);
    }

    #[test]
    fn messages_pair_one_to_one() {
        let port = Arc::new(Port::new("p"));
        let senders: Vec<_> = (0..4)
            .map(|i| {
                let port = Arc::clone(&port);
                ThreadBuilder::new(format!("sender-{i}")).spawn(move || port.send(i))
            })
            .collect();
        let mut received: Vec<i32> = (0..4).map(|_| port.receive()).collect();
        for s in senders {
            s.join().unwrap();
        }
        received.sort();
        assert_eq!(received, vec![0, 1, 2, 3]);
    }
}
