//! Shared notification state for blocked XREAD clients.
//!
//! Each blocked XREAD registers a subscriber per requested stream key. XADD
//! notifies every subscriber of the touched key so blocked readers can
//! re-check their streams instead of polling.

use std::collections::HashMap;

use tokio::sync::mpsc;

#[derive(Debug)]
pub struct XreadSubscriber {
    pub client_address: String,
    pub sender: mpsc::Sender<()>,
}

#[derive(Debug, Default)]
pub struct State {
    xread_subscribers: HashMap<String, Vec<XreadSubscriber>>,
}

impl State {
    pub fn new() -> Self {
        State {
            xread_subscribers: HashMap::new(),
        }
    }

    pub fn add_xread_subscriber(&mut self, key: String, subscriber: XreadSubscriber) {
        self.xread_subscribers
            .entry(key)
            .or_default()
            .push(subscriber);
    }

    /// Drops every subscription the given client holds on the given keys.
    pub fn remove_xread_subscribers(&mut self, keys: &[String], client_address: &str) {
        for key in keys {
            if let Some(subscribers) = self.xread_subscribers.get_mut(key) {
                subscribers.retain(|subscriber| subscriber.client_address != client_address);

                if subscribers.is_empty() {
                    self.xread_subscribers.remove(key);
                }
            }
        }
    }

    /// Wakes every client blocked on the given stream key.
    pub fn notify_xread_subscribers(&mut self, key: &str) {
        if let Some(subscribers) = self.xread_subscribers.get_mut(key) {
            for subscriber in subscribers.iter() {
                // A full or closed channel means the reader is already awake
                // or gone; either way there is nothing to deliver.
                let _ = subscriber.sender.try_send(());
            }
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, key: &str) -> usize {
        self.xread_subscribers
            .get(key)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::{State, XreadSubscriber};

    #[tokio::test]
    async fn test_add_notify_and_remove_subscribers() {
        let mut state = State::new();
        let (sender, mut receiver) = mpsc::channel(32);

        state.add_xread_subscriber(
            "events".to_string(),
            XreadSubscriber {
                client_address: "127.0.0.1:5000".to_string(),
                sender,
            },
        );
        assert_eq!(state.subscriber_count("events"), 1);

        state.notify_xread_subscribers("events");
        assert_eq!(receiver.recv().await, Some(()));

        state.notify_xread_subscribers("other");

        state.remove_xread_subscribers(&["events".to_string()], "127.0.0.1:5000");
        assert_eq!(state.subscriber_count("events"), 0);
    }

    #[tokio::test]
    async fn test_remove_only_matching_client() {
        let mut state = State::new();
        let (first_sender, _first_receiver) = mpsc::channel(32);
        let (second_sender, mut second_receiver) = mpsc::channel(32);

        state.add_xread_subscriber(
            "events".to_string(),
            XreadSubscriber {
                client_address: "127.0.0.1:5000".to_string(),
                sender: first_sender,
            },
        );
        state.add_xread_subscriber(
            "events".to_string(),
            XreadSubscriber {
                client_address: "127.0.0.1:5001".to_string(),
                sender: second_sender,
            },
        );

        state.remove_xread_subscribers(&["events".to_string()], "127.0.0.1:5000");
        assert_eq!(state.subscriber_count("events"), 1);

        state.notify_xread_subscribers("events");
        assert_eq!(second_receiver.recv().await, Some(()));
    }
}
