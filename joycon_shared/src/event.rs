use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Clone, Error, Debug)]
pub enum EventError {
    #[error("failed to subscribe events")]
    SubscriptionFailed,
}

pub struct SubscriptionReq<T> {
    tx: mpsc::UnboundedSender<T>,
    ready_tx: oneshot::Sender<()>,
}

/// Fans out cloneable events to every live subscriber.
///
/// Events dispatched while nobody is subscribed are dropped. Subscribers whose
/// receiver has been dropped are pruned on the next dispatch.
#[derive(Debug)]
pub struct EventDispatcher<T> {
    msg_tx: mpsc::UnboundedSender<T>,
    sub_tx: mpsc::Sender<SubscriptionReq<T>>,
}

impl<T> Clone for EventDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            msg_tx: self.msg_tx.clone(),
            sub_tx: self.sub_tx.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> EventDispatcher<T> {
    /// Spawns the relay task, thus must be called within a tokio runtime.
    pub fn new() -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (sub_tx, sub_rx) = mpsc::channel(1);
        tokio::spawn(handle_events(msg_rx, sub_rx));
        Self { msg_tx, sub_tx }
    }

    /// Safe to call from blocking threads.
    pub fn dispatch(&self, evt: T) {
        let _ = self.msg_tx.send(evt);
    }

    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<T>, EventError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        self.sub_tx
            .send(SubscriptionReq { tx, ready_tx })
            .await
            .map_err(|_| EventError::SubscriptionFailed)?;
        ready_rx.await.map_err(|_| EventError::SubscriptionFailed)?;
        Ok(rx)
    }
}

async fn handle_events<T: Clone>(
    mut msg_rx: mpsc::UnboundedReceiver<T>,
    mut sub_rx: mpsc::Receiver<SubscriptionReq<T>>,
) {
    let mut subs: Vec<mpsc::UnboundedSender<T>> = vec![];
    loop {
        tokio::select! {
            sub_opts = sub_rx.recv() => {
                match sub_opts {
                    Some(SubscriptionReq { tx, ready_tx }) => {
                        // Flush what was dispatched before the request so the
                        // new subscriber only sees later events.
                        while let Ok(evt) = msg_rx.try_recv() {
                            subs.retain(|tx| tx.send(evt.clone()).is_ok());
                        }
                        subs.push(tx);
                        let _ = ready_tx.send(());
                    }
                    None => break,
                };
            },
            msg = msg_rx.recv() => {
                match msg {
                    Some(evt) => {
                        subs.retain(|tx| tx.send(evt.clone()).is_ok());
                    }
                    None => break,
                }
            },
        }
    }
}
