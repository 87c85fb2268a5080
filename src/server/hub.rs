//! 实时广播中心
//!
//! 基于 tokio broadcast 通道的发布/订阅：发布永不阻塞，
//! 慢订阅者落后时直接丢弃积压事件（Lagged），不会拖慢文件写入。

use tokio::sync::broadcast;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::server::protocol::ServerEvent;

/// 每个实时连接的身份标识
pub type ClientId = Uuid;

#[derive(Debug, Clone)]
pub struct Broadcast {
    /// 发起者连接，投递时跳过
    pub origin: Option<ClientId>,
    pub event: ServerEvent,
}

#[derive(Debug, Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<Broadcast>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fire-and-forget fan-out; returns the number of subscribers reached
    pub fn publish(&self, origin: Option<ClientId>, event: ServerEvent) -> usize {
        trace!(?origin, ?event, "Publishing event");
        // 无订阅者时 send 返回 Err，属于正常情况
        self.tx.send(Broadcast { origin, event }).unwrap_or(0)
    }

    /// New subscriber with a fresh id. Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscription {
    id: ClientId,
    rx: broadcast::Receiver<Broadcast>,
}

impl Subscription {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Next event not originated by this subscriber; `None` once the hub is gone
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        loop {
            match self.rx.recv().await {
                Ok(Broadcast { origin, event }) => {
                    if origin == Some(self.id) {
                        continue;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(client_id = %self.id, "Subscriber lagged, dropped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
