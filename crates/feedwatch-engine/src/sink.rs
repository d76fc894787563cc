//! Notification sink seam: implemented by the host chat/notification layer.

use async_trait::async_trait;

use feedwatch_core::{DeliveryError, Item};

/// Accepts items for delivery, one at a time, in the order given.
///
/// `Ok(())` is the acknowledgement the engine advances the cursor on. A sink
/// may see the same item twice after a crash; de-duplication is the engine's
/// job, not the sink's.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, item: &Item) -> Result<(), DeliveryError>;
}
