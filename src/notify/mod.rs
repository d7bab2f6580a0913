//! Notification service (C9): a queued, multi-channel delivery pipeline
//! with a single consumer and independent per-method delivery.

use crate::error::{Result, RuntimeError};
use crate::providers::TtsProvider;
use crate::types::Metadata;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// A delivery channel a notification may be routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMethod {
    Log,
    Tts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
}

/// Decides whether a notification should actually be delivered through a
/// given method, e.g. a "do not disturb" hour or a per-session mute. Reads
/// a snapshot of relevant state rather than the mutable context directly
/// (§9: notifications receive a read view, never the mutable context).
pub trait NotificationPreferences: Send + Sync {
    fn should_deliver(&self, notification: &Notification, method: DeliveryMethod) -> bool;
}

/// A notification queued for delivery.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub kind: String,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    pub details: Metadata,
    pub delivery_methods: Vec<DeliveryMethod>,
    pub session_id: Option<String>,
    pub domain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub status: HashMap<DeliveryMethod, bool>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Notification {
    pub fn new(
        kind: impl Into<String>,
        priority: NotificationPriority,
        title: impl Into<String>,
        message: impl Into<String>,
        delivery_methods: Vec<DeliveryMethod>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            priority,
            title: title.into(),
            message: message.into(),
            details: Metadata::new(),
            delivery_methods,
            session_id: None,
            domain: None,
            created_at: Utc::now(),
            delivered_at: None,
            status: HashMap::new(),
            retry_count: 0,
            max_retries: 2,
        }
    }

    /// `true` if any delivery method succeeded.
    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }
}

/// Queue + single-consumer delivery loop. Cloning shares the same queue.
#[derive(Clone)]
pub struct NotificationService {
    sender: mpsc::UnboundedSender<Notification>,
}

impl NotificationService {
    /// Spawn the consumer task and return a handle to enqueue notifications.
    /// `tts_call_deadline_ms` bounds how long a single TTS delivery attempt
    /// may block before being treated as a failure for that method only.
    pub fn spawn(
        tts: Option<Arc<dyn TtsProvider>>,
        preferences: Option<Arc<dyn NotificationPreferences>>,
        tts_call_deadline_ms: u64,
    ) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Notification>();
        let loopback = sender.clone();

        tokio::spawn(async move {
            while let Some(mut notification) = receiver.recv().await {
                deliver(&mut notification, tts.as_deref(), preferences.as_deref(), tts_call_deadline_ms).await;

                if !notification.is_delivered() && notification.retry_count < notification.max_retries {
                    notification.retry_count += 1;
                    notification.status.clear();
                    let _ = loopback.send(notification);
                }
            }
        });

        Self { sender }
    }

    /// Enqueue a notification for delivery. Returns an error only if the
    /// consumer task has already shut down.
    pub fn notify(&self, notification: Notification) -> Result<()> {
        self.sender
            .send(notification)
            .map_err(|_| RuntimeError::Notification("notification queue consumer has shut down".into()))
    }
}

async fn deliver(
    notification: &mut Notification,
    tts: Option<&dyn TtsProvider>,
    preferences: Option<&dyn NotificationPreferences>,
    tts_call_deadline_ms: u64,
) {
    let methods = notification.delivery_methods.clone();
    let mut any_succeeded = false;

    for method in methods {
        if let Some(prefs) = preferences {
            if !prefs.should_deliver(notification, method) {
                notification.status.insert(method, false);
                continue;
            }
        }

        let succeeded = match method {
            DeliveryMethod::Log => {
                info!(
                    notification_id = %notification.id,
                    title = %notification.title,
                    "{}", notification.message
                );
                true
            }
            DeliveryMethod::Tts => deliver_tts(notification, tts, tts_call_deadline_ms).await,
        };

        notification.status.insert(method, succeeded);
        any_succeeded |= succeeded;
    }

    if any_succeeded {
        notification.delivered_at = Some(Utc::now());
    }
}

async fn deliver_tts(notification: &Notification, tts: Option<&dyn TtsProvider>, deadline_ms: u64) -> bool {
    let Some(provider) = tts else {
        return false;
    };
    let call = provider.speak(&notification.message, None, None, None);
    match tokio::time::timeout(Duration::from_millis(deadline_ms), call).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!("TTS notification delivery failed: {err}");
            false
        }
        Err(_) => {
            warn!("TTS notification delivery exceeded its {deadline_ms}ms deadline");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderCapabilities;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFailsTts;

    #[async_trait]
    impl TtsProvider for AlwaysFailsTts {
        async fn synth_to_file(&self, _: &str, _: &str, _: Option<&str>, _: Option<&str>, _: Option<f32>) -> Result<()> {
            Err(RuntimeError::Notification("no synth".into()))
        }
        async fn speak(&self, _: &str, _: Option<&str>, _: Option<&str>, _: Option<f32>) -> Result<()> {
            Err(RuntimeError::Notification("tts unavailable".into()))
        }
        fn capabilities(&self) -> &ProviderCapabilities {
            static CAPS: ProviderCapabilities = ProviderCapabilities {
                languages: Vec::new(),
                formats: Vec::new(),
                streaming: false,
                thread_safe: true,
            };
            &CAPS
        }
    }

    struct SlowTts;

    #[async_trait]
    impl TtsProvider for SlowTts {
        async fn synth_to_file(&self, _: &str, _: &str, _: Option<&str>, _: Option<&str>, _: Option<f32>) -> Result<()> {
            Ok(())
        }
        async fn speak(&self, _: &str, _: Option<&str>, _: Option<&str>, _: Option<f32>) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }
        fn capabilities(&self) -> &ProviderCapabilities {
            static CAPS: ProviderCapabilities = ProviderCapabilities {
                languages: Vec::new(),
                formats: Vec::new(),
                streaming: false,
                thread_safe: true,
            };
            &CAPS
        }
    }

    #[tokio::test]
    async fn log_only_notification_delivers_immediately() {
        let service = NotificationService::spawn(None, None, 50);
        let mut notification = Notification::new("info", NotificationPriority::Normal, "t", "m", vec![DeliveryMethod::Log]);
        notification.max_retries = 0;
        service.notify(notification).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn tts_deadline_is_enforced() {
        let counter = Arc::new(AtomicUsize::new(0));
        let service = NotificationService::spawn(Some(Arc::new(SlowTts)), None, 10);
        let mut notification = Notification::new("alert", NotificationPriority::High, "t", "m", vec![DeliveryMethod::Tts]);
        notification.max_retries = 0;
        service.notify(notification).unwrap();
        // Give the consumer enough time to hit the 10ms deadline without
        // waiting for SlowTts's real 10s completion.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_others() {
        let service = NotificationService::spawn(Some(Arc::new(AlwaysFailsTts)), None, 50);
        let mut notification = Notification::new(
            "alert",
            NotificationPriority::High,
            "t",
            "m",
            vec![DeliveryMethod::Tts, DeliveryMethod::Log],
        );
        notification.max_retries = 0;
        service.notify(notification).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
