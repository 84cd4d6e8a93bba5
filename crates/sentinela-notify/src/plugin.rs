use crate::NotificationChannel;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of notification channel classes by name. Plugins register
/// their back-ends here; notification specs select one by channel name.
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn NotificationChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        let name = channel.channel_type().to_string();
        if self.channels.insert(name.clone(), channel).is_some() {
            tracing::warn!(channel = %name, "Notification channel replaced");
        }
    }

    pub fn get(&self, channel_type: &str) -> Option<Arc<dyn NotificationChannel>> {
        self.channels.get(channel_type).cloned()
    }

    pub fn has_channel(&self, channel_type: &str) -> bool {
        self.channels.contains_key(channel_type)
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::channels::webhook::WebhookChannel::new()));
        registry
    }
}
