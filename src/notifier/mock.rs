use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::traits::Notifier;
use crate::types::RoundEvent;

/// Mock notifier for testing.
/// Records published events in memory; can be told to fail.
#[derive(Clone, Default)]
pub struct MockNotifier {
    pub published: Arc<Mutex<Vec<RoundEvent>>>,
    failing: Arc<Mutex<bool>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RoundEvent> {
        self.published.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &'static str {
        "mock-notifier"
    }

    async fn publish(&self, event: &RoundEvent) -> Result<()> {
        if *self.failing.lock().unwrap() {
            anyhow::bail!("mock notifier unavailable");
        }
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }
}
