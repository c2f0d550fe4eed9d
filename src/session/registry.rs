//! Subscription bookkeeping
//!
//! Holds the default catch-all filter plus the filters the user asked for.
//! The registry only records intent; the session performs the subscribe
//! calls and reports confirmations.

use crate::protocol::{default_filter, TopicFilter};

/// Filters subscribed on the current connection
#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    default_filter: TopicFilter,
    default_active: bool,
    user_filters: Vec<TopicFilter>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(default_filter())
    }
}

impl SubscriptionRegistry {
    pub fn new(default_filter: TopicFilter) -> Self {
        Self {
            default_filter,
            default_active: false,
            user_filters: Vec::new(),
        }
    }

    pub fn default_filter(&self) -> &TopicFilter {
        &self.default_filter
    }

    pub fn is_default_active(&self) -> bool {
        self.default_active
    }

    pub fn activate_default(&mut self) {
        self.default_active = true;
    }

    /// Add filters, keeping first-seen order and one entry per pattern
    ///
    /// A repeated pattern updates the QoS of the existing entry. Returns how
    /// many new patterns were added.
    pub fn extend<I>(&mut self, filters: I) -> usize
    where
        I: IntoIterator<Item = TopicFilter>,
    {
        let mut added = 0;
        for filter in filters {
            match self
                .user_filters
                .iter_mut()
                .find(|existing| existing.pattern == filter.pattern)
            {
                Some(existing) => existing.qos = filter.qos,
                None => {
                    self.user_filters.push(filter);
                    added += 1;
                }
            }
        }
        added
    }

    /// Forget everything subscribed so far, e.g. before a fresh connection
    pub fn clear(&mut self) {
        self.default_active = false;
        self.user_filters.clear();
    }

    pub fn user_filters(&self) -> &[TopicFilter] {
        &self.user_filters
    }

    /// Everything currently subscribed, default filter first when active
    pub fn active_filters(&self) -> Vec<TopicFilter> {
        let mut filters = Vec::with_capacity(self.user_filters.len() + 1);
        if self.default_active {
            filters.push(self.default_filter.clone());
        }
        filters.extend(self.user_filters.iter().cloned());
        filters
    }
}
