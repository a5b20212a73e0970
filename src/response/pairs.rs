use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use crate::calendar::BusinessCalendar;
use crate::collector::Message;
use crate::stats::MINUTES_PER_DAY;

/// One client message and how long, in business minutes, it waited for a
/// professional reply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResponsePair {
    pub delta_raw: f64,
    pub age_days: f64,
}

#[derive(Debug, Clone)]
pub struct ResponsePairBuilder<'a> {
    calendar: &'a BusinessCalendar,
    cap_minutes: f64,
}

impl<'a> ResponsePairBuilder<'a> {
    pub fn new(calendar: &'a BusinessCalendar, cap_minutes: f64) -> Self {
        Self {
            calendar,
            cap_minutes: cap_minutes.max(0.0),
        }
    }

    /// Pairs each client message with the next professional reply in its
    /// conversation, first come first served. Client messages never answered
    /// are charged the full cap.
    pub fn build(
        &self,
        messages: &[Message],
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<ResponsePair> {
        let mut conversations: BTreeMap<&str, Vec<&Message>> = BTreeMap::new();
        for message in messages {
            conversations
                .entry(message.conversation_id.as_str())
                .or_default()
                .push(message);
        }

        let mut pairs = Vec::new();
        for (_, mut thread) in conversations {
            thread.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
            let mut pending: VecDeque<&Message> = VecDeque::new();

            for message in thread {
                if !message.is_from_professional {
                    pending.push_back(message);
                    continue;
                }
                let Some(client) = pending.pop_front() else {
                    continue;
                };
                if client.timestamp < window_start {
                    continue;
                }
                let Some(deadline) = self.deadline(client.timestamp) else {
                    continue;
                };
                let answered_at = message.timestamp.min(deadline);
                pairs.extend(self.pair(client.timestamp, answered_at, now));
            }

            for client in pending {
                if client.timestamp < window_start {
                    continue;
                }
                if let Some(deadline) = self.deadline(client.timestamp) {
                    pairs.extend(self.pair(client.timestamp, deadline, now));
                }
            }
        }
        pairs
    }

    /// `None` when the capped deadline falls outside the representable range.
    fn deadline(&self, sent_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let cap = Duration::try_milliseconds((self.cap_minutes * 60_000.0) as i64)?;
        sent_at.checked_add_signed(cap)
    }

    fn pair(
        &self,
        sent_at: DateTime<Utc>,
        answered_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<ResponsePair> {
        let minutes = self.calendar.elapsed_business_minutes(sent_at, answered_at);
        let delta_raw = minutes.clamp(0.0, self.cap_minutes);
        let age_days = (now - sent_at).num_milliseconds() as f64 / 60_000.0 / MINUTES_PER_DAY;
        (age_days.is_finite() && age_days >= 0.0).then_some(ResponsePair { delta_raw, age_days })
    }
}
