//! Deferred, cancelable one-shot effects.
//!
//! Each agent owns a [`TimerList`]. An entry fires once its expiry time has
//! passed; scheduling on a channel replaces whatever was pending on that
//! channel, so a stale effect can never fire after a newer one was started.

use serde::{Deserialize, Serialize};

/// Handle to a scheduled effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerId(u64);

/// Independent lanes of deferred effects. At most one effect is pending per
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerChannel {
    /// Attack pose reverting to idle.
    Animation,
    /// Velocity overrides such as the death knockback.
    Motion,
}

/// What happens when a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeferredEffect {
    /// Swap the attack pose back to the idle pose.
    EndAttackAnimation,
    /// Stop the knockback nudge and freeze.
    StopNudge,
}

impl DeferredEffect {
    pub fn channel(self) -> TimerChannel {
        match self {
            DeferredEffect::EndAttackAnimation => TimerChannel::Animation,
            DeferredEffect::StopNudge => TimerChannel::Motion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Timer {
    id: TimerId,
    expires_at: f32,
    effect: DeferredEffect,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerList {
    next_id: u64,
    pending: Vec<Timer>,
}

impl TimerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `effect` to fire `delay` seconds after `now`, cancelling any
    /// pending effect on the same channel.
    pub fn schedule(&mut self, now: f32, delay: f32, effect: DeferredEffect) -> TimerId {
        self.cancel_channel(effect.channel());
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending.push(Timer {
            id,
            expires_at: now + delay.max(0.0),
            effect,
        });
        id
    }

    /// Returns `true` if the timer was still pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|t| t.id != id);
        self.pending.len() != before
    }

    pub fn cancel_channel(&mut self, channel: TimerChannel) {
        self.pending.retain(|t| t.effect.channel() != channel);
    }

    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, channel: TimerChannel) -> bool {
        self.pending.iter().any(|t| t.effect.channel() == channel)
    }

    /// Removes and returns every effect whose expiry is at or before `now`,
    /// earliest first.
    pub fn drain_expired(&mut self, now: f32) -> Vec<DeferredEffect> {
        let mut fired: Vec<Timer> = Vec::new();
        self.pending.retain(|t| {
            if t.expires_at <= now {
                fired.push(*t);
                false
            } else {
                true
            }
        });
        fired.sort_by(|a, b| a.expires_at.total_cmp(&b.expires_at));
        fired.into_iter().map(|t| t.effect).collect()
    }
}
