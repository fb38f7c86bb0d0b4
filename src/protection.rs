// =============================================================================
// Protection State Machine — per-bot gating ahead of order submission
// =============================================================================
//
// Gate order (evaluated before every submission): status, spread, daily P&L
// caps, win/loss streaks, daily trade cap, rolling-minute rate cap, cooldown,
// confidence. The status and spread gates live in the bot loop (they apply to
// the whole cycle); the confidence gate needs the signal; everything in
// between is `evaluate_gates` here.
//
// Cap and streak trips park the bot in PAUSED_PROTECTION — sticky until the
// operator resumes it, including across the UTC day rollover. The daily
// counters (trade count, realized P&L) reset at UTC midnight; streaks reset
// only on an opposite trade outcome.
//
// Single-writer: only the owning bot's loop mutates this state, so there are
// no locks here; the bot keeps it inside its own shared snapshot.
// =============================================================================

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::errors::ControllerError;
use crate::market_access::{pip, Quote};

/// Verdict of the mid-chain gates.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Clear,
    /// Skip this cycle's submission; the loop keeps running.
    Suppress { reason: String },
    /// Trip protection: the bot transitions to PAUSED_PROTECTION.
    Pause { reason: String },
}

/// Serializable counters for telemetry snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSnapshot {
    pub trades_today: u32,
    pub consecutive_losses: u32,
    pub consecutive_wins: u32,
    pub daily_pnl_realized: f64,
    pub daily_pnl_unrealized: f64,
    pub daily_pnl: f64,
    pub orders_in_last_minute: usize,
}

#[derive(Debug)]
pub struct ProtectionState {
    consecutive_losses: u32,
    consecutive_wins: u32,
    daily_pnl_realized: f64,
    daily_pnl_unrealized: f64,
    trades_today: u32,
    last_order_at: Option<DateTime<Utc>>,
    /// Timestamps of recent orders, pruned to the trailing sixty seconds.
    order_times: VecDeque<DateTime<Utc>>,
    /// UTC calendar date the daily counters belong to.
    current_date: String,
}

impl ProtectionState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            consecutive_losses: 0,
            consecutive_wins: 0,
            daily_pnl_realized: 0.0,
            daily_pnl_unrealized: 0.0,
            trades_today: 0,
            last_order_at: None,
            order_times: VecDeque::new(),
            current_date: now.format("%Y-%m-%d").to_string(),
        }
    }

    // -------------------------------------------------------------------------
    // Spread gate (cycle-level, called by the loop before the strategy runs)
    // -------------------------------------------------------------------------

    /// Reject the cycle when the spread filter is on and the current spread
    /// exceeds the symbol's point limit.
    pub fn check_spread(
        config: &BotConfig,
        quote: &Quote,
        point_size: f64,
    ) -> Result<(), ControllerError> {
        if !config.enable_spread_filter {
            return Ok(());
        }
        let points = pip::spread_points(quote, point_size);
        let limit = config.spread_limit_points();
        if points > limit as f64 {
            return Err(ControllerError::SpreadTooWide { points, limit });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Mid-chain gates (3..7)
    // -------------------------------------------------------------------------

    /// Evaluate the daily-cap, streak, trade-count, rate, and cooldown gates,
    /// in that order.
    pub fn evaluate_gates(&mut self, now: DateTime<Utc>, config: &BotConfig) -> GateDecision {
        self.maybe_reset_daily(now);

        // 3. Daily P&L caps.
        let daily_pnl = self.daily_pnl_realized + self.daily_pnl_unrealized;
        if daily_pnl <= -config.max_loss_threshold {
            let reason = format!(
                "daily loss {daily_pnl:.2} breached cap {:.2}",
                config.max_loss_threshold
            );
            warn!(%reason, "protection trip");
            return GateDecision::Pause { reason };
        }
        if daily_pnl >= config.max_profit_threshold {
            let reason = format!(
                "daily profit {daily_pnl:.2} reached pause threshold {:.2}",
                config.max_profit_threshold
            );
            info!(%reason, "protection pause");
            return GateDecision::Pause { reason };
        }

        // 4. Streaks.
        if self.consecutive_losses >= config.max_consecutive_losses {
            let reason = format!(
                "{} consecutive losses (limit {})",
                self.consecutive_losses, config.max_consecutive_losses
            );
            warn!(%reason, "protection trip");
            return GateDecision::Pause { reason };
        }
        if self.consecutive_wins >= config.max_consecutive_profits {
            let reason = format!(
                "{} consecutive wins (limit {})",
                self.consecutive_wins, config.max_consecutive_profits
            );
            info!(%reason, "protection pause");
            return GateDecision::Pause { reason };
        }

        // 5. Daily trade cap.
        if self.trades_today >= config.max_daily_trades {
            return GateDecision::Suppress {
                reason: format!(
                    "daily trade cap reached ({}/{})",
                    self.trades_today, config.max_daily_trades
                ),
            };
        }

        // 6. Rolling-minute rate cap.
        let recent = self.orders_in_last_minute(now);
        if recent >= config.max_orders_per_minute as usize {
            return GateDecision::Suppress {
                reason: format!(
                    "rate cap reached ({recent}/{} in 60s)",
                    config.max_orders_per_minute
                ),
            };
        }

        // 7. Cooldown.
        if let Some(last) = self.last_order_at {
            let elapsed = now - last;
            let cooldown = Duration::seconds(config.cooldown_secs_after_trade as i64);
            if elapsed < cooldown {
                return GateDecision::Suppress {
                    reason: format!(
                        "cooldown ({}s of {}s elapsed)",
                        elapsed.num_seconds(),
                        config.cooldown_secs_after_trade
                    ),
                };
            }
        }

        GateDecision::Clear
    }

    // -------------------------------------------------------------------------
    // Recording
    // -------------------------------------------------------------------------

    /// Record a successful submission: feeds the rate and cooldown gates.
    pub fn record_order(&mut self, now: DateTime<Utc>) {
        self.last_order_at = Some(now);
        self.order_times.push_back(now);
        self.prune_order_times(now);
    }

    /// Record a completed trade routed back to this bot. Completed trades
    /// drive the daily count, realized P&L, and the streak counters.
    pub fn record_completion(&mut self, now: DateTime<Utc>, profit: f64) {
        self.maybe_reset_daily(now);
        self.trades_today += 1;
        self.daily_pnl_realized += profit;

        if profit >= 0.0 {
            self.consecutive_wins += 1;
            self.consecutive_losses = 0;
        } else {
            self.consecutive_losses += 1;
            self.consecutive_wins = 0;
        }

        debug!(
            profit,
            trades_today = self.trades_today,
            realized = self.daily_pnl_realized,
            losses = self.consecutive_losses,
            wins = self.consecutive_wins,
            "trade completion recorded"
        );
    }

    /// Refresh the unrealized leg from the terminal's open positions.
    pub fn set_unrealized(&mut self, pnl: f64) {
        self.daily_pnl_unrealized = pnl;
    }

    pub fn orders_in_last_minute(&mut self, now: DateTime<Utc>) -> usize {
        self.prune_order_times(now);
        self.order_times.len()
    }

    pub fn snapshot(&mut self, now: DateTime<Utc>) -> PerformanceSnapshot {
        let orders_in_last_minute = self.orders_in_last_minute(now);
        PerformanceSnapshot {
            trades_today: self.trades_today,
            consecutive_losses: self.consecutive_losses,
            consecutive_wins: self.consecutive_wins,
            daily_pnl_realized: self.daily_pnl_realized,
            daily_pnl_unrealized: self.daily_pnl_unrealized,
            daily_pnl: self.daily_pnl_realized + self.daily_pnl_unrealized,
            orders_in_last_minute,
        }
    }

    // -------------------------------------------------------------------------
    // Day rollover
    // -------------------------------------------------------------------------

    /// Reset the daily counters when the UTC calendar date changes. Streaks
    /// and the protection status survive the rollover; un-pausing is the
    /// operator's call.
    pub fn maybe_reset_daily(&mut self, now: DateTime<Utc>) {
        let today = now.format("%Y-%m-%d").to_string();
        if self.current_date == today {
            return;
        }
        info!(
            old_date = %self.current_date,
            new_date = %today,
            "UTC date rolled; resetting daily counters"
        );
        self.trades_today = 0;
        self.daily_pnl_realized = 0.0;
        self.current_date = today;
    }

    fn prune_order_times(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(60);
        while self.order_times.front().is_some_and(|&t| t < cutoff) {
            self.order_times.pop_front();
        }
    }
}
