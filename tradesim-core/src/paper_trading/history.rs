//! Closed-trade history and performance statistics

use super::trade::Trade;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Date window applied to the history tab. Calendar presets use UTC days.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryFilter {
    #[default]
    AllTime,
    /// Trailing 24 hours
    Today,
    /// Previous calendar week, Sunday through Saturday
    LastWeek,
    /// Previous calendar month
    LastMonth,
    /// Inclusive bounds
    Custom {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl HistoryFilter {
    /// Inclusive `(from, to)` bounds, or `None` when unbounded
    pub fn range(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match *self {
            HistoryFilter::AllTime => None,
            HistoryFilter::Today => Some((now - Duration::days(1), now)),
            HistoryFilter::LastWeek => {
                let today = now.date_naive();
                let this_sunday =
                    today - Duration::days(today.weekday().num_days_from_sunday() as i64);
                let start = this_sunday - Duration::days(7);
                Some((midnight(start)?, midnight(this_sunday)? - Duration::milliseconds(1)))
            }
            HistoryFilter::LastMonth => {
                let today = now.date_naive();
                let this_month = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?;
                let last_month = if today.month() == 1 {
                    NaiveDate::from_ymd_opt(today.year() - 1, 12, 1)?
                } else {
                    NaiveDate::from_ymd_opt(today.year(), today.month() - 1, 1)?
                };
                Some((midnight(last_month)?, midnight(this_month)? - Duration::milliseconds(1)))
            }
            HistoryFilter::Custom { from, to } => Some((from, to)),
        }
    }

    pub fn matches(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.range(now) {
            None => true,
            Some((from, to)) => at >= from && at <= to,
        }
    }
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt))
}

/// Settled trades inside the window, newest close first
pub fn settled<'a, I>(trades: I, filter: HistoryFilter, now: DateTime<Utc>) -> Vec<Trade>
where
    I: IntoIterator<Item = &'a Trade>,
{
    let mut history: Vec<Trade> = trades
        .into_iter()
        .filter(|t| t.settlement().is_some())
        .filter(|t| t.closed_at().is_some_and(|at| filter.matches(at, now)))
        .cloned()
        .collect();
    history.sort_by(|a, b| b.closed_at().cmp(&a.closed_at()));
    history
}

/// Performance summary over closed trades
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStatistics {
    /// Settled positions (cancellations excluded)
    pub total_closed: u64,
    pub cancelled: u64,
    pub winning: u64,
    pub losing: u64,
    /// Percentage of settled positions with positive pnl
    pub win_rate: Decimal,
    pub gross_profit: Decimal,
    /// Sum of losing pnl, as a positive number
    pub gross_loss: Decimal,
    /// Sum of gross pnl over settled positions
    pub realized_pnl: Decimal,
    pub commission: Decimal,
    /// Realized pnl after commission
    pub net_pnl: Decimal,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    /// Gross profit over gross loss; zero when there are no losses
    pub profit_factor: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
}

impl TradeStatistics {
    pub fn from_trades<'a, I>(trades: I, filter: HistoryFilter, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a Trade>,
    {
        let mut stats = TradeStatistics::default();

        for trade in trades {
            let Some(closed_at) = trade.closed_at() else {
                continue;
            };
            if !filter.matches(closed_at, now) {
                continue;
            }

            let Some(settlement) = trade.settlement() else {
                stats.cancelled += 1;
                continue;
            };
            let pnl = settlement.pnl;

            stats.total_closed += 1;
            stats.realized_pnl += pnl;
            stats.commission += settlement.commission;

            if pnl > Decimal::ZERO {
                stats.winning += 1;
                stats.gross_profit += pnl;
                stats.largest_win = stats.largest_win.max(pnl);
            } else if pnl < Decimal::ZERO {
                stats.losing += 1;
                stats.gross_loss += pnl.abs();
                stats.largest_loss = stats.largest_loss.max(pnl.abs());
            }
        }

        stats.net_pnl = stats.realized_pnl - stats.commission;
        if stats.total_closed > 0 {
            stats.win_rate =
                Decimal::from(stats.winning) * Decimal::ONE_HUNDRED / Decimal::from(stats.total_closed);
        }
        if stats.winning > 0 {
            stats.avg_win = stats.gross_profit / Decimal::from(stats.winning);
        }
        if stats.losing > 0 {
            stats.avg_loss = stats.gross_loss / Decimal::from(stats.losing);
        }
        if stats.gross_loss > Decimal::ZERO {
            stats.profit_factor = stats.gross_profit / stats.gross_loss;
        }

        stats
    }
}
