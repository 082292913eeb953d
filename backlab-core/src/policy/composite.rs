//! Composite policy: several member rules vote per instrument.
//!
//! Members are a trend filter and/or trailing stops. Exits are evaluated every
//! day; entries only on rebalance days, sized by inverse volatility over the
//! cash available after the day's exits.

use super::plan::{inverse_volatility_weights, OrderPlan};
use super::trailing_stop::{raise_high_water, record_exit, ReentryRule, StopRule};
use super::trend_filter::{trend_signal, Trend};
use super::{invalid, Decision, IntentReason, PolicyError, PolicyState, StrategyContext};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendVote {
    pub window: usize,
    pub weight: f64,
}

impl Default for TrendVote {
    fn default() -> Self {
        Self {
            window: 20,
            weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopVote {
    pub stop: StopRule,
    pub cooldown: usize,
    pub reentry: ReentryRule,
    pub weight: f64,
}

impl Default for StopVote {
    fn default() -> Self {
        Self {
            stop: StopRule::Fixed { pct: 0.08 },
            cooldown: 5,
            reentry: ReentryRule::default(),
            weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Member {
    TrendFilter(TrendVote),
    TrailingStop(StopVote),
}

impl Member {
    fn weight(&self) -> f64 {
        match self {
            Member::TrendFilter(m) => m.weight,
            Member::TrailingStop(m) => m.weight,
        }
    }
}

/// How member votes combine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompositionRule {
    /// Enter only when every member votes long; exit when any votes exit.
    #[default]
    All,
    /// Weighted vote over members that have an opinion. Enter at
    /// `score >= threshold`, exit at `score <= -threshold`, with scores in
    /// `[-1, 1]`.
    Vote { threshold: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vote {
    Long,
    Exit,
    Abstain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Enter,
    Exit,
    Hold,
}

impl CompositionRule {
    fn combine(&self, votes: &[(Vote, f64)]) -> Action {
        match self {
            CompositionRule::All => {
                if votes.iter().any(|(v, _)| *v == Vote::Exit) {
                    Action::Exit
                } else if !votes.is_empty() && votes.iter().all(|(v, _)| *v == Vote::Long) {
                    Action::Enter
                } else {
                    Action::Hold
                }
            }
            CompositionRule::Vote { threshold } => {
                let (mut score, mut total) = (0.0, 0.0);
                for (v, w) in votes {
                    match v {
                        Vote::Long => score += w,
                        Vote::Exit => score -= w,
                        Vote::Abstain => continue,
                    }
                    total += w;
                }
                if total <= 0.0 {
                    return Action::Hold;
                }
                let score = score / total;
                if score >= *threshold {
                    Action::Enter
                } else if score <= -threshold {
                    Action::Exit
                } else {
                    Action::Hold
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeParams {
    pub members: Vec<Member>,
    pub rule: CompositionRule,
    /// Trading days between entry rounds.
    pub interval: usize,
    /// Returns used for inverse-volatility sizing and volatility stops.
    pub lookback: usize,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            members: vec![
                Member::TrendFilter(TrendVote::default()),
                Member::TrailingStop(StopVote::default()),
            ],
            rule: CompositionRule::All,
            interval: 10,
            lookback: 20,
        }
    }
}

impl CompositeParams {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.members.is_empty() {
            return Err(invalid("members", "at least one member is required"));
        }
        if self.interval == 0 {
            return Err(invalid("interval", "must be >= 1"));
        }
        if self.lookback < 2 {
            return Err(invalid("lookback", "must be >= 2"));
        }
        for m in &self.members {
            let w = m.weight();
            if !w.is_finite() || w <= 0.0 {
                return Err(invalid("members.weight", format!("must be positive, got {w}")));
            }
            match m {
                Member::TrendFilter(t) if t.window == 0 => {
                    return Err(invalid("members.window", "must be >= 1"));
                }
                Member::TrailingStop(s) => s.stop.validate()?,
                _ => {}
            }
        }
        if let CompositionRule::Vote { threshold } = self.rule {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(invalid("rule.threshold", format!("must be in (0, 1], got {threshold}")));
            }
        }
        Ok(())
    }

    fn has_stop(&self) -> bool {
        self.members.iter().any(|m| matches!(m, Member::TrailingStop(_)))
    }

    fn votes(&self, ctx: &StrategyContext<'_>, state: &PolicyState, id: &str) -> Vec<(Vote, f64)> {
        let held = ctx.portfolio.holds(id);
        let price = ctx.quote(id);
        self.members
            .iter()
            .map(|m| {
                let vote = match (m, price) {
                    (_, None) => Vote::Abstain,
                    (Member::TrendFilter(t), Some(_)) => match trend_signal(ctx, id, t.window) {
                        Some(Trend::Above) => Vote::Long,
                        Some(Trend::Below) => Vote::Exit,
                        None => Vote::Abstain,
                    },
                    (Member::TrailingStop(s), Some(p)) if held => {
                        let hwm = state.high_water.get(id).copied().unwrap_or(p);
                        if s.stop.is_breached(p, hwm, ctx.history.rows(id), self.lookback) {
                            Vote::Exit
                        } else {
                            Vote::Long
                        }
                    }
                    (Member::TrailingStop(s), Some(p)) => {
                        if s.reentry.allows(state.exits.get(id), ctx.day_index, s.cooldown, p) {
                            Vote::Long
                        } else {
                            Vote::Exit
                        }
                    }
                };
                (vote, m.weight())
            })
            .collect()
    }

    pub fn decide(&self, ctx: &StrategyContext<'_>) -> Decision {
        let mut state = ctx.state.clone();
        state.retain_held(ctx.portfolio);
        if self.has_stop() {
            for id in ctx.universe {
                if let (true, Some(price)) = (ctx.portfolio.holds(id), ctx.quote(id)) {
                    raise_high_water(&mut state, id, price);
                }
            }
        }

        let actions: Vec<(String, Action)> = ctx
            .universe
            .iter()
            .map(|id| (id.clone(), self.rule.combine(&self.votes(ctx, &state, id))))
            .collect();

        let mut plan = OrderPlan::new(ctx);
        for (id, action) in &actions {
            if *action == Action::Exit && ctx.portfolio.holds(id) && plan.sell_all(id, IntentReason::CompositeExit) {
                if let Some(price) = ctx.quote(id) {
                    record_exit(&mut state, id, ctx.day_index, price);
                }
            }
        }

        if state.rebalance_due(ctx.day_index, self.interval) {
            state.last_rebalance = Some(ctx.day_index);
            let entries: Vec<String> = actions
                .iter()
                .filter(|(id, a)| *a == Action::Enter && !ctx.portfolio.holds(id))
                .map(|(id, _)| id.clone())
                .collect();
            if !entries.is_empty() {
                let available = plan.cash();
                for (id, w) in inverse_volatility_weights(ctx, &entries, self.lookback) {
                    if plan.buy_value(&id, available * w, IntentReason::CompositeEntry).is_some() {
                        if let Some(price) = ctx.quote(&id) {
                            state.high_water.insert(id.clone(), price);
                        }
                        state.exits.remove(&id);
                    }
                }
            }
        }

        Decision {
            intents: plan.finish(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Portfolio, Side};
    use crate::execution::CostConfig;
    use crate::policy::test_support::{ctx, day, history, ids};

    fn trend_only(window: usize) -> CompositeParams {
        CompositeParams {
            members: vec![Member::TrendFilter(TrendVote { window, weight: 1.0 })],
            interval: 1,
            ..Default::default()
        }
    }

    #[test]
    fn all_rule_combination() {
        let rule = CompositionRule::All;
        assert_eq!(rule.combine(&[(Vote::Long, 1.0), (Vote::Long, 1.0)]), Action::Enter);
        assert_eq!(rule.combine(&[(Vote::Long, 1.0), (Vote::Exit, 1.0)]), Action::Exit);
        assert_eq!(rule.combine(&[(Vote::Long, 1.0), (Vote::Abstain, 1.0)]), Action::Hold);
        assert_eq!(rule.combine(&[]), Action::Hold);
    }

    #[test]
    fn weighted_vote_combination() {
        let rule = CompositionRule::Vote { threshold: 0.5 };
        assert_eq!(rule.combine(&[(Vote::Long, 3.0), (Vote::Exit, 1.0)]), Action::Enter);
        assert_eq!(rule.combine(&[(Vote::Long, 1.0), (Vote::Exit, 1.0)]), Action::Hold);
        assert_eq!(rule.combine(&[(Vote::Long, 1.0), (Vote::Exit, 3.0)]), Action::Exit);
        assert_eq!(rule.combine(&[(Vote::Abstain, 1.0)]), Action::Hold);
    }

    #[test]
    fn entries_wait_for_rebalance_day_exits_do_not() {
        let h = history(&[("A", vec![100.0, 101.0, 102.0, 90.0]), ("B", vec![10.0, 11.0, 12.0, 13.0])]);
        let universe = ids(&["A", "B"]);
        let mut portfolio = Portfolio::new(10_000.0, CostConfig::frictionless());
        portfolio.buy(day(0), "A", 100.0, 10.0).unwrap();
        let state = PolicyState {
            last_rebalance: Some(2),
            ..Default::default()
        };
        let params = CompositeParams {
            interval: 10,
            ..trend_only(3)
        };
        let d = params.decide(&ctx(&h, &universe, &portfolio, &state, 3));
        assert_eq!(d.intents.len(), 1);
        assert_eq!(d.intents[0].side, Side::Sell);
        assert_eq!(d.intents[0].instrument, "A");
        assert_eq!(d.state.exits["A"].day, 3);
    }

    #[test]
    fn stop_member_exits_on_breach() {
        let h = history(&[("A", vec![100.0, 130.0, 115.0])]);
        let universe = ids(&["A"]);
        let mut portfolio = Portfolio::new(10_000.0, CostConfig::frictionless());
        portfolio.buy(day(0), "A", 100.0, 10.0).unwrap();
        let mut state = PolicyState {
            last_rebalance: Some(0),
            ..Default::default()
        };
        state.high_water.insert("A".into(), 130.0);
        let params = CompositeParams {
            members: vec![Member::TrailingStop(StopVote::default())],
            ..Default::default()
        };
        // 115 <= 130 * 0.92 = 119.6
        let d = params.decide(&ctx(&h, &universe, &portfolio, &state, 2));
        assert_eq!(d.intents.len(), 1);
        assert_eq!(d.intents[0].side, Side::Sell);
    }

    #[test]
    fn enters_on_rebalance_day_when_all_agree() {
        let h = history(&[("A", vec![100.0, 101.0, 102.0, 104.0])]);
        let universe = ids(&["A"]);
        let portfolio = Portfolio::new(10_000.0, CostConfig::frictionless());
        let state = PolicyState::default();
        let params = CompositeParams {
            members: vec![
                Member::TrendFilter(TrendVote { window: 3, weight: 1.0 }),
                Member::TrailingStop(StopVote::default()),
            ],
            ..Default::default()
        };
        let d = params.decide(&ctx(&h, &universe, &portfolio, &state, 3));
        assert_eq!(d.intents.len(), 1);
        assert_eq!(d.intents[0].side, Side::Buy);
        assert_eq!(d.intents[0].quantity, 96.0);
        assert_eq!(d.state.high_water["A"], 104.0);
        assert_eq!(d.state.last_rebalance, Some(3));
    }

    #[test]
    fn validation() {
        assert!(CompositeParams::default().validate().is_ok());
        let empty = CompositeParams {
            members: vec![],
            ..Default::default()
        };
        assert!(empty.validate().is_err());
        let bad_threshold = CompositeParams {
            rule: CompositionRule::Vote { threshold: 1.5 },
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());
    }
}
