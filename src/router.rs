//! Regime -> strategy routing
//!
//! A static table from [`RegimeLabel`] to a configured strategy. Regimes with
//! no entry, and steps where the regime could not be classified, hold.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::BacktestError;
use crate::regime::RegimeLabel;
use crate::strategies::{SignalContext, StrategiesConfig, Strategy, StrategyKind, StrategyName};
use crate::Signal;

/// Routing table as it appears in configuration: regime label -> strategy name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingConfig(pub BTreeMap<RegimeLabel, StrategyName>);

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig(BTreeMap::from([
            (RegimeLabel::Trending, StrategyName::Vwap),
            (RegimeLabel::Ranging, StrategyName::SmcZone),
            (RegimeLabel::Volatile, StrategyName::Momentum),
        ]))
    }
}

impl RoutingConfig {
    /// Route every regime to the same strategy
    pub fn uniform(name: StrategyName) -> Self {
        RoutingConfig(RegimeLabel::ALL.into_iter().map(|label| (label, name)).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyRouter {
    table: BTreeMap<RegimeLabel, StrategyKind>,
}

impl StrategyRouter {
    pub fn new(table: BTreeMap<RegimeLabel, StrategyKind>) -> Self {
        StrategyRouter { table }
    }

    pub fn from_config(
        routing: &RoutingConfig,
        strategies: &StrategiesConfig,
    ) -> Result<Self, BacktestError> {
        strategies.validate()?;
        let table = routing
            .0
            .iter()
            .map(|(&label, &name)| (label, StrategyKind::create(name, strategies)))
            .collect();
        Ok(StrategyRouter { table })
    }

    /// Route every regime to `strategy`
    pub fn uniform(strategy: StrategyKind) -> Self {
        StrategyRouter {
            table: RegimeLabel::ALL
                .into_iter()
                .map(|label| (label, strategy.clone()))
                .collect(),
        }
    }

    pub fn strategy_for(&self, regime: RegimeLabel) -> Option<&StrategyKind> {
        self.table.get(&regime)
    }

    /// Signal for the current bar; HOLD when the regime is unknown or unmapped
    pub fn route(&self, regime: Option<RegimeLabel>, ctx: &SignalContext<'_>) -> Signal {
        regime
            .and_then(|label| self.strategy_for(label))
            .map_or(Signal::Hold, |strategy| strategy.generate_signal(ctx))
    }
}

impl Default for StrategyRouter {
    fn default() -> Self {
        // The default routing only names known strategies with default parameters
        let strategies = StrategiesConfig::default();
        let table = RoutingConfig::default()
            .0
            .iter()
            .map(|(&label, &name)| (label, StrategyKind::create(name, &strategies)))
            .collect();
        StrategyRouter { table }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorSnapshot;
    use crate::strategies::test_support::bar;
    use crate::strategies::{MomentumConfig, MomentumMode, MomentumStrategy};

    fn level_momentum() -> StrategyKind {
        StrategyKind::Momentum(MomentumStrategy::new(MomentumConfig {
            mode: MomentumMode::Level,
        }))
    }

    fn bullish() -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_fast: Some(101.0),
            ema_slow: Some(100.0),
            prev_ema_fast: Some(101.0),
            prev_ema_slow: Some(100.0),
            vwap: Some(99.0),
            ..IndicatorSnapshot::default()
        }
    }

    #[test]
    fn test_default_table() {
        let router = StrategyRouter::default();
        assert_eq!(
            router.strategy_for(RegimeLabel::Trending).map(|s| s.kind()),
            Some(StrategyName::Vwap)
        );
        assert_eq!(
            router.strategy_for(RegimeLabel::Ranging).map(|s| s.kind()),
            Some(StrategyName::SmcZone)
        );
        assert_eq!(
            router.strategy_for(RegimeLabel::Volatile).map(|s| s.kind()),
            Some(StrategyName::Momentum)
        );
        assert!(router.strategy_for(RegimeLabel::Choppy).is_none());
    }

    #[test]
    fn test_unmapped_or_unknown_regime_holds() {
        let router = StrategyRouter::default();
        let b = bar(99.0, 101.0, 100.0);
        let ctx = SignalContext::new(&b, 60, bullish());

        assert_eq!(router.route(Some(RegimeLabel::Choppy), &ctx), Signal::Hold);
        assert_eq!(router.route(None, &ctx), Signal::Hold);
        // trending -> vwap, close above vwap
        assert_eq!(router.route(Some(RegimeLabel::Trending), &ctx), Signal::Buy);
    }

    #[test]
    fn test_uniform_router_ignores_regime() {
        let router = StrategyRouter::uniform(level_momentum());
        let b = bar(99.0, 101.0, 100.0);
        let ctx = SignalContext::new(&b, 60, bullish());
        for label in RegimeLabel::ALL {
            assert_eq!(router.route(Some(label), &ctx), Signal::Buy);
        }
    }

    #[test]
    fn test_routing_config_from_json() {
        let routing: RoutingConfig =
            serde_json::from_str(r#"{"choppy": "momentum", "trending": "vwap"}"#).unwrap();
        let router = StrategyRouter::from_config(&routing, &StrategiesConfig::default()).unwrap();
        assert_eq!(
            router.strategy_for(RegimeLabel::Choppy).map(|s| s.kind()),
            Some(StrategyName::Momentum)
        );
        assert!(router.strategy_for(RegimeLabel::Ranging).is_none());

        let bad: Result<RoutingConfig, _> = serde_json::from_str(r#"{"choppy": "turtle"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_uniform_routing_config() {
        let routing = RoutingConfig::uniform(StrategyName::SmcZone);
        assert_eq!(routing.0.len(), RegimeLabel::ALL.len());
    }
}
