//! SMC Zone Strategy Implementation
//!
//! ## Entry Logic
//! 1. Bar reaches the active demand zone only -> BUY
//! 2. Bar reaches the active supply zone only -> SELL
//! 3. Both zones reached, or neither -> HOLD

use crate::indicators::Zone;
use crate::strategies::{SignalContext, Strategy};
use crate::Signal;

use super::config::SmcZoneConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct SmcZoneStrategy {
    config: SmcZoneConfig,
}

impl SmcZoneStrategy {
    pub fn new(config: SmcZoneConfig) -> Self {
        SmcZoneStrategy { config }
    }

    fn reaches(&self, zone: Option<Zone>, ctx: &SignalContext<'_>) -> bool {
        let Some(zone) = zone else {
            return false;
        };
        if self.config.require_close_inside {
            let close = ctx.close();
            close >= zone.bottom && close <= zone.top
        } else {
            zone.touched_by(ctx.bar.low, ctx.bar.high)
        }
    }
}

impl Strategy for SmcZoneStrategy {
    fn name(&self) -> &'static str {
        "smc_zone"
    }

    fn generate_signal(&self, ctx: &SignalContext<'_>) -> Signal {
        let in_demand = self.reaches(ctx.indicators.demand_zone, ctx);
        let in_supply = self.reaches(ctx.indicators.supply_zone, ctx);

        match (in_demand, in_supply) {
            (true, false) => Signal::Buy,
            (false, true) => Signal::Sell,
            _ => Signal::Hold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{IndicatorSnapshot, ZoneKind};
    use crate::strategies::test_support::bar;

    fn zone(kind: ZoneKind, bottom: f64, top: f64) -> Zone {
        Zone {
            kind,
            bottom,
            top,
            formed_at: 3,
        }
    }

    fn zones(demand: Option<Zone>, supply: Option<Zone>) -> IndicatorSnapshot {
        IndicatorSnapshot {
            demand_zone: demand,
            supply_zone: supply,
            ..IndicatorSnapshot::default()
        }
    }

    #[test]
    fn test_wick_into_demand_buys() {
        let strategy = SmcZoneStrategy::new(SmcZoneConfig::default());
        let demand = Some(zone(ZoneKind::Demand, 95.0, 97.0));
        let b = bar(96.5, 100.0, 99.0);
        let ctx = SignalContext::new(&b, 10, zones(demand, None));
        assert_eq!(strategy.generate_signal(&ctx), Signal::Buy);
    }

    #[test]
    fn test_supply_sells_and_conflict_holds() {
        let strategy = SmcZoneStrategy::new(SmcZoneConfig::default());
        let supply = Some(zone(ZoneKind::Supply, 104.0, 106.0));
        let b = bar(101.0, 104.5, 102.0);
        let ctx = SignalContext::new(&b, 10, zones(None, supply));
        assert_eq!(strategy.generate_signal(&ctx), Signal::Sell);

        let demand = Some(zone(ZoneKind::Demand, 99.0, 101.5));
        let ctx = SignalContext::new(&b, 10, zones(demand, supply));
        assert_eq!(strategy.generate_signal(&ctx), Signal::Hold);
    }

    #[test]
    fn test_close_inside_requirement() {
        let strategy = SmcZoneStrategy::new(SmcZoneConfig {
            require_close_inside: true,
        });
        let demand = Some(zone(ZoneKind::Demand, 95.0, 97.0));

        let wick_only = bar(96.5, 100.0, 99.0);
        let ctx = SignalContext::new(&wick_only, 10, zones(demand, None));
        assert_eq!(strategy.generate_signal(&ctx), Signal::Hold);

        let closed_in = bar(95.5, 98.0, 96.0);
        let ctx = SignalContext::new(&closed_in, 10, zones(demand, None));
        assert_eq!(strategy.generate_signal(&ctx), Signal::Buy);
    }
}
