//! Derived indicators: ratios and spreads of two other tickers.
//!
//! Derived tickers never touch the network. They are computed after the
//! base fetch, in routing-table order, so a spec may build on an earlier
//! derived ticker.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::models::{
    Capability, Indicator, ReasonCode, Session, SourceId, Ticker, Warning, WarningCode,
};
use crate::router::{DerivedComponent, DerivedOp, DerivedSpec};

/// Indicators, capabilities and warnings for every derived spec.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DerivedOutput {
    pub indicators: BTreeMap<Ticker, Indicator>,
    pub capabilities: BTreeMap<Ticker, Capability>,
    pub warnings: Vec<Warning>,
}

pub struct DerivedEngine {
    specs: Vec<DerivedSpec>,
}

impl DerivedEngine {
    pub fn new(specs: Vec<DerivedSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[DerivedSpec] {
        &self.specs
    }

    /// Compute every derived spec over the base results.
    pub fn compute(&self, base: &HashMap<Ticker, (Indicator, Capability)>) -> DerivedOutput {
        let mut output = DerivedOutput::default();
        let mut known: HashMap<Ticker, (Indicator, Capability)> = HashMap::new();

        for spec in &self.specs {
            let lookup = |ticker: &str| known.get(ticker).or_else(|| base.get(ticker));
            let a = lookup(&spec.a.ticker);
            let b = lookup(&spec.b.ticker);

            let (indicator, capability, warning) = evaluate(spec, a, b);

            if let Some(warning) = warning {
                output.warnings.push(warning);
            }
            output
                .indicators
                .insert(spec.ticker.clone(), indicator.clone());
            output
                .capabilities
                .insert(spec.ticker.clone(), capability.clone());
            known.insert(spec.ticker.clone(), (indicator, capability));
        }

        output
    }
}

/// Usable `(price, previous_close)` of a component, if any.
fn values(entry: Option<&(Indicator, Capability)>) -> Option<(&Indicator, f64, f64)> {
    let (indicator, capability) = entry?;
    if !capability.ok {
        return None;
    }
    Some((indicator, indicator.price?, indicator.previous_close?))
}

fn apply(op: DerivedOp, a: f64, b: f64) -> Option<f64> {
    let result = match op {
        DerivedOp::Ratio if b == 0.0 => return None,
        DerivedOp::Ratio => a / b,
        DerivedOp::Spread => a - b,
    };
    result.is_finite().then_some(result)
}

fn failure(spec: &DerivedSpec, code: ReasonCode, reason: String) -> (Indicator, Capability) {
    (
        Indicator::unavailable(
            spec.ticker.clone(),
            spec.display_name.clone(),
            SourceId::Derived,
        ),
        Capability::failed(SourceId::Derived, code, reason, Vec::new()),
    )
}

fn evaluate(
    spec: &DerivedSpec,
    a: Option<&(Indicator, Capability)>,
    b: Option<&(Indicator, Capability)>,
) -> (Indicator, Capability, Option<Warning>) {
    let (a_values, b_values) = (values(a), values(b));

    let (Some((a_ind, a_price, a_prev)), Some((b_ind, b_price, b_prev))) = (a_values, b_values)
    else {
        let missing: Vec<&DerivedComponent> = [
            (&spec.a, a_values.is_none()),
            (&spec.b, b_values.is_none()),
        ]
        .into_iter()
        .filter_map(|(component, missing)| missing.then_some(component))
        .collect();

        let names: Vec<&str> = missing.iter().map(|c| c.ticker.as_str()).collect();
        let reason = format!("Missing input: {}", names.join(", "));
        debug!("{}: {}", spec.ticker, reason);

        let warning = missing.iter().any(|c| !c.optional).then(|| {
            Warning::for_ticker(
                WarningCode::DerivedMissing,
                spec.ticker.clone(),
                format!("{} unavailable: {}", spec.display_name, reason),
            )
        });

        let (indicator, capability) = failure(spec, ReasonCode::DerivedInputMissing, reason);
        return (indicator, capability, warning);
    };

    let (Some(value), Some(previous)) = (
        apply(spec.op, a_price, b_price),
        apply(spec.op, a_prev, b_prev),
    ) else {
        let (indicator, capability) = failure(
            spec,
            ReasonCode::InvalidValue,
            format!("{} / {} has a zero denominator", spec.a.ticker, spec.b.ticker),
        );
        return (indicator, capability, None);
    };

    let change = value - previous;
    let change_pct = match (spec.op, previous) {
        (_, p) if p == 0.0 => 0.0,
        (DerivedOp::Ratio, p) => change / p * 100.0,
        (DerivedOp::Spread, p) => change / p.abs() * 100.0,
    };

    let session = if a_ind.session == b_ind.session {
        a_ind.session
    } else {
        Session::Close
    };
    let as_of_et = a_ind.as_of_et.max(b_ind.as_of_et);
    let is_stale = a_ind.is_stale || b_ind.is_stale;

    let indicator = Indicator {
        ticker: spec.ticker.clone(),
        display_name: spec.display_name.clone(),
        price: Some(value),
        previous_close: Some(previous),
        change: Some(change),
        change_pct: Some(change_pct),
        session,
        as_of_et,
        source: SourceId::Derived,
        is_proxy: a_ind.is_proxy || b_ind.is_proxy,
        is_stale,
    };
    let capability =
        Capability::available(SourceId::Derived, None, Vec::new()).with_stale(is_stale);

    (indicator, capability, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    const EPS: f64 = 1e-9;

    fn base_entry(ticker: &str, price: f64, prev: f64) -> (Indicator, Capability) {
        (
            Indicator::from_values(
                ticker,
                ticker,
                price,
                prev,
                Session::Regular,
                None,
                SourceId::Stooq,
            ),
            Capability::available(SourceId::Stooq, Some(ticker.to_lowercase()), vec![]),
        )
    }

    fn missing_entry(ticker: &str) -> (Indicator, Capability) {
        (
            Indicator::unavailable(ticker, ticker, SourceId::Fred),
            Capability::failed(SourceId::Fred, ReasonCode::NotFound, "not found", vec![]),
        )
    }

    fn spec(ticker: &str, a: DerivedComponent, b: DerivedComponent, op: DerivedOp) -> DerivedSpec {
        DerivedSpec::new(ticker, ticker, a, b, op)
    }

    fn base(entries: Vec<(Indicator, Capability)>) -> HashMap<Ticker, (Indicator, Capability)> {
        entries
            .into_iter()
            .map(|entry| (entry.0.ticker.clone(), entry))
            .collect()
    }

    #[test]
    fn test_ratio() {
        let engine = DerivedEngine::new(vec![spec(
            "A_B",
            DerivedComponent::required("A"),
            DerivedComponent::required("B"),
            DerivedOp::Ratio,
        )]);
        let output = engine.compute(&base(vec![
            base_entry("A", 10.0, 8.0),
            base_entry("B", 5.0, 4.0),
        ]));

        let ind = &output.indicators["A_B"];
        assert!((ind.price.unwrap() - 2.0).abs() < EPS);
        assert!((ind.previous_close.unwrap() - 2.0).abs() < EPS);
        assert!(ind.change.unwrap().abs() < EPS);
        assert!(ind.change_pct.unwrap().abs() < EPS);
        assert_eq!(ind.source, SourceId::Derived);
        assert!(output.capabilities["A_B"].ok);
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_spread() {
        let engine = DerivedEngine::new(vec![spec(
            "A_B",
            DerivedComponent::required("A"),
            DerivedComponent::required("B"),
            DerivedOp::Spread,
        )]);
        let output = engine.compute(&base(vec![
            base_entry("A", 5.0, 4.0),
            base_entry("B", 2.0, 2.0),
        ]));

        let ind = &output.indicators["A_B"];
        assert!((ind.price.unwrap() - 3.0).abs() < EPS);
        assert!((ind.previous_close.unwrap() - 2.0).abs() < EPS);
        assert!((ind.change.unwrap() - 1.0).abs() < EPS);
        assert!((ind.change_pct.unwrap() - 50.0).abs() < EPS);
    }

    #[test]
    fn test_spread_percent_uses_absolute_previous() {
        let engine = DerivedEngine::new(vec![spec(
            "INV",
            DerivedComponent::required("A"),
            DerivedComponent::required("B"),
            DerivedOp::Spread,
        )]);
        // previous = -0.5, value = -0.25: the curve steepened by 50%.
        let output = engine.compute(&base(vec![
            base_entry("A", 4.0, 4.0),
            base_entry("B", 4.25, 4.5),
        ]));
        let ind = &output.indicators["INV"];
        assert!((ind.change.unwrap() - 0.25).abs() < EPS);
        assert!((ind.change_pct.unwrap() - 50.0).abs() < EPS);
    }

    #[test]
    fn test_zero_previous_spread_has_zero_percent() {
        let engine = DerivedEngine::new(vec![spec(
            "A_B",
            DerivedComponent::required("A"),
            DerivedComponent::required("B"),
            DerivedOp::Spread,
        )]);
        let output = engine.compute(&base(vec![
            base_entry("A", 3.0, 2.0),
            base_entry("B", 1.0, 2.0),
        ]));
        assert_eq!(output.indicators["A_B"].change_pct, Some(0.0));
    }

    #[test]
    fn test_missing_required_component_warns() {
        let engine = DerivedEngine::new(vec![spec(
            "A_B",
            DerivedComponent::required("A"),
            DerivedComponent::required("B"),
            DerivedOp::Ratio,
        )]);
        let output = engine.compute(&base(vec![base_entry("A", 1.0, 1.0), missing_entry("B")]));

        let capability = &output.capabilities["A_B"];
        assert!(!capability.ok);
        assert_eq!(capability.reason_code, Some(ReasonCode::DerivedInputMissing));
        assert!(capability.reason.as_deref().unwrap().contains('B'));
        assert_eq!(output.indicators["A_B"].session, Session::Na);
        assert_eq!(output.warnings.len(), 1);
        assert_eq!(output.warnings[0].code, WarningCode::DerivedMissing);
        assert_eq!(output.warnings[0].ticker.as_deref(), Some("A_B"));
    }

    #[test]
    fn test_missing_optional_component_is_silent() {
        let engine = DerivedEngine::new(vec![spec(
            "A_B",
            DerivedComponent::required("A"),
            DerivedComponent::optional("B"),
            DerivedOp::Ratio,
        )]);
        let output = engine.compute(&base(vec![base_entry("A", 1.0, 1.0)]));

        assert!(!output.capabilities["A_B"].ok);
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_zero_denominator_is_invalid_value() {
        let engine = DerivedEngine::new(vec![spec(
            "A_B",
            DerivedComponent::required("A"),
            DerivedComponent::required("B"),
            DerivedOp::Ratio,
        )]);
        let output = engine.compute(&base(vec![
            base_entry("A", 1.0, 1.0),
            base_entry("B", 0.0, 1.0),
        ]));

        assert_eq!(
            output.capabilities["A_B"].reason_code,
            Some(ReasonCode::InvalidValue)
        );
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_metadata_combines_components() {
        let et = FixedOffset::west_opt(4 * 3600).unwrap();
        let early = et.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).single();
        let late = et.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).single();

        let (mut a, a_cap) = base_entry("A", 2.0, 1.0);
        a.as_of_et = early;
        a.is_proxy = true;
        let (mut b, b_cap) = base_entry("B", 1.0, 1.0);
        b.as_of_et = late;
        b.session = Session::Close;
        b.is_stale = true;

        let engine = DerivedEngine::new(vec![spec(
            "A_B",
            DerivedComponent::required("A"),
            DerivedComponent::required("B"),
            DerivedOp::Ratio,
        )]);
        let output = engine.compute(&base(vec![(a, a_cap), (b, b_cap)]));

        let ind = &output.indicators["A_B"];
        assert_eq!(ind.as_of_et, late);
        assert_eq!(ind.session, Session::Close);
        assert!(ind.is_stale);
        assert!(ind.is_proxy);
        assert!(output.capabilities["A_B"].is_stale);
    }

    #[test]
    fn test_spec_may_use_earlier_derived_ticker() {
        let engine = DerivedEngine::new(vec![
            spec(
                "A_B",
                DerivedComponent::required("A"),
                DerivedComponent::required("B"),
                DerivedOp::Spread,
            ),
            spec(
                "AB_C",
                DerivedComponent::required("A_B"),
                DerivedComponent::required("C"),
                DerivedOp::Ratio,
            ),
        ]);
        let output = engine.compute(&base(vec![
            base_entry("A", 5.0, 4.0),
            base_entry("B", 2.0, 2.0),
            base_entry("C", 3.0, 2.0),
        ]));

        let ind = &output.indicators["AB_C"];
        assert!((ind.price.unwrap() - 1.0).abs() < EPS);
        assert!((ind.previous_close.unwrap() - 1.0).abs() < EPS);
    }
}
