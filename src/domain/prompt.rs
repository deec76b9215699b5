//! Bounded prompt assembly.
//!
//! Instruments are ordered holdings first, then watchlist, each role by
//! descending attention score with input order breaking ties. The first
//! `max_detailed_instruments` get a full indicator block, the next
//! `max_summarized_instruments` a one-line summary, and the rest are only
//! counted. When the text is still over `max_prompt_chars`, summary lines
//! go first, then detailed blocks, both from the end. The header, output
//! format and allowed-symbol sections are always kept.

use crate::domain::aggregator::TechnicalIndicators;
use crate::domain::analysis::{AnalysisKind, AnalysisRequest, InstrumentRole, RequestInstrument};
use crate::domain::portfolio::PortfolioContext;
use std::cmp::Ordering;

pub const DEFAULT_MAX_DETAILED: usize = 20;
pub const DEFAULT_MAX_SUMMARIZED: usize = 40;
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 24_000;

#[derive(Debug, Clone, PartialEq)]
pub struct PromptConfig {
    pub max_detailed_instruments: usize,
    pub max_summarized_instruments: usize,
    pub max_prompt_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_detailed_instruments: DEFAULT_MAX_DETAILED,
            max_summarized_instruments: DEFAULT_MAX_SUMMARIZED,
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
        }
    }
}

/// What each analysis kind needs from a request and asks of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindProfile {
    pub kind: AnalysisKind,
    pub requires_indicators: bool,
    pub requires_portfolio: bool,
    pub requires_attribution: bool,
    /// Watchlist instruments may only be BUY or HOLD.
    pub watchlist_buy_only: bool,
    pub include_benchmark: bool,
    pub include_allocation: bool,
    pub focus: &'static str,
}

impl KindProfile {
    pub fn for_kind(kind: AnalysisKind) -> Self {
        match kind {
            AnalysisKind::Daily => Self {
                kind,
                requires_indicators: true,
                requires_portfolio: false,
                requires_attribution: false,
                watchlist_buy_only: true,
                include_benchmark: false,
                include_allocation: false,
                focus: "Give a BUY, SELL or HOLD call for every holding based on today's \
                        technical signals. For watchlist instruments decide whether today \
                        is a good entry point.",
            },
            AnalysisKind::Weekly => Self {
                kind,
                requires_indicators: false,
                requires_portfolio: true,
                requires_attribution: false,
                watchlist_buy_only: false,
                include_benchmark: true,
                include_allocation: false,
                focus: "Review the week: aggregate portfolio performance, volatility and \
                        the comparison against the benchmark. Recommend adjustments where \
                        the trend has changed.",
            },
            AnalysisKind::Monthly => Self {
                kind,
                requires_indicators: false,
                requires_portfolio: true,
                requires_attribution: true,
                watchlist_buy_only: false,
                include_benchmark: true,
                include_allocation: true,
                focus: "Review the month: allocation by country and sector, concentration \
                        risk and diversification. Recommend rebalancing where allocation \
                        has drifted.",
            },
        }
    }
}

/// Assembled prompt text plus how the instruments were bounded.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub detailed: usize,
    pub summarized: usize,
    pub omitted: usize,
}

const OUTPUT_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{
  "summary": "string",
  "market_outlook": "string",
  "recommendations": [
    {"symbol": "string", "action": "BUY|SELL|HOLD", "confidence": 0.0-1.0,
     "reasoning": "string", "target_price": number, "stop_loss": number,
     "time_horizon": "SHORT|MEDIUM|LONG"}
  ],
  "risk_assessment": {"overall_risk": "LOW|MEDIUM|HIGH",
    "diversification_score": 0.0-1.0, "narrative": "string",
    "recommendations": ["string"]}
}"#;

/// |change %| + 2 per active cross + 1 per active break.
pub fn attention_score(instrument: &RequestInstrument) -> f64 {
    let mut score = instrument.snapshot.change_percent().abs();
    if let Some(ind) = &instrument.indicators {
        let crosses = [ind.golden_cross, ind.dead_cross];
        let breaks = [
            ind.new_high_break,
            ind.new_low_break,
            ind.resistance_break,
            ind.support_break,
        ];
        score += 2.0 * crosses.iter().filter(|b| **b).count() as f64;
        score += breaks.iter().filter(|b| **b).count() as f64;
    }
    score
}

fn role_rank(role: InstrumentRole) -> u8 {
    match role {
        InstrumentRole::Holding => 0,
        InstrumentRole::Watchlist => 1,
    }
}

fn prioritized(request: &AnalysisRequest) -> Vec<&RequestInstrument> {
    let mut ordered: Vec<(&RequestInstrument, f64)> = request
        .instruments
        .iter()
        .map(|i| (i, attention_score(i)))
        .collect();
    // sort_by is stable, so equal scores keep input order
    ordered.sort_by(|(a, sa), (b, sb)| {
        role_rank(a.role)
            .cmp(&role_rank(b.role))
            .then_with(|| sb.partial_cmp(sa).unwrap_or(Ordering::Equal))
    });
    ordered.into_iter().map(|(i, _)| i).collect()
}

fn role_label(role: InstrumentRole) -> &'static str {
    match role {
        InstrumentRole::Holding => "HOLDING",
        InstrumentRole::Watchlist => "WATCHLIST",
    }
}

fn header(request: &AnalysisRequest, profile: &KindProfile) -> Vec<String> {
    let holdings = request
        .instruments
        .iter()
        .filter(|i| i.role == InstrumentRole::Holding)
        .count();
    vec![
        format!(
            "You are a stock market analyst preparing the {} analysis.",
            profile.kind
        ),
        format!(
            "{} instruments: {} holdings, {} watchlist.",
            request.instruments.len(),
            holdings,
            request.instruments.len() - holdings
        ),
        String::new(),
        profile.focus.to_string(),
    ]
}

fn allowed_symbols(request: &AnalysisRequest, profile: &KindProfile) -> Vec<String> {
    let symbols: Vec<&str> = request.symbols().collect();
    let mut lines = vec![
        "Only recommend these symbols:".to_string(),
        symbols.join(", "),
    ];
    if profile.watchlist_buy_only {
        lines.push(
            "Watchlist instruments are not held: use only BUY or HOLD for them.".to_string(),
        );
    }
    lines
}

fn portfolio_section(portfolio: &PortfolioContext, profile: &KindProfile) -> Vec<String> {
    let mut lines = vec![
        "## Portfolio".to_string(),
        format!(
            "Total value {:.2}, day change {:+.2} ({:+.2}%), unrealized P/L {:+.2}",
            portfolio.total_value,
            portfolio.total_change,
            portfolio.total_change_percent,
            portfolio.unrealized_gain_loss
        ),
    ];
    if let Some(vol) = portfolio.volatility {
        lines.push(format!("Weighted return volatility {vol:.2}%"));
    }
    for p in &portfolio.positions {
        let gain = p
            .unrealized_percent
            .map(|g| format!(", unrealized {g:+.2}%"))
            .unwrap_or_default();
        lines.push(format!(
            "- {} qty {} value {:.2} weight {:.1}%{}",
            p.symbol,
            p.quantity,
            p.current_value,
            p.weight * 100.0,
            gain
        ));
    }
    if profile.include_benchmark {
        if let Some(b) = &portfolio.benchmark {
            lines.push(format!(
                "Benchmark {}: {:+.2}% vs portfolio {:+.2}% (excess {:+.2}%)",
                b.benchmark, b.benchmark_return, b.portfolio_return, b.excess_return
            ));
        }
    }
    if profile.include_allocation {
        let fmt_weights = |weights: std::collections::BTreeMap<String, f64>| {
            weights
                .iter()
                .map(|(k, w)| format!("{k} {:.1}%", w * 100.0))
                .collect::<Vec<_>>()
                .join(", ")
        };
        lines.push(format!("By sector: {}", fmt_weights(portfolio.sector_weights())));
        lines.push(format!("By country: {}", fmt_weights(portfolio.country_weights())));
    }
    lines
}

fn indicator_lines(ind: &TechnicalIndicators, price: f64) -> Vec<String> {
    let mut lines = Vec::new();
    if let (Some(short), Some(long)) = (ind.short_ma, ind.long_ma) {
        let cross = if ind.golden_cross {
            " | golden cross"
        } else if ind.dead_cross {
            " | dead cross"
        } else {
            ""
        };
        lines.push(format!("MA short {short:.2} long {long:.2}{cross}"));
    }
    if ind.new_high_break {
        lines.push("Breakout: new high".to_string());
    } else if ind.new_low_break {
        lines.push("Breakout: new low".to_string());
    }
    if let Some(days) = ind.new_high_days {
        lines.push(format!("Highest close in {days} bars"));
    }
    if let Some(days) = ind.new_low_days {
        lines.push(format!("Lowest close in {days} bars"));
    }
    if let Some(levels) = ind.levels {
        let state = if ind.resistance_break {
            " (resistance broken)"
        } else if ind.support_break {
            " (support broken)"
        } else {
            ""
        };
        lines.push(format!(
            "Support {:.2} / resistance {:.2}{state}",
            levels.support, levels.resistance
        ));
    }
    if let Some(rsi) = ind.rsi {
        lines.push(format!("RSI {rsi:.1} ({})", ind.rsi_signal()));
    }
    if let Some(m) = ind.macd {
        lines.push(format!(
            "MACD {:.3} signal {:.3} histogram {:.3} ({}{})",
            m.line,
            m.signal,
            m.histogram,
            m.classification,
            if m.crossed { ", crossed" } else { "" }
        ));
    }
    if let Some(b) = ind.bollinger {
        let position = b
            .percent_b(price)
            .map(|pb| format!(" (%B {pb:.2})"))
            .unwrap_or_default();
        lines.push(format!(
            "Bollinger upper {:.2} middle {:.2} lower {:.2}{position}",
            b.upper, b.middle, b.lower
        ));
    }
    let mut extras = Vec::new();
    if let Some(c) = ind.market_correlation {
        extras.push(format!("market correlation {c:.2}"));
    }
    if let Some(v) = ind.volume_change_rate {
        extras.push(format!("volume change {v:+.1}%"));
    }
    if let Some(v) = ind.volatility {
        extras.push(format!("volatility {v:.2}%"));
    }
    if !extras.is_empty() {
        lines.push(extras.join(" | "));
    }
    lines.push(format!("Overall signal {}", ind.overall_signal()));
    if !ind.unavailable.is_empty() {
        let names: Vec<&str> = ind.unavailable.iter().map(|u| u.indicator.as_str()).collect();
        lines.push(format!("Unavailable: {}", names.join(", ")));
    }
    lines
}

fn detailed_block(instrument: &RequestInstrument) -> String {
    let s = &instrument.snapshot;
    let name = s
        .name
        .as_deref()
        .map(|n| format!(" ({n})"))
        .unwrap_or_default();
    let mut lines = vec![
        format!("### {}{} [{}]", s.symbol, name, role_label(instrument.role)),
        format!(
            "Price {:.2} (prev {:.2}, {:+.2}%), volume {}",
            s.current_price,
            s.previous_close,
            s.change_percent(),
            s.volume
        ),
    ];
    if let Some(ind) = &instrument.indicators {
        lines.extend(indicator_lines(ind, s.current_price));
    }
    lines.join("\n")
}

fn summary_line(instrument: &RequestInstrument) -> String {
    let s = &instrument.snapshot;
    let signal = instrument
        .indicators
        .as_ref()
        .map(|i| format!(" signal {}", i.overall_signal()))
        .unwrap_or_default();
    format!(
        "- {} [{}] {:.2} ({:+.2}%){}",
        s.symbol,
        role_label(instrument.role),
        s.current_price,
        s.change_percent(),
        signal
    )
}

struct Sections {
    fixed_head: String,
    context: String,
    detailed: Vec<String>,
    summaries: Vec<String>,
    total: usize,
}

impl Sections {
    fn render(&self, detailed: usize, summarized: usize) -> String {
        let mut parts = vec![self.fixed_head.clone()];
        if !self.context.is_empty() {
            parts.push(self.context.clone());
        }
        if detailed > 0 {
            parts.push(format!(
                "## Instruments\n{}",
                self.detailed[..detailed].join("\n\n")
            ));
        }
        if summarized > 0 {
            parts.push(format!(
                "## Other instruments\n{}",
                self.summaries[..summarized].join("\n")
            ));
        }
        let omitted = self.total - detailed - summarized;
        if omitted > 0 {
            parts.push(format!("{omitted} more instruments omitted"));
        }
        parts.join("\n\n")
    }
}

pub fn build_prompt(
    request: &AnalysisRequest,
    profile: &KindProfile,
    config: &PromptConfig,
) -> Prompt {
    let ordered = prioritized(request);
    let detailed_count = ordered.len().min(config.max_detailed_instruments);
    let summary_count = (ordered.len() - detailed_count).min(config.max_summarized_instruments);

    let mut head = header(request, profile);
    head.push(String::new());
    head.push(OUTPUT_FORMAT.to_string());
    head.push(String::new());
    head.extend(allowed_symbols(request, profile));

    let mut context = Vec::new();
    if let Some(portfolio) = &request.portfolio {
        context.extend(portfolio_section(portfolio, profile));
    }
    if let Some(market) = &request.market {
        if !context.is_empty() {
            context.push(String::new());
        }
        context.push("## Market".to_string());
        context.push(format!(
            "{} period return {:+.2}%, trend {}",
            market.reference_symbol, market.period_return, market.trend
        ));
    }

    let sections = Sections {
        fixed_head: head.join("\n"),
        context: context.join("\n"),
        detailed: ordered[..detailed_count]
            .iter()
            .map(|i| detailed_block(i))
            .collect(),
        summaries: ordered[detailed_count..detailed_count + summary_count]
            .iter()
            .map(|i| summary_line(i))
            .collect(),
        total: ordered.len(),
    };

    let mut detailed = detailed_count;
    let mut summarized = summary_count;
    let mut text = sections.render(detailed, summarized);
    while text.chars().count() > config.max_prompt_chars && (summarized > 0 || detailed > 0) {
        if summarized > 0 {
            summarized -= 1;
        } else {
            detailed -= 1;
        }
        text = sections.render(detailed, summarized);
    }

    Prompt {
        text,
        detailed,
        summarized,
        omitted: ordered.len() - detailed - summarized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregator::{compute_indicators, IndicatorConfig};
    use crate::domain::indicator::BollingerBands;
    use crate::domain::instrument::InstrumentSnapshot;
    use crate::domain::portfolio::Holding;
    use chrono::{TimeZone, Utc};

    fn snap(symbol: &str, price: f64, prev: f64) -> InstrumentSnapshot {
        InstrumentSnapshot::new(symbol, price, prev, 1000.0, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
    }

    fn with_indicators(s: InstrumentSnapshot) -> Option<TechnicalIndicators> {
        Some(compute_indicators(&s, None, &IndicatorConfig::default()).unwrap())
    }

    fn daily(n_holdings: usize, n_watch: usize) -> AnalysisRequest {
        let mut instruments = Vec::new();
        for i in 0..n_holdings {
            let s = snap(&format!("H{i:03}"), 100.0 + i as f64, 100.0);
            let ind = with_indicators(s.clone());
            instruments.push(RequestInstrument::holding(s, ind));
        }
        for i in 0..n_watch {
            let s = snap(&format!("W{i:03}"), 50.0, 50.0);
            let ind = with_indicators(s.clone());
            instruments.push(RequestInstrument::watchlist(s, ind));
        }
        AnalysisRequest::new(AnalysisKind::Daily, instruments)
    }

    #[test]
    fn small_request_is_fully_detailed() {
        let req = daily(2, 1);
        let p = build_prompt(&req, &KindProfile::for_kind(AnalysisKind::Daily), &PromptConfig::default());
        assert_eq!((p.detailed, p.summarized, p.omitted), (3, 0, 0));
        assert!(p.text.contains("daily analysis"));
        assert!(p.text.contains("H000, H001, W000"));
        assert!(p.text.contains("use only BUY or HOLD"));
        assert!(p.text.contains("\"recommendations\""));
        assert!(!p.text.contains("more instruments omitted"));
    }

    #[test]
    fn holdings_first_then_by_attention() {
        // H001 moved +1%, H000 flat; both before the watchlist
        let req = daily(2, 1);
        let p = build_prompt(&req, &KindProfile::for_kind(AnalysisKind::Daily), &PromptConfig::default());
        let h1 = p.text.find("### H001").unwrap();
        let h0 = p.text.find("### H000").unwrap();
        let w0 = p.text.find("### W000").unwrap();
        assert!(h1 < h0 && h0 < w0);
    }

    #[test]
    fn ties_keep_input_order() {
        let req = daily(0, 3);
        let p = build_prompt(&req, &KindProfile::for_kind(AnalysisKind::Daily), &PromptConfig::default());
        let positions: Vec<usize> = ["### W000", "### W001", "### W002"]
            .iter()
            .map(|s| p.text.find(s).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn large_request_is_bounded_by_count() {
        let req = daily(30, 70);
        let p = build_prompt(&req, &KindProfile::for_kind(AnalysisKind::Daily), &PromptConfig {
            max_prompt_chars: usize::MAX,
            ..PromptConfig::default()
        });
        assert_eq!((p.detailed, p.summarized, p.omitted), (20, 40, 40));
        assert!(p.text.contains("40 more instruments omitted"));
        // allowed symbols still list every instrument
        assert!(p.text.contains("W069"));
    }

    #[test]
    fn char_limit_drops_summaries_before_details() {
        let req = daily(5, 5);
        let config = PromptConfig {
            max_detailed_instruments: 5,
            max_summarized_instruments: 5,
            max_prompt_chars: usize::MAX,
        };
        let profile = KindProfile::for_kind(AnalysisKind::Daily);
        let full = build_prompt(&req, &profile, &config);
        assert_eq!(full.summarized, 5);

        let tighter = PromptConfig {
            max_prompt_chars: full.text.chars().count() - 10,
            ..config.clone()
        };
        let p = build_prompt(&req, &profile, &tighter);
        assert!(p.summarized < 5);
        assert_eq!(p.detailed, 5);
        assert!(p.text.chars().count() <= tighter.max_prompt_chars);

        let tiny = PromptConfig {
            max_prompt_chars: 10,
            ..config
        };
        let p = build_prompt(&req, &profile, &tiny);
        assert_eq!((p.detailed, p.summarized, p.omitted), (0, 0, 10));
        assert!(p.text.contains("Only recommend these symbols"));
    }

    #[test]
    fn monthly_includes_allocation() {
        let s = snap("AAA", 10.0, 10.0);
        let holdings = vec![Holding::new("AAA", 1.0).with_attribution("US", "Tech")];
        let portfolio = PortfolioContext::build(&holdings, std::slice::from_ref(&s)).unwrap();
        let req = AnalysisRequest::new(AnalysisKind::Monthly, vec![RequestInstrument::holding(s, None)])
            .with_portfolio(portfolio);
        let p = build_prompt(&req, &KindProfile::for_kind(AnalysisKind::Monthly), &PromptConfig::default());
        assert!(p.text.contains("By sector: Tech 100.0%"));
        assert!(p.text.contains("By country: US 100.0%"));
        assert!(!p.text.contains("use only BUY or HOLD"));
    }

    #[test]
    fn attention_counts_crosses_and_breaks() {
        let s = snap("AAA", 102.0, 100.0);
        let mut ind = compute_indicators(&s, None, &IndicatorConfig::default()).unwrap();
        ind.golden_cross = true;
        ind.new_high_break = true;
        ind.resistance_break = true;
        let inst = RequestInstrument::holding(s, Some(ind));
        assert!((attention_score(&inst) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn detailed_block_shows_bands_and_extremes() {
        let s = snap("AAA", 105.0, 100.0);
        let mut ind = compute_indicators(&s, None, &IndicatorConfig::default()).unwrap();
        ind.bollinger = Some(BollingerBands {
            upper: 110.0,
            middle: 100.0,
            lower: 90.0,
        });
        ind.new_high_days = Some(50);
        let block = detailed_block(&RequestInstrument::holding(s, Some(ind)));
        assert!(block.contains("Bollinger upper 110.00 middle 100.00 lower 90.00 (%B 0.75)"));
        assert!(block.contains("Highest close in 50 bars"));
        assert!(!block.contains("Lowest close"));
    }
}
