//! Quoting parameter set.
//!
//! One immutable snapshot is handed to every component for the duration
//! of a cycle. Reloads go through [`QuotingParams::sanitize`] and then
//! `QuotingEngine::apply_params`, never through in-place mutation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{QuotingError, QuotingResult};

/// Pricing strategy for the raw quote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QuotingMode {
    #[default]
    Top,
    Mid,
    Join,
    InverseJoin,
    InverseTop,
    HamelinRat,
    Depth,
}

impl QuotingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "Top",
            Self::Mid => "Mid",
            Self::Join => "Join",
            Self::InverseJoin => "InverseJoin",
            Self::InverseTop => "InverseTop",
            Self::HamelinRat => "HamelinRat",
            Self::Depth => "Depth",
        }
    }
}

impl FromStr for QuotingMode {
    type Err = QuotingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Top" => Ok(Self::Top),
            "Mid" => Ok(Self::Mid),
            "Join" => Ok(Self::Join),
            "InverseJoin" => Ok(Self::InverseJoin),
            "InverseTop" => Ok(Self::InverseTop),
            "HamelinRat" | "Colossus" => Ok(Self::HamelinRat),
            "Depth" => Ok(Self::Depth),
            other => Err(QuotingError::InvalidMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for QuotingMode {
    type Error = QuotingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QuotingMode> for String {
    fn from(mode: QuotingMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for QuotingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round-trip safety policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotingSafety {
    Off,
    PingPong,
    #[default]
    Boomerang,
    #[serde(rename = "AK47")]
    Ak47,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FairValueModel {
    /// Midpoint of the best levels.
    #[default]
    #[serde(rename = "BBO")]
    Bbo,
    /// Weighted by same-side sizes.
    #[serde(rename = "wBBO")]
    WeightedBbo,
    /// Weighted by opposite-side sizes.
    #[serde(rename = "rwBBO")]
    ReversedWeightedBbo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoPositionMode {
    Manual,
    #[default]
    #[serde(rename = "EWMA_LS")]
    EwmaLs,
    #[serde(rename = "EWMA_LMS")]
    EwmaLms,
    #[serde(rename = "EWMA_4")]
    Ewma4,
}

/// Shape of the position divergence band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PDivMode {
    #[default]
    Manual,
    Linear,
    Sine,
    #[serde(rename = "SQRT")]
    Sqrt,
    Switch,
}

/// Aggressive position rebalancing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Apr {
    #[default]
    Off,
    Size,
    SizeWidth,
}

/// Super-opportunity (wide spread) behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuperTrades {
    #[default]
    Off,
    Trades,
    Size,
    TradesSize,
}

impl SuperTrades {
    pub fn scales_size(&self) -> bool {
        matches!(self, Self::Size | Self::TradesSize)
    }

    pub fn scales_trades(&self) -> bool {
        matches!(self, Self::Trades | Self::TradesSize)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StdevMode {
    #[default]
    Off,
    #[serde(rename = "OnFV")]
    OnFv,
    #[serde(rename = "OnFVAPROff")]
    OnFvAprOff,
    OnTops,
    #[serde(rename = "OnTopsAPROff")]
    OnTopsAprOff,
    OnTop,
    #[serde(rename = "OnTopAPROff")]
    OnTopAprOff,
}

impl StdevMode {
    /// Modes that apply regardless of which side rebalancing claimed.
    pub fn ignores_apr(&self) -> bool {
        matches!(self, Self::OnFv | Self::OnTops | Self::OnTop)
    }

    pub fn on_fair(&self) -> bool {
        matches!(self, Self::OnFv | Self::OnFvAprOff)
    }

    pub fn on_tops(&self) -> bool {
        matches!(self, Self::OnTops | Self::OnTopsAprOff)
    }
}

/// Where new pings are allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PingAt {
    #[default]
    BothSides,
    BidSide,
    AskSide,
    DepletedSide,
    DepletedBidSide,
    DepletedAskSide,
    StopPings,
}

/// Which open pings a pong is matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PongAt {
    #[default]
    ShortPingFair,
    AveragePingFair,
    LongPingFair,
    ShortPingAggressive,
    AveragePingAggressive,
    LongPingAggressive,
}

impl PongAt {
    pub fn is_short(&self) -> bool {
        matches!(self, Self::ShortPingFair | Self::ShortPingAggressive)
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Self::LongPingFair | Self::LongPingAggressive)
    }

    pub fn is_average(&self) -> bool {
        matches!(self, Self::AveragePingFair | Self::AveragePingAggressive)
    }

    pub fn is_aggressive(&self) -> bool {
        matches!(
            self,
            Self::ShortPingAggressive | Self::AveragePingAggressive | Self::LongPingAggressive
        )
    }
}

/// The six horizons of the EWMA ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EwmaHorizon {
    VeryLong,
    Long,
    Medium,
    Short,
    ExtraShort,
    UltraShort,
}

impl EwmaHorizon {
    pub const ALL: [EwmaHorizon; 6] = [
        Self::VeryLong,
        Self::Long,
        Self::Medium,
        Self::Short,
        Self::ExtraShort,
        Self::UltraShort,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::VeryLong => "VeryLong",
            Self::Long => "Long",
            Self::Medium => "Medium",
            Self::Short => "Short",
            Self::ExtraShort => "ExtraShort",
            Self::UltraShort => "UltraShort",
        }
    }
}

/// Full quoting parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotingParams {
    /// Protective half-spread (absolute).
    #[serde(default = "default_width")]
    pub width_ping: Decimal,
    #[serde(default = "default_width_percentage")]
    pub width_ping_percentage: Decimal,
    /// Minimum profit distance between a ping and its pong.
    #[serde(default = "default_width")]
    pub width_pong: Decimal,
    #[serde(default = "default_width_percentage")]
    pub width_pong_percentage: Decimal,
    /// Use the `*_percentage` widths (of fair value) instead of absolute ones.
    #[serde(default)]
    pub width_percentage: bool,

    #[serde(default = "default_true")]
    pub best_width: bool,
    #[serde(default)]
    pub best_width_size: Decimal,

    #[serde(default = "default_buy_size")]
    pub buy_size: Decimal,
    #[serde(default = "default_size_percentage")]
    pub buy_size_percentage: u32,
    #[serde(default)]
    pub buy_size_max: bool,
    #[serde(default = "default_sell_size")]
    pub sell_size: Decimal,
    #[serde(default = "default_size_percentage")]
    pub sell_size_percentage: u32,
    #[serde(default)]
    pub sell_size_max: bool,

    #[serde(default)]
    pub ping_at: PingAt,
    #[serde(default)]
    pub pong_at: PongAt,
    #[serde(default)]
    pub mode: QuotingMode,
    #[serde(default)]
    pub safety: QuotingSafety,

    /// AK47: number of price steps before the cycle restarts.
    #[serde(default = "default_bullets")]
    pub bullets: u32,
    /// AK47: price step (absolute).
    #[serde(default = "default_range")]
    pub range: Decimal,
    #[serde(default = "default_range_percentage")]
    pub range_percentage: Decimal,

    #[serde(default)]
    pub fv_model: FairValueModel,

    #[serde(default = "default_target_base_position")]
    pub target_base_position: Decimal,
    #[serde(default = "default_target_base_position_percentage")]
    pub target_base_position_percentage: u32,
    #[serde(default = "default_position_divergence")]
    pub position_divergence: Decimal,
    #[serde(default = "default_position_divergence_min")]
    pub position_divergence_min: Decimal,
    #[serde(default = "default_position_divergence_percentage")]
    pub position_divergence_percentage: u32,
    #[serde(default = "default_position_divergence_percentage_min")]
    pub position_divergence_percentage_min: u32,
    #[serde(default)]
    pub position_divergence_mode: PDivMode,
    /// Sizes, target and divergence as a percentage of base value.
    #[serde(default)]
    pub percentage_values: bool,
    #[serde(default)]
    pub auto_position_mode: AutoPositionMode,

    #[serde(default)]
    pub aggressive_position_rebalancing: Apr,
    #[serde(default)]
    pub super_trades: SuperTrades,

    #[serde(default = "default_trades_per_minute")]
    pub trades_per_minute: f64,
    #[serde(default = "default_trade_rate_seconds")]
    pub trade_rate_seconds: u32,

    #[serde(default)]
    pub protection_ewma_width_ping: bool,
    #[serde(default = "default_true")]
    pub protection_ewma_quote_price: bool,
    #[serde(default = "default_protection_ewma_periods")]
    pub protection_ewma_periods: u32,

    #[serde(default)]
    pub quoting_stdev_protection: StdevMode,
    #[serde(default)]
    pub quoting_stdev_bollinger_bands: bool,
    #[serde(default = "default_one_f64")]
    pub quoting_stdev_protection_factor: f64,
    #[serde(default = "default_stdev_periods")]
    pub quoting_stdev_protection_periods: u32,

    #[serde(default = "default_ewma_sensibility_percentage")]
    pub ewma_sensibility_percentage: f64,
    #[serde(default)]
    pub quoting_ewma_trend_protection: bool,
    #[serde(default = "default_trend_threshold")]
    pub quoting_ewma_trend_threshold: f64,

    #[serde(default = "default_very_long_ewma_periods")]
    pub very_long_ewma_periods: u32,
    #[serde(default = "default_long_ewma_periods")]
    pub long_ewma_periods: u32,
    #[serde(default = "default_medium_ewma_periods")]
    pub medium_ewma_periods: u32,
    #[serde(default = "default_short_ewma_periods")]
    pub short_ewma_periods: u32,
    #[serde(default = "default_extra_short_ewma_periods")]
    pub extra_short_ewma_periods: u32,
    #[serde(default = "default_ultra_short_ewma_periods")]
    pub ultra_short_ewma_periods: u32,

    #[serde(default = "default_multiplier")]
    pub apr_multiplier: Decimal,
    #[serde(default = "default_multiplier")]
    pub sop_width_multiplier: Decimal,
    #[serde(default = "default_multiplier")]
    pub sop_size_multiplier: Decimal,

    /// Days after which closed pongs are dropped; negative also drops unmatched trades.
    #[serde(default)]
    pub clean_pongs_auto: f64,
    #[serde(default = "default_profit_hour_interval")]
    pub profit_hour_interval: f64,
    /// UI push interval in seconds; zero pushes in real time.
    #[serde(default = "default_delay_ui")]
    pub delay_ui: u32,
}

impl Default for QuotingParams {
    fn default() -> Self {
        Self {
            width_ping: default_width(),
            width_ping_percentage: default_width_percentage(),
            width_pong: default_width(),
            width_pong_percentage: default_width_percentage(),
            width_percentage: false,
            best_width: true,
            best_width_size: Decimal::ZERO,
            buy_size: default_buy_size(),
            buy_size_percentage: default_size_percentage(),
            buy_size_max: false,
            sell_size: default_sell_size(),
            sell_size_percentage: default_size_percentage(),
            sell_size_max: false,
            ping_at: PingAt::default(),
            pong_at: PongAt::default(),
            mode: QuotingMode::default(),
            safety: QuotingSafety::default(),
            bullets: default_bullets(),
            range: default_range(),
            range_percentage: default_range_percentage(),
            fv_model: FairValueModel::default(),
            target_base_position: default_target_base_position(),
            target_base_position_percentage: default_target_base_position_percentage(),
            position_divergence: default_position_divergence(),
            position_divergence_min: default_position_divergence_min(),
            position_divergence_percentage: default_position_divergence_percentage(),
            position_divergence_percentage_min: default_position_divergence_percentage_min(),
            position_divergence_mode: PDivMode::default(),
            percentage_values: false,
            auto_position_mode: AutoPositionMode::default(),
            aggressive_position_rebalancing: Apr::default(),
            super_trades: SuperTrades::default(),
            trades_per_minute: default_trades_per_minute(),
            trade_rate_seconds: default_trade_rate_seconds(),
            protection_ewma_width_ping: false,
            protection_ewma_quote_price: true,
            protection_ewma_periods: default_protection_ewma_periods(),
            quoting_stdev_protection: StdevMode::default(),
            quoting_stdev_bollinger_bands: false,
            quoting_stdev_protection_factor: default_one_f64(),
            quoting_stdev_protection_periods: default_stdev_periods(),
            ewma_sensibility_percentage: default_ewma_sensibility_percentage(),
            quoting_ewma_trend_protection: false,
            quoting_ewma_trend_threshold: default_trend_threshold(),
            very_long_ewma_periods: default_very_long_ewma_periods(),
            long_ewma_periods: default_long_ewma_periods(),
            medium_ewma_periods: default_medium_ewma_periods(),
            short_ewma_periods: default_short_ewma_periods(),
            extra_short_ewma_periods: default_extra_short_ewma_periods(),
            ultra_short_ewma_periods: default_ultra_short_ewma_periods(),
            apr_multiplier: default_multiplier(),
            sop_width_multiplier: default_multiplier(),
            sop_size_multiplier: default_multiplier(),
            clean_pongs_auto: 0.0,
            profit_hour_interval: default_profit_hour_interval(),
            delay_ui: default_delay_ui(),
        }
    }
}

impl QuotingParams {
    /// Clamp every numeric field to its documented range.
    pub fn sanitize(mut self) -> Self {
        let eps = dec!(0.00000001);
        self.width_ping = self.width_ping.max(eps);
        self.width_ping_percentage = self.width_ping_percentage.clamp(dec!(0.0001), dec!(100000));
        self.width_pong = self.width_pong.max(eps);
        self.width_pong_percentage = self.width_pong_percentage.clamp(dec!(0.0001), dec!(100000));
        self.best_width_size = self.best_width_size.max(Decimal::ZERO);
        self.buy_size = self.buy_size.max(eps);
        self.buy_size_percentage = self.buy_size_percentage.clamp(1, 100);
        self.sell_size = self.sell_size.max(eps);
        self.sell_size_percentage = self.sell_size_percentage.clamp(1, 100);
        self.bullets = self.bullets.clamp(1, 10);
        self.range_percentage = self.range_percentage.clamp(dec!(0.001), dec!(100));
        self.target_base_position_percentage = self.target_base_position_percentage.min(100);
        self.position_divergence_percentage = self.position_divergence_percentage.min(100);
        self.position_divergence_percentage_min = self.position_divergence_percentage_min.min(100);
        self.protection_ewma_periods = self.protection_ewma_periods.max(1);
        self.quoting_stdev_protection_periods = self.quoting_stdev_protection_periods.max(1);
        self.very_long_ewma_periods = self.very_long_ewma_periods.max(1);
        self.long_ewma_periods = self.long_ewma_periods.max(1);
        self.medium_ewma_periods = self.medium_ewma_periods.max(1);
        self.short_ewma_periods = self.short_ewma_periods.max(1);
        self.extra_short_ewma_periods = self.extra_short_ewma_periods.max(1);
        self.ultra_short_ewma_periods = self.ultra_short_ewma_periods.max(1);
        if self.mode == QuotingMode::Depth {
            self.width_percentage = false;
        }
        self
    }

    /// Reject values that would poison the floating-point statistics.
    pub fn validate(&self) -> QuotingResult<()> {
        let floats = [
            ("trades_per_minute", self.trades_per_minute),
            ("quoting_stdev_protection_factor", self.quoting_stdev_protection_factor),
            ("ewma_sensibility_percentage", self.ewma_sensibility_percentage),
            ("quoting_ewma_trend_threshold", self.quoting_ewma_trend_threshold),
            ("clean_pongs_auto", self.clean_pongs_auto),
            ("profit_hour_interval", self.profit_hour_interval),
        ];
        for (name, value) in floats {
            if !value.is_finite() {
                return Err(QuotingError::InvalidParams(format!("{name} is not finite")));
            }
        }
        if self.ewma_sensibility_percentage == 0.0 {
            return Err(QuotingError::InvalidParams(
                "ewma_sensibility_percentage must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ewma_periods(&self, horizon: EwmaHorizon) -> u32 {
        match horizon {
            EwmaHorizon::VeryLong => self.very_long_ewma_periods,
            EwmaHorizon::Long => self.long_ewma_periods,
            EwmaHorizon::Medium => self.medium_ewma_periods,
            EwmaHorizon::Short => self.short_ewma_periods,
            EwmaHorizon::ExtraShort => self.extra_short_ewma_periods,
            EwmaHorizon::UltraShort => self.ultra_short_ewma_periods,
        }
    }

    /// Horizons whose period differs from `previous`.
    pub fn changed_ewma_horizons(&self, previous: &QuotingParams) -> Vec<EwmaHorizon> {
        EwmaHorizon::ALL
            .into_iter()
            .filter(|h| self.ewma_periods(*h) != previous.ewma_periods(*h))
            .collect()
    }
}

fn default_true() -> bool {
    true
}
fn default_width() -> Decimal {
    dec!(2.0)
}
fn default_width_percentage() -> Decimal {
    dec!(0.25)
}
fn default_buy_size() -> Decimal {
    dec!(0.02)
}
fn default_sell_size() -> Decimal {
    dec!(0.01)
}
fn default_size_percentage() -> u32 {
    7
}
fn default_bullets() -> u32 {
    2
}
fn default_range() -> Decimal {
    dec!(0.5)
}
fn default_range_percentage() -> Decimal {
    dec!(5.0)
}
fn default_target_base_position() -> Decimal {
    dec!(1.0)
}
fn default_target_base_position_percentage() -> u32 {
    50
}
fn default_position_divergence() -> Decimal {
    dec!(0.9)
}
fn default_position_divergence_min() -> Decimal {
    dec!(0.4)
}
fn default_position_divergence_percentage() -> u32 {
    21
}
fn default_position_divergence_percentage_min() -> u32 {
    10
}
fn default_trades_per_minute() -> f64 {
    0.9
}
fn default_trade_rate_seconds() -> u32 {
    3
}
fn default_protection_ewma_periods() -> u32 {
    200
}
fn default_one_f64() -> f64 {
    1.0
}
fn default_stdev_periods() -> u32 {
    1200
}
fn default_ewma_sensibility_percentage() -> f64 {
    0.5
}
fn default_trend_threshold() -> f64 {
    2.0
}
fn default_very_long_ewma_periods() -> u32 {
    400
}
fn default_long_ewma_periods() -> u32 {
    200
}
fn default_medium_ewma_periods() -> u32 {
    100
}
fn default_short_ewma_periods() -> u32 {
    50
}
fn default_extra_short_ewma_periods() -> u32 {
    12
}
fn default_ultra_short_ewma_periods() -> u32 {
    3
}
fn default_multiplier() -> Decimal {
    dec!(2)
}
fn default_profit_hour_interval() -> f64 {
    0.5
}
fn default_delay_ui() -> u32 {
    7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let params: QuotingParams = toml::from_str("").unwrap();
        assert_eq!(params, QuotingParams::default());
        assert_eq!(params.width_ping, dec!(2.0));
        assert_eq!(params.bullets, 2);
        assert_eq!(params.mode, QuotingMode::Top);
        assert_eq!(params.safety, QuotingSafety::Boomerang);
    }

    #[test]
    fn test_parse_enum_names() {
        let toml_str = r#"
            mode = "HamelinRat"
            safety = "AK47"
            fv_model = "rwBBO"
            auto_position_mode = "EWMA_4"
            position_divergence_mode = "SQRT"
            quoting_stdev_protection = "OnTopsAPROff"
        "#;
        let params: QuotingParams = toml::from_str(toml_str).unwrap();
        assert_eq!(params.mode, QuotingMode::HamelinRat);
        assert_eq!(params.safety, QuotingSafety::Ak47);
        assert_eq!(params.fv_model, FairValueModel::ReversedWeightedBbo);
        assert_eq!(params.auto_position_mode, AutoPositionMode::Ewma4);
        assert_eq!(params.position_divergence_mode, PDivMode::Sqrt);
        assert_eq!(params.quoting_stdev_protection, StdevMode::OnTopsAprOff);
    }

    #[test]
    fn test_unknown_mode_is_invalid_mode() {
        let err = "Sideways".parse::<QuotingMode>().unwrap_err();
        assert!(matches!(err, QuotingError::InvalidMode(ref m) if m == "Sideways"));

        let parsed: Result<QuotingParams, _> = toml::from_str(r#"mode = "Sideways""#);
        let msg = parsed.unwrap_err().to_string();
        assert!(msg.contains("Invalid quoting mode"));
    }

    #[test]
    fn test_sanitize_clamps_ranges() {
        let params = QuotingParams {
            width_ping: Decimal::ZERO,
            bullets: 50,
            buy_size_percentage: 0,
            very_long_ewma_periods: 0,
            mode: QuotingMode::Depth,
            width_percentage: true,
            range_percentage: dec!(500),
            ..Default::default()
        }
        .sanitize();
        assert_eq!(params.width_ping, dec!(0.00000001));
        assert_eq!(params.bullets, 10);
        assert_eq!(params.buy_size_percentage, 1);
        assert_eq!(params.very_long_ewma_periods, 1);
        assert!(!params.width_percentage);
        assert_eq!(params.range_percentage, dec!(100));
    }

    #[test]
    fn test_validate_rejects_zero_sensibility() {
        let params = QuotingParams {
            ewma_sensibility_percentage: 0.0,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(QuotingError::InvalidParams(_))));
        assert!(QuotingParams::default().validate().is_ok());
    }

    #[test]
    fn test_changed_ewma_horizons() {
        let prev = QuotingParams::default();
        let next = QuotingParams {
            long_ewma_periods: 300,
            ultra_short_ewma_periods: 5,
            ..Default::default()
        };
        assert_eq!(
            next.changed_ewma_horizons(&prev),
            vec![EwmaHorizon::Long, EwmaHorizon::UltraShort]
        );
        assert!(prev.changed_ewma_horizons(&prev).is_empty());
    }
}
