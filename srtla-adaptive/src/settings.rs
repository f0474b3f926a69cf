//! Tuning profiles for the adaptive bitrate controller
//!
//! Profiles only carry constants; swapping one in at runtime does not touch
//! the controller's moving averages.

/// Constants governing one adaptive bitrate tuning profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveBitrateSettings {
    /// Packets-in-flight ceiling the scaling math works against
    pub packets_in_flight: i64,
    /// Multiplicative cut applied on an RTT spike
    pub rtt_diff_high_factor: f64,
    /// RTT spike above the average that triggers a cut (milliseconds)
    pub rtt_diff_high_allowed_spike: f64,
    /// Minimum cut on an RTT spike (bits per second)
    pub rtt_diff_high_min_decrease: i64,
    /// Additive increase scale when headroom is available (bits per second)
    pub pif_diff_increase_factor: i64,
}

/// Reacts quickly: higher increase rate, harder cuts, tight PIF ceiling
pub const FAST_SETTINGS: AdaptiveBitrateSettings = AdaptiveBitrateSettings {
    packets_in_flight: 200,
    rtt_diff_high_factor: 0.9,
    rtt_diff_high_allowed_spike: 50.0,
    rtt_diff_high_min_decrease: 250_000,
    pif_diff_increase_factor: 100_000,
};

/// Tolerates more backlog and spikes before reacting
pub const SLOW_SETTINGS: AdaptiveBitrateSettings = AdaptiveBitrateSettings {
    packets_in_flight: 500,
    rtt_diff_high_factor: 0.95,
    rtt_diff_high_allowed_spike: 100.0,
    rtt_diff_high_min_decrease: 100_000,
    pif_diff_increase_factor: 25_000,
};
