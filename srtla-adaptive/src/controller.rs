//! Adaptive Bitrate Controller
//!
//! Keeps asymmetric moving averages of RTT and packets-in-flight and derives
//! the current encoder bitrate from them. Averages fall fast and rise slowly
//! so a recovering link is trusted quickly while congestion has to persist
//! before the ceiling creeps back up. The working ceiling (`temp_max`)
//! bounces between hard floors and the configured target; conditions on a
//! mobile uplink fluctuate so much that chasing them directly would pin the
//! bitrate at the bottom.

use crate::settings::{AdaptiveBitrateSettings, FAST_SETTINGS};
use std::collections::VecDeque;

/// Bitrate floor the controller saturates at under extreme congestion
const BITRATE_FLOOR: i64 = 50_000;

/// Floor for the working ceiling
const TEMP_MAX_FLOOR: i64 = 250_000;

/// Maximum entries kept in the action log
const MAX_ACTIONS_TAKEN: usize = 6;

/// One congestion telemetry sample, taken roughly every 200 ms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamStats {
    /// Round-trip time in milliseconds
    pub rtt_ms: f64,
    /// Packets sent but not yet acknowledged
    pub packets_in_flight: f64,
}

/// Receives bitrate changes decided by the controller
pub trait AdaptiveBitrateDelegate {
    fn set_video_stream_bitrate(&mut self, bitrate: u32);
}

/// Congestion-driven bitrate controller
pub struct AdaptiveBitrateController {
    avg_rtt: f64,
    fast_rtt: f64,
    smooth_pif: f64,
    fast_pif: f64,
    cur_bitrate: i64,
    prev_bitrate: i64,
    target_bitrate: i64,
    temp_max_bitrate: i64,
    settings: AdaptiveBitrateSettings,
    actions_taken: VecDeque<String>,
    delegate: Box<dyn AdaptiveBitrateDelegate + Send>,
}

impl AdaptiveBitrateController {
    pub fn new(target_bitrate: u32, delegate: Box<dyn AdaptiveBitrateDelegate + Send>) -> Self {
        AdaptiveBitrateController {
            avg_rtt: 0.0,
            fast_rtt: 0.0,
            smooth_pif: 0.0,
            fast_pif: 0.0,
            cur_bitrate: TEMP_MAX_FLOOR,
            prev_bitrate: TEMP_MAX_FLOOR,
            target_bitrate: i64::from(target_bitrate),
            temp_max_bitrate: TEMP_MAX_FLOOR,
            settings: FAST_SETTINGS,
            actions_taken: VecDeque::new(),
            delegate,
        }
    }

    pub fn set_target_bitrate(&mut self, bitrate: u32) {
        self.target_bitrate = i64::from(bitrate);
    }

    /// Swap the tuning profile without resetting the moving averages
    pub fn set_settings(&mut self, settings: AdaptiveBitrateSettings) {
        tracing::info!("Using settings {:?}", settings);
        self.settings = settings;
    }

    /// Current bitrate in bits per second
    pub fn current_bitrate(&self) -> u32 {
        self.cur_bitrate as u32
    }

    /// Current working ceiling in bits per second
    pub fn temp_max_bitrate(&self) -> u32 {
        self.temp_max_bitrate as u32
    }

    pub fn smooth_pif(&self) -> f64 {
        self.smooth_pif
    }

    pub fn fast_pif(&self) -> f64 {
        self.fast_pif
    }

    /// Snapshot of the recent decrease actions, oldest first
    pub fn actions_taken(&self) -> Vec<String> {
        self.actions_taken.iter().cloned().collect()
    }

    /// Feed one telemetry sample and notify the delegate on a bitrate change
    pub fn update(&mut self, stats: StreamStats) {
        self.calc_smoothed_pif(&stats);
        self.calc_rtts(&stats);
        self.increase_temp_max_bitrate(&stats, 15.0, 10);
        // slow decreases if needed
        let settings = self.settings;
        self.decrease_max_rate_if_pif_is_high(0.9, 100.0, 250_000);
        self.decrease_max_rate_if_rtt_is_high(0.9, 250.0, 250_000);
        self.decrease_max_rate_if_rtt_diff_is_high(
            &stats,
            settings.rtt_diff_high_factor,
            settings.rtt_diff_high_allowed_spike,
            settings.rtt_diff_high_min_decrease,
        );
        self.calculate_current_bitrate();
        if self.prev_bitrate != self.cur_bitrate {
            self.delegate
                .set_video_stream_bitrate(self.cur_bitrate as u32);
            self.prev_bitrate = self.cur_bitrate;
        }
    }

    fn calc_smoothed_pif(&mut self, stats: &StreamStats) {
        // increase slowly, decrease fast to stay close to the ideal pif
        if stats.packets_in_flight > self.smooth_pif {
            self.smooth_pif = self.smooth_pif * 0.98 + stats.packets_in_flight * 0.02;
        } else {
            self.smooth_pif = self.smooth_pif * 0.90 + stats.packets_in_flight * 0.10;
        }
        self.fast_pif = self.fast_pif * 0.67 + stats.packets_in_flight * 0.33;
    }

    fn calc_rtts(&mut self, stats: &StreamStats) {
        if self.avg_rtt < 1.0 {
            self.avg_rtt = stats.rtt_ms;
        }
        if self.avg_rtt > stats.rtt_ms {
            self.avg_rtt = self.avg_rtt * 0.60 + stats.rtt_ms * 0.40;
        } else {
            self.avg_rtt *= 0.99;
            if stats.rtt_ms < 450.0 {
                self.avg_rtt += stats.rtt_ms * 0.01;
            } else {
                self.avg_rtt += 450.0 * 0.001;
            }
        }
        if self.fast_rtt > stats.rtt_ms {
            self.fast_rtt = self.fast_rtt * 0.70 + stats.rtt_ms * 0.30;
        } else {
            self.fast_rtt = self.fast_rtt * 0.90 + stats.rtt_ms * 0.10;
        }
        if self.avg_rtt > 450.0 {
            self.avg_rtt = 450.0;
        }
        self.avg_rtt = (self.avg_rtt * 100.0).round() / 100.0;
        self.fast_rtt = (self.fast_rtt * 100.0).round() / 100.0;
    }

    fn increase_temp_max_bitrate(
        &mut self,
        stats: &StreamStats,
        allowed_rtt_jitter: f64,
        allowed_pif_jitter: i64,
    ) {
        let ceiling = self.settings.packets_in_flight;
        let pif_excess = stats.packets_in_flight as i64 - self.smooth_pif as i64;
        let headroom = ceiling - pif_excess.clamp(0, ceiling);
        if self.smooth_pif < ceiling as f64 && self.fast_rtt <= self.avg_rtt + allowed_rtt_jitter {
            if pif_excess < allowed_pif_jitter {
                self.temp_max_bitrate += self.settings.pif_diff_increase_factor * headroom / ceiling;
                if self.temp_max_bitrate > self.target_bitrate {
                    self.temp_max_bitrate = self.target_bitrate;
                }
            }
        }
    }

    fn decrease_max_rate_if_pif_is_high(&mut self, factor: f64, pif_max: f64, minimum_decrease: i64) {
        if self.smooth_pif <= pif_max {
            return;
        }
        let new_max_bitrate = (self.temp_max_bitrate as f64 * factor) as i64;
        let difference = self.temp_max_bitrate - new_max_bitrate;
        if difference < minimum_decrease {
            self.temp_max_bitrate -= minimum_decrease;
            self.log_adaptive_action(format!(
                "PIF: decreasing bitrate by {}k, smooth pif {} > pif max {}",
                minimum_decrease / 1000,
                self.smooth_pif as i64,
                pif_max as i64
            ));
        } else {
            self.temp_max_bitrate = new_max_bitrate;
            self.log_adaptive_action(format!(
                "PIF: decreasing bitrate by {}%, smooth pif {} > pif max {}",
                (100.0 * (1.0 - factor)).round() as i64,
                self.smooth_pif as i64,
                pif_max as i64
            ));
        }
    }

    fn decrease_max_rate_if_rtt_is_high(&mut self, factor: f64, rtt_max: f64, minimum_decrease: i64) {
        if self.avg_rtt <= rtt_max {
            return;
        }
        let new_max_bitrate = (self.temp_max_bitrate as f64 * factor) as i64;
        let difference = self.temp_max_bitrate - new_max_bitrate;
        if difference < minimum_decrease {
            self.temp_max_bitrate -= minimum_decrease;
            self.log_adaptive_action(format!(
                "RTT: decreasing bitrate by {}k, avg rtt {} > rtt max {}",
                minimum_decrease / 1000,
                self.avg_rtt as i64,
                rtt_max as i64
            ));
        } else {
            self.temp_max_bitrate = new_max_bitrate;
            self.log_adaptive_action(format!(
                "RTT: decreasing bitrate by {}%, avg rtt {} > rtt max {}",
                (100.0 * (1.0 - factor)).round() as i64,
                self.avg_rtt as i64,
                rtt_max as i64
            ));
        }
    }

    fn decrease_max_rate_if_rtt_diff_is_high(
        &mut self,
        stats: &StreamStats,
        factor: f64,
        rtt_spike_allowed: f64,
        minimum_decrease: i64,
    ) {
        if stats.rtt_ms <= self.avg_rtt + rtt_spike_allowed {
            return;
        }
        let new_max_bitrate = (self.temp_max_bitrate as f64 * factor) as i64;
        let difference = self.temp_max_bitrate - new_max_bitrate;
        if difference < minimum_decrease {
            self.temp_max_bitrate -= minimum_decrease;
            self.log_adaptive_action(format!(
                "RTT: decreasing bitrate by {}k, rtt {} > avg rtt {} + {}",
                minimum_decrease / 1000,
                stats.rtt_ms as i64,
                self.avg_rtt as i64,
                rtt_spike_allowed as i64
            ));
        } else {
            self.temp_max_bitrate = new_max_bitrate;
            self.log_adaptive_action(format!(
                "RTT: decreasing bitrate by {}%, rtt {} > avg rtt {} + {}",
                (100.0 * (1.0 - factor)).round() as i64,
                stats.rtt_ms as i64,
                self.avg_rtt as i64,
                rtt_spike_allowed as i64
            ));
        }
    }

    fn calculate_current_bitrate(&mut self) {
        let ceiling = self.settings.packets_in_flight;
        let mut pif_diff = self.fast_pif as i64 - self.smooth_pif as i64;
        // lazy decrease
        if pif_diff > ceiling {
            self.log_adaptive_action(format!(
                "Lazy decrease, pif diff {} > limit {}",
                pif_diff, ceiling
            ));
            self.temp_max_bitrate = (self.temp_max_bitrate as f64 * 0.95) as i64;
        }
        if pif_diff <= ceiling / 5 {
            pif_diff = 0;
        }
        pif_diff = pif_diff.clamp(0, ceiling);
        // harder decrease
        if pif_diff == ceiling {
            self.temp_max_bitrate -= 500_000;
            self.log_adaptive_action(format!(
                "Hard decrease by 500k, pif diff at limit {}",
                ceiling
            ));
        }
        if self.temp_max_bitrate < TEMP_MAX_FLOOR {
            self.temp_max_bitrate = TEMP_MAX_FLOOR;
        }
        self.cur_bitrate = self.temp_max_bitrate * (ceiling - pif_diff) / ceiling;
        if self.cur_bitrate < BITRATE_FLOOR {
            self.cur_bitrate = BITRATE_FLOOR;
        }
        // pif running away, drop hard until the backlog drains
        if self.fast_pif as i64 - self.smooth_pif as i64 > ceiling * 2 {
            self.cur_bitrate = BITRATE_FLOOR;
        }
    }

    fn log_adaptive_action(&mut self, action: String) {
        tracing::debug!("{}", action);
        self.actions_taken.push_back(action);
        while self.actions_taken.len() > MAX_ACTIONS_TAKEN {
            self.actions_taken.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SLOW_SETTINGS;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingDelegate {
        bitrates: Arc<Mutex<Vec<u32>>>,
    }

    impl AdaptiveBitrateDelegate for RecordingDelegate {
        fn set_video_stream_bitrate(&mut self, bitrate: u32) {
            self.bitrates.lock().unwrap().push(bitrate);
        }
    }

    fn controller(target: u32) -> (AdaptiveBitrateController, Arc<Mutex<Vec<u32>>>) {
        let delegate = RecordingDelegate::default();
        let bitrates = delegate.bitrates.clone();
        (
            AdaptiveBitrateController::new(target, Box::new(delegate)),
            bitrates,
        )
    }

    fn good_sample() -> StreamStats {
        StreamStats {
            rtt_ms: 30.0,
            packets_in_flight: 10.0,
        }
    }

    fn congested_sample() -> StreamStats {
        StreamStats {
            rtt_ms: 500.0,
            packets_in_flight: 300.0,
        }
    }

    #[test]
    fn test_converges_to_target_under_good_conditions() {
        let (mut controller, _bitrates) = controller(5_000_000);

        let mut prev = controller.current_bitrate();
        for _ in 0..200 {
            controller.update(good_sample());
            let cur = controller.current_bitrate();
            assert!(cur >= prev, "bitrate decreased from {} to {}", prev, cur);
            prev = cur;
        }
        assert_eq!(controller.current_bitrate(), 5_000_000);
    }

    #[test]
    fn test_temp_max_decreases_under_congestion() {
        let (mut controller, _bitrates) = controller(5_000_000);

        for _ in 0..200 {
            controller.update(good_sample());
        }
        assert_eq!(controller.temp_max_bitrate(), 5_000_000);

        let mut prev = controller.temp_max_bitrate();
        let mut reached_floor = false;
        for _ in 0..100 {
            controller.update(congested_sample());
            let cur = controller.temp_max_bitrate();
            if reached_floor {
                assert_eq!(cur, 250_000);
            } else if cur == 250_000 {
                reached_floor = true;
            } else {
                assert!(cur < prev, "temp max did not decrease: {} -> {}", prev, cur);
            }
            prev = cur;
        }
        assert!(reached_floor);
    }

    #[test]
    fn test_runaway_backlog_forces_floor() {
        let (mut controller, _bitrates) = controller(10_000_000);

        for _ in 0..200 {
            controller.update(good_sample());
        }
        // a burst far above the ceiling makes fast pif run away from smooth pif
        controller.update(StreamStats {
            rtt_ms: 30.0,
            packets_in_flight: 5_000.0,
        });
        controller.update(StreamStats {
            rtt_ms: 30.0,
            packets_in_flight: 5_000.0,
        });
        assert_eq!(controller.current_bitrate(), 50_000);
    }

    #[test]
    fn test_delegate_fires_only_on_change() {
        let (mut controller, bitrates) = controller(5_000_000);

        for _ in 0..300 {
            controller.update(good_sample());
        }
        let recorded = bitrates.lock().unwrap().clone();
        assert!(!recorded.is_empty());
        for pair in recorded.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert_eq!(*recorded.last().unwrap(), 5_000_000);
    }

    #[test]
    fn test_profile_swap_preserves_averages() {
        let (mut controller, _bitrates) = controller(5_000_000);

        for _ in 0..50 {
            controller.update(good_sample());
        }
        let smooth_pif = controller.smooth_pif();
        let fast_pif = controller.fast_pif();

        controller.set_settings(SLOW_SETTINGS);
        assert_eq!(controller.smooth_pif(), smooth_pif);
        assert_eq!(controller.fast_pif(), fast_pif);
    }

    #[test]
    fn test_action_log_is_bounded() {
        let (mut controller, _bitrates) = controller(5_000_000);

        for _ in 0..200 {
            controller.update(good_sample());
        }
        for _ in 0..100 {
            controller.update(congested_sample());
        }
        assert!(controller.actions_taken().len() <= 6);
        assert!(!controller.actions_taken().is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn bitrate_stays_within_bounds(
                samples in prop::collection::vec((0.0f64..2000.0, 0.0f64..2000.0), 1..300)
            ) {
                let (mut controller, _bitrates) = controller(5_000_000);
                for (rtt_ms, packets_in_flight) in samples {
                    controller.update(StreamStats { rtt_ms, packets_in_flight });
                    prop_assert!(controller.current_bitrate() >= 50_000);
                    prop_assert!(controller.current_bitrate() <= 5_000_000);
                    prop_assert!(controller.temp_max_bitrate() >= 250_000);
                    prop_assert!(controller.temp_max_bitrate() <= 5_000_000);
                }
            }
        }
    }
}
