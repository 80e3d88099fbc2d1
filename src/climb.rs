//! Climb-rate series for a GPS track.
//!
//! Two series are derived, index-aligned with the track points:
//! - instantaneous rate against the previous point
//! - windowed rate over a centered time window, which smooths single-sample
//!   GPS noise for coloring and scoring
//!
//! Both are computed in a single pass; the windowed series uses two
//! monotonic pointers so a flight of tens of thousands of fixes stays O(n).
//! Malformed input never fails: boundary cases (index 0, zero elapsed time,
//! windows holding a single point) fall back to documented defaults and the
//! series is always full length.
//!
//! ## Example
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use paraglide_core::{ClimbClass, GeoPoint, TrackClimbAnalyzer, TrackPoint};
//!
//! let start = Utc.with_ymd_and_hms(2024, 7, 14, 11, 0, 0).unwrap();
//! let points: Vec<TrackPoint> = [(0, 100), (5, 150), (10, 100)]
//!     .iter()
//!     .map(|&(s, alt)| {
//!         TrackPoint::new(start + chrono::Duration::seconds(s), GeoPoint::new(46.0, 7.0), alt)
//!     })
//!     .collect();
//!
//! let analyzer = TrackClimbAnalyzer::new();
//! assert_eq!(analyzer.instantaneous_rates(&points), vec![0.0, 10.0, -10.0]);
//! assert_eq!(analyzer.windowed_rates(&points)[1], 0.0);
//! assert_eq!(analyzer.classify(-2.0), ClimbClass::StrongSink);
//! ```

use log::debug;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::{AltitudeSource, ClimbConfig};
use crate::error::{CoreError, MergeStep, Result};
use crate::store::TrackPointSource;
use crate::{FlightId, TrackPoint};

/// Display class of a climb rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClimbClass {
    StrongSink,
    WeakSink,
    Climb,
}

/// Run of consecutive points sharing a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimbSegment {
    pub start_index: usize,
    /// Inclusive
    pub end_index: usize,
    pub class: ClimbClass,
}

/// Summary figures for a flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimbStats {
    /// Highest windowed rate (m/s)
    pub max_climb_rate: f64,
    /// Lowest windowed rate (m/s)
    pub max_sink_rate: f64,
    /// Sum of positive altitude steps (m)
    pub total_gain_meters: f64,
    pub seconds_climbing: f64,
    pub seconds_weak_sink: f64,
    pub seconds_strong_sink: f64,
}

/// All derived series for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimbAnalysis {
    pub instantaneous: Vec<f64>,
    pub windowed: Vec<f64>,
    /// Class of each windowed rate
    pub classes: Vec<ClimbClass>,
    pub segments: Vec<ClimbSegment>,
    pub stats: ClimbStats,
}

impl ClimbAnalysis {
    /// JSON document for the presentation layer.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CoreError::InconsistentState {
            message: format!("failed to serialize climb analysis: {e}"),
            site_ids: Vec::new(),
        })
    }
}

/// Derives climb-rate series from track points.
#[derive(Debug, Clone, Default)]
pub struct TrackClimbAnalyzer {
    config: ClimbConfig,
}

impl TrackClimbAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects non-finite or out-of-range settings.
    pub fn with_config(config: ClimbConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClimbConfig {
        &self.config
    }

    /// Seconds since the first point.
    fn elapsed_seconds(points: &[TrackPoint]) -> Vec<f64> {
        let Some(first) = points.first() else {
            return Vec::new();
        };
        points
            .iter()
            .map(|p| (p.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0)
            .collect()
    }

    fn altitudes(&self, points: &[TrackPoint]) -> Vec<f64> {
        points
            .iter()
            .map(|p| match self.config.altitude_source {
                AltitudeSource::Gps => p.gps_altitude as f64,
                AltitudeSource::Pressure => p.pressure_altitude.unwrap_or(p.gps_altitude) as f64,
            })
            .collect()
    }

    fn instantaneous_from(times: &[f64], altitudes: &[f64]) -> Vec<f64> {
        let mut rates = Vec::with_capacity(times.len());
        for i in 0..times.len() {
            if i == 0 {
                // No previous point: boundary default, not a measurement
                rates.push(0.0);
                continue;
            }
            let dt = times[i] - times[i - 1];
            rates.push(if dt > 0.0 {
                (altitudes[i] - altitudes[i - 1]) / dt
            } else {
                0.0
            });
        }
        rates
    }

    /// Rate against the previous point; 0 at index 0 and for zero elapsed time.
    pub fn instantaneous_rates(&self, points: &[TrackPoint]) -> Vec<f64> {
        Self::instantaneous_from(&Self::elapsed_seconds(points), &self.altitudes(points))
    }

    fn windowed_from(&self, times: &[f64], altitudes: &[f64], instantaneous: &[f64]) -> Vec<f64> {
        let n = times.len();
        let half = self.config.window_seconds / 2.0;
        let mut rates = Vec::with_capacity(n);

        let mut first = 0;
        let mut last = 0;
        for i in 0..n {
            let lo = times[i] - half;
            let hi = times[i] + half;

            while first < i && times[first] < lo {
                first += 1;
            }
            if last < i {
                last = i;
            }
            while last + 1 < n && times[last + 1] <= hi {
                last += 1;
            }

            let dt = times[last] - times[first];
            rates.push(if last > first && dt > 0.0 {
                (altitudes[last] - altitudes[first]) / dt
            } else {
                instantaneous[i]
            });
        }
        rates
    }

    /// Rate over the centered window around each point.
    ///
    /// The window spans from the first point at or after `t - W/2` to the
    /// last point at or before `t + W/2`. A window without two distinct
    /// timestamps falls back to the instantaneous rate.
    pub fn windowed_rates(&self, points: &[TrackPoint]) -> Vec<f64> {
        let times = Self::elapsed_seconds(points);
        let altitudes = self.altitudes(points);
        let instantaneous = Self::instantaneous_from(&times, &altitudes);
        self.windowed_from(&times, &altitudes, &instantaneous)
    }

    pub fn classify(&self, rate: f64) -> ClimbClass {
        if rate <= self.config.strong_sink_threshold {
            ClimbClass::StrongSink
        } else if rate < self.config.climb_threshold {
            ClimbClass::WeakSink
        } else {
            ClimbClass::Climb
        }
    }

    /// Group consecutive rates of equal class.
    pub fn segments(&self, rates: &[f64]) -> Vec<ClimbSegment> {
        let mut segments: Vec<ClimbSegment> = Vec::new();
        for (i, &rate) in rates.iter().enumerate() {
            let class = self.classify(rate);
            if let Some(seg) = segments.last_mut() {
                if seg.class == class {
                    seg.end_index = i;
                    continue;
                }
            }
            segments.push(ClimbSegment {
                start_index: i,
                end_index: i,
                class,
            });
        }
        segments
    }

    /// Compute every series and the summary for one track.
    pub fn analyze(&self, points: &[TrackPoint]) -> ClimbAnalysis {
        let times = Self::elapsed_seconds(points);
        let altitudes = self.altitudes(points);
        let instantaneous = Self::instantaneous_from(&times, &altitudes);
        let windowed = self.windowed_from(&times, &altitudes, &instantaneous);
        let classes: Vec<ClimbClass> = windowed.iter().map(|&r| self.classify(r)).collect();
        let segments = self.segments(&windowed);

        let mut stats = ClimbStats::default();
        for (i, &rate) in windowed.iter().enumerate() {
            stats.max_climb_rate = stats.max_climb_rate.max(rate);
            stats.max_sink_rate = stats.max_sink_rate.min(rate);
            if i == 0 {
                continue;
            }
            let gain = altitudes[i] - altitudes[i - 1];
            if gain > 0.0 {
                stats.total_gain_meters += gain;
            }
            // Interval ending at i takes the class of i
            let dt = (times[i] - times[i - 1]).max(0.0);
            match classes[i] {
                ClimbClass::Climb => stats.seconds_climbing += dt,
                ClimbClass::WeakSink => stats.seconds_weak_sink += dt,
                ClimbClass::StrongSink => stats.seconds_strong_sink += dt,
            }
        }

        ClimbAnalysis {
            instantaneous,
            windowed,
            classes,
            segments,
            stats,
        }
    }

    /// Load a flight's points and analyze them.
    pub async fn analyze_flight<T: TrackPointSource>(
        &self,
        source: &T,
        flight_id: FlightId,
    ) -> Result<ClimbAnalysis> {
        let points = source
            .load_points(flight_id)
            .await
            .map_err(|e| CoreError::StoreFailure {
                step: MergeStep::LoadTrack,
                site_ids: Vec::new(),
                launch_ids: vec![flight_id],
                source: e,
            })?;
        let analysis = self.analyze(&points);
        debug!(
            "[ClimbAnalyzer] Flight {}: {} points, {} segments, climb {:.1} m/s, sink {:.1} m/s",
            flight_id,
            points.len(),
            analysis.segments.len(),
            analysis.stats.max_climb_rate,
            analysis.stats.max_sink_rate
        );
        Ok(analysis)
    }

    /// Analyze several already loaded tracks in order.
    pub fn analyze_tracks(
        &self,
        tracks: &[(FlightId, Vec<TrackPoint>)],
    ) -> Vec<(FlightId, ClimbAnalysis)> {
        tracks
            .iter()
            .map(|(id, points)| (*id, self.analyze(points)))
            .collect()
    }
}

/// Analyze many tracks in parallel; each track is still analyzed on one thread.
///
/// Output order matches input order.
#[cfg(feature = "parallel")]
pub fn analyze_tracks_parallel(
    analyzer: &TrackClimbAnalyzer,
    tracks: &[(FlightId, Vec<TrackPoint>)],
) -> Vec<(FlightId, ClimbAnalysis)> {
    tracks
        .par_iter()
        .map(|(id, points)| (*id, analyzer.analyze(points)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeoPoint;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 14, 11, 0, 0).unwrap()
    }

    fn track(samples: &[(f64, i32)]) -> Vec<TrackPoint> {
        samples
            .iter()
            .map(|&(secs, alt)| {
                TrackPoint::new(
                    start() + Duration::milliseconds((secs * 1000.0).round() as i64),
                    GeoPoint::new(46.0, 7.0),
                    alt,
                )
            })
            .collect()
    }

    #[test]
    fn test_three_point_track() {
        let points = track(&[(0.0, 100), (5.0, 150), (10.0, 100)]);
        let analyzer = TrackClimbAnalyzer::new();
        assert_eq!(analyzer.instantaneous_rates(&points), vec![0.0, 10.0, -10.0]);
        assert_eq!(analyzer.windowed_rates(&points), vec![10.0, 0.0, -10.0]);
    }

    #[test]
    fn test_classification_boundaries() {
        let analyzer = TrackClimbAnalyzer::new();
        assert_eq!(analyzer.classify(-2.0), ClimbClass::StrongSink);
        assert_eq!(analyzer.classify(-1.5), ClimbClass::StrongSink);
        assert_eq!(analyzer.classify(-0.5), ClimbClass::WeakSink);
        assert_eq!(analyzer.classify(0.0), ClimbClass::Climb);
        assert_eq!(analyzer.classify(3.0), ClimbClass::Climb);
    }

    #[test]
    fn test_empty_and_single_point() {
        let analyzer = TrackClimbAnalyzer::new();
        assert!(analyzer.windowed_rates(&[]).is_empty());
        let one = track(&[(0.0, 500)]);
        assert_eq!(analyzer.instantaneous_rates(&one), vec![0.0]);
        assert_eq!(analyzer.windowed_rates(&one), vec![0.0]);
        let analysis = analyzer.analyze(&one);
        assert_eq!(analysis.segments.len(), 1);
        assert_eq!(analysis.stats, ClimbStats::default());
    }

    #[test]
    fn test_duplicate_timestamps_never_divide_by_zero() {
        let points = track(&[(0.0, 100), (0.0, 120), (0.0, 90)]);
        let analyzer = TrackClimbAnalyzer::new();
        assert_eq!(analyzer.instantaneous_rates(&points), vec![0.0, 0.0, 0.0]);
        assert_eq!(analyzer.windowed_rates(&points), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sparse_window_falls_back_to_instantaneous() {
        // Samples 20s apart never share a 15s window
        let points = track(&[(0.0, 100), (20.0, 140), (40.0, 120)]);
        let analyzer = TrackClimbAnalyzer::new();
        assert_eq!(analyzer.windowed_rates(&points), vec![0.0, 2.0, -1.0]);
    }

    #[test]
    fn test_variable_sampling_density() {
        // Dense 1s samples then 4s gaps; window must cover all in-range points
        let mut samples: Vec<(f64, i32)> = (0..10).map(|s| (s as f64, 1000 + s * 2)).collect();
        samples.extend((0..5).map(|k| (10.0 + 4.0 * k as f64, 1020 + k * 8)));
        let points = track(&samples);
        let analyzer = TrackClimbAnalyzer::new();
        let windowed = analyzer.windowed_rates(&points);
        assert_eq!(windowed.len(), points.len());
        // Steady 2 m/s everywhere
        for rate in windowed {
            assert!((rate - 2.0).abs() < 1e-9, "rate {rate}");
        }
    }

    #[test]
    fn test_window_matches_naive_scan() {
        let samples: Vec<(f64, i32)> = (0..200)
            .map(|i| {
                let t = i as f64 * 1.7 + if i % 7 == 0 { 0.9 } else { 0.0 };
                (t, 1500 + ((i * 37) % 23) as i32 - 11)
            })
            .collect();
        let points = track(&samples);
        let analyzer = TrackClimbAnalyzer::new();
        let fast = analyzer.windowed_rates(&points);
        let inst = analyzer.instantaneous_rates(&points);

        let times: Vec<f64> = points
            .iter()
            .map(|p| (p.timestamp - points[0].timestamp).num_milliseconds() as f64 / 1000.0)
            .collect();
        for i in 0..points.len() {
            let lo = times[i] - 7.5;
            let hi = times[i] + 7.5;
            let first = (0..points.len()).find(|&j| times[j] >= lo).unwrap();
            let last = (0..points.len()).rev().find(|&j| times[j] <= hi).unwrap();
            let expected = if last > first && times[last] > times[first] {
                (samples[last].1 - samples[first].1) as f64 / (times[last] - times[first])
            } else {
                inst[i]
            };
            assert!((fast[i] - expected).abs() < 1e-6, "index {i}: {} vs {}", fast[i], expected);
        }
    }

    #[test]
    fn test_pressure_altitude_with_gps_fallback() {
        let mut points = track(&[(0.0, 100), (10.0, 200)]);
        points[0].pressure_altitude = Some(50);
        let analyzer = TrackClimbAnalyzer::with_config(ClimbConfig {
            altitude_source: AltitudeSource::Pressure,
            ..ClimbConfig::default()
        })
        .unwrap();
        assert_eq!(analyzer.instantaneous_rates(&points), vec![0.0, 15.0]);
    }

    #[test]
    fn test_nan_window_rejected() {
        let result = TrackClimbAnalyzer::with_config(ClimbConfig {
            window_seconds: f64::NAN,
            ..ClimbConfig::default()
        });
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_segments_and_stats() {
        let points = track(&[(0.0, 100), (20.0, 140), (40.0, 120), (60.0, 60), (80.0, 80)]);
        let analyzer = TrackClimbAnalyzer::new();
        let analysis = analyzer.analyze(&points);
        // windowed = instantaneous here: 0, 2, -1, -3, 1
        assert_eq!(
            analysis.classes,
            vec![
                ClimbClass::Climb,
                ClimbClass::Climb,
                ClimbClass::WeakSink,
                ClimbClass::StrongSink,
                ClimbClass::Climb
            ]
        );
        assert_eq!(analysis.segments.len(), 4);
        assert_eq!(analysis.segments[0].end_index, 1);
        assert_eq!(analysis.stats.max_climb_rate, 2.0);
        assert_eq!(analysis.stats.max_sink_rate, -3.0);
        assert_eq!(analysis.stats.total_gain_meters, 60.0);
        assert_eq!(analysis.stats.seconds_climbing, 40.0);
        assert_eq!(analysis.stats.seconds_weak_sink, 20.0);
        assert_eq!(analysis.stats.seconds_strong_sink, 20.0);
    }
}
