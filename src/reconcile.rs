// src/reconcile.rs

use crate::error::{AutoVmafError, Result};
use crate::filters::ScaleAlgorithm;
use crate::probe::{FrameRate, StreamSummary};
use crate::session::{ComparisonSession, Stream};
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Progressive,
    Interlaced,
}

impl ScanType {
    pub fn of(summary: &StreamSummary) -> Self {
        if summary.is_interlaced {
            ScanType::Interlaced
        } else {
            ScanType::Progressive
        }
    }
}

/// Reference frame rate relative to the main one, on rounded rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateRatio {
    Equal,
    /// reference ≈ 2 × main
    Double,
    /// reference ≈ main / 2
    Half,
    Higher,
    Lower,
}

impl RateRatio {
    pub fn classify(reference: FrameRate, main: FrameRate) -> Self {
        let reference_rounded = reference.rounded();
        let main_rounded = main.rounded();
        if reference_rounded == main_rounded {
            RateRatio::Equal
        } else if reference_rounded == (main.as_f64() * 2.0).round() as i64 {
            RateRatio::Double
        } else if reference_rounded == (main.as_f64() / 2.0).round() as i64 {
            RateRatio::Half
        } else if reference_rounded > main_rounded {
            RateRatio::Higher
        } else {
            RateRatio::Lower
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeinterlaceMode {
    /// One frame out per frame in.
    Frame,
    /// One frame out per field, doubling the rate.
    Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLock {
    /// Lock the deinterlaced side to the progressive rate, only when the
    /// exact rates do not already line up.
    IfDrifted,
    /// Always lock the progressive side to the interlaced side's rate.
    Counterpart,
}

/// Frame-rate/scan reconciliation applied to the pair of streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Same scan type and rounded rate. Exact rates that still differ get a
    /// pass-through fps filter on each side to normalize timestamps.
    NormalizeRates,
    /// Convert `side` down to the other stream's rate.
    ConvertRate { side: Stream },
    Deinterlace {
        side: Stream,
        mode: DeinterlaceMode,
        lock: RateLock,
    },
}

/// The decision table. `None` means no filter combination is supported.
pub fn decide(reference: ScanType, main: ScanType, ratio: RateRatio) -> Option<Action> {
    use DeinterlaceMode::{Field, Frame};
    use RateLock::{Counterpart, IfDrifted};
    use RateRatio::*;
    use ScanType::{Interlaced, Progressive};

    let action = match (reference, main, ratio) {
        (r, m, Equal) if r == m => Action::NormalizeRates,
        (r, m, Double | Higher) if r == m => Action::ConvertRate { side: Stream::Reference },
        (r, m, Half | Lower) if r == m => Action::ConvertRate { side: Stream::Main },

        // e.g. 60i -> 30p
        (Interlaced, Progressive, Double) => Action::Deinterlace { side: Stream::Reference, mode: Frame, lock: IfDrifted },
        // e.g. 30i -> 30p
        (Interlaced, Progressive, Equal) => Action::Deinterlace { side: Stream::Reference, mode: Frame, lock: Counterpart },
        // e.g. 30i -> 60p
        (Interlaced, Progressive, Half) => Action::Deinterlace { side: Stream::Reference, mode: Field, lock: IfDrifted },

        (Progressive, Interlaced, Half) => Action::Deinterlace { side: Stream::Main, mode: Frame, lock: IfDrifted },
        (Progressive, Interlaced, Equal) => Action::Deinterlace { side: Stream::Main, mode: Frame, lock: Counterpart },
        (Progressive, Interlaced, Double) => Action::Deinterlace { side: Stream::Main, mode: Field, lock: IfDrifted },

        _ => return None,
    };
    Some(action)
}

fn other(stream: Stream) -> Stream {
    match stream {
        Stream::Main => Stream::Reference,
        Stream::Reference => Stream::Main,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Decides which scale, deinterlace and fps filters make the two streams
/// comparable, and appends them to the session's chains.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    forced_rate: Option<FrameRate>,
}

impl Reconciler {
    pub fn new(forced_rate: Option<FrameRate>) -> Self {
        Reconciler { forced_rate }
    }

    /// Convenience for callers holding only the session.
    pub fn reconcile_session(&self, session: &mut ComparisonSession) -> Result<()> {
        let main = session.summary(Stream::Main).clone();
        let reference = session.summary(Stream::Reference).clone();
        self.reconcile(&main, &reference, session)
    }

    pub fn reconcile(
        &self,
        main: &StreamSummary,
        reference: &StreamSummary,
        session: &mut ComparisonSession,
    ) -> Result<()> {
        self.normalize_resolution(main, reference, session)?;

        match self.forced_rate {
            Some(rate) => {
                warn!("Forcing frame rate {} on both inputs, this can produce bad vmaf scores", rate);
                self.append_rate(session, Stream::Main, rate);
                self.append_rate(session, Stream::Reference, rate);
                Ok(())
            }
            None => self.normalize_rates(main, reference, session),
        }
    }

    fn normalize_resolution(
        &self,
        main: &StreamSummary,
        reference: &StreamSummary,
        session: &mut ComparisonSession,
    ) -> Result<()> {
        let (width, height) = session.target_resolution();
        for (stream, summary) in [(Stream::Reference, reference), (Stream::Main, main)] {
            if summary.resolution() != (width, height) {
                debug!(
                    "Scaling {} from {}x{} to {}x{}",
                    summary.path.display(),
                    summary.width,
                    summary.height,
                    width,
                    height
                );
                let role = session.role_of(stream);
                session
                    .chain_for_role(role)
                    .scale(width, height, ScaleAlgorithm::Bicubic)?;
            }
        }
        Ok(())
    }

    fn normalize_rates(
        &self,
        main: &StreamSummary,
        reference: &StreamSummary,
        session: &mut ComparisonSession,
    ) -> Result<()> {
        let rate_of = |stream: Stream| match stream {
            Stream::Main => main.frame_rate,
            Stream::Reference => reference.frame_rate,
        };

        let ratio = RateRatio::classify(reference.frame_rate, main.frame_rate);
        let action = decide(ScanType::of(reference), ScanType::of(main), ratio).ok_or_else(|| {
            AutoVmafError::Reconciliation {
                reference_path: reference.path.clone(),
                main_path: main.path.clone(),
                reference_resolution: format!("{}x{}", reference.width, reference.height),
                main_resolution: format!("{}x{}", main.width, main.height),
                reference_fps: reference.frame_rate.to_string(),
                main_fps: main.frame_rate.to_string(),
                reference_interlaced: reference.is_interlaced,
                main_interlaced: main.is_interlaced,
            }
        })?;
        debug!("Rate reconciliation: {:?} (reference {:?} main)", action, ratio);

        match action {
            Action::NormalizeRates => {
                if main.frame_rate != reference.frame_rate {
                    self.append_rate(session, Stream::Main, main.frame_rate);
                    self.append_rate(session, Stream::Reference, reference.frame_rate);
                }
            }
            Action::ConvertRate { side } => {
                warn!("Frame rate conversion can produce bad vmaf scores");
                self.append_rate(session, side, rate_of(other(side)));
            }
            Action::Deinterlace { side, mode, lock } => {
                info!("Deinterlacing {} ({:?} mode)", path_of(side, main, reference), mode);
                let role = session.role_of(side);
                let chain = session.chain_for_role(role);
                match mode {
                    DeinterlaceMode::Frame => chain.deinterlace_by_frame(),
                    DeinterlaceMode::Field => chain.deinterlace_by_field(),
                }

                let interlaced = rate_of(side);
                let progressive = rate_of(other(side));
                match lock {
                    RateLock::Counterpart => self.append_rate(session, other(side), interlaced),
                    RateLock::IfDrifted => {
                        let factor = match mode {
                            DeinterlaceMode::Frame => 2.0,
                            DeinterlaceMode::Field => 0.5,
                        };
                        if round2(interlaced.as_f64()) != round2(factor * progressive.as_f64()) {
                            self.append_rate(session, side, progressive);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn append_rate(&self, session: &mut ComparisonSession, stream: Stream, rate: FrameRate) {
        let role = session.role_of(stream);
        session.chain_for_role(role).set_frame_rate(rate);
    }
}

fn path_of(stream: Stream, main: &StreamSummary, reference: &StreamSummary) -> String {
    match stream {
        Stream::Main => main.path.display().to_string(),
        Stream::Reference => reference.path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterKind;
    use crate::session::tests::{hd_session, summary};
    use std::path::PathBuf;

    fn count(session: &ComparisonSession, stream: Stream, predicate: impl Fn(&FilterKind) -> bool) -> usize {
        session.chain(stream).count(predicate)
    }

    fn is_scale(kind: &FilterKind) -> bool {
        matches!(kind, FilterKind::Scale { .. })
    }

    fn is_deinterlace(kind: &FilterKind) -> bool {
        matches!(kind, FilterKind::DeinterlaceFrame | FilterKind::DeinterlaceField)
    }

    fn is_rate(kind: &FilterKind) -> bool {
        matches!(kind, FilterKind::FrameRate(_))
    }

    fn rate(s: &str) -> FrameRate {
        s.parse().unwrap()
    }

    fn reconcile(main: StreamSummary, reference: StreamSummary) -> Result<ComparisonSession> {
        let mut session = hd_session(main, reference);
        Reconciler::default().reconcile_session(&mut session)?;
        Ok(session)
    }

    #[test]
    fn upscales_720p_main_only() {
        let session = reconcile(
            summary("dist.mp4", (1280, 720), "30/1", false, 10.0),
            summary("ref.mp4", (1920, 1080), "30/1", false, 10.0),
        )
        .unwrap();

        assert_eq!(count(&session, Stream::Main, is_scale), 1);
        assert_eq!(count(&session, Stream::Reference, is_scale), 0);
        assert_eq!(
            session.chain(Stream::Main).stages()[0].kind,
            FilterKind::Scale { width: 1920, height: 1080, algorithm: ScaleAlgorithm::Bicubic }
        );
        for stream in [Stream::Main, Stream::Reference] {
            assert_eq!(count(&session, stream, is_deinterlace), 0);
            assert_eq!(count(&session, stream, is_rate), 0);
        }
    }

    #[test]
    fn interlaced_double_rate_reference_is_deinterlaced_by_frame() {
        let session = reconcile(
            summary("dist.mp4", (1920, 1080), "30000/1001", false, 10.0),
            summary("ref.ts", (1920, 1080), "60000/1001", true, 10.0),
        )
        .unwrap();

        assert_eq!(session.chain(Stream::Reference).stages().len(), 1);
        assert_eq!(session.chain(Stream::Reference).stages()[0].kind, FilterKind::DeinterlaceFrame);
        assert!(session.chain(Stream::Main).stages().is_empty());
    }

    #[test]
    fn drifted_double_rate_locks_deinterlaced_side() {
        let session = reconcile(
            summary("dist.mp4", (1920, 1080), "30000/1001", false, 10.0),
            summary("ref.ts", (1920, 1080), "60/1", true, 10.0),
        )
        .unwrap();

        let kinds: Vec<&FilterKind> = session.chain(Stream::Reference).stages().iter().map(|s| &s.kind).collect();
        assert_eq!(kinds, vec![&FilterKind::DeinterlaceFrame, &FilterKind::FrameRate(rate("30000/1001"))]);
        assert!(session.chain(Stream::Main).stages().is_empty());
    }

    #[test]
    fn interlaced_reference_at_same_rate_forces_main_rate() {
        let session = reconcile(
            summary("dist.mp4", (1920, 1080), "30/1", false, 10.0),
            summary("ref.ts", (1920, 1080), "30000/1001", true, 10.0),
        )
        .unwrap();

        assert_eq!(session.chain(Stream::Reference).stages()[0].kind, FilterKind::DeinterlaceFrame);
        assert_eq!(
            session.chain(Stream::Main).stages()[0].kind,
            FilterKind::FrameRate(rate("30000/1001"))
        );
    }

    #[test]
    fn interlaced_half_rate_reference_is_deinterlaced_by_field() {
        let session = reconcile(
            summary("dist.mp4", (1920, 1080), "60/1", false, 10.0),
            summary("ref.ts", (1920, 1080), "30/1", true, 10.0),
        )
        .unwrap();

        assert_eq!(session.chain(Stream::Reference).stages().len(), 1);
        assert_eq!(session.chain(Stream::Reference).stages()[0].kind, FilterKind::DeinterlaceField);
        assert!(session.chain(Stream::Main).stages().is_empty());
    }

    #[test]
    fn interlaced_main_is_treated_symmetrically() {
        let field = reconcile(
            summary("dist.ts", (1920, 1080), "30/1", true, 10.0),
            summary("ref.mp4", (1920, 1080), "60/1", false, 10.0),
        )
        .unwrap();
        assert_eq!(field.chain(Stream::Main).stages()[0].kind, FilterKind::DeinterlaceField);
        assert!(field.chain(Stream::Reference).stages().is_empty());

        let frame = reconcile(
            summary("dist.ts", (1920, 1080), "60/1", true, 10.0),
            summary("ref.mp4", (1920, 1080), "30/1", false, 10.0),
        )
        .unwrap();
        assert_eq!(frame.chain(Stream::Main).stages()[0].kind, FilterKind::DeinterlaceFrame);
        assert_eq!(frame.chain(Stream::Main).stages().len(), 1);

        let same = reconcile(
            summary("dist.ts", (1920, 1080), "25/1", true, 10.0),
            summary("ref.mp4", (1920, 1080), "25/1", false, 10.0),
        )
        .unwrap();
        assert_eq!(same.chain(Stream::Main).stages()[0].kind, FilterKind::DeinterlaceFrame);
        assert_eq!(same.chain(Stream::Reference).stages()[0].kind, FilterKind::FrameRate(rate("25")));
    }

    #[test]
    fn unsupported_rate_pair_is_an_error() {
        let err = reconcile(
            summary("dist.mp4", (1280, 720), "60/1", false, 10.0),
            summary("ref.ts", (1920, 1080), "25/1", true, 10.0),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ref.ts (1920x1080, 25 fps"), "{message}");
        assert!(message.contains("dist.mp4 (1280x720, 60 fps"), "{message}");
        match err {
            AutoVmafError::Reconciliation {
                reference_path,
                main_path,
                reference_resolution,
                main_resolution,
                reference_fps,
                main_fps,
                reference_interlaced,
                main_interlaced,
            } => {
                assert_eq!(reference_path, PathBuf::from("ref.ts"));
                assert_eq!(main_path, PathBuf::from("dist.mp4"));
                assert_eq!(reference_resolution, "1920x1080");
                assert_eq!(main_resolution, "1280x720");
                assert_eq!(reference_fps, "25");
                assert_eq!(main_fps, "60");
                assert!(reference_interlaced);
                assert!(!main_interlaced);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn same_scan_converts_higher_rate_down() {
        let session = reconcile(
            summary("dist.mp4", (1920, 1080), "25/1", false, 10.0),
            summary("ref.mp4", (1920, 1080), "60/1", false, 10.0),
        )
        .unwrap();
        assert_eq!(session.chain(Stream::Reference).stages()[0].kind, FilterKind::FrameRate(rate("25")));
        assert!(session.chain(Stream::Main).stages().is_empty());

        let session = reconcile(
            summary("dist.ts", (1920, 1080), "50/1", true, 10.0),
            summary("ref.ts", (1920, 1080), "25/1", true, 10.0),
        )
        .unwrap();
        assert_eq!(session.chain(Stream::Main).stages()[0].kind, FilterKind::FrameRate(rate("25")));
        assert!(session.chain(Stream::Reference).stages().is_empty());
    }

    #[test]
    fn drift_rates_with_same_rounding_get_passthrough_fps_on_both_sides() {
        let session = reconcile(
            summary("dist.mp4", (1920, 1080), "30/1", false, 10.0),
            summary("ref.mp4", (1920, 1080), "30000/1001", false, 10.0),
        )
        .unwrap();
        assert_eq!(session.chain(Stream::Main).stages()[0].kind, FilterKind::FrameRate(rate("30")));
        assert_eq!(
            session.chain(Stream::Reference).stages()[0].kind,
            FilterKind::FrameRate(rate("30000/1001"))
        );
    }

    #[test]
    fn equal_rounded_rates_never_select_ratio_rules() {
        let rates = ["24000/1001", "24/1", "25/1", "30000/1001", "30/1", "50/1", "60000/1001", "60/1", "2997/100", "23976/1000"];
        for a in rates {
            for b in rates {
                let (a, b) = (rate(a), rate(b));
                if a.rounded() != b.rounded() {
                    continue;
                }
                assert_eq!(RateRatio::classify(a, b), RateRatio::Equal);
                for reference in [ScanType::Progressive, ScanType::Interlaced] {
                    for main in [ScanType::Progressive, ScanType::Interlaced] {
                        let action = decide(reference, main, RateRatio::classify(a, b));
                        assert!(
                            !matches!(action, Some(Action::Deinterlace { lock: RateLock::IfDrifted, .. })),
                            "{a} vs {b}: {action:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn decision_table_covers_every_supported_pair() {
        use DeinterlaceMode::*;
        use RateRatio::*;
        use ScanType::*;

        assert_eq!(decide(Interlaced, Interlaced, Equal), Some(Action::NormalizeRates));
        assert_eq!(decide(Progressive, Progressive, Higher), Some(Action::ConvertRate { side: Stream::Reference }));
        assert_eq!(decide(Interlaced, Interlaced, Half), Some(Action::ConvertRate { side: Stream::Main }));
        assert_eq!(
            decide(Interlaced, Progressive, Half),
            Some(Action::Deinterlace { side: Stream::Reference, mode: Field, lock: RateLock::IfDrifted })
        );
        assert_eq!(
            decide(Progressive, Interlaced, Equal),
            Some(Action::Deinterlace { side: Stream::Main, mode: Frame, lock: RateLock::Counterpart })
        );
        for ratio in [Higher, Lower] {
            assert_eq!(decide(Interlaced, Progressive, ratio), None);
            assert_eq!(decide(Progressive, Interlaced, ratio), None);
        }
    }

    #[test]
    fn inverted_roles_still_filter_the_same_files() {
        let mut session = hd_session(
            summary("dist.mp4", (1280, 720), "30000/1001", false, 10.0),
            summary("ref.ts", (1920, 1080), "60000/1001", true, 10.0),
        );
        session.invert_roles();
        Reconciler::default().reconcile_session(&mut session).unwrap();

        assert_eq!(count(&session, Stream::Main, is_scale), 1);
        assert_eq!(count(&session, Stream::Reference, is_deinterlace), 1);
        assert_eq!(count(&session, Stream::Main, is_deinterlace), 0);
    }

    #[test]
    fn forced_rate_skips_deinterlacing() {
        let mut session = hd_session(
            summary("dist.mp4", (1920, 1080), "60/1", false, 10.0),
            summary("ref.ts", (1920, 1080), "25/1", true, 10.0),
        );
        Reconciler::new(Some(rate("25"))).reconcile_session(&mut session).unwrap();

        for stream in [Stream::Main, Stream::Reference] {
            assert_eq!(count(&session, stream, is_deinterlace), 0);
            assert_eq!(session.chain(stream).stages()[0].kind, FilterKind::FrameRate(rate("25")));
        }
    }
}
