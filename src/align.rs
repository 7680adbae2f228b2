// src/align.rs

use crate::error::{AutoVmafError, Result};
use crate::ffmpeg::MetricRunner;
use crate::reconcile::Reconciler;
use crate::session::{ComparisonSession, Role, Stream};
use log::{debug, info};

/// Length of each PSNR probe pass, in seconds.
pub const PROBE_DURATION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentResult {
    pub offset: f64,
    pub fidelity_score: f64,
}

/// Exhaustive frame-by-frame offset search, scored by PSNR.
#[derive(Debug, Clone)]
pub struct Aligner<'a> {
    reconciler: &'a Reconciler,
}

impl<'a> Aligner<'a> {
    pub fn new(reconciler: &'a Reconciler) -> Self {
        Aligner { reconciler }
    }

    /// Searches `[start, start + window)` for the offset of the reference that
    /// best matches the start of the main input.
    ///
    /// With `reverse` the window is searched on the main input instead and the
    /// returned offset is negated. Roles are restored before returning, on
    /// failure too.
    pub fn find_offset<R: MetricRunner + ?Sized>(
        &self,
        session: &mut ComparisonSession,
        runner: &R,
        window: f64,
        start: f64,
        reverse: bool,
    ) -> Result<AlignmentResult> {
        if reverse {
            session.invert_roles();
        }
        let result = self.sweep(session, runner, window, start);
        if reverse {
            session.invert_roles();
        }

        let mut result = result?;
        if reverse {
            result.offset = -result.offset;
        }
        info!(
            "Best offset: {:.3}s (PSNR {:.4})",
            result.offset, result.fidelity_score
        );
        Ok(result)
    }

    fn sweep<R: MetricRunner + ?Sized>(
        &self,
        session: &mut ComparisonSession,
        runner: &R,
        window: f64,
        start: f64,
    ) -> Result<AlignmentResult> {
        if !window.is_finite() || !start.is_finite() || window < 0.0 || start < 0.0 {
            return Err(AutoVmafError::Input(format!(
                "invalid sync window: start {}s, length {}s",
                start, window
            )));
        }

        // Steps follow the reference file's frame rate, whichever role it plays.
        let frame_duration = session
            .summary(Stream::Reference)
            .frame_rate
            .frame_duration();
        let start_frame = (start / frame_duration).round() as u64;
        let frame_count = (window / frame_duration).round() as u64;
        if frame_count == 0 {
            return Err(AutoVmafError::Input(format!(
                "sync window of {}s is shorter than one frame ({:.4}s)",
                window, frame_duration
            )));
        }
        debug!(
            "Sync search over {} frames of {} starting at frame {} ({:.4}s per frame)",
            frame_count,
            session.path_for_role(Role::Reference).display(),
            start_frame,
            frame_duration
        );

        let mut best: Option<AlignmentResult> = None;
        for step in 0..frame_count {
            let offset = (start_frame + step) as f64 * frame_duration;
            let score = self
                .measure(session, runner, offset)
                .map_err(|e| AutoVmafError::Alignment {
                    offset,
                    source: Box::new(e),
                })?;
            info!("Sync offset {:.3}s: PSNR {:.4}", offset, score);

            if best.is_none_or(|b| score > b.fidelity_score) {
                best = Some(AlignmentResult {
                    offset,
                    fidelity_score: score,
                });
            }
        }

        best.ok_or_else(|| AutoVmafError::Input("sync search produced no samples".to_string()))
    }

    fn measure<R: MetricRunner + ?Sized>(
        &self,
        session: &mut ComparisonSession,
        runner: &R,
        offset: f64,
    ) -> Result<f64> {
        session.clear_filters();
        session
            .chain_for_role(Role::Reference)
            .trim(offset, PROBE_DURATION)?;
        session.chain_for_role(Role::Main).trim(0.0, PROBE_DURATION)?;
        self.reconciler.reconcile_session(session)?;
        session.compute_psnr(runner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{ScriptedRunner, hd_session, summary};

    const FRAME: f64 = 0.04;

    fn session() -> ComparisonSession {
        hd_session(
            summary("dist.mp4", (1280, 720), "25/1", false, 30.0),
            summary("ref.ts", (1920, 1080), "25/1", false, 30.0),
        )
    }

    /// Peaks at 50 dB when the given input's trim starts at `delta`.
    fn peak_at(input: usize, delta: f64) -> ScriptedRunner {
        ScriptedRunner::new(move |graph| {
            let start = ScriptedRunner::trim_start(graph, input).unwrap_or(f64::MAX);
            Ok(50.0 / (1.0 + (start - delta).abs() * 100.0))
        })
    }

    #[test]
    fn recovers_synthetic_offset_within_one_frame() {
        let mut session = session();
        let runner = peak_at(1, 1.0);
        let result = Aligner::new(&Reconciler::default())
            .find_offset(&mut session, &runner, 2.0, 0.0, false)
            .unwrap();

        assert!((result.offset - 1.0).abs() < FRAME, "offset {}", result.offset);
        assert!((result.fidelity_score - 50.0).abs() < 1e-6);
        assert_eq!(runner.calls.borrow().len(), 50);
    }

    #[test]
    fn every_step_rebuilds_trims_and_reconciliation() {
        let mut session = session();
        let runner = peak_at(1, 0.2);
        Aligner::new(&Reconciler::default())
            .find_offset(&mut session, &runner, 0.2, 0.0, false)
            .unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 5);
        for args in calls.iter() {
            let graph = ScriptedRunner::graph(args);
            assert_eq!(ScriptedRunner::trim_start(graph, 0), Some(0.0));
            assert_eq!(graph.matches("scale=1920:1080").count(), 1);
            assert_eq!(graph.matches("trim=").count(), 2);
        }
    }

    #[test]
    fn reverse_search_negates_offset_and_restores_roles() {
        let mut session = session();
        // With roles inverted the window slides over the distorted file (input 0).
        let runner = peak_at(0, 0.4);
        let result = Aligner::new(&Reconciler::default())
            .find_offset(&mut session, &runner, 1.0, 0.0, true)
            .unwrap();

        assert!((result.offset + 0.4).abs() < FRAME, "offset {}", result.offset);
        assert_eq!(session.role_of(Stream::Main), Role::Main);
    }

    #[test]
    fn reverse_search_steps_by_reference_frame_rate() {
        let mut session = hd_session(
            summary("dist.mp4", (1920, 1080), "50/1", false, 30.0),
            summary("ref.ts", (1920, 1080), "25/1", false, 30.0),
        );
        let runner = peak_at(0, 0.08);
        let result = Aligner::new(&Reconciler::default())
            .find_offset(&mut session, &runner, 0.2, 0.0, true)
            .unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 5);
        let starts: Vec<f64> = calls
            .iter()
            .filter_map(|args| ScriptedRunner::trim_start(ScriptedRunner::graph(args), 0))
            .collect();
        assert_eq!(starts.len(), 5);
        for (step, start) in starts.iter().enumerate() {
            assert!((start - step as f64 * FRAME).abs() < 1e-9, "step {} at {}", step, start);
        }
        assert!((result.offset + 0.08).abs() < 1e-9);
    }

    #[test]
    fn failed_step_aborts_search_with_its_offset() {
        let mut session = session();
        let runner = ScriptedRunner::new(|graph| {
            match ScriptedRunner::trim_start(graph, 0) {
                Some(start) if start > 0.1 => Err(AutoVmafError::Command("ffmpeg died".to_string())),
                _ => Ok(30.0),
            }
        });
        let err = Aligner::new(&Reconciler::default())
            .find_offset(&mut session, &runner, 1.0, 0.0, true)
            .unwrap_err();

        match err {
            AutoVmafError::Alignment { offset, source } => {
                assert!((offset - 0.12).abs() < 1e-9);
                assert!(matches!(*source, AutoVmafError::Command(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.role_of(Stream::Main), Role::Main);
        assert_eq!(runner.calls.borrow().len(), 4);
    }

    #[test]
    fn ties_resolve_to_lowest_offset() {
        let mut session = session();
        let runner = ScriptedRunner::new(|_| Ok(30.0));
        let result = Aligner::new(&Reconciler::default())
            .find_offset(&mut session, &runner, 0.4, 0.4, false)
            .unwrap();
        assert!((result.offset - 0.4).abs() < 1e-9);
    }

    #[test]
    fn window_shorter_than_a_frame_is_rejected() {
        let mut session = session();
        let runner = ScriptedRunner::new(|_| Ok(30.0));
        let reconciler = Reconciler::default();
        let aligner = Aligner::new(&reconciler);
        assert!(matches!(
            aligner.find_offset(&mut session, &runner, 0.0, 0.0, false),
            Err(AutoVmafError::Input(_))
        ));
        assert!(aligner.find_offset(&mut session, &runner, 1.0, -1.0, false).is_err());
        assert!(runner.calls.borrow().is_empty());
    }
}
